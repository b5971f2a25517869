#![forbid(unsafe_code)]

//! Core data types for Weft.
//!
//! This crate provides:
//! - [`Value`] for dynamically typed property values
//! - [`Observable`], [`Listeners`] and [`Subscription`] for change notification
//! - [`PropertyModel`], [`ObjectModel`] and [`ListModel`] for handler-owned state
//! - [`Converter`] and the thread-local [`ConverterRegistry`]
//! - [`Description`] for serializable UI trees

pub mod converter;
pub mod description;
pub mod model;
pub mod observable;
pub mod value;

pub use converter::{
    CheckedToCheckState, Converter, ConverterError, ConverterRegistry, FloatTo100, FloatToPercent,
    FloatToString, FnConverter, IntegerToString,
};
pub use description::{
    BindingExpr, Description, DescriptionBuilder, DescriptionError, PropertyValue,
};
pub use model::{ListChange, ListModel, Member, ObjectModel, Observed, PropertyError, PropertyModel};
pub use observable::{Listeners, Observable, Subscription};
pub use value::{Params, Value, ValueMap};
