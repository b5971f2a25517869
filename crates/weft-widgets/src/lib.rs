#![forbid(unsafe_code)]

//! Headless widgets for Weft.
//!
//! Widgets here hold properties, children and notification lists; drawing
//! is left to whatever backend observes them.

pub mod kind;
pub mod sizing;
pub mod widget;

pub use kind::{
    COMMON_PROPERTIES, ChildRule, CustomKind, EventSpec, Initial, PropType, PropertyFlags,
    PropertySpec, Trigger, WidgetKind,
};
pub use sizing::{SIZING_KEYS, SizePolicy, Sizing, SizingError};
pub use widget::{Closeable, Widget, WidgetError, WidgetId, WidgetRef};
