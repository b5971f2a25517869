#![forbid(unsafe_code)]

//! Binding and reconciliation runtime for Weft.
//!
//! This crate turns a [`Description`] plus a [`Handler`] into a live widget
//! tree and keeps the two in sync:
//!
//! - [`Dispatcher`]: the single-threaded task queue every asynchronous
//!   effect goes through, with per-tree cancellation tokens and keyed
//!   supersession.
//! - [`Builder`]: constructs widgets, applies literals and references, and
//!   wires bindings and events.
//! - [`bind`]: the binding engine connecting widget properties to model
//!   properties, optionally through a converter.
//! - [`resolve`] and [`ComponentRegistry`]: component resource lookup.
//! - [`Mount`]: the lifecycle unit (attach, initialize, close).
//! - [`run_window`], [`run_dialog`] and [`build_view`]: entry points.
//!
//! # Architecture
//!
//! Everything is single-threaded: widgets, models and handlers are shared
//! through `Rc`, mutable state lives in `RefCell`/`Cell`, and work that must
//! not re-enter a running callback is posted to the [`Dispatcher`]. Other
//! threads reach the UI thread only through [`Dispatcher::channel`].
//!
//! # Invariants
//!
//! 1. A handler's named widgets are attached before its `init_handler`.
//! 2. A model change reaches each bound widget exactly once and never
//!    loops back into the model.
//! 3. Closing a tree drops its queued tasks and releases every model
//!    subscription the tree held.
//!
//! [`Description`]: weft_core::Description

pub mod binding;
pub mod builder;
mod component;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod resolver;
pub mod run;

pub use binding::{Binding, Direction, Target, bind, resolve_path};
pub use builder::{Builder, Constructor};
pub use config::{ConfigError, RuntimeConfig};
pub use dispatcher::{
    Dispatcher, NOTIFICATION_CAPACITY, Notification, RemoteSender, TaskId, TaskKey, TaskResult,
    TreeId, TreeToken,
};
pub use error::{
    BindingResolutionError, BuildError, HandlerError, LifecycleError, ResourceNotFoundError,
    TaskError,
};
pub use handler::{Handler, HandlerContext, HandlerRef, ResourceMap, WidgetEvent, handler_ref};
pub use lifecycle::{Disposer, Mount, attach, initialize};
pub use resolver::{ComponentRegistry, Registration, resolve};
pub use run::{Runtime, Window, build_view, run_dialog, run_window};
