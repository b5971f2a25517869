#![forbid(unsafe_code)]

//! Weft public facade.
//!
//! Weft builds widget trees from declarative [`Description`]s and keeps
//! them bound to the models of a [`Handler`]. This crate re-exports the
//! pieces applications use; the prelude covers the common case.
//!
//! ```ignore
//! use weft::prelude::*;
//!
//! let window = run_window(&Description::from_json(JSON)?, handler_ref(app), &dispatcher)?;
//! dispatcher.run_queued();
//! ```

pub mod logging;

pub use weft_runtime as runtime;
pub use weft_widgets as widgets;

pub use weft_core::{
    BindingExpr, Converter, ConverterRegistry, Description, DescriptionError, ListChange,
    ListModel, Member, ObjectModel, Observed, Params, PropertyError, PropertyModel, Subscription,
    Value,
};
pub use weft_runtime::{
    BindingResolutionError, BuildError, Builder, ComponentRegistry, Dispatcher, Disposer,
    Handler, HandlerContext, HandlerError, HandlerRef, LifecycleError, Mount,
    ResourceNotFoundError, Runtime, RuntimeConfig, TaskError, WidgetEvent, Window, build_view,
    handler_ref, run_dialog, run_window,
};
pub use weft_widgets::{Widget, WidgetError, WidgetKind, WidgetRef};

pub mod prelude {
    pub use crate::{
        Description, Dispatcher, Handler, HandlerContext, HandlerError, HandlerRef, ListModel,
        Member, ObjectModel, Observed, Params, PropertyModel, Runtime, Value, WidgetEvent,
        WidgetRef, build_view, handler_ref, run_dialog, run_window,
    };
}
