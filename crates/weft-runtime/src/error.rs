#![forbid(unsafe_code)]

//! Runtime error types.
//!
//! # Failure Modes
//!
//! | Error | Raised by | Policy |
//! |-------|-----------|--------|
//! | [`BindingResolutionError`] | binding engine | fatal at bind time |
//! | [`ResourceNotFoundError`] | resolver | fatal unless the slot is optional |
//! | [`LifecycleError`] | mounts, handler dispatch | returned to direct callers, logged when queued |
//! | [`HandlerError`] | handler methods | surfaced as a dispatcher notification |
//! | [`BuildError`] | builder, run entry points | aborts the build, partial tree is closed |
//! | [`TaskError`] | dispatcher | recorded as a non-fatal notification |

use std::fmt;

use weft_core::{DescriptionError, PropertyError};
use weft_widgets::WidgetError;

use crate::dispatcher::TreeId;

/// A binding expression could not be wired.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingResolutionError {
    /// A path segment names nothing on its owner.
    UnresolvedPath { path: String, segment: String },
    /// A non-final path segment is not an object.
    NotAnObject { path: String, segment: String },
    /// The path names an object rather than a value.
    NotAValue { path: String },
    /// The path was expected to name a list model.
    NotAList { path: String },
    UnknownConverter(String),
    /// The widget side of the binding is invalid.
    Widget(WidgetError),
    /// The handler was mutably borrowed during resolution.
    HandlerBusy,
}

impl fmt::Display for BindingResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedPath { path, segment } => {
                write!(f, "cannot resolve '{segment}' in binding path '{path}'")
            }
            Self::NotAnObject { path, segment } => {
                write!(f, "'{segment}' in binding path '{path}' is not an object")
            }
            Self::NotAValue { path } => write!(f, "binding path '{path}' does not name a value"),
            Self::NotAList { path } => write!(f, "'{path}' does not name a list"),
            Self::UnknownConverter(name) => write!(f, "unknown converter '{name}'"),
            Self::Widget(e) => write!(f, "binding target: {e}"),
            Self::HandlerBusy => write!(f, "handler is busy"),
        }
    }
}

impl std::error::Error for BindingResolutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Widget(e) => Some(e),
            _ => None,
        }
    }
}

impl From<WidgetError> for BindingResolutionError {
    fn from(e: WidgetError) -> Self {
        Self::Widget(e)
    }
}

/// No resource source knows the requested component id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNotFoundError {
    pub id: String,
}

impl fmt::Display for ResourceNotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resource '{}' not found", self.id)
    }
}

impl std::error::Error for ResourceNotFoundError {}

/// Misuse of a mounted tree or its handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// The tree was already closed.
    AlreadyClosed(TreeId),
    /// An operation targeted a closed tree.
    TreeClosed(TreeId),
    /// The handler was borrowed when the runtime needed it.
    HandlerBusy,
    /// The mount was activated twice.
    AlreadyActive(TreeId),
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyClosed(id) => write!(f, "tree {id} was already closed"),
            Self::TreeClosed(id) => write!(f, "tree {id} is closed"),
            Self::HandlerBusy => write!(f, "handler is busy"),
            Self::AlreadyActive(id) => write!(f, "tree {id} is already active"),
        }
    }
}

impl std::error::Error for LifecycleError {}

/// Error returned by a handler method.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerError {
    /// The handler has no method with this name.
    UnknownMethod(String),
    /// An event argument was missing or had the wrong type.
    InvalidArgument(String),
    Property(PropertyError),
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMethod(method) => write!(f, "handler has no method '{method}'"),
            Self::InvalidArgument(name) => write!(f, "invalid argument '{name}'"),
            Self::Property(e) => write!(f, "{e}"),
            Self::Failed(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for HandlerError {}

impl From<PropertyError> for HandlerError {
    fn from(e: PropertyError) -> Self {
        Self::Property(e)
    }
}

/// Any error that aborts a build.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
    Description(DescriptionError),
    Binding(BindingResolutionError),
    Resource(ResourceNotFoundError),
    Lifecycle(LifecycleError),
    /// A literal or reference was rejected by the widget.
    Widget(WidgetError),
    /// A run entry point received the wrong root type.
    WrongRoot { expected: &'static str, found: String },
    /// `build_view` on a handler without a view.
    NoView,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Description(e) => write!(f, "{e}"),
            Self::Binding(e) => write!(f, "{e}"),
            Self::Resource(e) => write!(f, "{e}"),
            Self::Lifecycle(e) => write!(f, "{e}"),
            Self::Widget(e) => write!(f, "{e}"),
            Self::WrongRoot { expected, found } => {
                write!(f, "expected a '{expected}' root, found '{found}'")
            }
            Self::NoView => write!(f, "handler has no view"),
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Description(e) => Some(e),
            Self::Binding(e) => Some(e),
            Self::Resource(e) => Some(e),
            Self::Lifecycle(e) => Some(e),
            Self::Widget(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DescriptionError> for BuildError {
    fn from(e: DescriptionError) -> Self {
        Self::Description(e)
    }
}

impl From<BindingResolutionError> for BuildError {
    fn from(e: BindingResolutionError) -> Self {
        Self::Binding(e)
    }
}

impl From<ResourceNotFoundError> for BuildError {
    fn from(e: ResourceNotFoundError) -> Self {
        Self::Resource(e)
    }
}

impl From<LifecycleError> for BuildError {
    fn from(e: LifecycleError) -> Self {
        Self::Lifecycle(e)
    }
}

impl From<WidgetError> for BuildError {
    fn from(e: WidgetError) -> Self {
        Self::Widget(e)
    }
}

/// Failure of one queued task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskError {
    Handler(HandlerError),
    Lifecycle(LifecycleError),
    Build(BuildError),
    /// The task panicked; the payload message if it had one.
    Panic(String),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler(e) => write!(f, "handler error: {e}"),
            Self::Lifecycle(e) => write!(f, "lifecycle error: {e}"),
            Self::Build(e) => write!(f, "build error: {e}"),
            Self::Panic(message) => write!(f, "task panicked: {message}"),
        }
    }
}

impl std::error::Error for TaskError {}

impl From<HandlerError> for TaskError {
    fn from(e: HandlerError) -> Self {
        Self::Handler(e)
    }
}

impl From<LifecycleError> for TaskError {
    fn from(e: LifecycleError) -> Self {
        Self::Lifecycle(e)
    }
}

impl From<BuildError> for TaskError {
    fn from(e: BuildError) -> Self {
        Self::Build(e)
    }
}
