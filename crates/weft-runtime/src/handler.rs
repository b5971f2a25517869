#![forbid(unsafe_code)]

//! The handler capability interface.
//!
//! A handler is the application object a tree is wired to. Every capability
//! is a default method, so a handler implements only what it uses:
//!
//! - models for bindings ([`Handler::member`], [`Handler::observed`]);
//! - named widgets and its context ([`Handler::attach_widget`],
//!   [`Handler::attach_context`]);
//! - lifecycle hooks ([`Handler::init_handler`], [`Handler::close`]);
//! - events ([`Handler::handle_event`]);
//! - component resources and sub-handlers ([`Handler::resources`],
//!   [`Handler::get_resource`], [`Handler::create_handler`],
//!   [`Handler::ui_view`]);
//! - named converters ([`Handler::converter`]).

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use weft_core::{Converter, Description, Member, Observed, Params, Value};
use weft_widgets::{WidgetError, WidgetRef};

use crate::dispatcher::{Dispatcher, TaskId, TaskResult, TreeToken};
use crate::error::{HandlerError, LifecycleError};
use crate::lifecycle::Disposer;

/// Shared handle to a handler.
pub type HandlerRef = Rc<RefCell<dyn Handler>>;

/// Component descriptions keyed by resource id.
pub type ResourceMap = IndexMap<String, Description>;

/// Wrap a handler in a [`HandlerRef`].
pub fn handler_ref(handler: impl Handler) -> HandlerRef {
    Rc::new(RefCell::new(handler))
}

/// Application object wired to a tree.
#[allow(unused_variables)]
pub trait Handler: 'static {
    /// A member reachable from binding paths and item lists.
    fn member(&self, name: &str) -> Option<Member> {
        None
    }

    /// The handler's own observable properties, consulted first for
    /// single-segment binding paths.
    fn observed(&self) -> Option<Rc<dyn Observed>> {
        None
    }

    /// Receive the widget declared with `name`.
    fn attach_widget(&mut self, name: &str, widget: WidgetRef) {}

    /// Receive the context of the tree this handler owns.
    fn attach_context(&mut self, context: HandlerContext) {}

    /// Called once, after every named widget is attached.
    fn init_handler(&mut self) {}

    /// Called once, after the handler's tree is closed.
    fn close(&mut self) {}

    /// Handle the event wired to `method` in a description.
    fn handle_event(&mut self, method: &str, event: &WidgetEvent) -> Result<(), HandlerError> {
        Err(HandlerError::UnknownMethod(method.to_owned()))
    }

    /// Component descriptions this handler provides.
    fn resources(&self) -> Option<&ResourceMap> {
        None
    }

    /// Compute a component description on demand.
    fn get_resource(&self, id: &str, params: &Params) -> Option<Description> {
        None
    }

    /// A converter named in a binding expression.
    fn converter(&self, name: &str) -> Option<Rc<dyn Converter>> {
        None
    }

    /// Create a sub-handler for the component `component_id`.
    fn create_handler(&mut self, component_id: &str, params: &Params) -> Option<HandlerRef> {
        None
    }

    /// The handler's own description, used by `build_view` and by
    /// sub-handlers to override the resolved component content.
    fn ui_view(&self) -> Option<Description> {
        None
    }
}

/// An event delivered to [`Handler::handle_event`].
#[derive(Debug, Clone)]
pub struct WidgetEvent {
    /// The widget that raised the event, if it is still alive.
    pub widget: Option<WidgetRef>,
    pub event: String,
    pub args: Params,
}

impl WidgetEvent {
    #[must_use]
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// Argument `name`, or [`HandlerError::InvalidArgument`].
    pub fn require(&self, name: &str) -> Result<&Value, HandlerError> {
        self.arg(name)
            .ok_or_else(|| HandlerError::InvalidArgument(name.to_owned()))
    }
}

/// Forwards component events from a sub-handler to its slot.
pub(crate) type Emitter = Rc<dyn Fn(&str, Params) -> Result<(), WidgetError>>;

/// What a handler can do with the tree it owns.
#[derive(Clone)]
pub struct HandlerContext {
    dispatcher: Dispatcher,
    token: TreeToken,
    root: Rc<RefCell<Option<Disposer>>>,
    emitter: Option<Emitter>,
}

impl HandlerContext {
    pub(crate) fn new(
        dispatcher: Dispatcher,
        token: TreeToken,
        root: Rc<RefCell<Option<Disposer>>>,
        emitter: Option<Emitter>,
    ) -> Self {
        Self {
            dispatcher,
            token,
            root,
            emitter,
        }
    }

    /// Queue `task`; it is dropped if the tree closes first.
    pub fn post(&self, task: impl FnOnce() -> TaskResult + 'static) -> TaskId {
        self.dispatcher.post_for(&self.token, task)
    }

    /// Close the root window or dialog. Queued when called from a task.
    pub fn request_close(&self) -> Result<(), LifecycleError> {
        let disposer = self.root.borrow().clone();
        match disposer {
            Some(disposer) => disposer.dispose(),
            None => Err(LifecycleError::TreeClosed(self.token.id())),
        }
    }

    /// Raise a component event on the slot this handler's tree lives in.
    ///
    /// Returns `Ok(false)` when the tree is not a component.
    pub fn emit(&self, event: &str, args: Params) -> Result<bool, HandlerError> {
        let Some(emitter) = &self.emitter else {
            return Ok(false);
        };
        emitter(event, args).map_err(|e| HandlerError::failed(e.to_string()))?;
        Ok(true)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        !self.token.is_alive()
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

impl fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("tree", &self.token.id())
            .field("closed", &self.is_closed())
            .field("component", &self.emitter.is_some())
            .finish()
    }
}

/// Deliver `event` to `method` on the handler behind `handler`.
pub(crate) fn dispatch_event(
    handler: &Weak<RefCell<dyn Handler>>,
    method: &str,
    event: WidgetEvent,
) -> TaskResult {
    let Some(handler) = handler.upgrade() else {
        return Ok(());
    };
    let mut handler = handler
        .try_borrow_mut()
        .map_err(|_| LifecycleError::HandlerBusy)?;
    handler.handle_event(method, &event)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl Handler for Recorder {
        fn handle_event(&mut self, method: &str, event: &WidgetEvent) -> Result<(), HandlerError> {
            match method {
                "picked" => {
                    let value = event.require("value")?;
                    self.calls.push(format!("picked {value}"));
                    Ok(())
                }
                _ => Err(HandlerError::UnknownMethod(method.to_owned())),
            }
        }
    }

    fn event(args: Params) -> WidgetEvent {
        WidgetEvent {
            widget: None,
            event: "on_clicked".into(),
            args,
        }
    }

    #[test]
    fn default_capabilities_are_empty() {
        struct Bare;
        impl Handler for Bare {}
        let bare = Bare;
        assert!(bare.member("x").is_none());
        assert!(bare.resources().is_none());
        assert!(bare.ui_view().is_none());
    }

    #[test]
    fn dispatch_reaches_method() {
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        let handler: HandlerRef = recorder.clone();
        let weak = Rc::downgrade(&handler);

        let mut args = Params::new();
        args.insert("value".into(), Value::Int(3));
        dispatch_event(&weak, "picked", event(args)).unwrap();
        assert_eq!(recorder.borrow().calls, vec!["picked 3"]);

        let err = dispatch_event(&weak, "picked", event(Params::new())).unwrap_err();
        assert_eq!(
            err,
            TaskError::Handler(HandlerError::InvalidArgument("value".into()))
        );
        let err = dispatch_event(&weak, "nope", event(Params::new())).unwrap_err();
        assert_eq!(err, TaskError::Handler(HandlerError::UnknownMethod("nope".into())));
    }

    #[test]
    fn busy_handler_is_reported() {
        let handler: HandlerRef = Rc::new(RefCell::new(Recorder::default()));
        let weak = Rc::downgrade(&handler);
        let _held = handler.borrow_mut();
        let err = dispatch_event(&weak, "picked", event(Params::new())).unwrap_err();
        assert_eq!(err, TaskError::Lifecycle(LifecycleError::HandlerBusy));
    }

    #[test]
    fn dropped_handler_is_a_no_op() {
        let handler: HandlerRef = Rc::new(RefCell::new(Recorder::default()));
        let weak = Rc::downgrade(&handler);
        drop(handler);
        assert!(dispatch_event(&weak, "picked", event(Params::new())).is_ok());
    }
}
