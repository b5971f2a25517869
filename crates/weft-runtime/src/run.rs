#![forbid(unsafe_code)]

//! Entry points that mount a handler's tree.
//!
//! [`run_window`] and [`run_dialog`] take a `window` or `modeless_dialog`
//! description, build it, attach and initialize the handler, and return a
//! shown [`Window`]. [`build_view`] mounts a handler's own
//! [`Handler::ui_view`] as an embeddable tree.
//!
//! In every case the returned value owns the handler: closing it runs the
//! handler's `close` after the widget tree has closed.
//!
//! [`Handler::ui_view`]: crate::handler::Handler::ui_view

use std::cell::Cell;
use std::fmt;

use tracing::info;
use weft_core::Description;
use weft_widgets::{WidgetKind, WidgetRef};

use crate::builder::Builder;
use crate::config::RuntimeConfig;
use crate::dispatcher::{Dispatcher, TreeId};
use crate::error::{BuildError, LifecycleError};
use crate::handler::HandlerRef;
use crate::lifecycle::{Disposer, Env, Mount, MountOptions};

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// A dispatcher paired with the builder its trees are built with.
#[derive(Debug, Clone, Default)]
pub struct Runtime {
    dispatcher: Dispatcher,
    builder: Builder,
}

impl Runtime {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            dispatcher: Dispatcher::with_config(config),
            builder: Builder::new(),
        }
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The builder; register custom constructors here before running.
    #[must_use]
    pub fn builder(&self) -> &Builder {
        &self.builder
    }

    pub fn run_window(
        &self,
        description: &Description,
        handler: HandlerRef,
    ) -> Result<Window, BuildError> {
        run_root(WidgetKind::Window, description, handler, &self.dispatcher, &self.builder)
    }

    pub fn run_dialog(
        &self,
        description: &Description,
        handler: HandlerRef,
    ) -> Result<Window, BuildError> {
        run_root(
            WidgetKind::ModelessDialog,
            description,
            handler,
            &self.dispatcher,
            &self.builder,
        )
    }

    pub fn build_view(&self, handler: HandlerRef) -> Result<Mount, BuildError> {
        mount_view(handler, &self.dispatcher, &self.builder)
    }

    /// Run queued tasks until the queue is empty.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.dispatcher.run_queued();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }
}

/// Mount a `window` description for `handler`.
pub fn run_window(
    description: &Description,
    handler: HandlerRef,
    dispatcher: &Dispatcher,
) -> Result<Window, BuildError> {
    run_root(WidgetKind::Window, description, handler, dispatcher, &Builder::new())
}

/// Mount a `modeless_dialog` description for `handler`.
pub fn run_dialog(
    description: &Description,
    handler: HandlerRef,
    dispatcher: &Dispatcher,
) -> Result<Window, BuildError> {
    run_root(
        WidgetKind::ModelessDialog,
        description,
        handler,
        dispatcher,
        &Builder::new(),
    )
}

/// Mount `handler.ui_view()` as an embeddable tree.
///
/// # Errors
///
/// [`BuildError::NoView`] when the handler has no view of its own.
pub fn build_view(handler: HandlerRef, dispatcher: &Dispatcher) -> Result<Mount, BuildError> {
    mount_view(handler, dispatcher, &Builder::new())
}

fn run_root(
    kind: WidgetKind,
    description: &Description,
    handler: HandlerRef,
    dispatcher: &Dispatcher,
    builder: &Builder,
) -> Result<Window, BuildError> {
    let expected = kind.builtin_name().unwrap_or_default();
    if description.kind() != expected {
        return Err(BuildError::WrongRoot {
            expected,
            found: description.kind().to_owned(),
        });
    }
    let env = Env::new(
        dispatcher.clone(),
        builder.clone(),
        description.resources().clone(),
    );
    let options = MountOptions {
        owns_handler: true,
        window_root: true,
        emitter: None,
    };
    let mount = Mount::prepare(&env, description, handler, options)?;
    start(&env, &mount)?;
    let window = Window {
        mount,
        shown: Cell::new(true),
    };
    info!(tree = %window.tree_id(), kind = expected, title = ?window.title(), "window shown");
    Ok(window)
}

fn mount_view(
    handler: HandlerRef,
    dispatcher: &Dispatcher,
    builder: &Builder,
) -> Result<Mount, BuildError> {
    let view = handler
        .try_borrow()
        .map_err(|_| LifecycleError::HandlerBusy)?
        .ui_view()
        .ok_or(BuildError::NoView)?;
    let env = Env::new(dispatcher.clone(), builder.clone(), view.resources().clone());
    let options = MountOptions {
        owns_handler: true,
        window_root: false,
        emitter: None,
    };
    let mount = Mount::prepare(&env, &view, handler, options)?;
    start(&env, &mount)?;
    Ok(mount)
}

/// Publish the mount as the root of its env, then activate it.
fn start(env: &Env, mount: &Mount) -> Result<(), BuildError> {
    *env.root.borrow_mut() = Some(mount.disposer());
    if let Err(e) = mount.activate() {
        let _ = mount.close();
        return Err(e.into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Window
// ---------------------------------------------------------------------------

/// A shown window or dialog. Dropping it closes the tree at once.
pub struct Window {
    mount: Mount,
    shown: Cell<bool>,
}

impl Window {
    #[must_use]
    pub fn tree_id(&self) -> TreeId {
        self.mount.tree_id()
    }

    #[must_use]
    pub fn title(&self) -> Option<String> {
        self.mount
            .root()
            .get("title")
            .and_then(|v| v.as_str().map(str::to_owned))
    }

    #[must_use]
    pub fn root(&self) -> &WidgetRef {
        self.mount.root()
    }

    /// The window's single content widget.
    #[must_use]
    pub fn content(&self) -> Option<WidgetRef> {
        self.mount.root().child(0)
    }

    /// Named widget lookup across the whole tree.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<WidgetRef> {
        self.mount.root().find(name)
    }

    #[must_use]
    pub fn is_shown(&self) -> bool {
        self.shown.get() && !self.mount.is_closed()
    }

    #[must_use]
    pub fn disposer(&self) -> Disposer {
        self.mount.disposer()
    }

    #[must_use]
    pub fn mount(&self) -> &Mount {
        &self.mount
    }

    /// Hide the window and close its tree. Inside a running task the
    /// teardown is queued behind it, as with [`Disposer::dispose`].
    pub fn close(&self) -> Result<(), LifecycleError> {
        self.mount.request_close()?;
        self.shown.set(false);
        Ok(())
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        if !self.mount.is_closed() {
            let _ = self.mount.close();
        }
    }
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("tree", &self.tree_id())
            .field("title", &self.title())
            .field("shown", &self.is_shown())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::handler::{Handler, HandlerContext, handler_ref};

    #[derive(Default)]
    struct Shell {
        context: Option<HandlerContext>,
        closed: Rc<Cell<bool>>,
    }

    impl Handler for Shell {
        fn attach_context(&mut self, context: HandlerContext) {
            self.context = Some(context);
        }
        fn ui_view(&self) -> Option<Description> {
            Some(Description::new("text_label").with_property("text", "embedded"))
        }
        fn close(&mut self) {
            self.closed.set(true);
        }
    }

    fn window(content: Description) -> Description {
        Description::new("window")
            .with_property("title", "Main")
            .with_child(content)
    }

    #[test]
    fn window_is_shown_until_disposed() {
        let closed = Rc::new(Cell::new(false));
        let shell = Rc::new(RefCell::new(Shell {
            context: None,
            closed: closed.clone(),
        }));
        let dispatcher = Dispatcher::new();
        let node = window(Description::new("text_label").with_name("status"));
        let window = run_window(&node, shell.clone(), &dispatcher).unwrap();
        assert!(window.is_shown());
        assert_eq!(window.title().as_deref(), Some("Main"));
        assert!(window.find("status").is_some());

        let context = shell.borrow().context.clone().unwrap();
        context.request_close().unwrap();
        assert!(!window.is_shown());
        assert!(closed.get());
        assert!(window.disposer().is_disposed());
    }

    #[test]
    fn roots_are_checked() {
        let dispatcher = Dispatcher::new();
        let node = Description::new("column");
        let err = run_window(&node, handler_ref(Shell::default()), &dispatcher).unwrap_err();
        assert_eq!(
            err,
            BuildError::WrongRoot {
                expected: "window",
                found: "column".into(),
            }
        );
        let node = window(Description::new("column"));
        let err = run_dialog(&node, handler_ref(Shell::default()), &dispatcher).unwrap_err();
        assert!(matches!(err, BuildError::WrongRoot { expected: "modeless_dialog", .. }));
    }

    #[test]
    fn dropping_a_window_closes_its_handler() {
        let closed = Rc::new(Cell::new(false));
        let shell = handler_ref(Shell {
            context: None,
            closed: closed.clone(),
        });
        let runtime = Runtime::new();
        let node = Description::new("modeless_dialog").with_child(Description::new("column"));
        let dialog = runtime.run_dialog(&node, shell).unwrap();
        assert!(!closed.get());
        drop(dialog);
        assert!(closed.get());
    }

    #[test]
    fn views_mount_the_handler_view() {
        let runtime = Runtime::new();
        let view = runtime.build_view(handler_ref(Shell::default())).unwrap();
        assert!(view.is_active());
        assert_eq!(view.root().get("text"), Some("embedded".into()));

        struct Bare;
        impl Handler for Bare {}
        let err = runtime.build_view(handler_ref(Bare)).unwrap_err();
        assert_eq!(err, BuildError::NoView);
    }

    #[test]
    fn close_inside_a_task_is_queued() {
        let closed = Rc::new(Cell::new(false));
        let shell = handler_ref(Shell {
            context: None,
            closed: closed.clone(),
        });
        let dispatcher = Dispatcher::new();
        let node = window(Description::new("column"));
        let window = Rc::new(run_window(&node, shell, &dispatcher).unwrap());
        let inside = Rc::clone(&window);
        let closed_during_task = Rc::new(Cell::new(true));
        let during = Rc::clone(&closed_during_task);
        dispatcher.post(move || {
            inside.close()?;
            during.set(inside.mount().is_closed());
            Ok(())
        });

        assert_eq!(dispatcher.run_queued(), 2);
        assert!(!closed_during_task.get());
        assert!(closed.get());
        assert!(!window.is_shown());
        assert!(window.mount().is_closed());
        assert!(dispatcher.take_notifications().is_empty());
    }
}
