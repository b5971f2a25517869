#![forbid(unsafe_code)]

//! Handler lifecycle: mounts, attach, initialize, close.
//!
//! A [`Mount`] is the unit of lifecycle. The tree of a window, the content
//! of a component slot and each item of an item list are mounts. A mount
//! owns a [`TreeToken`], its root widget and, when it was created for a
//! sub-handler, that handler.
//!
//! # State Machine
//!
//! ```text
//! Prepared ──activate──▶ Active ──close──▶ Closed
//!     └──────────────close──────────────────▲
//! ```
//!
//! # Invariants
//!
//! 1. Every named widget is attached before `init_handler` runs, and
//!    `init_handler` runs before any queued event can reach the handler.
//! 2. Nested mounts created during a build are attached and initialized
//!    after the parent's attach and before the parent's `init_handler`.
//! 3. `close` marks the token dead and drops the tree's queued tasks before
//!    any widget is closed.
//! 4. A mount closes exactly once; later calls return
//!    [`LifecycleError::AlreadyClosed`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, debug_span, warn};
use weft_core::Description;
use weft_widgets::{Closeable, WidgetRef};

use crate::builder::{BuildScope, Builder};
use crate::dispatcher::{Dispatcher, TreeId, TreeToken};
use crate::error::{BuildError, LifecycleError};
use crate::handler::{Emitter, HandlerContext, HandlerRef, ResourceMap};

// ---------------------------------------------------------------------------
// Env
// ---------------------------------------------------------------------------

/// What every mount of one window shares.
#[derive(Clone)]
pub(crate) struct Env {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) builder: Builder,
    /// Resources declared on the window or dialog description.
    pub(crate) resources: Rc<ResourceMap>,
    /// Disposer of the window or view the mounts belong to.
    pub(crate) root: Rc<RefCell<Option<Disposer>>>,
}

impl Env {
    pub(crate) fn new(dispatcher: Dispatcher, builder: Builder, resources: ResourceMap) -> Self {
        Self {
            dispatcher,
            builder,
            resources: Rc::new(resources),
            root: Rc::new(RefCell::new(None)),
        }
    }
}

// ---------------------------------------------------------------------------
// attach / initialize
// ---------------------------------------------------------------------------

/// Hand every named widget, then `context` if given, to `handler`.
pub fn attach(
    handler: &HandlerRef,
    names: &[(String, WidgetRef)],
    context: Option<HandlerContext>,
) -> Result<(), LifecycleError> {
    let mut handler = handler
        .try_borrow_mut()
        .map_err(|_| LifecycleError::HandlerBusy)?;
    for (name, widget) in names {
        handler.attach_widget(name, widget.clone());
    }
    if let Some(context) = context {
        handler.attach_context(context);
    }
    Ok(())
}

/// Run `init_handler`.
pub fn initialize(handler: &HandlerRef) -> Result<(), LifecycleError> {
    handler
        .try_borrow_mut()
        .map_err(|_| LifecycleError::HandlerBusy)?
        .init_handler();
    Ok(())
}

/// Run the handler's `close`, or queue it when the handler is borrowed.
pub(crate) fn close_handler(handler: &HandlerRef, dispatcher: &Dispatcher) {
    if let Ok(mut borrowed) = handler.try_borrow_mut() {
        borrowed.close();
        return;
    }
    debug!("handler busy, deferring close");
    let handler = Rc::clone(handler);
    dispatcher.post(move || {
        handler
            .try_borrow_mut()
            .map_err(|_| LifecycleError::HandlerBusy)?
            .close();
        Ok(())
    });
}

// ---------------------------------------------------------------------------
// Mount
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Prepared,
    Active,
    Closed,
}

pub(crate) struct MountInner {
    token: TreeToken,
    env: Env,
    handler: HandlerRef,
    owns_handler: bool,
    root: WidgetRef,
    names: Vec<(String, WidgetRef)>,
    nested: RefCell<Vec<Mount>>,
    emitter: Option<Emitter>,
    phase: Cell<Phase>,
}

/// A built tree wired to a handler.
#[derive(Clone)]
pub struct Mount {
    inner: Rc<MountInner>,
}

/// Options for [`Mount::prepare`].
pub(crate) struct MountOptions {
    /// The mount owns `handler`: it attaches the context, runs
    /// `init_handler` and closes the handler with the tree.
    pub(crate) owns_handler: bool,
    /// Root-only kinds (window, dialog) are accepted at the root.
    pub(crate) window_root: bool,
    pub(crate) emitter: Option<Emitter>,
}

impl Mount {
    /// Build `description` for `handler`. Nothing is attached yet.
    ///
    /// On failure the partial tree is closed, and so is `handler` if the
    /// mount was to own it.
    pub(crate) fn prepare(
        env: &Env,
        description: &Description,
        handler: HandlerRef,
        options: MountOptions,
    ) -> Result<Self, BuildError> {
        let token = TreeToken::new();
        let _span = debug_span!("mount", tree = %token.id(), root = description.kind()).entered();

        let mut scope = BuildScope::new(env, &handler, &token, options.window_root);
        let builder = env.builder.clone();
        let built = builder.build_node(&mut scope, description, 0);
        let (names, nested) = scope.finish();
        let root = match built {
            Ok(root) => root,
            Err(e) => {
                token.close();
                env.dispatcher.clear_tree(token.id());
                if options.owns_handler {
                    close_handler(&handler, &env.dispatcher);
                }
                return Err(e);
            }
        };
        Ok(Self {
            inner: Rc::new(MountInner {
                token,
                env: env.clone(),
                handler,
                owns_handler: options.owns_handler,
                root,
                names,
                nested: RefCell::new(nested),
                emitter: options.emitter,
                phase: Cell::new(Phase::Prepared),
            }),
        })
    }

    /// Attach, activate nested mounts, then initialize.
    pub(crate) fn activate(&self) -> Result<(), LifecycleError> {
        let inner = &self.inner;
        match inner.phase.get() {
            Phase::Prepared => {}
            Phase::Active => return Err(LifecycleError::AlreadyActive(self.tree_id())),
            Phase::Closed => return Err(LifecycleError::TreeClosed(self.tree_id())),
        }
        inner.phase.set(Phase::Active);

        let context = inner.owns_handler.then(|| {
            HandlerContext::new(
                inner.env.dispatcher.clone(),
                inner.token.clone(),
                Rc::clone(&inner.env.root),
                inner.emitter.clone(),
            )
        });
        attach(&inner.handler, &inner.names, context)?;

        let nested = std::mem::take(&mut *inner.nested.borrow_mut());
        for mount in nested.iter().filter(|m| !m.is_closed()) {
            mount.activate()?;
        }
        if inner.owns_handler {
            initialize(&inner.handler)?;
        }
        Ok(())
    }

    /// Close the tree now.
    ///
    /// Order: the token dies, queued tasks of the tree are dropped, the
    /// widget tree closes depth-first, then an owned handler is closed.
    pub fn close(&self) -> Result<(), LifecycleError> {
        let inner = &self.inner;
        if inner.phase.replace(Phase::Closed) == Phase::Closed {
            return Err(LifecycleError::AlreadyClosed(self.tree_id()));
        }
        let _span = debug_span!("close", tree = %self.tree_id()).entered();
        inner.token.close();
        let dropped = inner.env.dispatcher.clear_tree(self.tree_id());
        if dropped > 0 {
            debug!(dropped, "dropped queued tasks");
        }
        let _ = inner.root.close();
        inner.nested.borrow_mut().clear();
        if inner.owns_handler {
            close_handler(&inner.handler, &inner.env.dispatcher);
        }
        Ok(())
    }

    /// Close the tree, deferred to the queue when a task is running.
    ///
    /// Repeated deferred requests collapse into one.
    pub fn request_close(&self) -> Result<(), LifecycleError> {
        if self.is_closed() {
            return Err(LifecycleError::AlreadyClosed(self.tree_id()));
        }
        let dispatcher = &self.inner.env.dispatcher;
        if !dispatcher.is_running() {
            return self.close();
        }
        let weak = Rc::downgrade(&self.inner);
        let tree = self.tree_id();
        dispatcher.post_keyed(format!("close:{tree}"), None, move || {
            match weak.upgrade() {
                Some(inner) => Mount { inner }.close().map_err(Into::into),
                None => Err(LifecycleError::AlreadyClosed(tree).into()),
            }
        });
        Ok(())
    }

    #[must_use]
    pub fn tree_id(&self) -> TreeId {
        self.inner.token.id()
    }

    #[must_use]
    pub fn root(&self) -> &WidgetRef {
        &self.inner.root
    }

    #[must_use]
    pub fn handler(&self) -> &HandlerRef {
        &self.inner.handler
    }

    #[must_use]
    pub fn owns_handler(&self) -> bool {
        self.inner.owns_handler
    }

    /// Named widgets of this mount, in build order.
    #[must_use]
    pub fn names(&self) -> &[(String, WidgetRef)] {
        &self.inner.names
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.phase.get() == Phase::Active
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.phase.get() == Phase::Closed
    }

    #[must_use]
    pub fn disposer(&self) -> Disposer {
        Disposer {
            tree: self.tree_id(),
            mount: Rc::downgrade(&self.inner),
        }
    }

    pub(crate) fn token(&self) -> &TreeToken {
        &self.inner.token
    }
}

impl fmt::Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount")
            .field("tree", &self.tree_id())
            .field("phase", &self.inner.phase.get())
            .field("root", &self.inner.root.kind().name())
            .field("owns_handler", &self.inner.owns_handler)
            .finish()
    }
}

/// Marks a detached tree's token dead when its root closes.
pub(crate) struct TokenCloser {
    pub(crate) token: TreeToken,
    pub(crate) dispatcher: Dispatcher,
}

impl Closeable for TokenCloser {
    fn close(&self) {
        if self.token.close() {
            self.dispatcher.clear_tree(self.token.id());
        }
    }
}

// ---------------------------------------------------------------------------
// Disposer
// ---------------------------------------------------------------------------

/// Weak handle that closes a mounted tree on request.
#[derive(Clone)]
pub struct Disposer {
    tree: TreeId,
    mount: Weak<MountInner>,
}

impl Disposer {
    /// Close the tree; deferred to the queue when a task is running.
    pub fn dispose(&self) -> Result<(), LifecycleError> {
        match self.mount.upgrade() {
            Some(inner) => Mount { inner }.request_close(),
            None => {
                warn!(tree = %self.tree, "dispose of a dropped tree");
                Err(LifecycleError::AlreadyClosed(self.tree))
            }
        }
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.mount
            .upgrade()
            .is_none_or(|inner| inner.phase.get() == Phase::Closed)
    }

    #[must_use]
    pub fn tree_id(&self) -> TreeId {
        self.tree
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("tree", &self.tree)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
