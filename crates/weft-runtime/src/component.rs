#![forbid(unsafe_code)]

//! Dynamic content: component slots and item lists.
//!
//! A `component` widget hosts a [`ComponentSlot`]. The slot resolves the
//! widget's `identifier` to a description, mounts it, and rebuilds the
//! content through the dispatcher whenever `identifier` or `params`
//! change. A container with an `items` path and an `item_component_id`
//! hosts an [`ItemList`]: one component mount per item of a list model.
//!
//! # Invariants
//!
//! 1. Rebuild requests for one slot are keyed by the slot widget, so a
//!    pending request is replaced by a newer one. A generation counter
//!    discards any request that still slips through.
//! 2. The old content is closed as one mount before the new content is
//!    built.
//! 3. List changes are applied in the order the model made them, each
//!    removal closing exactly one item mount.
//!
//! # Failure Modes
//!
//! | Failure | At build | At rebuild |
//! |---------|----------|------------|
//! | resource not found | build error (empty slot if `optional`) | `error!`, slot left empty |
//! | content build error | build error | `error!`, slot left empty |

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, debug_span, error};
use weft_core::{DescriptionError, ListChange, Params, Value};
use weft_widgets::{Closeable, Widget, WidgetId, WidgetRef};

use crate::binding::{Target, resolve_path};
use crate::builder::BuildScope;
use crate::dispatcher::{TaskResult, TreeToken};
use crate::error::{BindingResolutionError, BuildError, LifecycleError, ResourceNotFoundError};
use crate::handler::{Emitter, Handler, HandlerRef};
use crate::lifecycle::{Env, Mount, MountOptions, close_handler};
use crate::resolver::resolve;

/// Build the content of component `id`.
///
/// The parent handler may create a sub-handler for it; the sub-handler's
/// own view then replaces the resolved description. Returns `Ok(None)` for
/// an optional component that cannot be resolved.
pub(crate) fn prepare_component(
    env: &Env,
    parent: &HandlerRef,
    id: &str,
    params: &Params,
    optional: bool,
    emitter: Option<Emitter>,
) -> Result<Option<Mount>, BuildError> {
    let created = parent
        .try_borrow_mut()
        .map_err(|_| LifecycleError::HandlerBusy)?
        .create_handler(id, params);
    let owns_handler = created.is_some();
    let handler = created.unwrap_or_else(|| Rc::clone(parent));

    let view = if owns_handler {
        handler.try_borrow().ok().and_then(|h| h.ui_view())
    } else {
        None
    };
    let description = match view {
        Some(view) => view,
        None => match resolve(id, params, parent, &env.resources) {
            Ok(found) => found,
            Err(e) => {
                if owns_handler {
                    close_handler(&handler, &env.dispatcher);
                }
                if optional {
                    debug!(resource = id, "optional component left empty");
                    return Ok(None);
                }
                return Err(e.into());
            }
        },
    };
    let options = MountOptions {
        owns_handler,
        window_root: false,
        emitter: if owns_handler { emitter } else { None },
    };
    Mount::prepare(env, &description, handler, options).map(Some)
}

fn text_property(widget: &Widget, property: &str) -> String {
    widget
        .get(property)
        .and_then(|v| v.as_str().map(str::to_owned))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// ComponentSlot
// ---------------------------------------------------------------------------

/// Resource-resolved content of a `component` widget.
pub(crate) struct ComponentSlot {
    state: Rc<SlotState>,
}

struct SlotState {
    widget: Weak<Widget>,
    widget_id: WidgetId,
    env: Env,
    handler: Weak<RefCell<dyn Handler>>,
    token: TreeToken,
    generation: Cell<u64>,
    current: RefCell<Option<Mount>>,
}

impl ComponentSlot {
    /// Build the initial content of `widget` and watch it for rebuilds.
    pub(crate) fn install(scope: &mut BuildScope<'_>, widget: &WidgetRef) -> Result<(), BuildError> {
        let state = Rc::new(SlotState {
            widget: Rc::downgrade(widget),
            widget_id: widget.id(),
            env: scope.env.clone(),
            handler: Rc::downgrade(scope.handler),
            token: scope.token.clone(),
            generation: Cell::new(0),
            current: RefCell::new(None),
        });
        if let Some(mount) = state.prepare()? {
            widget.add_child(mount.root().clone());
            scope.push_nested(mount.clone());
            *state.current.borrow_mut() = Some(mount);
        }
        widget.own(Box::new(Self {
            state: Rc::clone(&state),
        }));
        for property in ["identifier", "params"] {
            let weak = Rc::downgrade(&state);
            let watch = widget.observe(property, move |_| {
                if let Some(state) = weak.upgrade() {
                    SlotState::schedule(&state);
                }
            })?;
            widget.hold(watch);
        }
        Ok(())
    }
}

impl Closeable for ComponentSlot {
    fn close(&self) {
        let state = &self.state;
        state.generation.set(state.generation.get() + 1);
        let current = state.current.borrow_mut().take();
        if let Some(mount) = current {
            let _ = mount.close();
        }
    }
}

impl SlotState {
    fn prepare(&self) -> Result<Option<Mount>, BuildError> {
        let closed = || LifecycleError::TreeClosed(self.token.id());
        let widget = self.widget.upgrade().ok_or_else(closed)?;
        let parent = self.handler.upgrade().ok_or_else(closed)?;
        let id = text_property(&widget, "identifier");
        let params = widget
            .get("params")
            .and_then(|v| v.as_map().cloned())
            .unwrap_or_default();
        let optional = widget
            .get("optional")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let slot = self.widget.clone();
        let emitter: Emitter = Rc::new(move |event: &str, args: Params| match slot.upgrade() {
            Some(widget) => widget.emit_signal(event, args),
            None => Ok(()),
        });
        prepare_component(&self.env, &parent, &id, &params, optional, Some(emitter))
    }

    /// Queue a rebuild, replacing any pending one for this slot.
    fn schedule(state: &Rc<Self>) {
        let generation = state.generation.get() + 1;
        state.generation.set(generation);
        let weak = Rc::downgrade(state);
        state.env.dispatcher.post_keyed(
            format!("slot:{}", state.widget_id),
            Some(&state.token),
            move || weak.upgrade().map_or(Ok(()), |state| state.rebuild(generation)),
        );
    }

    fn rebuild(&self, generation: u64) -> TaskResult {
        if generation != self.generation.get() {
            debug!(widget = %self.widget_id, generation, "skipping stale slot rebuild");
            return Ok(());
        }
        let Some(widget) = self.widget.upgrade() else {
            return Ok(());
        };
        if widget.is_closed() {
            return Ok(());
        }
        let _span = debug_span!("slot_rebuild", widget = %self.widget_id).entered();

        let old = self.current.borrow_mut().take();
        if let Some(old) = old {
            widget.remove_child(old.root());
            let _ = old.close();
        }
        let mount = match self.prepare() {
            Ok(Some(mount)) => mount,
            Ok(None) => return Ok(()),
            Err(e) => {
                error!(widget = %self.widget_id, error = %e, "component rebuild failed");
                return Err(e.into());
            }
        };
        widget.add_child(mount.root().clone());
        *self.current.borrow_mut() = Some(mount.clone());
        if let Err(e) = mount.activate() {
            error!(widget = %self.widget_id, error = %e, "component activation failed");
            self.current.borrow_mut().take();
            widget.remove_child(mount.root());
            let _ = mount.close();
            return Err(e.into());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ItemList
// ---------------------------------------------------------------------------

/// One component mount per item of a list model.
pub(crate) struct ItemList {
    state: Rc<ListState>,
}

struct ListState {
    widget: Weak<Widget>,
    widget_id: WidgetId,
    env: Env,
    handler: Weak<RefCell<dyn Handler>>,
    token: TreeToken,
    component_id: String,
    /// Number of static children preceding the items.
    first: usize,
    /// `None` marks an item whose content failed to build.
    mounts: RefCell<Vec<Option<Mount>>>,
}

impl ItemList {
    pub(crate) fn install(scope: &mut BuildScope<'_>, widget: &WidgetRef) -> Result<(), BuildError> {
        let path = text_property(widget, "items");
        let component_id = text_property(widget, "item_component_id");
        if component_id.is_empty() {
            return Err(DescriptionError::InvalidValue {
                property: "item_component_id".into(),
                expected: "a component id",
                found: "nothing".into(),
            }
            .into());
        }
        let Target::List(list) = resolve_path(scope.handler, &path)? else {
            return Err(BindingResolutionError::NotAList { path }.into());
        };

        let state = Rc::new(ListState {
            widget: Rc::downgrade(widget),
            widget_id: widget.id(),
            env: scope.env.clone(),
            handler: Rc::downgrade(scope.handler),
            token: scope.token.clone(),
            component_id,
            first: widget.child_count(),
            mounts: RefCell::new(Vec::new()),
        });
        widget.own(Box::new(Self {
            state: Rc::clone(&state),
        }));
        for (index, item) in list.items().into_iter().enumerate() {
            let mount = state.prepare_item(index, item)?;
            widget.add_child(mount.root().clone());
            scope.push_nested(mount.clone());
            state.mounts.borrow_mut().push(Some(mount));
        }

        let weak = Rc::downgrade(&state);
        let dispatcher = scope.env.dispatcher.clone();
        let token = scope.token.clone();
        let watch = list.subscribe(move |change| {
            let weak = weak.clone();
            let change = change.clone();
            dispatcher.post_for(&token, move || {
                weak.upgrade().map_or(Ok(()), |state| state.apply(change))
            });
        });
        widget.hold(watch);
        Ok(())
    }
}

impl Closeable for ItemList {
    fn close(&self) {
        let mounts = std::mem::take(&mut *self.state.mounts.borrow_mut());
        for mount in mounts.into_iter().flatten() {
            let _ = mount.close();
        }
    }
}

impl ListState {
    fn prepare_item(&self, index: usize, item: Value) -> Result<Mount, BuildError> {
        let parent = self
            .handler
            .upgrade()
            .ok_or(LifecycleError::TreeClosed(self.token.id()))?;
        let mut params = Params::new();
        params.insert("item".into(), item);
        params.insert("index".into(), Value::from(index));
        prepare_component(&self.env, &parent, &self.component_id, &params, false, None)?
            .ok_or_else(|| {
                ResourceNotFoundError {
                    id: self.component_id.clone(),
                }
                .into()
            })
    }

    fn apply(&self, change: ListChange) -> TaskResult {
        let Some(widget) = self.widget.upgrade() else {
            return Ok(());
        };
        if widget.is_closed() {
            return Ok(());
        }
        match change {
            ListChange::Inserted { index, value } => {
                let (index, position) = {
                    let mounts = self.mounts.borrow();
                    let index = index.min(mounts.len());
                    (index, self.first + mounts[..index].iter().flatten().count())
                };
                match self.prepare_item(index, value) {
                    Ok(mount) => {
                        widget.insert_child(position, mount.root().clone());
                        self.mounts.borrow_mut().insert(index, Some(mount.clone()));
                        mount.activate()?;
                    }
                    Err(e) => {
                        self.mounts.borrow_mut().insert(index, None);
                        error!(widget = %self.widget_id, index, error = %e, "item build failed");
                        return Err(e.into());
                    }
                }
            }
            ListChange::Removed { index, .. } => {
                let removed = {
                    let mut mounts = self.mounts.borrow_mut();
                    if index < mounts.len() {
                        mounts.remove(index)
                    } else {
                        None
                    }
                };
                if let Some(mount) = removed {
                    widget.remove_child(mount.root());
                    mount.close()?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use weft_core::{Description, ListModel, Member};

    use crate::builder::Builder;
    use crate::dispatcher::Dispatcher;
    use crate::error::HandlerError;
    use crate::handler::{HandlerContext, WidgetEvent, handler_ref};
    use crate::resolver::ComponentRegistry;

    #[derive(Default)]
    struct Rows {
        rows: Rc<ListModel>,
    }

    impl Handler for Rows {
        fn member(&self, name: &str) -> Option<Member> {
            (name == "rows").then(|| Member::List(self.rows.clone()))
        }
        fn get_resource(&self, id: &str, params: &Params) -> Option<Description> {
            let item = params.get("item")?.to_display_string();
            (id == "row").then(|| Description::new("text_label").with_property("text", item))
        }
    }

    fn label(text: &str) -> Description {
        Description::new("text_label").with_property("text", text)
    }

    fn text_of(widget: &WidgetRef, index: usize) -> Option<Value> {
        widget.child(index).and_then(|c| c.get("text"))
    }

    #[test]
    fn optional_slot_stays_empty() {
        let handler = handler_ref(Rows::default());
        let node = Description::new("component")
            .with_property("identifier", "missing")
            .with_property("optional", true);
        let slot = Builder::new().build(&node, &handler, &Dispatcher::new()).unwrap();
        assert_eq!(slot.child_count(), 0);

        let node = Description::new("component").with_property("identifier", "missing");
        let err = Builder::new().build(&node, &handler, &Dispatcher::new()).unwrap_err();
        assert_eq!(err, BuildError::Resource(ResourceNotFoundError { id: "missing".into() }));
    }

    #[test]
    fn only_latest_identifier_is_built() {
        let _a = ComponentRegistry::register_scoped("pane_a", label("A"));
        let _b = ComponentRegistry::register_scoped("pane_b", label("B"));
        let _c = ComponentRegistry::register_scoped("pane_c", label("C"));
        let handler = handler_ref(Rows::default());
        let dispatcher = Dispatcher::new();
        let node = Description::new("component").with_property("identifier", "pane_a");
        let slot = Builder::new().build(&node, &handler, &dispatcher).unwrap();
        assert_eq!(text_of(&slot, 0), Some(Value::from("A")));

        slot.set("identifier", "pane_b").unwrap();
        slot.set("identifier", "pane_c").unwrap();
        assert_eq!(dispatcher.pending_count(), 1);
        dispatcher.run_queued();
        assert_eq!(slot.child_count(), 1);
        assert_eq!(text_of(&slot, 0), Some(Value::from("C")));
        assert!(dispatcher.take_notifications().is_empty());
    }

    #[test]
    fn failed_rebuild_leaves_slot_empty() {
        let _a = ComponentRegistry::register_scoped("pane_a", label("A"));
        let handler = handler_ref(Rows::default());
        let dispatcher = Dispatcher::new();
        let node = Description::new("component").with_property("identifier", "pane_a");
        let slot = Builder::new().build(&node, &handler, &dispatcher).unwrap();
        let old = slot.child(0).unwrap();

        slot.set("identifier", "nowhere").unwrap();
        dispatcher.run_queued();
        assert_eq!(slot.child_count(), 0);
        assert!(old.is_closed());
        assert_eq!(dispatcher.take_notifications().len(), 1);
    }

    #[test]
    fn closed_slot_ignores_pending_rebuild() {
        let _a = ComponentRegistry::register_scoped("pane_a", label("A"));
        let _b = ComponentRegistry::register_scoped("pane_b", label("B"));
        let handler = handler_ref(Rows::default());
        let dispatcher = Dispatcher::new();
        let node = Description::new("component").with_property("identifier", "pane_a");
        let slot = Builder::new().build(&node, &handler, &dispatcher).unwrap();
        let content = slot.child(0).unwrap();
        slot.set("identifier", "pane_b").unwrap();
        slot.close().unwrap();
        dispatcher.run_queued();
        assert!(content.is_closed());
        assert_eq!(slot.child_count(), 0);
        assert!(dispatcher.take_notifications().is_empty());
    }

    struct Counter {
        context: Option<HandlerContext>,
        closed: Rc<Cell<bool>>,
    }

    impl Handler for Counter {
        fn attach_context(&mut self, context: HandlerContext) {
            self.context = Some(context);
        }
        fn ui_view(&self) -> Option<Description> {
            Some(Description::new("push_button").with_event("on_clicked", "bump"))
        }
        fn handle_event(&mut self, method: &str, _: &WidgetEvent) -> Result<(), HandlerError> {
            match (method, &self.context) {
                ("bump", Some(context)) => context.emit("bumped", Params::new()).map(|_| ()),
                _ => Err(HandlerError::UnknownMethod(method.to_owned())),
            }
        }
        fn close(&mut self) {
            self.closed.set(true);
        }
    }

    struct Host {
        closed: Rc<Cell<bool>>,
        bumps: usize,
    }

    impl Handler for Host {
        fn create_handler(&mut self, id: &str, _: &Params) -> Option<HandlerRef> {
            (id == "counter").then(|| {
                handler_ref(Counter {
                    context: None,
                    closed: self.closed.clone(),
                })
            })
        }
        fn handle_event(&mut self, method: &str, _: &WidgetEvent) -> Result<(), HandlerError> {
            match method {
                "on_bumped" => {
                    self.bumps += 1;
                    Ok(())
                }
                _ => Err(HandlerError::UnknownMethod(method.to_owned())),
            }
        }
    }

    #[test]
    fn sub_handler_events_reach_parent() {
        let closed = Rc::new(Cell::new(false));
        let host = Rc::new(RefCell::new(Host {
            closed: closed.clone(),
            bumps: 0,
        }));
        let handler: HandlerRef = host.clone();
        let dispatcher = Dispatcher::new();
        let node = Description::new("component")
            .with_property("identifier", "counter")
            .with_event("bumped", "on_bumped");
        let slot = Builder::new().build(&node, &handler, &dispatcher).unwrap();

        slot.child(0).unwrap().click().unwrap();
        dispatcher.run_queued();
        assert_eq!(host.borrow().bumps, 1);
        assert!(dispatcher.take_notifications().is_empty());

        slot.close().unwrap();
        assert!(closed.get());
    }

    #[test]
    fn items_follow_list_changes() {
        let rows = Rows::default();
        let list = rows.rows.clone();
        list.push("one");
        list.push("two");
        let handler = handler_ref(rows);
        let dispatcher = Dispatcher::new();
        let node = Description::new("column")
            .with_child(label("header"))
            .with_property("items", "rows")
            .with_property("item_component_id", "row");
        let column = Builder::new().build(&node, &handler, &dispatcher).unwrap();
        assert_eq!(column.child_count(), 3);
        assert_eq!(text_of(&column, 1), Some(Value::from("one")));

        let removed = column.child(1).unwrap();
        list.insert(0, "zero");
        list.remove(1);
        dispatcher.run_queued();
        assert_eq!(column.child_count(), 3);
        assert_eq!(text_of(&column, 0), Some(Value::from("header")));
        assert_eq!(text_of(&column, 1), Some(Value::from("zero")));
        assert_eq!(text_of(&column, 2), Some(Value::from("two")));
        assert!(removed.is_closed());

        column.close().unwrap();
        list.push("late");
        assert_eq!(dispatcher.run_queued(), 0);
    }

    #[test]
    fn items_need_a_component_id_and_a_list() {
        let handler = handler_ref(Rows::default());
        let node = Description::new("column").with_property("items", "rows");
        let err = Builder::new().build(&node, &handler, &Dispatcher::new()).unwrap_err();
        assert!(matches!(err, BuildError::Description(_)));

        let node = Description::new("column")
            .with_property("items", "nothing")
            .with_property("item_component_id", "row");
        let err = Builder::new().build(&node, &handler, &Dispatcher::new()).unwrap_err();
        assert!(matches!(err, BuildError::Binding(_)));
    }
}
