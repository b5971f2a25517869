#![forbid(unsafe_code)]

//! The widget builder.
//!
//! [`Builder`] maps type names to widget constructors and materializes a
//! [`Description`] into live widgets, wiring bindings, references and
//! events against a handler as it goes.
//!
//! # Per-node steps
//!
//! 1. Look up the constructor for the node type.
//! 2. Record sizing keys into the widget's [`Sizing`].
//! 3. Apply every other property: a binding is bound, a reference is read
//!    once, a literal is set.
//! 4. Register the node name.
//! 5. Check the kind's child rule, then build children in order.
//! 6. Install a component slot or an item list.
//! 7. Wire the node's events.
//!
//! Any error closes the widget under construction, and with it every child
//! already built, before it propagates.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use tracing::warn;
use weft_core::{Description, DescriptionError, PropertyValue, Value};
use weft_widgets::{
    ChildRule, CustomKind, PropType, PropertySpec, Sizing, Widget, WidgetKind, WidgetRef,
};

use crate::binding::{bind, read_reference};
use crate::component::{ComponentSlot, ItemList};
use crate::dispatcher::{Dispatcher, TreeToken};
use crate::error::BuildError;
use crate::handler::{HandlerRef, WidgetEvent, dispatch_event};
use crate::lifecycle::{Env, Mount, MountOptions, TokenCloser};

/// Creates the widget for one description node.
pub type Constructor = Rc<dyn Fn(&Description) -> WidgetRef>;

/// Constructor registry and tree builder.
///
/// Clones share the registry.
#[derive(Clone)]
pub struct Builder {
    constructors: Rc<RefCell<AHashMap<String, Constructor>>>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    /// A builder knowing every built-in kind.
    #[must_use]
    pub fn new() -> Self {
        let builder = Self {
            constructors: Rc::new(RefCell::new(AHashMap::new())),
        };
        for kind in WidgetKind::BUILTIN {
            builder.register_widget_kind(kind);
        }
        builder
    }

    /// Register `constructor` for `type_name`, replacing any previous one.
    pub fn register(
        &self,
        type_name: impl Into<String>,
        constructor: impl Fn(&Description) -> WidgetRef + 'static,
    ) {
        self.constructors
            .borrow_mut()
            .insert(type_name.into(), Rc::new(constructor));
    }

    /// Register an extension kind under its own name.
    pub fn register_kind(&self, kind: CustomKind) {
        self.register_widget_kind(kind.into_kind());
    }

    fn register_widget_kind(&self, kind: WidgetKind) {
        let name = kind.name().to_owned();
        self.register(name, move |node: &Description| {
            Widget::named(kind.clone(), node.name().map(str::to_owned))
        });
    }

    #[must_use]
    pub fn knows(&self, type_name: &str) -> bool {
        self.constructors.borrow().contains_key(type_name)
    }

    fn constructor(&self, type_name: &str) -> Option<Constructor> {
        self.constructors.borrow().get(type_name).cloned()
    }

    /// Build `node` for `handler` outside any window.
    ///
    /// Named widgets are attached to `handler`; its lifecycle hooks are not
    /// run. Closing the returned root closes the tree.
    pub fn build(
        &self,
        node: &Description,
        handler: &HandlerRef,
        dispatcher: &Dispatcher,
    ) -> Result<WidgetRef, BuildError> {
        let env = Env::new(dispatcher.clone(), self.clone(), node.resources().clone());
        let options = MountOptions {
            owns_handler: false,
            window_root: false,
            emitter: None,
        };
        let mount = Mount::prepare(&env, node, Rc::clone(handler), options)?;
        if let Err(e) = mount.activate() {
            let _ = mount.close();
            return Err(e.into());
        }
        let root = mount.root().clone();
        root.own(Box::new(TokenCloser {
            token: mount.token().clone(),
            dispatcher: dispatcher.clone(),
        }));
        Ok(root)
    }

    /// Build one node and its subtree.
    pub(crate) fn build_node(
        &self,
        scope: &mut BuildScope<'_>,
        node: &Description,
        depth: usize,
    ) -> Result<WidgetRef, BuildError> {
        let constructor = self
            .constructor(node.kind())
            .ok_or_else(|| DescriptionError::UnknownType(node.kind().to_owned()))?;
        let widget = constructor(node);
        if let Err(e) = self.populate(scope, node, &widget, depth) {
            let _ = widget.close();
            return Err(e);
        }
        Ok(widget)
    }

    fn populate(
        &self,
        scope: &mut BuildScope<'_>,
        node: &Description,
        widget: &WidgetRef,
        depth: usize,
    ) -> Result<(), BuildError> {
        let kind = widget.kind().clone();
        if kind.is_root_only() && !(depth == 0 && scope.window_root) {
            return Err(invalid_children(&kind, "is only valid as a window root"));
        }

        let mut sizing = Sizing::default();
        for (key, value) in node.properties() {
            sizing.apply(key, value).map_err(|e| DescriptionError::InvalidValue {
                property: e.key,
                expected: "a size or size policy",
                found: e.found.to_string(),
            })?;
        }
        widget.set_sizing(sizing);

        for (key, value) in node.properties() {
            if Sizing::is_sizing_key(key) {
                continue;
            }
            let Some(spec) = kind.property(key).copied() else {
                if scope.strict() {
                    return Err(DescriptionError::UnknownProperty {
                        kind: kind.name().to_owned(),
                        property: key.to_owned(),
                    }
                    .into());
                }
                warn!(kind = %kind, property = key, "ignoring unknown property");
                continue;
            };
            self.apply_property(scope, widget, &spec, value)?;
        }

        if let Some(name) = node.name() {
            scope.names.push((name.to_owned(), widget.clone()));
        }
        check_children(&kind, node)?;
        for child in node.children() {
            let child = self.build_node(scope, child, depth + 1)?;
            widget.add_child(child);
        }

        if kind == WidgetKind::Component {
            ComponentSlot::install(scope, widget)?;
        } else if kind.property("items").is_some_and(PropertySpec::is_path)
            && node.property("items").is_some()
        {
            ItemList::install(scope, widget)?;
        }

        for (event, method) in node.events() {
            if !kind.forwards_events() && kind.event(event).is_none() {
                if scope.strict() {
                    return Err(DescriptionError::UnknownEvent {
                        kind: kind.name().to_owned(),
                        event: event.to_owned(),
                    }
                    .into());
                }
                warn!(kind = %kind, event, "ignoring unknown event");
                continue;
            }
            wire_event(scope, widget, event, method)?;
        }
        Ok(())
    }

    fn apply_property(
        &self,
        scope: &BuildScope<'_>,
        widget: &WidgetRef,
        spec: &PropertySpec,
        value: &Value,
    ) -> Result<(), BuildError> {
        match PropertyValue::from_value(value)? {
            PropertyValue::Binding(expr) => {
                if spec.is_path() {
                    return Err(DescriptionError::InvalidBinding {
                        expression: expr.to_string(),
                        reason: format!("'{}' takes a member name", spec.name),
                    }
                    .into());
                }
                let binding = bind(widget, spec.name, &expr, scope.handler)?;
                widget.hold(binding.into_subscription());
            }
            PropertyValue::Literal(Value::Str(path)) if is_reference(spec) => {
                let value = read_reference(scope.handler, &path)?;
                widget.set(spec.name, value)?;
            }
            PropertyValue::Literal(value) => {
                widget.set(spec.name, value)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("constructors", &self.constructors.borrow().len())
            .finish()
    }
}

/// A plain string on a non-text property names a handler member to read
/// once.
fn is_reference(spec: &PropertySpec) -> bool {
    !spec.is_path() && !matches!(spec.ty, PropType::Text | PropType::Any)
}

fn invalid_children(kind: &WidgetKind, reason: &str) -> BuildError {
    DescriptionError::InvalidChildren {
        kind: kind.name().to_owned(),
        reason: reason.to_owned(),
    }
    .into()
}

fn check_children(kind: &WidgetKind, node: &Description) -> Result<(), BuildError> {
    let children = node.children();
    match kind.child_rule() {
        ChildRule::None if !children.is_empty() => {
            return Err(invalid_children(kind, "takes no children"));
        }
        ChildRule::ExactlyOne if children.len() != 1 => {
            return Err(invalid_children(kind, "takes exactly one child"));
        }
        ChildRule::Tabs if children.iter().any(|c| c.kind() != "tab") => {
            return Err(invalid_children(kind, "accepts only tab children"));
        }
        _ => {}
    }
    if *kind == WidgetKind::Tab && node.property("label").is_none() {
        return Err(invalid_children(kind, "needs a label"));
    }
    Ok(())
}

/// Forward `event` of `widget` to `method` of the scope's handler through
/// the dispatcher.
fn wire_event(
    scope: &BuildScope<'_>,
    widget: &WidgetRef,
    event: &str,
    method: &str,
) -> Result<(), BuildError> {
    let handler = Rc::downgrade(scope.handler);
    let token = scope.token.clone();
    let dispatcher = scope.env.dispatcher.clone();
    let source = Rc::downgrade(widget);
    let event_name: Rc<str> = Rc::from(event);
    let method: Rc<str> = Rc::from(method);
    let subscription = widget.on_signal(event, move |args| {
        let handler = handler.clone();
        let method = Rc::clone(&method);
        let event = WidgetEvent {
            widget: source.upgrade(),
            event: event_name.to_string(),
            args: args.clone(),
        };
        dispatcher.post_for(&token, move || dispatch_event(&handler, &method, event));
    })?;
    widget.hold(subscription);
    Ok(())
}

// ---------------------------------------------------------------------------
// BuildScope
// ---------------------------------------------------------------------------

/// State of one mount's build.
pub(crate) struct BuildScope<'a> {
    pub(crate) env: &'a Env,
    pub(crate) handler: &'a HandlerRef,
    pub(crate) token: &'a TreeToken,
    window_root: bool,
    names: Vec<(String, WidgetRef)>,
    nested: Vec<Mount>,
}

impl<'a> BuildScope<'a> {
    pub(crate) fn new(
        env: &'a Env,
        handler: &'a HandlerRef,
        token: &'a TreeToken,
        window_root: bool,
    ) -> Self {
        Self {
            env,
            handler,
            token,
            window_root,
            names: Vec::new(),
            nested: Vec::new(),
        }
    }

    fn strict(&self) -> bool {
        self.env.dispatcher.config().strict_descriptions
    }

    /// Record a mount built inside this one; it is activated with it.
    pub(crate) fn push_nested(&mut self, mount: Mount) {
        self.nested.push(mount);
    }

    pub(crate) fn finish(self) -> (Vec<(String, WidgetRef)>, Vec<Mount>) {
        (self.names, self.nested)
    }
}
