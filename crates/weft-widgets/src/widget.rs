#![forbid(unsafe_code)]

//! Headless live widgets.
//!
//! A [`Widget`] is the realized form of one description node. It holds
//! typed properties, its children, and three kinds of notification lists:
//!
//! | List | Fired by | Used by |
//! |------|----------|---------|
//! | update observers ([`Widget::observe`]) | every property change | rendering backends, one-way bindings |
//! | edit listeners ([`Widget::on_edit`]) | user changes only ([`Widget::edit`]) | two-way bindings |
//! | signal listeners ([`Widget::on_signal`]) | actions and user edits | handler event wiring |
//!
//! Programmatic writes ([`Widget::set`]) never fire edit listeners or
//! signals, so a value pushed from a model cannot echo back into it.
//!
//! # Linked properties
//!
//! Some kinds keep properties consistent with each other. A write to one
//! side updates the other within the same call and reports it with the same
//! origin:
//!
//! - `check_box`: `checked` and `check_state`.
//! - `radio_button`: `checked` is `group_value == value`.
//! - `combo_box`, `list_box`: `current_item` is `items[current_index]`.
//!
//! # Invariants
//!
//! 1. Writing a value equal to the current one changes nothing and fires
//!    nothing.
//! 2. [`Widget::close`] releases, in order: owned dynamic content (last
//!    attached first), children (post-order), held subscriptions, then all
//!    listener lists. After it returns, [`Widget::listener_count`] and
//!    [`Widget::binding_count`] are zero.
//! 3. Every mutating method on a closed widget returns
//!    [`WidgetError::Closed`].
//!
//! # Failure Modes
//!
//! - Unknown property or signal names for the kind are errors, not no-ops.
//! - Values that do not fit the declared [`PropType`] are rejected
//!   ([`WidgetError::InvalidValue`]).
//! - A second `close` returns [`WidgetError::AlreadyClosed`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use indexmap::IndexMap;
use weft_core::{Listeners, Params, Subscription, Value};

use crate::kind::{PropType, PropertySpec, WidgetKind};
use crate::sizing::Sizing;

/// Shared handle to a widget.
pub type WidgetRef = Rc<Widget>;

/// Global counter for unique widget IDs.
static WIDGET_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WidgetId(u64);

impl WidgetId {
    fn new() -> Self {
        Self(WIDGET_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Content owned by a widget that must be closed with it, such as the
/// mount living in a dynamic slot.
pub trait Closeable {
    fn close(&self);
}

/// Widget misuse.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetError {
    /// The widget was closed.
    Closed(WidgetId),
    /// A second close.
    AlreadyClosed(WidgetId),
    UnknownProperty { kind: String, property: String },
    InvalidValue {
        property: String,
        expected: PropType,
        found: &'static str,
    },
    /// The property cannot be changed by the user.
    NotEditable(String),
    /// The property is computed from other properties.
    Derived(String),
    UnknownSignal { kind: String, signal: String },
}

impl fmt::Display for WidgetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(id) => write!(f, "widget {id} is closed"),
            Self::AlreadyClosed(id) => write!(f, "widget {id} was already closed"),
            Self::UnknownProperty { kind, property } => {
                write!(f, "'{kind}' has no property '{property}'")
            }
            Self::InvalidValue {
                property,
                expected,
                found,
            } => write!(
                f,
                "property '{property}' expects {}, found {found}",
                expected.name()
            ),
            Self::NotEditable(property) => write!(f, "property '{property}' is not editable"),
            Self::Derived(property) => write!(f, "property '{property}' is derived"),
            Self::UnknownSignal { kind, signal } => write!(f, "'{kind}' has no signal '{signal}'"),
        }
    }
}

impl std::error::Error for WidgetError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Program,
    User,
}

type ListenerMap<T> = RefCell<AHashMap<String, Listeners<T>>>;

/// A live headless widget.
pub struct Widget {
    id: WidgetId,
    kind: WidgetKind,
    name: Option<String>,
    sizing: Cell<Sizing>,
    properties: RefCell<IndexMap<String, Value>>,
    children: RefCell<Vec<WidgetRef>>,
    parent: RefCell<Weak<Widget>>,
    updates: ListenerMap<Value>,
    edits: ListenerMap<Value>,
    signals: ListenerMap<Params>,
    owned: RefCell<Vec<Box<dyn Closeable>>>,
    held: RefCell<Vec<Subscription>>,
    closed: Cell<bool>,
}

impl Widget {
    /// A widget of `kind` with every property at its initial value.
    pub fn new(kind: WidgetKind) -> WidgetRef {
        Self::named(kind, None)
    }

    pub fn named(kind: WidgetKind, name: Option<String>) -> WidgetRef {
        let properties = kind
            .properties()
            .map(|spec| (spec.name.to_owned(), spec.initial.to_value()))
            .collect();
        Rc::new(Self {
            id: WidgetId::new(),
            kind,
            name,
            sizing: Cell::new(Sizing::default()),
            properties: RefCell::new(properties),
            children: RefCell::new(Vec::new()),
            parent: RefCell::new(Weak::new()),
            updates: RefCell::new(AHashMap::new()),
            edits: RefCell::new(AHashMap::new()),
            signals: RefCell::new(AHashMap::new()),
            owned: RefCell::new(Vec::new()),
            held: RefCell::new(Vec::new()),
            closed: Cell::new(false),
        })
    }

    // --- Identity ---

    #[must_use]
    pub const fn id(&self) -> WidgetId {
        self.id
    }

    #[must_use]
    pub const fn kind(&self) -> &WidgetKind {
        &self.kind
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn sizing(&self) -> Sizing {
        self.sizing.get()
    }

    pub fn set_sizing(&self, sizing: Sizing) {
        self.sizing.set(sizing);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    // --- Properties ---

    /// Current value of `property`, or `None` if the kind has no such
    /// property.
    #[must_use]
    pub fn get(&self, property: &str) -> Option<Value> {
        self.properties.borrow().get(property).cloned()
    }

    /// Declared spec of `property`.
    pub fn spec(&self, property: &str) -> Result<PropertySpec, WidgetError> {
        self.kind
            .property(property)
            .copied()
            .ok_or_else(|| WidgetError::UnknownProperty {
                kind: self.kind.name().to_owned(),
                property: property.to_owned(),
            })
    }

    /// Programmatic write. Fires update observers only.
    ///
    /// Returns `Ok(true)` if the value changed.
    pub fn set(&self, property: &str, value: impl Into<Value>) -> Result<bool, WidgetError> {
        self.write(property, value.into(), Origin::Program)
    }

    /// User change of an editable property. Fires update observers, edit
    /// listeners and the kind's change signals.
    pub fn edit(&self, property: &str, value: impl Into<Value>) -> Result<bool, WidgetError> {
        if !self.spec(property)?.is_editable() {
            return Err(WidgetError::NotEditable(property.to_owned()));
        }
        self.write(property, value.into(), Origin::User)
    }

    fn write(&self, property: &str, value: Value, origin: Origin) -> Result<bool, WidgetError> {
        self.ensure_open()?;
        let spec = self.spec(property)?;
        if spec.is_derived() {
            return Err(WidgetError::Derived(property.to_owned()));
        }
        let found = value.type_name();
        let value = spec
            .ty
            .coerce(value)
            .ok_or_else(|| WidgetError::InvalidValue {
                property: property.to_owned(),
                expected: spec.ty,
                found,
            })?;

        let mut changes = Vec::new();
        self.store(property, value, &mut changes);
        if changes.is_empty() {
            return Ok(false);
        }
        self.derive_linked(property, &mut changes);
        for (name, value) in &changes {
            self.notify(name, value, origin);
        }
        Ok(true)
    }

    fn store(&self, property: &str, value: Value, changes: &mut Vec<(String, Value)>) {
        let mut properties = self.properties.borrow_mut();
        let slot = properties.entry(property.to_owned()).or_default();
        if *slot != value {
            *slot = value.clone();
            changes.push((property.to_owned(), value));
        }
    }

    fn derive_linked(&self, property: &str, changes: &mut Vec<(String, Value)>) {
        match (&self.kind, property) {
            (WidgetKind::CheckBox, "checked") => {
                let checked = self.get("checked").and_then(|v| v.as_bool()).unwrap_or(false);
                let state = if checked { "checked" } else { "unchecked" };
                self.store("check_state", Value::from(state), changes);
            }
            (WidgetKind::CheckBox, "check_state") => {
                let checked = self
                    .get("check_state")
                    .is_some_and(|v| v.as_str() == Some("checked"));
                self.store("checked", Value::Bool(checked), changes);
            }
            (WidgetKind::RadioButton, "value" | "group_value") => {
                let value = self.get("value").unwrap_or_default();
                let group_value = self.get("group_value").unwrap_or_default();
                let checked = !value.is_null() && value == group_value;
                self.store("checked", Value::Bool(checked), changes);
            }
            (WidgetKind::ComboBox | WidgetKind::ListBox, "items" | "current_index") => {
                let item = {
                    let properties = self.properties.borrow();
                    let index = properties
                        .get("current_index")
                        .and_then(Value::as_int)
                        .and_then(|i| usize::try_from(i).ok());
                    let items = properties.get("items").and_then(Value::as_list);
                    match (items, index) {
                        (Some(items), Some(index)) => {
                            items.get(index).cloned().unwrap_or_default()
                        }
                        _ => Value::Null,
                    }
                };
                self.store("current_item", item, changes);
            }
            _ => {}
        }
    }

    fn notify(&self, property: &str, value: &Value, origin: Origin) {
        if let Some(listeners) = lookup(&self.updates, property) {
            listeners.notify(value);
        }
        if origin != Origin::User {
            return;
        }
        let editable = self.kind.property(property).is_some_and(PropertySpec::is_editable);
        if !editable {
            return;
        }
        if let Some(listeners) = lookup(&self.edits, property) {
            listeners.notify(value);
        }
        let signals: Vec<(&'static str, &'static [&'static str])> = self
            .kind
            .events_for_property(property)
            .map(|spec| (spec.name, spec.args))
            .collect();
        for (signal, args) in signals {
            let params: Params = args
                .iter()
                .map(|arg| ((*arg).to_owned(), value.clone()))
                .collect();
            if let Some(listeners) = lookup(&self.signals, signal) {
                listeners.notify(&params);
            }
        }
    }

    // --- Notification ---

    /// Observe every change of `property`, programmatic or user.
    pub fn observe(
        &self,
        property: &str,
        callback: impl Fn(&Value) + 'static,
    ) -> Result<Subscription, WidgetError> {
        self.ensure_open()?;
        self.spec(property)?;
        Ok(listeners_for(&self.updates, property).add(callback))
    }

    /// Observe user edits of an editable `property`.
    pub fn on_edit(
        &self,
        property: &str,
        callback: impl Fn(&Value) + 'static,
    ) -> Result<Subscription, WidgetError> {
        self.ensure_open()?;
        if !self.spec(property)?.is_editable() {
            return Err(WidgetError::NotEditable(property.to_owned()));
        }
        Ok(listeners_for(&self.edits, property).add(callback))
    }

    /// Listen for `signal`. The callback receives the named arguments.
    pub fn on_signal(
        &self,
        signal: &str,
        callback: impl Fn(&Params) + 'static,
    ) -> Result<Subscription, WidgetError> {
        self.ensure_open()?;
        self.check_signal(signal)?;
        Ok(listeners_for(&self.signals, signal).add(callback))
    }

    /// Raise `signal`. Declared arguments missing from `args` are filled
    /// from properties of the same name.
    pub fn emit_signal(&self, signal: &str, mut args: Params) -> Result<(), WidgetError> {
        self.ensure_open()?;
        self.check_signal(signal)?;
        if let Some(spec) = self.kind.event(signal) {
            for arg in spec.args {
                if !args.contains_key(*arg) {
                    if let Some(value) = self.get(arg) {
                        args.insert((*arg).to_owned(), value);
                    }
                }
            }
        }
        if let Some(listeners) = lookup(&self.signals, signal) {
            listeners.notify(&args);
        }
        Ok(())
    }

    /// Simulate a click: buttons emit `on_clicked`, check boxes toggle,
    /// radio buttons select their value.
    pub fn click(&self) -> Result<(), WidgetError> {
        match self.kind {
            WidgetKind::PushButton => self.emit_signal("on_clicked", Params::new()),
            WidgetKind::CheckBox => {
                let checked = self.get("checked").and_then(|v| v.as_bool()).unwrap_or(false);
                self.edit("checked", !checked).map(|_| ())
            }
            WidgetKind::RadioButton => {
                let value = self.get("value").unwrap_or_default();
                self.edit("group_value", value)?;
                self.emit_signal("on_clicked", Params::new())
            }
            _ => Err(WidgetError::UnknownSignal {
                kind: self.kind.name().to_owned(),
                signal: "on_clicked".to_owned(),
            }),
        }
    }

    fn check_signal(&self, signal: &str) -> Result<(), WidgetError> {
        if self.kind.forwards_events() || self.kind.event(signal).is_some() {
            return Ok(());
        }
        Err(WidgetError::UnknownSignal {
            kind: self.kind.name().to_owned(),
            signal: signal.to_owned(),
        })
    }

    /// Live listeners across all notification lists.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        [&self.updates, &self.edits]
            .iter()
            .map(|map| map.borrow().values().map(Listeners::len).sum::<usize>())
            .sum::<usize>()
            + self
                .signals
                .borrow()
                .values()
                .map(Listeners::len)
                .sum::<usize>()
    }

    // --- Ownership ---

    /// Keep `subscription` alive until the widget closes.
    pub fn hold(&self, subscription: Subscription) {
        if self.closed.get() {
            return;
        }
        self.held.borrow_mut().push(subscription);
    }

    /// Number of subscriptions held for bindings and event wiring.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.held.borrow().len()
    }

    /// Close `content` when this widget closes. Content attached to an
    /// already closed widget is closed immediately.
    pub fn own(&self, content: Box<dyn Closeable>) {
        if self.closed.get() {
            content.close();
            return;
        }
        self.owned.borrow_mut().push(content);
    }

    #[must_use]
    pub fn owned_count(&self) -> usize {
        self.owned.borrow().len()
    }

    // --- Children ---

    pub fn add_child(self: &Rc<Self>, child: WidgetRef) {
        *child.parent.borrow_mut() = Rc::downgrade(self);
        self.children.borrow_mut().push(child);
    }

    /// Insert `child` before `index` (clamped to the child count).
    pub fn insert_child(self: &Rc<Self>, index: usize, child: WidgetRef) {
        *child.parent.borrow_mut() = Rc::downgrade(self);
        let mut children = self.children.borrow_mut();
        let index = index.min(children.len());
        children.insert(index, child);
    }

    /// Detach `child` without closing it.
    pub fn remove_child(&self, child: &WidgetRef) -> Option<WidgetRef> {
        let mut children = self.children.borrow_mut();
        let position = children.iter().position(|c| Rc::ptr_eq(c, child))?;
        let removed = children.remove(position);
        *removed.parent.borrow_mut() = Weak::new();
        Some(removed)
    }

    /// Snapshot of the children.
    #[must_use]
    pub fn children(&self) -> Vec<WidgetRef> {
        self.children.borrow().clone()
    }

    #[must_use]
    pub fn child(&self, index: usize) -> Option<WidgetRef> {
        self.children.borrow().get(index).cloned()
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.borrow().len()
    }

    #[must_use]
    pub fn parent(&self) -> Option<WidgetRef> {
        self.parent.borrow().upgrade()
    }

    /// Depth-first search for a widget named `name`, starting with `self`.
    #[must_use]
    pub fn find(self: &Rc<Self>, name: &str) -> Option<WidgetRef> {
        if self.name() == Some(name) {
            return Some(Rc::clone(self));
        }
        self.children().iter().find_map(|child| child.find(name))
    }

    // --- Teardown ---

    /// Close the widget and everything it owns.
    pub fn close(&self) -> Result<(), WidgetError> {
        if self.closed.replace(true) {
            return Err(WidgetError::AlreadyClosed(self.id));
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(widget = %self.id, kind = %self.kind, "close");

        let owned = std::mem::take(&mut *self.owned.borrow_mut());
        for content in owned.into_iter().rev() {
            content.close();
        }
        let children = std::mem::take(&mut *self.children.borrow_mut());
        for child in &children {
            let _ = child.close();
        }
        let held = std::mem::take(&mut *self.held.borrow_mut());
        drop(held);
        for map in [&self.updates, &self.edits] {
            let lists: Vec<_> = map.borrow_mut().drain().map(|(_, l)| l).collect();
            lists.iter().for_each(Listeners::clear);
        }
        let lists: Vec<_> = self.signals.borrow_mut().drain().map(|(_, l)| l).collect();
        lists.iter().for_each(Listeners::clear);
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), WidgetError> {
        if self.closed.get() {
            Err(WidgetError::Closed(self.id))
        } else {
            Ok(())
        }
    }
}

fn lookup<T: ?Sized + 'static>(
    map: &RefCell<AHashMap<String, Listeners<T>>>,
    key: &str,
) -> Option<Listeners<T>> {
    map.borrow().get(key).cloned()
}

fn listeners_for<T: ?Sized + 'static>(
    map: &RefCell<AHashMap<String, Listeners<T>>>,
    key: &str,
) -> Listeners<T> {
    map.borrow_mut().entry(key.to_owned()).or_default().clone()
}

impl fmt::Debug for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Widget")
            .field("id", &self.id)
            .field("kind", &self.kind.name())
            .field("name", &self.name)
            .field("children", &self.children.borrow().len())
            .field("closed", &self.closed.get())
            .finish()
    }
}
