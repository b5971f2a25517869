#![forbid(unsafe_code)]

//! Observable models that handlers expose to bindings.
//!
//! - [`PropertyModel`]: one observable value under the property name `value`.
//! - [`ObjectModel`]: a bag of named observable properties plus child members.
//! - [`ListModel`]: an observable ordered sequence with insert/remove events.
//!
//! Models are reached from a handler through [`Member`]s and read/written
//! through the [`Observed`] trait. Bindings keep `Weak` references to the
//! models they observe; models never own bindings.
//!
//! # Invariants
//!
//! 1. Mutation is by value replacement; a subscriber never sees a partially
//!    updated value.
//! 2. Writing a value equal to the current one is a no-op.
//! 3. `subscriber_count()` reports exactly the number of live subscriptions,
//!    so a closed tree can be checked for leaked bindings.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use crate::observable::{Listeners, Observable, Subscription};
use crate::value::Value;

/// Errors from writing to a model property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyError {
    /// The object has no property with this name.
    UnknownProperty(String),
    /// The property exists but cannot be written.
    ReadOnly(String),
}

impl fmt::Display for PropertyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownProperty(name) => write!(f, "unknown property '{name}'"),
            Self::ReadOnly(name) => write!(f, "property '{name}' is read-only"),
        }
    }
}

impl std::error::Error for PropertyError {}

/// An object whose named properties can be read, written and observed.
pub trait Observed {
    /// Current value of `property`, or `None` if the object has no such
    /// property.
    fn get_property(&self, property: &str) -> Option<Value>;

    /// Replace the value of `property`.
    fn set_property(&self, property: &str, value: Value) -> Result<(), PropertyError>;

    /// Observe changes of `property`.
    ///
    /// Returns `None` when the property exists but has no change
    /// notification; bindings then degrade to one-shot initialization.
    fn observe_property(&self, property: &str, callback: Rc<dyn Fn(&Value)>)
        -> Option<Subscription>;

    /// Child member reachable by `name`, for dotted paths.
    fn member(&self, name: &str) -> Option<Member> {
        let _ = name;
        None
    }
}

/// Something a handler or an observed object exposes by name.
#[derive(Clone)]
pub enum Member {
    /// An object with observable properties.
    Object(Rc<dyn Observed>),
    /// An observable list.
    List(Rc<ListModel>),
    /// A bare value with no change notification.
    Value(Value),
}

impl Member {
    /// Convenience constructor from any observed object.
    pub fn object(object: Rc<impl Observed + 'static>) -> Self {
        Self::Object(object)
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Object(_) => "object",
            Self::List(_) => "list",
            Self::Value(_) => "value",
        }
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(_) => f.write_str("Member::Object(..)"),
            Self::List(list) => f.debug_tuple("Member::List").field(&list.len()).finish(),
            Self::Value(v) => f.debug_tuple("Member::Value").field(v).finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// PropertyModel
// ---------------------------------------------------------------------------

/// Holds one value which can be observed for changes.
///
/// Exposed to bindings as the property `value`, so a handler member named
/// `enabled_model` is bound with `@binding(enabled_model.value)`.
#[derive(Clone)]
pub struct PropertyModel {
    value: Observable<Value>,
}

impl PropertyModel {
    /// Property name under which the value is observed.
    pub const VALUE: &'static str = "value";

    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: Observable::new(value.into()),
        }
    }

    /// Shared handle, the usual way a handler stores a model.
    pub fn shared(value: impl Into<Value>) -> Rc<Self> {
        Rc::new(Self::new(value))
    }

    #[must_use]
    pub fn value(&self) -> Value {
        self.value.get()
    }

    /// Replace the value; returns `true` when subscribers were notified.
    pub fn set_value(&self, value: impl Into<Value>) -> bool {
        self.value.set(value.into())
    }

    pub fn subscribe(&self, callback: impl Fn(&Value) + 'static) -> Subscription {
        self.value.subscribe(callback)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.value.subscriber_count()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.value.version()
    }
}

impl Observed for PropertyModel {
    fn get_property(&self, property: &str) -> Option<Value> {
        (property == Self::VALUE).then(|| self.value())
    }

    fn set_property(&self, property: &str, value: Value) -> Result<(), PropertyError> {
        if property != Self::VALUE {
            return Err(PropertyError::UnknownProperty(property.to_owned()));
        }
        self.value.set(value);
        Ok(())
    }

    fn observe_property(
        &self,
        property: &str,
        callback: Rc<dyn Fn(&Value)>,
    ) -> Option<Subscription> {
        (property == Self::VALUE).then(|| self.value.subscribe(move |v| callback(v)))
    }
}

impl fmt::Debug for PropertyModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyModel")
            .field("value", &self.value())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ObjectModel
// ---------------------------------------------------------------------------

/// A bag of named observable properties and child members.
///
/// Properties registered with [`ObjectModel::define_constant`] are readable
/// but have no change notification and reject writes.
#[derive(Default)]
pub struct ObjectModel {
    properties: RefCell<AHashMap<String, Observable<Value>>>,
    constants: RefCell<AHashMap<String, Value>>,
    members: RefCell<AHashMap<String, Member>>,
}

impl ObjectModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`ObjectModel::define`].
    #[must_use]
    pub fn with_property(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.define(name, value);
        self
    }

    /// Builder form of [`ObjectModel::insert_member`].
    #[must_use]
    pub fn with_member(self, name: impl Into<String>, member: Member) -> Self {
        self.insert_member(name, member);
        self
    }

    /// Define (or redefine) an observable property.
    pub fn define(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties
            .borrow_mut()
            .insert(name.into(), Observable::new(value.into()));
    }

    /// Define a read-only property without change notification.
    pub fn define_constant(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.constants.borrow_mut().insert(name.into(), value.into());
    }

    pub fn insert_member(&self, name: impl Into<String>, member: Member) {
        self.members.borrow_mut().insert(name.into(), member);
    }

    /// Set a property; returns `Ok(true)` when subscribers were notified.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<bool, PropertyError> {
        let observable = self.observable(name)?;
        Ok(observable.set(value.into()))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.get_property(name)
    }

    /// Live subscribers across all properties.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.properties
            .borrow()
            .values()
            .map(Observable::subscriber_count)
            .sum()
    }

    fn observable(&self, name: &str) -> Result<Observable<Value>, PropertyError> {
        if let Some(observable) = self.properties.borrow().get(name) {
            return Ok(observable.clone());
        }
        if self.constants.borrow().contains_key(name) {
            return Err(PropertyError::ReadOnly(name.to_owned()));
        }
        Err(PropertyError::UnknownProperty(name.to_owned()))
    }
}

impl Observed for ObjectModel {
    fn get_property(&self, property: &str) -> Option<Value> {
        if let Some(observable) = self.properties.borrow().get(property) {
            return Some(observable.get());
        }
        self.constants.borrow().get(property).cloned()
    }

    fn set_property(&self, property: &str, value: Value) -> Result<(), PropertyError> {
        self.set(property, value).map(|_| ())
    }

    fn observe_property(
        &self,
        property: &str,
        callback: Rc<dyn Fn(&Value)>,
    ) -> Option<Subscription> {
        let observable = self.properties.borrow().get(property).cloned()?;
        Some(observable.subscribe(move |v| callback(v)))
    }

    fn member(&self, name: &str) -> Option<Member> {
        self.members.borrow().get(name).cloned()
    }
}

impl fmt::Debug for ObjectModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectModel")
            .field("properties", &self.properties.borrow().len())
            .field("members", &self.members.borrow().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ListModel
// ---------------------------------------------------------------------------

/// A change to a [`ListModel`].
#[derive(Debug, Clone, PartialEq)]
pub enum ListChange {
    /// `value` was inserted before `index`.
    Inserted { index: usize, value: Value },
    /// `value` was removed from `index`.
    Removed { index: usize, value: Value },
}

/// An observable ordered sequence of values.
#[derive(Default)]
pub struct ListModel {
    items: RefCell<Vec<Value>>,
    listeners: Listeners<ListChange>,
}

impl ListModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self {
            items: RefCell::new(items.into_iter().map(Into::into).collect()),
            listeners: Listeners::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the items.
    #[must_use]
    pub fn items(&self) -> Vec<Value> {
        self.items.borrow().clone()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.borrow().get(index).cloned()
    }

    /// Insert `value` before `index` (clamped to the length).
    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        let value = value.into();
        let index = {
            let mut items = self.items.borrow_mut();
            let index = index.min(items.len());
            items.insert(index, value.clone());
            index
        };
        self.listeners.notify(&ListChange::Inserted { index, value });
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.insert(usize::MAX, value);
    }

    /// Remove and return the item at `index`, if any.
    pub fn remove(&self, index: usize) -> Option<Value> {
        let value = {
            let mut items = self.items.borrow_mut();
            if index >= items.len() {
                return None;
            }
            items.remove(index)
        };
        self.listeners.notify(&ListChange::Removed {
            index,
            value: value.clone(),
        });
        Some(value)
    }

    pub fn subscribe(&self, callback: impl Fn(&ListChange) + 'static) -> Subscription {
        self.listeners.add(callback)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }
}

impl fmt::Debug for ListModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListModel")
            .field("items", &self.items.borrow())
            .field("subscribers", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn property_model_exposes_value() {
        let model = PropertyModel::new(false);
        assert_eq!(model.get_property("value"), Some(Value::Bool(false)));
        assert_eq!(model.get_property("other"), None);
        assert!(model.set_property("other", Value::Null).is_err());
        model.set_property("value", Value::Bool(true)).unwrap();
        assert_eq!(model.value(), Value::Bool(true));
    }

    #[test]
    fn property_model_observe_counts_subscribers() {
        let model = PropertyModel::new(1);
        let seen = Rc::new(Cell::new(0));
        let s = Rc::clone(&seen);
        let sub = model
            .observe_property("value", Rc::new(move |v| s.set(v.as_int().unwrap())))
            .unwrap();
        assert_eq!(model.subscriber_count(), 1);
        model.set_value(7);
        assert_eq!(seen.get(), 7);
        drop(sub);
        assert_eq!(model.subscriber_count(), 0);
    }

    #[test]
    fn object_model_constants_do_not_notify() {
        let object = ObjectModel::new().with_property("title", "a");
        object.define_constant("version", 3);
        assert!(object.observe_property("version", Rc::new(|_| {})).is_none());
        assert_eq!(
            object.set_property("version", Value::Int(4)),
            Err(PropertyError::ReadOnly("version".into()))
        );
        assert_eq!(object.set("title", "b"), Ok(true));
        assert_eq!(object.get("title"), Some(Value::from("b")));
    }

    #[test]
    fn object_model_members() {
        let inner = PropertyModel::shared(0);
        let object = ObjectModel::new().with_member("count", Member::object(inner));
        assert!(matches!(object.member("count"), Some(Member::Object(_))));
        assert!(object.member("missing").is_none());
    }

    #[test]
    fn list_model_notifies_insert_and_remove() {
        let list = ListModel::from_items(["a", "b"]);
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let _sub = list.subscribe(move |change| l.borrow_mut().push(change.clone()));

        list.insert(1, "x");
        list.push("z");
        assert_eq!(list.remove(0), Some(Value::from("a")));
        assert_eq!(list.remove(10), None);

        assert_eq!(
            *log.borrow(),
            vec![
                ListChange::Inserted { index: 1, value: "x".into() },
                ListChange::Inserted { index: 3, value: "z".into() },
                ListChange::Removed { index: 0, value: "a".into() },
            ]
        );
        assert_eq!(list.items(), vec![Value::from("x"), "b".into(), "z".into()]);
    }
}
