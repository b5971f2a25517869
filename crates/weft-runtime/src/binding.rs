#![forbid(unsafe_code)]

//! The binding engine.
//!
//! [`bind`] pairs one widget property with one property reachable from a
//! handler through a dotted path (`model.value`, `settings.display.title`).
//! The resulting [`Binding`] holds the subscriptions of both directions.
//!
//! # Invariants
//!
//! 1. A binding holds weak references to its model and its widget; it never
//!    keeps either alive.
//! 2. A re-entrancy guard is set for the duration of every write, so a write
//!    caused by a notification never re-enters the same binding. The guard is
//!    cleared even when the write panics.
//! 3. Model to widget writes are programmatic ([`Widget::set`]); they never
//!    fire the widget's edit listeners or change signals.
//! 4. Nothing is pushed into a closed widget.
//!
//! # Failure Modes
//!
//! | Failure | When | Effect |
//! |---------|------|--------|
//! | unresolved path, non-object segment, non-value target | bind time | [`BindingResolutionError`] |
//! | unknown converter | bind time | [`BindingResolutionError::UnknownConverter`] |
//! | converter error | propagation | `warn!`, that propagation is dropped |
//! | model rejects the write | propagation | `warn!`, the model keeps its value |
//!
//! [`Widget::set`]: weft_widgets::Widget::set

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};
use weft_core::{
    BindingExpr, Converter, ConverterRegistry, ListModel, Member, Observed, Subscription, Value,
};
use weft_widgets::{Widget, WidgetError, WidgetRef};

use crate::error::BindingResolutionError;
use crate::handler::HandlerRef;

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

/// What a binding path names.
#[derive(Clone)]
pub enum Target {
    /// An observable property of an object.
    Property {
        owner: Rc<dyn Observed>,
        property: String,
    },
    /// An object member; not bindable to a property.
    Object(Rc<dyn Observed>),
    /// A plain value without change notification.
    Value(Value),
    List(Rc<ListModel>),
}

impl Target {
    fn from_member(member: Member) -> Self {
        match member {
            Member::Object(object) => Self::Object(object),
            Member::List(list) => Self::List(list),
            Member::Value(value) => Self::Value(value),
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property { property, .. } => {
                f.debug_struct("Property").field("property", property).finish()
            }
            Self::Object(_) => f.write_str("Object(..)"),
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::List(list) => f.debug_tuple("List").field(&list.len()).finish(),
        }
    }
}

/// Resolve a dotted `path` against `handler`.
///
/// A single segment is looked up on the handler's observed object first,
/// then among its members. In a dotted path the first segment is a member,
/// every middle segment must be an object member, and the last segment is
/// a property of the object it reaches (or failing that, a member).
pub fn resolve_path(handler: &HandlerRef, path: &str) -> Result<Target, BindingResolutionError> {
    let handler = handler
        .try_borrow()
        .map_err(|_| BindingResolutionError::HandlerBusy)?;
    let unresolved = |segment: &str| BindingResolutionError::UnresolvedPath {
        path: path.to_owned(),
        segment: segment.to_owned(),
    };
    let segments: Vec<&str> = path.split('.').collect();
    let Some((first, rest)) = segments.split_first() else {
        return Err(unresolved(path));
    };

    let Some((last, middle)) = rest.split_last() else {
        if let Some(observed) = handler.observed() {
            if observed.get_property(first).is_some() {
                return Ok(Target::Property {
                    owner: observed,
                    property: (*first).to_owned(),
                });
            }
        }
        return handler
            .member(first)
            .map(Target::from_member)
            .ok_or_else(|| unresolved(*first));
    };

    let head = handler
        .member(first)
        .or_else(|| handler.observed().and_then(|o| o.member(first)));
    let mut current = object_member(path, first, head)?;
    for segment in middle {
        current = object_member(path, segment, current.member(segment))?;
    }
    if current.get_property(last).is_some() {
        return Ok(Target::Property {
            owner: current,
            property: (*last).to_owned(),
        });
    }
    current
        .member(last)
        .map(Target::from_member)
        .ok_or_else(|| unresolved(*last))
}

fn object_member(
    path: &str,
    segment: &str,
    member: Option<Member>,
) -> Result<Rc<dyn Observed>, BindingResolutionError> {
    match member {
        Some(Member::Object(object)) => Ok(object),
        Some(_) => Err(BindingResolutionError::NotAnObject {
            path: path.to_owned(),
            segment: segment.to_owned(),
        }),
        None => Err(BindingResolutionError::UnresolvedPath {
            path: path.to_owned(),
            segment: segment.to_owned(),
        }),
    }
}

/// Read the value `path` names once, without subscribing.
pub fn read_reference(handler: &HandlerRef, path: &str) -> Result<Value, BindingResolutionError> {
    match resolve_path(handler, path)? {
        Target::Property { owner, property } => {
            Ok(owner.get_property(&property).unwrap_or_default())
        }
        Target::Value(value) => Ok(value),
        Target::List(list) => Ok(Value::List(list.items())),
        Target::Object(_) => Err(BindingResolutionError::NotAValue {
            path: path.to_owned(),
        }),
    }
}

/// Converter `name`, from the handler first, then the registry.
pub fn lookup_converter(
    handler: &HandlerRef,
    name: &str,
) -> Result<Rc<dyn Converter>, BindingResolutionError> {
    handler
        .try_borrow()
        .ok()
        .and_then(|h| h.converter(name))
        .or_else(|| ConverterRegistry::get(name))
        .ok_or_else(|| BindingResolutionError::UnknownConverter(name.to_owned()))
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// How values flow through a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The widget was initialized once; the source cannot be observed.
    OneShot,
    /// Model changes reach the widget.
    OneWay,
    /// Model changes reach the widget and user edits reach the model.
    TwoWay,
}

/// A live pairing of a model property and a widget property.
///
/// Dropping the binding unsubscribes both directions.
#[must_use = "dropping a Binding disconnects it"]
pub struct Binding {
    direction: Direction,
    subscriptions: Vec<Subscription>,
}

impl Binding {
    fn one_shot() -> Self {
        Self {
            direction: Direction::OneShot,
            subscriptions: Vec::new(),
        }
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Fold the binding into one subscription, for [`Widget::hold`].
    pub fn into_subscription(self) -> Subscription {
        if self.subscriptions.is_empty() {
            return Subscription::empty();
        }
        let subscriptions = self.subscriptions;
        Subscription::new(move || drop(subscriptions))
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("direction", &self.direction)
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

/// Bind `property` of `widget` to the property `expr` names on `handler`.
///
/// The widget receives the current model value before this returns.
pub fn bind(
    widget: &WidgetRef,
    property: &str,
    expr: &BindingExpr,
    handler: &HandlerRef,
) -> Result<Binding, BindingResolutionError> {
    let spec = widget.spec(property)?;
    if spec.is_derived() {
        return Err(WidgetError::Derived(property.to_owned()).into());
    }
    let converter = expr
        .converter()
        .map(|name| lookup_converter(handler, name))
        .transpose()?;
    let path: Rc<str> = Rc::from(expr.path());

    let binding = match resolve_path(handler, expr.path())? {
        Target::Object(_) => {
            return Err(BindingResolutionError::NotAValue {
                path: path.to_string(),
            });
        }
        Target::Value(value) => {
            push(widget, property, &value, converter.as_deref(), &path)?;
            Binding::one_shot()
        }
        Target::List(list) => bind_list(widget, property, &list, &path)?,
        Target::Property {
            owner,
            property: source,
        } => {
            let initial = owner.get_property(&source).unwrap_or_default();
            push(widget, property, &initial, converter.as_deref(), &path)?;
            let editable = spec.is_editable();
            bind_property(widget, property, editable, &owner, source, converter, path.clone())?
        }
    };
    debug!(
        widget = %widget.id(),
        property,
        path = %path,
        direction = ?binding.direction,
        "binding created"
    );
    Ok(binding)
}

/// Holds a binding's re-entrancy flag for one write and clears it on drop,
/// including when the write unwinds.
struct WriteGuard<'a>(&'a Cell<bool>);

impl<'a> WriteGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

fn bind_property(
    widget: &WidgetRef,
    property: &str,
    editable: bool,
    owner: &Rc<dyn Observed>,
    source: String,
    converter: Option<Rc<dyn Converter>>,
    path: Rc<str>,
) -> Result<Binding, BindingResolutionError> {
    let guard = Rc::new(Cell::new(false));
    let target: Rc<str> = Rc::from(property);

    let forward: Rc<dyn Fn(&Value)> = {
        let guard = Rc::clone(&guard);
        let widget: Weak<Widget> = Rc::downgrade(widget);
        let target = Rc::clone(&target);
        let converter = converter.clone();
        let path = Rc::clone(&path);
        Rc::new(move |value: &Value| {
            if guard.get() {
                return;
            }
            let Some(widget) = widget.upgrade() else {
                return;
            };
            if widget.is_closed() {
                return;
            }
            let _writing = WriteGuard::enter(&guard);
            if let Err(e) = push(&widget, &target, value, converter.as_deref(), &path) {
                warn!(widget = %widget.id(), path = %path, error = %e, "dropping model update");
            }
        })
    };
    let Some(forward) = owner.observe_property(&source, forward) else {
        return Ok(Binding::one_shot());
    };
    let mut binding = Binding {
        direction: Direction::OneWay,
        subscriptions: vec![forward],
    };
    if !editable {
        return Ok(binding);
    }

    let owner: Weak<dyn Observed> = Rc::downgrade(owner);
    let back = widget.on_edit(property, move |value: &Value| {
        if guard.get() {
            return;
        }
        let Some(owner) = owner.upgrade() else {
            return;
        };
        let value = match &converter {
            Some(converter) => match converter.convert_back(value) {
                Ok(value) => value,
                Err(e) => {
                    warn!(path = %path, error = %e, "dropping widget edit");
                    return;
                }
            },
            None => value.clone(),
        };
        let _writing = WriteGuard::enter(&guard);
        if let Err(e) = owner.set_property(&source, value) {
            warn!(path = %path, error = %e, "model rejected widget edit");
        }
    })?;
    binding.subscriptions.push(back);
    binding.direction = Direction::TwoWay;
    Ok(binding)
}

fn bind_list(
    widget: &WidgetRef,
    property: &str,
    list: &Rc<ListModel>,
    path: &Rc<str>,
) -> Result<Binding, BindingResolutionError> {
    widget.set(property, Value::List(list.items()))?;
    let weak_widget = Rc::downgrade(widget);
    let weak_list = Rc::downgrade(list);
    let target = property.to_owned();
    let path = Rc::clone(path);
    let subscription = list.subscribe(move |_| {
        let (Some(widget), Some(list)) = (weak_widget.upgrade(), weak_list.upgrade()) else {
            return;
        };
        if widget.is_closed() {
            return;
        }
        if let Err(e) = widget.set(&target, Value::List(list.items())) {
            warn!(widget = %widget.id(), path = %path, error = %e, "dropping list update");
        }
    });
    Ok(Binding {
        direction: Direction::OneWay,
        subscriptions: vec![subscription],
    })
}

/// Convert `value` for the widget and write it. Converter errors are logged
/// and swallowed; widget errors are returned.
fn push(
    widget: &Widget,
    property: &str,
    value: &Value,
    converter: Option<&dyn Converter>,
    path: &str,
) -> Result<(), WidgetError> {
    let converted = match converter {
        Some(converter) => match converter.convert(value) {
            Ok(converted) => converted,
            Err(e) => {
                warn!(widget = %widget.id(), path, error = %e, "converter failed");
                return Ok(());
            }
        },
        None => value.clone(),
    };
    widget.set(property, converted).map(|_| ())
}
