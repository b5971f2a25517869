#![forbid(unsafe_code)]

//! Serializable descriptions of UI trees.
//!
//! A [`Description`] is one node: a widget type, its properties, its ordered
//! children, an optional name under which the realized widget is handed to
//! the handler, and an event map from widget event to handler method.
//! Window and dialog roots may also carry component `resources`.
//!
//! Property values are either literals or binding expressions of the form
//! `@binding(path[, converter=name])`, see [`BindingExpr`].
//!
//! # Serialized form
//!
//! ```json
//! {
//!   "type": "column",
//!   "children": [
//!     {"type": "check_box", "name": "cb", "text": "Enabled",
//!      "checked": "@binding(enabled_model.value)",
//!      "events": {"on_checked_changed": "enabled_changed"}}
//!   ]
//! }
//! ```
//!
//! # Invariants
//!
//! 1. Descriptions are immutable once constructed: fields are private and
//!    every `with_*` method consumes and returns the node.
//! 2. One property key holds exactly one value. Supplying a literal and a
//!    binding for the same key is [`DescriptionError::ConflictingProperty`],
//!    both in [`DescriptionBuilder`] and when deserializing duplicate keys.
//! 3. Serializing then deserializing yields an equal description.

use std::fmt;

use indexmap::IndexMap;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::value::Value;

const BINDING_PREFIX: &str = "@binding(";

/// Errors raised for malformed descriptions.
#[derive(Debug, Clone, PartialEq)]
pub enum DescriptionError {
    /// The node type is not a known widget kind.
    UnknownType(String),
    /// The kind has no such property.
    UnknownProperty { kind: String, property: String },
    /// The kind has no such event.
    UnknownEvent { kind: String, event: String },
    /// A property was given both a literal and a binding (or twice).
    ConflictingProperty(String),
    /// A `@binding(...)` expression could not be parsed.
    InvalidBinding { expression: String, reason: String },
    /// A property has a value of the wrong type.
    InvalidValue { property: String, expected: &'static str, found: String },
    /// A node has the wrong number or type of children.
    InvalidChildren { kind: String, reason: String },
    /// The serialized form could not be parsed.
    Parse(String),
}

impl fmt::Display for DescriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownType(kind) => write!(f, "unknown widget type '{kind}'"),
            Self::UnknownProperty { kind, property } => {
                write!(f, "'{kind}' has no property '{property}'")
            }
            Self::UnknownEvent { kind, event } => write!(f, "'{kind}' has no event '{event}'"),
            Self::ConflictingProperty(property) => {
                write!(f, "property '{property}' is given more than one value")
            }
            Self::InvalidBinding { expression, reason } => {
                write!(f, "invalid binding '{expression}': {reason}")
            }
            Self::InvalidValue {
                property,
                expected,
                found,
            } => write!(f, "property '{property}' expects {expected}, found {found}"),
            Self::InvalidChildren { kind, reason } => write!(f, "'{kind}' {reason}"),
            Self::Parse(msg) => write!(f, "parse error: {msg}"),
        }
    }
}

impl std::error::Error for DescriptionError {}

// ---------------------------------------------------------------------------
// BindingExpr
// ---------------------------------------------------------------------------

/// A parsed `@binding(path[, converter=name])` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingExpr {
    path: String,
    converter: Option<String>,
}

impl BindingExpr {
    /// Build an expression directly from its parts.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            converter: None,
        }
    }

    #[must_use]
    pub fn with_converter(mut self, converter: impl Into<String>) -> Self {
        self.converter = Some(converter.into());
        self
    }

    /// Whether `text` uses the binding syntax at all.
    #[must_use]
    pub fn is_binding(text: &str) -> bool {
        text.trim_start().starts_with(BINDING_PREFIX)
    }

    /// Parse the `@binding(...)` form.
    pub fn parse(text: &str) -> Result<Self, DescriptionError> {
        let invalid = |reason: &str| DescriptionError::InvalidBinding {
            expression: text.to_owned(),
            reason: reason.to_owned(),
        };
        let body = text
            .trim()
            .strip_prefix(BINDING_PREFIX)
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| invalid("expected @binding(path[, converter=name])"))?;
        let mut parts = body.split(',').map(str::trim);
        let path = parts.next().unwrap_or_default();
        if path.is_empty() {
            return Err(invalid("empty path"));
        }
        if path.split('.').any(|segment| segment.trim().is_empty()) {
            return Err(invalid("empty path segment"));
        }
        let path = path
            .split('.')
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(".");
        let mut converter = None;
        for part in parts {
            let Some(name) = part.strip_prefix("converter=") else {
                return Err(invalid(&format!("unknown option '{part}'")));
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(invalid("empty converter name"));
            }
            if converter.replace(name.to_owned()).is_some() {
                return Err(invalid("converter given twice"));
            }
        }
        Ok(Self { path, converter })
    }

    /// Dotted owner path plus property, e.g. `enabled_model.value`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('.')
    }

    #[must_use]
    pub fn converter(&self) -> Option<&str> {
        self.converter.as_deref()
    }
}

impl fmt::Display for BindingExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.converter {
            Some(c) => write!(f, "{BINDING_PREFIX}{}, converter={c})", self.path),
            None => write!(f, "{BINDING_PREFIX}{})", self.path),
        }
    }
}

/// The interpretation of one property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Literal(Value),
    Binding(BindingExpr),
}

impl PropertyValue {
    /// Classify a raw property value.
    pub fn from_value(value: &Value) -> Result<Self, DescriptionError> {
        match value {
            Value::Str(s) if BindingExpr::is_binding(s) => BindingExpr::parse(s).map(Self::Binding),
            other => Ok(Self::Literal(other.clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// Description
// ---------------------------------------------------------------------------

/// One node of a UI description.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Description {
    #[serde(rename = "type")]
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(flatten)]
    properties: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    events: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<Description>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    resources: IndexMap<String, Description>,
}

const RESERVED_KEYS: [&str; 5] = ["type", "name", "events", "children", "resources"];

impl Description {
    /// A node of the given type with nothing else set.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: None,
            properties: IndexMap::new(),
            events: IndexMap::new(),
            children: Vec::new(),
            resources: IndexMap::new(),
        }
    }

    /// Start a fallible builder that rejects conflicting properties.
    pub fn builder(kind: impl Into<String>) -> DescriptionBuilder {
        DescriptionBuilder::new(kind)
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set a property value, replacing any previous one. Use
    /// [`DescriptionBuilder`] to have duplicates rejected instead.
    ///
    /// # Panics
    ///
    /// If `key` is one of the structural keys (`type`, `name`, `events`,
    /// `children`, `resources`); such a property could not round-trip.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        assert!(
            !RESERVED_KEYS.contains(&key.as_str()),
            "'{key}' is a reserved description key"
        );
        self.properties.insert(key, value.into());
        self
    }

    /// Set a property to a binding expression.
    #[must_use]
    pub fn with_binding(self, key: impl Into<String>, expr: &BindingExpr) -> Self {
        self.with_property(key, expr.to_string())
    }

    #[must_use]
    pub fn with_event(mut self, event: impl Into<String>, method: impl Into<String>) -> Self {
        self.events.insert(event.into(), method.into());
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: Description) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn with_children(mut self, children: impl IntoIterator<Item = Description>) -> Self {
        self.children.extend(children);
        self
    }

    #[must_use]
    pub fn with_resource(mut self, id: impl Into<String>, resource: Description) -> Self {
        self.resources.insert(id.into(), resource);
        self
    }

    // --- Accessors ---

    /// The widget type name.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Raw property value.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Classified property value.
    pub fn property_value(&self, key: &str) -> Result<Option<PropertyValue>, DescriptionError> {
        self.properties
            .get(key)
            .map(PropertyValue::from_value)
            .transpose()
    }

    /// String property, or `None` when absent or not a string.
    #[must_use]
    pub fn str_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn events(&self) -> impl Iterator<Item = (&str, &str)> {
        self.events.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn event(&self, event: &str) -> Option<&str> {
        self.events.get(event).map(String::as_str)
    }

    #[must_use]
    pub fn children(&self) -> &[Description] {
        &self.children
    }

    #[must_use]
    pub fn resources(&self) -> &IndexMap<String, Description> {
        &self.resources
    }

    // --- Serialized form ---

    pub fn from_json(text: &str) -> Result<Self, DescriptionError> {
        serde_json::from_str(text).map_err(|e| DescriptionError::Parse(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, DescriptionError> {
        serde_json::to_string(self).map_err(|e| DescriptionError::Parse(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String, DescriptionError> {
        serde_json::to_string_pretty(self).map_err(|e| DescriptionError::Parse(e.to_string()))
    }

    /// Number of nodes in this subtree, resources excluded.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Self::node_count).sum::<usize>()
    }
}

impl<'de> Deserialize<'de> for Description {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(DescriptionVisitor)
    }
}

struct DescriptionVisitor;

impl<'de> Visitor<'de> for DescriptionVisitor {
    type Value = Description;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a UI description object with a \"type\" key")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Description, A::Error> {
        let mut kind: Option<String> = None;
        let mut node = Description::new(String::new());
        let mut seen_reserved: Vec<&'static str> = Vec::new();

        while let Some(key) = map.next_key::<String>()? {
            if let Some(reserved) = RESERVED_KEYS.iter().find(|r| **r == key) {
                if seen_reserved.contains(reserved) {
                    return Err(de::Error::duplicate_field(reserved));
                }
                seen_reserved.push(reserved);
            }
            match key.as_str() {
                "type" => kind = Some(map.next_value()?),
                "name" => node.name = map.next_value()?,
                "events" => node.events = map.next_value()?,
                "children" => node.children = map.next_value()?,
                "resources" => node.resources = map.next_value()?,
                _ => {
                    let value: Value = map.next_value()?;
                    if node.properties.contains_key(&key) {
                        return Err(de::Error::custom(DescriptionError::ConflictingProperty(key)));
                    }
                    node.properties.insert(key, value);
                }
            }
        }

        node.kind = kind.ok_or_else(|| de::Error::missing_field("type"))?;
        Ok(node)
    }
}

// ---------------------------------------------------------------------------
// DescriptionBuilder
// ---------------------------------------------------------------------------

/// Fallible description builder.
///
/// Errors are collected and reported by [`DescriptionBuilder::build`]; the
/// first one wins.
#[derive(Debug)]
pub struct DescriptionBuilder {
    node: Description,
    error: Option<DescriptionError>,
}

impl DescriptionBuilder {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            node: Description::new(kind),
            error: None,
        }
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.node.name = Some(name.into());
        self
    }

    /// Set a literal value. Fails the build if the key already has a value.
    #[must_use]
    pub fn property(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key.into(), value.into())
    }

    /// Set a binding. Fails the build if the key already has a value.
    #[must_use]
    pub fn bind(self, key: impl Into<String>, expr: &BindingExpr) -> Self {
        self.insert(key.into(), Value::Str(expr.to_string()))
    }

    #[must_use]
    pub fn event(mut self, event: impl Into<String>, method: impl Into<String>) -> Self {
        self.node.events.insert(event.into(), method.into());
        self
    }

    #[must_use]
    pub fn child(mut self, child: Description) -> Self {
        self.node.children.push(child);
        self
    }

    #[must_use]
    pub fn resource(mut self, id: impl Into<String>, resource: Description) -> Self {
        self.node.resources.insert(id.into(), resource);
        self
    }

    pub fn build(self) -> Result<Description, DescriptionError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.node),
        }
    }

    fn insert(mut self, key: String, value: Value) -> Self {
        if self.error.is_some() {
            return self;
        }
        if RESERVED_KEYS.contains(&key.as_str()) {
            self.error = Some(DescriptionError::InvalidValue {
                property: key,
                expected: "a non-reserved property name",
                found: "reserved key".into(),
            });
            return self;
        }
        if let Value::Str(s) = &value {
            if BindingExpr::is_binding(s) {
                if let Err(e) = BindingExpr::parse(s) {
                    self.error = Some(e);
                    return self;
                }
            }
        }
        if self.node.properties.contains_key(&key) {
            self.error = Some(DescriptionError::ConflictingProperty(key));
        } else {
            self.node.properties.insert(key, value);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> Description {
        Description::new("column")
            .with_name("root")
            .with_property("spacing", 4)
            .with_child(
                Description::new("check_box")
                    .with_name("cb")
                    .with_property("text", "Enabled")
                    .with_property("checked", "@binding(enabled_model.value)")
                    .with_event("on_checked_changed", "enabled_changed"),
            )
            .with_child(Description::new("slider").with_property("value", 0.5))
    }

    #[test]
    fn json_round_trip_is_lossless() {
        let d = sample();
        let json = d.to_json().unwrap();
        let back = Description::from_json(&json).unwrap();
        assert_eq!(back, d);
        assert_eq!(back.node_count(), 3);
    }

    #[test]
    fn flat_json_form_is_accepted() {
        let d = Description::from_json(
            r#"{"type": "line_edit", "name": "le", "text": "@binding(title)",
                "events": {"on_editing_finished": "done"}}"#,
        )
        .unwrap();
        assert_eq!(d.kind(), "line_edit");
        assert_eq!(d.name(), Some("le"));
        assert_eq!(d.event("on_editing_finished"), Some("done"));
        assert_eq!(
            d.property_value("text").unwrap(),
            Some(PropertyValue::Binding(BindingExpr::new("title")))
        );
    }

    #[test]
    fn missing_type_is_rejected() {
        let err = Description::from_json(r#"{"name": "x"}"#).unwrap_err();
        assert!(matches!(err, DescriptionError::Parse(msg) if msg.contains("type")));
    }

    #[test]
    fn duplicate_property_keys_conflict() {
        let err = Description::from_json(
            r#"{"type": "check_box", "checked": true, "checked": "@binding(m.value)"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DescriptionError::Parse(msg) if msg.contains("checked")));
    }

    #[test]
    fn builder_rejects_literal_plus_binding() {
        let err = Description::builder("check_box")
            .property("checked", true)
            .bind("checked", &BindingExpr::new("enabled_model.value"))
            .build()
            .unwrap_err();
        assert_eq!(err, DescriptionError::ConflictingProperty("checked".into()));
    }

    #[test]
    fn builder_rejects_malformed_binding() {
        let err = Description::builder("label")
            .property("text", "@binding(a.b, fallback=1)")
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptionError::InvalidBinding { .. }));
    }

    #[test]
    fn binding_expr_parsing() {
        let b = BindingExpr::parse("@binding( model . value , converter=float_to_100 )").unwrap();
        assert_eq!(b.path(), "model.value");
        assert_eq!(b.converter(), Some("float_to_100"));
        assert_eq!(b.segments().collect::<Vec<_>>(), ["model", "value"]);
        assert_eq!(b.to_string(), "@binding(model.value, converter=float_to_100)");

        assert!(BindingExpr::parse("@binding()").is_err());
        assert!(BindingExpr::parse("@binding(a..b)").is_err());
        assert!(BindingExpr::parse("@binding(a, converter=)").is_err());
        assert!(BindingExpr::parse("binding(a)").is_err());
    }

    #[test]
    fn plain_strings_are_literals() {
        assert_eq!(
            PropertyValue::from_value(&Value::from("hello")).unwrap(),
            PropertyValue::Literal(Value::from("hello"))
        );
    }

    #[test]
    fn resources_round_trip() {
        let d = Description::new("window")
            .with_resource("panel", Description::new("text_label").with_property("text", "hi"))
            .with_child(Description::new("component").with_property("identifier", "panel"));
        let back = Description::from_json(&d.to_json_pretty().unwrap()).unwrap();
        assert_eq!(back.resources().len(), 1);
        assert_eq!(back, d);
    }

    #[test]
    #[should_panic(expected = "reserved description key")]
    fn reserved_keys_are_not_properties() {
        let _ = Description::new("text_label").with_property("name", "caption");
    }

    #[test]
    fn builder_rejects_reserved_keys() {
        let err = Description::builder("text_label")
            .property("children", 1)
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptionError::InvalidValue { property, .. } if property == "children"));
    }

    fn scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            (-400i32..400).prop_map(|n| Value::Float(f64::from(n) / 4.0)),
            "[a-z ]{0,8}".prop_map(Value::Str),
        ]
    }

    fn value() -> impl Strategy<Value = Value> {
        prop_oneof![
            3 => scalar(),
            1 => prop::collection::vec(scalar(), 0..4).prop_map(Value::List),
            1 => prop::collection::vec(("[a-z]{1,4}", scalar()), 0..3)
                .prop_map(|entries| Value::Map(entries.into_iter().collect())),
        ]
    }

    fn property_key() -> impl Strategy<Value = String> {
        "[a-z_]{1,8}".prop_filter("reserved", |k| !RESERVED_KEYS.contains(&k.as_str()))
    }

    fn node(children: Vec<Description>) -> impl Strategy<Value = Description> {
        (
            "[a-z_]{1,10}",
            prop::option::of("[a-z0-9]{1,6}"),
            prop::collection::vec((property_key(), value()), 0..4),
            prop::collection::vec(("on_[a-z]{1,6}", "[a-z]{1,6}"), 0..2),
        )
            .prop_map(move |(kind, name, properties, events)| {
                let mut node = Description::new(kind).with_children(children.clone());
                if let Some(name) = name {
                    node = node.with_name(name);
                }
                for (key, value) in properties {
                    node = node.with_property(key, value);
                }
                for (event, method) in events {
                    node = node.with_event(event, method);
                }
                node
            })
    }

    fn tree() -> impl Strategy<Value = Description> {
        prop::collection::vec(node(Vec::new()), 0..3).prop_flat_map(node)
    }

    proptest! {
        #[test]
        fn json_round_trip_holds_for_any_tree(d in tree()) {
            let json = d.to_json().unwrap();
            let back = Description::from_json(&json).unwrap();
            prop_assert_eq!(back, d);
        }
    }
}
