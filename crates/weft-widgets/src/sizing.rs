#![forbid(unsafe_code)]

//! Size hints parsed from description properties.
//!
//! Sizing is recorded, never computed: a rendering backend reads the
//! [`Sizing`] attached to each widget.

use std::fmt;

use weft_core::Value;

/// Description keys consumed by [`Sizing`] rather than stored as widget
/// properties.
pub const SIZING_KEYS: [&str; 8] = [
    "width",
    "height",
    "min_width",
    "max_width",
    "min_height",
    "max_height",
    "size_policy_horizontal",
    "size_policy_vertical",
];

/// How a widget grows or shrinks along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizePolicy {
    Fixed,
    Minimum,
    Maximum,
    Preferred,
    Expanding,
    MinimumExpanding,
    Ignored,
}

impl SizePolicy {
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "fixed" => Self::Fixed,
            "minimum" => Self::Minimum,
            "maximum" => Self::Maximum,
            "preferred" => Self::Preferred,
            "expanding" => Self::Expanding,
            "min-expanding" | "minimum_expanding" => Self::MinimumExpanding,
            "ignored" => Self::Ignored,
            _ => return None,
        })
    }
}

/// A sizing key with a value of the wrong shape.
#[derive(Debug, Clone, PartialEq)]
pub struct SizingError {
    pub key: String,
    pub found: Value,
}

impl fmt::Display for SizingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid value {} for '{}'", self.found, self.key)
    }
}

impl std::error::Error for SizingError {}

/// Width/height constraints and size policies of one widget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sizing {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub min_width: Option<u32>,
    pub max_width: Option<u32>,
    pub min_height: Option<u32>,
    pub max_height: Option<u32>,
    pub horizontal: Option<SizePolicy>,
    pub vertical: Option<SizePolicy>,
}

impl Sizing {
    #[must_use]
    pub fn is_sizing_key(key: &str) -> bool {
        SIZING_KEYS.contains(&key)
    }

    /// Record one sizing key. Returns `Ok(false)` if `key` is not a sizing
    /// key; null values leave the field unset.
    pub fn apply(&mut self, key: &str, value: &Value) -> Result<bool, SizingError> {
        let invalid = || SizingError {
            key: key.to_owned(),
            found: value.clone(),
        };
        let extent = |value: &Value| -> Result<Option<u32>, SizingError> {
            if value.is_null() {
                return Ok(None);
            }
            value
                .as_int()
                .and_then(|i| u32::try_from(i).ok())
                .map(Some)
                .ok_or_else(invalid)
        };
        let policy = |value: &Value| -> Result<Option<SizePolicy>, SizingError> {
            if value.is_null() {
                return Ok(None);
            }
            value
                .as_str()
                .and_then(SizePolicy::parse)
                .map(Some)
                .ok_or_else(invalid)
        };
        match key {
            "width" => self.width = extent(value)?,
            "height" => self.height = extent(value)?,
            "min_width" => self.min_width = extent(value)?,
            "max_width" => self.max_width = extent(value)?,
            "min_height" => self.min_height = extent(value)?,
            "max_height" => self.max_height = extent(value)?,
            "size_policy_horizontal" => self.horizontal = policy(value)?,
            "size_policy_vertical" => self.vertical = policy(value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Whether no constraint is set.
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_extents_and_policies() {
        let mut sizing = Sizing::default();
        assert!(sizing.apply("width", &Value::Int(120)).unwrap());
        assert!(sizing.apply("min_height", &Value::Float(20.0)).unwrap());
        assert!(sizing.apply("size_policy_horizontal", &"expanding".into()).unwrap());
        assert!(!sizing.apply("text", &"x".into()).unwrap());

        assert_eq!(sizing.width, Some(120));
        assert_eq!(sizing.min_height, Some(20));
        assert_eq!(sizing.horizontal, Some(SizePolicy::Expanding));
        assert!(!sizing.is_unconstrained());
    }

    #[test]
    fn rejects_bad_values() {
        let mut sizing = Sizing::default();
        let err = sizing.apply("width", &Value::Int(-4)).unwrap_err();
        assert_eq!(err.key, "width");
        assert!(sizing.apply("size_policy_vertical", &"huge".into()).is_err());
        assert!(sizing.is_unconstrained());
    }
}
