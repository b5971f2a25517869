#![forbid(unsafe_code)]

//! Bidirectional value converters used inside bindings.
//!
//! A [`Converter`] maps a model-side value to a widget-side value
//! (`convert`) and back (`convert_back`). Converters are looked up by name
//! from binding expressions (`@binding(model.value, converter=float_to_100)`),
//! first on the handler and then in the thread-local [`ConverterRegistry`],
//! which comes pre-populated with the built-in converters.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | `ConverterError` | value of the wrong type, unparsable text | propagation dropped by the binding |
//! | Unknown name | not registered anywhere | binding fails at bind time |

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use crate::value::Value;

/// A conversion failure for a single value.
#[derive(Debug, Clone, PartialEq)]
pub struct ConverterError {
    /// Name of the converter that failed.
    pub converter: String,
    /// What went wrong.
    pub message: String,
}

impl ConverterError {
    pub fn new(converter: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            converter: converter.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConverterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "converter '{}' failed: {}", self.converter, self.message)
    }
}

impl std::error::Error for ConverterError {}

/// Bidirectional transform between the model domain and the widget domain.
pub trait Converter {
    /// Model value to widget value.
    fn convert(&self, value: &Value) -> Result<Value, ConverterError>;

    /// Widget value back to model value.
    fn convert_back(&self, value: &Value) -> Result<Value, ConverterError>;
}

// ---------------------------------------------------------------------------
// Built-in converters
// ---------------------------------------------------------------------------

/// Integer to decimal text.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerToString;

impl Converter for IntegerToString {
    fn convert(&self, value: &Value) -> Result<Value, ConverterError> {
        match value {
            Value::Null => Ok(Value::Null),
            v => v
                .as_int()
                .map(|i| Value::Str(i.to_string()))
                .ok_or_else(|| mismatch("int_to_string", "int", v)),
        }
    }

    fn convert_back(&self, value: &Value) -> Result<Value, ConverterError> {
        let text = value
            .as_str()
            .ok_or_else(|| mismatch("int_to_string", "string", value))?;
        text.trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| ConverterError::new("int_to_string", format!("'{text}': {e}")))
    }
}

/// Float to text with an optional fixed precision.
///
/// Parsing back is fuzzy: the longest numeric prefix is used and a comma is
/// accepted as decimal separator; text with no numeric prefix converts to
/// `0.0`. With `pass_null`, null and empty text map to null.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatToString {
    pub precision: Option<usize>,
    pub pass_null: bool,
}

impl Converter for FloatToString {
    fn convert(&self, value: &Value) -> Result<Value, ConverterError> {
        if value.is_null() && self.pass_null {
            return Ok(Value::Null);
        }
        let f = value
            .as_float()
            .ok_or_else(|| mismatch("float_to_string", "float", value))?;
        let text = match self.precision {
            Some(p) => format!("{f:.p$}"),
            None => format!("{f}"),
        };
        Ok(Value::Str(text))
    }

    fn convert_back(&self, value: &Value) -> Result<Value, ConverterError> {
        if self.pass_null && (value.is_null() || value.as_str().is_some_and(str::is_empty)) {
            return Ok(Value::Null);
        }
        let text = value
            .as_str()
            .ok_or_else(|| mismatch("float_to_string", "string", value))?;
        Ok(Value::Float(fuzzy_float(text)))
    }
}

/// Float in `0..=1` to integer percentage.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatTo100;

impl Converter for FloatTo100 {
    fn convert(&self, value: &Value) -> Result<Value, ConverterError> {
        let f = value
            .as_float()
            .ok_or_else(|| mismatch("float_to_100", "float", value))?;
        Ok(Value::Int((f * 100.0).round() as i64))
    }

    fn convert_back(&self, value: &Value) -> Result<Value, ConverterError> {
        let f = value
            .as_float()
            .ok_or_else(|| mismatch("float_to_100", "number", value))?;
        Ok(Value::Float(f / 100.0))
    }
}

/// Float in `0..=1` to percentage text such as `"42%"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatToPercent;

impl Converter for FloatToPercent {
    fn convert(&self, value: &Value) -> Result<Value, ConverterError> {
        let f = value
            .as_float()
            .ok_or_else(|| mismatch("float_to_percent", "float", value))?;
        Ok(Value::Str(format!("{}%", (f * 100.0).round() as i64)))
    }

    fn convert_back(&self, value: &Value) -> Result<Value, ConverterError> {
        let text = value
            .as_str()
            .ok_or_else(|| mismatch("float_to_percent", "string", value))?;
        let number = text.trim().trim_end_matches('%').trim();
        number
            .parse::<f64>()
            .map(|f| Value::Float(f / 100.0))
            .map_err(|e| ConverterError::new("float_to_percent", format!("'{text}': {e}")))
    }
}

/// Bool to `"checked"` / `"unchecked"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckedToCheckState;

impl Converter for CheckedToCheckState {
    fn convert(&self, value: &Value) -> Result<Value, ConverterError> {
        let checked = value
            .as_bool()
            .ok_or_else(|| mismatch("checked_to_check_state", "bool", value))?;
        Ok(Value::from(if checked { "checked" } else { "unchecked" }))
    }

    fn convert_back(&self, value: &Value) -> Result<Value, ConverterError> {
        let state = value
            .as_str()
            .ok_or_else(|| mismatch("checked_to_check_state", "string", value))?;
        Ok(Value::Bool(state == "checked"))
    }
}

/// Converter built from two closures.
pub struct FnConverter<F, B> {
    name: String,
    forward: F,
    backward: B,
}

impl<F, B> FnConverter<F, B>
where
    F: Fn(&Value) -> Option<Value>,
    B: Fn(&Value) -> Option<Value>,
{
    /// `forward`/`backward` return `None` to signal a conversion failure.
    pub fn new(name: impl Into<String>, forward: F, backward: B) -> Self {
        Self {
            name: name.into(),
            forward,
            backward,
        }
    }
}

impl<F, B> Converter for FnConverter<F, B>
where
    F: Fn(&Value) -> Option<Value>,
    B: Fn(&Value) -> Option<Value>,
{
    fn convert(&self, value: &Value) -> Result<Value, ConverterError> {
        (self.forward)(value)
            .ok_or_else(|| ConverterError::new(&self.name, format!("cannot convert {value}")))
    }

    fn convert_back(&self, value: &Value) -> Result<Value, ConverterError> {
        (self.backward)(value)
            .ok_or_else(|| ConverterError::new(&self.name, format!("cannot convert back {value}")))
    }
}

fn mismatch(converter: &str, expected: &str, got: &Value) -> ConverterError {
    ConverterError::new(
        converter,
        format!("expected {expected}, got {}", got.type_name()),
    )
}

/// Longest numeric prefix of `text`, accepting `,` as decimal separator.
fn fuzzy_float(text: &str) -> f64 {
    let text = text.trim();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_sep = false;
    let mut seen_exp = false;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            '+' | '-' if i == 0 => {}
            '0'..='9' => {
                seen_digit = true;
                end = i + 1;
            }
            '.' | ',' if !seen_sep && !seen_exp => seen_sep = true,
            'e' | 'E' if seen_digit && !seen_exp => {
                let rest = &text[i + 1..];
                let rest = rest.strip_prefix(['+', '-']).unwrap_or(rest);
                if !rest.starts_with(|ch: char| ch.is_ascii_digit()) {
                    break;
                }
                seen_exp = true;
                if matches!(bytes.get(i + 1), Some(b'+' | b'-')) {
                    i += 1;
                }
            }
            _ => break,
        }
        i += 1;
    }
    if !seen_digit {
        return 0.0;
    }
    text[..end].replace(',', ".").parse().unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// ConverterRegistry
// ---------------------------------------------------------------------------

thread_local! {
    static REGISTRY: RefCell<AHashMap<String, Rc<dyn Converter>>> =
        RefCell::new(builtin_converters());
}

fn builtin_converters() -> AHashMap<String, Rc<dyn Converter>> {
    let mut map: AHashMap<String, Rc<dyn Converter>> = AHashMap::new();
    map.insert("int_to_string".into(), Rc::new(IntegerToString));
    map.insert("float_to_string".into(), Rc::new(FloatToString::default()));
    map.insert("float_to_100".into(), Rc::new(FloatTo100));
    map.insert("float_to_percent".into(), Rc::new(FloatToPercent));
    map.insert("checked_to_check_state".into(), Rc::new(CheckedToCheckState));
    map
}

/// Process-wide (per UI thread) named converters.
pub struct ConverterRegistry;

impl ConverterRegistry {
    /// Register `converter` under `name`, replacing any previous entry.
    pub fn register(name: impl Into<String>, converter: Rc<dyn Converter>) {
        REGISTRY.with(|r| {
            r.borrow_mut().insert(name.into(), converter);
        });
    }

    /// Remove a converter; returns whether it was registered.
    pub fn unregister(name: &str) -> bool {
        REGISTRY.with(|r| r.borrow_mut().remove(name).is_some())
    }

    #[must_use]
    pub fn get(name: &str) -> Option<Rc<dyn Converter>> {
        REGISTRY.with(|r| r.borrow().get(name).cloned())
    }

    /// Restore the built-in set, dropping all custom registrations.
    pub fn reset() {
        REGISTRY.with(|r| *r.borrow_mut() = builtin_converters());
    }
}
