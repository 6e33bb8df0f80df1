//! Runtime value representation
//!
//! [`Value`] is the closed tagged union every operand, register and property
//! holds. Conversions here are the pure ones; coercions that may run script
//! (`valueOf`/`toString` on objects) live on [`crate::VirtualMachine`].

use std::fmt;
use std::rc::Rc;

use crate::object::ObjectRef;
use crate::vm::VirtualMachine;

/// Trait for types that have cheap (O(1), reference-counted) clones.
///
/// This makes it explicit at the call site when a clone only bumps a
/// reference count rather than copying data.
///
/// # Examples
/// - `ObjectRef` (Rc<RefCell<Object>>) - cheap clone
/// - `AvmString` (Rc<str>) - cheap clone
/// - `SharedScope` (Rc<Scope>) - cheap clone
pub trait CheapClone: Clone {
    /// Create a cheap (reference-counted) clone of this value.
    fn cheap_clone(&self) -> Self {
        self.clone()
    }
}

impl<T: ?Sized> CheapClone for Rc<T> {}

/// An ActionScript value
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    Integer(i32),
    Float(f64),
    String(AvmString),
    /// Never dangling; absence of an object is `Null`
    Object(ObjectRef),
}

/// Reference-counted immutable string
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AvmString(Rc<str>);

// AvmString wraps Rc<str>, so clone is cheap (just reference count increment)
impl CheapClone for AvmString {}

impl AvmString {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Length in characters, as seen by string opcodes
    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }
}

impl AsRef<str> for AvmString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for AvmString {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for AvmString {
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for AvmString {
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

impl From<&str> for AvmString {
    fn from(s: &str) -> Self {
        AvmString(s.into())
    }
}

impl From<String> for AvmString {
    fn from(s: String) -> Self {
        AvmString(s.into())
    }
}

impl fmt::Display for AvmString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for AvmString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Preferred result type of a `[[DefaultValue]]` conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hint {
    Number,
    String,
}

impl Value {
    pub fn string(s: impl Into<AvmString>) -> Value {
        Value::String(s.into())
    }

    /// Numeric value, kept as `Integer` when it is integral and fits
    pub fn number(n: f64) -> Value {
        if n.fract() == 0.0
            && n >= f64::from(i32::MIN)
            && n <= f64::from(i32::MAX)
            && !(n == 0.0 && n.is_sign_negative())
        {
            Value::Integer(n as i32)
        } else {
            Value::Float(n)
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `null` or `undefined`
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn is_primitive(&self) -> bool {
        !self.is_object()
    }

    pub fn is_callable(&self) -> bool {
        self.as_object().is_some_and(|o| o.is_callable())
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Conversions
    // ═══════════════════════════════════════════════════════════════════════════════

    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => !(f.is_nan() || *f == 0.0),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    pub fn to_float(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Boolean(b) => f64::from(u8::from(*b)),
            Value::Integer(i) => f64::from(*i),
            Value::Float(f) => *f,
            Value::String(s) => parse_number(s.as_str()).unwrap_or(f64::NAN),
            // Objects go through VirtualMachine::to_number for valueOf
            Value::Object(_) => f64::NAN,
        }
    }

    /// Truncating 32-bit conversion; unparsable input yields 0
    pub fn to_integer(&self) -> i32 {
        match self {
            Value::Integer(i) => *i,
            Value::Boolean(b) => i32::from(*b),
            Value::String(s) => match s.as_str().trim().parse::<i32>() {
                Ok(i) => i,
                Err(_) => parse_number(s.as_str()).map(to_int32).unwrap_or(0),
            },
            Value::Float(f) => to_int32(*f),
            Value::Undefined | Value::Null | Value::Object(_) => 0,
        }
    }

    /// Number conversion keeping integer text as `Integer`
    pub fn to_number(&self) -> Value {
        match self {
            Value::Integer(_) | Value::Float(_) => self.clone(),
            Value::Boolean(b) => Value::Integer(i32::from(*b)),
            Value::Null => Value::Integer(0),
            Value::Undefined | Value::Object(_) => Value::Float(f64::NAN),
            Value::String(s) => match s.as_str().trim().parse::<i32>() {
                Ok(i) => Value::Integer(i),
                Err(_) => Value::Float(parse_number(s.as_str()).unwrap_or(f64::NAN)),
            },
        }
    }

    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => format_number(*f),
            Value::String(s) => s.to_string(),
            Value::Object(obj) => {
                if obj.is_callable() {
                    "[type Function]".to_string()
                } else {
                    format!("[object {}]", obj.class_name())
                }
            }
        }
    }

    pub fn to_avm_string(&self) -> AvmString {
        match self {
            Value::String(s) => s.cheap_clone(),
            other => AvmString::from(other.to_display_string()),
        }
    }

    /// Result of the `typeof` operator
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) | Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::Object(obj) => {
                if obj.is_callable() {
                    "function"
                } else if obj.is_stage() {
                    "movieclip"
                } else {
                    "object"
                }
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Comparison
    // ═══════════════════════════════════════════════════════════════════════════════

    /// `===`: same type, NaN never equal, objects by identity
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (a, b) if a.is_number() && b.is_number() => a.to_float() == b.to_float(),
            _ => false,
        }
    }

    /// SameValue: NaN equals itself and the sign of zero matters
    pub fn same_value(&self, other: &Value) -> bool {
        if self.is_number() && other.is_number() {
            let (a, b) = (self.to_float(), other.to_float());
            if a.is_nan() && b.is_nan() {
                return true;
            }
            return a == b && a.is_sign_negative() == b.is_sign_negative();
        }
        self.strict_equals(other)
    }

    /// `==` over primitives.
    ///
    /// Returns `None` when one operand is an object compared against a number
    /// or string; that case needs `to_primitive`, which may run script, and is
    /// handled by `VirtualMachine::abstract_equals`.
    pub fn loose_equals(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (a, b) if a.same_kind(b) => Some(a.strict_equals(b)),
            (a, b) if a.is_nullish() && b.is_nullish() => Some(true),
            (a, b) if a.is_nullish() || b.is_nullish() => Some(false),
            (a, b) if a.is_number() && b.is_string() => Some(a.to_float() == b.to_float()),
            (a, b) if a.is_string() && b.is_number() => Some(a.to_float() == b.to_float()),
            (Value::Boolean(_), b) => self.to_number().loose_equals(b),
            (a, Value::Boolean(_)) => a.loose_equals(&other.to_number()),
            (a, Value::Object(_)) if a.is_number() || a.is_string() => None,
            (Value::Object(_), b) if b.is_number() || b.is_string() => None,
            _ => Some(false),
        }
    }

    /// `<`: strings compare by content, everything else after number
    /// conversion; `Undefined` when either side is NaN
    pub fn abstract_less(&self, other: &Value) -> Value {
        if let (Value::String(a), Value::String(b)) = (self, other) {
            return Value::Boolean(a < b);
        }
        let (a, b) = (self.to_float(), other.to_float());
        if a.is_nan() || b.is_nan() {
            Value::Undefined
        } else {
            Value::Boolean(a < b)
        }
    }

    fn same_kind(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_number() && b.is_number() => true,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // JSON bridge
    // ═══════════════════════════════════════════════════════════════════════════════

    /// Convert to JSON. Functions and values nested deeper than the
    /// recursion limit become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_depth(0)
    }

    /// Build a value from JSON; arrays and objects get the VM's prototypes
    pub fn from_json(json: &serde_json::Value, vm: &VirtualMachine) -> Value {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Boolean(*b),
            Json::Number(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::string(s.as_str()),
            Json::Array(items) => Value::Object(
                vm.new_array(items.iter().map(|v| Value::from_json(v, vm)).collect()),
            ),
            Json::Object(map) => {
                let obj = vm.new_object();
                for (key, value) in map {
                    obj.set(key.as_str(), Value::from_json(value, vm));
                }
                Value::Object(obj)
            }
        }
    }

    fn to_json_depth(&self, depth: usize) -> serde_json::Value {
        use serde_json::Value as Json;
        const MAX_DEPTH: usize = 64;

        match self {
            Value::Undefined | Value::Null => Json::Null,
            Value::Boolean(b) => Json::Bool(*b),
            Value::Integer(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.to_string()),
            Value::Object(obj) => {
                if depth >= MAX_DEPTH || obj.is_callable() {
                    return Json::Null;
                }
                if let Some(elements) = obj.array_elements() {
                    return Json::Array(
                        elements
                            .iter()
                            .map(|v| v.to_json_depth(depth + 1))
                            .collect(),
                    );
                }
                let mut map = serde_json::Map::new();
                for (key, value) in obj.enumerable_own_values() {
                    map.insert(key.to_string(), value.to_json_depth(depth + 1));
                }
                Json::Object(map)
            }
        }
    }
}

impl PartialEq for Value {
    /// Structural equality for host code and tests; numbers compare by value
    /// across `Integer`/`Float`, objects by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (a, b) if a.is_number() && b.is_number() => a.to_float() == b.to_float(),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}i"),
            Value::Float(n) => write!(f, "{}f", format_number(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(obj) => write!(f, "{obj:?}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(AvmString::from(s))
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

/// Parse numeric text. Accepts decimal and exponent forms and `Infinity`.
pub(crate) fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    match text {
        "" => None,
        "Infinity" | "+Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ if text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')) =>
        {
            text.parse::<f64>().ok()
        }
        _ => None,
    }
}

/// ECMA-262 ToInt32
pub(crate) fn to_int32(f: f64) -> i32 {
    if !f.is_finite() {
        return 0;
    }
    let wrapped = f.trunc().rem_euclid(4_294_967_296.0);
    (wrapped as u32) as i32
}

pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        String::from(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}
