//! Core types for spark-event.
//!
//! The dynamic [`Value`] that flows through properties, events and action
//! arguments, plus the small enums and flag sets shared by every module.

use std::collections::BTreeMap;
use std::fmt;

use crate::component::Component;

// =============================================================================
// Value
// =============================================================================

/// String-keyed map used for dict properties and emitted event fields.
pub type Fields = BTreeMap<String, Value>;

/// Dynamically typed value held by properties and carried by events.
///
/// Equality is type sensitive: `Int(1)` and `Float(1.0)` are different
/// values, so setting one over the other counts as a change.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(Fields),
    Component(Component),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view: ints widen to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_component(&self) -> Option<Component> {
        match self {
            Value::Component(c) => Some(*c),
            _ => None,
        }
    }

    /// Truthiness: null, false, zero and empty containers are false.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Component(_) => true,
        }
    }

    /// Short name of the variant, used in validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "dict",
            Value::Component(_) => "component",
        }
    }

    /// True if this is a component, or a list whose first item is one.
    ///
    /// Changes to such values may alter what a dynamic connection path
    /// resolves to, so implicit reactions re-resolve on them.
    pub fn looks_like_component(&self) -> bool {
        match self {
            Value::Component(_) => true,
            Value::List(items) => matches!(items.first(), Some(Value::Component(_))),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Component(c) => write!(f, "{}", c.id()),
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i64 => Int,
    i32 => Int,
    u32 => Int,
    f64 => Float,
    f32 => Float,
    String => Str,
    &str => Str,
    Vec<Value> => List,
    Fields => Map,
    Component => Component,
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Build a [`Fields`] map from `key => value` pairs.
///
/// ```
/// let f = spark_event::fields! { "value" => 3, "name" => "x" };
/// assert_eq!(f.len(), 2);
/// ```
#[macro_export]
macro_rules! fields {
    () => { $crate::Fields::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::Fields::new();
        $( map.insert(::std::string::String::from($key), $crate::Value::from($value)); )+
        map
    }};
}

// =============================================================================
// Enums
// =============================================================================

/// The four kinds of property mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Set,
    Insert,
    Remove,
    Replace,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MutationKind::Set => "set",
            MutationKind::Insert => "insert",
            MutationKind::Remove => "remove",
            MutationKind::Replace => "replace",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a reaction's pending events are coalesced.
///
/// - `Normal`: consecutive queue entries for the same reaction merge only
///   when nothing from a different (source, type) sits between them.
/// - `Greedy`: every event joins the reaction's single pending entry.
/// - `Auto`: implicit reaction; greedy, and called without events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReactionMode {
    #[default]
    Normal,
    Greedy,
    Auto,
}

impl ReactionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReactionMode::Normal => "normal",
            ReactionMode::Greedy => "greedy",
            ReactionMode::Auto => "auto",
        }
    }
}

impl fmt::Display for ReactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags::bitflags! {
    /// Scheduler phase flags.
    ///
    /// `PROCESSING_ACTIONS` and `PROCESSING_REACTIONS` are set only for the
    /// duration of their phase and never together.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LoopPhase: u8 {
        const IDLE = 0;
        const IN_ITER = 1 << 0;
        const ITER_SCHEDULED = 1 << 1;
        const PROCESSING_ACTIONS = 1 << 2;
        const PROCESSING_REACTIONS = 1 << 3;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_type_sensitive() {
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Int(0), Value::Bool(false));
        assert_eq!(Value::from("a"), Value::Str("a".into()));
        assert_eq!(Value::from(vec![Value::Int(1)]), Value::List(vec![Value::Int(1)]));
    }

    #[test]
    fn test_truthy() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!Value::Str(String::new()).truthy());
        assert!(!Value::List(vec![]).truthy());
        assert!(Value::Float(0.5).truthy());
        assert!(Value::Map(fields! { "a" => 1 }).truthy());
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::Int(3).as_float(), Some(3.0));
        assert_eq!(Value::Float(3.0).as_int(), None);
        assert_eq!(Value::from(Some(2)).as_int(), Some(2));
        assert!(Value::from(None::<i64>).is_null());
        assert_eq!(Value::from("x").as_str(), Some("x"));
    }

    #[test]
    fn test_display() {
        let v = Value::List(vec![Value::Int(1), Value::from("b"), Value::Null]);
        assert_eq!(v.to_string(), "[1, b, null]");
        let m = Value::Map(fields! { "a" => 1, "b" => true });
        assert_eq!(m.to_string(), "{a: 1, b: true}");
    }

    #[test]
    fn test_looks_like_component_plain_values() {
        assert!(!Value::Int(1).looks_like_component());
        assert!(!Value::List(vec![]).looks_like_component());
        assert!(!Value::List(vec![Value::Null]).looks_like_component());
    }

    #[test]
    fn test_loop_phase_flags() {
        let mut phase = LoopPhase::default();
        assert!(phase.is_empty());
        phase.insert(LoopPhase::IN_ITER | LoopPhase::PROCESSING_ACTIONS);
        assert!(phase.contains(LoopPhase::PROCESSING_ACTIONS));
        phase.remove(LoopPhase::PROCESSING_ACTIONS);
        assert_eq!(phase, LoopPhase::IN_ITER);
    }

    #[test]
    fn test_mode_and_kind_names() {
        assert_eq!(ReactionMode::default(), ReactionMode::Normal);
        assert_eq!(ReactionMode::Greedy.to_string(), "greedy");
        assert_eq!(MutationKind::Replace.to_string(), "replace");
    }
}
