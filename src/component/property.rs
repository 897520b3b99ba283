//! Properties - typed, validated, observable state slots.
//!
//! A [`PropSpec`] declares a property on a component type: its kind (which
//! fixes the default and the conversion rules), an optional custom check,
//! and flags. Values are read with `Component::get` and changed only through
//! [`Mutation`]s applied from an action or during construction.

use std::fmt;
use std::rc::Rc;

use super::Component;
use crate::error::{Error, Result};
use crate::types::{Fields, MutationKind, Value};

/// Extra validation run after the kind conversion. Returns the value to
/// store, or a `Validation` error.
pub type Check = Rc<dyn Fn(&Value) -> Result<Value>>;

// =============================================================================
// PropKind
// =============================================================================

/// Value kind of a property. Fixes the default and the accepted inputs.
#[derive(Debug, Clone, PartialEq)]
pub enum PropKind {
    Any,
    Bool,
    /// Bool or null.
    TriState,
    Int,
    Float,
    String,
    /// Fixed list; only replaced as a whole or edited in place.
    Tuple,
    List,
    Dict,
    /// A component handle or null.
    Component,
    /// Two floats; a scalar fills both.
    FloatPair,
    /// One of the given options, case-insensitive, stored upper-case.
    Enum(Vec<String>),
}

impl PropKind {
    pub fn default_value(&self) -> Value {
        match self {
            PropKind::Any | PropKind::TriState | PropKind::Component => Value::Null,
            PropKind::Bool => Value::Bool(false),
            PropKind::Int => Value::Int(0),
            PropKind::Float => Value::Float(0.0),
            PropKind::String => Value::Str(String::new()),
            PropKind::Tuple | PropKind::List => Value::List(Vec::new()),
            PropKind::Dict => Value::Map(Fields::new()),
            PropKind::FloatPair => Value::List(vec![Value::Float(0.0), Value::Float(0.0)]),
            PropKind::Enum(options) => options
                .first()
                .map(|o| Value::Str(o.to_uppercase()))
                .unwrap_or_default(),
        }
    }

    /// Convert `value` to this kind, or explain why it cannot be.
    pub fn convert(&self, value: Value) -> std::result::Result<Value, String> {
        match (self, value) {
            (PropKind::Any, v) => Ok(v),
            (PropKind::Bool, v) => Ok(Value::Bool(v.truthy())),
            (PropKind::TriState, Value::Null) => Ok(Value::Null),
            (PropKind::TriState, v) => Ok(Value::Bool(v.truthy())),
            (PropKind::Int, v) => to_int(&v).map(Value::Int),
            (PropKind::Float, v) => to_float(&v).map(Value::Float),
            (PropKind::String, Value::Str(s)) => Ok(Value::Str(s)),
            (PropKind::Tuple | PropKind::List, Value::List(items)) => Ok(Value::List(items)),
            (PropKind::Dict, Value::Map(map)) => Ok(Value::Map(map)),
            (PropKind::Component, v @ (Value::Null | Value::Component(_))) => Ok(v),
            (PropKind::FloatPair, Value::List(items)) => match items.as_slice() {
                [a, b] => Ok(Value::List(vec![
                    Value::Float(to_float(a)?),
                    Value::Float(to_float(b)?),
                ])),
                _ => Err(format!("expected 2 numbers, got {} items", items.len())),
            },
            (PropKind::FloatPair, v) => {
                let x = to_float(&v)?;
                Ok(Value::List(vec![Value::Float(x), Value::Float(x)]))
            }
            (PropKind::Enum(options), Value::Str(s)) => {
                let upper = s.to_uppercase();
                if options.iter().any(|o| o.to_uppercase() == upper) {
                    Ok(Value::Str(upper))
                } else {
                    Err(format!("{s:?} is not one of {options:?}"))
                }
            }
            (kind, v) => Err(format!("expected {}, got {}", kind.name(), v.type_name())),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            PropKind::Any => "any",
            PropKind::Bool => "bool",
            PropKind::TriState => "tri-state",
            PropKind::Int => "int",
            PropKind::Float => "float",
            PropKind::String => "string",
            PropKind::Tuple => "tuple",
            PropKind::List => "list",
            PropKind::Dict => "dict",
            PropKind::Component => "component",
            PropKind::FloatPair => "float pair",
            PropKind::Enum(_) => "enum string",
        }
    }
}

fn to_int(v: &Value) -> std::result::Result<i64, String> {
    match v {
        Value::Int(n) => Ok(*n),
        Value::Float(f) if f.is_finite() => Ok(f.trunc() as i64),
        Value::Bool(b) => Ok(*b as i64),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("cannot convert {s:?} to int")),
        other => Err(format!("expected int, got {}", other.type_name())),
    }
}

fn to_float(v: &Value) -> std::result::Result<f64, String> {
    match v {
        Value::Float(f) => Ok(*f),
        Value::Int(n) => Ok(*n as f64),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("cannot convert {s:?} to float")),
        other => Err(format!("expected float, got {}", other.type_name())),
    }
}

// =============================================================================
// PropSpec
// =============================================================================

/// Declaration of a property on a component type.
#[derive(Clone)]
pub struct PropSpec {
    kind: PropKind,
    default: Value,
    check: Option<Check>,
    settable: bool,
    local: bool,
    doc: String,
}

impl PropSpec {
    /// Property of `kind` with the kind's default value.
    pub fn new(kind: PropKind) -> Self {
        Self {
            default: kind.default_value(),
            kind,
            check: None,
            settable: false,
            local: false,
            doc: String::new(),
        }
    }

    pub fn any(default: impl Into<Value>) -> Self {
        Self::new(PropKind::Any).with_default(default)
    }

    pub fn bool(default: bool) -> Self {
        Self::new(PropKind::Bool).with_default(default)
    }

    pub fn tri_state() -> Self {
        Self::new(PropKind::TriState)
    }

    pub fn int(default: i64) -> Self {
        Self::new(PropKind::Int).with_default(default)
    }

    pub fn float(default: f64) -> Self {
        Self::new(PropKind::Float).with_default(default)
    }

    pub fn string(default: &str) -> Self {
        Self::new(PropKind::String).with_default(default)
    }

    pub fn tuple(default: Vec<Value>) -> Self {
        Self::new(PropKind::Tuple).with_default(default)
    }

    pub fn list(default: Vec<Value>) -> Self {
        Self::new(PropKind::List).with_default(default)
    }

    pub fn dict(default: Fields) -> Self {
        Self::new(PropKind::Dict).with_default(default)
    }

    pub fn component() -> Self {
        Self::new(PropKind::Component)
    }

    pub fn float_pair(a: f64, b: f64) -> Self {
        Self::new(PropKind::FloatPair).with_default(vec![Value::Float(a), Value::Float(b)])
    }

    /// Enum property; the first option is the default.
    pub fn enumeration(options: &[&str]) -> Self {
        Self::new(PropKind::Enum(options.iter().map(|o| o.to_string()).collect()))
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    /// Chain a custom check after the kind conversion.
    pub fn check(mut self, check: impl Fn(&Value) -> Result<Value> + 'static) -> Self {
        self.check = Some(Rc::new(check));
        self
    }

    /// Generate a `set_<name>` action for this property.
    pub fn settable(mut self) -> Self {
        self.settable = true;
        self
    }

    /// Keep the property local to this process.
    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    pub fn doc(mut self, doc: &str) -> Self {
        self.doc = doc.to_string();
        self
    }

    pub fn kind(&self) -> &PropKind {
        &self.kind
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn is_settable(&self) -> bool {
        self.settable
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn docs(&self) -> &str {
        &self.doc
    }

    /// Run the kind conversion, then the custom check.
    pub fn validate(&self, name: &str, value: Value) -> Result<Value> {
        let value = self
            .kind
            .convert(value)
            .map_err(|reason| Error::validation(name, reason))?;
        match &self.check {
            Some(check) => check(&value).map_err(|err| match err {
                Error::Validation { reason, .. } => Error::validation(name, reason),
                other => Error::validation(name, other.to_string()),
            }),
            None => Ok(value),
        }
    }
}

impl fmt::Debug for PropSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropSpec")
            .field("kind", &self.kind)
            .field("default", &self.default)
            .field("settable", &self.settable)
            .field("local", &self.local)
            .finish_non_exhaustive()
    }
}

/// Name of the action generated for a settable property.
pub(crate) fn setter_name(prop: &str) -> String {
    if prop.starts_with('_') {
        format!("_set{prop}")
    } else {
        format!("set_{prop}")
    }
}

// =============================================================================
// PropInit
// =============================================================================

/// Initial value of a property passed at construction.
#[derive(Clone)]
pub enum PropInit {
    Static(Value),
    /// Re-evaluated whenever what it reads changes; the result is pushed
    /// through the property's setter action.
    Getter(Rc<dyn Fn() -> Value>),
}

impl PropInit {
    pub fn getter(f: impl Fn() -> Value + 'static) -> Self {
        PropInit::Getter(Rc::new(f))
    }
}

impl fmt::Debug for PropInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropInit::Static(v) => f.debug_tuple("Static").field(v).finish(),
            PropInit::Getter(_) => f.write_str("Getter(..)"),
        }
    }
}

macro_rules! prop_init_from {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for PropInit {
                fn from(v: $t) -> Self {
                    PropInit::Static(Value::from(v))
                }
            }
        )*
    };
}

prop_init_from!(Value, bool, i64, i32, u32, usize, f64, f32, String, &str, Vec<Value>, Fields, Component);

// =============================================================================
// Mutation
// =============================================================================

/// A change to a property value.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    kind: MutationKind,
    index: isize,
    objects: Value,
    synthetic: bool,
}

impl Mutation {
    /// Replace the whole value. Validated; emits only on change.
    pub fn set(value: impl Into<Value>) -> Self {
        Self {
            kind: MutationKind::Set,
            index: -1,
            objects: value.into(),
            synthetic: false,
        }
    }

    /// Splice `items` into a list at `index`.
    pub fn insert(index: usize, items: Vec<Value>) -> Self {
        Self::in_place(MutationKind::Insert, index as isize, Value::List(items))
    }

    /// Remove `count` items from a list at `index`.
    pub fn remove(index: usize, count: usize) -> Self {
        Self::in_place(MutationKind::Remove, index as isize, Value::from(count))
    }

    /// Overwrite `items.len()` list items starting at `index`.
    pub fn replace(index: usize, items: Vec<Value>) -> Self {
        Self::in_place(MutationKind::Replace, index as isize, Value::List(items))
    }

    /// Merge `entries` into a dict.
    pub fn merge(entries: Fields) -> Self {
        Self::in_place(MutationKind::Replace, -1, Value::Map(entries))
    }

    /// Remove `keys` from a dict.
    pub fn remove_keys(keys: &[&str]) -> Self {
        let keys = keys.iter().map(|k| Value::from(*k)).collect();
        Self::in_place(MutationKind::Remove, -1, Value::List(keys))
    }

    /// Any mutation with an explicit index. Dict edits use `-1`.
    pub fn in_place(kind: MutationKind, index: isize, objects: Value) -> Self {
        Self {
            kind,
            index,
            objects,
            synthetic: false,
        }
    }

    /// Mark as mirrored from elsewhere.
    pub fn synthetic(mut self) -> Self {
        self.synthetic = true;
        self
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    pub fn index(&self) -> isize {
        self.index
    }

    pub fn objects(&self) -> &Value {
        &self.objects
    }

    pub(crate) fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    pub(crate) fn into_objects(self) -> Value {
        self.objects
    }
}

/// Apply an insert/remove/replace to `current` in place.
pub(crate) fn apply_in_place(name: &str, current: &mut Value, mutation: &Mutation) -> Result<()> {
    let kind = mutation.kind;
    let index = mutation.index;
    let invalid_index = |reason| Error::InvalidIndex {
        name: name.to_string(),
        mutation: kind.as_str(),
        index,
        reason,
    };

    match current {
        Value::Map(map) => {
            if index != -1 {
                return Err(invalid_index("dict mutations take index -1"));
            }
            match (kind, &mutation.objects) {
                (MutationKind::Insert | MutationKind::Replace, Value::Map(entries)) => {
                    map.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                (MutationKind::Remove, Value::List(keys)) => {
                    // All keys must exist before any is removed.
                    if let Some(missing) = keys
                        .iter()
                        .find(|key| key.as_str().is_none_or(|k| !map.contains_key(k)))
                    {
                        return Err(Error::validation(name, format!("no key {missing}")));
                    }
                    for key in keys.iter().filter_map(Value::as_str) {
                        map.remove(key);
                    }
                }
                (_, objects) => {
                    return Err(Error::validation(
                        name,
                        format!("cannot {kind} dict with a {}", objects.type_name()),
                    ));
                }
            }
        }
        Value::List(items) => {
            if index < 0 {
                return Err(invalid_index("list mutations need a non-negative index"));
            }
            let start = index as usize;
            if start > items.len() {
                return Err(invalid_index("index past the end of the list"));
            }
            match (kind, &mutation.objects) {
                (MutationKind::Insert, Value::List(new)) => {
                    items.splice(start..start, new.iter().cloned());
                }
                (MutationKind::Remove, Value::Int(count)) if *count >= 0 => {
                    let end = (start + *count as usize).min(items.len());
                    items.drain(start..end);
                }
                (MutationKind::Replace, Value::List(new)) => {
                    let end = (start + new.len()).min(items.len());
                    items.splice(start..end, new.iter().cloned());
                }
                (_, objects) => {
                    return Err(Error::validation(
                        name,
                        format!("cannot {kind} list with a {}", objects.type_name()),
                    ));
                }
            }
        }
        other => {
            return Err(Error::UnsupportedMutation {
                name: name.to_string(),
                mutation: kind.as_str(),
                value_type: other.type_name(),
            });
        }
    }
    Ok(())
}

// =============================================================================
// Property handle
// =============================================================================

/// A property of a live component.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    owner: Component,
    name: String,
}

impl Property {
    pub(crate) fn new(owner: Component, name: &str) -> Self {
        Self {
            owner,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> Component {
        self.owner
    }

    /// Current value; recorded as a dependency inside implicit reactions.
    pub fn get(&self) -> Result<Value> {
        self.owner.get(&self.name)
    }

    pub fn spec(&self) -> Result<PropSpec> {
        self.owner.property_spec(&self.name)
    }

    pub fn mutate(&self, value: impl Into<Value>) -> Result<bool> {
        self.owner.mutate(&self.name, value)
    }

    pub fn apply(&self, mutation: Mutation) -> Result<bool> {
        self.owner.apply(&self.name, mutation)
    }
}
