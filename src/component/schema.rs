//! Component types - the static member schema shared by all instances.
//!
//! ```ignore
//! let person = ComponentType::builder("Person")
//!     .property("age", PropSpec::int(0).settable())
//!     .action("increase_age", |this, _| {
//!         let age = this.get("age")?.as_int().unwrap_or(0);
//!         this.mutate("age", age + 1).map(drop)
//!     })
//!     .reaction("show", &["age"], |this, events| Ok(()))
//!     .build()?;
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::action::ActionFn;
use super::emitter::EmitterFn;
use super::property::{PropSpec, setter_name};
use super::{Component, EventRef};
use crate::error::{Error, Result};
use crate::reaction::{ConnectionPath, ReactionHandler};
use crate::types::{Fields, ReactionMode, Value};

/// Hook run once during construction, after the initial property values
/// are set and before reactions connect.
pub type InitFn = Rc<dyn Fn(&Component, &[Value]) -> Result<()>>;

/// Kind of a named member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Property,
    Attribute,
    Action,
    Emitter,
    Reaction,
}

/// Declaration of a read-only attribute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttrSpec {
    default: Value,
    doc: String,
}

impl AttrSpec {
    pub fn new(default: impl Into<Value>) -> Self {
        Self {
            default: default.into(),
            doc: String::new(),
        }
    }

    pub fn doc(mut self, doc: &str) -> Self {
        self.doc = doc.to_string();
        self
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn docs(&self) -> &str {
        &self.doc
    }
}

#[derive(Clone)]
pub(crate) struct ActionSpec {
    pub(crate) func: ActionFn,
    /// Setter generated for a settable property.
    pub(crate) generated: bool,
}

#[derive(Clone)]
pub(crate) struct ReactionSpec {
    pub(crate) mode: ReactionMode,
    pub(crate) paths: Vec<ConnectionPath>,
    pub(crate) handler: ReactionHandler,
}

#[derive(Clone)]
pub(crate) enum Member {
    Property(PropSpec),
    Attribute(AttrSpec),
    Action(ActionSpec),
    Emitter(EmitterFn),
    Reaction(ReactionSpec),
}

impl Member {
    fn kind(&self) -> MemberKind {
        match self {
            Member::Property(_) => MemberKind::Property,
            Member::Attribute(_) => MemberKind::Attribute,
            Member::Action(_) => MemberKind::Action,
            Member::Emitter(_) => MemberKind::Emitter,
            Member::Reaction(_) => MemberKind::Reaction,
        }
    }
}

// =============================================================================
// ComponentType
// =============================================================================

pub(crate) struct TypeSchema {
    pub(crate) name: String,
    pub(crate) members: BTreeMap<String, Member>,
    pub(crate) init: Option<InitFn>,
}

/// A built component type. Cheap to clone.
#[derive(Clone)]
pub struct ComponentType(Rc<TypeSchema>);

impl ComponentType {
    pub fn builder(name: &str) -> ComponentTypeBuilder {
        ComponentTypeBuilder {
            name: name.to_string(),
            members: BTreeMap::new(),
            init: None,
            errors: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind_of(&self, name: &str) -> Option<MemberKind> {
        self.0.members.get(name).map(Member::kind)
    }

    fn names(&self, kind: MemberKind) -> Vec<String> {
        self.0
            .members
            .iter()
            .filter(|(_, m)| m.kind() == kind)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Property names, sorted.
    pub fn properties(&self) -> Vec<String> {
        self.names(MemberKind::Property)
    }

    pub fn attributes(&self) -> Vec<String> {
        self.names(MemberKind::Attribute)
    }

    pub fn actions(&self) -> Vec<String> {
        self.names(MemberKind::Action)
    }

    pub fn emitters(&self) -> Vec<String> {
        self.names(MemberKind::Emitter)
    }

    pub fn reactions(&self) -> Vec<String> {
        self.names(MemberKind::Reaction)
    }

    pub fn property(&self, name: &str) -> Option<&PropSpec> {
        match self.0.members.get(name) {
            Some(Member::Property(spec)) => Some(spec),
            _ => None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrSpec> {
        match self.0.members.get(name) {
            Some(Member::Attribute(spec)) => Some(spec),
            _ => None,
        }
    }

    pub(crate) fn action_fn(&self, name: &str) -> Option<ActionFn> {
        match self.0.members.get(name) {
            Some(Member::Action(spec)) => Some(spec.func.clone()),
            _ => None,
        }
    }

    /// True for an action the type declared itself, not a generated setter.
    pub(crate) fn is_user_action(&self, name: &str) -> bool {
        matches!(self.0.members.get(name), Some(Member::Action(spec)) if !spec.generated)
    }

    pub(crate) fn emitter_fn(&self, name: &str) -> Option<EmitterFn> {
        match self.0.members.get(name) {
            Some(Member::Emitter(f)) => Some(f.clone()),
            _ => None,
        }
    }

    pub(crate) fn reaction_specs(&self) -> impl Iterator<Item = (&String, &ReactionSpec)> {
        self.0.members.iter().filter_map(|(name, m)| match m {
            Member::Reaction(spec) => Some((name, spec)),
            _ => None,
        })
    }

    pub(crate) fn init_fn(&self) -> Option<InitFn> {
        self.0.init.clone()
    }

    pub fn ptr_eq(&self, other: &ComponentType) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("name", &self.0.name)
            .field("members", &self.0.members.keys().collect::<Vec<_>>())
            .finish()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Collects member declarations; errors surface from [`build`](Self::build).
pub struct ComponentTypeBuilder {
    name: String,
    members: BTreeMap<String, Member>,
    init: Option<InitFn>,
    errors: Vec<Error>,
}

impl ComponentTypeBuilder {
    /// Start from `base`: copy its members and init hook. Members declared
    /// afterwards override inherited ones.
    pub fn extends(mut self, base: &ComponentType) -> Self {
        for (name, member) in &base.0.members {
            self.members.insert(name.clone(), member.clone());
        }
        if self.init.is_none() {
            self.init = base.0.init.clone();
        }
        self
    }

    fn add(mut self, name: &str, member: Member) -> Self {
        if !is_identifier(name) {
            self.errors
                .push(Error::schema(&self.name, format!("`{name}` is not a valid member name")));
            return self;
        }
        if name == "id" {
            self.errors
                .push(Error::schema(&self.name, "`id` is a built-in attribute"));
            return self;
        }
        if let Some(existing) = self.members.get(name)
            && existing.kind() != member.kind()
        {
            self.errors.push(Error::schema(
                &self.name,
                format!(
                    "`{name}` is declared as both {:?} and {:?}",
                    existing.kind(),
                    member.kind()
                ),
            ));
            return self;
        }
        self.members.insert(name.to_string(), member);
        self
    }

    pub fn property(self, name: &str, spec: PropSpec) -> Self {
        self.add(name, Member::Property(spec))
    }

    pub fn attribute(self, name: &str, spec: AttrSpec) -> Self {
        self.add(name, Member::Attribute(spec))
    }

    pub fn action(
        self,
        name: &str,
        f: impl Fn(&Component, &[Value]) -> Result<()> + 'static,
    ) -> Self {
        let spec = ActionSpec {
            func: Rc::new(f),
            generated: false,
        };
        self.add(name, Member::Action(spec))
    }

    pub fn emitter(
        self,
        name: &str,
        f: impl Fn(&Component, &[Value]) -> Result<Option<Fields>> + 'static,
    ) -> Self {
        self.add(name, Member::Emitter(Rc::new(f)))
    }

    pub fn reaction(
        self,
        name: &str,
        connections: &[&str],
        f: impl Fn(&Component, &[EventRef]) -> Result<()> + 'static,
    ) -> Self {
        self.explicit(name, ReactionMode::Normal, connections, ReactionHandler::explicit(f))
    }

    /// Reaction called at most once per iteration with all its events.
    pub fn greedy_reaction(
        self,
        name: &str,
        connections: &[&str],
        f: impl Fn(&Component, &[EventRef]) -> Result<()> + 'static,
    ) -> Self {
        self.explicit(name, ReactionMode::Greedy, connections, ReactionHandler::explicit(f))
    }

    /// Reaction whose dependencies are the properties it reads.
    pub fn implicit_reaction(self, name: &str, f: impl Fn(&Component) -> Result<()> + 'static) -> Self {
        let spec = ReactionSpec {
            mode: ReactionMode::Auto,
            paths: Vec::new(),
            handler: ReactionHandler::implicit(f),
        };
        self.add(name, Member::Reaction(spec))
    }

    fn explicit(
        mut self,
        name: &str,
        mode: ReactionMode,
        connections: &[&str],
        handler: ReactionHandler,
    ) -> Self {
        if connections.is_empty() {
            self.errors.push(Error::schema(
                &self.name,
                format!("reaction `{name}` needs at least one connection string"),
            ));
            return self;
        }
        let mut paths = Vec::with_capacity(connections.len());
        for conn in connections {
            match ConnectionPath::parse(conn) {
                Ok(path) => paths.push(path),
                Err(err) => {
                    self.errors.push(err);
                    return self;
                }
            }
        }
        self.add(name, Member::Reaction(ReactionSpec { mode, paths, handler }))
    }

    pub fn init(mut self, f: impl Fn(&Component, &[Value]) -> Result<()> + 'static) -> Self {
        self.init = Some(Rc::new(f));
        self
    }

    /// Validate and freeze the schema. Settable properties get a setter
    /// action unless one was declared.
    pub fn build(mut self) -> Result<ComponentType> {
        if !is_identifier(&self.name) {
            return Err(Error::schema(&self.name, "type name is not an identifier"));
        }
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }

        let settable: Vec<String> = self
            .members
            .iter()
            .filter_map(|(name, m)| match m {
                Member::Property(spec) if spec.is_settable() => Some(name.clone()),
                _ => None,
            })
            .collect();
        for prop in settable {
            let action = setter_name(&prop);
            match self.members.get(&action) {
                Some(Member::Action(_)) => {}
                Some(other) => {
                    return Err(Error::schema(
                        &self.name,
                        format!("setter `{action}` clashes with a {:?}", other.kind()),
                    ));
                }
                None => {
                    let spec = ActionSpec {
                        func: make_setter(prop),
                        generated: true,
                    };
                    self.members.insert(action, Member::Action(spec));
                }
            }
        }

        Ok(ComponentType(Rc::new(TypeSchema {
            name: self.name,
            members: self.members,
            init: self.init,
        })))
    }
}

fn make_setter(prop: String) -> ActionFn {
    Rc::new(move |this: &Component, args: &[Value]| {
        let value = match args {
            [single] => single.clone(),
            many => Value::List(many.to_vec()),
        };
        this.mutate(&prop, value).map(drop)
    })
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
