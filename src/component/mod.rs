//! Components - owners of properties, actions, emitters and reactions.
//!
//! A [`Component`] is a `Copy` handle into the per-thread arena. Its type is
//! a [`ComponentType`] built once and shared by all instances.
//!
//! # Data flow
//!
//! ```text
//! action.call()  ──queue──▶  action phase: mutate()  ──▶  Event
//!                                                          │
//!   subscriptions (sorted by label) ◀──────────────────────┘
//!        │  reconnect markers re-resolve dynamic paths right away
//!        └─▶ reaction queue ──▶ reaction phase: handler(events)
//! ```
//!
//! Properties can only be mutated from an action or while the component is
//! active (during construction or inside [`Component::scope`]).

mod action;
mod emitter;
mod event;
mod property;
mod schema;

pub use action::{Action, ActionFn};
pub use emitter::{Emitter, EmitterFn};
pub use event::{Event, EventData, EventRef};
pub use property::{Check, Mutation, PropInit, PropKind, PropSpec, Property};
pub use schema::{AttrSpec, ComponentType, ComponentTypeBuilder, InitFn, MemberKind};

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::engine::registry::{self, ActiveGuard, ComponentId};
use crate::engine::scheduler;
use crate::error::{Error, Result};
use crate::reaction::{ConnectionPath, Reaction, ReactionHandler};
use crate::types::{Fields, MutationKind, ReactionMode, Value};
use property::{apply_in_place, setter_name};

// =============================================================================
// Component Data
// =============================================================================

/// One reaction subscribed to one event type of a component.
#[derive(Clone)]
pub(crate) struct Subscription {
    label: String,
    /// `(label, reaction id)`; lists are kept sorted by it.
    key: (String, u64),
    reaction: Reaction,
}

impl Subscription {
    /// Index of the connection to re-resolve, for reconnect markers.
    fn reconnect_index(&self) -> Option<usize> {
        self.label.strip_prefix("reconnect_")?.parse().ok()
    }
}

pub(crate) struct ComponentData {
    pub(crate) name: String,
    ty: ComponentType,
    values: RefCell<HashMap<String, Value>>,
    attributes: RefCell<HashMap<String, Value>>,
    handlers: RefCell<BTreeMap<String, Vec<Subscription>>>,
    actions: RefCell<HashMap<String, Action>>,
    reactions: RefCell<Vec<Reaction>>,
    /// Events emitted before construction finished. `None` marks the point
    /// where reactions got connected.
    captured: RefCell<Option<Vec<Option<Event>>>>,
    initial_mutation: Cell<bool>,
    disposed: Cell<bool>,
}

impl ComponentData {
    fn new(name: String, ty: &ComponentType) -> Self {
        let mut values = HashMap::new();
        let mut handlers = BTreeMap::new();
        for name in ty.properties() {
            if let Some(spec) = ty.property(&name) {
                values.insert(name.clone(), spec.default_value().clone());
            }
            handlers.insert(name, Vec::new());
        }
        for name in ty.emitters() {
            handlers.insert(name, Vec::new());
        }
        let attributes = ty
            .attributes()
            .into_iter()
            .filter_map(|name| ty.attribute(&name).map(|a| (name.clone(), a.default_value().clone())))
            .collect();

        Self {
            name,
            ty: ty.clone(),
            values: RefCell::new(values),
            attributes: RefCell::new(attributes),
            handlers: RefCell::new(handlers),
            actions: RefCell::new(HashMap::new()),
            reactions: RefCell::new(Vec::new()),
            captured: RefCell::new(Some(Vec::new())),
            initial_mutation: Cell::new(false),
            disposed: Cell::new(false),
        }
    }

    /// Deliver an event to subscribers, or capture it during construction.
    fn dispatch(&self, event: Event) -> EventRef {
        if let Some(captured) = self.captured.borrow_mut().as_mut() {
            captured.push(Some(event.clone()));
            return Rc::new(event);
        }

        let event = Rc::new(event);
        let subscribers = self
            .handlers
            .borrow()
            .get(event.event_type())
            .cloned()
            .unwrap_or_default();
        for sub in subscribers {
            match sub.reconnect_index() {
                Some(index) => {
                    if event.allow_reconnect()
                        && let Err(err) = sub.reaction.reconnect(index)
                    {
                        tracing::error!(
                            component = %self.name,
                            reaction = sub.reaction.name(),
                            error = %err,
                            "error reconnecting reaction"
                        );
                    }
                }
                None => scheduler::add_reaction_event(&sub.reaction, event.clone()),
            }
        }
        event
    }
}

fn split_type_label(type_label: &str) -> (&str, Option<&str>) {
    match type_label.split_once(':') {
        Some((event_type, label)) if !label.is_empty() => (event_type, Some(label)),
        Some((event_type, _)) => (event_type, None),
        None => (type_label, None),
    }
}

// =============================================================================
// Component
// =============================================================================

/// Handle to a component. Copy, compare and hash freely; a handle to a
/// disposed component fails every operation with [`Error::Disposed`].
///
/// Handles are `!Send`: the arena they point into is per thread.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Component {
    id: ComponentId,
    _thread: PhantomData<*const ()>,
}

impl Component {
    pub(crate) fn from_id(id: ComponentId) -> Self {
        Self {
            id,
            _thread: PhantomData,
        }
    }

    /// Create a component of type `ty` with the given initial properties.
    pub fn new(ty: &ComponentType, props: Vec<(&str, PropInit)>) -> Result<Self> {
        Self::with_args(ty, props, Vec::new())
    }

    /// Like [`new`](Self::new), also passing `args` to the type's init hook.
    pub fn with_args(ty: &ComponentType, props: Vec<(&str, PropInit)>, args: Vec<Value>) -> Result<Self> {
        let name = registry::next_component_id(ty.name());
        let this = registry::allocate(ComponentData::new(name, ty));
        if let Err(err) = this.initialize(ty, props, &args) {
            this.dispose();
            return Err(err);
        }
        Ok(this)
    }

    fn initialize(&self, ty: &ComponentType, props: Vec<(&str, PropInit)>, args: &[Value]) -> Result<()> {
        let data = self.data()?;

        let mut given: Vec<(String, Value)> = Vec::new();
        let mut getters = Vec::new();
        for (name, init) in props {
            if ty.property(name).is_some() {
                match init {
                    PropInit::Static(value) => given.push((name.to_string(), value)),
                    PropInit::Getter(f) => getters.push((name.to_string(), f)),
                }
            } else if ty.attribute(name).is_some() {
                match init {
                    PropInit::Static(value) => {
                        data.attributes.borrow_mut().insert(name.to_string(), value);
                    }
                    PropInit::Getter(_) => {
                        return Err(Error::schema(
                            ty.name(),
                            format!("attribute `{name}` cannot take a getter"),
                        ));
                    }
                }
            } else {
                return Err(self.unknown_property(name));
            }
        }

        // Defaults first (sorted by name), then given values in order.
        let mut values: Vec<(String, Value)> = ty
            .properties()
            .into_iter()
            .filter(|name| !given.iter().any(|(n, _)| n == name))
            .filter_map(|name| {
                let default = ty.property(&name)?.default_value().clone();
                Some((name, default))
            })
            .collect();
        values.extend(given);

        {
            let _active = ActiveGuard::enter(*self);
            data.initial_mutation.set(true);
            let applied = values
                .iter()
                .try_for_each(|(name, value)| self.mutate(name, value.clone()).map(drop));
            data.initial_mutation.set(false);
            applied?;

            // User-written setters see the initial values too.
            for (name, value) in &values {
                let setter = setter_name(name);
                if ty.is_user_action(&setter) {
                    self.action(&setter)?.call(std::slice::from_ref(value))?;
                }
            }

            if let Some(init) = ty.init_fn() {
                init(self, args)?;
            }
        }

        if let Some(captured) = data.captured.borrow_mut().as_mut() {
            captured.push(None);
        }

        for (name, getter) in getters {
            let setter = setter_name(&name);
            if ty.action_fn(&setter).is_none() {
                return Err(Error::schema(
                    ty.name(),
                    format!("property `{name}` has no `{setter}` action to take a getter"),
                ));
            }
            let action = self.action(&setter)?;
            let handler = ReactionHandler::implicit(move |_| action.call(&[getter()]));
            let reaction = Reaction::new(*self, &format!("{name}_getter"), ReactionMode::Auto, handler, Vec::new())?;
            data.reactions.borrow_mut().push(reaction.clone());
            scheduler::add_reaction_event(&reaction, Event::init(*self));
        }

        for (name, spec) in ty.reaction_specs() {
            let reaction = Reaction::new(*self, name, spec.mode, spec.handler.clone(), spec.paths.clone())?;
            data.reactions.borrow_mut().push(reaction.clone());
            if spec.mode == ReactionMode::Auto {
                scheduler::add_reaction_event(&reaction, Event::init(*self));
            }
        }

        let this = *self;
        scheduler::call_soon(move || {
            this.flush_captured();
            Ok(())
        });
        Ok(())
    }

    /// Stop capturing and dispatch what was captured during construction.
    fn flush_captured(&self) {
        let Some(data) = self.try_data() else { return };
        let captured = data.captured.borrow_mut().take().unwrap_or_default();
        let mut allow_reconnect = false;
        for entry in captured {
            match entry {
                None => allow_reconnect = true,
                Some(event) => {
                    data.dispatch(event.with_allow_reconnect(allow_reconnect));
                }
            }
        }
    }

    // =========================================================================
    // Identity
    // =========================================================================

    pub fn raw_id(&self) -> ComponentId {
        self.id
    }

    pub(crate) fn try_data(&self) -> Option<Rc<ComponentData>> {
        registry::lookup(self.id).filter(|data| !data.disposed.get())
    }

    pub(crate) fn data(&self) -> Result<Rc<ComponentData>> {
        self.try_data()
            .ok_or_else(|| Error::disposed(format!("component #{}", self.id.index())))
    }

    /// Unique id, like `Person3`.
    pub fn id(&self) -> String {
        match registry::lookup(self.id) {
            Some(data) => data.name.clone(),
            None => format!("<disposed #{}>", self.id.index()),
        }
    }

    pub fn component_type(&self) -> Result<ComponentType> {
        Ok(self.data()?.ty.clone())
    }

    pub fn is_alive(&self) -> bool {
        self.try_data().is_some()
    }

    pub fn is_disposed(&self) -> bool {
        !self.is_alive()
    }

    fn unknown_property(&self, name: &str) -> Error {
        Error::UnknownProperty {
            component: self.id(),
            name: name.to_string(),
        }
    }

    // =========================================================================
    // Properties and attributes
    // =========================================================================

    /// Read a property. Inside an implicit reaction the read is recorded as
    /// a dependency.
    pub fn get(&self, name: &str) -> Result<Value> {
        let data = self.data()?;
        let value = data.values.borrow().get(name).cloned();
        match value {
            Some(value) => {
                scheduler::register_prop_access(*self, name);
                Ok(value)
            }
            None => Err(self.unknown_property(name)),
        }
    }

    /// Read a property without recording it.
    pub(crate) fn peek(&self, name: &str) -> Option<Value> {
        self.try_data()?.values.borrow().get(name).cloned()
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.try_data().is_some_and(|data| data.ty.property(name).is_some())
    }

    pub fn property(&self, name: &str) -> Result<Property> {
        if self.data()?.ty.property(name).is_none() {
            return Err(self.unknown_property(name));
        }
        Ok(Property::new(*self, name))
    }

    pub(crate) fn property_spec(&self, name: &str) -> Result<PropSpec> {
        let data = self.data()?;
        data.ty.property(name).cloned().ok_or_else(|| self.unknown_property(name))
    }

    /// Set a property. Returns whether an event was emitted.
    pub fn mutate(&self, name: &str, value: impl Into<Value>) -> Result<bool> {
        self.apply(name, Mutation::set(value))
    }

    /// Apply a mutation to a property. Returns whether an event was emitted.
    ///
    /// Only allowed from an action, or while this component is active.
    pub fn apply(&self, name: &str, mutation: Mutation) -> Result<bool> {
        let data = self.data()?;
        let spec = data
            .ty
            .property(name)
            .cloned()
            .ok_or_else(|| self.unknown_property(name))?;
        if !scheduler::can_mutate(*self) {
            return Err(Error::InvalidMutationContext {
                component: data.name.clone(),
                name: name.to_string(),
            });
        }

        let synthetic = mutation.is_synthetic();
        let payload = match mutation.kind() {
            MutationKind::Set => {
                let new_value = spec.validate(name, mutation.into_objects())?;
                let old_value = data
                    .values
                    .borrow_mut()
                    .insert(name.to_string(), new_value.clone())
                    .unwrap_or_default();
                if data.initial_mutation.get() {
                    EventData::Change {
                        old_value: new_value.clone(),
                        new_value,
                    }
                } else if old_value == new_value {
                    return Ok(false);
                } else {
                    EventData::Change { old_value, new_value }
                }
            }
            kind => {
                {
                    let mut values = data.values.borrow_mut();
                    let current = values.entry(name.to_string()).or_default();
                    apply_in_place(name, current, &mutation)?;
                }
                EventData::Splice {
                    mutation: kind,
                    index: mutation.index(),
                    objects: mutation.into_objects(),
                }
            }
        };

        data.dispatch(Event::new(name, *self, payload).with_synthetic(synthetic));
        Ok(true)
    }

    /// Read an attribute. `id` is built in.
    pub fn attribute(&self, name: &str) -> Result<Value> {
        let data = self.data()?;
        if name == "id" {
            return Ok(Value::Str(data.name.clone()));
        }
        data.attributes
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownMember {
                component: data.name.clone(),
                name: name.to_string(),
            })
    }

    /// Run `f` with this component active, so its properties may be mutated
    /// directly.
    pub fn scope<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        self.data()?;
        let _active = ActiveGuard::enter(*self);
        Ok(f())
    }

    // =========================================================================
    // Actions and emitters
    // =========================================================================

    /// The action called `name`. Created on first access and cached.
    pub fn action(&self, name: &str) -> Result<Action> {
        let data = self.data()?;
        if let Some(action) = data.actions.borrow().get(name) {
            return Ok(action.clone());
        }
        let func = data.ty.action_fn(name).ok_or_else(|| Error::UnknownAction {
            component: data.name.clone(),
            name: name.to_string(),
        })?;
        let action = Action::new(*self, name, func);
        data.actions.borrow_mut().insert(name.to_string(), action.clone());
        Ok(action)
    }

    /// Shorthand for `action(name)?.call(args)`.
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<()> {
        self.action(name)?.call(args)
    }

    pub fn emitter(&self, name: &str) -> Result<Emitter> {
        let data = self.data()?;
        let func = data.ty.emitter_fn(name).ok_or_else(|| Error::UnknownEmitter {
            component: data.name.clone(),
            name: name.to_string(),
        })?;
        Ok(Emitter::new(*self, name, func))
    }

    /// Emit an event of any type. Allowed outside actions.
    pub fn emit(&self, event_type: &str, fields: Fields) -> Result<EventRef> {
        if event_type.contains(':') {
            return Err(Error::LabelledEmit {
                event_type: event_type.to_string(),
            });
        }
        let data = self.data()?;
        Ok(data.dispatch(Event::new(event_type, *self, EventData::Fields(fields))))
    }

    // =========================================================================
    // Reactions
    // =========================================================================

    /// Create a reaction anchored at this component.
    pub fn reaction(
        &self,
        connections: &[&str],
        f: impl Fn(&Component, &[EventRef]) -> Result<()> + 'static,
    ) -> Result<Reaction> {
        self.add_reaction("reaction", ReactionMode::Normal, connections, ReactionHandler::explicit(f))
    }

    pub fn greedy_reaction(
        &self,
        connections: &[&str],
        f: impl Fn(&Component, &[EventRef]) -> Result<()> + 'static,
    ) -> Result<Reaction> {
        self.add_reaction("reaction", ReactionMode::Greedy, connections, ReactionHandler::explicit(f))
    }

    /// Create an implicit reaction anchored at this component. It runs once
    /// on the next iteration to discover what it reads.
    pub fn implicit_reaction(&self, f: impl Fn(&Component) -> Result<()> + 'static) -> Result<Reaction> {
        self.add_reaction("reaction", ReactionMode::Auto, &[], ReactionHandler::implicit(f))
    }

    fn add_reaction(
        &self,
        name: &str,
        mode: ReactionMode,
        connections: &[&str],
        handler: ReactionHandler,
    ) -> Result<Reaction> {
        let data = self.data()?;
        if mode != ReactionMode::Auto && connections.is_empty() {
            return Err(Error::schema(
                data.ty.name(),
                "an explicit reaction needs at least one connection string",
            ));
        }
        let paths = connections
            .iter()
            .map(|conn| ConnectionPath::parse(conn))
            .collect::<Result<Vec<_>>>()?;
        let reaction = Reaction::new(*self, name, mode, handler, paths)?;
        data.reactions.borrow_mut().push(reaction.clone());
        if mode == ReactionMode::Auto {
            scheduler::add_reaction_event(&reaction, Event::init(*self));
        }
        Ok(reaction)
    }

    /// The type-level reaction called `name`.
    pub fn reaction_named(&self, name: &str) -> Result<Reaction> {
        let data = self.data()?;
        let found = data
            .reactions
            .borrow()
            .iter()
            .find(|r| r.name() == name && data.ty.kind_of(name) == Some(MemberKind::Reaction))
            .cloned();
        found.ok_or_else(|| Error::UnknownMember {
            component: data.name.clone(),
            name: name.to_string(),
        })
    }

    /// Names of the type-level reactions, sorted.
    pub fn reaction_names(&self) -> Vec<String> {
        self.try_data().map(|data| data.ty.reactions()).unwrap_or_default()
    }

    /// Known event types: properties, emitters and anything subscribed to.
    pub fn event_types(&self) -> Vec<String> {
        self.try_data()
            .map(|data| data.handlers.borrow().keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Reactions subscribed to `type_label`, in dispatch order. A label
    /// (`"foo:label"`) narrows the result.
    pub fn event_handlers(&self, type_label: &str) -> Vec<Reaction> {
        let Some(data) = self.try_data() else { return Vec::new() };
        let (event_type, label) = split_type_label(type_label);
        let handlers = data.handlers.borrow();
        handlers
            .get(event_type)
            .map(|subs| {
                subs.iter()
                    .filter(|s| s.reconnect_index().is_none())
                    .filter(|s| label.is_none_or(|l| l == s.label))
                    .map(|s| s.reaction.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Subscribe `reaction` to `type_label`. Subscriptions are ordered by
    /// label, then by reaction creation; a second identical subscription is
    /// ignored.
    pub(crate) fn register_reaction(&self, type_label: &str, reaction: &Reaction, force: bool) {
        let Some(data) = self.try_data() else { return };
        let (event_type, label) = split_type_label(type_label);
        let label = label.unwrap_or(reaction.name()).to_string();
        let key = reaction.sort_key(&label);

        let unknown = {
            let mut handlers = data.handlers.borrow_mut();
            let unknown = !handlers.contains_key(event_type);
            let subs = handlers.entry(event_type.to_string()).or_default();
            match subs.binary_search_by(|s| s.key.cmp(&key)) {
                Ok(_) => return,
                Err(pos) => subs.insert(
                    pos,
                    Subscription {
                        label,
                        key,
                        reaction: reaction.clone(),
                    },
                ),
            }
            unknown
        };

        if unknown && !force && scheduler::config().warn_unknown_events {
            tracing::warn!(
                component = %data.name,
                event_type,
                reaction = reaction.name(),
                "reaction connects to unknown event type (prefix with `!` to suppress)"
            );
        }
    }

    /// Remove subscriptions to `type_label`. A label narrows the match; so
    /// does `reaction`.
    pub fn disconnect(&self, type_label: &str, reaction: Option<&Reaction>) {
        let Some(data) = self.try_data() else { return };
        let (event_type, label) = split_type_label(type_label);
        let mut handlers = data.handlers.borrow_mut();
        if let Some(subs) = handlers.get_mut(event_type) {
            subs.retain(|s| {
                let label_matches = label.is_none_or(|l| l == s.label);
                let reaction_matches = reaction.is_none_or(|r| *r == s.reaction);
                !(label_matches && reaction_matches)
            });
        }
    }

    // =========================================================================
    // Disposal
    // =========================================================================

    /// Dispose the component: drop every subscription to it, dispose the
    /// reactions anchored at it and release its slot. Idempotent.
    pub fn dispose(&self) {
        let Some(data) = registry::lookup(self.id) else { return };
        if data.disposed.replace(true) {
            return;
        }
        tracing::debug!(component = %data.name, "disposing component");

        let handlers = std::mem::take(&mut *data.handlers.borrow_mut());
        for sub in handlers.into_values().flatten() {
            sub.reaction.clear_component_refs(*self);
        }
        let reactions = std::mem::take(&mut *data.reactions.borrow_mut());
        for reaction in reactions {
            reaction.dispose();
        }
        data.actions.borrow_mut().clear();
        data.captured.borrow_mut().take();

        registry::release(self.id);
    }

    /// Run `callback` when this component is disposed.
    pub fn on_dispose(&self, callback: impl FnOnce() + 'static) {
        registry::on_dispose(*self, callback);
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.id())
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scheduler::{iter, reset_runtime};
    use crate::fields;

    fn setup() -> ComponentType {
        reset_runtime();
        ComponentType::builder("Person")
            .property(
                "age",
                PropSpec::int(0).settable().check(|v| match v.as_int() {
                    Some(n) if n >= 0 => Ok(v.clone()),
                    _ => Err(Error::custom("must be >= 0")),
                }),
            )
            .property("name", PropSpec::string("john").settable())
            .property("tags", PropSpec::list(vec![]))
            .property("meta", PropSpec::dict(Fields::new()))
            .attribute("role", AttrSpec::new("user"))
            .action("increase_age", |this, _| {
                let age = this.get("age")?.as_int().unwrap_or(0);
                this.mutate("age", age + 1).map(drop)
            })
            .action("add_tag", |this, args| {
                let tag = args.first().cloned().unwrap_or_default();
                this.apply("tags", Mutation::insert(0, vec![tag])).map(drop)
            })
            .emitter("pinged", |_, args| {
                Ok(Some(fields! { "count" => args.first().cloned().unwrap_or_default() }))
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_construction_defaults_and_given() {
        let ty = setup();
        let p = Component::new(&ty, vec![("age", 3.into())]).unwrap();
        assert_eq!(p.get("age").unwrap(), Value::Int(3));
        assert_eq!(p.get("name").unwrap(), Value::from("john"));
        assert_eq!(p.attribute("role").unwrap(), Value::from("user"));
        assert_eq!(p.attribute("id").unwrap(), Value::Str(p.id()));
        assert!(p.id().starts_with("Person"));
    }

    #[test]
    fn test_construction_errors_release_handle() {
        let ty = setup();
        let before = registry::live_count();
        let err = Component::new(&ty, vec![("nope", 1.into())]);
        assert!(matches!(err, Err(Error::UnknownProperty { .. })));
        let err = Component::new(&ty, vec![("age", (-1).into())]);
        assert!(matches!(err, Err(Error::Validation { .. })));
        assert_eq!(registry::live_count(), before);
    }

    #[test]
    fn test_mutation_context_guard() {
        let ty = setup();
        let p = Component::new(&ty, vec![]).unwrap();
        let err = p.mutate("age", 5);
        assert!(matches!(err, Err(Error::InvalidMutationContext { .. })));
        assert_eq!(p.get("age").unwrap(), Value::Int(0));

        // Allowed inside a scope
        assert!(p.scope(|| p.mutate("age", 5)).unwrap().unwrap());
        assert_eq!(p.get("age").unwrap(), Value::Int(5));
    }

    #[test]
    fn test_action_queued_until_iter() {
        let ty = setup();
        let p = Component::new(&ty, vec![]).unwrap();
        p.invoke("increase_age", &[]).unwrap();
        assert_eq!(p.get("age").unwrap(), Value::Int(0));
        iter().unwrap();
        assert_eq!(p.get("age").unwrap(), Value::Int(1));
    }

    #[test]
    fn test_generated_setter() {
        let ty = setup();
        let p = Component::new(&ty, vec![]).unwrap();
        p.invoke("set_name", &[Value::from("jane")]).unwrap();
        iter().unwrap();
        assert_eq!(p.get("name").unwrap(), Value::from("jane"));
    }

    #[test]
    fn test_unchanged_set_emits_nothing() {
        let ty = setup();
        let p = Component::new(&ty, vec![("age", 4.into())]).unwrap();
        p.scope(|| {
            assert!(!p.mutate("age", 4).unwrap());
            assert!(p.mutate("age", 5).unwrap());
        })
        .unwrap();
    }

    #[test]
    fn test_in_place_mutations() {
        let ty = setup();
        let p = Component::new(&ty, vec![]).unwrap();
        p.invoke("add_tag", &[Value::from("a")]).unwrap();
        p.invoke("add_tag", &[Value::from("b")]).unwrap();
        iter().unwrap();
        assert_eq!(p.get("tags").unwrap().to_string(), "[b, a]");

        p.scope(|| -> Result<()> {
            p.apply("meta", Mutation::merge(fields! { "k" => 1 }))?;
            let err = p.apply("name", Mutation::insert(0, vec![]));
            assert!(matches!(err, Err(Error::UnsupportedMutation { .. })));
            Ok(())
        })
        .unwrap()
        .unwrap();
        assert_eq!(p.get("meta").unwrap().to_string(), "{k: 1}");
    }

    #[test]
    fn test_failed_in_place_edit_changes_nothing() {
        let ty = setup();
        let p = Component::new(&ty, vec![("meta", fields! { "a" => 1, "b" => 2 }.into())]).unwrap();
        let seen = Rc::new(Cell::new(0));
        let seen_clone = seen.clone();
        p.reaction(&["meta"], move |_, events| {
            seen_clone.set(seen_clone.get() + events.len());
            Ok(())
        })
        .unwrap();
        iter().unwrap();
        let before = seen.get();

        let err = p.scope(|| p.apply("meta", Mutation::remove_keys(&["a", "zz"]))).unwrap();
        assert!(matches!(err, Err(Error::Validation { .. })));
        iter().unwrap();
        assert_eq!(p.get("meta").unwrap().to_string(), "{a: 1, b: 2}");
        assert_eq!(seen.get(), before);
    }

    #[test]
    fn test_unknown_members() {
        let ty = setup();
        let p = Component::new(&ty, vec![]).unwrap();
        assert!(matches!(p.get("x"), Err(Error::UnknownProperty { .. })));
        assert!(matches!(p.action("x"), Err(Error::UnknownAction { .. })));
        assert!(matches!(p.emitter("x"), Err(Error::UnknownEmitter { .. })));
        assert!(matches!(p.attribute("x"), Err(Error::UnknownMember { .. })));
    }

    #[test]
    fn test_emit_rejects_label() {
        let ty = setup();
        let p = Component::new(&ty, vec![]).unwrap();
        assert!(matches!(p.emit("a:b", Fields::new()), Err(Error::LabelledEmit { .. })));
        let ev = p.emitter("pinged").unwrap().call(&[Value::Int(2)]).unwrap().unwrap();
        assert_eq!(ev.event_type(), "pinged");
        assert_eq!(ev.field("count"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_event_types_include_props_and_emitters() {
        let ty = setup();
        let p = Component::new(&ty, vec![]).unwrap();
        assert_eq!(p.event_types(), vec!["age", "meta", "name", "pinged", "tags"]);
    }

    #[test]
    fn test_dispose() {
        let ty = setup();
        let p = Component::new(&ty, vec![]).unwrap();
        let action = p.action("increase_age").unwrap();
        p.dispose();
        assert!(p.is_disposed());
        assert!(matches!(p.get("age"), Err(Error::Disposed { .. })));
        assert!(matches!(action.call(&[]), Err(Error::Disposed { .. })));
        // Idempotent
        p.dispose();
    }
}
