//! Reactions - handlers connected to events.
//!
//! Three modes:
//!
//! - **Explicit** (`Normal`/`Greedy`): connected through connection strings
//!   and called with the batch of events that arrived for it.
//! - **Implicit** (`Auto`): no connection strings. Called with no events; the
//!   properties it reads become its connections, re-resolved after each run.
//!
//! A reaction is anchored at a component: connection strings are resolved
//! from it, and disposing it disposes the reaction.

pub mod path;
mod resolver;

pub use path::{ConnectionPath, Segment, Selector};

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use crate::component::{Component, EventRef};
use crate::error::{Error, Result};
use crate::types::ReactionMode;

/// Body of an explicit reaction.
pub type ReactionFn = Rc<dyn Fn(&Component, &[EventRef]) -> Result<()>>;

/// Body of an implicit reaction.
pub type ImplicitFn = Rc<dyn Fn(&Component) -> Result<()>>;

#[derive(Clone)]
pub(crate) enum ReactionHandler {
    Explicit(ReactionFn),
    Implicit(ImplicitFn),
}

impl ReactionHandler {
    pub(crate) fn explicit(f: impl Fn(&Component, &[EventRef]) -> Result<()> + 'static) -> Self {
        ReactionHandler::Explicit(Rc::new(f))
    }

    pub(crate) fn implicit(f: impl Fn(&Component) -> Result<()> + 'static) -> Self {
        ReactionHandler::Implicit(Rc::new(f))
    }
}

thread_local! {
    /// Creation counter. Ids order subscriptions that share a label.
    static NEXT_REACTION_ID: Cell<u64> = const { Cell::new(1) };
}

fn next_reaction_id() -> u64 {
    NEXT_REACTION_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    })
}

pub(crate) fn reset_reaction_ids() {
    NEXT_REACTION_ID.with(|next| next.set(1));
}

type Target = (Component, String);

struct Connection {
    path: ConnectionPath,
    /// Resolved subscriptions, including reconnect markers.
    objects: Vec<Target>,
}

struct ReactionInner {
    id: u64,
    name: String,
    mode: ReactionMode,
    /// `None` once disposed.
    anchor: Cell<Option<Component>>,
    handler: ReactionHandler,
    connections: RefCell<Vec<Connection>>,
    implicit: RefCell<Vec<Target>>,
}

/// Handle to a reaction. Clones share the same reaction.
#[derive(Clone)]
pub struct Reaction(Rc<ReactionInner>);

impl Reaction {
    /// Create a reaction anchored at `anchor` and resolve its connections.
    pub(crate) fn new(
        anchor: Component,
        name: &str,
        mode: ReactionMode,
        handler: ReactionHandler,
        paths: Vec<ConnectionPath>,
    ) -> Result<Self> {
        let count = paths.len();
        let reaction = Self(Rc::new(ReactionInner {
            id: next_reaction_id(),
            name: name.to_string(),
            mode,
            anchor: Cell::new(Some(anchor)),
            handler,
            connections: RefCell::new(
                paths
                    .into_iter()
                    .map(|path| Connection {
                        path,
                        objects: Vec::new(),
                    })
                    .collect(),
            ),
            implicit: RefCell::new(Vec::new()),
        }));
        for index in 0..count {
            if let Err(err) = reaction.reconnect(index) {
                reaction.dispose();
                return Err(err);
            }
        }
        Ok(reaction)
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn mode(&self) -> ReactionMode {
        self.0.mode
    }

    /// The component this reaction belongs to, unless disposed.
    pub fn anchor(&self) -> Option<Component> {
        self.0.anchor.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.0.anchor.get().is_none()
    }

    pub(crate) fn sort_key(&self, label: &str) -> (String, u64) {
        (label.to_string(), self.0.id)
    }

    /// Per connection string: the string and the `type:label` of each
    /// subscription it currently holds.
    pub fn connection_info(&self) -> Vec<(String, Vec<String>)> {
        self.0
            .connections
            .borrow()
            .iter()
            .map(|c| {
                let types = c.objects.iter().map(|(_, t)| t.clone()).collect();
                (c.path.fullname().to_string(), types)
            })
            .collect()
    }

    /// Components and property names an implicit reaction depends on.
    pub fn implicit_connections(&self) -> Vec<(Component, String)> {
        self.0.implicit.borrow().clone()
    }

    // =========================================================================
    // Calling
    // =========================================================================

    /// Call the handler directly with `events`, bypassing the loop.
    pub fn call(&self, events: &[EventRef]) -> Result<()> {
        self.invoke(events)
    }

    pub(crate) fn invoke(&self, events: &[EventRef]) -> Result<()> {
        let Some(anchor) = self.anchor() else {
            return Ok(());
        };
        if !anchor.is_alive() {
            self.dispose();
            return Ok(());
        }
        match &self.0.handler {
            ReactionHandler::Explicit(f) => f(&anchor, events),
            ReactionHandler::Implicit(f) => f(&anchor),
        }
    }

    // =========================================================================
    // Connecting
    // =========================================================================

    /// Re-resolve connection `index` and update subscriptions.
    ///
    /// Fails with `UnresolvableConnection` when nothing can be connected;
    /// the previous subscriptions then stay in place.
    pub(crate) fn reconnect(&self, index: usize) -> Result<()> {
        let Some(anchor) = self.anchor() else {
            return Ok(());
        };
        if !anchor.is_alive() {
            self.dispose();
            return Ok(());
        }

        let path = match self.0.connections.borrow().get(index) {
            Some(connection) => connection.path.clone(),
            None => return Ok(()),
        };
        let type_label = path.type_label(&self.0.name);
        let new_objects = resolver::resolve(&path, index, &type_label, anchor)?;
        if new_objects.is_empty() {
            return Err(Error::UnresolvableConnection {
                path: path.fullname().to_string(),
                reason: "nothing to connect to".into(),
            });
        }

        let old_objects = {
            let mut connections = self.0.connections.borrow_mut();
            std::mem::replace(&mut connections[index].objects, new_objects.clone())
        };
        self.connect_and_disconnect(&old_objects, &new_objects, path.is_forced());
        Ok(())
    }

    pub(crate) fn implicit_connections_differ(&self, connections: &[Target]) -> bool {
        *self.0.implicit.borrow() != connections
    }

    /// Replace the implicit connections with what the last run read.
    pub(crate) fn update_implicit_connections(&self, connections: Vec<Target>) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::disposed(format!("reaction `{}`", self.0.name)));
        }
        let old = std::mem::replace(&mut *self.0.implicit.borrow_mut(), connections.clone());
        self.connect_and_disconnect(&old, &connections, false);
        Ok(())
    }

    /// Move subscriptions from `old` to `new`, leaving the common prefix and
    /// suffix untouched.
    fn connect_and_disconnect(&self, old: &[Target], new: &[Target], force: bool) {
        let mut stay: HashSet<&Target> = HashSet::new();

        let mut i1 = 0;
        while i1 < new.len() && i1 < old.len() && new[i1] == old[i1] {
            stay.insert(&new[i1]);
            i1 += 1;
        }
        let (mut i2, mut i3) = (new.len(), old.len());
        while i2 > i1 && i3 > i1 && new[i2 - 1] == old[i3 - 1] {
            stay.insert(&new[i2 - 1]);
            i2 -= 1;
            i3 -= 1;
        }

        for target in &old[i1..i3] {
            if !stay.contains(target) {
                target.0.disconnect(&target.1, Some(self));
            }
        }
        for (component, type_label) in &new[i1..i2] {
            component.register_reaction(type_label, self, force);
        }
    }

    /// Forget `component` after it was disposed. The reaction keeps working
    /// for its other sources.
    pub(crate) fn clear_component_refs(&self, component: Component) {
        self.0.implicit.borrow_mut().retain(|(c, _)| *c != component);
        for connection in self.0.connections.borrow_mut().iter_mut() {
            connection.objects.retain(|(c, _)| *c != component);
        }
    }

    /// Disconnect from every source and stop. Idempotent.
    pub fn dispose(&self) {
        if self.0.anchor.take().is_none() {
            return;
        }
        tracing::debug!(reaction = %self.0.name, id = self.0.id, "disposing reaction");

        let implicit = std::mem::take(&mut *self.0.implicit.borrow_mut());
        for (component, event_type) in implicit {
            component.disconnect(&event_type, Some(self));
        }
        let connections = std::mem::take(&mut *self.0.connections.borrow_mut());
        for connection in connections {
            for (component, type_label) in connection.objects {
                component.disconnect(&type_label, Some(self));
            }
        }
    }
}

impl PartialEq for Reaction {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Reaction {}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<String> = self
            .0
            .connections
            .borrow()
            .iter()
            .map(|c| c.objects.len().to_string())
            .collect();
        write!(
            f,
            "Reaction({} r{}, {}, {} connections)",
            self.0.name,
            self.0.id,
            self.0.mode,
            counts.join("+")
        )
    }
}
