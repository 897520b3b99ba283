//! Events - immutable records of something that happened on a component.

use std::rc::Rc;

use super::Component;
use crate::types::{Fields, MutationKind, Value};

/// Shared handle to an event. One event may be queued for many reactions.
pub type EventRef = Rc<Event>;

/// Payload of an [`Event`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    /// A property was set.
    Change { old_value: Value, new_value: Value },
    /// A list or dict property was edited in place.
    Splice {
        mutation: MutationKind,
        index: isize,
        objects: Value,
    },
    /// Emitted by an emitter or `Component::emit`.
    Fields(Fields),
    /// First call of an implicit reaction.
    Init,
}

#[derive(Debug, Clone)]
pub struct Event {
    event_type: String,
    source: Component,
    data: EventData,
    synthetic: bool,
    allow_reconnect: bool,
}

impl Event {
    pub(crate) fn new(event_type: impl Into<String>, source: Component, data: EventData) -> Self {
        Self {
            event_type: event_type.into(),
            source,
            data,
            synthetic: false,
            allow_reconnect: true,
        }
    }

    pub(crate) fn init(source: Component) -> EventRef {
        Rc::new(Self::new("", source, EventData::Init))
    }

    pub(crate) fn with_synthetic(mut self, synthetic: bool) -> Self {
        self.synthetic = synthetic;
        self
    }

    pub(crate) fn with_allow_reconnect(mut self, allow: bool) -> Self {
        self.allow_reconnect = allow;
        self
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn source(&self) -> Component {
        self.source
    }

    pub fn data(&self) -> &EventData {
        &self.data
    }

    /// Mutation kind for property events; `Set` for plain changes.
    pub fn mutation(&self) -> Option<MutationKind> {
        match &self.data {
            EventData::Change { .. } => Some(MutationKind::Set),
            EventData::Splice { mutation, .. } => Some(*mutation),
            _ => None,
        }
    }

    pub fn old_value(&self) -> Option<&Value> {
        match &self.data {
            EventData::Change { old_value, .. } => Some(old_value),
            _ => None,
        }
    }

    pub fn new_value(&self) -> Option<&Value> {
        match &self.data {
            EventData::Change { new_value, .. } => Some(new_value),
            _ => None,
        }
    }

    pub fn index(&self) -> Option<isize> {
        match &self.data {
            EventData::Splice { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn objects(&self) -> Option<&Value> {
        match &self.data {
            EventData::Splice { objects, .. } => Some(objects),
            _ => None,
        }
    }

    /// Field of an emitted event.
    pub fn field(&self, key: &str) -> Option<&Value> {
        match &self.data {
            EventData::Fields(fields) => fields.get(key),
            _ => None,
        }
    }

    /// True if the change was mirrored from elsewhere rather than made here.
    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    pub(crate) fn allow_reconnect(&self) -> bool {
        self.allow_reconnect
    }

    /// True if the event carries a component-like value, which may change
    /// what a dynamic connection resolves to.
    pub(crate) fn touches_components(&self) -> bool {
        match &self.data {
            EventData::Change { old_value, new_value } => {
                old_value.looks_like_component() || new_value.looks_like_component()
            }
            EventData::Splice { objects, .. } => objects.looks_like_component(),
            _ => false,
        }
    }
}
