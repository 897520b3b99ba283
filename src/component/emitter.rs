//! Emitters - turn a call into an event.

use std::fmt;
use std::rc::Rc;

use super::{Component, EventRef};
use crate::error::Result;
use crate::types::{Fields, Value};

/// Body of an emitter. `Some(fields)` emits an event of the emitter's name;
/// `None` emits nothing.
pub type EmitterFn = Rc<dyn Fn(&Component, &[Value]) -> Result<Option<Fields>>>;

/// An emitter bound to a component.
#[derive(Clone)]
pub struct Emitter {
    owner: Component,
    name: String,
    func: EmitterFn,
}

impl Emitter {
    pub(crate) fn new(owner: Component, name: &str, func: EmitterFn) -> Self {
        Self {
            owner,
            name: name.to_string(),
            func,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the body and emit its result. Emitting never requires the action
    /// phase.
    pub fn call(&self, args: &[Value]) -> Result<Option<EventRef>> {
        self.owner.data()?;
        match (self.func)(&self.owner, args)? {
            Some(fields) => self.owner.emit(&self.name, fields).map(Some),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Emitter({}.{})", self.owner.id(), self.name)
    }
}
