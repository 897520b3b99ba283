//! Actions - the only way to mutate properties from outside construction.
//!
//! Calling an action from outside the action phase queues it; calling it
//! while actions are being processed (from another action) runs it right
//! away, so actions compose synchronously.

use std::fmt;
use std::rc::Rc;

use super::Component;
use crate::engine::scheduler;
use crate::error::{Error, Result};
use crate::types::Value;

/// Body of an action: receives its component and the call arguments.
pub type ActionFn = Rc<dyn Fn(&Component, &[Value]) -> Result<()>>;

/// An action bound to a component.
#[derive(Clone)]
pub struct Action(Rc<ActionInner>);

struct ActionInner {
    owner: Component,
    name: String,
    func: ActionFn,
}

impl Action {
    pub(crate) fn new(owner: Component, name: &str, func: ActionFn) -> Self {
        Self(Rc::new(ActionInner {
            owner,
            name: name.to_string(),
            func,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn owner(&self) -> Component {
        self.0.owner
    }

    /// Invoke the action.
    ///
    /// Runs synchronously when the loop is processing actions, otherwise
    /// queues the call for the next iteration. Errors from a synchronous
    /// run are returned to the caller.
    pub fn call(&self, args: &[Value]) -> Result<()> {
        if !self.0.owner.is_alive() {
            return Err(Error::disposed(format!(
                "component owning action `{}`",
                self.0.name
            )));
        }
        if scheduler::is_processing_actions() {
            self.run(args)
        } else {
            scheduler::add_action_invocation(self.clone(), args.to_vec());
            Ok(())
        }
    }

    /// Run the body now. Skipped if the owner has been disposed meanwhile.
    pub(crate) fn run(&self, args: &[Value]) -> Result<()> {
        let owner = self.0.owner;
        if !owner.is_alive() {
            return Ok(());
        }
        (self.0.func)(&owner, args)
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Action({}.{})", self.0.owner.id(), self.0.name)
    }
}
