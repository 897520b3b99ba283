//! Component Registry - Arena slots for live components.
//!
//! Manages the lifecycle of component handles:
//! - Slot allocation with a free index pool for O(1) reuse
//! - Serial numbers so stale handles never alias a reused slot
//! - String id lookup (`Person3` -> handle)
//! - Active component stack for construction and context scopes
//! - Dispose callbacks per component

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::component::{Component, ComponentData};

/// Arena address of a component. The serial is never reused, so a handle
/// whose slot was released and reallocated no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId {
    pub(crate) index: u32,
    pub(crate) serial: u64,
}

impl ComponentId {
    pub fn index(&self) -> u32 {
        self.index
    }
}

struct Slot {
    serial: u64,
    data: Rc<ComponentData>,
}

/// Counter for component ids. Process-wide so ids stay unique across threads.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

// =============================================================================
// Registry State
// =============================================================================

thread_local! {
    /// Slot per arena index. `None` marks a released slot.
    static SLOTS: RefCell<Vec<Option<Slot>>> = const { RefCell::new(Vec::new()) };

    /// Pool of freed indices for reuse.
    static FREE_INDICES: RefCell<Vec<u32>> = const { RefCell::new(Vec::new()) };

    /// Serial for the next allocation. Survives `reset_registry`.
    static NEXT_SERIAL: Cell<u64> = const { Cell::new(1) };

    /// Map component id to handle.
    static ID_TO_HANDLE: RefCell<HashMap<String, ComponentId>> = RefCell::new(HashMap::new());

    /// Components currently in construction or entered as a context.
    static ACTIVE_STACK: RefCell<Vec<Component>> = const { RefCell::new(Vec::new()) };

    /// Dispose callbacks registered per component.
    static DISPOSE_CALLBACKS: RefCell<HashMap<ComponentId, Vec<Box<dyn FnOnce()>>>> = RefCell::new(HashMap::new());
}

// =============================================================================
// Allocation
// =============================================================================

/// Generate the next unique id for a component of `type_name`.
pub(crate) fn next_component_id(type_name: &str) -> String {
    let n = ID_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("{type_name}{n}")
}

/// Allocate a slot for `data` and return its handle.
pub(crate) fn allocate(data: ComponentData) -> Component {
    let serial = NEXT_SERIAL.with(|next| {
        let serial = next.get();
        next.set(serial + 1);
        serial
    });

    let index = FREE_INDICES.with(|free| free.borrow_mut().pop());
    let index = match index {
        Some(index) => index,
        None => SLOTS.with(|slots| {
            let mut slots = slots.borrow_mut();
            slots.push(None);
            (slots.len() - 1) as u32
        }),
    };

    let id = ComponentId { index, serial };
    ID_TO_HANDLE.with(|map| {
        map.borrow_mut().insert(data.name.clone(), id);
    });
    SLOTS.with(|slots| {
        slots.borrow_mut()[index as usize] = Some(Slot {
            serial,
            data: Rc::new(data),
        });
    });

    Component::from_id(id)
}

/// Release a slot back to the pool, running its dispose callbacks.
pub(crate) fn release(id: ComponentId) {
    let slot = SLOTS.with(|slots| {
        let mut slots = slots.borrow_mut();
        match slots.get_mut(id.index as usize) {
            Some(entry) if entry.as_ref().is_some_and(|s| s.serial == id.serial) => entry.take(),
            _ => None,
        }
    });
    let Some(slot) = slot else { return };

    ID_TO_HANDLE.with(|map| {
        map.borrow_mut().remove(&slot.data.name);
    });
    FREE_INDICES.with(|free| {
        free.borrow_mut().push(id.index);
    });

    run_dispose_callbacks(id);

    // Dropped last: callbacks may still look at the component's id.
    drop(slot);
}

/// Resolve a handle to its data, if it is still alive.
pub(crate) fn lookup(id: ComponentId) -> Option<Rc<ComponentData>> {
    SLOTS.with(|slots| {
        let slots = slots.borrow();
        match slots.get(id.index as usize) {
            Some(Some(slot)) if slot.serial == id.serial => Some(slot.data.clone()),
            _ => None,
        }
    })
}

// =============================================================================
// Active Component Stack
// =============================================================================

/// Push a component onto the active stack.
pub(crate) fn push_active(component: Component) {
    ACTIVE_STACK.with(|stack| stack.borrow_mut().push(component));
}

/// Innermost active component.
pub fn current_active() -> Option<Component> {
    ACTIVE_STACK.with(|stack| stack.borrow().last().copied())
}

pub(crate) fn has_active() -> bool {
    ACTIVE_STACK.with(|stack| !stack.borrow().is_empty())
}

pub(crate) fn is_active(component: Component) -> bool {
    ACTIVE_STACK.with(|stack| stack.borrow().contains(&component))
}

/// Restores the active stack when dropped.
pub(crate) struct ActiveGuard(Component);

impl ActiveGuard {
    pub(crate) fn enter(component: Component) -> Self {
        push_active(component);
        Self(component)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let _ = ACTIVE_STACK.try_with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|c| *c == self.0) {
                stack.remove(pos);
            }
        });
    }
}

// =============================================================================
// Dispose Callbacks
// =============================================================================

/// Register a callback to run when `component` is disposed.
///
/// Callbacks registered on a dead handle are dropped without running.
pub fn on_dispose(component: Component, callback: impl FnOnce() + 'static) {
    if !component.is_alive() {
        return;
    }
    DISPOSE_CALLBACKS.with(|callbacks| {
        callbacks
            .borrow_mut()
            .entry(component.raw_id())
            .or_default()
            .push(Box::new(callback));
    });
}

fn run_dispose_callbacks(id: ComponentId) {
    let callbacks = DISPOSE_CALLBACKS.with(|callbacks| callbacks.borrow_mut().remove(&id));
    if let Some(callbacks) = callbacks {
        for callback in callbacks {
            callback();
        }
    }
}

// =============================================================================
// Lookups
// =============================================================================

/// Find a live component by its id string.
pub fn find_component(id: &str) -> Option<Component> {
    ID_TO_HANDLE.with(|map| map.borrow().get(id).copied().map(Component::from_id))
}

/// All live components, in slot order.
pub fn live_components() -> Vec<Component> {
    SLOTS.with(|slots| {
        slots
            .borrow()
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.as_ref().map(|s| {
                    Component::from_id(ComponentId {
                        index: index as u32,
                        serial: s.serial,
                    })
                })
            })
            .collect()
    })
}

/// Number of live components.
pub fn live_count() -> usize {
    SLOTS.with(|slots| slots.borrow().iter().filter(|s| s.is_some()).count())
}

// =============================================================================
// Reset (for testing)
// =============================================================================

/// Drop every slot without running dispose logic. Serials keep counting so
/// handles from before the reset stay dead.
pub(crate) fn reset_registry() {
    let slots = SLOTS.with(|slots| std::mem::take(&mut *slots.borrow_mut()));
    FREE_INDICES.with(|free| free.borrow_mut().clear());
    ID_TO_HANDLE.with(|map| map.borrow_mut().clear());
    ACTIVE_STACK.with(|stack| stack.borrow_mut().clear());
    DISPOSE_CALLBACKS.with(|callbacks| callbacks.borrow_mut().clear());
    drop(slots);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentType, PropSpec};

    fn setup() -> ComponentType {
        crate::reset_runtime();
        ComponentType::builder("Thing")
            .property("x", PropSpec::int(0))
            .build()
            .unwrap()
    }

    #[test]
    fn test_allocate_and_lookup() {
        let ty = setup();
        let a = Component::new(&ty, vec![]).unwrap();
        let b = Component::new(&ty, vec![]).unwrap();

        assert_ne!(a, b);
        assert!(lookup(a.raw_id()).is_some());
        assert_eq!(live_count(), 2);
        assert_eq!(find_component(&a.id()), Some(a));
        assert_eq!(live_components(), vec![a, b]);
    }

    #[test]
    fn test_release_and_reuse() {
        let ty = setup();
        let a = Component::new(&ty, vec![]).unwrap();
        let index = a.raw_id().index();
        a.dispose();

        assert!(!a.is_alive());
        assert_eq!(find_component(&a.id()), None);

        // Should reuse the freed index, but the old handle stays dead
        let b = Component::new(&ty, vec![]).unwrap();
        assert_eq!(b.raw_id().index(), index);
        assert_ne!(a, b);
        assert!(!a.is_alive());
        assert!(b.is_alive());
    }

    #[test]
    fn test_ids_are_unique() {
        let ty = setup();
        let a = Component::new(&ty, vec![]).unwrap();
        let b = Component::new(&ty, vec![]).unwrap();
        assert!(a.id().starts_with("Thing"));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_active_stack() {
        let ty = setup();
        let a = Component::new(&ty, vec![]).unwrap();
        let b = Component::new(&ty, vec![]).unwrap();

        assert_eq!(current_active(), None);
        {
            let _outer = ActiveGuard::enter(a);
            let _inner = ActiveGuard::enter(b);
            assert_eq!(current_active(), Some(b));
            assert!(is_active(a));
        }
        assert!(!has_active());
    }

    #[test]
    fn test_dispose_callback() {
        use std::cell::Cell;
        use std::rc::Rc;

        let ty = setup();
        let called = Rc::new(Cell::new(false));
        let called_clone = called.clone();

        let a = Component::new(&ty, vec![]).unwrap();
        on_dispose(a, move || {
            called_clone.set(true);
        });

        assert!(!called.get());
        a.dispose();
        assert!(called.get());
    }
}
