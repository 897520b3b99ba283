//! Engine - Component arena and the cooperative loop.
//!
//! - Registry: arena slots, liveness, id lookup, active stack, dispose callbacks
//! - Scheduler: the three queues, phase flags, coalescing, read tracking
//! - Host: run-soon hook and the cross-thread `LoopHandle`
//!
//! # Architecture
//!
//! Components are NOT shared objects. A [`Component`](crate::Component) is a
//! `Copy` handle into a per-thread arena:
//!
//! ```text
//! slot 0: Person1  (serial 1, props {age: 3, name: "x"})
//! slot 1: <free>
//! slot 2: Node7    (serial 9, props {val: 17, parent: Node5})
//! ```
//!
//! Handles carry the slot serial, so a handle to a disposed component never
//! resolves, even after its slot is reused.

pub mod host;
pub mod registry;
pub mod scheduler;

pub use host::{LoopHandle, clear_integration, handle, integrate, is_integrated};
pub use registry::{ComponentId, current_active, find_component, live_components, live_count, on_dispose};
pub use scheduler::{
    batch, call_soon, config, configure, has_pending, is_processing_actions, is_processing_reactions,
    iter, phase, reset, reset_config, reset_runtime, run_until_idle,
};
