//! # spark-event
//!
//! Reactive component runtime for Rust.
//!
//! Components own validated **properties**. Properties change only through
//! queued **actions**; every change is an **event**. **Reactions** subscribe
//! to events through connection strings like `"parent.children*.value"` that
//! follow the component structure as it changes, or implicitly by reading
//! properties. A cooperative loop runs it all in three phases per iteration:
//!
//! ```text
//! iter():  pending calls  ──▶  actions (mutate)  ──▶  reactions (observe)
//! ```
//!
//! ## Example
//!
//! ```
//! use spark_event::{Component, ComponentType, PropSpec, Value, iter, reset_runtime};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! reset_runtime();
//! let person = ComponentType::builder("Person")
//!     .property("age", PropSpec::int(0).settable())
//!     .build()
//!     .unwrap();
//!
//! let p = Component::new(&person, vec![("age", 3.into())]).unwrap();
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let log = seen.clone();
//! p.reaction(&["age"], move |_, events| {
//!     for ev in events {
//!         log.borrow_mut().push(ev.new_value().cloned().unwrap_or_default());
//!     }
//!     Ok(())
//! })
//! .unwrap();
//!
//! p.invoke("set_age", &[Value::Int(4)]).unwrap();
//! iter().unwrap();
//! assert_eq!(*seen.borrow(), vec![Value::Int(3), Value::Int(4)]);
//! ```
//!
//! ## Modules
//!
//! - [`types`] - `Value`, `Fields`, mutation kinds, reaction modes, phase flags
//! - [`engine`] - Component arena, the loop, host integration
//! - [`component`] - Component types, properties, actions, emitters, events
//! - [`reaction`] - Reactions and connection strings

pub mod component;
pub mod config;
pub mod engine;
pub mod error;
pub mod reaction;
pub mod types;

pub use types::{Fields, LoopPhase, MutationKind, ReactionMode, Value};

pub use error::{Error, Result};

pub use config::LoopConfig;

pub use component::{
    Action, ActionFn, AttrSpec, Check, Component, ComponentType, ComponentTypeBuilder, Emitter,
    EmitterFn, Event, EventData, EventRef, InitFn, MemberKind, Mutation, PropInit, PropKind,
    PropSpec, Property,
};

pub use reaction::{ConnectionPath, ImplicitFn, Reaction, ReactionFn, Segment, Selector};

pub use engine::{
    ComponentId, LoopHandle, batch, call_soon, clear_integration, config, configure,
    current_active, find_component, handle, has_pending, integrate, is_integrated,
    is_processing_actions, is_processing_reactions, iter, live_components, live_count, on_dispose,
    phase, reset, reset_config, reset_runtime, run_until_idle,
};
