//! Scheduler - The per-thread cooperative loop.
//!
//! One iteration drains three queues in a fixed order:
//!
//! ```text
//! iter()
//!   1. pending calls      call_soon() closures, then the cross-thread inbox
//!   2. pending actions    queued action invocations, FIFO
//!   3. pending reactions  coalesced (reaction, events) entries
//! ```
//!
//! Each phase keeps draining until its queue is empty, so work queued for a
//! phase while that phase runs is handled in the same iteration.
//! Actions queued by reactions land in phase 2 of the *next* iteration.
//!
//! The scheduler also records property reads made while an implicit
//! reaction runs, and decides whether a component may be mutated.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use crate::component::{Action, Component, EventRef};
use crate::config::LoopConfig;
use crate::engine::host::{self, Inbox};
use crate::engine::registry;
use crate::error::{Error, Result};
use crate::reaction::Reaction;
use crate::types::{LoopPhase, ReactionMode, Value};

type PendingCall = Box<dyn FnOnce() -> Result<()>>;

/// What the events of a queued reaction entry have in common.
#[derive(Debug, Clone, PartialEq)]
enum Representative {
    /// Implicit entry: no events.
    Empty,
    /// All events share this source and type.
    Uniform { source: Component, event_type: String },
    /// Events from more than one (source, type).
    Mixed,
}

impl Representative {
    fn of(event: &EventRef) -> Self {
        Representative::Uniform {
            source: event.source(),
            event_type: event.event_type().to_string(),
        }
    }

    fn matches(&self, event: &EventRef) -> bool {
        match self {
            Representative::Uniform { source, event_type } => {
                *source == event.source() && event_type == event.event_type()
            }
            _ => false,
        }
    }
}

struct PendingReaction {
    reaction: Reaction,
    representative: Representative,
    events: Vec<EventRef>,
    /// Set when an event carried a component-like value; forces an
    /// implicit reaction to re-resolve its connections.
    touches_components: bool,
}

struct LoopState {
    phase: LoopPhase,
    config: LoopConfig,
    pending_calls: Vec<PendingCall>,
    pending_actions: Vec<(Action, Vec<Value>)>,
    pending_reactions: Vec<PendingReaction>,
    /// Reaction id -> index into `pending_reactions`, for greedy lookups.
    pending_reaction_ids: HashMap<u64, usize>,
    /// Implicit reaction currently running, if any.
    tracking: bool,
    /// Reads recorded for the running implicit reaction, in first-read order.
    prop_access: Vec<(Component, Vec<String>)>,
    inbox: Arc<Inbox>,
}

impl LoopState {
    fn new() -> Self {
        Self {
            phase: LoopPhase::IDLE,
            config: LoopConfig::default(),
            pending_calls: Vec::new(),
            pending_actions: Vec::new(),
            pending_reactions: Vec::new(),
            pending_reaction_ids: HashMap::new(),
            tracking: false,
            prop_access: Vec::new(),
            inbox: Arc::new(Inbox::for_current_thread()),
        }
    }

    fn has_pending(&self) -> bool {
        !self.pending_calls.is_empty()
            || !self.pending_actions.is_empty()
            || !self.pending_reactions.is_empty()
            || self.inbox.has_pending()
    }

    fn clear_queues(&mut self) {
        self.pending_calls.clear();
        self.pending_actions.clear();
        self.pending_reactions.clear();
        self.pending_reaction_ids.clear();
        self.tracking = false;
        self.prop_access.clear();
    }
}

// =============================================================================
// Loop State
// =============================================================================

thread_local! {
    static LOOP: RefCell<LoopState> = RefCell::new(LoopState::new());
}

fn with_loop<R>(f: impl FnOnce(&mut LoopState) -> R) -> R {
    LOOP.with(|state| f(&mut state.borrow_mut()))
}

/// Sets a phase flag for its lifetime.
struct PhaseGuard(LoopPhase);

impl PhaseGuard {
    fn enter(flag: LoopPhase) -> Self {
        with_loop(|state| state.phase.insert(flag));
        Self(flag)
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        let flag = self.0;
        let _ = LOOP.try_with(|state| match state.try_borrow_mut() {
            Ok(mut state) => state.phase.remove(flag),
            Err(_) => tracing::error!(?flag, "loop state busy, phase flag not cleared"),
        });
    }
}

/// Enables read tracking for one implicit reaction call.
struct TrackingGuard;

impl TrackingGuard {
    fn enter() -> Self {
        with_loop(|state| {
            state.tracking = true;
            state.prop_access.clear();
        });
        Self
    }
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        let _ = LOOP.try_with(|state| match state.try_borrow_mut() {
            Ok(mut state) => state.tracking = false,
            Err(_) => tracing::error!("loop state busy, read tracking not stopped"),
        });
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Install a configuration for this thread's loop.
pub fn configure(config: LoopConfig) {
    with_loop(|state| state.config = config);
}

/// Current configuration of this thread's loop.
pub fn config() -> LoopConfig {
    with_loop(|state| state.config)
}

/// Restore the default configuration.
pub fn reset_config() {
    configure(LoopConfig::default());
}

// =============================================================================
// Queries
// =============================================================================

pub fn phase() -> LoopPhase {
    with_loop(|state| state.phase)
}

pub fn is_processing_actions() -> bool {
    phase().contains(LoopPhase::PROCESSING_ACTIONS)
}

pub fn is_processing_reactions() -> bool {
    phase().contains(LoopPhase::PROCESSING_REACTIONS)
}

/// True if any queue (including the cross-thread inbox) holds work.
pub fn has_pending() -> bool {
    with_loop(|state| state.has_pending())
}

pub(crate) fn inbox() -> Arc<Inbox> {
    with_loop(|state| state.inbox.clone())
}

/// Whether `component` may be mutated right now.
///
/// While any component is active only the active ones may be mutated;
/// otherwise mutation is allowed during the action phase.
pub(crate) fn can_mutate(component: Component) -> bool {
    if registry::has_active() {
        registry::is_active(component)
    } else {
        is_processing_actions()
    }
}

// =============================================================================
// Scheduling
// =============================================================================

/// Ask the host to run `iter()` soon. Requests collapse until the next
/// iteration starts.
pub(crate) fn schedule_iter() {
    let first = with_loop(|state| {
        if state.phase.contains(LoopPhase::ITER_SCHEDULED) {
            false
        } else {
            state.phase.insert(LoopPhase::ITER_SCHEDULED);
            true
        }
    });
    if first {
        host::request_iter();
    }
}

/// Queue a closure to run at the start of the next iteration.
pub fn call_soon(f: impl FnOnce() -> Result<()> + 'static) {
    with_loop(|state| state.pending_calls.push(Box::new(f)));
    schedule_iter();
}

pub(crate) fn add_action_invocation(action: Action, args: Vec<Value>) {
    with_loop(|state| state.pending_actions.push((action, args)));
    schedule_iter();
}

/// Queue `event` for `reaction`, merging with an existing entry if allowed.
pub(crate) fn add_reaction_event(reaction: &Reaction, event: EventRef) {
    let queued = with_loop(|state| {
        let touches = event.touches_components();
        match reaction.mode() {
            ReactionMode::Normal => {
                for item in state.pending_reactions.iter_mut().rev() {
                    if item.reaction == *reaction {
                        if !item.representative.matches(&event) {
                            item.representative = Representative::Mixed;
                        }
                        item.events.push(event);
                        return false;
                    }
                    let compatible = item.representative == Representative::Empty
                        || item.representative.matches(&event);
                    if !compatible {
                        break;
                    }
                }
            }
            ReactionMode::Greedy | ReactionMode::Auto => {
                if let Some(&index) = state.pending_reaction_ids.get(&reaction.id()) {
                    let item = &mut state.pending_reactions[index];
                    if reaction.mode() == ReactionMode::Greedy {
                        item.events.push(event);
                    }
                    item.touches_components |= touches;
                    return false;
                }
            }
        }

        let item = if reaction.mode() == ReactionMode::Auto {
            PendingReaction {
                reaction: reaction.clone(),
                representative: Representative::Empty,
                events: Vec::new(),
                touches_components: touches,
            }
        } else {
            PendingReaction {
                reaction: reaction.clone(),
                representative: Representative::of(&event),
                events: vec![event],
                touches_components: touches,
            }
        };
        state
            .pending_reaction_ids
            .insert(reaction.id(), state.pending_reactions.len());
        state.pending_reactions.push(item);
        true
    });
    if queued {
        schedule_iter();
    }
}

/// Record that `name` of `component` was read. Only reads made while an
/// implicit reaction runs are kept.
pub(crate) fn register_prop_access(component: Component, name: &str) {
    with_loop(|state| {
        if !state.tracking || !state.phase.contains(LoopPhase::PROCESSING_REACTIONS) {
            return;
        }
        match state.prop_access.iter_mut().find(|(c, _)| *c == component) {
            Some((_, names)) => {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
            None => state.prop_access.push((component, vec![name.to_string()])),
        }
    });
}

// =============================================================================
// Iteration
// =============================================================================

/// Run one iteration: pending calls, then actions, then reactions.
///
/// Fails with [`Error::ReentrantIter`] when called from inside an iteration.
pub fn iter() -> Result<()> {
    let (reentrant, check_active) = with_loop(|state| {
        if state.phase.contains(LoopPhase::IN_ITER) {
            (true, false)
        } else {
            state.phase.remove(LoopPhase::ITER_SCHEDULED);
            (false, state.config.check_active_components)
        }
    });
    if reentrant {
        return Err(Error::ReentrantIter);
    }
    let _iter = PhaseGuard::enter(LoopPhase::IN_ITER);

    if check_active && let Some(active) = registry::current_active() {
        tracing::warn!(
            component = %active.id(),
            "loop is iterating while a component is still active"
        );
    }

    tracing::trace!("iter: calls");
    process_calls();
    tracing::trace!("iter: actions");
    process_actions();
    tracing::trace!("iter: reactions");
    process_reactions();
    Ok(())
}

fn drain_limit_reached(phase: &str, rounds: usize, limit: usize) -> bool {
    if rounds >= limit {
        tracing::error!(phase, rounds, "drain limit reached, leaving work for the next iteration");
        true
    } else {
        false
    }
}

fn process_calls() {
    let limit = config().max_drain_rounds;
    let mut rounds = 0;
    loop {
        let inbox = inbox().drain();
        let calls = with_loop(|state| std::mem::take(&mut state.pending_calls));
        if inbox.is_empty() && calls.is_empty() {
            break;
        }
        for call in inbox {
            call();
        }
        for call in calls {
            if let Err(err) = call() {
                tracing::error!(error = %err, "error in pending call");
            }
        }
        rounds += 1;
        if drain_limit_reached("calls", rounds, limit) {
            break;
        }
    }
}

fn process_actions() {
    let limit = config().max_drain_rounds;
    let _phase = PhaseGuard::enter(LoopPhase::PROCESSING_ACTIONS);
    let mut rounds = 0;
    loop {
        let actions = with_loop(|state| std::mem::take(&mut state.pending_actions));
        if actions.is_empty() {
            break;
        }
        for (action, args) in actions {
            if let Err(err) = action.run(&args) {
                tracing::error!(
                    component = %action.owner().id(),
                    action = action.name(),
                    error = %err,
                    "error in action"
                );
            }
        }
        rounds += 1;
        if drain_limit_reached("actions", rounds, limit) {
            break;
        }
    }
}

fn process_reactions() {
    let limit = config().max_drain_rounds;
    let _phase = PhaseGuard::enter(LoopPhase::PROCESSING_REACTIONS);
    let mut rounds = 0;
    loop {
        let batch = with_loop(|state| {
            state.pending_reaction_ids.clear();
            std::mem::take(&mut state.pending_reactions)
        });
        if batch.is_empty() {
            break;
        }
        for item in batch {
            run_reaction(item);
        }
        rounds += 1;
        if drain_limit_reached("reactions", rounds, limit) {
            break;
        }
    }
}

fn run_reaction(item: PendingReaction) {
    let reaction = item.reaction;
    if reaction.is_disposed() {
        return;
    }

    if reaction.mode() != ReactionMode::Auto {
        if item.events.is_empty() {
            return;
        }
        if let Err(err) = reaction.invoke(&item.events) {
            log_reaction_error(&reaction, &err);
        }
        return;
    }

    let result = {
        let _tracking = TrackingGuard::enter();
        reaction.invoke(&[])
    };
    if let Err(err) = result {
        log_reaction_error(&reaction, &err);
    }

    let access = with_loop(|state| std::mem::take(&mut state.prop_access));
    let connections: Vec<(Component, String)> = access
        .into_iter()
        .flat_map(|(component, names)| names.into_iter().map(move |name| (component, name)))
        .collect();

    if item.touches_components || reaction.implicit_connections_differ(&connections) {
        if let Err(err) = reaction.update_implicit_connections(connections) {
            log_reaction_error(&reaction, &err);
        }
    }
}

fn log_reaction_error(reaction: &Reaction, err: &Error) {
    tracing::error!(
        reaction = reaction.name(),
        component = %reaction.anchor().map(|c| c.id()).unwrap_or_default(),
        error = %err,
        "error in reaction"
    );
}

/// Run `f`, then one iteration of the loop.
pub fn batch<R>(f: impl FnOnce() -> R) -> Result<R> {
    let out = f();
    iter()?;
    Ok(out)
}

/// Iterate until no work is pending or `max_iters` iterations ran.
/// Returns the number of iterations.
pub fn run_until_idle(max_iters: usize) -> Result<usize> {
    let mut count = 0;
    while count < max_iters && has_pending() {
        iter()?;
        count += 1;
    }
    Ok(count)
}

// =============================================================================
// Reset (for testing)
// =============================================================================

/// Clear all queues and phase flags. The configuration is kept.
pub fn reset() {
    let inbox = with_loop(|state| {
        state.clear_queues();
        state.phase = LoopPhase::IDLE;
        state.inbox.clone()
    });
    drop(inbox.drain());
}

/// Reset the loop and dispose every live component.
pub fn reset_runtime() {
    reset();
    for component in registry::live_components() {
        component.dispose();
    }
    registry::reset_registry();
    crate::reaction::reset_reaction_ids();
    reset();
}
