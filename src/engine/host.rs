//! Host integration - how the loop gets driven.
//!
//! A host installs a run-soon hook with [`integrate`]; the scheduler calls it
//! whenever work is queued and no iteration is scheduled yet. The host then
//! calls [`iter`](crate::iter) from its own event loop on the same thread.
//!
//! Other threads never touch the loop directly. They get a [`LoopHandle`]
//! and hand `Send` closures to the owning thread through its inbox.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use super::scheduler;

type RemoteCall = Box<dyn FnOnce() + Send>;
type Waker = Arc<dyn Fn() + Send + Sync>;

// =============================================================================
// Run-soon Hook
// =============================================================================

thread_local! {
    static RUN_SOON: RefCell<Option<Rc<dyn Fn()>>> = const { RefCell::new(None) };
}

/// Install the run-soon hook for this thread's loop.
///
/// If work is already pending the hook is called right away.
pub fn integrate(hook: impl Fn() + 'static) {
    RUN_SOON.with(|slot| *slot.borrow_mut() = Some(Rc::new(hook)));
    if scheduler::has_pending() {
        request_iter();
    }
}

/// Remove the run-soon hook.
pub fn clear_integration() {
    RUN_SOON.with(|slot| *slot.borrow_mut() = None);
}

pub fn is_integrated() -> bool {
    RUN_SOON.with(|slot| slot.borrow().is_some())
}

/// Call the hook, if any. No borrow is held while it runs.
pub(crate) fn request_iter() {
    let hook = RUN_SOON.with(|slot| slot.borrow().clone());
    if let Some(hook) = hook {
        hook();
    }
}

// =============================================================================
// Inbox
// =============================================================================

/// Cross-thread queue of closures for one loop.
pub(crate) struct Inbox {
    owner: ThreadId,
    calls: Mutex<Vec<RemoteCall>>,
    waker: Mutex<Option<Waker>>,
}

impl Inbox {
    pub(crate) fn for_current_thread() -> Self {
        Self {
            owner: thread::current().id(),
            calls: Mutex::new(Vec::new()),
            waker: Mutex::new(None),
        }
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.calls.lock().is_empty()
    }

    pub(crate) fn drain(&self) -> Vec<RemoteCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    fn push(&self, call: RemoteCall) {
        self.calls.lock().push(call);
        let waker = self.waker.lock().clone();
        if let Some(waker) = waker {
            waker();
        }
    }
}

// =============================================================================
// LoopHandle
// =============================================================================

/// `Send + Sync` handle to a thread's loop.
///
/// The only way to reach a loop from another thread.
#[derive(Clone)]
pub struct LoopHandle {
    inbox: Arc<Inbox>,
}

/// Handle to the current thread's loop.
pub fn handle() -> LoopHandle {
    LoopHandle {
        inbox: scheduler::inbox(),
    }
}

impl LoopHandle {
    /// Queue `f` to run on the owning thread during its next calls phase.
    pub fn call_soon(&self, f: impl FnOnce() + Send + 'static) {
        self.inbox.push(Box::new(f));
    }

    /// Install a waker, called after each remote `call_soon` so the host can
    /// schedule an iteration on the owning thread.
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        *self.inbox.waker.lock() = Some(Arc::new(waker));
    }

    pub fn clear_waker(&self) {
        *self.inbox.waker.lock() = None;
    }

    pub fn owner(&self) -> ThreadId {
        self.inbox.owner
    }

    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.inbox.owner
    }

    /// Panics unless called on the thread that owns the loop.
    pub fn assert_owner(&self) {
        assert!(
            self.is_owner_thread(),
            "loop handle used off its owning thread ({:?})",
            self.inbox.owner
        );
    }

    pub fn has_pending(&self) -> bool {
        self.inbox.has_pending()
    }
}

impl std::fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopHandle")
            .field("owner", &self.inbox.owner)
            .field("pending", &self.inbox.has_pending())
            .finish()
    }
}
