/*!
    Cooperative stop requests with interruptible waits.
*/

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

struct StopInner {
    requested: Mutex<bool>,
    condvar: Condvar,
}

/**
    A flag a controlling thread raises to ask a worker to finish.

    Workers poll [`is_requested`] between units of work and use [`wait`]
    instead of sleeping, so a stop request cuts any pause short. Clones
    share the same flag.

    [`is_requested`]: StopSignal::is_requested
    [`wait`]: StopSignal::wait
*/
#[derive(Clone)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StopInner {
                requested: Mutex::new(false),
                condvar: Condvar::new(),
            }),
        }
    }

    pub fn request(&self) {
        let mut requested = self.inner.requested.lock();
        *requested = true;
        self.inner.condvar.notify_all();
    }

    pub fn is_requested(&self) -> bool {
        *self.inner.requested.lock()
    }

    /**
        Sleep for up to `timeout`, waking early on a stop request.

        Returns true if stop was requested.
    */
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut requested = self.inner.requested.lock();
        while !*requested {
            if self
                .inner
                .condvar
                .wait_until(&mut requested, deadline)
                .timed_out()
            {
                break;
            }
        }
        *requested
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("requested", &self.is_requested())
            .finish()
    }
}
