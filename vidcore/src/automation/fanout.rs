use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use media_types::{Error, FrameBuffer};

use crate::listener::{Dispatcher, VideoSourceListener};

/**
    Handle for a listener added to a source through the automation server.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

type Entries = Vec<(ListenerId, Arc<dyn VideoSourceListener>)>;

/**
    The listener the server installs on each source, forwarding to any
    number of subscribers.

    Same rules as the single listener slot: once [`remove`](FanOut::remove)
    returns the listener gets no further callbacks, and a subscriber may
    remove itself (or others) from inside a callback.
*/
#[derive(Default)]
pub(crate) struct FanOut {
    entries: Dispatcher<Entries>,
    last_error: Mutex<Option<Error>>,
}

impl FanOut {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, listener: Arc<dyn VideoSourceListener>) -> ListenerId {
        let id = ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed));
        self.entries.modify(|entries| entries.push((id, listener)));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        self.entries.update(|entries| {
            let before = entries.len();
            entries.retain(|(entry, _)| *entry != id);
            entries.len() != before
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read(Vec::len)
    }

    /**
        The most recent error, cleared by the next delivered frame.
    */
    pub(crate) fn last_error(&self) -> Option<Error> {
        self.last_error.lock().clone()
    }

    fn dispatch(&self, mut call: impl FnMut(&dyn VideoSourceListener)) {
        let (snapshot, _round) = self.entries.enter(Vec::clone);
        for (id, listener) in snapshot {
            // Skip subscribers removed since the round began
            if self.entries.read(|entries| entries.iter().any(|(entry, _)| *entry == id)) {
                call(listener.as_ref());
            }
        }
    }
}

impl VideoSourceListener for FanOut {
    fn on_new_image(&self, image: &FrameBuffer) {
        self.last_error.lock().take();
        self.dispatch(|listener| listener.on_new_image(image));
    }

    fn on_error(&self, error: &Error) {
        *self.last_error.lock() = Some(error.clone());
        self.dispatch(|listener| listener.on_error(error));
    }
}

impl fmt::Debug for FanOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanOut")
            .field("listeners", &self.len())
            .field("last_error", &self.last_error())
            .finish()
    }
}
