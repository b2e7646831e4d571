/*!
    Listener protocol between a video source and its consumer.
*/

use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

use media_types::{Error, FrameBuffer};

/**
    Receives frames and errors from a video source.

    Both methods run on the source's worker thread. They should return
    quickly: the next frame is not acquired until they do. A listener may
    call back into its source, including replacing itself.
*/
pub trait VideoSourceListener: Send + Sync {
    fn on_new_image(&self, image: &FrameBuffer);

    fn on_error(&self, error: &Error);
}

/**
    A listener built from two closures.
*/
pub struct CallbackListener<I, E> {
    on_image: I,
    on_error: E,
}

impl<I, E> CallbackListener<I, E>
where
    I: Fn(&FrameBuffer) + Send + Sync + 'static,
    E: Fn(&Error) + Send + Sync + 'static,
{
    pub fn new(on_image: I, on_error: E) -> Self {
        Self { on_image, on_error }
    }

    pub fn shared(on_image: I, on_error: E) -> Arc<dyn VideoSourceListener> {
        Arc::new(Self::new(on_image, on_error))
    }
}

impl<I, E> VideoSourceListener for CallbackListener<I, E>
where
    I: Fn(&FrameBuffer) + Send + Sync,
    E: Fn(&Error) + Send + Sync,
{
    fn on_new_image(&self, image: &FrameBuffer) {
        (self.on_image)(image)
    }

    fn on_error(&self, error: &Error) {
        (self.on_error)(error)
    }
}

struct DispatchState<T> {
    value: T,
    dispatching: Vec<ThreadId>,
}

/**
    A value read by dispatching threads and replaced by controlling ones.

    Dispatch reads the value under a short lock and registers the calling
    thread until its [`DispatchRound`] is dropped; the lock is not held while
    callbacks run. [`update`](Dispatcher::update) changes the value and then
    waits until no other thread is inside a round that may have read the old
    value. The thread running a round is never waited on, so a callback can
    update the value that is dispatching to it.
*/
pub(crate) struct Dispatcher<T> {
    state: Mutex<DispatchState<T>>,
    idle: Condvar,
}

impl<T: Default> Default for Dispatcher<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(DispatchState {
                value: T::default(),
                dispatching: Vec::new(),
            }),
            idle: Condvar::new(),
        }
    }
}

impl<T> Dispatcher<T> {
    pub(crate) fn read<R>(&self, read: impl FnOnce(&T) -> R) -> R {
        read(&self.state.lock().value)
    }

    /// Change the value without waiting for running rounds.
    pub(crate) fn modify<R>(&self, modify: impl FnOnce(&mut T) -> R) -> R {
        modify(&mut self.state.lock().value)
    }

    /**
        Change the value, then wait for rounds on other threads to finish.
    */
    pub(crate) fn update<R>(&self, update: impl FnOnce(&mut T) -> R) -> R {
        let current = thread::current().id();
        let mut state = self.state.lock();
        let result = update(&mut state.value);
        while state.dispatching.iter().any(|id| *id != current) {
            self.idle.wait(&mut state);
        }
        result
    }

    /**
        Read the value and open a dispatch round on this thread.
    */
    pub(crate) fn enter<R>(&self, read: impl FnOnce(&T) -> R) -> (R, DispatchRound<'_, T>) {
        let mut state = self.state.lock();
        let result = read(&state.value);
        state.dispatching.push(thread::current().id());
        (result, DispatchRound { dispatcher: self })
    }
}

/**
    Closes its dispatch round when dropped, also when a callback panics.
*/
pub(crate) struct DispatchRound<'a, T> {
    dispatcher: &'a Dispatcher<T>,
}

impl<T> Drop for DispatchRound<'_, T> {
    fn drop(&mut self) {
        let current = thread::current().id();
        let mut state = self.dispatcher.state.lock();
        if let Some(position) = state.dispatching.iter().position(|id| *id == current) {
            state.dispatching.swap_remove(position);
        }
        self.dispatcher.idle.notify_all();
    }
}

/**
    The single replaceable listener of a source.

    When [`set`](ListenerSlot::set) returns on one thread, no callback to the
    previous listener is still running on another, and none will follow.
    The slot lock is only held to read or swap the listener, never across a
    callback, so a listener can replace or clear itself from inside a
    callback and other threads can use the slot while a callback runs.
*/
#[derive(Default)]
pub struct ListenerSlot {
    inner: Dispatcher<Option<Arc<dyn VideoSourceListener>>>,
}

impl ListenerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /**
        Replace the listener, returning the previous one.
    */
    pub fn set(
        &self,
        listener: Option<Arc<dyn VideoSourceListener>>,
    ) -> Option<Arc<dyn VideoSourceListener>> {
        self.inner.update(|current| std::mem::replace(current, listener))
    }

    pub fn is_set(&self) -> bool {
        self.inner.read(Option::is_some)
    }

    pub fn notify_image(&self, image: &FrameBuffer) {
        let (listener, _round) = self.inner.enter(Option::clone);
        if let Some(listener) = listener {
            listener.on_new_image(image);
        }
    }

    pub fn notify_error(&self, error: &Error) {
        let (listener, _round) = self.inner.enter(Option::clone);
        if let Some(listener) = listener {
            listener.on_error(error);
        }
    }
}

impl fmt::Debug for ListenerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSlot")
            .field("set", &self.is_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Barrier, Mutex};
    use std::thread;
    use std::time::Duration;

    use media_types::PixelFormat;

    use super::*;

    fn frame() -> FrameBuffer {
        FrameBuffer::new(1, 1, PixelFormat::Gray8).unwrap()
    }

    #[derive(Default)]
    struct Counting {
        images: AtomicUsize,
        errors: AtomicUsize,
    }

    impl VideoSourceListener for Counting {
        fn on_new_image(&self, _image: &FrameBuffer) {
            self.images.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, _error: &Error) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn dispatches_to_current_listener() {
        let slot = ListenerSlot::new();
        slot.notify_image(&frame());

        let counting = Arc::new(Counting::default());
        slot.set(Some(counting.clone()));
        slot.notify_image(&frame());
        slot.notify_error(&Error::EndOfStream);

        assert_eq!(counting.images.load(Ordering::SeqCst), 1);
        assert_eq!(counting.errors.load(Ordering::SeqCst), 1);

        let previous = slot.set(None);
        assert!(previous.is_some());
        slot.notify_image(&frame());
        assert_eq!(counting.images.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn set_waits_for_running_callback() {
        let slot = Arc::new(ListenerSlot::new());
        let entered = Arc::new(Barrier::new(2));
        let finished = Arc::new(AtomicBool::new(false));

        let listener = {
            let entered = entered.clone();
            let finished = finished.clone();
            CallbackListener::shared(
                move |_| {
                    entered.wait();
                    thread::sleep(Duration::from_millis(50));
                    finished.store(true, Ordering::SeqCst);
                },
                |_| {},
            )
        };
        slot.set(Some(listener));

        let worker = {
            let slot = slot.clone();
            thread::spawn(move || slot.notify_image(&frame()))
        };

        entered.wait();
        slot.set(None);
        // The callback was still sleeping when set() was called
        assert!(finished.load(Ordering::SeqCst));
        worker.join().unwrap();
    }

    #[test]
    fn listener_can_unsubscribe_itself() {
        let slot = Arc::new(ListenerSlot::new());
        let calls = Arc::new(Mutex::new(0));

        let listener = {
            let slot = Arc::downgrade(&slot);
            let calls = calls.clone();
            CallbackListener::shared(
                move |_| {
                    *calls.lock().unwrap() += 1;
                    if let Some(slot) = slot.upgrade() {
                        slot.set(None);
                    }
                },
                |_| {},
            )
        };
        slot.set(Some(listener));

        slot.notify_image(&frame());
        slot.notify_image(&frame());

        assert_eq!(*calls.lock().unwrap(), 1);
        assert!(!slot.is_set());
    }

    #[test]
    fn slot_is_usable_from_other_threads_during_a_callback() {
        let slot = Arc::new(ListenerSlot::new());
        let (unsubscribed_tx, unsubscribed_rx) = std::sync::mpsc::channel();
        let seen_set = Arc::new(AtomicBool::new(false));

        let listener = {
            let slot = Arc::downgrade(&slot);
            let seen_set = seen_set.clone();
            CallbackListener::shared(
                move |_| {
                    let Some(slot) = slot.upgrade() else {
                        return;
                    };
                    // A helper thread reads the slot while this callback waits for it
                    let reader = {
                        let slot = slot.clone();
                        thread::spawn(move || slot.is_set())
                    };
                    seen_set.store(reader.join().unwrap(), Ordering::SeqCst);

                    // Hand the unsubscribe to another thread without waiting for it
                    let unsubscribed_tx = unsubscribed_tx.clone();
                    thread::spawn(move || {
                        slot.set(None);
                        unsubscribed_tx.send(()).unwrap();
                    });
                },
                |_| {},
            )
        };
        slot.set(Some(listener));

        slot.notify_image(&frame());
        unsubscribed_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert!(seen_set.load(Ordering::SeqCst));
        assert!(!slot.is_set());
    }
}
