use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use media_types::{Error, FrameBuffer, Result};

use crate::graph::SharedGraph;
use crate::listener::{ListenerSlot, VideoSourceListener};
use crate::property::{Configurable, PropertyDescriptor, Value};
use crate::stop::StopSignal;

use super::{AbortHandle, Acquired, Backend, SourceState, VideoSource};

/**
    State shared between the controlling side and the worker thread.
*/
struct Shared {
    name: String,
    state: Mutex<SourceState>,
    /// Stop signal of the current run; each start installs a fresh one.
    stop: Mutex<StopSignal>,
    frames: AtomicU32,
    alive: AtomicBool,
    config_version: AtomicU64,
    listener: ListenerSlot,
    graph: Mutex<Option<SharedGraph>>,
}

impl Shared {
    fn state(&self) -> SourceState {
        *self.state.lock()
    }

    /**
        Move to `next` unless terminated.
    */
    fn transition(&self, next: SourceState) {
        let mut state = self.state.lock();
        if *state != SourceState::Terminated {
            *state = next;
        }
    }

    fn deliver(&self, frame: FrameBuffer) {
        let graph = self.graph.lock().clone();
        let frame = match graph {
            Some(graph) => {
                // The graph lock must be released before any callback runs
                let processed = graph.lock().process(frame);
                match processed {
                    Ok(frame) => frame,
                    Err(error) => {
                        warn!(source = %self.name, %error, "processing graph rejected frame");
                        self.listener.notify_error(&error);
                        return;
                    }
                }
            }
            None => frame,
        };

        self.frames.fetch_add(1, Ordering::SeqCst);
        self.listener.notify_image(&frame);
    }
}

/**
    A worker thread that any number of callers can wait for.

    The first caller joins the thread; others block on the handle lock until
    that join has finished.
*/
struct Worker {
    thread: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    fn new(handle: JoinHandle<()>) -> Arc<Self> {
        Arc::new(Self {
            thread: handle.thread().id(),
            handle: Mutex::new(Some(handle)),
        })
    }

    /**
        Join the thread, running `on_panic` before other waiters are released
        if it panicked.
    */
    fn join(&self, on_panic: impl FnOnce()) {
        let mut handle = self.handle.lock();
        if let Some(handle) = handle.take()
            && handle.join().is_err()
        {
            on_panic();
        }
    }
}

#[derive(Default)]
struct Control {
    worker: Option<Arc<Worker>>,
    abort: Option<AbortHandle>,
}

/**
    A video source that acquires frames from backend `B` on its own thread.

    Control calls are serialized by an internal lock; the worker never takes
    it, so a listener may call back into the source from a callback.
*/
pub struct ThreadedSource<B: Backend> {
    config: Arc<RwLock<B::Config>>,
    shared: Arc<Shared>,
    control: Mutex<Control>,
    _backend: PhantomData<fn() -> B>,
}

impl<B: Backend> ThreadedSource<B> {
    pub fn new(name: impl Into<String>, config: B::Config) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            shared: Arc::new(Shared {
                name: name.into(),
                state: Mutex::new(SourceState::Idle),
                stop: Mutex::new(StopSignal::new()),
                frames: AtomicU32::new(0),
                alive: AtomicBool::new(false),
                config_version: AtomicU64::new(0),
                listener: ListenerSlot::new(),
                graph: Mutex::new(None),
            }),
            control: Mutex::new(Control::default()),
            _backend: PhantomData,
        }
    }

    /**
        Snapshot of the current configuration.
    */
    pub fn config(&self) -> B::Config {
        self.config.read().clone()
    }

    /**
        Apply several properties in order, stopping at the first failure.
    */
    pub fn configure(&self, configuration: &crate::property::Configuration) -> Result<()> {
        for (name, value) in configuration.iter() {
            self.set_property(name, value.clone())?;
        }
        Ok(())
    }

    fn join_worker(&self, worker: &Worker) {
        worker.join(|| {
            error!(source = %self.shared.name, "worker thread panicked");
            self.shared.alive.store(false, Ordering::SeqCst);
            self.shared.transition(SourceState::Stopped);
        });
    }
}

impl<B: Backend> VideoSource for ThreadedSource<B> {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn start(&self) -> Result<()> {
        let mut control = self.control.lock();
        let previous = match self.shared.state() {
            SourceState::Terminated => {
                return Err(Error::InvalidConfiguration(format!(
                    "source '{}' was terminated",
                    self.shared.name
                )));
            }
            SourceState::Starting | SourceState::Running => return Ok(()),
            state => state,
        };

        // A worker from the previous run may still be winding down, possibly
        // being joined by a concurrent wait_for_stop
        if let Some(worker) = control.worker.take() {
            if worker.thread == thread::current().id() {
                control.worker = Some(worker);
                return Err(Error::InvalidConfiguration(format!(
                    "source '{}' cannot be restarted from its own worker thread",
                    self.shared.name
                )));
            }
            self.join_worker(&worker);
        }
        let previous = match previous {
            SourceState::StopRequested => SourceState::Stopped,
            state => state,
        };

        self.shared.transition(SourceState::Starting);
        let config = self.config.read().clone();
        let seen_version = self.shared.config_version.load(Ordering::SeqCst);
        let backend = match B::open(&config) {
            Ok(backend) => backend,
            Err(error) => {
                warn!(source = %self.shared.name, %error, "failed to open video source");
                self.shared.transition(previous);
                return Err(error);
            }
        };

        let stop = StopSignal::new();
        *self.shared.stop.lock() = stop.clone();
        self.shared.frames.store(0, Ordering::SeqCst);
        self.shared.alive.store(true, Ordering::SeqCst);
        control.abort = backend.abort_handle();
        // Running before the spawn, so a worker that ends at once leaves Stopped
        self.shared.transition(SourceState::Running);

        let shared = self.shared.clone();
        let live_config = self.config.clone();
        let spawned = thread::Builder::new()
            .name(format!("source-{}", self.shared.name))
            .spawn(move || run_worker(backend, shared, stop, live_config, seen_version));

        match spawned {
            Ok(handle) => {
                control.worker = Some(Worker::new(handle));
                info!(source = %self.shared.name, "video source started");
                Ok(())
            }
            Err(error) => {
                self.shared.alive.store(false, Ordering::SeqCst);
                control.abort = None;
                self.shared.transition(previous);
                Err(error.into())
            }
        }
    }

    fn signal_to_stop(&self) {
        self.shared.stop.lock().request();
        let mut state = self.shared.state.lock();
        if matches!(*state, SourceState::Starting | SourceState::Running) {
            *state = SourceState::StopRequested;
        }
    }

    fn wait_for_stop(&self) {
        // The handle stays in place while joining so a concurrent start()
        // waits for the same thread instead of spawning beside it
        let worker = self.control.lock().worker.clone();
        let Some(worker) = worker else {
            return;
        };

        if worker.thread == thread::current().id() {
            warn!(source = %self.shared.name, "wait_for_stop called from the worker thread; not joining");
            return;
        }

        self.join_worker(&worker);
        let mut control = self.control.lock();
        if control.worker.as_ref().is_some_and(|current| Arc::ptr_eq(current, &worker)) {
            control.worker = None;
            control.abort = None;
        }
        debug!(source = %self.shared.name, "worker joined");
    }

    fn terminate(&self) {
        *self.shared.state.lock() = SourceState::Terminated;
        self.shared.stop.lock().request();
        self.shared.listener.set(None);

        let abort = self.control.lock().abort.clone();
        if let Some(abort) = abort {
            abort.abort();
        }
        info!(source = %self.shared.name, "video source terminated");
    }

    fn is_running(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst) || self.shared.state() == SourceState::Starting
    }

    fn state(&self) -> SourceState {
        self.shared.state()
    }

    fn frames_received(&self) -> u32 {
        self.shared.frames.load(Ordering::SeqCst)
    }

    fn set_listener(&self, listener: Option<Arc<dyn VideoSourceListener>>) {
        self.shared.listener.set(listener);
    }

    fn set_graph(&self, graph: Option<SharedGraph>) {
        *self.shared.graph.lock() = graph;
    }

    fn properties(&self) -> &'static [PropertyDescriptor] {
        self.config.read().properties()
    }

    fn get_property(&self, name: &str) -> Result<Value> {
        self.config.read().get_property(name)
    }

    fn get_indexed_property(&self, name: &str, index: usize) -> Result<Value> {
        self.config.read().get_indexed_property(name, index)
    }

    fn set_property(&self, name: &str, value: Value) -> Result<()> {
        // Serialize with start() so the running check cannot go stale
        let _control = self.control.lock();
        let mut config = self.config.write();
        let descriptor = config.descriptor(name)?;
        if descriptor.idle_only && self.is_running() {
            return Err(Error::CannotSetPropertyWhileRunning(name.to_string()));
        }

        config.set_property(name, value)?;
        self.shared.config_version.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl<B: Backend> Drop for ThreadedSource<B> {
    fn drop(&mut self) {
        self.signal_to_stop();
        self.wait_for_stop();
    }
}

impl<B: Backend> fmt::Debug for ThreadedSource<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadedSource")
            .field("name", &self.shared.name)
            .field("state", &self.shared.state())
            .field("frames", &self.frames_received())
            .finish_non_exhaustive()
    }
}

fn run_worker<B: Backend>(
    mut backend: B,
    shared: Arc<Shared>,
    stop: StopSignal,
    config: Arc<RwLock<B::Config>>,
    mut seen_version: u64,
) {
    debug!(source = %shared.name, "worker started");
    let mut image = None;

    while !stop.is_requested() {
        let version = shared.config_version.load(Ordering::SeqCst);
        if version != seen_version {
            backend.reconfigure(&config.read());
            seen_version = version;
        }

        match backend.next_frame(&stop, &mut image) {
            Acquired::Frame => {
                if let Some(frame) = image.as_ref() {
                    shared.deliver(frame.clone());
                }
            }
            Acquired::Idle => {}
            Acquired::Recoverable(error) => {
                warn!(source = %shared.name, %error, "acquisition error");
                shared.listener.notify_error(&error);
            }
            Acquired::Fatal(error) => {
                if error.is_end_of_stream() {
                    info!(source = %shared.name, "end of stream");
                } else {
                    error!(source = %shared.name, %error, "video source failed");
                }
                shared.listener.notify_error(&error);
                break;
            }
        }
    }

    drop(image);
    drop(backend);
    shared.alive.store(false, Ordering::SeqCst);
    shared.transition(SourceState::Stopped);
    debug!(source = %shared.name, frames = shared.frames.load(Ordering::SeqCst), "worker finished");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    use media_types::PixelFormat;

    use crate::graph::{ProcessingGraph, ProcessingStep};
    use crate::listener::CallbackListener;
    use crate::plugin::PluginRegistry;
    use crate::property::ValueType;
    use crate::source::RepeaterRegistry;

    use super::*;

    /// Produces `frames` gray frames numbered from 0, then ends.
    #[derive(Clone, Default)]
    struct ScriptConfig {
        frames: u32,
        delay_ms: u32,
        fail_open: bool,
    }

    const SCRIPT_PROPERTIES: &[PropertyDescriptor] = &[
        PropertyDescriptor::new("frames", ValueType::U32, "frames to produce, 0 for endless")
            .idle_only(),
        PropertyDescriptor::new("delay_ms", ValueType::U32, "pause before each frame"),
    ];

    impl Configurable for ScriptConfig {
        fn properties(&self) -> &'static [PropertyDescriptor] {
            SCRIPT_PROPERTIES
        }

        fn get_property(&self, name: &str) -> Result<Value> {
            match name {
                "frames" => Ok(self.frames.into()),
                "delay_ms" => Ok(self.delay_ms.into()),
                _ => Err(Error::InvalidProperty(name.to_string())),
            }
        }

        fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
            let value = self.descriptor(name)?.check(value)?;
            match name {
                "frames" => self.frames = value.try_into()?,
                "delay_ms" => self.delay_ms = value.try_into()?,
                _ => return Err(Error::InvalidProperty(name.to_string())),
            }
            Ok(())
        }
    }

    struct ScriptBackend {
        remaining: Option<u32>,
        delay: Duration,
        produced: u8,
    }

    impl Backend for ScriptBackend {
        type Config = ScriptConfig;

        fn open(config: &ScriptConfig) -> Result<Self> {
            if config.fail_open {
                return Err(Error::ConnectionFailed("scripted".to_string()));
            }
            Ok(Self {
                remaining: (config.frames > 0).then_some(config.frames),
                delay: Duration::from_millis(config.delay_ms.into()),
                produced: 0,
            })
        }

        fn next_frame(&mut self, stop: &StopSignal, image: &mut Option<FrameBuffer>) -> Acquired {
            if self.remaining == Some(0) {
                return Acquired::Fatal(Error::EndOfStream);
            }
            if !self.delay.is_zero() && stop.wait(self.delay) {
                return Acquired::Idle;
            }

            let frame = match FrameBuffer::reuse_or_allocate(image, 2, 2, PixelFormat::Gray8) {
                Ok(frame) => frame,
                Err(error) => return Acquired::Fatal(error),
            };
            frame.data_mut().fill(self.produced);
            self.produced = self.produced.wrapping_add(1);
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
            }
            Acquired::Frame
        }

        fn reconfigure(&mut self, config: &ScriptConfig) {
            self.delay = Duration::from_millis(config.delay_ms.into());
        }
    }

    type ScriptSource = ThreadedSource<ScriptBackend>;

    #[derive(Default)]
    struct Recorder {
        images: Mutex<Vec<FrameBuffer>>,
        errors: Mutex<Vec<Error>>,
    }

    impl VideoSourceListener for Recorder {
        fn on_new_image(&self, image: &FrameBuffer) {
            self.images.lock().push(image.clone());
        }

        fn on_error(&self, error: &Error) {
            self.errors.lock().push(error.clone());
        }
    }

    fn source(frames: u32, delay_ms: u32) -> ScriptSource {
        ScriptSource::new(
            "script",
            ScriptConfig {
                frames,
                delay_ms,
                fail_open: false,
            },
        )
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for condition");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn finite_source_delivers_every_frame_then_stops() {
        let source = source(5, 0);
        let recorder = Arc::new(Recorder::default());
        source.set_listener(Some(recorder.clone()));

        source.start().unwrap();
        source.wait_for_stop();

        assert_eq!(source.state(), SourceState::Stopped);
        assert!(!source.is_running());
        assert_eq!(source.frames_received(), 5);

        let values: Vec<u8> = recorder.images.lock().iter().map(|f| f.data()[0]).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
        assert_eq!(*recorder.errors.lock(), vec![Error::EndOfStream]);
    }

    #[test]
    fn counter_is_incremented_before_the_callback() {
        let source = Arc::new(source(3, 0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let listener = {
            let source = Arc::downgrade(&source);
            let seen = seen.clone();
            CallbackListener::shared(
                move |_| {
                    if let Some(source) = source.upgrade() {
                        seen.lock().push(source.frames_received());
                    }
                },
                |_| {},
            )
        };
        source.set_listener(Some(listener));

        source.start().unwrap();
        source.wait_for_stop();
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let source = source(0, 1);
        source.start().unwrap();
        source.start().unwrap();
        wait_until(|| source.frames_received() >= 3);

        source.signal_to_stop();
        source.signal_to_stop();
        assert!(matches!(
            source.state(),
            SourceState::StopRequested | SourceState::Stopped
        ));
        source.wait_for_stop();
        source.wait_for_stop();
        assert_eq!(source.state(), SourceState::Stopped);
        assert!(!source.is_running());
    }

    #[test]
    fn restart_resets_the_counter() {
        let source = source(4, 0);
        source.start().unwrap();
        source.wait_for_stop();
        assert_eq!(source.frames_received(), 4);

        source.start().unwrap();
        source.wait_for_stop();
        assert_eq!(source.frames_received(), 4);
    }

    #[test]
    fn restart_while_stop_requested_joins_the_old_worker() {
        let source = source(0, 5);
        source.start().unwrap();
        source.signal_to_stop();
        source.start().unwrap();

        assert_eq!(source.state(), SourceState::Running);
        assert!(source.is_running());
        source.signal_to_stop();
        source.wait_for_stop();
    }

    #[test]
    fn failed_open_reports_error_and_stays_idle() {
        let source = ScriptSource::new(
            "broken",
            ScriptConfig {
                fail_open: true,
                ..ScriptConfig::default()
            },
        );

        assert_eq!(
            source.start(),
            Err(Error::ConnectionFailed("scripted".to_string()))
        );
        assert_eq!(source.state(), SourceState::Idle);
        assert!(!source.is_running());
        source.wait_for_stop();
    }

    #[test]
    fn idle_only_properties_are_locked_while_running() {
        let source = source(0, 1);
        source.start().unwrap();

        assert_eq!(
            source.set_property("frames", Value::U32(10)),
            Err(Error::CannotSetPropertyWhileRunning("frames".to_string()))
        );
        assert_eq!(source.get_property("frames"), Ok(Value::U32(0)));

        // Not idle-only: accepted and picked up by the worker
        source.set_property("delay_ms", Value::U32(2)).unwrap();
        assert_eq!(source.get_property("delay_ms"), Ok(Value::U32(2)));

        source.signal_to_stop();
        source.wait_for_stop();
        source.set_property("frames", Value::U32(10)).unwrap();
        assert_eq!(source.config().frames, 10);
        assert_eq!(
            source.set_property("missing", Value::U32(1)),
            Err(Error::InvalidProperty("missing".to_string()))
        );
    }

    #[test]
    fn no_callbacks_after_listener_is_cleared() {
        let source = source(0, 1);
        let calls = Arc::new(AtomicUsize::new(0));
        let listener = {
            let calls = calls.clone();
            CallbackListener::shared(
                move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                },
                |_| {},
            )
        };
        source.set_listener(Some(listener));
        source.start().unwrap();
        wait_until(|| calls.load(Ordering::SeqCst) > 0);

        source.set_listener(None);
        let after_clear = calls.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(calls.load(Ordering::SeqCst), after_clear);

        source.signal_to_stop();
        source.wait_for_stop();
    }

    #[test]
    fn terminate_silences_and_cannot_restart() {
        let source = source(0, 1);
        let recorder = Arc::new(Recorder::default());
        source.set_listener(Some(recorder.clone()));
        source.start().unwrap();
        wait_until(|| source.frames_received() > 0);

        source.terminate();
        let delivered = recorder.images.lock().len();
        source.wait_for_stop();

        assert_eq!(recorder.images.lock().len(), delivered);
        assert_eq!(source.state(), SourceState::Terminated);
        assert!(!source.is_running());
        assert!(matches!(
            source.start(),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn attached_graph_processes_frames_before_delivery() {
        let registry = Arc::new(PluginRegistry::with_builtin_filters(Arc::new(
            RepeaterRegistry::new(),
        )));
        let mut graph = ProcessingGraph::new("invert", registry);
        graph.add_step(ProcessingStep::new("invert", "invert")).unwrap();

        let source = source(2, 0);
        let recorder = Arc::new(Recorder::default());
        source.set_listener(Some(recorder.clone()));
        source.set_graph(Some(Arc::new(Mutex::new(graph))));

        source.start().unwrap();
        source.wait_for_stop();

        let values: Vec<u8> = recorder.images.lock().iter().map(|f| f.data()[0]).collect();
        assert_eq!(values, vec![255, 254]);
    }

    #[test]
    fn graph_errors_skip_the_frame_without_counting_it() {
        let registry = Arc::new(PluginRegistry::with_builtin_filters(Arc::new(
            RepeaterRegistry::new(),
        )));
        let mut graph = ProcessingGraph::new("gray", registry);
        // Grayscale accepts color input only
        graph.add_step(ProcessingStep::new("gray", "grayscale")).unwrap();

        let source = source(2, 0);
        let recorder = Arc::new(Recorder::default());
        source.set_listener(Some(recorder.clone()));
        source.set_graph(Some(Arc::new(Mutex::new(graph))));

        source.start().unwrap();
        source.wait_for_stop();

        assert_eq!(source.frames_received(), 0);
        assert!(recorder.images.lock().is_empty());
        let errors = recorder.errors.lock();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0], Error::UnsupportedPixelFormat(PixelFormat::Gray8));
        assert_eq!(errors[2], Error::EndOfStream);
    }

    #[test]
    fn dropping_a_running_source_joins_the_worker() {
        let source = source(0, 1);
        source.start().unwrap();
        wait_until(|| source.frames_received() > 0);
        drop(source);
    }

    #[test]
    fn graph_error_listener_may_lock_the_graph() {
        let registry = Arc::new(PluginRegistry::with_builtin_filters(Arc::new(
            RepeaterRegistry::new(),
        )));
        let mut graph = ProcessingGraph::new("gray", registry);
        graph.add_step(ProcessingStep::new("gray", "grayscale")).unwrap();
        let graph = graph.into_shared();

        let images = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let listener = {
            let images = images.clone();
            let errors = errors.clone();
            let graph = graph.clone();
            CallbackListener::shared(
                move |image: &FrameBuffer| images.lock().push(image.data()[0]),
                move |error: &Error| {
                    // Drop the step that cannot handle this input
                    if matches!(error, Error::UnsupportedPixelFormat(_)) {
                        graph.lock().remove_step(0).unwrap();
                    }
                    errors.lock().push(error.clone());
                },
            )
        };

        let source = source(3, 0);
        source.set_listener(Some(listener));
        source.set_graph(Some(graph.clone()));
        source.start().unwrap();
        wait_until(|| !source.is_running());
        source.wait_for_stop();

        assert!(graph.lock().is_empty());
        assert_eq!(source.frames_received(), 2);
        assert_eq!(*images.lock(), vec![1, 2]);
        assert_eq!(
            *errors.lock(),
            vec![
                Error::UnsupportedPixelFormat(PixelFormat::Gray8),
                Error::EndOfStream
            ]
        );
    }

    /// Counts live backends; every read outlasts a stop request.
    #[derive(Clone, Default)]
    struct SlowConfig {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Configurable for SlowConfig {
        fn properties(&self) -> &'static [PropertyDescriptor] {
            &[]
        }

        fn get_property(&self, name: &str) -> Result<Value> {
            Err(Error::InvalidProperty(name.to_string()))
        }

        fn set_property(&mut self, name: &str, _value: Value) -> Result<()> {
            Err(Error::InvalidProperty(name.to_string()))
        }
    }

    struct SlowBackend {
        active: Arc<AtomicUsize>,
    }

    impl Backend for SlowBackend {
        type Config = SlowConfig;

        fn open(config: &SlowConfig) -> Result<Self> {
            let active = config.active.fetch_add(1, Ordering::SeqCst) + 1;
            config.peak.fetch_max(active, Ordering::SeqCst);
            Ok(Self {
                active: config.active.clone(),
            })
        }

        fn next_frame(&mut self, _stop: &StopSignal, _image: &mut Option<FrameBuffer>) -> Acquired {
            thread::sleep(Duration::from_millis(300));
            Acquired::Idle
        }
    }

    impl Drop for SlowBackend {
        fn drop(&mut self) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn start_during_a_concurrent_wait_for_stop_keeps_one_worker() {
        let config = SlowConfig::default();
        let source = Arc::new(ThreadedSource::<SlowBackend>::new("slow", config.clone()));
        source.start().unwrap();
        source.signal_to_stop();

        let (joined_tx, joined_rx) = std::sync::mpsc::channel();
        let waiter = {
            let source = source.clone();
            thread::spawn(move || {
                source.wait_for_stop();
                joined_tx.send(()).unwrap();
            })
        };
        thread::sleep(Duration::from_millis(50));

        source.start().unwrap();
        assert_eq!(config.peak.load(Ordering::SeqCst), 1);
        assert_eq!(source.state(), SourceState::Running);

        source.signal_to_stop();
        joined_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
        source.wait_for_stop();

        assert_eq!(source.state(), SourceState::Stopped);
        assert_eq!(config.active.load(Ordering::SeqCst), 0);
        assert_eq!(config.peak.load(Ordering::SeqCst), 1);
    }
}
