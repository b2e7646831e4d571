/*!
    Video sources: background acquisition of frames from a resource.

    Every source is a [`ThreadedSource`] around a [`Backend`]. The backend
    knows how to open its resource and produce the next frame; the threaded
    source owns the lifecycle, the worker thread, the listener slot, the
    frame counter and the attached processing graph.
*/

mod file;
mod frame_queue;
mod http;
mod mjpeg;
mod network;
mod repeater;
mod threaded;

#[cfg(test)]
mod test_server;

use std::fmt;
use std::sync::Arc;

use media_types::{Error, FrameBuffer, Result};

use crate::graph::SharedGraph;
use crate::listener::VideoSourceListener;
use crate::property::{Configurable, PropertyDescriptor, Value};
use crate::stop::StopSignal;

pub use file::{FileBackend, FileConfig};
pub use http::{HttpConfig, JpegBackend, JpegConfig};
pub use mjpeg::{MjpegBackend, MjpegReader, boundary_from_content_type};
pub use network::{NetworkBackend, NetworkConfig};
pub use repeater::{Repeater, RepeaterBackend, RepeaterConfig, RepeaterRegistry};
pub use threaded::ThreadedSource;

/// Plays a local video file.
pub type FileVideoSource = ThreadedSource<FileBackend>;
/// Reads an RTSP, RTMP or HTTP stream through FFmpeg.
pub type NetworkVideoSource = ThreadedSource<NetworkBackend>;
/// Polls single JPEG images over HTTP.
pub type JpegVideoSource = ThreadedSource<JpegBackend>;
/// Reads a multipart MJPEG stream over HTTP.
pub type MjpegVideoSource = ThreadedSource<MjpegBackend>;
/// Replays frames pushed into a named repeater.
pub type RepeaterVideoSource = ThreadedSource<RepeaterBackend>;

/**
    Lifecycle of a video source.

    `Terminated` is final: a terminated source never starts again.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceState {
    Idle,
    Starting,
    Running,
    StopRequested,
    Stopped,
    Terminated,
}

impl SourceState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::StopRequested => "stop requested",
            Self::Stopped => "stopped",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/**
    The control surface every video source offers.

    All methods may be called from any thread. Frames and errors are
    delivered to the listener on the source's own worker thread.
*/
pub trait VideoSource: Send + Sync {
    fn name(&self) -> &str;

    /**
        Open the resource and start the worker thread.

        Setup failures are returned here and leave the source stopped.
        Starting a running source does nothing.
    */
    fn start(&self) -> Result<()>;

    /**
        Ask the worker to finish after the current frame. Returns at once.
    */
    fn signal_to_stop(&self);

    /**
        Block until the worker thread has exited.
    */
    fn wait_for_stop(&self);

    /**
        Abandon the source: no further callbacks, blocking reads aborted
        where the backend allows it. The caller still joins with
        [`wait_for_stop`](VideoSource::wait_for_stop).
    */
    fn terminate(&self);

    fn is_running(&self) -> bool;

    fn state(&self) -> SourceState;

    /**
        Frames delivered since the last start.
    */
    fn frames_received(&self) -> u32;

    /**
        Replace the listener. Once this returns, the previous listener
        receives no further callbacks.
    */
    fn set_listener(&self, listener: Option<Arc<dyn VideoSourceListener>>);

    /**
        Run every frame through `graph` before it reaches the listener.
    */
    fn set_graph(&self, graph: Option<SharedGraph>);

    fn properties(&self) -> &'static [PropertyDescriptor];

    fn get_property(&self, name: &str) -> Result<Value>;

    fn get_indexed_property(&self, name: &str, index: usize) -> Result<Value>;

    /**
        Change a configuration property. Properties marked idle-only fail
        with `CannotSetPropertyWhileRunning` while the source runs.
    */
    fn set_property(&self, name: &str, value: Value) -> Result<()>;
}

/**
    Result of asking a backend for a frame.
*/
#[derive(Debug)]
pub enum Acquired {
    /// The image slot holds a new frame.
    Frame,
    /// Nothing this time, e.g. a poll interval or queue timeout.
    Idle,
    /// Reported to the listener; acquisition continues.
    Recoverable(Error),
    /// Reported to the listener; the worker exits.
    Fatal(Error),
}

/**
    A thread-safe way to cut a backend's blocking call short.
*/
#[derive(Clone)]
pub struct AbortHandle(Arc<dyn Fn() + Send + Sync>);

impl AbortHandle {
    pub fn new(abort: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(abort))
    }

    pub fn abort(&self) {
        (self.0)()
    }
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AbortHandle")
    }
}

/**
    The resource-specific half of a video source.

    `open` runs on the thread calling `start`; everything else runs on the
    worker thread, and the backend is dropped there too.
*/
pub trait Backend: Send + Sized + 'static {
    type Config: Configurable + Clone + Send + Sync + 'static;

    fn open(config: &Self::Config) -> Result<Self>;

    /**
        Produce the next frame into `image`.

        Implementations wait at most a bounded time and use `stop` for any
        pauses, so stop requests are noticed promptly.
    */
    fn next_frame(&mut self, stop: &StopSignal, image: &mut Option<FrameBuffer>) -> Acquired;

    /**
        Apply properties that may change while running.
    */
    fn reconfigure(&mut self, _config: &Self::Config) {}

    fn abort_handle(&self) -> Option<AbortHandle> {
        None
    }
}
