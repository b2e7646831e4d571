/*!
    Video sources, listeners and processing graphs.

    A [`VideoSource`] acquires frames on its own worker thread and hands
    them to a single [`VideoSourceListener`], optionally after running them
    through a [`ProcessingGraph`] of plugins. The [`AutomationServer`] ties
    named sources and graphs together for a host application.
*/

pub mod automation;
pub mod filters;
pub mod graph;
pub mod imaging;
pub mod listener;
pub mod plugin;
pub mod property;
pub mod source;
pub mod stop;

pub use media_types::{Error, FrameBuffer, PixelFormat, Rational, Result};

pub use self::automation::{AutomationServer, ListenerId};
pub use self::graph::{ProcessingGraph, ProcessingStep, SharedGraph, StepTiming};
pub use self::listener::{CallbackListener, VideoSourceListener};
pub use self::plugin::{ImageProcessingPlugin, PluginInfo, PluginRegistry};
pub use self::property::{Configurable, Configuration, PropertyDescriptor, Value, ValueType};
pub use self::source::{SourceState, VideoSource};
pub use self::stop::StopSignal;
