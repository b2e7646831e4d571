/*!
    Shared types for the video acquisition pipeline.

    This crate defines the vocabulary that crosses crate boundaries: pixel
    formats, reference-counted frame buffers, rationals and the closed error
    taxonomy. It has no dependency on FFmpeg, so consumers such as filters and
    listeners can depend on it without pulling in native bindings.
*/

mod error;
mod format;
mod frame;
mod rational;

pub use error::{Error, Result};
pub use format::PixelFormat;
pub use frame::FrameBuffer;
pub use rational::Rational;
