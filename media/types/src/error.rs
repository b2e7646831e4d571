use thiserror::Error;

use crate::PixelFormat;

/**
    The closed set of failure codes reported anywhere in the pipeline.

    Native errors (FFmpeg, HTTP, image codecs, I/O) are translated into
    exactly one of these at the crate boundary where they occur, so callers
    and listeners only ever match on this enum.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // ── Resource acquisition ──────────────────────────────────────────
    #[error("i/o failure: {0}")]
    IoFailure(String),
    #[error("unknown or unsupported container format: {0}")]
    UnknownFormat(String),
    #[error("resource contains no video stream")]
    VideoStreamMissing,
    #[error("no decoder found for codec {0}")]
    CodecNotFound(String),
    #[error("failed to initialise codec: {0}")]
    CodecInitFailure(String),
    #[error("out of memory")]
    OutOfMemory,
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ── Decode time ───────────────────────────────────────────────────
    #[error("failed decoding video: {0}")]
    FailedVideoDecoding(String),
    #[error("end of stream")]
    EndOfStream,

    // ── Configuration ─────────────────────────────────────────────────
    #[error("property '{0}' cannot be set while the source is running")]
    CannotSetPropertyWhileRunning(String),
    #[error("unknown property '{0}'")]
    InvalidProperty(String),
    #[error("property '{0}' is read only")]
    ReadOnlyProperty(String),
    #[error("incompatible value type: {0}")]
    IncompatibleTypes(String),
    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // ── Processing ────────────────────────────────────────────────────
    #[error("unsupported pixel format {0}")]
    UnsupportedPixelFormat(PixelFormat),
    #[error("image is too small: {0}")]
    ImageIsTooSmall(String),
    #[error("image is too big: {0}")]
    ImageIsTooBig(String),
    #[error("not implemented")]
    NotImplemented,
}

impl Error {
    /**
        Returns true for the normal end of a finite stream.
    */
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }

    /**
        Returns true if a configuration call was rejected, as opposed to a
        failure of the media itself.
    */
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::CannotSetPropertyWhileRunning(_)
                | Self::InvalidProperty(_)
                | Self::ReadOnlyProperty(_)
                | Self::IncompatibleTypes(_)
                | Self::IndexOutOfBounds { .. }
                | Self::InvalidArgument(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::OutOfMemory => Self::OutOfMemory,
            _ => Self::IoFailure(e.to_string()),
        }
    }
}

/**
    Type alias for results that may return an [`Error`].
*/
pub type Result<T> = std::result::Result<T, Error>;
