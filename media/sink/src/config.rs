/*!
    Writer configuration types.
*/

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use media_types::{Error, Result};

/**
    Video codec used for output files.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VideoCodec {
    /// MPEG-4 Part 2, built into every FFmpeg.
    #[default]
    Mpeg4,
    /// H.264, needs an FFmpeg built with an H.264 encoder.
    H264,
    /// Motion JPEG.
    Mjpeg,
}

impl VideoCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mpeg4 => "mpeg4",
            Self::H264 => "h264",
            Self::Mjpeg => "mjpeg",
        }
    }

    /**
        The container extension used when none is configured.
    */
    pub fn default_extension(&self) -> &'static str {
        match self {
            Self::Mpeg4 | Self::H264 => "mp4",
            Self::Mjpeg => "avi",
        }
    }
}

impl FromStr for VideoCodec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mpeg4" | "mp4v" => Ok(Self::Mpeg4),
            "h264" | "avc" => Ok(Self::H264),
            "mjpeg" | "mjpg" => Ok(Self::Mjpeg),
            other => Err(Error::InvalidArgument(format!("unknown video codec '{other}'"))),
        }
    }
}

/**
    Configuration for a [`VideoFileWriter`](crate::VideoFileWriter).
*/
#[derive(Clone, Debug)]
pub struct WriterConfig {
    /// Directory the files are written to; created if missing.
    pub folder: PathBuf,
    /// File name without extension or time stamp.
    pub base_name: String,
    /// Container extension, e.g. `mp4`.
    pub extension: String,
    /// Codec to encode with.
    pub codec: VideoCodec,
    /// Target bit rate in bits per second.
    pub bit_rate: u32,
    /// Frames per second written into the container.
    pub frame_rate: u32,
    /// Append `" - YYYY-MM-DD HH-MM-SS"` to file names.
    pub timestamp_names: bool,
    /// Split output into files of this length.
    pub fragment_length: Option<Duration>,
    /// Delete the oldest files once the folder exceeds this many megabytes.
    pub max_folder_size_mb: Option<u64>,
}

impl WriterConfig {
    /**
        Create a configuration writing `<folder>/<base_name>.mp4` with MPEG-4.
    */
    pub fn new(folder: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        let codec = VideoCodec::default();
        Self {
            folder: folder.into(),
            base_name: base_name.into(),
            extension: codec.default_extension().to_string(),
            codec,
            bit_rate: 2_000_000,
            frame_rate: 25,
            timestamp_names: false,
            fragment_length: None,
            max_folder_size_mb: None,
        }
    }

    /**
        Set the codec, switching the extension to the codec's default.
    */
    pub fn with_codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self.extension = codec.default_extension().to_string();
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_bit_rate(mut self, bit_rate: u32) -> Self {
        self.bit_rate = bit_rate;
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn with_timestamp_names(mut self, enabled: bool) -> Self {
        self.timestamp_names = enabled;
        self
    }

    pub fn with_fragment_length(mut self, length: Duration) -> Self {
        self.fragment_length = Some(length);
        self
    }

    pub fn with_max_folder_size_mb(mut self, megabytes: u64) -> Self {
        self.max_folder_size_mb = Some(megabytes);
        self
    }

    /**
        Number of frames per fragment, if splitting is enabled.
    */
    pub fn frames_per_fragment(&self) -> Option<u64> {
        self.fragment_length
            .map(|length| ((length.as_secs_f64() * self.frame_rate as f64).round() as u64).max(1))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.base_name.trim().is_empty() {
            return Err(Error::InvalidConfiguration("file name is empty".to_string()));
        }
        if self.extension.trim().is_empty() {
            return Err(Error::InvalidConfiguration("file extension is empty".to_string()));
        }
        if self.frame_rate == 0 {
            return Err(Error::InvalidConfiguration("frame rate must be positive".to_string()));
        }
        if self.bit_rate == 0 {
            return Err(Error::InvalidConfiguration("bit rate must be positive".to_string()));
        }
        if self.fragment_length.is_some_and(|length| length.is_zero()) {
            return Err(Error::InvalidConfiguration("fragment length must be positive".to_string()));
        }
        Ok(())
    }
}
