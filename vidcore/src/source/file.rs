use std::time::{Duration, Instant};

use tracing::debug;

use media_decode::{DecoderSession, OpenOptions, StreamInfo};
use media_types::{Error, FrameBuffer, Result};

use crate::property::{Configurable, PropertyDescriptor, Value, ValueType};
use crate::stop::StopSignal;

use super::{AbortHandle, Acquired, Backend};

const FILE_PROPERTIES: &[PropertyDescriptor] = &[
    PropertyDescriptor::new("path", ValueType::String, "video file to play").idle_only(),
    PropertyDescriptor::new(
        "pace",
        ValueType::Bool,
        "deliver frames at the file's frame rate instead of as fast as possible",
    ),
];

/**
    Configuration of a file-backed source.
*/
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FileConfig {
    pub path: String,
    pub pace: bool,
}

impl FileConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            pace: false,
        }
    }

    pub fn with_pace(mut self, pace: bool) -> Self {
        self.pace = pace;
        self
    }
}

impl Configurable for FileConfig {
    fn properties(&self) -> &'static [PropertyDescriptor] {
        FILE_PROPERTIES
    }

    fn get_property(&self, name: &str) -> Result<Value> {
        match name {
            "path" => Ok(self.path.clone().into()),
            "pace" => Ok(self.pace.into()),
            _ => Err(Error::InvalidProperty(name.to_string())),
        }
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
        let value = self.descriptor(name)?.check(value)?;
        match name {
            "path" => self.path = value.try_into()?,
            "pace" => self.pace = value.try_into()?,
            _ => return Err(Error::InvalidProperty(name.to_string())),
        }
        Ok(())
    }
}

/**
    Decodes a local file frame by frame.
*/
pub struct FileBackend {
    session: DecoderSession,
    pacer: Pacer,
}

impl FileBackend {
    pub fn info(&self) -> &StreamInfo {
        self.session.info()
    }
}

impl Backend for FileBackend {
    type Config = FileConfig;

    fn open(config: &FileConfig) -> Result<Self> {
        if config.path.is_empty() {
            return Err(Error::InvalidConfiguration("no video file selected".to_string()));
        }

        let mut session = DecoderSession::new();
        session.open(&config.path, &OpenOptions::new())?;
        let pacer = Pacer::new(session.info(), config.pace);
        debug!(path = %config.path, fps = session.info().fps(), "opened video file");

        Ok(Self { session, pacer })
    }

    fn next_frame(&mut self, stop: &StopSignal, image: &mut Option<FrameBuffer>) -> Acquired {
        if self.pacer.wait(stop) {
            return Acquired::Idle;
        }
        let acquired = decode_next(&mut self.session, image);
        if matches!(acquired, Acquired::Frame) {
            self.pacer.mark();
        }
        acquired
    }

    fn reconfigure(&mut self, config: &FileConfig) {
        self.pacer.enabled = config.pace;
    }

    fn abort_handle(&self) -> Option<AbortHandle> {
        let interrupter = self.session.interrupter();
        Some(AbortHandle::new(move || interrupter.interrupt()))
    }
}

/**
    Decode one frame, classifying errors for the worker loop.

    A frame that fails to decode is skipped; anything else ends the stream.
*/
fn decode_next(session: &mut DecoderSession, image: &mut Option<FrameBuffer>) -> Acquired {
    match session.next_frame(image) {
        Ok(()) => Acquired::Frame,
        Err(error @ Error::FailedVideoDecoding(_)) => Acquired::Recoverable(error),
        Err(error) => Acquired::Fatal(error),
    }
}

/**
    Spaces frames at the stream's nominal rate.
*/
struct Pacer {
    enabled: bool,
    interval: Option<Duration>,
    last: Option<Instant>,
}

impl Pacer {
    fn new(info: &StreamInfo, enabled: bool) -> Self {
        let fps = info.fps();
        Self {
            enabled,
            interval: (fps > 0.0).then(|| Duration::from_secs_f64(1.0 / fps)),
            last: None,
        }
    }

    /**
        Wait until the next frame is due. Returns true if stop was requested.
    */
    fn wait(&self, stop: &StopSignal) -> bool {
        if !self.enabled {
            return false;
        }
        let (Some(interval), Some(last)) = (self.interval, self.last) else {
            return false;
        };
        match interval.checked_sub(last.elapsed()) {
            Some(remaining) if !remaining.is_zero() => stop.wait(remaining),
            _ => false,
        }
    }

    fn mark(&mut self) {
        self.last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_is_idle_only() {
        let config = FileConfig::new("clip.mp4");
        assert!(config.descriptor("path").unwrap().idle_only);
        assert!(!config.descriptor("pace").unwrap().idle_only);
    }

    #[test]
    fn empty_path_is_invalid_configuration() {
        assert!(matches!(
            FileBackend::open(&FileConfig::default()),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn missing_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.mp4");
        let result = FileBackend::open(&FileConfig::new(path.to_string_lossy()));
        assert!(matches!(result, Err(Error::IoFailure(_))));
    }

    #[test]
    fn pacer_without_rate_never_waits() {
        let mut pacer = Pacer::new(&StreamInfo::default(), true);
        pacer.mark();
        assert!(!pacer.wait(&StopSignal::new()));
    }
}
