use std::time::Duration;

use tracing::{debug, warn};

use media_decode::{DecoderSession, OpenOptions, StreamInfo};
use media_types::{Error, FrameBuffer, Result};

use crate::property::{Configurable, PropertyDescriptor, Value, ValueType};
use crate::stop::StopSignal;

use super::{AbortHandle, Acquired, Backend};

/// Consecutive read timeouts tolerated before the stream counts as lost.
const MAX_READ_TIMEOUTS: u32 = 3;

const NETWORK_PROPERTIES: &[PropertyDescriptor] = &[
    PropertyDescriptor::new("url", ValueType::String, "stream URL, e.g. rtsp://camera/stream")
        .idle_only(),
    PropertyDescriptor::new("username", ValueType::String, "user name for the stream")
        .idle_only(),
    PropertyDescriptor::new("password", ValueType::String, "password for the stream").idle_only(),
    PropertyDescriptor::new(
        "probe_size",
        ValueType::U32,
        "bytes read to detect stream parameters, 0 for the default",
    )
    .idle_only(),
    PropertyDescriptor::new(
        "timeout_ms",
        ValueType::U32,
        "longest a network read may block, 0 for no limit",
    )
    .idle_only(),
    PropertyDescriptor::new("rtsp_over_tcp", ValueType::Bool, "interleave RTSP over TCP")
        .idle_only(),
];

/**
    Configuration of a network stream source.
*/
#[derive(Clone, PartialEq)]
pub struct NetworkConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub probe_size: u32,
    pub timeout_ms: u32,
    pub rtsp_over_tcp: bool,
}

impl NetworkConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    fn open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new().with_rtsp_over_tcp(self.rtsp_over_tcp);
        if !self.username.is_empty() {
            options = options.with_credentials(&self.username, &self.password);
        }
        if self.probe_size > 0 {
            options = options.with_probe_size(self.probe_size);
        }
        if self.timeout_ms > 0 {
            options = options.with_timeout(Duration::from_millis(self.timeout_ms.into()));
        }
        options
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            probe_size: 0,
            timeout_ms: 10_000,
            rtsp_over_tcp: false,
        }
    }
}

impl std::fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("probe_size", &self.probe_size)
            .field("timeout_ms", &self.timeout_ms)
            .field("rtsp_over_tcp", &self.rtsp_over_tcp)
            .finish_non_exhaustive()
    }
}

impl Configurable for NetworkConfig {
    fn properties(&self) -> &'static [PropertyDescriptor] {
        NETWORK_PROPERTIES
    }

    fn get_property(&self, name: &str) -> Result<Value> {
        match name {
            "url" => Ok(self.url.clone().into()),
            "username" => Ok(self.username.clone().into()),
            "password" => Ok(self.password.clone().into()),
            "probe_size" => Ok(self.probe_size.into()),
            "timeout_ms" => Ok(self.timeout_ms.into()),
            "rtsp_over_tcp" => Ok(self.rtsp_over_tcp.into()),
            _ => Err(Error::InvalidProperty(name.to_string())),
        }
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
        let value = self.descriptor(name)?.check(value)?;
        match name {
            "url" => self.url = value.try_into()?,
            "username" => self.username = value.try_into()?,
            "password" => self.password = value.try_into()?,
            "probe_size" => self.probe_size = value.try_into()?,
            "timeout_ms" => self.timeout_ms = value.try_into()?,
            "rtsp_over_tcp" => self.rtsp_over_tcp = value.try_into()?,
            _ => return Err(Error::InvalidProperty(name.to_string())),
        }
        Ok(())
    }
}

/**
    Decodes an RTSP, RTMP or HTTP stream through FFmpeg.

    Frames are delivered as fast as the stream produces them. A read that
    times out is reported and retried, up to [`MAX_READ_TIMEOUTS`] in a row.
*/
pub struct NetworkBackend {
    session: DecoderSession,
    timeouts: u32,
}

impl NetworkBackend {
    pub fn info(&self) -> &StreamInfo {
        self.session.info()
    }
}

impl Backend for NetworkBackend {
    type Config = NetworkConfig;

    fn open(config: &NetworkConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(Error::InvalidConfiguration("no stream URL configured".to_string()));
        }

        let mut session = DecoderSession::new();
        session.open(&config.url, &config.open_options())?;
        debug!(url = %config.url, codec = %session.info().codec_name, "connected to stream");

        Ok(Self {
            session,
            timeouts: 0,
        })
    }

    fn next_frame(&mut self, _stop: &StopSignal, image: &mut Option<FrameBuffer>) -> Acquired {
        let result = self.session.next_frame(image);
        classify(result, self.session.read_timed_out(), &mut self.timeouts)
    }

    fn abort_handle(&self) -> Option<AbortHandle> {
        let interrupter = self.session.interrupter();
        Some(AbortHandle::new(move || interrupter.interrupt()))
    }
}

fn classify(result: Result<()>, timed_out: bool, timeouts: &mut u32) -> Acquired {
    match result {
        Ok(()) => {
            *timeouts = 0;
            Acquired::Frame
        }
        Err(error) if timed_out && *timeouts < MAX_READ_TIMEOUTS => {
            *timeouts += 1;
            warn!(%error, attempt = *timeouts, "stream read timed out, retrying");
            Acquired::Recoverable(error)
        }
        Err(error @ Error::FailedVideoDecoding(_)) => Acquired::Recoverable(error),
        Err(error) => Acquired::Fatal(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeout() -> Result<()> {
        Err(Error::IoFailure("Connection timed out".to_string()))
    }

    #[test]
    fn read_timeouts_are_retried_a_few_times() {
        let mut timeouts = 0;
        for _ in 0..MAX_READ_TIMEOUTS {
            assert!(matches!(
                classify(timeout(), true, &mut timeouts),
                Acquired::Recoverable(Error::IoFailure(_))
            ));
        }
        assert!(matches!(
            classify(timeout(), true, &mut timeouts),
            Acquired::Fatal(Error::IoFailure(_))
        ));
    }

    #[test]
    fn a_frame_resets_the_timeout_count() {
        let mut timeouts = MAX_READ_TIMEOUTS - 1;
        assert!(matches!(classify(timeout(), true, &mut timeouts), Acquired::Recoverable(_)));
        assert!(matches!(classify(Ok(()), false, &mut timeouts), Acquired::Frame));
        assert_eq!(timeouts, 0);
        assert!(matches!(classify(timeout(), true, &mut timeouts), Acquired::Recoverable(_)));
    }

    #[test]
    fn other_failures_keep_their_severity() {
        let mut timeouts = 0;
        assert!(matches!(
            classify(Err(Error::FailedVideoDecoding("bad slice".to_string())), false, &mut timeouts),
            Acquired::Recoverable(_)
        ));
        assert!(matches!(
            classify(Err(Error::IoFailure("reset by peer".to_string())), false, &mut timeouts),
            Acquired::Fatal(_)
        ));
        assert!(matches!(
            classify(Err(Error::EndOfStream), false, &mut timeouts),
            Acquired::Fatal(Error::EndOfStream)
        ));
        assert_eq!(timeouts, 0);
    }

    #[test]
    fn every_property_is_idle_only() {
        let config = NetworkConfig::default();
        assert!(config.properties().iter().all(|p| p.idle_only));
    }

    #[test]
    fn options_follow_configuration() {
        let mut config = NetworkConfig::new("rtsp://camera/stream").with_credentials("admin", "pw");
        config.set_property("probe_size", Value::U32(1 << 20)).unwrap();
        config.set_property("rtsp_over_tcp", Value::Bool(true)).unwrap();
        config.set_property("timeout_ms", Value::U32(0)).unwrap();

        let options = config.open_options();
        assert_eq!(options.username.as_deref(), Some("admin"));
        assert_eq!(options.password.as_deref(), Some("pw"));
        assert_eq!(options.probe_size, Some(1 << 20));
        assert_eq!(options.timeout, None);
        assert!(options.rtsp_over_tcp);
    }

    #[test]
    fn debug_output_hides_the_password() {
        let config = NetworkConfig::new("rtsp://camera").with_credentials("admin", "hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn empty_url_is_invalid_configuration() {
        assert!(matches!(
            NetworkBackend::open(&NetworkConfig::default()),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}
