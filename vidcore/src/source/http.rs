use std::fmt;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use tracing::debug;

use media_types::{Error, FrameBuffer, Result};

use crate::imaging::decode_jpeg;
use crate::property::{Configurable, PropertyDescriptor, Value, ValueType};
use crate::stop::StopSignal;

use super::{Acquired, Backend};

/// Pause after a failed request before the next attempt.
pub(super) const RETRY_DELAY: Duration = Duration::from_millis(250);

const HTTP_PROPERTIES: &[PropertyDescriptor] = &[
    PropertyDescriptor::new("url", ValueType::String, "camera URL").idle_only(),
    PropertyDescriptor::new("username", ValueType::String, "user name for HTTP authentication")
        .idle_only(),
    PropertyDescriptor::new("password", ValueType::String, "password for HTTP authentication")
        .idle_only(),
    PropertyDescriptor::new(
        "force_basic_auth",
        ValueType::Bool,
        "send credentials with the first request instead of after a challenge",
    )
    .idle_only(),
    PropertyDescriptor::new("timeout_ms", ValueType::U32, "connect and read timeout")
        .idle_only()
        .with_range(1.0, 600_000.0),
];

const JPEG_PROPERTIES: &[PropertyDescriptor] = &[
    HTTP_PROPERTIES[0],
    HTTP_PROPERTIES[1],
    HTTP_PROPERTIES[2],
    HTTP_PROPERTIES[3],
    HTTP_PROPERTIES[4],
    PropertyDescriptor::new(
        "frame_interval_ms",
        ValueType::U32,
        "minimum time between requests, 0 to poll continuously",
    ),
];

/**
    Connection settings shared by the HTTP camera sources.
*/
#[derive(Clone, PartialEq)]
pub struct HttpConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub force_basic_auth: bool,
    pub timeout_ms: u32,
}

impl HttpConfig {
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

    pub fn with_force_basic_auth(mut self, enabled: bool) -> Self {
        self.force_basic_auth = enabled;
        self
    }

    fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.into())
    }

    fn get(&self, name: &str) -> Result<Value> {
        match name {
            "url" => Ok(self.url.clone().into()),
            "username" => Ok(self.username.clone().into()),
            "password" => Ok(self.password.clone().into()),
            "force_basic_auth" => Ok(self.force_basic_auth.into()),
            "timeout_ms" => Ok(self.timeout_ms.into()),
            _ => Err(Error::InvalidProperty(name.to_string())),
        }
    }

    /**
        Assign an already checked value.
    */
    fn assign(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "url" => self.url = value.try_into()?,
            "username" => self.username = value.try_into()?,
            "password" => self.password = value.try_into()?,
            "force_basic_auth" => self.force_basic_auth = value.try_into()?,
            "timeout_ms" => self.timeout_ms = value.try_into()?,
            _ => return Err(Error::InvalidProperty(name.to_string())),
        }
        Ok(())
    }

    /**
        Validate the URL and build a client with the configured timeouts.
    */
    pub(super) fn client(&self) -> Result<Client> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(Error::InvalidConfiguration(format!(
                "'{}' is not an HTTP URL",
                self.url
            )));
        }

        Client::builder()
            .connect_timeout(self.timeout())
            .timeout(self.timeout())
            .build()
            .map_err(|e| Error::InvalidConfiguration(format!("cannot create HTTP client: {e}")))
    }

    /**
        Issue a GET, answering a basic-auth challenge when credentials are
        configured. Fails on transport errors and non-success statuses.
    */
    pub(super) fn request(&self, client: &Client) -> Result<Response> {
        let send = |authenticate: bool| {
            let mut request = client.get(&self.url);
            if authenticate {
                request = request.basic_auth(&self.username, Some(&self.password));
            }
            request
                .send()
                .map_err(|e| Error::ConnectionFailed(format!("{}: {e}", self.url)))
        };

        let preemptive = self.force_basic_auth && self.has_credentials();
        let mut response = send(preemptive)?;
        if response.status() == StatusCode::UNAUTHORIZED && self.has_credentials() && !preemptive {
            debug!(url = %self.url, "answering authentication challenge");
            response = send(true)?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ConnectionFailed(format!("{}: HTTP {status}", self.url)));
        }
        Ok(response)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            force_basic_auth: false,
            timeout_ms: 10_000,
        }
    }
}

impl fmt::Debug for HttpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("force_basic_auth", &self.force_basic_auth)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

impl Configurable for HttpConfig {
    fn properties(&self) -> &'static [PropertyDescriptor] {
        HTTP_PROPERTIES
    }

    fn get_property(&self, name: &str) -> Result<Value> {
        self.get(name)
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
        let value = self.descriptor(name)?.check(value)?;
        self.assign(name, value)
    }
}

/**
    Configuration of the JPEG polling source.
*/
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JpegConfig {
    pub http: HttpConfig,
    pub frame_interval_ms: u32,
}

impl JpegConfig {
    pub fn new(http: HttpConfig) -> Self {
        Self {
            http,
            frame_interval_ms: 0,
        }
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval_ms = u32::try_from(interval.as_millis()).unwrap_or(u32::MAX);
        self
    }
}

impl Configurable for JpegConfig {
    fn properties(&self) -> &'static [PropertyDescriptor] {
        JPEG_PROPERTIES
    }

    fn get_property(&self, name: &str) -> Result<Value> {
        match name {
            "frame_interval_ms" => Ok(self.frame_interval_ms.into()),
            _ => self.http.get(name),
        }
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
        let value = self.descriptor(name)?.check(value)?;
        match name {
            "frame_interval_ms" => {
                self.frame_interval_ms = value.try_into()?;
                Ok(())
            }
            _ => self.http.assign(name, value),
        }
    }
}

/**
    Polls a camera's still-image URL, one request per frame.
*/
pub struct JpegBackend {
    client: Client,
    http: HttpConfig,
    interval: Duration,
    last_request: Option<Instant>,
}

impl JpegBackend {
    fn fetch(&self) -> Result<FrameBuffer> {
        let body = self
            .http
            .request(&self.client)?
            .bytes()
            .map_err(|e| Error::ConnectionFailed(format!("{}: {e}", self.http.url)))?;
        decode_jpeg(&body)
    }
}

impl Backend for JpegBackend {
    type Config = JpegConfig;

    fn open(config: &JpegConfig) -> Result<Self> {
        Ok(Self {
            client: config.http.client()?,
            http: config.http.clone(),
            interval: Duration::from_millis(config.frame_interval_ms.into()),
            last_request: None,
        })
    }

    fn next_frame(&mut self, stop: &StopSignal, image: &mut Option<FrameBuffer>) -> Acquired {
        if let Some(last) = self.last_request
            && let Some(remaining) = self.interval.checked_sub(last.elapsed())
            && !remaining.is_zero()
            && stop.wait(remaining)
        {
            return Acquired::Idle;
        }

        self.last_request = Some(Instant::now());
        match self.fetch() {
            Ok(frame) => {
                *image = Some(frame);
                Acquired::Frame
            }
            Err(error) => {
                stop.wait(RETRY_DELAY);
                Acquired::Recoverable(error)
            }
        }
    }

    fn reconfigure(&mut self, config: &JpegConfig) {
        self.interval = Duration::from_millis(config.frame_interval_ms.into());
    }
}
