use std::{fmt, str::FromStr, time::Duration};
use thiserror::Error;
use url::Url;

pub const DEFAULT_WS_PATH: &str = "ws";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Which transports carry readings and limits.
///
/// `Both` keeps the server contract of the original web page: every poll
/// and every sync goes out over the real-time channel and as a plain
/// request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transports {
  #[default]
  Both,
  Channel,
  Request,
}

impl Transports {
  #[inline]
  pub fn channel(&self) -> bool {
    matches!(self, Transports::Both | Transports::Channel)
  }

  #[inline]
  pub fn request(&self) -> bool {
    matches!(self, Transports::Both | Transports::Request)
  }
}

impl fmt::Display for Transports {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Transports::Both => "both",
      Transports::Channel => "channel",
      Transports::Request => "request",
    })
  }
}

impl FromStr for Transports {
  type Err = ParseTransportsError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "both" => Ok(Transports::Both),
      "channel" | "ws" | "websocket" => Ok(Transports::Channel),
      "request" | "http" => Ok(Transports::Request),
      _ => Err(ParseTransportsError(s.into())),
    }
  }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
  pub base_url: Url,
  pub ws_path: String,
  pub poll_interval: Duration,
  pub request_timeout: Duration,
  pub connect_timeout: Duration,
  pub transports: Transports,
}

impl ClientConfig {
  pub fn new(base_url: Url) -> Self {
    Self {
      base_url,
      ws_path: DEFAULT_WS_PATH.into(),
      poll_interval: DEFAULT_POLL_INTERVAL,
      request_timeout: DEFAULT_REQUEST_TIMEOUT,
      connect_timeout: DEFAULT_CONNECT_TIMEOUT,
      transports: Transports::default(),
    }
  }

  pub fn with_ws_path(mut self, path: impl Into<String>) -> Self {
    self.ws_path = path.into();
    self
  }

  pub fn with_poll_interval(mut self, interval: Duration) -> Self {
    self.poll_interval = interval;
    self
  }

  pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
    self.request_timeout = timeout;
    self
  }

  pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
    self.connect_timeout = timeout;
    self
  }

  pub fn with_transports(mut self, transports: Transports) -> Self {
    self.transports = transports;
    self
  }

  /// Base URL with a trailing slash, so endpoints join below it.
  pub fn endpoint_base(&self) -> Url {
    endpoint_base(&self.base_url)
  }

  /// WebSocket URL of the real-time channel.
  pub fn channel_url(&self) -> Result<Url, ConfigError> {
    let mut url = self
      .endpoint_base()
      .join(self.ws_path.trim_start_matches('/'))?;

    let scheme = match url.scheme() {
      "http" | "ws" => "ws",
      "https" | "wss" => "wss",
      other => bail!(ConfigError::Scheme(other.into())),
    };

    if url.set_scheme(scheme).is_err() {
      bail!(ConfigError::Scheme(url.scheme().into()));
    }

    Ok(url)
  }
}

pub(crate) fn endpoint_base(url: &Url) -> Url {
  let mut base = url.clone();
  if !base.path().ends_with('/') {
    let path = format!("{}/", base.path());
    base.set_path(&path);
  }

  base
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("Failed to build channel URL.")]
  Url(#[from] url::ParseError),

  #[error("Unsupported URL scheme '{0}'.")]
  Scheme(String),
}

#[derive(Debug, Error)]
#[error("Unknown transport '{0}'. Expected one of: both, channel, request.")]
pub struct ParseTransportsError(pub String);

#[cfg(test)]
mod tests {
  use super::*;

  fn config(url: &str) -> ClientConfig {
    ClientConfig::new(url.parse().unwrap())
  }

  #[test]
  fn channel_url_from_http() {
    let url = config("http://localhost:8080").channel_url().unwrap();
    assert_eq!(url.as_str(), "ws://localhost:8080/ws");
  }

  #[test]
  fn channel_url_from_https_below_base_path() {
    let url = config("https://example.com/thermabox")
      .with_ws_path("/socket")
      .channel_url()
      .unwrap();
    assert_eq!(url.as_str(), "wss://example.com/thermabox/socket");
  }

  #[test]
  fn channel_url_rejects_other_schemes() {
    assert!(matches!(
      config("ftp://example.com").channel_url(),
      Err(ConfigError::Scheme(_))
    ));
  }

  #[test]
  fn transports_from_str() {
    assert_eq!("both".parse::<Transports>().unwrap(), Transports::Both);
    assert_eq!("WS".parse::<Transports>().unwrap(), Transports::Channel);
    assert_eq!("http".parse::<Transports>().unwrap(), Transports::Request);
    assert!("carrier-pigeon".parse::<Transports>().is_err());
  }

  #[test]
  fn transports_flags() {
    assert!(Transports::Both.channel() && Transports::Both.request());
    assert!(!Transports::Channel.request());
    assert!(!Transports::Request.channel());
  }
}
