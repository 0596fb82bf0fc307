use crate::config::endpoint_base;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thermabox_proto::{Limits, ParseTemperatureError, State, Temperature};
use thiserror::Error;
use tracing::{event, instrument, Level};
use url::Url;

pub const PATH_GET_TEMPERATURE: &str = "get-temperature";
pub const PATH_SET_LIMITS: &str = "set-limits";
pub const PATH_GET_LIMITS: &str = "get-limits";
pub const PATH_GET_STATE: &str = "get-state";
pub const PATH_ENABLE: &str = "enable-thermabox";
pub const PATH_DISABLE: &str = "disable-thermabox";

/// Discrete request/response calls against the thermabox web server.
#[async_trait]
pub trait Requests: Send + Sync + 'static {
  /// Parses the plain-text body as a number, so the display renders it
  /// the way [`Temperature`] does (`68.50` shows as `68.5`).
  async fn get_temperature(&self) -> Result<Temperature, RequestError>;

  async fn set_limits(&self, limits: Limits) -> Result<(), RequestError>;

  async fn get_limits(&self) -> Result<Limits, RequestError>;

  async fn get_state(&self) -> Result<State, RequestError>;

  async fn enable(&self) -> Result<(), RequestError>;

  async fn disable(&self) -> Result<(), RequestError>;
}

/// Form body of `POST /set-limits`.
pub fn limits_form(limits: &Limits) -> [(&'static str, String); 2] {
  [
    ("temperature", limits.temperature.to_string()),
    ("threshold", limits.threshold.to_string()),
  ]
}

pub struct HttpRequests {
  client: Client,
  base: Url,
}

impl HttpRequests {
  pub fn new(base: &Url, timeout: Duration) -> Result<Self, RequestError> {
    let client = Client::builder().timeout(timeout).build()?;

    Ok(Self {
      client,
      base: endpoint_base(base),
    })
  }

  fn endpoint(&self, path: &str) -> Result<Url, RequestError> {
    Ok(self.base.join(path)?)
  }

  async fn get_text(&self, path: &str) -> Result<String, RequestError> {
    let url = self.endpoint(path)?;
    let response = self.client.get(url).send().await?;
    read_body(response).await
  }
}

async fn read_body(response: reqwest::Response) -> Result<String, RequestError> {
  let status = response.status();
  let body = response.text().await?;
  if !status.is_success() {
    bail!(HttpStatusError { status, body });
  }

  Ok(body)
}

#[async_trait]
impl Requests for HttpRequests {
  #[instrument(level = "trace", target = "thermabox-client::req", skip(self), err(level = "warn"))]
  async fn get_temperature(&self) -> Result<Temperature, RequestError> {
    let body = self.get_text(PATH_GET_TEMPERATURE).await?;
    Ok(body.parse()?)
  }

  #[instrument(level = "debug", target = "thermabox-client::req", skip(self), err)]
  async fn set_limits(&self, limits: Limits) -> Result<(), RequestError> {
    let url = self.endpoint(PATH_SET_LIMITS)?;
    let response = self
      .client
      .post(url)
      .form(&limits_form(&limits))
      .send()
      .await?;

    read_body(response).await?;
    Ok(())
  }

  #[instrument(level = "debug", target = "thermabox-client::req", skip(self), err)]
  async fn get_limits(&self) -> Result<Limits, RequestError> {
    let body = self.get_text(PATH_GET_LIMITS).await?;
    let limits = serde_json::from_str(&body)?;
    event!(target: "thermabox-client::req", Level::DEBUG, ?limits, "got limits");
    Ok(limits)
  }

  #[instrument(level = "debug", target = "thermabox-client::req", skip(self), err)]
  async fn get_state(&self) -> Result<State, RequestError> {
    let body = self.get_text(PATH_GET_STATE).await?;
    match body.parse() {
      Ok(state) => Ok(state),
      Err(never) => match never {},
    }
  }

  #[instrument(level = "debug", target = "thermabox-client::req", skip(self), err)]
  async fn enable(&self) -> Result<(), RequestError> {
    self.get_text(PATH_ENABLE).await?;
    Ok(())
  }

  #[instrument(level = "debug", target = "thermabox-client::req", skip(self), err)]
  async fn disable(&self) -> Result<(), RequestError> {
    self.get_text(PATH_DISABLE).await?;
    Ok(())
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
#[error("Failed to complete thermabox request.")]
pub enum RequestError {
  Transport(#[from] reqwest::Error),

  Status(#[from] HttpStatusError),

  Temperature(#[from] ParseTemperatureError),

  Limits(#[from] serde_json::Error),

  Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
#[error("Server responded with {status}.")]
pub struct HttpStatusError {
  pub status: StatusCode,
  pub body: String,
}
