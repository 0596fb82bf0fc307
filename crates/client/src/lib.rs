macro_rules! bail {
  ($err:expr) => {
    return Err($err.into())
  };
}

pub mod chan;
mod con;
mod config;
mod enc;
mod poll;
pub mod req;
mod view;

use std::{sync::Arc, time::Duration};

pub use chan::{Busy, Channel, ChannelError, ChannelHandler, NoReply};
pub use con::{ConnectError, ConnectionClosed};
pub use config::{ClientConfig, ConfigError, ParseTransportsError, Transports};
pub use req::{limits_form, HttpRequests, HttpStatusError, RequestError, Requests};
pub use thermabox_proto::{Limits, State, Temperature};
pub use url::Url;
pub use view::{Display, LimitsForm, Reading, Source};

use poll::Poller;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{event, instrument, Level};

/// Keeps a thermabox's temperature display and limit fields in sync with
/// its web server.
///
/// Readings are polled over the real-time channel and as plain requests;
/// edited limits are pushed the same way. Which transports are used is
/// decided by [`Transports`].
pub struct SyncController<C, R> {
  channel: Option<Arc<C>>,
  requests: Arc<R>,
  transports: Transports,
  display: Display,
  form: LimitsForm,
  poller: Option<Poller>,
  shutdown: CancellationToken,
}

/// Sync controller talking to a real thermabox server.
pub type ThermaboxClient = SyncController<ChannelHandler, HttpRequests>;

impl ThermaboxClient {
  /// Opens the channel, starts polling and loads the current limits into
  /// the form.
  #[instrument(level = "info", target = "thermabox-client", skip(config), fields(url = %config.base_url, transports = %config.transports), err)]
  pub async fn connect(config: ClientConfig) -> Result<Self, ClientConnectError> {
    let shutdown = CancellationToken::new();
    let display = Display::new();
    let requests = HttpRequests::new(&config.base_url, config.request_timeout)?;

    let channel = if config.transports.channel() {
      let url = config.channel_url()?;
      let channel = ChannelHandler::new(
        url,
        config.connect_timeout,
        display.clone(),
        shutdown.child_token(),
      )
      .await?;

      Some(channel)
    } else {
      None
    };

    let mut client = SyncController::new(
      channel,
      requests,
      config.transports,
      display,
      LimitsForm::default(),
      shutdown,
    );

    client.start(config.poll_interval);
    let limits = client.load_limits().await?;
    event!(target: "thermabox-client", Level::INFO, limits.temperature, limits.threshold, "connected to thermabox");

    Ok(client)
  }
}

impl<C: Channel, R: Requests> SyncController<C, R> {
  pub fn new(
    channel: Option<C>,
    requests: R,
    transports: Transports,
    display: Display,
    form: LimitsForm,
    shutdown: CancellationToken,
  ) -> Self {
    Self {
      channel: channel.map(Arc::new),
      requests: Arc::new(requests),
      transports,
      display,
      form,
      poller: None,
      shutdown,
    }
  }

  pub fn display(&self) -> &Display {
    &self.display
  }

  pub fn form(&self) -> &LimitsForm {
    &self.form
  }

  pub fn transports(&self) -> Transports {
    self.transports
  }

  fn channel(&self) -> Option<&Arc<C>> {
    if self.transports.channel() {
      self.channel.as_ref()
    } else {
      None
    }
  }

  fn requests(&self) -> Option<&Arc<R>> {
    if self.transports.request() {
      Some(&self.requests)
    } else {
      None
    }
  }

  /// Starts polling the temperature every `period`. Does nothing if the
  /// poller is already running.
  pub fn start(&mut self, period: Duration) {
    if self.poller.is_some() {
      return;
    }

    self.poller = Some(Poller::spawn(
      period,
      self.channel().cloned(),
      self.requests().cloned(),
      self.display.clone(),
      self.shutdown.child_token(),
    ));
  }

  pub fn stop(&mut self) {
    self.poller = None;
  }

  pub fn is_polling(&self) -> bool {
    self.poller.is_some()
  }

  /// Stops polling and closes the channel.
  pub fn shutdown(&self) {
    self.shutdown.cancel();
  }

  /// Pushes the form's limits over every enabled transport.
  ///
  /// Both transports are always attempted. Nothing waits for the server
  /// to apply the values, and overlapping calls are not serialized.
  #[instrument(level = "debug", target = "thermabox-client", skip(self), err)]
  pub async fn sync(&self) -> Result<(), SyncError> {
    let limits = self.form.get();
    event!(target: "thermabox-client", Level::INFO, limits.temperature, limits.threshold, "syncing limits");

    let channel = async {
      match self.channel() {
        Some(channel) => channel.set_limits(limits).await.map_err(SyncError::from),
        None => Ok(()),
      }
    };

    let request = async {
      match self.requests() {
        Some(requests) => requests.set_limits(limits).await.map_err(SyncError::from),
        None => Ok(()),
      }
    };

    let (channel, request) = futures::join!(channel, request);
    merge(channel, request)
  }

  /// Fetches the server's limits and writes them into the form.
  #[instrument(level = "debug", target = "thermabox-client", skip(self), err)]
  pub async fn load_limits(&self) -> Result<Limits, SyncError> {
    let limits = match (self.requests(), self.channel()) {
      (Some(requests), _) => requests.get_limits().await?,
      (None, Some(channel)) => channel.get_limits().await?,
      (None, None) => bail!(NoTransport),
    };

    self.form.set(limits);
    Ok(limits)
  }

  pub async fn state(&self) -> Result<State, SyncError> {
    match (self.requests(), self.channel()) {
      (Some(requests), _) => Ok(requests.get_state().await?),
      (None, Some(channel)) => Ok(channel.get_state().await?),
      (None, None) => bail!(NoTransport),
    }
  }

  /// Asks the channel for the limits and waits for its reply. Leaves the
  /// form alone.
  pub async fn channel_limits(&self) -> Result<Limits, SyncError> {
    match self.channel() {
      Some(channel) => Ok(channel.get_limits().await?),
      None => bail!(NoTransport),
    }
  }

  pub async fn channel_state(&self) -> Result<State, SyncError> {
    match self.channel() {
      Some(channel) => Ok(channel.get_state().await?),
      None => bail!(NoTransport),
    }
  }

  #[instrument(level = "info", target = "thermabox-client", skip(self), err)]
  pub async fn enable(&self) -> Result<(), SyncError> {
    let channel = async {
      match self.channel() {
        Some(channel) => channel.enable().await.map_err(SyncError::from),
        None => Ok(()),
      }
    };

    let request = async {
      match self.requests() {
        Some(requests) => requests.enable().await.map_err(SyncError::from),
        None => Ok(()),
      }
    };

    let (channel, request) = futures::join!(channel, request);
    merge(channel, request)
  }

  #[instrument(level = "info", target = "thermabox-client", skip(self), err)]
  pub async fn disable(&self) -> Result<(), SyncError> {
    let channel = async {
      match self.channel() {
        Some(channel) => channel.disable().await.map_err(SyncError::from),
        None => Ok(()),
      }
    };

    let request = async {
      match self.requests() {
        Some(requests) => requests.disable().await.map_err(SyncError::from),
        None => Ok(()),
      }
    };

    let (channel, request) = futures::join!(channel, request);
    merge(channel, request)
  }
}

impl<C, R> Drop for SyncController<C, R> {
  fn drop(&mut self) {
    self.shutdown.cancel();
  }
}

/// Reports the request error when both transports fail; the channel
/// error is only logged then.
fn merge(channel: Result<(), SyncError>, request: Result<(), SyncError>) -> Result<(), SyncError> {
  match (channel, request) {
    (Ok(()), Ok(())) => Ok(()),
    (Err(error), Ok(())) | (Ok(()), Err(error)) => Err(error),
    (Err(channel), Err(request)) => {
      event!(target: "thermabox-client", Level::WARN, error = ?channel, "channel failed as well");
      Err(request)
    }
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
#[error("Failed to reach thermabox.")]
pub enum SyncError {
  Channel(#[from] ChannelError),
  Request(#[from] RequestError),
  NoTransport(#[from] NoTransport),
}

#[derive(Debug, Error)]
#[error("No transport enabled.")]
pub struct NoTransport;

#[non_exhaustive]
#[derive(Debug, Error)]
#[error("Failed to connect to thermabox.")]
pub enum ClientConnectError {
  Config(#[from] ConfigError),
  Connect(#[from] ConnectError),
  Request(#[from] RequestError),
  LoadLimits(#[from] SyncError),
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use std::sync::Mutex;

  #[derive(Default)]
  struct Calls {
    temperature_requests: Vec<u64>,
    set_limits: Vec<Limits>,
    enabled: usize,
    disabled: usize,
  }

  #[derive(Default, Clone)]
  struct FakeChannel {
    calls: Arc<Mutex<Calls>>,
    display: Option<Display>,
    reply: Option<f64>,
    broken: bool,
    stalled: bool,
  }

  impl FakeChannel {
    fn calls(&self) -> std::sync::MutexGuard<'_, Calls> {
      self.calls.lock().unwrap()
    }
  }

  #[async_trait]
  impl Channel for FakeChannel {
    async fn request_temperature(&self, seq: u64) -> Result<(), ChannelError> {
      self.calls().temperature_requests.push(seq);
      if self.stalled {
        futures::future::pending::<()>().await;
      }

      if let (Some(display), Some(temp)) = (&self.display, self.reply) {
        display.offer(Reading::new(Temperature::new(temp), seq, Source::Channel));
      }
      Ok(())
    }

    async fn set_limits(&self, limits: Limits) -> Result<(), ChannelError> {
      self.calls().set_limits.push(limits);
      if self.broken {
        return Err(ChannelError::Closed(ConnectionClosed));
      }
      Ok(())
    }

    async fn get_limits(&self) -> Result<Limits, ChannelError> {
      Ok(Limits::new(50.0, 1.0))
    }

    async fn get_state(&self) -> Result<State, ChannelError> {
      Ok(State::CoolingDown)
    }

    async fn enable(&self) -> Result<(), ChannelError> {
      self.calls().enabled += 1;
      Ok(())
    }

    async fn disable(&self) -> Result<(), ChannelError> {
      self.calls().disabled += 1;
      Ok(())
    }
  }

  #[derive(Default, Clone)]
  struct FakeRequests {
    calls: Arc<Mutex<Calls>>,
    temperature: Option<f64>,
    limits: Option<Limits>,
  }

  impl FakeRequests {
    fn calls(&self) -> std::sync::MutexGuard<'_, Calls> {
      self.calls.lock().unwrap()
    }
  }

  #[async_trait]
  impl Requests for FakeRequests {
    async fn get_temperature(&self) -> Result<Temperature, RequestError> {
      self.calls().temperature_requests.push(0);
      let temp = self.temperature.unwrap_or(68.0);
      Ok(Temperature::new(temp))
    }

    async fn set_limits(&self, limits: Limits) -> Result<(), RequestError> {
      self.calls().set_limits.push(limits);
      Ok(())
    }

    async fn get_limits(&self) -> Result<Limits, RequestError> {
      match self.limits {
        Some(limits) => Ok(limits),
        None => Err(RequestError::Limits(
          serde_json::from_str::<Limits>("not json").unwrap_err(),
        )),
      }
    }

    async fn get_state(&self) -> Result<State, RequestError> {
      Ok(State::Stable)
    }

    async fn enable(&self) -> Result<(), RequestError> {
      self.calls().enabled += 1;
      Ok(())
    }

    async fn disable(&self) -> Result<(), RequestError> {
      self.calls().disabled += 1;
      Ok(())
    }
  }

  fn controller(
    channel: FakeChannel,
    requests: FakeRequests,
    transports: Transports,
    display: Display,
  ) -> SyncController<FakeChannel, FakeRequests> {
    SyncController::new(
      Some(channel),
      requests,
      transports,
      display,
      LimitsForm::default(),
      CancellationToken::new(),
    )
  }

  #[tokio::test]
  async fn sync_sends_form_once_per_transport() {
    let channel = FakeChannel::default();
    let requests = FakeRequests::default();
    let ctl = controller(
      channel.clone(),
      requests.clone(),
      Transports::Both,
      Display::new(),
    );

    ctl.form().set_temperature(70.0);
    ctl.form().set_threshold(2.0);
    ctl.sync().await.unwrap();

    assert_eq!(channel.calls().set_limits, vec![Limits::new(70.0, 2.0)]);
    assert_eq!(requests.calls().set_limits, vec![Limits::new(70.0, 2.0)]);
  }

  #[tokio::test]
  async fn sync_respects_transport_policy() {
    let channel = FakeChannel::default();
    let requests = FakeRequests::default();
    let ctl = controller(
      channel.clone(),
      requests.clone(),
      Transports::Request,
      Display::new(),
    );

    ctl.sync().await.unwrap();

    assert!(channel.calls().set_limits.is_empty());
    assert_eq!(requests.calls().set_limits.len(), 1);
  }

  #[tokio::test]
  async fn sync_still_posts_when_channel_fails() {
    let channel = FakeChannel {
      broken: true,
      ..FakeChannel::default()
    };
    let requests = FakeRequests::default();
    let ctl = controller(
      channel.clone(),
      requests.clone(),
      Transports::Both,
      Display::new(),
    );

    let err = ctl.sync().await.unwrap_err();
    assert!(matches!(err, SyncError::Channel(_)));
    assert_eq!(requests.calls().set_limits.len(), 1);
  }

  #[tokio::test]
  async fn load_limits_fills_the_form() {
    let requests = FakeRequests {
      limits: Some(Limits::new(65.0, 3.0)),
      ..FakeRequests::default()
    };
    let ctl = controller(
      FakeChannel::default(),
      requests,
      Transports::Both,
      Display::new(),
    );

    ctl.form().set(Limits::new(1.0, 1.0));
    let limits = ctl.load_limits().await.unwrap();

    assert_eq!(limits, Limits::new(65.0, 3.0));
    assert_eq!(ctl.form().get(), Limits::new(65.0, 3.0));
  }

  #[tokio::test]
  async fn load_limits_failure_keeps_the_form() {
    let ctl = controller(
      FakeChannel::default(),
      FakeRequests::default(),
      Transports::Both,
      Display::new(),
    );

    ctl.form().set(Limits::new(1.0, 1.0));
    assert!(matches!(
      ctl.load_limits().await,
      Err(SyncError::Request(RequestError::Limits(_)))
    ));
    assert_eq!(ctl.form().get(), Limits::new(1.0, 1.0));
  }

  #[tokio::test]
  async fn channel_only_loads_limits_from_channel() {
    let ctl = controller(
      FakeChannel::default(),
      FakeRequests::default(),
      Transports::Channel,
      Display::new(),
    );

    assert_eq!(ctl.load_limits().await.unwrap(), Limits::new(50.0, 1.0));
    assert_eq!(ctl.state().await.unwrap(), State::CoolingDown);
  }

  #[tokio::test]
  async fn channel_queries_need_the_channel() {
    let ctl = controller(
      FakeChannel::default(),
      FakeRequests::default(),
      Transports::Request,
      Display::new(),
    );

    assert!(matches!(
      ctl.channel_limits().await,
      Err(SyncError::NoTransport(_))
    ));

    let ctl = controller(
      FakeChannel::default(),
      FakeRequests::default(),
      Transports::Both,
      Display::new(),
    );
    assert_eq!(ctl.channel_state().await.unwrap(), State::CoolingDown);
  }

  #[tokio::test]
  async fn enable_and_disable_use_both_transports() {
    let channel = FakeChannel::default();
    let requests = FakeRequests::default();
    let ctl = controller(
      channel.clone(),
      requests.clone(),
      Transports::Both,
      Display::new(),
    );

    ctl.enable().await.unwrap();
    ctl.disable().await.unwrap();

    assert_eq!(channel.calls().enabled, 1);
    assert_eq!(channel.calls().disabled, 1);
    assert_eq!(requests.calls().enabled, 1);
    assert_eq!(requests.calls().disabled, 1);
    assert_eq!(ctl.state().await.unwrap(), State::Stable);
  }

  #[tokio::test(start_paused = true)]
  async fn poller_hits_both_transports_every_tick() {
    let channel = FakeChannel::default();
    let requests = FakeRequests::default();
    let mut ctl = controller(
      channel.clone(),
      requests.clone(),
      Transports::Both,
      Display::new(),
    );

    ctl.start(Duration::from_millis(300));
    tokio::time::sleep(Duration::from_millis(950)).await;

    assert_eq!(channel.calls().temperature_requests, vec![1, 2, 3]);
    assert_eq!(requests.calls().temperature_requests.len(), 3);
    assert_eq!(ctl.display().text(), "68");
    assert_eq!(ctl.display().current().map(|r| r.seq), Some(3));
  }

  #[tokio::test(start_paused = true)]
  async fn stalled_channel_does_not_hold_plain_requests() {
    let channel = FakeChannel {
      stalled: true,
      ..FakeChannel::default()
    };
    let requests = FakeRequests::default();
    let mut ctl = controller(
      channel.clone(),
      requests.clone(),
      Transports::Both,
      Display::new(),
    );

    ctl.start(Duration::from_millis(300));
    tokio::time::sleep(Duration::from_millis(350)).await;

    assert_eq!(channel.calls().temperature_requests, vec![1]);
    assert_eq!(requests.calls().temperature_requests.len(), 1);
    assert_eq!(ctl.display().text(), "68");

    ctl.stop();
    tokio::time::sleep(Duration::from_millis(3000)).await;
    assert_eq!(requests.calls().temperature_requests.len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn poller_stops_when_cancelled() {
    let channel = FakeChannel::default();
    let requests = FakeRequests::default();
    let mut ctl = controller(
      channel.clone(),
      requests.clone(),
      Transports::Both,
      Display::new(),
    );

    ctl.start(Duration::from_millis(300));
    tokio::time::sleep(Duration::from_millis(650)).await;
    ctl.stop();
    assert!(!ctl.is_polling());
    tokio::time::sleep(Duration::from_millis(3000)).await;

    assert_eq!(channel.calls().temperature_requests.len(), 2);
    assert_eq!(requests.calls().temperature_requests.len(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn dropping_the_controller_stops_polling() {
    let channel = FakeChannel::default();
    let mut ctl = controller(
      channel.clone(),
      FakeRequests::default(),
      Transports::Channel,
      Display::new(),
    );

    ctl.start(Duration::from_millis(300));
    tokio::time::sleep(Duration::from_millis(350)).await;
    drop(ctl);
    tokio::time::sleep(Duration::from_millis(3000)).await;

    assert_eq!(channel.calls().temperature_requests.len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn display_shows_one_of_the_two_answers() {
    let display = Display::new();
    let channel = FakeChannel {
      display: Some(display.clone()),
      reply: Some(72.0),
      ..FakeChannel::default()
    };
    let requests = FakeRequests {
      temperature: Some(68.0),
      ..FakeRequests::default()
    };
    let mut ctl = controller(channel, requests, Transports::Both, display);

    ctl.start(Duration::from_millis(300));
    tokio::time::sleep(Duration::from_millis(350)).await;

    let text = ctl.display().text();
    assert!(text == "72" || text == "68", "unexpected display text {}", text);
  }
}
