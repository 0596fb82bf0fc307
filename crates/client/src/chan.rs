use crate::{
  con::{ConnectError, Connection, ConnectionClosed, RecvError, SendError},
  view::{Display, Reading, Source},
};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use std::{collections::VecDeque, time::Duration};
use thermabox_proto::{Emit, Limits, Notification, NotificationKind, State};
use thiserror::Error;
use tokio::{
  sync::{mpsc, oneshot},
  task::{JoinError, JoinHandle},
};
use tokio_util::sync::CancellationToken;
use tracing::{event, instrument, Level};
use url::Url;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// The real-time channel as seen by the sync controller.
#[async_trait]
pub trait Channel: Send + Sync + 'static {
  /// Emits `get-temperature`; the answer lands on the display stamped with `seq`.
  async fn request_temperature(&self, seq: u64) -> Result<(), ChannelError>;

  async fn set_limits(&self, limits: Limits) -> Result<(), ChannelError>;

  async fn get_limits(&self) -> Result<Limits, ChannelError>;

  async fn get_state(&self) -> Result<State, ChannelError>;

  async fn enable(&self) -> Result<(), ChannelError>;

  async fn disable(&self) -> Result<(), ChannelError>;
}

enum ActorMessage {
  RequestTemperature(u64),
  Emit(Emit, oneshot::Sender<Result<(), SendError>>),
  Query(Emit, ReplyListener),
}

macro_rules! define_reply_listener {
  ($($res:ident($ty:ty)),*$(,)?) => {
    enum ReplyListener {
      $(
        $res(oneshot::Sender<Result<$ty, ChannelError>>),
      )*
    }

    impl ReplyListener {
      fn is_closed(&self) -> bool {
        match self {
          $(
            Self::$res(sender) => sender.is_closed(),
          )*
        }
      }

      fn kind(&self) -> NotificationKind {
        match self {
          $(
            Self::$res(_) => NotificationKind::$res,
          )*
        }
      }

      fn accept(self, notification: Notification) -> Result<(), Notification> {
        match self {
          $(
            Self::$res(sender) => {
              let msg = <$ty>::try_from(notification)?;
              // The caller may have given up waiting.
              let _ = sender.send(Ok(msg));
              Ok(())
            }
          )*
        }
      }

      fn error(self, error: ChannelError) {
        match self {
          $(
            Self::$res(sender) => {
              let _ = sender.send(Err(error));
            }
          )*
        }
      }
    }

    $(
      impl From<oneshot::Sender<Result<$ty, ChannelError>>> for ReplyListener {
        #[inline]
        fn from(sender: oneshot::Sender<Result<$ty, ChannelError>>) -> Self {
          Self::$res(sender)
        }
      }
    )*
  };
}

define_reply_listener! {
  Limits(Limits),
  State(State),
}

struct ChannelActor {
  url: Url,
  conn: Option<Connection>,
  reconnect: Option<JoinHandle<Result<Connection, ConnectError>>>,
  recv: mpsc::Receiver<ActorMessage>,
  display: Display,
  /// Seq of the newest `get-temperature` sent on this connection.
  requested: Option<u64>,
  listeners: VecDeque<ReplyListener>,
  shutdown: CancellationToken,
}

enum Step {
  Notification(Result<Notification, RecvError>),
  Command(Option<ActorMessage>),
  Reconnected(Result<Result<Connection, ConnectError>, JoinError>),
  Shutdown,
}

impl ChannelActor {
  fn new(
    url: Url,
    conn: Connection,
    recv: mpsc::Receiver<ActorMessage>,
    display: Display,
    shutdown: CancellationToken,
  ) -> Self {
    Self {
      url,
      conn: Some(conn),
      reconnect: None,
      recv,
      display,
      requested: None,
      listeners: VecDeque::new(),
      shutdown,
    }
  }

  async fn run(mut self) {
    loop {
      if self.conn.is_none() && self.reconnect.is_none() {
        self.start_reconnect();
      }

      let step = if let Some(conn) = self.conn.as_mut() {
        tokio::select! {
          _ = self.shutdown.cancelled() => Step::Shutdown,
          msg = conn.recv() => Step::Notification(msg),
          cmd = self.recv.recv() => Step::Command(cmd),
        }
      } else if let Some(pending) = self.reconnect.as_mut() {
        tokio::select! {
          _ = self.shutdown.cancelled() => Step::Shutdown,
          conn = pending => Step::Reconnected(conn),
          cmd = self.recv.recv() => Step::Command(cmd),
        }
      } else {
        continue;
      };

      let result = match step {
        Step::Notification(msg) => self.handle_notification(msg),
        Step::Command(cmd) => self.handle_cmd(cmd).await,
        Step::Reconnected(conn) => self.handle_reconnected(conn),
        Step::Shutdown => Err(()),
      };

      if result.is_err() {
        break;
      }
    }

    if let Some(pending) = self.reconnect.take() {
      pending.abort();
    }

    if let Some(conn) = self.conn.take() {
      conn.close().await;
    }

    self.fail_pending();
    event!(target: "thermabox-client::chan", Level::DEBUG, "channel actor stopped");
  }

  fn handle_notification(&mut self, msg: Result<Notification, RecvError>) -> Result<(), ()> {
    let msg = match msg {
      Ok(v) => v,
      Err(RecvError::DecoderError(error)) => {
        event!(target: "thermabox-client::chan", Level::WARN, ?error, "dropping malformed notification");
        return Ok(());
      }
      Err(error) => {
        event!(target: "thermabox-client::chan", Level::ERROR, ?error, "channel disconnected");
        self.conn = None;
        self.fail_pending();
        return Ok(());
      }
    };

    event!(target: "thermabox-client::chan", Level::DEBUG, message.kind = ?msg.kind(), "received notification");
    match msg {
      Notification::Temperature(ind) => {
        // The server drops requests it cannot answer, so a reply is
        // taken to answer the newest request.
        let seq = self
          .requested
          .unwrap_or_else(|| self.display.latest_seq());
        self.display.offer(Reading::new(ind.temp, seq, Source::Channel));
      }

      Notification::SetLimits(ack)
      | Notification::EnableThermabox(ack)
      | Notification::DisableThermabox(ack) => {
        if !ack.is_ok() {
          event!(target: "thermabox-client::chan", Level::WARN, ack = ?ack.0, "server did not acknowledge");
        }
      }

      Notification::Unknown(ind) => {
        event!(target: "thermabox-client::chan", Level::WARN, event = %ind.event, "ignoring unknown event");
      }

      msg => {
        let kind = msg.kind();
        self.listeners.retain(|l| !l.is_closed());
        match self.listeners.iter().position(|l| l.kind() == kind) {
          None => {
            event!(target: "thermabox-client::chan", Level::WARN, message.kind = ?kind, "no listener available");
          }
          Some(idx) => {
            if let Some(listener) = self.listeners.remove(idx) {
              if let Err(msg) = listener.accept(msg) {
                event!(target: "thermabox-client::chan", Level::WARN, message.kind = ?msg.kind(), "wrong listener available");
              }
            }
          }
        }
      }
    }

    Ok(())
  }

  async fn handle_cmd(&mut self, msg: Option<ActorMessage>) -> Result<(), ()> {
    let msg = if let Some(msg) = msg {
      msg
    } else {
      return Err(());
    };

    match msg {
      ActorMessage::RequestTemperature(seq) => {
        match self.send(&Emit::GetTemperature).await {
          Ok(()) => self.requested = Some(seq),
          Err(error) => {
            event!(target: "thermabox-client::chan", Level::DEBUG, seq, ?error, "temperature request not sent");
          }
        }
      }

      ActorMessage::Emit(emit, res) => {
        let result = self.send(&emit).await;
        let _ = res.send(result);
      }

      ActorMessage::Query(emit, listener) => match self.send(&emit).await {
        Ok(()) => self.listeners.push_back(listener),
        Err(error) => listener.error(error.into()),
      },
    }

    Ok(())
  }

  fn handle_reconnected(
    &mut self,
    conn: Result<Result<Connection, ConnectError>, JoinError>,
  ) -> Result<(), ()> {
    self.reconnect = None;
    match conn {
      Ok(Ok(conn)) => {
        event!(target: "thermabox-client::chan", Level::INFO, url = %self.url, "channel reconnected");
        self.conn = Some(conn);
      }
      Ok(Err(error)) => {
        event!(target: "thermabox-client::chan", Level::ERROR, ?error, "channel reconnect failed");
      }
      Err(error) => {
        event!(target: "thermabox-client::chan", Level::ERROR, ?error, "channel reconnect task failed");
      }
    }

    Ok(())
  }

  async fn send(&mut self, emit: &Emit) -> Result<(), SendError> {
    match &mut self.conn {
      Some(conn) => conn.send(emit).await,
      None => bail!(ConnectionClosed),
    }
  }

  fn start_reconnect(&mut self) {
    let url = self.url.clone();
    self.reconnect = Some(tokio::spawn(async move { connect(&url, None).await }));
  }

  fn fail_pending(&mut self) {
    self.requested = None;
    for listener in self.listeners.drain(..) {
      listener.error(ChannelError::Closed(ConnectionClosed));
    }
  }
}

async fn connect(url: &Url, max_elapsed: Option<Duration>) -> Result<Connection, ConnectError> {
  let policy = ExponentialBackoff {
    max_elapsed_time: max_elapsed,
    ..ExponentialBackoff::default()
  };

  backoff::future::retry(policy, move || async move {
    Connection::new(url).await.map_err(|error| {
      event!(target: "thermabox-client::chan", Level::WARN, %url, ?error, "channel connect attempt failed");
      backoff::Error::transient(error)
    })
  })
  .await
}

/// Handle to the actor owning the real-time channel.
pub struct ChannelHandler {
  sender: mpsc::Sender<ActorMessage>,
  shutdown: CancellationToken,
}

impl ChannelHandler {
  #[instrument(level = "info", target = "thermabox-client::chan", skip(url, display, shutdown), fields(url = %url), err)]
  pub async fn new(
    url: Url,
    connect_timeout: Duration,
    display: Display,
    shutdown: CancellationToken,
  ) -> Result<Self, ConnectError> {
    let conn = connect(&url, Some(connect_timeout)).await?;
    let (sender, recv) = mpsc::channel(32);
    tokio::spawn(ChannelActor::new(url, conn, recv, display, shutdown.clone()).run());

    Ok(Self { sender, shutdown })
  }

  async fn send(&self, msg: ActorMessage) -> Result<(), ChannelError> {
    self.sender.send(msg).await?;
    Ok(())
  }

  async fn emit(&self, emit: Emit) -> Result<(), ChannelError> {
    let (sender, receiver) = oneshot::channel();
    self.send(ActorMessage::Emit(emit, sender)).await?;
    Ok(receiver.await??)
  }

  async fn query<T>(&self, emit: Emit) -> Result<T, ChannelError>
  where
    oneshot::Sender<Result<T, ChannelError>>: Into<ReplyListener>,
  {
    let (sender, receiver) = oneshot::channel::<Result<T, ChannelError>>();
    self.send(ActorMessage::Query(emit, sender.into())).await?;
    match tokio::time::timeout(REPLY_TIMEOUT, receiver).await {
      Ok(reply) => reply?,
      Err(_) => bail!(NoReply),
    }
  }
}

impl Drop for ChannelHandler {
  fn drop(&mut self) {
    self.shutdown.cancel();
  }
}

#[async_trait]
impl Channel for ChannelHandler {
  async fn request_temperature(&self, seq: u64) -> Result<(), ChannelError> {
    self.sender.try_send(ActorMessage::RequestTemperature(seq))?;
    Ok(())
  }

  async fn set_limits(&self, limits: Limits) -> Result<(), ChannelError> {
    self.emit(Emit::from(limits)).await
  }

  async fn get_limits(&self) -> Result<Limits, ChannelError> {
    self.query(Emit::GetLimits).await
  }

  async fn get_state(&self) -> Result<State, ChannelError> {
    self.query(Emit::GetState).await
  }

  async fn enable(&self) -> Result<(), ChannelError> {
    self.emit(Emit::EnableThermabox).await
  }

  async fn disable(&self) -> Result<(), ChannelError> {
    self.emit(Emit::DisableThermabox).await
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
#[error("Failed to use thermabox channel.")]
pub enum ChannelError {
  Send(#[from] SendError),

  Closed(#[from] ConnectionClosed),

  NoReply(#[from] NoReply),

  Busy(#[from] Busy),
}

impl From<mpsc::error::SendError<ActorMessage>> for ChannelError {
  #[inline]
  fn from(_: mpsc::error::SendError<ActorMessage>) -> Self {
    ChannelError::Closed(ConnectionClosed)
  }
}

impl From<mpsc::error::TrySendError<ActorMessage>> for ChannelError {
  #[inline]
  fn from(error: mpsc::error::TrySendError<ActorMessage>) -> Self {
    match error {
      mpsc::error::TrySendError::Full(_) => ChannelError::Busy(Busy),
      mpsc::error::TrySendError::Closed(_) => ChannelError::Closed(ConnectionClosed),
    }
  }
}

impl From<oneshot::error::RecvError> for ChannelError {
  #[inline]
  fn from(_: oneshot::error::RecvError) -> Self {
    ChannelError::NoReply(NoReply)
  }
}

#[derive(Debug, Error)]
#[error("Channel actor did not reply.")]
pub struct NoReply;

#[derive(Debug, Error)]
#[error("Channel queue is full.")]
pub struct Busy;

#[cfg(test)]
mod tests {
  use super::*;
  use futures::{SinkExt, StreamExt};
  use serde_json::{json, Value};
  use thermabox_proto::Temperature;
  use tokio::net::TcpListener;
  use tokio_tungstenite::{accept_async, tungstenite::Message};

  /// Answers the n-th `get-temperature` with `70 + n`, except the first
  /// one, which it leaves unanswered like a failed sensor read.
  async fn serve_dropping_first_reply() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
      let (stream, _) = listener.accept().await.unwrap();
      let mut ws = accept_async(stream).await.unwrap();
      let mut count = 0;

      while let Some(Ok(Message::Text(text))) = ws.next().await {
        let frame: Value = serde_json::from_str(&text).unwrap();
        if frame["event"] != "get-temperature" {
          continue;
        }

        count += 1;
        if count == 1 {
          continue;
        }

        let reply = json!({ "event": "get-temperature", "data": { "temp": 70 + count } });
        if ws.send(Message::Text(reply.to_string())).await.is_err() {
          break;
        }
      }
    });

    format!("ws://{}/ws", addr).parse().unwrap()
  }

  async fn wait_for(display: &Display, expected: Reading) {
    let shown = tokio::time::timeout(Duration::from_secs(5), async {
      while display.current() != Some(expected) {
        tokio::time::sleep(Duration::from_millis(10)).await;
      }
    })
    .await;

    assert!(
      shown.is_ok(),
      "expected {:?}, display shows {:?}",
      expected,
      display.current()
    );
  }

  #[tokio::test]
  async fn lost_reply_does_not_age_later_readings() {
    let url = serve_dropping_first_reply().await;
    let display = Display::new();
    let channel = ChannelHandler::new(
      url,
      Duration::from_secs(2),
      display.clone(),
      CancellationToken::new(),
    )
    .await
    .unwrap();

    let first = display.next_seq();
    channel.request_temperature(first).await.unwrap();

    let second = display.next_seq();
    display.offer(Reading::new(Temperature::new(68.0), second, Source::Request));
    channel.request_temperature(second).await.unwrap();
    wait_for(
      &display,
      Reading::new(Temperature::new(72.0), second, Source::Channel),
    )
    .await;

    let third = display.next_seq();
    channel.request_temperature(third).await.unwrap();
    wait_for(
      &display,
      Reading::new(Temperature::new(73.0), third, Source::Channel),
    )
    .await;
  }
}
