use crate::enc::{FrameCodec, FrameDecoderError, FrameEncoderError};
use futures::{
  stream::{SplitSink, SplitStream},
  SinkExt, StreamExt,
};
use thermabox_proto::{Emit, Notification};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{
  connect_async,
  tungstenite::{self, Message},
  MaybeTlsStream, WebSocketStream,
};
use tracing::{event, instrument, Level};
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub(crate) struct Connection {
  reader: SplitStream<Socket>,
  writer: SplitSink<Socket, Message>,
  codec: FrameCodec,
}

impl Connection {
  pub(crate) async fn new(url: &Url) -> Result<Self, ConnectError> {
    let (stream, _response) = connect_async(url.as_str()).await?;
    let (writer, reader) = stream.split();

    Ok(Self {
      reader,
      writer,
      codec: FrameCodec::new(),
    })
  }

  #[instrument(level = "debug", target = "thermabox-client::con", skip(self, message), fields(event = message.event()), err(level = "warn"))]
  pub(crate) async fn send(&mut self, message: &Emit) -> Result<(), SendError> {
    let frame = self.codec.encode(message)?;
    Ok(self.writer.send(frame).await?)
  }

  pub(crate) async fn recv(&mut self) -> Result<Notification, RecvError> {
    loop {
      let message = match self.reader.next().await {
        Some(result) => result?,
        None => bail!(ConnectionClosed),
      };

      match message {
        Message::Text(text) => return Ok(self.codec.decode(&text)?),
        Message::Close(frame) => {
          event!(target: "thermabox-client::con", Level::INFO, ?frame, "server closed channel");
          bail!(ConnectionClosed)
        }
        // Ping/pong are answered by tungstenite.
        _ => continue,
      }
    }
  }

  pub(crate) async fn close(mut self) {
    let _ = self.writer.close().await;
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
#[error("Failed to connect to thermabox channel.")]
pub enum ConnectError {
  FailedToConnect(#[from] tungstenite::Error),
}

#[non_exhaustive]
#[derive(Debug, Error)]
#[error("Failed to send message.")]
pub enum SendError {
  FailedToEncode(#[from] FrameEncoderError),

  FailedToSend(#[from] tungstenite::Error),

  Closed(#[from] ConnectionClosed),
}

#[non_exhaustive]
#[derive(Debug, Error)]
#[error("Failed to receive notification.")]
pub enum RecvError {
  DecoderError(#[from] FrameDecoderError),

  Socket(#[from] tungstenite::Error),

  Closed(#[from] ConnectionClosed),
}

#[derive(Debug, Error)]
#[error("Connection closed.")]
pub struct ConnectionClosed;
