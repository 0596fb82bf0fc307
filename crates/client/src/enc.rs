use thermabox_proto::{Emit, FrameDecoder, FrameEncoder, Notification};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message;

/// Maps channel frames onto WebSocket text messages.
#[derive(Default)]
pub(crate) struct FrameCodec {
  encoder: FrameEncoder,
  decoder: FrameDecoder,
}

impl FrameCodec {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  pub(crate) fn encode(&mut self, item: &Emit) -> Result<Message, FrameEncoderError> {
    let mut text = String::new();
    self.encoder.encode(item, &mut text)?;
    Ok(Message::Text(text))
  }

  pub(crate) fn decode(&mut self, text: &str) -> Result<Notification, FrameDecoderError> {
    self.decoder.decode(text).map_err(Into::into)
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum FrameEncoderError {
  #[error(transparent)]
  Wrapped(#[from] thermabox_proto::FrameEncoderError),
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum FrameDecoderError {
  #[error(transparent)]
  Wrapped(#[from] thermabox_proto::FrameDecoderError),
}
