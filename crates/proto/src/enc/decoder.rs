use super::FIELD_NAME_EVENT;
use crate::{
  evt::{
    EVENT_DISABLE, EVENT_ENABLE, EVENT_GET_LIMITS, EVENT_GET_STATE, EVENT_GET_TEMPERATURE,
    EVENT_SET_LIMITS,
  },
  Notification, UnknownInd,
};
use serde::Deserialize;
use serde_json::Value;
use smol_str::SmolStr;
use thiserror::Error;
use tracing::{event, Level};

#[derive(Deserialize)]
struct InFrame {
  event: SmolStr,

  #[serde(default)]
  data: Value,
}

/// Parses the JSON text of one channel frame into a [`Notification`].
#[derive(Default)]
pub struct FrameDecoder;

macro_rules! match_notification {
  ($event:ident, $data:ident => {
    $($name:ident => $variant:ident),*$(,)?
  }) => {
    match $event.as_str() {
      $(
        $name => Notification::$variant(serde_json::from_value($data)?),
      )*
      _ => reconstruct($event, $data),
    }
  };
}

impl FrameDecoder {
  #[inline]
  pub const fn new() -> Self {
    Self
  }

  pub fn decode(&mut self, text: &str) -> Result<Notification, FrameDecoderError> {
    event!(target: "thermabox-proto::enc::decoder", Level::TRACE, "parsing channel frame: {}", text);

    let InFrame { event, data } = serde_json::from_str(text)?;
    if event.is_empty() {
      return Err(FrameDecoderError::MissingEvent);
    }

    let notification = match_notification!(event, data => {
      EVENT_GET_TEMPERATURE => Temperature,
      EVENT_GET_LIMITS => Limits,
      EVENT_SET_LIMITS => SetLimits,
      EVENT_GET_STATE => State,
      EVENT_ENABLE => EnableThermabox,
      EVENT_DISABLE => DisableThermabox,
    });

    Ok(notification)
  }
}

fn reconstruct(event: SmolStr, data: Value) -> Notification {
  event!(target: "thermabox-proto::enc::decoder", Level::WARN, %event, %data, "received unknown channel event");
  Notification::Unknown(UnknownInd { event, data })
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum FrameDecoderError {
  #[error("Failed to decode channel frame.")]
  JsonError(#[from] serde_json::Error),

  #[error("Channel frame has an empty '{}' field.", FIELD_NAME_EVENT)]
  MissingEvent,
}
