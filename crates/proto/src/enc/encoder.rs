use super::{FIELD_NAME_DATA, FIELD_NAME_EVENT};
use crate::Emit;
use serde::{ser::SerializeMap, Serialize};
use thiserror::Error;

/// Turns an [`Emit`] into the JSON text of one channel frame.
///
/// Emissions without a payload carry only the event name.
#[derive(Default)]
pub struct FrameEncoder;

impl FrameEncoder {
  #[inline]
  pub const fn new() -> Self {
    Self
  }

  pub fn encode(&mut self, item: &Emit, buf: &mut String) -> Result<(), FrameEncoderError> {
    let text = serde_json::to_string(&OutFrame(item))?;
    buf.push_str(&text);

    Ok(())
  }
}

struct OutFrame<'a>(&'a Emit);

impl<'a> Serialize for OutFrame<'a> {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    match self.0 {
      Emit::SetLimits(req) => {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(FIELD_NAME_EVENT, self.0.event())?;
        map.serialize_entry(FIELD_NAME_DATA, req)?;
        map.end()
      }
      other => {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(FIELD_NAME_EVENT, other.event())?;
        map.end()
      }
    }
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum FrameEncoderError {
  #[error("Failed to encode channel frame.")]
  JsonError(#[from] serde_json::Error),
}
