use crate::{Limits, SetLimitsReq, State, Temperature};
use derive_more::IsVariant;
use enum_kinds::EnumKind;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use smol_str::SmolStr;

pub const EVENT_GET_TEMPERATURE: &str = "get-temperature";
pub const EVENT_SET_LIMITS: &str = "set-limits";
pub const EVENT_GET_LIMITS: &str = "get-limits";
pub const EVENT_GET_STATE: &str = "get-state";
pub const EVENT_ENABLE: &str = "enable-thermabox";
pub const EVENT_DISABLE: &str = "disable-thermabox";

/// Messages the client emits on the real-time channel.
#[derive(Debug, Clone, PartialEq, IsVariant, EnumKind)]
#[enum_kind(EmitKind)]
pub enum Emit {
  GetTemperature,
  SetLimits(SetLimitsReq),
  GetLimits,
  GetState,
  EnableThermabox,
  DisableThermabox,
}

impl Emit {
  #[inline]
  pub fn kind(&self) -> EmitKind {
    EmitKind::from(self)
  }

  #[inline]
  pub fn event(&self) -> &'static str {
    self.kind().event()
  }
}

impl EmitKind {
  pub fn event(&self) -> &'static str {
    match self {
      Self::GetTemperature => EVENT_GET_TEMPERATURE,
      Self::SetLimits => EVENT_SET_LIMITS,
      Self::GetLimits => EVENT_GET_LIMITS,
      Self::GetState => EVENT_GET_STATE,
      Self::EnableThermabox => EVENT_ENABLE,
      Self::DisableThermabox => EVENT_DISABLE,
    }
  }
}

impl From<Limits> for Emit {
  #[inline]
  fn from(limits: Limits) -> Self {
    Emit::SetLimits(limits.into())
  }
}

/// Current temperature pushed by the server.
///
/// Accepts `{"temp": 72}`, a bare number or a numeric string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemperatureInd {
  pub temp: Temperature,
}

impl<'de> Deserialize<'de> for TemperatureInd {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
      Wrapped {
        #[serde(
          alias = "temperature",
          deserialize_with = "serde_aux::field_attributes::deserialize_number_from_string"
        )]
        temp: f64,
      },
      Bare(#[serde(deserialize_with = "serde_aux::field_attributes::deserialize_number_from_string")] f64),
    }

    let temp = match Repr::deserialize(deserializer)? {
      Repr::Wrapped { temp } => temp,
      Repr::Bare(temp) => temp,
    };

    Ok(Self {
      temp: Temperature::new(temp),
    })
  }
}

/// Acknowledgement payload, usually `"OK"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Ack(pub Value);

impl Ack {
  pub fn is_ok(&self) -> bool {
    matches!(&self.0, Value::String(s) if s == "OK")
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnknownInd {
  pub event: SmolStr,
  pub data: Value,
}

/// Messages the server sends on the real-time channel.
#[derive(Debug, Clone, PartialEq, IsVariant, EnumKind)]
#[enum_kind(NotificationKind)]
pub enum Notification {
  Temperature(TemperatureInd),

  Limits(Limits),

  SetLimits(Ack),

  State(State),

  EnableThermabox(Ack),

  DisableThermabox(Ack),

  Unknown(UnknownInd),
}

impl Notification {
  #[inline]
  pub fn kind(&self) -> NotificationKind {
    NotificationKind::from(self)
  }
}

macro_rules! try_into {
  ($variant:ident => $ty:ty) => {
    impl TryFrom<Notification> for $ty {
      type Error = Notification;

      #[inline]
      fn try_from(value: Notification) -> Result<Self, Self::Error> {
        match value {
          Notification::$variant(v) => Ok(v),
          _ => Err(value),
        }
      }
    }
  };
}

try_into!(Limits => Limits);
try_into!(State => State);
