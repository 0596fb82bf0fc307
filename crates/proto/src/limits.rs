use derive_more::Constructor;
use serde::{Deserialize, Serialize};

/// Target temperature and the allowed deviation around it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize, Constructor)]
pub struct Limits {
  #[serde(
    alias = "temp",
    deserialize_with = "serde_aux::field_attributes::deserialize_number_from_string"
  )]
  pub temperature: f64,

  #[serde(deserialize_with = "serde_aux::field_attributes::deserialize_number_from_string")]
  pub threshold: f64,
}

/// Payload of the `set-limits` emission on the real-time channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetLimitsReq {
  pub temp: f64,
  pub threshold: f64,
}

impl From<Limits> for SetLimitsReq {
  #[inline]
  fn from(limits: Limits) -> Self {
    Self {
      temp: limits.temperature,
      threshold: limits.threshold,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn limits_from_get_limits_body() {
    let limits: Limits = serde_json::from_str(r#"{"temperature":65,"threshold":3}"#).unwrap();
    assert_eq!(limits, Limits::new(65.0, 3.0));
  }

  #[test]
  fn limits_accept_short_name_and_strings() {
    let limits: Limits = serde_json::from_str(r#"{"temp":"42.2","threshold":0.4}"#).unwrap();
    assert_eq!(limits, Limits::new(42.2, 0.4));
  }

  #[test]
  fn set_limits_uses_short_temperature_name() {
    let req = SetLimitsReq::from(Limits::new(70.0, 2.0));
    let json = serde_json::to_value(req).unwrap();
    assert_eq!(json["temp"], 70.0);
    assert_eq!(json["threshold"], 2.0);
    assert!(json.get("temperature").is_none());
  }
}
