use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{convert::Infallible, fmt, str::FromStr};

/// What the thermabox controller is currently doing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum State {
  HeatingUp,
  CoolingDown,
  Stable,
  Unknown,

  /// A state this client does not know about.
  Other(SmolStr),
}

impl State {
  pub fn as_str(&self) -> &str {
    match self {
      Self::HeatingUp => "heating_up",
      Self::CoolingDown => "cooling_down",
      Self::Stable => "stable",
      Self::Unknown => "unknown",
      Self::Other(v) => v.as_str(),
    }
  }
}

impl fmt::Display for State {
  #[inline]
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for State {
  type Err = Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s.trim() {
      "heating_up" => Self::HeatingUp,
      "cooling_down" => Self::CoolingDown,
      "stable" => Self::Stable,
      "unknown" => Self::Unknown,
      other => Self::Other(other.into()),
    })
  }
}

impl Serialize for State {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    self.as_str().serialize(serializer)
  }
}

struct StateVisitor;

impl<'de> serde::de::Visitor<'de> for StateVisitor {
  type Value = State;

  fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
    formatter.write_str("thermabox state")
  }

  fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
  where
    E: serde::de::Error,
  {
    match State::from_str(v) {
      Ok(state) => Ok(state),
      Err(never) => match never {},
    }
  }
}

impl<'de> Deserialize<'de> for State {
  #[inline]
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    deserializer.deserialize_str(StateVisitor)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_test::{assert_tokens, Token};

  #[test]
  fn state_heating_up_serde() {
    assert_tokens(&State::HeatingUp, &[Token::Str("heating_up")])
  }

  #[test]
  fn state_other_serde() {
    assert_tokens(&State::Other("defrosting".into()), &[Token::Str("defrosting")])
  }

  #[test]
  fn state_from_response_body() {
    assert_eq!("stable\n".parse::<State>().unwrap(), State::Stable);
  }
}
