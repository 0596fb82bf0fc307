use serde::{Deserialize, Serialize};
use std::{
  fmt,
  hash::{Hash, Hasher},
  str::FromStr,
};
use thiserror::Error;

/// A temperature as reported by the thermabox.
///
/// Compares bitwise so it can be used as an observable value. Renders
/// exactly like the underlying number (`72.0` shows as `72`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Temperature(f64);

impl Temperature {
  #[inline]
  pub const fn new(value: f64) -> Self {
    Self(value)
  }

  #[inline]
  pub const fn get(&self) -> f64 {
    self.0
  }
}

impl PartialEq for Temperature {
  #[inline]
  fn eq(&self, other: &Self) -> bool {
    self.0.to_bits() == other.0.to_bits()
  }
}

impl Eq for Temperature {}

impl Hash for Temperature {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.0.to_bits().hash(state)
  }
}

impl From<f64> for Temperature {
  #[inline]
  fn from(value: f64) -> Self {
    Self(value)
  }
}

impl fmt::Display for Temperature {
  #[inline]
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&self.0, f)
  }
}

impl FromStr for Temperature {
  type Err = ParseTemperatureError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let trimmed = s.trim();
    match trimmed.parse::<f64>() {
      Ok(v) => Ok(Self(v)),
      Err(_) => Err(ParseTemperatureError(trimmed.into())),
    }
  }
}

#[derive(Debug, Error)]
#[non_exhaustive]
#[error("Failed to parse temperature from {0:?}.")]
pub struct ParseTemperatureError(pub String);
