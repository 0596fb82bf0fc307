use eventuals::{Eventual, EventualReader, EventualWriter};
use std::{
  fmt,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use thermabox_proto::{Limits, Temperature};
use tokio::sync::watch;
use tracing::{event, Level};

/// Transport a reading arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
  Channel,
  Request,
}

impl fmt::Display for Source {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Source::Channel => "channel",
      Source::Request => "request",
    })
  }
}

/// A temperature reading, stamped with the poll tick it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reading {
  pub temperature: Temperature,
  pub seq: u64,
  pub source: Source,
}

impl Reading {
  #[inline]
  pub fn new(temperature: Temperature, seq: u64, source: Source) -> Self {
    Self {
      temperature,
      seq,
      source,
    }
  }
}

struct DisplayState {
  writer: EventualWriter<Reading>,
  current: Option<Reading>,
  issued: u64,
}

/// The current temperature as shown to the user.
///
/// Both transports write here. A reading answering an older poll tick
/// than the one already shown is dropped; readings for the same tick
/// replace each other.
#[derive(Clone)]
pub struct Display {
  value: Eventual<Reading>,
  state: Arc<Mutex<DisplayState>>,
}

impl Display {
  pub fn new() -> Self {
    let (writer, value) = Eventual::new();
    let state = DisplayState {
      writer,
      current: None,
      issued: 0,
    };

    Self {
      value,
      state: Arc::new(Mutex::new(state)),
    }
  }

  fn lock(&self) -> MutexGuard<'_, DisplayState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn current(&self) -> Option<Reading> {
    self.lock().current
  }

  /// Rendered temperature, empty until the first reading arrives.
  pub fn text(&self) -> String {
    self
      .current()
      .map(|r| r.temperature.to_string())
      .unwrap_or_default()
  }

  pub fn subscribe(&self) -> EventualReader<Reading> {
    self.value.subscribe()
  }

  /// Allocates the sequence number for a new poll tick.
  pub(crate) fn next_seq(&self) -> u64 {
    let mut state = self.lock();
    state.issued += 1;
    state.issued
  }

  /// Newest sequence number handed out so far.
  pub(crate) fn latest_seq(&self) -> u64 {
    self.lock().issued
  }

  /// Shows `reading` unless it is older than the one on display.
  pub(crate) fn offer(&self, reading: Reading) -> bool {
    let mut state = self.lock();
    if let Some(current) = state.current {
      if reading.seq < current.seq {
        event!(target: "thermabox-client::view", Level::DEBUG, reading.seq, current.seq, %reading.source, "discarding stale reading");
        return false;
      }
    }

    event!(target: "thermabox-client::view", Level::TRACE, %reading.temperature, reading.seq, %reading.source, "showing reading");
    state.current = Some(reading);
    state.writer.write(reading);
    true
  }
}

impl Default for Display {
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

/// The two editable limit fields.
#[derive(Clone)]
pub struct LimitsForm {
  fields: Arc<watch::Sender<Limits>>,
}

impl LimitsForm {
  pub fn new(initial: Limits) -> Self {
    let (fields, _) = watch::channel(initial);
    Self {
      fields: Arc::new(fields),
    }
  }

  pub fn get(&self) -> Limits {
    *self.fields.borrow()
  }

  pub fn set(&self, limits: Limits) {
    self.fields.send_replace(limits);
  }

  pub fn set_temperature(&self, temperature: f64) {
    self.fields.send_modify(|l| l.temperature = temperature);
  }

  pub fn set_threshold(&self, threshold: f64) {
    self.fields.send_modify(|l| l.threshold = threshold);
  }

  pub fn subscribe(&self) -> watch::Receiver<Limits> {
    self.fields.subscribe()
  }
}

impl Default for LimitsForm {
  #[inline]
  fn default() -> Self {
    Self::new(Limits::default())
  }
}
