use clap::Parser;
use color_eyre::eyre::{bail, eyre, Result, WrapErr};
use std::{str::FromStr, time::Duration};
use thermabox_client::{ClientConfig, Transports, Url};

/// Watch and adjust a thermabox from the terminal.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
  /// Base URL of the thermabox web server.
  #[arg(long, env = "THERMABOX_URL")]
  pub url: Url,

  /// Path of the real-time channel below the base URL.
  #[arg(long, default_value = "ws")]
  pub ws_path: String,

  /// Milliseconds between temperature polls.
  #[arg(long, env = "THERMABOX_POLL_MS", default_value_t = 300)]
  pub interval_ms: u64,

  /// Timeout for plain requests, in milliseconds.
  #[arg(long, default_value_t = 1000)]
  pub timeout_ms: u64,

  /// Transports to use: both, channel or request.
  #[arg(long, default_value_t = Transports::Both)]
  pub transport: Transports,

  /// Log at debug level unless RUST_LOG says otherwise.
  #[arg(short, long)]
  pub verbose: bool,
}

impl Args {
  pub fn config(&self) -> ClientConfig {
    ClientConfig::new(self.url.clone())
      .with_ws_path(self.ws_path.clone())
      .with_poll_interval(Duration::from_millis(self.interval_ms))
      .with_request_timeout(Duration::from_millis(self.timeout_ms))
      .with_transports(self.transport)
  }
}

/// A line typed on stdin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
  Set { temperature: f64, threshold: f64 },
  Temperature(f64),
  Threshold(f64),
  Sync,
  Limits,
  Reload,
  State,
  Enable,
  Disable,
  Help,
  Quit,
}

pub const HELP: &str = "\
commands:
  set <temp> <threshold>  edit both limit fields
  temp <temp>             edit the temperature field
  threshold <threshold>   edit the threshold field
  sync                    send the limit fields to the thermabox
  limits                  show the limit fields
  reload                  load the limit fields from the thermabox
  state                   show the controller state
  enable | disable        switch the thermabox on or off
  quit";

fn number(arg: Option<&str>, name: &str) -> Result<f64> {
  let arg = arg.ok_or_else(|| eyre!("missing {}", name))?;
  arg
    .parse()
    .wrap_err_with(|| format!("invalid {} '{}'", name, arg))
}

impl FromStr for Command {
  type Err = color_eyre::Report;

  fn from_str(line: &str) -> Result<Self> {
    let mut words = line.split_whitespace();
    let command = match words.next() {
      Some(word) => word.to_ascii_lowercase(),
      None => bail!("empty command"),
    };

    let command = match command.as_str() {
      "set" => Command::Set {
        temperature: number(words.next(), "temperature")?,
        threshold: number(words.next(), "threshold")?,
      },
      "temp" | "temperature" => Command::Temperature(number(words.next(), "temperature")?),
      "threshold" => Command::Threshold(number(words.next(), "threshold")?),
      "sync" => Command::Sync,
      "limits" => Command::Limits,
      "reload" => Command::Reload,
      "state" => Command::State,
      "enable" => Command::Enable,
      "disable" => Command::Disable,
      "help" | "?" => Command::Help,
      "quit" | "exit" => Command::Quit,
      other => bail!("unknown command '{}'", other),
    };

    if let Some(extra) = words.next() {
      bail!("unexpected argument '{}'", extra);
    }

    Ok(command)
  }
}
