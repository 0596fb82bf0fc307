mod cli;

use clap::Parser;
use cli::{Args, Command, HELP};
use color_eyre::eyre::{Result, WrapErr};
use futures::{pin_mut, Stream, StreamExt};
use thermabox_client::{Display, ThermaboxClient};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{event, Level};
use tracing_subscriber::EnvFilter;

fn install_tracing(verbose: bool) {
  let default = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();
}

fn stdin_lines() -> impl Stream<Item = std::io::Result<String>> {
  async_stream::try_stream! {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
      yield line;
    }
  }
}

async fn render(display: Display) {
  let mut readings = display.subscribe();
  while let Ok(reading) = readings.next().await {
    println!("temperature: {} ({})", reading.temperature, reading.source);
  }
}

/// Runs one stdin command. Returns `false` once the user quits.
async fn run_command(client: &ThermaboxClient, command: Command) -> Result<bool> {
  match command {
    Command::Set {
      temperature,
      threshold,
    } => {
      client.form().set_temperature(temperature);
      client.form().set_threshold(threshold);
    }
    Command::Temperature(temperature) => client.form().set_temperature(temperature),
    Command::Threshold(threshold) => client.form().set_threshold(threshold),
    Command::Sync => {
      client.sync().await.wrap_err("sync failed")?;
      println!("limits sent");
    }
    Command::Limits => {
      let limits = client.form().get();
      println!(
        "temperature: {}, threshold: {}",
        limits.temperature, limits.threshold
      );
    }
    Command::Reload => {
      let limits = client.load_limits().await.wrap_err("reload failed")?;
      println!(
        "temperature: {}, threshold: {}",
        limits.temperature, limits.threshold
      );
    }
    Command::State => {
      let state = client.state().await.wrap_err("state query failed")?;
      println!("state: {}", state);
    }
    Command::Enable => client.enable().await.wrap_err("enable failed")?,
    Command::Disable => client.disable().await.wrap_err("disable failed")?,
    Command::Help => println!("{}", HELP),
    Command::Quit => return Ok(false),
  }

  Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  let args = Args::parse();
  install_tracing(args.verbose);

  let client = ThermaboxClient::connect(args.config())
    .await
    .wrap_err_with(|| format!("could not connect to {}", args.url))?;

  let limits = client.form().get();
  println!(
    "limits: temperature {}, threshold {}",
    limits.temperature, limits.threshold
  );

  let renderer = tokio::spawn(render(client.display().clone()));

  let lines = stdin_lines();
  pin_mut!(lines);

  while let Some(line) = lines.next().await {
    let line = line.wrap_err("failed to read stdin")?;
    if line.trim().is_empty() {
      continue;
    }

    let command = match line.parse::<Command>() {
      Ok(command) => command,
      Err(error) => {
        eprintln!("{}", error);
        continue;
      }
    };

    match run_command(&client, command).await {
      Ok(true) => (),
      Ok(false) => break,
      Err(error) => event!(target: "thermabox-rs", Level::ERROR, ?error, "command failed"),
    }
  }

  client.shutdown();
  renderer.abort();
  Ok(())
}
