use crate::{
  chan::Channel,
  req::Requests,
  view::{Display, Reading, Source},
};
use std::{sync::Arc, time::Duration};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{event, Level};

/// Background task asking for the current temperature every `period`.
///
/// Stops when its token is cancelled or the poller is dropped; plain
/// requests still in flight are cancelled with it.
pub(crate) struct Poller {
  token: CancellationToken,
}

impl Poller {
  pub(crate) fn spawn<C, R>(
    period: Duration,
    channel: Option<Arc<C>>,
    requests: Option<Arc<R>>,
    display: Display,
    token: CancellationToken,
  ) -> Self
  where
    C: Channel,
    R: Requests,
  {
    let actor = PollActor {
      period,
      channel,
      requests,
      display,
      token: token.clone(),
    };

    event!(target: "thermabox-client::poll", Level::DEBUG, period.ms = period.as_millis() as u64, "starting poller");
    tokio::spawn(actor.run());

    Self { token }
  }
}

impl Drop for Poller {
  fn drop(&mut self) {
    self.token.cancel();
  }
}

struct PollActor<C, R> {
  period: Duration,
  channel: Option<Arc<C>>,
  requests: Option<Arc<R>>,
  display: Display,
  token: CancellationToken,
}

impl<C: Channel, R: Requests> PollActor<C, R> {
  async fn run(self) {
    let mut ticker = interval_at(Instant::now() + self.period, self.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
      tokio::select! {
        biased;
        _ = self.token.cancelled() => break,
        _ = ticker.tick() => self.tick().await,
      }
    }

    event!(target: "thermabox-client::poll", Level::DEBUG, "poller stopped");
  }

  async fn tick(&self) {
    let seq = self.display.next_seq();
    event!(target: "thermabox-client::poll", Level::TRACE, seq, "poll tick");

    if let Some(requests) = &self.requests {
      let requests = requests.clone();
      let display = self.display.clone();
      let token = self.token.child_token();
      tokio::spawn(async move {
        tokio::select! {
          _ = token.cancelled() => (),
          result = requests.get_temperature() => match result {
            Ok(temperature) => {
              display.offer(Reading::new(temperature, seq, Source::Request));
            }
            Err(error) => {
              event!(target: "thermabox-client::poll", Level::WARN, seq, ?error, "temperature request failed");
            }
          },
        }
      });
    }

    // After the spawn, so a backed-up channel cannot hold the plain request.
    if let Some(channel) = &self.channel {
      tokio::select! {
        _ = self.token.cancelled() => (),
        result = channel.request_temperature(seq) => {
          if let Err(error) = result {
            event!(target: "thermabox-client::poll", Level::WARN, seq, ?error, "channel temperature request failed");
          }
        }
      }
    }
  }
}
