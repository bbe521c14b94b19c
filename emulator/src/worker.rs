use anyhow::{Context, Result};
use log::debug;
use midicore::{Interface, emulator::Target, port::Port};
use std::collections::VecDeque;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};

pub struct Worker {
    intf: Interface<Port>,
    target: Target,
    heartbeat: Duration,
}

impl Worker {
    pub fn new(intf: Interface<Port>, target: Target, heartbeat: Duration) -> Self {
        Self {
            intf,
            target,
            heartbeat,
        }
    }

    pub fn messages_sent(&self) -> usize {
        self.target.messages_sent()
    }

    /// Serves the host, sending the greeting after the startup delay if given.
    pub async fn run(&mut self, greeting: Option<Duration>) -> Result<()> {
        let mut pending: VecDeque<_> = match greeting {
            Some(_) => Target::greeting().into(),
            None => VecDeque::new(),
        };
        let next_greeting = time::sleep(greeting.unwrap_or_default());
        let mut interval = time::interval_at(Instant::now() + self.heartbeat, self.heartbeat);

        tokio::pin!(next_greeting);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Queries are answered while the greeting is sent, heartbeats follow it
        loop {
            tokio::select! {
                res = self.intf.receive() => {
                    let frame = res.context("Failed to receive frame")?;

                    if let Some(resp) = self.target.handle(&frame) {
                        self.intf
                            .send(&resp)
                            .await
                            .context("Failed to send response")?;
                    }
                }
                () = &mut next_greeting, if !pending.is_empty() => {
                    if let Some((text, pause)) = pending.pop_front() {
                        let frame = self.target.debug_message(&text);

                        self.intf
                            .send(&frame)
                            .await
                            .context("Failed to send greeting")?;
                        next_greeting.as_mut().reset(Instant::now() + pause);
                    }

                    if pending.is_empty() {
                        debug!("Greeting sent");
                        interval.reset();
                    }
                }
                _ = interval.tick(), if pending.is_empty() => {
                    let frame = self.target.heartbeat();

                    self.intf
                        .send(&frame)
                        .await
                        .context("Failed to send heartbeat")?;
                }
            }
        }
    }
}
