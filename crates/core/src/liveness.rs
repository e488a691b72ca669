//! Heartbeat bookkeeping for one client connection.
//!
//! Each period the monitor sends a ping and then calls [`Liveness::tick`]
//! once the period has elapsed. A period that ends without a pong counts as a
//! miss; `max_missed` consecutive misses make the connection dead.

use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_MISSED: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessConfig {
    pub period: Duration,
    pub max_missed: u32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_HEARTBEAT_PERIOD,
            max_missed: DEFAULT_MAX_MISSED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LivenessState {
    Alive,
    AwaitingPong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Healthy,
    /// The period ended without a pong; carries the consecutive miss count.
    Missed(u32),
    Dead,
}

#[derive(Debug)]
pub struct Liveness {
    config: LivenessConfig,
    state: LivenessState,
    missed: u32,
    last_ack: Option<Instant>,
}

impl Liveness {
    pub fn new(config: LivenessConfig) -> Self {
        Self {
            config,
            state: LivenessState::Alive,
            missed: 0,
            last_ack: None,
        }
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }

    /// When the client last answered, if ever.
    pub fn last_ack(&self) -> Option<Instant> {
        self.last_ack
    }

    pub fn ping_sent(&mut self) {
        self.state = LivenessState::AwaitingPong;
    }

    /// Any pong, even a late one, clears the miss counter.
    pub fn pong_received(&mut self, at: Instant) {
        self.state = LivenessState::Alive;
        self.missed = 0;
        self.last_ack = Some(at);
    }

    /// Closes the current period.
    pub fn tick(&mut self) -> Verdict {
        match self.state {
            LivenessState::Alive => Verdict::Healthy,
            LivenessState::AwaitingPong => {
                self.state = LivenessState::Alive;
                self.missed += 1;
                if self.missed >= self.config.max_missed {
                    Verdict::Dead
                } else {
                    Verdict::Missed(self.missed)
                }
            }
        }
    }
}
