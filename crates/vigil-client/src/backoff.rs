//! Redial pacing for the gateway connection.

use std::time::Duration;

use rand::Rng;

/// How [`GatewayClient::run`](crate::GatewayClient::run) spaces out redials.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction of each delay that may be shaved off at random, so a fleet of
    /// clients dropped by one server restart does not redial in lockstep.
    /// `0.0` disables it.
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

/// Failure counter behind the redial delay. Reset once a socket is up.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    failures: u32,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, failures: 0 }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Un-jittered delay for the current failure count, capped at `max_delay`.
    pub fn ceiling(&self) -> Duration {
        let exponent = self.failures.min(32) as i32;
        let secs = self.config.initial_delay.as_secs_f64() * self.config.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.config.max_delay.as_secs_f64()))
    }

    /// Record a failure and return how long to wait before the next dial.
    pub fn next_delay(&mut self) -> Duration {
        let ceiling = self.ceiling();
        self.failures = self.failures.saturating_add(1);

        let jitter = self.config.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return ceiling;
        }
        let shave = rand::rng().random_range(0.0..=jitter);
        ceiling.mul_f64(1.0 - shave)
    }
}
