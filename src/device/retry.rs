use std::thread;
use std::time::Duration;

use log::warn;

use super::wire::{DeviceStatus, WifiStatus};
use super::{Command, Device, DeviceError};
use crate::pattern::Grid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retries: u32,
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(400),
        }
    }

    /// Delay before retry number `attempt` (1-based); doubles each time.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Opt-in decorator that retries transient failures with exponential
/// backoff.  Without it every request is at-most-once.
pub struct Retrying<D> {
    inner:  D,
    policy: RetryPolicy,
    sleep:  Box<dyn Fn(Duration) + Send>,
}

impl<D: Device> Retrying<D> {
    pub fn new(inner: D, policy: RetryPolicy) -> Self {
        Self { inner, policy, sleep: Box::new(thread::sleep) }
    }

    #[cfg(test)]
    fn with_sleep(inner: D, policy: RetryPolicy, sleep: impl Fn(Duration) + Send + 'static) -> Self {
        Self { inner, policy, sleep: Box::new(sleep) }
    }

    fn run<T>(&mut self, what: &str, mut call: impl FnMut(&mut D) -> Result<T, DeviceError>) -> Result<T, DeviceError> {
        let mut attempt = 0;
        loop {
            match call(&mut self.inner) {
                Err(e) if e.is_transient() && attempt < self.policy.retries => {
                    attempt += 1;
                    let delay = self.policy.delay(attempt);
                    warn!("{} failed ({}), retry {}/{} in {:?}", what, e, attempt, self.policy.retries, delay);
                    (self.sleep)(delay);
                }
                result => return result,
            }
        }
    }
}

impl<D: Device> Device for Retrying<D> {
    fn send(&mut self, command: &Command) -> Result<(), DeviceError> {
        let what = command.path();
        self.run(&what, |d| d.send(command))
    }

    fn fetch_status(&mut self) -> Result<DeviceStatus, DeviceError> {
        self.run("/status", |d| d.fetch_status())
    }

    fn fetch_pattern(&mut self, index: usize) -> Result<Grid, DeviceError> {
        self.run("/getpattern", |d| d.fetch_pattern(index))
    }

    fn fetch_wifi(&mut self) -> Result<WifiStatus, DeviceError> {
        self.run("/wifi", |d| d.fetch_wifi())
    }
}
