//! Everything that talks to the drum machine over HTTP.
//!
//! The rest of the crate only sees the `Device` trait, so transports and
//! decorators (see `retry`) can be swapped without touching call sites.

mod command;
mod http;
mod retry;
mod wire;

use std::fmt;

pub use command::Command;
pub use http::HttpDevice;
pub use retry::{RetryPolicy, Retrying};
pub use wire::{DeviceStatus, WifiStatus};

use crate::pattern::Grid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Network, DNS or timeout failure; the request may never have arrived.
    Transport(String),
    /// The device answered with a non-2xx status.
    HttpStatus { endpoint: String, status: u16 },
    /// The body was not valid JSON or did not have the expected shape.
    MalformedResponse { endpoint: String, reason: String },
}

impl DeviceError {
    /// Worth trying again: the failure may be gone on the next attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::HttpStatus { status, .. } => *status >= 500,
            Self::MalformedResponse { .. } => false,
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
            Self::HttpStatus { endpoint, status } => {
                write!(f, "{} answered HTTP {}", endpoint, status)
            }
            Self::MalformedResponse { endpoint, reason } => {
                write!(f, "malformed response from {}: {}", endpoint, reason)
            }
        }
    }
}

impl std::error::Error for DeviceError {}

pub trait Device: Send {
    /// Fire a command; only the HTTP status is checked.
    fn send(&mut self, command: &Command) -> Result<(), DeviceError>;

    fn fetch_status(&mut self) -> Result<DeviceStatus, DeviceError>;

    /// Grid of the device's currently selected pattern.  `index` is the
    /// pattern the caller expects that to be; it is not sent on the wire.
    fn fetch_pattern(&mut self, index: usize) -> Result<Grid, DeviceError>;

    fn fetch_wifi(&mut self) -> Result<WifiStatus, DeviceError>;
}

impl<D: Device + ?Sized> Device for Box<D> {
    fn send(&mut self, command: &Command) -> Result<(), DeviceError> {
        (**self).send(command)
    }

    fn fetch_status(&mut self) -> Result<DeviceStatus, DeviceError> {
        (**self).fetch_status()
    }

    fn fetch_pattern(&mut self, index: usize) -> Result<Grid, DeviceError> {
        (**self).fetch_pattern(index)
    }

    fn fetch_wifi(&mut self) -> Result<WifiStatus, DeviceError> {
        (**self).fetch_wifi()
    }
}

#[cfg(test)]
pub mod fake {
    //! In-memory device used by the session and worker tests.

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Default)]
    pub struct FakeLog {
        pub commands:       Vec<Command>,
        pub status_calls:   usize,
        pub pattern_calls:  Vec<usize>,
        pub statuses:       VecDeque<Result<DeviceStatus, DeviceError>>,
        pub grids:          VecDeque<Result<Grid, DeviceError>>,
        pub fail_commands:  bool,
    }

    /// Replies are scripted through the shared log; an empty queue answers
    /// with an empty status / empty grid.
    #[derive(Clone, Default)]
    pub struct FakeDevice {
        pub log: Arc<Mutex<FakeLog>>,
        pub tracks: usize,
    }

    impl FakeDevice {
        pub fn new(tracks: usize) -> Self {
            Self { log: Arc::default(), tracks }
        }

        pub fn push_status(&self, status: Result<DeviceStatus, DeviceError>) {
            self.log.lock().unwrap().statuses.push_back(status);
        }

        pub fn push_grid(&self, grid: Result<Grid, DeviceError>) {
            self.log.lock().unwrap().grids.push_back(grid);
        }
    }

    impl Device for FakeDevice {
        fn send(&mut self, command: &Command) -> Result<(), DeviceError> {
            let mut log = self.log.lock().unwrap();
            log.commands.push(command.clone());
            if log.fail_commands {
                Err(DeviceError::Transport("connection refused".into()))
            } else {
                Ok(())
            }
        }

        fn fetch_status(&mut self) -> Result<DeviceStatus, DeviceError> {
            let mut log = self.log.lock().unwrap();
            log.status_calls += 1;
            log.statuses.pop_front().unwrap_or_else(|| Ok(DeviceStatus::default()))
        }

        fn fetch_pattern(&mut self, index: usize) -> Result<Grid, DeviceError> {
            let mut log = self.log.lock().unwrap();
            log.pattern_calls.push(index);
            let tracks = self.tracks;
            log.grids
                .pop_front()
                .unwrap_or_else(|| Ok(vec![vec![false; crate::pattern::MAX_STEPS]; tracks]))
        }

        fn fetch_wifi(&mut self) -> Result<WifiStatus, DeviceError> {
            Ok(WifiStatus { enabled: true, clients: Some(1) })
        }
    }
}
