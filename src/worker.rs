use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{debug, info, warn};

use crate::device::{Command, Device, DeviceError, DeviceStatus};
use crate::pattern::Grid;

/// Work for the device thread.  Jobs run strictly in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Command(Command),
    Status { generation: u64 },
    Pattern { seq: u64, index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Command { command: Command, result: Result<(), DeviceError> },
    Status  { generation: u64, result: Result<DeviceStatus, DeviceError> },
    Pattern { seq: u64, index: usize, result: Result<Grid, DeviceError> },
}

pub fn execute<D: Device + ?Sized>(device: &mut D, job: Job) -> Reply {
    match job {
        Job::Command(command) => {
            let result = device.send(&command);
            Reply::Command { command, result }
        }
        Job::Status { generation } => Reply::Status { generation, result: device.fetch_status() },
        Job::Pattern { seq, index } => Reply::Pattern { seq, index, result: device.fetch_pattern(index) },
    }
}

/// Where the session hands jobs to and collects replies from.
pub trait Dispatch {
    /// Queue a job.  Returns `false` when the job was dropped.
    fn submit(&mut self, job: Job) -> bool;

    fn try_reply(&mut self) -> Option<Reply>;
}

/// A background thread that owns the device and runs blocking requests.
pub struct Worker {
    jobs:    Option<Sender<Job>>,
    replies: Receiver<Reply>,
    handle:  Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn<D: Device + 'static>(mut device: D, capacity: usize) -> Self {
        let (job_tx, job_rx) = crossbeam_channel::bounded::<Job>(capacity);
        let (reply_tx, reply_rx) = crossbeam_channel::unbounded::<Reply>();

        let handle = thread::spawn(move || {
            for job in job_rx.iter() {
                debug!("running {:?}", job);
                let reply = execute(&mut device, job);
                if reply_tx.send(reply).is_err() {
                    break;
                }
            }
            info!("device worker exiting");
        });

        Self { jobs: Some(job_tx), replies: reply_rx, handle: Some(handle) }
    }

    #[cfg(test)]
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<Reply> {
        self.replies.recv_timeout(timeout).ok()
    }
}

impl Dispatch for Worker {
    fn submit(&mut self, job: Job) -> bool {
        let Some(tx) = &self.jobs else { return false };
        match tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                warn!("device queue full, dropping {:?}", job);
                false
            }
            Err(TrySendError::Disconnected(job)) => {
                warn!("device worker gone, dropping {:?}", job);
                false
            }
        }
    }

    fn try_reply(&mut self) -> Option<Reply> {
        self.replies.try_recv().ok()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // closing the job channel ends the thread's loop
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Runs jobs on the calling thread.  Replies are queued until collected, or
/// held back until `release` when `hold` is set, so tests can decide exactly
/// when a response "arrives".  With `reject` set every job is refused, as a
/// full queue would.
#[cfg(test)]
pub struct InlineDispatch<D> {
    pub device:  D,
    pub hold:    bool,
    pub reject:  bool,
    pub submitted: Vec<Job>,
    held:    std::collections::VecDeque<Reply>,
    ready:   std::collections::VecDeque<Reply>,
}

#[cfg(test)]
impl<D: Device> InlineDispatch<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            hold: false,
            reject: false,
            submitted: Vec::new(),
            held: Default::default(),
            ready: Default::default(),
        }
    }

    pub fn release(&mut self) {
        self.ready.extend(self.held.drain(..));
    }
}

#[cfg(test)]
impl<D: Device> Dispatch for InlineDispatch<D> {
    fn submit(&mut self, job: Job) -> bool {
        if self.reject {
            return false;
        }
        self.submitted.push(job.clone());
        let reply = execute(&mut self.device, job);
        if self.hold { self.held.push_back(reply) } else { self.ready.push_back(reply) }
        true
    }

    fn try_reply(&mut self) -> Option<Reply> {
        self.ready.pop_front()
    }
}
