use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::device::{Command, DeviceError};
use crate::pattern::{PatternBank, MAX_PATTERNS};
use crate::state::{DeviceState, Field, MAX_VOLUME};
use crate::sync::{reconcile, PatternVerdict, SyncLoop};
use crate::worker::{Dispatch, Job, Reply};

/// Receives state changes; implemented by the presentation layer.
pub trait StateObserver {
    fn state_changed(&mut self, state: &DeviceState, changed: &[Field]);

    fn pattern_loaded(&mut self, _index: usize) {}

    fn connectivity_changed(&mut self, _connected: bool) {}
}

/// Observer that ignores everything.
#[cfg(test)]
pub struct NoObserver;

#[cfg(test)]
impl StateObserver for NoObserver {
    fn state_changed(&mut self, _state: &DeviceState, _changed: &[Field]) {}
}

/// The panel's single owner of device state.
///
/// User intents mutate the local mirror optimistically and queue a command;
/// `pump` applies whatever the device has answered since the last frame and
/// issues the next status fetch when it is due.
pub struct Session<X: Dispatch> {
    state:     DeviceState,
    bank:      PatternBank,
    sync:      SyncLoop,
    dispatch:  X,
    connected: Option<bool>,
    /// A pattern fetch was dropped; retry on the next `pump`.
    reload_due: bool,
}

impl<X: Dispatch> Session<X> {
    pub fn new(dispatch: X, tracks: usize, interval: Duration) -> Self {
        Self {
            state: DeviceState::default(),
            bank: PatternBank::new(tracks),
            sync: SyncLoop::new(interval),
            dispatch,
            connected: None,
            reload_due: false,
        }
    }

    pub fn state(&self) -> &DeviceState { &self.state }

    pub fn bank(&self) -> &PatternBank { &self.bank }

    pub fn sync(&self) -> &SyncLoop { &self.sync }

    pub fn tracks(&self) -> usize { self.bank.tracks() }

    /// `None` until the first request resolves.
    pub fn connected(&self) -> Option<bool> { self.connected }

    #[cfg(test)]
    pub fn dispatch_mut(&mut self) -> &mut X { &mut self.dispatch }

    pub fn start(&mut self, now: Instant) {
        if self.sync.start(now) {
            info!("sync started ({:?} interval)", self.sync.interval());
        }
    }

    pub fn stop(&mut self) {
        if self.sync.stop() {
            info!("sync paused");
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.sync.next_deadline()
    }

    /// Apply all replies received so far, then fetch status if due.
    pub fn pump(&mut self, now: Instant, observer: &mut dyn StateObserver) {
        while let Some(reply) = self.dispatch.try_reply() {
            self.handle_reply(reply, observer);
        }
        if self.reload_due {
            self.reload_due = false;
            self.reload_pattern();
        }
        if let Some(generation) = self.sync.poll(now) {
            if !self.dispatch.submit(Job::Status { generation }) {
                self.sync.abandon();
            }
        }
    }

    fn handle_reply(&mut self, reply: Reply, observer: &mut dyn StateObserver) {
        match reply {
            Reply::Command { command, result } => {
                if let Err(e) = result {
                    warn!("{} lost: {}", command.path(), e);
                    self.set_connected(false, observer);
                }
            }
            Reply::Status { generation, result } => {
                if !self.sync.accept_status(generation) {
                    debug!("discarding stale status reply (generation {})", generation);
                    return;
                }
                match result {
                    Ok(status) => {
                        self.set_connected(true, observer);
                        let r = reconcile(&mut self.state, &status, self.bank.tracks());
                        if let Some(index) = r.pattern_switch {
                            info!("device switched to pattern {}", index + 1);
                            self.request_pattern(index);
                        }
                        if !r.changed.is_empty() {
                            let names: Vec<&str> = r.changed.iter().map(|f| f.name()).collect();
                            debug!("status changed {}", names.join(", "));
                            observer.state_changed(&self.state, &r.changed);
                        }
                    }
                    Err(e) => self.fail("status fetch", &e, observer),
                }
            }
            Reply::Pattern { seq, index, result } => {
                let grid = match result {
                    Ok(grid) => grid,
                    Err(e) => {
                        self.sync.accept_pattern(seq, self.state.pattern, self.bank.edit_epoch(index));
                        self.fail("pattern fetch", &e, observer);
                        return;
                    }
                };
                match self.sync.accept_pattern(seq, self.state.pattern, self.bank.edit_epoch(index)) {
                    PatternVerdict::Apply => {
                        if self.bank.replace_pattern(index, grid) {
                            observer.pattern_loaded(index);
                        }
                    }
                    verdict => debug!("discarding pattern {} data: {:?}", index + 1, verdict),
                }
            }
        }
    }

    fn fail(&mut self, what: &str, e: &DeviceError, observer: &mut dyn StateObserver) {
        warn!("{} failed: {}", what, e);
        self.set_connected(false, observer);
    }

    fn set_connected(&mut self, connected: bool, observer: &mut dyn StateObserver) {
        if self.connected != Some(connected) {
            self.connected = Some(connected);
            if connected { info!("device reachable") } else { warn!("device unreachable") }
            observer.connectivity_changed(connected);
        }
    }

    fn request_pattern(&mut self, index: usize) {
        let seq = self.sync.request_pattern(index, self.bank.edit_epoch(index));
        if !self.dispatch.submit(Job::Pattern { seq, index }) {
            self.sync.abandon_pattern(seq);
            self.reload_due = true;
        }
    }

    /// Fire-and-forget.  A dropped or failed command is only visible through
    /// the connectivity signal.
    pub fn send(&mut self, command: Command) {
        debug!("queue {}", command.path());
        self.dispatch.submit(Job::Command(command));
    }

    /// Re-read the active pattern from the device.
    pub fn reload_pattern(&mut self) {
        self.request_pattern(self.state.pattern);
    }

    // ── User intents ──────────────────────────────────────────────────────

    pub fn toggle_step(&mut self, track: usize, step: usize) -> Option<bool> {
        let pattern = self.state.pattern;
        match self.bank.toggle_step(pattern, track, step) {
            Ok(value) => {
                self.send(Command::Step { pattern, track, step, value });
                Some(value)
            }
            Err(e) => {
                warn!("toggle rejected: {}", e);
                None
            }
        }
    }

    pub fn select_pattern(&mut self, index: usize) {
        if index >= MAX_PATTERNS || index == self.state.pattern {
            return;
        }
        self.state.pattern = index;
        self.sync.invalidate();
        self.send(Command::Pattern(index));
        self.request_pattern(index);
    }

    pub fn select_track(&mut self, track: usize) {
        if track >= self.bank.tracks() {
            return;
        }
        self.state.track = track;
        self.sync.invalidate();
        self.send(Command::Track(track));
    }

    pub fn clear_track(&mut self, track: usize) {
        if self.bank.clear_track(self.state.pattern, track).is_ok() {
            self.send(Command::Clear { track });
        }
    }

    /// The device has no whole-pattern clear; one `/clear` per track.
    pub fn clear_pattern(&mut self) {
        if self.bank.clear_pattern(self.state.pattern).is_ok() {
            for track in 0..self.bank.tracks() {
                self.send(Command::Clear { track });
            }
        }
    }

    pub fn copy_pattern(&mut self, to: usize) {
        if to < MAX_PATTERNS && to != self.state.pattern {
            self.send(Command::Copy { from: self.state.pattern, to });
        }
    }

    /// Optimistic: the slider moves now, the next status confirms it.
    pub fn set_volume(&mut self, volume: i16) {
        let volume = volume.clamp(0, MAX_VOLUME as i16) as u8;
        self.state.volume = volume;
        self.sync.invalidate();
        self.send(Command::Volume(volume));
    }

    /// Relative change; the device clamps and the next status reports it.
    pub fn nudge_tempo(&mut self, delta: i16) {
        self.send(Command::TempoDelta(delta));
    }

    pub fn set_kit(&mut self, kit: usize) {
        self.state.kit = kit;
        self.state.kit_name = None;
        self.sync.invalidate();
        self.send(Command::Kit(kit));
    }

    pub fn set_theme(&mut self, theme: usize) {
        if theme != self.state.theme {
            self.state.theme = theme;
            self.sync.invalidate();
            self.send(Command::Theme(theme));
        }
    }

    pub fn toggle_play(&mut self) {
        let command = if self.state.playing { Command::Stop } else { Command::Play };
        self.send(command);
    }
}
