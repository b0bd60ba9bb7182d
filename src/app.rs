use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::device::Command;
use crate::pattern::{MAX_PATTERNS, MAX_STEPS};
use crate::session::{Session, StateObserver};
use crate::state::{track_name, DeviceState, Field, KIT_NAMES, TEMPO_STEP, THEME_NAMES};
use crate::worker::Dispatch;

const PAD_FLASH: Duration = Duration::from_millis(150);

/// Number of live-trigger pads bound to the number row.
pub const PADS: usize = 8;

// ── Observer side ─────────────────────────────────────────────────────────────

/// What the panel shows besides the mirrored state itself.
#[derive(Debug, Default)]
pub struct PanelView {
    pub status_msg: String,
}

impl StateObserver for PanelView {
    fn state_changed(&mut self, state: &DeviceState, changed: &[Field]) {
        for field in changed {
            match field {
                Field::Pattern => self.status_msg = format!("Device on pattern {}", state.pattern + 1),
                Field::Playing => {
                    self.status_msg = if state.playing { "Playing".to_string() }
                                      else             { "Stopped".to_string() };
                }
                Field::Tempo => self.status_msg = format!("BPM: {}", state.tempo),
                Field::Kit | Field::KitName => self.status_msg = format!("Kit: {}", state.kit_label()),
                Field::Theme => self.status_msg = format!("Theme: {}", state.theme_label()),
                _ => {}
            }
        }
    }

    fn pattern_loaded(&mut self, index: usize) {
        self.status_msg = format!("Pattern {} loaded", index + 1);
    }

    fn connectivity_changed(&mut self, connected: bool) {
        self.status_msg = if connected { "Connected".to_string() }
                          else         { "Device unreachable".to_string() };
    }
}

// ── Pad modes ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PadModes {
    pub looping: bool,
    pub hold:    bool,
    pub record:  bool,
}

// ── App state ─────────────────────────────────────────────────────────────────

pub struct App<X: Dispatch> {
    pub session:     Session<X>,
    pub view:        PanelView,
    pub cursor_track: usize,
    pub cursor_step:  usize,
    pub pads:        PadModes,
    pub muted:       HashSet<usize>,
    pad_hits:        HashMap<usize, Instant>,
    /// Sync paused with `p`, independent of terminal focus.
    pub held:        bool,
    focused:         bool,
    /// Target slot being typed after `y`; keys go here while it is open.
    pub copy_target: Option<String>,
    pub should_quit: bool,
}

impl<X: Dispatch> App<X> {
    pub fn new(mut session: Session<X>, now: Instant) -> Self {
        session.reload_pattern();
        session.start(now);
        Self {
            session,
            view:         PanelView { status_msg: "Connecting...".to_string() },
            cursor_track: 0,
            cursor_step:  0,
            pads:         PadModes::default(),
            muted:        HashSet::new(),
            pad_hits:     HashMap::new(),
            held:         false,
            focused:      true,
            copy_target:  None,
            should_quit:  false,
        }
    }

    pub fn state(&self) -> &DeviceState { self.session.state() }

    /// Called once per frame.
    pub fn tick(&mut self, now: Instant) {
        self.session.pump(now, &mut self.view);
        self.pad_hits.retain(|_, hit| now.duration_since(*hit) < PAD_FLASH);
    }

    pub fn pad_lit(&self, pad: usize) -> bool {
        self.pad_hits.contains_key(&pad)
    }

    // ── Sync lifecycle ────────────────────────────────────────────────────

    pub fn focus_lost(&mut self) {
        self.focused = false;
        self.session.stop();
    }

    pub fn focus_gained(&mut self, now: Instant) {
        self.focused = true;
        if !self.held {
            self.session.start(now);
        }
    }

    pub fn toggle_hold(&mut self, now: Instant) {
        self.held = !self.held;
        if self.held {
            self.session.stop();
            self.view.status_msg = "Sync paused".to_string();
        } else {
            if self.focused {
                self.session.start(now);
            }
            self.view.status_msg = "Sync resumed".to_string();
        }
    }

    pub fn quit(&mut self) {
        self.session.stop();
        self.should_quit = true;
    }

    // ── Grid cursor ───────────────────────────────────────────────────────

    pub fn cursor_up(&mut self) {
        let n = self.session.tracks();
        self.cursor_track = if self.cursor_track == 0 { n - 1 } else { self.cursor_track - 1 };
        self.select_cursor_track();
    }

    pub fn cursor_down(&mut self) {
        self.cursor_track = (self.cursor_track + 1) % self.session.tracks();
        self.select_cursor_track();
    }

    pub fn cursor_left(&mut self) {
        self.cursor_step = if self.cursor_step == 0 { MAX_STEPS - 1 } else { self.cursor_step - 1 };
    }

    pub fn cursor_right(&mut self) {
        self.cursor_step = (self.cursor_step + 1) % MAX_STEPS;
    }

    pub fn toggle_step(&mut self) {
        let (track, step) = (self.cursor_track, self.cursor_step);
        if let Some(on) = self.session.toggle_step(track, step) {
            self.view.status_msg = format!("{} step {} {}", track_name(track), step + 1, if on { "on" } else { "off" });
        }
    }

    // ── Transport & mixer ─────────────────────────────────────────────────

    pub fn toggle_play(&mut self) {
        self.session.toggle_play();
    }

    pub fn tempo_up(&mut self) { self.nudge_tempo(TEMPO_STEP) }

    pub fn tempo_down(&mut self) { self.nudge_tempo(-TEMPO_STEP) }

    fn nudge_tempo(&mut self, delta: i16) {
        self.session.nudge_tempo(delta);
        self.view.status_msg = format!("Tempo {:+}", delta);
    }

    pub fn volume_up(&mut self) { self.nudge_volume(1) }

    pub fn volume_down(&mut self) { self.nudge_volume(-1) }

    fn nudge_volume(&mut self, delta: i16) {
        let volume = self.state().volume as i16 + delta;
        self.session.set_volume(volume);
        self.view.status_msg = format!("Volume: {}", self.state().volume);
    }

    // ── Patterns, kits, themes ────────────────────────────────────────────

    pub fn pattern_next(&mut self) {
        let next = (self.state().pattern + 1) % MAX_PATTERNS;
        self.select_pattern(next);
    }

    pub fn pattern_prev(&mut self) {
        let current = self.state().pattern;
        self.select_pattern(if current == 0 { MAX_PATTERNS - 1 } else { current - 1 });
    }

    fn select_pattern(&mut self, index: usize) {
        self.session.select_pattern(index);
        self.view.status_msg = format!("Pattern {}", index + 1);
    }

    pub fn kit_next(&mut self) {
        let kit = (self.state().kit + 1) % KIT_NAMES.len();
        self.session.set_kit(kit);
        self.view.status_msg = format!("Kit: {}", KIT_NAMES[kit]);
    }

    pub fn theme_next(&mut self) {
        let theme = (self.state().theme + 1) % THEME_NAMES.len();
        self.session.set_theme(theme);
        self.view.status_msg = format!("Theme: {}", THEME_NAMES[theme]);
    }

    // ── Track actions ─────────────────────────────────────────────────────

    /// The device's selected track follows the cursor row.
    fn select_cursor_track(&mut self) {
        self.session.select_track(self.cursor_track);
    }

    pub fn clear_track(&mut self) {
        let track = self.cursor_track;
        self.session.clear_track(track);
        self.view.status_msg = format!("{} cleared", track_name(track));
    }

    pub fn clear_pattern(&mut self) {
        self.session.clear_pattern();
        self.view.status_msg = format!("Pattern {} cleared", self.state().pattern + 1);
    }

    pub fn toggle_mute(&mut self) {
        let track = self.cursor_track;
        self.session.send(Command::Mute { track });
        self.view.status_msg = if self.muted.insert(track) {
            format!("{} muted", track_name(track))
        } else {
            self.muted.remove(&track);
            format!("{} unmuted", track_name(track))
        };
    }

    pub fn open_copy_prompt(&mut self) {
        self.copy_target = Some(String::new());
    }

    pub fn copy_prompt_push(&mut self, c: char) {
        if let Some(buf) = &mut self.copy_target {
            if c.is_ascii_digit() && buf.len() < 2 {
                buf.push(c);
            }
        }
    }

    pub fn copy_prompt_pop(&mut self) {
        if let Some(buf) = &mut self.copy_target {
            buf.pop();
        }
    }

    pub fn cancel_copy(&mut self) {
        self.copy_target = None;
        self.view.status_msg = "Cancelled".to_string();
    }

    pub fn commit_copy(&mut self) {
        let Some(buf) = self.copy_target.take() else { return };
        let from = self.state().pattern;
        self.view.status_msg = match buf.parse::<usize>() {
            Ok(n) if (1..=MAX_PATTERNS).contains(&n) && n - 1 != from => {
                self.session.copy_pattern(n - 1);
                format!("Pattern {} copied to {}", from + 1, n)
            }
            Ok(n) if n == from + 1 => format!("Pattern {} is already selected", n),
            _ => format!("Copy target must be 1-{}", MAX_PATTERNS),
        };
    }

    // ── Live pads ─────────────────────────────────────────────────────────

    pub fn trigger_pad(&mut self, pad: usize, now: Instant) {
        if pad >= PADS.min(self.session.tracks()) {
            return;
        }
        self.session.send(Command::Trigger { track: pad });
        self.pad_hits.insert(pad, now);
    }

    pub fn toggle_pad_loop(&mut self) {
        self.pads.looping = !self.pads.looping;
        self.session.send(Command::Loop(self.pads.looping));
        self.view.status_msg = format!("Pad loop {}", on_off(self.pads.looping));
    }

    pub fn toggle_pad_hold(&mut self) {
        self.pads.hold = !self.pads.hold;
        self.session.send(Command::Hold(self.pads.hold));
        self.view.status_msg = format!("Pad hold {}", on_off(self.pads.hold));
    }

    pub fn toggle_pad_record(&mut self) {
        self.pads.record = !self.pads.record;
        self.session.send(Command::Record(self.pads.record));
        self.view.status_msg = format!("Pad record {}", on_off(self.pads.record));
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}
