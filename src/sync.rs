use std::time::{Duration, Instant};

use log::warn;

use crate::device::DeviceStatus;
use crate::pattern::{MAX_PATTERNS, MAX_STEPS};
use crate::state::{DeviceState, Field};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Active,
    Paused,
}

/// What came out of applying one status reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub changed: Vec<Field>,
    /// Set when the device moved to another pattern; its grid must be fetched.
    pub pattern_switch: Option<usize>,
}

fn set<T: PartialEq>(slot: &mut T, value: T, field: Field, changed: &mut Vec<Field>) {
    if *slot != value {
        *slot = value;
        changed.push(field);
    }
}

/// Fold a status reply into the mirrored state.
///
/// Absent fields leave the cached value alone.  Indices that do not fit the
/// local model are ignored with a warning.
pub fn reconcile(state: &mut DeviceState, status: &DeviceStatus, tracks: usize) -> Reconciliation {
    let mut changed = Vec::new();
    let mut pattern_switch = None;

    if let Some(bpm) = status.bpm {
        set(&mut state.tempo, bpm, Field::Tempo, &mut changed);
    }
    if let Some(pattern) = status.pattern {
        if pattern >= MAX_PATTERNS {
            warn!("device reported pattern {} (max {}), ignoring", pattern, MAX_PATTERNS - 1);
        } else if pattern != state.pattern {
            state.pattern = pattern;
            changed.push(Field::Pattern);
            pattern_switch = Some(pattern);
        }
    }
    if let Some(kit) = status.kit {
        set(&mut state.kit, kit, Field::Kit, &mut changed);
    }
    if let Some(name) = &status.kit_name {
        set(&mut state.kit_name, Some(name.clone()), Field::KitName, &mut changed);
    }
    if let Some(playing) = status.playing {
        set(&mut state.playing, playing, Field::Playing, &mut changed);
    }
    if let Some(step) = status.step {
        if step >= MAX_STEPS {
            warn!("device reported step {}, ignoring", step);
        } else {
            set(&mut state.step, step, Field::Step, &mut changed);
        }
    }
    if let Some(track) = status.track {
        if track >= tracks {
            warn!("device reported track {} but only {} are configured, ignoring", track, tracks);
        } else {
            set(&mut state.track, track, Field::Track, &mut changed);
        }
    }
    if let Some(volume) = status.volume {
        set(&mut state.volume, volume, Field::Volume, &mut changed);
    }
    if let Some(theme) = status.theme {
        set(&mut state.theme, theme, Field::Theme, &mut changed);
    }
    if let Some(clients) = status.clients {
        set(&mut state.clients, Some(clients), Field::Clients, &mut changed);
    }

    Reconciliation { changed, pattern_switch }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingPattern {
    seq:   u64,
    index: usize,
    epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternVerdict {
    Apply,
    /// A newer pattern request is outstanding.
    Superseded,
    /// The active pattern changed while the request was in flight.
    Moved,
    /// The pattern was edited locally after the request was issued.
    EditedSince,
}

/// Polling scheduler.
///
/// `poll` hands out at most one status fetch at a time; a due tick is skipped
/// while the previous fetch is unresolved.  Every `start` opens a new
/// generation and replies from older generations (or arriving while paused)
/// are discarded.
#[derive(Debug)]
pub struct SyncLoop {
    state:      LoopState,
    interval:   Duration,
    next_due:   Option<Instant>,
    generation: u64,
    in_flight:  bool,
    /// The outstanding fetch was issued before a local write.
    stale:      bool,
    pattern_seq: u64,
    pending_pattern: Option<PendingPattern>,
}

impl SyncLoop {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: LoopState::Paused,
            interval,
            next_due: None,
            generation: 0,
            in_flight: false,
            stale: false,
            pattern_seq: 0,
            pending_pattern: None,
        }
    }

    pub fn state(&self) -> LoopState { self.state }

    pub fn is_active(&self) -> bool { self.state == LoopState::Active }

    pub fn interval(&self) -> Duration { self.interval }

    #[cfg(test)]
    pub fn in_flight(&self) -> bool { self.in_flight }

    /// Paused → Active with an immediate fetch.  No-op when already active.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.is_active() {
            return false;
        }
        self.state = LoopState::Active;
        self.generation += 1;
        self.next_due = Some(now);
        true
    }

    /// Active → Paused.  Idempotent.  An outstanding fetch is not aborted;
    /// its reply will be discarded.
    pub fn stop(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.state = LoopState::Paused;
        self.next_due = None;
        true
    }

    /// When the next fetch falls due, for sizing the event-loop wait.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.is_active() { self.next_due } else { None }
    }

    /// Returns the generation to fetch for if a status fetch is due.
    pub fn poll(&mut self, now: Instant) -> Option<u64> {
        if !self.is_active() || self.in_flight {
            return None;
        }
        let due = self.next_due?;
        if now < due {
            return None;
        }
        // keep the cadence, but never burst to catch up
        let mut next = due + self.interval;
        if next <= now {
            next = now + self.interval;
        }
        self.next_due = Some(next);
        self.in_flight = true;
        self.stale = false;
        Some(self.generation)
    }

    /// The fetch handed out by `poll` never left (queue full).
    pub fn abandon(&mut self) {
        self.in_flight = false;
        self.stale = false;
    }

    /// Settle the outstanding fetch; `true` if its reply should be applied.
    pub fn accept_status(&mut self, generation: u64) -> bool {
        let fresh = !self.stale;
        self.in_flight = false;
        self.stale = false;
        fresh && self.is_active() && generation == self.generation
    }

    /// A mirrored field was written locally.  The outstanding status fetch
    /// may predate the matching command, so its reply must not be applied.
    pub fn invalidate(&mut self) {
        if self.in_flight {
            self.stale = true;
        }
    }

    /// Register a pattern fetch for `index`, taken at edit epoch `epoch`.
    pub fn request_pattern(&mut self, index: usize, epoch: u64) -> u64 {
        self.pattern_seq += 1;
        self.pending_pattern = Some(PendingPattern { seq: self.pattern_seq, index, epoch });
        self.pattern_seq
    }

    /// The fetch for `seq` never left (queue full).
    pub fn abandon_pattern(&mut self, seq: u64) {
        if self.pending_pattern.map_or(false, |p| p.seq == seq) {
            self.pending_pattern = None;
        }
    }

    pub fn accept_pattern(&mut self, seq: u64, active_pattern: usize, current_epoch: u64) -> PatternVerdict {
        let pending = match self.pending_pattern {
            Some(p) if p.seq == seq => p,
            _ => return PatternVerdict::Superseded,
        };
        self.pending_pattern = None;
        if pending.index != active_pattern {
            PatternVerdict::Moved
        } else if pending.epoch != current_epoch {
            PatternVerdict::EditedSince
        } else {
            PatternVerdict::Apply
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(300);

    fn status(f: impl FnOnce(&mut DeviceStatus)) -> DeviceStatus {
        let mut s = DeviceStatus::default();
        f(&mut s);
        s
    }

    /// Drive the loop every millisecond, resolving each fetch right away.
    fn fetch_times(sync: &mut SyncLoop, from: Instant, span: Duration) -> Vec<Duration> {
        let mut times = Vec::new();
        let mut t = Duration::ZERO;
        while t <= span {
            if let Some(generation) = sync.poll(from + t) {
                times.push(t);
                sync.accept_status(generation);
            }
            t += Duration::from_millis(1);
        }
        times
    }

    #[test]
    fn tempo_only_status_touches_only_tempo() {
        let mut state = DeviceState { pattern: 4, kit: 2, volume: 9, ..Default::default() };
        let before = state.clone();

        let r = reconcile(&mut state, &status(|s| s.bpm = Some(140)), 8);

        assert_eq!(r.changed, vec![Field::Tempo]);
        assert_eq!(r.pattern_switch, None);
        assert_eq!(state, DeviceState { tempo: 140, ..before });
    }

    #[test]
    fn unchanged_values_are_not_reported() {
        let mut state = DeviceState::default();
        let r = reconcile(&mut state, &status(|s| { s.bpm = Some(120); s.volume = Some(15); s.pattern = Some(0) }), 8);
        assert_eq!(r, Reconciliation::default());
    }

    #[test]
    fn pattern_change_requests_a_switch() {
        let mut state = DeviceState::default();
        let r = reconcile(&mut state, &status(|s| s.pattern = Some(5)), 8);
        assert_eq!(r.pattern_switch, Some(5));
        assert_eq!(state.pattern, 5);

        // same pattern again: nothing to fetch
        let r = reconcile(&mut state, &status(|s| s.pattern = Some(5)), 8);
        assert_eq!(r.pattern_switch, None);
    }

    #[test]
    fn device_values_win_even_at_the_edges() {
        let mut state = DeviceState { tempo: 300, volume: 30, ..Default::default() };
        // device clamped a +5 at 300 and reports what it has
        reconcile(&mut state, &status(|s| { s.bpm = Some(300); s.volume = Some(30) }), 8);
        assert_eq!((state.tempo, state.volume), (300, 30));

        // a firmware with a lower ceiling is mirrored, not second-guessed
        reconcile(&mut state, &status(|s| s.bpm = Some(240)), 8);
        assert_eq!(state.tempo, 240);
    }

    #[test]
    fn out_of_range_indices_are_ignored() {
        let mut state = DeviceState { pattern: 1, step: 3, track: 2, ..Default::default() };
        let r = reconcile(&mut state, &status(|s| { s.pattern = Some(16); s.step = Some(16); s.track = Some(8) }), 8);
        assert!(r.changed.is_empty());
        assert_eq!((state.pattern, state.step, state.track), (1, 3, 2));

        // 16-track variant accepts track 8
        let r = reconcile(&mut state, &status(|s| s.track = Some(8)), 16);
        assert_eq!(r.changed, vec![Field::Track]);
    }

    #[test]
    fn optional_strings_and_counts() {
        let mut state = DeviceState::default();
        let r = reconcile(&mut state, &status(|s| { s.kit_name = Some("808 DRY".into()); s.clients = Some(2) }), 8);
        assert_eq!(r.changed, vec![Field::KitName, Field::Clients]);
        assert_eq!(state.kit_label(), "808 DRY");
        assert_eq!(state.clients, Some(2));
    }

    #[test]
    fn paused_loop_never_fetches() {
        let now = Instant::now();
        let mut sync = SyncLoop::new(TICK);
        assert_eq!(sync.state(), LoopState::Paused);
        assert_eq!(sync.poll(now), None);
        assert_eq!(sync.next_deadline(), None);
    }

    #[test]
    fn start_fetches_immediately_then_on_interval() {
        let now = Instant::now();
        let mut sync = SyncLoop::new(TICK);
        assert!(sync.start(now));
        assert!(!sync.start(now), "second start is a no-op");

        let times = fetch_times(&mut sync, now, Duration::from_millis(950));
        assert_eq!(times, vec![Duration::ZERO, TICK, TICK * 2, TICK * 3]);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut sync = SyncLoop::new(TICK);
        sync.start(Instant::now());
        assert!(sync.stop());
        assert!(!sync.stop());
        assert_eq!(sync.state(), LoopState::Paused);
    }

    #[test]
    fn restart_gives_one_immediate_fetch_without_double_fetching() {
        let t0 = Instant::now();
        let mut sync = SyncLoop::new(TICK);
        sync.start(t0);
        fetch_times(&mut sync, t0, Duration::from_millis(500)); // fetches at 0 and 300

        // stop just before the 600ms tick would fire, restart a bit later
        sync.stop();
        let restart = t0 + Duration::from_millis(590);
        sync.start(restart);

        let times = fetch_times(&mut sync, restart, Duration::from_millis(650));
        assert_eq!(times, vec![Duration::ZERO, TICK, TICK * 2]);
    }

    #[test]
    fn due_tick_is_skipped_while_a_fetch_is_outstanding() {
        let t0 = Instant::now();
        let mut sync = SyncLoop::new(TICK);
        sync.start(t0);

        let generation = sync.poll(t0).unwrap();
        assert!(sync.in_flight());
        assert_eq!(sync.poll(t0 + TICK), None);
        assert_eq!(sync.poll(t0 + TICK * 2), None);

        // slow reply finally lands; the next poll fires once, not three times
        assert!(sync.accept_status(generation));
        let late = t0 + TICK * 2 + Duration::from_millis(50);
        assert_eq!(sync.poll(late), Some(generation));
        assert_eq!(sync.poll(late), None);
        sync.accept_status(generation);
        assert_eq!(sync.poll(late + Duration::from_millis(10)), None);
        assert!(sync.poll(late + TICK).is_some());
    }

    #[test]
    fn replies_after_stop_or_from_old_generations_are_discarded() {
        let t0 = Instant::now();
        let mut sync = SyncLoop::new(TICK);
        sync.start(t0);
        let first = sync.poll(t0).unwrap();

        sync.stop();
        assert!(!sync.accept_status(first), "reply while paused");

        sync.start(t0 + TICK);
        let second = sync.poll(t0 + TICK).unwrap();
        assert_ne!(first, second);
        assert!(!sync.accept_status(first), "reply from an older generation");
        assert!(sync.accept_status(second));
    }

    #[test]
    fn restart_waits_for_the_outstanding_fetch() {
        let t0 = Instant::now();
        let mut sync = SyncLoop::new(TICK);
        sync.start(t0);
        let old = sync.poll(t0).unwrap();
        sync.stop();
        sync.start(t0 + Duration::from_millis(10));

        assert_eq!(sync.poll(t0 + Duration::from_millis(10)), None);
        assert!(!sync.accept_status(old));
        assert!(sync.poll(t0 + Duration::from_millis(20)).is_some());
    }

    #[test]
    fn abandoned_fetch_frees_the_slot() {
        let t0 = Instant::now();
        let mut sync = SyncLoop::new(TICK);
        sync.start(t0);
        sync.poll(t0).unwrap();
        sync.abandon();
        assert!(!sync.in_flight());
        assert!(sync.poll(t0 + TICK).is_some());
    }

    #[test]
    fn pattern_replies_are_checked_against_seq_pattern_and_edits() {
        let mut sync = SyncLoop::new(TICK);

        let seq = sync.request_pattern(2, 0);
        assert_eq!(sync.accept_pattern(seq, 2, 0), PatternVerdict::Apply);
        // a reply can only be accepted once
        assert_eq!(sync.accept_pattern(seq, 2, 0), PatternVerdict::Superseded);

        let old = sync.request_pattern(2, 0);
        let new = sync.request_pattern(3, 0);
        assert_eq!(sync.accept_pattern(old, 3, 0), PatternVerdict::Superseded);
        assert_eq!(sync.accept_pattern(new, 3, 0), PatternVerdict::Apply);

        let seq = sync.request_pattern(4, 0);
        assert_eq!(sync.accept_pattern(seq, 5, 0), PatternVerdict::Moved);

        let seq = sync.request_pattern(4, 7);
        assert_eq!(sync.accept_pattern(seq, 4, 8), PatternVerdict::EditedSince);
    }

    #[test]
    fn local_write_makes_the_outstanding_status_stale() {
        let t0 = Instant::now();
        let mut sync = SyncLoop::new(TICK);
        sync.start(t0);
        let generation = sync.poll(t0).unwrap();
        sync.invalidate();
        assert!(!sync.accept_status(generation));
        assert!(!sync.in_flight());

        // the next fetch is issued after the write and counts again
        let generation = sync.poll(t0 + TICK).unwrap();
        assert!(sync.accept_status(generation));
    }

    #[test]
    fn local_write_with_nothing_in_flight_changes_nothing() {
        let t0 = Instant::now();
        let mut sync = SyncLoop::new(TICK);
        sync.start(t0);
        sync.invalidate();
        let generation = sync.poll(t0).unwrap();
        assert!(sync.accept_status(generation));
    }

    #[test]
    fn abandoned_pattern_request_is_forgotten() {
        let mut sync = SyncLoop::new(TICK);
        let old = sync.request_pattern(1, 0);
        let new = sync.request_pattern(2, 0);
        // only the matching request is dropped
        sync.abandon_pattern(old);
        assert_eq!(sync.accept_pattern(new, 2, 0), PatternVerdict::Apply);

        let seq = sync.request_pattern(3, 0);
        sync.abandon_pattern(seq);
        assert_eq!(sync.accept_pattern(seq, 3, 0), PatternVerdict::Superseded);
    }
}
