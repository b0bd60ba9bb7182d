use std::fmt;

use log::warn;

pub const MAX_PATTERNS: usize = 16;
pub const MAX_STEPS: usize = 16;

/// One pattern: `tracks` rows of `MAX_STEPS` on/off cells.
pub type Grid = Vec<Vec<bool>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutOfBounds {
    Pattern(usize),
    Track(usize),
    Step(usize),
}

impl fmt::Display for OutOfBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern(i) => write!(f, "pattern index {} out of range", i),
            Self::Track(i)   => write!(f, "track index {} out of range", i),
            Self::Step(i)    => write!(f, "step index {} out of range", i),
        }
    }
}

impl std::error::Error for OutOfBounds {}

/// Local mirror of every pattern on the device.
///
/// Dimensions are fixed when the bank is created: `MAX_PATTERNS` patterns of
/// `tracks × MAX_STEPS` cells.  Each pattern also carries an edit epoch that
/// is bumped on every local mutation, so that a pattern fetch requested
/// before an edit can be recognised as stale when it comes back.
#[derive(Debug, Clone)]
pub struct PatternBank {
    tracks:   usize,
    patterns: Vec<Grid>,
    epochs:   Vec<u64>,
}

impl PatternBank {
    pub fn new(tracks: usize) -> Self {
        Self {
            tracks,
            patterns: vec![empty_grid(tracks); MAX_PATTERNS],
            epochs:   vec![0; MAX_PATTERNS],
        }
    }

    pub fn tracks(&self) -> usize { self.tracks }

    pub fn pattern(&self, index: usize) -> Option<&Grid> {
        self.patterns.get(index)
    }

    pub fn get(&self, pattern: usize, track: usize, step: usize) -> Option<bool> {
        self.patterns.get(pattern)?.get(track)?.get(step).copied()
    }

    pub fn edit_epoch(&self, pattern: usize) -> u64 {
        self.epochs.get(pattern).copied().unwrap_or(0)
    }

    /// Flip one cell and return its new value.
    pub fn toggle_step(&mut self, pattern: usize, track: usize, step: usize) -> Result<bool, OutOfBounds> {
        self.check(pattern, track, Some(step))?;
        let cell = &mut self.patterns[pattern][track][step];
        *cell = !*cell;
        let value = *cell;
        self.epochs[pattern] += 1;
        Ok(value)
    }

    /// Overwrite a whole pattern with data loaded from the device.
    ///
    /// Returns `false` (and keeps the previous grid) when the grid is not
    /// exactly `tracks × MAX_STEPS`.
    pub fn replace_pattern(&mut self, index: usize, grid: Grid) -> bool {
        if index >= MAX_PATTERNS {
            warn!("ignoring pattern data for slot {}: {}", index, OutOfBounds::Pattern(index));
            return false;
        }
        let conforming = grid.len() == self.tracks && grid.iter().all(|row| row.len() == MAX_STEPS);
        if !conforming {
            let steps = grid.first().map(|r| r.len()).unwrap_or(0);
            warn!(
                "ignoring pattern data for slot {}: expected {}x{} grid, got {}x{}",
                index, self.tracks, MAX_STEPS, grid.len(), steps
            );
            return false;
        }
        self.patterns[index] = grid;
        true
    }

    pub fn clear_track(&mut self, pattern: usize, track: usize) -> Result<(), OutOfBounds> {
        self.check(pattern, track, None)?;
        self.patterns[pattern][track].iter_mut().for_each(|c| *c = false);
        self.epochs[pattern] += 1;
        Ok(())
    }

    pub fn clear_pattern(&mut self, pattern: usize) -> Result<(), OutOfBounds> {
        if pattern >= MAX_PATTERNS { return Err(OutOfBounds::Pattern(pattern)); }
        self.patterns[pattern] = empty_grid(self.tracks);
        self.epochs[pattern] += 1;
        Ok(())
    }

    fn check(&self, pattern: usize, track: usize, step: Option<usize>) -> Result<(), OutOfBounds> {
        if pattern >= MAX_PATTERNS { return Err(OutOfBounds::Pattern(pattern)); }
        if track >= self.tracks    { return Err(OutOfBounds::Track(track)); }
        match step {
            Some(s) if s >= MAX_STEPS => Err(OutOfBounds::Step(s)),
            _ => Ok(()),
        }
    }
}

fn empty_grid(tracks: usize) -> Grid {
    vec![vec![false; MAX_STEPS]; tracks]
}
