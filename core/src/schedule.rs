//! Snapshot cadence arithmetic
//!
//! Frames may be negative (recorded games start before frame zero), so every
//! modulus here is a floor modulus.

/// Simulation frame number
pub type Frame = i32;

/// Modulus that is never negative for a positive divisor
pub fn floor_mod(value: i32, modulus: i32) -> i32 {
    debug_assert!(modulus > 0, "modulus must be positive");
    value.rem_euclid(modulus)
}

/// Fixed snapshot cadence: a base snapshot at `first_save_frame`, then one
/// snapshot every `interval` frames after it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveSchedule {
    first_save_frame: Frame,
    interval: i32,
}

impl SaveSchedule {
    pub fn new(first_save_frame: Frame, interval: i32) -> Self {
        debug_assert!(interval > 0, "save interval must be positive");
        Self {
            first_save_frame,
            interval,
        }
    }

    pub fn first_save_frame(&self) -> Frame {
        self.first_save_frame
    }

    pub fn interval(&self) -> i32 {
        self.interval
    }

    /// Offset that aligns the interval check with the first save frame
    ///
    /// `(frame + wake_offset()) mod interval == 0` holds exactly on save frames.
    /// For the default cadence (first save -122, interval 900) this is 122.
    pub fn wake_offset(&self) -> i32 {
        let offset = self.interval - floor_mod(self.first_save_frame, self.interval);
        floor_mod(offset, self.interval)
    }

    /// Whether a snapshot is due on `frame`
    pub fn is_save_frame(&self, frame: Frame) -> bool {
        floor_mod(frame.saturating_add(self.wake_offset()), self.interval) == 0
    }

    /// Whether `frame` is the base snapshot frame
    pub fn is_base_frame(&self, frame: Frame) -> bool {
        frame == self.first_save_frame
    }

    /// Latest save frame at or before `target`
    ///
    /// Targets before the first save frame still land on the save grid, and the
    /// result is never less than `target - interval + 1`.
    pub fn closest_save_frame(&self, target: Frame) -> Frame {
        target - floor_mod(target - self.first_save_frame, self.interval)
    }

    /// Save frame one interval earlier
    pub fn previous(&self, save_frame: Frame) -> Frame {
        save_frame - self.interval
    }
}
