//! Game clock bookkeeping.
//!
//! The server is the only time authority. It reports remaining milliseconds in
//! `state` (`whiteTime` / `blackTime`) and `timerUpdate` messages; between
//! updates the client projects the side to move's clock downwards so a display
//! can tick every second without inventing state.

use std::time::Duration;

use crate::protocol::Color;

/// Remaining time for both sides, in milliseconds, as last reported by the
/// server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GameClock {
    pub white_ms: i64,
    pub black_ms: i64,
}

impl GameClock {
    pub fn new(white_ms: i64, black_ms: i64) -> Self {
        Self { white_ms, black_ms }
    }

    /// Builds a clock from the optional `state` fields.
    ///
    /// The server omits a side that is at exactly zero, so once either field
    /// is present the missing one reads as `0`. `None` when both are absent.
    pub fn from_state(white_ms: Option<i64>, black_ms: Option<i64>) -> Option<Self> {
        match (white_ms, black_ms) {
            (None, None) => None,
            (white, black) => Some(Self::new(white.unwrap_or(0), black.unwrap_or(0))),
        }
    }

    pub fn remaining(&self, color: Color) -> i64 {
        match color {
            Color::White => self.white_ms,
            Color::Black => self.black_ms,
        }
    }

    /// Copy of this clock with `color`'s time set to `ms`.
    #[must_use]
    pub fn with_remaining(mut self, color: Color, ms: i64) -> Self {
        match color {
            Color::White => self.white_ms = ms,
            Color::Black => self.black_ms = ms,
        }
        self
    }

    /// Projects the clock `elapsed` after the last server update, counting
    /// down only the side to move. Never goes below zero.
    #[must_use]
    pub fn project(&self, turn: Color, elapsed: Duration) -> Self {
        let elapsed_ms = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);
        let remaining = self.remaining(turn).saturating_sub(elapsed_ms).max(0);
        self.with_remaining(turn, remaining)
    }

    /// Returns `true` once either side has no time left.
    pub fn is_flagged(&self) -> bool {
        self.white_ms <= 0 || self.black_ms <= 0
    }
}

/// Renders milliseconds as `MM:SS`, rounding up to whole seconds.
///
/// Absent or non-positive values render as `00:00`.
pub fn format_clock(ms: Option<i64>) -> String {
    let ms = match ms {
        Some(ms) if ms > 0 => ms,
        _ => return "00:00".to_owned(),
    };
    let total_seconds = ms.saturating_add(999) / 1000;
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn format_rounds_up_partial_seconds() {
        assert_eq!(format_clock(Some(600_000)), "10:00");
        assert_eq!(format_clock(Some(59_001)), "01:00");
        assert_eq!(format_clock(Some(1)), "00:01");
        assert_eq!(format_clock(Some(125_400)), "02:06");
    }

    #[test]
    fn format_handles_missing_and_negative() {
        assert_eq!(format_clock(None), "00:00");
        assert_eq!(format_clock(Some(0)), "00:00");
        assert_eq!(format_clock(Some(-500)), "00:00");
    }

    #[test]
    fn project_only_counts_side_to_move() {
        let clock = GameClock::new(60_000, 30_000);
        let projected = clock.project(Color::Black, Duration::from_millis(2_500));
        assert_eq!(projected, GameClock::new(60_000, 27_500));
    }

    #[test]
    fn project_saturates_at_zero() {
        let clock = GameClock::new(1_000, 30_000);
        let projected = clock.project(Color::White, Duration::from_secs(5));
        assert_eq!(projected.white_ms, 0);
        assert!(projected.is_flagged());
    }

    #[test]
    fn format_saturates_on_huge_values() {
        let formatted = format_clock(Some(i64::MAX));
        let total_seconds = i64::MAX / 1000;
        assert_eq!(
            formatted,
            format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
        );
        assert_eq!(format_clock(Some(i64::MAX - 998)), formatted);
    }

    #[test]
    fn from_state_reads_an_omitted_side_as_zero() {
        assert_eq!(
            GameClock::from_state(Some(1), Some(2)),
            Some(GameClock::new(1, 2))
        );
        assert_eq!(
            GameClock::from_state(Some(45_000), None),
            Some(GameClock::new(45_000, 0))
        );
        assert_eq!(
            GameClock::from_state(None, Some(3_000)),
            Some(GameClock::new(0, 3_000))
        );
        assert_eq!(GameClock::from_state(None, None), None);
    }
}
