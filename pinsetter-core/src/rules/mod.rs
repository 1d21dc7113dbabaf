//! Canadian five-pin frame rules used to pick a reset policy.
//!
//! The functions here are pure. They read a [`FrameContext`] supplied by the
//! game layer and never modify it; without a context every predicate answers
//! `false`.

use core::fmt;

use heapless::Vec;

use crate::pins::{STRIKE_VALUE, ScanStatus};

/// Zero-based index of the final frame.
pub const FINAL_FRAME_INDEX: u8 = 9;

/// Most balls a single frame can hold.
pub const MAX_BALLS_PER_FRAME: usize = 3;

/// Read-only view of the game state for the bowler on the lane.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FrameContext {
    pub bowler: u8,
    pub frame_index: u8,
    /// Values of the balls already recorded in the current frame, in order.
    pub balls: Vec<u8, MAX_BALLS_PER_FRAME>,
}

/// Rejected frame context.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FrameContextError {
    TooManyBalls,
    FrameOutOfRange,
    BallValueOutOfRange,
}

impl fmt::Display for FrameContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FrameContextError::TooManyBalls => "a frame holds at most 3 balls",
            FrameContextError::FrameOutOfRange => "frame index must be 0-9",
            FrameContextError::BallValueOutOfRange => "ball values must be 0-15",
        })
    }
}

impl FrameContext {
    /// A frame with no balls recorded yet.
    #[must_use]
    pub const fn new(bowler: u8, frame_index: u8) -> Self {
        Self {
            bowler,
            frame_index,
            balls: Vec::new(),
        }
    }

    /// Builds a context after validating the frame index and ball values.
    pub fn with_balls(bowler: u8, frame_index: u8, balls: &[u8]) -> Result<Self, FrameContextError> {
        if frame_index > FINAL_FRAME_INDEX {
            return Err(FrameContextError::FrameOutOfRange);
        }
        if balls.iter().any(|value| *value > STRIKE_VALUE) {
            return Err(FrameContextError::BallValueOutOfRange);
        }
        let balls = Vec::from_slice(balls).map_err(|_| FrameContextError::TooManyBalls)?;
        Ok(Self {
            bowler,
            frame_index,
            balls,
        })
    }

    #[must_use]
    pub fn ball_count(&self) -> usize {
        self.balls.len()
    }

    #[must_use]
    pub fn first_ball(&self) -> Option<u8> {
        self.balls.first().copied()
    }

    #[must_use]
    pub const fn is_final_frame(&self) -> bool {
        self.frame_index == FINAL_FRAME_INDEX
    }
}

impl fmt::Display for FrameContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bowler={} frame={} balls=",
            self.bowler,
            u16::from(self.frame_index) + 1
        )?;
        if self.balls.is_empty() {
            return f.write_str("-");
        }
        for (index, value) in self.balls.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{value}")?;
        }
        Ok(())
    }
}

/// Why a throw ends in a full reset.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ResetReason {
    ExternalForce,
    Strike,
    FrameEnding,
    ThirdBall,
    None,
}

impl ResetReason {
    /// Any reason other than [`ResetReason::None`] calls for a full reset.
    #[must_use]
    pub const fn requires_full_reset(self) -> bool {
        !matches!(self, ResetReason::None)
    }
}

impl fmt::Display for ResetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResetReason::ExternalForce => "external-force",
            ResetReason::Strike => "strike",
            ResetReason::FrameEnding => "frame-ending",
            ResetReason::ThirdBall => "third-ball",
            ResetReason::None => "none",
        })
    }
}

/// The current frame already holds two or more balls.
#[must_use]
pub fn is_third_ball(context: Option<&FrameContext>) -> bool {
    context.is_some_and(|frame| frame.ball_count() >= 2)
}

/// Machine-level frame ending check.
///
/// Regular and final frames only end here on the third ball; first and second
/// balls never end a frame through this path.
#[must_use]
pub fn is_frame_ending(context: Option<&FrameContext>) -> bool {
    context.is_some_and(|frame| frame.ball_count() == 2)
}

/// Whether the ball being processed completes the frame.
///
/// `ball_count` is the number of balls recorded before this one.
#[must_use]
pub fn will_be_last_ball(
    ball_count: usize,
    first_ball_value: u8,
    this_ball_value: u8,
    status: ScanStatus,
    is_10th: bool,
) -> bool {
    if status.is_strike() || this_ball_value == STRIKE_VALUE {
        // A tenth-frame strike resets the rack and play continues.
        return !is_10th;
    }

    if is_10th {
        match ball_count {
            2 => true,
            1 => {
                first_ball_value < STRIKE_VALUE
                    && first_ball_value.saturating_add(this_ball_value) < STRIKE_VALUE
            }
            _ => false,
        }
    } else {
        matches!(ball_count, 1 | 2)
    }
}

/// [`will_be_last_ball`] evaluated against an optional frame context.
#[must_use]
pub fn ends_frame(context: Option<&FrameContext>, this_ball_value: u8, status: ScanStatus) -> bool {
    context.is_some_and(|frame| {
        will_be_last_ball(
            frame.ball_count(),
            frame.first_ball().unwrap_or(0),
            this_ball_value,
            status,
            frame.is_final_frame(),
        )
    })
}

/// Picks the reset reason in priority order.
#[must_use]
pub const fn decide_reset_reason(
    is_strike: bool,
    is_frame_ending: bool,
    is_third_ball: bool,
    external_force: bool,
) -> ResetReason {
    if external_force {
        ResetReason::ExternalForce
    } else if is_strike {
        ResetReason::Strike
    } else if is_frame_ending {
        ResetReason::FrameEnding
    } else if is_third_ball {
        ResetReason::ThirdBall
    } else {
        ResetReason::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: u8, balls: &[u8]) -> FrameContext {
        FrameContext::with_balls(0, index, balls).expect("valid frame")
    }

    #[test]
    fn third_ball_needs_two_recorded_balls() {
        assert!(!is_third_ball(None));
        assert!(!is_third_ball(Some(&frame(3, &[5]))));
        assert!(is_third_ball(Some(&frame(3, &[5, 3]))));
        assert!(is_third_ball(Some(&frame(9, &[15, 15]))));
    }

    #[test]
    fn frame_ending_only_fires_on_the_third_ball() {
        assert!(!is_frame_ending(Some(&frame(0, &[]))));
        assert!(!is_frame_ending(Some(&frame(0, &[7]))));
        assert!(is_frame_ending(Some(&frame(0, &[7, 3]))));
        assert!(!is_frame_ending(Some(&frame(9, &[15]))));
        assert!(is_frame_ending(Some(&frame(9, &[15, 15]))));
    }

    #[test]
    fn strikes_end_regular_frames_but_not_the_tenth() {
        assert!(will_be_last_ball(0, 0, 15, ScanStatus::Strike, false));
        assert!(!will_be_last_ball(0, 0, 15, ScanStatus::Strike, true));
        assert!(!will_be_last_ball(2, 15, 15, ScanStatus::Strike, true));
    }

    #[test]
    fn regular_frame_second_ball_always_ends() {
        assert!(will_be_last_ball(1, 8, 7, ScanStatus::PartialChange, false));
        assert!(will_be_last_ball(1, 8, 2, ScanStatus::PartialChange, false));
        assert!(!will_be_last_ball(0, 0, 8, ScanStatus::PartialChange, false));
    }

    #[test]
    fn tenth_frame_second_ball_ends_only_when_open() {
        assert!(will_be_last_ball(1, 6, 5, ScanStatus::PartialChange, true));
        assert!(!will_be_last_ball(1, 6, 9, ScanStatus::PartialChange, true));
        assert!(will_be_last_ball(2, 6, 9, ScanStatus::PartialChange, true));
    }

    #[test]
    fn reset_reason_follows_priority() {
        assert_eq!(
            decide_reset_reason(true, true, true, true),
            ResetReason::ExternalForce
        );
        assert_eq!(decide_reset_reason(true, true, true, false), ResetReason::Strike);
        assert_eq!(
            decide_reset_reason(false, true, true, false),
            ResetReason::FrameEnding
        );
        assert_eq!(
            decide_reset_reason(false, false, true, false),
            ResetReason::ThirdBall
        );
        assert_eq!(
            decide_reset_reason(false, false, false, false),
            ResetReason::None
        );
        assert!(!ResetReason::None.requires_full_reset());
    }

    #[test]
    fn context_validation_rejects_bad_input() {
        assert_eq!(
            FrameContext::with_balls(0, 10, &[]),
            Err(FrameContextError::FrameOutOfRange)
        );
        assert_eq!(
            FrameContext::with_balls(0, 9, &[5, 5, 5, 5]),
            Err(FrameContextError::TooManyBalls)
        );
        assert_eq!(
            FrameContext::with_balls(0, 1, &[16]),
            Err(FrameContextError::BallValueOutOfRange)
        );
    }

    #[test]
    fn ends_frame_without_context_is_false() {
        assert!(!ends_frame(None, 15, ScanStatus::Strike));
        assert!(ends_frame(Some(&frame(2, &[])), 15, ScanStatus::Strike));
    }
}
