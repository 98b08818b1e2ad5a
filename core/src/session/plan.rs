//! Seek planning
//!
//! Turns a seek request plus the current playback position into a concrete
//! plan: which snapshot to restore and whether the simulation must then
//! fast-forward to the exact target. Planning is pure; the coordinator
//! executes the plan.

use crate::events::LoadPoint;
use crate::schedule::{Frame, SaveSchedule};

use super::state::PlaybackState;

/// What the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekRequest {
    /// Jump back by the configured jump interval
    JumpBack,
    /// Jump forward by the configured jump interval
    JumpForward,
    /// Seek to an explicit frame
    Target(Frame),
}

impl SeekRequest {
    /// Pending request in `state`; a jump back wins over a jump forward, and
    /// both win over an explicit target
    pub fn pending(state: &PlaybackState) -> Option<Self> {
        if !state.in_playback {
            return None;
        }
        if state.jump_back_requested {
            Some(Self::JumpBack)
        } else if state.jump_forward_requested {
            Some(Self::JumpForward)
        } else {
            state.target_frame.map(Self::Target)
        }
    }
}

/// Position a seek starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekOrigin {
    pub current: Frame,
    pub latest: Frame,
}

/// Resolved seek
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekPlan {
    /// Clamped destination
    pub target: Frame,
    /// Nearest save frame at or below the target
    pub closest_save_frame: Frame,
    /// Snapshot to restore, if restoring beats simulating from where we are
    pub load: Option<LoadPoint>,
    /// Whether to hard fast-forward after the load
    pub fast_forward: bool,
}

/// Build the plan for `request`
///
/// `has_diff` reports whether a diff entry exists for a save frame; entries
/// still being computed count as present.
pub fn plan_seek(
    request: SeekRequest,
    origin: SeekOrigin,
    schedule: &SaveSchedule,
    jump_interval: i32,
    has_diff: impl Fn(Frame) -> bool,
) -> SeekPlan {
    let SeekOrigin { current, latest } = origin;
    let first = schedule.first_save_frame();

    let requested = match request {
        SeekRequest::JumpBack => current.saturating_sub(jump_interval),
        SeekRequest::JumpForward => current.saturating_add(jump_interval),
        SeekRequest::Target(frame) => frame,
    };
    let target = clamp_target(requested, first, latest);
    let closest = schedule.closest_save_frame(target);

    let load = if is_loading_state_optimal(target, closest, current) {
        select_load_point(target, closest, current, schedule, has_diff)
    } else {
        None
    };

    // Without a load the simulation resumes from where it is
    let resume_from = load.map_or(current, |point| point.frame());
    let fast_forward = resume_from != target && target != latest;

    SeekPlan {
        target,
        closest_save_frame: closest,
        load,
        fast_forward,
    }
}

fn clamp_target(target: Frame, first: Frame, latest: Frame) -> Frame {
    if target < first {
        first
    } else if target > latest {
        latest
    } else {
        target
    }
}

/// Restoring only pays off when going back, or when the snapshot lies ahead
/// of the current frame.
fn is_loading_state_optimal(target: Frame, closest: Frame, current: Frame) -> bool {
    target <= current || closest > current
}

fn select_load_point(
    target: Frame,
    closest: Frame,
    current: Frame,
    schedule: &SaveSchedule,
    has_diff: impl Fn(Frame) -> bool,
) -> Option<LoadPoint> {
    let first = schedule.first_save_frame();

    if closest <= first {
        return Some(LoadPoint::Base(first));
    }
    if has_diff(closest) {
        return Some(LoadPoint::Diff(closest));
    }

    if target < current {
        // Any earlier snapshot works, down to the base
        let mut frame = schedule.previous(closest);
        while frame > first && !has_diff(frame) {
            frame = schedule.previous(frame);
        }
        if frame <= first {
            Some(LoadPoint::Base(first))
        } else {
            Some(LoadPoint::Diff(frame))
        }
    } else if target > current {
        // Only snapshots still ahead of the current frame are useful
        let mut frame = schedule.previous(closest);
        while frame > current && frame > first && !has_diff(frame) {
            frame = schedule.previous(frame);
        }
        (frame > current && frame > first && has_diff(frame)).then_some(LoadPoint::Diff(frame))
    } else {
        None
    }
}
