// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Frame dropping under load.
//!
//! The policy counts consecutive decoded frames whose presentation time had already passed when
//! decoding finished. A few late frames are tolerated. Past that the decoder is asked to hurry
//! and results are not shown, and once far behind whole frames are dropped before decoding. While
//! dropping, the count goes down by one per dropped frame so that decoding resumes gradually.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// Late frames tolerated before hurrying.
const HURRY_THRESHOLD: u32 = 4;
/// Late frames after which decoding is skipped altogether.
const SKIP_THRESHOLD: u32 = 8;

/// What to do with the next coded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDecision {
    /// Decode at full fidelity and present the result.
    Draw,
    /// Decode on the decoder's fast path and drop the result.
    Hurry,
    /// Drop the coded frame without decoding it.
    Skip,
}

/// Observable state of the policy, from its lateness count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatenessState {
    Normal,
    Hurry,
    Skip,
}

#[derive(Debug, Clone)]
pub struct LatenessPolicy {
    enabled: bool,
    late_frames: u32,
    skipping: bool,
}

impl LatenessPolicy {
    /// A disabled policy always draws, but still counts late frames.
    pub fn new(enabled: bool) -> Self {
        LatenessPolicy {
            enabled,
            late_frames: 0,
            skipping: false,
        }
    }

    /// Decides the fate of the next coded frame. Called once per coded frame, before decoding.
    pub fn decide(&mut self) -> FrameDecision {
        if !self.enabled {
            return FrameDecision::Draw;
        }

        if self.skipping || self.late_frames >= SKIP_THRESHOLD {
            self.late_frames = self.late_frames.saturating_sub(1);
            self.skipping = self.late_frames > HURRY_THRESHOLD;
            return FrameDecision::Skip;
        }

        if self.late_frames > HURRY_THRESHOLD {
            FrameDecision::Hurry
        } else {
            FrameDecision::Draw
        }
    }

    /// Records whether a decoded frame finished after its presentation time.
    pub fn record(&mut self, late: bool) {
        if late {
            self.late_frames = self.late_frames.saturating_add(1);
        } else {
            self.late_frames = 0;
            self.skipping = false;
        }
    }

    pub fn state(&self) -> LatenessState {
        if !self.enabled {
            LatenessState::Normal
        } else if self.skipping || self.late_frames >= SKIP_THRESHOLD {
            LatenessState::Skip
        } else if self.late_frames > HURRY_THRESHOLD {
            LatenessState::Hurry
        } else {
            LatenessState::Normal
        }
    }

    pub fn late_frames(&self) -> u32 {
        self.late_frames
    }
}

/// Source of the current time, in the unit of presentation timestamps (microseconds).
pub trait Clock: Send {
    fn now(&self) -> u64;
}

/// Microseconds elapsed since the clock was created.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub fn new(now: u64) -> Self {
        ManualClock(Arc::new(AtomicU64::new(now)))
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::Release);
    }

    pub fn advance(&self, delta: u64) {
        self.0.fetch_add(delta, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}
