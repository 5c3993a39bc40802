// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Coded frame input of a decode session.

use std::collections::VecDeque;

use remain::sorted;
use thiserror::Error as ThisError;

use crate::cancel::StopSignals;

/// One coded frame as extracted by the demultiplexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodedFrame {
    pub payload: Vec<u8>,
    /// Presentation timestamp, in microseconds of the session clock.
    pub pts: u64,
}

#[sorted]
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum SourceError {
    #[error("stopped while waiting for input")]
    Cancelled,
    #[error("input failed: {0}")]
    Failed(String),
}

/// Supplier of coded frames.
pub trait Source: Send {
    /// Returns the next coded frame, or `None` at end of stream.
    ///
    /// Implementations that wait for data must give up with `SourceError::Cancelled` once
    /// `signals` asks to stop.
    fn pull_coded_frame(
        &mut self,
        signals: &StopSignals,
    ) -> Result<Option<CodedFrame>, SourceError>;
}

/// A source replaying frames queued in memory.
#[derive(Debug, Clone, Default)]
pub struct QueueSource {
    frames: VecDeque<CodedFrame>,
}

impl QueueSource {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn push(&mut self, payload: Vec<u8>, pts: u64) {
        self.frames.push_back(CodedFrame { payload, pts });
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FromIterator<CodedFrame> for QueueSource {
    fn from_iter<I: IntoIterator<Item = CodedFrame>>(iter: I) -> Self {
        QueueSource {
            frames: iter.into_iter().collect(),
        }
    }
}

impl Source for QueueSource {
    fn pull_coded_frame(
        &mut self,
        signals: &StopSignals,
    ) -> Result<Option<CodedFrame>, SourceError> {
        if signals.should_stop() {
            return Err(SourceError::Cancelled);
        }
        Ok(self.frames.pop_front())
    }
}
