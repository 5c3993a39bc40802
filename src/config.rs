// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Tunables of a decode session.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use serde::Serialize;

use crate::postproc::PostProcMode;

/// Highest post-processing quality level.
pub const MAX_POSTPROC_QUALITY: u32 = 6;

/// Holds the parameters of a decode session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Parameters {
    /// Milliseconds to sleep between two attempts to get a buffer from the sink.
    pub acquire_retry_ms: u64,
    pub deblock_chroma_horizontal: bool,
    pub deblock_chroma_vertical: bool,
    pub deblock_luma_horizontal: bool,
    pub deblock_luma_vertical: bool,
    pub dering_chroma: bool,
    pub dering_luma: bool,
    /// Let the decoder write into sink buffers when it and the stream allow it.
    pub direct_rendering: bool,
    pub error_resilience: i32,
    /// Only decode luma.
    pub grayscale: bool,
    /// Trade decode fidelity and presentation for timeliness when frames are late.
    pub hurry_up: bool,
    pub postproc_auto: bool,
    pub postproc_quality: u32,
    /// Number of direct rendering buffers kept referenced for the decoder. Streams referencing
    /// pictures further back than this will show corruption.
    pub retention_depth: usize,
    pub workaround_bugs: i32,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            acquire_retry_ms: 20,
            deblock_chroma_horizontal: false,
            deblock_chroma_vertical: false,
            deblock_luma_horizontal: false,
            deblock_luma_vertical: false,
            dering_chroma: false,
            dering_luma: false,
            direct_rendering: true,
            error_resilience: -1,
            grayscale: false,
            hurry_up: true,
            postproc_auto: false,
            postproc_quality: 0,
            retention_depth: 2,
            workaround_bugs: 1,
        }
    }
}

impl Parameters {
    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        serde_json::from_str(s).context("failed to parse decoder parameters")
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open parameters file {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse parameters file {}", path.display()))
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.acquire_retry_ms)
    }

    pub fn workaround_bugs(&self) -> i32 {
        self.workaround_bugs.clamp(0, 99)
    }

    pub fn error_resilience(&self) -> i32 {
        self.error_resilience.clamp(-1, 99)
    }

    pub fn postproc_quality(&self) -> u32 {
        self.postproc_quality.min(MAX_POSTPROC_QUALITY)
    }

    pub fn retention_depth(&self) -> usize {
        self.retention_depth.max(1)
    }

    /// Post-processing filters forced on individually.
    pub fn postproc_overrides(&self) -> PostProcMode {
        let mut mode = PostProcMode::empty();
        mode.set(PostProcMode::DEBLOCK_LUMA_V, self.deblock_luma_vertical);
        mode.set(PostProcMode::DEBLOCK_LUMA_H, self.deblock_luma_horizontal);
        mode.set(PostProcMode::DEBLOCK_CHROMA_V, self.deblock_chroma_vertical);
        mode.set(PostProcMode::DEBLOCK_CHROMA_H, self.deblock_chroma_horizontal);
        mode.set(PostProcMode::DERING_LUMA, self.dering_luma);
        mode.set(PostProcMode::DERING_CHROMA, self.dering_chroma);
        mode
    }

    /// Whether any post-processing was asked for.
    pub fn wants_postproc(&self) -> bool {
        self.postproc_quality > 0 || self.postproc_auto || !self.postproc_overrides().is_empty()
    }
}
