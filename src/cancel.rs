// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Shutdown and error flags shared between a decode session and whoever drives it.
///
/// Either flag makes blocking operations of the session give up. The session raises the error
/// flag itself when it hits a fatal condition; the shutdown flag is only ever set from outside.
#[derive(Debug, Clone, Default)]
pub struct StopSignals {
    shutdown: Arc<AtomicBool>,
    error: Arc<AtomicBool>,
}

impl StopSignals {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn raise_error(&self) {
        self.error.store(true, Ordering::Release);
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn error_raised(&self) -> bool {
        self.error.load(Ordering::Acquire)
    }

    pub fn should_stop(&self) -> bool {
        self.shutdown_requested() || self.error_raised()
    }
}
