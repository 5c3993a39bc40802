// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Output stage of a software video decoder.
//!
//! A [`session::DecodeSession`] pulls coded frames from a [`source::Source`], runs them through a
//! [`decoder::VideoDecoder`] and delivers the resulting pictures to a display sink negotiated
//! through a shared [`sink::PresentationContext`]. Pictures are either written by the decoder
//! straight into sink-owned buffers (direct rendering) or copied and, when the sink cannot take
//! the decoder's layout, converted on the way.

pub mod aspect;
pub mod buffers;
pub mod cancel;
pub mod config;
pub mod decoder;
pub mod format;
pub mod lateness;
pub mod postproc;
pub mod session;
pub mod sink;
pub mod source;

pub use cancel::StopSignals;
pub use config::Parameters;
pub use session::DecodeSession;
pub use session::FrameOutcome;
pub use session::SessionError;
pub use session::SessionStats;
