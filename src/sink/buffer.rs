// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use chroma::PlaneMut;
use chroma::PlaneRef;

use crate::format::PlaneSize;

/// Placement of one plane inside a frame buffer's pixel storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    pub offset: usize,
    /// Bytes between two rows. Sinks usually pad this past `width` for alignment.
    pub pitch: usize,
    pub width: usize,
    pub lines: usize,
}

struct Inner {
    id: usize,
    planes: Vec<PlaneLayout>,
    pixels: Mutex<Vec<u8>>,
    links: AtomicUsize,
    timestamp: AtomicU64,
}

/// A picture buffer allocated by a display sink.
///
/// Clones refer to the same storage. The link count tracks how many holders besides the sink
/// need the buffer to stay untouched; sinks must not hand out a buffer with a non-zero count.
#[derive(Clone)]
pub struct FrameBuffer(Arc<Inner>);

fn align_up(v: usize, alignment: usize) -> usize {
    match alignment {
        0 | 1 => v,
        a => (v + a - 1) / a * a,
    }
}

impl FrameBuffer {
    /// Allocates a zeroed buffer for `planes`, padding each row to a multiple of `alignment`.
    pub fn new(id: usize, planes: &[PlaneSize], alignment: usize) -> Self {
        let mut offset = 0;
        let planes: Vec<PlaneLayout> = planes
            .iter()
            .map(|plane| {
                let layout = PlaneLayout {
                    offset,
                    pitch: align_up(plane.width, alignment),
                    width: plane.width,
                    lines: plane.lines,
                };
                offset += layout.pitch * layout.lines;
                layout
            })
            .collect();

        FrameBuffer(Arc::new(Inner {
            id,
            planes,
            pixels: Mutex::new(vec![0u8; offset]),
            links: AtomicUsize::new(0),
            timestamp: AtomicU64::new(0),
        }))
    }

    pub fn id(&self) -> usize {
        self.0.id
    }

    pub fn planes(&self) -> &[PlaneLayout] {
        &self.0.planes
    }

    /// Whether `self` and `other` share storage.
    pub fn is_same(&self, other: &FrameBuffer) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Runs `f` with read-only views of every plane.
    pub fn with_planes<R>(&self, f: impl FnOnce(&[PlaneRef]) -> R) -> R {
        let pixels = self.0.pixels.lock().unwrap_or_else(PoisonError::into_inner);
        let planes: Vec<PlaneRef> = self
            .0
            .planes
            .iter()
            .map(|layout| PlaneRef {
                data: &pixels[layout.offset..layout.offset + layout.pitch * layout.lines],
                stride: layout.pitch,
                width: layout.width,
                lines: layout.lines,
            })
            .collect();
        f(&planes)
    }

    /// Runs `f` with writable views of every plane.
    pub fn with_planes_mut<R>(&self, f: impl FnOnce(&mut [PlaneMut]) -> R) -> R {
        let mut pixels = self.0.pixels.lock().unwrap_or_else(PoisonError::into_inner);
        let mut rest: &mut [u8] = &mut pixels[..];
        let mut planes = Vec::with_capacity(self.0.planes.len());
        for layout in &self.0.planes {
            let (data, tail) = std::mem::take(&mut rest).split_at_mut(layout.pitch * layout.lines);
            rest = tail;
            planes.push(PlaneMut {
                data,
                pitch: layout.pitch,
                width: layout.width,
                lines: layout.lines,
            });
        }
        f(&mut planes)
    }

    pub fn links(&self) -> usize {
        self.0.links.load(Ordering::Acquire)
    }

    pub fn link(&self) {
        self.0.links.fetch_add(1, Ordering::AcqRel);
    }

    /// Drops one link. Unbalanced calls are ignored.
    pub fn unlink(&self) {
        let _ = self
            .0
            .links
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |links| {
                links.checked_sub(1)
            });
    }

    pub fn timestamp(&self) -> u64 {
        self.0.timestamp.load(Ordering::Acquire)
    }

    pub fn set_timestamp(&self, timestamp: u64) {
        self.0.timestamp.store(timestamp, Ordering::Release);
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("id", &self.0.id)
            .field("links", &self.links())
            .field("timestamp", &self.timestamp())
            .finish()
    }
}
