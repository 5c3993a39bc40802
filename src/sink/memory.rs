// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! In-memory display sink.
//!
//! Buffers are plain heap allocations and "scan-out" is whoever calls
//! [`MemorySink::display_next`]. Used by the tests and by the command line player.

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use anyhow::bail;
use log::debug;

use super::DisplaySink;
use super::FrameBuffer;
use super::SinkFactory;
use super::SinkGeometry;

/// Row alignment of the buffers allocated by memory sinks.
pub const PITCH_ALIGNMENT: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    /// Handed out by `acquire_buffer()`.
    Reserved,
    /// Presented, waiting for scan-out.
    Queued,
    /// Scanned out at least once.
    Displayed,
}

struct Slot {
    buffer: FrameBuffer,
    state: SlotState,
}

/// A picture that went through scan-out.
#[derive(Debug, Clone)]
pub struct DisplayedFrame {
    pub buffer: FrameBuffer,
    pub timestamp: u64,
}

pub struct MemorySink {
    geometry: SinkGeometry,
    slots: Vec<Slot>,
    queue: VecDeque<usize>,
    presented: u64,
    destroyed: bool,
}

impl MemorySink {
    pub fn new(geometry: SinkGeometry, buffer_count: usize) -> Self {
        let planes = geometry.chroma.planes(geometry.width, geometry.height);
        let slots = (0..buffer_count)
            .map(|id| Slot {
                buffer: FrameBuffer::new(id, &planes, PITCH_ALIGNMENT),
                state: SlotState::Free,
            })
            .collect();
        MemorySink {
            geometry,
            slots,
            queue: VecDeque::new(),
            presented: 0,
            destroyed: false,
        }
    }

    pub fn geometry(&self) -> &SinkGeometry {
        &self.geometry
    }

    fn slot_of(&self, buffer: &FrameBuffer) -> Option<usize> {
        self.slots.iter().position(|s| s.buffer.is_same(buffer))
    }

    /// Scans out the oldest presented picture.
    pub fn display_next(&mut self) -> Option<DisplayedFrame> {
        let index = self.queue.pop_front()?;
        let slot = &mut self.slots[index];
        slot.state = SlotState::Displayed;
        Some(DisplayedFrame {
            buffer: slot.buffer.clone(),
            timestamp: slot.buffer.timestamp(),
        })
    }

    /// Number of pictures presented so far.
    pub fn presented_count(&self) -> u64 {
        self.presented
    }

    /// Number of pictures presented but not scanned out yet.
    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    /// Number of buffers currently linked by a decoder.
    pub fn linked_count(&self) -> usize {
        self.slots.iter().filter(|s| s.buffer.links() > 0).count()
    }

    /// Number of buffers acquired and neither presented nor released.
    pub fn reserved_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state == SlotState::Reserved)
            .count()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl DisplaySink for MemorySink {
    fn acquire_buffer(&mut self) -> Option<FrameBuffer> {
        let slot = self.slots.iter_mut().find(|s| {
            matches!(s.state, SlotState::Free | SlotState::Displayed) && s.buffer.links() == 0
        })?;
        slot.state = SlotState::Reserved;
        Some(slot.buffer.clone())
    }

    fn release_buffer(&mut self, buffer: &FrameBuffer) {
        if let Some(index) = self.slot_of(buffer) {
            let slot = &mut self.slots[index];
            if slot.state == SlotState::Reserved {
                slot.state = SlotState::Free;
            }
        }
    }

    fn present(&mut self, buffer: &FrameBuffer, timestamp: u64) {
        let index = match self.slot_of(buffer) {
            Some(index) => index,
            None => return,
        };
        buffer.set_timestamp(timestamp);
        self.slots[index].state = SlotState::Queued;
        self.queue.push_back(index);
        self.presented += 1;
    }

    fn destroy(&mut self) {
        debug!("memory sink {} destroyed", self.geometry);
        self.destroyed = true;
        self.queue.clear();
        self.slots.clear();
    }
}

/// Creates [`MemorySink`]s and keeps a reference to each of them for inspection.
///
/// Clones share the list of created sinks.
#[derive(Clone)]
pub struct MemorySinkFactory {
    buffer_count: usize,
    failing: Arc<AtomicBool>,
    created: Arc<Mutex<Vec<Arc<Mutex<MemorySink>>>>>,
}

impl MemorySinkFactory {
    pub fn new(buffer_count: usize) -> Self {
        MemorySinkFactory {
            buffer_count,
            failing: Default::default(),
            created: Default::default(),
        }
    }

    /// Makes every following creation fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Every sink created so far, oldest first.
    pub fn sinks(&self) -> Vec<Arc<Mutex<MemorySink>>> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn created_count(&self) -> usize {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl SinkFactory for MemorySinkFactory {
    fn create_sink(
        &mut self,
        geometry: &SinkGeometry,
    ) -> anyhow::Result<Arc<Mutex<dyn DisplaySink>>> {
        if self.failing.load(Ordering::Relaxed) {
            bail!("memory sink creation disabled");
        }
        let sink = Arc::new(Mutex::new(MemorySink::new(*geometry, self.buffer_count)));
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink.clone());
        Ok(sink as Arc<Mutex<dyn DisplaySink>>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aspect::Aspect;
    use crate::format::Chroma;

    fn sink(buffer_count: usize) -> MemorySink {
        MemorySink::new(
            SinkGeometry {
                width: 20,
                height: 10,
                chroma: Chroma::I420,
                aspect: Aspect::new(2, 1),
            },
            buffer_count,
        )
    }

    #[test]
    fn buffers_are_aligned() {
        let mut sink = sink(1);
        let buffer = sink.acquire_buffer().unwrap();
        assert!(buffer
            .planes()
            .iter()
            .all(|p| p.pitch % PITCH_ALIGNMENT == 0 && p.pitch >= p.width));
    }

    #[test]
    fn pool_runs_dry_until_release() {
        let mut sink = sink(2);
        let a = sink.acquire_buffer().unwrap();
        let _b = sink.acquire_buffer().unwrap();
        assert!(sink.acquire_buffer().is_none());
        assert_eq!(sink.reserved_count(), 2);

        sink.release_buffer(&a);
        let again = sink.acquire_buffer().unwrap();
        assert!(again.is_same(&a));
    }

    #[test]
    fn displayed_buffer_is_reused_once_unlinked() {
        let mut sink = sink(1);
        let buffer = sink.acquire_buffer().unwrap();
        sink.link_buffer(&buffer);
        sink.present(&buffer, 7);
        assert!(sink.acquire_buffer().is_none());

        let shown = sink.display_next().unwrap();
        assert_eq!(shown.timestamp, 7);
        assert!(shown.buffer.is_same(&buffer));
        // Still linked.
        assert!(sink.acquire_buffer().is_none());
        assert_eq!(sink.linked_count(), 1);

        sink.unlink_buffer(&buffer);
        assert!(sink.acquire_buffer().is_some());
        assert_eq!(sink.presented_count(), 1);
    }

    #[test]
    fn queued_buffer_is_not_reused() {
        let mut sink = sink(1);
        let buffer = sink.acquire_buffer().unwrap();
        sink.present(&buffer, 1);
        assert_eq!(sink.queued_count(), 1);
        assert!(sink.acquire_buffer().is_none());
    }

    #[test]
    fn destroyed_sink_has_no_buffers() {
        let mut sink = sink(2);
        sink.destroy();
        assert!(sink.is_destroyed());
        assert!(sink.acquire_buffer().is_none());
    }

    #[test]
    fn factory_failure() {
        let mut factory = MemorySinkFactory::new(1);
        let geometry = *sink(1).geometry();
        factory.set_failing(true);
        assert!(factory.create_sink(&geometry).is_err());
        factory.set_failing(false);
        assert!(factory.create_sink(&geometry).is_ok());
        assert_eq!(factory.created_count(), 1);
    }
}
