// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::sync::PoisonError;

use log::debug;

use super::SinkFactory;
use super::SinkGeometry;
use super::SinkHandle;
use super::SinkId;

/// Identifies one pipeline among those sharing a presentation context.
pub type PipelineId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Owner {
    /// Left behind by a finished pipeline, free to be picked up by another one.
    Context,
    Pipeline(PipelineId),
}

pub(crate) struct Attached {
    pub(crate) handle: SinkHandle,
    pub(crate) owner: Owner,
}

/// Sinks of a context and the factory creating new ones.
pub(crate) struct Registry {
    factory: Box<dyn SinkFactory>,
    sinks: Vec<Attached>,
    next_sink_id: SinkId,
}

impl Registry {
    /// Index of the sink attached to `pipeline`.
    pub(crate) fn owned_by(&self, pipeline: PipelineId) -> Option<usize> {
        self.sinks
            .iter()
            .position(|s| s.owner == Owner::Pipeline(pipeline))
    }

    /// Index of a sink no pipeline is attached to.
    pub(crate) fn unowned(&self) -> Option<usize> {
        self.sinks.iter().position(|s| s.owner == Owner::Context)
    }

    pub(crate) fn get(&self, index: usize) -> &Attached {
        &self.sinks[index]
    }

    pub(crate) fn attach(&mut self, index: usize, pipeline: PipelineId) -> SinkHandle {
        let attached = &mut self.sinks[index];
        attached.owner = Owner::Pipeline(pipeline);
        attached.handle.clone()
    }

    /// Unregisters and destroys the sink at `index`.
    pub(crate) fn destroy(&mut self, index: usize) {
        let attached = self.sinks.remove(index);
        debug!(
            "destroying sink {} ({})",
            attached.handle.id(),
            attached.handle.geometry()
        );
        attached.handle.lock().destroy();
    }

    pub(crate) fn create(
        &mut self,
        geometry: &SinkGeometry,
        pipeline: PipelineId,
    ) -> anyhow::Result<SinkHandle> {
        let sink = self.factory.create_sink(geometry)?;
        let handle = SinkHandle::new(self.next_sink_id, *geometry, sink);
        self.next_sink_id += 1;
        self.sinks.push(Attached {
            handle: handle.clone(),
            owner: Owner::Pipeline(pipeline),
        });
        Ok(handle)
    }
}

/// Set of display sinks shared by every pipeline of a presentation subsystem.
///
/// All attach, detach, create and destroy operations happen under one lock, so two pipelines
/// negotiating at the same time never observe a sink halfway between owners.
pub struct PresentationContext {
    registry: Mutex<Registry>,
    next_pipeline: AtomicU64,
}

impl PresentationContext {
    pub fn new<F: SinkFactory + 'static>(factory: F) -> Self {
        PresentationContext {
            registry: Mutex::new(Registry {
                factory: Box::new(factory),
                sinks: Vec::new(),
                next_sink_id: 0,
            }),
            next_pipeline: AtomicU64::new(0),
        }
    }

    pub fn register_pipeline(&self) -> PipelineId {
        self.next_pipeline.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn with_registry<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> R {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut registry)
    }

    /// Detaches `sink` from `pipeline` and leaves it to the context, so that a later pipeline
    /// with the same geometry can pick it up instead of creating a new one.
    pub fn release_to_context(&self, pipeline: PipelineId, sink: &SinkHandle) {
        self.with_registry(|registry| {
            if let Some(attached) = registry
                .sinks
                .iter_mut()
                .find(|s| s.handle.id() == sink.id() && s.owner == Owner::Pipeline(pipeline))
            {
                debug!("handing sink {} back to the context", sink.id());
                attached.owner = Owner::Context;
            }
        })
    }

    /// The sink currently attached to `pipeline`.
    pub fn sink_of(&self, pipeline: PipelineId) -> Option<SinkHandle> {
        self.with_registry(|registry| {
            registry
                .owned_by(pipeline)
                .map(|index| registry.sinks[index].handle.clone())
        })
    }

    /// Sinks no pipeline is attached to.
    pub fn unowned_sinks(&self) -> Vec<SinkHandle> {
        self.with_registry(|registry| {
            registry
                .sinks
                .iter()
                .filter(|s| s.owner == Owner::Context)
                .map(|s| s.handle.clone())
                .collect()
        })
    }

    pub fn sink_count(&self) -> usize {
        self.with_registry(|registry| registry.sinks.len())
    }

    /// Destroys every sink no pipeline is attached to.
    pub fn destroy_unowned(&self) {
        self.with_registry(|registry| {
            while let Some(index) = registry.unowned() {
                registry.destroy(index);
            }
        })
    }
}
