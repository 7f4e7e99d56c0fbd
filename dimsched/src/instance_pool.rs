//! Per-worker plugin instance binding
//!
//! By default every worker slot shares one configured instance; a
//! plugin that keeps mutable per-run state opts into
//! `new_instance_per_worker` and gets one fresh instance per slot,
//! each configured with the identical parameter snapshot and row.
//!
//! Within one run a slot is driven by exactly one worker, so a slot's
//! instance is never invoked concurrently. The mutex guarding each
//! slot backs that contract: a shared instance reached from several
//! slots serializes instead of racing.

use crate::error::Result;
use crate::plugin::{PipelinePlugin, PluginTemplate};
use std::sync::Mutex;

/// Maps worker slots to configured plugin instances.
pub struct InstancePool {
    slots: Vec<Mutex<Box<dyn PipelinePlugin>>>,
    shared: bool,
}

impl InstancePool {
    /// Bind instances for `n_workers` worker slots.
    ///
    /// Construction failure of any per-worker instance is a fatal
    /// configuration error; nothing is retried.
    pub fn bind(template: &PluginTemplate, n_workers: usize) -> Result<Self> {
        if template.capability.flags.new_instance_per_worker {
            let mut slots = Vec::with_capacity(n_workers);
            for _ in 0..n_workers {
                slots.push(Mutex::new(template.instantiate()?));
            }
            log::debug!("bound {} isolated plugin instances", n_workers);
            Ok(InstancePool {
                slots,
                shared: false,
            })
        } else {
            // One instance, configured exactly once before the range starts.
            let instance = template.instantiate()?;
            Ok(InstancePool {
                slots: vec![Mutex::new(instance)],
                shared: true,
            })
        }
    }

    /// The instance bound to a worker slot.
    pub fn slot(&self, worker: usize) -> &Mutex<Box<dyn PipelinePlugin>> {
        if self.shared {
            &self.slots[0]
        } else {
            &self.slots[worker]
        }
    }

    /// Number of distinct instances constructed.
    pub fn n_instances(&self) -> usize {
        self.slots.len()
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }
}
