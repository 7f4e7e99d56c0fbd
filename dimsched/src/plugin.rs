//! Plugin contract and registration template
//!
//! A plugin implements `PipelinePlugin` and is handed to the scheduler
//! as a `PluginTemplate`: its capability, a factory closure that
//! constructs fresh instances (used when per-worker isolation is
//! requested), a parameter snapshot and the pipeline row it belongs to.

use crate::capability::PluginCapability;
use crate::error::{Result, SchedError};
use crate::progress::ProgressSink;
use hyperstack::StackView;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hint passed through to the plugin for preview-quality rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreviewHint {
    /// Full-quality run.
    Full,
    /// The user is interacting; the plugin may trade quality for speed.
    Quick,
}

/// A single named parameter value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
    Toggle(bool),
}

/// Snapshot of a plugin's parameters, copied into each bound instance
/// before a run starts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSet {
    values: BTreeMap<String, ParamValue>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: &str, value: ParamValue) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn get_float(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(ParamValue::Float(v)) => Some(*v),
            Some(ParamValue::Int(v)) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ParamValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_toggle(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(ParamValue::Toggle(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Common interface for pipeline plugins.
///
/// `run_unit` is invoked once per decomposed unit of work (or once per
/// pass under the live-update loop). The views match the plugin's
/// declared granularity: a plane view for 2D plugins, a channel view
/// for 3D plugins, the whole stack for 4D plugins. Either view may be
/// absent — no input for generator plugins, no output for
/// analysis-only plugins — and the plugin must tolerate that.
pub trait PipelinePlugin: Send {
    /// Plugin name (for logging/debugging).
    fn name(&self) -> &str;

    /// Execute one unit of work.
    fn run_unit(
        &mut self,
        input: Option<&StackView>,
        output: Option<&StackView>,
        progress: &dyn ProgressSink,
        preview: PreviewHint,
    ) -> std::result::Result<(), String>;

    /// Copy a parameter snapshot into this instance.
    fn set_params(&mut self, params: &ParamSet);

    /// Rebind the pipeline row this instance reports against.
    fn set_row(&mut self, row: usize) {
        let _ = row;
    }
}

/// Factory constructing fresh plugin instances of one concrete type.
pub type PluginFactory =
    Box<dyn Fn() -> std::result::Result<Box<dyn PipelinePlugin>, String> + Send + Sync>;

/// Everything the scheduler needs to know about a registered plugin.
pub struct PluginTemplate {
    pub capability: PluginCapability,
    factory: PluginFactory,
    params: ParamSet,
    row: usize,
}

impl PluginTemplate {
    pub fn new(capability: PluginCapability, factory: PluginFactory) -> Self {
        PluginTemplate {
            capability,
            factory,
            params: ParamSet::new(),
            row: 0,
        }
    }

    pub fn with_params(mut self, params: ParamSet) -> Self {
        self.params = params;
        self
    }

    pub fn with_row(mut self, row: usize) -> Self {
        self.row = row;
        self
    }

    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    pub fn row(&self) -> usize {
        self.row
    }

    /// Construct and configure one instance. Factory failure is a fatal
    /// configuration error, never retried.
    pub fn instantiate(&self) -> Result<Box<dyn PipelinePlugin>> {
        let mut plugin = (self.factory)()
            .map_err(|e| SchedError::Config(format!("plugin construction failed: {}", e)))?;
        plugin.set_params(&self.params);
        plugin.set_row(self.row);
        Ok(plugin)
    }
}

impl std::fmt::Debug for PluginTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginTemplate")
            .field("capability", &self.capability)
            .field("params", &self.params)
            .field("row", &self.row)
            .finish()
    }
}
