//! Dimensional-decomposition scheduler for image pipeline plugins
//!
//! Pipeline plugins are written against one of three fixed
//! dimensionalities — a 2D slice, a 3D channel volume, or the full 4D
//! hyperstack — while the underlying data is always a 5D
//! [`hyperstack::Hyperstack`]. This crate takes a plugin declared at
//! one granularity, splits the actual dataset into independent units
//! of work at that granularity, and executes those units with bounded
//! parallelism:
//!
//! 1. [`decompose`] turns a capability plus channel selections into an
//!    ordered list of work units with paired input/output views.
//! 2. [`InstancePool`] binds one shared plugin instance, or one fresh
//!    instance per worker when the plugin requires isolation.
//! 3. [`ParRange`] drives the units across a bounded set of worker
//!    threads pulling from a shared cursor, with cooperative
//!    cancellation and abort-on-first-failure.
//! 4. [`LiveUpdateLoop`] keeps re-running a unit back-to-back while a
//!    [`ChangingParameter`] reports that the user is still dragging,
//!    handing each finished pass off to a display consumer.
//!
//! [`PluginShell`] composes all of the above behind a single `run`
//! call; progress is published to a caller-supplied [`ProgressSink`].

pub mod capability;
pub mod decompose;
pub mod error;
pub mod instance_pool;
pub mod live_loop;
pub mod params;
pub mod par_range;
pub mod plugin;
pub mod progress;
pub mod shell;

pub use capability::{ExecFlags, Granularity, PluginCapability};
pub use decompose::{decompose, WorkIndex, WorkUnit};
pub use error::{Result, SchedError};
pub use instance_pool::InstancePool;
pub use live_loop::{LiveUpdateLoop, RedrawHook};
pub use params::ChangingParameter;
pub use par_range::{CancelToken, ParRange, RangeConfig};
pub use plugin::{ParamSet, ParamValue, PipelinePlugin, PluginFactory, PluginTemplate, PreviewHint};
pub use progress::{LogProgress, NoopProgress, ProgressSink, SharedProgress};
pub use shell::{LiveRequest, PluginShell, RunReport, RunSpec, ShellConfig};
