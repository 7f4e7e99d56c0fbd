//! Plugin capability descriptors
//!
//! A capability is fixed at plugin registration: the dimensionality a
//! plugin is written against plus the execution flags the scheduler
//! honours when decomposing and parallelizing.

/// The dimensionality a plugin operates at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Granularity {
    /// Plugin is fed single (channel, slice) planes.
    Slice2D,
    /// Plugin is fed whole channel volumes.
    Volume3D,
    /// Plugin receives the whole hyperstack and iterates internally.
    Hyperstack4D,
}

/// Execution flags honoured by the scheduler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecFlags {
    /// Force a single worker regardless of configured thread count.
    pub no_parallelize: bool,
    /// Construct one fresh plugin instance per worker slot instead of
    /// sharing a single configured instance.
    pub new_instance_per_worker: bool,
    /// Error out if more than one input channel is selected.
    pub only_one_input_channel: bool,
    /// Plugin produces no image output; output views are absent.
    pub no_image_output: bool,
    /// Plugin consumes no image input (e.g. a generator); the
    /// decomposer yields one unit per selected output channel.
    pub no_input: bool,
}

/// Immutable per-plugin-type capability descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PluginCapability {
    pub granularity: Granularity,
    pub flags: ExecFlags,
}

impl PluginCapability {
    pub fn new(granularity: Granularity) -> Self {
        PluginCapability {
            granularity,
            flags: ExecFlags::default(),
        }
    }

    pub fn no_parallelize(mut self) -> Self {
        self.flags.no_parallelize = true;
        self
    }

    pub fn new_instance_per_worker(mut self) -> Self {
        self.flags.new_instance_per_worker = true;
        self
    }

    pub fn only_one_input_channel(mut self) -> Self {
        self.flags.only_one_input_channel = true;
        self
    }

    pub fn no_image_output(mut self) -> Self {
        self.flags.no_image_output = true;
        self
    }

    pub fn no_input(mut self) -> Self {
        self.flags.no_input = true;
        self
    }
}
