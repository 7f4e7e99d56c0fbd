//! Plugin shell: decompose, bind, execute
//!
//! The shell is the single entry point callers use to run a plugin
//! over a hyperstack. It allocates the output stack when the caller
//! did not supply one, decomposes the dataset at the plugin's declared
//! granularity, binds plugin instances to worker slots, and drives the
//! bounded parallel range — wrapping every unit in the live-update
//! loop when a continuously-changing parameter is attached.

use crate::capability::Granularity;
use crate::decompose::decompose;
use crate::error::{Result, SchedError};
use crate::instance_pool::InstancePool;
use crate::live_loop::{LiveUpdateLoop, RedrawHook};
use crate::params::ChangingParameter;
use crate::par_range::{CancelToken, ParRange, RangeConfig};
use crate::plugin::{PluginTemplate, PreviewHint};
use crate::progress::ProgressSink;
use hyperstack::Hyperstack;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shell-level configuration.
#[derive(Clone, Debug)]
pub struct ShellConfig {
    /// Upper bound on worker threads for one run.
    pub max_threads: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        ShellConfig {
            max_threads: usize::MAX,
        }
    }
}

/// Request to keep re-running units while a parameter is being edited.
pub struct LiveRequest {
    pub param: Arc<ChangingParameter>,
    pub redraw: Option<Box<RedrawHook>>,
}

/// One invocation of the shell.
pub struct RunSpec {
    pub input: Option<Arc<Hyperstack>>,
    /// Output stack; allocated from the input's structure when absent
    /// (unless the plugin declares `no_image_output`).
    pub output: Option<Arc<Hyperstack>>,
    pub input_channels: Vec<String>,
    pub output_channels: Vec<String>,
    pub preview: PreviewHint,
    pub live: Option<LiveRequest>,
    pub cancel: CancelToken,
}

impl RunSpec {
    pub fn new(input: Arc<Hyperstack>) -> Self {
        let channels = input.channel_names().to_vec();
        RunSpec {
            input: Some(input),
            output: None,
            input_channels: channels.clone(),
            output_channels: channels,
            preview: PreviewHint::Full,
            live: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn without_input() -> Self {
        RunSpec {
            input: None,
            output: None,
            input_channels: Vec::new(),
            output_channels: Vec::new(),
            preview: PreviewHint::Full,
            live: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn channels(mut self, input: &[&str], output: &[&str]) -> Self {
        self.input_channels = input.iter().map(|s| s.to_string()).collect();
        self.output_channels = output.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn output(mut self, output: Arc<Hyperstack>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn preview(mut self, preview: PreviewHint) -> Self {
        self.preview = preview;
        self
    }

    pub fn live(mut self, live: LiveRequest) -> Self {
        self.live = Some(live);
        self
    }

    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// What a completed run did.
#[derive(Debug)]
pub struct RunReport {
    pub units_run: usize,
    pub live_passes: u64,
    /// The output stack (caller-supplied or shell-allocated).
    pub output: Option<Arc<Hyperstack>>,
}

/// Runs one registered plugin over hyperstacks at its declared
/// granularity.
pub struct PluginShell {
    template: PluginTemplate,
    config: ShellConfig,
}

impl PluginShell {
    pub fn new(template: PluginTemplate) -> Self {
        PluginShell {
            template,
            config: ShellConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ShellConfig) -> Self {
        self.config = config;
        self
    }

    fn worker_name(&self) -> &'static str {
        match self.template.capability.granularity {
            Granularity::Slice2D => "worker-2d",
            Granularity::Volume3D => "worker-3d",
            Granularity::Hyperstack4D => "worker-4d",
        }
    }

    /// Resolve the output stack: verify a caller-supplied one carries
    /// the selected channels, or allocate one shaped like the input.
    fn resolve_output(&self, spec: &RunSpec) -> Result<Option<Arc<Hyperstack>>> {
        if self.template.capability.flags.no_image_output {
            return Ok(None);
        }
        if let Some(out) = &spec.output {
            for name in &spec.output_channels {
                if out.channel_index(name).is_none() {
                    return Err(SchedError::Config(format!(
                        "supplied output stack '{}' has no channel '{}'",
                        out.name(),
                        name
                    )));
                }
            }
            return Ok(Some(Arc::clone(out)));
        }
        match &spec.input {
            Some(input) if !spec.output_channels.is_empty() => {
                let name = format!("{} output", input.name());
                let out = input.duplicate_structure(&name, &spec.output_channels)?;
                Ok(Some(Arc::new(out)))
            }
            _ => Ok(None),
        }
    }

    /// Execute the plugin over the dataset.
    ///
    /// Blocks until every decomposed unit has completed, the first
    /// failure has drained in-flight workers, or cancellation was
    /// observed. Progress reaches 100 only on success.
    pub fn run(&self, spec: RunSpec, progress: &dyn ProgressSink) -> Result<RunReport> {
        let capability = self.template.capability;
        let output = self.resolve_output(&spec)?;

        progress.set_indeterminate(true);
        progress.set_value(0);

        let units = decompose(
            capability,
            spec.input.as_ref(),
            output.as_ref(),
            &spec.input_channels,
            &spec.output_channels,
        )?;
        if units.is_empty() {
            progress.set_indeterminate(false);
            progress.set_value(100);
            return Ok(RunReport {
                units_run: 0,
                live_passes: 0,
                output,
            });
        }

        let range_config = RangeConfig {
            max_threads: self.config.max_threads,
            worker_name: self.worker_name().to_string(),
        };
        let range = ParRange::new(
            0,
            units.len() - 1,
            capability.flags.no_parallelize,
            &range_config,
        );
        let pool = InstancePool::bind(&self.template, range.n_workers())?;

        log::info!(
            "running {:?} plugin: {} units, {} workers, {} instance(s)",
            capability.granularity,
            units.len(),
            range.n_workers(),
            pool.n_instances()
        );

        let live_passes = AtomicU64::new(0);
        let preview = spec.preview;
        let live = &spec.live;
        let cancel = &spec.cancel;

        range.run(progress, cancel, |index, slot| {
            let unit = &units[index];
            let mut plugin = pool.slot(slot).lock().unwrap();
            let exec = || {
                plugin
                    .run_unit(unit.input.as_ref(), unit.output.as_ref(), progress, preview)
                    .map_err(|message| SchedError::Unit { index, message })
            };
            match live {
                Some(request) => {
                    let live_loop =
                        LiveUpdateLoop::new(&request.param, request.redraw.as_deref(), cancel);
                    let passes = live_loop.run(exec)?;
                    live_passes.fetch_add(passes, Ordering::SeqCst);
                    Ok(())
                }
                None => {
                    let mut exec = exec;
                    exec()
                }
            }
        })?;

        progress.set_value(100);
        Ok(RunReport {
            units_run: units.len(),
            live_passes: live_passes.load(Ordering::SeqCst),
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Granularity, PluginCapability};
    use crate::plugin::{ParamSet, PipelinePlugin};
    use crate::progress::SharedProgress;
    use hyperstack::StackView;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    /// Writes `1 - input` into the output, plane by plane.
    struct Invert;

    impl PipelinePlugin for Invert {
        fn name(&self) -> &str {
            "invert"
        }

        fn run_unit(
            &mut self,
            input: Option<&StackView>,
            output: Option<&StackView>,
            _progress: &dyn ProgressSink,
            _preview: PreviewHint,
        ) -> std::result::Result<(), String> {
            let input = input.ok_or("invert needs an input")?;
            let output = output.ok_or("invert needs an output")?;
            for c in 0..input.n_channels() {
                for z in 0..input.n_slices() {
                    for t in 0..input.time_points() {
                        let plane = input.read_plane(c, z, t).map_err(|e| e.to_string())?;
                        output
                            .write_plane(c, z, t, plane.mapv(|v| 1.0 - v))
                            .map_err(|e| e.to_string())?;
                    }
                }
            }
            Ok(())
        }

        fn set_params(&mut self, _params: &ParamSet) {}
    }

    fn invert_template(cap: PluginCapability) -> PluginTemplate {
        PluginTemplate::new(cap, Box::new(|| Ok(Box::new(Invert) as Box<dyn PipelinePlugin>)))
    }

    fn filled_stack(channels: usize, depth: usize, value: f32) -> Arc<Hyperstack> {
        let names = (0..channels).map(|i| format!("ch{}", i)).collect();
        let stack = Hyperstack::new("in", 6, 6, depth, names, 1).unwrap();
        for c in 0..channels {
            for z in 0..depth {
                stack.update_plane(c, z, 0, |p| p.fill(value)).unwrap();
            }
        }
        Arc::new(stack)
    }

    /// Sink recording the exact published sequence.
    #[derive(Default)]
    struct RecordingProgress {
        values: Mutex<Vec<u8>>,
    }

    impl ProgressSink for RecordingProgress {
        fn set_indeterminate(&self, _indeterminate: bool) {}
        fn set_value(&self, percent: u8) {
            self.values.lock().unwrap().push(percent);
        }
    }

    #[test]
    fn test_slice2d_run_processes_every_plane() {
        let input = filled_stack(2, 4, 0.25);
        let shell = PluginShell::new(invert_template(PluginCapability::new(Granularity::Slice2D)));
        let progress = SharedProgress::new();

        let report = shell.run(RunSpec::new(Arc::clone(&input)), &progress).unwrap();

        assert_eq!(report.units_run, 8);
        assert_eq!(progress.value(), 100);
        assert!(!progress.is_indeterminate());
        let output = report.output.unwrap();
        for c in 0..2 {
            for z in 0..4 {
                let plane = output.read_plane(c, z, 0).unwrap();
                assert!((plane[[3, 3]] - 0.75).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_every_unit_executed_exactly_once() {
        struct CountingUnits {
            seen: Arc<Mutex<Vec<usize>>>,
            next: Arc<AtomicUsize>,
        }
        // Record the distinct (channel, slice) region of each invocation.
        impl PipelinePlugin for CountingUnits {
            fn name(&self) -> &str {
                "counting"
            }
            fn run_unit(
                &mut self,
                input: Option<&StackView>,
                _output: Option<&StackView>,
                _progress: &dyn ProgressSink,
                _preview: PreviewHint,
            ) -> std::result::Result<(), String> {
                let region = input.unwrap().region();
                if let hyperstack::Region::Plane { channel, slice } = region {
                    self.seen.lock().unwrap().push(channel * 100 + slice);
                }
                self.next.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            fn set_params(&mut self, _params: &ParamSet) {}
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let template = {
            let seen = Arc::clone(&seen);
            let calls = Arc::clone(&calls);
            PluginTemplate::new(
                PluginCapability::new(Granularity::Slice2D),
                Box::new(move || {
                    Ok(Box::new(CountingUnits {
                        seen: Arc::clone(&seen),
                        next: Arc::clone(&calls),
                    }) as Box<dyn PipelinePlugin>)
                }),
            )
        };

        let input = filled_stack(3, 5, 0.0);
        let shell = PluginShell::new(template);
        shell
            .run(RunSpec::new(input), &SharedProgress::new())
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 15);
        let seen = seen.lock().unwrap();
        let unique: HashSet<_> = seen.iter().collect();
        assert_eq!(unique.len(), 15);
    }

    #[test]
    fn test_instance_isolation_one_worker_per_instance() {
        struct Tagged {
            id: usize,
            threads: Arc<Mutex<HashMap<usize, HashSet<thread::ThreadId>>>>,
        }
        impl PipelinePlugin for Tagged {
            fn name(&self) -> &str {
                "tagged"
            }
            fn run_unit(
                &mut self,
                _input: Option<&StackView>,
                _output: Option<&StackView>,
                _progress: &dyn ProgressSink,
                _preview: PreviewHint,
            ) -> std::result::Result<(), String> {
                self.threads
                    .lock()
                    .unwrap()
                    .entry(self.id)
                    .or_default()
                    .insert(thread::current().id());
                thread::sleep(Duration::from_micros(300));
                Ok(())
            }
            fn set_params(&mut self, _params: &ParamSet) {}
        }

        let threads = Arc::new(Mutex::new(HashMap::new()));
        let constructed = Arc::new(AtomicUsize::new(0));
        let template = {
            let threads = Arc::clone(&threads);
            let constructed = Arc::clone(&constructed);
            PluginTemplate::new(
                PluginCapability::new(Granularity::Slice2D).new_instance_per_worker(),
                Box::new(move || {
                    let id = constructed.fetch_add(1, Ordering::SeqCst);
                    Ok(Box::new(Tagged {
                        id,
                        threads: Arc::clone(&threads),
                    }) as Box<dyn PipelinePlugin>)
                }),
            )
        };

        let input = filled_stack(2, 16, 0.0);
        let shell = PluginShell::new(template)
            .with_config(ShellConfig { max_threads: 2 });
        shell
            .run(RunSpec::new(input), &SharedProgress::new())
            .unwrap();

        let n = constructed.load(Ordering::SeqCst);
        assert!(n >= 1 && n <= 2);
        // No instance was ever driven from two different threads.
        for (_, ids) in threads.lock().unwrap().iter() {
            assert_eq!(ids.len(), 1);
        }
    }

    #[test]
    fn test_failure_aborts_and_progress_never_reports_100() {
        struct FailAt3 {
            calls: Arc<AtomicUsize>,
        }
        impl PipelinePlugin for FailAt3 {
            fn name(&self) -> &str {
                "fail-at-3"
            }
            fn run_unit(
                &mut self,
                _input: Option<&StackView>,
                _output: Option<&StackView>,
                _progress: &dyn ProgressSink,
                _preview: PreviewHint,
            ) -> std::result::Result<(), String> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 3 {
                    return Err("synthetic failure".to_string());
                }
                Ok(())
            }
            fn set_params(&mut self, _params: &ParamSet) {}
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let template = {
            let calls = Arc::clone(&calls);
            PluginTemplate::new(
                // Single worker: deterministic claim order.
                PluginCapability::new(Granularity::Slice2D).no_parallelize(),
                Box::new(move || {
                    Ok(Box::new(FailAt3 {
                        calls: Arc::clone(&calls),
                    }) as Box<dyn PipelinePlugin>)
                }),
            )
        };

        let input = filled_stack(1, 10, 0.0);
        let progress = RecordingProgress::default();
        let shell = PluginShell::new(template);
        let err = shell
            .run(RunSpec::new(input), &progress)
            .unwrap_err();

        assert!(matches!(err, SchedError::Unit { index: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let values = progress.values.lock().unwrap();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert!(values.iter().all(|&v| v < 100));
    }

    #[test]
    fn test_progress_monotonic_and_complete_on_success() {
        let input = filled_stack(2, 8, 0.5);
        let shell = PluginShell::new(invert_template(PluginCapability::new(Granularity::Slice2D)));
        let progress = RecordingProgress::default();

        shell.run(RunSpec::new(input), &progress).unwrap();

        let values = progress.values.lock().unwrap();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*values.last().unwrap(), 100);
    }

    #[test]
    fn test_cancellation_mid_run_returns_interrupted() {
        struct Slow;
        impl PipelinePlugin for Slow {
            fn name(&self) -> &str {
                "slow"
            }
            fn run_unit(
                &mut self,
                _input: Option<&StackView>,
                _output: Option<&StackView>,
                _progress: &dyn ProgressSink,
                _preview: PreviewHint,
            ) -> std::result::Result<(), String> {
                thread::sleep(Duration::from_millis(5));
                Ok(())
            }
            fn set_params(&mut self, _params: &ParamSet) {}
        }

        let template = PluginTemplate::new(
            PluginCapability::new(Granularity::Slice2D),
            Box::new(|| Ok(Box::new(Slow) as Box<dyn PipelinePlugin>)),
        );
        let input = filled_stack(2, 32, 0.0);
        let cancel = CancelToken::new();
        let progress = SharedProgress::new();

        let canceller = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(12));
                cancel.cancel();
            })
        };

        let shell = PluginShell::new(template);
        let err = shell
            .run(
                RunSpec::new(input).cancel_token(cancel),
                &progress,
            )
            .unwrap_err();

        assert!(err.is_interrupted());
        assert!(progress.value() < 100);
        canceller.join().unwrap();
    }

    #[test]
    fn test_live_run_performs_extra_passes() {
        let param = Arc::new(ChangingParameter::new());
        param.edit();

        let input = filled_stack(1, 1, 0.5);
        let template = invert_template(PluginCapability::new(Granularity::Volume3D));
        let shell = PluginShell::new(template);

        let ui = {
            let param = Arc::clone(&param);
            thread::spawn(move || {
                // Simulated slider drag: a few edits, then release.
                for _ in 0..3 {
                    thread::sleep(Duration::from_millis(10));
                    param.edit();
                }
                thread::sleep(Duration::from_millis(10));
                param.finish();
            })
        };

        let spec = RunSpec::new(input).live(LiveRequest {
            param: Arc::clone(&param),
            redraw: None,
        });
        let report = shell.run(spec, &SharedProgress::new()).unwrap();

        ui.join().unwrap();
        assert_eq!(report.units_run, 1);
        assert!(report.live_passes >= 2);
        assert_eq!(report.live_passes, param.passes());
    }

    #[test]
    fn test_no_image_output_skips_allocation() {
        struct Analyse;
        impl PipelinePlugin for Analyse {
            fn name(&self) -> &str {
                "analyse"
            }
            fn run_unit(
                &mut self,
                input: Option<&StackView>,
                output: Option<&StackView>,
                _progress: &dyn ProgressSink,
                _preview: PreviewHint,
            ) -> std::result::Result<(), String> {
                assert!(input.is_some());
                assert!(output.is_none());
                Ok(())
            }
            fn set_params(&mut self, _params: &ParamSet) {}
        }

        let template = PluginTemplate::new(
            PluginCapability::new(Granularity::Volume3D).no_image_output(),
            Box::new(|| Ok(Box::new(Analyse) as Box<dyn PipelinePlugin>)),
        );
        let input = filled_stack(2, 3, 0.0);
        let shell = PluginShell::new(template);
        let report = shell
            .run(RunSpec::new(input), &SharedProgress::new())
            .unwrap();
        assert!(report.output.is_none());
        assert_eq!(report.units_run, 2);
    }

    #[test]
    fn test_generator_plugin_runs_once_without_input() {
        struct Generate;
        impl PipelinePlugin for Generate {
            fn name(&self) -> &str {
                "generate"
            }
            fn run_unit(
                &mut self,
                input: Option<&StackView>,
                _output: Option<&StackView>,
                _progress: &dyn ProgressSink,
                _preview: PreviewHint,
            ) -> std::result::Result<(), String> {
                assert!(input.is_none());
                Ok(())
            }
            fn set_params(&mut self, _params: &ParamSet) {}
        }

        let template = PluginTemplate::new(
            PluginCapability::new(Granularity::Volume3D).no_input(),
            Box::new(|| Ok(Box::new(Generate) as Box<dyn PipelinePlugin>)),
        );
        let shell = PluginShell::new(template);
        let report = shell
            .run(RunSpec::without_input(), &SharedProgress::new())
            .unwrap();
        assert_eq!(report.units_run, 1);
    }

    #[test]
    fn test_supplied_output_missing_channel_is_config_error() {
        let input = filled_stack(2, 3, 0.0);
        let bad_output = Arc::new(
            input
                .duplicate_structure("out", &["only-one".to_string()])
                .unwrap(),
        );
        let shell = PluginShell::new(invert_template(PluginCapability::new(Granularity::Volume3D)));
        let err = shell
            .run(
                RunSpec::new(input)
                    .output(bad_output)
                    .channels(&["ch0", "ch1"], &["ch0", "ch1"]),
                &SharedProgress::new(),
            )
            .unwrap_err();
        assert!(matches!(err, SchedError::Config(_)));
    }
}
