//! Simulated slider drag driving the live-update loop.
//!
//! A UI thread edits a threshold parameter at random intervals while
//! the shell keeps re-running the plugin; a consumer thread wakes once
//! per pass the way a display would redraw.
//!
//! Usage: cargo run --example live_preview

use anyhow::Result;
use dimsched::{
    CancelToken, ChangingParameter, Granularity, LiveRequest, ParamSet, PipelinePlugin,
    PluginCapability, PluginShell, PluginTemplate, PreviewHint, ProgressSink, RunSpec,
    SharedProgress,
};
use hyperstack::{Hyperstack, StackView};
use rand::Rng;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Binarises the volume against a threshold.
struct Threshold {
    level: f32,
}

impl PipelinePlugin for Threshold {
    fn name(&self) -> &str {
        "threshold"
    }

    fn run_unit(
        &mut self,
        input: Option<&StackView>,
        output: Option<&StackView>,
        _progress: &dyn ProgressSink,
        _preview: PreviewHint,
    ) -> Result<(), String> {
        let input = input.ok_or("threshold needs an input")?;
        let output = output.ok_or("threshold needs an output")?;
        let level = self.level;
        for z in 0..input.n_slices() {
            let plane = input.read_plane(0, z, 0).map_err(|e| e.to_string())?;
            output
                .write_plane(0, z, 0, plane.mapv(|v| if v > level { 1.0 } else { 0.0 }))
                .map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    fn set_params(&mut self, params: &ParamSet) {
        if let Some(level) = params.get_float("level") {
            self.level = level as f32;
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let input = Arc::new(Hyperstack::new(
        "sample",
        128,
        128,
        8,
        vec!["dapi".to_string()],
        1,
    )?);
    for z in 0..8 {
        input.update_plane(0, z, 0, |p| p.fill(0.4))?;
    }

    let param = Arc::new(ChangingParameter::new());
    param.edit(); // the user grabbed the slider

    // Simulated slider drag.
    let ui = {
        let param = Arc::clone(&param);
        thread::spawn(move || {
            let mut rng = rand::thread_rng();
            for i in 0..10 {
                thread::sleep(Duration::from_millis(rng.gen_range(5..40)));
                log::info!("ui: edit {}", i);
                param.edit();
            }
            thread::sleep(Duration::from_millis(20));
            log::info!("ui: released");
            param.finish();
        })
    };

    // Display consumer: redraw once per completed pass, until the main
    // thread trips the token after the run is over.
    let stop = CancelToken::new();
    let consumer = {
        let param = Arc::clone(&param);
        let stop = stop.clone();
        thread::spawn(move || {
            let mut seen = 0;
            loop {
                match param.wait_for_pass(seen, &stop) {
                    Ok(passes) => {
                        log::info!("display: frame {}", passes);
                        seen = passes;
                    }
                    Err(_) => break,
                }
            }
        })
    };

    let template = PluginTemplate::new(
        PluginCapability::new(Granularity::Volume3D),
        Box::new(|| Ok(Box::new(Threshold { level: 0.5 }) as Box<dyn PipelinePlugin>)),
    );
    let shell = PluginShell::new(template);
    let spec = RunSpec::new(Arc::clone(&input)).live(LiveRequest {
        param: Arc::clone(&param),
        redraw: Some(Box::new(|| log::debug!("redraw-and-wait"))),
    });

    let progress = SharedProgress::new();
    let report = shell.run(spec, &progress)?;

    ui.join().expect("ui thread panicked");
    stop.cancel();
    consumer.join().expect("consumer thread panicked");

    log::info!(
        "done: {} unit(s), {} live pass(es), progress {}%",
        report.units_run,
        report.live_passes,
        progress.value()
    );
    Ok(())
}
