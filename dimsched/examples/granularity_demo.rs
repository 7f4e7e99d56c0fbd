//! Run one plugin at each granularity over a synthetic hyperstack.
//!
//! Usage: cargo run --example granularity_demo

use anyhow::Result;
use dimsched::{
    Granularity, ParamSet, ParamValue, PipelinePlugin, PluginCapability, PluginShell,
    PluginTemplate, PreviewHint, ProgressSink, RunSpec, SharedProgress,
};
use hyperstack::{Hyperstack, StackView};
use std::sync::Arc;

/// Multiplies every pixel by a `gain` parameter.
struct Gain {
    gain: f32,
}

impl PipelinePlugin for Gain {
    fn name(&self) -> &str {
        "gain"
    }

    fn run_unit(
        &mut self,
        input: Option<&StackView>,
        output: Option<&StackView>,
        _progress: &dyn ProgressSink,
        _preview: PreviewHint,
    ) -> Result<(), String> {
        let input = input.ok_or("gain needs an input")?;
        let output = output.ok_or("gain needs an output")?;
        let gain = self.gain;
        for c in 0..input.n_channels() {
            for z in 0..input.n_slices() {
                for t in 0..input.time_points() {
                    let plane = input.read_plane(c, z, t).map_err(|e| e.to_string())?;
                    output
                        .write_plane(c, z, t, plane.mapv(|v| v * gain))
                        .map_err(|e| e.to_string())?;
                }
            }
        }
        Ok(())
    }

    fn set_params(&mut self, params: &ParamSet) {
        if let Some(gain) = params.get_float("gain") {
            self.gain = gain as f32;
        }
    }
}

fn gain_template(granularity: Granularity) -> PluginTemplate {
    PluginTemplate::new(
        PluginCapability::new(granularity),
        Box::new(|| Ok(Box::new(Gain { gain: 1.0 }) as Box<dyn PipelinePlugin>)),
    )
    .with_params(ParamSet::new().set("gain", ParamValue::Float(2.0)))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let channels = vec!["dapi".to_string(), "gfp".to_string(), "rfp".to_string()];
    let input = Arc::new(Hyperstack::new("sample", 256, 256, 16, channels, 1)?);
    for c in 0..3 {
        for z in 0..16 {
            input.update_plane(c, z, 0, |p| p.fill(0.5))?;
        }
    }

    for granularity in [
        Granularity::Slice2D,
        Granularity::Volume3D,
        Granularity::Hyperstack4D,
    ] {
        let shell = PluginShell::new(gain_template(granularity));
        let progress = SharedProgress::new();
        let report = shell.run(RunSpec::new(Arc::clone(&input)), &progress)?;
        log::info!(
            "{:?}: {} unit(s), progress {}%",
            granularity,
            report.units_run,
            progress.value()
        );

        let summary = serde_json::json!({
            "granularity": format!("{:?}", granularity),
            "units_run": report.units_run,
            "output": report.output.as_ref().map(|o| o.name().to_string()),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(())
}
