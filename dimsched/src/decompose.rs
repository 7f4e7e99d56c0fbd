//! Dimensional decomposition of a hyperstack into units of work
//!
//! Given a plugin's declared granularity and the dataset's actual
//! shape, produce the ordered list of work indices with the matching
//! input/output view pair for each. Channel/output pairing is
//! positional: the i-th selected input channel is paired with the i-th
//! selected output channel; a missing output position yields a unit
//! with no output view (analysis-only plugins must tolerate that).

use crate::capability::{Granularity, PluginCapability};
use crate::error::{Result, SchedError};
use hyperstack::{Hyperstack, StackView};
use std::sync::Arc;

/// Index into a decomposition's index space: a slice number, a channel
/// ordinal, or 0 for a whole-hyperstack unit.
pub type WorkIndex = usize;

/// One independent unit of decomposed work.
#[derive(Clone, Debug)]
pub struct WorkUnit {
    pub index: WorkIndex,
    pub input: Option<StackView>,
    pub output: Option<StackView>,
}

/// Resolve selected channel names to ordinals in `stack`.
fn resolve_channels(stack: &Hyperstack, names: &[String]) -> Result<Vec<usize>> {
    names
        .iter()
        .map(|name| {
            stack.channel_index(name).ok_or_else(|| {
                SchedError::Config(format!(
                    "channel '{}' not found in stack '{}'",
                    name,
                    stack.name()
                ))
            })
        })
        .collect()
}

/// Output view paired positionally with input channel `position`.
fn paired_output(
    output: Option<&Arc<Hyperstack>>,
    out_names: &[String],
    position: usize,
) -> Result<Option<usize>> {
    let (stack, name) = match (output, out_names.get(position)) {
        (Some(stack), Some(name)) => (stack, name),
        _ => return Ok(None),
    };
    match stack.channel_index(name) {
        Some(ordinal) => Ok(Some(ordinal)),
        None => Err(SchedError::Config(format!(
            "output channel '{}' not found in stack '{}'",
            name,
            stack.name()
        ))),
    }
}

/// Split the dataset into ordered units of work at the plugin's
/// granularity.
///
/// - `Hyperstack4D`: exactly one unit covering the whole dataset.
/// - `Volume3D`: one unit per selected channel.
/// - `Slice2D`: one unit per (selected channel, depth slice), ordered
///   channel-major, so the index space size is `channels × depth`.
///
/// With no input (absent, or the `no_input` flag, or an empty channel
/// selection) the decomposer still yields one unit per selected output
/// channel — at least one — so execution is never special-cased on
/// "no input".
pub fn decompose(
    capability: PluginCapability,
    input: Option<&Arc<Hyperstack>>,
    output: Option<&Arc<Hyperstack>>,
    selected_channels: &[String],
    selected_output_channels: &[String],
) -> Result<Vec<WorkUnit>> {
    if capability.flags.only_one_input_channel && selected_channels.len() > 1 {
        return Err(SchedError::Config(format!(
            "plugin cannot run on more than 1 channel ({} selected)",
            selected_channels.len()
        )));
    }

    let input = if capability.flags.no_input { None } else { input };

    // Generator-style plugins: one unit per selected output channel,
    // defaulting to a single unit.
    let Some(input_stack) = input.filter(|_| !selected_channels.is_empty()) else {
        let n_units = selected_output_channels.len().max(1);
        let mut units = Vec::with_capacity(n_units);
        for position in 0..n_units {
            let out_view = match paired_output(output, selected_output_channels, position)? {
                Some(ordinal) => Some(StackView::channel(Arc::clone(output.unwrap()), ordinal)?),
                None => None,
            };
            units.push(WorkUnit {
                index: position,
                input: None,
                output: out_view,
            });
        }
        return Ok(units);
    };

    let channels = resolve_channels(input_stack, selected_channels)?;

    match capability.granularity {
        Granularity::Hyperstack4D => {
            let out_view = output.map(|o| StackView::whole(Arc::clone(o)));
            Ok(vec![WorkUnit {
                index: 0,
                input: Some(StackView::whole(Arc::clone(input_stack))),
                output: out_view,
            }])
        }
        Granularity::Volume3D => {
            let mut units = Vec::with_capacity(channels.len());
            for (position, &channel) in channels.iter().enumerate() {
                let out_view = match paired_output(output, selected_output_channels, position)? {
                    Some(ordinal) => {
                        Some(StackView::channel(Arc::clone(output.unwrap()), ordinal)?)
                    }
                    None => None,
                };
                units.push(WorkUnit {
                    index: position,
                    input: Some(StackView::channel(Arc::clone(input_stack), channel)?),
                    output: out_view,
                });
            }
            Ok(units)
        }
        Granularity::Slice2D => {
            let depth = input_stack.depth();
            let mut units = Vec::with_capacity(channels.len() * depth);
            for (position, &channel) in channels.iter().enumerate() {
                let out_ordinal = paired_output(output, selected_output_channels, position)?;
                for slice in 0..depth {
                    let out_view = match out_ordinal {
                        Some(ordinal) => {
                            Some(StackView::plane(Arc::clone(output.unwrap()), ordinal, slice)?)
                        }
                        None => None,
                    };
                    units.push(WorkUnit {
                        index: position * depth + slice,
                        input: Some(StackView::plane(Arc::clone(input_stack), channel, slice)?),
                        output: out_view,
                    });
                }
            }
            Ok(units)
        }
    }
}
