//! Command distribution — forwards resolved commands to graph targets.

use crate::error::{Result, SchedulerError};
use crate::event::EventKind;
use crate::target::{GraphResolver, TargetError};

use super::command::Command;

fn target_failed(target: &str, time: f64, source: TargetError) -> SchedulerError {
    SchedulerError::Target {
        target: target.to_string(),
        time,
        source,
    }
}

/// Send one command to the node named `target`.
///
/// Note starts record the returned voice on the command. Sequence commands
/// and control kinds have no graph counterpart and pass through.
pub(crate) fn distribute(
    graph: &mut dyn GraphResolver,
    target: &str,
    command: &mut Command,
) -> Result<()> {
    let time = command.time;
    match command.kind {
        EventKind::Note | EventKind::NoteOn => {
            let node = graph
                .startable(target)
                .ok_or_else(|| SchedulerError::reference("target", target))?;
            let voice = node
                .start(time, &command.name, command.value)
                .map_err(|source| target_failed(target, time, source))?;
            command.voice = Some(voice);
        }
        EventKind::NoteOff => {
            let node = graph
                .startable(target)
                .ok_or_else(|| SchedulerError::reference("target", target))?;
            node.stop(time, &command.name, command.voice)
                .map_err(|source| target_failed(target, time, source))?;
        }
        EventKind::Param => {
            let name = command.name.as_text().unwrap_or_default();
            let param = graph
                .automatable(target, name)
                .ok_or_else(|| SchedulerError::reference("param", format!("{target}.{name}")))?;
            param
                .automate(time, command.curve, command.value, command.duration)
                .map_err(|source| target_failed(target, time, source))?;
        }
        EventKind::Sequence | EventKind::SequenceOff | EventKind::Rate | EventKind::Meter => {}
    }
    Ok(())
}
