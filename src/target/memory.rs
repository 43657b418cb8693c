//! In-memory graph — records every collaborator call in order.
//!
//! Used by tests and the demo binary. Parameters keep a real automation
//! list, so values scheduled through the sequencer can be read back.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use tracing::trace;

use super::{Automatable, GraphResolver, MeterAware, Startable, TargetError, VoiceHandle};
use crate::automation::{self, AutomationEvent, Curve, EXPONENTIAL_FLOOR};
use crate::event::Arg;
use crate::sequence::SequenceData;

/// One recorded collaborator call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Start {
        target: String,
        time: f64,
        name: Arg,
        value: f64,
        voice: VoiceHandle,
    },
    Stop {
        target: String,
        time: f64,
        name: Arg,
        voice: Option<VoiceHandle>,
    },
    Automate {
        target: String,
        param: String,
        time: f64,
        curve: Curve,
        value: f64,
        duration: f64,
    },
    Meter {
        target: String,
        time: f64,
        bar: u32,
        subdivision: u32,
    },
}

impl Call {
    pub fn time(&self) -> f64 {
        match self {
            Call::Start { time, .. }
            | Call::Stop { time, .. }
            | Call::Automate { time, .. }
            | Call::Meter { time, .. } => *time,
        }
    }
}

type CallLog = Rc<RefCell<Vec<Call>>>;

struct MemoryParam {
    node: String,
    name: String,
    events: Vec<AutomationEvent>,
    log: CallLog,
}

impl Automatable for MemoryParam {
    fn automate(
        &mut self,
        time: f64,
        curve: Curve,
        value: f64,
        duration: f64,
    ) -> Result<(), TargetError> {
        trace!(node = %self.node, param = %self.name, time, %curve, value, "automate");
        let event = AutomationEvent {
            time,
            value,
            curve,
            duration,
        };
        automation::insert(&mut self.events, event);
        self.log.borrow_mut().push(Call::Automate {
            target: self.node.clone(),
            param: self.name.clone(),
            time,
            curve,
            value,
            duration,
        });
        Ok(())
    }

    fn value_at_time(&self, time: f64) -> f64 {
        automation::value_at(&self.events, time, EXPONENTIAL_FLOOR)
    }
}

struct MemoryNode {
    id: String,
    params: HashMap<String, MemoryParam>,
    playing: Vec<(VoiceHandle, Arg)>,
    next_voice: u64,
    rejecting: bool,
    log: CallLog,
}

impl Startable for MemoryNode {
    fn start(&mut self, time: f64, name: &Arg, value: f64) -> Result<VoiceHandle, TargetError> {
        if self.rejecting {
            return Err(TargetError::Rejected(format!("{} is not accepting notes", self.id)));
        }
        let voice = VoiceHandle(self.next_voice);
        self.next_voice += 1;
        self.playing.push((voice, name.clone()));
        trace!(node = %self.id, time, %name, value, "start");
        self.log.borrow_mut().push(Call::Start {
            target: self.id.clone(),
            time,
            name: name.clone(),
            value,
            voice,
        });
        Ok(voice)
    }

    fn stop(
        &mut self,
        time: f64,
        name: &Arg,
        voice: Option<VoiceHandle>,
    ) -> Result<(), TargetError> {
        let index = match voice {
            Some(voice) => self.playing.iter().position(|(v, _)| *v == voice),
            None => self.playing.iter().rposition(|(_, n)| n == name),
        };
        let Some(index) = index else {
            return Err(TargetError::NoVoice(name.to_string()));
        };
        self.playing.remove(index);
        trace!(node = %self.id, time, %name, "stop");
        self.log.borrow_mut().push(Call::Stop {
            target: self.id.clone(),
            time,
            name: name.clone(),
            voice,
        });
        Ok(())
    }
}

impl MeterAware for MemoryNode {
    fn meter_changed(&mut self, time: f64, bar: u32, subdivision: u32) -> Result<(), TargetError> {
        self.log.borrow_mut().push(Call::Meter {
            target: self.id.clone(),
            time,
            bar,
            subdivision,
        });
        Ok(())
    }
}

/// A graph of recording nodes and registered sequences.
#[derive(Default)]
pub struct MemoryGraph {
    nodes: HashMap<String, MemoryNode>,
    sequences: HashMap<String, Arc<SequenceData>>,
    log: CallLog,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node with the named automatable parameters.
    pub fn add_node(&mut self, id: &str, params: &[&str]) -> &mut Self {
        let params = params
            .iter()
            .map(|name| {
                let param = MemoryParam {
                    node: id.to_string(),
                    name: name.to_string(),
                    events: Vec::new(),
                    log: self.log.clone(),
                };
                (name.to_string(), param)
            })
            .collect();
        self.nodes.insert(
            id.to_string(),
            MemoryNode {
                id: id.to_string(),
                params,
                playing: Vec::new(),
                next_voice: 0,
                rejecting: false,
                log: self.log.clone(),
            },
        );
        self
    }

    /// Register a sequence resolvable by its id.
    pub fn add_sequence(&mut self, data: SequenceData) -> &mut Self {
        self.sequences.insert(data.id.clone(), Arc::new(data));
        self
    }

    /// Make a node refuse every start.
    pub fn set_rejecting(&mut self, id: &str, rejecting: bool) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.rejecting = rejecting;
        }
    }

    /// Every call recorded so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().clone()
    }

    /// Drain the recorded calls.
    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut *self.log.borrow_mut())
    }

    /// Voices started and not yet stopped on `id`.
    pub fn playing(&self, id: &str) -> usize {
        self.nodes.get(id).map_or(0, |n| n.playing.len())
    }

    /// Read back a parameter's automated value.
    pub fn param_value(&self, id: &str, param: &str, time: f64) -> Option<f64> {
        let param = self.nodes.get(id)?.params.get(param)?;
        Some(param.value_at_time(time))
    }
}

impl GraphResolver for MemoryGraph {
    fn startable(&mut self, id: &str) -> Option<&mut dyn Startable> {
        self.nodes.get_mut(id).map(|n| n as &mut dyn Startable)
    }

    fn automatable(&mut self, id: &str, param: &str) -> Option<&mut dyn Automatable> {
        self.nodes
            .get_mut(id)?
            .params
            .get_mut(param)
            .map(|p| p as &mut dyn Automatable)
    }

    fn meter_aware(&mut self, id: &str) -> Option<&mut dyn MeterAware> {
        self.nodes.get_mut(id).map(|n| n as &mut dyn MeterAware)
    }

    fn sequence(&self, id: &str) -> Option<Arc<SequenceData>> {
        self.sequences.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> MemoryGraph {
        let mut graph = MemoryGraph::new();
        graph.add_node("synth", &["gain"]);
        graph
    }

    #[test]
    fn start_and_paired_stop() {
        let mut graph = graph();
        let node = graph.startable("synth").unwrap();
        let voice = node.start(0.0, &Arg::from(60), 1.0).unwrap();
        node.stop(0.5, &Arg::from(60), Some(voice)).unwrap();
        assert_eq!(graph.playing("synth"), 0);
        assert_eq!(graph.calls().len(), 2);
    }

    #[test]
    fn unpaired_stop_finds_latest_voice_by_name() {
        let mut graph = graph();
        let node = graph.startable("synth").unwrap();
        node.start(0.0, &Arg::from(60), 1.0).unwrap();
        node.start(0.1, &Arg::from(60), 1.0).unwrap();
        node.stop(0.5, &Arg::from(60), None).unwrap();
        assert_eq!(graph.playing("synth"), 1);
    }

    #[test]
    fn stop_without_voice_fails() {
        let mut graph = graph();
        let node = graph.startable("synth").unwrap();
        let err = node.stop(0.0, &Arg::from("c4"), None).unwrap_err();
        assert_eq!(err, TargetError::NoVoice("c4".into()));
    }

    #[test]
    fn rejecting_node_refuses_starts() {
        let mut graph = graph();
        graph.set_rejecting("synth", true);
        let node = graph.startable("synth").unwrap();
        assert!(node.start(0.0, &Arg::from(60), 1.0).is_err());
        assert!(graph.calls().is_empty());
    }

    #[test]
    fn automation_reads_back() {
        let mut graph = graph();
        let gain = graph.automatable("synth", "gain").unwrap();
        gain.automate(0.0, Curve::Step, 0.0, 0.0).unwrap();
        gain.automate(2.0, Curve::Linear, 1.0, 0.0).unwrap();
        assert_eq!(graph.param_value("synth", "gain", 1.0), Some(0.5));
        assert!(graph.automatable("synth", "cutoff").is_none());
        assert!(graph.startable("drums").is_none());
    }

    #[test]
    fn take_calls_drains_log() {
        let mut graph = graph();
        graph
            .meter_aware("synth")
            .unwrap()
            .meter_changed(0.0, 3, 1)
            .unwrap();
        assert_eq!(graph.take_calls().len(), 1);
        assert!(graph.calls().is_empty());
    }
}
