//! [`SignalRecorder`] – best-effort tap on graph outputs.
//!
//! A [`tokio::sync::broadcast`] channel fans samples out to any number of
//! subscribers (loggers, plotters, disk writers). Publishing never blocks
//! the control cycle: with no subscriber, or a subscriber that cannot
//! keep up, samples are dropped.

use chrono::Utc;
use strider_graph::Graph;
use strider_types::{Sample, StriderError, Value};
use tokio::sync::broadcast;
use tracing::warn;

const DEFAULT_CAPACITY: usize = 1024;

/// Registered signal taps, sampled after every cycle.
pub struct SignalRecorder {
    sender: broadcast::Sender<Sample>,
    /// Parsed `(node, port)` pairs in registration order.
    taps: Vec<(String, String)>,
}

impl SignalRecorder {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            taps: Vec::new(),
        }
    }

    /// Register a tap by qualified name, `"node.port"`.
    ///
    /// # Errors
    ///
    /// `StriderError::Lookup` when the name has no dot separator.
    pub fn register_signal(&mut self, qualified: &str) -> Result<(), StriderError> {
        let Some((node, port)) = qualified.split_once('.') else {
            return Err(StriderError::Lookup(format!(
                "signal '{qualified}' is not of the form node.port"
            )));
        };
        let pair = (node.to_string(), port.to_string());
        if !self.taps.contains(&pair) {
            self.taps.push(pair);
        }
        Ok(())
    }

    /// Number of registered taps.
    pub fn tap_count(&self) -> usize {
        self.taps.len()
    }

    /// Open a new subscription. Every subscriber sees every sample
    /// published after this call, subject to channel capacity.
    pub fn subscribe(&self) -> broadcast::Receiver<Sample> {
        self.sender.subscribe()
    }

    /// Sample every registered tap from the graph and publish.
    ///
    /// Missing nodes or ports are skipped with a warning rather than
    /// failing the cycle; a tap can name a port that an optional feature
    /// left undeclared.
    pub fn record(&self, graph: &Graph, cycle: u64) {
        if self.sender.receiver_count() == 0 {
            return;
        }
        for (node_name, port) in &self.taps {
            let Some(idx) = graph.index_of(node_name) else {
                warn!(node = %node_name, "recorder tap names an unknown node");
                continue;
            };
            let value: Option<Value> = graph.node_at(idx).read_output(port);
            let Some(value) = value else { continue };
            let sample = Sample {
                signal: format!("{node_name}.{port}"),
                cycle,
                value,
                at: Utc::now(),
            };
            // Send fails only when all receivers are gone; dropping the
            // sample is the intended behavior.
            let _ = self.sender.send(sample);
        }
    }
}

impl Default for SignalRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strider_graph::{GraphBuilder, InitContext, Node};
    use strider_nodes::KinematicEstimator;
    use strider_types::ModelDescriptor;

    fn ctx(j: usize) -> InitContext {
        InitContext {
            dt: 0.001,
            model: ModelDescriptor {
                name: "sim".to_string(),
                joint_count: j,
                urdf_path: None,
            },
        }
    }

    fn one_node_graph() -> Graph {
        let mut builder = GraphBuilder::new(ctx(2));
        builder
            .add_node(Box::new(KinematicEstimator::new("kin")))
            .unwrap();
        let (graph, _) = builder.finish();
        graph
    }

    #[test]
    fn unqualified_name_rejected() {
        let mut rec = SignalRecorder::new();
        assert!(rec.register_signal("kin").is_err());
        assert!(rec.register_signal("kin.dx").is_ok());
        // Duplicate registration is a no-op.
        assert!(rec.register_signal("kin.dx").is_ok());
        assert_eq!(rec.tap_count(), 1);
    }

    #[test]
    fn samples_reach_subscribers() {
        let mut graph = one_node_graph();
        let idx = graph.index_of("kin").unwrap();
        graph.node_at_mut(idx).update(0).unwrap();

        let mut rec = SignalRecorder::new();
        rec.register_signal("kin.x_filtered").unwrap();
        let mut sub = rec.subscribe();
        rec.record(&graph, 7);

        let sample = sub.try_recv().unwrap();
        assert_eq!(sample.signal, "kin.x_filtered");
        assert_eq!(sample.cycle, 7);
    }

    #[test]
    fn no_subscriber_never_blocks_or_errors() {
        let graph = one_node_graph();
        let mut rec = SignalRecorder::new();
        rec.register_signal("kin.dx").unwrap();
        rec.record(&graph, 0);

        // Unknown node tap degrades to a warning.
        rec.register_signal("ghost.dx").unwrap();
        let _sub = rec.subscribe();
        rec.record(&graph, 1);
    }
}
