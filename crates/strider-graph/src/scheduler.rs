//! [`CycleScheduler`] – one synchronous ordered pass of the graph per
//! control tick.
//!
//! Scheduling is single-threaded and cooperative: an external clock tick
//! triggers exactly one traversal in node insertion order (estimators →
//! trajectory generators → solver → torque controller → arbitration →
//! actuator port). A link is delivered only when its source output was
//! written *fresh*; for feedback edges (source later in the order than the
//! destination) this yields the previous cycle's value, the standard
//! one-cycle delay of synchronous dataflow.

use strider_types::StriderError;
use tracing::trace;

use crate::graph::Graph;

/// Drives the assembled [`Graph`], one cycle per call.
pub struct CycleScheduler {
    graph: Graph,
    cycle: u64,
}

impl CycleScheduler {
    /// Wrap an assembled graph. Cycle numbering starts at zero.
    pub fn new(graph: Graph) -> Self {
        Self { graph, cycle: 0 }
    }

    /// The cycle index the next `run_cycle` call will execute.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Borrow the underlying graph (e.g. to read output ports or feed the
    /// device node between cycles).
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Mutably borrow the underlying graph.
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Execute one full pass: for each node in order, clear its freshness
    /// flags, deliver every fresh inbound link, then run its update rule.
    ///
    /// # Errors
    ///
    /// Propagates the first node error. Delivery errors cannot occur for
    /// links the builder resolved (shapes were validated at assembly time).
    pub fn run_cycle(&mut self) -> Result<u64, StriderError> {
        let cycle = self.cycle;
        trace!(cycle, "control cycle start");
        for idx in 0..self.graph.len() {
            self.graph.node_at_mut(idx).ports_mut().begin_cycle();
            for link in self.graph.links_into(idx) {
                let src = self.graph.node_at(link.src);
                if !src.ports().output_fresh(&link.src_port) {
                    // Source produced nothing this cycle (or runs later in
                    // the order): the destination keeps its prior value and
                    // its freshness flag stays down.
                    continue;
                }
                if let Some(value) = src.read_output(&link.src_port) {
                    self.graph
                        .node_at_mut(link.dst)
                        .write_input(&link.dst_port, value)?;
                }
            }
            self.graph.node_at_mut(idx).update(cycle)?;
        }
        self.cycle += 1;
        Ok(cycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::node::test_support::ScaleNode;
    use crate::node::{InitContext, Node};
    use strider_types::{ModelDescriptor, Value};

    fn ctx() -> InitContext {
        InitContext {
            dt: 0.001,
            model: ModelDescriptor {
                name: "test".to_string(),
                joint_count: 2,
                urdf_path: None,
            },
        }
    }

    fn two_stage() -> CycleScheduler {
        let mut b = GraphBuilder::new(ctx());
        b.add_node(Box::new(ScaleNode::new("double", 2, 2.0))).unwrap();
        b.add_node(Box::new(ScaleNode::new("triple", 2, 3.0))).unwrap();
        b.connect("double", "out", "triple", "in", true).unwrap();
        let (graph, _) = b.finish();
        CycleScheduler::new(graph)
    }

    #[test]
    fn values_flow_through_links_in_one_cycle() {
        let mut sched = two_stage();
        sched
            .graph_mut()
            .node_mut("double")
            .unwrap()
            .write_input("in", Value::Vector(vec![1.0, 2.0]))
            .unwrap();
        sched.run_cycle().unwrap();
        // double runs first (out = 2x), triple consumes it in the same pass.
        assert_eq!(
            sched.graph().node("triple").unwrap().read_output("out"),
            Some(Value::Vector(vec![6.0, 12.0]))
        );
    }

    #[test]
    fn cycle_counter_advances() {
        let mut sched = two_stage();
        assert_eq!(sched.run_cycle().unwrap(), 0);
        assert_eq!(sched.run_cycle().unwrap(), 1);
        assert_eq!(sched.cycle(), 2);
    }

    #[test]
    fn stalled_source_leaves_destination_not_fresh() {
        let mut b = GraphBuilder::new(ctx());
        let mut stalled = ScaleNode::new("stalled", 2, 2.0);
        stalled.stall = true;
        b.add_node(Box::new(stalled)).unwrap();
        b.add_node(Box::new(ScaleNode::new("sink", 2, 1.0))).unwrap();
        b.connect("stalled", "out", "sink", "in", true).unwrap();
        let (graph, _) = b.finish();
        let mut sched = CycleScheduler::new(graph);

        sched.run_cycle().unwrap();
        let sink = sched.graph().node("sink").unwrap();
        assert!(!sink.ports().input_fresh("in"));
        // Prior (default) value retained.
        assert_eq!(sink.ports().in_vec("in"), &[0.0, 0.0]);
    }

    #[test]
    fn feedback_edge_delivers_previous_cycle_value() {
        // sink is added before src, so the src→sink link is a feedback edge.
        let mut b = GraphBuilder::new(ctx());
        b.add_node(Box::new(ScaleNode::new("sink", 2, 1.0))).unwrap();
        b.add_node(Box::new(ScaleNode::new("src", 2, 2.0))).unwrap();
        b.connect("src", "out", "sink", "in", true).unwrap();
        let (graph, _) = b.finish();
        let mut sched = CycleScheduler::new(graph);

        sched
            .graph_mut()
            .node_mut("src")
            .unwrap()
            .write_input("in", Value::Vector(vec![1.0, 1.0]))
            .unwrap();

        // Cycle 0: src has not run yet when sink is visited.
        sched.run_cycle().unwrap();
        assert_eq!(
            sched.graph().node("sink").unwrap().read_output("out"),
            Some(Value::Vector(vec![0.0, 0.0]))
        );

        // src.in freshness was cleared after cycle 0, so re-feed it.
        sched
            .graph_mut()
            .node_mut("src")
            .unwrap()
            .write_input("in", Value::Vector(vec![1.0, 1.0]))
            .unwrap();

        // Cycle 1: sink sees src's cycle-0 output.
        sched.run_cycle().unwrap();
        assert_eq!(
            sched.graph().node("sink").unwrap().read_output("out"),
            Some(Value::Vector(vec![2.0, 2.0]))
        );
    }
}
