//! End-to-end properties of the assembled pipeline and of small graphs
//! built around the arbitration layer.

use std::sync::{Arc, Mutex};

use strider_graph::{CycleScheduler, GraphBuilder, InitContext, Node, PortSet};
use strider_manager::ControlManager;
use strider_nodes::{CtrlManagerNode, DeviceOptions};
use strider_runtime::config::RobotConfig;
use strider_runtime::topology::{assemble_pipeline, PipelineOptions};
use strider_types::{
    ArbitrationEvent, Lifecycle, ModelDescriptor, Shape, StriderError, Value,
};

// ─────────────────────────────────────────────────────────────────────────
// Test fixtures
// ─────────────────────────────────────────────────────────────────────────

/// Emits a constant command vector on `out`, optionally going silent from
/// a given cycle onward (a stalled upstream controller).
struct StubCommandSource {
    name: String,
    ports: PortSet,
    command: Vec<f64>,
    silent_from: Option<u64>,
    state: Lifecycle,
}

impl StubCommandSource {
    fn new(name: &str, command: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            ports: PortSet::new(name),
            command,
            silent_from: None,
            state: Lifecycle::Unconfigured,
        }
    }

    fn silent_from(mut self, cycle: u64) -> Self {
        self.silent_from = Some(cycle);
        self
    }
}

impl Node for StubCommandSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    fn initialize(&mut self, _ctx: &InitContext) -> Result<(), StriderError> {
        self.ports
            .declare_output("out", Shape::Vector(self.command.len()));
        self.state = Lifecycle::Initialized;
        Ok(())
    }

    fn ports(&self) -> &PortSet {
        &self.ports
    }

    fn ports_mut(&mut self) -> &mut PortSet {
        &mut self.ports
    }

    fn update(&mut self, cycle: u64) -> Result<(), StriderError> {
        if let Some(from) = self.silent_from {
            if cycle >= from {
                return Ok(());
            }
        }
        self.ports
            .set_output("out", Value::Vector(self.command.clone()))
    }
}

fn ctx(j: usize) -> InitContext {
    InitContext {
        dt: 0.001,
        model: ModelDescriptor {
            name: "testbot".to_string(),
            joint_count: j,
            urdf_path: None,
        },
    }
}

fn manager_for(j: usize, pos_limits: &[(f64, f64)], stale_limit: u32) -> ControlManager {
    let mut mgr = ControlManager::new();
    mgr.init(0.001, &ctx(j).model, 1.0, 100.0).unwrap();
    mgr.set_stale_limit(stale_limit).unwrap();
    for id in 0..j {
        let name = if id == 5 { "RLEG_5".to_string() } else { format!("J{id}") };
        mgr.set_name_to_id(&name, id).unwrap();
        let (lo, hi) = pos_limits.get(id).copied().unwrap_or((-3.14, 3.14));
        mgr.set_joint_limits_from_id(id, lo, hi).unwrap();
    }
    mgr.add_ctrl_mode("pos").unwrap();
    mgr.add_ctrl_mode("torque").unwrap();
    mgr
}

/// Stub sources for `pos` and `torque` wired into an arbitration node.
fn arbitration_graph(
    manager: ControlManager,
    pos_cmd: Vec<f64>,
    torque_src: StubCommandSource,
) -> (CycleScheduler, Arc<Mutex<ControlManager>>) {
    let j = manager.joint_count();
    let shared = Arc::new(Mutex::new(manager));
    let mut b = GraphBuilder::new(ctx(j));
    b.add_node(Box::new(StubCommandSource::new("pos_src", pos_cmd)))
        .unwrap();
    b.add_node(Box::new(torque_src)).unwrap();
    b.add_node(Box::new(CtrlManagerNode::new("ctrl_man", Arc::clone(&shared))))
        .unwrap();
    b.connect("pos_src", "out", "ctrl_man", "ctrl_pos", true).unwrap();
    b.connect("torque_src", "out", "ctrl_man", "ctrl_torque", true)
        .unwrap();
    let (graph, _) = b.finish();
    (CycleScheduler::new(graph), shared)
}

fn u_safe(scheduler: &CycleScheduler) -> Vec<f64> {
    let graph = scheduler.graph();
    let idx = graph.index_of("ctrl_man").unwrap();
    match graph.node_at(idx).read_output("u_safe") {
        Some(Value::Vector(v)) => v,
        other => panic!("u_safe: {other:?}"),
    }
}

fn test_config(j: usize) -> RobotConfig {
    let mut joints = String::new();
    for id in 0..j {
        let (name, lo, hi) = if id == 5 {
            ("RLEG_5".to_string(), -1.0, 0.3)
        } else {
            (format!("J{id}"), -3.14, 3.14)
        };
        joints.push_str(&format!(
            "[[joints]]\nname = \"{name}\"\nid = {id}\npos_min = {lo}\npos_max = {hi}\n\n"
        ));
    }
    let doc = format!(
        "dt = 0.001\n[model]\nname = \"testbot\"\njoint_count = {j}\n\n{joints}"
    );
    toml::from_str(&doc).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────
// Arbitration properties
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn randomized_commands_stay_within_limits_through_the_graph() {
    // Deterministic LCG; the same stream every run.
    let mut seed: u64 = 0x9E3779B97F4A7C15;
    let mut next = move || {
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((seed >> 33) as f64 / f64::from(u32::MAX) - 0.5) * 50.0
    };

    let limits = [(-1.0, 1.0), (-0.5, 2.0), (-2.0, 0.25)];
    for _ in 0..50 {
        let cmd: Vec<f64> = (0..3).map(|_| next()).collect();
        let mut mgr = manager_for(3, &limits, 10);
        mgr.set_ctrl_mode("all", "torque").unwrap();
        mgr.try_start().unwrap();
        let (mut scheduler, _) =
            arbitration_graph(mgr, vec![0.0; 3], StubCommandSource::new("torque_src", cmd));
        scheduler.run_cycle().unwrap();
        let out = u_safe(&scheduler);
        for (value, (lo, hi)) in out.iter().zip(limits) {
            assert!(*value >= lo && *value <= hi, "{value} escaped [{lo}, {hi}]");
        }
    }
}

#[test]
fn rleg5_torque_request_clamps_to_position_limit() {
    // 30-joint humanoid, RLEG_5 limited to [-1.0, 0.3], torque request 5.0.
    let mut limits = vec![(-3.14, 3.14); 30];
    limits[5] = (-1.0, 0.3);
    let mut mgr = manager_for(30, &limits, 10);
    mgr.set_ctrl_mode("all", "torque").unwrap();
    mgr.try_start().unwrap();

    let mut cmd = vec![0.0; 30];
    cmd[5] = 5.0;
    let (mut scheduler, shared) =
        arbitration_graph(mgr, vec![0.0; 30], StubCommandSource::new("torque_src", cmd));
    scheduler.run_cycle().unwrap();

    assert_eq!(u_safe(&scheduler)[5], 0.3);
    let events = shared.lock().unwrap().drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        ArbitrationEvent::Saturation { joint_id: 5, requested, emitted }
            if *requested == 5.0 && *emitted == 0.3
    )));
}

#[test]
fn mode_switch_applies_at_next_cycle_boundary() {
    let mut mgr = manager_for(2, &[(-10.0, 10.0), (-10.0, 10.0)], 10);
    mgr.set_ctrl_mode("all", "pos").unwrap();
    mgr.try_start().unwrap();
    let (mut scheduler, shared) = arbitration_graph(
        mgr,
        vec![1.0, 1.0],
        StubCommandSource::new("torque_src", vec![2.0, 2.0]),
    );

    scheduler.run_cycle().unwrap();
    assert_eq!(u_safe(&scheduler), vec![1.0, 1.0]);

    // Staged between cycles; the next cycle runs entirely under torque.
    shared.lock().unwrap().set_ctrl_mode("all", "torque").unwrap();
    scheduler.run_cycle().unwrap();
    assert_eq!(u_safe(&scheduler), vec![2.0, 2.0]);
}

#[test]
fn stalled_source_holds_and_notifies_exactly_once_per_joint() {
    let stale_limit = 4;
    let mut mgr = manager_for(2, &[(-10.0, 10.0), (-10.0, 10.0)], stale_limit);
    mgr.set_ctrl_mode("all", "torque").unwrap();
    mgr.try_start().unwrap();
    let (mut scheduler, shared) = arbitration_graph(
        mgr,
        vec![0.0, 0.0],
        StubCommandSource::new("torque_src", vec![3.0, -3.0]).silent_from(2),
    );

    // Two healthy cycles, then the source goes quiet for far longer than
    // the stale limit.
    for _ in 0..12 {
        scheduler.run_cycle().unwrap();
    }
    // Fail-static: last safe command held, never zeroed.
    assert_eq!(u_safe(&scheduler), vec![3.0, -3.0]);

    let degraded: Vec<_> = shared
        .lock()
        .unwrap()
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, ArbitrationEvent::SourceDegraded { .. }))
        .collect();
    assert_eq!(degraded.len(), 2);
    assert!(degraded.iter().all(|e| matches!(
        e,
        ArbitrationEvent::SourceDegraded { held_cycles, .. } if *held_cycles == stale_limit
    )));
}

// ─────────────────────────────────────────────────────────────────────────
// Assembly properties
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn required_link_failure_aborts_assembly() {
    let mut b = GraphBuilder::new(ctx(2));
    b.add_node(Box::new(StubCommandSource::new("src", vec![0.0, 0.0])))
        .unwrap();
    b.add_node(Box::new(StubCommandSource::new("other", vec![0.0, 0.0])))
        .unwrap();
    let err = b
        .connect("src", "no_such_port", "other", "out", true)
        .unwrap_err();
    assert!(matches!(err, StriderError::LinkResolution(_)));
}

#[test]
fn optional_links_degrade_and_pipeline_still_runs() {
    let options = PipelineOptions {
        device: DeviceOptions {
            hand_sensors: false,
            joint_velocities: true,
        },
        free_flyer_locator: true,
    };
    let mut pipeline = assemble_pipeline(&test_config(6), options).unwrap();
    assert_eq!(pipeline.degradations().len(), 2);
    for _ in 0..3 {
        pipeline.run_cycle().unwrap();
    }
    // Unbound hand wrench inputs hold their zero defaults.
    let graph = pipeline.graph();
    let ft = graph.index_of("ft_est").unwrap();
    assert_eq!(
        graph.node_at(ft).read_output("contact_wrench_right_hand"),
        Some(Value::Wrench([0.0; 6]))
    );
}

#[test]
fn base_source_prefers_locator_and_falls_back_to_estimator() {
    let with_locator =
        assemble_pipeline(&test_config(6), PipelineOptions::simulation()).unwrap();
    let graph = with_locator.graph();
    let balance = graph.index_of("balance").unwrap();
    let locator = graph.index_of("ff_locator").unwrap();
    assert_eq!(graph.binding(balance, "q").unwrap().src, locator);
    assert_eq!(graph.binding(balance, "v").unwrap().src, locator);

    let options = PipelineOptions {
        device: DeviceOptions {
            hand_sensors: true,
            joint_velocities: true,
        },
        free_flyer_locator: false,
    };
    let without = assemble_pipeline(&test_config(6), options).unwrap();
    let graph = without.graph();
    let balance = graph.index_of("balance").unwrap();
    let estimator = graph.index_of("base_estimator").unwrap();
    assert_eq!(graph.binding(balance, "q").unwrap().src, estimator);
    assert!(graph.index_of("ff_locator").is_none());
}

#[test]
fn conflicting_joint_ids_in_config_abort_assembly() {
    let mut config = test_config(4);
    config.joints[1].id = 0;
    let err = assemble_pipeline(&config, PipelineOptions::simulation()).unwrap_err();
    assert!(matches!(err, StriderError::Lookup(_)));
}

#[test]
fn pipeline_mode_switch_and_stop_round_trip() {
    let mut pipeline =
        assemble_pipeline(&test_config(4), PipelineOptions::simulation()).unwrap();
    pipeline.run_cycle().unwrap();
    pipeline.set_ctrl_mode("all", "torque").unwrap();
    pipeline.run_cycle().unwrap();
    {
        let manager = pipeline.manager();
        let mgr = manager.lock().unwrap();
        assert_eq!(mgr.active_mode_of(0), Some("torque"));
    }

    pipeline.stop().unwrap();
    let held = u_safe_of(&pipeline);
    pipeline.run_cycle().unwrap();
    assert_eq!(u_safe_of(&pipeline), held);
}

fn u_safe_of(pipeline: &strider_runtime::Pipeline) -> Vec<f64> {
    let graph = pipeline.graph();
    let idx = graph.index_of("ctrl_man").unwrap();
    match graph.node_at(idx).read_output("u_safe") {
        Some(Value::Vector(v)) => v,
        other => panic!("u_safe: {other:?}"),
    }
}

#[test]
fn recorder_taps_publish_during_run() {
    let mut pipeline =
        assemble_pipeline(&test_config(4), PipelineOptions::simulation()).unwrap();
    let mut sub = pipeline.recorder_mut().subscribe();
    pipeline.run_cycle().unwrap();
    let sample = sub.try_recv().unwrap();
    assert!(sample.signal.contains('.'));
    assert_eq!(sample.cycle, 0);
}
