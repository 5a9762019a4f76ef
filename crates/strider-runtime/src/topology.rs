//! Pipeline assembly: from a validated [`RobotConfig`] to a ready
//! [`Pipeline`].
//!
//! [`assemble_pipeline`] builds every node in dependency order, issues the
//! canonical link set and configures the safety arbitration manager from
//! the config tables. Two link destinations are resolved as ordered
//! capability probes rather than fixed bindings:
//!
//! - the inner controllers' `joints_velocities`: ground truth from the
//!   device when the platform provides it, else the numerical estimate;
//! - the balance controller's base pose/velocity: the kinematic locator
//!   when present, else the sensor-fusion estimator.
//!
//! Failed optional links never abort assembly; they are returned as
//! degradation records on the pipeline.

use std::path::Path;
use std::sync::{Arc, Mutex};

use strider_graph::{CycleScheduler, Degradation, GraphBuilder, InitContext};
use strider_manager::ControlManager;
use strider_nodes::{
    AdmittanceController, AttitudeFilter, BalanceController, BalanceGains, BaseEstimator,
    CtrlManagerNode, DeviceNode, DeviceOptions, EncoderSelector, ForceTorqueEstimator,
    FreeFlyerLocator, ImuOffsetCompensation, JointTorqueController, JointTrajectoryGenerator,
    KinematicEstimator, NdTrajectoryGenerator, PositionController,
};
use strider_types::{ArbitrationEvent, StriderError};
use tracing::info;

use crate::config::RobotConfig;
use crate::recorder::SignalRecorder;

/// Platform capabilities, fixed before assembly.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    pub device: DeviceOptions,
    /// Whether the kinematic free-flyer locator runs on this platform.
    pub free_flyer_locator: bool,
}

impl PipelineOptions {
    /// Simulation profile: every optional capability present.
    pub fn simulation() -> Self {
        Self {
            device: DeviceOptions {
                hand_sensors: true,
                joint_velocities: true,
            },
            free_flyer_locator: true,
        }
    }
}

/// An assembled, running control pipeline.
pub struct Pipeline {
    scheduler: CycleScheduler,
    manager: Arc<Mutex<ControlManager>>,
    recorder: SignalRecorder,
    degradations: Vec<Degradation>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Run one control cycle and sample the recorder taps.
    pub fn run_cycle(&mut self) -> Result<u64, StriderError> {
        let cycle = self.scheduler.run_cycle()?;
        self.recorder.record(self.scheduler.graph(), cycle);
        Ok(cycle)
    }

    /// Stage a control-mode switch; it takes effect at the top of the
    /// next cycle.
    pub fn set_ctrl_mode(&mut self, selector: &str, mode: &str) -> Result<(), StriderError> {
        self.lock_manager()?.set_ctrl_mode(selector, mode)
    }

    /// Freeze the arbitration layer on its last safe command.
    pub fn stop(&mut self) -> Result<(), StriderError> {
        self.lock_manager()?.stop();
        Ok(())
    }

    /// Take the arbitration events accumulated since the last drain.
    pub fn drain_events(&mut self) -> Result<Vec<ArbitrationEvent>, StriderError> {
        Ok(self.lock_manager()?.drain_events())
    }

    /// Optional-link degradations recorded during assembly.
    pub fn degradations(&self) -> &[Degradation] {
        &self.degradations
    }

    pub fn manager(&self) -> Arc<Mutex<ControlManager>> {
        Arc::clone(&self.manager)
    }

    pub fn graph(&self) -> &strider_graph::Graph {
        self.scheduler.graph()
    }

    pub fn graph_mut(&mut self) -> &mut strider_graph::Graph {
        self.scheduler.graph_mut()
    }

    pub fn recorder_mut(&mut self) -> &mut SignalRecorder {
        &mut self.recorder
    }

    fn lock_manager(&self) -> Result<std::sync::MutexGuard<'_, ControlManager>, StriderError> {
        self.manager
            .lock()
            .map_err(|_| StriderError::Config("control manager lock poisoned".to_string()))
    }
}

/// Load, validate and assemble in one step.
pub fn assemble_from_path(
    path: &Path,
    options: PipelineOptions,
) -> Result<Pipeline, StriderError> {
    let config = RobotConfig::load_from(path)?;
    assemble_pipeline(&config, options)
}

/// Build the full control pipeline.
///
/// # Errors
///
/// `StriderError::Config` for invalid tables and `StriderError::
/// LinkResolution` when a required link cannot be resolved; either aborts
/// before anything runs.
pub fn assemble_pipeline(
    config: &RobotConfig,
    options: PipelineOptions,
) -> Result<Pipeline, StriderError> {
    config.validate()?;
    let j = config.model.joint_count;
    let ctx = InitContext {
        dt: config.dt,
        model: config.model_descriptor(),
    };
    let manager = Arc::new(Mutex::new(configure_manager(config)?));

    let mut b = GraphBuilder::new(ctx);

    // Sensor side.
    b.add_node(Box::new(DeviceNode::new("device", options.device)))?;
    b.add_node(Box::new(EncoderSelector::encoders("encoders")))?;
    b.add_node(Box::new(ImuOffsetCompensation::new("imu_offset")))?;
    b.add_node(Box::new(AttitudeFilter::new("imu_filter")))?;
    b.add_node(Box::new(KinematicEstimator::new("estimator_kin")))?;

    let mut ft_est = ForceTorqueEstimator::new("ft_est");
    if !config.torque_loop.torque_to_current.is_empty() {
        ft_est.set_torque_constants(&config.torque_loop.torque_to_current);
    }
    b.add_node(Box::new(ft_est))?;

    b.add_node(Box::new(BaseEstimator::new("base_estimator")))?;
    if options.free_flyer_locator {
        b.add_node(Box::new(FreeFlyerLocator::new("ff_locator")))?;
    }

    // Reference side.
    b.add_node(Box::new(JointTrajectoryGenerator::new("traj_gen")))?;
    b.add_node(Box::new(NdTrajectoryGenerator::fixed("com_traj_gen", 3)))?;
    b.add_node(Box::new(NdTrajectoryGenerator::fixed("rf_traj_gen", 6)))?;
    b.add_node(Box::new(NdTrajectoryGenerator::fixed("lf_traj_gen", 6)))?;

    b.add_node(Box::new(BalanceController::new(
        "balance",
        balance_gains(config)?,
    )))?;

    // Inner loops.
    let mut torque_ctrl = JointTorqueController::new("torque_ctrl");
    if !config.torque_loop.torque_to_current.is_empty() {
        torque_ctrl.set_torque_to_current(&config.torque_loop.torque_to_current);
    }
    if !config.torque_loop.kp_torque.is_empty() {
        torque_ctrl.set_kp_torque(&config.torque_loop.kp_torque);
    }
    if !config.torque_loop.current_max.is_empty() {
        torque_ctrl.set_current_max(&config.torque_loop.current_max);
    }
    b.add_node(Box::new(torque_ctrl))?;

    let mut pos_ctrl = PositionController::new("pos_ctrl");
    pos_ctrl.set_gains(
        &config.position_loop.kp,
        &config.position_loop.ki,
        &config.position_loop.kd,
    );
    pos_ctrl.set_output_limit(config.position_loop.output_limit);
    b.add_node(Box::new(pos_ctrl))?;

    b.add_node(Box::new(AdmittanceController::new("adm_ctrl")))?;
    b.add_node(Box::new(CtrlManagerNode::new(
        "ctrl_man",
        Arc::clone(&manager),
    )))?;

    wire(&mut b, options)?;

    {
        let mut mgr = manager
            .lock()
            .map_err(|_| StriderError::Config("control manager lock poisoned".to_string()))?;
        mgr.try_start()?;
    }

    let mut recorder = SignalRecorder::new();
    recorder.register_signal("ctrl_man.u_safe")?;
    recorder.register_signal("balance.tau_des")?;
    recorder.register_signal("estimator_kin.dx")?;

    let (graph, degradations) = b.finish();
    info!(
        robot = %config.model.name,
        joints = j,
        nodes = graph.len(),
        links = graph.links().len(),
        degraded = degradations.len(),
        "pipeline assembled"
    );
    Ok(Pipeline {
        scheduler: CycleScheduler::new(graph),
        manager,
        recorder,
        degradations,
    })
}

/// Issue the canonical link set.
fn wire(b: &mut GraphBuilder, options: PipelineOptions) -> Result<(), StriderError> {
    // Encoder and IMU conditioning.
    b.connect("device", "robot_state", "encoders", "sin", true)?;
    b.connect("device", "accelerometer", "imu_offset", "accelerometer_in", true)?;
    b.connect("device", "gyrometer", "imu_offset", "gyrometer_in", true)?;
    b.connect("imu_offset", "accelerometer_out", "imu_filter", "accelerometer", true)?;
    b.connect("imu_offset", "gyrometer_out", "imu_filter", "gyroscope", true)?;
    b.connect("encoders", "sout", "estimator_kin", "x", true)?;

    // Force/torque estimation: feet are mandatory, hands depend on the
    // platform.
    b.connect("estimator_kin", "x_filtered", "ft_est", "q_filtered", true)?;
    b.connect("estimator_kin", "dx", "ft_est", "dq_filtered", true)?;
    b.connect("estimator_kin", "ddx", "ft_est", "ddq_filtered", true)?;
    b.connect("device", "force_rleg", "ft_est", "ft_right_foot", true)?;
    b.connect("device", "force_lleg", "ft_est", "ft_left_foot", true)?;
    b.connect("device", "force_rarm", "ft_est", "ft_right_hand", false)?;
    b.connect("device", "force_larm", "ft_est", "ft_left_hand", false)?;
    b.connect("device", "currents", "ft_est", "currents", true)?;

    // Base providers.
    b.connect("estimator_kin", "x_filtered", "base_estimator", "joint_positions", true)?;
    b.connect("estimator_kin", "dx", "base_estimator", "joint_velocities", true)?;
    b.connect("imu_filter", "imu_quat", "base_estimator", "imu_quat", true)?;
    b.connect("ft_est", "contact_wrench_right_sole", "base_estimator", "wrench_right_foot", true)?;
    b.connect("ft_est", "contact_wrench_left_sole", "base_estimator", "wrench_left_foot", true)?;
    if options.free_flyer_locator {
        b.connect("estimator_kin", "x_filtered", "ff_locator", "joint_positions", true)?;
        b.connect("estimator_kin", "dx", "ff_locator", "joint_velocities", true)?;
    }

    // Trajectory starting points. The foot generators latch the measured
    // foot poses published by the balance layer one cycle earlier.
    b.connect("encoders", "sout", "traj_gen", "initial_value", false)?;
    b.connect("balance", "right_foot_pos", "rf_traj_gen", "initial_value", false)?;
    b.connect("balance", "left_foot_pos", "lf_traj_gen", "initial_value", false)?;

    // Balance controller: base state via capability probe, locator first.
    b.connect_with_fallback(
        "balance",
        "q",
        &[("ff_locator", "q"), ("base_estimator", "q")],
    )?;
    b.connect_with_fallback(
        "balance",
        "v",
        &[("ff_locator", "v"), ("base_estimator", "v")],
    )?;
    b.connect("ft_est", "contact_wrench_right_sole", "balance", "wrench_right_foot", true)?;
    b.connect("ft_est", "contact_wrench_left_sole", "balance", "wrench_left_foot", true)?;
    b.connect("com_traj_gen", "x", "balance", "com_ref_pos", true)?;
    b.connect("com_traj_gen", "dx", "balance", "com_ref_vel", true)?;
    b.connect("com_traj_gen", "ddx", "balance", "com_ref_acc", true)?;
    b.connect("traj_gen", "q", "balance", "posture_ref_pos", true)?;
    b.connect("traj_gen", "dq", "balance", "posture_ref_vel", true)?;
    b.connect("traj_gen", "ddq", "balance", "posture_ref_acc", true)?;

    // Torque loop: ground-truth velocities when the platform has them.
    b.connect("balance", "tau_des", "torque_ctrl", "tau_des", true)?;
    b.connect_with_fallback(
        "torque_ctrl",
        "joints_velocities",
        &[("device", "joint_velocities"), ("estimator_kin", "dx")],
    )?;
    b.connect("estimator_kin", "ddx", "torque_ctrl", "joints_accelerations", true)?;
    b.connect("ft_est", "joints_torques", "torque_ctrl", "joints_torques", true)?;
    b.connect("ft_est", "current_filtered", "torque_ctrl", "current_measure", true)?;

    // Position loop.
    b.connect("encoders", "sout", "pos_ctrl", "encoders", true)?;
    b.connect_with_fallback(
        "pos_ctrl",
        "joints_velocities",
        &[("device", "joint_velocities"), ("estimator_kin", "dx")],
    )?;
    b.connect("traj_gen", "q", "pos_ctrl", "q_ref", true)?;
    b.connect("traj_gen", "dq", "pos_ctrl", "dq_ref", true)?;

    // Admittance loop. The ownership mask is a feedback edge from the
    // arbitration layer, one cycle behind.
    b.connect("encoders", "sout", "adm_ctrl", "encoders", true)?;
    b.connect("ft_est", "contact_wrench_right_sole", "adm_ctrl", "wrench_right_foot", true)?;
    b.connect("ft_est", "contact_wrench_left_sole", "adm_ctrl", "wrench_left_foot", true)?;
    b.connect("traj_gen", "f_right_foot", "adm_ctrl", "wrench_right_foot_ref", true)?;
    b.connect("traj_gen", "f_left_foot", "adm_ctrl", "wrench_left_foot_ref", true)?;
    b.connect("ctrl_man", "joints_ctrl_mode_adm", "adm_ctrl", "controlled_joints", false)?;

    // Arbitration inputs, one command port per mode.
    b.connect("pos_ctrl", "pwm_des", "ctrl_man", "ctrl_pos", true)?;
    b.connect("torque_ctrl", "control_current", "ctrl_man", "ctrl_torque", true)?;
    b.connect("adm_ctrl", "q_des", "ctrl_man", "ctrl_adm", true)?;
    b.connect_with_fallback(
        "ctrl_man",
        "dq",
        &[("device", "joint_velocities"), ("estimator_kin", "dx")],
    )?;

    // The safe command closes the loop, delivered next cycle.
    b.connect("ctrl_man", "u_safe", "device", "control", true)?;
    Ok(())
}

/// Build and fully register the arbitration manager from the config.
fn configure_manager(config: &RobotConfig) -> Result<ControlManager, StriderError> {
    let j = config.model.joint_count;
    let model = config.model_descriptor();
    let mut mgr = ControlManager::new();
    mgr.init(
        config.dt,
        &model,
        config.manager.current_to_ctrl_gain,
        config.manager.max_current,
    )?;

    let mut dead_zone_offsets = vec![0.0; j];
    let mut dead_zone_pct = vec![0.0; j];
    for joint in &config.joints {
        mgr.set_name_to_id(&joint.name, joint.id)?;
        mgr.set_joint_limits_from_id(joint.id, joint.pos_min, joint.pos_max)?;
        mgr.set_max_tau_from_id(joint.id, joint.tau_max)?;
        if let Some(current_max) = joint.current_max {
            mgr.set_max_current_from_id(joint.id, current_max)?;
        }
        dead_zone_offsets[joint.id] = joint.dead_zone_offset;
        dead_zone_pct[joint.id] = joint.dead_zone_pct;
    }
    mgr.set_dead_zone_offsets(&dead_zone_offsets)?;
    mgr.set_dead_zone_compensation(&dead_zone_pct)?;
    mgr.set_sign_window_size(config.manager.sign_window_size)?;
    mgr.set_stale_limit(config.manager.stale_limit)?;
    if !config.urdf_to_ctrl.is_empty() {
        mgr.set_joints_urdf_to_ctrl(&config.urdf_to_ctrl)?;
    }
    for sensor in &config.force_sensors {
        mgr.set_force_name_to_id(&sensor.name, sensor.id)?;
        mgr.set_force_limits_from_id(sensor.id, sensor.min, sensor.max)?;
    }
    mgr.set_foot_frame_name("right", &config.feet.right_frame)?;
    mgr.set_foot_frame_name("left", &config.feet.left_frame)?;
    mgr.set_right_foot_sole_xyz(config.feet.right_sole_xyz)?;

    mgr.add_ctrl_mode("pos")?;
    mgr.add_ctrl_mode("torque")?;
    mgr.add_ctrl_mode("adm")?;
    // Every joint boots under position control.
    mgr.set_ctrl_mode("all", "pos")?;
    Ok(mgr)
}

fn balance_gains(config: &RobotConfig) -> Result<BalanceGains, StriderError> {
    let j = config.model.joint_count;
    let broadcast = |name: &str, table: &[f64]| -> Result<Vec<f64>, StriderError> {
        RobotConfig::broadcast_table(table, j).ok_or_else(|| {
            StriderError::Config(format!(
                "{name}: expected 1 or {j} entries, got {}",
                table.len()
            ))
        })
    };
    Ok(BalanceGains {
        kp_com: config.balance.kp_com.clone(),
        kd_com: config.balance.kd_com.clone(),
        kp_feet: config.balance.kp_feet.clone(),
        kd_feet: config.balance.kd_feet.clone(),
        kp_constraints: config.balance.kp_constraints.clone(),
        kd_constraints: config.balance.kd_constraints.clone(),
        kp_posture: broadcast("balance.kp_posture", &config.balance.kp_posture)?,
        kd_posture: broadcast("balance.kd_posture", &config.balance.kd_posture)?,
        w_com: config.balance.w_com,
        w_feet: config.balance.w_feet,
        w_forces: config.balance.w_forces,
        w_posture: config.balance.w_posture,
        mu: config.balance.mu,
        f_min: config.balance.f_min,
        f_max: config.balance.f_max,
    })
}
