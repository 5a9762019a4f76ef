//! Base pose/velocity providers.
//!
//! [`FreeFlyerLocator`] reconstructs the floating base from forward
//! kinematics anchored at a support foot; [`BaseEstimator`] fuses IMU and
//! contact wrenches instead. Exactly one of them feeds the balance layer;
//! the topology probes for the locator first and falls back to the
//! estimator. Both publish the base-augmented `q`/`v` (length J+6, base
//! block first) and keep their numerics behind [`PoseCore`].

use strider_graph::{InitContext, Node, PortSet};
use strider_types::{Lifecycle, Shape, StriderError, Value};

/// Base pose/velocity reconstruction algorithm.
pub trait PoseCore: Send {
    /// Returns the 6-dof base pose and velocity for the current sample.
    fn locate(&mut self, dt: f64, q_joints: &[f64], dq_joints: &[f64]) -> ([f64; 6], [f64; 6]);
}

/// Default core: base fixed at the origin.
#[derive(Default)]
pub struct OriginBase;

impl PoseCore for OriginBase {
    fn locate(&mut self, _dt: f64, _q: &[f64], _dq: &[f64]) -> ([f64; 6], [f64; 6]) {
        ([0.0; 6], [0.0; 6])
    }
}

fn augment(base: [f64; 6], joints: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(6 + joints.len());
    out.extend_from_slice(&base);
    out.extend_from_slice(joints);
    out
}

/// Kinematic base locator anchored at the support foot.
pub struct FreeFlyerLocator {
    name: String,
    ports: PortSet,
    core: Box<dyn PoseCore>,
    dt: f64,
    state: Lifecycle,
}

impl FreeFlyerLocator {
    pub fn new(name: &str) -> Self {
        Self::with_core(name, Box::new(OriginBase))
    }

    pub fn with_core(name: &str, core: Box<dyn PoseCore>) -> Self {
        Self {
            name: name.to_string(),
            ports: PortSet::new(name),
            core,
            dt: 0.0,
            state: Lifecycle::Unconfigured,
        }
    }
}

impl Node for FreeFlyerLocator {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    fn initialize(&mut self, ctx: &InitContext) -> Result<(), StriderError> {
        let j = ctx.model.joint_count;
        self.dt = ctx.dt;
        self.ports.declare_input("joint_positions", Shape::Vector(j));
        self.ports.declare_input("joint_velocities", Shape::Vector(j));
        self.ports.declare_output("q", Shape::Vector(j + 6));
        self.ports.declare_output("v", Shape::Vector(j + 6));
        self.ports.declare_output("base6d_from_foot", Shape::Vector(6));
        self.state = Lifecycle::Initialized;
        Ok(())
    }

    fn ports(&self) -> &PortSet {
        &self.ports
    }

    fn ports_mut(&mut self) -> &mut PortSet {
        &mut self.ports
    }

    fn update(&mut self, _cycle: u64) -> Result<(), StriderError> {
        let q_joints = self.ports.in_vec("joint_positions").to_vec();
        let dq_joints = self.ports.in_vec("joint_velocities").to_vec();
        let (base_pose, base_vel) = self.core.locate(self.dt, &q_joints, &dq_joints);
        self.ports
            .set_output("q", Value::Vector(augment(base_pose, &q_joints)))?;
        self.ports
            .set_output("v", Value::Vector(augment(base_vel, &dq_joints)))?;
        self.ports
            .set_output("base6d_from_foot", Value::Vector(base_pose.to_vec()))
    }
}

/// IMU/contact-fusion base estimator, the fallback provider.
pub struct BaseEstimator {
    name: String,
    ports: PortSet,
    core: Box<dyn PoseCore>,
    dt: f64,
    state: Lifecycle,
}

impl BaseEstimator {
    pub fn new(name: &str) -> Self {
        Self::with_core(name, Box::new(OriginBase))
    }

    pub fn with_core(name: &str, core: Box<dyn PoseCore>) -> Self {
        Self {
            name: name.to_string(),
            ports: PortSet::new(name),
            core,
            dt: 0.0,
            state: Lifecycle::Unconfigured,
        }
    }
}

impl Node for BaseEstimator {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    fn initialize(&mut self, ctx: &InitContext) -> Result<(), StriderError> {
        let j = ctx.model.joint_count;
        self.dt = ctx.dt;
        self.ports.declare_input("joint_positions", Shape::Vector(j));
        self.ports.declare_input("joint_velocities", Shape::Vector(j));
        self.ports.declare_input("imu_quat", Shape::Quaternion);
        self.ports.declare_input("wrench_right_foot", Shape::Wrench);
        self.ports.declare_input("wrench_left_foot", Shape::Wrench);
        self.ports.declare_output("q", Shape::Vector(j + 6));
        self.ports.declare_output("v", Shape::Vector(j + 6));
        self.state = Lifecycle::Initialized;
        Ok(())
    }

    fn ports(&self) -> &PortSet {
        &self.ports
    }

    fn ports_mut(&mut self) -> &mut PortSet {
        &mut self.ports
    }

    fn update(&mut self, _cycle: u64) -> Result<(), StriderError> {
        let q_joints = self.ports.in_vec("joint_positions").to_vec();
        let dq_joints = self.ports.in_vec("joint_velocities").to_vec();
        let (base_pose, base_vel) = self.core.locate(self.dt, &q_joints, &dq_joints);
        self.ports
            .set_output("q", Value::Vector(augment(base_pose, &q_joints)))?;
        self.ports
            .set_output("v", Value::Vector(augment(base_vel, &dq_joints)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strider_types::{Direction, ModelDescriptor};

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

    struct WalkCore;

    impl PoseCore for WalkCore {
        fn locate(&mut self, _dt: f64, _q: &[f64], _dq: &[f64]) -> ([f64; 6], [f64; 6]) {
            ([1.0, 2.0, 0.9, 0.0, 0.0, 0.0], [0.1, 0.0, 0.0, 0.0, 0.0, 0.0])
        }
    }

    #[test]
    fn locator_prepends_base_block() {
        let mut loc = FreeFlyerLocator::with_core("ff_locator", Box::new(WalkCore));
        loc.initialize(&ctx(2)).unwrap();
        loc.write_input("joint_positions", Value::Vector(vec![0.3, 0.4]))
            .unwrap();
        loc.write_input("joint_velocities", Value::Vector(vec![0.5, 0.6]))
            .unwrap();
        loc.update(0).unwrap();
        assert_eq!(
            loc.read_output("q"),
            Some(Value::Vector(vec![1.0, 2.0, 0.9, 0.0, 0.0, 0.0, 0.3, 0.4]))
        );
        assert_eq!(
            loc.read_output("v"),
            Some(Value::Vector(vec![0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.5, 0.6]))
        );
        assert!(loc.has_port("base6d_from_foot", Direction::Output));
    }

    #[test]
    fn estimator_exposes_sensor_fusion_inputs() {
        let mut est = BaseEstimator::new("base_estimator");
        est.initialize(&ctx(2)).unwrap();
        assert!(est.has_port("imu_quat", Direction::Input));
        assert!(est.has_port("wrench_right_foot", Direction::Input));
        // No foot-anchor output on the estimator.
        assert!(!est.has_port("base6d_from_foot", Direction::Output));

        est.update(0).unwrap();
        assert_eq!(est.read_output("q"), Some(Value::Vector(vec![0.0; 8])));
    }
}
