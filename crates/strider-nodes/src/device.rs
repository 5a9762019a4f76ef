//! [`DeviceNode`] – the sensor/actuator boundary of the pipeline.
//!
//! On hardware the device is fed by the robot's sensor bus between cycles;
//! in simulation the host writes the same ports from the physics state.
//! Which optional ports exist is decided at construction through
//! [`DeviceOptions`], so downstream fallback links can probe for them.

use strider_graph::{InitContext, Node, PortSet};
use strider_types::{Lifecycle, Shape, StriderError, Value};

/// Presence flags for ports that exist only on some platforms.
#[derive(Debug, Clone, Copy)]
pub struct DeviceOptions {
    /// Hand force/torque sensors are mounted.
    pub hand_sensors: bool,
    /// Ground-truth joint velocities are available (simulation only).
    pub joint_velocities: bool,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            hand_sensors: true,
            joint_velocities: false,
        }
    }
}

/// Hardware/simulation boundary node.
///
/// Outputs: `robot_state` (J+6 free-flyer state), leg wrenches, optional
/// hand wrenches, `accelerometer`/`gyrometer`, motor `currents`, and in
/// simulation `joint_velocities`. Input: `control`, the final safe
/// actuator command.
pub struct DeviceNode {
    name: String,
    ports: PortSet,
    opts: DeviceOptions,
    state: Lifecycle,
    joint_count: usize,
}

impl DeviceNode {
    pub fn new(name: &str, opts: DeviceOptions) -> Self {
        Self {
            name: name.to_string(),
            ports: PortSet::new(name),
            opts,
            state: Lifecycle::Unconfigured,
            joint_count: 0,
        }
    }

    /// Feed the free-flyer robot state (length J+6) for the next cycle.
    pub fn set_robot_state(&mut self, state: &[f64]) -> Result<(), StriderError> {
        self.ports
            .set_output("robot_state", Value::Vector(state.to_vec()))
    }

    /// Feed a foot wrench; `side` is `"rleg"` or `"lleg"`.
    pub fn set_foot_wrench(&mut self, side: &str, wrench: [f64; 6]) -> Result<(), StriderError> {
        self.ports
            .set_output(&format!("force_{side}"), Value::Wrench(wrench))
    }

    /// Feed a hand wrench; `side` is `"rarm"` or `"larm"`. Only valid when
    /// hand sensors were declared at construction.
    pub fn set_hand_wrench(&mut self, side: &str, wrench: [f64; 6]) -> Result<(), StriderError> {
        self.ports
            .set_output(&format!("force_{side}"), Value::Wrench(wrench))
    }

    pub fn set_imu(&mut self, accel: [f64; 3], gyro: [f64; 3]) -> Result<(), StriderError> {
        self.ports
            .set_output("accelerometer", Value::Vector(accel.to_vec()))?;
        self.ports
            .set_output("gyrometer", Value::Vector(gyro.to_vec()))
    }

    pub fn set_currents(&mut self, currents: &[f64]) -> Result<(), StriderError> {
        self.ports
            .set_output("currents", Value::Vector(currents.to_vec()))
    }

    /// Simulation only.
    pub fn set_joint_velocities(&mut self, dq: &[f64]) -> Result<(), StriderError> {
        self.ports
            .set_output("joint_velocities", Value::Vector(dq.to_vec()))
    }

    /// The actuator command delivered this cycle, if any.
    pub fn control(&self) -> Option<&[f64]> {
        match self.ports.input("control") {
            Some(Value::Vector(v)) => Some(v),
            _ => None,
        }
    }
}

impl Node for DeviceNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    fn initialize(&mut self, ctx: &InitContext) -> Result<(), StriderError> {
        let j = ctx.model.joint_count;
        self.joint_count = j;
        self.ports.declare_output("robot_state", Shape::Vector(j + 6));
        self.ports.declare_output("force_rleg", Shape::Wrench);
        self.ports.declare_output("force_lleg", Shape::Wrench);
        if self.opts.hand_sensors {
            self.ports.declare_output("force_rarm", Shape::Wrench);
            self.ports.declare_output("force_larm", Shape::Wrench);
        }
        self.ports.declare_output("accelerometer", Shape::Vector(3));
        self.ports.declare_output("gyrometer", Shape::Vector(3));
        self.ports.declare_output("currents", Shape::Vector(j));
        if self.opts.joint_velocities {
            self.ports.declare_output("joint_velocities", Shape::Vector(j));
        }
        self.ports.declare_input("control", Shape::Vector(j));
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
        // Sensor values are pushed by the host between cycles; here the
        // device only has to republish them so downstream delivery sees
        // fresh outputs even when the host did not rewrite every port.
        let names: Vec<String> = self.ports.output_names().map(str::to_string).collect();
        for name in names {
            if !self.ports.output_fresh(&name) {
                if let Some(value) = self.ports.output(&name).cloned() {
                    self.ports.set_output(&name, value)?;
                }
            }
        }
        Ok(())
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

    #[test]
    fn optional_ports_follow_construction_flags() {
        let mut bare = DeviceNode::new("device", DeviceOptions {
            hand_sensors: false,
            joint_velocities: false,
        });
        bare.initialize(&ctx(4)).unwrap();
        assert!(!bare.has_port("force_rarm", Direction::Output));
        assert!(!bare.has_port("joint_velocities", Direction::Output));

        let mut sim = DeviceNode::new("device", DeviceOptions {
            hand_sensors: true,
            joint_velocities: true,
        });
        sim.initialize(&ctx(4)).unwrap();
        assert!(sim.has_port("force_rarm", Direction::Output));
        assert_eq!(
            sim.port_shape("joint_velocities", Direction::Output),
            Some(Shape::Vector(4))
        );
    }

    #[test]
    fn robot_state_is_base_augmented() {
        let mut dev = DeviceNode::new("device", DeviceOptions::default());
        dev.initialize(&ctx(4)).unwrap();
        assert_eq!(
            dev.port_shape("robot_state", Direction::Output),
            Some(Shape::Vector(10))
        );
        // Wrong length rejected.
        assert!(dev.set_robot_state(&[0.0; 4]).is_err());
        assert!(dev.set_robot_state(&[0.0; 10]).is_ok());
    }

    #[test]
    fn update_republishes_stale_sensor_values() {
        let mut dev = DeviceNode::new("device", DeviceOptions::default());
        dev.initialize(&ctx(2)).unwrap();
        dev.set_currents(&[1.5, -1.5]).unwrap();

        dev.ports_mut().begin_cycle();
        assert!(!dev.ports().output_fresh("currents"));
        dev.update(1).unwrap();
        assert!(dev.ports().output_fresh("currents"));
        assert_eq!(
            dev.read_output("currents"),
            Some(Value::Vector(vec![1.5, -1.5]))
        );
    }
}
