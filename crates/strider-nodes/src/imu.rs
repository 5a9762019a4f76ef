//! IMU conditioning: constant-offset compensation and attitude fusion.
//!
//! [`ImuOffsetCompensation`] subtracts calibration offsets from the raw
//! accelerometer/gyroscope streams. [`AttitudeFilter`] fuses the
//! compensated streams into a base orientation quaternion; the fusion
//! algorithm sits behind [`AttitudeCore`] so the node can run with a
//! cheap stand-in in tests and simulation.

use strider_graph::{InitContext, Node, PortSet};
use strider_types::{Lifecycle, Shape, StriderError, Value};

/// Subtracts calibrated constant offsets from the IMU streams.
pub struct ImuOffsetCompensation {
    name: String,
    ports: PortSet,
    accel_offset: [f64; 3],
    gyro_offset: [f64; 3],
    state: Lifecycle,
}

impl ImuOffsetCompensation {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ports: PortSet::new(name),
            accel_offset: [0.0; 3],
            gyro_offset: [0.0; 3],
            state: Lifecycle::Unconfigured,
        }
    }

    /// Install calibration offsets measured with the robot at rest.
    pub fn set_offsets(&mut self, accel: [f64; 3], gyro: [f64; 3]) {
        self.accel_offset = accel;
        self.gyro_offset = gyro;
    }
}

impl Node for ImuOffsetCompensation {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    fn initialize(&mut self, _ctx: &InitContext) -> Result<(), StriderError> {
        self.ports.declare_input("accelerometer_in", Shape::Vector(3));
        self.ports.declare_input("gyrometer_in", Shape::Vector(3));
        self.ports.declare_output("accelerometer_out", Shape::Vector(3));
        self.ports.declare_output("gyrometer_out", Shape::Vector(3));
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
        let accel: Vec<f64> = self
            .ports
            .in_vec("accelerometer_in")
            .iter()
            .zip(self.accel_offset)
            .map(|(raw, off)| raw - off)
            .collect();
        let gyro: Vec<f64> = self
            .ports
            .in_vec("gyrometer_in")
            .iter()
            .zip(self.gyro_offset)
            .map(|(raw, off)| raw - off)
            .collect();
        self.ports
            .set_output("accelerometer_out", Value::Vector(accel))?;
        self.ports.set_output("gyrometer_out", Value::Vector(gyro))
    }
}

/// Attitude fusion algorithm behind [`AttitudeFilter`].
pub trait AttitudeCore: Send {
    /// Fuse one sample pair into an orientation quaternion `[w, x, y, z]`.
    fn fuse(&mut self, dt: f64, accel: &[f64], gyro: &[f64]) -> [f64; 4];
}

/// Default core: holds the identity orientation regardless of input.
#[derive(Default)]
pub struct LevelAttitude;

impl AttitudeCore for LevelAttitude {
    fn fuse(&mut self, _dt: f64, _accel: &[f64], _gyro: &[f64]) -> [f64; 4] {
        [1.0, 0.0, 0.0, 0.0]
    }
}

/// Boundary node: compensated IMU streams → `imu_quat`.
pub struct AttitudeFilter {
    name: String,
    ports: PortSet,
    core: Box<dyn AttitudeCore>,
    dt: f64,
    state: Lifecycle,
}

impl AttitudeFilter {
    pub fn new(name: &str) -> Self {
        Self::with_core(name, Box::new(LevelAttitude))
    }

    pub fn with_core(name: &str, core: Box<dyn AttitudeCore>) -> Self {
        Self {
            name: name.to_string(),
            ports: PortSet::new(name),
            core,
            dt: 0.0,
            state: Lifecycle::Unconfigured,
        }
    }
}

impl Node for AttitudeFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    fn initialize(&mut self, ctx: &InitContext) -> Result<(), StriderError> {
        self.dt = ctx.dt;
        self.ports.declare_input("accelerometer", Shape::Vector(3));
        self.ports.declare_input("gyroscope", Shape::Vector(3));
        self.ports.declare_output("imu_quat", Shape::Quaternion);
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
        let accel = self.ports.in_vec("accelerometer").to_vec();
        let gyro = self.ports.in_vec("gyroscope").to_vec();
        let quat = self.core.fuse(self.dt, &accel, &gyro);
        self.ports.set_output("imu_quat", Value::Quaternion(quat))
    }
}
