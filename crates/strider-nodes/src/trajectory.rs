//! Reference trajectory generators.
//!
//! [`NdTrajectoryGenerator`] produces exactly one `(x, dx, ddx)` triple
//! per cycle for an n-dimensional signal: minimum-jerk motion toward a
//! commanded target, otherwise a hold at the current value. The same node
//! serves the CoM reference (n = 3) and the SE3 foot poses (n = 6);
//! [`JointTrajectoryGenerator`] wraps it for the J-dimensional posture
//! reference and adds the contact-force reference outputs.

use strider_graph::{InitContext, Node, PortSet};
use strider_types::{Lifecycle, Shape, StriderError, Value};
use tracing::debug;

/// Minimum-jerk interpolation state shared by the generators.
struct MinJerkProfile {
    start: Vec<f64>,
    target: Vec<f64>,
    duration: f64,
    elapsed: f64,
    active: bool,
}

impl MinJerkProfile {
    fn idle(dim: usize) -> Self {
        Self {
            start: vec![0.0; dim],
            target: vec![0.0; dim],
            duration: 0.0,
            elapsed: 0.0,
            active: false,
        }
    }

    fn begin(&mut self, start: &[f64], target: &[f64], duration: f64) {
        self.start = start.to_vec();
        self.target = target.to_vec();
        self.duration = duration;
        self.elapsed = 0.0;
        self.active = true;
    }

    /// Advance by `dt` and evaluate position/velocity/acceleration at the
    /// new time. Returns the hold triple once the move completes.
    fn step(&mut self, dt: f64, hold: &[f64]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let dim = hold.len();
        if !self.active {
            return (hold.to_vec(), vec![0.0; dim], vec![0.0; dim]);
        }
        self.elapsed += dt;
        let tau = (self.elapsed / self.duration).min(1.0);
        let s = tau * tau * tau * (10.0 - 15.0 * tau + 6.0 * tau * tau);
        let ds = 30.0 * tau * tau * (1.0 - tau) * (1.0 - tau) / self.duration;
        let dds =
            60.0 * tau * (1.0 - 3.0 * tau + 2.0 * tau * tau) / (self.duration * self.duration);
        let mut x = vec![0.0; dim];
        let mut dx = vec![0.0; dim];
        let mut ddx = vec![0.0; dim];
        for i in 0..dim {
            let span = self.target[i] - self.start[i];
            x[i] = self.start[i] + span * s;
            dx[i] = span * ds;
            ddx[i] = span * dds;
        }
        if tau >= 1.0 {
            x.copy_from_slice(&self.target);
            dx.fill(0.0);
            ddx.fill(0.0);
            self.active = false;
        }
        (x, dx, ddx)
    }
}

/// n-dimensional minimum-jerk reference generator.
///
/// The starting point is latched from the `initial_value` input on the
/// first cycle after initialization (or after [`NdTrajectoryGenerator::restart`]);
/// an unbound input latches the zero vector.
pub struct NdTrajectoryGenerator {
    name: String,
    ports: PortSet,
    dim: Option<usize>,
    profile: MinJerkProfile,
    current: Vec<f64>,
    latched: bool,
    dt: f64,
    state: Lifecycle,
}

impl NdTrajectoryGenerator {
    /// Generator of fixed dimension `n` (CoM = 3, SE3 pose = 6).
    pub fn fixed(name: &str, n: usize) -> Self {
        Self {
            name: name.to_string(),
            ports: PortSet::new(name),
            dim: Some(n),
            profile: MinJerkProfile::idle(n),
            current: vec![0.0; n],
            latched: false,
            dt: 0.0,
            state: Lifecycle::Unconfigured,
        }
    }

    /// Generator sized to the model's joint count at initialization.
    pub fn per_joint(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ports: PortSet::new(name),
            dim: None,
            profile: MinJerkProfile::idle(0),
            current: Vec::new(),
            latched: false,
            dt: 0.0,
            state: Lifecycle::Unconfigured,
        }
    }

    fn dim(&self) -> usize {
        self.current.len()
    }

    /// Start a minimum-jerk move from the current value.
    ///
    /// # Errors
    ///
    /// `StriderError::Config` before initialization, on a wrong-length
    /// target or a non-positive duration.
    pub fn move_to(&mut self, target: &[f64], duration: f64) -> Result<(), StriderError> {
        if self.state == Lifecycle::Unconfigured {
            return Err(StriderError::Config(format!(
                "{}: move_to before initialization",
                self.name
            )));
        }
        if target.len() != self.dim() {
            return Err(StriderError::Config(format!(
                "{}: target has {} entries, generator is {}-dimensional",
                self.name,
                target.len(),
                self.dim()
            )));
        }
        if duration <= 0.0 {
            return Err(StriderError::Config(format!(
                "{}: move duration must be positive, got {duration}",
                self.name
            )));
        }
        debug!(node = %self.name, duration, "trajectory move started");
        self.profile.begin(&self.current, target, duration);
        Ok(())
    }

    /// Abandon any active move and re-latch `initial_value` next cycle.
    pub fn restart(&mut self) {
        self.profile.active = false;
        self.latched = false;
    }

    fn step(&mut self) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        if !self.latched {
            let init = self.ports.in_vec("initial_value");
            if init.len() == self.dim() {
                self.current = init.to_vec();
            }
            self.latched = true;
        }
        let (x, dx, ddx) = self.profile.step(self.dt, &self.current);
        self.current = x.clone();
        (x, dx, ddx)
    }
}

impl Node for NdTrajectoryGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    fn initialize(&mut self, ctx: &InitContext) -> Result<(), StriderError> {
        let n = self.dim.unwrap_or(ctx.model.joint_count);
        self.profile = MinJerkProfile::idle(n);
        self.current = vec![0.0; n];
        self.dt = ctx.dt;
        self.ports.declare_input("initial_value", Shape::Vector(n));
        self.ports.declare_output("x", Shape::Vector(n));
        self.ports.declare_output("dx", Shape::Vector(n));
        self.ports.declare_output("ddx", Shape::Vector(n));
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
        let (x, dx, ddx) = self.step();
        self.ports.set_output("x", Value::Vector(x))?;
        self.ports.set_output("dx", Value::Vector(dx))?;
        self.ports.set_output("ddx", Value::Vector(ddx))
    }
}

/// Posture reference generator: a J-dimensional minimum-jerk profile with
/// `q`/`dq`/`ddq` outputs plus the contact-force reference wrenches the
/// balance layer tracks during load transfer.
pub struct JointTrajectoryGenerator {
    name: String,
    ports: PortSet,
    profile: MinJerkProfile,
    current: Vec<f64>,
    latched: bool,
    force_refs: [[f64; 6]; 4],
    dt: f64,
    state: Lifecycle,
}

const FORCE_REF_PORTS: [&str; 4] = [
    "f_right_foot",
    "f_left_foot",
    "f_right_hand",
    "f_left_hand",
];

impl JointTrajectoryGenerator {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ports: PortSet::new(name),
            profile: MinJerkProfile::idle(0),
            current: Vec::new(),
            latched: false,
            force_refs: [[0.0; 6]; 4],
            dt: 0.0,
            state: Lifecycle::Unconfigured,
        }
    }

    pub fn move_to(&mut self, target: &[f64], duration: f64) -> Result<(), StriderError> {
        if self.state == Lifecycle::Unconfigured {
            return Err(StriderError::Config(format!(
                "{}: move_to before initialization",
                self.name
            )));
        }
        if target.len() != self.current.len() {
            return Err(StriderError::Config(format!(
                "{}: target has {} entries for {} joints",
                self.name,
                target.len(),
                self.current.len()
            )));
        }
        if duration <= 0.0 {
            return Err(StriderError::Config(format!(
                "{}: move duration must be positive, got {duration}",
                self.name
            )));
        }
        self.profile.begin(&self.current, target, duration);
        Ok(())
    }

    /// Set one contact-force reference; `index` follows right foot, left
    /// foot, right hand, left hand.
    pub fn set_force_reference(&mut self, index: usize, wrench: [f64; 6]) {
        if index < self.force_refs.len() {
            self.force_refs[index] = wrench;
        }
    }
}

impl Node for JointTrajectoryGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    fn initialize(&mut self, ctx: &InitContext) -> Result<(), StriderError> {
        let j = ctx.model.joint_count;
        self.profile = MinJerkProfile::idle(j);
        self.current = vec![0.0; j];
        self.dt = ctx.dt;
        self.ports.declare_input("initial_value", Shape::Vector(j));
        self.ports.declare_output("q", Shape::Vector(j));
        self.ports.declare_output("dq", Shape::Vector(j));
        self.ports.declare_output("ddq", Shape::Vector(j));
        for port in FORCE_REF_PORTS {
            self.ports.declare_output(port, Shape::Wrench);
        }
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
        if !self.latched {
            let init = self.ports.in_vec("initial_value");
            if init.len() == self.current.len() {
                self.current = init.to_vec();
            }
            self.latched = true;
        }
        let (q, dq, ddq) = self.profile.step(self.dt, &self.current);
        self.current = q.clone();
        self.ports.set_output("q", Value::Vector(q))?;
        self.ports.set_output("dq", Value::Vector(dq))?;
        self.ports.set_output("ddq", Value::Vector(ddq))?;
        for (port, wrench) in FORCE_REF_PORTS.iter().zip(self.force_refs) {
            self.ports.set_output(port, Value::Wrench(wrench))?;
        }
        Ok(())
    }
}
