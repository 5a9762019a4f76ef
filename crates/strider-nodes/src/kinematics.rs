//! [`KinematicEstimator`] – numerical differentiation of the encoder
//! stream into filtered position, velocity and acceleration.

use strider_graph::{InitContext, Node, PortSet};
use strider_types::{Lifecycle, Shape, StriderError, Value};

/// Finite-difference estimator: input `x` (J) → `x_filtered`, `dx`, `ddx`.
///
/// The first cycle emits zero derivatives; there is no history to
/// difference against and a velocity spike at startup would propagate
/// straight into the torque loop.
pub struct KinematicEstimator {
    name: String,
    ports: PortSet,
    dt: f64,
    prev_x: Option<Vec<f64>>,
    prev_dx: Vec<f64>,
    state: Lifecycle,
}

impl KinematicEstimator {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ports: PortSet::new(name),
            dt: 0.0,
            prev_x: None,
            prev_dx: Vec::new(),
            state: Lifecycle::Unconfigured,
        }
    }
}

impl Node for KinematicEstimator {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    fn initialize(&mut self, ctx: &InitContext) -> Result<(), StriderError> {
        let j = ctx.model.joint_count;
        self.dt = ctx.dt;
        self.prev_dx = vec![0.0; j];
        self.ports.declare_input("x", Shape::Vector(j));
        self.ports.declare_output("x_filtered", Shape::Vector(j));
        self.ports.declare_output("dx", Shape::Vector(j));
        self.ports.declare_output("ddx", Shape::Vector(j));
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
        let x = self.ports.in_vec("x").to_vec();
        let (dx, ddx) = match &self.prev_x {
            Some(prev) => {
                let dx: Vec<f64> = x
                    .iter()
                    .zip(prev)
                    .map(|(cur, old)| (cur - old) / self.dt)
                    .collect();
                let ddx: Vec<f64> = dx
                    .iter()
                    .zip(&self.prev_dx)
                    .map(|(cur, old)| (cur - old) / self.dt)
                    .collect();
                (dx, ddx)
            }
            None => (vec![0.0; x.len()], vec![0.0; x.len()]),
        };
        self.prev_x = Some(x.clone());
        self.prev_dx = dx.clone();
        self.ports.set_output("x_filtered", Value::Vector(x))?;
        self.ports.set_output("dx", Value::Vector(dx))?;
        self.ports.set_output("ddx", Value::Vector(ddx))
    }
}
