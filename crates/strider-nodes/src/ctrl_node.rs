//! [`CtrlManagerNode`] – graph adapter around the safety arbitration
//! manager.
//!
//! The manager itself is shared: the pipeline owner keeps a handle for
//! mode switching and event draining between cycles, while this node sits
//! in the graph and runs the per-cycle arbitration. One input port per
//! registered mode (`ctrl_<mode>`); only ports that received a fresh
//! value this cycle are forwarded, so a stalled upstream controller shows
//! up at the manager as a missing source and triggers the fail-static
//! hold.

use std::sync::{Arc, Mutex};

use strider_graph::{InitContext, Node, PortSet};
use strider_manager::{ControlManager, ModeId};
use strider_types::{Lifecycle, Shape, StriderError, Value};

pub struct CtrlManagerNode {
    name: String,
    ports: PortSet,
    manager: Arc<Mutex<ControlManager>>,
    /// (input port, mode id) pairs resolved at initialization.
    mode_ports: Vec<(String, ModeId)>,
    state: Lifecycle,
}

impl CtrlManagerNode {
    /// The manager must have its modes registered before this node is
    /// initialized; the mode set fixes the node's input ports.
    pub fn new(name: &str, manager: Arc<Mutex<ControlManager>>) -> Self {
        Self {
            name: name.to_string(),
            ports: PortSet::new(name),
            manager,
            mode_ports: Vec::new(),
            state: Lifecycle::Unconfigured,
        }
    }

    pub fn manager(&self) -> Arc<Mutex<ControlManager>> {
        Arc::clone(&self.manager)
    }
}

impl Node for CtrlManagerNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    fn initialize(&mut self, ctx: &InitContext) -> Result<(), StriderError> {
        let j = ctx.model.joint_count;
        let manager = self
            .manager
            .lock()
            .map_err(|_| StriderError::Config("control manager lock poisoned".to_string()))?;
        if manager.joint_count() != j {
            return Err(StriderError::Config(format!(
                "{}: manager is sized for {} joints, model has {j}",
                self.name,
                manager.joint_count()
            )));
        }
        self.mode_ports = manager
            .mode_names()
            .iter()
            .map(|mode| {
                let id = manager.mode_id(mode).unwrap_or(ModeId(0));
                (format!("ctrl_{mode}"), id)
            })
            .collect();
        drop(manager);
        for (port, _) in &self.mode_ports {
            self.ports.declare_input(port, Shape::Vector(j));
        }
        self.ports.declare_input("dq", Shape::Vector(j));
        self.ports.declare_output("u_safe", Shape::Vector(j));
        // 1.0/0.0 ownership masks, one per mode, for controllers that act
        // only on the joints currently assigned to them.
        for (port, _) in &self.mode_ports {
            let mode = port.trim_start_matches("ctrl_");
            self.ports
                .declare_output(&format!("joints_ctrl_mode_{mode}"), Shape::Vector(j));
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
        let mut manager = self
            .manager
            .lock()
            .map_err(|_| StriderError::Config("control manager lock poisoned".to_string()))?;
        for (port, mode) in &self.mode_ports {
            if self.ports.input_fresh(port) {
                manager.feed_mode_command(*mode, self.ports.in_vec(port))?;
            }
        }
        let dq = self.ports.in_vec("dq").to_vec();
        let safe = manager.update(&dq)?.to_vec();
        let masks: Vec<(String, Vec<f64>)> = self
            .mode_ports
            .iter()
            .filter_map(|(port, _)| {
                let mode = port.trim_start_matches("ctrl_");
                manager
                    .mode_mask(mode)
                    .map(|mask| (format!("joints_ctrl_mode_{mode}"), mask))
            })
            .collect();
        drop(manager);
        for (port, mask) in masks {
            self.ports.set_output(&port, Value::Vector(mask))?;
        }
        self.ports.set_output("u_safe", Value::Vector(safe))
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

    fn shared_manager(j: usize) -> Arc<Mutex<ControlManager>> {
        let mut mgr = ControlManager::new();
        mgr.init(0.001, &ctx(j).model, 1.0, 10.0).unwrap();
        for id in 0..j {
            mgr.set_name_to_id(&format!("j{id}"), id).unwrap();
            mgr.set_joint_limits_from_id(id, -1.0, 1.0).unwrap();
        }
        mgr.add_ctrl_mode("pos").unwrap();
        mgr.add_ctrl_mode("torque").unwrap();
        mgr.set_ctrl_mode("all", "torque").unwrap();
        mgr.try_start().unwrap();
        Arc::new(Mutex::new(mgr))
    }

    #[test]
    fn declares_one_port_per_mode() {
        let mut node = CtrlManagerNode::new("ctrl_man", shared_manager(2));
        node.initialize(&ctx(2)).unwrap();
        assert!(node.has_port("ctrl_pos", Direction::Input));
        assert!(node.has_port("ctrl_torque", Direction::Input));
        assert_eq!(
            node.port_shape("u_safe", Direction::Output),
            Some(Shape::Vector(2))
        );
        assert!(node.has_port("joints_ctrl_mode_torque", Direction::Output));
    }

    #[test]
    fn mode_masks_published_each_cycle() {
        let mut node = CtrlManagerNode::new("ctrl_man", shared_manager(2));
        node.initialize(&ctx(2)).unwrap();
        node.write_input("ctrl_torque", Value::Vector(vec![0.0, 0.0]))
            .unwrap();
        node.write_input("dq", Value::Vector(vec![0.0, 0.0])).unwrap();
        node.update(0).unwrap();
        assert_eq!(
            node.read_output("joints_ctrl_mode_torque"),
            Some(Value::Vector(vec![1.0, 1.0]))
        );
        assert_eq!(
            node.read_output("joints_ctrl_mode_pos"),
            Some(Value::Vector(vec![0.0, 0.0]))
        );
    }

    #[test]
    fn fresh_command_arbitrated_and_clamped() {
        let mut node = CtrlManagerNode::new("ctrl_man", shared_manager(2));
        node.initialize(&ctx(2)).unwrap();
        node.write_input("ctrl_torque", Value::Vector(vec![0.5, 7.0]))
            .unwrap();
        node.write_input("dq", Value::Vector(vec![0.0, 0.0])).unwrap();
        node.update(0).unwrap();
        assert_eq!(
            node.read_output("u_safe"),
            Some(Value::Vector(vec![0.5, 1.0]))
        );
    }

    #[test]
    fn stale_port_triggers_fail_static_hold() {
        let mut node = CtrlManagerNode::new("ctrl_man", shared_manager(2));
        node.initialize(&ctx(2)).unwrap();
        node.write_input("ctrl_torque", Value::Vector(vec![0.4, -0.4]))
            .unwrap();
        node.write_input("dq", Value::Vector(vec![0.0, 0.0])).unwrap();
        node.update(0).unwrap();

        // Scheduler clears freshness; no new torque command arrives.
        node.ports_mut().begin_cycle();
        node.write_input("dq", Value::Vector(vec![0.0, 0.0])).unwrap();
        node.update(1).unwrap();
        assert_eq!(
            node.read_output("u_safe"),
            Some(Value::Vector(vec![0.4, -0.4]))
        );
    }

    #[test]
    fn joint_count_mismatch_rejected() {
        let mut node = CtrlManagerNode::new("ctrl_man", shared_manager(2));
        assert!(matches!(
            node.initialize(&ctx(3)),
            Err(StriderError::Config(_))
        ));
    }
}
