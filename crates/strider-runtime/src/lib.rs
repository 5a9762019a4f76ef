//! Runtime surface of the control pipeline: configuration, telemetry,
//! the signal recorder and the topology assembler that turns a
//! [`config::RobotConfig`] into a running [`topology::Pipeline`].

pub mod config;
pub mod recorder;
pub mod telemetry;
pub mod topology;

pub use config::RobotConfig;
pub use recorder::SignalRecorder;
pub use topology::{assemble_pipeline, Pipeline};
