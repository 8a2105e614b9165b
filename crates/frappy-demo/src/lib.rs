//! Demonstration `ModuleFactory` implementations: a simulated Drivable
//! temperature loop and a communicator-backed Readable sensor, together
//! exercising every mechanism the core crates provide without needing
//! real hardware on hand.

mod config_support;
mod sensor;
mod tempctrl;

pub use sensor::SensorFactory;
pub use tempctrl::TemperatureLoopFactory;
