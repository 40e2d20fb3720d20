pub mod board;
pub mod calibration;
pub mod config;
pub mod curve;
pub mod driver;
pub mod error;
pub mod patterns;
pub mod safety;
pub mod session;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use board::Board;
pub use calibration::{CalibrationTiming, Calibrator};
pub use config::{ClickMap, DriverConfig, EmergencyPattern, RampConfig};
pub use driver::Driver;
pub use error::ConfigError;
pub use safety::{RampReason, SafetyEvent};
pub use session::{PowerGap, RetentionPolicy, Session};
pub use store::{MemoryNvm, Nvm, PersistentRecord, ProfileStore, MODES};
pub use types::{Action, BootBehavior, BootReport, Command, Context, DriverStatus};
