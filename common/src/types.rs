use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Action {
    None,
    Next,
    Prev,
    Command(u8),
    Redefine,
}

impl Action {
    pub const REDEFINE_CODE: u8 = u8::MAX;

    pub fn code(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Next => 1,
            Self::Prev => 2,
            Self::Command(code) => code,
            Self::Redefine => Self::REDEFINE_CODE,
        }
    }
}

impl From<u8> for Action {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::None,
            1 => Self::Next,
            2 => Self::Prev,
            Self::REDEFINE_CODE => Self::Redefine,
            code => Self::Command(code),
        }
    }
}

impl From<Action> for u8 {
    fn from(action: Action) -> Self {
        action.code()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Context {
    Light,
    Configure,
}

impl Context {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Configure => "configure",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Idle,
    PickValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootBehavior {
    Restore,
    Step,
    Boundary,
    BatteryReadout,
    Emergency,
    EnterConfigure,
    SelectSlot,
    PickValue { slot: u8 },
    Save,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootReport {
    pub action: u8,
    pub context: &'static str,
    pub behavior: Option<BootBehavior>,
    #[serde(rename = "activeIndex")]
    pub active_index: u8,
    #[serde(rename = "activeCount")]
    pub active_count: u8,
    pub position: u8,
    #[serde(rename = "storeReset")]
    pub store_reset: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverStatus {
    pub position: u8,
    pub duty: u8,
    #[serde(rename = "activeIndex")]
    pub active_index: u8,
    #[serde(rename = "activeModes")]
    pub active_modes: Vec<u8>,
    pub context: &'static str,
    #[serde(rename = "brightTicks")]
    pub bright_ticks: u16,
    #[serde(rename = "lowPowerTicks")]
    pub low_power_ticks: u16,
    #[serde(rename = "lastVoltage")]
    pub last_voltage: Option<u8>,
    pub halted: bool,
}
