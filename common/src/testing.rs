use crate::{board::Board, session::Session};

pub const POWER_LOST: &str = "supply lost";

#[derive(Debug, Default)]
pub struct ScriptedBoard {
    pub duties: Vec<u8>,
    pub elapsed_10ms: u64,
    pub voltages: Vec<u8>,
    pub voltage: u8,
    pub samples: usize,
    pub powered_down: bool,
    pub retained: Option<Session>,
    pub power_budget_10ms: Option<u64>,
}

impl ScriptedBoard {
    pub fn new() -> Self {
        Self {
            voltage: 160,
            ..Self::default()
        }
    }

    pub fn with_voltage(voltage: u8) -> Self {
        Self {
            voltage,
            ..Self::default()
        }
    }

    pub fn with_power_budget(budget_10ms: u64) -> Self {
        Self {
            power_budget_10ms: Some(budget_10ms),
            ..Self::new()
        }
    }

    pub fn last_duty(&self) -> Option<u8> {
        self.duties.last().copied()
    }
}

impl Board for ScriptedBoard {
    fn set_duty(&mut self, duty: u8) {
        self.duties.push(duty);
    }

    fn delay_10ms(&mut self, units: u16) {
        let target = self.elapsed_10ms + u64::from(units);
        if let Some(budget) = self.power_budget_10ms {
            if target >= budget {
                self.elapsed_10ms = budget;
                std::panic::panic_any(POWER_LOST);
            }
        }
        self.elapsed_10ms = target;
    }

    fn sample_voltage(&mut self) -> u8 {
        let voltage = self.voltages.get(self.samples).copied().unwrap_or(self.voltage);
        self.samples += 1;
        voltage
    }

    fn power_down(&mut self) {
        self.powered_down = true;
    }

    fn retain(&mut self, session: &Session) {
        self.retained = Some(session.clone());
    }
}
