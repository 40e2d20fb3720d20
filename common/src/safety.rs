use serde::Serialize;

use crate::config::RampConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RampReason {
    BrightLimit,
    LowVoltage,
    CriticalVoltage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum SafetyEvent {
    StepDown { from: u8, to: u8, reason: RampReason },
    Cutoff { voltage: u8 },
}

#[derive(Debug, Clone, Default)]
pub struct SafetyLoop {
    bright_ticks: u16,
    low_power_ticks: u16,
    last_voltage: Option<u8>,
}

impl SafetyLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bright_ticks(&self) -> u16 {
        self.bright_ticks
    }

    pub fn low_power_ticks(&self) -> u16 {
        self.low_power_ticks
    }

    pub fn last_voltage(&self) -> Option<u8> {
        self.last_voltage
    }

    pub fn check_bright(&mut self, config: &RampConfig, position: &mut u8) -> Option<SafetyEvent> {
        if !config.bright_limit_enabled {
            return None;
        }

        self.bright_ticks = if *position >= config.high_power_position {
            self.bright_ticks.saturating_add(1)
        } else {
            0
        };

        if self.bright_ticks < config.bright_timer_ticks {
            return None;
        }

        self.bright_ticks = 0;
        let from = *position;
        *position = position.saturating_sub(1);
        Some(SafetyEvent::StepDown {
            from,
            to: *position,
            reason: RampReason::BrightLimit,
        })
    }

    pub fn check_power(
        &mut self,
        config: &RampConfig,
        position: &mut u8,
        voltage: u8,
    ) -> Vec<SafetyEvent> {
        self.last_voltage = Some(voltage);
        let mut events = Vec::new();

        if config.low_voltage_enabled
            && voltage < config.low_voltage_adc
            && *position > config.low_voltage_ceiling
        {
            events.push(SafetyEvent::StepDown {
                from: *position,
                to: config.low_voltage_ceiling,
                reason: RampReason::LowVoltage,
            });
            *position = config.low_voltage_ceiling;
        }

        if !config.critical_voltage_enabled {
            return events;
        }

        self.low_power_ticks = if voltage < config.critical_voltage_adc {
            self.low_power_ticks.saturating_add(1)
        } else {
            0
        };

        if self.low_power_ticks < config.low_power_timer_ticks {
            return events;
        }

        self.low_power_ticks = 0;
        if *position > config.critical_floor {
            let from = *position;
            *position -= 1;
            events.push(SafetyEvent::StepDown {
                from,
                to: *position,
                reason: RampReason::CriticalVoltage,
            });
        } else if voltage < config.cutoff_voltage_adc {
            *position = 0;
            events.push(SafetyEvent::Cutoff { voltage });
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn bright_limit_steps_down_after_timer() {
        let config = RampConfig::default();
        let mut safety = SafetyLoop::new();
        let mut position = 5;

        for _ in 0..179 {
            assert_eq!(safety.check_bright(&config, &mut position), None);
        }
        assert_eq!(
            safety.check_bright(&config, &mut position),
            Some(SafetyEvent::StepDown {
                from: 5,
                to: 4,
                reason: RampReason::BrightLimit
            })
        );
        assert_eq!(safety.bright_ticks(), 0);

        for _ in 0..500 {
            assert_eq!(safety.check_bright(&config, &mut position), None);
        }
        assert_eq!(position, 4);
    }

    #[test]
    fn bright_counter_resets_below_threshold() {
        let config = RampConfig::default();
        let mut safety = SafetyLoop::new();
        let mut position = 5;

        for _ in 0..100 {
            safety.check_bright(&config, &mut position);
        }
        let mut lower = 4;
        safety.check_bright(&config, &mut lower);
        assert_eq!(safety.bright_ticks(), 0);
    }

    #[test]
    fn low_band_clamps_immediately() {
        let config = RampConfig::default();
        let mut safety = SafetyLoop::new();
        let mut position = 5;

        let event = safety.check_power(&config, &mut position, 130);

        assert_eq!(position, 3);
        assert_eq!(
            event,
            vec![SafetyEvent::StepDown {
                from: 5,
                to: 3,
                reason: RampReason::LowVoltage
            }]
        );
    }

    #[test]
    fn low_band_never_raises_position() {
        let config = RampConfig::default();
        let mut safety = SafetyLoop::new();
        let mut position = 1;

        assert!(safety.check_power(&config, &mut position, 130).is_empty());
        assert_eq!(position, 1);
    }

    #[test]
    fn critical_counter_resets_when_voltage_recovers() {
        let config = RampConfig::default();
        let mut safety = SafetyLoop::new();
        let mut position = 3;

        for _ in 0..4 {
            safety.check_power(&config, &mut position, 125);
        }
        assert_eq!(safety.low_power_ticks(), 4);

        safety.check_power(&config, &mut position, 140);
        assert_eq!(safety.low_power_ticks(), 0);
        assert_eq!(position, 3);
    }

    #[test]
    fn critical_ladder_steps_to_floor_then_cuts_off() {
        let config = RampConfig {
            low_voltage_enabled: false,
            ..RampConfig::default()
        };
        let mut safety = SafetyLoop::new();
        let mut position = 5;
        let mut history = Vec::new();
        let mut cutoff_tick = None;

        for tick in 1..=40 {
            let before = position;
            let events = safety.check_power(&config, &mut position, 110);
            assert!(position <= before, "ramp raised brightness at tick {tick}");
            history.push(position);
            if let [SafetyEvent::Cutoff { .. }] = events.as_slice() {
                cutoff_tick = Some(tick);
                break;
            }
        }

        assert_eq!(history[4], 4);
        assert_eq!(history[9], 3);
        assert_eq!(history[14], 2);
        assert_eq!(cutoff_tick, Some(20));
        assert_eq!(position, 0);
    }

    #[test]
    fn floor_holds_without_cutoff_above_cutoff_band() {
        let config = RampConfig::default();
        let mut safety = SafetyLoop::new();
        let mut position = 2;

        for _ in 0..50 {
            assert!(safety.check_power(&config, &mut position, 125).is_empty());
        }
        assert_eq!(position, 2);
    }

    #[test]
    fn low_clamp_and_critical_step_in_one_tick_report_both() {
        let config = RampConfig::default();
        let mut safety = SafetyLoop::new();
        let mut position = 2;

        for _ in 0..4 {
            assert!(safety.check_power(&config, &mut position, 110).is_empty());
        }
        position = 5;

        let events = safety.check_power(&config, &mut position, 110);

        assert_eq!(
            events,
            vec![
                SafetyEvent::StepDown {
                    from: 5,
                    to: 3,
                    reason: RampReason::LowVoltage
                },
                SafetyEvent::StepDown {
                    from: 3,
                    to: 2,
                    reason: RampReason::CriticalVoltage
                },
            ]
        );
        assert_eq!(position, 2);
    }
}
