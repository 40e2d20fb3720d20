use serde::{Deserialize, Serialize};

use crate::{curve::CURVE_SIZE, error::ConfigError, store::MODES};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RampConfig {
    pub bright_limit_enabled: bool,
    pub high_power_position: u8,
    pub bright_timer_ticks: u16,

    pub low_voltage_enabled: bool,
    pub low_voltage_adc: u8,
    pub low_voltage_ceiling: u8,

    pub critical_voltage_enabled: bool,
    pub critical_voltage_adc: u8,
    pub critical_floor: u8,
    pub cutoff_voltage_adc: u8,
    pub low_power_timer_ticks: u16,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            bright_limit_enabled: true,
            high_power_position: 5,
            bright_timer_ticks: 180,
            low_voltage_enabled: true,
            low_voltage_adc: 132,
            low_voltage_ceiling: 3,
            critical_voltage_enabled: true,
            critical_voltage_adc: 128,
            critical_floor: 2,
            cutoff_voltage_adc: 120,
            low_power_timer_ticks: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickMap {
    pub max: u8,
    pub min: u8,
    pub battery: u8,
    pub emergency: u8,
    pub configure: u8,
    pub setup: u8,
    pub save: u8,
    pub reset: u8,
}

impl Default for ClickMap {
    fn default() -> Self {
        Self {
            max: 3,
            min: 4,
            battery: 5,
            emergency: 6,
            configure: 9,
            setup: 3,
            save: 4,
            reset: 9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmergencyPattern {
    Disabled,
    Sos,
    Alpine,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub battery_readout: bool,
    pub emergency: EmergencyPattern,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            battery_readout: true,
            emergency: EmergencyPattern::Sos,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub blink_position: u8,
    pub emergency_position: u8,
    pub emergency_speed: u8,
    // `None` repeats until power is cut.
    pub emergency_repeats: Option<u32>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            blink_position: 3,
            emergency_position: 4,
            emergency_speed: 20,
            emergency_repeats: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub click_settle: u16,
    pub click_guard: u16,
    pub setup_lead_in: u16,
    pub tick_period: u16,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            click_settle: 5,
            click_guard: 20,
            setup_lead_in: 100,
            tick_period: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub nvm_capacity: usize,
    pub default_index: u8,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            nvm_capacity: 64,
            default_index: (MODES / 2) as u8,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub ramps: RampConfig,
    pub clicks: ClickMap,
    pub features: FeatureConfig,
    pub patterns: PatternConfig,
    pub timing: TimingConfig,
    pub store: StoreConfig,
}

impl DriverConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ramps = &self.ramps;
        if ramps.critical_voltage_adc > ramps.low_voltage_adc {
            return Err(ConfigError::Invalid(
                "ramps.critical_voltage_adc must not exceed ramps.low_voltage_adc",
            ));
        }
        if ramps.cutoff_voltage_adc > ramps.critical_voltage_adc {
            return Err(ConfigError::Invalid(
                "ramps.cutoff_voltage_adc must not exceed ramps.critical_voltage_adc",
            ));
        }

        let codes = [
            self.clicks.max,
            self.clicks.min,
            self.clicks.battery,
            self.clicks.emergency,
            self.clicks.configure,
        ];
        if !distinct_commands(&codes) {
            return Err(ConfigError::Invalid(
                "clicks: light commands must be distinct and above 2",
            ));
        }
        if !distinct_commands(&[self.clicks.setup, self.clicks.save, self.clicks.reset]) {
            return Err(ConfigError::Invalid(
                "clicks: configuration commands must be distinct and above 2",
            ));
        }

        if self.store.nvm_capacity <= MODES {
            return Err(ConfigError::Invalid(
                "store.nvm_capacity must hold the index byte and every profile slot",
            ));
        }
        Ok(())
    }

    pub fn sanitize(&mut self) {
        let ramps = &mut self.ramps;
        ramps.high_power_position = ramps.high_power_position.clamp(1, CURVE_SIZE);
        ramps.bright_timer_ticks = ramps.bright_timer_ticks.max(1);
        ramps.low_voltage_ceiling = ramps.low_voltage_ceiling.clamp(1, CURVE_SIZE);
        ramps.critical_floor = ramps.critical_floor.clamp(1, CURVE_SIZE);
        ramps.low_power_timer_ticks = ramps.low_power_timer_ticks.max(1);

        self.patterns.blink_position = self.patterns.blink_position.clamp(1, CURVE_SIZE);
        self.patterns.emergency_position = self.patterns.emergency_position.clamp(1, CURVE_SIZE);
        self.patterns.emergency_speed = self.patterns.emergency_speed.max(1);

        self.timing.tick_period = self.timing.tick_period.max(1);

        if self.store.nvm_capacity <= MODES {
            self.store.nvm_capacity = StoreConfig::default().nvm_capacity;
        }
        if usize::from(self.store.default_index) >= MODES {
            self.store.default_index = StoreConfig::default().default_index;
        }
    }
}

fn distinct_commands(codes: &[u8]) -> bool {
    codes.iter().all(|code| *code > 2)
        && codes
            .iter()
            .enumerate()
            .all(|(i, code)| !codes[i + 1..].contains(code))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let config = DriverConfig::from_json("{}").unwrap();
        assert_eq!(config, DriverConfig::default());
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let config =
            DriverConfig::from_json(r#"{"ramps":{"bright_timer_ticks":60},"features":{"emergency":"alpine"}}"#)
                .unwrap();

        assert_eq!(config.ramps.bright_timer_ticks, 60);
        assert_eq!(config.ramps.low_voltage_adc, 132);
        assert_eq!(config.features.emergency, EmergencyPattern::Alpine);
        assert!(config.features.battery_readout);
    }

    #[test]
    fn inverted_voltage_bands_are_rejected() {
        let err = DriverConfig::from_json(r#"{"ramps":{"cutoff_voltage_adc":130}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn clashing_click_codes_are_rejected() {
        let err = DriverConfig::from_json(r#"{"clicks":{"min":3}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = DriverConfig::from_json(r#"{"clicks":{"save":2}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = DriverConfig::from_json("{ramps").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn sanitize_clamps_positions_and_index() {
        let mut config = DriverConfig::default();
        config.ramps.high_power_position = 40;
        config.ramps.low_power_timer_ticks = 0;
        config.patterns.blink_position = 0;
        config.store.default_index = 9;
        config.store.nvm_capacity = 2;

        config.sanitize();

        assert_eq!(config.ramps.high_power_position, CURVE_SIZE);
        assert_eq!(config.ramps.low_power_timer_ticks, 1);
        assert_eq!(config.patterns.blink_position, 1);
        assert_eq!(config.store.default_index, 2);
        assert_eq!(config.store.nvm_capacity, 64);
    }
}
