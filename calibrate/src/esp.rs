use anyhow::Context;
use esp_idf_hal::{
    adc::{
        attenuation::DB_11,
        oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
        ADC1,
    },
    delay::FreeRtos,
    ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver, Resolution},
    peripherals::Peripherals,
    prelude::*,
};
use esp_idf_svc::log::EspLogger;
use log::{info, warn};

use lumen_common::{calibration, Board, CalibrationTiming, Calibrator};

const PWM_FREQUENCY_HZ: u32 = 20_000;

// GPIO2 is on ADC2 on the classic ESP32.
#[cfg(esp32)]
type BatteryPin = esp_idf_hal::gpio::Gpio34;
#[cfg(not(esp32))]
type BatteryPin = esp_idf_hal::gpio::Gpio2;

struct CalibrationBoard<'d> {
    pwm: LedcDriver<'d>,
    adc: AdcChannelDriver<'d, BatteryPin, AdcDriver<'d, ADC1>>,
}

impl Board for CalibrationBoard<'_> {
    fn set_duty(&mut self, duty: u8) {
        if let Err(err) = self.pwm.set_duty(u32::from(duty)) {
            warn!("failed to set LED duty {duty}: {err}");
        }
    }

    fn delay_10ms(&mut self, units: u16) {
        FreeRtos::delay_ms(u32::from(units) * 10);
    }

    fn sample_voltage(&mut self) -> u8 {
        match self.adc.read_raw() {
            Ok(raw) => (raw >> 4).min(u16::from(u8::MAX)) as u8,
            Err(err) => {
                warn!("battery ADC read failed: {err}");
                0
            }
        }
    }

    fn power_down(&mut self) {}
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let peripherals = Peripherals::take()?;
    let timer = LedcTimerDriver::new(
        peripherals.ledc.timer0,
        &TimerConfig::new()
            .frequency(PWM_FREQUENCY_HZ.Hz().into())
            .resolution(Resolution::Bits8),
    )
    .context("failed to configure LED timer")?;
    let pwm = LedcDriver::new(peripherals.ledc.channel0, &timer, peripherals.pins.gpio4)
        .context("failed to configure LED channel")?;

    #[cfg(esp32)]
    let battery_pin = peripherals.pins.gpio34;
    #[cfg(not(esp32))]
    let battery_pin = peripherals.pins.gpio2;

    let adc = AdcChannelDriver::new(
        AdcDriver::new(peripherals.adc1)?,
        battery_pin,
        &AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        },
    )
    .context("failed to configure battery ADC")?;

    let mut board = CalibrationBoard { pwm, adc };
    let calibrator = Calibrator::new(CalibrationTiming::default());
    info!("calibration started");

    loop {
        let readings = calibrator.cycle(&mut board);
        for (level, reading) in readings.iter().enumerate() {
            info!(
                "level {level} (duty {}): reading {reading}, digits {:?}",
                calibration::level_duty(level),
                calibration::digits(*reading)
            );
        }
    }
}
