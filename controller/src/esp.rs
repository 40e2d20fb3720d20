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
use esp_idf_svc::{
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault},
};
use log::{info, warn};

use lumen_common::{
    Board, Driver, DriverConfig, Nvm, RetentionPolicy, SafetyEvent, Session,
};

const NVS_NAMESPACE: &str = "lumen";
const NVS_CONFIG_KEY: &str = "config_json";
const PWM_FREQUENCY_HZ: u32 = 20_000;
const RETAINED_MAGIC: u32 = 0x4C55_4D4E;
const RETAINED_CAPACITY: usize = 192;

// GPIO2 is on ADC2 on the classic ESP32.
#[cfg(esp32)]
type BatteryPin = esp_idf_hal::gpio::Gpio34;
#[cfg(not(esp32))]
type BatteryPin = esp_idf_hal::gpio::Gpio2;

// Any reset other than power-on keeps RTC memory, which is the click path.
// There is no clock across the gap, so long presses cannot be told apart.
const RETENTION: RetentionPolicy = RetentionPolicy {
    retain_ms: Some(0),
    long_press_ms: None,
};

#[repr(C)]
struct RetainedRam {
    magic: u32,
    len: u16,
    bytes: [u8; RETAINED_CAPACITY],
}

#[link_section = ".rtc_noinit"]
static mut RETAINED: RetainedRam = RetainedRam {
    magic: 0,
    len: 0,
    bytes: [0; RETAINED_CAPACITY],
};

struct EspBoard<'d> {
    pwm: LedcDriver<'d>,
    adc: AdcChannelDriver<'d, BatteryPin, AdcDriver<'d, ADC1>>,
    // Conversion taken at the previous sample.
    pending_sample: u8,
}

impl Board for EspBoard<'_> {
    fn set_duty(&mut self, duty: u8) {
        if let Err(err) = self.pwm.set_duty(u32::from(duty)) {
            warn!("failed to set LED duty {duty}: {err}");
        }
    }

    fn delay_10ms(&mut self, units: u16) {
        FreeRtos::delay_ms(u32::from(units) * 10);
    }

    fn sample_voltage(&mut self) -> u8 {
        let previous = self.pending_sample;
        match self.adc.read_raw() {
            // 12-bit conversion down to the 8-bit scale the thresholds use
            Ok(raw) => self.pending_sample = (raw >> 4).min(u16::from(u8::MAX)) as u8,
            Err(err) => warn!("battery ADC read failed: {err}"),
        }
        previous
    }

    fn power_down(&mut self) {
        self.set_duty(0);
        info!("entering deep sleep");
        unsafe { esp_idf_svc::sys::esp_deep_sleep_start() };
    }

    fn retain(&mut self, session: &Session) {
        write_retained(session);
    }
}

// Profile bytes kept one NVS key per address, cached in RAM.
struct NvsEeprom {
    nvs: EspNvs<NvsDefault>,
    bytes: Vec<u8>,
}

impl NvsEeprom {
    fn open(partition: EspDefaultNvsPartition, capacity: usize) -> anyhow::Result<Self> {
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)?;
        let mut bytes = vec![0xFF; capacity];
        for (addr, byte) in bytes.iter_mut().enumerate() {
            match nvs.get_u8(&nvs_key(addr)) {
                Ok(Some(value)) => *byte = value,
                Ok(None) => {}
                Err(err) => warn!("failed to read NVS byte {addr}: {err}"),
            }
        }
        Ok(Self { nvs, bytes })
    }
}

impl Nvm for NvsEeprom {
    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn read_byte(&self, addr: usize) -> u8 {
        self.bytes.get(addr).copied().unwrap_or(0xFF)
    }

    fn write_byte(&mut self, addr: usize, value: u8) {
        let Some(byte) = self.bytes.get_mut(addr) else {
            warn!("NVS write out of range: {addr}");
            return;
        };
        *byte = value;
        if let Err(err) = self.nvs.set_u8(&nvs_key(addr), value) {
            warn!("failed to persist NVS byte {addr}: {err}");
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let nvs_partition = EspDefaultNvsPartition::take()?;
    let mut config = load_config(&nvs_partition).unwrap_or_else(|err| {
        warn!("failed to load driver config from NVS: {err:#}");
        DriverConfig::default()
    });
    config.sanitize();

    let session = resume_session();
    info!(
        "session: retained={}, long_click={}",
        session != Session::cold(),
        session.long_click
    );

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

    let adc = AdcDriver::new(peripherals.adc1)?;
    let adc = AdcChannelDriver::new(
        adc,
        battery_pin,
        &AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        },
    )
    .context("failed to configure battery ADC")?;

    let mut board = EspBoard {
        pwm,
        adc,
        pending_sample: 0,
    };
    // prime the conversion pipeline
    board.sample_voltage();

    let nvm = NvsEeprom::open(nvs_partition, config.store.nvm_capacity)?;
    let mut driver = Driver::new(config, board, nvm, session);

    let report = driver.boot();
    info!("boot: {}", serde_json::to_string(&report)?);

    driver.run(log_safety_event);
    Ok(())
}

fn load_config(partition: &EspDefaultNvsPartition) -> anyhow::Result<DriverConfig> {
    let nvs = EspNvs::new(partition.clone(), NVS_NAMESPACE, true)?;
    let mut buffer = vec![0_u8; 2048];

    match nvs.get_str(NVS_CONFIG_KEY, &mut buffer)? {
        Some(value) => Ok(DriverConfig::from_json(value)?),
        None => Ok(DriverConfig::default()),
    }
}

fn resume_session() -> Session {
    let reason = unsafe { esp_idf_svc::sys::esp_reset_reason() };
    let gap_ms = if reason == esp_idf_svc::sys::esp_reset_reason_t_ESP_RST_POWERON {
        u64::MAX
    } else {
        0
    };
    Session::resume(read_retained(), &RETENTION, gap_ms)
}

fn read_retained() -> Option<Session> {
    // SAFETY: single-threaded access from the main task only.
    let ram = unsafe { &*core::ptr::addr_of!(RETAINED) };
    if ram.magic != RETAINED_MAGIC {
        return None;
    }
    let len = usize::from(ram.len).min(RETAINED_CAPACITY);
    serde_json::from_slice(&ram.bytes[..len]).ok()
}

fn write_retained(session: &Session) {
    let payload = match serde_json::to_vec(session) {
        Ok(payload) if payload.len() <= RETAINED_CAPACITY => payload,
        Ok(payload) => {
            warn!("session does not fit retained RAM ({} bytes)", payload.len());
            return;
        }
        Err(err) => {
            warn!("session serialization failed: {err}");
            return;
        }
    };

    // SAFETY: single-threaded access from the main task only. The magic is
    // cleared first so a reset mid-copy reads as cold.
    let ram = unsafe { &mut *core::ptr::addr_of_mut!(RETAINED) };
    ram.magic = 0;
    ram.bytes[..payload.len()].copy_from_slice(&payload);
    ram.len = payload.len() as u16;
    ram.magic = RETAINED_MAGIC;
}

fn log_safety_event(event: &SafetyEvent) {
    match event {
        SafetyEvent::StepDown { from, to, reason } => {
            warn!("brightness stepped down {from} -> {to}: {reason:?}")
        }
        SafetyEvent::Cutoff { voltage } => warn!("critical voltage {voltage}, shutting down"),
    }
}

fn nvs_key(addr: usize) -> String {
    format!("b{addr:03}")
}
