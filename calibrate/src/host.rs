use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Context;
use tracing::{debug, info};

use lumen_common::{calibration, Board, CalibrationTiming, Calibrator};

const SLEEP_SLICE: Duration = Duration::from_millis(20);

// Fixed internal resistance: the reading sags under load.
struct LoadedCellBoard {
    open_circuit_adc: f64,
    sag_at_full_duty: f64,
    duty: u8,
    time_scale: f64,
    running: Arc<AtomicBool>,
}

impl Board for LoadedCellBoard {
    fn set_duty(&mut self, duty: u8) {
        debug!(duty, "pwm");
        self.duty = duty;
    }

    fn delay_10ms(&mut self, units: u16) {
        let mut remaining = Duration::from_millis(u64::from(units) * 10).div_f64(self.time_scale);
        while !remaining.is_zero() && self.running.load(Ordering::Acquire) {
            let slice = remaining.min(SLEEP_SLICE);
            std::thread::sleep(slice);
            remaining -= slice;
        }
    }

    fn sample_voltage(&mut self) -> u8 {
        let load = f64::from(self.duty) / f64::from(u8::MAX);
        let adc = self.open_circuit_adc - self.sag_at_full_duty * load;
        adc.round().clamp(0.0, f64::from(u8::MAX)) as u8
    }

    fn power_down(&mut self) {}
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let running = Arc::new(AtomicBool::new(true));
    let mut board = LoadedCellBoard {
        open_circuit_adc: env_f64("LUMEN_BATTERY_ADC", 160.0),
        sag_at_full_duty: env_f64("LUMEN_BATTERY_SAG", 12.0),
        duty: 0,
        time_scale: env_f64("LUMEN_TIME_SCALE", 1.0).max(0.01),
        running: running.clone(),
    };

    info!("calibration started");

    let worker_running = running.clone();
    let worker = tokio::task::spawn_blocking(move || {
        let calibrator = Calibrator::new(CalibrationTiming::default());
        while worker_running.load(Ordering::Acquire) {
            let readings = calibrator.cycle(&mut board);
            for (level, reading) in readings.iter().enumerate() {
                info!(
                    duty = calibration::level_duty(level),
                    reading,
                    digits = ?calibration::digits(*reading),
                    "calibration reading"
                );
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    running.store(false, Ordering::Release);
    worker.await.context("calibration thread failed")?;
    info!("calibration stopped");
    Ok(())
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
}
