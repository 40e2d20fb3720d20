// Starting the process switches the light on and Ctrl-C cuts the supply.
// Retained RAM is written to `session.json` at the cut and consumed on the
// next start, so restarting quickly enough counts as a click.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use lumen_common::{
    curve, Board, Driver, DriverConfig, Nvm, RetentionPolicy, SafetyEvent, Session,
};

const DEFAULT_RETAIN_MS: u64 = 3_000;
const DEFAULT_LONG_PRESS_MS: u64 = 1_500;
const DEFAULT_BATTERY_ADC: f64 = 160.0;
const DEFAULT_BATTERY_DRAIN: f64 = 0.05;
const STATUS_EVERY_TICKS: u32 = 10;
const SLEEP_SLICE: Duration = Duration::from_millis(20);
const WORKER_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize, Deserialize)]
struct RetainedSession {
    session: Session,
    #[serde(rename = "lostAtMs")]
    lost_at_ms: u64,
}

#[derive(Clone)]
struct SimStore {
    config_path: Arc<PathBuf>,
    image_path: Arc<PathBuf>,
    session_path: Arc<PathBuf>,
}

#[derive(Clone)]
struct Supply(Arc<AtomicBool>);

impl Supply {
    fn on() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    fn is_on(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn cut(&self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
struct SimCell {
    adc: f64,
    drain_per_s: f64,
}

impl SimCell {
    fn discharge(&mut self, duty: u8, seconds: f64) {
        let load = f64::from(duty) / f64::from(u8::MAX);
        self.adc = (self.adc - self.drain_per_s * load * seconds).max(0.0);
    }

    fn reading(&self) -> u8 {
        self.adc.round().clamp(0.0, f64::from(u8::MAX)) as u8
    }
}

struct SimBoard {
    supply: Supply,
    ram: Arc<Mutex<Session>>,
    time_scale: f64,
    duty: u8,
    cell: SimCell,
    // ADC conversion started by the previous sample.
    pending_sample: u8,
}

impl SimBoard {
    fn new(supply: Supply, ram: Arc<Mutex<Session>>, time_scale: f64, cell: SimCell) -> Self {
        let pending_sample = cell.reading();
        Self {
            supply,
            ram,
            time_scale,
            duty: 0,
            cell,
            pending_sample,
        }
    }
}

impl Board for SimBoard {
    fn set_duty(&mut self, duty: u8) {
        if !self.supply.is_on() {
            return;
        }
        if duty != self.duty {
            debug!(duty, "pwm");
        }
        self.duty = duty;
    }

    fn delay_10ms(&mut self, units: u16) {
        let simulated = Duration::from_millis(u64::from(units) * 10);
        self.cell.discharge(self.duty, simulated.as_secs_f64());

        let mut remaining = simulated.div_f64(self.time_scale);
        while !remaining.is_zero() && self.supply.is_on() {
            let slice = remaining.min(SLEEP_SLICE);
            std::thread::sleep(slice);
            remaining -= slice;
        }
    }

    fn sample_voltage(&mut self) -> u8 {
        let previous = self.pending_sample;
        self.pending_sample = self.cell.reading();
        previous
    }

    fn power_down(&mut self) {
        self.duty = 0;
        info!(voltage = self.cell.reading(), "battery exhausted, driver asleep");
    }

    fn retain(&mut self, session: &Session) {
        if !self.supply.is_on() {
            return;
        }
        match self.ram.lock() {
            Ok(mut ram) => *ram = session.clone(),
            Err(poisoned) => *poisoned.into_inner() = session.clone(),
        }
    }
}

struct FileNvm {
    path: PathBuf,
    bytes: Vec<u8>,
    supply: Supply,
}

impl Nvm for FileNvm {
    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn read_byte(&self, addr: usize) -> u8 {
        self.bytes.get(addr).copied().unwrap_or(0xFF)
    }

    fn write_byte(&mut self, addr: usize, value: u8) {
        if !self.supply.is_on() {
            return;
        }
        let Some(byte) = self.bytes.get_mut(addr) else {
            warn!(addr, "nvm write out of range");
            return;
        };
        *byte = value;
        if let Err(err) = std::fs::write(&self.path, &self.bytes) {
            warn!("failed to persist nvm image to {}: {err}", self.path.display());
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = SimStore::new();
    let mut config = store.load_config().await.unwrap_or_else(|err| {
        warn!("failed to load driver config: {err:#}");
        DriverConfig::default()
    });
    config.sanitize();

    let policy = RetentionPolicy {
        retain_ms: env_ms("LUMEN_RETENTION_MS", DEFAULT_RETAIN_MS),
        long_press_ms: env_ms("LUMEN_LONG_PRESS_MS", DEFAULT_LONG_PRESS_MS),
    };
    let retained = store.take_retained().await.unwrap_or_else(|err| {
        warn!("discarding retained session: {err:#}");
        None
    });
    let (retained, gap_ms) = match retained {
        Some(retained) => {
            let gap_ms = epoch_ms().saturating_sub(retained.lost_at_ms);
            (Some(retained.session), gap_ms)
        }
        None => (None, u64::MAX),
    };
    let session = Session::resume(retained, &policy, gap_ms);
    info!(
        gap_ms,
        retained = session != Session::cold(),
        long_click = session.long_click,
        "supply on"
    );

    let image = store.load_image(config.store.nvm_capacity).await?;
    let supply = Supply::on();
    let ram = Arc::new(Mutex::new(session.clone()));
    let cell = SimCell {
        adc: env_f64("LUMEN_BATTERY_ADC", DEFAULT_BATTERY_ADC),
        drain_per_s: env_f64("LUMEN_BATTERY_DRAIN", DEFAULT_BATTERY_DRAIN),
    };
    let time_scale = env_f64("LUMEN_TIME_SCALE", 1.0).max(0.01);

    let board = SimBoard::new(supply.clone(), ram.clone(), time_scale, cell);
    let nvm = FileNvm {
        path: store.image_path.as_ref().clone(),
        bytes: image,
        supply: supply.clone(),
    };

    let driver_supply = supply.clone();
    let mut worker =
        tokio::task::spawn_blocking(move || drive(config, board, nvm, session, driver_supply));

    let halted = tokio::select! {
        joined = &mut worker => {
            joined.context("driver thread failed")?;
            true
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            false
        }
    };
    if halted {
        info!("waiting for the supply to be cut");
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;
    }

    supply.cut();
    let session = match ram.lock() {
        Ok(ram) => ram.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    store
        .save_retained(&RetainedSession {
            session,
            lost_at_ms: epoch_ms(),
        })
        .await?;
    info!("supply cut");

    // A pattern that repeats until power loss never returns on its own.
    if !halted && tokio::time::timeout(WORKER_GRACE, worker).await.is_err() {
        debug!("driver thread still busy after supply cut");
        std::process::exit(0);
    }
    Ok(())
}

fn drive(config: DriverConfig, board: SimBoard, nvm: FileNvm, session: Session, supply: Supply) {
    let tick_period = config.timing.tick_period;
    let mut driver = Driver::new(config, board, nvm, session);

    let report = driver.boot();
    if !supply.is_on() {
        return;
    }
    match serde_json::to_string(&report) {
        Ok(body) => info!("boot: {body}"),
        Err(err) => warn!("boot report serialization failed: {err}"),
    }

    let mut ticks = 0_u32;
    while supply.is_on() && !driver.is_halted() {
        for event in driver.tick() {
            log_safety_event(&event);
        }

        ticks = ticks.wrapping_add(1);
        if ticks % STATUS_EVERY_TICKS == 0 || driver.is_halted() {
            match serde_json::to_string(&driver.status()) {
                Ok(body) => info!("status: {body}"),
                Err(err) => warn!("status serialization failed: {err}"),
            }
        }

        if !driver.is_halted() {
            driver.board_mut().delay_10ms(tick_period);
        }
    }
}

fn log_safety_event(event: &SafetyEvent) {
    match event {
        SafetyEvent::StepDown { from, to, reason } => warn!(
            from,
            to,
            duty = curve::duty(*to),
            "brightness stepped down: {reason:?}"
        ),
        SafetyEvent::Cutoff { voltage } => warn!(voltage, "critical voltage, shutting down"),
    }
}

impl SimStore {
    fn new() -> Self {
        let data_dir = std::env::var("LUMEN_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.lumen"));
        let config_path = std::env::var("LUMEN_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("config.json"));
        Self::in_dir(&data_dir, config_path)
    }

    fn in_dir(data_dir: &Path, config_path: PathBuf) -> Self {
        Self {
            config_path: Arc::new(config_path),
            image_path: Arc::new(data_dir.join("eeprom.bin")),
            session_path: Arc::new(data_dir.join("session.json")),
        }
    }

    async fn load_config(&self) -> anyhow::Result<DriverConfig> {
        match tokio::fs::read_to_string(self.config_path.as_ref()).await {
            Ok(raw) => Ok(DriverConfig::from_json(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(DriverConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn load_image(&self, capacity: usize) -> anyhow::Result<Vec<u8>> {
        let path = self.image_path.as_ref();
        let mut image = match tokio::fs::read(path).await {
            Ok(image) => image,
            Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        if image.len() != capacity {
            if !image.is_empty() {
                warn!(
                    found = image.len(),
                    capacity, "nvm image size mismatch, resizing"
                );
            }
            image.resize(capacity, 0xFF);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, &image).await?;
        }
        Ok(image)
    }

    // Retained RAM only survives one boot, so the file is removed once read.
    async fn take_retained(&self) -> anyhow::Result<Option<RetainedSession>> {
        let path = self.session_path.as_ref();
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        tokio::fs::remove_file(path).await?;
        Ok(Some(serde_json::from_slice::<RetainedSession>(&raw)?))
    }

    async fn save_retained(&self, retained: &RetainedSession) -> anyhow::Result<()> {
        let path = self.session_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(retained)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

// Unset falls back to `default`; `off` or an unparsable value disables it.
fn env_ms(key: &str, default: u64) -> Option<u64> {
    match std::env::var(key) {
        Ok(value) => value.trim().parse::<u64>().ok(),
        Err(_) => Some(default),
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis().try_into().unwrap_or(u64::MAX))
        .unwrap_or(0)
}
