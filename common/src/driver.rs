use crate::{
    board::Board,
    config::{DriverConfig, EmergencyPattern},
    curve::{self, CURVE_SIZE},
    patterns,
    safety::{SafetyEvent, SafetyLoop},
    session::Session,
    store::{ActiveModes, Nvm, PersistentRecord, ProfileStore, MODES},
    types::{Action, BootBehavior, BootReport, Command, Context, DriverStatus},
};

#[derive(Debug)]
pub struct Driver<B, N> {
    config: DriverConfig,
    board: B,
    store: ProfileStore<N>,
    session: Session,

    // Rebuilt from the store on every boot.
    profile: [u8; MODES],
    active: ActiveModes,

    position: u8,
    safety: SafetyLoop,
    halted: bool,
}

impl<B: Board, N: Nvm> Driver<B, N> {
    pub fn new(config: DriverConfig, board: B, nvm: N, session: Session) -> Self {
        let store = ProfileStore::new(nvm, config.store.default_index);
        Self {
            config,
            board,
            store,
            session,
            profile: [0; MODES],
            active: ActiveModes::default(),
            position: 0,
            safety: SafetyLoop::new(),
            halted: false,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn store(&self) -> &ProfileStore<N> {
        &self.store
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn position(&self) -> u8 {
        self.position
    }

    pub fn active_index(&self) -> u8 {
        self.session.active_index.unwrap_or(0)
    }

    pub fn active_modes(&self) -> &[u8] {
        self.active.as_slice()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn into_parts(self) -> (B, N, Session) {
        (self.board, self.store.into_nvm(), self.session)
    }

    pub fn status(&self) -> DriverStatus {
        DriverStatus {
            position: self.position,
            duty: curve::duty(self.position),
            active_index: self.active_index(),
            active_modes: self.active.as_slice().to_vec(),
            context: self.session.context.as_str(),
            bright_ticks: self.safety.bright_ticks(),
            low_power_ticks: self.safety.low_power_ticks(),
            last_voltage: self.safety.last_voltage(),
            halted: self.halted,
        }
    }

    pub fn boot(&mut self) -> BootReport {
        let store_reset = self.reload();

        if self.session.long_click {
            self.session.action = Action::None;
            self.session.command = Command::Idle;
            self.session.active_index = Some(self.store.shadow().last_index);
            self.retain();
        }
        self.settle_index();

        let mut decoded = Action::None;
        let (behavior, boundary) = match self.session.command {
            Command::PickValue => (Some(self.pick_value()), None),
            Command::Idle if self.session.long_click => {
                self.session.long_click = false;
                self.session.short_clicks = 0;
                self.retain();
                (Some(BootBehavior::Restore), None)
            }
            Command::Idle => {
                decoded = self.decode_clicks();
                self.dispatch(decoded)
            }
        };

        let index = self.settle_index();
        self.position = boundary.unwrap_or_else(|| self.active.position(index));

        BootReport {
            action: decoded.code(),
            context: self.session.context.as_str(),
            behavior,
            active_index: index,
            active_count: self.active.count(),
            position: self.position,
            store_reset,
        }
    }

    pub fn tick(&mut self) -> Vec<SafetyEvent> {
        let mut events = Vec::new();
        if self.halted {
            return events;
        }

        if self.position != self.active.position(self.active_index())
            && self.session.action != Action::Redefine
        {
            self.session.action = Action::Redefine;
            self.retain();
        }

        curve::apply(&mut self.board, self.position);

        events.extend(
            self.safety
                .check_bright(&self.config.ramps, &mut self.position),
        );

        let ramps = &self.config.ramps;
        if ramps.low_voltage_enabled || ramps.critical_voltage_enabled {
            let voltage = self.board.sample_voltage();
            let power_events = self.safety.check_power(ramps, &mut self.position, voltage);
            let cutoff = power_events
                .iter()
                .any(|event| matches!(event, SafetyEvent::Cutoff { .. }));
            events.extend(power_events);
            if cutoff {
                self.halted = true;
                curve::apply(&mut self.board, 0);
                self.board.power_down();
            }
        }

        events
    }

    pub fn run(&mut self, mut on_event: impl FnMut(&SafetyEvent)) {
        while !self.halted {
            for event in self.tick() {
                on_event(&event);
            }
            if !self.halted {
                self.board.delay_10ms(self.config.timing.tick_period);
            }
        }
    }

    fn retain(&mut self) {
        self.board.retain(&self.session);
    }

    fn reload(&mut self) -> bool {
        let loaded = self.store.load();
        self.profile = loaded.record.profile;
        self.active = loaded.active;
        loaded.was_reset
    }

    fn settle_index(&mut self) -> u8 {
        let count = self.active.count();
        let index = match self.session.active_index {
            Some(index) if index < count => index,
            _ => self
                .store
                .shadow()
                .last_index
                .min(count.saturating_sub(1)),
        };
        if self.session.active_index != Some(index) {
            self.session.active_index = Some(index);
            self.retain();
        }
        index
    }

    // Turns the click counter into an action. A power cut during the guard
    // delay leaves the counter raised, so the next boot counts one more.
    fn decode_clicks(&mut self) -> Action {
        self.board.delay_10ms(self.config.timing.click_settle);

        let action = if self.session.action == Action::Redefine {
            Action::None
        } else {
            self.session.short_clicks = self.session.short_clicks.saturating_add(1);
            Action::from(self.session.short_clicks)
        };
        self.session.action = action;
        self.retain();

        self.board.delay_10ms(self.config.timing.click_guard);
        self.session.short_clicks = 0;
        self.retain();

        action
    }

    fn dispatch(&mut self, action: Action) -> (Option<BootBehavior>, Option<u8>) {
        match action {
            Action::Next => {
                self.next_mode();
                (Some(BootBehavior::Step), None)
            }
            Action::Prev => {
                self.prev_mode();
                (Some(BootBehavior::Step), None)
            }
            Action::Command(code) => match self.session.context {
                Context::Light => self.light_command(code),
                Context::Configure => (self.configure_command(code), None),
            },
            Action::None | Action::Redefine => (None, None),
        }
    }

    fn next_mode(&mut self) {
        let next = self.active_index().saturating_add(1);
        let index = if next >= self.active.count() {
            self.store.shadow().last_index
        } else {
            next
        };
        self.session.active_index = Some(index);
        self.retain();
    }

    fn prev_mode(&mut self) {
        let index = self.active_index();
        if index > 0 {
            self.session.active_index = Some(index - 1);
            self.retain();
        }
    }

    fn light_command(&mut self, code: u8) -> (Option<BootBehavior>, Option<u8>) {
        let clicks = &self.config.clicks;
        let features = &self.config.features;

        if code == clicks.max {
            (Some(BootBehavior::Boundary), Some(CURVE_SIZE))
        } else if code == clicks.min {
            (Some(BootBehavior::Boundary), Some(1))
        } else if code == clicks.battery && features.battery_readout {
            patterns::battery_readout(
                &mut self.board,
                &self.config.patterns,
                self.config.ramps.low_voltage_adc,
            );
            (Some(BootBehavior::BatteryReadout), None)
        } else if code == clicks.emergency && features.emergency != EmergencyPattern::Disabled {
            let pattern = features.emergency;
            self.session.action = Action::Redefine;
            self.retain();
            patterns::emergency(&mut self.board, &self.config.patterns, pattern);
            (Some(BootBehavior::Emergency), None)
        } else if code == clicks.configure {
            self.session.context = Context::Configure;
            self.retain();
            patterns::confirm_configure(&mut self.board, &self.config.patterns);
            (Some(BootBehavior::EnterConfigure), None)
        } else {
            (None, None)
        }
    }

    fn configure_command(&mut self, code: u8) -> Option<BootBehavior> {
        let clicks = &self.config.clicks;

        if code == clicks.setup {
            self.select_slot();
            Some(BootBehavior::SelectSlot)
        } else if code == clicks.save {
            let record = PersistentRecord {
                last_index: self.active_index(),
                profile: self.profile,
            };
            self.store.save(&record);
            Some(BootBehavior::Save)
        } else if code == clicks.reset {
            self.store.reset();
            self.reload();
            self.session.active_index = None;
            self.retain();
            Some(BootBehavior::Reset)
        } else {
            None
        }
    }

    fn select_slot(&mut self) {
        self.board.delay_10ms(self.config.timing.setup_lead_in);
        self.session.command = Command::PickValue;

        let mut previous: Option<u8> = None;
        for slot in 0..MODES {
            if matches!(previous, Some(position) if position == 0 || position >= CURVE_SIZE) {
                break;
            }
            self.session.edit_slot = slot as u8;
            self.retain();

            let position = self.profile[slot];
            patterns::indicate(&mut self.board, position);
            previous = Some(position);
        }

        self.session.command = Command::Idle;
        self.retain();
    }

    // Sweeps candidate positions for the recorded slot, persisting each one
    // before it is shown. Cutting power keeps the candidate on display; a
    // sweep that runs to the end puts the original value back.
    fn pick_value(&mut self) -> BootBehavior {
        let slot = usize::from(self.session.edit_slot).min(MODES - 1);
        self.board.delay_10ms(self.config.timing.setup_lead_in);

        let original = self.profile[slot];
        self.session.command = Command::Idle;
        self.session.action = Action::Redefine;
        self.session.active_index = None;
        self.retain();

        let start = match slot {
            0 => 0,
            _ => self.profile[slot - 1].saturating_add(1),
        };
        for candidate in start..=CURVE_SIZE {
            self.profile[slot] = candidate;
            self.persist_profile();
            patterns::indicate(&mut self.board, candidate);
        }

        self.profile[slot] = original;
        self.persist_profile();
        self.reload();

        BootBehavior::PickValue { slot: slot as u8 }
    }

    fn persist_profile(&mut self) {
        let record = PersistentRecord {
            last_index: self.store.shadow().last_index,
            profile: self.profile,
        };
        self.store.save(&record);
    }
}
