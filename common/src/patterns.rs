use crate::{
    board::Board,
    config::{EmergencyPattern, PatternConfig},
    curve,
};

pub fn pulses<B: Board + ?Sized>(
    board: &mut B,
    count: u16,
    on_position: u8,
    on_10ms: u16,
    off_position: u8,
    off_10ms: u16,
) {
    for _ in 0..count {
        curve::apply(board, on_position);
        board.delay_10ms(on_10ms);
        curve::apply(board, off_position);
        board.delay_10ms(off_10ms);
    }
}

pub fn indicate<B: Board + ?Sized>(board: &mut B, position: u8) {
    pulses(board, 1, position.saturating_add(1), 10, position, 240);
}

pub fn confirm_configure<B: Board + ?Sized>(board: &mut B, config: &PatternConfig) {
    pulses(board, 10, config.blink_position, 2, 0, 3);
}

pub fn battery_readout<B: Board + ?Sized>(
    board: &mut B,
    config: &PatternConfig,
    low_voltage_adc: u8,
) -> u16 {
    let voltage = board.sample_voltage();
    let count = u16::from(voltage.saturating_sub(low_voltage_adc) >> 3);
    pulses(board, count, config.blink_position, 50, 0, 50);
    board.delay_1s();
    count
}

pub fn emergency<B: Board + ?Sized>(
    board: &mut B,
    config: &PatternConfig,
    pattern: EmergencyPattern,
) {
    let mut round = 0_u32;
    while config.emergency_repeats.map_or(true, |repeats| round < repeats) {
        match pattern {
            EmergencyPattern::Sos => sos_round(board, config),
            EmergencyPattern::Alpine => alpine_round(board, config),
            EmergencyPattern::Disabled => return,
        }
        delay_1m(board);
        round += 1;
    }
}

fn sos_round<B: Board + ?Sized>(board: &mut B, config: &PatternConfig) {
    let speed = u16::from(config.emergency_speed);
    for letter in 0..3 {
        let on = if letter == 1 { speed * 3 } else { speed };
        pulses(board, 3, config.emergency_position, on, 0, speed);
        board.delay_10ms(speed * 2);
    }
}

fn alpine_round<B: Board + ?Sized>(board: &mut B, config: &PatternConfig) {
    for _ in 0..6 {
        curve::apply(board, config.emergency_position);
        board.delay_10ms(20);
        curve::apply(board, 0);
        board.delay_10ms(1_000);
    }
}

fn delay_1m<B: Board + ?Sized>(board: &mut B) {
    for _ in 0..60 {
        board.delay_1s();
    }
}
