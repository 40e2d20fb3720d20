use crate::board::Board;

pub const LEVELS: usize = 3;

pub fn level_duty(level: usize) -> u8 {
    (1 + level.min(LEVELS - 1) * 127) as u8
}

pub fn digits(reading: u8) -> [u8; 3] {
    [reading / 100, reading / 10 % 10, reading % 10]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationTiming {
    pub settle_s: u8,
    pub digit_pause_s: u8,
    pub level_pause_s: u8,
    pub cycle_pause_s: u8,
    pub blink_10ms: u16,
}

impl Default for CalibrationTiming {
    fn default() -> Self {
        Self {
            settle_s: 3,
            digit_pause_s: 1,
            level_pause_s: 5,
            cycle_pause_s: 5,
            blink_10ms: 50,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Calibrator {
    timing: CalibrationTiming,
}

impl Calibrator {
    pub fn new(timing: CalibrationTiming) -> Self {
        Self { timing }
    }

    pub fn cycle<B: Board + ?Sized>(&self, board: &mut B) -> [u8; LEVELS] {
        let mut readings = [0; LEVELS];
        for (level, reading) in readings.iter_mut().enumerate() {
            let duty = level_duty(level);
            board.set_duty(duty);
            self.pause(board, self.timing.settle_s);
            *reading = board.sample_voltage();

            board.set_duty(0);
            self.pause(board, self.timing.settle_s);

            let [hundreds, tens, units] = digits(*reading);
            self.blink(board, hundreds, duty);
            self.pause(board, self.timing.digit_pause_s);
            self.blink(board, tens, duty);
            self.pause(board, self.timing.digit_pause_s);
            self.blink(board, units, duty);
            self.pause(board, self.timing.level_pause_s);
        }
        self.pause(board, self.timing.cycle_pause_s);
        readings
    }

    fn blink<B: Board + ?Sized>(&self, board: &mut B, count: u8, duty: u8) {
        for _ in 0..count {
            board.set_duty(duty);
            board.delay_10ms(self.timing.blink_10ms);
            board.set_duty(0);
            board.delay_10ms(self.timing.blink_10ms);
        }
    }

    fn pause<B: Board + ?Sized>(&self, board: &mut B, seconds: u8) {
        for _ in 0..seconds {
            board.delay_1s();
        }
    }
}
