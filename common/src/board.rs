use crate::session::Session;

pub trait Board {
    fn set_duty(&mut self, duty: u8);

    fn delay_10ms(&mut self, units: u16);

    // Returns the previous supply-voltage conversion and starts the next one.
    fn sample_voltage(&mut self) -> u8;

    fn power_down(&mut self);

    fn retain(&mut self, _session: &Session) {}

    fn delay_1s(&mut self) {
        self.delay_10ms(100);
    }
}

impl<B: Board + ?Sized> Board for &mut B {
    fn set_duty(&mut self, duty: u8) {
        (**self).set_duty(duty)
    }

    fn delay_10ms(&mut self, units: u16) {
        (**self).delay_10ms(units)
    }

    fn sample_voltage(&mut self) -> u8 {
        (**self).sample_voltage()
    }

    fn power_down(&mut self) {
        (**self).power_down()
    }

    fn retain(&mut self, session: &Session) {
        (**self).retain(session)
    }
}
