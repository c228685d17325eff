//! Brake line control.
//!
//! The brake shorts the motor bridge outputs. Some bridges treat a high brake
//! line as "release", which is configured with a negative brake pin.

use crate::driver::MotorDriver;
use crate::traits::{ExecContext, TrackBoard};

impl<B: TrackBoard> MotorDriver<B> {
    /// Applies (`true`) or releases (`false`) the brake.
    ///
    /// Pass [`ExecContext::Interrupt`] when calling with interrupts already
    /// masked, e.g. from the waveform interrupt during a RailCom cutout. No-op
    /// without a brake pin.
    pub fn set_brake(&self, on: bool, ctx: ExecContext<'_>) {
        let (Some(brake), Some(fast)) = (self.brake_pin, self.fast_brake) else {
            return;
        };
        let high = on != brake.is_inverted();
        ctx.masked(|cs| fast.write(&self.board, cs, high));
    }

    /// Returns true if the brake pin can be driven by hardware PWM.
    pub fn brake_can_pwm(&self) -> bool {
        self.brake_pin
            .map(|brake| self.board.is_pwm_pin(brake.pin()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::DriverConfig;
    use crate::hal::MockBoard;
    use crate::traits::ExecContext;
    use crate::MotorDriver;

    #[test]
    fn brake_follows_request() {
        let board = MockBoard::new();
        let driver = MotorDriver::new(&board, &DriverConfig::new(3, 12).with_brake(41)).unwrap();

        driver.set_brake(true, ExecContext::Thread);
        assert!(board.output_bit(41));
        driver.set_brake(false, ExecContext::Thread);
        assert!(!board.output_bit(41));
    }

    #[test]
    fn inverted_brake() {
        let board = MockBoard::new();
        let driver = MotorDriver::new(&board, &DriverConfig::new(3, 12).with_brake(-41)).unwrap();

        driver.set_brake(true, ExecContext::Thread);
        assert!(!board.output_bit(41));
        driver.set_brake(false, ExecContext::Thread);
        assert!(board.output_bit(41));
    }

    #[test]
    fn brake_from_interrupt_context() {
        let board = MockBoard::new();
        let driver = MotorDriver::new(&board, &DriverConfig::new(3, 12).with_brake(41)).unwrap();

        critical_section::with(|cs| driver.set_brake(true, ExecContext::Interrupt(cs)));
        assert!(board.output_bit(41));
    }

    #[test]
    fn no_brake_pin_is_noop() {
        let board = MockBoard::new();
        let driver = MotorDriver::new(&board, &DriverConfig::new(3, 12)).unwrap();
        let writes = board.port_writes();
        driver.set_brake(true, ExecContext::Thread);
        assert_eq!(board.port_writes(), writes);
        assert!(!driver.brake_can_pwm());
    }

    #[test]
    fn brake_pwm_capability() {
        let board = MockBoard::new().with_pwm_pins(&[9]);
        let driver = MotorDriver::new(&board, &DriverConfig::new(3, 12).with_brake(-9)).unwrap();
        assert!(driver.brake_can_pwm());
    }
}
