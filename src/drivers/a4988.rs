// A4988 microstepping bipolar stepper driver (Stepper click)
//
// Pure GPIO: one STEP rising edge moves one (micro)step in the DIR
// direction. ENABLE, SLEEP and RESET are all active low. The MS1..MS3
// jumpers set microstepping in hardware, so Config only records it.

use core::convert::Infallible;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::debug;

use crate::error::Error;

// datasheet wake-up time before the first STEP
const WAKE_DELAY_US: u32 = 1_000;
const RESET_PULSE_US: u32 = 10;

pub type StepperError = Error<Infallible>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Clockwise,
    CounterClockwise,
}

/// Full step period presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Speed {
    VerySlow,
    Slow,
    #[default]
    Medium,
    Fast,
    VeryFast,
    PeriodUs(u32),
}

impl Speed {
    pub const fn period_us(self) -> u32 {
        match self {
            Speed::VerySlow => 10_000,
            Speed::Slow => 5_000,
            Speed::Medium => 2_500,
            Speed::Fast => 1_000,
            Speed::VeryFast => 500,
            Speed::PeriodUs(us) => if us < 2 { 2 } else { us },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Full steps per revolution of the motor, 200 for a 1.8° motor.
    pub steps_per_revolution: u32,
    /// 1, 2, 4, 8 or 16, as set by the MS jumpers.
    pub microsteps: u8,
    pub speed: Speed,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub const fn new() -> Self {
        Self {
            steps_per_revolution: 200,
            microsteps: 1,
            speed: Speed::Medium,
        }
    }

    pub const fn with_steps_per_revolution(mut self, steps: u32) -> Self {
        self.steps_per_revolution = steps;
        self
    }

    pub const fn with_microsteps(mut self, microsteps: u8) -> Self {
        self.microsteps = microsteps;
        self
    }

    pub const fn with_speed(mut self, speed: Speed) -> Self {
        self.speed = speed;
        self
    }
}

pub struct Pins<STEP, DIR, EN, SLP, RST> {
    pub step: STEP,
    pub dir: DIR,
    pub enable: EN,
    pub sleep: SLP,
    pub reset: RST,
}

pub struct A4988<STEP, DIR, EN, SLP, RST, D> {
    pins: Pins<STEP, DIR, EN, SLP, RST>,
    delay: D,
    config: Config,
    direction: Direction,
    position: i64,
}

fn pin<E>(r: Result<(), E>) -> Result<(), StepperError> {
    r.map_err(|_| Error::Pin)
}

impl<STEP, DIR, EN, SLP, RST, D> A4988<STEP, DIR, EN, SLP, RST, D>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
    SLP: OutputPin,
    RST: OutputPin,
    D: DelayNs,
{
    pub fn new(pins: Pins<STEP, DIR, EN, SLP, RST>, delay: D, config: Config) -> Self {
        Self {
            pins,
            delay,
            config,
            direction: Direction::Clockwise,
            position: 0,
        }
    }

    pub fn release(self) -> (Pins<STEP, DIR, EN, SLP, RST>, D) {
        (self.pins, self.delay)
    }

    /// Reset the translator, wake and enable the outputs.
    pub fn default_cfg(&mut self) -> Result<(), StepperError> {
        pin(self.pins.step.set_low())?;
        self.set_direction(Direction::Clockwise)?;
        self.reset()?;
        self.wake()?;
        self.enable()?;
        self.position = 0;
        Ok(())
    }

    pub fn set_direction(&mut self, dir: Direction) -> Result<(), StepperError> {
        match dir {
            Direction::Clockwise => pin(self.pins.dir.set_high())?,
            Direction::CounterClockwise => pin(self.pins.dir.set_low())?,
        }
        self.direction = dir;
        Ok(())
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn enable(&mut self) -> Result<(), StepperError> {
        pin(self.pins.enable.set_low())
    }

    pub fn disable(&mut self) -> Result<(), StepperError> {
        pin(self.pins.enable.set_high())
    }

    pub fn sleep(&mut self) -> Result<(), StepperError> {
        pin(self.pins.sleep.set_low())
    }

    pub fn wake(&mut self) -> Result<(), StepperError> {
        pin(self.pins.sleep.set_high())?;
        self.delay.delay_us(WAKE_DELAY_US);
        Ok(())
    }

    /// Pulse RESET; the translator returns to its home microstep.
    pub fn reset(&mut self) -> Result<(), StepperError> {
        pin(self.pins.reset.set_low())?;
        self.delay.delay_us(RESET_PULSE_US);
        pin(self.pins.reset.set_high())
    }

    /// One STEP pulse, half the period high and half low.
    pub fn step(&mut self, speed: Speed) -> Result<(), StepperError> {
        let half = speed.period_us() / 2;
        pin(self.pins.step.set_high())?;
        self.delay.delay_us(half);
        pin(self.pins.step.set_low())?;
        self.delay.delay_us(half);
        self.position += match self.direction {
            Direction::Clockwise => 1,
            Direction::CounterClockwise => -1,
        };
        Ok(())
    }

    /// Signed step count: positive turns clockwise.
    pub fn move_steps(&mut self, steps: i32, speed: Speed) -> Result<(), StepperError> {
        if steps == 0 {
            return Ok(());
        }
        let dir = if steps > 0 { Direction::Clockwise } else { Direction::CounterClockwise };
        self.set_direction(dir)?;
        debug!("a4988: {} steps {:?}", steps, dir);
        for _ in 0..steps.unsigned_abs() {
            self.step(speed)?;
        }
        Ok(())
    }

    /// Rotate by whole degrees at the configured speed.
    pub fn rotate(&mut self, degrees: i32) -> Result<(), StepperError> {
        let steps = self.steps_for_degrees(degrees)?;
        self.move_steps(steps, self.config.speed)
    }

    pub fn steps_for_degrees(&self, degrees: i32) -> Result<i32, StepperError> {
        let per_rev = self.microsteps_per_revolution()?;
        let steps = degrees as i64 * per_rev as i64 / 360;
        i32::try_from(steps).map_err(|_| Error::InvalidArgument)
    }

    pub fn microsteps_per_revolution(&self) -> Result<u32, StepperError> {
        match self.config.microsteps {
            1 | 2 | 4 | 8 | 16 => Ok(self.config.steps_per_revolution * self.config.microsteps as u32),
            _ => Err(Error::InvalidArgument),
        }
    }

    /// Microsteps moved since `default_cfg` or the last `set_position`.
    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn set_position(&mut self, position: i64) {
        self.position = position;
    }
}
