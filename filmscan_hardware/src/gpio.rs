use rppal::gpio::{Gpio, InputPin, OutputPin};
use tracing::debug;

use filmscan_traits::{HwResult, Led, Stepper, TensionSwitch};

use crate::error::{HwError, Result};

fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}

/// Stepper driver wired as STEP + neutral (enable) lines.
pub struct GpioStepper {
    step: OutputPin,
    neutral: OutputPin,
}

impl GpioStepper {
    pub fn new(gpio: &Gpio, step_pin: u8, neutral_pin: u8) -> Result<Self> {
        let mut step = gpio.get(step_pin).map_err(gpio_err)?.into_output();
        let mut neutral = gpio.get(neutral_pin).map_err(gpio_err)?.into_output();
        step.set_low();
        neutral.set_low();
        debug!(step_pin, neutral_pin, "stepper ready");
        Ok(Self { step, neutral })
    }
}

impl Stepper for GpioStepper {
    fn set_step(&mut self, high: bool) -> HwResult<()> {
        if high {
            self.step.set_high();
        } else {
            self.step.set_low();
        }
        Ok(())
    }

    fn set_neutral(&mut self, released: bool) -> HwResult<()> {
        if released {
            self.neutral.set_high();
        } else {
            self.neutral.set_low();
        }
        Ok(())
    }
}

/// Traction microswitch, active low (closed means taut).
pub struct GpioSwitch {
    pin: InputPin,
}

impl GpioSwitch {
    pub fn new(gpio: &Gpio, pin: u8) -> Result<Self> {
        let pin = gpio.get(pin).map_err(gpio_err)?.into_input_pullup();
        Ok(Self { pin })
    }
}

impl TensionSwitch for GpioSwitch {
    fn is_taut(&mut self) -> HwResult<bool> {
        Ok(self.pin.is_low())
    }
}

/// Software-PWM LED.
pub struct PwmLed {
    pin: OutputPin,
    frequency_hz: f64,
}

impl PwmLed {
    pub fn new(gpio: &Gpio, pin: u8, frequency_hz: f64) -> Result<Self> {
        let mut pin = gpio.get(pin).map_err(gpio_err)?.into_output();
        pin.set_low();
        Ok(Self { pin, frequency_hz })
    }
}

impl Led for PwmLed {
    fn set_level(&mut self, level: u16) -> HwResult<()> {
        if level == 0 {
            self.pin.clear_pwm().map_err(gpio_err)?;
            self.pin.set_low();
            return Ok(());
        }
        let duty = f64::from(level) / f64::from(u16::MAX);
        self.pin
            .set_pwm_frequency(self.frequency_hz, duty)
            .map_err(gpio_err)?;
        Ok(())
    }
}

/// PWM carrier for both LEDs.
pub const LED_PWM_HZ: f64 = 1000.0;

/// Wiring of the transport, in BCM pin numbers.
#[derive(Debug, Clone, Copy)]
pub struct TransportPins {
    pub supply: (u8, u8),
    pub capstan: (u8, u8),
    pub takeup: (u8, u8),
    pub traction_in: u8,
    pub uv_led: u8,
    pub green_led: u8,
}

/// Every GPIO device the controller drives.
pub struct GpioTransport {
    pub supply: GpioStepper,
    pub capstan: GpioStepper,
    pub takeup: GpioStepper,
    pub tension: GpioSwitch,
    pub uv: PwmLed,
    pub green: PwmLed,
}

impl GpioTransport {
    pub fn open(pins: &TransportPins) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        Ok(Self {
            supply: GpioStepper::new(&gpio, pins.supply.0, pins.supply.1)?,
            capstan: GpioStepper::new(&gpio, pins.capstan.0, pins.capstan.1)?,
            takeup: GpioStepper::new(&gpio, pins.takeup.0, pins.takeup.1)?,
            tension: GpioSwitch::new(&gpio, pins.traction_in)?,
            uv: PwmLed::new(&gpio, pins.uv_led, LED_PWM_HZ)?,
            green: PwmLed::new(&gpio, pins.green_led, LED_PWM_HZ)?,
        })
    }
}
