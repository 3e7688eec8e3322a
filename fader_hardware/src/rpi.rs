//! Raspberry Pi backend: H-bridge motor drive over GPIO and wiper position
//! sensing through two MCP3008 ADCs on SPI (the Pi has no on-chip ADC).
//!
//! Pin tables default to the reference wiring; override via `PinMap`.

use rppal::gpio::{Gpio, OutputPin};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

use crate::error::HwError;
use fader_traits::{Direction, MotorDriver, NUM_CHANNELS, PositionSensor};

/// Software PWM carrier for the motor drivers.
const PWM_HZ: f64 = 25_000.0;

/// GPIO/ADC assignment for the ten channels.
#[derive(Debug, Clone)]
pub struct PinMap {
    pub pwm: [u8; NUM_CHANNELS],
    pub dir_a: [u8; NUM_CHANNELS],
    pub dir_b: [u8; NUM_CHANNELS],
}

impl Default for PinMap {
    fn default() -> Self {
        Self {
            pwm: [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
            dir_a: [26, 28, 30, 32, 34, 36, 38, 40, 10, 51],
            dir_b: [27, 29, 31, 33, 35, 37, 39, 41, 11, 52],
        }
    }
}

pub struct RpiFaderBank {
    pwm: Vec<OutputPin>,
    dir_a: Vec<OutputPin>,
    dir_b: Vec<OutputPin>,
    /// Channels 0..8 on the first ADC, the rest on the second.
    adcs: [Spi; 2],
}

impl RpiFaderBank {
    pub fn new(pins: &PinMap) -> Result<Self, HwError> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let mut pwm = Vec::with_capacity(NUM_CHANNELS);
        let mut dir_a = Vec::with_capacity(NUM_CHANNELS);
        let mut dir_b = Vec::with_capacity(NUM_CHANNELS);
        for i in 0..NUM_CHANNELS {
            pwm.push(Self::output(&gpio, pins.pwm[i])?);
            dir_a.push(Self::output(&gpio, pins.dir_a[i])?);
            dir_b.push(Self::output(&gpio, pins.dir_b[i])?);
        }
        let adcs = [
            Self::adc(SlaveSelect::Ss0)?,
            Self::adc(SlaveSelect::Ss1)?,
        ];
        tracing::info!("rpi fader bank initialized");
        Ok(Self {
            pwm,
            dir_a,
            dir_b,
            adcs,
        })
    }

    fn output(gpio: &Gpio, pin: u8) -> Result<OutputPin, HwError> {
        let mut out = gpio
            .get(pin)
            .map_err(|e| HwError::Gpio(format!("pin {pin}: {e}")))?
            .into_output();
        out.set_low();
        Ok(out)
    }

    fn adc(ss: SlaveSelect) -> Result<Spi, HwError> {
        Spi::new(Bus::Spi0, ss, 1_350_000, Mode::Mode0)
            .map_err(|e| HwError::Adc(e.to_string()))
    }

    /// Single-ended MCP3008 conversion, scaled from 10 bits down to the
    /// 8-bit range the control core calibrates against.
    fn read_adc(&mut self, channel: usize) -> Result<i32, HwError> {
        let adc = &mut self.adcs[channel / 8];
        let mux = (channel % 8) as u8;
        let tx = [0x01, 0x80 | (mux << 4), 0x00];
        let mut rx = [0u8; 3];
        adc.transfer(&mut rx, &tx)
            .map_err(|e| HwError::Adc(e.to_string()))?;
        let raw10 = (i32::from(rx[1] & 0x03) << 8) | i32::from(rx[2]);
        Ok(raw10 >> 2)
    }
}

impl PositionSensor for RpiFaderBank {
    fn read_raw(
        &mut self,
        channel: usize,
    ) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        if channel >= NUM_CHANNELS {
            return Err(Box::new(HwError::BadChannel(channel)));
        }
        Ok(self.read_adc(channel)?)
    }
}

impl MotorDriver for RpiFaderBank {
    fn drive(
        &mut self,
        channel: usize,
        direction: Direction,
        duty: u8,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if channel >= NUM_CHANNELS {
            return Err(Box::new(HwError::BadChannel(channel)));
        }
        match direction {
            Direction::Stopped => {
                self.dir_a[channel].set_low();
                self.dir_b[channel].set_low();
                self.pwm[channel]
                    .clear_pwm()
                    .map_err(|e| HwError::Gpio(e.to_string()))?;
                return Ok(());
            }
            Direction::Forward => {
                self.dir_a[channel].set_high();
                self.dir_b[channel].set_low();
            }
            Direction::Reverse => {
                self.dir_a[channel].set_low();
                self.dir_b[channel].set_high();
            }
        }
        self.pwm[channel]
            .set_pwm_frequency(PWM_HZ, f64::from(duty) / 255.0)
            .map_err(|e| HwError::Gpio(e.to_string()))?;
        Ok(())
    }
}
