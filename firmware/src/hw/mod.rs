//! STM32G0 lane board: analog pin sensors, solenoid drivers, reset relay and
//! the entry beam.
//!
//! | signal         | MCU pin | notes                          |
//! |----------------|---------|--------------------------------|
//! | B10 (lTwo)     | PA0     | ADC1_IN0, 2:1 divider          |
//! | B11 (lThree)   | PA1     | ADC1_IN1, 2:1 divider          |
//! | B12 (rThree)   | PA4     | ADC1_IN4, 2:1 divider          |
//! | B13 (rTwo)     | PA5     | ADC1_IN5, 2:1 divider          |
//! | B20 (cFive)    | PA6     | ADC1_IN6, 2:1 divider          |
//! | B21 (home)     | PA7     | ADC1_IN7, 2:1 divider          |
//! | solenoids      | PB3-PB7 | active low, pin order          |
//! | reset relay    | PB8     | active low                     |
//! | entry beam     | PA8     | high while the beam is broken  |

#![cfg(target_os = "none")]

use core::ptr;

use embassy_stm32::adc::{Adc, AnyAdcChannel, SampleTime};
use embassy_stm32::gpio::{Input, Output};
use embassy_stm32::peripherals::ADC1;
use pinsetter_core::hardware::{
    AnalogChannel, EntrySensor, InitFault, Level, OutputLine, SensorBank, SensorError,
};
use pinsetter_core::pins::PIN_COUNT;

/// Factory-programmed VREFINT calibration constant sampled at 3.0 V.
const VREFINT_CAL_ADDR: *const u16 = 0x1FFF_75AA as *const u16;

/// Supply used when VREFINT was calibrated.
const VREFINT_CAL_VOLTS: f32 = 3.0;

/// Accepted analog supply range; anything else marks the front end faulty.
const VDDA_RANGE: (f32, f32) = (2.7, 3.6);

const ADC_FULL_SCALE: f32 = 4095.0;

/// Sensor outputs swing 0-5 V and reach the ADC through a 2:1 divider.
const DIVIDER_RATIO: f32 = 2.0;

/// Reads the factory-trimmed VREFINT calibration constant.
fn read_vrefint_calibration() -> u16 {
    unsafe { ptr::read_volatile(VREFINT_CAL_ADDR) }
}

/// Measures VDDA against the internal reference.
fn measure_vdda(adc: &mut Adc<'_, ADC1>) -> Result<f32, InitFault> {
    let mut vrefint = adc.enable_vrefint();
    // First conversion after enabling the reference is unreliable.
    let _ = adc.blocking_read(&mut vrefint);
    let reading = adc.blocking_read(&mut vrefint);
    let calibration = read_vrefint_calibration();
    if reading == 0 || calibration == 0 {
        return Err(InitFault::AnalogFrontEnd);
    }

    let vdda = VREFINT_CAL_VOLTS * f32::from(calibration) / f32::from(reading);
    if vdda < VDDA_RANGE.0 || vdda > VDDA_RANGE.1 {
        return Err(InitFault::AnalogFrontEnd);
    }
    Ok(vdda)
}

/// Analog inputs and output drivers for one lane.
pub struct LaneBoard<'d> {
    adc: Adc<'d, ADC1>,
    vdda: f32,
    channels: [AnyAdcChannel<ADC1>; 6],
    solenoids: [Output<'d>; PIN_COUNT],
    relay: Output<'d>,
}

impl<'d> LaneBoard<'d> {
    /// Brings up the board; fails when the analog front end looks wrong.
    ///
    /// `channels` follows [`AnalogChannel::ALL`], `solenoids` follows pin order.
    pub fn new(
        mut adc: Adc<'d, ADC1>,
        channels: [AnyAdcChannel<ADC1>; 6],
        solenoids: [Output<'d>; PIN_COUNT],
        relay: Output<'d>,
    ) -> Result<Self, InitFault> {
        adc.set_sample_time(SampleTime::CYCLES160_5);
        let vdda = measure_vdda(&mut adc)?;
        defmt::info!("hw: VDDA={}mV", to_millivolts(vdda));

        Ok(Self {
            adc,
            vdda,
            channels,
            solenoids,
            relay,
        })
    }

    fn output(&mut self, line: OutputLine) -> &mut Output<'d> {
        match line {
            OutputLine::Solenoid(pin) => &mut self.solenoids[pin.as_index()],
            OutputLine::ResetRelay => &mut self.relay,
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_millivolts(volts: f32) -> u32 {
    (volts * 1_000.0) as u32
}

impl SensorBank for LaneBoard<'_> {
    fn read_voltage(&mut self, channel: AnalogChannel) -> Result<f32, SensorError> {
        let raw = self.adc.blocking_read(&mut self.channels[channel.as_index()]);
        Ok(f32::from(raw) * self.vdda / ADC_FULL_SCALE * DIVIDER_RATIO)
    }

    fn drive(&mut self, line: OutputLine, level: Level) -> Result<(), SensorError> {
        let output = self.output(line);
        match level {
            Level::Low => output.set_low(),
            Level::High => output.set_high(),
        }
        Ok(())
    }
}

/// Ball-entry beam input.
pub struct EntryBeam<'d> {
    input: Input<'d>,
}

impl<'d> EntryBeam<'d> {
    pub fn new(input: Input<'d>) -> Self {
        Self { input }
    }
}

impl EntrySensor for EntryBeam<'_> {
    fn is_high(&mut self) -> Result<bool, SensorError> {
        Ok(self.input.is_high())
    }
}
