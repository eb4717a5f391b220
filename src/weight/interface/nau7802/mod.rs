// Copyright (C) 2025 Paul Hampson
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License version 3 as  published by the
// Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <https://www.gnu.org/licenses/>.

//! Register level driver for the NAU7802 24-bit load cell amplifier.
//!
//! The device registers are the only state: nothing is cached between calls, every query goes
//! back to the bus.

pub mod registers;

use crate::clock::Clock;
use crate::error::ErrorCode;
use crate::weight::interface::{GaugeSetting, StrainGaugeInterface};
use core::fmt;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{self, ErrorKind, I2c, NoAcknowledgeSource};
use strum::IntoStaticStr;
use registers::{
    ADC_CHOPPER_CLOCK_OFF, FIELD_MAX, Gain, IntPolarity, Ldo, REVISION_MASK, Register, SampleRate,
    ctrl1, ctrl2, pga_pwr, pu_ctrl,
};

/// Unshifted 7-bit address of the NAU7802
pub const DEFAULT_ADDRESS: u8 = 0x2A;

/// Timeout used by the synchronous [`Nau7802::calibrate`]. The device needs about 344ms.
pub const AFE_CALIBRATION_TIMEOUT_MS: u32 = 1000;

const WRITE_ATTEMPTS: usize = 3;
/// PUR reads before giving up on power up
const POWER_UP_READS: usize = 102;
const POLL_INTERVAL_MS: u32 = 1;
const RESET_HOLD_MS: u32 = 1;
/// Averaging budget per sample, sized for 80 samples per second.
const SAMPLE_TIMEOUT_MS: u64 = 13;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    DataTooLarge,
    AddressNack,
    DataNack,
    Bus,
    NoData,
    Timeout,
    PowerUp,
    CalibrateAfe,
}

impl Error {
    fn from_bus<E: i2c::Error>(error: &E) -> Self {
        match error.kind() {
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data) => Error::DataNack,
            ErrorKind::NoAcknowledge(_) => Error::AddressNack,
            ErrorKind::Overrun => Error::DataTooLarge,
            _ => Error::Bus,
        }
    }

    /// A device that does not acknowledge the read phase has not handed over any data.
    fn from_read<E: i2c::Error>(error: &E) -> Self {
        match error.kind() {
            ErrorKind::NoAcknowledge(_) => Error::NoData,
            _ => Self::from_bus(error),
        }
    }

    /// Not acknowledged errors are the only bus outcomes worth retrying.
    pub const fn is_nack(self) -> bool {
        matches!(self, Error::AddressNack | Error::DataNack)
    }
}

impl ErrorCode for Error {
    fn code(&self) -> i16 {
        match self {
            Error::DataTooLarge => -1,
            Error::AddressNack => -2,
            Error::DataNack => -3,
            Error::Bus => -4,
            Error::NoData => -5,
            Error::Timeout => -6,
            Error::PowerUp => -7,
            Error::CalibrateAfe => -8,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Error::DataTooLarge => "Data too long for the I2C transmit buffer.",
            Error::AddressNack => "NAU7802 sensor did not acknowledge its address.",
            Error::DataNack => "NAU7802 sensor did not acknowledge data.",
            Error::Bus => "I2C bus error talking to the NAU7802 sensor.",
            Error::NoData => "NAU7802 sensor did not return any data.",
            Error::Timeout => "NAU7802 timeout occurred collecting samples to average.",
            Error::PowerUp => "NAU7802 sensor encountered an error powering up.",
            Error::CalibrateAfe => "NAU7802 sensor encountered an error calibrating the AFE.",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

impl core::error::Error for Error {}

/// Step of [`Nau7802::begin`] that was running when initialisation gave up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoStaticStr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[strum(serialize_all = "snake_case")]
pub enum InitStage {
    Connect,
    Reset,
    PowerUp,
    Ldo,
    Gain,
    SampleRate,
    ChopperClock,
    DecouplingCap,
    AfeCalibration,
}

impl InitStage {
    pub fn name(self) -> &'static str {
        self.into()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InitError {
    pub stage: InitStage,
    pub error: Error,
}

impl From<InitError> for Error {
    fn from(value: InitError) -> Self {
        value.error
    }
}

impl ErrorCode for InitError {
    fn code(&self) -> i16 {
        self.error.code()
    }

    fn message(&self) -> &'static str {
        self.error.message()
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage.name(), self.error)
    }
}

impl core::error::Error for InitError {}

/// Progress of the analog front end self calibration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationStatus {
    Success,
    InProgress,
    Failure,
}

/// Rebuild a signed conversion result from the three big-endian bytes of a 24-bit two's
/// complement value.
pub const fn sign_extend_24(raw: [u8; 3]) -> i32 {
    let value = (raw[0] as u32) << 16 | (raw[1] as u32) << 8 | raw[2] as u32;
    // park the sign bit in bit 31, the arithmetic shift back copies it down
    ((value << 8) as i32) >> 8
}

pub struct Nau7802<I2C, D, C> {
    i2c: I2C,
    delay: D,
    clock: C,
    address: u8,
    init_failure: Option<InitStage>,
}

impl<I2C, D, C> Nau7802<I2C, D, C>
where
    I2C: I2c,
    D: DelayNs,
    C: Clock,
{
    /// Creates a driver at [`DEFAULT_ADDRESS`]. Pass `&mut bus` instead of the bus itself to
    /// keep ownership of it.
    pub fn new(i2c: I2C, delay: D, clock: C) -> Self {
        Self {
            i2c,
            delay,
            clock,
            address: DEFAULT_ADDRESS,
            init_failure: None,
        }
    }

    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn release(self) -> (I2C, D, C) {
        (self.i2c, self.delay, self.clock)
    }

    /// Checks the device answers and, when `initialize` is set, brings it into the default
    /// operating mode: 3.3V LDO, gain 128, 80 samples per second, front end calibrated.
    ///
    /// Stops at the first step that fails and reports which one it was.
    pub fn begin(&mut self, initialize: bool) -> Result<(), InitError> {
        let result = self.run_init(initialize);
        self.init_failure = result.err().map(|e| e.stage);
        result
    }

    /// Step at which the last [`Self::begin`] stopped, `None` after a successful one.
    pub fn init_failure(&self) -> Option<InitStage> {
        self.init_failure
    }

    fn run_init(&mut self, initialize: bool) -> Result<(), InitError> {
        // the device is occasionally busy and misses the first connection check
        if !self.is_connected() && !self.is_connected() {
            warn!(
                "NAU7802 initialisation failed at {}, not acknowledging at address {}",
                InitStage::Connect.name(),
                self.address
            );
            return Err(InitError {
                stage: InitStage::Connect,
                error: Error::Bus,
            });
        }

        if !initialize {
            return Ok(());
        }

        self.reset().map_err(at(InitStage::Reset))?;
        self.power_up().map_err(at(InitStage::PowerUp))?;
        self.set_ldo(Ldo::V3_3).map_err(at(InitStage::Ldo))?;
        self.set_gain(Gain::X128).map_err(at(InitStage::Gain))?;
        self.set_sample_rate(SampleRate::Sps80)
            .map_err(at(InitStage::SampleRate))?;
        self.set_register(Register::Adc, ADC_CHOPPER_CLOCK_OFF)
            .map_err(at(InitStage::ChopperClock))?;
        self.set_bit(Register::PgaPwr, pga_pwr::PGA_CAP_EN)
            .map_err(at(InitStage::DecouplingCap))?;
        self.calibrate().map_err(at(InitStage::AfeCalibration))?;

        debug!("NAU7802 initialised");
        Ok(())
    }

    /// True if the device acknowledges an empty write to its address.
    pub fn is_connected(&mut self) -> bool {
        self.i2c.write(self.address, &[]).is_ok()
    }

    /// True if the cycle ready bit is set, i.e. a conversion result is waiting.
    pub fn available(&mut self) -> Result<bool, Error> {
        self.get_bit(Register::PuCtrl, pu_ctrl::CR)
    }

    /// Reads the latest conversion result. Check [`Self::available`] first, this does not wait.
    pub fn get_reading(&mut self) -> Result<i32, Error> {
        self.write_with_retry(&[Register::AdcoB2.addr()])?;

        let mut raw = [0u8; 3];
        self.i2c
            .read(self.address, &mut raw)
            .map_err(|e| Error::from_read(&e))?;

        Ok(sign_extend_24(raw))
    }

    /// Blocks until `count` conversions have been collected and returns their mean, truncated
    /// towards zero. The whole acquisition must fit in `count * 13`ms, otherwise
    /// [`Error::Timeout`] is returned no matter how many samples were taken. A count of zero is
    /// treated as one.
    pub fn get_average_reading(&mut self, count: u8) -> Result<i32, Error> {
        let count = count.max(1);
        let timeout_ms = u64::from(count) * SAMPLE_TIMEOUT_MS;
        let mut total: i64 = 0;
        let mut collected: u8 = 0;

        let start = self.clock.now_ms();
        while collected < count {
            if self.available()? {
                total += i64::from(self.get_reading()?);
                collected += 1;
            } else {
                self.delay.delay_ms(POLL_INTERVAL_MS);
            }

            if self.clock.now_ms().saturating_sub(start) > timeout_ms {
                warn!("Averaging timed out with {} of {} samples", collected, count);
                return Err(Error::Timeout);
            }
        }

        let average = (total / i64::from(count)) as i32;
        trace!("Average of {} readings = {}", count, average);
        Ok(average)
    }

    /// Programmable gain, x1 to x128. Codes above 0b111 saturate.
    pub fn set_gain(&mut self, gain: impl Into<u8>) -> Result<(), Error> {
        let code = gain.into().min(FIELD_MAX);
        self.update_field(Register::Ctrl1, ctrl1::GAIN_MASK, ctrl1::GAIN_SHIFT, code)
    }

    /// Internal LDO voltage, 2.4V to 4.5V. Codes above 0b111 saturate. Also switches the analog
    /// supply over to the internal LDO.
    pub fn set_ldo(&mut self, ldo: impl Into<u8>) -> Result<(), Error> {
        let code = ldo.into().min(FIELD_MAX);
        self.update_field(Register::Ctrl1, ctrl1::VLDO_MASK, ctrl1::VLDO_SHIFT, code)?;
        self.set_bit(Register::PuCtrl, pu_ctrl::AVDDS)
    }

    /// Conversion rate, 10 to 320 samples per second. Codes above 0b111 saturate.
    pub fn set_sample_rate(&mut self, rate: impl Into<u8>) -> Result<(), Error> {
        let code = rate.into().min(FIELD_MAX);
        self.update_field(Register::Ctrl2, ctrl2::CRS_MASK, ctrl2::CRS_SHIFT, code)
    }

    /// Input channel. 0 selects channel 1, anything else channel 2.
    pub fn set_channel(&mut self, channel: impl Into<u8>) -> Result<(), Error> {
        if channel.into() == 0 {
            self.clear_bit(Register::Ctrl2, ctrl2::CHS)
        } else {
            self.set_bit(Register::Ctrl2, ctrl2::CHS)
        }
    }

    pub fn set_int_polarity(&mut self, polarity: IntPolarity) -> Result<(), Error> {
        match polarity {
            IntPolarity::ActiveHigh => self.clear_bit(Register::Ctrl1, ctrl1::CRP),
            IntPolarity::ActiveLow => self.set_bit(Register::Ctrl1, ctrl1::CRP),
        }
    }

    /// DRDY pin goes high when data is ready (power on default)
    pub fn set_int_polarity_high(&mut self) -> Result<(), Error> {
        self.set_int_polarity(IntPolarity::ActiveHigh)
    }

    /// DRDY pin goes low when data is ready
    pub fn set_int_polarity_low(&mut self) -> Result<(), Error> {
        self.set_int_polarity(IntPolarity::ActiveLow)
    }

    /// Synchronous front end calibration. Should be repeated whenever gain, sample rate or
    /// channel change.
    pub fn calibrate(&mut self) -> Result<(), Error> {
        self.begin_calibrate()?;
        self.wait_for_calibrate(AFE_CALIBRATION_TIMEOUT_MS)
    }

    /// Starts a front end calibration and returns straight away. Follow up with
    /// [`Self::calibration_status`] or [`Self::wait_for_calibrate`].
    pub fn begin_calibrate(&mut self) -> Result<(), Error> {
        self.set_bit(Register::Ctrl2, ctrl2::CALS)
    }

    pub fn calibration_status(&mut self) -> Result<CalibrationStatus, Error> {
        let ctrl2 = self.get_register(Register::Ctrl2)?;

        if ctrl2 & bit(ctrl2::CALS) != 0 {
            Ok(CalibrationStatus::InProgress)
        } else if ctrl2 & bit(ctrl2::CAL_ERR) != 0 {
            Ok(CalibrationStatus::Failure)
        } else {
            Ok(CalibrationStatus::Success)
        }
    }

    /// Polls until a running front end calibration finishes. A `timeout_ms` of zero waits
    /// forever.
    pub fn wait_for_calibrate(&mut self, timeout_ms: u32) -> Result<(), Error> {
        let start = self.clock.now_ms();

        loop {
            match self.calibration_status()? {
                CalibrationStatus::Success => return Ok(()),
                CalibrationStatus::Failure => {
                    warn!("NAU7802 reported a front end calibration error");
                    return Err(Error::CalibrateAfe);
                }
                CalibrationStatus::InProgress => {}
            }

            if timeout_ms > 0 && self.clock.now_ms().saturating_sub(start) > u64::from(timeout_ms)
            {
                warn!("NAU7802 front end calibration timed out after {}ms", timeout_ms);
                return Err(Error::CalibrateAfe);
            }
            self.delay.delay_ms(POLL_INTERVAL_MS);
        }
    }

    /// Resets all registers to their power on defaults
    pub fn reset(&mut self) -> Result<(), Error> {
        self.set_bit(Register::PuCtrl, pu_ctrl::RR)?;
        self.delay.delay_ms(RESET_HOLD_MS);
        self.clear_bit(Register::PuCtrl, pu_ctrl::RR)
    }

    /// Powers the digital and analog sections up and waits for the power up ready flag.
    pub fn power_up(&mut self) -> Result<(), Error> {
        self.set_bit(Register::PuCtrl, pu_ctrl::PUD)?;
        self.set_bit(Register::PuCtrl, pu_ctrl::PUA)?;

        // ready after roughly 200us
        for _ in 0..POWER_UP_READS {
            if self.get_bit(Register::PuCtrl, pu_ctrl::PUR)? {
                return Ok(());
            }
            self.delay.delay_ms(POLL_INTERVAL_MS);
        }

        warn!("NAU7802 never reported power up ready");
        Err(Error::PowerUp)
    }

    /// Low power mode, around 200nA
    pub fn power_down(&mut self) -> Result<(), Error> {
        self.clear_bit(Register::PuCtrl, pu_ctrl::PUD)?;
        self.clear_bit(Register::PuCtrl, pu_ctrl::PUA)
    }

    /// Revision code of the chip, 0x0F on all parts seen so far.
    pub fn get_revision_code(&mut self) -> Result<u8, Error> {
        Ok(self.get_register(Register::DeviceRev)? & REVISION_MASK)
    }

    pub fn set_bit(&mut self, register: Register, bit_number: u8) -> Result<(), Error> {
        let value = self.get_register(register)?;
        self.set_register(register, value | bit(bit_number))
    }

    pub fn clear_bit(&mut self, register: Register, bit_number: u8) -> Result<(), Error> {
        let value = self.get_register(register)?;
        self.set_register(register, value & !bit(bit_number))
    }

    pub fn get_bit(&mut self, register: Register, bit_number: u8) -> Result<bool, Error> {
        Ok(self.get_register(register)? & bit(bit_number) != 0)
    }

    pub fn get_register(&mut self, register: Register) -> Result<u8, Error> {
        self.write_with_retry(&[register.addr()])?;

        let mut value = [0u8; 1];
        self.i2c
            .read(self.address, &mut value)
            .map_err(|e| Error::from_read(&e))?;
        Ok(value[0])
    }

    pub fn set_register(&mut self, register: Register, value: u8) -> Result<(), Error> {
        self.write_with_retry(&[register.addr(), value])
    }

    fn update_field(
        &mut self,
        register: Register,
        mask: u8,
        shift: u8,
        code: u8,
    ) -> Result<(), Error> {
        let value = self.get_register(register)?;
        self.set_register(register, (value & !mask) | ((code << shift) & mask))
    }

    /// Up to three attempts, repeating only when the device did not acknowledge.
    fn write_with_retry(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let mut last_error = Error::Bus;

        for attempt in 1..=WRITE_ATTEMPTS {
            match self.i2c.write(self.address, bytes) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    let error = Error::from_bus(&e);
                    if !error.is_nack() {
                        return Err(error);
                    }
                    trace!("NAU7802 write not acknowledged, attempt {}", attempt);
                    last_error = error;
                }
            }
        }

        Err(last_error)
    }
}

impl<I2C, D, C> StrainGaugeInterface for Nau7802<I2C, D, C>
where
    I2C: I2c,
    D: DelayNs,
    C: Clock,
{
    type Error = Error;

    /// The failing step is kept, see [`Nau7802::init_failure`].
    fn initialize(&mut self) -> Result<(), Self::Error> {
        self.begin(true).map_err(Error::from)
    }

    fn get_average_reading(&mut self, samples: u8) -> Result<i32, Self::Error> {
        Nau7802::get_average_reading(self, samples)
    }

    fn configure(&mut self, setting: GaugeSetting) -> Result<(), Self::Error> {
        match setting {
            GaugeSetting::Gain(code) => self.set_gain(code),
            GaugeSetting::Ldo(code) => self.set_ldo(code),
            GaugeSetting::SampleRate(code) => self.set_sample_rate(code),
            GaugeSetting::Channel(channel) => self.set_channel(channel),
        }
    }

    fn calibrate_front_end(&mut self) -> Result<(), Self::Error> {
        self.calibrate()
    }

    fn power_down(&mut self) -> Result<(), Self::Error> {
        Nau7802::power_down(self)
    }

    fn power_up(&mut self) -> Result<(), Self::Error> {
        Nau7802::power_up(self)
    }
}

const fn bit(bit_number: u8) -> u8 {
    1 << bit_number
}

fn at(stage: InitStage) -> impl FnOnce(Error) -> InitError {
    move |error| {
        warn!(
            "NAU7802 initialisation failed at {}, error code {}",
            stage.name(),
            error.code()
        );
        InitError { stage, error }
    }
}
