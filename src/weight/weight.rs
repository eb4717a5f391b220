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

use crate::error::ErrorCode;
use crate::storage::{CalibrationStore, ERASED, ScaleConfig, StorageError};
use crate::weight::interface::StrainGaugeInterface;
use core::fmt;
use core::fmt::Debug;
use embedded_storage::Storage;
use micromath::F32Ext;

pub const DEFAULT_ZERO_OFFSET: i32 = 0;
pub const DEFAULT_CALIBRATION_FACTOR: f32 = 1.0;
pub const DEFAULT_TARE_SAMPLES: u8 = 64;
pub const DEFAULT_CALIBRATION_SAMPLES: u8 = 64;
pub const DEFAULT_WEIGHT_SAMPLES: u8 = 8;

/// How close to 1.0 a factor must be to count as never calibrated
const DEFAULT_FACTOR_EPSILON: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScaleError<SensorE> {
    Sensor(SensorE),
    ReadCalibrationFactor,
    ReadZeroOffset,
    NotCalibrated,
    InvalidCalibrationWeight,
    Storage(StorageError),
}

impl<SensorE: ErrorCode> ErrorCode for ScaleError<SensorE> {
    fn code(&self) -> i16 {
        match self {
            ScaleError::Sensor(e) => e.code(),
            ScaleError::ReadCalibrationFactor => -1001,
            ScaleError::ReadZeroOffset => -1002,
            ScaleError::NotCalibrated => -1003,
            ScaleError::InvalidCalibrationWeight => -1004,
            ScaleError::Storage(_) => -1005,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            ScaleError::Sensor(e) => e.message(),
            ScaleError::ReadCalibrationFactor => {
                "Failed to read valid calibration factor from EEPROM."
            }
            ScaleError::ReadZeroOffset => "Failed to read valid zero offset from EEPROM.",
            ScaleError::NotCalibrated => "Scale is not calibrated.",
            ScaleError::InvalidCalibrationWeight => {
                "Calibration weight must be a finite, non-zero value."
            }
            ScaleError::Storage(_) => "Unable to access calibration storage.",
        }
    }
}

impl<SensorE: ErrorCode> fmt::Display for ScaleError<SensorE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

impl<SensorE: ErrorCode + Debug> core::error::Error for ScaleError<SensorE> {}

/// Two point linear calibration on top of a strain gauge: weight = (reading - offset) / factor.
///
/// The offset and factor live in two slots of non-volatile storage so a calibration survives a
/// power cycle, see [`Scale::read_calibration`].
pub struct Scale<StrainGauge, NV> {
    strain_gauge: StrainGauge,
    store: CalibrationStore<NV>,
    persist: bool,
    zero_offset: i32,
    calibration_factor: f32,
    is_calibrated: bool,
    calibration_detected: bool,
}

impl<StrainGauge, StrainGaugeE, NV> Scale<StrainGauge, NV>
where
    StrainGauge: StrainGaugeInterface<Error = StrainGaugeE>,
    NV: Storage,
    NV::Error: Debug,
{
    pub fn new(strain_gauge: StrainGauge, storage: NV, config: ScaleConfig) -> Self {
        Self {
            strain_gauge,
            store: CalibrationStore::new(storage, config.slots),
            persist: config.persist,
            zero_offset: DEFAULT_ZERO_OFFSET,
            calibration_factor: DEFAULT_CALIBRATION_FACTOR,
            is_calibrated: false,
            calibration_detected: false,
        }
    }

    /// Initialises the strain gauge then loads the stored calibration.
    pub fn begin(&mut self) -> Result<(), ScaleError<StrainGaugeE>> {
        self.strain_gauge
            .initialize()
            .map_err(ScaleError::Sensor)?;
        self.read_calibration()
    }

    /// Tare. Call with the scale level, at running temperature and with nothing on it.
    pub fn calculate_zero_offset(&mut self, samples: u8) -> Result<(), ScaleError<StrainGaugeE>> {
        let average = match self.strain_gauge.get_average_reading(samples) {
            Ok(average) => average,
            Err(e) => {
                self.is_calibrated = false;
                return Err(ScaleError::Sensor(e));
            }
        };

        self.set_zero_offset(average);
        debug!("Zero offset = {}", average);

        if self.persist {
            self.store_calibration()?;
        }
        Ok(())
    }

    pub fn tare(&mut self) -> Result<(), ScaleError<StrainGaugeE>> {
        self.calculate_zero_offset(DEFAULT_TARE_SAMPLES)
    }

    /// Call after taring, with `weight` sitting on the scale. The unit of `weight` becomes the
    /// unit of every later measurement.
    pub fn calculate_calibration_factor(
        &mut self,
        weight: f32,
        samples: u8,
    ) -> Result<(), ScaleError<StrainGaugeE>> {
        if weight == 0.0 || !weight.is_finite() {
            warn!("Rejecting calibration weight that is zero or not finite");
            return Err(ScaleError::InvalidCalibrationWeight);
        }

        let average = match self.strain_gauge.get_average_reading(samples) {
            Ok(average) => average,
            Err(e) => {
                self.is_calibrated = false;
                return Err(ScaleError::Sensor(e));
            }
        };

        let counts = (i64::from(average) - i64::from(self.zero_offset)) as f32;
        self.calibration_factor = counts / weight;
        self.is_calibrated = !self.is_default_state();
        debug!("Calibration factor = {} counts per unit", self.calibration_factor);

        if self.persist {
            self.store_calibration()?;
        }
        Ok(())
    }

    /// Average weight in the calibration unit. Unless `allow_negative` is set, readings below the
    /// zero offset report as zero.
    pub fn get_average_weight(
        &mut self,
        samples: u8,
        allow_negative: bool,
    ) -> Result<f32, ScaleError<StrainGaugeE>> {
        if !self.is_calibrated || self.calibration_factor == 0.0 {
            return Err(ScaleError::NotCalibrated);
        }

        let mut reading = self
            .strain_gauge
            .get_average_reading(samples)
            .map_err(ScaleError::Sensor)?;

        // unloaded cells drift a few counts below the offset
        if !allow_negative && reading < self.zero_offset {
            reading = self.zero_offset;
        }

        let counts = (i64::from(reading) - i64::from(self.zero_offset)) as f32;
        let weight = counts / self.calibration_factor;
        trace!("Reading = {}, weight = {}", reading, weight);
        Ok(weight)
    }

    pub fn get_weight(&mut self) -> Result<f32, ScaleError<StrainGaugeE>> {
        self.get_average_weight(DEFAULT_WEIGHT_SAMPLES, true)
    }

    /// Uncalibrated average of raw conversion results
    pub fn get_average_reading(&mut self, samples: u8) -> Result<i32, ScaleError<StrainGaugeE>> {
        self.strain_gauge
            .get_average_reading(samples)
            .map_err(ScaleError::Sensor)
    }

    /// Writes the factor then the offset, whatever their current values.
    pub fn store_calibration(&mut self) -> Result<(), ScaleError<StrainGaugeE>> {
        self.store
            .write_factor(self.calibration_factor)
            .map_err(ScaleError::Storage)?;
        self.store
            .write_offset(self.zero_offset)
            .map_err(ScaleError::Storage)
    }

    /// Loads the calibration saved by [`Self::store_calibration`].
    ///
    /// A slot that is erased or holds a NaN is reset to its default, written back, and reported
    /// as an error. The factor is checked first so a bad factor hides the state of the offset.
    pub fn read_calibration(&mut self) -> Result<(), ScaleError<StrainGaugeE>> {
        let factor_bits = self
            .store
            .read_factor_bits()
            .map_err(ScaleError::Storage)?;
        let factor = f32::from_bits(factor_bits);

        if factor_bits == ERASED || factor.is_nan() {
            warn!("Stored calibration factor is not valid, resetting to default");
            self.reset_calibration();
            if self.store.write_factor(self.calibration_factor).is_err() {
                warn!("Could not restore the default calibration factor");
            }
            return Err(ScaleError::ReadCalibrationFactor);
        }

        let offset_bits = self
            .store
            .read_offset_bits()
            .map_err(ScaleError::Storage)?;

        if offset_bits == ERASED {
            warn!("Stored zero offset is not valid, resetting to default");
            self.reset_calibration();
            if self.store_calibration().is_err() {
                warn!("Could not restore the default calibration");
            }
            return Err(ScaleError::ReadZeroOffset);
        }

        self.zero_offset = offset_bits as i32;
        self.calibration_factor = factor;
        self.calibration_detected = true;

        // a zero filled slot is as good as a blank one. Factors below 1.0 fall in here too.
        self.is_calibrated =
            !(self.zero_offset == 0 || (self.calibration_factor - 1.0) < DEFAULT_FACTOR_EPSILON);

        debug!(
            "Loaded zero offset {} and calibration factor {}, calibrated: {}",
            self.zero_offset, self.calibration_factor, self.is_calibrated
        );
        Ok(())
    }

    pub fn set_zero_offset(&mut self, offset: i32) {
        self.zero_offset = offset;
        if self.is_default_state() {
            self.is_calibrated = false;
        }
    }

    pub fn set_calibration_factor(&mut self, factor: f32) {
        self.calibration_factor = factor;
        if self.is_default_state() {
            self.is_calibrated = false;
        }
    }

    /// Installs a calibration obtained elsewhere. It counts as valid unless it is the default
    /// pair or the factor is zero.
    pub fn set_calibration(&mut self, offset: i32, factor: f32) {
        self.zero_offset = offset;
        self.calibration_factor = factor;
        self.is_calibrated = factor != 0.0 && !self.is_default_state();
    }

    pub fn zero_offset(&self) -> i32 {
        self.zero_offset
    }

    pub fn calibration_factor(&self) -> f32 {
        self.calibration_factor
    }

    pub fn is_calibrated(&self) -> bool {
        self.is_calibrated
    }

    pub fn calibration_detected(&self) -> bool {
        self.calibration_detected
    }

    pub fn sensor(&self) -> &StrainGauge {
        &self.strain_gauge
    }

    pub fn sensor_mut(&mut self) -> &mut StrainGauge {
        &mut self.strain_gauge
    }

    pub fn release(self) -> (StrainGauge, NV) {
        (self.strain_gauge, self.store.release())
    }

    fn reset_calibration(&mut self) {
        self.zero_offset = DEFAULT_ZERO_OFFSET;
        self.calibration_factor = DEFAULT_CALIBRATION_FACTOR;
        self.is_calibrated = false;
        self.calibration_detected = false;
    }

    fn is_default_state(&self) -> bool {
        self.zero_offset == DEFAULT_ZERO_OFFSET
            && F32Ext::abs(self.calibration_factor - DEFAULT_CALIBRATION_FACTOR) < DEFAULT_FACTOR_EPSILON
    }
}
