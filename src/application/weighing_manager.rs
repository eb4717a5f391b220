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

use crate::application::command_parser::{Reply, format_error, format_response, parse_request};
use crate::application::messaging::{WeightRequest, WeightResponse};
use crate::error::ErrorCode;
use crate::weight::interface::StrainGaugeInterface;
use crate::weight::weight::{DEFAULT_WEIGHT_SAMPLES, Scale, ScaleError};
use core::fmt::Debug;
use embedded_storage::Storage;

/// Acts as a bridge between the command line and the real weight scale
pub struct WeighingManager<StrainGauge, NV> {
    weight_scale: Scale<StrainGauge, NV>,
    streaming: bool,
}

impl<StrainGauge, StrainGaugeE, NV> WeighingManager<StrainGauge, NV>
where
    StrainGauge: StrainGaugeInterface<Error = StrainGaugeE>,
    StrainGaugeE: ErrorCode,
    NV: Storage,
    NV::Error: Debug,
{
    pub fn new(weight_scale: Scale<StrainGauge, NV>) -> Self {
        Self {
            weight_scale,
            streaming: false,
        }
    }

    /// Runs one request line and returns the reply line, without line terminator.
    pub fn handle_line(&mut self, line: &str) -> Reply {
        match parse_request(line) {
            Ok(request) => match self.handle_request(request) {
                Ok(response) => format_response(&response),
                Err(e) => {
                    warn!("Request failed, error code {}", e.code());
                    format_error(&e)
                }
            },
            Err(e) => format_error(&e),
        }
    }

    pub fn handle_request(
        &mut self,
        request: WeightRequest,
    ) -> Result<WeightResponse, ScaleError<StrainGaugeE>> {
        let scale = &mut self.weight_scale;

        match request {
            WeightRequest::Begin => scale.begin()?,
            WeightRequest::Tare { samples } => scale.calculate_zero_offset(samples)?,
            WeightRequest::CalibrationAtMass { weight, samples } => {
                scale.calculate_calibration_factor(weight, samples)?
            }
            WeightRequest::Weight {
                samples,
                allow_negative,
            } => {
                let weight = scale.get_average_weight(samples, allow_negative)?;
                return Ok(WeightResponse::WeightUpdate(weight));
            }
            WeightRequest::Reading { samples } => {
                return Ok(WeightResponse::Reading(scale.get_average_reading(samples)?));
            }
            WeightRequest::ReadCalibration => scale.read_calibration()?,
            WeightRequest::StoreCalibration => scale.store_calibration()?,
            WeightRequest::GetCalibration => return Ok(self.calibration()),
            WeightRequest::SetCalibration { offset, factor } => {
                scale.set_calibration(offset, factor);
                return Ok(self.calibration());
            }
            WeightRequest::Configure(setting) => scale
                .sensor_mut()
                .configure(setting)
                .map_err(ScaleError::Sensor)?,
            WeightRequest::CalibrateFrontEnd => scale
                .sensor_mut()
                .calibrate_front_end()
                .map_err(ScaleError::Sensor)?,
            WeightRequest::PowerUp => scale.sensor_mut().power_up().map_err(ScaleError::Sensor)?,
            WeightRequest::PowerDown => scale
                .sensor_mut()
                .power_down()
                .map_err(ScaleError::Sensor)?,
            WeightRequest::Stream { enabled } => {
                self.streaming = enabled;
                debug!("Weight streaming enabled: {}", enabled);
                return Ok(WeightResponse::Streaming(enabled));
            }
        }

        Ok(WeightResponse::RequestCompleted)
    }

    /// Call periodically. While streaming is on, every call takes a measurement and returns
    /// the reply to send.
    pub fn poll(&mut self) -> Option<Reply> {
        if !self.streaming {
            return None;
        }

        let reply = match self
            .weight_scale
            .get_average_weight(DEFAULT_WEIGHT_SAMPLES, true)
        {
            Ok(weight) => format_response(&WeightResponse::WeightUpdate(weight)),
            Err(e) => format_error(&e),
        };
        Some(reply)
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn scale(&self) -> &Scale<StrainGauge, NV> {
        &self.weight_scale
    }

    pub fn scale_mut(&mut self) -> &mut Scale<StrainGauge, NV> {
        &mut self.weight_scale
    }

    pub fn release(self) -> Scale<StrainGauge, NV> {
        self.weight_scale
    }

    fn calibration(&self) -> WeightResponse {
        WeightResponse::Calibration {
            offset: self.weight_scale.zero_offset(),
            factor: self.weight_scale.calibration_factor(),
            calibrated: self.weight_scale.is_calibrated(),
            detected: self.weight_scale.calibration_detected(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ScaleConfig;
    use crate::test_support::{CountingDelay, FakeEeprom, FakeNau7802, StepClock, fake_driver};
    use crate::weight::interface::nau7802::Nau7802;
    use crate::weight::interface::nau7802::registers::{Register, ctrl1, ctrl2};

    type Manager<'a> =
        WeighingManager<Nau7802<&'a mut FakeNau7802, CountingDelay, StepClock>, FakeEeprom>;

    fn manager(fake: &mut FakeNau7802) -> Manager<'_> {
        WeighingManager::new(Scale::new(
            fake_driver(fake),
            FakeEeprom::erased(),
            ScaleConfig::default(),
        ))
    }

    #[test]
    fn weight_before_calibration_reports_not_calibrated() {
        let mut fake = FakeNau7802::new();
        fake.samples.extend([1000; 8]);
        let mut manager = manager(&mut fake);

        assert_eq!(
            manager.handle_line("weight").as_str(),
            "err -1003 Scale is not calibrated."
        );
        drop(manager);
        assert_eq!(fake.samples.len(), 8);
    }

    #[test]
    fn malformed_lines_get_front_end_errors() {
        let mut fake = FakeNau7802::new();
        let mut manager = manager(&mut fake);

        assert_eq!(
            manager.handle_line("fly").as_str(),
            "err -2001 Unknown method."
        );
        assert_eq!(
            manager.handle_line("calibrate weight=lots").as_str(),
            "err -2002 Missing or invalid parameter."
        );
    }

    #[test]
    fn tare_calibrate_and_weigh_over_the_command_line() {
        let mut fake = FakeNau7802::new();
        fake.samples.extend([1000; 4]);
        fake.samples.extend([8000; 4]);
        fake.samples.extend([4500; 4]);
        fake.samples.extend([500; 4]);
        let mut manager = manager(&mut fake);

        assert_eq!(manager.handle_line("tare samples=4").as_str(), "ok");
        assert_eq!(
            manager.handle_line("calibrate weight=100 samples=4").as_str(),
            "ok"
        );
        assert_eq!(
            manager.handle_line("weight samples=4").as_str(),
            "ok weight=50"
        );
        assert_eq!(
            manager.handle_line("weight samples=4 allow_negative=false").as_str(),
            "ok weight=0"
        );
        assert_eq!(
            manager.handle_line("get_calibration").as_str(),
            "ok offset=1000 factor=70 calibrated=true detected=false"
        );
    }

    #[test]
    fn calibration_can_be_set_stored_and_read_back() {
        let mut fake = FakeNau7802::new();
        let mut manager = manager(&mut fake);

        assert_eq!(
            manager.handle_line("read_calibration").as_str(),
            "err -1001 Failed to read valid calibration factor from EEPROM."
        );
        assert_eq!(
            manager.handle_line("set_calibration offset=-250 factor=12.5").as_str(),
            "ok offset=-250 factor=12.5 calibrated=true detected=false"
        );
        assert_eq!(manager.handle_line("store_calibration").as_str(), "ok");
        assert_eq!(manager.handle_line("read_calibration").as_str(), "ok");
        assert_eq!(
            manager.handle_line("get_calibration").as_str(),
            "ok offset=-250 factor=12.5 calibrated=true detected=true"
        );
    }

    #[test]
    fn raw_reading_needs_no_calibration() {
        let mut fake = FakeNau7802::new();
        fake.samples.extend([-20, -10]);
        let mut manager = manager(&mut fake);

        assert_eq!(
            manager.handle_line("reading samples=2").as_str(),
            "ok reading=-15"
        );
    }

    #[test]
    fn configuration_reaches_the_device() {
        let mut fake = FakeNau7802::new();
        let mut manager = manager(&mut fake);

        assert_eq!(manager.handle_line("set_gain value=9").as_str(), "ok");
        assert_eq!(manager.handle_line("set_sample_rate value=1").as_str(), "ok");
        assert_eq!(manager.handle_line("set_channel value=1").as_str(), "ok");
        assert_eq!(manager.handle_line("calibrate_afe").as_str(), "ok");
        drop(manager);

        assert_eq!(fake.registers[Register::Ctrl1 as usize] & ctrl1::GAIN_MASK, 0b111);
        let value = fake.registers[Register::Ctrl2 as usize];
        assert_eq!(value & ctrl2::CRS_MASK, 0b001 << ctrl2::CRS_SHIFT);
        assert_ne!(value & (1 << ctrl2::CHS), 0);
    }

    #[test]
    fn sensor_errors_are_passed_through() {
        let mut fake = FakeNau7802::new();
        fake.power_up_stuck = true;
        let mut manager = manager(&mut fake);

        assert_eq!(
            manager.handle_line("power_up").as_str(),
            "err -7 NAU7802 sensor encountered an error powering up."
        );
        assert_eq!(manager.handle_line("power_down").as_str(), "ok");
    }

    #[test]
    fn streaming_emits_weights_until_disabled() {
        let mut fake = FakeNau7802::new();
        fake.samples.extend([1700; 8]);
        let mut manager = manager(&mut fake);
        manager.scale_mut().set_calibration(1000, 70.0);

        assert_eq!(manager.poll(), None);
        assert_eq!(
            manager.handle_line("stream enabled=true").as_str(),
            "ok streaming=true"
        );
        assert!(manager.is_streaming());
        assert_eq!(manager.poll().as_deref(), Some("ok weight=10"));

        manager.handle_line("stream enabled=false");
        assert_eq!(manager.poll(), None);
    }

    #[test]
    fn streaming_reports_errors_in_band() {
        let mut fake = FakeNau7802::new();
        let mut manager = manager(&mut fake);
        manager.handle_line("stream enabled=true");

        assert_eq!(
            manager.poll().as_deref(),
            Some("err -1003 Scale is not calibrated.")
        );
    }
}
