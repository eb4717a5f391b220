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

use crate::weight::interface::GaugeSetting;
use strum::EnumString;

/// Method names accepted on the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[strum(serialize_all = "snake_case")]
pub enum Method {
    Begin,
    Tare,
    Calibrate,
    Weight,
    Reading,
    ReadCalibration,
    StoreCalibration,
    GetCalibration,
    SetCalibration,
    SetGain,
    SetSampleRate,
    SetChannel,
    CalibrateAfe,
    PowerUp,
    PowerDown,
    Stream,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WeightRequest {
    Begin,
    Tare { samples: u8 },
    CalibrationAtMass { weight: f32, samples: u8 },
    Weight { samples: u8, allow_negative: bool },
    Reading { samples: u8 },
    ReadCalibration,
    StoreCalibration,
    GetCalibration,
    SetCalibration { offset: i32, factor: f32 },
    Configure(GaugeSetting),
    CalibrateFrontEnd,
    PowerUp,
    PowerDown,
    Stream { enabled: bool },
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WeightResponse {
    RequestCompleted,
    WeightUpdate(f32),
    Reading(i32),
    Calibration {
        offset: i32,
        factor: f32,
        calibrated: bool,
        detected: bool,
    },
    Streaming(bool),
}
