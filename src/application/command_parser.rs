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

//! Parsing of `<method> [key=value]...` request lines and formatting of the `ok ...` /
//! `err <code> <message>` replies.

use crate::application::messaging::{Method, WeightRequest, WeightResponse};
use crate::error::ErrorCode;
use crate::weight::interface::GaugeSetting;
use crate::weight::weight::{
    DEFAULT_CALIBRATION_SAMPLES, DEFAULT_TARE_SAMPLES, DEFAULT_WEIGHT_SAMPLES,
};
use core::fmt;
use core::fmt::Write;
use core::str::FromStr;
use heapless::{String, Vec};

pub const REPLY_CAPACITY: usize = 128;
const MAX_PARAMETERS: usize = 4;

pub type Reply = String<REPLY_CAPACITY>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrontEndError {
    UnknownMethod,
    InvalidParameter,
}

impl ErrorCode for FrontEndError {
    fn code(&self) -> i16 {
        match self {
            FrontEndError::UnknownMethod => -2001,
            FrontEndError::InvalidParameter => -2002,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            FrontEndError::UnknownMethod => "Unknown method.",
            FrontEndError::InvalidParameter => "Missing or invalid parameter.",
        }
    }
}

impl fmt::Display for FrontEndError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

impl core::error::Error for FrontEndError {}

struct Parameters<'a> {
    pairs: Vec<(&'a str, &'a str), MAX_PARAMETERS>,
}

impl<'a> Parameters<'a> {
    fn parse(tokens: impl Iterator<Item = &'a str>) -> Result<Self, FrontEndError> {
        let mut pairs = Vec::new();
        for token in tokens {
            let pair = token
                .split_once('=')
                .ok_or(FrontEndError::InvalidParameter)?;
            pairs
                .push(pair)
                .map_err(|_| FrontEndError::InvalidParameter)?;
        }
        Ok(Self { pairs })
    }

    /// Rejects keys the method does not take
    fn accept(&self, keys: &[&str]) -> Result<(), FrontEndError> {
        match self.pairs.iter().find(|(key, _)| !keys.contains(key)) {
            Some(_) => Err(FrontEndError::InvalidParameter),
            None => Ok(()),
        }
    }

    fn optional<T: FromStr>(&self, key: &str, default: T) -> Result<T, FrontEndError> {
        match self.pairs.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => value.parse().map_err(|_| FrontEndError::InvalidParameter),
            None => Ok(default),
        }
    }

    fn required<T: FromStr>(&self, key: &str) -> Result<T, FrontEndError> {
        let (_, value) = self
            .pairs
            .iter()
            .find(|(k, _)| *k == key)
            .ok_or(FrontEndError::InvalidParameter)?;
        value.parse().map_err(|_| FrontEndError::InvalidParameter)
    }
}

pub fn parse_request(line: &str) -> Result<WeightRequest, FrontEndError> {
    let mut tokens = line.split_whitespace();
    let method = tokens
        .next()
        .and_then(|name| Method::from_str(name).ok())
        .ok_or(FrontEndError::UnknownMethod)?;
    let params = Parameters::parse(tokens)?;

    let request = match method {
        Method::Begin => {
            params.accept(&[])?;
            WeightRequest::Begin
        }
        Method::Tare => {
            params.accept(&["samples"])?;
            WeightRequest::Tare {
                samples: params.optional("samples", DEFAULT_TARE_SAMPLES)?,
            }
        }
        Method::Calibrate => {
            params.accept(&["weight", "samples"])?;
            WeightRequest::CalibrationAtMass {
                weight: params.required("weight")?,
                samples: params.optional("samples", DEFAULT_CALIBRATION_SAMPLES)?,
            }
        }
        Method::Weight => {
            params.accept(&["samples", "allow_negative"])?;
            WeightRequest::Weight {
                samples: params.optional("samples", DEFAULT_WEIGHT_SAMPLES)?,
                allow_negative: params.optional("allow_negative", true)?,
            }
        }
        Method::Reading => {
            params.accept(&["samples"])?;
            WeightRequest::Reading {
                samples: params.optional("samples", DEFAULT_WEIGHT_SAMPLES)?,
            }
        }
        Method::ReadCalibration => {
            params.accept(&[])?;
            WeightRequest::ReadCalibration
        }
        Method::StoreCalibration => {
            params.accept(&[])?;
            WeightRequest::StoreCalibration
        }
        Method::GetCalibration => {
            params.accept(&[])?;
            WeightRequest::GetCalibration
        }
        Method::SetCalibration => {
            params.accept(&["offset", "factor"])?;
            WeightRequest::SetCalibration {
                offset: params.required("offset")?,
                factor: params.required("factor")?,
            }
        }
        Method::SetGain => {
            params.accept(&["value"])?;
            WeightRequest::Configure(GaugeSetting::Gain(params.required("value")?))
        }
        Method::SetSampleRate => {
            params.accept(&["value"])?;
            WeightRequest::Configure(GaugeSetting::SampleRate(params.required("value")?))
        }
        Method::SetChannel => {
            params.accept(&["value"])?;
            WeightRequest::Configure(GaugeSetting::Channel(params.required("value")?))
        }
        Method::CalibrateAfe => {
            params.accept(&[])?;
            WeightRequest::CalibrateFrontEnd
        }
        Method::PowerUp => {
            params.accept(&[])?;
            WeightRequest::PowerUp
        }
        Method::PowerDown => {
            params.accept(&[])?;
            WeightRequest::PowerDown
        }
        Method::Stream => {
            params.accept(&["enabled"])?;
            WeightRequest::Stream {
                enabled: params.required("enabled")?,
            }
        }
    };

    Ok(request)
}

pub fn format_response(response: &WeightResponse) -> Reply {
    match response {
        WeightResponse::RequestCompleted => reply(format_args!("ok")),
        WeightResponse::WeightUpdate(weight) => reply(format_args!("ok weight={}", weight)),
        WeightResponse::Reading(reading) => reply(format_args!("ok reading={}", reading)),
        WeightResponse::Calibration {
            offset,
            factor,
            calibrated,
            detected,
        } => reply(format_args!(
            "ok offset={} factor={} calibrated={} detected={}",
            offset, factor, calibrated, detected
        )),
        WeightResponse::Streaming(enabled) => reply(format_args!("ok streaming={}", enabled)),
    }
}

pub fn format_error(error: &impl ErrorCode) -> Reply {
    reply(format_args!("err {} {}", error.code(), error.message()))
}

fn reply(args: fmt::Arguments<'_>) -> Reply {
    let mut reply = Reply::new();
    if reply.write_fmt(args).is_err() {
        warn!("Reply truncated to {} bytes", REPLY_CAPACITY);
    }
    reply
}
