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

//! Driver for the NAU7802 24-bit load cell amplifier plus a calibrated weighing scale built on
//! top of it.
//!
//! Layers, leaves first:
//! - [`weight::interface::nau7802::Nau7802`] speaks the register protocol over an
//!   [`embedded_hal::i2c::I2c`] bus.
//! - [`weight::weight::Scale`] turns averaged raw counts into weight using a zero offset and a
//!   calibration factor persisted through [`embedded_storage::Storage`].
//! - [`application::weighing_manager::WeighingManager`] is a line based command front end.
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod application;
pub mod clock;
pub mod error;
pub mod storage;
pub mod weight;

#[cfg(test)]
mod test_support;

pub use clock::Clock;
pub use error::ErrorCode;
pub use weight::interface::nau7802::{Error, Nau7802};
pub use weight::weight::{Scale, ScaleError};
