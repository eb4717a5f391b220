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

pub mod nau7802;

/// Front end settings a strain gauge amplifier may support. Values are raw field codes, see
/// [`nau7802::registers`] for the meaning of each code on the NAU7802.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GaugeSetting {
    Gain(u8),
    Ldo(u8),
    SampleRate(u8),
    Channel(u8),
}

pub trait StrainGaugeInterface {
    type Error;

    /// Initialise the gauge and make it ready for taking readings. Will put it into an initalized,
    /// powered up and front end calibrated state.
    fn initialize(&mut self) -> Result<(), Self::Error>;

    /// Average of `samples` consecutive conversions, in raw counts.
    fn get_average_reading(&mut self, samples: u8) -> Result<i32, Self::Error>;

    /// Apply a front end setting. Out of range codes saturate rather than fail.
    fn configure(&mut self, setting: GaugeSetting) -> Result<(), Self::Error>;

    /// Run the amplifier's own offset/gain self calibration and wait for it to finish.
    fn calibrate_front_end(&mut self) -> Result<(), Self::Error>;

    /// Power down the strain gauge
    fn power_down(&mut self) -> Result<(), Self::Error>;

    /// Power up the strain gauge
    fn power_up(&mut self) -> Result<(), Self::Error>;
}
