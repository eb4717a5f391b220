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

//! NAU7802 register map and the bit/field layout of the registers the driver touches.

use strum::FromRepr;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    PuCtrl = 0x00,
    Ctrl1 = 0x01,
    Ctrl2 = 0x02,
    Ocal1B2 = 0x03,
    Ocal1B1 = 0x04,
    Ocal1B0 = 0x05,
    Gcal1B3 = 0x06,
    Gcal1B2 = 0x07,
    Gcal1B1 = 0x08,
    Gcal1B0 = 0x09,
    Ocal2B2 = 0x0A,
    Ocal2B1 = 0x0B,
    Ocal2B0 = 0x0C,
    Gcal2B3 = 0x0D,
    Gcal2B2 = 0x0E,
    Gcal2B1 = 0x0F,
    Gcal2B0 = 0x10,
    I2cControl = 0x11,
    AdcoB2 = 0x12,
    AdcoB1 = 0x13,
    AdcoB0 = 0x14,
    /// Shared between ADC control and OTP[32:24]
    Adc = 0x15,
    OtpB1 = 0x16,
    OtpB0 = 0x17,
    Pga = 0x1B,
    PgaPwr = 0x1C,
    DeviceRev = 0x1F,
}

impl Register {
    pub const fn addr(self) -> u8 {
        self as u8
    }
}

/// PU_CTRL bit positions
pub mod pu_ctrl {
    /// Register reset
    pub const RR: u8 = 0;
    /// Power up digital
    pub const PUD: u8 = 1;
    /// Power up analog
    pub const PUA: u8 = 2;
    /// Power up ready
    pub const PUR: u8 = 3;
    /// Cycle start
    pub const CS: u8 = 4;
    /// Cycle ready, a conversion result is waiting
    pub const CR: u8 = 5;
    pub const OSCS: u8 = 6;
    /// Internal LDO enable
    pub const AVDDS: u8 = 7;
}

/// CTRL1 fields
pub mod ctrl1 {
    pub const GAIN_MASK: u8 = 0b0000_0111;
    pub const GAIN_SHIFT: u8 = 0;
    pub const VLDO_MASK: u8 = 0b0011_1000;
    pub const VLDO_SHIFT: u8 = 3;
    pub const DRDY_SEL: u8 = 6;
    /// Conversion ready pin polarity, set means active low
    pub const CRP: u8 = 7;
}

/// CTRL2 fields
pub mod ctrl2 {
    pub const CALMOD_MASK: u8 = 0b0000_0011;
    /// Calibration start, reads back set while calibration is running
    pub const CALS: u8 = 2;
    pub const CAL_ERR: u8 = 3;
    pub const CRS_MASK: u8 = 0b0111_0000;
    pub const CRS_SHIFT: u8 = 4;
    /// Channel select
    pub const CHS: u8 = 7;
}

/// PGA bit positions
pub mod pga {
    pub const CHP_DIS: u8 = 0;
    pub const INV: u8 = 3;
    pub const BYPASS_EN: u8 = 4;
    pub const OUT_EN: u8 = 5;
    pub const LDOMODE: u8 = 6;
    pub const RD_OTP_SEL: u8 = 7;
}

/// PGA_PWR bit positions
pub mod pga_pwr {
    pub const PGA_CURR: u8 = 0;
    pub const ADC_CURR: u8 = 2;
    pub const MSTR_BIAS_CURR: u8 = 4;
    /// 330pF decoupling capacitor on channel 2
    pub const PGA_CAP_EN: u8 = 7;
}

/// Largest code any of the three bit wide configuration fields can hold.
pub const FIELD_MAX: u8 = 0b111;

/// Written to the ADC register during initialisation to turn the clock chopper off.
pub const ADC_CHOPPER_CLOCK_OFF: u8 = 0x30;

pub const REVISION_MASK: u8 = 0x0F;

/// Internal LDO output voltage
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Ldo {
    V2_4 = 0b111,
    V2_7 = 0b110,
    V3_0 = 0b101,
    V3_3 = 0b100,
    V3_6 = 0b011,
    V3_9 = 0b010,
    V4_2 = 0b001,
    V4_5 = 0b000,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Gain {
    X128 = 0b111,
    X64 = 0b110,
    X32 = 0b101,
    X16 = 0b100,
    X8 = 0b011,
    X4 = 0b010,
    X2 = 0b001,
    X1 = 0b000,
}

/// Conversions per second
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleRate {
    Sps320 = 0b111,
    Sps80 = 0b011,
    Sps40 = 0b010,
    Sps20 = 0b001,
    Sps10 = 0b000,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    Channel1 = 0,
    Channel2 = 1,
}

/// Level of the DRDY pin when a conversion is ready
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IntPolarity {
    ActiveHigh,
    ActiveLow,
}

macro_rules! field_code {
    ($($t:ty),*) => {
        $(impl From<$t> for u8 {
            fn from(value: $t) -> u8 {
                value as u8
            }
        })*
    };
}

field_code!(Ldo, Gain, SampleRate, Channel);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_codes_match_datasheet() {
        assert_eq!(u8::from(Gain::X128), 0b111);
        assert_eq!(u8::from(Ldo::V3_3), 0b100);
        assert_eq!(u8::from(SampleRate::Sps80), 0b011);
        assert_eq!(SampleRate::from_repr(0b111), Some(SampleRate::Sps320));
        assert_eq!(SampleRate::from_repr(0b100), None);
        assert_eq!(Register::from_repr(0x1C), Some(Register::PgaPwr));
    }
}
