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

//! Persistence of the two calibration scalars in byte addressed non-volatile memory.
//!
//! Each value takes a four byte little-endian slot. A slot that has never been written reads
//! back as [`ERASED`].

use core::fmt::Debug;
use embedded_storage::Storage;

/// Bit pattern of a never written EEPROM word
pub const ERASED: u32 = 0xFFFF_FFFF;

pub const SLOT_SIZE: u32 = 4;
pub const DEFAULT_FACTOR_ADDRESS: u32 = 0;
pub const DEFAULT_OFFSET_ADDRESS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    SaveError,
    RetrieveError,
    OverlappingSlots,
}

/// Byte addresses of the calibration factor and zero offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationSlots {
    factor_address: u32,
    offset_address: u32,
}

impl CalibrationSlots {
    pub const fn new(factor_address: u32, offset_address: u32) -> Result<Self, StorageError> {
        let overlap = factor_address < offset_address.saturating_add(SLOT_SIZE)
            && offset_address < factor_address.saturating_add(SLOT_SIZE);
        if overlap {
            return Err(StorageError::OverlappingSlots);
        }

        Ok(Self {
            factor_address,
            offset_address,
        })
    }

    pub const fn factor_address(&self) -> u32 {
        self.factor_address
    }

    pub const fn offset_address(&self) -> u32 {
        self.offset_address
    }
}

impl Default for CalibrationSlots {
    fn default() -> Self {
        Self {
            factor_address: DEFAULT_FACTOR_ADDRESS,
            offset_address: DEFAULT_OFFSET_ADDRESS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScaleConfig {
    pub slots: CalibrationSlots,
    /// Write the calibration back every time tare or calibration produce a new value
    pub persist: bool,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            slots: CalibrationSlots::default(),
            persist: true,
        }
    }
}

pub struct CalibrationStore<NV> {
    storage: NV,
    slots: CalibrationSlots,
}

impl<NV> CalibrationStore<NV>
where
    NV: Storage,
    NV::Error: Debug,
{
    pub fn new(storage: NV, slots: CalibrationSlots) -> Self {
        Self { storage, slots }
    }

    pub fn release(self) -> NV {
        self.storage
    }

    /// Raw bits of the factor slot, so erased and NaN contents can be told apart.
    pub fn read_factor_bits(&mut self) -> Result<u32, StorageError> {
        Ok(u32::from_le_bytes(self.read_word(self.slots.factor_address)?))
    }

    pub fn read_offset_bits(&mut self) -> Result<u32, StorageError> {
        Ok(u32::from_le_bytes(self.read_word(self.slots.offset_address)?))
    }

    pub fn write_factor(&mut self, factor: f32) -> Result<(), StorageError> {
        self.write_word(self.slots.factor_address, factor.to_le_bytes())
    }

    pub fn write_offset(&mut self, offset: i32) -> Result<(), StorageError> {
        self.write_word(self.slots.offset_address, offset.to_le_bytes())
    }

    fn read_word(&mut self, address: u32) -> Result<[u8; 4], StorageError> {
        let mut word = [0u8; 4];
        self.storage.read(address, &mut word).map_err(|e| {
            warn!("Unable to read calibration slot {}. Error: {}", address, defmt_or_debug(&e));
            StorageError::RetrieveError
        })?;
        Ok(word)
    }

    fn write_word(&mut self, address: u32, word: [u8; 4]) -> Result<(), StorageError> {
        self.storage.write(address, &word).map_err(|e| {
            warn!("Unable to save calibration slot {}. Error: {}", address, defmt_or_debug(&e));
            StorageError::SaveError
        })
    }
}

/// Storage errors are only known to be `Debug`, render them for the logger.
#[cfg(not(feature = "defmt"))]
fn defmt_or_debug<E: Debug>(error: &E) -> impl core::fmt::Display + '_ {
    struct Shown<'a, E>(&'a E);
    impl<E: Debug> core::fmt::Display for Shown<'_, E> {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }
    Shown(error)
}

#[cfg(feature = "defmt")]
fn defmt_or_debug<E: Debug>(error: &E) -> defmt::Debug2Format<'_, E> {
    defmt::Debug2Format(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeEeprom;

    #[test]
    fn default_slots_are_zero_and_ten() {
        let slots = CalibrationSlots::default();
        assert_eq!(slots.factor_address(), 0);
        assert_eq!(slots.offset_address(), 10);
        assert!(ScaleConfig::default().persist);
    }

    #[test]
    fn overlapping_slots_are_rejected() {
        assert_eq!(CalibrationSlots::new(0, 3), Err(StorageError::OverlappingSlots));
        assert_eq!(CalibrationSlots::new(8, 5), Err(StorageError::OverlappingSlots));
        assert_eq!(CalibrationSlots::new(4, 4), Err(StorageError::OverlappingSlots));
        assert!(CalibrationSlots::new(0, 4).is_ok());
        assert!(CalibrationSlots::new(20, 16).is_ok());
    }

    #[test]
    fn values_are_stored_little_endian() {
        let mut store = CalibrationStore::new(FakeEeprom::erased(), CalibrationSlots::default());

        store.write_factor(-42.5).unwrap();
        store.write_offset(0x0102_0304).unwrap();

        let eeprom = store.release();
        assert_eq!(eeprom.bytes[0..4], (-42.5f32).to_le_bytes());
        assert_eq!(eeprom.bytes[10..14], [0x04, 0x03, 0x02, 0x01]);
        assert_eq!(eeprom.bytes[4..10], [0xFF; 6]);
    }

    #[test]
    fn erased_slots_read_back_as_sentinel() {
        let mut store = CalibrationStore::new(FakeEeprom::erased(), CalibrationSlots::default());

        assert_eq!(store.read_factor_bits(), Ok(ERASED));
        assert_eq!(store.read_offset_bits(), Ok(ERASED));
    }

    #[test]
    fn out_of_range_slot_reports_retrieve_error() {
        let slots = CalibrationSlots::new(0, 62).unwrap();
        let mut store = CalibrationStore::new(FakeEeprom::erased(), slots);

        assert_eq!(store.read_offset_bits(), Err(StorageError::RetrieveError));
        assert_eq!(store.write_offset(1), Err(StorageError::SaveError));
    }
}
