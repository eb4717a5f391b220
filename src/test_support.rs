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

//! Host side doubles for the bus, the EEPROM and time.

use crate::clock::Clock;
use crate::weight::interface::nau7802::registers::{Register, ctrl2, pu_ctrl};
use crate::weight::interface::nau7802::{DEFAULT_ADDRESS, Nau7802};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use embedded_storage::{ReadStorage, Storage};
use std::collections::VecDeque;

const REGISTER_COUNT: usize = 0x20;

/// Register level model of a NAU7802 that is just good enough to drive the real driver
/// through its state machines.
pub struct FakeNau7802 {
    pub registers: [u8; REGISTER_COUNT],
    pointer: u8,
    /// Conversion results handed out one per ADCO read. CR is reported while any are queued.
    pub samples: VecDeque<i32>,
    /// Errors returned by the next transactions, one per transaction.
    pub faults: VecDeque<ErrorKind>,
    pub transactions: usize,
    pub connect_failures: usize,
    pub power_up_stuck: bool,
    /// CTRL2 reads reporting CALS before a calibration finishes
    pub calibration_polls: usize,
    pub calibration_fails: bool,
    pending_calibration: Option<usize>,
    pub revision: u8,
    pub resets: usize,
}

impl FakeNau7802 {
    pub fn new() -> Self {
        Self {
            registers: [0; REGISTER_COUNT],
            pointer: 0,
            samples: VecDeque::new(),
            faults: VecDeque::new(),
            transactions: 0,
            connect_failures: 0,
            power_up_stuck: false,
            calibration_polls: 0,
            calibration_fails: false,
            pending_calibration: None,
            revision: 0x0F,
            resets: 0,
        }
    }

    fn write_register(&mut self, register: u8, value: u8) {
        let index = usize::from(register) % REGISTER_COUNT;

        if register == Register::PuCtrl.addr() {
            if value & (1 << pu_ctrl::RR) != 0 && self.registers[index] & (1 << pu_ctrl::RR) == 0 {
                self.registers = [0; REGISTER_COUNT];
                self.resets += 1;
            }
            let powered = value & (1 << pu_ctrl::PUD) != 0 && value & (1 << pu_ctrl::PUA) != 0;
            let mut value = value & !(1 << pu_ctrl::PUR) & !(1 << pu_ctrl::CR);
            if powered && !self.power_up_stuck {
                value |= 1 << pu_ctrl::PUR;
            }
            self.registers[index] = value;
            return;
        }

        if register == Register::Ctrl2.addr() {
            let starting = value & (1 << ctrl2::CALS) != 0
                && self.registers[index] & (1 << ctrl2::CALS) == 0;
            if starting {
                self.pending_calibration = Some(self.calibration_polls);
            }
        }

        self.registers[index] = value;
    }

    fn read_register(&mut self, register: u8) -> u8 {
        let index = usize::from(register) % REGISTER_COUNT;

        if register == Register::PuCtrl.addr() {
            let ready = if self.samples.is_empty() { 0 } else { 1 << pu_ctrl::CR };
            return self.registers[index] | ready;
        }

        if register == Register::DeviceRev.addr() {
            return self.revision;
        }

        if register == Register::Ctrl2.addr() {
            match self.pending_calibration {
                Some(0) => {
                    self.pending_calibration = None;
                    self.registers[index] &= !(1 << ctrl2::CALS);
                    if self.calibration_fails {
                        self.registers[index] |= 1 << ctrl2::CAL_ERR;
                    } else {
                        self.registers[index] &= !(1 << ctrl2::CAL_ERR);
                    }
                }
                Some(remaining) => self.pending_calibration = Some(remaining - 1),
                None => {}
            }
        }

        self.registers[index]
    }

    fn next_sample(&mut self) -> [u8; 3] {
        let bytes = self.samples.pop_front().unwrap_or(0).to_be_bytes();
        [bytes[1], bytes[2], bytes[3]]
    }
}

impl ErrorType for FakeNau7802 {
    type Error = ErrorKind;
}

impl I2c for FakeNau7802 {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.transactions += 1;

        if address != DEFAULT_ADDRESS {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        if let Some(fault) = self.faults.pop_front() {
            return Err(fault);
        }

        for operation in operations.iter_mut() {
            match operation {
                Operation::Write([]) => {
                    if self.connect_failures > 0 {
                        self.connect_failures -= 1;
                        return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
                    }
                }
                Operation::Write(bytes) => {
                    self.pointer = bytes[0];
                    if let Some(&value) = bytes.get(1) {
                        self.write_register(self.pointer, value);
                    }
                }
                Operation::Read(buffer) => {
                    if self.pointer == Register::AdcoB2.addr() && buffer.len() == 3 {
                        buffer.copy_from_slice(&self.next_sample());
                    } else {
                        for (offset, byte) in buffer.iter_mut().enumerate() {
                            *byte = self.read_register(self.pointer.wrapping_add(offset as u8));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// Driver over a borrowed fake, with a clock that advances one millisecond per query.
pub fn fake_driver(
    fake: &mut FakeNau7802,
) -> Nau7802<&mut FakeNau7802, CountingDelay, StepClock> {
    Nau7802::new(fake, CountingDelay::default(), StepClock::new(1))
}

/// Clock that moves forward by a fixed step every time it is read.
pub struct StepClock {
    pub now: u64,
    pub step: u64,
}

impl StepClock {
    pub fn new(step: u64) -> Self {
        Self { now: 0, step }
    }
}

impl Clock for StepClock {
    fn now_ms(&mut self) -> u64 {
        self.now += self.step;
        self.now
    }
}

#[derive(Default)]
pub struct CountingDelay {
    total_ns: u64,
}

impl CountingDelay {
    pub fn total_ms(&self) -> u64 {
        self.total_ns / 1_000_000
    }
}

impl DelayNs for CountingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }

    fn delay_us(&mut self, us: u32) {
        self.total_ns += u64::from(us) * 1_000;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.total_ns += u64::from(ms) * 1_000_000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeEepromError {
    OutOfBounds,
    WriteFailed,
}

/// Byte addressed EEPROM image
pub struct FakeEeprom {
    pub bytes: [u8; 64],
    pub writes: usize,
    pub fail_writes: bool,
}

impl FakeEeprom {
    /// Never written, every byte reads back 0xFF
    pub fn erased() -> Self {
        Self {
            bytes: [0xFF; 64],
            writes: 0,
            fail_writes: false,
        }
    }

    pub fn zeroed() -> Self {
        Self {
            bytes: [0; 64],
            ..Self::erased()
        }
    }

    pub fn put_f32(&mut self, offset: usize, value: f32) {
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn put_i32(&mut self, offset: usize, value: i32) {
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn get_f32(&self, offset: usize) -> f32 {
        f32::from_le_bytes(self.word(offset))
    }

    pub fn get_i32(&self, offset: usize) -> i32 {
        i32::from_le_bytes(self.word(offset))
    }

    fn word(&self, offset: usize) -> [u8; 4] {
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.bytes[offset..offset + 4]);
        word
    }

    fn range(&self, offset: u32, len: usize) -> Result<core::ops::Range<usize>, FakeEepromError> {
        let start = offset as usize;
        let end = start + len;
        if end > self.bytes.len() {
            return Err(FakeEepromError::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl ReadStorage for FakeEeprom {
    type Error = FakeEepromError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, bytes.len())?;
        bytes.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.bytes.len()
    }
}

impl Storage for FakeEeprom {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err(FakeEepromError::WriteFailed);
        }
        let range = self.range(offset, bytes.len())?;
        self.bytes[range].copy_from_slice(bytes);
        self.writes += 1;
        Ok(())
    }
}
