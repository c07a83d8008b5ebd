use core::fmt::Write;
use core::ops::RangeInclusive;

use bit_field::BitField;

use crate::buffer::BufferFilename;
use crate::config::{DRIVE_HEAD_COUNT, VALUE_BUS_MAX};
use crate::job::JobArgError;

/// Raw offset argument meaning "sweep -1, 0, 1"
pub const OFFSET_SWEEP: i32 = 99;

/// Servo offset / data strobe delay selection for a batch read
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OffsetSpec {
    /// A single value in -1..=1
    Fixed(i8),
    /// Every value in -1..=1
    Sweep,
}

impl OffsetSpec {
    /// Decode a raw host argument. Anything but the sweep sentinel is clamped to -1..=1
    pub fn from_raw(raw: i32) -> Self {
        if raw == OFFSET_SWEEP {
            OffsetSpec::Sweep
        } else {
            OffsetSpec::Fixed(raw.clamp(-1, 1) as i8)
        }
    }

    /// Offsets to visit, ascending
    pub fn values(&self) -> RangeInclusive<i8> {
        match *self {
            OffsetSpec::Fixed(value) => {
                let value = value.clamp(-1, 1);
                value..=value
            }
            OffsetSpec::Sweep => -1..=1,
        }
    }
}

/// Multi-track sweep: cylinders x heads x servo offsets x strobe delays
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatchRead {
    pub cylinder_first: u16,
    /// Inclusive
    pub cylinder_last: u16,
    /// Bit n selects head n
    pub head_set: u32,
    pub words_per_track: usize,
    pub servo_offset: OffsetSpec,
    pub data_strobe_delay: OffsetSpec,
}

impl BatchRead {
    pub fn validate(&self) -> Result<(), JobArgError> {
        if self.cylinder_first > self.cylinder_last || self.cylinder_last > VALUE_BUS_MAX {
            return Err(JobArgError::CylinderRange);
        }
        if self.heads().next().is_none() {
            return Err(JobArgError::HeadSet);
        }
        Ok(())
    }

    pub fn cylinders(&self) -> RangeInclusive<u16> {
        self.cylinder_first..=self.cylinder_last
    }

    /// Selected heads, ascending. Bits at or above the head count are ignored
    pub fn heads(&self) -> impl Iterator<Item = u8> {
        let head_set = self.head_set;
        (0..DRIVE_HEAD_COUNT).filter(move |&head| head_set.get_bit(usize::from(head)))
    }

    /// (servo offset, data strobe delay) pairs, servo offset major
    pub fn offsets(&self) -> impl Iterator<Item = (i8, i8)> {
        let data_strobe_delays = self.data_strobe_delay.values();
        self.servo_offset
            .values()
            .flat_map(move |so| data_strobe_delays.clone().map(move |dsd| (so, dsd)))
    }

    /// Number of tracks the batch captures
    pub fn track_count(&self) -> usize {
        self.cylinders().len() * self.heads().count() * self.offsets().count()
    }
}

/// `cylinderCCCC-headH[-servo-negative|-servo-positive][-strobe-early|-strobe-late].nrz`
pub fn batch_filename(
    cylinder: u16,
    head: u8,
    servo_offset: i8,
    data_strobe_delay: i8,
) -> BufferFilename {
    let servo = match servo_offset {
        o if o < 0 => "-servo-negative",
        o if o > 0 => "-servo-positive",
        _ => "",
    };
    let strobe = match data_strobe_delay {
        d if d < 0 => "-strobe-early",
        d if d > 0 => "-strobe-late",
        _ => "",
    };
    let mut filename = BufferFilename::new();
    // always fits: 8 + 4 + 5 + 3 + 15 + 13 + 4 chars
    let _ = write!(
        filename,
        "cylinder{:04}-head{}{}{}.nrz",
        cylinder, head, servo, strobe
    );
    filename
}

/// `customNNNN.nrz`
pub fn read_data_filename(serial: u32) -> BufferFilename {
    let mut filename = BufferFilename::new();
    let _ = write!(filename, "custom{:04}.nrz", serial);
    filename
}
