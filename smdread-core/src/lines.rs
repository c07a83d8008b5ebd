use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

bitflags! {
    /// Drive status lines, sampled all at once
    ///
    /// | Bit | Line          | Meaning when set                        |
    /// | --- | ------------- | --------------------------------------- |
    /// | 0   | FAULT         | drive detected a fault condition        |
    /// | 1   | SEEK ERROR    | seek did not complete                   |
    /// | 2   | UNIT READY    | spindle up to speed, heads loaded       |
    /// | 3   | UNIT SELECTED | drive answered the unit select tag      |
    /// | 4   | ON CYLINDER   | heads settled on the requested cylinder |
    /// | 5   | SEEK END      | ON CYLINDER or SEEK ERROR               |
    /// | 6   | INDEX         | once-per-revolution index pulse         |
    #[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
    pub struct DriveStatus: u16 {
        const FAULT = 0b0000_0001;
        const SEEK_ERROR = 0b0000_0010;
        const UNIT_READY = 0b0000_0100;
        const UNIT_SELECTED = 0b0000_1000;
        const ON_CYLINDER = 0b0001_0000;
        const SEEK_END = 0b0010_0000;
        const INDEX = 0b0100_0000;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DriveStatus {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "DriveStatus({=u16:#x})", self.bits())
    }
}

impl DriveStatus {
    /// Lines that abort any operation when asserted
    pub const ERROR_MASK: Self = Self::FAULT.union(Self::SEEK_ERROR);
    /// Lines that have to be asserted before the drive accepts commands
    pub const READY_MASK: Self = Self::UNIT_READY.union(Self::UNIT_SELECTED);
    /// Seek completion
    pub const SEEK_DONE_MASK: Self = Self::ON_CYLINDER.union(Self::SEEK_END);

    /// Check if fault or seek error is asserted
    pub fn has_error(&self) -> bool {
        self.intersects(Self::ERROR_MASK)
    }

    /// Check if the unit is ready and selected
    pub fn is_ready(&self) -> bool {
        self.contains(Self::READY_MASK)
    }

    /// Check if the last seek completed
    pub fn is_on_cylinder(&self) -> bool {
        self.contains(Self::SEEK_DONE_MASK)
    }
}

/// Tag lines
#[derive(Copy, Clone, Eq, PartialEq, Debug, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Tag {
    /// Unit select (latched by the drive, held for the whole session)
    UnitSelect = 0,
    /// Tag 1: cylinder address
    Tag1 = 1,
    /// Tag 2: head select
    Tag2 = 2,
    /// Tag 3: control select
    Tag3 = 3,
}

impl Tag {
    /// Tags cleared by `clear_output`
    pub const FUNCTION_TAGS: [Tag; 3] = [Tag::Tag1, Tag::Tag2, Tag::Tag3];
}

bitflags! {
    /// Tag 3 control word (value bus while tag 3 is asserted)
    ///
    /// | Bit | Function            |
    /// | --- | ------------------- |
    /// | 0   | Write Gate          |
    /// | 1   | Read Gate           |
    /// | 2   | Servo Offset Plus   |
    /// | 3   | Servo Offset Minus  |
    /// | 4   | Fault Clear         |
    /// | 5   | Address Mark Enable |
    /// | 6   | Return To Zero      |
    /// | 7   | Data Strobe Early   |
    /// | 8   | Data Strobe Late    |
    /// | 9   | Release             |
    #[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
    pub struct Tag3Control: u16 {
        const WRITE_GATE = 1 << 0;
        const READ_GATE = 1 << 1;
        const SERVO_OFFSET_POSITIVE = 1 << 2;
        const SERVO_OFFSET_NEGATIVE = 1 << 3;
        const FAULT_CLEAR = 1 << 4;
        const ADDRESS_MARK_ENABLE = 1 << 5;
        const RETURN_TO_ZERO = 1 << 6;
        const DATA_STROBE_EARLY = 1 << 7;
        const DATA_STROBE_LATE = 1 << 8;
        const RELEASE = 1 << 9;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Tag3Control {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Tag3Control({=u16:#x})", self.bits())
    }
}

impl Tag3Control {
    /// Read gate with the given servo offset and data strobe delay.
    /// Only the sign of each argument matters.
    pub fn read_enable(servo_offset: i8, data_strobe_delay: i8) -> Self {
        let mut ctrl = Self::READ_GATE;
        if servo_offset > 0 {
            ctrl |= Self::SERVO_OFFSET_POSITIVE;
        } else if servo_offset < 0 {
            ctrl |= Self::SERVO_OFFSET_NEGATIVE;
        }
        if data_strobe_delay > 0 {
            ctrl |= Self::DATA_STROBE_LATE;
        } else if data_strobe_delay < 0 {
            ctrl |= Self::DATA_STROBE_EARLY;
        }
        ctrl
    }
}

/// Electrical interface to the drive, addressed by logical line name only
#[cfg_attr(test, mockall::automock)]
pub trait DriveLines {
    /// Sample every status line at once
    fn status(&self) -> DriveStatus;
    /// Assert or deassert a tag line
    fn set_tag(&mut self, tag: Tag, asserted: bool);
    /// Drive the 10-bit value bus. Bits above the bus width are ignored
    fn set_bus(&mut self, value: u16);
}
