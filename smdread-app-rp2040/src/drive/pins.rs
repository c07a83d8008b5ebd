use embassy_rp::gpio::{Input, Level, Output};

use smdread_core::lines::{DriveLines, DriveStatus, Tag};

use crate::shared::resource::STATUS_PINS;

/// Status inputs, in `DriveStatus` bit order
pub struct StatusPins<'d> {
    fault: Input<'d>,
    seek_error: Input<'d>,
    unit_ready: Input<'d>,
    unit_selected: Input<'d>,
    on_cylinder: Input<'d>,
    seek_end: Input<'d>,
    index: Input<'d>,
}

impl<'d> StatusPins<'d> {
    pub fn new(
        fault: Input<'d>,
        seek_error: Input<'d>,
        unit_ready: Input<'d>,
        unit_selected: Input<'d>,
        on_cylinder: Input<'d>,
        seek_end: Input<'d>,
        index: Input<'d>,
    ) -> Self {
        Self {
            fault,
            seek_error,
            unit_ready,
            unit_selected,
            on_cylinder,
            seek_end,
            index,
        }
    }

    /// Sample every status line
    pub fn sample(&self) -> DriveStatus {
        let mut status = DriveStatus::empty();
        status.set(DriveStatus::FAULT, self.fault.is_high());
        status.set(DriveStatus::SEEK_ERROR, self.seek_error.is_high());
        status.set(DriveStatus::UNIT_READY, self.unit_ready.is_high());
        status.set(DriveStatus::UNIT_SELECTED, self.unit_selected.is_high());
        status.set(DriveStatus::ON_CYLINDER, self.on_cylinder.is_high());
        status.set(DriveStatus::SEEK_END, self.seek_end.is_high());
        status.set(DriveStatus::INDEX, self.index.is_high());
        status
    }
}

/// Sample the status lines from either core
pub fn sample_status() -> DriveStatus {
    STATUS_PINS.lock(|pins| {
        pins.borrow()
            .as_ref()
            .map_or(DriveStatus::empty(), StatusPins::sample)
    })
}

/// Control outputs. Owned by the drive execution context only
pub struct ControlPins<'d> {
    bus: [Output<'d>; 10],
    unit_select: Output<'d>,
    tag1: Output<'d>,
    tag2: Output<'d>,
    tag3: Output<'d>,
}

impl<'d> ControlPins<'d> {
    pub fn new(
        bus: [Output<'d>; 10],
        unit_select: Output<'d>,
        tag1: Output<'d>,
        tag2: Output<'d>,
        tag3: Output<'d>,
    ) -> Self {
        Self {
            bus,
            unit_select,
            tag1,
            tag2,
            tag3,
        }
    }

    fn tag_pin(&mut self, tag: Tag) -> &mut Output<'d> {
        match tag {
            Tag::UnitSelect => &mut self.unit_select,
            Tag::Tag1 => &mut self.tag1,
            Tag::Tag2 => &mut self.tag2,
            Tag::Tag3 => &mut self.tag3,
        }
    }
}

impl<'d> DriveLines for ControlPins<'d> {
    fn status(&self) -> DriveStatus {
        sample_status()
    }

    fn set_tag(&mut self, tag: Tag, asserted: bool) {
        self.tag_pin(tag).set_level(Level::from(asserted));
        crate::trace!("tag {}: {}", tag, asserted);
    }

    fn set_bus(&mut self, value: u16) {
        for (bit, pin) in self.bus.iter_mut().enumerate() {
            pin.set_level(Level::from(value & (1 << bit) != 0));
        }
    }
}
