use crate::clock::Clock;
use crate::config::{
    INDEX_FALL_TIMEOUT_US, INDEX_RISE_TIMEOUT_US, LINE_POLL_INTERVAL_US, SEEK_SETTLE_US,
    SEEK_TIMEOUT_US, TAG_STROBE_US, UNIT_SELECT_TIMEOUT_US, VALUE_BUS_MAX,
};
use crate::lines::{DriveLines, DriveStatus, Tag, Tag3Control};

/// Drive side failure, fatal to the job that hit it
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriveError {
    /// FAULT or SEEK ERROR asserted
    Fault,
    /// UNIT READY or UNIT SELECTED not asserted
    NotReady,
    /// Bounded wait expired
    Timeout,
}

/// Tag/strobe protocol on top of the drive lines
pub struct DriveSequencer<L: DriveLines, K: Clock> {
    lines: L,
    clock: K,
}

impl<L: DriveLines, K: Clock> DriveSequencer<L, K> {
    pub fn new(lines: L, clock: K) -> Self {
        Self { lines, clock }
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn lines(&self) -> &L {
        &self.lines
    }

    /// Sample the status lines
    pub fn status(&self) -> DriveStatus {
        self.lines.status()
    }

    fn check_status(status: DriveStatus) -> Result<(), DriveError> {
        if status.has_error() {
            warn!("drive error: {:?}", status);
            return Err(DriveError::Fault);
        }
        if !status.is_ready() {
            warn!("drive not ready: {:?}", status);
            return Err(DriveError::NotReady);
        }
        Ok(())
    }

    /// Fail on fault/seek error, then on a unit that is not ready and selected
    pub fn check_drive(&self) -> Result<(), DriveError> {
        Self::check_status(self.lines.status())
    }

    /// Poll until `status & mask == value`
    ///
    /// With `check_drive` the drive is validated on every poll, before the
    /// condition is tested.
    pub async fn wait_lines(
        &self,
        mask: DriveStatus,
        value: DriveStatus,
        timeout_us: u64,
        check_drive: bool,
    ) -> Result<DriveStatus, DriveError> {
        let started_us = self.clock.now_us();
        loop {
            let status = self.lines.status();
            if check_drive {
                Self::check_status(status)?;
            }
            if status & mask == value {
                return Ok(status);
            }
            if self.clock.elapsed_us(started_us) > timeout_us {
                warn!(
                    "timeout waiting for {:?} = {:?}, last {:?}",
                    mask, value, status
                );
                return Err(DriveError::Timeout);
            }
            self.clock.delay_us(LINE_POLL_INTERVAL_US).await;
        }
    }

    /// Align to the start of a track: index low, then the next rising edge
    pub async fn wait_index(&self, check_drive: bool) -> Result<(), DriveError> {
        self.wait_lines(
            DriveStatus::INDEX,
            DriveStatus::empty(),
            INDEX_FALL_TIMEOUT_US,
            check_drive,
        )
        .await?;
        self.wait_lines(
            DriveStatus::INDEX,
            DriveStatus::INDEX,
            INDEX_RISE_TIMEOUT_US,
            check_drive,
        )
        .await?;
        Ok(())
    }

    /// Assert unit select and wait for the drive to answer
    pub async fn select_unit(&mut self) -> Result<(), DriveError> {
        self.lines.set_tag(Tag::UnitSelect, true);
        self.wait_lines(
            DriveStatus::UNIT_SELECTED,
            DriveStatus::UNIT_SELECTED,
            UNIT_SELECT_TIMEOUT_US,
            false,
        )
        .await?;
        self.check_drive()
    }

    /// Seek and wait for ON CYLINDER and SEEK END
    pub async fn select_cylinder(&mut self, cylinder: u16) -> Result<(), DriveError> {
        self.check_drive()?;
        debug!("seek to cylinder {}", cylinder);
        self.strobe(Tag::Tag1, cylinder).await;
        self.clock.delay_us(SEEK_SETTLE_US).await;
        self.wait_lines(
            DriveStatus::SEEK_DONE_MASK,
            DriveStatus::SEEK_DONE_MASK,
            SEEK_TIMEOUT_US,
            true,
        )
        .await?;
        Ok(())
    }

    pub async fn select_head(&mut self, head: u8) -> Result<(), DriveError> {
        self.check_drive()?;
        debug!("select head {}", head);
        self.strobe(Tag::Tag2, u16::from(head)).await;
        Ok(())
    }

    /// Assert the read gate with offsets. Stays asserted until `clear_output`
    pub fn set_read_enable(
        &mut self,
        servo_offset: i8,
        data_strobe_delay: i8,
    ) -> Result<(), DriveError> {
        self.check_drive()?;
        let ctrl = Tag3Control::read_enable(servo_offset, data_strobe_delay);
        self.put(Tag::Tag3, ctrl.bits());
        Ok(())
    }

    /// Pulse tag 3 with an arbitrary control word
    pub async fn tag3_strobe(&mut self, ctrl: u16) {
        self.strobe(Tag::Tag3, ctrl).await;
    }

    /// Pulse any tag with an arbitrary bus value
    pub async fn raw_tag(&mut self, tag: Tag, value: u16) {
        match tag {
            Tag::UnitSelect => {
                self.lines.set_tag(Tag::UnitSelect, value != 0);
            }
            _ => self.strobe(tag, value).await,
        }
    }

    /// Recalibrate to cylinder 0
    pub async fn return_to_zero(&mut self) -> Result<(), DriveError> {
        self.check_drive()?;
        self.strobe(Tag::Tag3, Tag3Control::RETURN_TO_ZERO.bits())
            .await;
        self.clock.delay_us(SEEK_SETTLE_US).await;
        self.wait_lines(
            DriveStatus::SEEK_DONE_MASK,
            DriveStatus::SEEK_DONE_MASK,
            SEEK_TIMEOUT_US,
            true,
        )
        .await?;
        Ok(())
    }

    /// Deassert tag 1..3 and zero the value bus. Unit select is left alone
    pub fn clear_output(&mut self) {
        for tag in Tag::FUNCTION_TAGS {
            self.lines.set_tag(tag, false);
        }
        self.lines.set_bus(0);
    }

    /// Deassert every tag including unit select
    pub fn release_unit(&mut self) {
        self.clear_output();
        self.lines.set_tag(Tag::UnitSelect, false);
    }

    /// Clear, then drive `value` with `tag` asserted
    fn put(&mut self, tag: Tag, value: u16) {
        self.clear_output();
        self.lines.set_bus(value & VALUE_BUS_MAX);
        self.lines.set_tag(tag, true);
    }

    async fn strobe(&mut self, tag: Tag, value: u16) {
        self.put(tag, value);
        self.clock.delay_us(TAG_STROBE_US).await;
        self.clear_output();
    }
}
