use crate::config::STATUS_HEARTBEAT_US;
use crate::lines::DriveStatus;

/// Something the host should hear about the status lines
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusEvent {
    /// Lines changed since the last sample
    Changed { at_us: u64, status: DriveStatus },
    /// Nothing changed for a heartbeat interval
    Heartbeat { at_us: u64 },
}

/// Change detector for the status lines, sampled from the control context
#[derive(Default)]
pub struct StatusMonitor {
    last: Option<DriveStatus>,
    last_report_us: u64,
}

impl StatusMonitor {
    pub const fn new() -> Self {
        Self {
            last: None,
            last_report_us: 0,
        }
    }

    /// Last sampled status
    pub fn current(&self) -> Option<DriveStatus> {
        self.last
    }

    /// Feed one sample
    ///
    /// The first sample always counts as a change. A heartbeat is due when
    /// nothing was reported for longer than the heartbeat interval.
    pub fn poll(&mut self, status: DriveStatus, now_us: u64) -> Option<StatusEvent> {
        if self.last != Some(status) {
            self.last = Some(status);
            self.last_report_us = now_us;
            trace!("status {:?} at {}", status, now_us);
            return Some(StatusEvent::Changed {
                at_us: now_us,
                status,
            });
        }
        if now_us.saturating_sub(self.last_report_us) > STATUS_HEARTBEAT_US {
            self.last_report_us = now_us;
            return Some(StatusEvent::Heartbeat { at_us: now_us });
        }
        None
    }
}
