use embassy_time::Instant;
use portable_atomic::Ordering;

use smdread_core::buffer::{BufferFilename, BufferId};
use smdread_core::monitor::StatusMonitor;

use crate::drive::pins::sample_status;
use crate::shared::constant::*;
use crate::shared::datatype::{HostCommand, HostError, Reply};
use crate::shared::resource::{CONTROL, JOB_POLLING, POOL, STATUS_SUBSCRIBED};

/// Apply one host command on the control side and build its reply
///
/// Never waits on the drive: jobs are handed over to core1 and reported
/// later by `Housekeeping::job_finished`.
pub fn dispatch(command: HostCommand) -> Reply {
    crate::debug!("host command: {}", command);
    let result = match command {
        HostCommand::Launch(job) => CONTROL
            .start_job(job)
            .map(|()| JOB_POLLING.store(true, Ordering::Relaxed))
            .map_err(HostError::from),
        HostCommand::ReadData {
            word_count,
            index_sync,
            skip_checks,
        } => CONTROL
            .start_read_data(&POOL, word_count, index_sync, skip_checks)
            .map(|buffer| {
                crate::debug!("reading into buffer {}", buffer.index());
                JOB_POLLING.store(true, Ordering::Relaxed);
            })
            .map_err(HostError::from),
        HostCommand::Terminate => {
            CONTROL.terminate();
            Ok(())
        }
        HostCommand::Poll => return CONTROL.report().into(),
        HostCommand::SubscribeStatus(enable) => {
            STATUS_SUBSCRIBED.store(enable, Ordering::Relaxed);
            Ok(())
        }
        HostCommand::StatusNames => {
            return Reply::StatusNames {
                names: &STATUS_LINE_NAMES,
            }
        }
    };

    match result {
        Ok(()) => Reply::Ack {
            cmd: command.name(),
        },
        Err(err) => {
            crate::warn!("{} rejected: {}", command.name(), err);
            err.into()
        }
    }
}

/// Periodic control-side work between host commands
pub struct Housekeeping {
    monitor: StatusMonitor,
}

impl Housekeeping {
    pub const fn new() -> Self {
        Self {
            monitor: StatusMonitor::new(),
        }
    }

    /// Status change or heartbeat, while the host is subscribed
    pub fn status_event(&mut self) -> Option<Reply> {
        if !STATUS_SUBSCRIBED.load(Ordering::Relaxed) {
            return None;
        }
        self.monitor
            .poll(sample_status(), Instant::now().as_micros())
            .map(Reply::from)
    }

    /// Final report of the launched job, once
    pub fn job_finished(&mut self) -> Option<Reply> {
        if !JOB_POLLING.load(Ordering::Relaxed) {
            return None;
        }
        let report = CONTROL.report();
        if !report.status.is_finished() {
            return None;
        }
        JOB_POLLING.store(false, Ordering::Relaxed);
        crate::info!("job finished: {}", report.status);
        Some(report.into())
    }

    /// Claim the next WRITTEN buffer for transfer (Written -> Transferred)
    pub fn next_written(&mut self) -> Option<(BufferId, Reply)> {
        POOL.lock(|pool| {
            let id = pool.find_written()?;
            pool.mark_transferred(id);
            let filename = BufferFilename::try_from(pool.filename(id)).unwrap_or_default();
            let size = pool.size(id);
            crate::info!("drain buffer {}: {} ({} bytes)", id.index(), filename.as_str(), size);
            Some((id, Reply::Buffer { filename, size }))
        })
    }
}
