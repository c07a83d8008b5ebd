use core::cell::Cell;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embedded_hal_1::digital::OutputPin;

use crate::batch::{batch_filename, read_data_filename, BatchRead};
use crate::buffer::{BufferId, SharedBufferPool};
use crate::capture::{CaptureChannel, ClockedReader};
use crate::clock::Clock;
use crate::config::{
    BLINK_TEST_COUNT, BLINK_TEST_HALF_PERIOD_US, BUFFER_WAIT_RETRY_US, BUFFER_WAIT_TIMEOUT_US,
    CAPTURE_TIMEOUT_US, LINE_POLL_INTERVAL_US, READ_DATA_FIRST_SERIAL,
};
use crate::drive::{DriveError, DriveSequencer};
use crate::job::{Job, JobArgError, JobErrorCode, JobStatus};
use crate::lines::DriveLines;

/// Status of the current job as seen from the control side
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct JobReport {
    /// Bumped by every launch and terminate
    pub generation: u32,
    pub status: JobStatus,
    pub begin_us: u64,
    /// Set once the job halted
    pub duration_us: Option<u64>,
}

impl JobReport {
    pub const IDLE: Self = Self {
        generation: 0,
        status: JobStatus::Idle,
        begin_us: 0,
        duration_us: None,
    };
}

/// Control side -> drive side
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum JobRequest {
    Start { generation: u32, job: Job },
    Terminate,
}

/// Launch refused, nothing was started
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LaunchError {
    Argument(JobArgError),
    /// No free buffer for a single read
    NoBuffer,
}

impl From<JobArgError> for LaunchError {
    fn from(err: JobArgError) -> Self {
        LaunchError::Argument(err)
    }
}

/// Handoff between the control context and the drive context
///
/// A single request slot goes in (a newer request replaces one not yet
/// picked up), a report comes out. The generation number keeps a job that
/// was torn down from publishing over its successor.
pub struct JobControl {
    request: Signal<CriticalSectionRawMutex, JobRequest>,
    report: Mutex<CriticalSectionRawMutex, Cell<JobReport>>,
}

impl Default for JobControl {
    fn default() -> Self {
        Self::new()
    }
}

impl JobControl {
    pub const fn new() -> Self {
        Self {
            request: Signal::new(),
            report: Mutex::new(Cell::new(JobReport::IDLE)),
        }
    }

    /// Bump the generation and apply `f` to the report
    fn next_generation(&self, f: impl FnOnce(&mut JobReport)) -> u32 {
        self.report.lock(|report| {
            let mut next = report.get();
            next.generation = next.generation.wrapping_add(1);
            f(&mut next);
            report.set(next);
            next.generation
        })
    }

    /* Control side */

    /// Replace whatever runs on the drive with `job`
    pub fn start_job(&self, job: Job) -> Result<(), LaunchError> {
        job.validate()?;
        let generation = self.next_generation(|report| {
            report.status = JobStatus::Running;
            report.begin_us = 0;
            report.duration_us = None;
        });
        info!("launch {} (generation {})", job.name(), generation);
        self.request.signal(JobRequest::Start { generation, job });
        Ok(())
    }

    /// Allocate a buffer and launch a single read into it
    pub fn start_read_data<const N: usize, const SIZE: usize>(
        &self,
        pool: &SharedBufferPool<N, SIZE>,
        word_count: usize,
        index_sync: bool,
        skip_checks: bool,
    ) -> Result<BufferId, LaunchError> {
        let buffer = pool
            .try_allocate(word_count.saturating_mul(4))
            .map_err(|_| LaunchError::NoBuffer)?;
        self.start_job(Job::ReadData {
            buffer,
            word_count,
            index_sync,
            skip_checks,
        })?;
        Ok(buffer)
    }

    /// Tear down the running job and clear the outputs
    pub fn terminate(&self) {
        let generation = self.next_generation(|report| {
            if report.status == JobStatus::Running {
                report.status = JobStatus::Error(JobErrorCode::Terminated);
            }
        });
        info!("terminate (generation {})", generation);
        self.request.signal(JobRequest::Terminate);
    }

    pub fn poll_status(&self) -> JobStatus {
        self.report().status
    }

    pub fn report(&self) -> JobReport {
        self.report.lock(|report| report.get())
    }

    /* Drive side */

    pub async fn next_request(&self) -> JobRequest {
        self.request.wait().await
    }

    /// Record the begin time. False if `generation` was already superseded
    pub fn begin(&self, generation: u32, now_us: u64) -> bool {
        self.report.lock(|report| {
            let mut current = report.get();
            if current.generation != generation {
                return false;
            }
            current.begin_us = now_us;
            report.set(current);
            true
        })
    }

    /// Publish the final status. False if `generation` was already superseded
    pub fn finish(&self, generation: u32, status: JobStatus, duration_us: u64) -> bool {
        self.report.lock(|report| {
            let mut current = report.get();
            if current.generation != generation {
                return false;
            }
            current.status = status;
            current.duration_us = Some(duration_us);
            report.set(current);
            true
        })
    }
}

/// Drive execution context: owns the lines, the capture unit and the LED
pub struct JobRunner<'a, L, C, K, P, const N: usize, const SIZE: usize>
where
    L: DriveLines,
    C: CaptureChannel,
    K: Clock,
    P: OutputPin,
{
    control: &'a JobControl,
    pool: &'a SharedBufferPool<N, SIZE>,
    sequencer: DriveSequencer<L, K>,
    reader: ClockedReader<C>,
    led: P,
    /// Next `customNNNN.nrz` serial, never reset
    read_serial: u32,
}

impl<'a, L, C, K, P, const N: usize, const SIZE: usize> JobRunner<'a, L, C, K, P, N, SIZE>
where
    L: DriveLines,
    C: CaptureChannel,
    K: Clock,
    P: OutputPin,
{
    pub fn new(
        control: &'a JobControl,
        pool: &'a SharedBufferPool<N, SIZE>,
        lines: L,
        capture: C,
        clock: K,
        led: P,
    ) -> Self {
        let mut sequencer = DriveSequencer::new(lines, clock);
        sequencer.release_unit();
        Self {
            control,
            pool,
            sequencer,
            reader: ClockedReader::new(capture),
            led,
            read_serial: READ_DATA_FIRST_SERIAL,
        }
    }

    /// Serve requests forever. A newer request drops the job in flight
    pub async fn run(&mut self) -> ! {
        let control = self.control;
        let mut request = control.next_request().await;
        loop {
            request = match request {
                JobRequest::Terminate => {
                    self.teardown(true);
                    control.next_request().await
                }
                JobRequest::Start { generation, job } => {
                    self.teardown(!job.keeps_outputs());
                    match select(self.execute(generation, job), control.next_request()).await {
                        Either::First(()) => control.next_request().await,
                        Either::Second(next) => {
                            // outputs are only carried over from a job that halted by itself
                            warn!("{} torn down", job.name());
                            self.teardown(true);
                            next
                        }
                    }
                }
            };
        }
    }

    fn teardown(&mut self, clear_output: bool) {
        self.reader.reset();
        if clear_output {
            self.sequencer.clear_output();
        }
    }

    async fn execute(&mut self, generation: u32, job: Job) {
        let begin_us = self.sequencer.clock().now_us();
        if !self.control.begin(generation, begin_us) {
            return;
        }
        debug!("{}: {:?}", job.name(), job);

        let result = self.run_job(job).await;
        if result.is_err() {
            self.reader.reset();
        }
        let status = JobStatus::from(result);
        let duration_us = self.sequencer.clock().elapsed_us(begin_us);
        match status {
            JobStatus::Error(code) => warn!("{} failed: {:?} after {}us", job.name(), code, duration_us),
            _ => info!("{} done after {}us", job.name(), duration_us),
        }
        self.control.finish(generation, status, duration_us);
    }

    async fn run_job(&mut self, job: Job) -> Result<(), JobErrorCode> {
        match job {
            Job::BlinkTest { fail } => self.blink_test(fail).await,
            Job::SelectUnit0 => Ok(self.sequencer.select_unit().await?),
            Job::SelectCylinder { cylinder } => Ok(self.sequencer.select_cylinder(cylinder).await?),
            Job::SelectHead { head } => Ok(self.sequencer.select_head(head).await?),
            Job::Tag3Strobe { ctrl } => {
                self.sequencer.tag3_strobe(ctrl).await;
                Ok(())
            }
            Job::ReadEnable {
                servo_offset,
                data_strobe_delay,
            } => Ok(self
                .sequencer
                .set_read_enable(servo_offset, data_strobe_delay)?),
            Job::ReadData {
                buffer,
                word_count,
                index_sync,
                skip_checks,
            } => self.read_data(buffer, word_count, index_sync, skip_checks).await,
            Job::ReadBatch(batch) => self.read_batch(batch).await,
            Job::RawTag { tag, value } => {
                self.sequencer.raw_tag(tag, value).await;
                Ok(())
            }
            Job::ReturnToZero => Ok(self.sequencer.return_to_zero().await?),
        }
    }

    async fn blink_test(&mut self, fail: bool) -> Result<(), JobErrorCode> {
        for _ in 0..BLINK_TEST_COUNT {
            self.led.set_high().ok();
            self.sequencer.clock().delay_us(BLINK_TEST_HALF_PERIOD_US).await;
            self.led.set_low().ok();
            self.sequencer.clock().delay_us(BLINK_TEST_HALF_PERIOD_US).await;
        }
        if fail {
            Err(JobErrorCode::TestFailure)
        } else {
            Ok(())
        }
    }

    async fn read_data(
        &mut self,
        buffer: BufferId,
        word_count: usize,
        index_sync: bool,
        skip_checks: bool,
    ) -> Result<(), JobErrorCode> {
        let filename = read_data_filename(self.read_serial);
        self.read_serial += 1;
        self.pool.lock(|pool| *pool.filename_mut(buffer) = filename);
        self.read_into(buffer, word_count, index_sync, skip_checks)
            .await?;
        Ok(())
    }

    /// Capture one track into a BUSY buffer and hand it to the control side
    async fn read_into(
        &mut self,
        buffer: BufferId,
        word_count: usize,
        index_sync: bool,
        skip_checks: bool,
    ) -> Result<(), DriveError> {
        let check_drive = !skip_checks;
        if check_drive {
            self.sequencer.check_drive()?;
        }
        if index_sync {
            self.sequencer.wait_index(check_drive).await?;
        }

        self.reader
            .start_capture(self.pool, buffer, word_count.saturating_mul(4));
        let started_us = self.sequencer.clock().now_us();
        while self.reader.is_active() {
            if check_drive {
                self.sequencer.check_drive()?;
            }
            if self.sequencer.clock().elapsed_us(started_us) > CAPTURE_TIMEOUT_US {
                warn!("capture into buffer {} did not finish", buffer.index());
                return Err(DriveError::Timeout);
            }
            self.sequencer.clock().delay_us(LINE_POLL_INTERVAL_US).await;
        }

        self.pool.lock(|pool| pool.mark_written(buffer));
        Ok(())
    }

    async fn read_batch(&mut self, batch: BatchRead) -> Result<(), JobErrorCode> {
        self.sequencer.check_drive()?;
        let byte_count = batch.words_per_track.saturating_mul(4);
        info!("batch: {} tracks", batch.track_count());

        for cylinder in batch.cylinders() {
            self.sequencer.select_cylinder(cylinder).await?;
            for head in batch.heads() {
                self.sequencer.select_head(head).await?;
                for (servo_offset, data_strobe_delay) in batch.offsets() {
                    let buffer = self.wait_for_buffer(byte_count).await?;
                    let filename = batch_filename(cylinder, head, servo_offset, data_strobe_delay);
                    self.pool.lock(|pool| *pool.filename_mut(buffer) = filename);

                    self.sequencer
                        .set_read_enable(servo_offset, data_strobe_delay)?;
                    self.read_into(buffer, batch.words_per_track, true, false)
                        .await?;
                    self.sequencer.clear_output();
                }
            }
        }
        Ok(())
    }

    /// Poll the pool until a buffer can be allocated
    async fn wait_for_buffer(&mut self, byte_count: usize) -> Result<BufferId, JobErrorCode> {
        let started_us = self.sequencer.clock().now_us();
        loop {
            if let Ok(buffer) = self.pool.try_allocate(byte_count) {
                return Ok(buffer);
            }
            if self.sequencer.clock().elapsed_us(started_us) > BUFFER_WAIT_TIMEOUT_US {
                warn!("no free buffer");
                return Err(JobErrorCode::Timeout);
            }
            self.sequencer.clock().delay_us(BUFFER_WAIT_RETRY_US).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::OffsetSpec;
    use crate::buffer::BufferStatus;
    use crate::config::{DRIVE_REVOLUTION_US, SEEK_TIMEOUT_US, UNIT_SELECT_TIMEOUT_US};
    use crate::lines::{DriveStatus, Tag, Tag3Control};
    use crate::testing::{FakeCapture, FakeClock, FakeDrive, FakeLed};
    use core::future::Future;
    use embassy_futures::yield_now;
    use rstest::rstest;

    const BUFFER_N: usize = 3;
    const BUFFER_SIZE: usize = 256;
    const CAPTURE_US: u64 = 2_000;

    type Pool = SharedBufferPool<BUFFER_N, BUFFER_SIZE>;
    type Runner<'a> = JobRunner<'a, FakeDrive, FakeCapture, FakeClock, FakeLed, BUFFER_N, BUFFER_SIZE>;

    fn ready() -> DriveStatus {
        DriveStatus::UNIT_READY | DriveStatus::UNIT_SELECTED
    }

    struct Bench {
        clock: FakeClock,
        drive: FakeDrive,
        capture: FakeCapture,
        led: FakeLed,
        control: JobControl,
        pool: Pool,
    }

    impl Bench {
        fn new(status: DriveStatus) -> Self {
            let clock = FakeClock::new();
            Self {
                drive: FakeDrive::new(clock.clone(), status),
                capture: FakeCapture::new(clock.clone(), CAPTURE_US),
                led: FakeLed::default(),
                control: JobControl::new(),
                pool: Pool::new(),
                clock,
            }
        }

        /// Drive that seeks in 1ms and pulses index every revolution
        fn spinning() -> Self {
            let bench = Self::new(ready());
            bench.drive.complete_seeks_after(1_000);
            bench.drive.index_pulse(DRIVE_REVOLUTION_US, 100);
            bench
        }

        fn runner(&self) -> Runner<'_> {
            JobRunner::new(
                &self.control,
                &self.pool,
                self.drive.clone(),
                self.capture.clone(),
                self.clock.clone(),
                self.led.clone(),
            )
        }

        /// Run `script` against a live runner
        async fn with_runner<F: Future>(&self, script: F) -> F::Output {
            let mut runner = self.runner();
            match select(runner.run(), script).await {
                Either::First(never) => never,
                Either::Second(output) => output,
            }
        }

        async fn wait_finished(&self) -> JobStatus {
            for _ in 0..10_000_000 {
                let status = self.control.poll_status();
                if status.is_finished() {
                    return status;
                }
                yield_now().await;
            }
            panic!("job did not finish");
        }

        fn drain_one(&self) -> Option<(usize, std::string::String)> {
            self.pool.lock(|pool| {
                let id = pool.find_written()?;
                pool.mark_transferred(id);
                let filename = pool.filename(id).to_string();
                pool.release(id);
                Some((id.index(), filename))
            })
        }
    }

    #[tokio::test]
    async fn test_idle_before_first_job() {
        let bench = Bench::new(ready());
        assert_eq!(bench.control.poll_status(), JobStatus::Idle);
        assert_eq!(bench.control.report().duration_us, None);
    }

    #[tokio::test]
    async fn test_select_unit0_timeout() {
        let bench = Bench::new(DriveStatus::UNIT_READY);
        let status = bench
            .with_runner(async {
                bench.control.start_job(Job::SelectUnit0).unwrap();
                assert_eq!(bench.control.poll_status(), JobStatus::Running);
                bench.wait_finished().await
            })
            .await;

        assert_eq!(status, JobStatus::Error(JobErrorCode::Timeout));
        let duration = bench.control.report().duration_us.unwrap();
        assert!(duration > UNIT_SELECT_TIMEOUT_US && duration <= UNIT_SELECT_TIMEOUT_US + 10);
    }

    #[tokio::test]
    async fn test_select_cylinder_done_after_50ms() {
        let bench = Bench::new(ready());
        bench
            .drive
            .set_status_at(50_000, ready() | DriveStatus::SEEK_DONE_MASK);
        let status = bench
            .with_runner(async {
                bench
                    .control
                    .start_job(Job::SelectCylinder { cylinder: 10 })
                    .unwrap();
                assert_eq!(bench.control.poll_status(), JobStatus::Running);
                bench.wait_finished().await
            })
            .await;

        assert_eq!(status, JobStatus::Done);
        let report = bench.control.report();
        assert_eq!(report.begin_us, 0);
        assert_eq!(report.duration_us, Some(50_000));
    }

    #[tokio::test]
    async fn test_select_cylinder_timeout() {
        let bench = Bench::new(ready());
        let status = bench
            .with_runner(async {
                bench
                    .control
                    .start_job(Job::SelectCylinder { cylinder: 10 })
                    .unwrap();
                bench.wait_finished().await
            })
            .await;

        assert_eq!(status, JobStatus::Error(JobErrorCode::Timeout));
        let duration = bench.control.report().duration_us.unwrap();
        assert!(duration > SEEK_TIMEOUT_US && duration < SEEK_TIMEOUT_US + 2_000);
    }

    #[tokio::test]
    async fn test_select_head_not_ready() {
        let bench = Bench::new(DriveStatus::UNIT_READY);
        let status = bench
            .with_runner(async {
                bench.control.start_job(Job::SelectHead { head: 2 }).unwrap();
                bench.wait_finished().await
            })
            .await;
        assert_eq!(status, JobStatus::Error(JobErrorCode::DriveNotReady));
    }

    #[tokio::test]
    async fn test_invalid_arguments_rejected() {
        let bench = Bench::new(ready());
        assert_eq!(
            bench.control.start_job(Job::SelectHead { head: 9 }),
            Err(LaunchError::Argument(JobArgError::Head))
        );
        assert_eq!(bench.control.poll_status(), JobStatus::Idle);
    }

    #[rstest]
    #[case(BatchRead { head_set: 0, ..offset_batch() }, JobArgError::HeadSet)]
    #[case(BatchRead { cylinder_first: 4, cylinder_last: 3, ..offset_batch() }, JobArgError::CylinderRange)]
    #[tokio::test]
    async fn test_empty_batch_refused(#[case] batch: BatchRead, #[case] err: JobArgError) {
        let bench = Bench::spinning();
        assert_eq!(
            bench.control.start_job(Job::ReadBatch(batch)),
            Err(LaunchError::Argument(err))
        );
        assert_eq!(bench.control.poll_status(), JobStatus::Idle);
        assert!(bench.pool.lock(|pool| pool.find_written()).is_none());
        assert!(bench.capture.transfers().is_empty());
    }

    #[tokio::test]
    async fn test_blink_test() {
        let bench = Bench::new(ready());
        let (done, failed) = bench
            .with_runner(async {
                bench.control.start_job(Job::BlinkTest { fail: false }).unwrap();
                let done = bench.wait_finished().await;
                let duration = bench.control.report().duration_us;
                bench.control.start_job(Job::BlinkTest { fail: true }).unwrap();
                ((done, duration), bench.wait_finished().await)
            })
            .await;

        assert_eq!(done.0, JobStatus::Done);
        assert_eq!(done.1, Some(1_500_000));
        assert_eq!(failed, JobStatus::Error(JobErrorCode::TestFailure));
        assert_eq!(bench.led.on_count(), 2 * BLINK_TEST_COUNT);
    }

    #[tokio::test]
    async fn test_read_data_serial_survives_errors() {
        let bench = Bench::spinning();
        let names = bench
            .with_runner(async {
                let first = bench
                    .control
                    .start_read_data(&bench.pool, 16, true, false)
                    .unwrap();
                assert_eq!(bench.wait_finished().await, JobStatus::Done);
                assert_eq!(bench.pool.status(first), BufferStatus::Written);
                let first_name = bench.drain_one().unwrap().1;

                // drive drops out: the second read fails
                bench.drive.set_status_at(0, DriveStatus::UNIT_READY);
                let second = bench
                    .control
                    .start_read_data(&bench.pool, 16, true, false)
                    .unwrap();
                assert_eq!(
                    bench.wait_finished().await,
                    JobStatus::Error(JobErrorCode::DriveNotReady)
                );
                let second_name = bench.pool.lock(|pool| pool.filename(second).to_string());
                assert_eq!(bench.pool.status(second), BufferStatus::Busy);

                bench.drive.set_status_at(0, ready());
                bench.control.start_read_data(&bench.pool, 16, false, true).unwrap();
                assert_eq!(bench.wait_finished().await, JobStatus::Done);
                let third_name = bench.drain_one().unwrap().1;
                (first_name, second_name, third_name)
            })
            .await;

        assert_eq!(names.0, "custom0001.nrz");
        assert_eq!(names.1, "custom0002.nrz");
        assert_eq!(names.2, "custom0003.nrz");
    }

    #[tokio::test]
    async fn test_failed_reads_hold_buffers_until_pool_reset() {
        let bench = Bench::new(DriveStatus::UNIT_READY);
        bench
            .with_runner(async {
                for _ in 0..BUFFER_N {
                    let buffer = bench
                        .control
                        .start_read_data(&bench.pool, 16, true, false)
                        .unwrap();
                    assert_eq!(
                        bench.wait_finished().await,
                        JobStatus::Error(JobErrorCode::DriveNotReady)
                    );
                    assert_eq!(bench.pool.status(buffer), BufferStatus::Busy);
                }
                assert_eq!(
                    bench.control.start_read_data(&bench.pool, 16, true, false),
                    Err(LaunchError::NoBuffer)
                );

                bench.pool.lock(|pool| pool.reset_all());
                assert!(bench
                    .control
                    .start_read_data(&bench.pool, 16, true, false)
                    .is_ok());
                bench.wait_finished().await;
            })
            .await;
    }

    #[tokio::test]
    async fn test_read_data_fills_buffer() {
        let bench = Bench::spinning();
        let buffer = bench
            .with_runner(async {
                let buffer = bench
                    .control
                    .start_read_data(&bench.pool, 8, true, false)
                    .unwrap();
                assert_eq!(bench.wait_finished().await, JobStatus::Done);
                buffer
            })
            .await;

        assert_eq!(bench.capture.transfers(), vec![8]);
        bench.pool.lock(|pool| {
            assert_eq!(pool.size(buffer), 32);
            assert!(pool.data(buffer).iter().all(|&b| b == FakeCapture::PATTERN));
        });
        // aligned to the first index rising edge after it fell
        let duration = bench.control.report().duration_us.unwrap();
        assert_eq!(duration, DRIVE_REVOLUTION_US + CAPTURE_US);
    }

    #[tokio::test]
    async fn test_read_data_without_buffer() {
        let bench = Bench::spinning();
        for _ in 0..BUFFER_N {
            bench.pool.try_allocate(4).unwrap();
        }
        assert_eq!(
            bench.control.start_read_data(&bench.pool, 4, true, false),
            Err(LaunchError::NoBuffer)
        );
        assert_eq!(bench.control.poll_status(), JobStatus::Idle);
    }

    #[tokio::test]
    async fn test_read_enable_survives_into_read_data() {
        let bench = Bench::spinning();
        let tag3_during_read = bench
            .with_runner(async {
                bench
                    .control
                    .start_job(Job::ReadEnable {
                        servo_offset: 1,
                        data_strobe_delay: 0,
                    })
                    .unwrap();
                assert_eq!(bench.wait_finished().await, JobStatus::Done);
                bench
                    .control
                    .start_read_data(&bench.pool, 4, false, false)
                    .unwrap();
                while !bench.capture.is_busy() && !bench.control.poll_status().is_finished() {
                    yield_now().await;
                }
                let asserted = bench.drive.tag(Tag::Tag3);
                bench.wait_finished().await;
                asserted
            })
            .await;
        assert!(tag3_during_read);
    }

    /// Single track batch holding the read gate with both offsets set
    fn offset_batch() -> BatchRead {
        BatchRead {
            cylinder_first: 3,
            cylinder_last: 3,
            head_set: 0b1,
            words_per_track: 16,
            servo_offset: OffsetSpec::Fixed(-1),
            data_strobe_delay: OffsetSpec::Fixed(1),
        }
    }

    fn offset_read_gate() -> u16 {
        (Tag3Control::READ_GATE
            | Tag3Control::SERVO_OFFSET_NEGATIVE
            | Tag3Control::DATA_STROBE_LATE)
            .bits()
    }

    #[tokio::test]
    async fn test_new_job_preempts_and_clears_outputs() {
        let bench = Bench::spinning();
        let (first, lines_at_pickup) = bench
            .with_runner(async {
                bench
                    .control
                    .start_job(Job::ReadBatch(offset_batch()))
                    .unwrap();
                while !bench.capture.is_busy() {
                    yield_now().await;
                }
                assert!(bench.drive.tag(Tag::Tag3));
                assert_eq!(bench.drive.bus(), offset_read_gate());
                let first = bench.control.report();
                assert_eq!(first.status, JobStatus::Running);

                // the blink test never touches the drive lines itself
                bench.control.start_job(Job::BlinkTest { fail: false }).unwrap();
                while bench.led.on_count() == 0 {
                    yield_now().await;
                }
                let lines = (bench.drive.tag(Tag::Tag3), bench.drive.bus());
                assert_eq!(bench.wait_finished().await, JobStatus::Done);
                (first, lines)
            })
            .await;

        assert_eq!(lines_at_pickup, (false, 0));
        assert!(bench.drive.outputs_cleared());
        assert!(!bench.capture.is_busy());
        let report = bench.control.report();
        assert_eq!(report.status, JobStatus::Done);
        assert_eq!(report.generation, first.generation + 1);
    }

    #[tokio::test]
    async fn test_read_data_over_running_batch_starts_cleared() {
        let bench = Bench::spinning();
        let lines_during_read = bench
            .with_runner(async {
                bench
                    .control
                    .start_job(Job::ReadBatch(offset_batch()))
                    .unwrap();
                while !bench.capture.is_busy() {
                    yield_now().await;
                }
                assert_eq!(bench.drive.bus(), offset_read_gate());

                let buffer = bench
                    .control
                    .start_read_data(&bench.pool, 4, false, true)
                    .unwrap();
                while bench.capture.transfers().len() < 2 {
                    yield_now().await;
                }
                let lines = (
                    bench.drive.tag(Tag::Tag1),
                    bench.drive.tag(Tag::Tag2),
                    bench.drive.tag(Tag::Tag3),
                    bench.drive.bus(),
                );
                assert_eq!(bench.wait_finished().await, JobStatus::Done);
                assert_eq!(bench.pool.status(buffer), BufferStatus::Written);
                lines
            })
            .await;

        assert_eq!(lines_during_read, (false, false, false, 0));
    }

    #[tokio::test]
    async fn test_terminate() {
        let bench = Bench::new(ready());
        let status = bench
            .with_runner(async {
                bench
                    .control
                    .start_job(Job::SelectCylinder { cylinder: 100 })
                    .unwrap();
                while bench.clock.now_us() < 10_000 {
                    yield_now().await;
                }
                bench.control.terminate();
                let status = bench.control.poll_status();
                // the torn down job never publishes
                let now = bench.clock.now_us();
                for _ in 0..1000 {
                    yield_now().await;
                }
                assert_eq!(bench.clock.now_us(), now);
                assert_eq!(bench.control.poll_status(), status);
                status
            })
            .await;

        assert_eq!(status, JobStatus::Error(JobErrorCode::Terminated));
        assert!(bench.drive.outputs_cleared());
        assert_eq!(bench.control.report().duration_us, None);
    }

    fn sweep_batch(head_set: u32) -> BatchRead {
        BatchRead {
            cylinder_first: 3,
            cylinder_last: 4,
            head_set,
            words_per_track: 16,
            servo_offset: OffsetSpec::Fixed(-1),
            data_strobe_delay: OffsetSpec::Sweep,
        }
    }

    #[tokio::test]
    async fn test_read_batch_order() {
        let bench = Bench::spinning();
        let batch = sweep_batch(0b101);
        let names = bench
            .with_runner(async {
                bench.control.start_job(Job::ReadBatch(batch)).unwrap();
                let mut names = Vec::new();
                loop {
                    while let Some((_, name)) = bench.drain_one() {
                        names.push(name);
                    }
                    if bench.control.poll_status().is_finished() {
                        break;
                    }
                    yield_now().await;
                }
                while let Some((_, name)) = bench.drain_one() {
                    names.push(name);
                }
                names
            })
            .await;

        assert_eq!(bench.control.poll_status(), JobStatus::Done);
        let mut expected = Vec::new();
        for cylinder in [3, 4] {
            for head in [0, 2] {
                for strobe in ["-strobe-early", "", "-strobe-late"] {
                    expected.push(format!(
                        "cylinder{:04}-head{}-servo-negative{}.nrz",
                        cylinder, head, strobe
                    ));
                }
            }
        }
        assert_eq!(names, expected);
        assert_eq!(bench.capture.transfers().len(), batch.track_count());
        assert!(bench.drive.outputs_cleared());
    }

    #[tokio::test]
    async fn test_read_batch_times_out_without_drain() {
        let bench = Bench::spinning();
        let status = bench
            .with_runner(async {
                bench.control.start_job(Job::ReadBatch(sweep_batch(0b1))).unwrap();
                bench.wait_finished().await
            })
            .await;

        assert_eq!(status, JobStatus::Error(JobErrorCode::Timeout));
        // every buffer was captured and left for the host
        bench.pool.lock(|pool| {
            for index in 0..BUFFER_N {
                assert_eq!(pool.status(BufferId::new(index)), BufferStatus::Written);
            }
        });
        assert!(bench.control.report().duration_us.unwrap() > BUFFER_WAIT_TIMEOUT_US);
    }

    #[tokio::test]
    async fn test_read_batch_fault_keeps_written_buffers() {
        let bench = Bench::spinning();
        let status = bench
            .with_runner(async {
                bench.control.start_job(Job::ReadBatch(sweep_batch(0b1))).unwrap();
                // fault once the first track is in
                while bench.pool.lock(|pool| pool.find_written()).is_none() {
                    yield_now().await;
                }
                bench.drive.set_status_at(0, ready() | DriveStatus::FAULT);
                bench.wait_finished().await
            })
            .await;

        assert_eq!(status, JobStatus::Error(JobErrorCode::DriveError));
        let (index, name) = bench.drain_one().unwrap();
        assert_eq!(index, 0);
        assert_eq!(name, "cylinder0003-head0-servo-negative-strobe-early.nrz");
    }
}
