//! Fixed-size worker pool for import and forecast jobs.
//!
//! Callers and workers talk only through `mpsc` channels. Every job carries its
//! own reply channel, and the caller stops waiting after the configured timeout
//! while the worker finishes the job regardless.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::commands::forecast::{ForecastRequest, ForecastTrends, build_trends};
use crate::commands::import::{ImportJob, import_batch, open_connection};
use crate::config::AppConfig;
use crate::error::{Result, TrackerError};
use crate::model::ImportSummary;

/// Units of work a worker can run.
#[derive(Debug)]
pub enum JobRequest {
    Import(ImportJob),
    Forecast(ForecastRequest),
    #[cfg(test)]
    Pause(Duration),
}

impl JobRequest {
    fn label(&self) -> &'static str {
        match self {
            Self::Import(_) => "import",
            Self::Forecast(_) => "forecast",
            #[cfg(test)]
            Self::Pause(_) => "pause",
        }
    }
}

#[derive(Debug, Clone)]
pub enum JobOutcome {
    Imported(ImportSummary),
    Forecast(ForecastTrends),
}

struct Envelope {
    request: JobRequest,
    reply: Sender<Result<JobOutcome>>,
}

/// Handle to a submitted job.
pub struct PendingJob {
    label: &'static str,
    reply: Receiver<Result<JobOutcome>>,
}

impl PendingJob {
    pub fn wait(self, timeout: Duration) -> Result<JobOutcome> {
        match self.reply.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(TrackerError::JobTimeout {
                job: self.label.to_string(),
                timeout_secs: timeout.as_secs(),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(TrackerError::WorkerUnavailable(format!(
                "{} worker exited before replying",
                self.label
            ))),
        }
    }
}

pub struct WorkerPool {
    queue: Option<Sender<Envelope>>,
    // Held so queued jobs stay pending, not rejected, when no worker is running.
    _receiver: Arc<Mutex<Receiver<Envelope>>>,
    workers: Vec<JoinHandle<()>>,
    timeout: Duration,
}

impl WorkerPool {
    /// Sizes the pool from the config; zero threads means one per available core.
    pub fn start(config: AppConfig) -> Result<Self> {
        Self::with_threads(
            config.effective_worker_threads(),
            config.db_path(),
            config.job_timeout(),
        )
    }

    pub fn with_threads(threads: usize, db_path: PathBuf, timeout: Duration) -> Result<Self> {
        let (queue, receiver) = mpsc::channel::<Envelope>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let receiver = Arc::clone(&receiver);
            let db_path = db_path.clone();
            let handle = thread::Builder::new()
                .name(format!("ogliability-worker-{index}"))
                .spawn(move || worker_loop(index, &receiver, &db_path))?;
            workers.push(handle);
        }

        info!(threads, timeout_secs = timeout.as_secs(), "worker pool started");

        Ok(Self {
            queue: Some(queue),
            _receiver: receiver,
            workers,
            timeout,
        })
    }

    pub fn submit(&self, request: JobRequest) -> Result<PendingJob> {
        let label = request.label();
        let (reply, receiver) = mpsc::channel();
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| TrackerError::WorkerUnavailable("pool is shut down".to_string()))?;

        queue
            .send(Envelope { request, reply })
            .map_err(|_| TrackerError::WorkerUnavailable("job queue closed".to_string()))?;

        debug!(job = label, "job submitted");
        Ok(PendingJob {
            label,
            reply: receiver,
        })
    }

    /// Submits a job and blocks until it replies or the pool timeout elapses.
    pub fn execute(&self, request: JobRequest) -> Result<JobOutcome> {
        self.submit(request)?.wait(self.timeout)
    }
}

/// How long dropping the pool waits for idle workers to notice the closed queue.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);
const SHUTDOWN_POLL: Duration = Duration::from_millis(5);

impl Drop for WorkerPool {
    /// Closes the queue and joins the workers that exit within the grace period.
    /// A worker still running a job the caller gave up on is detached.
    fn drop(&mut self) {
        drop(self.queue.take());

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        for handle in self.workers.drain(..) {
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(SHUTDOWN_POLL);
            }

            if !handle.is_finished() {
                let name = handle.thread().name().unwrap_or("worker").to_string();
                warn!(worker = %name, "worker still busy at shutdown; detaching");
                continue;
            }
            if handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }
    }
}

fn worker_loop(index: usize, receiver: &Mutex<Receiver<Envelope>>, db_path: &Path) {
    loop {
        let envelope = {
            let Ok(guard) = receiver.lock() else {
                warn!(worker = index, "job queue lock poisoned");
                break;
            };
            match guard.recv() {
                Ok(envelope) => envelope,
                Err(_) => break,
            }
        };

        let label = envelope.request.label();
        debug!(worker = index, job = label, "job started");

        let outcome = handle_request(envelope.request, db_path);
        if let Err(err) = &outcome {
            warn!(worker = index, job = label, error = %err, "job failed");
        }

        if envelope.reply.send(outcome).is_err() {
            warn!(worker = index, job = label, "caller stopped waiting; result dropped");
        }
    }

    debug!(worker = index, "worker exiting");
}

fn handle_request(request: JobRequest, db_path: &Path) -> Result<JobOutcome> {
    match request {
        JobRequest::Import(job) => {
            let mut connection = open_connection(db_path)?;
            import_batch(&mut connection, &job).map(JobOutcome::Imported)
        }
        JobRequest::Forecast(request) => build_trends(&request).map(JobOutcome::Forecast),
        #[cfg(test)]
        JobRequest::Pause(duration) => {
            thread::sleep(duration);
            Ok(JobOutcome::Imported(ImportSummary::default()))
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::commands::import::ReportSource;
    use crate::model::{ForecastPoint, NetbackPoint, Scope, SourceType};

    fn date(year: i32, month: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, 1).expect("valid date")
    }

    fn request() -> ForecastRequest {
        ForecastRequest {
            history: vec![
                ForecastPoint::new(date(2017, 1), 100.0, 50.0, SourceType::Historical),
                ForecastPoint::new(date(2017, 2), 90.0, 50.0, SourceType::Historical),
            ],
            netbacks: vec![NetbackPoint {
                effective_date: date(2016, 1),
                netback: 10.0,
                shrinkage_factor: 1.0,
                oil_equivalent_conversion: 6.0,
            }],
            horizon_months: 3,
            adjustments: Default::default(),
        }
    }

    #[test]
    fn forecast_jobs_run_on_worker_threads() {
        let pool = WorkerPool::with_threads(2, PathBuf::from(":memory:"), Duration::from_secs(30))
            .expect("pool");

        let pending = (0..4)
            .map(|_| pool.submit(JobRequest::Forecast(request())).expect("submit"))
            .collect::<Vec<_>>();

        for job in pending {
            match job.wait(Duration::from_secs(30)).expect("forecast") {
                JobOutcome::Forecast(trends) => assert_eq!(trends.base_forecast.len(), 3),
                JobOutcome::Imported(_) => panic!("unexpected import outcome"),
            }
        }
    }

    #[test]
    fn failures_come_back_as_structured_errors() {
        let pool = WorkerPool::with_threads(1, PathBuf::from(":memory:"), Duration::from_secs(30))
            .expect("pool");
        let mut short = request();
        short.history.truncate(1);

        let err = pool
            .execute(JobRequest::Forecast(short))
            .expect_err("one point is not enough");
        assert!(matches!(err, TrackerError::InsufficientHistory { points: 1 }));
    }

    #[test]
    fn import_jobs_open_their_own_connection() {
        let pool = WorkerPool::with_threads(1, PathBuf::from(":memory:"), Duration::from_secs(30))
            .expect("pool");
        let job = ImportJob {
            scope: Scope::new("AB", None),
            reports: vec![ReportSource {
                name: "jan.txt".to_string(),
                text: "Rating Data; X; 31 Jan 2017; 1\n\nW 1 ; Active; a; $1.00; $2.00; P; A\n"
                    .to_string(),
            }],
            append_mode: false,
        };

        match pool.execute(JobRequest::Import(job)).expect("import") {
            JobOutcome::Imported(summary) => {
                assert_eq!(summary.records_imported, 1);
                assert_eq!(summary.report_months, vec![date(2017, 1)]);
            }
            JobOutcome::Forecast(_) => panic!("unexpected forecast outcome"),
        }
    }

    #[test]
    fn timed_out_caller_is_not_held_by_shutdown() {
        let started = Instant::now();
        {
            let pool =
                WorkerPool::with_threads(1, PathBuf::from(":memory:"), Duration::from_millis(10))
                    .expect("pool");
            let err = pool
                .execute(JobRequest::Pause(Duration::from_secs(3)))
                .expect_err("job outlives the timeout");
            assert!(matches!(err, TrackerError::JobTimeout { .. }));
        }

        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn unanswered_job_times_out_for_the_caller() {
        let pool = WorkerPool::with_threads(0, PathBuf::from(":memory:"), Duration::from_millis(20))
            .expect("pool");

        let err = pool
            .execute(JobRequest::Forecast(request()))
            .expect_err("no worker can answer");
        assert!(matches!(
            err,
            TrackerError::JobTimeout { ref job, .. } if job == "forecast"
        ));
    }
}
