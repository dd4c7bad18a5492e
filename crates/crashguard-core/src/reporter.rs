//! Optional crash reporting capability
//!
//! The supervisor never knows the transport. Anything implementing
//! [`Reporter`] can be attached; reports are dispatched on a worker thread
//! and never awaited before termination unless a bounded grace period is
//! configured.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use futures::future::BoxFuture;
use thiserror::Error;

/// Reporting failures; logged, never escalated
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Report rejected: {0}")]
    Rejected(String),

    #[error("Report timed out")]
    Timeout,

    #[error("Reporter unavailable: {0}")]
    Unavailable(String),
}

/// A sink for crash reports
pub trait Reporter: Send + Sync {
    /// Submit one report
    fn submit(
        &self,
        subject: &str,
        body: &str,
        attachment: Option<&Path>,
    ) -> BoxFuture<'static, Result<(), ReportError>>;
}

/// One crash report
#[derive(Debug, Clone)]
pub struct CrashReport {
    pub subject: String,
    /// Raw, untruncated fault text
    pub body: String,
    pub attachment: Option<PathBuf>,
}

impl CrashReport {
    pub fn new(app_name: &str, body: String, attachment: Option<PathBuf>) -> Self {
        Self {
            subject: report_subject(app_name, Local::now()),
            body,
            attachment,
        }
    }
}

/// Subject line for a crash report
pub fn report_subject(app_name: &str, at: DateTime<Local>) -> String {
    format!("Program crashed: {} {}", app_name, at.format("%Y-%m-%d %H:%M:%S"))
}

/// Pending outcome of a dispatched report
pub struct ReportTicket {
    rx: mpsc::Receiver<Result<(), ReportError>>,
}

impl ReportTicket {
    /// Wait at most `grace` for the outcome
    pub fn wait(self, grace: Duration) -> Result<(), ReportError> {
        self.rx.recv_timeout(grace).unwrap_or(Err(ReportError::Timeout))
    }
}

/// Submit `report` on a detached worker thread
///
/// Returns `None` if the worker could not be started.
pub fn dispatch(reporter: Arc<dyn Reporter>, report: CrashReport) -> Option<ReportTicket> {
    let (tx, rx) = mpsc::channel();
    let spawned = std::thread::Builder::new()
        .name("crashguard-report".into())
        .spawn(move || {
            let future = reporter.submit(&report.subject, &report.body, report.attachment.as_deref());
            let outcome = futures::executor::block_on(future);
            match outcome {
                Ok(()) => log::info!("Crash report submitted: {}", report.subject),
                Err(ref e) => log::warn!("Crash report not delivered: {}", e),
            }
            let _ = tx.send(outcome);
        });

    match spawned {
        Ok(_) => Some(ReportTicket { rx }),
        Err(e) => {
            log::warn!("Failed to start crash report worker: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Capture {
        seen: Mutex<Vec<(String, String, Option<PathBuf>)>>,
    }

    impl Reporter for Capture {
        fn submit(
            &self,
            subject: &str,
            body: &str,
            attachment: Option<&Path>,
        ) -> BoxFuture<'static, Result<(), ReportError>> {
            self.seen
                .lock()
                .push((subject.to_string(), body.to_string(), attachment.map(Path::to_path_buf)));
            Box::pin(async { Ok(()) })
        }
    }

    struct Failing;

    impl Reporter for Failing {
        fn submit(&self, _: &str, _: &str, _: Option<&Path>) -> BoxFuture<'static, Result<(), ReportError>> {
            Box::pin(async { Err(ReportError::Rejected("smtp said no".into())) })
        }
    }

    struct Stalled;

    impl Reporter for Stalled {
        fn submit(&self, _: &str, _: &str, _: Option<&Path>) -> BoxFuture<'static, Result<(), ReportError>> {
            Box::pin(futures::future::pending())
        }
    }

    #[test]
    fn test_subject_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(report_subject("my-app", at), "Program crashed: my-app 2024-03-09 14:05:07");
    }

    #[test]
    fn test_dispatch_delivers() {
        let capture = Arc::new(Capture::default());
        let report = CrashReport::new("my-app", "panic: boom".into(), Some(PathBuf::from("/tmp/crash.json")));
        let ticket = dispatch(capture.clone(), report).unwrap();
        assert!(ticket.wait(Duration::from_secs(5)).is_ok());

        let seen = capture.seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0.starts_with("Program crashed: my-app "));
        assert_eq!(seen[0].1, "panic: boom");
        assert_eq!(seen[0].2.as_deref(), Some(Path::new("/tmp/crash.json")));
    }

    #[test]
    fn test_dispatch_failure_is_reported_not_raised() {
        let ticket = dispatch(Arc::new(Failing), CrashReport::new("a", "b".into(), None)).unwrap();
        assert!(matches!(ticket.wait(Duration::from_secs(5)), Err(ReportError::Rejected(_))));
    }

    #[test]
    fn test_grace_is_bounded() {
        let ticket = dispatch(Arc::new(Stalled), CrashReport::new("a", "b".into(), None)).unwrap();
        let started = std::time::Instant::now();
        assert!(matches!(ticket.wait(Duration::from_millis(50)), Err(ReportError::Timeout)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
