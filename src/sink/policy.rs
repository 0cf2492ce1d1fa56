use tracing::{error, warn};

use super::{BatchReport, SinkError};

/// Decides what a batch with rejected documents means for the run.
pub trait FailurePolicy: Send + Sync {
    fn after_commit(&self, report: &BatchReport) -> Result<(), SinkError>;
}

/// Any rejected document ends the run.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailFast;

impl FailurePolicy for FailFast {
    fn after_commit(&self, report: &BatchReport) -> Result<(), SinkError> {
        let Some(first) = report.failures.first() else {
            return Ok(());
        };
        error!(
            batch = report.batch,
            worker = report.worker,
            failed = report.failures.len(),
            total = report.total,
            first = %first,
            "Bulk Insert Error"
        );
        Err(SinkError::BatchFailed {
            batch: report.batch,
            failed: report.failures.len(),
            total: report.total,
            first: first.clone(),
        })
    }
}

/// Rejected documents are logged and counted; ingestion carries on.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAndContinue;

impl FailurePolicy for LogAndContinue {
    fn after_commit(&self, report: &BatchReport) -> Result<(), SinkError> {
        for failure in &report.failures {
            warn!(
                batch = report.batch,
                id = %failure.id,
                status = failure.status,
                reason = %failure.reason,
                "Bulk item rejected"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ItemFailure;

    fn report(failures: Vec<ItemFailure>) -> BatchReport {
        BatchReport {
            batch: 3,
            worker: 1,
            total: 10,
            failures,
        }
    }

    fn conflict(id: &str) -> ItemFailure {
        ItemFailure {
            id: id.into(),
            status: 409,
            reason: "version_conflict_engine_exception".into(),
        }
    }

    #[test]
    fn fail_fast_rejects_a_single_conflict() {
        assert!(FailFast.after_commit(&report(vec![])).is_ok());

        let err = FailFast
            .after_commit(&report(vec![conflict("17"), conflict("18")]))
            .unwrap_err();
        match err {
            SinkError::BatchFailed {
                batch,
                failed,
                total,
                first,
            } => {
                assert_eq!((batch, failed, total), (3, 2, 10));
                assert_eq!(first.id, "17");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn log_and_continue_never_fails() {
        assert!(LogAndContinue
            .after_commit(&report(vec![conflict("17")]))
            .is_ok());
    }
}
