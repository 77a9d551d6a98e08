use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{InspectorBackend, InspectorBackendError};
use crate::state::Finding;

/// Returns a scripted findings list on each call, defaulting to "no
/// findings" (a `PASSED` validation outcome) when nothing has been scripted.
/// Scripted findings are consumed in FIFO order, one list per call, so a
/// test can script a sequence of distinct validation runs (e.g. scenario 4's
/// repeated `FAILED` result).
#[derive(Default)]
pub struct StubInspectorBackend {
    queued: Mutex<Vec<Vec<Finding>>>,
}

impl StubInspectorBackend {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_findings(self, findings: Vec<Finding>) -> Self {
        self.queued.lock().push(findings);
        self
    }
}

#[async_trait]
impl InspectorBackend for StubInspectorBackend {
    async fn inspect(&self, _nwb_path: &Path) -> Result<Vec<Finding>, InspectorBackendError> {
        let mut queued = self.queued.lock();
        if queued.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(queued.remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Severity;

    fn finding() -> Finding {
        Finding {
            severity: Severity::Critical,
            message: "missing required field".into(),
            location: "/general/subject".into(),
            check_name: "check_subject".into(),
        }
    }

    #[tokio::test]
    async fn defaults_to_no_findings() {
        let backend = StubInspectorBackend::new();
        let findings = backend.inspect(Path::new("out.nwb")).await.unwrap();
        assert!(findings.is_empty());
    }

    #[tokio::test]
    async fn scripted_findings_are_consumed_in_order() {
        let backend = StubInspectorBackend::new().with_findings(vec![finding()]).with_findings(vec![]);
        let first = backend.inspect(Path::new("out.nwb")).await.unwrap();
        let second = backend.inspect(Path::new("out.nwb")).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }
}
