//! Evaluation Agent (§4.6): validation via the external inspector,
//! classification of findings, and report production. Never talks to the
//! user.

use std::path::Path;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::backends::InspectorBackend;
use crate::state::{Finding, MetadataSource, MetadataValue, Severity, ValidationOutcome};

pub struct EvaluationAgent {
    backend: Arc<dyn InspectorBackend>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationResult {
    pub outcome: ValidationOutcome,
    pub findings: Vec<Finding>,
}

/// One system-synthesizable correction, applied without asking the user.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AutoFix {
    pub field: String,
    pub value: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CorrectionAnalysis {
    pub auto_fixable: Vec<AutoFix>,
    pub user_input_required: Vec<String>,
    /// DANDI-blocking (critical/error) issues sorted first.
    pub prioritized_issues: Vec<Finding>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Reports {
    pub json: serde_json::Value,
    pub markdown: String,
}

/// Fields that require a value only a user can supply — there is no
/// reasonable system default.
const USER_REQUIRED_FIELDS: &[&str] = &["subject_id", "experimenter"];

impl EvaluationAgent {
    pub fn new(backend: Arc<dyn InspectorBackend>) -> Self {
        Self { backend }
    }

    #[instrument(skip(self))]
    pub async fn run_validation(&self, nwb_path: &Path) -> ValidationResult {
        let findings = match self.backend.inspect(nwb_path).await {
            Ok(findings) => findings,
            Err(e) => {
                tracing::warn!(agent = "evaluation", action = "run_validation", reason = %e, "inspector failed, synthesizing critical finding");
                vec![Finding {
                    severity: Severity::Critical,
                    message: format!("inspector failure: {e}"),
                    location: nwb_path.display().to_string(),
                    check_name: "inspector_availability".into(),
                }]
            }
        };

        let outcome = classify(&findings);
        ValidationResult { outcome, findings }
    }

    #[instrument(skip(self, metadata))]
    pub fn analyze_corrections(
        &self,
        issues: &[Finding],
        metadata: &FxHashMap<String, MetadataValue>,
    ) -> CorrectionAnalysis {
        let mut auto_fixable = Vec::new();
        let mut user_input_required = Vec::new();

        for issue in issues {
            if let Some(field) = missing_field_from_check(issue) {
                if USER_REQUIRED_FIELDS.contains(&field.as_str()) {
                    if !user_input_required.contains(&field) {
                        user_input_required.push(field);
                    }
                    continue;
                }
                if field == "species" && !metadata.contains_key("species") {
                    if species_evidence_suggests_mouse(metadata) {
                        auto_fixable.push(AutoFix {
                            field: "species".into(),
                            value: "Mus musculus".into(),
                        });
                        continue;
                    }
                }
                if !metadata.contains_key(&field) && !user_input_required.contains(&field) {
                    user_input_required.push(field);
                }
            }
        }

        let mut prioritized_issues = issues.to_vec();
        prioritized_issues.sort_by_key(|f| match f.severity {
            Severity::Critical => 0,
            Severity::Error => 1,
            Severity::Warning => 2,
            Severity::BestPractice => 3,
        });

        CorrectionAnalysis {
            auto_fixable,
            user_input_required,
            prioritized_issues,
        }
    }

    #[instrument(skip(self, validation_result))]
    pub fn generate_reports(&self, validation_result: &ValidationResult, nwb_path: &Path) -> Reports {
        let json = serde_json::json!({
            "nwb_path": nwb_path.display().to_string(),
            "outcome": validation_result.outcome,
            "findings": validation_result.findings,
        });

        let mut markdown = format!(
            "# Validation report\n\n- File: `{}`\n- Outcome: **{:?}**\n\n",
            nwb_path.display(),
            validation_result.outcome
        );
        if validation_result.findings.is_empty() {
            markdown.push_str("No findings.\n");
        } else {
            markdown.push_str("## Findings\n\n");
            for finding in &validation_result.findings {
                markdown.push_str(&format!(
                    "- **{:?}** `{}` at `{}`: {}\n",
                    finding.severity, finding.check_name, finding.location, finding.message
                ));
            }
        }

        Reports { json, markdown }
    }
}

fn classify(findings: &[Finding]) -> ValidationOutcome {
    if findings.is_empty() {
        ValidationOutcome::Passed
    } else if findings.iter().any(|f| matches!(f.severity, Severity::Critical | Severity::Error)) {
        ValidationOutcome::Failed
    } else {
        ValidationOutcome::PassedWithIssues
    }
}

/// Heuristic: a check name or message of the form "missing ... <field>"
/// identifies which metadata field would resolve the finding. This mirrors
/// how a real inspector's check names map onto NWB/DANDI schema fields.
fn missing_field_from_check(finding: &Finding) -> Option<String> {
    let haystack = format!("{} {}", finding.check_name, finding.message).to_lowercase();
    for field in ["subject_id", "experimenter", "species", "sex", "age", "institution"] {
        if haystack.contains(field) {
            return Some(field.to_string());
        }
    }
    None
}

fn species_evidence_suggests_mouse(metadata: &FxHashMap<String, MetadataValue>) -> bool {
    metadata
        .values()
        .any(|v| v.value.to_lowercase().contains("mouse") || v.value.to_lowercase().contains("mus musculus"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::StubInspectorBackend;

    fn finding(severity: Severity, check_name: &str, message: &str) -> Finding {
        Finding {
            severity,
            message: message.into(),
            location: "/general/subject".into(),
            check_name: check_name.into(),
        }
    }

    #[tokio::test]
    async fn no_findings_is_passed() {
        let agent = EvaluationAgent::new(Arc::new(StubInspectorBackend::new()));
        let result = agent.run_validation(Path::new("out.nwb")).await;
        assert_eq!(result.outcome, ValidationOutcome::Passed);
    }

    #[tokio::test]
    async fn critical_finding_is_failed() {
        let backend = StubInspectorBackend::new()
            .with_findings(vec![finding(Severity::Critical, "check_subject", "missing subject_id")]);
        let agent = EvaluationAgent::new(Arc::new(backend));
        let result = agent.run_validation(Path::new("out.nwb")).await;
        assert_eq!(result.outcome, ValidationOutcome::Failed);
    }

    #[tokio::test]
    async fn only_warnings_is_passed_with_issues() {
        let backend = StubInspectorBackend::new()
            .with_findings(vec![finding(Severity::BestPractice, "check_lab", "lab not specified")]);
        let agent = EvaluationAgent::new(Arc::new(backend));
        let result = agent.run_validation(Path::new("out.nwb")).await;
        assert_eq!(result.outcome, ValidationOutcome::PassedWithIssues);
    }

    #[tokio::test]
    async fn inspector_failure_synthesizes_critical_finding() {
        let agent = EvaluationAgent::new(Arc::new(FailingInspector));
        let result = agent.run_validation(Path::new("out.nwb")).await;
        assert_eq!(result.outcome, ValidationOutcome::Failed);
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].severity, Severity::Critical);
    }

    #[test]
    fn analyze_corrections_routes_subject_id_to_user_and_species_to_auto_fix() {
        let agent = EvaluationAgent::new(Arc::new(StubInspectorBackend::new()));
        let issues = vec![
            finding(Severity::Error, "check_subject_id", "missing subject_id"),
            finding(Severity::Warning, "check_species", "missing species"),
        ];
        let mut metadata = FxHashMap::default();
        metadata.insert(
            "subject_id".into(),
            MetadataValue {
                value: "mouse001".into(),
                confidence: 100,
                source: MetadataSource::AutoExtracted,
            },
        );
        let analysis = agent.analyze_corrections(&issues, &metadata);
        assert!(analysis.user_input_required.contains(&"subject_id".to_string()));
        assert_eq!(
            analysis.auto_fixable,
            vec![AutoFix {
                field: "species".into(),
                value: "Mus musculus".into(),
            }]
        );
    }

    #[test]
    fn prioritized_issues_sort_critical_first() {
        let agent = EvaluationAgent::new(Arc::new(StubInspectorBackend::new()));
        let issues = vec![
            finding(Severity::BestPractice, "check_lab", "lab missing"),
            finding(Severity::Critical, "check_subject", "subject missing"),
        ];
        let analysis = agent.analyze_corrections(&issues, &FxHashMap::default());
        assert_eq!(analysis.prioritized_issues[0].severity, Severity::Critical);
    }

    struct FailingInspector;

    #[async_trait::async_trait]
    impl InspectorBackend for FailingInspector {
        async fn inspect(&self, _nwb_path: &Path) -> Result<Vec<Finding>, crate::backends::InspectorBackendError> {
            Err(crate::backends::InspectorBackendError {
                message: "subprocess timed out".into(),
            })
        }
    }
}
