//! Conversion Agent (§4.5): format detection and NWB production. Never talks
//! to the user — every public method here is invoked over the bus by the
//! Conversation Agent and returns data, never a question.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::backends::{versioned_output_path, ConversionBackend, ConversionBackendError};
use crate::llm::{LlmError, LlmGateway};
use crate::state::{FormatDetection, MetadataValue};

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
struct FormatDetectionLlmResult {
    format: String,
    confidence: u8,
    evidence: String,
}

/// Minimum confidence (§4.5) for the LLM-based detection path to be trusted
/// over pattern matching.
const LLM_ACCEPT_THRESHOLD: u8 = 70;

pub struct ConversionAgent {
    llm: Arc<dyn LlmGateway>,
    backend: Arc<dyn ConversionBackend>,
}

impl ConversionAgent {
    pub fn new(llm: Arc<dyn LlmGateway>, backend: Arc<dyn ConversionBackend>) -> Self {
        Self { llm, backend }
    }

    #[instrument(skip(self))]
    pub async fn detect_format(&self, input_path: &Path) -> FormatDetection {
        if let Some(result) = self.detect_via_llm(input_path).await {
            if result.confidence >= LLM_ACCEPT_THRESHOLD {
                return FormatDetection::Identified {
                    format: result.format,
                    confidence: result.confidence,
                    evidence: result.evidence,
                };
            }
        }
        detect_via_patterns(input_path)
    }

    async fn detect_via_llm(&self, input_path: &Path) -> Option<FormatDetectionLlmResult> {
        let schema = serde_json::to_value(schemars::schema_for!(FormatDetectionLlmResult)).ok()?;
        let system = "You identify the acquisition-system format of a neurophysiology \
                      recording from its file name and companion files. Respond with \
                      format, confidence (0-100), and the evidence you used.";
        let user = format!("file: {}", input_path.display());
        match self.llm.complete_structured(system, &user, &schema, 0.0).await {
            Ok(value) => serde_json::from_value(value).ok(),
            Err(LlmError::Unavailable | LlmError::InvalidOutput { .. }) => {
                tracing::warn!(agent = "conversion", action = "detect_format", "LLM detection unavailable, falling back to pattern matching");
                None
            }
        }
    }

    #[instrument(skip(self, metadata, progress))]
    pub async fn run_conversion(
        &self,
        input_path: &Path,
        format: &str,
        metadata: &FxHashMap<String, MetadataValue>,
        output_path: &Path,
        progress: &(dyn Fn(u8, &str) + Send + Sync),
    ) -> Result<(PathBuf, String), ConversionBackendError> {
        let checksum = self
            .backend
            .convert(input_path, format, metadata, output_path, progress)
            .await?;
        Ok((output_path.to_path_buf(), checksum))
    }

    #[instrument(skip(self, metadata, progress))]
    pub async fn apply_corrections(
        &self,
        input_path: &Path,
        format: &str,
        metadata: &FxHashMap<String, MetadataValue>,
        previous_output_path: &Path,
        attempt: u32,
        progress: &(dyn Fn(u8, &str) + Send + Sync),
    ) -> Result<(PathBuf, String), ConversionBackendError> {
        let previous_bytes = tokio::fs::read(previous_output_path).await.map_err(|e| ConversionBackendError {
            kind: "io".into(),
            message: format!("failed to read previous output {}", previous_output_path.display()),
            cause: Some(e.to_string()),
        })?;
        let mut hasher = Sha256::new();
        hasher.update(&previous_bytes);
        let checksum_prefix = format!("{:x}", hasher.finalize())[..8].to_string();

        let archived_path = versioned_output_path(previous_output_path, attempt, &checksum_prefix);
        tokio::fs::rename(previous_output_path, &archived_path).await.map_err(|e| ConversionBackendError {
            kind: "io".into(),
            message: format!("failed to archive previous output as {}", archived_path.display()),
            cause: Some(e.to_string()),
        })?;

        self.run_conversion(input_path, format, metadata, previous_output_path, progress).await
    }
}

/// Ordered pattern match over filename suffixes and companion files (§4.5).
fn detect_via_patterns(input_path: &Path) -> FormatDetection {
    let name = input_path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let dir = input_path.parent().unwrap_or_else(|| Path::new("."));

    if name.ends_with(".ap.bin") || name.ends_with(".lf.bin") {
        let meta = dir.join(name.replace(".bin", ".meta"));
        if meta.exists() {
            return FormatDetection::Identified {
                format: "SpikeGLX".into(),
                confidence: 90,
                evidence: format!("{name} with sibling .meta file"),
            };
        }
        return FormatDetection::Ambiguous {
            candidates: vec!["SpikeGLX".into(), "Neuropixels".into()],
        };
    }

    if name == "structure.oebin" || name == "settings.xml" {
        return FormatDetection::Identified {
            format: "OpenEphys".into(),
            confidence: 90,
            evidence: format!("{name} present"),
        };
    }

    if name.ends_with(".nidq.bin") {
        return FormatDetection::Identified {
            format: "Neuropixels".into(),
            confidence: 85,
            evidence: format!("{name} nidq stream"),
        };
    }

    if dir.file_name().and_then(|n| n.to_str()).is_some_and(|d| d.starts_with("imec")) {
        return FormatDetection::Identified {
            format: "Neuropixels".into(),
            confidence: 80,
            evidence: "located in an imec* probe directory".into(),
        };
    }

    FormatDetection::Ambiguous {
        candidates: vec!["SpikeGLX".into(), "OpenEphys".into(), "Neuropixels".into()],
    }
}
