use std::path::Path;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::json;
use sha2::{Digest, Sha256};

use super::{ConversionBackend, ConversionBackendError};
use crate::state::MetadataValue;

const MILESTONES: [(u8, &str); 8] = [
    (0, "staging input"),
    (10, "reading source format"),
    (20, "mapping acquisition streams"),
    (30, "building NWB skeleton"),
    (50, "writing electrical series"),
    (90, "writing metadata"),
    (98, "finalizing file"),
    (100, "done"),
];

/// Writes a small deterministic JSON sidecar in place of a real NWB file —
/// its content is opaque to this crate — and returns the real `sha2::Sha256`
/// checksum of the bytes actually written.
#[derive(Default)]
pub struct StubConversionBackend;

#[async_trait]
impl ConversionBackend for StubConversionBackend {
    async fn convert(
        &self,
        input_path: &Path,
        format: &str,
        metadata: &FxHashMap<String, MetadataValue>,
        output_path: &Path,
        progress: &(dyn Fn(u8, &str) + Send + Sync),
    ) -> Result<String, ConversionBackendError> {
        for (percentage, phase) in MILESTONES {
            progress(percentage, phase);
        }

        let fields: FxHashMap<&str, &str> = metadata.iter().map(|(k, v)| (k.as_str(), v.value.as_str())).collect();
        let body = json!({
            "source": input_path.to_string_lossy(),
            "format": format,
            "metadata": fields,
        });
        let bytes = serde_json::to_vec_pretty(&body).map_err(|e| ConversionBackendError {
            kind: "serialize".into(),
            message: e.to_string(),
            cause: None,
        })?;

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| ConversionBackendError {
                kind: "io".into(),
                message: format!("failed to create {}", parent.display()),
                cause: Some(e.to_string()),
            })?;
        }
        tokio::fs::write(output_path, &bytes).await.map_err(|e| ConversionBackendError {
            kind: "io".into(),
            message: format!("failed to write {}", output_path.display()),
            cause: Some(e.to_string()),
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[tokio::test]
    async fn convert_reports_all_milestones_in_order() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out.nwb");
        let seen = Mutex::new(Vec::new());
        let backend = StubConversionBackend;
        let metadata = FxHashMap::default();
        backend
            .convert(
                Path::new("input.bin"),
                "spikeglx",
                &metadata,
                &output,
                &|pct, _phase| seen.lock().unwrap().push(pct),
            )
            .await
            .unwrap();
        assert_eq!(seen.into_inner().unwrap(), vec![0, 10, 20, 30, 50, 90, 98, 100]);
        assert!(output.exists());
    }

    #[tokio::test]
    async fn convert_returns_deterministic_checksum_for_identical_inputs() {
        let dir = tempdir().unwrap();
        let backend = StubConversionBackend;
        let metadata = FxHashMap::default();
        let a = backend
            .convert(Path::new("input.bin"), "spikeglx", &metadata, &dir.path().join("a.nwb"), &|_, _| {})
            .await
            .unwrap();
        let b = backend
            .convert(Path::new("input.bin"), "spikeglx", &metadata, &dir.path().join("b.nwb"), &|_, _| {})
            .await
            .unwrap();
        assert_eq!(a, b);
    }
}
