//! The two black-box collaborators named in §1: the format-conversion
//! library (`NeuroConv`-equivalent) and the validator (`NWB
//! Inspector`-equivalent). Both are out of scope to implement for real; this
//! module defines the trait seam and a deterministic stub of each for tests.

mod stub_conversion;
mod stub_inspector;

pub use stub_conversion::StubConversionBackend;
pub use stub_inspector::StubInspectorBackend;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::state::{Finding, MetadataValue};

#[derive(Debug, Error, Diagnostic, Clone)]
#[error("conversion backend error [{kind}]: {message}")]
#[diagnostic(code(orchestrator::backend::conversion_failed))]
pub struct ConversionBackendError {
    pub kind: String,
    pub message: String,
    pub cause: Option<String>,
}

/// The NeuroConv-equivalent collaborator (§1, §4.5).
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    async fn convert(
        &self,
        input_path: &Path,
        format: &str,
        metadata: &FxHashMap<String, MetadataValue>,
        output_path: &Path,
        progress: &(dyn Fn(u8, &str) + Send + Sync),
    ) -> Result<String, ConversionBackendError>;
}

#[derive(Debug, Error, Diagnostic, Clone)]
#[error("inspector backend error: {message}")]
#[diagnostic(code(orchestrator::backend::inspector_failed))]
pub struct InspectorBackendError {
    pub message: String,
}

/// The NWB Inspector-equivalent collaborator (§1, §4.6).
#[async_trait]
pub trait InspectorBackend: Send + Sync {
    async fn inspect(&self, nwb_path: &Path) -> Result<Vec<Finding>, InspectorBackendError>;
}

pub fn versioned_output_path(previous: &Path, version: u32, checksum8: &str) -> PathBuf {
    let stem = previous.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    let ext = previous.extension().and_then(|s| s.to_str()).unwrap_or("nwb");
    let dir = previous.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!("{stem}_v{version}_{checksum8}.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versioned_output_path_uses_stem_version_and_checksum() {
        let path = versioned_output_path(Path::new("/staging/out.nwb"), 2, "abcd1234");
        assert_eq!(path, PathBuf::from("/staging/out_v2_abcd1234.nwb"));
    }
}
