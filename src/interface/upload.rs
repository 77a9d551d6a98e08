//! `POST /upload` (§6): multipart file staging and composition validation.

use std::collections::HashMap;
use std::path::PathBuf;

use axum::extract::{Multipart, State};
use axum::Json;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;

use super::{AppState, InterfaceError};

#[derive(Serialize)]
pub struct UploadResponse {
    pub input_path: String,
    pub staged_files: Vec<String>,
}

struct StagedFile {
    filename: String,
    bytes: Vec<u8>,
}

pub async fn upload(State(app): State<AppState>, mut multipart: Multipart) -> Result<Json<UploadResponse>, InterfaceError> {
    let status = app.state.read(|s| s.status);
    if status.is_busy() {
        return Err(InterfaceError::Busy);
    }

    let mut files = Vec::new();
    let mut metadata_hint: Option<FxHashMap<String, String>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| InterfaceError::InvalidInput(e.to_string()))? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "metadata_hint" {
            let text = field.text().await.map_err(|e| InterfaceError::InvalidInput(e.to_string()))?;
            let value: HashMap<String, String> =
                serde_json::from_str::<Value>(&text).ok().and_then(|v| serde_json::from_value(v).ok()).unwrap_or_default();
            metadata_hint = Some(value.into_iter().collect());
            continue;
        }
        let filename = field.file_name().unwrap_or(&name).to_string();
        let bytes = field.bytes().await.map_err(|e| InterfaceError::InvalidInput(e.to_string()))?;
        files.push(StagedFile {
            filename,
            bytes: bytes.to_vec(),
        });
    }

    if files.is_empty() {
        return Err(InterfaceError::InvalidInput("no file provided".into()));
    }

    validate_composition(&files, &app.config)?;

    let session_id = app.state.read(|s| s.session_id);
    let input_dir = app.config.staging_root.join(session_id.to_string()).join("input");
    tokio::fs::create_dir_all(&input_dir)
        .await
        .map_err(|e| InterfaceError::Internal(format!("failed to create staging directory: {e}")))?;

    let mut staged_paths = Vec::new();
    for file in &files {
        let path = input_dir.join(&file.filename);
        tokio::fs::write(&path, &file.bytes)
            .await
            .map_err(|e| InterfaceError::Internal(format!("failed to stage {}: {e}", file.filename)))?;
        staged_paths.push(path);
    }

    let primary_path = primary_file_path(&files, &staged_paths);

    app.state.begin_upload(primary_path.clone(), metadata_hint)?;

    Ok(Json(UploadResponse {
        input_path: primary_path.display().to_string(),
        staged_files: staged_paths.iter().map(|p| p.display().to_string()).collect(),
    }))
}

fn validate_composition(files: &[StagedFile], config: &crate::config::OrchestratorConfig) -> Result<(), InterfaceError> {
    if files.len() > config.max_upload_files {
        return Err(InterfaceError::InvalidInput(format!(
            "too many files: {} exceeds the limit of {}",
            files.len(),
            config.max_upload_files
        )));
    }

    let total_bytes: u64 = files.iter().map(|f| f.bytes.len() as u64).sum();
    if total_bytes > config.max_upload_bytes {
        return Err(InterfaceError::InvalidInput(format!(
            "upload of {total_bytes} bytes exceeds the limit of {}",
            config.max_upload_bytes
        )));
    }

    for file in files {
        if file.bytes.is_empty() {
            return Err(InterfaceError::InvalidInput(format!("{} is empty", file.filename)));
        }
        let ext = extension_of(&file.filename);
        if !config.allowed_extensions.iter().any(|allowed| allowed == ext) {
            return Err(InterfaceError::InvalidInput(format!("{} has a disallowed extension", file.filename)));
        }
    }

    let primary_files: Vec<&StagedFile> = files
        .iter()
        .filter(|f| crate::config::OrchestratorConfig::is_primary_data_extension(extension_of(&f.filename)))
        .collect();

    if primary_files.len() > 1 && !is_recognized_companion_set(&primary_files) {
        return Err(InterfaceError::InvalidInput(
            "more than one primary data file without a recognized companion pattern".into(),
        ));
    }

    Ok(())
}

fn extension_of(filename: &str) -> &str {
    std::path::Path::new(filename).extension().and_then(|e| e.to_str()).unwrap_or_default()
}

/// SpikeGLX pairs `*.ap.bin` with `*.lf.bin`; Open Ephys ships any number of
/// `.continuous` streams (§6).
fn is_recognized_companion_set(primary_files: &[&StagedFile]) -> bool {
    if primary_files.iter().all(|f| f.filename.ends_with(".continuous")) {
        return true;
    }
    let has_ap = primary_files.iter().any(|f| f.filename.ends_with(".ap.bin"));
    let has_lf = primary_files.iter().any(|f| f.filename.ends_with(".lf.bin"));
    has_ap && has_lf && primary_files.len() == 2
}

fn primary_file_path(files: &[StagedFile], staged_paths: &[PathBuf]) -> PathBuf {
    for (file, path) in files.iter().zip(staged_paths) {
        if crate::config::OrchestratorConfig::is_primary_data_extension(extension_of(&file.filename)) {
            if file.filename.ends_with(".ap.bin") {
                return path.clone();
            }
        }
    }
    for (file, path) in files.iter().zip(staged_paths) {
        if crate::config::OrchestratorConfig::is_primary_data_extension(extension_of(&file.filename)) {
            return path.clone();
        }
    }
    staged_paths[0].clone()
}
