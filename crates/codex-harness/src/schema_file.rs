use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempDir;
use tracing::debug;

use crate::errors::CodexError;

/// Temporary `schema.json` passed to the CLI via `--output-schema`.
///
/// The backing directory is removed when the value is dropped, so keeping it
/// alive for the duration of a turn covers every exit path.
#[derive(Debug)]
pub(crate) struct OutputSchemaFile {
    _dir: TempDir,
    path: PathBuf,
}

impl OutputSchemaFile {
    pub(crate) fn create(schema: &Value) -> Result<Self, CodexError> {
        if !schema.is_object() {
            return Err(CodexError::OutputSchema(
                "output_schema must be a plain JSON object".into(),
            ));
        }

        let dir = tempfile::Builder::new()
            .prefix("codex-output-schema-")
            .tempdir()
            .map_err(|err| CodexError::OutputSchema(format!("create temp dir: {err}")))?;
        let path = dir.path().join("schema.json");
        let body = serde_json::to_vec(schema)
            .map_err(|err| CodexError::OutputSchema(format!("serialize schema: {err}")))?;
        std::fs::write(&path, body)
            .map_err(|err| CodexError::OutputSchema(format!("write {}: {err}", path.display())))?;

        debug!(path = %path.display(), "wrote output schema file");
        Ok(Self { _dir: dir, path })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}
