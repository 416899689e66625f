use std::path::PathBuf;

use crate::errors::CodexError;

/// Resolves the `codex` executable, preferring an explicit override.
///
/// An override is taken as given; the spawn reports it if it does not exist.
pub fn find_codex_path(override_path: Option<&PathBuf>) -> Result<PathBuf, CodexError> {
    if let Some(path) = override_path {
        return Ok(path.clone());
    }
    which::which("codex").map_err(|err| CodexError::ExecutableNotFound {
        message: format!(
            "could not locate \"codex\" on PATH ({err}); install the Codex CLI or set codex_path_override"
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_short_circuits_path_lookup() {
        let path = PathBuf::from("/opt/custom/codex");
        assert_eq!(find_codex_path(Some(&path)).expect("override"), path);
    }
}
