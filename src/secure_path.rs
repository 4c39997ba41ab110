/**
 * Secure path validation
 *
 * DESIGN DECISION: one validator, used by every component that touches a
 * filesystem path supplied from outside the process (artifact parser, curation
 * Phase 1's project-path check)
 * WHY: symlink traversal and `..`-escaped paths must be rejected the same way
 * everywhere, not re-implemented per call site
 *
 * Canonicalization resolves symlinks; a path whose canonical form does not sit
 * under the canonical allowed root is refused rather than silently clamped.
 */

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Resolves `candidate` against `allowed_root`, returning the canonical path if
/// it is contained within the root, or an `invalid_input` error otherwise.
pub fn validate_path(candidate: &Path, allowed_root: &Path) -> Result<PathBuf> {
    let canonical_root = allowed_root
        .canonicalize()
        .map_err(|e| Error::InvalidInput(format!("allowed root does not exist: {e}")))?;

    let canonical_candidate = candidate
        .canonicalize()
        .map_err(|e| Error::InvalidInput(format!("path does not exist: {e}")))?;

    if canonical_candidate.starts_with(&canonical_root) {
        Ok(canonical_candidate)
    } else {
        Err(Error::InvalidInput(format!(
            "path {} escapes allowed root {}",
            candidate.display(),
            allowed_root.display()
        )))
    }
}

/// Like `validate_path`, but the final path component need not exist yet (used
/// for output files about to be written). Only the parent directory must
/// exist and be contained.
pub fn validate_output_path(candidate: &Path, allowed_root: &Path) -> Result<PathBuf> {
    let parent = candidate
        .parent()
        .ok_or_else(|| Error::InvalidInput("path has no parent".to_string()))?;
    let canonical_parent = validate_path(parent, allowed_root)?;
    let file_name = candidate
        .file_name()
        .ok_or_else(|| Error::InvalidInput("path has no file name".to_string()))?;
    Ok(canonical_parent.join(file_name))
}
