//! Filesystem and subprocess-argument guard used by the Scribe, Runner, and
//! Gemini workers before they ever touch a sandbox root or shell out.
//!
//! The path-containment check is grounded on the grounding repo's
//! `tools::sandbox_check` (canonicalize-and-`starts_with`, falling back to
//! canonicalizing the parent directory for not-yet-existing write targets).
//! The argument-injection checks are grounded on the grounding repo's other
//! crate's `shell_safety` module (`validate_arg`/`sanitize_identifier`),
//! retargeted from SSH remote-execution onto this crate's subprocess pool.

use std::path::{Path, PathBuf};

const SHELL_METACHARACTERS: &[char] = &[
    ';', '|', '&', '`', '$', '(', ')', '{', '}', '<', '>', '\n', '\r', '!', '#', '~', '*', '?',
    '[', ']', '\\', '"', '\'',
];

const INJECTION_CHARACTERS: &[char] = &[';', '|', '&', '`', '$', '(', ')', '\n', '\r'];

#[derive(Debug, thiserror::Error)]
pub enum FsGuardError {
    #[error("io error resolving path: {0}")]
    Io(#[from] std::io::Error),

    #[error("path `{0}` escapes the sandbox root")]
    Sandbox(String),

    #[error("dangerous character '{character}' at position {position} in: {input_preview}")]
    Injection {
        character: char,
        position: usize,
        input_preview: String,
    },
}

pub type FsGuardResult<T> = Result<T, FsGuardError>;

/// Validates that `relative_path` resolves inside `root` and returns the
/// canonicalized path. Paths that don't exist yet (write targets) are
/// validated by canonicalizing their parent directory instead.
pub fn sandbox_check(root: &Path, relative_path: &str) -> FsGuardResult<PathBuf> {
    let candidate = root.join(relative_path);
    let resolved = candidate
        .canonicalize()
        .or_else(|_| {
            if let Some(parent) = candidate.parent() {
                let canon_parent = parent.canonicalize()?;
                Ok(canon_parent.join(candidate.file_name().unwrap_or_default()))
            } else {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, "cannot resolve path"))
            }
        })?;

    let canon_root = root.canonicalize()?;
    if !resolved.starts_with(&canon_root) {
        return Err(FsGuardError::Sandbox(relative_path.to_string()));
    }
    Ok(resolved)
}

/// Rejects arguments containing injection-class metacharacters (`;|&$()`
/// and newlines). Globbing characters (`*?[]`) are left alone since Runner
/// and Gemini pass glob patterns to `cargo`/`npx` legitimately.
pub fn validate_arg(arg: &str) -> FsGuardResult<()> {
    for (position, character) in arg.chars().enumerate() {
        if INJECTION_CHARACTERS.contains(&character) {
            return Err(FsGuardError::Injection {
                character,
                position,
                input_preview: preview(arg),
            });
        }
    }
    Ok(())
}

/// Stricter than [`validate_arg`]: rejects every shell metacharacter,
/// including globs and quotes. Used for arguments that should never need
/// shell-special syntax, like HITL task IDs embedded in command strings.
pub fn validate_strict(arg: &str) -> FsGuardResult<()> {
    for (position, character) in arg.chars().enumerate() {
        if SHELL_METACHARACTERS.contains(&character) {
            return Err(FsGuardError::Injection {
                character,
                position,
                input_preview: preview(arg),
            });
        }
    }
    Ok(())
}

fn preview(input: &str) -> String {
    if input.len() > 100 {
        format!("{}...", &input[..100])
    } else {
        input.to_string()
    }
}

/// Replaces anything that isn't alphanumeric/`-`/`_`/`.` with `_`, which
/// also neutralizes path traversal (`../../etc/passwd` -> `.._.._etc_passwd`).
pub fn sanitize_identifier(input: &str) -> String {
    input
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_check_rejects_traversal_out_of_root() {
        let dir = tempfile::tempdir().unwrap();
        let result = sandbox_check(dir.path(), "../../etc/passwd");
        assert!(matches!(result, Err(FsGuardError::Sandbox(_))) || matches!(result, Err(FsGuardError::Io(_))));
    }

    #[test]
    fn sandbox_check_allows_new_file_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let result = sandbox_check(dir.path(), "src/new_file.rs");
        // parent `src/` doesn't exist either, so this resolves via the
        // no-parent IO error path rather than succeeding — the guard never
        // silently creates directories on the caller's behalf.
        assert!(result.is_err());
        std::fs::create_dir(dir.path().join("src")).unwrap();
        let result = sandbox_check(dir.path(), "src/new_file.rs");
        assert!(result.is_ok());
    }

    #[test]
    fn validate_arg_allows_globs_but_rejects_injection() {
        assert!(validate_arg("src/**/*.rs").is_ok());
        assert!(validate_arg("; rm -rf /").is_err());
    }

    #[test]
    fn validate_strict_rejects_globs_too() {
        assert!(validate_strict("*.rs").is_err());
        assert!(validate_strict("file.rs").is_ok());
    }

    #[test]
    fn sanitize_identifier_neutralizes_traversal() {
        assert_eq!(sanitize_identifier("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_identifier("task-123.json"), "task-123.json");
    }
}
