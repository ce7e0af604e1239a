//! Droplet user-data resolution.
//!
//! User data comes either inline (for example a `#cloud-config` document) or
//! from a file. The two sources are mutually exclusive; the payload is passed
//! through untouched once it has been checked for emptiness.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

/// Errors raised while resolving user data.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum UserDataError {
    /// Both inline and file sources were configured.
    #[error("only one of user_data or user_data_file can be specified")]
    BothProvided,
    /// Inline payload is empty or whitespace.
    #[error("user data must not be empty")]
    InlineEmpty,
    /// File path is empty or whitespace.
    #[error("user data file path must not be empty")]
    FilePathEmpty,
    /// File content is empty or whitespace.
    #[error("user data file must not be empty")]
    FileEmpty,
    /// Reading the file failed.
    #[error("failed to read user data file `{path}`: {message}")]
    FileRead {
        /// Expanded path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

/// Resolves user data from an inline value or a file path.
///
/// A leading `~/` in the file path expands to `$HOME`.
///
/// # Errors
///
/// Returns [`UserDataError`] when both sources are set, either source is
/// empty, or the file cannot be read.
pub fn resolve_user_data(
    inline: Option<&str>,
    file: Option<&str>,
) -> Result<Option<String>, UserDataError> {
    match (inline, file) {
        (Some(_), Some(_)) => Err(UserDataError::BothProvided),
        (Some(payload), None) => {
            if payload.trim().is_empty() {
                return Err(UserDataError::InlineEmpty);
            }
            Ok(Some(payload.to_owned()))
        }
        (None, Some(path)) => read_user_data_file(path).map(Some),
        (None, None) => Ok(None),
    }
}

fn read_user_data_file(path: &str) -> Result<String, UserDataError> {
    if path.trim().is_empty() {
        return Err(UserDataError::FilePathEmpty);
    }
    let expanded = expand_home(path);
    let content = read_to_string_ambient(&expanded).map_err(|message| UserDataError::FileRead {
        path: expanded.clone(),
        message,
    })?;
    if content.trim().is_empty() {
        return Err(UserDataError::FileEmpty);
    }
    Ok(content)
}

fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

fn read_to_string_ambient(path: &str) -> Result<String, String> {
    let full = Utf8Path::new(path);
    let (dir_path, file_path) = if full.is_absolute() {
        let parent = full
            .parent()
            .ok_or_else(|| format!("path has no parent directory: {full}"))?;
        let file_name = full
            .file_name()
            .ok_or_else(|| format!("path has no file name: {full}"))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), full)
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_path).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[rstest]
    #[case(Some("#cloud-config"), Some("/tmp/x"), UserDataError::BothProvided)]
    #[case(Some("  \n"), None, UserDataError::InlineEmpty)]
    #[case(None, Some("   "), UserDataError::FilePathEmpty)]
    fn rejects_invalid_inputs(
        #[case] inline: Option<&str>,
        #[case] file: Option<&str>,
        #[case] expected: UserDataError,
    ) {
        assert_eq!(resolve_user_data(inline, file), Err(expected));
    }

    #[test]
    fn absent_sources_resolve_to_none() {
        assert_eq!(resolve_user_data(None, None), Ok(None));
    }

    #[test]
    fn inline_payload_is_returned_verbatim() {
        let payload = "#cloud-config\npackages: [nginx]\n";
        assert_eq!(
            resolve_user_data(Some(payload), None),
            Ok(Some(payload.to_owned()))
        );
    }

    #[test]
    fn file_payload_is_read() {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(file, "#!/bin/sh\necho ready\n").expect("write payload");
        let path = file.path().to_str().expect("utf8 path").to_owned();

        let resolved = resolve_user_data(None, Some(&path))
            .unwrap_or_else(|err| panic!("user data should load: {err}"));

        assert_eq!(resolved.as_deref(), Some("#!/bin/sh\necho ready\n"));
    }

    #[test]
    fn blank_file_is_rejected() {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(file, "  \n").expect("write payload");
        let path = file.path().to_str().expect("utf8 path").to_owned();

        assert_eq!(
            resolve_user_data(None, Some(&path)),
            Err(UserDataError::FileEmpty)
        );
    }

    #[test]
    fn missing_file_reports_path() {
        let err = resolve_user_data(None, Some("/nonexistent/dropsmith/user-data"))
            .expect_err("missing file should fail");
        assert!(
            matches!(err, UserDataError::FileRead { ref path, .. } if path == "/nonexistent/dropsmith/user-data"),
            "unexpected error {err:?}"
        );
    }
}
