//! Clearing the sync state location.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use super::location::StateLocation;
use crate::errors::StateResetError;

/// Recursively deletes a state path.
#[cfg_attr(test, mockall::automock)]
pub trait StateRemover: Send + Sync {
    /// Removes `path` and everything below it. A missing path is not an error.
    fn remove_all(&self, path: &Path) -> io::Result<()>;
}

/// Removes state from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStateRemover;

impl StateRemover for FsStateRemover {
    fn remove_all(&self, path: &Path) -> io::Result<()> {
        let result = match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
            Ok(_) => std::fs::remove_file(path),
            Err(err) => Err(err),
        };
        match result {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// What a reset did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    /// The path was removed (or was already absent).
    Removed(PathBuf),
    /// The location uses a scheme that cannot be reset here.
    Unsupported {
        /// The location's scheme.
        scheme: String,
    },
    /// The path resolved to something too broad to delete.
    UnsafePath(PathBuf),
}

impl ResetOutcome {
    /// Short label for span attributes.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Removed(_) => "removed",
            Self::Unsupported { .. } => "unsupported_scheme",
            Self::UnsafePath(_) => "unsafe_path",
        }
    }
}

/// Clears the state location before a backfill.
#[derive(Clone)]
pub struct StateResetter {
    remover: Arc<dyn StateRemover>,
}

impl Default for StateResetter {
    fn default() -> Self {
        Self::new(Arc::new(FsStateRemover))
    }
}

impl fmt::Debug for StateResetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateResetter").finish_non_exhaustive()
    }
}

impl StateResetter {
    /// Creates a resetter using the given remover.
    #[must_use]
    pub fn new(remover: Arc<dyn StateRemover>) -> Self {
        Self { remover }
    }

    /// Clears `location`, or does nothing when that would be unsafe or
    /// unsupported.
    ///
    /// Only `file` locations and bare paths are removed. A path that cleans
    /// to `.` or `/` is refused. Parse and removal failures are errors;
    /// everything else succeeds.
    pub fn reset(&self, location: &str) -> Result<ResetOutcome, StateResetError> {
        info!(mode = "backfill", state_location = location, "resetting sync state");

        let parsed = StateLocation::parse(location).map_err(|err| {
            error!(error = %err, "invalid state location");
            err
        })?;

        if !parsed.is_local() {
            let scheme = parsed.scheme().unwrap_or_default().to_string();
            error!(scheme = %scheme, "state location scheme not supported for backfill");
            return Ok(ResetOutcome::Unsupported { scheme });
        }

        let path = parsed.cleaned_path();
        if path.as_os_str().is_empty() || path == Path::new(".") || path == Path::new("/") {
            error!(path = %path.display(), "state location path is unsafe; skipping reset");
            return Ok(ResetOutcome::UnsafePath(path));
        }

        if let Err(source) = self.remover.remove_all(&path) {
            error!(path = %path.display(), error = %source, "failed to reset state");
            return Err(StateResetError::Remove { path, source });
        }
        info!(path = %path.display(), "sync state reset");
        Ok(ResetOutcome::Removed(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    fn resetter(mock: MockStateRemover) -> StateResetter {
        StateResetter::new(Arc::new(mock))
    }

    #[test]
    fn test_remote_scheme_never_deletes() {
        let mut mock = MockStateRemover::new();
        mock.expect_remove_all().never();

        let outcome = resetter(mock).reset("s3://bucket/state").expect("no error");
        assert_eq!(
            outcome,
            ResetOutcome::Unsupported {
                scheme: "s3".to_string()
            }
        );
    }

    #[test]
    fn test_unsafe_paths_never_delete() {
        for location in [".", "/", "file:///", "file://./", "file:.", "", "a/.."] {
            let mut mock = MockStateRemover::new();
            mock.expect_remove_all().never();

            let outcome = resetter(mock).reset(location).expect("no error");
            assert!(
                matches!(outcome, ResetOutcome::UnsafePath(_)),
                "{location:?} gave {outcome:?}"
            );
        }
    }

    #[test]
    fn test_file_location_deletes_cleaned_path() {
        let mut mock = MockStateRemover::new();
        mock.expect_remove_all()
            .with(eq(PathBuf::from("/tmp/sling/state")))
            .times(1)
            .returning(|_| Ok(()));

        let outcome = resetter(mock)
            .reset("file:///tmp/sling//./state/")
            .expect("reset");
        assert_eq!(outcome, ResetOutcome::Removed(PathBuf::from("/tmp/sling/state")));
    }

    #[test]
    fn test_relative_opaque_location() {
        let mut mock = MockStateRemover::new();
        mock.expect_remove_all()
            .with(eq(PathBuf::from("rel/state.json")))
            .times(1)
            .returning(|_| Ok(()));

        resetter(mock).reset("file:rel/state.json").expect("reset");
    }

    #[test]
    fn test_parse_failure_is_an_error() {
        let mut mock = MockStateRemover::new();
        mock.expect_remove_all().never();

        let err = resetter(mock).reset("/tmp/%zz").unwrap_err();
        assert!(matches!(err, StateResetError::InvalidLocation { .. }));
    }

    #[test]
    fn test_removal_failure_is_wrapped_with_path() {
        let mut mock = MockStateRemover::new();
        mock.expect_remove_all()
            .returning(|_| Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied")));

        let err = resetter(mock).reset("/srv/state").unwrap_err();
        match err {
            StateResetError::Remove { path, source } => {
                assert_eq!(path, PathBuf::from("/srv/state"));
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_fs_remover_deletes_directory_tree() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = dir.path().join("state");
        std::fs::create_dir_all(state.join("nested")).expect("mkdir");
        std::fs::write(state.join("nested/progress.json"), "{}").expect("write");

        let outcome = StateResetter::default()
            .reset(&format!("file://{}", state.display()))
            .expect("reset");

        assert_eq!(outcome, ResetOutcome::Removed(state.clone()));
        assert!(!state.exists());
    }

    #[test]
    fn test_fs_remover_deletes_file_and_tolerates_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("sling_state.json");
        std::fs::write(&file, "{}").expect("write");

        FsStateRemover.remove_all(&file).expect("remove file");
        assert!(!file.exists());
        FsStateRemover.remove_all(&file).expect("missing path is fine");
    }
}
