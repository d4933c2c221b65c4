//! Uploaded file purge.

use super::{CleanupContext, CleanupTask};
use crate::errors::LcError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Removes `{upload_dir}/{session_id}` and everything under it.
#[derive(Debug, Clone)]
pub struct FilePurgeTask {
    upload_dir: PathBuf,
}

impl FilePurgeTask {
    #[must_use]
    pub fn new(upload_dir: PathBuf) -> Self {
        Self { upload_dir }
    }

    /// Directory holding a session's uploads.
    ///
    /// # Errors
    ///
    /// Returns `LcError::MalformedEvent` if the session id is empty or is not
    /// a single path component.
    pub fn session_dir(&self, session_id: &str) -> Result<PathBuf, LcError> {
        let mut components = Path::new(session_id).components();
        match (components.next(), components.next()) {
            (Some(std::path::Component::Normal(name)), None) => Ok(self.upload_dir.join(name)),
            _ => Err(LcError::MalformedEvent(format!(
                "session id '{session_id}' is not a valid upload directory name"
            ))),
        }
    }
}

#[async_trait]
impl CleanupTask for FilePurgeTask {
    fn name(&self) -> &'static str {
        "file_purge"
    }

    #[instrument(skip_all, fields(room_id = %ctx.room_id, session_id = %ctx.session_id))]
    async fn run(&self, ctx: &CleanupContext) -> Result<(), LcError> {
        let dir = self.session_dir(ctx.session_id.as_str())?;

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!(target: "lc.cleanup", room_id = %ctx.room_id, "Purged session uploads");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(target: "lc.cleanup", room_id = %ctx.room_id, "No uploads to purge");
                Ok(())
            }
            Err(e) => {
                warn!(
                    target: "lc.cleanup",
                    room_id = %ctx.room_id,
                    error = %e,
                    "Failed to purge session uploads"
                );
                Err(LcError::Io(format!("Failed to purge uploads: {e}")))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::types::{RoomId, SessionId};

    fn ctx(session_id: &str) -> CleanupContext {
        CleanupContext {
            room_id: RoomId::new("standup").unwrap(),
            session_id: SessionId::new(session_id),
            metadata: String::new(),
        }
    }

    #[tokio::test]
    async fn test_purges_only_the_session_directory() {
        let root = tempfile::tempdir().unwrap();
        let session = root.path().join("RM_1");
        let other = root.path().join("RM_2");
        std::fs::create_dir_all(session.join("nested")).unwrap();
        std::fs::write(session.join("nested/slides.pdf"), b"pdf").unwrap();
        std::fs::create_dir_all(&other).unwrap();

        let task = FilePurgeTask::new(root.path().to_path_buf());
        task.run(&ctx("RM_1")).await.unwrap();

        assert!(!session.exists());
        assert!(other.exists());
    }

    #[tokio::test]
    async fn test_missing_directory_is_success() {
        let root = tempfile::tempdir().unwrap();
        let task = FilePurgeTask::new(root.path().to_path_buf());
        task.run(&ctx("RM_never_uploaded")).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_unsafe_session_ids() {
        let root = tempfile::tempdir().unwrap();
        let task = FilePurgeTask::new(root.path().to_path_buf());

        for bad in ["", "..", "../etc", "a/b", "/abs"] {
            let result = task.run(&ctx(bad)).await;
            assert!(
                matches!(result, Err(LcError::MalformedEvent(_))),
                "session id {bad:?} should be rejected"
            );
        }
        assert!(root.path().exists());
    }
}
