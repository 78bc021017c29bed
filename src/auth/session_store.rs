//! Persists the signed-in session between runs as a JSON file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::dto::Session;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored session. A missing file means nobody is signed in.
    ///
    /// An unreadable or corrupt file is discarded with a warning rather than failing startup.
    pub async fn load(&self) -> Option<Session> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot read session file");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "discarding corrupt session file");
                None
            }
        }
    }

    /// # Errors
    ///
    /// Returns an error if the file or its parent directory cannot be written.
    pub async fn save(&self, session: &Session) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Internal(format!("Cannot create session dir: {e}")))?;
        }
        let body = serde_json::to_string_pretty(session)?;
        tokio::fs::write(&self.path, body)
            .await
            .map_err(|e| AppError::Internal(format!("Cannot write session file: {e}")))?;
        tracing::debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if an existing file cannot be removed.
    pub async fn clear(&self) -> Result<(), AppError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Internal(format!(
                "Cannot remove session file: {e}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::User;
    use uuid::Uuid;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("mafia-nights-{}", Uuid::new_v4()))
            .join(name)
    }

    fn session() -> Session {
        Session {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            token_type: Some("bearer".to_string()),
            expires_in: Some(3600),
            expires_at: Some(1_900_000_000),
            user: User {
                id: Uuid::new_v4(),
                email: Some("vito@example.com".to_string()),
                phone: None,
                user_metadata: serde_json::Value::Null,
            },
        }
    }

    #[tokio::test]
    async fn test_save_load_clear() {
        let store = SessionStore::new(scratch_path("session.json"));
        assert!(store.load().await.is_none());

        let saved = session();
        assert!(store.save(&saved).await.is_ok());
        let loaded = store.load().await;
        assert_eq!(loaded.map(|s| s.user.id), Some(saved.user.id));

        assert!(store.clear().await.is_ok());
        assert!(store.load().await.is_none());
        assert!(store.clear().await.is_ok());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_ignored() {
        let path = scratch_path("session.json");
        if let Some(parent) = path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        let _ = tokio::fs::write(&path, "{not json").await;
        assert!(SessionStore::new(path).load().await.is_none());
    }
}
