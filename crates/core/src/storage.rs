//! On-disk session layout.
//!
//! One profile directory per session name under the configured base path,
//! plus a parallel `<session>.data.json` token file under the tokens
//! directory. Profile directories can be transiently locked by a browser
//! that is still shutting down, so removal retries before giving up.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

const REMOVE_RETRIES: u32 = 5;
const REMOVE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Paths for per-session browser profiles and token data.
#[derive(Debug, Clone)]
pub struct SessionStore {
    user_data_dir: PathBuf,
    tokens_dir: PathBuf,
}

impl SessionStore {
    pub fn new(user_data_dir: impl Into<PathBuf>, tokens_dir: impl Into<PathBuf>) -> Self {
        Self {
            user_data_dir: user_data_dir.into(),
            tokens_dir: tokens_dir.into(),
        }
    }

    pub fn user_data_dir(&self) -> &Path {
        &self.user_data_dir
    }

    pub fn tokens_dir(&self) -> &Path {
        &self.tokens_dir
    }

    /// Creates both base directories if absent.
    pub fn ensure_base_dirs(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.user_data_dir)?;
        std::fs::create_dir_all(&self.tokens_dir)?;
        Ok(())
    }

    /// Profile directory for `session`.
    pub fn session_dir(&self, session: &str) -> PathBuf {
        self.user_data_dir.join(session)
    }

    /// Token data file for `session`.
    pub fn token_path(&self, session: &str) -> PathBuf {
        self.tokens_dir.join(format!("{session}.data.json"))
    }

    /// Names of every session with a profile directory on disk.
    pub fn list_sessions(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.user_data_dir) else {
            return Vec::new();
        };
        let mut sessions: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        sessions.sort();
        sessions
    }

    /// Creates (if needed) and returns the profile directory for `session`.
    pub fn create_session_dir(&self, session: &str) -> io::Result<PathBuf> {
        let dir = self.session_dir(session);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Removes a session's profile directory and token file, retrying while
    /// the profile is still held by a dying browser process.
    pub async fn remove_session(&self, session: &str) -> io::Result<()> {
        remove_with_retries(&self.session_dir(session)).await?;
        remove_with_retries(&self.token_path(session)).await?;
        Ok(())
    }

    /// Removes every session's on-disk data.
    pub async fn remove_all_sessions(&self) -> io::Result<()> {
        for session in self.list_sessions() {
            self.remove_session(&session).await?;
        }
        Ok(())
    }
}

async fn remove_with_retries(path: &Path) -> io::Result<()> {
    for attempt in 0..REMOVE_RETRIES {
        let result = if path.is_dir() {
            std::fs::remove_dir_all(path)
        } else if path.exists() {
            std::fs::remove_file(path)
        } else {
            return Ok(());
        };

        match result {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == io::ErrorKind::ResourceBusy
                || err.kind() == io::ErrorKind::PermissionDenied =>
            {
                if attempt + 1 == REMOVE_RETRIES {
                    warn!(target = "wabridge.storage", path = %path.display(), error = %err, "giving up on removal");
                    return Ok(());
                }
                tokio::time::sleep(REMOVE_RETRY_DELAY).await;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn store(base: &Path) -> SessionStore {
        SessionStore::new(base.join("userDataDir"), base.join("tokens"))
    }

    #[test]
    fn base_dirs_and_session_dirs_are_created() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        store.ensure_base_dirs().unwrap();
        assert!(store.user_data_dir().is_dir());
        assert!(store.tokens_dir().is_dir());

        let session_dir = store.create_session_dir("tenant").unwrap();
        assert!(session_dir.is_dir());
        assert_eq!(session_dir, store.user_data_dir().join("tenant"));
    }

    #[test]
    fn list_sessions_reports_profile_dirs_only() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.ensure_base_dirs().unwrap();
        store.create_session_dir("b").unwrap();
        store.create_session_dir("a").unwrap();
        std::fs::write(store.user_data_dir().join("stray.txt"), b"x").unwrap();

        assert_eq!(store.list_sessions(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn token_path_uses_data_json_suffix() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        assert_eq!(
            store.token_path("tenant"),
            store.tokens_dir().join("tenant.data.json")
        );
    }

    #[tokio::test]
    async fn remove_session_deletes_profile_and_token() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.ensure_base_dirs().unwrap();

        let session_dir = store.create_session_dir("tenant").unwrap();
        std::fs::write(session_dir.join("Cookies"), b"data").unwrap();
        std::fs::write(store.token_path("tenant"), b"{}").unwrap();

        store.remove_session("tenant").await.unwrap();
        assert!(!session_dir.exists());
        assert!(!store.token_path("tenant").exists());
    }

    #[tokio::test]
    async fn remove_session_is_a_noop_when_absent() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.remove_session("missing").await.unwrap();
    }
}
