//! Zip backup and restore of the on-disk session layout.
//!
//! The archive carries two top-level entries: `tokens/` with flat copies of
//! the per-session token files, and `userDataDir/` with the full profile
//! tree. Both operations require every session to be closed first; the
//! browser must not be writing into a profile while it is copied.
//!
//! Restore overwrites token files but merges profile data non-destructively:
//! files already present on disk win over archive entries.

use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::path::Path;

use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::SessionError;
use crate::storage::SessionStore;

const TOKENS_ENTRY: &str = "tokens";
const PROFILES_ENTRY: &str = "userDataDir";

/// Archives the store's token files and profile directories into a zip,
/// returned as bytes.
pub fn backup(store: &SessionStore) -> Result<Vec<u8>, SessionError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    if store.tokens_dir().is_dir() {
        for entry in std::fs::read_dir(store.tokens_dir())? {
            let entry = entry?;
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            writer.start_file(format!("{TOKENS_ENTRY}/{name}"), options)?;
            let mut file = File::open(entry.path())?;
            io::copy(&mut file, &mut writer)?;
        }
    }

    if store.user_data_dir().is_dir() {
        archive_dir(&mut writer, store.user_data_dir(), PROFILES_ENTRY, options)?;
    }

    let cursor = writer.finish()?;
    info!(target = "wabridge.backup", bytes = cursor.get_ref().len(), "sessions archived");
    Ok(cursor.into_inner())
}

fn archive_dir(
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    dir: &Path,
    prefix: &str,
    options: SimpleFileOptions,
) -> Result<(), SessionError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let entry_name = format!("{prefix}/{name}");

        if path.is_dir() {
            writer.add_directory(entry_name.clone(), options)?;
            archive_dir(writer, &path, &entry_name, options)?;
        } else {
            writer.start_file(entry_name, options)?;
            let mut file = File::open(&path)?;
            io::copy(&mut file, writer)?;
        }
    }
    Ok(())
}

/// Restores a backup archive into the store.
pub fn restore(store: &SessionStore, bytes: &[u8]) -> Result<(), SessionError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    store.ensure_base_dirs()?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(path) = entry.enclosed_name() else {
            debug!(target = "wabridge.backup", name = entry.name(), "skipping unsafe entry");
            continue;
        };

        let destination = if let Ok(rest) = path.strip_prefix(TOKENS_ENTRY) {
            if rest.as_os_str().is_empty() {
                continue;
            }
            Some((store.tokens_dir().join(rest), true))
        } else if let Ok(rest) = path.strip_prefix(PROFILES_ENTRY) {
            if rest.as_os_str().is_empty() {
                continue;
            }
            Some((store.user_data_dir().join(rest), false))
        } else {
            None
        };
        let Some((destination, overwrite)) = destination else {
            continue;
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&destination)?;
            continue;
        }
        if !overwrite && destination.exists() {
            continue;
        }
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        File::create(&destination)?.write_all(&contents)?;
    }

    info!(target = "wabridge.backup", "sessions restored");
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn seeded_store(base: &Path) -> SessionStore {
        let store = SessionStore::new(base.join("userDataDir"), base.join("tokens"));
        store.ensure_base_dirs().unwrap();
        store
    }

    #[test]
    fn backup_then_restore_round_trips() {
        let source_dir = tempdir().unwrap();
        let store = seeded_store(source_dir.path());
        std::fs::write(store.token_path("tenant"), br#"{"WABrowserId":"x"}"#).unwrap();
        let profile = store.create_session_dir("tenant").unwrap();
        std::fs::create_dir_all(profile.join("Default")).unwrap();
        std::fs::write(profile.join("Default").join("Cookies"), b"cookie-bytes").unwrap();

        let bytes = backup(&store).unwrap();

        let target_dir = tempdir().unwrap();
        let target = seeded_store(target_dir.path());
        restore(&target, &bytes).unwrap();

        assert_eq!(
            std::fs::read(target.token_path("tenant")).unwrap(),
            br#"{"WABrowserId":"x"}"#
        );
        assert_eq!(
            std::fs::read(target.session_dir("tenant").join("Default").join("Cookies")).unwrap(),
            b"cookie-bytes"
        );
    }

    #[test]
    fn restore_overwrites_tokens_but_keeps_existing_profile_files() {
        let source_dir = tempdir().unwrap();
        let store = seeded_store(source_dir.path());
        std::fs::write(store.token_path("tenant"), b"archived-token").unwrap();
        let profile = store.create_session_dir("tenant").unwrap();
        std::fs::write(profile.join("Cookies"), b"archived-cookies").unwrap();

        let bytes = backup(&store).unwrap();

        let target_dir = tempdir().unwrap();
        let target = seeded_store(target_dir.path());
        std::fs::write(target.token_path("tenant"), b"live-token").unwrap();
        let target_profile = target.create_session_dir("tenant").unwrap();
        std::fs::write(target_profile.join("Cookies"), b"live-cookies").unwrap();

        restore(&target, &bytes).unwrap();

        // Tokens are replaced; profile data present on disk wins.
        assert_eq!(std::fs::read(target.token_path("tenant")).unwrap(), b"archived-token");
        assert_eq!(
            std::fs::read(target_profile.join("Cookies")).unwrap(),
            b"live-cookies"
        );
    }

    #[test]
    fn restore_ignores_foreign_entries() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        writer.start_file("unrelated/top.txt", options).unwrap();
        writer.write_all(b"ignored").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let dir = tempdir().unwrap();
        let store = seeded_store(dir.path());
        restore(&store, &bytes).unwrap();

        assert!(store.list_sessions().is_empty());
    }

    #[test]
    fn restore_rejects_garbage() {
        let dir = tempdir().unwrap();
        let store = seeded_store(dir.path());
        assert!(restore(&store, b"not a zip").is_err());
    }
}
