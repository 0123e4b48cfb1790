// Whole-store backup archives (zip).
//
// Layout: `db/zsk.db` holds a `VACUUM INTO` snapshot of the store and
// `uploads/...` mirrors the uploads directory. Restore takes any entry under
// `db/`, so older archives carrying `db/dev.db` load too. A restored database
// cannot replace the file under a live pool, so it is staged next to the
// store as `<store>.restore` and swapped in by `apply_pending_restore` at
// startup.

use std::{
    ffi::OsString,
    fs::File,
    io::{self, Cursor, Read, Write},
    path::{Component, Path, PathBuf},
    str::FromStr,
};

use anyhow::Context;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use thiserror::Error;
use uuid::Uuid;
use zip::{result::ZipError, write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

pub const DB_ENTRY: &str = "db/zsk.db";
const DB_PREFIX: &str = "db";
const UPLOADS_PREFIX: &str = "uploads";

/// A finished archive, ready to hand to the client.
#[derive(Debug)]
pub struct BackupArchive {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// A database snapshot was staged and takes effect on the next start.
    pub database_staged: bool,
    pub uploads_restored: u64,
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("backup archive is unreadable: {0}")]
    InvalidArchive(#[source] ZipError),
    #[error("backup entry `{0}` points outside the uploads directory")]
    UnsafePath(String),
    #[error("failed to write restored files: {0}")]
    Io(#[from] io::Error),
}

/// File path behind a SQLite connection string, `None` for in-memory stores.
pub fn database_file(database_url: &str) -> anyhow::Result<Option<PathBuf>> {
    if database_url.contains(":memory:") || database_url.contains("mode=memory") {
        return Ok(None);
    }
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("failed to parse SQLite connection string `{database_url}`"))?;
    Ok(Some(options.get_filename().to_path_buf()))
}

/// Where a restored snapshot waits for the next start.
pub fn pending_restore_path(database_path: &Path) -> PathBuf {
    with_suffix(database_path, ".restore")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

// ── Backup ──────────────────────────────────────────────────────────

pub async fn create_backup(pool: &SqlitePool, uploads_dir: &Path) -> anyhow::Result<BackupArchive> {
    let snapshot_path = std::env::temp_dir().join(format!("zsk-snapshot-{}.db", Uuid::new_v4()));
    sqlx::query("VACUUM INTO ?")
        .bind(snapshot_path.to_string_lossy().into_owned())
        .execute(pool)
        .await
        .context("failed to snapshot the store")?;

    let snapshot = tokio::fs::read(&snapshot_path).await.context("failed to read store snapshot");
    if let Err(error) = tokio::fs::remove_file(&snapshot_path).await {
        tracing::warn!(?error, path = %snapshot_path.display(), "failed to remove store snapshot");
    }
    let snapshot = snapshot?;

    let uploads_dir = uploads_dir.to_path_buf();
    let bytes = tokio::task::spawn_blocking(move || build_archive(&snapshot, &uploads_dir))
        .await
        .context("backup task failed")??;

    let file_name = format!("zsk-backup-{}.zip", chrono::Local::now().format("%Y%m%d-%H%M%S"));
    Ok(BackupArchive { file_name, bytes })
}

fn build_archive(snapshot: &[u8], uploads_dir: &Path) -> anyhow::Result<Vec<u8>> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    writer.start_file(DB_ENTRY, options).context("failed to archive snapshot")?;
    writer.write_all(snapshot).context("failed to archive snapshot")?;

    if uploads_dir.is_dir() {
        append_directory(&mut writer, uploads_dir, UPLOADS_PREFIX, options)
            .with_context(|| format!("failed to archive uploads in {}", uploads_dir.display()))?;
    }

    Ok(writer.finish().context("failed to finish archive")?.into_inner())
}

fn append_directory(
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    dir: &Path,
    prefix: &str,
    options: SimpleFileOptions,
) -> anyhow::Result<()> {
    let mut entries = std::fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = format!("{prefix}/{}", entry.file_name().to_string_lossy());
        if entry.file_type()?.is_dir() {
            writer.add_directory(name.as_str(), options)?;
            append_directory(writer, &entry.path(), &name, options)?;
        } else {
            writer.start_file(name.as_str(), options)?;
            io::copy(&mut File::open(entry.path())?, writer)?;
        }
    }
    Ok(())
}

// ── Restore ─────────────────────────────────────────────────────────

/// Unpack `archive`: uploads go straight into `uploads_dir`, the database
/// snapshot is staged beside `database_path` (skipped for in-memory stores).
pub async fn restore_backup(
    archive: Vec<u8>,
    database_path: Option<PathBuf>,
    uploads_dir: PathBuf,
) -> Result<RestoreReport, RestoreError> {
    tokio::task::spawn_blocking(move || {
        unpack_archive(&archive, database_path.as_deref(), &uploads_dir)
    })
    .await
    .map_err(|error| RestoreError::Io(io::Error::other(error)))?
}

fn unpack_archive(
    bytes: &[u8],
    database_path: Option<&Path>,
    uploads_dir: &Path,
) -> Result<RestoreReport, RestoreError> {
    let mut report = RestoreReport::default();
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(RestoreError::InvalidArchive)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(RestoreError::InvalidArchive)?;
        if entry.is_dir() {
            continue;
        }
        let path = PathBuf::from(entry.name());
        let mut contents = Vec::new();
        entry
            .read_to_end(&mut contents)
            .map_err(|error| RestoreError::InvalidArchive(ZipError::Io(error)))?;

        if path.strip_prefix(DB_PREFIX).is_ok_and(|rest| !rest.as_os_str().is_empty()) {
            let Some(database_path) = database_path else {
                tracing::warn!(entry = %path.display(), "in-memory store; skipping database entry");
                continue;
            };
            stage_database(database_path, &contents)?;
            report.database_staged = true;
        } else if let Ok(relative) = path.strip_prefix(UPLOADS_PREFIX) {
            let target = contained_path(uploads_dir, relative)?;
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, &contents)?;
            report.uploads_restored += 1;
        }
    }

    Ok(report)
}

/// `relative` joined under `root`, refusing anything but plain components.
fn contained_path(root: &Path, relative: &Path) -> Result<PathBuf, RestoreError> {
    let plain = relative.components().all(|component| matches!(component, Component::Normal(_)));
    if !plain || relative.as_os_str().is_empty() {
        return Err(RestoreError::UnsafePath(relative.display().to_string()));
    }
    Ok(root.join(relative))
}

fn stage_database(database_path: &Path, contents: &[u8]) -> io::Result<()> {
    let staged = pending_restore_path(database_path);
    if let Some(parent) = staged.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let partial = with_suffix(&staged, ".partial");
    std::fs::write(&partial, contents)?;
    std::fs::rename(&partial, &staged)
}

/// Swap a staged snapshot into place before the pool opens the store.
///
/// Returns `true` when a snapshot was applied. Stale WAL side files are
/// removed with the old database.
pub async fn apply_pending_restore(database_url: &str) -> anyhow::Result<bool> {
    let Some(database_path) = database_file(database_url)? else {
        return Ok(false);
    };
    let staged = pending_restore_path(&database_path);
    if !tokio::fs::try_exists(&staged).await.unwrap_or(false) {
        return Ok(false);
    }

    for side_file in ["-wal", "-shm"].map(|suffix| with_suffix(&database_path, suffix)) {
        match tokio::fs::remove_file(&side_file).await {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed to remove {}", side_file.display()))
            }
        }
    }
    tokio::fs::rename(&staged, &database_path)
        .await
        .with_context(|| format!("failed to apply restored store {}", staged.display()))?;

    tracing::info!(path = %database_path.display(), "applied restored store snapshot");
    Ok(true)
}
