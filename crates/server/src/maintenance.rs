// Offline store maintenance, run from the CLI while the server is stopped.

use std::{io, path::Path};

use anyhow::Context;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use zsk_common::fields::{canonical_rewrite, FieldKind};

/// Counts written by [`normalize_stored_fields`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    /// Document fields rewritten (a row can contribute up to three).
    pub documents: u64,
    /// Bookmark rows whose tags were rewritten.
    pub bookmarks: u64,
}

impl NormalizeReport {
    pub fn is_clean(&self) -> bool {
        self.documents == 0 && self.bookmarks == 0
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DocumentFields {
    id: String,
    tags: Option<String>,
    blocks: Option<String>,
    code: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct BookmarkTags {
    id: String,
    tags: Option<String>,
}

/// Collapse double (and deeper) encoded tags/blocks/code columns to a
/// single JSON encoding. A second run writes nothing.
pub async fn normalize_stored_fields(pool: &SqlitePool) -> anyhow::Result<NormalizeReport> {
    let documents: Vec<DocumentFields> =
        sqlx::query_as("SELECT id, tags, blocks, code FROM documents")
            .fetch_all(pool)
            .await
            .context("failed to scan documents")?;
    let bookmarks: Vec<BookmarkTags> = sqlx::query_as("SELECT id, tags FROM bookmarks")
        .fetch_all(pool)
        .await
        .context("failed to scan bookmarks")?;

    let mut report = NormalizeReport::default();
    let mut tx = pool.begin().await?;

    for doc in &documents {
        let rewrites: Vec<(&str, String)> = [
            ("tags", canonical_rewrite(FieldKind::Tags, doc.tags.as_deref())),
            ("blocks", canonical_rewrite(FieldKind::Blocks, doc.blocks.as_deref())),
            ("code", canonical_rewrite(FieldKind::Code, doc.code.as_deref())),
        ]
        .into_iter()
        .filter_map(|(column, rewrite)| rewrite.map(|value| (column, value)))
        .collect();
        if rewrites.is_empty() {
            continue;
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE documents SET ");
        let mut columns = query.separated(", ");
        for (column, value) in &rewrites {
            columns.push(format!("{column} = ")).push_bind_unseparated(value.clone());
        }
        query.push(" WHERE id = ").push_bind(doc.id.as_str());
        query.build().execute(&mut *tx).await?;

        tracing::debug!(doc_id = %doc.id, fields = rewrites.len(), "normalized document fields");
        report.documents += rewrites.len() as u64;
    }

    for bookmark in &bookmarks {
        let Some(tags) = canonical_rewrite(FieldKind::Tags, bookmark.tags.as_deref()) else {
            continue;
        };
        sqlx::query("UPDATE bookmarks SET tags = ? WHERE id = ?")
            .bind(tags)
            .bind(&bookmark.id)
            .execute(&mut *tx)
            .await?;
        report.bookmarks += 1;
    }

    tx.commit().await.context("failed to commit normalized fields")?;
    tracing::info!(
        documents_scanned = documents.len(),
        bookmarks_scanned = bookmarks.len(),
        document_fields = report.documents,
        bookmarks = report.bookmarks,
        "field normalization finished"
    );
    Ok(report)
}

/// Rows removed by [`reset`], per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetReport {
    pub users: u64,
    pub documents: u64,
    pub bookmarks: u64,
    pub categories: u64,
    pub uploads_removed: u64,
}

/// Delete every row and empty the uploads directory (the directory itself
/// stays).
pub async fn reset(pool: &SqlitePool, uploads_dir: &Path) -> anyhow::Result<ResetReport> {
    let mut report = ResetReport::default();
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM document_access").execute(&mut *tx).await?;
    report.documents =
        sqlx::query("DELETE FROM documents").execute(&mut *tx).await?.rows_affected();
    report.bookmarks =
        sqlx::query("DELETE FROM bookmarks").execute(&mut *tx).await?.rows_affected();
    report.categories =
        sqlx::query("DELETE FROM categories").execute(&mut *tx).await?.rows_affected();
    report.users = sqlx::query("DELETE FROM users").execute(&mut *tx).await?.rows_affected();
    tx.commit().await.context("failed to commit store reset")?;

    report.uploads_removed = clear_directory(uploads_dir)
        .await
        .with_context(|| format!("failed to clear uploads in {}", uploads_dir.display()))?;

    tracing::info!(
        users = report.users,
        documents = report.documents,
        bookmarks = report.bookmarks,
        categories = report.categories,
        uploads_removed = report.uploads_removed,
        "store reset"
    );
    Ok(report)
}

async fn clear_directory(dir: &Path) -> io::Result<u64> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(error) => return Err(error),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(entry.path()).await?;
        } else {
            tokio::fs::remove_file(entry.path()).await?;
        }
        removed += 1;
    }
    Ok(removed)
}
