//! SQLite cache backend.
//!
//! One `videos` row per video plus one `chunks` row per chunk, with vectors
//! stored as little-endian `f32` BLOBs. Writes go through a single
//! transaction so a reader sees either the old entry or the new one.

use super::{CacheEntry, CacheStore, CachedVideo};
use crate::chunking::Chunk;
use crate::embedding::Embedding;
use crate::error::{Result, TubeqaError};
use crate::transcript::VideoId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS videos (
        video_id TEXT PRIMARY KEY,
        fingerprint TEXT NOT NULL,
        transcript_json TEXT NOT NULL,
        topics_json TEXT NOT NULL,
        segment_count INTEGER NOT NULL,
        chunk_count INTEGER NOT NULL,
        topic_count INTEGER NOT NULL,
        duration_seconds REAL NOT NULL,
        dimensions INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        accessed_at TEXT NOT NULL,
        access_seq INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_videos_access_seq ON videos(access_seq);

    CREATE TABLE IF NOT EXISTS chunks (
        video_id TEXT NOT NULL,
        chunk_id INTEGER NOT NULL,
        content TEXT NOT NULL,
        start_seconds REAL NOT NULL,
        end_seconds REAL NOT NULL,
        first_segment INTEGER NOT NULL,
        last_segment INTEGER NOT NULL,
        embedding BLOB NOT NULL,
        PRIMARY KEY (video_id, chunk_id)
    );
"#;

/// SQLite-based cache store.
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
    max_entries: Option<usize>,
}

struct VideoRow {
    fingerprint: String,
    transcript_json: String,
    topics_json: String,
    chunk_count: i64,
    dimensions: i64,
    created_at: String,
}

impl SqliteCacheStore {
    /// Open (or create) the cache database at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path, max_entries: Option<usize>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Opened cache at {:?}", path);
        Ok(Self {
            conn: Mutex::new(conn),
            max_entries,
        })
    }

    /// In-memory database, for tests.
    pub fn in_memory(max_entries: Option<usize>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            max_entries,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| TubeqaError::Cache(format!("Failed to acquire lock: {}", e)))
    }

    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn next_access_seq(conn: &Connection) -> Result<i64> {
        Ok(conn.query_row(
            "SELECT COALESCE(MAX(access_seq), 0) + 1 FROM videos",
            [],
            |row| row.get(0),
        )?)
    }

    fn parse_time(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    /// Read a complete entry; `None` on absence or any inconsistency.
    fn read_entry(conn: &Connection, video_id: &VideoId) -> Result<Option<CacheEntry>> {
        let row = conn
            .query_row(
                r#"
                SELECT fingerprint, transcript_json, topics_json, chunk_count, dimensions, created_at
                FROM videos WHERE video_id = ?1
                "#,
                params![video_id.as_str()],
                |row| {
                    Ok(VideoRow {
                        fingerprint: row.get(0)?,
                        transcript_json: row.get(1)?,
                        topics_json: row.get(2)?,
                        chunk_count: row.get(3)?,
                        dimensions: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;

        let Some(row) = row else {
            return Ok(None);
        };

        let (transcript, topics) = match (
            serde_json::from_str(&row.transcript_json),
            serde_json::from_str(&row.topics_json),
        ) {
            (Ok(t), Ok(b)) => (t, b),
            _ => {
                warn!(video_id = %video_id, "Undecodable cache row, treating as miss");
                return Ok(None);
            }
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT chunk_id, content, start_seconds, end_seconds, first_segment, last_segment, embedding
            FROM chunks WHERE video_id = ?1
            ORDER BY chunk_id
            "#,
        )?;

        let rows = stmt
            .query_map(params![video_id.as_str()], |row| {
                let chunk_id: i64 = row.get(0)?;
                let first: i64 = row.get(4)?;
                let last: i64 = row.get(5)?;
                let bytes: Vec<u8> = row.get(6)?;
                Ok((
                    Chunk {
                        id: chunk_id as usize,
                        text: row.get(1)?,
                        start: row.get(2)?,
                        end: row.get(3)?,
                        first_segment: first as usize,
                        last_segment: last as usize,
                    },
                    bytes,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let dims = row.dimensions as usize;
        let consistent = rows.len() as i64 == row.chunk_count
            && rows
                .iter()
                .enumerate()
                .all(|(i, (chunk, bytes))| chunk.id == i && bytes.len() == dims * 4);
        if !consistent {
            warn!(video_id = %video_id, "Incomplete cache row, treating as miss");
            return Ok(None);
        }

        let (chunks, embeddings): (Vec<Chunk>, Vec<Embedding>) = rows
            .into_iter()
            .map(|(chunk, bytes)| {
                let embedding = Embedding {
                    chunk_id: chunk.id,
                    vector: Self::bytes_to_embedding(&bytes),
                };
                (chunk, embedding)
            })
            .unzip();

        Ok(Some(CacheEntry {
            video_id: video_id.clone(),
            transcript,
            chunks,
            embeddings,
            topics,
            fingerprint: row.fingerprint,
            created_at: Self::parse_time(&row.created_at),
        }))
    }

    /// Drop least recently used entries beyond the bound, sparing `keep`.
    fn evict(&self, conn: &Connection, keep: &VideoId) -> Result<usize> {
        let Some(max) = self.max_entries else {
            return Ok(0);
        };

        let stale: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT video_id FROM videos WHERE video_id != ?1 ORDER BY access_seq DESC",
            )?;
            let ids = stmt
                .query_map(params![keep.as_str()], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            ids.into_iter().skip(max.saturating_sub(1)).collect()
        };

        if stale.is_empty() {
            return Ok(0);
        }

        let tx = conn.unchecked_transaction()?;
        for id in &stale {
            tx.execute("DELETE FROM chunks WHERE video_id = ?1", params![id])?;
            tx.execute("DELETE FROM videos WHERE video_id = ?1", params![id])?;
        }
        tx.commit()?;

        info!("Evicted {} cached videos", stale.len());
        Ok(stale.len())
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    #[instrument(skip(self), fields(video_id = %video_id))]
    async fn get(&self, video_id: &VideoId) -> Result<Option<CacheEntry>> {
        let conn = self.lock()?;

        let entry = Self::read_entry(&conn, video_id)?;
        if entry.is_some() {
            let seq = Self::next_access_seq(&conn)?;
            conn.execute(
                "UPDATE videos SET accessed_at = ?1, access_seq = ?2 WHERE video_id = ?3",
                params![Utc::now().to_rfc3339(), seq, video_id.as_str()],
            )?;
            debug!("Cache hit");
        }
        Ok(entry)
    }

    #[instrument(skip(self, entry), fields(video_id = %video_id))]
    async fn put(&self, video_id: &VideoId, entry: &CacheEntry) -> Result<()> {
        entry.check_key(video_id)?;

        let transcript_json = serde_json::to_string(&entry.transcript)?;
        let topics_json = serde_json::to_string(&entry.topics)?;
        let now = Utc::now().to_rfc3339();

        let conn = self.lock()?;
        let seq = Self::next_access_seq(&conn)?;

        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM chunks WHERE video_id = ?1", params![video_id.as_str()])?;
        tx.execute(
            r#"
            INSERT OR REPLACE INTO videos
            (video_id, fingerprint, transcript_json, topics_json, segment_count, chunk_count,
             topic_count, duration_seconds, dimensions, created_at, accessed_at, access_seq)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                video_id.as_str(),
                entry.fingerprint,
                transcript_json,
                topics_json,
                entry.transcript.len() as i64,
                entry.chunks.len() as i64,
                entry.topics.len() as i64,
                entry.duration_seconds(),
                entry.dimensions() as i64,
                entry.created_at.to_rfc3339(),
                now,
                seq,
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO chunks
                (video_id, chunk_id, content, start_seconds, end_seconds, first_segment, last_segment, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )?;
            for (chunk, embedding) in entry.chunks.iter().zip(&entry.embeddings) {
                stmt.execute(params![
                    video_id.as_str(),
                    chunk.id as i64,
                    chunk.text,
                    chunk.start,
                    chunk.end,
                    chunk.first_segment as i64,
                    chunk.last_segment as i64,
                    Self::embedding_to_bytes(&embedding.vector),
                ])?;
            }
        }

        tx.commit()?;
        info!("Cached {} chunks", entry.chunks.len());

        self.evict(&conn, video_id)?;
        Ok(())
    }

    async fn contains(&self, video_id: &VideoId) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM videos WHERE video_id = ?1",
            params![video_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<CachedVideo>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT video_id, segment_count, chunk_count, topic_count, duration_seconds,
                   fingerprint, created_at, accessed_at
            FROM videos
            ORDER BY access_seq DESC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let segment_count: i64 = row.get(1)?;
            let chunk_count: i64 = row.get(2)?;
            let topic_count: i64 = row.get(3)?;
            let created_at: String = row.get(6)?;
            let accessed_at: String = row.get(7)?;
            Ok((
                id,
                segment_count as usize,
                chunk_count as usize,
                topic_count as usize,
                row.get::<_, f64>(4)?,
                row.get::<_, String>(5)?,
                created_at,
                accessed_at,
            ))
        })?;

        let mut videos = Vec::new();
        for row in rows {
            let (id, segment_count, chunk_count, topic_count, duration, fingerprint, created, accessed) =
                row?;
            let Ok(video_id) = VideoId::parse(&id) else {
                warn!("Skipping cache row with invalid id {}", id);
                continue;
            };
            videos.push(CachedVideo {
                video_id,
                segment_count,
                chunk_count,
                topic_count,
                duration_seconds: duration,
                fingerprint,
                created_at: Self::parse_time(&created),
                accessed_at: Self::parse_time(&accessed),
            });
        }
        Ok(videos)
    }

    #[instrument(skip(self), fields(video_id = %video_id))]
    async fn remove(&self, video_id: &VideoId) -> Result<bool> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM chunks WHERE video_id = ?1", params![video_id.as_str()])?;
        let deleted = tx.execute("DELETE FROM videos WHERE video_id = ?1", params![video_id.as_str()])?;
        tx.commit()?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::sample_entry;

    fn id(s: &str) -> VideoId {
        VideoId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = SqliteCacheStore::in_memory(None).unwrap();
        let entry = sample_entry("dQw4w9WgXcQ", "fp-1");

        assert!(store.get(&entry.video_id).await.unwrap().is_none());
        store.put(&entry.video_id, &entry).await.unwrap();

        let loaded = store.get(&entry.video_id).await.unwrap().unwrap();
        assert_eq!(loaded.transcript, entry.transcript);
        assert_eq!(loaded.chunks, entry.chunks);
        assert_eq!(loaded.embeddings, entry.embeddings);
        assert_eq!(loaded.topics, entry.topics);
        assert_eq!(loaded.fingerprint, "fp-1");
        assert!(store.contains(&entry.video_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_replaces_previous_entry() {
        let store = SqliteCacheStore::in_memory(None).unwrap();
        let mut entry = sample_entry("dQw4w9WgXcQ", "fp-1");
        store.put(&entry.video_id, &entry).await.unwrap();

        entry.chunks.truncate(1);
        entry.embeddings.truncate(1);
        entry.fingerprint = "fp-2".into();
        store.put(&entry.video_id, &entry).await.unwrap();

        let loaded = store.get(&entry.video_id).await.unwrap().unwrap();
        assert_eq!(loaded.chunks.len(), 1);
        assert_eq!(loaded.fingerprint, "fp-2");
    }

    #[tokio::test]
    async fn test_missing_chunk_rows_are_a_miss() {
        let store = SqliteCacheStore::in_memory(None).unwrap();
        let entry = sample_entry("dQw4w9WgXcQ", "fp");
        store.put(&entry.video_id, &entry).await.unwrap();

        store
            .lock()
            .unwrap()
            .execute("DELETE FROM chunks WHERE chunk_id = 1", [])
            .unwrap();

        assert!(store.get(&entry.video_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_json_is_a_miss() {
        let store = SqliteCacheStore::in_memory(None).unwrap();
        let entry = sample_entry("dQw4w9WgXcQ", "fp");
        store.put(&entry.video_id, &entry).await.unwrap();

        store
            .lock()
            .unwrap()
            .execute("UPDATE videos SET topics_json = '{not json'", [])
            .unwrap();

        assert!(store.get(&entry.video_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lru_eviction_spares_new_entry() {
        let store = SqliteCacheStore::in_memory(Some(2)).unwrap();
        let a = sample_entry("aaaaaaaaaaa", "fp");
        let b = sample_entry("bbbbbbbbbbb", "fp");
        let c = sample_entry("ccccccccccc", "fp");

        store.put(&a.video_id, &a).await.unwrap();
        store.put(&b.video_id, &b).await.unwrap();
        // Touch `a` so `b` becomes the least recently used.
        store.get(&a.video_id).await.unwrap().unwrap();
        store.put(&c.video_id, &c).await.unwrap();

        assert!(store.contains(&id("aaaaaaaaaaa")).await.unwrap());
        assert!(!store.contains(&id("bbbbbbbbbbb")).await.unwrap());
        assert!(store.contains(&id("ccccccccccc")).await.unwrap());

        let listed: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.video_id.to_string())
            .collect();
        assert_eq!(listed, vec!["ccccccccccc", "aaaaaaaaaaa"]);
    }

    #[tokio::test]
    async fn test_remove_and_file_backed_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");
        let entry = sample_entry("dQw4w9WgXcQ", "fp");

        {
            let store = SqliteCacheStore::new(&path, None).unwrap();
            store.put(&entry.video_id, &entry).await.unwrap();
        }

        let store = SqliteCacheStore::new(&path, None).unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert!(store.remove(&entry.video_id).await.unwrap());
        assert!(!store.remove(&entry.video_id).await.unwrap());
        assert!(store.get(&entry.video_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_rejects_mismatched_key() {
        let store = SqliteCacheStore::in_memory(None).unwrap();
        let entry = sample_entry("dQw4w9WgXcQ", "fp");
        let err = store.put(&id("aaaaaaaaaaa"), &entry).await.unwrap_err();
        assert!(matches!(err, TubeqaError::Cache(_)));
    }
}
