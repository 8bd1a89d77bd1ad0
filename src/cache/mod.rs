//! Response cache — avoid burning generation calls on repeated prompts.
//!
//! Two independent SQLite tiers, no foreign keys, each TTL-swept on its own:
//! an exact tier keyed by a SHA-256 hash of `(prompt, context fingerprint,
//! style)`, and a semantic tier keyed by the prompt's extracted keyword set
//! and matched by Jaccard similarity. Lookups skip expired rows silently but
//! never delete them; deletion belongs to the scheduled sweep alone.
//!
//! Hits bump `hit_count` and `accessed_at` but never extend `expires_at`:
//! TTL runs from creation, so even a hot entry expires on schedule.

mod keywords;

pub use keywords::{extract_keywords, jaccard};

use crate::config::CacheConfig;
use crate::error::BotError;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use std::path::Path;
use uuid::Uuid;

pub struct ResponseCache {
    conn: Mutex<Connection>,
    ttl_ms: i64,
    similarity_threshold: f64,
    keyword_top_n: usize,
}

/// Counters surfaced by `purrsona cache stats`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub exact_entries: usize,
    pub semantic_entries: usize,
    pub total_hits: u64,
}

impl ResponseCache {
    /// Open (or create) the cache database under the workspace. Lives in its
    /// own file so it can be wiped without touching anything else.
    pub fn open(workspace_dir: &Path, config: &CacheConfig) -> Result<Self, BotError> {
        let db_dir = workspace_dir.join("cache");
        std::fs::create_dir_all(&db_dir)
            .map_err(|e| BotError::config(format!("cannot create cache dir: {e}")))?;
        let db_path = db_dir.join("responses.db");

        let conn = Connection::open(&db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             PRAGMA temp_store   = MEMORY;",
        )?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS exact_cache (
                prompt_hash   TEXT PRIMARY KEY,
                prompt_text   TEXT NOT NULL,
                response_text TEXT NOT NULL,
                context_hash  TEXT NOT NULL,
                style         TEXT NOT NULL,
                created_at    INTEGER NOT NULL,
                expires_at    INTEGER NOT NULL,
                accessed_at   INTEGER NOT NULL,
                hit_count     INTEGER NOT NULL DEFAULT 1
            );
            CREATE INDEX IF NOT EXISTS idx_exact_expires ON exact_cache(expires_at);

            CREATE TABLE IF NOT EXISTS semantic_cache (
                id            TEXT PRIMARY KEY,
                keywords      TEXT NOT NULL,
                response_text TEXT NOT NULL,
                created_at    INTEGER NOT NULL,
                expires_at    INTEGER NOT NULL,
                hit_count     INTEGER NOT NULL DEFAULT 1
            );
            CREATE INDEX IF NOT EXISTS idx_semantic_expires ON semantic_cache(expires_at);",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            ttl_ms: i64::from(config.ttl_hours) * 3_600_000,
            similarity_threshold: config.semantic_similarity_threshold,
            keyword_top_n: config.keyword_top_n,
        })
    }

    /// Stable key over the full request triple.
    pub fn cache_key(prompt: &str, context_hash: &str, style: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(prompt.as_bytes());
        hasher.update(b"|");
        hasher.update(context_hash.as_bytes());
        hasher.update(b"|");
        hasher.update(style.as_bytes());
        format!("{:064x}", hasher.finalize())
    }

    /// Consult the exact tier, then the semantic tier. `None` is a miss.
    pub fn lookup(
        &self,
        prompt: &str,
        context_hash: &str,
        style: &str,
        now_ms: i64,
    ) -> Result<Option<String>, BotError> {
        let conn = self.conn.lock();
        let key = Self::cache_key(prompt, context_hash, style);

        let exact: Option<String> = conn
            .query_row(
                "SELECT response_text FROM exact_cache
                 WHERE prompt_hash = ?1 AND expires_at > ?2",
                params![key, now_ms],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(response) = exact {
            conn.execute(
                "UPDATE exact_cache
                 SET hit_count = hit_count + 1, accessed_at = ?1
                 WHERE prompt_hash = ?2",
                params![now_ms, key],
            )?;
            tracing::debug!(tier = "exact", "response cache hit");
            return Ok(Some(response));
        }

        self.lookup_semantic(&conn, prompt, now_ms)
    }

    /// First non-expired candidate whose keyword set clears the similarity
    /// threshold, visiting candidates by descending hit count.
    fn lookup_semantic(
        &self,
        conn: &Connection,
        prompt: &str,
        now_ms: i64,
    ) -> Result<Option<String>, BotError> {
        let query_set = keywords::extract_keywords(prompt, self.keyword_top_n);
        if query_set.is_empty() {
            return Ok(None);
        }

        let mut stmt = conn.prepare(
            "SELECT id, keywords, response_text FROM semantic_cache
             WHERE expires_at > ?1
             ORDER BY hit_count DESC, created_at DESC",
        )?;
        let rows = stmt.query_map(params![now_ms], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        for row in rows {
            let (id, joined, response) = row?;
            let candidate_set = keywords::split_keywords(&joined);
            if candidate_set.intersection(&query_set).next().is_none() {
                continue;
            }
            let similarity = keywords::jaccard(&query_set, &candidate_set);
            if similarity >= self.similarity_threshold {
                conn.execute(
                    "UPDATE semantic_cache SET hit_count = hit_count + 1 WHERE id = ?1",
                    params![id],
                )?;
                tracing::debug!(tier = "semantic", similarity, "response cache hit");
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    /// Store a generated reply in both tiers. TTL runs from `now_ms`.
    pub fn store(
        &self,
        prompt: &str,
        context_hash: &str,
        style: &str,
        response: &str,
        now_ms: i64,
    ) -> Result<(), BotError> {
        let conn = self.conn.lock();
        let key = Self::cache_key(prompt, context_hash, style);
        let expires = now_ms + self.ttl_ms;

        conn.execute(
            "INSERT OR REPLACE INTO exact_cache
             (prompt_hash, prompt_text, response_text, context_hash, style,
              created_at, expires_at, accessed_at, hit_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?6, 1)",
            params![key, prompt, response, context_hash, style, now_ms, expires],
        )?;

        let keyword_set = keywords::extract_keywords(prompt, self.keyword_top_n);
        if !keyword_set.is_empty() {
            // No uniqueness constraint on keyword sets: near-duplicate
            // prompts may each leave a row, and lookup prefers the hotter one.
            conn.execute(
                "INSERT INTO semantic_cache
                 (id, keywords, response_text, created_at, expires_at, hit_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1)",
                params![
                    Uuid::new_v4().to_string(),
                    keywords::join_keywords(&keyword_set),
                    response,
                    now_ms,
                    expires
                ],
            )?;
        }
        Ok(())
    }

    /// Delete rows past their expiry, both tiers. Called only by the
    /// scheduled sweep job, never from the lookup path.
    pub fn sweep(&self, now_ms: i64) -> Result<(usize, usize), BotError> {
        let conn = self.conn.lock();
        let exact = conn.execute("DELETE FROM exact_cache WHERE expires_at < ?1", params![now_ms])?;
        let semantic = conn.execute(
            "DELETE FROM semantic_cache WHERE expires_at < ?1",
            params![now_ms],
        )?;
        Ok((exact, semantic))
    }

    pub fn stats(&self) -> Result<CacheStats, BotError> {
        let conn = self.conn.lock();
        let exact_entries: i64 =
            conn.query_row("SELECT COUNT(*) FROM exact_cache", [], |row| row.get(0))?;
        let semantic_entries: i64 =
            conn.query_row("SELECT COUNT(*) FROM semantic_cache", [], |row| row.get(0))?;
        let total_hits: i64 = conn.query_row(
            "SELECT COALESCE(SUM(hit_count), 0)
               FROM (SELECT hit_count FROM exact_cache
                     UNION ALL
                     SELECT hit_count FROM semantic_cache)",
            [],
            |row| row.get(0),
        )?;
        Ok(CacheStats {
            exact_entries: exact_entries as usize,
            semantic_entries: semantic_entries as usize,
            total_hits: total_hits as u64,
        })
    }

    /// Wipe both tiers (`purrsona cache clear`).
    pub fn clear(&self) -> Result<usize, BotError> {
        let conn = self.conn.lock();
        let exact = conn.execute("DELETE FROM exact_cache", [])?;
        let semantic = conn.execute("DELETE FROM semantic_cache", [])?;
        Ok(exact + semantic)
    }

    /// Exact-tier hit count for a triple, for tests and stats drilling.
    pub fn exact_hit_count(
        &self,
        prompt: &str,
        context_hash: &str,
        style: &str,
    ) -> Result<Option<u64>, BotError> {
        let conn = self.conn.lock();
        let key = Self::cache_key(prompt, context_hash, style);
        let count: Option<i64> = conn
            .query_row(
                "SELECT hit_count FROM exact_cache WHERE prompt_hash = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.map(|c| c as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HOUR_MS: i64 = 3_600_000;

    fn temp_cache(config: CacheConfig) -> (TempDir, ResponseCache) {
        let tmp = TempDir::new().unwrap();
        let cache = ResponseCache::open(tmp.path(), &config).unwrap();
        (tmp, cache)
    }

    fn default_cache() -> (TempDir, ResponseCache) {
        temp_cache(CacheConfig::default())
    }

    #[test]
    fn cache_key_deterministic_and_sensitive() {
        let k1 = ResponseCache::cache_key("prompt", "ctx", "style");
        let k2 = ResponseCache::cache_key("prompt", "ctx", "style");
        assert_eq!(k1, k2);
        assert_eq!(k1.len(), 64);
        assert_ne!(k1, ResponseCache::cache_key("prompt", "ctx", "other"));
        assert_ne!(k1, ResponseCache::cache_key("prompt", "other", "style"));
    }

    #[test]
    fn store_then_lookup_round_trip() {
        let (_tmp, cache) = default_cache();
        cache.store("what is rust", "ctx", "plain", "a language", 0).unwrap();
        let hit = cache.lookup("what is rust", "ctx", "plain", 1000).unwrap();
        assert_eq!(hit.as_deref(), Some("a language"));
    }

    #[test]
    fn expired_entry_misses_without_sweep() {
        let config = CacheConfig { ttl_hours: 1, ..CacheConfig::default() };
        let (_tmp, cache) = temp_cache(config);
        cache.store("hello there friend", "ctx", "plain", "hi", 0).unwrap();
        assert!(cache.lookup("hello there friend", "ctx", "plain", HOUR_MS - 1).unwrap().is_some());
        // Past expiry the row still exists but is skipped silently.
        assert!(cache.lookup("hello there friend", "ctx", "plain", HOUR_MS + 1).unwrap().is_none());
        let stats = cache.stats().unwrap();
        assert_eq!(stats.exact_entries, 1);
    }

    #[test]
    fn hit_count_goes_from_one_to_two_on_second_submission() {
        let (_tmp, cache) = default_cache();
        cache.store("same prompt words", "ctx", "plain", "reply", 0).unwrap();
        assert_eq!(cache.exact_hit_count("same prompt words", "ctx", "plain").unwrap(), Some(1));
        cache.lookup("same prompt words", "ctx", "plain", 10).unwrap();
        assert_eq!(cache.exact_hit_count("same prompt words", "ctx", "plain").unwrap(), Some(2));
    }

    #[test]
    fn hits_never_extend_expiry() {
        let config = CacheConfig { ttl_hours: 1, ..CacheConfig::default() };
        let (_tmp, cache) = temp_cache(config);
        cache.store("evergreen question words", "ctx", "plain", "answer", 0).unwrap();
        // Hammer the entry right up to the deadline.
        for t in (0..HOUR_MS).step_by(600_000) {
            assert!(cache.lookup("evergreen question words", "ctx", "plain", t).unwrap().is_some());
        }
        assert!(cache.lookup("evergreen question words", "ctx", "plain", HOUR_MS + 1).unwrap().is_none());
    }

    #[test]
    fn semantic_tier_serves_similar_prompt() {
        let config = CacheConfig { keyword_top_n: 12, ..CacheConfig::default() };
        let (_tmp, cache) = temp_cache(config);
        // 10 keywords; the second prompt shares 9 of them: Jaccard 0.9.
        let first = "alpha bravo charlie delta echo foxtrot golf hotel india juliet";
        let second = "alpha bravo charlie delta echo foxtrot golf hotel india";
        cache.store(first, "ctx", "plain", "cached reply", 0).unwrap();
        let hit = cache.lookup(second, "other-ctx", "plain", 1000).unwrap();
        assert_eq!(hit.as_deref(), Some("cached reply"));
    }

    #[test]
    fn semantic_tier_rejects_below_threshold() {
        let (_tmp, cache) = default_cache();
        cache.store("weather forecast tokyo sunny tomorrow", "ctx", "plain", "sunny", 0).unwrap();
        let miss = cache.lookup("compile error rust borrow checker", "ctx", "plain", 1000).unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn semantic_ties_prefer_higher_hit_count() {
        let config = CacheConfig { keyword_top_n: 12, ..CacheConfig::default() };
        let (_tmp, cache) = temp_cache(config);
        let prompt = "alpha bravo charlie delta echo foxtrot";
        cache.store(prompt, "ctx-a", "plain", "colder entry", 0).unwrap();
        cache.store(prompt, "ctx-b", "plain", "hotter entry", 10).unwrap();
        // Warm up the second row through the semantic tier (exact keys differ
        // by context, so force a semantic path with a different context).
        for t in 20..25 {
            let _ = cache.lookup(prompt, &format!("ctx-{t}"), "plain", t).unwrap();
        }
        // Both rows match equally well; the hotter one wins the tie.
        let hit = cache.lookup(prompt, "ctx-z", "plain", 100).unwrap();
        assert_eq!(hit.as_deref(), Some("hotter entry"));
    }

    #[test]
    fn sweep_deletes_only_expired_rows() {
        let config = CacheConfig { ttl_hours: 1, ..CacheConfig::default() };
        let (_tmp, cache) = temp_cache(config);
        cache.store("old prompt words here", "ctx", "plain", "old", 0).unwrap();
        cache.store("new prompt words here", "ctx", "plain", "new", HOUR_MS).unwrap();
        let (exact, semantic) = cache.sweep(HOUR_MS + 1).unwrap();
        assert_eq!(exact, 1);
        assert_eq!(semantic, 1);
        let stats = cache.stats().unwrap();
        assert_eq!(stats.exact_entries, 1);
        assert_eq!(stats.semantic_entries, 1);
    }

    #[test]
    fn clear_wipes_both_tiers() {
        let (_tmp, cache) = default_cache();
        for i in 0..5 {
            cache.store(&format!("prompt number {i} words"), "ctx", "plain", "r", 0).unwrap();
        }
        assert!(cache.clear().unwrap() >= 10);
        let stats = cache.stats().unwrap();
        assert_eq!(stats.exact_entries, 0);
        assert_eq!(stats.semantic_entries, 0);
    }

    #[test]
    fn unicode_prompts_round_trip() {
        let (_tmp, cache) = default_cache();
        cache.store("日本語のテスト prompt", "ctx", "plain", "はい、できます", 0).unwrap();
        let hit = cache.lookup("日本語のテスト prompt", "ctx", "plain", 1).unwrap();
        assert_eq!(hit.as_deref(), Some("はい、できます"));
    }
}
