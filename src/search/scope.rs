//! Scope resolution
//!
//! Turns a logical [`Scope`] into the concrete document sets used to filter
//! search hits. Resolved sets are cached per canonical scope key for a fixed
//! TTL. Entries are immutable `Arc` snapshots replaced wholesale; expiry is
//! checked on read against an injectable [`Clock`]. Writes to the store do not
//! invalidate the cache, call [`ScopeResolver::invalidate_all`] for that.

use rusqlite::{params, Connection};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::core::model::{CollectionId, DocumentId, Scope, ScopeKey, TopicId};
use crate::error::{Error, Result};
use crate::storage::Store;

/// Time source for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
///
/// Lets callers step the scope cache TTL deterministically, e.g. in tests of
/// code built on [`ScopeResolver::with_clock`].
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.start + offset
    }
}

/// Concrete document sets for one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSets {
    /// Members of the scope's collections when it names any, otherwise the
    /// project's documents plus members of the project's collections.
    pub members: HashSet<DocumentId>,
    /// Documents linked to an included topic; `None` when no topic was requested.
    pub topic_linked: Option<HashSet<DocumentId>>,
    pub excluded: HashSet<DocumentId>,
    /// Documents linked to a shared topic (only when the scope asks for them).
    pub shared: HashSet<DocumentId>,
    pub shared_topics: Vec<TopicId>,
}

impl ScopeSets {
    pub fn admits(&self, doc: DocumentId) -> bool {
        if self.excluded.contains(&doc) {
            return false;
        }
        let in_topics = self
            .topic_linked
            .as_ref()
            .map_or(true, |linked| linked.contains(&doc));
        (self.members.contains(&doc) && in_topics) || self.shared.contains(&doc)
    }

    /// True when no document can pass the filter.
    pub fn is_empty(&self) -> bool {
        let members_empty = match &self.topic_linked {
            Some(linked) => linked.is_empty() || self.members.is_empty(),
            None => self.members.is_empty(),
        };
        members_empty && self.shared.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

struct CacheEntry {
    sets: Arc<ScopeSets>,
    inserted_at: Instant,
}

pub struct ScopeResolver {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    cache: RwLock<HashMap<ScopeKey, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ScopeResolver {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            cache: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Resolve `scope`, serving a cached snapshot while it is younger than the TTL.
    pub fn resolve(&self, store: &Store, scope: &Scope) -> Result<Arc<ScopeSets>> {
        let key = scope.key();
        let now = self.clock.now();

        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = cache.get(&key) {
                if now.saturating_duration_since(entry.inserted_at) < self.ttl {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(project = %key.project, "scope cache hit");
                    return Ok(Arc::clone(&entry.sets));
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let sets = Arc::new(load_sets(store.conn(), &key).map_err(Error::ScopeResolution)?);
        debug!(
            project = %key.project,
            members = sets.members.len(),
            excluded = sets.excluded.len(),
            shared = sets.shared.len(),
            "scope resolved"
        );

        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.insert(
            key,
            CacheEntry {
                sets: Arc::clone(&sets),
                inserted_at: now,
            },
        );
        Ok(sets)
    }

    /// Drop every cached scope.
    pub fn invalidate_all(&self) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.cache.read().unwrap_or_else(|e| e.into_inner()).len();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries,
        }
    }
}

fn load_sets(conn: &Connection, key: &ScopeKey) -> rusqlite::Result<ScopeSets> {
    let members = if key.collections.is_empty() {
        collect_ids(
            conn,
            r#"
            SELECT id FROM documents WHERE project = ?1
            UNION
            SELECT cm.document_id
            FROM collection_members cm
            JOIN collections c ON c.id = cm.collection_id
            WHERE c.project = ?1
            "#,
            params![key.project],
        )?
    } else {
        collection_members(conn, &key.project, &key.collections)?
    };

    let topic_linked = if key.include_topics.is_empty() {
        None
    } else {
        Some(linked_to(conn, &key.include_topics)?)
    };
    let excluded = linked_to(conn, &key.exclude_topics)?;

    let (shared, shared_topics) = if key.include_shared {
        let mut stmt = conn.prepare("SELECT id FROM topics WHERE shared = 1 ORDER BY id")?;
        let topics = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<TopicId>>>()?;
        (linked_to(conn, &topics)?, topics)
    } else {
        (HashSet::new(), Vec::new())
    };

    Ok(ScopeSets {
        members,
        topic_linked,
        excluded,
        shared,
        shared_topics,
    })
}

/// Members of the named collections; collections of other projects match nothing.
fn collection_members(
    conn: &Connection,
    project: &str,
    collections: &[CollectionId],
) -> rusqlite::Result<HashSet<DocumentId>> {
    let mut out = HashSet::new();
    let mut stmt = conn.prepare_cached(
        r#"
        SELECT cm.document_id
        FROM collection_members cm
        JOIN collections c ON c.id = cm.collection_id
        WHERE cm.collection_id = ?1 AND c.project = ?2
        "#,
    )?;
    for collection in collections {
        let rows = stmt.query_map(params![collection, project], |row| row.get(0))?;
        for row in rows {
            out.insert(row?);
        }
    }
    Ok(out)
}

fn linked_to(conn: &Connection, topics: &[TopicId]) -> rusqlite::Result<HashSet<DocumentId>> {
    let mut out = HashSet::new();
    let mut stmt = conn.prepare_cached("SELECT document_id FROM topic_links WHERE topic_id = ?1")?;
    for topic in topics {
        let rows = stmt.query_map(params![topic], |row| row.get(0))?;
        for row in rows {
            out.insert(row?);
        }
    }
    Ok(out)
}

fn collect_ids(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> rusqlite::Result<HashSet<DocumentId>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| row.get(0))?;
    rows.collect()
}
