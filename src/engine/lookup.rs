//! The lookup engine: one matcher, one corpus, one consistency policy.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::{CorpusIndex, Matcher, Semantics, Strategy};
use crate::corpus::{Consistency, CorpusSnapshot, CorpusStore};
use crate::error::{Error, Result};
use crate::metrics::{Metrics, Timer};

/// Describes the index currently held by the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    /// Starts at 1, bumped by every build.
    pub generation: u64,
    pub built_at: DateTime<Utc>,
    pub line_count: usize,
}

struct CacheEntry {
    status: CacheStatus,
    index: Arc<dyn CorpusIndex>,
}

/// Answers membership queries against the corpus file.
///
/// Constructed once at startup and shared with every session through an
/// `Arc`. Under [`Consistency::Reread`] each query loads its own snapshot;
/// under [`Consistency::Cached`] (and for matchers that pin their index)
/// the first use builds an index that is reused until [`rebuild`].
///
/// [`rebuild`]: LookupEngine::rebuild
pub struct LookupEngine {
    matcher: Arc<dyn Matcher>,
    store: CorpusStore,
    consistency: Consistency,
    cache: RwLock<Option<Arc<CacheEntry>>>,
    rebuild_lock: Mutex<()>,
    generation: AtomicU64,
    metrics: Arc<Metrics>,
}

impl LookupEngine {
    /// Create an engine reporting into a private metrics collector.
    pub fn new(matcher: Arc<dyn Matcher>, store: CorpusStore, consistency: Consistency) -> Self {
        Self::with_metrics(matcher, store, consistency, Metrics::new())
    }

    pub fn with_metrics(
        matcher: Arc<dyn Matcher>,
        store: CorpusStore,
        consistency: Consistency,
        metrics: Arc<Metrics>,
    ) -> Self {
        if matcher.pins_index() && consistency == Consistency::Reread {
            warn!(
                "Strategy {} pins its index: corpus changes are not seen until a rebuild, \
                 even with reread on query",
                matcher.strategy()
            );
        }

        Self {
            matcher,
            store,
            consistency,
            cache: RwLock::new(None),
            rebuild_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            metrics,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.matcher.strategy()
    }

    pub fn semantics(&self) -> Semantics {
        self.matcher.semantics()
    }

    pub fn consistency(&self) -> Consistency {
        self.consistency
    }

    pub fn corpus_path(&self) -> &Path {
        self.store.path()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Whether queries are answered from the shared cached index.
    pub fn uses_cache(&self) -> bool {
        self.consistency == Consistency::Cached || self.matcher.pins_index()
    }

    /// Decide membership. Never fails: any error is logged and answered
    /// with `false`.
    pub async fn exists(&self, query: &str) -> bool {
        match self.lookup(query).await {
            Ok(found) => found,
            Err(e) => {
                error!("Lookup failed: {}", e);
                false
            }
        }
    }

    /// Decide membership, surfacing internal failures.
    ///
    /// An unreadable corpus is not an error here: it is answered as an
    /// empty corpus. Only failures of the engine itself (a panicked search
    /// task) come back as `Err`.
    pub async fn lookup(&self, query: &str) -> Result<bool> {
        let timer = Timer::start();
        let query = query.to_string();

        let found = if self.uses_cache() {
            let entry = match self.cached_entry().await {
                Ok(entry) => entry,
                Err(e @ Error::CorpusIo { .. }) => {
                    error!("{}; answering from an empty corpus", e);
                    return Ok(false);
                }
                Err(e) => return Err(e),
            };
            tokio::task::spawn_blocking(move || entry.index.contains(&query)).await?
        } else {
            let matcher = Arc::clone(&self.matcher);
            let store = self.store.clone();
            let metrics = Arc::clone(&self.metrics);
            tokio::task::spawn_blocking(move || {
                let snapshot = store.load().unwrap_or_else(|e| {
                    error!("{}; answering from an empty corpus", e);
                    metrics.inc_corpus_load_failures();
                    Arc::new(CorpusSnapshot::empty())
                });
                matcher.exists(&snapshot, &query)
            })
            .await?
        };

        debug!(
            "{} lookup ({}) took {:.3} ms",
            self.strategy(),
            self.consistency.as_str(),
            timer.elapsed_ms()
        );
        Ok(found)
    }

    /// Build the cached index now rather than on first query.
    ///
    /// Returns `None` when this engine does not cache.
    pub async fn warm(&self) -> Result<Option<CacheStatus>> {
        if !self.uses_cache() {
            return Ok(None);
        }
        let entry = self.cached_entry().await?;
        Ok(Some(entry.status.clone()))
    }

    /// Reload the corpus and replace the cached index.
    ///
    /// The new index is built before the swap, so queries keep being served
    /// from the previous generation meanwhile. Sessions that already hold
    /// the old entry finish against it.
    pub async fn rebuild(&self) -> Result<CacheStatus> {
        let _rebuilding = self.rebuild_lock.lock().await;

        let entry = self.build_entry().await?;
        let status = entry.status.clone();
        *self.cache.write().await = Some(entry);

        info!(
            "Rebuilt {} index: generation {}, {} lines",
            self.strategy(),
            status.generation,
            status.line_count
        );
        Ok(status)
    }

    /// The status of the cached index, if one has been built.
    pub async fn cache_status(&self) -> Option<CacheStatus> {
        self.cache
            .read()
            .await
            .as_ref()
            .map(|entry| entry.status.clone())
    }

    async fn cached_entry(&self) -> Result<Arc<CacheEntry>> {
        if let Some(entry) = self.cache.read().await.as_ref() {
            return Ok(Arc::clone(entry));
        }

        // Every build, first or rebuild, runs under the rebuild lock, so
        // generations are installed in the order they are assigned and
        // concurrent first queries build only once.
        let _building = self.rebuild_lock.lock().await;
        if let Some(entry) = self.cache.read().await.as_ref() {
            return Ok(Arc::clone(entry));
        }

        let entry = self.build_entry().await?;
        info!(
            "Built {} index: generation {}, {} lines",
            self.strategy(),
            entry.status.generation,
            entry.status.line_count
        );
        *self.cache.write().await = Some(Arc::clone(&entry));
        Ok(entry)
    }

    async fn build_entry(&self) -> Result<Arc<CacheEntry>> {
        let timer = Timer::start();
        let matcher = Arc::clone(&self.matcher);
        let store = self.store.clone();

        let built = tokio::task::spawn_blocking(move || {
            store.load().map(|snapshot| {
                let line_count = snapshot.len();
                (line_count, matcher.index(snapshot))
            })
        })
        .await?;

        let (line_count, index) = built.inspect_err(|e| {
            if matches!(e, Error::CorpusIo { .. }) {
                self.metrics.inc_corpus_load_failures();
            }
        })?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.metrics.inc_index_builds();
        debug!(
            "Index generation {} built in {:.3} ms",
            generation,
            timer.elapsed_ms()
        );

        Ok(Arc::new(CacheEntry {
            status: CacheStatus {
                generation,
                built_at: Utc::now(),
                line_count,
            },
            index: Arc::from(index),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn corpus(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn append(file: &mut NamedTempFile, line: &str) {
        writeln!(file, "{}", line).unwrap();
        file.flush().unwrap();
    }

    fn engine(file: &NamedTempFile, strategy: Strategy, consistency: Consistency) -> LookupEngine {
        LookupEngine::new(strategy.matcher(), CorpusStore::new(file.path()), consistency)
    }

    #[tokio::test]
    async fn test_reread_sees_appended_lines() {
        let mut file = corpus(&["foo"]);
        let engine = engine(&file, Strategy::HashSet, Consistency::Reread);

        assert!(!engine.exists("bar").await);
        append(&mut file, "bar");
        assert!(engine.exists("bar").await);
        assert!(engine.cache_status().await.is_none());
    }

    #[tokio::test]
    async fn test_cached_is_stale_until_rebuild() {
        let mut file = corpus(&["foo"]);
        let engine = engine(&file, Strategy::HashSet, Consistency::Cached);

        let status = engine.warm().await.unwrap().unwrap();
        assert_eq!(status.generation, 1);
        assert_eq!(status.line_count, 1);

        append(&mut file, "bar");
        assert!(!engine.exists("bar").await);

        let rebuilt = engine.rebuild().await.unwrap();
        assert_eq!(rebuilt.generation, 2);
        assert_eq!(rebuilt.line_count, 2);
        assert!(engine.exists("bar").await);
    }

    #[tokio::test]
    async fn test_trie_index_is_pinned_under_reread() {
        let mut file = corpus(&["foo"]);
        let engine = engine(&file, Strategy::Trie, Consistency::Reread);
        assert!(engine.uses_cache());

        assert!(engine.exists("foo").await);
        append(&mut file, "bar");
        assert!(!engine.exists("bar").await);

        engine.rebuild().await.unwrap();
        assert!(engine.exists("bar").await);
    }

    #[tokio::test]
    async fn test_missing_corpus_answers_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.txt");

        for consistency in [Consistency::Reread, Consistency::Cached] {
            let engine = LookupEngine::new(
                Strategy::Linear.matcher(),
                CorpusStore::new(&path),
                consistency,
            );
            assert!(!engine.exists("").await);
            assert!(!engine.lookup("foo").await.unwrap());
            assert_eq!(engine.metrics().snapshot().corpus_load_failures, 2);
        }
    }

    #[tokio::test]
    async fn test_failed_build_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.txt");
        let engine = LookupEngine::new(
            Strategy::HashSet.matcher(),
            CorpusStore::new(&path),
            Consistency::Cached,
        );

        assert!(!engine.exists("foo").await);
        assert!(engine.cache_status().await.is_none());

        std::fs::write(&path, "foo\n").unwrap();
        assert!(engine.exists("foo").await);
        assert_eq!(engine.cache_status().await.unwrap().generation, 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_queries_build_once() {
        let file = corpus(&["13;0;23;11;0;16;5;0;", "foo", "bar"]);
        let engine = Arc::new(engine(&file, Strategy::Trie, Consistency::Cached));

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    let query = if i % 2 == 0 { "foo" } else { "baz" };
                    (i, engine.exists(query).await)
                })
            })
            .collect();

        for handle in handles {
            let (i, found) = handle.await.unwrap();
            assert_eq!(found, i % 2 == 0);
        }
        assert_eq!(engine.metrics().snapshot().index_builds, 1);
        assert_eq!(engine.cache_status().await.unwrap().generation, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_generation_never_goes_backwards() {
        let file = corpus(&["foo", "bar"]);
        let engine = Arc::new(engine(&file, Strategy::HashSet, Consistency::Cached));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        engine.rebuild().await.unwrap();
                    } else {
                        assert!(engine.exists("foo").await);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        // The installed entry is always the most recent build.
        let builds = engine.metrics().snapshot().index_builds;
        assert_eq!(engine.cache_status().await.unwrap().generation, builds);
    }

    #[tokio::test]
    async fn test_reread_builds_an_index_per_query() {
        use std::sync::atomic::AtomicUsize;

        struct Counting {
            inner: Arc<dyn Matcher>,
            builds: Arc<AtomicUsize>,
        }

        impl Matcher for Counting {
            fn strategy(&self) -> Strategy {
                self.inner.strategy()
            }

            fn semantics(&self) -> Semantics {
                self.inner.semantics()
            }

            fn index(&self, snapshot: Arc<CorpusSnapshot>) -> Box<dyn CorpusIndex> {
                self.builds.fetch_add(1, Ordering::SeqCst);
                self.inner.index(snapshot)
            }
        }

        let file = corpus(&["foo"]);
        let builds = Arc::new(AtomicUsize::new(0));
        let engine = LookupEngine::new(
            Arc::new(Counting {
                inner: Strategy::HashSet.matcher(),
                builds: Arc::clone(&builds),
            }),
            CorpusStore::new(file.path()),
            Consistency::Reread,
        );

        assert!(engine.exists("foo").await);
        assert!(!engine.exists("bar").await);
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_warm_is_noop_without_cache() {
        let file = corpus(&["foo"]);
        let engine = engine(&file, Strategy::Linear, Consistency::Reread);
        assert!(!engine.uses_cache());
        assert!(engine.warm().await.unwrap().is_none());
    }
}
