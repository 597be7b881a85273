//! Corpus file watcher for automatic index rebuilds.
//!
//! Uses the `notify` crate to watch the directory holding the corpus file
//! and calls [`LookupEngine::rebuild`] once changes settle. Only useful
//! when the engine serves a cached or pinned index.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::engine::LookupEngine;
use crate::error::{Error, Result};

/// Default quiet period before a rebuild.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Watches the corpus file and rebuilds the engine's cached index.
pub struct CorpusWatcher {
    corpus: PathBuf,
    watcher: Option<RecommendedWatcher>,
    rebuilder: Option<JoinHandle<()>>,
    dirty: Arc<AtomicBool>,
    debounce: Duration,
}

impl CorpusWatcher {
    /// Create a new watcher for `corpus`.
    pub fn new(corpus: impl Into<PathBuf>, debounce: Duration) -> Self {
        Self {
            corpus: corpus.into(),
            watcher: None,
            rebuilder: None,
            dirty: Arc::new(AtomicBool::new(false)),
            debounce,
        }
    }

    /// Start watching and spawn the rebuild task.
    pub fn start(&mut self, engine: Arc<LookupEngine>) -> Result<()> {
        let corpus = absolute(&self.corpus)?;
        let directory = corpus
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::Config(format!("{:?} has no parent directory", corpus)))?;

        let dirty = Arc::clone(&self.dirty);
        let target = corpus.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let relevant = matches!(
                        event.kind,
                        notify::EventKind::Create(_)
                            | notify::EventKind::Modify(_)
                            | notify::EventKind::Remove(_)
                    ) && event.paths.iter().any(|p| p == &target);

                    if relevant {
                        dirty.store(true, Ordering::Release);
                    }
                }
                Err(e) => {
                    error!("Watch error: {:?}", e);
                }
            },
            Config::default(),
        )
        .map_err(|e| Error::Internal(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Internal(format!("Failed to watch directory: {}", e)))?;
        self.watcher = Some(watcher);

        let dirty = Arc::clone(&self.dirty);
        let debounce = self.debounce;
        self.rebuilder = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(debounce).await;

                if !dirty.swap(false, Ordering::AcqRel) {
                    continue;
                }
                debug!("Corpus changed, rebuilding index");
                if let Err(e) = engine.rebuild().await {
                    warn!("Rebuild after corpus change failed: {}", e);
                }
            }
        }));

        info!("Corpus watcher started for {:?}", corpus);
        Ok(())
    }

    /// Stop watching and cancel the rebuild task.
    pub fn stop(&mut self) {
        self.watcher = None;
        if let Some(rebuilder) = self.rebuilder.take() {
            rebuilder.abort();
        }
        info!("Corpus watcher stopped");
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
