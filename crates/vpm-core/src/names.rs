//! Channel display names drawn from a locally cached word queue.
//!
//! `next_name()` never touches the network: it pops from the queue and, when
//! the queue runs low, kicks off a background refill from the word-list
//! service. The refill is not awaited by the caller; its outcome is only seen
//! by later pops.

use std::{
    collections::{HashSet, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, OnceLock,
    },
    time::Duration,
};

use rand::Rng;
use regex::Regex;
use tokio::task::JoinHandle;

use crate::{errors::Error, ports::WordSource, store::DurableStore, Result};

pub const NAME_CACHE_KEY: &str = "dynamic_voice/name_cache";

#[derive(Clone, Copy, Debug)]
pub struct NameSupplierConfig {
    /// Words requested per refill.
    pub batch_size: usize,
    /// A refill starts once the queue drops below this length.
    pub low_water: usize,
    pub fetch_timeout: Duration,
}

impl Default for NameSupplierConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            low_water: 5,
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
pub struct NameSupplier {
    inner: Arc<NameInner>,
}

struct NameInner {
    cfg: NameSupplierConfig,
    source: Arc<dyn WordSource>,
    store: Arc<dyn DurableStore>,
    // Guards every pop/append; independent of the pool lock.
    queue: Mutex<VecDeque<String>>,
    in_flight: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl NameSupplier {
    pub fn new(
        cfg: NameSupplierConfig,
        source: Arc<dyn WordSource>,
        store: Arc<dyn DurableStore>,
    ) -> Self {
        let queue = load_queue(store.as_ref());
        Self {
            inner: Arc::new(NameInner {
                cfg,
                source,
                store,
                queue: Mutex::new(queue),
                in_flight: AtomicBool::new(false),
                task: Mutex::new(None),
            }),
        }
    }

    /// Next unused name token, or a random numeric fallback when the cache is
    /// empty. Never blocks on I/O beyond the local write-through.
    pub fn next_name(&self) -> String {
        let (popped, remaining) = {
            let mut queue = self.inner.lock_queue();
            let popped = queue.pop_front();
            if popped.is_some() {
                self.inner.persist(&queue);
            }
            (popped, queue.len())
        };

        if remaining < self.inner.cfg.low_water {
            self.trigger_replenish();
        }

        match popped {
            Some(name) => name,
            None => {
                let n: u32 = rand::thread_rng().gen_range(1000..10_000);
                tracing::debug!("name cache empty, using fallback {n}");
                n.to_string()
            }
        }
    }

    pub fn cached(&self) -> usize {
        self.inner.lock_queue().len()
    }

    /// Start a background refill unless one is already running.
    ///
    /// Returns whether a task was spawned. Outside a tokio runtime this is a
    /// no-op.
    pub fn trigger_replenish(&self) -> bool {
        if self.inner.in_flight.swap(true, Ordering::SeqCst) {
            return false;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.inner.in_flight.store(false, Ordering::SeqCst);
            tracing::warn!("no async runtime available, skipping name replenishment");
            return false;
        };

        let inner = self.inner.clone();
        let task = handle.spawn(async move {
            match inner.replenish().await {
                Ok(added) => tracing::info!(added, "replenished channel name cache"),
                Err(e) => tracing::warn!("name replenishment failed: {e}"),
            }
            inner.in_flight.store(false, Ordering::SeqCst);
        });

        let mut slot = self.inner.task.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(task);
        true
    }

    /// Fetch one batch in the foreground (used to warm the cache at startup).
    pub async fn replenish(&self) -> Result<usize> {
        self.inner.replenish().await
    }

    /// Wait for an in-flight background refill, if any.
    pub async fn wait_idle(&self) {
        let task = {
            let mut slot = self.inner.task.lock().unwrap_or_else(|e| e.into_inner());
            slot.take()
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!("name replenishment task aborted: {e}");
            }
        }
    }
}

impl NameInner {
    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, queue: &VecDeque<String>) {
        let names: Vec<&String> = queue.iter().collect();
        if let Err(e) = self.store.save(NAME_CACHE_KEY, &names) {
            tracing::warn!("failed to persist name cache: {e}");
        }
    }

    async fn replenish(&self) -> Result<usize> {
        let fetched = tokio::time::timeout(
            self.cfg.fetch_timeout,
            self.source.fetch_words(self.cfg.batch_size),
        )
        .await
        .map_err(|_| {
            Error::Timeout(format!(
                "word list fetch exceeded {}ms",
                self.cfg.fetch_timeout.as_millis()
            ))
        })??;

        let mut queue = self.lock_queue();
        let mut seen: HashSet<String> = queue.iter().cloned().collect();
        let mut added = 0usize;
        for word in fetched {
            let Some(word) = sanitize_word(&word) else {
                continue;
            };
            if seen.insert(word.clone()) {
                queue.push_back(word);
                added += 1;
            }
        }

        if added > 0 {
            self.persist(&queue);
        }
        Ok(added)
    }
}

/// Trim a fetched token and reject anything that is not a plain word.
pub fn sanitize_word(raw: &str) -> Option<String> {
    static WORD_RE: OnceLock<Regex> = OnceLock::new();
    let re = WORD_RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z'-]{0,31}$").expect("valid regex"));

    let word = raw.trim();
    re.is_match(word).then(|| word.to_string())
}

fn load_queue(store: &dyn DurableStore) -> VecDeque<String> {
    match store.load::<Vec<String>>(NAME_CACHE_KEY) {
        Ok(Some(names)) => {
            let mut seen = HashSet::new();
            names
                .into_iter()
                .filter_map(|n| sanitize_word(&n))
                .filter(|n| seen.insert(n.clone()))
                .collect()
        }
        Ok(None) => VecDeque::new(),
        Err(e) => {
            tracing::warn!("name cache unreadable, starting empty: {e}");
            VecDeque::new()
        }
    }
}
