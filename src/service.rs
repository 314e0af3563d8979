//! Service wiring: pool + queue + notification dispatch.
//!
//! [`ThumbnailService`] is the explicitly constructed owner of the cache pool
//! and the work queue (no process-wide singletons); whoever creates artifact
//! handles holds a service and drops it at session end. It also keeps the
//! in-flight map that de-duplicates concurrent requests for one key: a second
//! request attaches to the running unit's completion instead of decoding the
//! source a second time.

use crate::artifact::ThumbnailArtifact;
use crate::cancel::CancellationToken;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::pipeline::{self, SourceFactory};
use crate::pool::CachePool;
use crate::queue::{WorkQueue, WorkUnit};
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

/// Scheduling context for artifact mutation and observer notification.
///
/// The worker loop never touches artifact state directly; it hands a closure
/// to the dispatcher, which must run it on one well-defined context so
/// observers never see torn state. UI embedders marshal onto their event
/// loop; [`InlineDispatcher`] simply runs on the calling (worker) thread.
pub trait NotifyDispatcher: Send + Sync {
    fn dispatch(&self, task: Box<dyn FnOnce() + Send>);
}

/// Dispatcher that runs tasks inline on the worker thread. Suitable for
/// headless use and tests; UI hosts should marshal instead.
pub struct InlineDispatcher;

impl NotifyDispatcher for InlineDispatcher {
    fn dispatch(&self, task: Box<dyn FnOnce() + Send>) {
        task();
    }
}

/// Owns the cache pool, the single-flight queue, and the in-flight map.
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct ThumbnailService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    pool: CachePool,
    queue: WorkQueue,
    dispatcher: Arc<dyn NotifyDispatcher>,
    /// Key → artifacts awaiting the unit already queued or running for it.
    in_flight: Mutex<HashMap<String, Vec<Weak<ThumbnailArtifact>>>>,
    thumbnail_edge: u32,
}

impl ThumbnailService {
    /// Opens the cache and builds a service delivering notifications inline.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_dispatcher(config, Arc::new(InlineDispatcher))
    }

    /// Opens the cache with a caller-supplied notification dispatcher.
    pub fn with_dispatcher(
        config: CacheConfig,
        dispatcher: Arc<dyn NotifyDispatcher>,
    ) -> Result<Self> {
        let pool = CachePool::new(&config.cache_root, config.capacity_bytes)?;
        Ok(Self {
            inner: Arc::new(ServiceInner {
                pool,
                queue: WorkQueue::new(),
                dispatcher,
                in_flight: Mutex::new(HashMap::new()),
                thumbnail_edge: config.thumbnail_edge,
            }),
        })
    }

    /// Creates an artifact handle for `key`. No normalization is applied to
    /// the key; callers canonicalize paths before use.
    pub fn artifact(&self, key: impl Into<String>, source: SourceFactory) -> Arc<ThumbnailArtifact> {
        Arc::new(ThumbnailArtifact::new(key.into(), source, self.clone()))
    }

    /// The underlying cache pool, for direct lookups and maintenance.
    pub fn pool(&self) -> &CachePool {
        &self.inner.pool
    }

    /// Blocks until all queued generation work has drained.
    pub fn wait_idle(&self) {
        self.inner.queue.wait_idle();
    }

    /// Enqueues generation for `artifact`, or attaches it to the unit
    /// already in flight for the same key.
    pub(crate) fn request(&self, artifact: &Arc<ThumbnailArtifact>, token: CancellationToken) {
        let key = artifact.key().to_string();
        {
            let mut in_flight = self.inner.in_flight.lock().unwrap();
            if let Some(waiters) = in_flight.get_mut(&key) {
                waiters.push(Arc::downgrade(artifact));
                debug!("request for {} attached to in-flight unit", key);
                return;
            }
            in_flight.insert(key.clone(), vec![Arc::downgrade(artifact)]);
        }

        let inner = Arc::clone(&self.inner);
        let source = artifact.source();
        let job_key = key.clone();
        self.inner.queue.enqueue(WorkUnit::new(
            key,
            token,
            Box::new(move |token| run_generation(&inner, &job_key, &source, token)),
        ));
    }
}

/// Runs one generation unit on the worker loop, then hands terminal delivery
/// for every waiter to the dispatcher.
fn run_generation(
    inner: &Arc<ServiceInner>,
    key: &str,
    source: &SourceFactory,
    token: &CancellationToken,
) -> Result<()> {
    let outcome = pipeline::produce(&inner.pool, key, source, inner.thumbnail_edge, token);

    let waiters = inner
        .in_flight
        .lock()
        .unwrap()
        .remove(key)
        .unwrap_or_default();

    match outcome {
        Ok(thumbnail) => {
            inner.dispatcher.dispatch(Box::new(move || {
                for waiter in waiters {
                    if let Some(artifact) = waiter.upgrade() {
                        artifact.complete(thumbnail.clone());
                    }
                }
            }));
            Ok(())
        }
        Err(err) => {
            inner.dispatcher.dispatch(Box::new(move || {
                for waiter in waiters {
                    if let Some(artifact) = waiter.upgrade() {
                        artifact.reset_pending();
                    }
                }
            }));
            Err(err)
        }
    }
}
