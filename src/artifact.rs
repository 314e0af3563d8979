//! Consumer-facing thumbnail handle with change notification.
//!
//! A [`ThumbnailArtifact`] is the lazily generated, observable value the UI
//! layer binds to. Reading [`ThumbnailArtifact::image`] never blocks: a miss
//! triggers background generation as a side effect and returns the current
//! (possibly absent) value; observers re-read once they are notified.

use crate::cancel::CancellationToken;
use crate::pipeline::{SourceFactory, Thumbnail};
use crate::service::ThumbnailService;
use log::debug;
use std::sync::{Arc, Mutex};

/// Identifies a property named in a change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactProperty {
    /// The thumbnail value itself changed.
    Image,
    /// The loaded flag transitioned.
    Loaded,
}

/// Handle returned by [`ThumbnailArtifact::subscribe`], used to unsubscribe.
pub type SubscriptionId = u64;

type Observer = Arc<dyn Fn(ArtifactProperty) + Send + Sync>;

struct Observers {
    next_id: SubscriptionId,
    list: Vec<(SubscriptionId, Observer)>,
}

struct ArtifactState {
    image: Option<Thumbnail>,
    loaded: bool,
    /// A unit for this artifact is queued or running.
    pending: bool,
    token: CancellationToken,
}

/// Lazily generated, cacheable thumbnail with subscribe/unsubscribe change
/// notification. Created via [`ThumbnailService::artifact`].
pub struct ThumbnailArtifact {
    key: String,
    source: SourceFactory,
    service: ThumbnailService,
    state: Mutex<ArtifactState>,
    observers: Mutex<Observers>,
}

impl ThumbnailArtifact {
    pub(crate) fn new(key: String, source: SourceFactory, service: ThumbnailService) -> Self {
        Self {
            key,
            source,
            service,
            state: Mutex::new(ArtifactState {
                image: None,
                loaded: false,
                pending: false,
                token: CancellationToken::new(),
            }),
            observers: Mutex::new(Observers {
                next_id: 0,
                list: Vec::new(),
            }),
        }
    }

    /// The logical cache key this artifact renders.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn source(&self) -> SourceFactory {
        Arc::clone(&self.source)
    }

    /// Current thumbnail, if generated. When absent and no request is in
    /// flight, requests generation as a side effect; callers re-read after a
    /// change notification rather than blocking here.
    pub fn image(self: &Arc<Self>) -> Option<Thumbnail> {
        let request_token = {
            let mut state = self.state.lock().unwrap();
            if state.image.is_some() || state.pending {
                None
            } else {
                state.pending = true;
                // A previously cancelled artifact re-requests with a fresh
                // token.
                if state.token.is_cancelled() {
                    state.token = CancellationToken::new();
                }
                Some(state.token.clone())
            }
        };
        // Request outside the state lock: completion delivery takes the
        // in-flight lock first and this lock second.
        if let Some(token) = request_token {
            debug!("requesting thumbnail generation for {}", self.key);
            self.service.request(self, token);
        }
        self.state.lock().unwrap().image.clone()
    }

    /// Whether a generated thumbnail has been delivered.
    pub fn is_loaded(&self) -> bool {
        self.state.lock().unwrap().loaded
    }

    /// Trips the artifact's cancellation token. A queued or running unit
    /// exits at its next checkpoint; a later [`Self::image`] call starts
    /// over with a fresh token.
    pub fn cancel(&self) {
        self.state.lock().unwrap().token.cancel();
    }

    /// Registers an observer for property-change notifications. Delivery
    /// happens on the service's notify dispatcher context.
    pub fn subscribe(
        &self,
        observer: impl Fn(ArtifactProperty) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let mut observers = self.observers.lock().unwrap();
        let id = observers.next_id;
        observers.next_id += 1;
        observers.list.push((id, Arc::new(observer)));
        id
    }

    /// Removes a previously registered observer. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut observers = self.observers.lock().unwrap();
        observers.list.retain(|(sub_id, _)| *sub_id != id);
    }

    /// Terminal success: publish the value, flip the loaded flag, notify.
    /// Runs on the notify dispatcher context.
    pub(crate) fn complete(&self, thumbnail: Thumbnail) {
        {
            let mut state = self.state.lock().unwrap();
            state.image = Some(thumbnail);
            state.loaded = true;
            state.pending = false;
        }
        self.notify(ArtifactProperty::Image);
        self.notify(ArtifactProperty::Loaded);
    }

    /// Terminal failure or cancellation: stay not-loaded, allow a later
    /// access to re-request. No notification, since nothing transitioned.
    pub(crate) fn reset_pending(&self) {
        self.state.lock().unwrap().pending = false;
    }

    fn notify(&self, property: ArtifactProperty) {
        // Snapshot outside the lock: a callback may re-enter subscribe or
        // unsubscribe on this artifact.
        let observers: Vec<Observer> = {
            let observers = self.observers.lock().unwrap();
            observers
                .list
                .iter()
                .map(|(_, observer)| Arc::clone(observer))
                .collect()
        };
        for observer in observers {
            observer(property);
        }
    }
}
