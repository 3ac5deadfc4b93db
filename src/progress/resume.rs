use tracing::{debug, warn};

use super::cache::ProgressCache;
use crate::local::LocalResume;
use crate::models::{MediaKind, SessionId};
use crate::store::ProgressStore;

/// Where playback starts, plus the high-water mark already recorded for the session
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResumePoint {
    pub position: f64,
    pub high_water: f64,
}

impl ResumePoint {
    pub fn at(position: f64) -> Self {
        Self {
            position,
            high_water: position,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResumeRequest<'a> {
    pub kind: MediaKind,
    pub explicit_start: Option<f64>,
    pub username: Option<&'a str>,
    pub session_id: &'a SessionId,
}

/// Picks the initial seek position for a media kind
#[derive(Clone)]
pub struct ResumeResolver {
    store: ProgressStore,
    local: LocalResume,
    cache: Option<ProgressCache>,
}

impl ResumeResolver {
    pub fn new(store: ProgressStore, local: LocalResume) -> Self {
        Self {
            store,
            local,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: ProgressCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Explicit start > 0 wins; video then uses the cache and the remote record, audio the
    /// local resume entry. Anything missing or failing resolves to 0.
    ///
    /// An explicit video start still consults the recorded high-water mark so the first
    /// snapshot cannot lower it.
    pub async fn resolve(&self, request: &ResumeRequest<'_>) -> ResumePoint {
        let explicit = request
            .explicit_start
            .filter(|start| start.is_finite() && *start > 0.0);

        match (request.kind, explicit) {
            (MediaKind::Video, Some(start)) => {
                debug!("Using explicit start {}s for {}", start, request.session_id);
                let recorded = self.resolve_video(request).await;
                ResumePoint {
                    position: start,
                    high_water: recorded.high_water.max(start),
                }
            }
            (MediaKind::Video, None) => self.resolve_video(request).await,
            (MediaKind::Audio, Some(start)) => {
                debug!("Using explicit start {}s for {}", start, request.session_id);
                ResumePoint::at(start)
            }
            (MediaKind::Audio, None) => {
                let position = self.local.read(request.username, request.session_id);
                ResumePoint::at(position as f64)
            }
        }
    }

    async fn resolve_video(&self, request: &ResumeRequest<'_>) -> ResumePoint {
        if let Some(entry) = self
            .cache
            .as_ref()
            .and_then(|cache| cache.get(request.session_id))
        {
            return ResumePoint {
                position: entry.last_position as f64,
                high_water: entry.last_position.max(entry.watched_seconds) as f64,
            };
        }

        match self.store.load(request.username, request.session_id).await {
            Ok(Some(record)) => ResumePoint {
                position: record.last_position as f64,
                high_water: record.last_position.max(record.watched_seconds) as f64,
            },
            Ok(None) => ResumePoint::default(),
            Err(e) => {
                warn!("Resume lookup failed for {}, starting at 0: {}", request.session_id, e);
                ResumePoint::default()
            }
        }
    }
}
