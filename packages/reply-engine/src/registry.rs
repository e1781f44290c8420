//! Per-post engine registry.
//!
//! Each post/user pairing owns its own engine and draft; nothing is shared
//! across concurrent reply attempts. The registry hands out the engine for a
//! post, creating it on first use, and closes it on release.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::api::Collaborators;
use crate::config::EngineConfig;
use crate::engine::ReplyEngine;
use crate::types::{ReplySource, Session};

pub struct EngineRegistry {
    collaborators: Arc<Collaborators>,
    config: EngineConfig,
    engines: DashMap<Uuid, Arc<ReplyEngine>>,
}

impl EngineRegistry {
    pub fn new(collaborators: Arc<Collaborators>, config: EngineConfig) -> Self {
        Self {
            collaborators,
            config,
            engines: DashMap::new(),
        }
    }

    /// Get the engine for a post, creating one if this is the first reply
    /// attempt against it.
    pub fn obtain(&self, source: ReplySource, session: Option<Session>) -> Arc<ReplyEngine> {
        self.engines
            .entry(source.message_id)
            .or_insert_with(|| {
                ReplyEngine::builder(self.collaborators.clone(), source)
                    .with_session(session)
                    .with_config(self.config.clone())
                    .build()
            })
            .clone()
    }

    /// Close and drop the engine for a post (reply form dismissed or flow
    /// completed).
    pub fn release(&self, message_id: Uuid) {
        if let Some((_, engine)) = self.engines.remove(&message_id) {
            engine.close();
        }
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;

    #[test]
    fn obtain_returns_the_same_engine_per_post() {
        let backend = FakeBackend::shared();
        let registry = EngineRegistry::new(
            Arc::new(backend.collaborators()),
            EngineConfig::default(),
        );

        let id = Uuid::new_v4();
        let a = registry.obtain(ReplySource::new(id), None);
        let b = registry.obtain(ReplySource::new(id), None);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn different_posts_get_independent_engines() {
        let backend = FakeBackend::shared();
        let registry = EngineRegistry::new(
            Arc::new(backend.collaborators()),
            EngineConfig::default(),
        );

        let a = registry.obtain(ReplySource::new(Uuid::new_v4()), None);
        let b = registry.obtain(ReplySource::new(Uuid::new_v4()), None);
        assert!(!Arc::ptr_eq(&a, &b));

        a.start_typing("only for post a");
        assert_eq!(b.snapshot().reply_text, "");
    }

    #[test]
    fn release_closes_the_engine() {
        let backend = FakeBackend::shared();
        let registry = EngineRegistry::new(
            Arc::new(backend.collaborators()),
            EngineConfig::default(),
        );

        let id = Uuid::new_v4();
        let engine = registry.obtain(ReplySource::new(id), None);
        registry.release(id);

        assert!(engine.is_closed());
        assert!(registry.is_empty());
    }
}
