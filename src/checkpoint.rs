use std::collections::HashMap;

use bevy::prelude::*;

use crate::state::SceneKind;

pub const CHECKPOINT_KEY: &str = "slope_scramble.checkpoint";

/// Key/value persistence for progress markers. Implementations must tolerate clearing a key that
/// was never written.
pub trait CheckpointStore: Send + Sync {
    fn load(&self, key: &str) -> Option<String>;
    fn save(&mut self, key: &str, value: &str);
    fn clear(&mut self, key: &str);
}

/// Process-lifetime store; progress survives returning to the menu but not a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl CheckpointStore for MemoryStore {
    fn load(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn save(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_owned(), value.to_owned());
    }

    fn clear(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

#[derive(Resource)]
pub struct Checkpoints {
    store: Box<dyn CheckpointStore>,
}

impl Default for Checkpoints {
    fn default() -> Self {
        Self::new(MemoryStore::default())
    }
}

impl Checkpoints {
    pub fn new(store: impl CheckpointStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    /// Records `scene` as the place to resume from.
    pub fn enter_scene(&mut self, scene: SceneKind) {
        self.store.save(CHECKPOINT_KEY, scene.as_str());
        info!("Checkpoint saved at {}", scene.as_str());
    }

    pub fn clear(&mut self) {
        self.store.clear(CHECKPOINT_KEY);
        info!("Checkpoint cleared");
    }

    /// Scene to resume, if one was saved. Unrecognised values are treated as no checkpoint.
    pub fn resume_scene(&self) -> Option<SceneKind> {
        self.store
            .load(CHECKPOINT_KEY)
            .and_then(|value| SceneKind::parse(&value))
    }
}
