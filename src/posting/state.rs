use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SensorType;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PostStatus {
    #[default]
    Idle,
    Posting,
    Retrying,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PostState {
    pub status: PostStatus,
    pub chunks_posted: usize,
    pub chunks_total: usize,
    pub last_error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Last known state per sensor. Observational only; the per-sensor mutex
/// decides who may post.
#[derive(Debug, Default)]
pub struct PostStateTracker {
    states: Mutex<HashMap<SensorType, PostState>>,
}

impl PostStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sensor: SensorType) -> PostState {
        self.with_states(|states| states.get(&sensor).cloned().unwrap_or_default())
    }

    pub fn begin(&self, sensor: SensorType, chunks_total: usize) {
        self.update(sensor, |state| {
            state.status = PostStatus::Posting;
            state.chunks_posted = 0;
            state.chunks_total = chunks_total;
            state.last_error = None;
        });
    }

    pub fn retrying(&self, sensor: SensorType) {
        self.update(sensor, |state| state.status = PostStatus::Retrying);
    }

    pub fn chunk_posted(&self, sensor: SensorType) {
        self.update(sensor, |state| {
            state.status = PostStatus::Posting;
            state.chunks_posted += 1;
        });
    }

    pub fn finish(&self, sensor: SensorType, error: Option<String>) {
        self.update(sensor, |state| {
            state.status = if error.is_some() {
                PostStatus::Failed
            } else {
                PostStatus::Succeeded
            };
            state.last_error = error;
        });
    }

    pub fn reset(&self, sensor: SensorType) {
        self.update(sensor, |state| *state = PostState::default());
    }

    fn update(&self, sensor: SensorType, apply: impl FnOnce(&mut PostState)) {
        self.with_states(|states| {
            let state = states.entry(sensor).or_default();
            apply(state);
            state.updated_at = Some(Utc::now());
        });
    }

    fn with_states<R>(&self, f: impl FnOnce(&mut HashMap<SensorType, PostState>) -> R) -> R {
        let mut guard = match self.states.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}
