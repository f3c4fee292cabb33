//! In-process [`VideoStore`] with the same lifecycle and lease rules as
//! the Postgres store. Used by tests and single-process runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;
use v2t_core::aggregation::AggregatedResults;
use v2t_core::detection::{DetectedObject, ExtractedText};
use v2t_core::error::CoreError;
use v2t_core::status::VideoStatus;
use v2t_core::types::{Timestamp, VideoId};
use v2t_core::video::{NewVideo, Video};
use v2t_db::models::video::{CompletedMetadata, VideoListQuery};
use v2t_db::repositories::video_repo::{DEFAULT_LIMIT, MAX_LIMIT};

use crate::store::{
    begin_conflict, delete_conflict, lease_expired_message, lease_lost, Lease, StoreError, VideoStore,
};

#[derive(Debug)]
struct Entry {
    video: Video,
    lease: Option<Lease>,
    /// Last time the lease was taken or renewed.
    leased_at: Option<Timestamp>,
    objects: Vec<DetectedObject>,
    texts: Vec<ExtractedText>,
    /// Insertion order, breaks `created_at` ties.
    seq: u64,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<VideoId, Entry>,
    next_seq: u64,
    commit_failure: Option<String>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `complete_processing` fail without writing anything.
    pub fn fail_next_commit(&self, message: impl Into<String>) -> Result<(), StoreError> {
        self.lock()?.commit_failure = Some(message.into());
        Ok(())
    }

    /// Current lease holder of a video, if any.
    pub fn lease_holder(&self, id: VideoId) -> Result<Option<String>, StoreError> {
        Ok(self
            .lock()?
            .entries
            .get(&id)
            .and_then(|e| e.lease.as_ref())
            .map(|l| l.holder.clone()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Core(CoreError::Internal("memory store lock poisoned".into())))
    }
}

fn entry_mut(state: &mut State, id: VideoId) -> Result<&mut Entry, StoreError> {
    state
        .entries
        .get_mut(&id)
        .ok_or_else(|| CoreError::video_not_found(id).into())
}

/// The entry, if `lease` is the one it currently holds.
fn leased_entry<'a>(state: &'a mut State, id: VideoId, lease: &Lease) -> Result<&'a mut Entry, StoreError> {
    let entry = entry_mut(state, id)?;
    let held = entry.lease.as_ref().is_some_and(|l| l.token == lease.token);
    if !held || entry.video.status != VideoStatus::Processing {
        return Err(lease_lost(id).into());
    }
    Ok(entry)
}

/// Move `uploaded -> processing` and take the lease.
fn acquire(state: &mut State, id: VideoId, worker: &str) -> Result<(Video, Lease), StoreError> {
    let entry = entry_mut(state, id)?;
    if entry.video.status != VideoStatus::Uploaded || entry.lease.is_some() {
        let holder = entry.lease.as_ref().map(|l| l.holder.as_str());
        return Err(begin_conflict(&entry.video, holder).into());
    }
    entry.video.status = entry.video.status.transition_to(VideoStatus::Processing)?;
    let lease = Lease {
        token: Uuid::new_v4(),
        holder: worker.to_string(),
        acquired_at: chrono::Utc::now(),
    };
    entry.leased_at = Some(lease.acquired_at);
    entry.lease = Some(lease.clone());
    Ok((entry.video.clone(), lease))
}

#[async_trait]
impl VideoStore for MemoryStore {
    async fn create_video(&self, input: NewVideo) -> Result<Video, StoreError> {
        let mut state = self.lock()?;
        if state.entries.contains_key(&input.id) {
            return Err(CoreError::Conflict(format!("Video {} already exists", input.id)).into());
        }
        let video = Video {
            id: input.id,
            filename: input.filename,
            storage_path: input.storage_path,
            size_bytes: input.size_bytes,
            duration_secs: None,
            fps: None,
            status: VideoStatus::Uploaded,
            error_message: None,
            created_at: chrono::Utc::now(),
            completed_at: None,
        };
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            video.id,
            Entry {
                video: video.clone(),
                lease: None,
                leased_at: None,
                objects: Vec::new(),
                texts: Vec::new(),
                seq,
            },
        );
        Ok(video)
    }

    async fn find_video(&self, id: VideoId) -> Result<Option<Video>, StoreError> {
        Ok(self.lock()?.entries.get(&id).map(|e| e.video.clone()))
    }

    async fn list_videos(&self, query: &VideoListQuery) -> Result<Vec<Video>, StoreError> {
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT) as usize;
        let offset = query.offset.unwrap_or(0).max(0) as usize;

        let state = self.lock()?;
        let mut matching: Vec<&Entry> = state
            .entries
            .values()
            .filter(|e| query.status.map_or(true, |s| e.video.status == s))
            .collect();
        // Newest first.
        matching.sort_by(|a, b| {
            b.video
                .created_at
                .cmp(&a.video.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        Ok(matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|e| e.video.clone())
            .collect())
    }

    async fn claim_next(&self, worker: &str) -> Result<Option<(Video, Lease)>, StoreError> {
        let mut state = self.lock()?;
        let next = state
            .entries
            .values()
            .filter(|e| e.video.status == VideoStatus::Uploaded && e.lease.is_none())
            .min_by(|a, b| a.video.created_at.cmp(&b.video.created_at).then(a.seq.cmp(&b.seq)))
            .map(|e| e.video.id);
        match next {
            Some(id) => acquire(&mut state, id, worker).map(Some),
            None => Ok(None),
        }
    }

    async fn begin_processing(&self, id: VideoId, worker: &str) -> Result<(Video, Lease), StoreError> {
        let mut state = self.lock()?;
        acquire(&mut state, id, worker)
    }

    async fn complete_processing(
        &self,
        id: VideoId,
        lease: &Lease,
        metadata: CompletedMetadata,
        results: &AggregatedResults,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if let Some(message) = state.commit_failure.take() {
            return Err(CoreError::Internal(message).into());
        }
        let entry = leased_entry(&mut state, id, lease)?;
        entry.video.status = entry.video.status.transition_to(VideoStatus::Completed)?;
        entry.video.duration_secs = metadata.duration_secs;
        entry.video.fps = metadata.fps;
        entry.video.completed_at = Some(chrono::Utc::now());
        entry.objects = results.detected_objects.clone();
        entry.texts = results.extracted_texts.clone();
        entry.lease = None;
        entry.leased_at = None;
        Ok(())
    }

    async fn fail_processing(&self, id: VideoId, lease: &Lease, message: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let entry = leased_entry(&mut state, id, lease)?;
        entry.video.status = entry.video.status.transition_to(VideoStatus::Failed)?;
        entry.video.error_message = Some(message.to_string());
        entry.video.completed_at = Some(chrono::Utc::now());
        entry.lease = None;
        entry.leased_at = None;
        Ok(())
    }

    async fn renew_lease(&self, id: VideoId, lease: &Lease) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let entry = leased_entry(&mut state, id, lease)?;
        entry.leased_at = Some(chrono::Utc::now());
        Ok(())
    }

    async fn expire_leases(&self, ttl: Duration) -> Result<Vec<Video>, StoreError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CoreError::Validation(format!("lease TTL out of range: {e}")))?;
        let now = chrono::Utc::now();
        let mut state = self.lock()?;
        let mut expired = Vec::new();
        for entry in state.entries.values_mut() {
            let stale = entry.video.status == VideoStatus::Processing
                && entry.leased_at.is_some_and(|at| at + ttl <= now);
            if !stale {
                continue;
            }
            let Some(lease) = entry.lease.take() else {
                continue;
            };
            entry.video.status = entry.video.status.transition_to(VideoStatus::Failed)?;
            entry.video.error_message = Some(lease_expired_message(&lease.holder));
            entry.video.completed_at = Some(now);
            entry.leased_at = None;
            expired.push(entry.video.clone());
        }
        Ok(expired)
    }

    async fn detected_objects(&self, id: VideoId) -> Result<Vec<DetectedObject>, StoreError> {
        Ok(self
            .lock()?
            .entries
            .get(&id)
            .map(|e| e.objects.clone())
            .unwrap_or_default())
    }

    async fn extracted_texts(&self, id: VideoId) -> Result<Vec<ExtractedText>, StoreError> {
        Ok(self
            .lock()?
            .entries
            .get(&id)
            .map(|e| e.texts.clone())
            .unwrap_or_default())
    }

    async fn delete_video(&self, id: VideoId) -> Result<Video, StoreError> {
        let mut state = self.lock()?;
        let entry = entry_mut(&mut state, id)?;
        if entry.lease.is_some() || entry.video.status == VideoStatus::Processing {
            return Err(delete_conflict(id).into());
        }
        state
            .entries
            .remove(&id)
            .map(|e| e.video)
            .ok_or_else(|| CoreError::video_not_found(id).into())
    }
}
