//! In-memory room record store.
//!
//! Mirrors the Redis Lua scripts: every operation runs under one lock, so
//! concurrent deltas never lose updates, and the same session guards apply.

use async_trait::async_trait;
use common::types::{RoomId, SessionId};
use lifecycle_service::clients::{RoomRecord, RoomStatusUpdate, RoomStore};
use lifecycle_service::errors::LcError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct MockRoomStore {
    records: Arc<Mutex<HashMap<RoomId, RoomRecord>>>,
    fail: Arc<AtomicBool>,
    status_transitions: Arc<AtomicUsize>,
    upserts: Arc<AtomicUsize>,
}

impl MockRoomStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record.
    #[must_use]
    pub fn with_record(self, record: RoomRecord) -> Self {
        self.records
            .lock()
            .unwrap()
            .insert(record.room_id.clone(), record);
        self
    }

    /// Make every subsequent call fail with `LcError::Redis`.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, room_id: &str) -> Option<RoomRecord> {
        let room_id = RoomId::new(room_id).unwrap();
        self.records.lock().unwrap().get(&room_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of running -> finished transitions applied.
    pub fn status_transitions(&self) -> usize {
        self.status_transitions.load(Ordering::SeqCst)
    }

    /// Number of upserts that wrote a record.
    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), LcError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LcError::Redis("mock store unavailable".to_string()));
        }
        Ok(())
    }
}

fn session_matches(record: &RoomRecord, session_id: &SessionId) -> bool {
    session_id.is_empty() || record.session_id == *session_id
}

#[async_trait]
impl RoomStore for MockRoomStore {
    async fn upsert_room(&self, record: &RoomRecord, insert_only: bool) -> Result<bool, LcError> {
        self.check()?;
        let mut records = self.records.lock().unwrap();

        let (participants, ended) = match records.get(&record.room_id) {
            Some(_) if insert_only => return Ok(false),
            Some(existing) if existing.session_id == record.session_id => {
                if !existing.is_running {
                    return Ok(false);
                }
                (existing.participants, existing.ended.clone())
            }
            Some(existing) if record.creation_time < existing.creation_time => return Ok(false),
            _ => (0, String::new()),
        };

        records.insert(
            record.room_id.clone(),
            RoomRecord {
                is_running: true,
                participants,
                ended,
                ..record.clone()
            },
        );
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn update_status(&self, update: &RoomStatusUpdate) -> Result<bool, LcError> {
        self.check()?;
        let mut records = self.records.lock().unwrap();
        let Some(record) = records.get_mut(&update.room_id) else {
            return Ok(false);
        };
        if !session_matches(record, &update.session_id) || !record.is_running {
            return Ok(false);
        }
        record.is_running = false;
        record.ended.clone_from(&update.ended);
        self.status_transitions.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn adjust_participant_count(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
        delta: i64,
    ) -> Result<Option<i64>, LcError> {
        self.check()?;
        let mut records = self.records.lock().unwrap();
        match records.get_mut(room_id) {
            Some(record) if session_matches(record, session_id) => {
                record.participants += delta;
                Ok(Some(record.participants))
            }
            _ => Ok(None),
        }
    }

    async fn update_metadata(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
        metadata: &str,
    ) -> Result<bool, LcError> {
        self.check()?;
        let mut records = self.records.lock().unwrap();
        match records.get_mut(room_id) {
            Some(record) if session_matches(record, session_id) => {
                record.metadata = metadata.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_room(&self, room_id: &RoomId) -> Result<Option<RoomRecord>, LcError> {
        self.check()?;
        Ok(self.records.lock().unwrap().get(room_id).cloned())
    }
}
