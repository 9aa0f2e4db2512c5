//! In-memory implementation of the `HandoffStore` port.
//!
//! A single [`RwLock`] guards handoffs, transcripts and the open-session
//! index together, so each conditional write is atomic with respect to
//! every other caller in the process.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::handoff::{
    domain::{
        AgentId, ExpiryReason, Handoff, HandoffId, HandoffMessage, HandoffStatus, SenderRole,
        SessionId, TenantId,
    },
    ports::{
        AppendOutcome, ClaimRequest, HandoffStore, HandoffStoreError, HandoffStoreResult,
        InsertOutcome, MessageCursor,
    },
};

/// Thread-safe in-memory handoff store.
///
/// # Example
///
/// ```
/// use switchboard::handoff::adapters::memory::InMemoryHandoffStore;
///
/// let store = InMemoryHandoffStore::new();
/// assert!(store.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryHandoffStore {
    state: Arc<RwLock<StoreState>>,
}

#[derive(Debug, Default)]
struct StoreState {
    handoffs: HashMap<HandoffId, Handoff>,
    open_sessions: HashMap<(TenantId, SessionId), HandoffId>,
    transcripts: HashMap<HandoffId, Vec<HandoffMessage>>,
}

impl StoreState {
    fn release_session(&mut self, handoff: &Handoff) {
        let key = (handoff.tenant_id(), handoff.source_session_id().clone());
        if self.open_sessions.get(&key) == Some(&handoff.id()) {
            self.open_sessions.remove(&key);
        }
    }

    /// Applies `transition` to the handoff when `guard` accepts it, keeping
    /// the open-session index in step.
    fn transition_if<G, F>(
        &mut self,
        id: HandoffId,
        guard: G,
        transition: F,
    ) -> Option<Handoff>
    where
        G: FnOnce(&Handoff) -> bool,
        F: FnOnce(&mut Handoff) -> bool,
    {
        let handoff = self.handoffs.get_mut(&id)?;
        if !guard(handoff) {
            return None;
        }
        let mut updated = handoff.clone();
        if !transition(&mut updated) {
            return None;
        }
        *handoff = updated.clone();
        if updated.is_terminal() {
            self.release_session(&updated);
        }
        Some(updated)
    }
}

impl InMemoryHandoffStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored handoffs.
    ///
    /// Returns `0` if the internal lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state
            .read()
            .map(|guard| guard.handoffs.len())
            .unwrap_or(0)
    }

    /// Returns `true` if no handoffs are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> HandoffStoreResult<RwLockReadGuard<'_, StoreState>> {
        self.state.read().map_err(|err| {
            HandoffStoreError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn write(&self) -> HandoffStoreResult<RwLockWriteGuard<'_, StoreState>> {
        self.state.write().map_err(|err| {
            HandoffStoreError::persistence(std::io::Error::other(err.to_string()))
        })
    }
}

fn to_count(value: usize) -> HandoffStoreResult<u32> {
    u32::try_from(value).map_err(HandoffStoreError::persistence)
}

#[async_trait]
impl HandoffStore for InMemoryHandoffStore {
    async fn insert_unless_open(&self, handoff: &Handoff) -> HandoffStoreResult<InsertOutcome> {
        let mut state = self.write()?;
        if state.handoffs.contains_key(&handoff.id()) {
            return Err(HandoffStoreError::DuplicateHandoff(handoff.id()));
        }

        let key = (handoff.tenant_id(), handoff.source_session_id().clone());
        if handoff.status().is_open() {
            if let Some(existing) = state
                .open_sessions
                .get(&key)
                .and_then(|id| state.handoffs.get(id))
            {
                return Ok(InsertOutcome::Existing(existing.clone()));
            }
            state.open_sessions.insert(key, handoff.id());
        }

        state.handoffs.insert(handoff.id(), handoff.clone());
        state.transcripts.entry(handoff.id()).or_default();
        Ok(InsertOutcome::Inserted(handoff.clone()))
    }

    async fn find_by_id(&self, id: HandoffId) -> HandoffStoreResult<Option<Handoff>> {
        let state = self.read()?;
        Ok(state.handoffs.get(&id).cloned())
    }

    async fn find_open_for_session(
        &self,
        tenant_id: TenantId,
        session_id: &SessionId,
    ) -> HandoffStoreResult<Option<Handoff>> {
        let state = self.read()?;
        let handoff = state
            .open_sessions
            .get(&(tenant_id, session_id.clone()))
            .and_then(|id| state.handoffs.get(id))
            .cloned();
        Ok(handoff)
    }

    async fn claim(&self, request: ClaimRequest) -> HandoffStoreResult<Option<Handoff>> {
        let mut state = self.write()?;
        Ok(state.transition_if(
            request.handoff_id,
            |handoff| {
                handoff.tenant_id() == request.tenant_id
                    && handoff.status() == HandoffStatus::Pending
            },
            |handoff| handoff.claim(request.agent_id, request.at).is_ok(),
        ))
    }

    async fn mark_resolved(
        &self,
        id: HandoffId,
        resolved_by: SenderRole,
        at: DateTime<Utc>,
    ) -> HandoffStoreResult<Option<Handoff>> {
        let mut state = self.write()?;
        Ok(state.transition_if(
            id,
            |handoff| handoff.status() == HandoffStatus::Active,
            |handoff| handoff.resolve(resolved_by, at).is_ok(),
        ))
    }

    async fn expire_pending(
        &self,
        id: HandoffId,
        requested_before: Option<DateTime<Utc>>,
        reason: ExpiryReason,
        at: DateTime<Utc>,
    ) -> HandoffStoreResult<Option<Handoff>> {
        let mut state = self.write()?;
        Ok(state.transition_if(
            id,
            |handoff| match requested_before {
                Some(cutoff) => handoff.is_stale_pending(cutoff),
                None => handoff.status() == HandoffStatus::Pending,
            },
            |handoff| handoff.expire(reason, at).is_ok(),
        ))
    }

    async fn expire_idle_active(
        &self,
        id: HandoffId,
        idle_before: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> HandoffStoreResult<Option<Handoff>> {
        let mut state = self.write()?;
        Ok(state.transition_if(
            id,
            |handoff| handoff.is_idle_active(idle_before),
            |handoff| handoff.expire(ExpiryReason::AgentIdle, at).is_ok(),
        ))
    }

    async fn append_message(&self, message: &HandoffMessage) -> HandoffStoreResult<AppendOutcome> {
        let mut guard = self.write()?;
        let state = &mut *guard;
        let handoff_id = message.handoff_id();
        let handoff = state
            .handoffs
            .get_mut(&handoff_id)
            .ok_or(HandoffStoreError::NotFound(handoff_id))?;
        if handoff.status() != HandoffStatus::Active {
            return Ok(AppendOutcome::Rejected(handoff.status()));
        }

        let transcript = state.transcripts.entry(handoff_id).or_default();
        let previous = transcript.last().map(HandoffMessage::ordering_key);
        let stamped = message.clone().stamped(previous);
        if handoff.record_message(&stamped).is_err() {
            return Ok(AppendOutcome::Rejected(handoff.status()));
        }
        transcript.push(stamped.clone());
        Ok(AppendOutcome::Appended(stamped))
    }

    async fn messages_since(
        &self,
        id: HandoffId,
        cursor: MessageCursor,
    ) -> HandoffStoreResult<Vec<HandoffMessage>> {
        let state = self.read()?;
        if !state.handoffs.contains_key(&id) {
            return Err(HandoffStoreError::NotFound(id));
        }
        let transcript = state.transcripts.get(&id).map(Vec::as_slice).unwrap_or_default();

        let messages = match cursor {
            MessageCursor::Start => transcript.to_vec(),
            MessageCursor::AfterMessage(message_id) => {
                let position = transcript
                    .iter()
                    .position(|message| message.id() == message_id)
                    .ok_or(HandoffStoreError::UnknownCursor {
                        handoff_id: id,
                        message_id,
                    })?;
                transcript.iter().skip(position + 1).cloned().collect()
            }
            MessageCursor::AfterTimestamp(after) => transcript
                .iter()
                .filter(|message| message.timestamp() > after)
                .cloned()
                .collect(),
        };
        Ok(messages)
    }

    async fn list_pending(&self, tenant_id: TenantId) -> HandoffStoreResult<Vec<Handoff>> {
        let state = self.read()?;
        let mut pending: Vec<Handoff> = state
            .handoffs
            .values()
            .filter(|h| h.tenant_id() == tenant_id && h.status() == HandoffStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(Handoff::requested_at);
        Ok(pending)
    }

    async fn list_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> HandoffStoreResult<Vec<HandoffId>> {
        let state = self.read()?;
        let mut stale: Vec<&Handoff> = state
            .handoffs
            .values()
            .filter(|h| h.is_stale_pending(cutoff))
            .collect();
        stale.sort_by_key(|h| h.requested_at());
        Ok(stale.into_iter().take(limit).map(Handoff::id).collect())
    }

    async fn list_idle_active(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> HandoffStoreResult<Vec<HandoffId>> {
        let state = self.read()?;
        let mut idle: Vec<&Handoff> = state
            .handoffs
            .values()
            .filter(|h| h.is_idle_active(cutoff))
            .collect();
        idle.sort_by_key(|h| h.last_activity_at());
        Ok(idle.into_iter().take(limit).map(Handoff::id).collect())
    }

    async fn count_active_for_agent(&self, agent_id: AgentId) -> HandoffStoreResult<u32> {
        let state = self.read()?;
        let count = state
            .handoffs
            .values()
            .filter(|h| {
                h.status() == HandoffStatus::Active && h.assigned_agent_id() == Some(agent_id)
            })
            .count();
        to_count(count)
    }
}
