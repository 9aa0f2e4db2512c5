//! `PostgreSQL` handoff store.
//!
//! Every lifecycle transition runs inside a transaction that locks the
//! handoff row and then issues an `UPDATE ... WHERE status = <expected>`.
//! Only a write that affects exactly one row counts as a transition, so
//! concurrent dispatcher instances can race safely on the same handoff.

use super::{
    models::{HandoffRow, MessageRow},
    schema::{handoff_messages, handoffs},
};
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
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL` connection pool type used by the handoff store.
pub type HandoffPgPool = Pool<ConnectionManager<PgConnection>>;

const OPEN_SESSION_INDEX: &str = "idx_handoffs_open_session";

/// Attempts made when the open handoff for a session closes between the
/// failed insert and the follow-up read.
const INSERT_ATTEMPTS: usize = 3;

/// `PostgreSQL`-backed handoff store.
#[derive(Debug, Clone)]
pub struct PostgresHandoffStore {
    pool: HandoffPgPool,
}

impl PostgresHandoffStore {
    /// Creates a new store from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: HandoffPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> HandoffStoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> HandoffStoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(HandoffStoreError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(HandoffStoreError::persistence)?
    }

    /// Locks the handoff row, applies `transition` when `guard` accepts the
    /// current state, and writes the result back conditionally.
    async fn transition<G, F>(
        &self,
        id: HandoffId,
        guard: G,
        transition: F,
    ) -> HandoffStoreResult<Option<Handoff>>
    where
        G: FnOnce(&Handoff) -> bool + Send + 'static,
        F: FnOnce(&mut Handoff) -> bool + Send + 'static,
    {
        self.run_blocking(move |connection| {
            connection.transaction::<_, HandoffStoreError, _>(|tx| {
                let Some(mut handoff) = lock_handoff(tx, id)? else {
                    return Ok(None);
                };
                if !guard(&handoff) {
                    return Ok(None);
                }
                let expected = handoff.status();
                if !transition(&mut handoff) {
                    return Ok(None);
                }
                let row = HandoffRow::from_handoff(&handoff)?;
                let updated = diesel::update(
                    handoffs::table
                        .filter(handoffs::id.eq(id.into_inner()))
                        .filter(handoffs::status.eq(expected.as_str())),
                )
                .set(&row)
                .execute(tx)?;
                if updated == 1 {
                    row.into_handoff().map(Some)
                } else {
                    Ok(None)
                }
            })
        })
        .await
    }
}

impl From<DieselError> for HandoffStoreError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

fn lock_handoff(connection: &mut PgConnection, id: HandoffId) -> HandoffStoreResult<Option<Handoff>> {
    let row = handoffs::table
        .filter(handoffs::id.eq(id.into_inner()))
        .select(HandoffRow::as_select())
        .for_update()
        .first::<HandoffRow>(connection)
        .optional()?;
    row.map(HandoffRow::into_handoff).transpose()
}

fn find_handoff(connection: &mut PgConnection, id: HandoffId) -> HandoffStoreResult<Option<Handoff>> {
    let row = handoffs::table
        .filter(handoffs::id.eq(id.into_inner()))
        .select(HandoffRow::as_select())
        .first::<HandoffRow>(connection)
        .optional()?;
    row.map(HandoffRow::into_handoff).transpose()
}

fn find_open(
    connection: &mut PgConnection,
    tenant_id: TenantId,
    session_id: &str,
) -> HandoffStoreResult<Option<Handoff>> {
    let row = handoffs::table
        .filter(handoffs::tenant_id.eq(tenant_id.into_inner()))
        .filter(handoffs::source_session_id.eq(session_id))
        .filter(handoffs::status.eq_any([
            HandoffStatus::Pending.as_str(),
            HandoffStatus::Active.as_str(),
        ]))
        .select(HandoffRow::as_select())
        .first::<HandoffRow>(connection)
        .optional()?;
    row.map(HandoffRow::into_handoff).transpose()
}

fn is_open_session_violation(info: &dyn DatabaseErrorInformation) -> bool {
    info.constraint_name()
        .is_some_and(|name| name == OPEN_SESSION_INDEX)
}

fn to_limit(limit: usize) -> HandoffStoreResult<i64> {
    i64::try_from(limit).map_err(HandoffStoreError::persistence)
}

enum InsertAttempt {
    Done(InsertOutcome),
    Retry,
}

fn try_insert(connection: &mut PgConnection, row: &HandoffRow) -> HandoffStoreResult<InsertAttempt> {
    let handoff_id = HandoffId::from_uuid(row.id);
    let result = diesel::insert_into(handoffs::table)
        .values(row)
        .execute(connection);
    match result {
        Ok(_) => Ok(InsertAttempt::Done(InsertOutcome::Inserted(
            row.clone().into_handoff()?,
        ))),
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info))
            if is_open_session_violation(info.as_ref()) =>
        {
            let tenant_id = TenantId::from_uuid(row.tenant_id);
            Ok(find_open(connection, tenant_id, &row.source_session_id)?
                .map_or(InsertAttempt::Retry, |existing| {
                    InsertAttempt::Done(InsertOutcome::Existing(existing))
                }))
        }
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            Err(HandoffStoreError::DuplicateHandoff(handoff_id))
        }
        Err(err) => Err(HandoffStoreError::persistence(err)),
    }
}

#[async_trait]
impl HandoffStore for PostgresHandoffStore {
    async fn insert_unless_open(&self, handoff: &Handoff) -> HandoffStoreResult<InsertOutcome> {
        let row = HandoffRow::from_handoff(handoff)?;
        self.run_blocking(move |connection| {
            for _ in 0..INSERT_ATTEMPTS {
                if let InsertAttempt::Done(outcome) = try_insert(connection, &row)? {
                    return Ok(outcome);
                }
            }
            Err(HandoffStoreError::persistence(std::io::Error::other(format!(
                "open handoff for session '{}' kept changing during insert",
                row.source_session_id
            ))))
        })
        .await
    }

    async fn find_by_id(&self, id: HandoffId) -> HandoffStoreResult<Option<Handoff>> {
        self.run_blocking(move |connection| find_handoff(connection, id))
            .await
    }

    async fn find_open_for_session(
        &self,
        tenant_id: TenantId,
        session_id: &SessionId,
    ) -> HandoffStoreResult<Option<Handoff>> {
        let session = session_id.as_str().to_owned();
        self.run_blocking(move |connection| find_open(connection, tenant_id, &session))
            .await
    }

    async fn claim(&self, request: ClaimRequest) -> HandoffStoreResult<Option<Handoff>> {
        self.transition(
            request.handoff_id,
            move |handoff| {
                handoff.tenant_id() == request.tenant_id
                    && handoff.status() == HandoffStatus::Pending
            },
            move |handoff| handoff.claim(request.agent_id, request.at).is_ok(),
        )
        .await
    }

    async fn mark_resolved(
        &self,
        id: HandoffId,
        resolved_by: SenderRole,
        at: DateTime<Utc>,
    ) -> HandoffStoreResult<Option<Handoff>> {
        self.transition(
            id,
            |handoff| handoff.status() == HandoffStatus::Active,
            move |handoff| handoff.resolve(resolved_by, at).is_ok(),
        )
        .await
    }

    async fn expire_pending(
        &self,
        id: HandoffId,
        requested_before: Option<DateTime<Utc>>,
        reason: ExpiryReason,
        at: DateTime<Utc>,
    ) -> HandoffStoreResult<Option<Handoff>> {
        self.transition(
            id,
            move |handoff| match requested_before {
                Some(cutoff) => handoff.is_stale_pending(cutoff),
                None => handoff.status() == HandoffStatus::Pending,
            },
            move |handoff| handoff.expire(reason, at).is_ok(),
        )
        .await
    }

    async fn expire_idle_active(
        &self,
        id: HandoffId,
        idle_before: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> HandoffStoreResult<Option<Handoff>> {
        self.transition(
            id,
            move |handoff| handoff.is_idle_active(idle_before),
            move |handoff| handoff.expire(ExpiryReason::AgentIdle, at).is_ok(),
        )
        .await
    }

    async fn append_message(&self, message: &HandoffMessage) -> HandoffStoreResult<AppendOutcome> {
        let draft = message.clone();
        self.run_blocking(move |connection| {
            connection.transaction::<_, HandoffStoreError, _>(|tx| {
                let handoff_id = draft.handoff_id();
                let mut handoff =
                    lock_handoff(tx, handoff_id)?.ok_or(HandoffStoreError::NotFound(handoff_id))?;
                if handoff.status() != HandoffStatus::Active {
                    return Ok(AppendOutcome::Rejected(handoff.status()));
                }

                let previous = handoff_messages::table
                    .filter(handoff_messages::handoff_id.eq(handoff_id.into_inner()))
                    .order(handoff_messages::sequence_number.desc())
                    .select(MessageRow::as_select())
                    .first::<MessageRow>(tx)
                    .optional()?
                    .map(|row| row.ordering_key())
                    .transpose()?;

                let row = MessageRow::from_message(&draft.stamped(previous))?;
                diesel::insert_into(handoff_messages::table)
                    .values(&row)
                    .execute(tx)?;
                let appended = row.into_message()?;

                handoff
                    .record_message(&appended)
                    .map_err(HandoffStoreError::persistence)?;
                let handoff_row = HandoffRow::from_handoff(&handoff)?;
                diesel::update(handoffs::table.filter(handoffs::id.eq(handoff_id.into_inner())))
                    .set((
                        handoffs::last_activity_at.eq(handoff_row.last_activity_at),
                        handoffs::last_user_message.eq(handoff_row.last_user_message),
                    ))
                    .execute(tx)?;

                Ok(AppendOutcome::Appended(appended))
            })
        })
        .await
    }

    async fn messages_since(
        &self,
        id: HandoffId,
        cursor: MessageCursor,
    ) -> HandoffStoreResult<Vec<HandoffMessage>> {
        self.run_blocking(move |connection| {
            if find_handoff(connection, id)?.is_none() {
                return Err(HandoffStoreError::NotFound(id));
            }

            let base = handoff_messages::table
                .filter(handoff_messages::handoff_id.eq(id.into_inner()))
                .order(handoff_messages::sequence_number.asc())
                .select(MessageRow::as_select())
                .into_boxed();

            let query = match cursor {
                MessageCursor::Start => base,
                MessageCursor::AfterMessage(message_id) => {
                    let after_sequence = handoff_messages::table
                        .filter(handoff_messages::id.eq(message_id.into_inner()))
                        .filter(handoff_messages::handoff_id.eq(id.into_inner()))
                        .select(handoff_messages::sequence_number)
                        .first::<i64>(connection)
                        .optional()?
                        .ok_or(HandoffStoreError::UnknownCursor {
                            handoff_id: id,
                            message_id,
                        })?;
                    base.filter(handoff_messages::sequence_number.gt(after_sequence))
                }
                MessageCursor::AfterTimestamp(after) => {
                    base.filter(handoff_messages::created_at.gt(after))
                }
            };

            let rows = query.load::<MessageRow>(connection)?;
            rows.into_iter().map(MessageRow::into_message).collect()
        })
        .await
    }

    async fn list_pending(&self, tenant_id: TenantId) -> HandoffStoreResult<Vec<Handoff>> {
        self.run_blocking(move |connection| {
            let rows = handoffs::table
                .filter(handoffs::tenant_id.eq(tenant_id.into_inner()))
                .filter(handoffs::status.eq(HandoffStatus::Pending.as_str()))
                .order(handoffs::requested_at.asc())
                .select(HandoffRow::as_select())
                .load::<HandoffRow>(connection)?;
            rows.into_iter().map(HandoffRow::into_handoff).collect()
        })
        .await
    }

    async fn list_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> HandoffStoreResult<Vec<HandoffId>> {
        let row_limit = to_limit(limit)?;
        self.run_blocking(move |connection| {
            let ids = handoffs::table
                .filter(handoffs::status.eq(HandoffStatus::Pending.as_str()))
                .filter(handoffs::requested_at.lt(cutoff))
                .order(handoffs::requested_at.asc())
                .limit(row_limit)
                .select(handoffs::id)
                .load::<uuid::Uuid>(connection)?;
            Ok(ids.into_iter().map(HandoffId::from_uuid).collect())
        })
        .await
    }

    async fn list_idle_active(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> HandoffStoreResult<Vec<HandoffId>> {
        let row_limit = to_limit(limit)?;
        self.run_blocking(move |connection| {
            let ids = handoffs::table
                .filter(handoffs::status.eq(HandoffStatus::Active.as_str()))
                .filter(handoffs::last_activity_at.lt(cutoff))
                .order(handoffs::last_activity_at.asc())
                .limit(row_limit)
                .select(handoffs::id)
                .load::<uuid::Uuid>(connection)?;
            Ok(ids.into_iter().map(HandoffId::from_uuid).collect())
        })
        .await
    }

    async fn count_active_for_agent(&self, agent_id: AgentId) -> HandoffStoreResult<u32> {
        self.run_blocking(move |connection| {
            let count = handoffs::table
                .filter(handoffs::status.eq(HandoffStatus::Active.as_str()))
                .filter(handoffs::assigned_agent_id.eq(agent_id.into_inner()))
                .count()
                .get_result::<i64>(connection)?;
            u32::try_from(count).map_err(HandoffStoreError::persistence)
        })
        .await
    }
}
