//! Diesel schema for handoff persistence.

diesel::table! {
    /// Handoff lifecycle records.
    handoffs (id) {
        /// Handoff identifier.
        id -> Uuid,
        /// Owning tenant.
        tenant_id -> Uuid,
        /// Originating automated-chat session.
        #[max_length = 255]
        source_session_id -> Varchar,
        /// Lifecycle state.
        #[max_length = 20]
        status -> Varchar,
        /// Assigned agent once picked up.
        assigned_agent_id -> Nullable<Uuid>,
        /// Creation timestamp.
        requested_at -> Timestamptz,
        /// Pickup timestamp.
        picked_up_at -> Nullable<Timestamptz>,
        /// Resolution timestamp.
        resolved_at -> Nullable<Timestamptz>,
        /// Party that resolved the handoff.
        #[max_length = 20]
        resolved_by -> Nullable<Varchar>,
        /// Expiry timestamp.
        expired_at -> Nullable<Timestamptz>,
        /// Expiry reason.
        #[max_length = 20]
        expiry_reason -> Nullable<Varchar>,
        /// Last lifecycle or message activity.
        last_activity_at -> Timestamptz,
        /// Automated turns captured at escalation.
        conversation_snapshot -> Jsonb,
        /// Cached most recent user message.
        last_user_message -> Nullable<Text>,
        /// After-hours contact email.
        #[max_length = 320]
        contact_email -> Nullable<Varchar>,
        /// After-hours contact message.
        contact_message -> Nullable<Text>,
    }
}

diesel::table! {
    /// Messages exchanged while a handoff is active.
    handoff_messages (id) {
        /// Message identifier.
        id -> Uuid,
        /// Parent handoff.
        handoff_id -> Uuid,
        /// Author role.
        #[max_length = 20]
        sender_role -> Varchar,
        /// Message text.
        content -> Text,
        /// Authoritative store timestamp.
        created_at -> Timestamptz,
        /// Per-handoff sequence number.
        sequence_number -> Int8,
    }
}

diesel::joinable!(handoff_messages -> handoffs (handoff_id));
diesel::allow_tables_to_appear_in_same_query!(handoffs, handoff_messages);
