//! Transactional outbox.
//!
//! Events are inserted on the caller's connection, so they commit or roll back
//! together with the change that produced them.

use diesel::prelude::*;
use serde::Serialize;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::models::{NewOutboxEvent, OutboxEvent};
use crate::schema::outbox_events;

use super::types::{AggregateType, DomainEvent, EventMetadata, EventType, NotificationPayload};

#[derive(Debug, Clone)]
pub struct OutboxService;

impl OutboxService {
    #[instrument(skip(conn, event), fields(event_type = %event.event_type, aggregate_id = event.aggregate_id))]
    pub fn write_event(
        conn: &mut PgConnection,
        event: &DomainEvent,
    ) -> Result<OutboxEvent, diesel::result::Error> {
        let payload = serde_json::json!({
            "data": event.payload,
            "metadata": event.metadata,
        });

        let new_event = NewOutboxEvent {
            event_type: event.event_type.as_str().to_string(),
            aggregate_type: event.aggregate_type.as_str().to_string(),
            aggregate_id: event.aggregate_id,
            payload,
        };

        let result = diesel::insert_into(outbox_events::table)
            .values(&new_event)
            .returning(OutboxEvent::as_returning())
            .get_result(conn)?;

        debug!(event_id = %result.id, "Event written to outbox");
        Ok(result)
    }

    pub fn emit<P: Serialize>(
        conn: &mut PgConnection,
        event_type: EventType,
        aggregate_type: AggregateType,
        aggregate_id: i32,
        payload: &P,
        actor_id: Option<i32>,
    ) -> Result<OutboxEvent, diesel::result::Error> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| diesel::result::Error::SerializationError(Box::new(e)))?;

        let event = DomainEvent {
            event_type,
            aggregate_type,
            aggregate_id,
            payload,
            metadata: EventMetadata::by(actor_id),
        };

        Self::write_event(conn, &event)
    }

    /// Records that `user_id` should be told something. Delivery happens elsewhere.
    pub fn notify(
        conn: &mut PgConnection,
        user_id: i32,
        title: impl Into<String>,
        message: impl Into<String>,
        actor_id: Option<i32>,
    ) -> Result<OutboxEvent, diesel::result::Error> {
        let payload = NotificationPayload {
            user_id,
            title: title.into(),
            message: message.into(),
        };
        Self::emit(
            conn,
            EventType::NotificationRequested,
            AggregateType::User,
            user_id,
            &payload,
            actor_id,
        )
    }

    #[instrument(skip(conn))]
    pub fn fetch_unpublished(
        conn: &mut PgConnection,
        limit: i64,
    ) -> Result<Vec<OutboxEvent>, diesel::result::Error> {
        outbox_events::table
            .filter(outbox_events::published.eq(false))
            .order(outbox_events::created_at.asc())
            .limit(limit)
            .select(OutboxEvent::as_select())
            .load(conn)
    }

    #[instrument(skip(conn, event_ids), fields(count = event_ids.len()))]
    pub fn mark_published_batch(
        conn: &mut PgConnection,
        event_ids: &[Uuid],
    ) -> Result<usize, diesel::result::Error> {
        let count = diesel::update(outbox_events::table)
            .filter(outbox_events::id.eq_any(event_ids))
            .set((
                outbox_events::published.eq(true),
                outbox_events::published_at.eq(diesel::dsl::now),
            ))
            .execute(conn)?;

        debug!(count, "Events marked as published");
        Ok(count)
    }

    #[instrument(skip(conn))]
    pub fn cleanup_old_events(
        conn: &mut PgConnection,
        older_than_days: i64,
    ) -> Result<usize, diesel::result::Error> {
        let now = chrono::Utc::now().naive_utc();
        let cutoff = now
            .checked_sub_signed(chrono::Duration::days(older_than_days))
            .unwrap_or(now);

        let count = diesel::delete(outbox_events::table)
            .filter(outbox_events::published.eq(true))
            .filter(outbox_events::published_at.lt(cutoff))
            .execute(conn)?;

        if count > 0 {
            debug!(count, older_than_days, "Purged published outbox events");
        }
        Ok(count)
    }
}
