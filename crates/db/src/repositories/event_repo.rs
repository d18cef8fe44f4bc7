//! Repository for the `events` and `event_participants` tables.

use sqlx::{PgPool, Postgres, Transaction};
use certgen_core::types::DbId;

use crate::models::event::{CreateEvent, Event};

/// Column list for `events` queries.
const COLUMNS: &str = "id, code, name, template_id, created_at, updated_at";

/// Provides event lookups, roster access, and the per-event generation lock.
pub struct EventRepo;

impl EventRepo {
    /// Insert a new event.
    pub async fn create(pool: &PgPool, input: &CreateEvent) -> Result<Event, sqlx::Error> {
        let query = format!(
            "INSERT INTO events (code, name, template_id) VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Event>(&query)
            .bind(&input.code)
            .bind(&input.name)
            .bind(input.template_id)
            .fetch_one(pool)
            .await
    }

    /// Find an event by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Event>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM events WHERE id = $1");
        sqlx::query_as::<_, Event>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Lock the event row for the rest of the transaction.
    ///
    /// Serializes concurrent generation runs for the same event so their
    /// serial counters never overlap.
    pub async fn lock_for_update(
        tx: &mut Transaction<'_, Postgres>,
        id: DbId,
    ) -> Result<Option<Event>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM events WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Event>(&query)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Point an event at a template (or clear it).
    pub async fn set_template(
        pool: &PgPool,
        id: DbId,
        template_id: Option<DbId>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE events SET template_id = $2 WHERE id = $1")
            .bind(id)
            .bind(template_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Register a participant. Re-registering is a no-op.
    pub async fn add_participant(
        pool: &PgPool,
        event_id: DbId,
        user_detail_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO event_participants (event_id, user_detail_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(event_id)
        .bind(user_detail_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// IDs of every registered participant, in registration order.
    pub async fn participant_ids(pool: &PgPool, event_id: DbId) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT user_detail_id FROM event_participants \
             WHERE event_id = $1 ORDER BY registered_at, user_detail_id",
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
    }
}
