/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Batch render jobs are identified by an opaque UUID minted by the orchestrator.
pub type JobId = uuid::Uuid;
