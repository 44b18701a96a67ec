use sqlx::PgPool;

// ============================================================================
// Schema bootstrap
// ============================================================================
//
// Four aggregate tables keyed by order_uid, plus the dead letter queue.
// Statements are idempotent; there is no migration history.
//
// ============================================================================

const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS orders (
        order_uid          TEXT PRIMARY KEY,
        track_number       TEXT NOT NULL,
        entry              TEXT NOT NULL,
        locale             TEXT NOT NULL,
        internal_signature TEXT NOT NULL,
        delivery_service   TEXT NOT NULL,
        shardkey           TEXT NOT NULL,
        sm_id              BIGINT NOT NULL,
        date_created       TEXT NOT NULL,
        oof_shard          TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS delivery (
        order_uid TEXT PRIMARY KEY REFERENCES orders (order_uid) ON DELETE CASCADE,
        name      TEXT NOT NULL,
        phone     TEXT NOT NULL,
        zip       TEXT NOT NULL,
        city      TEXT NOT NULL,
        address   TEXT NOT NULL,
        region    TEXT NOT NULL,
        email     TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS payment (
        order_uid     TEXT PRIMARY KEY REFERENCES orders (order_uid) ON DELETE CASCADE,
        \"transaction\" TEXT NOT NULL,
        request_id    TEXT NOT NULL,
        currency      TEXT NOT NULL,
        provider      TEXT NOT NULL,
        amount        BIGINT NOT NULL,
        payment_dt    BIGINT NOT NULL,
        bank          TEXT NOT NULL,
        delivery_cost BIGINT NOT NULL,
        goods_total   BIGINT NOT NULL,
        custom_fee    BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS items (
        order_uid    TEXT NOT NULL REFERENCES orders (order_uid) ON DELETE CASCADE,
        line_no      INTEGER NOT NULL,
        chrt_id      BIGINT NOT NULL,
        track_number TEXT NOT NULL,
        price        BIGINT NOT NULL,
        rid          TEXT NOT NULL,
        name         TEXT NOT NULL,
        sale         BIGINT NOT NULL,
        size         TEXT NOT NULL,
        total_price  BIGINT NOT NULL,
        nm_id        BIGINT NOT NULL,
        brand        TEXT NOT NULL,
        status       BIGINT NOT NULL,
        PRIMARY KEY (order_uid, line_no)
    )",
    "CREATE TABLE IF NOT EXISTS dead_letter_queue (
        id              UUID PRIMARY KEY,
        topic           TEXT NOT NULL,
        kafka_partition INTEGER NOT NULL,
        kafka_offset    BIGINT NOT NULL,
        payload         TEXT NOT NULL,
        error_message   TEXT NOT NULL,
        failure_count   INTEGER NOT NULL,
        first_failed_at TIMESTAMPTZ NOT NULL,
        last_failed_at  TIMESTAMPTZ NOT NULL,
        created_at      TIMESTAMPTZ NOT NULL
    )",
];

/// Create any missing tables.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!(tables = STATEMENTS.len(), "Database schema ready");
    Ok(())
}
