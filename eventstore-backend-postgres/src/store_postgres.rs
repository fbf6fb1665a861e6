use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, PgConnection, PgPool, Row};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use eventstore_core::{
    query::{AppendCondition, DcbEvent, Query, SequencedEvent},
    DcbRecorder, StoreError, StoreStream,
};

use crate::config::{check_identifier_length, check_schema_identifier, PgConfig};
use crate::strategy::IndexStrategy;
use crate::tt;
use crate::ts;

const TS_TABLE: &str = "dcb_events";
const TT_MAIN_TABLE: &str = "dcb_events_tt_main";
const TT_TAG_TABLE: &str = "dcb_events_tt_tag";

/// Durable recorder backed by Postgres, in either of two interchangeable
/// index encodings (see [`IndexStrategy`]). Both encodings implement
/// [`DcbRecorder`] identically from the caller's point of view.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    strategy: IndexStrategy,
    /// Bounds callers waiting for a pooled connection once the pool is
    /// saturated (`PgConfig::max_waiting`); `None` means unbounded.
    waiting: Option<Arc<Semaphore>>,
}

impl PostgresStore {
    /// Connect using a fully assembled [`PgConfig`], running migrations for
    /// the configured [`IndexStrategy`] if `create_table` is set.
    pub async fn connect(config: &PgConfig) -> Result<Arc<Self>, StoreError> {
        check_identifier_length(TS_TABLE).and(check_identifier_length(TT_MAIN_TABLE))?;
        check_identifier_length(TT_TAG_TABLE)?;
        check_schema_identifier(&config.schema)?;

        let lock_timeout_ms = config.lock_timeout.as_millis() as i64;
        let idle_timeout_ms = config.idle_in_transaction_session_timeout.as_millis() as i64;
        let schema = config.schema.clone();
        let create_schema = config.create_table;

        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size + config.max_overflow)
            .acquire_timeout(config.connect_timeout)
            .max_lifetime(config.conn_max_age)
            .test_before_acquire(config.pre_ping)
            .after_connect(move |conn, _meta| {
                let schema = schema.clone();
                Box::pin(async move {
                    sqlx::query(&format!("SET lock_timeout = {lock_timeout_ms}"))
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query(&format!(
                        "SET idle_in_transaction_session_timeout = {idle_timeout_ms}"
                    ))
                    .execute(&mut *conn)
                    .await?;
                    // `schema` was validated by `check_schema_identifier` before the
                    // pool was built, so interpolating it into a quoted identifier
                    // here is safe.
                    if create_schema {
                        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS \"{schema}\""))
                            .execute(&mut *conn)
                            .await?;
                    }
                    sqlx::query(&format!("SET search_path TO \"{schema}\", public"))
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(&config.connection_string())
            .await
            .map_err(|e| StoreError::Operational(e.to_string()))?;

        if config.create_table {
            run_migrations(&pool, config.index_strategy).await?;
        }

        let waiting = (config.max_waiting > 0)
            .then(|| Arc::new(Semaphore::new(config.max_waiting as usize)));

        Ok(Arc::new(Self {
            pool,
            strategy: config.index_strategy,
            waiting,
        }))
    }

    /// Connect directly from a `postgres://` URL, for tests that build
    /// their own [`PgConfig`]-free connection string (e.g. testcontainers).
    pub async fn connect_for_tests(
        database_url: &str,
        strategy: IndexStrategy,
    ) -> Result<Arc<Self>, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Operational(e.to_string()))?;
        run_migrations(&pool, strategy).await?;
        Ok(Arc::new(Self {
            pool,
            strategy,
            waiting: None,
        }))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn strategy(&self) -> IndexStrategy {
        self.strategy
    }

    /// Reserve a waiting slot if `max_waiting` bounds the pool's wait queue,
    /// failing fast with `OperationalError` rather than queuing indefinitely
    /// once that bound is exceeded (spec.md §5: "pool exhaustion raises
    /// OperationalError; it is never silent").
    fn acquire_waiting_slot(&self) -> Result<Option<OwnedSemaphorePermit>, StoreError> {
        match &self.waiting {
            None => Ok(None),
            Some(sem) => sem.clone().try_acquire_owned().map(Some).map_err(|_| {
                StoreError::Operational(
                    "connection pool max_waiting exceeded; too many callers already queued"
                        .to_string(),
                )
            }),
        }
    }
}

async fn run_migrations(pool: &PgPool, strategy: IndexStrategy) -> Result<(), StoreError> {
    // Embedded at compile time relative to CARGO_MANIFEST_DIR (unlike
    // `Migrator::new`, which resolves its path against the runtime working
    // directory and would break under `cargo test` from the workspace root).
    let migrator = match strategy {
        IndexStrategy::Ts => sqlx::migrate!("./migrations/ts"),
        IndexStrategy::Tt => sqlx::migrate!("./migrations/tt"),
    };
    migrator
        .run(pool)
        .await
        .map_err(|e| StoreError::Internal(anyhow::anyhow!(e)))
}

fn map_db_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
            let message = db_err.message().to_string();
            match code.as_str() {
                "23514" | "22P02" => StoreError::Data(message),
                // lock_timeout exceeded (55P03) or idle-in-transaction killed (25P03):
                // both are transient, caller-retriable conditions per spec.md §5/§7.
                "55P03" | "25P03" => StoreError::Operational(message),
                _ => StoreError::Internal(anyhow::anyhow!(message)),
            }
        }
        sqlx::Error::PoolTimedOut => StoreError::Operational("connection pool exhausted".into()),
        sqlx::Error::Io(e) => StoreError::Operational(e.to_string()),
        other => StoreError::Internal(anyhow::anyhow!(other)),
    }
}

fn row_to_event(row: &PgRow) -> SequencedEvent {
    let position: i64 = row.get(match row.columns().iter().any(|c| c.name() == "position") {
        true => "position",
        false => "id",
    });
    SequencedEvent {
        event: DcbEvent {
            r#type: row.get("type"),
            data: row.get::<Option<Vec<u8>>, _>("data").unwrap_or_default(),
            tags: row.get("tags"),
        },
        position,
    }
}

#[async_trait]
impl DcbRecorder for PostgresStore {
    async fn append(
        &self,
        events: Vec<DcbEvent>,
        condition: Option<AppendCondition>,
    ) -> Result<i64, StoreError> {
        if events.is_empty() {
            return Err(StoreError::programming(
                "append requires at least one event",
            ));
        }

        let _waiting_permit = self.acquire_waiting_slot()?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Operational(e.to_string()))?;

        let lock_table = match self.strategy {
            IndexStrategy::Ts => TS_TABLE,
            IndexStrategy::Tt => TT_MAIN_TABLE,
        };
        sqlx::query(&format!("LOCK TABLE {lock_table} IN EXCLUSIVE MODE"))
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;

        if let Some(condition) = &condition {
            let floor = condition.floor();
            let hit = match self.strategy {
                IndexStrategy::Ts => {
                    ts_exists(&mut tx, floor, &condition.fail_if_events_match).await?
                }
                IndexStrategy::Tt => {
                    tt_exists(&mut tx, floor, &condition.fail_if_events_match).await?
                }
            };
            if let Some(position) = hit {
                tx.rollback()
                    .await
                    .map_err(|e| StoreError::Operational(e.to_string()))?;
                return Err(StoreError::integrity_at(
                    "append condition matched an existing event",
                    position,
                ));
            }
        }

        let mut last_position = 0;
        for event in events {
            last_position = match self.strategy {
                IndexStrategy::Ts => ts_insert(&mut tx, &event).await?,
                IndexStrategy::Tt => tt_insert(&mut tx, &event).await?,
            };
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Operational(e.to_string()))?;

        Ok(last_position)
    }

    async fn read(
        &self,
        query: Option<Query>,
        after: Option<i64>,
        limit: Option<i64>,
    ) -> Result<(Vec<SequencedEvent>, Option<i64>), StoreError> {
        let query = query.unwrap_or_default();
        let after = after.unwrap_or(0);
        let _waiting_permit = self.acquire_waiting_slot()?;

        let mut events = match self.strategy {
            IndexStrategy::Ts => ts_read(&self.pool, &query, after, limit).await?,
            IndexStrategy::Tt => tt_read(&self.pool, &query, after, limit).await?,
        };

        let head = if let Some(limit) = limit {
            let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
            events.truncate(limit);
            events.last().map(|e| e.position)
        } else {
            let table = match self.strategy {
                IndexStrategy::Ts => TS_TABLE,
                IndexStrategy::Tt => TT_MAIN_TABLE,
            };
            let id_col = match self.strategy {
                IndexStrategy::Ts => "position",
                IndexStrategy::Tt => "id",
            };
            sqlx::query_scalar::<_, Option<i64>>(&format!("SELECT MAX({id_col}) FROM {table}"))
                .fetch_one(&self.pool)
                .await
                .map_err(map_db_error)?
        };

        Ok((events, head))
    }

    /// Best-effort replay-then-live stream. Each poll re-runs the same
    /// `read` query from the last-seen position; the first poll cycle that
    /// drains all currently-committed matches *is* the replay, after which
    /// polling continues to surface newly committed events. Simpler than
    /// the teacher's explicit `Replay`/`Live` phase split, since both
    /// phases issue the identical parameterized query here.
    fn subscribe(&self, query: Option<Query>, after: i64) -> StoreStream<SequencedEvent> {
        let pool = self.pool.clone();
        let strategy = self.strategy;
        let query = Arc::new(query.unwrap_or_default());

        Box::pin(stream::unfold(
            (pool, query, after),
            move |(pool, query, cursor)| async move {
                loop {
                    let events = match strategy {
                        IndexStrategy::Ts => ts_read(&pool, &query, cursor, None).await,
                        IndexStrategy::Tt => tt_read(&pool, &query, cursor, None).await,
                    };
                    let events = match events {
                        Ok(events) => events,
                        Err(e) => return Some((Err(e), (pool, query, cursor))),
                    };
                    if let Some(event) = events.into_iter().next() {
                        let next_cursor = event.position;
                        return Some((Ok(event), (pool, query, next_cursor)));
                    }
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
            },
        ))
    }
}

async fn ts_exists(
    tx: &mut PgConnection,
    floor: i64,
    query: &Query,
) -> Result<Option<i64>, StoreError> {
    let text_query = ts::build_query_text(&query.items);
    let sql = match &text_query {
        Some(_) => format!(
            "SELECT position FROM {TS_TABLE} WHERE position > $1 \
             AND text_vector @@ to_tsquery('simple', $2) LIMIT 1"
        ),
        None => format!("SELECT position FROM {TS_TABLE} WHERE position > $1 LIMIT 1"),
    };
    let mut q = sqlx::query(&sql).bind(floor);
    if let Some(tq) = &text_query {
        q = q.bind(tq);
    }
    let row = q.fetch_optional(&mut *tx).await.map_err(map_db_error)?;
    Ok(row.map(|r| r.get::<i64, _>("position")))
}

async fn ts_insert(tx: &mut PgConnection, event: &DcbEvent) -> Result<i64, StoreError> {
    let vector = ts::build_text_vector(&event.r#type, &event.tags)?;
    let row = sqlx::query(
        "INSERT INTO dcb_events (type, data, tags, text_vector) \
         VALUES ($1, $2, $3, to_tsvector('simple', $4)) RETURNING position",
    )
    .bind(&event.r#type)
    .bind(&event.data)
    .bind(&event.tags)
    .bind(&vector)
    .fetch_one(&mut *tx)
    .await
    .map_err(map_db_error)?;
    Ok(row.get("position"))
}

async fn ts_read(
    pool: &PgPool,
    query: &Query,
    after: i64,
    limit: Option<i64>,
) -> Result<Vec<SequencedEvent>, StoreError> {
    let text_query = ts::build_query_text(&query.items);
    let mut sql = match &text_query {
        Some(_) => format!(
            "SELECT position, type, data, tags FROM {TS_TABLE} \
             WHERE position > $1 AND text_vector @@ to_tsquery('simple', $2) \
             ORDER BY position ASC"
        ),
        None => format!(
            "SELECT position, type, data, tags FROM {TS_TABLE} \
             WHERE position > $1 ORDER BY position ASC"
        ),
    };
    if limit.is_some() {
        // $2 is the tsquery bind only when `text_query` is present, so the
        // limit placeholder's number shifts depending on that.
        let limit_placeholder = if text_query.is_some() { 3 } else { 2 };
        sql.push_str(&format!(" LIMIT ${limit_placeholder}"));
    }
    let mut q = sqlx::query(&sql).bind(after);
    if let Some(tq) = &text_query {
        q = q.bind(tq);
    }
    if let Some(limit) = limit {
        q = q.bind(limit);
    }
    let rows = q.fetch_all(pool).await.map_err(map_db_error)?;
    Ok(rows.iter().map(row_to_event).collect())
}

async fn tt_exists(
    tx: &mut PgConnection,
    floor: i64,
    query: &Query,
) -> Result<Option<i64>, StoreError> {
    let matches = tt_read_tx(tx, query, floor, Some(1)).await?;
    Ok(matches.first().map(|e| e.position))
}

async fn tt_insert(tx: &mut PgConnection, event: &DcbEvent) -> Result<i64, StoreError> {
    let row = sqlx::query(
        "INSERT INTO dcb_events_tt_main (type, data, tags) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(&event.r#type)
    .bind(&event.data)
    .bind(&event.tags)
    .fetch_one(&mut *tx)
    .await
    .map_err(map_db_error)?;
    let main_id: i64 = row.get("id");

    if !event.tags.is_empty() {
        sqlx::query(
            "INSERT INTO dcb_events_tt_tag (tag, type, main_id) \
             SELECT tag, $2, $3 FROM unnest($1::text[]) AS tag",
        )
        .bind(&event.tags)
        .bind(&event.r#type)
        .bind(main_id)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;
    }

    Ok(main_id)
}

async fn tt_read(
    pool: &PgPool,
    query: &Query,
    after: i64,
    limit: Option<i64>,
) -> Result<Vec<SequencedEvent>, StoreError> {
    let mut conn = pool.acquire().await.map_err(map_db_error)?;
    tt_read_tx(&mut conn, query, after, limit).await
}

async fn tt_read_tx(
    conn: &mut PgConnection,
    query: &Query,
    after: i64,
    limit: Option<i64>,
) -> Result<Vec<SequencedEvent>, StoreError> {
    match tt::classify(query) {
        tt::Shape::MatchAll => {
            let mut sql = format!(
                "SELECT id, type, data, tags FROM {TT_MAIN_TABLE} WHERE id > $1 ORDER BY id ASC"
            );
            if limit.is_some() {
                sql.push_str(" LIMIT $2");
            }
            let mut q = sqlx::query(&sql).bind(after);
            if let Some(limit) = limit {
                q = q.bind(limit);
            }
            let rows = q.fetch_all(&mut *conn).await.map_err(map_db_error)?;
            Ok(rows.iter().map(row_to_event).collect())
        }
        tt::Shape::SingleType(ty) => {
            let mut sql = format!(
                "SELECT id, type, data, tags FROM {TT_MAIN_TABLE} \
                 WHERE type = $1 AND id > $2 ORDER BY id ASC"
            );
            if limit.is_some() {
                sql.push_str(" LIMIT $3");
            }
            let mut q = sqlx::query(&sql).bind(ty).bind(after);
            if let Some(limit) = limit {
                q = q.bind(limit);
            }
            let rows = q.fetch_all(&mut *conn).await.map_err(map_db_error)?;
            Ok(rows.iter().map(row_to_event).collect())
        }
        tt::Shape::Tagged(items) => {
            let mut merged: Vec<SequencedEvent> = Vec::new();
            for item in items {
                // Tags are semantically a set (spec.md §3): a duplicate in
                // `item.tags` must not raise the required match count above
                // the number of *distinct* tags, or this would under-match
                // relative to `QueryItem::matches` and the TS encoding.
                let mut distinct_tags = item.tags.clone();
                distinct_tags.sort_unstable();
                distinct_tags.dedup();

                let sql = format!(
                    "SELECT m.id, m.type, m.data, m.tags FROM {TT_MAIN_TABLE} m \
                     WHERE m.id > $1 \
                     AND ($2::text[] = '{{}}' OR m.type = ANY($2)) \
                     AND m.id IN ( \
                         SELECT main_id FROM {TT_TAG_TABLE} \
                         WHERE tag = ANY($3) \
                         GROUP BY main_id \
                         HAVING COUNT(DISTINCT tag) = $4 \
                     ) \
                     ORDER BY m.id ASC"
                );
                let rows = sqlx::query(&sql)
                    .bind(after)
                    .bind(&item.types)
                    .bind(&distinct_tags)
                    .bind(distinct_tags.len() as i64)
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(map_db_error)?;
                merged.extend(rows.iter().map(row_to_event));
            }
            merged.sort_by_key(|e| e.position);
            merged.dedup_by_key(|e| e.position);
            if let Some(limit) = limit {
                merged.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
            }
            Ok(merged)
        }
        tt::Shape::Unsupported => Err(StoreError::NotSupported(
            "TT encoding cannot evaluate this query shape; supply tags on every \
             item, or narrow a tagless item to exactly one type"
                .into(),
        )),
    }
}
