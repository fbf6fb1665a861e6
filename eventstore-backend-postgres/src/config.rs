use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use eventstore_core::StoreError;

use crate::strategy::IndexStrategy;

const MAX_IDENTIFIER_BYTES: usize = 63;

/// Connection and pool parameters, read from the `POSTGRES_*` environment
/// variables following the naming convention of
/// `eventsourcing.postgres.Factory`.
#[derive(Clone)]
pub struct PgConfig {
    pub dbname: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub schema: String,
    pub pool_size: u32,
    pub max_overflow: u32,
    /// Bounds the number of callers allowed to queue for a pooled connection
    /// once the pool is saturated; 0 means unbounded (the default). Mirrors
    /// `PostgresFactory.POSTGRES_MAX_WAITING` / `ConnectionPool.max_waiting`
    /// in the original implementation.
    pub max_waiting: u32,
    pub connect_timeout: Duration,
    pub conn_max_age: Option<Duration>,
    pub pre_ping: bool,
    pub lock_timeout: Duration,
    pub idle_in_transaction_session_timeout: Duration,
    pub create_table: bool,
    pub index_strategy: IndexStrategy,
    /// Indirection allowing credential rotation: when set, consulted for a
    /// fresh password at connect time instead of `password`. Mirrors
    /// `POSTGRES_GET_PASSWORD_TOPIC` resolving to a callable in the original
    /// implementation; since Rust has no dynamic-import equivalent of a
    /// "topic" string, this is set programmatically via
    /// [`Self::with_password_provider`] rather than from the environment.
    pub get_password_func: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

impl fmt::Debug for PgConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConfig")
            .field("dbname", &self.dbname)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("schema", &self.schema)
            .field("pool_size", &self.pool_size)
            .field("max_overflow", &self.max_overflow)
            .field("max_waiting", &self.max_waiting)
            .field("connect_timeout", &self.connect_timeout)
            .field("conn_max_age", &self.conn_max_age)
            .field("pre_ping", &self.pre_ping)
            .field("lock_timeout", &self.lock_timeout)
            .field(
                "idle_in_transaction_session_timeout",
                &self.idle_in_transaction_session_timeout,
            )
            .field("create_table", &self.create_table)
            .field("index_strategy", &self.index_strategy)
            .field("get_password_func", &self.get_password_func.is_some())
            .finish()
    }
}

impl PgConfig {
    /// Build a [`PgConfig`] from `POSTGRES_*`/`DCB_*` environment variables.
    /// `POSTGRES_DBNAME`, `POSTGRES_HOST`, `POSTGRES_USER`, and
    /// `POSTGRES_PASSWORD` are required; everything else has a default.
    pub fn from_env() -> Result<Self, StoreError> {
        let dbname = require_env("POSTGRES_DBNAME")?;
        let host = require_env("POSTGRES_HOST")?;
        let port = optional_env("POSTGRES_PORT")
            .map(|v| parse_env("POSTGRES_PORT", &v))
            .transpose()?
            .unwrap_or(5432);
        let user = require_env("POSTGRES_USER")?;
        let password = require_env("POSTGRES_PASSWORD")?;
        let schema = optional_env("POSTGRES_SCHEMA")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "public".to_string());

        let pool_size = optional_env("DCB_POOL_SIZE")
            .map(|v| parse_env("DCB_POOL_SIZE", &v))
            .transpose()?
            .unwrap_or(5);
        let max_overflow = optional_env("DCB_MAX_OVERFLOW")
            .map(|v| parse_env("DCB_MAX_OVERFLOW", &v))
            .transpose()?
            .unwrap_or(10);
        let max_waiting = optional_env("POSTGRES_MAX_WAITING")
            .filter(|v| !v.is_empty())
            .map(|v| parse_env("POSTGRES_MAX_WAITING", &v))
            .transpose()?
            .unwrap_or(0);
        let connect_timeout = optional_env("DCB_CONNECT_TIMEOUT")
            .map(|v| parse_env::<u64>("DCB_CONNECT_TIMEOUT", &v))
            .transpose()?
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        let conn_max_age = match optional_env("POSTGRES_CONN_MAX_AGE") {
            None => None,
            Some(v) if v.is_empty() => None,
            Some(v) => Some(Duration::from_secs_f64(parse_env(
                "POSTGRES_CONN_MAX_AGE",
                &v,
            )?)),
        };

        let pre_ping = optional_env("POSTGRES_PRE_PING")
            .map(|v| parse_bool("POSTGRES_PRE_PING", &v))
            .transpose()?
            .unwrap_or(false);

        let lock_timeout = optional_env("POSTGRES_LOCK_TIMEOUT")
            .map(|v| parse_env::<f64>("POSTGRES_LOCK_TIMEOUT", &v))
            .transpose()?
            .map(Duration::from_secs_f64)
            .unwrap_or(Duration::ZERO);

        let idle_in_transaction_session_timeout = optional_env("DCB_IDLE_IN_TRANSACTION_TIMEOUT")
            .map(|v| parse_env::<f64>("DCB_IDLE_IN_TRANSACTION_TIMEOUT", &v))
            .transpose()?
            .map(Duration::from_secs_f64)
            .unwrap_or(Duration::from_secs(5));

        let create_table = optional_env("CREATE_TABLE")
            .map(|v| parse_bool("CREATE_TABLE", &v))
            .transpose()?
            .unwrap_or(true);

        let index_strategy = match optional_env("DCB_INDEX_STRATEGY")
            .unwrap_or_else(|| "tt".to_string())
            .to_lowercase()
            .as_str()
        {
            "ts" => IndexStrategy::Ts,
            "tt" => IndexStrategy::Tt,
            other => {
                return Err(StoreError::programming(format!(
                    "DCB_INDEX_STRATEGY must be 'ts' or 'tt', got '{other}'"
                )))
            }
        };

        Ok(Self {
            dbname,
            host,
            port,
            user,
            password,
            schema,
            pool_size,
            max_overflow,
            max_waiting,
            connect_timeout,
            conn_max_age,
            pre_ping,
            lock_timeout,
            idle_in_transaction_session_timeout,
            create_table,
            index_strategy,
            get_password_func: None,
        })
    }

    /// Install a credential-rotation callback, consulted for a fresh
    /// password at every connect instead of the static `password` field.
    pub fn with_password_provider(
        mut self,
        f: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.get_password_func = Some(Arc::new(f));
        self
    }

    /// The password to connect with: the freshly resolved value from
    /// `get_password_func` if one is set, otherwise the static `password`.
    pub fn effective_password(&self) -> String {
        match &self.get_password_func {
            Some(f) => f(),
            None => self.password.clone(),
        }
    }

    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user,
            self.effective_password(),
            self.host,
            self.port,
            self.dbname
        )
    }
}

/// Reject table/index names exceeding Postgres's 63-byte identifier limit,
/// mirroring `check_identifier_length` in `postgres_ts.py`/`postgres_tt.py`.
pub fn check_identifier_length(name: &str) -> Result<(), StoreError> {
    if name.len() > MAX_IDENTIFIER_BYTES {
        return Err(StoreError::programming(format!(
            "identifier '{name}' is {} bytes, exceeding Postgres's {MAX_IDENTIFIER_BYTES}-byte limit",
            name.len()
        )));
    }
    Ok(())
}

/// Validate a schema name before it is interpolated into a quoted
/// identifier (`"schema"`) for `CREATE SCHEMA`/`SET search_path`. Rejects
/// the identifier-length limit and any embedded `"`, which would otherwise
/// let a misconfigured schema name break out of the quoting.
pub fn check_schema_identifier(schema: &str) -> Result<(), StoreError> {
    check_identifier_length(schema)?;
    if schema.contains('"') {
        return Err(StoreError::programming(format!(
            "schema name '{schema}' contains a double quote, which is not allowed"
        )));
    }
    Ok(())
}

fn require_env(key: &str) -> Result<String, StoreError> {
    std::env::var(key).map_err(|_| {
        StoreError::programming(format!("Postgres database not specified in environment with key '{key}'"))
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, StoreError> {
    value.parse().map_err(|_| {
        StoreError::programming(format!(
            "Postgres environment value for key '{key}' is invalid: '{value}'"
        ))
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, StoreError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "y" | "t" => Ok(true),
        "0" | "false" | "no" | "off" | "n" | "f" | "" => Ok(false),
        _ => Err(StoreError::programming(format!(
            "Postgres environment value for key '{key}' is invalid: '{value}'"
        ))),
    }
}
