//! Connection pool, embedded migrations, and the serialized writer actor.

use std::sync::Arc;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use liftlog_core::errors::Result;
use log::error;

use crate::errors::StorageError;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const CONNECTION_PRAGMAS: &str =
    "PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;";

#[derive(Debug, Clone, Copy)]
struct ConnectionOptions;

impl r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(
        &self,
        conn: &mut SqliteConnection,
    ) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute(CONNECTION_PRAGMAS)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Build the read pool and run pending migrations.
pub fn create_pool(database_url: &str) -> Result<Arc<DbPool>> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(8)
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)
        .map_err(StorageError::from)?;

    let mut conn = pool.get().map_err(StorageError::from)?;
    run_migrations(&mut conn)?;

    Ok(Arc::new(pool))
}

pub fn run_migrations(conn: &mut SqliteConnection) -> Result<()> {
    conn.run_pending_migrations(MIGRATIONS)
        .map(|_| ())
        .map_err(|err| StorageError::Migration(err.to_string()))?;
    Ok(())
}

pub fn get_connection(pool: &Arc<DbPool>) -> Result<DbConnection> {
    Ok(pool.get().map_err(StorageError::from)?)
}

type WriteJob = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

/// Serialized write access to the store.
///
/// All mutations funnel through one dedicated connection on a dedicated
/// thread; each job runs inside an immediate transaction, so a mutation and
/// its outbox append commit or roll back together, and an interrupted
/// caller can never leave a partial write behind.
#[derive(Clone)]
pub struct WriteHandle {
    tx: tokio::sync::mpsc::UnboundedSender<WriteJob>,
}

impl WriteHandle {
    pub fn spawn(database_url: &str) -> Result<Self> {
        let mut conn =
            SqliteConnection::establish(database_url).map_err(StorageError::from)?;
        conn.batch_execute(CONNECTION_PRAGMAS)
            .map_err(StorageError::from)?;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<WriteJob>();
        std::thread::Builder::new()
            .name("liftlog-writer".to_string())
            .spawn(move || {
                while let Some(job) = rx.blocking_recv() {
                    job(&mut conn);
                }
            })
            .map_err(|err| StorageError::Internal(format!("writer thread: {err}")))?;

        Ok(Self { tx })
    }

    /// Run a job on the writer connection inside an immediate transaction.
    pub async fn exec<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let wrapped: WriteJob = Box::new(move |conn| {
            let result = conn
                .immediate_transaction::<T, StorageError, _>(|tx_conn| {
                    job(tx_conn).map_err(StorageError::Domain)
                })
                .map_err(liftlog_core::Error::from);
            if done_tx.send(result).is_err() {
                // Caller went away; the transaction already committed or
                // rolled back, so the store stays consistent either way.
                error!("Write completed but the caller dropped the result");
            }
        });

        self.tx
            .send(wrapped)
            .map_err(|_| StorageError::Internal("writer thread is gone".to_string()))?;
        done_rx
            .await
            .map_err(|_| StorageError::Internal("writer dropped the job".to_string()))?
    }
}

pub(crate) fn enum_to_db<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)
        .map_err(liftlog_core::Error::from)?
        .trim_matches('"')
        .to_string())
}

pub(crate) fn enum_from_db<T: serde::de::DeserializeOwned>(value: &str) -> Result<T> {
    Ok(serde_json::from_str(&format!("\"{}\"", value)).map_err(liftlog_core::Error::from)?)
}

/// Parse a stored RFC3339 timestamp; corrupt values collapse to the epoch
/// floor instead of failing a read.
pub(crate) fn parse_rfc3339(value: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC)
}
