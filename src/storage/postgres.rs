use super::{ReadingStore, StorageError};
use crate::config::DatabaseConfig;
use crate::domain::{LatencySample, Reading};
use async_trait::async_trait;
use sqlx::{Connection, PgConnection};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

struct TableDef {
    name: &'static str,
    create: &'static str,
    hypertable: &'static str,
}

const TABLES: [TableDef; 2] = [
    TableDef {
        name: "sensor_data",
        create: r#"
        CREATE TABLE IF NOT EXISTS sensor_data (
            time        TIMESTAMPTZ       NOT NULL,
            sensor_id   TEXT              NOT NULL,
            temperature DOUBLE PRECISION  NULL,
            humidity    DOUBLE PRECISION  NULL,
            dust        DOUBLE PRECISION  NULL
        );
        "#,
        hypertable: "SELECT create_hypertable('sensor_data', 'time', if_not_exists => TRUE);",
    },
    TableDef {
        name: "sensor_latency",
        create: r#"
        CREATE TABLE IF NOT EXISTS sensor_latency (
            time        TIMESTAMPTZ       NOT NULL,
            sensor_id   TEXT              NOT NULL,
            latency     DOUBLE PRECISION  NOT NULL
        );
        "#,
        hypertable: "SELECT create_hypertable('sensor_latency', 'time', if_not_exists => TRUE);",
    },
];

const INSERT_READING: &str = r#"
    INSERT INTO sensor_data (time, sensor_id, temperature, humidity, dust)
    VALUES ($1, $2, $3, $4, $5);
"#;

const INSERT_LATENCY: &str = r#"
    INSERT INTO sensor_latency (time, sensor_id, latency)
    VALUES ($1, $2, $3);
"#;

/// TimescaleDB-backed store holding one connection for the process lifetime.
///
/// The connection sits behind an async mutex, so writes reach the database
/// one at a time in the order the handlers acquired it.
pub struct PgStore {
    conn: Mutex<Option<PgConnection>>,
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore").finish_non_exhaustive()
    }
}

impl PgStore {
    /// Connect, waiting out a database that is not up yet.
    ///
    /// Every failure is followed by a fixed `retry_delay_seconds` pause. With
    /// `max_connect_attempts` unset this only returns once connected.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StorageError> {
        let options = config.connect_options();
        let delay = config.retry_delay();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match PgConnection::connect_with(&options).await {
                Ok(conn) => {
                    info!(
                        host = %config.host,
                        port = config.port,
                        database = %config.name,
                        attempt,
                        "Connected to TimescaleDB"
                    );
                    return Ok(Self::from_connection(conn));
                }
                Err(e) => {
                    if config.max_connect_attempts.is_some_and(|max| attempt >= max) {
                        return Err(StorageError::ConnectExhausted { attempts: attempt, source: e });
                    }
                    warn!(attempt, "Error connecting: {}. Is the database ready?", e);
                    warn!("Retrying in {} seconds...", delay.as_secs());
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    pub fn from_connection(conn: PgConnection) -> Self {
        Self { conn: Mutex::new(Some(conn)) }
    }
}

/// true when `create_hypertable` failed only because the work was already done
pub fn is_already_hypertable(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => is_already_hypertable_message(db.message()),
        _ => false,
    }
}

fn is_already_hypertable_message(message: &str) -> bool {
    message.contains("already exists")
        || message.contains("is already a hypertable")
        || message.contains("is not empty")
}

async fn write_reading(conn: &mut PgConnection, reading: &Reading) -> Result<(), sqlx::Error> {
    sqlx::query(INSERT_READING)
        .bind(reading.timestamp)
        .bind(&reading.sensor_id)
        .bind(reading.temperature)
        .bind(reading.humidity)
        .bind(reading.dust)
        .execute(conn)
        .await?;
    Ok(())
}

async fn write_latency(conn: &mut PgConnection, sample: &LatencySample) -> Result<(), sqlx::Error> {
    sqlx::query(INSERT_LATENCY)
        .bind(sample.timestamp)
        .bind(&sample.sensor_id)
        .bind(sample.latency)
        .execute(conn)
        .await?;
    Ok(())
}

#[async_trait]
impl ReadingStore for PgStore {
    async fn initialize(&self) -> Result<(), StorageError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::Closed)?;

        for table in &TABLES {
            sqlx::query(table.create).execute(&mut *conn).await?;

            match sqlx::query(table.hypertable).execute(&mut *conn).await {
                Ok(_) => debug!(table = table.name, "Hypertable ready"),
                Err(e) if is_already_hypertable(&e) => {
                    debug!(table = table.name, "Hypertable already in place: {}", e)
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!("Database schema configured");
        Ok(())
    }

    async fn insert_reading(&self, reading: &Reading) -> Result<(), StorageError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::Closed)?;
        write_reading(conn, reading).await?;
        Ok(())
    }

    async fn insert_latency(&self, sample: &LatencySample) -> Result<(), StorageError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::Closed)?;
        write_latency(conn, sample).await?;
        Ok(())
    }

    async fn insert_reading_with_latency(
        &self,
        reading: &Reading,
        sample: &LatencySample,
    ) -> Result<(), StorageError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::Closed)?;

        // dropping `tx` on an early return rolls both rows back
        let mut tx = conn.begin().await?;
        write_reading(&mut *tx, reading).await?;
        write_latency(&mut *tx, sample).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn close(&self) {
        let Some(conn) = self.conn.lock().await.take() else {
            return;
        };
        match conn.close().await {
            Ok(()) => info!("Database connection closed"),
            Err(e) => warn!("Error while closing database connection: {}", e),
        }
    }
}
