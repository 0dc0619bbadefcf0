use chrono::{DateTime, SecondsFormat, Utc};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{DatabaseError, Result};
use crate::models::{Activity, HeartRateSample, ZoneConfiguration, ZoneTimeRecord};
use crate::store::{ActivityRepository, ConfigurationStore, SampleProvider, ZoneStore};

const ACTIVITY_COLUMNS: &str = r#"
    id, user_id, provider_id, name, sport, distance, moving_time, elapsed_time,
    start_date, average_hr, max_hr, has_heart_rate, zone_data
"#;

/// Compressed heart-rate stream for efficient storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressedSamples {
    pub compressed_data: Vec<u8>,
    pub original_size: usize,
    pub point_count: usize,
}

impl CompressedSamples {
    /// Compress a sample sequence (bincode, then gzip)
    pub fn compress(samples: &[HeartRateSample]) -> std::result::Result<Self, DatabaseError> {
        let serialized = bincode::serialize(samples)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        let original_size = serialized.len();

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&serialized)?;
        let compressed_data = encoder.finish()?;

        Ok(Self {
            compressed_data,
            original_size,
            point_count: samples.len(),
        })
    }

    /// Decompress back to samples
    pub fn decompress(&self) -> std::result::Result<Vec<HeartRateSample>, DatabaseError> {
        let mut decoder = GzDecoder::new(self.compressed_data.as_slice());
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;

        bincode::deserialize(&decompressed).map_err(|e| DatabaseError::Serialization(e.to_string()))
    }

    /// Original size / compressed size
    pub fn compression_ratio(&self) -> f64 {
        if self.compressed_data.is_empty() {
            return 0.0;
        }
        self.original_size as f64 / self.compressed_data.len() as f64
    }
}

/// SQLite-backed store
pub struct Database {
    conn: Connection,
    default_configuration: ZoneConfiguration,
}

impl Database {
    /// Create or open a database at the specified path
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path).map_err(DatabaseError::from)?;
        Self::with_connection(conn)
    }

    /// Private in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::from)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn,
            default_configuration: ZoneConfiguration::default(),
        };
        db.init_schema().map_err(DatabaseError::from)?;
        Ok(db)
    }

    /// Configuration reported for users without a saved one
    pub fn with_default_configuration(mut self, config: ZoneConfiguration) -> Self {
        self.default_configuration = config;
        self
    }

    /// Initialize database schema with tables and indexes
    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;

        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS zone_configurations (
                user_id TEXT PRIMARY KEY,
                config_json TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;

        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS activities (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                provider_id INTEGER UNIQUE,
                name TEXT NOT NULL,
                sport TEXT NOT NULL,
                distance REAL,
                moving_time INTEGER,
                elapsed_time INTEGER,
                start_date TEXT NOT NULL,
                average_hr REAL,
                max_hr REAL,
                has_heart_rate BOOLEAN NOT NULL DEFAULT FALSE,

                -- Time-in-zone record as JSON
                zone_data TEXT,

                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;

        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS heart_rate_streams (
                activity_id TEXT PRIMARY KEY,
                compressed_data BLOB NOT NULL,
                original_size INTEGER NOT NULL,
                point_count INTEGER NOT NULL,
                compression_ratio REAL NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,

                FOREIGN KEY (activity_id) REFERENCES activities (id) ON DELETE CASCADE
            )
            "#,
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_activities_user_start ON activities (user_id, start_date)",
            [],
        )?;

        Ok(())
    }

    /// Number of stored activities
    pub fn activity_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM activities", [], |row| row.get(0))
            .map_err(DatabaseError::from)?;
        Ok(count as usize)
    }

    fn query_activities(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Activity>> {
        let mut stmt = self.conn.prepare(sql).map_err(DatabaseError::from)?;
        let rows = stmt
            .query_map(params, activity_from_row)
            .map_err(DatabaseError::from)?;

        let mut activities = Vec::new();
        for activity in rows {
            activities.push(activity.map_err(DatabaseError::from)?);
        }
        Ok(activities)
    }
}

fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(index: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

/// Stored zone JSON that fails to parse is treated as missing
fn parse_zone_data(activity_id: &str, raw: Option<String>) -> Option<ZoneTimeRecord> {
    let raw = raw?;
    match serde_json::from_str(&raw) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(activity_id, error = %e, "Ignoring malformed zone record");
            None
        }
    }
}

fn activity_from_row(row: &Row) -> rusqlite::Result<Activity> {
    let id: String = row.get("id")?;
    let start_date = parse_timestamp(8, &row.get::<_, String>("start_date")?)?;
    let zone_record = parse_zone_data(&id, row.get("zone_data")?);

    Ok(Activity {
        user_id: row.get("user_id")?,
        provider_id: row.get("provider_id")?,
        name: row.get("name")?,
        sport: row.get("sport")?,
        distance: row.get("distance")?,
        moving_time: row.get("moving_time")?,
        elapsed_time: row.get("elapsed_time")?,
        start_date,
        average_hr: row.get("average_hr")?,
        max_hr: row.get("max_hr")?,
        has_heart_rate: row.get("has_heart_rate")?,
        zone_record,
        id,
    })
}

fn record_json(record: &Option<ZoneTimeRecord>) -> Result<Option<String>> {
    Ok(match record {
        Some(record) => Some(serde_json::to_string(record)?),
        None => None,
    })
}

impl ConfigurationStore for Database {
    fn zone_configuration(&self, user_id: &str) -> Result<ZoneConfiguration> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT config_json FROM zone_configurations WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(DatabaseError::from)?;

        match stored {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(self.default_configuration.clone()),
        }
    }

    fn save_zone_configuration(&mut self, user_id: &str, config: &ZoneConfiguration) -> Result<()> {
        let json = serde_json::to_string(config)?;
        upsert_configuration(&self.conn, user_id, &json)
    }
}

fn upsert_configuration(conn: &Connection, user_id: &str, json: &str) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO zone_configurations (user_id, config_json, updated_at)
        VALUES (?1, ?2, CURRENT_TIMESTAMP)
        ON CONFLICT(user_id) DO UPDATE SET
            config_json = excluded.config_json,
            updated_at = CURRENT_TIMESTAMP
        "#,
        params![user_id, json],
    )
    .map_err(DatabaseError::from)?;
    Ok(())
}

fn serialize_updates(updates: &[(String, Option<ZoneTimeRecord>)]) -> Result<Vec<(&String, Option<String>)>> {
    updates
        .iter()
        .map(|(id, record)| Ok((id, record_json(record)?)))
        .collect()
}

/// Write zone records inside an open transaction. An unknown or foreign
/// activity id fails with `NotFound`; the caller's transaction then rolls
/// back on drop.
fn write_zone_records(conn: &Connection, user_id: &str, serialized: &[(&String, Option<String>)]) -> Result<()> {
    for (activity_id, zone_data) in serialized {
        let changed = conn
            .execute(
                r#"
                UPDATE activities
                SET zone_data = ?1, updated_at = CURRENT_TIMESTAMP
                WHERE id = ?2 AND user_id = ?3
                "#,
                params![zone_data, activity_id, user_id],
            )
            .map_err(DatabaseError::from)?;

        if changed == 0 {
            return Err(DatabaseError::NotFound {
                table: "activities".to_string(),
                id: (*activity_id).clone(),
            }
            .into());
        }
    }
    Ok(())
}

impl SampleProvider for Database {
    fn heart_rate_samples(&self, activity_id: &str) -> Result<Option<Vec<HeartRateSample>>> {
        let stored = self
            .conn
            .query_row(
                "SELECT compressed_data, original_size, point_count FROM heart_rate_streams WHERE activity_id = ?1",
                params![activity_id],
                |row| {
                    Ok(CompressedSamples {
                        compressed_data: row.get(0)?,
                        original_size: row.get::<_, i64>(1)? as usize,
                        point_count: row.get::<_, i64>(2)? as usize,
                    })
                },
            )
            .optional()
            .map_err(DatabaseError::from)?;

        match stored {
            Some(compressed) => Ok(Some(compressed.decompress()?)),
            None => Ok(None),
        }
    }
}

impl ActivityRepository for Database {
    fn insert_activity(&mut self, activity: &Activity, samples: Option<&[HeartRateSample]>) -> Result<()> {
        let zone_data = record_json(&activity.zone_record)?;
        let compressed = samples.map(CompressedSamples::compress).transpose()?;

        let tx = self.conn.transaction().map_err(DatabaseError::from)?;

        let existing: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM activities WHERE id = ?1 OR (provider_id IS NOT NULL AND provider_id = ?2)",
                params![activity.id, activity.provider_id],
                |row| row.get(0),
            )
            .map_err(DatabaseError::from)?;
        if existing > 0 {
            return Err(DatabaseError::Duplicate {
                table: "activities".to_string(),
                key: activity.id.clone(),
            }
            .into());
        }

        tx.execute(
            r#"
            INSERT INTO activities (
                id, user_id, provider_id, name, sport, distance, moving_time, elapsed_time,
                start_date, average_hr, max_hr, has_heart_rate, zone_data
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                activity.id,
                activity.user_id,
                activity.provider_id,
                activity.name,
                activity.sport,
                activity.distance,
                activity.moving_time,
                activity.elapsed_time,
                format_timestamp(activity.start_date),
                activity.average_hr,
                activity.max_hr,
                activity.has_heart_rate,
                zone_data,
            ],
        )
        .map_err(DatabaseError::from)?;

        if let Some(compressed) = compressed {
            tx.execute(
                r#"
                INSERT INTO heart_rate_streams (
                    activity_id, compressed_data, original_size, point_count, compression_ratio
                ) VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    activity.id,
                    compressed.compressed_data,
                    compressed.original_size as i64,
                    compressed.point_count as i64,
                    compressed.compression_ratio(),
                ],
            )
            .map_err(DatabaseError::from)?;
        }

        tx.commit().map_err(DatabaseError::from)?;
        Ok(())
    }

    fn activity(&self, activity_id: &str) -> Result<Option<Activity>> {
        let sql = format!("SELECT {} FROM activities WHERE id = ?1", ACTIVITY_COLUMNS);
        Ok(self.query_activities(&sql, params![activity_id])?.into_iter().next())
    }

    fn activity_by_provider_id(&self, provider_id: i64) -> Result<Option<Activity>> {
        let sql = format!("SELECT {} FROM activities WHERE provider_id = ?1", ACTIVITY_COLUMNS);
        Ok(self.query_activities(&sql, params![provider_id])?.into_iter().next())
    }

    fn heart_rate_activities(&self, user_id: &str) -> Result<Vec<Activity>> {
        let sql = format!(
            "SELECT {} FROM activities WHERE user_id = ?1 AND has_heart_rate = 1 ORDER BY start_date DESC",
            ACTIVITY_COLUMNS
        );
        self.query_activities(&sql, params![user_id])
    }

    fn zone_records_in_window(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ZoneTimeRecord>> {
        // Stored timestamps have whole-second precision; widen the SQL range to
        // whole seconds and apply the exact bounds afterwards
        let sql = format!(
            r#"
            SELECT {} FROM activities
            WHERE user_id = ?1 AND has_heart_rate = 1
              AND start_date >= ?2 AND start_date <= ?3
            ORDER BY start_date DESC
            "#,
            ACTIVITY_COLUMNS
        );
        let upper = end
            .checked_add_signed(chrono::Duration::seconds(1))
            .unwrap_or(end);
        let activities = self.query_activities(
            &sql,
            params![user_id, format_timestamp(start), format_timestamp(upper)],
        )?;

        Ok(activities
            .into_iter()
            .filter(|activity| activity.start_date >= start && activity.start_date <= end)
            .filter_map(|activity| activity.zone_record)
            .collect())
    }

    fn replace_zone_records(
        &mut self,
        user_id: &str,
        updates: &[(String, Option<ZoneTimeRecord>)],
    ) -> Result<usize> {
        let serialized = serialize_updates(updates)?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(DatabaseError::from)?;
        write_zone_records(&tx, user_id, &serialized)?;
        tx.commit().map_err(DatabaseError::from)?;

        Ok(serialized.len())
    }
}

impl ZoneStore for Database {
    fn apply_zone_configuration(
        &mut self,
        user_id: &str,
        config: &ZoneConfiguration,
        updates: &[(String, Option<ZoneTimeRecord>)],
    ) -> Result<usize> {
        let json = serde_json::to_string(config)?;
        let serialized = serialize_updates(updates)?;

        // Takes the write lock up front so another process cannot slip a
        // configuration change in between
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(DatabaseError::from)?;
        upsert_configuration(&tx, user_id, &json)?;
        write_zone_records(&tx, user_id, &serialized)?;
        tx.commit().map_err(DatabaseError::from)?;

        Ok(serialized.len())
    }
}
