//! Postgres-backed remote store.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};

use crate::adapter::{column, from_remote_row, remote_subset, to_remote_row, COLUMNS};
use crate::config::RemoteConfig;
use crate::error::StoreError;
use crate::models::{Field, Prospect, Settings};
use crate::settings::SettingsStore;
use crate::store::{RecordSource, RecordStore};

const SETTINGS_ROW: &str = "global";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Builds the pool without connecting. Connection problems surface on
    /// first use, where the caller treats them like any other remote failure.
    pub fn connect_lazy(config: &RemoteConfig) -> Result<Self, StoreError> {
        let options = PgConnectOptions::from_str(&config.url)?.password(&config.key);
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy_with(options);

        info!("Remote store configured at {}", config.url);
        Ok(Self { pool })
    }

    pub async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn update_statement(changed: &[Field]) -> Option<String> {
    let mut columns: Vec<&str> = Vec::new();
    for name in changed.iter().map(|field| column(*field)) {
        if !columns.contains(&name) {
            columns.push(name);
        }
    }
    if columns.is_empty() {
        return None;
    }

    let list = columns.join(", ");
    Some(format!(
        "UPDATE crm.prospects SET ({list}) = \
         (SELECT {list} FROM jsonb_populate_record(NULL::crm.prospects, $1)) \
         WHERE id = $2"
    ))
}

#[async_trait]
impl RecordSource for PgStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn fetch_all(&self) -> Result<Vec<Prospect>, StoreError> {
        let rows = sqlx::query(
            "SELECT row_to_json(p)::jsonb AS row FROM crm.prospects p ORDER BY p.created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut prospects = Vec::with_capacity(rows.len());
        for row in rows {
            let value: Value = row.try_get("row")?;
            match value {
                Value::Object(map) => prospects.push(from_remote_row(&map)),
                other => warn!("Skipping remote row that is not an object: {}", other),
            }
        }
        Ok(prospects)
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn insert(&self, prospect: &Prospect) -> Result<(), StoreError> {
        let columns = COLUMNS.join(", ");
        let statement = format!(
            "INSERT INTO crm.prospects ({columns}) \
             SELECT {columns} FROM jsonb_populate_record(NULL::crm.prospects, $1)"
        );
        sqlx::query(&statement)
            .bind(Value::Object(to_remote_row(prospect)))
            .execute(&self.pool)
            .await?;

        debug!("Inserted remote prospect {}", prospect.id);
        Ok(())
    }

    async fn update(&self, prospect: &Prospect, changed: &[Field]) -> Result<(), StoreError> {
        let Some(statement) = update_statement(changed) else {
            return Ok(());
        };
        let row = remote_subset(&to_remote_row(prospect), changed);

        let result = sqlx::query(&statement)
            .bind(Value::Object(row))
            .bind(&prospect.id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            debug!("Remote update matched no row for {}", prospect.id);
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM crm.prospects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for PgStore {
    async fn fetch_settings(&self) -> Result<Option<Settings>, StoreError> {
        let row = sqlx::query("SELECT profit_share_percent FROM crm.settings WHERE id = $1")
            .bind(SETTINGS_ROW)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let percent: Option<f64> = row.try_get("profit_share_percent")?;
        let defaults = Settings::default();
        Ok(Some(Settings {
            profit_share_percent: percent.unwrap_or(defaults.profit_share_percent),
        }))
    }

    async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO crm.settings (id, profit_share_percent)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE
            SET profit_share_percent = EXCLUDED.profit_share_percent
            "#,
        )
        .bind(SETTINGS_ROW)
        .bind(settings.profit_share_percent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
