use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::cache::{KeyValueStore, SETTINGS_KEY};
use crate::error::StoreError;
use crate::models::Settings;

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn fetch_settings(&self) -> Result<Option<Settings>, StoreError>;

    async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError>;
}

/// Global settings, cached locally and mirrored to the remote store when one exists.
pub struct SettingsController {
    local: KeyValueStore,
    remote: Option<Arc<dyn SettingsStore>>,
    current: Settings,
}

impl SettingsController {
    /// Starts from the local copy (stored values over defaults), then lets the
    /// remote copy win if it can be read.
    pub async fn load(local: KeyValueStore, remote: Option<Arc<dyn SettingsStore>>) -> Self {
        let mut current: Settings = local.get_json(SETTINGS_KEY).unwrap_or_default();

        if let Some(store) = &remote {
            match store.fetch_settings().await {
                Ok(Some(settings)) => {
                    current = settings;
                    if let Err(err) = local.set_json(SETTINGS_KEY, &current) {
                        warn!("Failed to cache remote settings: {}", err);
                    }
                }
                Ok(None) => info!("No remote settings yet, using local copy"),
                Err(err) => warn!("Failed to load remote settings: {}", err),
            }
        }

        Self {
            local,
            remote,
            current,
        }
    }

    pub fn current(&self) -> &Settings {
        &self.current
    }

    /// Saves locally first; the remote write is best-effort.
    pub async fn set_profit_share(&mut self, percent: f64) -> Result<&Settings, StoreError> {
        let updated = Settings {
            profit_share_percent: percent.clamp(0.0, 100.0),
        };
        self.local.set_json(SETTINGS_KEY, &updated)?;
        self.current = updated;

        if let Some(store) = &self.remote {
            if let Err(err) = store.save_settings(&self.current).await {
                warn!("Failed to mirror settings, local copy kept: {}", err);
            }
        }
        Ok(&self.current)
    }
}
