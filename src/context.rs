use crate::bluefly::{BlueflyClient, DEFAULT_API_URL};
use crate::category_db::CategoryDb;
use crate::settings::{SyncSettings, settings_path_from_env};
use crate::shopify::ShopifyClient;
use crate::store::pipeline_log::PipelineLog;
use crate::store::webhook_log::EventLog;
use eyre::{WrapErr, eyre};
use std::path::PathBuf;
use tracing::warn;

/// Everything the pipeline needs, constructed once at startup and passed by
/// Arc into the handlers, the worker, and the batch runner. No ambient
/// globals: the clients live here or nowhere.
pub struct SyncContext {
    pub shopify: ShopifyClient,
    pub bluefly: BlueflyClient,
    pub webhook_log: EventLog,
    pub pipeline_log: PipelineLog,
    pub settings_path: PathBuf,
    category_db_url: Option<String>,
}

impl SyncContext {
    pub fn from_env() -> eyre::Result<Self> {
        let store = require_env("SHOPIFY_STORE")?;
        let access_token = require_env("SHOPIFY_ACCESS_TOKEN")?
            .trim_matches(['\'', '"'])
            .to_string();
        let seller_id = require_env("BLUEFLY_SELLER_ID")?;
        let seller_token = require_env("BLUEFLY_SELLER_TOKEN")?;
        let api_url =
            std::env::var("BLUEFLY_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
        let pipeline_log_dir =
            std::env::var("PIPELINE_LOG_DIR").unwrap_or_else(|_| "./pipeline_logs".to_string());

        Ok(Self {
            shopify: ShopifyClient::new(&store, &access_token),
            bluefly: BlueflyClient::new(&seller_id, &seller_token, &api_url),
            webhook_log: EventLog::new(&log_dir)
                .wrap_err_with(|| format!("cannot open event log at {log_dir}"))?,
            pipeline_log: PipelineLog::new(&pipeline_log_dir)
                .wrap_err_with(|| format!("cannot open pipeline log at {pipeline_log_dir}"))?,
            settings_path: settings_path_from_env(),
            category_db_url: std::env::var("CATEGORY_DB_URL").ok(),
        })
    }

    /// Current sync settings, read fresh from disk. Callers must not cache
    /// this across mapping operations — the file is edited externally.
    pub fn settings(&self) -> SyncSettings {
        SyncSettings::load(&self.settings_path)
    }

    /// Open a category-lookup scope for one batch run. Unconfigured or
    /// unreachable store degrades to `None` (lookups yield empty maps).
    pub async fn open_category_db(&self) -> Option<CategoryDb> {
        let url = self.category_db_url.as_deref()?;
        match CategoryDb::connect(url).await {
            Ok(db) => Some(db),
            Err(err) => {
                warn!(
                    target = "vendize.sql",
                    error = %err,
                    "category lookup store unavailable, syncing without mapped fields"
                );
                None
            }
        }
    }
}

fn require_env(key: &str) -> eyre::Result<String> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| eyre!("missing required env var {key}"))
}
