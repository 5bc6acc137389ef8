//! Category-specific field lookup store.
//!
//! Maps a Bluefly category ID + variant title (size value) to the
//! category's field name/value pairs, e.g. glasses_magnification or the EU
//! size fields. The lookup is strictly best-effort: any failure degrades to
//! an empty map with a warning and never fails the sync of an item.

use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

const LOOKUP_QUERY: &str = "\
    SELECT m.field_name, m.bf_value \
    FROM bf_categories c \
    INNER JOIN bf_mapping m ON c.field_name = m.field_name \
    WHERE c.category_id = $1 \
    AND m.sh_value = $2";

/// Connection scope for one orchestration batch: connect once, pass by
/// reference into the per-event processors, close on every exit path.
pub struct CategoryDb {
    pool: PgPool,
}

impl CategoryDb {
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;
        info!(target = "vendize.sql", "category lookup store connected");
        Ok(Self { pool })
    }

    /// Field name → value pairs for a category + variant size. Empty map on
    /// no matches or on any failure.
    pub async fn lookup_category_fields(
        &self,
        category_id: &str,
        variant_title: &str,
    ) -> BTreeMap<String, String> {
        let rows = match sqlx::query(LOOKUP_QUERY)
            .bind(category_id)
            .bind(variant_title)
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows,
            Err(err) => {
                warn!(
                    target = "vendize.sql",
                    category_id,
                    variant_title,
                    error = %err,
                    "category lookup failed, continuing without mapped fields"
                );
                return BTreeMap::new();
            }
        };

        let mut results = BTreeMap::new();
        for row in &rows {
            let (Ok(name), Ok(value)) = (
                row.try_get::<String, _>("field_name"),
                row.try_get::<String, _>("bf_value"),
            ) else {
                continue;
            };
            results.insert(name, value);
        }
        info!(
            target = "vendize.sql",
            category_id,
            variant_title,
            rows = rows.len(),
            "category lookup"
        );
        results
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Lookup through an optional scope — absent store yields empty maps, so a
/// missing or unreachable database never blocks the pipeline.
pub async fn lookup_or_empty(
    db: Option<&CategoryDb>,
    category_id: &str,
    variant_title: &str,
) -> BTreeMap<String, String> {
    match db {
        Some(db) => db.lookup_category_fields(category_id, variant_title).await,
        None => BTreeMap::new(),
    }
}
