//! Shopify → Bluefly product sync pipeline.
//!
//! Consumes unread webhook events from the event log, enriches them via the
//! Shopify GraphQL API, transforms them to the Rithum payload shape with the
//! field mapper + category lookups, and pushes to the Bluefly API. Every
//! product attempt leaves a stage trail in the pipeline log:
//!
//!   queued → enriching → enriched → mapping → mapped → pushing → pushed
//!                                                    | error | skipped
//!
//! A failure in one event never aborts the rest of a batch.

use crate::category_db::{CategoryDb, lookup_or_empty};
use crate::context::SyncContext;
use crate::mapper::{
    build_bluefly_payload, build_quantity_price_payload, derive_sku, force_listing_status,
    get_metafield, should_sync_product,
};
use crate::models::ProductPayload;
use crate::shopify::ShopifyError;
use crate::store::LogError;
use crate::store::pipeline_log::{JobStage, PipelineLog};
use crate::store::webhook_log::{EventLog, EventStatus, LoggedEvent};
use serde_json::json;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

pub const PRODUCT_TOPICS: &[&str] = &["products/create", "products/update", "products/delete"];
pub const INVENTORY_TOPICS: &[&str] = &["inventory_levels/update"];

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("product {0} not found in Shopify")]
    ProductNotFound(u64),
    #[error("shopify: {0}")]
    Shopify(#[from] ShopifyError),
    #[error("log: {0}")]
    Log(#[from] LogError),
    #[error("Bluefly API error ({endpoint}): {message}")]
    Push {
        endpoint: &'static str,
        message: String,
    },
}

/// Terminal fate of one processed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Pushed,
    Skipped,
    Errored,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub pushed: usize,
    pub skipped: usize,
    pub errored: usize,
    pub deduplicated: usize,
}

// ---------------------------------------------------------------------------
// Deduplication
// ---------------------------------------------------------------------------

/// Keep only the latest event per product id. Older duplicates (and events
/// carrying no product id) go to the skipped list, to be marked processed
/// with no pipeline side effects — this avoids redundant and out-of-order
/// pushes when a product changed several times before the batch ran.
pub fn deduplicate_product_events(
    events: Vec<LoggedEvent>,
) -> (Vec<LoggedEvent>, Vec<LoggedEvent>) {
    let mut by_product: HashMap<u64, usize> = HashMap::new();
    for (idx, ev) in events.iter().enumerate() {
        let Some(pid) = ev.record.payload.get("id").and_then(|v| v.as_u64()) else {
            continue;
        };
        match by_product.get(&pid) {
            Some(&existing) if events[existing].record.timestamp >= ev.record.timestamp => {}
            _ => {
                by_product.insert(pid, idx);
            }
        }
    }

    let keep: Vec<usize> = by_product.into_values().collect();
    let mut latest = Vec::new();
    let mut skipped = Vec::new();
    for (idx, ev) in events.into_iter().enumerate() {
        if keep.contains(&idx) {
            latest.push(ev);
        } else {
            skipped.push(ev);
        }
    }
    (latest, skipped)
}

// ---------------------------------------------------------------------------
// Product events
// ---------------------------------------------------------------------------

/// Full product sync pipeline for a single product event.
pub async fn process_product_event(
    ctx: &SyncContext,
    db: Option<&CategoryDb>,
    event: &LoggedEvent,
) -> EventOutcome {
    let product_id = event
        .record
        .payload
        .get("id")
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    let topic = event.record.topic.clone();
    info!(
        target = "vendize.pipeline",
        topic = %topic,
        product_id,
        source = %event.path.display(),
        "processing product event"
    );

    let started = Instant::now();
    let prepared = prepare_job(ctx, event, &topic, product_id);
    let job_path = match prepared {
        Ok(path) => path,
        Err(err) => {
            error!(target = "vendize.pipeline", error = %err, "cannot open pipeline job");
            return EventOutcome::Errored;
        }
    };

    let outcome = match product_inner(ctx, db, event, &job_path, &topic, product_id).await {
        Ok(outcome) => outcome,
        Err(err) => {
            record_failure(&event.path, &job_path, &err);
            EventOutcome::Errored
        }
    };
    crate::metrics::pipeline_stage("product_event", started.elapsed().as_millis());
    outcome
}

async fn product_inner(
    ctx: &SyncContext,
    db: Option<&CategoryDb>,
    event: &LoggedEvent,
    job_path: &Path,
    topic: &str,
    product_id: u64,
) -> Result<EventOutcome, PipelineError> {
    // products/delete — nothing to do, the marketplace has no delete API.
    if topic == "products/delete" {
        info!(target = "vendize.pipeline", product_id, "product deleted, skipping");
        return skip(&event.path, job_path, "product deleted");
    }

    PipelineLog::append_stage(job_path, JobStage::Enriching, None, None)?;
    let enriched = ctx
        .shopify
        .get_product_full(product_id)
        .await?
        .ok_or(PipelineError::ProductNotFound(product_id))?;

    PipelineLog::append_stage(
        job_path,
        JobStage::Enriched,
        Some(json!({
            "title": enriched.title,
            "variant_count": enriched.variants.len(),
            "metafield_count": enriched.metafields.len(),
        })),
        None,
    )?;

    let settings = ctx.settings();

    if !should_sync_product(&enriched) {
        // Previously listed products get a best-effort delist push so stale
        // listings go dark instead of lingering Live.
        if get_metafield(&enriched, "custom", "bluefly_category").is_some() {
            let mut qp =
                build_quantity_price_payload(&enriched, &settings, ctx.bluefly.seller_id());
            force_listing_status(&mut qp, "NotLive");
            let result = ctx.bluefly.update_quantity_price(&[qp]).await;
            if !result.success {
                warn!(
                    target = "vendize.pipeline",
                    product_id,
                    error = result.error.as_deref().unwrap_or(""),
                    "delist push failed"
                );
            }
        }
        let reason = format!("status: {}", enriched.status);
        info!(target = "vendize.pipeline", product_id, %reason, "product not ACTIVE, skipping");
        return skip(&event.path, job_path, &reason);
    }

    let category_id = get_metafield(&enriched, "custom", "bluefly_category")
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    let Some(category_id) = category_id else {
        return skip(&event.path, job_path, "no bluefly_category");
    };

    if settings.eligibility.require_images && enriched.images.is_empty() {
        return skip(&event.path, job_path, "no images");
    }
    if settings.eligibility.require_quantity
        && enriched.variants.iter().all(|v| v.inventory_quantity <= 0)
    {
        return skip(&event.path, job_path, "no inventory");
    }

    PipelineLog::append_stage(job_path, JobStage::Mapping, None, None)?;

    let mut sql_field_map = BTreeMap::new();
    for variant in &enriched.variants {
        if variant.title.is_empty() {
            continue;
        }
        let fields = lookup_or_empty(db, &category_id, &variant.title).await;
        sql_field_map.insert(variant.title.clone(), fields);
    }

    // Create and update both go through the full-upsert endpoint: it
    // creates or replaces every field by SellerSKU.
    let payload =
        build_bluefly_payload(&enriched, &sql_field_map, &settings, ctx.bluefly.seller_id());

    PipelineLog::append_stage(
        job_path,
        JobStage::Mapped,
        Some(json!({
            "seller_sku": payload.seller_sku,
            "buyable_count": payload.buyable_products.len(),
            "endpoint": "products",
        })),
        None,
    )?;

    PipelineLog::append_stage(job_path, JobStage::Pushing, None, None)?;
    let result = ctx.bluefly.push_products(std::slice::from_ref(&payload)).await;

    if !result.success {
        return Err(PipelineError::Push {
            endpoint: "products",
            message: result.error.unwrap_or_else(|| "unknown".to_string()),
        });
    }

    PipelineLog::append_stage(
        job_path,
        JobStage::Pushed,
        Some(json!({
            "response_status": result.status_code,
            "endpoint": "products",
        })),
        None,
    )?;
    EventLog::update_status(&event.path, EventStatus::Processed)?;
    info!(
        target = "vendize.pipeline",
        product_id,
        status = result.status_code,
        "pushed to Bluefly"
    );
    Ok(EventOutcome::Pushed)
}

// ---------------------------------------------------------------------------
// Inventory events
// ---------------------------------------------------------------------------

/// Process an inventory_levels/update event: resolve the inventory item to
/// its product, then push a quantity/price-only update with the webhook's
/// `available` count on the affected variant.
pub async fn process_inventory_event(
    ctx: &SyncContext,
    db: Option<&CategoryDb>,
    event: &LoggedEvent,
) -> EventOutcome {
    let inventory_item_id = event
        .record
        .payload
        .get("inventory_item_id")
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    info!(
        target = "vendize.pipeline",
        inventory_item_id,
        source = %event.path.display(),
        "processing inventory event"
    );

    let started = Instant::now();
    let job_path = match prepare_job(ctx, event, "inventory_levels/update", inventory_item_id) {
        Ok(path) => path,
        Err(err) => {
            error!(target = "vendize.pipeline", error = %err, "cannot open pipeline job");
            return EventOutcome::Errored;
        }
    };

    let outcome = match inventory_inner(ctx, db, event, &job_path, inventory_item_id).await {
        Ok(outcome) => outcome,
        Err(err) => {
            record_failure(&event.path, &job_path, &err);
            EventOutcome::Errored
        }
    };
    crate::metrics::pipeline_stage("inventory_event", started.elapsed().as_millis());
    outcome
}

async fn inventory_inner(
    ctx: &SyncContext,
    db: Option<&CategoryDb>,
    event: &LoggedEvent,
    job_path: &Path,
    inventory_item_id: u64,
) -> Result<EventOutcome, PipelineError> {
    let new_available = event
        .record
        .payload
        .get("available")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);

    PipelineLog::append_stage(job_path, JobStage::Enriching, None, None)?;
    let Some(resolution) = ctx
        .shopify
        .find_product_by_inventory_item(inventory_item_id)
        .await?
    else {
        warn!(
            target = "vendize.pipeline",
            inventory_item_id, "could not resolve inventory item"
        );
        return skip(&event.path, job_path, "unresolvable inventory item");
    };

    // Rithum needs the full product structure even for a quantity update.
    let enriched = ctx
        .shopify
        .get_product_full(resolution.product_id)
        .await?
        .ok_or(PipelineError::ProductNotFound(resolution.product_id))?;

    PipelineLog::append_stage(
        job_path,
        JobStage::Enriched,
        Some(json!({
            "product_id": resolution.product_id,
            "variant_sku": resolution.variant_sku,
            "title": enriched.title,
        })),
        None,
    )?;

    let settings = ctx.settings();

    if !should_sync_product(&enriched) {
        let reason = format!("product status: {}", enriched.status);
        return skip(&event.path, job_path, &reason);
    }

    PipelineLog::append_stage(job_path, JobStage::Mapping, None, None)?;
    if get_metafield(&enriched, "custom", "bluefly_category")
        .filter(|c| !c.is_empty())
        .is_none()
    {
        return skip(&event.path, job_path, "no bluefly_category");
    }

    let mut payload = build_quantity_price_payload(&enriched, &settings, ctx.bluefly.seller_id());

    // Overwrite the affected variant's quantity with the webhook value. The
    // feed carries derived SellerSKUs, so match through the resolved
    // variant's derivation rather than the bare Shopify SKU.
    let target_sku = enriched
        .variants
        .iter()
        .find(|v| v.id == resolution.variant_id)
        .map(|v| derive_sku(v, ctx.bluefly.seller_id(), Some(&enriched)))
        .unwrap_or_else(|| resolution.variant_sku.clone());
    let updated = apply_quantity_override(&mut payload, &target_sku, new_available);
    if !updated {
        warn!(
            target = "vendize.pipeline",
            %target_sku,
            "no buyable product matched the updated variant"
        );
    }

    PipelineLog::append_stage(
        job_path,
        JobStage::Mapped,
        Some(json!({
            "variant_sku": target_sku,
            "quantity": new_available,
            "endpoint": "quantityprice",
        })),
        None,
    )?;

    PipelineLog::append_stage(job_path, JobStage::Pushing, None, None)?;
    let result = ctx.bluefly.update_quantity_price(&[payload]).await;

    if !result.success {
        return Err(PipelineError::Push {
            endpoint: "quantityprice",
            message: result.error.unwrap_or_else(|| "unknown".to_string()),
        });
    }

    PipelineLog::append_stage(
        job_path,
        JobStage::Pushed,
        Some(json!({
            "response_status": result.status_code,
            "endpoint": "quantityprice",
        })),
        None,
    )?;
    EventLog::update_status(&event.path, EventStatus::Processed)?;
    Ok(EventOutcome::Pushed)
}

fn apply_quantity_override(payload: &mut ProductPayload, seller_sku: &str, quantity: i64) -> bool {
    let mut updated = false;
    for buyable in &mut payload.buyable_products {
        if buyable.seller_sku == seller_sku {
            buyable.quantity = quantity;
            updated = true;
        }
    }
    updated
}

// ---------------------------------------------------------------------------
// Batch runner
// ---------------------------------------------------------------------------

/// Process all unread product and inventory events once: dedup, then run
/// each event through its pipeline within a single category-lookup scope.
/// Individual failures are recorded and skipped over, never fatal to the
/// batch.
pub async fn run_batch(ctx: &SyncContext) -> Result<BatchSummary, LogError> {
    let unread = ctx.webhook_log.query_by_status(EventStatus::Unread, None)?;

    let mut product_events = Vec::new();
    let mut inventory_events = Vec::new();
    let mut other = 0usize;
    for ev in unread {
        let topic = ev.record.topic.as_str();
        if PRODUCT_TOPICS.contains(&topic) {
            product_events.push(ev);
        } else if INVENTORY_TOPICS.contains(&topic) {
            inventory_events.push(ev);
        } else {
            other += 1;
        }
    }
    info!(
        target = "vendize.pipeline",
        products = product_events.len(),
        inventory = inventory_events.len(),
        other,
        "scanned unread events"
    );

    let mut summary = BatchSummary::default();

    let (latest_products, duplicates) = deduplicate_product_events(product_events);
    summary.deduplicated = duplicates.len();
    for ev in &duplicates {
        if let Err(err) = EventLog::update_status(&ev.path, EventStatus::Processed) {
            warn!(target = "vendize.pipeline", error = %err, "cannot mark duplicate processed");
        }
    }

    // One lookup-store scope for the whole run, released on the way out.
    let db = ctx.open_category_db().await;

    for ev in &latest_products {
        tally(&mut summary, process_product_event(ctx, db.as_ref(), ev).await);
    }
    for ev in &inventory_events {
        tally(&mut summary, process_inventory_event(ctx, db.as_ref(), ev).await);
    }

    if let Some(db) = &db {
        db.close().await;
    }

    info!(
        target = "vendize.pipeline",
        pushed = summary.pushed,
        skipped = summary.skipped,
        errored = summary.errored,
        deduplicated = summary.deduplicated,
        "batch complete"
    );
    Ok(summary)
}

fn tally(summary: &mut BatchSummary, outcome: EventOutcome) {
    match outcome {
        EventOutcome::Pushed => summary.pushed += 1,
        EventOutcome::Skipped => summary.skipped += 1,
        EventOutcome::Errored => summary.errored += 1,
    }
}

// ---------------------------------------------------------------------------
// Shared plumbing
// ---------------------------------------------------------------------------

fn prepare_job(
    ctx: &SyncContext,
    event: &LoggedEvent,
    topic: &str,
    product_id: u64,
) -> Result<std::path::PathBuf, PipelineError> {
    EventLog::update_status(&event.path, EventStatus::Processing)?;
    let job_path = ctx.pipeline_log.create_job(
        &event.path.display().to_string(),
        topic,
        product_id,
        &event.record.event_id,
    )?;
    Ok(job_path)
}

fn skip(
    event_path: &Path,
    job_path: &Path,
    reason: &str,
) -> Result<EventOutcome, PipelineError> {
    PipelineLog::append_stage(
        job_path,
        JobStage::Skipped,
        Some(json!({ "reason": reason })),
        None,
    )?;
    EventLog::update_status(event_path, EventStatus::Processed)?;
    Ok(EventOutcome::Skipped)
}

/// Record a failed event: error stage on the job, error status on the
/// source event. Surfaced for manual reprocessing, never retried here.
fn record_failure(event_path: &Path, job_path: &Path, err: &PipelineError) {
    error!(target = "vendize.pipeline", error = %err, "event failed");
    if let Err(log_err) =
        PipelineLog::append_stage(job_path, JobStage::Error, None, Some(err.to_string()))
    {
        error!(target = "vendize.pipeline", error = %log_err, "cannot record job error");
    }
    if let Err(log_err) = EventLog::update_status(event_path, EventStatus::Error) {
        error!(target = "vendize.pipeline", error = %log_err, "cannot record event error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BuyableProduct, FieldEntry};
    use crate::store::webhook_log::WebhookEvent;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::path::PathBuf;

    fn event_at(offset_secs: i64, product_id: u64, tag: &str) -> LoggedEvent {
        let mut record = WebhookEvent::new(
            &format!("evt-{tag}"),
            "products/update",
            "demo.myshopify.com",
            json!({ "id": product_id }),
        );
        record.timestamp = Utc::now() + Duration::seconds(offset_secs);
        LoggedEvent {
            path: PathBuf::from(format!("/logs/2026-02-25/{tag}.json")),
            record,
        }
    }

    #[test]
    fn dedup_keeps_latest_event_per_product() {
        let events = vec![
            event_at(0, 42, "t1"),
            event_at(10, 42, "t2"),
            event_at(20, 42, "t3"),
            event_at(30, 7, "t4"),
        ];
        let (latest, skipped) = deduplicate_product_events(events);

        let mut kept: Vec<(u64, String)> = latest
            .iter()
            .map(|e| {
                (
                    e.record.payload["id"].as_u64().unwrap(),
                    e.record.event_id.clone(),
                )
            })
            .collect();
        kept.sort();
        assert_eq!(
            kept,
            vec![(7, "evt-t4".to_string()), (42, "evt-t3".to_string())]
        );

        let mut dropped: Vec<String> = skipped.iter().map(|e| e.record.event_id.clone()).collect();
        dropped.sort();
        assert_eq!(dropped, vec!["evt-t1", "evt-t2"]);
    }

    #[test]
    fn dedup_drops_events_without_product_id() {
        let mut no_id = event_at(0, 1, "x");
        no_id.record.payload = json!({ "note": "malformed" });
        let (latest, skipped) = deduplicate_product_events(vec![no_id]);
        assert!(latest.is_empty());
        assert_eq!(skipped.len(), 1);
    }

    #[test]
    fn dedup_single_event_passes_through() {
        let (latest, skipped) = deduplicate_product_events(vec![event_at(0, 9, "only")]);
        assert_eq!(latest.len(), 1);
        assert!(skipped.is_empty());
    }

    #[test]
    fn skip_records_reason_and_settles_both_logs() {
        let dir = tempfile::tempdir().unwrap();
        let event_log = crate::store::webhook_log::EventLog::new(dir.path().join("logs")).unwrap();
        let pipeline_log = PipelineLog::new(dir.path().join("pipeline_logs")).unwrap();

        let record = WebhookEvent::new(
            "evt-inv",
            "inventory_levels/update",
            "demo.myshopify.com",
            json!({ "inventory_item_id": 555, "available": 0 }),
        );
        let event_path = event_log.append(record).unwrap();
        let job_path = pipeline_log
            .create_job(
                &event_path.display().to_string(),
                "inventory_levels/update",
                555,
                "evt-inv",
            )
            .unwrap();

        let outcome = skip(&event_path, &job_path, "no bluefly_category").unwrap();
        assert_eq!(outcome, EventOutcome::Skipped);

        let job: crate::store::pipeline_log::PipelineJob =
            serde_json::from_str(&std::fs::read_to_string(&job_path).unwrap()).unwrap();
        assert_eq!(job.status, JobStage::Skipped);
        assert_eq!(
            job.stages.last().unwrap().data.as_ref().unwrap()["reason"],
            "no bluefly_category"
        );
        assert!(job.error.is_none());

        let event: crate::store::webhook_log::WebhookEvent =
            serde_json::from_str(&std::fs::read_to_string(&event_path).unwrap()).unwrap();
        assert_eq!(event.status, EventStatus::Processed);
    }

    #[test]
    fn quantity_override_touches_only_matching_sku() {
        let mut payload = ProductPayload {
            fields: Vec::new(),
            seller_sku: "a".to_string(),
            buyable_products: vec![
                BuyableProduct {
                    fields: vec![FieldEntry::new("is_returnable", Some("Not Returnable".into()))],
                    quantity: 5,
                    seller_sku: "a".to_string(),
                    listing_status: "Live".to_string(),
                },
                BuyableProduct {
                    fields: Vec::new(),
                    quantity: 7,
                    seller_sku: "b".to_string(),
                    listing_status: "Live".to_string(),
                },
            ],
            options: None,
        };

        assert!(apply_quantity_override(&mut payload, "b", 0));
        assert_eq!(payload.buyable_products[0].quantity, 5);
        assert_eq!(payload.buyable_products[1].quantity, 0);

        assert!(!apply_quantity_override(&mut payload, "zzz", 1));
    }
}
