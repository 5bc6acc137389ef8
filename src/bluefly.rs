//! Bluefly/Rithum API client.
//!
//! Pushes product payloads to the Rithum feed endpoint. Three surfaces:
//!   GET  <base>                — download current catalog (async-poll protocol)
//!   POST <base>                — full-field product upsert
//!   POST <base>/quantityprice  — price/quantity/status-only update
//!
//! Network results come back as uniform outcome structs (success flag +
//! status code + error) rather than bubbling errors past the orchestrator.

use crate::http::{build_bulk_client, build_client};
use crate::models::ProductPayload;
use rand::Rng;
use reqwest::Client;
use serde_json::Value;
use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

const MAX_RETRIES: u32 = 3;
const CATALOG_MAX_POLL: u32 = 10;
const CATALOG_POLL_INTERVAL: Duration = Duration::from_secs(3);

pub const DEFAULT_API_URL: &str =
    "https://webhook.mindcloud.co/v1/webhook/bluefly/rithum/v2/products";

#[derive(Debug, Clone)]
pub struct PushOutcome {
    pub success: bool,
    pub status_code: u16,
    pub body: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CatalogOutcome {
    pub success: bool,
    pub status_code: u16,
    pub data: Option<Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BlueflyClient {
    api_url: String,
    quantity_price_url: String,
    seller_id: String,
    seller_token: String,
    http: Client,
    bulk_http: Client,
}

impl BlueflyClient {
    pub fn new(seller_id: &str, seller_token: &str, api_url: &str) -> Self {
        let api_url = api_url.trim_end_matches('/').to_string();
        Self {
            quantity_price_url: format!("{api_url}/quantityprice"),
            api_url,
            seller_id: seller_id.to_string(),
            seller_token: seller_token.to_string(),
            http: build_client(),
            bulk_http: build_bulk_client(),
        }
    }

    pub fn seller_id(&self) -> &str {
        &self.seller_id
    }

    /// POST to the full-upsert endpoint. Creates or updates all fields
    /// (idempotent by SellerSKU) — used for every product event.
    pub async fn push_products(&self, products: &[ProductPayload]) -> PushOutcome {
        self.post(&self.api_url, products).await
    }

    /// POST to /quantityprice — price, special_price, quantity,
    /// is_returnable, ListingStatus only.
    pub async fn update_quantity_price(&self, products: &[ProductPayload]) -> PushOutcome {
        self.post(&self.quantity_price_url, products).await
    }

    async fn post(&self, url: &str, payload: &[ProductPayload]) -> PushOutcome {
        let mut last_error = String::new();

        for attempt in 1..=MAX_RETRIES {
            let response = self
                .http
                .post(url)
                .header("sellerid", &self.seller_id)
                .header("sellertoken", &self.seller_token)
                .json(payload)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    if (200..300).contains(&status) {
                        debug!(
                            target = "vendize.bluefly",
                            status,
                            body = %truncate(&body, 200),
                            "push accepted"
                        );
                        return PushOutcome {
                            success: true,
                            status_code: status,
                            body,
                            error: None,
                        };
                    }
                    last_error = format!("HTTP {status}: {}", truncate(&body, 500));
                    // Retry on 5xx or 429 only
                    if status >= 500 || status == 429 {
                        warn!(
                            target = "vendize.bluefly",
                            attempt,
                            max = MAX_RETRIES,
                            error = %last_error,
                            "retrying push"
                        );
                        sleep(backoff(attempt)).await;
                        continue;
                    }
                    return PushOutcome {
                        success: false,
                        status_code: status,
                        body,
                        error: Some(last_error),
                    };
                }
                Err(err) => {
                    last_error = err.to_string();
                    warn!(
                        target = "vendize.bluefly",
                        attempt,
                        max = MAX_RETRIES,
                        error = %last_error,
                        "transport error, retrying push"
                    );
                    sleep(backoff(attempt)).await;
                }
            }
        }

        PushOutcome {
            success: false,
            status_code: 0,
            body: String::new(),
            error: Some(format!(
                "All {MAX_RETRIES} attempts failed. Last: {last_error}"
            )),
        }
    }

    async fn get(&self, url: &str) -> CatalogOutcome {
        let mut last_error = String::new();

        for attempt in 1..=MAX_RETRIES {
            let response = self
                .bulk_http
                .get(url)
                .header("sellerid", &self.seller_id)
                .header("sellertoken", &self.seller_token)
                .header("Accept", "application/json")
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    if (200..300).contains(&status) {
                        let data = serde_json::from_str::<Value>(&body)
                            .unwrap_or(Value::String(body));
                        return CatalogOutcome {
                            success: true,
                            status_code: status,
                            data: Some(data),
                            error: None,
                        };
                    }
                    last_error = format!("HTTP {status}: {}", truncate(&body, 500));
                    if status >= 500 || status == 429 {
                        warn!(
                            target = "vendize.bluefly",
                            attempt,
                            error = %last_error,
                            "retrying catalog read"
                        );
                        sleep(backoff(attempt)).await;
                        continue;
                    }
                    return CatalogOutcome {
                        success: false,
                        status_code: status,
                        data: None,
                        error: Some(last_error),
                    };
                }
                Err(err) => {
                    last_error = err.to_string();
                    warn!(
                        target = "vendize.bluefly",
                        attempt,
                        error = %last_error,
                        "transport error, retrying catalog read"
                    );
                    sleep(backoff(attempt)).await;
                }
            }
        }

        CatalogOutcome {
            success: false,
            status_code: 0,
            data: None,
            error: Some(format!(
                "All {MAX_RETRIES} attempts failed. Last: {last_error}"
            )),
        }
    }

    /// GET the current product catalog. The Rithum endpoint is async: the
    /// first response may return Status=AsyncResponsePending plus a
    /// PendingUri to poll until Status=Complete. A list-shaped body at any
    /// point is already-final data; an Errors list is a terminal failure.
    pub async fn get_catalog(&self) -> CatalogOutcome {
        let mut result = self.get(&self.api_url).await;
        if !result.success {
            return result;
        }

        let Some(Value::Object(data)) = result.data.clone() else {
            return result;
        };

        let status = data.get("Status").and_then(Value::as_str).unwrap_or("");
        let mut pending_uri = data
            .get("PendingUri")
            .and_then(Value::as_str)
            .map(str::to_string);

        if status == "Complete" {
            result.data = Some(unwrap_response_body(Value::Object(data)));
            return result;
        }

        if status == "AsyncResponsePending" && pending_uri.is_some() {
            info!(target = "vendize.bluefly", "catalog async, polling PendingUri");
            for poll in 1..=CATALOG_MAX_POLL {
                sleep(CATALOG_POLL_INTERVAL).await;
                let uri = pending_uri.clone().unwrap_or_default();
                let mut poll_result = self.get(&uri).await;
                if !poll_result.success {
                    return poll_result;
                }

                match poll_result.data.clone() {
                    Some(Value::Object(poll_data)) => {
                        let poll_status = poll_data
                            .get("Status")
                            .and_then(Value::as_str)
                            .unwrap_or("");
                        info!(
                            target = "vendize.bluefly",
                            poll,
                            max = CATALOG_MAX_POLL,
                            status = poll_status,
                            "catalog poll"
                        );
                        if poll_status == "Complete" {
                            poll_result.data =
                                Some(unwrap_response_body(Value::Object(poll_data)));
                            return poll_result;
                        }
                        if poll_status == "AsyncResponsePending" {
                            if let Some(new_uri) =
                                poll_data.get("PendingUri").and_then(Value::as_str)
                            {
                                pending_uri = Some(new_uri.to_string());
                            }
                            continue;
                        }
                        if let Some(errors) =
                            poll_data.get("Errors").filter(|e| !e.is_null())
                        {
                            return CatalogOutcome {
                                success: false,
                                status_code: poll_result.status_code,
                                data: None,
                                error: Some(format!("Rithum errors: {errors}")),
                            };
                        }
                    }
                    // List or scalar — treat as final data.
                    _ => return poll_result,
                }
            }

            return CatalogOutcome {
                success: false,
                status_code: 0,
                data: None,
                error: Some(format!(
                    "Catalog poll timed out after {CATALOG_MAX_POLL} attempts"
                )),
            };
        }

        // Unknown status — return the body, unwrapped when wrapped.
        result.data = Some(unwrap_response_body(Value::Object(data)));
        result
    }
}

fn unwrap_response_body(data: Value) -> Value {
    match data {
        Value::Object(map) => match map.get("ResponseBody") {
            Some(body) => body.clone(),
            None => Value::Object(map),
        },
        other => other,
    }
}

fn backoff(attempt: u32) -> Duration {
    let base = Duration::from_secs(2u64.pow(attempt));
    base + Duration::from_millis(rand::rng().random_range(0..250))
}

fn truncate(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}
