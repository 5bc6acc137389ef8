//! Shopify GraphQL Admin API client for product enrichment.
//!
//! Fetches full product detail (metafields, images, variants) and resolves
//! inventory items back to products for the sync pipeline.

use crate::http::build_client;
use crate::models::{
    EnrichedProduct, InventoryResolution, Metafield, ProductImage, ProductSummary, ProductVariant,
    SelectedOption,
};
use rand::Rng;
use reqwest::Client;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::time::{Duration, sleep};
use tracing::warn;

const MAX_ATTEMPTS: u32 = 3;

// Metafield aliases fetched directly in the product query. These may not
// appear in metafields(first:20) if they lack a formal definition on the
// store, so they are merged into the generic set after the fact.
const DIRECT_METAFIELD_ALIASES: &[&str] = &[
    "bluefly_category",
    "sub_category",
    "gender",
    "country_of_origin",
    "care_instructions",
    "color",
    "size_notes",
];

const PRODUCT_QUERY: &str = r#"
query getProduct($id: ID!) {
  product(id: $id) {
    id
    title
    vendor
    descriptionHtml
    productType
    status
    tags
    metafields(first: 20) {
      edges { node { namespace key value type } }
    }
    bluefly_category: metafield(namespace: "custom", key: "bluefly_category") { namespace key value type }
    sub_category: metafield(namespace: "custom", key: "sub_category") { namespace key value type }
    gender: metafield(namespace: "custom", key: "gender") { namespace key value type }
    country_of_origin: metafield(namespace: "custom", key: "country_of_origin") { namespace key value type }
    care_instructions: metafield(namespace: "custom", key: "care_instructions") { namespace key value type }
    color: metafield(namespace: "custom", key: "color") { namespace key value type }
    size_notes: metafield(namespace: "custom", key: "size_notes") { namespace key value type }
    images(first: 10) {
      edges { node { url altText } }
    }
    variants(first: 100) {
      edges {
        node {
          id
          sku
          price
          compareAtPrice
          barcode
          title
          inventoryQuantity
          selectedOptions { name value }
          image { url altText }
          inventoryItem {
            id
            measurement { weight { value unit } }
          }
        }
      }
    }
  }
}
"#;

const INVENTORY_ITEM_QUERY: &str = r#"
query findByInventoryItem($id: ID!) {
  inventoryItem(id: $id) {
    id
    variant {
      id
      sku
      product { id }
    }
  }
}
"#;

const LIST_PRODUCTS_QUERY: &str = r#"
query listProducts($cursor: String, $query: String) {
  products(first: 50, after: $cursor, query: $query) {
    edges {
      node {
        id
        title
        vendor
        productType
        status
        tags
        featuredImage { url }
        bluefly_category: metafield(namespace: "custom", key: "bluefly_category") { value }
        color: metafield(namespace: "custom", key: "color") { value }
        sub_category: metafield(namespace: "custom", key: "sub_category") { value }
        gender: metafield(namespace: "custom", key: "gender") { value }
        variants(first: 100) {
          edges { node { sku price compareAtPrice inventoryQuantity } }
        }
      }
    }
    pageInfo { hasNextPage endCursor }
  }
}
"#;

#[derive(Debug, Error)]
pub enum ShopifyError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("all retry attempts exhausted")]
    RetriesExhausted,
}

#[derive(Debug, Clone)]
pub struct ShopifyClient {
    endpoint: String,
    access_token: String,
    http: Client,
}

impl ShopifyClient {
    pub fn new(store: &str, access_token: &str) -> Self {
        let api_version = std::env::var("SHOPIFY_API_VERSION")
            .unwrap_or_else(|_| "2025-01".to_string());
        Self {
            endpoint: format!("https://{store}/admin/api/{api_version}/graphql.json"),
            access_token: access_token.to_string(),
            http: build_client(),
        }
    }

    /// Execute a GraphQL query with bounded retry. 429 honors the platform's
    /// Retry-After hint; 5xx backs off exponentially; other 4xx propagate
    /// immediately.
    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, ShopifyError> {
        let body = json!({ "query": query, "variables": variables });

        for attempt in 1..=MAX_ATTEMPTS {
            let response = self
                .http
                .post(&self.endpoint)
                .header("X-Shopify-Access-Token", &self.access_token)
                .json(&body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(err) => {
                    warn!(
                        target = "vendize.shopify",
                        attempt,
                        error = %err,
                        "transport error, retrying"
                    );
                    sleep(backoff(attempt)).await;
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(2);
                warn!(
                    target = "vendize.shopify",
                    attempt, retry_after, "rate limited"
                );
                sleep(Duration::from_secs(retry_after)).await;
                continue;
            }
            if status.is_server_error() {
                warn!(
                    target = "vendize.shopify",
                    attempt,
                    status = status.as_u16(),
                    "server error, retrying"
                );
                sleep(backoff(attempt)).await;
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ShopifyError::Status {
                    status: status.as_u16(),
                    body: truncate(&body, 500),
                });
            }

            return response
                .json::<Value>()
                .await
                .map_err(|err| ShopifyError::InvalidResponse(err.to_string()));
        }

        Err(ShopifyError::RetriesExhausted)
    }

    /// Fetch a full product by numeric ID. `Ok(None)` when the product does
    /// not exist upstream.
    pub async fn get_product_full(
        &self,
        product_id: u64,
    ) -> Result<Option<EnrichedProduct>, ShopifyError> {
        let gid = format!("gid://shopify/Product/{product_id}");
        let result = self.graphql(PRODUCT_QUERY, json!({ "id": gid })).await?;

        let product = &result["data"]["product"];
        if product.is_null() {
            if let Some(errors) = result.get("errors").filter(|e| !e.is_null()) {
                warn!(target = "vendize.shopify", errors = %errors, "graphql errors");
            }
            return Ok(None);
        }
        Ok(Some(flatten_product(product)?))
    }

    /// Resolve an inventory_item_id to its product and variant.
    pub async fn find_product_by_inventory_item(
        &self,
        inventory_item_id: u64,
    ) -> Result<Option<InventoryResolution>, ShopifyError> {
        let gid = format!("gid://shopify/InventoryItem/{inventory_item_id}");
        let result = self
            .graphql(INVENTORY_ITEM_QUERY, json!({ "id": gid }))
            .await?;

        let variant = &result["data"]["inventoryItem"]["variant"];
        if variant.is_null() {
            return Ok(None);
        }

        let product_gid = variant["product"]["id"].as_str().unwrap_or("");
        let Some(product_id) = gid_numeric(product_gid) else {
            return Ok(None);
        };

        Ok(Some(InventoryResolution {
            product_id,
            variant_id: variant["id"].as_str().unwrap_or("").to_string(),
            variant_sku: variant["sku"].as_str().unwrap_or("").to_string(),
        }))
    }

    /// List products via cursor pagination until exhausted. Consumed by the
    /// dashboard surface; the pipeline only needs the two lookups above.
    #[allow(dead_code)]
    pub async fn list_products(
        &self,
        query_filter: &str,
    ) -> Result<Vec<ProductSummary>, ShopifyError> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let variables = json!({ "query": query_filter, "cursor": cursor });
            let result = self.graphql(LIST_PRODUCTS_QUERY, variables).await?;
            let data = &result["data"]["products"];

            for edge in data["edges"].as_array().into_iter().flatten() {
                let node = &edge["node"];
                let Some(id) = gid_numeric(node["id"].as_str().unwrap_or("")) else {
                    continue;
                };

                let variants: Vec<&Value> = node["variants"]["edges"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .map(|e| &e["node"])
                    .collect();
                let total_quantity = variants
                    .iter()
                    .map(|v| v["inventoryQuantity"].as_i64().unwrap_or(0))
                    .sum();

                all.push(ProductSummary {
                    id,
                    title: str_of(node, "title"),
                    vendor: str_of(node, "vendor"),
                    product_type: str_of(node, "productType"),
                    status: str_of(node, "status"),
                    tags: tags_of(&node["tags"]),
                    image_url: node["featuredImage"]["url"].as_str().map(str::to_string),
                    bluefly_category: metafield_value(&node["bluefly_category"]),
                    color: metafield_value(&node["color"]),
                    sub_category: metafield_value(&node["sub_category"]),
                    gender: metafield_value(&node["gender"]),
                    first_sku: variants
                        .first()
                        .and_then(|v| v["sku"].as_str())
                        .unwrap_or("")
                        .to_string(),
                    first_price: variants
                        .first()
                        .and_then(|v| v["price"].as_str())
                        .map(str::to_string),
                    variant_count: variants.len(),
                    total_quantity,
                });
            }

            let page_info = &data["pageInfo"];
            if page_info["hasNextPage"].as_bool().unwrap_or(false) {
                cursor = page_info["endCursor"].as_str().map(str::to_string);
            } else {
                break;
            }
        }

        Ok(all)
    }
}

fn backoff(attempt: u32) -> Duration {
    let base = Duration::from_secs(2u64.pow(attempt));
    base + Duration::from_millis(rand::rng().random_range(0..250))
}

fn truncate(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}

fn gid_numeric(gid: &str) -> Option<u64> {
    gid.rsplit('/').next()?.parse().ok()
}

fn str_of(node: &Value, key: &str) -> String {
    node[key].as_str().unwrap_or("").to_string()
}

// Shopify returns tags as a list; be tolerant of a comma-joined string too.
fn tags_of(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        Value::String(joined) => joined
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn metafield_value(node: &Value) -> Option<String> {
    node["value"].as_str().map(str::to_string)
}

fn metafield_of(node: &Value) -> Option<Metafield> {
    let value = node["value"].as_str()?;
    Some(Metafield {
        namespace: str_of(node, "namespace"),
        key: str_of(node, "key"),
        value: value.to_string(),
        value_type: node["type"].as_str().map(str::to_string),
    })
}

/// Flatten the GraphQL edges/nodes shape into plain ordered sequences and
/// merge the aliased direct metafield lookups into the generic set.
fn flatten_product(product: &Value) -> Result<EnrichedProduct, ShopifyError> {
    let gid = product["id"]
        .as_str()
        .ok_or_else(|| ShopifyError::InvalidResponse("product missing id".into()))?;
    let numeric_id = gid_numeric(gid)
        .ok_or_else(|| ShopifyError::InvalidResponse(format!("unparsable product gid: {gid}")))?;

    let mut metafields: Vec<Metafield> = product["metafields"]["edges"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|e| metafield_of(&e["node"]))
        .collect();

    // Aliased lookups cover metafields without a formal definition; prefer
    // already-seen (namespace, key) pairs so nothing duplicates.
    for alias in DIRECT_METAFIELD_ALIASES {
        if let Some(mf) = metafield_of(&product[*alias]) {
            let seen = metafields
                .iter()
                .any(|m| m.namespace == mf.namespace && m.key == mf.key);
            if !seen {
                metafields.push(mf);
            }
        }
    }

    let images: Vec<ProductImage> = product["images"]["edges"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|e| {
            let node = &e["node"];
            Some(ProductImage {
                url: node["url"].as_str()?.to_string(),
                alt_text: node["altText"].as_str().map(str::to_string),
            })
        })
        .collect();

    let variants: Vec<ProductVariant> = product["variants"]["edges"]
        .as_array()
        .into_iter()
        .flatten()
        .map(|e| flatten_variant(&e["node"]))
        .collect();

    Ok(EnrichedProduct {
        id: gid.to_string(),
        numeric_id,
        title: str_of(product, "title"),
        vendor: str_of(product, "vendor"),
        description_html: str_of(product, "descriptionHtml"),
        product_type: str_of(product, "productType"),
        status: str_of(product, "status"),
        tags: tags_of(&product["tags"]),
        metafields,
        images,
        variants,
    })
}

fn flatten_variant(node: &Value) -> ProductVariant {
    let selected_options = node["selectedOptions"]
        .as_array()
        .into_iter()
        .flatten()
        .map(|opt| SelectedOption {
            name: str_of(opt, "name"),
            value: str_of(opt, "value"),
        })
        .collect();

    let image = node["image"]["url"].as_str().map(|url| ProductImage {
        url: url.to_string(),
        alt_text: node["image"]["altText"].as_str().map(str::to_string),
    });

    // Weight lives under inventoryItem.measurement.weight
    let weight_node = &node["inventoryItem"]["measurement"]["weight"];
    let weight = weight_node["value"].as_f64();
    let weight_unit = Some(
        weight_node["unit"]
            .as_str()
            .unwrap_or("POUNDS")
            .to_string(),
    );

    ProductVariant {
        id: str_of(node, "id"),
        sku: node["sku"].as_str().map(str::to_string),
        price: node["price"].as_str().map(str::to_string),
        compare_at_price: node["compareAtPrice"].as_str().map(str::to_string),
        barcode: node["barcode"].as_str().map(str::to_string),
        title: str_of(node, "title"),
        inventory_quantity: node["inventoryQuantity"].as_i64().unwrap_or(0),
        selected_options,
        image,
        weight,
        weight_unit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_merges_aliased_metafields_without_duplicates() {
        let raw = json!({
            "id": "gid://shopify/Product/9647282618663",
            "title": "Suede Loafer",
            "vendor": "Brunello Cucinelli",
            "descriptionHtml": "<p>Handmade.</p>",
            "productType": "Shoes",
            "status": "ACTIVE",
            "tags": ["Mens", "Leather"],
            "metafields": {
                "edges": [
                    {"node": {"namespace": "custom", "key": "gender", "value": "Men", "type": "single_line_text_field"}}
                ]
            },
            "bluefly_category": {"namespace": "custom", "key": "bluefly_category", "value": "194", "type": "single_line_text_field"},
            "gender": {"namespace": "custom", "key": "gender", "value": "SHOULD NOT WIN", "type": "single_line_text_field"},
            "images": {"edges": [{"node": {"url": "https://cdn.example.com/a.jpg", "altText": null}}]},
            "variants": {
                "edges": [
                    {"node": {
                        "id": "gid://shopify/ProductVariant/45123456788456",
                        "sku": "BC123",
                        "price": "100.00",
                        "compareAtPrice": "120.00",
                        "barcode": null,
                        "title": "9",
                        "inventoryQuantity": 3,
                        "selectedOptions": [{"name": "Size", "value": "9"}],
                        "image": null,
                        "inventoryItem": {
                            "id": "gid://shopify/InventoryItem/55",
                            "measurement": {"weight": {"value": 1.25, "unit": "POUNDS"}}
                        }
                    }}
                ]
            }
        });

        let product = flatten_product(&raw).unwrap();
        assert_eq!(product.numeric_id, 9647282618663);
        assert_eq!(product.metafields.len(), 2);
        // The connection copy of custom.gender wins over the alias.
        let gender = product
            .metafields
            .iter()
            .find(|m| m.key == "gender")
            .unwrap();
        assert_eq!(gender.value, "Men");
        assert_eq!(product.variants[0].weight, Some(1.25));
        assert_eq!(product.variants[0].weight_unit.as_deref(), Some("POUNDS"));
        assert_eq!(product.variants[0].inventory_quantity, 3);
    }

    #[test]
    fn tags_accept_list_or_joined_string() {
        assert_eq!(tags_of(&json!(["a", "b"])), vec!["a", "b"]);
        assert_eq!(tags_of(&json!("a, b ,c")), vec!["a", "b", "c"]);
        assert!(tags_of(&json!(null)).is_empty());
    }

    #[test]
    fn gid_numeric_parses_trailing_segment() {
        assert_eq!(gid_numeric("gid://shopify/Product/42"), Some(42));
        assert_eq!(gid_numeric("not-a-gid"), None);
    }
}
