use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// Product metafield — a namespaced key/value extension attribute.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metafield {
    pub namespace: String,
    pub key: String,
    pub value: String,
    #[serde(rename = "type", default)]
    pub value_type: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductImage {
    pub url: String,
    #[serde(rename = "altText", default)]
    pub alt_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectedOption {
    pub name: String,
    pub value: String,
}

/// A Shopify product variant, flattened from the GraphQL connection shape.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProductVariant {
    /// Variant GID, e.g. `gid://shopify/ProductVariant/45123456789012`.
    pub id: String,
    pub sku: Option<String>,
    /// Decimal string as returned by the Admin API.
    pub price: Option<String>,
    pub compare_at_price: Option<String>,
    pub barcode: Option<String>,
    pub title: String,
    pub inventory_quantity: i64,
    #[serde(default)]
    pub selected_options: Vec<SelectedOption>,
    pub image: Option<ProductImage>,
    pub weight: Option<f64>,
    pub weight_unit: Option<String>,
}

impl ProductVariant {
    /// Trailing numeric portion of the variant GID.
    pub fn numeric_id(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or("")
    }
}

/// Full product detail as fetched from the enrichment API. Built once per
/// event, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnrichedProduct {
    pub id: String,
    pub numeric_id: u64,
    pub title: String,
    pub vendor: String,
    pub description_html: String,
    pub product_type: String,
    /// ACTIVE / DRAFT / ARCHIVED — compared case-insensitively downstream.
    pub status: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metafields: Vec<Metafield>,
    #[serde(default)]
    pub images: Vec<ProductImage>,
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
}

/// inventory_item_id → product/variant resolution result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryResolution {
    pub product_id: u64,
    pub variant_id: String,
    pub variant_sku: String,
}

/// Summary record returned by the paginated product listing. Consumed by the
/// dashboard surface; the pipeline itself only uses the full lookup.
#[allow(dead_code)]
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: u64,
    pub title: String,
    pub vendor: String,
    pub product_type: String,
    pub status: String,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub bluefly_category: Option<String>,
    pub color: Option<String>,
    pub sub_category: Option<String>,
    pub gender: Option<String>,
    pub first_sku: String,
    pub first_price: Option<String>,
    pub variant_count: usize,
    pub total_quantity: i64,
}

// ---------------------------------------------------------------------------
// Outbound Rithum payload types
// ---------------------------------------------------------------------------

/// One Name/Value pair in a Rithum Fields array. Entries whose value is None
/// are stripped by the payload builders before serialization — absent data
/// must never reach the wire as an explicit null.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: Option<String>,
}

impl FieldEntry {
    pub fn new(name: &str, value: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }
}

/// Variant-level record carrying price/quantity/listing-status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyableProduct {
    #[serde(rename = "Fields")]
    pub fields: Vec<FieldEntry>,
    #[serde(rename = "Quantity")]
    pub quantity: i64,
    #[serde(rename = "SellerSKU")]
    pub seller_sku: String,
    #[serde(rename = "ListingStatus")]
    pub listing_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductOption {
    #[serde(rename = "Name")]
    pub name: String,
}

/// Complete POST body for one product on the Rithum feed.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductPayload {
    #[serde(rename = "Fields")]
    pub fields: Vec<FieldEntry>,
    #[serde(rename = "SellerSKU")]
    pub seller_sku: String,
    #[serde(rename = "BuyableProducts")]
    pub buyable_products: Vec<BuyableProduct>,
    #[serde(rename = "Options")]
    pub options: Option<Vec<ProductOption>>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
