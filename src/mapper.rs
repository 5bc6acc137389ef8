//! Shopify → Bluefly/Rithum field transformation engine.
//!
//! Pure functions from enriched product data + sync settings to the Rithum
//! POST /products body shape. No I/O here: category lookups and settings
//! reads happen upstream and are passed in.

use crate::models::{
    BuyableProduct, EnrichedProduct, FieldEntry, ProductOption, ProductPayload, ProductVariant,
};
use crate::settings::SyncSettings;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Color standard mapping — free-form color → 17 Bluefly standard values
// ---------------------------------------------------------------------------

// Ordered: first keyword hit wins, so "off white"/"ivory"/"cream" must be
// checked before "white".
const COLOR_STANDARD_KEYWORDS: &[(&str, &str)] = &[
    ("off white", "Off White"),
    ("ivory", "Off White"),
    ("cream", "Off White"),
    ("black", "Black"),
    ("white", "White"),
    ("beige", "Beige"),
    ("tan", "Beige"),
    ("camel", "Beige"),
    ("khaki", "Beige"),
    ("taupe", "Beige"),
    ("sand", "Beige"),
    ("grey", "Grey"),
    ("gray", "Grey"),
    ("charcoal", "Grey"),
    ("slate", "Grey"),
    ("blue", "Blue"),
    ("navy", "Blue"),
    ("cobalt", "Blue"),
    ("teal", "Blue"),
    ("denim", "Blue"),
    ("indigo", "Blue"),
    ("red", "Red"),
    ("burgundy", "Red"),
    ("wine", "Red"),
    ("maroon", "Red"),
    ("crimson", "Red"),
    ("green", "Green"),
    ("olive", "Green"),
    ("army", "Green"),
    ("sage", "Green"),
    ("forest", "Green"),
    ("brown", "Brown"),
    ("chocolate", "Brown"),
    ("cognac", "Brown"),
    ("gold", "Gold"),
    ("silver", "Silver"),
    ("metallic", "Silver"),
    ("pink", "Pink"),
    ("blush", "Pink"),
    ("rose", "Pink"),
    ("mauve", "Pink"),
    ("fuchsia", "Pink"),
    ("purple", "Purple"),
    ("violet", "Purple"),
    ("lavender", "Purple"),
    ("plum", "Purple"),
    ("orange", "Orange"),
    ("coral", "Orange"),
    ("rust", "Orange"),
    ("peach", "Orange"),
    ("yellow", "Yellow"),
    ("mustard", "Yellow"),
    ("multi", "Multi"),
    ("multicolor", "Multi"),
    ("pattern", "Multi"),
];

const MATERIAL_KEYWORDS: &[&str] = &[
    "leather",
    "silk",
    "cotton",
    "wool",
    "polyester",
    "metal",
    "plastic",
    "acetate",
];

const PATTERN_KEYWORDS: &[&str] = &[
    "stripe",
    "plaid",
    "check",
    "floral",
    "solid",
    "print",
    "geometric",
];

/// Map a free-form color string to one of the 17 Bluefly standard colors.
pub fn map_color_standard(color: &str, default: &str) -> String {
    if color.is_empty() {
        return default.to_string();
    }
    let lowered = color.to_lowercase();
    for (keyword, standard) in COLOR_STANDARD_KEYWORDS {
        if lowered.contains(keyword) {
            return (*standard).to_string();
        }
    }
    default.to_string()
}

/// Lowercase hyphenated URL slug. Word characters and hyphens survive;
/// whitespace/underscore runs collapse to a single hyphen; everything else
/// is dropped.
pub fn slugify(text: &str) -> String {
    let cleaned: String = text
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '_' || *c == '-')
        .collect();

    let mut out = String::with_capacity(cleaned.len());
    let mut sep_pending = false;
    for ch in cleaned.chars() {
        if ch.is_whitespace() || ch == '_' {
            sep_pending = !out.is_empty();
        } else {
            if sep_pending {
                out.push('-');
                sep_pending = false;
            }
            out.push(ch);
        }
    }
    out.trim_matches('-').to_string()
}

/// Normalize a gender string to a compact slug (mens/womens/unisex).
pub fn gender_slug(gender: &str) -> String {
    let g = gender.trim().to_lowercase();
    if g.is_empty() {
        return String::new();
    }
    if ["woman", "women", "female"].iter().any(|w| g.contains(w)) {
        return "womens".to_string();
    }
    if ["man", "men", "male"].iter().any(|w| g.contains(w)) {
        return "mens".to_string();
    }
    if ["unisex", "neutral"].iter().any(|w| g.contains(w)) {
        return "unisex".to_string();
    }
    slugify(gender)
}

// ---------------------------------------------------------------------------
// Metafield / option helpers
// ---------------------------------------------------------------------------

pub fn get_metafield<'a>(product: &'a EnrichedProduct, namespace: &str, key: &str) -> Option<&'a str> {
    product
        .metafields
        .iter()
        .find(|mf| mf.namespace == namespace && mf.key == key)
        .map(|mf| mf.value.as_str())
}

fn extract_option(variant: &ProductVariant, option_name: &str) -> Option<String> {
    variant
        .selected_options
        .iter()
        .find(|opt| opt.name.eq_ignore_ascii_case(option_name))
        .map(|opt| opt.value.clone())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Eligibility & tag parsing
// ---------------------------------------------------------------------------

/// A product is sync-eligible iff its status is ACTIVE (any case).
pub fn should_sync_product(product: &EnrichedProduct) -> bool {
    product.status.eq_ignore_ascii_case("ACTIVE")
}

/// First tag containing any keyword, in tag order. Returns the trimmed tag.
fn parse_tags_for_field(tags: &[String], keywords: &[&str]) -> Option<String> {
    for tag in tags {
        let tag_lower = tag.trim().to_lowercase();
        if keywords.iter().any(|kw| tag_lower.contains(kw)) {
            return Some(tag.trim().to_string());
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Price helpers
// ---------------------------------------------------------------------------

/// Apply a percentage adjustment (e.g. 20 = +20%) to a decimal-string price.
/// Unparsable or missing input yields None.
pub fn adjust_price(price: Option<&str>, adjustment_pct: f64) -> Option<f64> {
    let p: f64 = price?.trim().parse().ok()?;
    let adjusted = if adjustment_pct != 0.0 {
        p * (1.0 + adjustment_pct / 100.0)
    } else {
        p
    };
    Some((adjusted * 100.0).round() / 100.0)
}

fn format_price(price: Option<f64>) -> Option<String> {
    price.map(|p| format!("{p:.2}"))
}

fn format_weight(weight: Option<f64>) -> Option<String> {
    weight.map(|w| format!("{w:.4}"))
}

fn listing_status_for(product_status: &str) -> &'static str {
    if product_status.eq_ignore_ascii_case("ACTIVE") {
        "Live"
    } else {
        "NotLive"
    }
}

// ---------------------------------------------------------------------------
// SKU derivation
// ---------------------------------------------------------------------------

/// Derive the variant's SellerSKU.
///
/// With seller and product context, builds the full structured SKU (all
/// hyphens, no underscores):
///
///     {brand}-{gender}-{type}-in-{color}-{variant_sku}-{color_code}
///
/// e.g. `brunello-cucinelli-mens-shoes-in-brown-bc123-c8456`. The seller id
/// has any non-numeric prefix (e.g. "vpid-") stripped; a vendor slug equal
/// to the numeric seller id is dropped. Falls back to the bare variant SKU
/// (or `SHOPIFY-{id}` when the SKU is blank) without full context.
pub fn derive_sku(
    variant: &ProductVariant,
    seller_id: &str,
    product: Option<&EnrichedProduct>,
) -> String {
    let mut variant_sku = variant
        .sku
        .as_deref()
        .unwrap_or("")
        .trim()
        .to_string();
    if variant_sku.is_empty() {
        let numeric = variant.numeric_id();
        if !numeric.is_empty() {
            variant_sku = format!("SHOPIFY-{numeric}");
        }
    }

    let (Some(product), false) = (product, seller_id.is_empty()) else {
        return variant_sku;
    };

    let stripped: String = seller_id
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .collect();
    let seller_numeric = if stripped.is_empty() {
        seller_id
    } else {
        stripped.as_str()
    };

    // Color from selectedOptions → metafield fallback
    let color = extract_option(variant, "color")
        .or_else(|| get_metafield(product, "custom", "color").map(str::to_string))
        .unwrap_or_default();
    let color_slug = slugify(&color);

    // Color code: "c" + last 4 digits of the variant's numeric id
    let numeric_id = variant.numeric_id();
    let color_code = if numeric_id.len() >= 4 {
        format!("c{}", &numeric_id[numeric_id.len() - 4..])
    } else {
        format!("c{numeric_id}")
    };

    // Gender from metafield → tag fallback
    let gender_raw = get_metafield(product, "custom", "gender")
        .map(str::to_string)
        .filter(|g| !g.is_empty())
        .or_else(|| {
            product.tags.iter().find_map(|tag| {
                let lower = tag.to_lowercase();
                ["mens", "womens", "women", "men", "unisex"]
                    .iter()
                    .any(|w| lower.contains(w))
                    .then(|| tag.clone())
            })
        })
        .unwrap_or_default();
    let gender = gender_slug(&gender_raw);

    // Handle: brand-gender-type-in-color, skipping empty segments.
    let mut vendor = slugify(&product.vendor);
    if vendor == seller_numeric {
        vendor = String::new();
    }
    let raw_type = product
        .product_type
        .rsplit('/')
        .next()
        .unwrap_or("")
        .trim();
    let product_type = slugify(raw_type);

    let mut handle_parts: Vec<String> = [vendor, gender, product_type]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();
    if !color_slug.is_empty() {
        handle_parts.push(format!("in-{color_slug}"));
    }
    let handle = handle_parts.join("-");

    let sku_slug = slugify(&variant_sku);
    [handle, sku_slug, color_code]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

// ---------------------------------------------------------------------------
// Product-level field mapping
// ---------------------------------------------------------------------------

/// Build the product-level Fields array. Null-valued entries remain here and
/// are stripped by the payload builder.
pub fn map_product_fields(product: &EnrichedProduct) -> Vec<FieldEntry> {
    let mf = |key: &str| get_metafield(product, "custom", key).map(str::to_string);

    vec![
        // category — required downstream; empty string when absent so the
        // entry survives null stripping and the gap is visible on the feed
        FieldEntry::new(
            "category",
            Some(mf("bluefly_category").unwrap_or_default()),
        ),
        FieldEntry::new("brand", Some(product.vendor.clone())),
        FieldEntry::new("name", Some(product.title.clone())),
        FieldEntry::new("description", Some(product.description_html.clone())),
        FieldEntry::new(
            "type_frames",
            Some(product.product_type.clone()).filter(|t| !t.is_empty()),
        ),
        FieldEntry::new(
            "material_clothing",
            parse_tags_for_field(&product.tags, MATERIAL_KEYWORDS),
        ),
        FieldEntry::new("pattern", parse_tags_for_field(&product.tags, PATTERN_KEYWORDS)),
        FieldEntry::new("gender", mf("gender")),
        FieldEntry::new("sub_category", mf("sub_category")),
        FieldEntry::new("care_instructions", mf("care_instructions")),
        FieldEntry::new("country_of_manufacture", mf("country_of_origin")),
        FieldEntry::new("size_notes", mf("size_notes")),
    ]
}

// ---------------------------------------------------------------------------
// Variant / BuyableProduct mapping
// ---------------------------------------------------------------------------

/// Transform a single variant into a Rithum BuyableProduct entry.
/// `sql_fields` (field name → value from the category lookup) overrides
/// same-named fields and appends the rest.
pub fn map_variant_to_buyable(
    variant: &ProductVariant,
    product: &EnrichedProduct,
    sql_fields: &BTreeMap<String, String>,
    settings: &SyncSettings,
    seller_id: &str,
) -> BuyableProduct {
    let defaults = &settings.field_defaults;
    let mut fields = Vec::new();

    // Color — selectedOptions first, then custom.color metafield
    let color_display = extract_option(variant, "color")
        .or_else(|| get_metafield(product, "custom", "color").map(str::to_string))
        .unwrap_or_default();
    fields.push(FieldEntry::new(
        "color",
        Some(color_display.clone()).filter(|c| !c.is_empty()),
    ));
    fields.push(FieldEntry::new(
        "color_standard",
        Some(map_color_standard(&color_display, &defaults.color_standard)),
    ));

    fields.push(FieldEntry::new("size", extract_option(variant, "size")));

    fields.push(FieldEntry::new(
        "is_returnable",
        Some(defaults.is_returnable.clone()),
    ));
    fields.push(FieldEntry::new(
        "product_condition",
        Some(defaults.product_condition.clone()),
    ));

    fields.push(FieldEntry::new("upc", variant.barcode.clone().filter(|b| !b.is_empty())));

    // Price mapping:
    //   price         = compareAtPrice (MSRP/retail, the "was" price) — no adjustment
    //   special_price = price (actual selling price) — adjustment applied
    // No compareAtPrice → price falls back to the adjusted selling price and
    // special_price is omitted: never a discount without a true reference.
    let selling = adjust_price(variant.price.as_deref(), settings.price_adjustment_pct);
    let compare_at = adjust_price(variant.compare_at_price.as_deref(), 0.0);
    if compare_at.is_some() {
        fields.push(FieldEntry::new("price", format_price(compare_at)));
        fields.push(FieldEntry::new("special_price", format_price(selling)));
    } else {
        fields.push(FieldEntry::new("price", format_price(selling)));
        fields.push(FieldEntry::new("special_price", None));
    }

    // Images: variant image first (most relevant for color variants), then
    // product images, deduplicated, filling image_1..image_5.
    let mut image_sources: Vec<&str> = Vec::new();
    if let Some(img) = variant.image.as_ref() {
        image_sources.push(&img.url);
    }
    for img in &product.images {
        if !img.url.is_empty() && !image_sources.contains(&img.url.as_str()) {
            image_sources.push(&img.url);
        }
    }
    for i in 0..5 {
        fields.push(FieldEntry::new(
            &format!("image_{}", i + 1),
            image_sources.get(i).map(|url| (*url).to_string()),
        ));
    }

    fields.push(FieldEntry::new("weight", format_weight(variant.weight)));

    // Category-lookup fields (glasses_magnification, size mappings, etc.)
    for (name, value) in sql_fields {
        match fields.iter_mut().find(|f| &f.name == name) {
            Some(existing) => existing.value = Some(value.clone()),
            None => fields.push(FieldEntry::new(name, Some(value.clone()))),
        }
    }

    BuyableProduct {
        fields,
        quantity: variant.inventory_quantity,
        seller_sku: derive_sku(variant, seller_id, Some(product)),
        listing_status: listing_status_for(&product.status).to_string(),
    }
}

// ---------------------------------------------------------------------------
// Options derivation
// ---------------------------------------------------------------------------

/// Product-level Options array — variant differentiator names (color, size)
/// in first-seen order. Without this the marketplace shows empty options.
fn build_options(product: &EnrichedProduct) -> Vec<ProductOption> {
    let mut names: Vec<String> = Vec::new();
    for variant in &product.variants {
        for opt in &variant.selected_options {
            let lower = opt.name.to_lowercase();
            // "Title" is the Shopify placeholder when there are no real options
            if !lower.is_empty() && lower != "title" && !names.contains(&lower) {
                names.push(lower);
            }
        }
    }
    // No color option but a color metafield exists — surface it anyway.
    if !names.iter().any(|n| n == "color")
        && get_metafield(product, "custom", "color").is_some()
    {
        names.insert(0, "color".to_string());
    }
    names.into_iter().map(|name| ProductOption { name }).collect()
}

// ---------------------------------------------------------------------------
// Payload builders
// ---------------------------------------------------------------------------

fn strip_nulls(fields: Vec<FieldEntry>) -> Vec<FieldEntry> {
    fields.into_iter().filter(|f| f.value.is_some()).collect()
}

/// Build the complete Rithum POST body for one product.
/// `sql_field_map` is keyed by variant title.
pub fn build_bluefly_payload(
    product: &EnrichedProduct,
    sql_field_map: &BTreeMap<String, BTreeMap<String, String>>,
    settings: &SyncSettings,
    seller_id: &str,
) -> ProductPayload {
    let empty = BTreeMap::new();

    let product_fields = strip_nulls(map_product_fields(product));

    let buyable_products: Vec<BuyableProduct> = product
        .variants
        .iter()
        .map(|variant| {
            let sql_fields = sql_field_map.get(&variant.title).unwrap_or(&empty);
            let mut buyable =
                map_variant_to_buyable(variant, product, sql_fields, settings, seller_id);
            buyable.fields = strip_nulls(buyable.fields);
            buyable
        })
        .collect();

    let seller_sku = product
        .variants
        .first()
        .map(|v| derive_sku(v, seller_id, Some(product)))
        .unwrap_or_default();

    let options = build_options(product);

    ProductPayload {
        fields: product_fields,
        seller_sku,
        buyable_products,
        options: if options.is_empty() { None } else { Some(options) },
    }
}

/// Lightweight body for the /quantityprice endpoint: price, special_price,
/// is_returnable, quantity, listing status. Product-level Fields is always
/// empty — inventory- and status-only updates avoid re-sending the catalog.
pub fn build_quantity_price_payload(
    product: &EnrichedProduct,
    settings: &SyncSettings,
    seller_id: &str,
) -> ProductPayload {
    let listing_status = listing_status_for(&product.status);

    let buyable_products: Vec<BuyableProduct> = product
        .variants
        .iter()
        .map(|variant| {
            let mut fields = vec![FieldEntry::new(
                "is_returnable",
                Some(settings.field_defaults.is_returnable.clone()),
            )];
            let selling = adjust_price(variant.price.as_deref(), settings.price_adjustment_pct);
            let compare_at = adjust_price(variant.compare_at_price.as_deref(), 0.0);
            if compare_at.is_some() {
                fields.push(FieldEntry::new("price", format_price(compare_at)));
                fields.push(FieldEntry::new("special_price", format_price(selling)));
            } else if selling.is_some() {
                fields.push(FieldEntry::new("price", format_price(selling)));
            }
            BuyableProduct {
                fields,
                quantity: variant.inventory_quantity,
                seller_sku: derive_sku(variant, seller_id, Some(product)),
                listing_status: listing_status.to_string(),
            }
        })
        .collect();

    let seller_sku = product
        .variants
        .first()
        .map(|v| derive_sku(v, seller_id, Some(product)))
        .unwrap_or_default();

    ProductPayload {
        fields: Vec::new(),
        seller_sku,
        buyable_products,
        options: None,
    }
}

/// Force every buyable product's listing status, e.g. NotLive to delist a
/// product that dropped out of ACTIVE.
pub fn force_listing_status(payload: &mut ProductPayload, status: &str) {
    for buyable in &mut payload.buyable_products {
        buyable.listing_status = status.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metafield, ProductImage, SelectedOption};

    fn metafield(key: &str, value: &str) -> Metafield {
        Metafield {
            namespace: "custom".to_string(),
            key: key.to_string(),
            value: value.to_string(),
            value_type: Some("single_line_text_field".to_string()),
        }
    }

    fn sample_variant() -> ProductVariant {
        ProductVariant {
            id: "gid://shopify/ProductVariant/45123456788456".to_string(),
            sku: Some("BC123".to_string()),
            price: Some("100.00".to_string()),
            compare_at_price: Some("120.00".to_string()),
            barcode: Some("0123456789012".to_string()),
            title: "9".to_string(),
            inventory_quantity: 3,
            selected_options: vec![
                SelectedOption {
                    name: "Color".to_string(),
                    value: "Brown".to_string(),
                },
                SelectedOption {
                    name: "Size".to_string(),
                    value: "9".to_string(),
                },
            ],
            image: None,
            weight: Some(1.25),
            weight_unit: Some("POUNDS".to_string()),
        }
    }

    fn sample_product() -> EnrichedProduct {
        EnrichedProduct {
            id: "gid://shopify/Product/9647282618663".to_string(),
            numeric_id: 9647282618663,
            title: "Suede Loafer".to_string(),
            vendor: "Brunello Cucinelli".to_string(),
            description_html: "<p>Handmade.</p>".to_string(),
            product_type: "Apparel/Shoes".to_string(),
            status: "ACTIVE".to_string(),
            tags: vec!["Mens".to_string(), "Leather Upper".to_string()],
            metafields: vec![metafield("bluefly_category", "194"), metafield("gender", "Men")],
            images: vec![
                ProductImage {
                    url: "https://cdn.example.com/a.jpg".to_string(),
                    alt_text: None,
                },
                ProductImage {
                    url: "https://cdn.example.com/b.jpg".to_string(),
                    alt_text: Some("side".to_string()),
                },
            ],
            variants: vec![sample_variant()],
        }
    }

    fn field_value<'a>(fields: &'a [FieldEntry], name: &str) -> Option<&'a str> {
        fields
            .iter()
            .find(|f| f.name == name)
            .and_then(|f| f.value.as_deref())
    }

    #[test]
    fn color_standard_keyword_match() {
        assert_eq!(map_color_standard("Matte Black", "No color"), "Black");
        assert_eq!(map_color_standard("Ivory Cream", "No color"), "Off White");
        assert_eq!(map_color_standard("Dark Navy", "No color"), "Blue");
        assert_eq!(map_color_standard("", "No color"), "No color");
        assert_eq!(map_color_standard("Chartreuse", "No color"), "No color");
        // Configured default wins for unmatched input
        assert_eq!(map_color_standard("Chartreuse", "Multi"), "Multi");
    }

    #[test]
    fn slugify_basics() {
        assert_eq!(slugify("Brunello Cucinelli"), "brunello-cucinelli");
        assert_eq!(slugify("  Shoes_&_Boots  "), "shoes-boots");
        assert_eq!(slugify("BC-123"), "bc-123");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn gender_slug_heuristics() {
        assert_eq!(gender_slug("Women's"), "womens");
        assert_eq!(gender_slug("MEN"), "mens");
        assert_eq!(gender_slug("Gender Neutral"), "unisex");
        assert_eq!(gender_slug("kids"), "kids");
        assert_eq!(gender_slug(""), "");
        // "women" contains "men" — must still resolve to womens
        assert_eq!(gender_slug("women"), "womens");
    }

    #[test]
    fn price_adjustment() {
        assert_eq!(adjust_price(Some("100.00"), 10.0), Some(110.0));
        assert_eq!(adjust_price(Some("100.00"), 0.0), Some(100.0));
        assert_eq!(adjust_price(Some("99.99"), -10.0), Some(89.99));
        assert_eq!(adjust_price(None, 10.0), None);
        assert_eq!(adjust_price(Some("n/a"), 10.0), None);
    }

    #[test]
    fn eligibility_is_case_insensitive() {
        let mut product = sample_product();
        for status in ["ACTIVE", "active", "Active"] {
            product.status = status.to_string();
            assert!(should_sync_product(&product), "{status}");
        }
        for status in ["DRAFT", "archived", ""] {
            product.status = status.to_string();
            assert!(!should_sync_product(&product), "{status}");
        }
    }

    #[test]
    fn structured_sku_with_full_context() {
        let product = sample_product();
        let sku = derive_sku(&sample_variant(), "vpid-5021", Some(&product));
        assert_eq!(sku, "brunello-cucinelli-mens-shoes-in-brown-bc123-c8456");
    }

    #[test]
    fn sku_falls_back_without_context() {
        assert_eq!(derive_sku(&sample_variant(), "", None), "BC123");

        let mut variant = sample_variant();
        variant.sku = None;
        assert_eq!(
            derive_sku(&variant, "", None),
            "SHOPIFY-45123456788456"
        );
    }

    #[test]
    fn vendor_matching_seller_id_is_dropped() {
        let mut product = sample_product();
        product.vendor = "5021".to_string();
        let sku = derive_sku(&sample_variant(), "vpid-5021", Some(&product));
        assert_eq!(sku, "mens-shoes-in-brown-bc123-c8456");
    }

    #[test]
    fn short_numeric_id_color_code_passes_through() {
        let mut variant = sample_variant();
        variant.id = "gid://shopify/ProductVariant/77".to_string();
        let sku = derive_sku(&variant, "5021", Some(&sample_product()));
        assert!(sku.ends_with("-c77"), "{sku}");
    }

    #[test]
    fn tag_derived_material_and_pattern() {
        let mut product = sample_product();
        product.tags = vec![
            "New Arrival".to_string(),
            "Striped".to_string(),
            "Leather Upper".to_string(),
        ];
        let fields = map_product_fields(&product);
        assert_eq!(field_value(&fields, "material_clothing"), Some("Leather Upper"));
        assert_eq!(field_value(&fields, "pattern"), Some("Striped"));
    }

    #[test]
    fn full_payload_prices_and_listing_status() {
        let product = sample_product();
        let mut settings = SyncSettings::default();
        settings.price_adjustment_pct = 10.0;

        let payload = build_bluefly_payload(&product, &BTreeMap::new(), &settings, "5021");
        let buyable = &payload.buyable_products[0];

        assert_eq!(field_value(&buyable.fields, "price"), Some("120.00"));
        assert_eq!(field_value(&buyable.fields, "special_price"), Some("110.00"));
        assert_eq!(buyable.listing_status, "Live");
        assert_eq!(buyable.quantity, 3);
        assert_eq!(payload.seller_sku, buyable.seller_sku);
    }

    #[test]
    fn missing_compare_at_price_omits_special_price() {
        let mut product = sample_product();
        product.variants[0].compare_at_price = None;
        let mut settings = SyncSettings::default();
        settings.price_adjustment_pct = 10.0;

        let payload = build_bluefly_payload(&product, &BTreeMap::new(), &settings, "5021");
        let buyable = &payload.buyable_products[0];
        assert_eq!(field_value(&buyable.fields, "price"), Some("110.00"));
        assert!(field_value(&buyable.fields, "special_price").is_none());
    }

    #[test]
    fn null_fields_are_stripped_from_payload() {
        let mut product = sample_product();
        // No gender metafield at all
        product.metafields.retain(|mf| mf.key != "gender");
        product.tags.clear();

        let payload = build_bluefly_payload(&product, &BTreeMap::new(), &SyncSettings::default(), "");
        assert!(payload.fields.iter().all(|f| f.value.is_some()));
        assert!(!payload.fields.iter().any(|f| f.name == "gender"));
        assert!(!payload.fields.iter().any(|f| f.name == "material_clothing"));
        for buyable in &payload.buyable_products {
            assert!(buyable.fields.iter().all(|f| f.value.is_some()));
        }
        // The serialized form must not carry an explicit null either.
        let raw = serde_json::to_string(&payload).unwrap();
        assert!(!raw.contains("null"), "{raw}");
    }

    #[test]
    fn image_slots_dedup_variant_image() {
        let mut product = sample_product();
        product.variants[0].image = Some(ProductImage {
            url: "https://cdn.example.com/b.jpg".to_string(),
            alt_text: None,
        });
        let buyable = map_variant_to_buyable(
            &product.variants[0],
            &product,
            &BTreeMap::new(),
            &SyncSettings::default(),
            "",
        );
        // Variant image leads, duplicate product image collapsed.
        assert_eq!(
            field_value(&buyable.fields, "image_1"),
            Some("https://cdn.example.com/b.jpg")
        );
        assert_eq!(
            field_value(&buyable.fields, "image_2"),
            Some("https://cdn.example.com/a.jpg")
        );
        assert!(field_value(&buyable.fields, "image_3").is_none());
    }

    #[test]
    fn sql_fields_override_and_append() {
        let product = sample_product();
        let mut sql_fields = BTreeMap::new();
        sql_fields.insert("size".to_string(), "41 EU".to_string());
        sql_fields.insert("glasses_magnification".to_string(), "2.5".to_string());

        let buyable = map_variant_to_buyable(
            &product.variants[0],
            &product,
            &sql_fields,
            &SyncSettings::default(),
            "",
        );
        assert_eq!(field_value(&buyable.fields, "size"), Some("41 EU"));
        assert_eq!(
            field_value(&buyable.fields, "glasses_magnification"),
            Some("2.5")
        );
        // No duplicate size entry
        assert_eq!(buyable.fields.iter().filter(|f| f.name == "size").count(), 1);
    }

    #[test]
    fn options_exclude_title_placeholder() {
        let mut product = sample_product();
        product.variants[0].selected_options = vec![SelectedOption {
            name: "Title".to_string(),
            value: "Default Title".to_string(),
        }];
        product.metafields.push(metafield("color", "Brown"));

        let payload = build_bluefly_payload(&product, &BTreeMap::new(), &SyncSettings::default(), "");
        // Synthesized color option from the metafield.
        assert_eq!(
            payload.options,
            Some(vec![ProductOption {
                name: "color".to_string()
            }])
        );
    }

    #[test]
    fn quantity_price_payload_is_light() {
        let product = sample_product();
        let mut settings = SyncSettings::default();
        settings.price_adjustment_pct = 10.0;

        let payload = build_quantity_price_payload(&product, &settings, "5021");
        assert!(payload.fields.is_empty());
        assert!(payload.options.is_none());
        let buyable = &payload.buyable_products[0];
        let names: Vec<&str> = buyable.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["is_returnable", "price", "special_price"]);
        assert_eq!(field_value(&buyable.fields, "price"), Some("120.00"));
        assert_eq!(field_value(&buyable.fields, "special_price"), Some("110.00"));
    }

    #[test]
    fn force_listing_status_delists_every_variant() {
        let product = sample_product();
        let mut payload =
            build_quantity_price_payload(&product, &SyncSettings::default(), "5021");
        force_listing_status(&mut payload, "NotLive");
        assert!(payload
            .buyable_products
            .iter()
            .all(|b| b.listing_status == "NotLive"));
    }
}
