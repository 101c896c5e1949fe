//! Upstream field mapping
//!
//! Upstream records arrive with inconsistent field names depending on which
//! endpoint (and which installation) produced them. Mapping is driven by
//! static alias priority tables: the first present and non-null alias wins.
//! Coercion never fails a run; an unusable value falls back to the documented
//! default with a warning.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::domain::inventory::{UpstreamItem, UpstreamOrder, UpstreamVendor};
use crate::sync::normalizer::FlatRecord;

/// Currency symbols, grouping commas and whitespace stripped before numeric parse
static CURRENCY_NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[$€£,\s]").expect("currency noise pattern is valid"));

pub struct ItemAliases {
    pub sku: &'static [&'static str],
    pub product_name: &'static [&'static str],
    pub stock: &'static [&'static str],
    pub cost: &'static [&'static str],
    pub vendor: &'static [&'static str],
    pub location: &'static [&'static str],
    pub reorder_point: &'static [&'static str],
    pub reorder_quantity: &'static [&'static str],
}

pub struct VendorAliases {
    pub id: &'static [&'static str],
    pub name: &'static [&'static str],
}

pub struct OrderAliases {
    pub id: &'static [&'static str],
    pub status: &'static [&'static str],
    pub total: &'static [&'static str],
    pub vendor: &'static [&'static str],
    pub date: &'static [&'static str],
}

pub static ITEM_ALIASES: Lazy<ItemAliases> = Lazy::new(|| ItemAliases {
    sku: &["productId", "sku", "productCode"],
    product_name: &["internalName", "productName", "description"],
    stock: &["quantityAvailable", "quantityOnHand", "quantity"],
    cost: &["unitCost", "averageCost", "cost", "lastCost"],
    vendor: &["primaryVendor", "vendor", "primarySupplierName"],
    location: &["location", "facility", "binLocation"],
    reorder_point: &["reorderPoint", "reorderLevel"],
    reorder_quantity: &["reorderQuantity", "reorderQty"],
});

pub static VENDOR_ALIASES: Lazy<VendorAliases> = Lazy::new(|| VendorAliases {
    id: &["partyId", "vendorId", "id"],
    name: &["name", "partyName", "vendorName", "companyName"],
});

pub static ORDER_ALIASES: Lazy<OrderAliases> = Lazy::new(|| OrderAliases {
    id: &["orderId", "orderNumber", "id"],
    status: &["status", "orderStatus"],
    total: &["total", "grandTotal", "orderTotal"],
    vendor: &["supplierName", "vendorName", "party"],
    date: &["orderDate", "createdDate"],
});

/// Map one flat record to an inventory item
///
/// An empty `sku` is allowed through here: the upsert engine captures keyless
/// records as failures with their page position.
pub fn map_item(record: &FlatRecord) -> UpstreamItem {
    let aliases = &*ITEM_ALIASES;
    let sku = text_field(record, aliases.sku).unwrap_or_default();

    UpstreamItem {
        product_name: text_field(record, aliases.product_name).unwrap_or_default(),
        stock: int_field(record, aliases.stock, &sku).unwrap_or(0).max(0),
        cost: float_field(record, aliases.cost, &sku).unwrap_or(0.0).max(0.0),
        vendor: text_field(record, aliases.vendor).filter(|v| !v.is_empty()),
        location: text_field(record, aliases.location).unwrap_or_default(),
        reorder_point: int_field(record, aliases.reorder_point, &sku).unwrap_or(0),
        reorder_quantity: int_field(record, aliases.reorder_quantity, &sku).unwrap_or(0),
        sku,
    }
}

/// Map one flat record to a vendor
pub fn map_vendor(record: &FlatRecord) -> UpstreamVendor {
    let aliases = &*VENDOR_ALIASES;

    UpstreamVendor {
        upstream_vendor_id: text_field(record, aliases.id).unwrap_or_default(),
        name: text_field(record, aliases.name).unwrap_or_default(),
    }
}

/// Map one flat record to a purchase order
pub fn map_order(record: &FlatRecord) -> UpstreamOrder {
    let aliases = &*ORDER_ALIASES;
    let upstream_order_id = text_field(record, aliases.id).unwrap_or_default();

    // Keep the human-facing number when the record carries one separately
    let order_number =
        text_field(record, &["orderNumber"]).unwrap_or_else(|| upstream_order_id.clone());

    UpstreamOrder {
        order_number,
        status: text_field(record, aliases.status).unwrap_or_default(),
        order_total: float_field(record, aliases.total, &upstream_order_id).unwrap_or(0.0),
        vendor_name: text_field(record, aliases.vendor).filter(|v| !v.is_empty()),
        ordered_at: date_field(record, aliases.date, &upstream_order_id),
        upstream_order_id,
    }
}

/// First present and non-null alias value
fn first_present<'a>(record: &'a FlatRecord, aliases: &[&'a str]) -> Option<(&'a str, &'a Value)> {
    aliases.iter().find_map(|alias| {
        record
            .get(*alias)
            .filter(|value| !value.is_null())
            .map(|value| (*alias, value))
    })
}

fn text_field(record: &FlatRecord, aliases: &[&str]) -> Option<String> {
    let (_, value) = first_present(record, aliases)?;
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn int_field(record: &FlatRecord, aliases: &[&str], identifier: &str) -> Option<i64> {
    let (alias, value) = first_present(record, aliases)?;
    match coerce_i64(value) {
        Some(n) => Some(n),
        None => {
            warn!(
                "⚠️ Could not coerce {}={} on '{}', using default",
                alias, value, identifier
            );
            None
        }
    }
}

fn float_field(record: &FlatRecord, aliases: &[&str], identifier: &str) -> Option<f64> {
    let (alias, value) = first_present(record, aliases)?;
    match coerce_f64(value) {
        Some(n) => Some(n),
        None => {
            warn!(
                "⚠️ Could not coerce {}={} on '{}', using default",
                alias, value, identifier
            );
            None
        }
    }
}

fn date_field(
    record: &FlatRecord,
    aliases: &[&str],
    identifier: &str,
) -> Option<DateTime<Utc>> {
    let (alias, value) = first_present(record, aliases)?;
    match coerce_datetime(value) {
        Some(dt) => Some(dt),
        None => {
            warn!(
                "⚠️ Could not parse {}={} on '{}' as a timestamp",
                alias, value, identifier
            );
            None
        }
    }
}

fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let cleaned = CURRENCY_NOISE.replace_all(s, "");
            cleaned
                .parse::<i64>()
                .ok()
                .or_else(|| coerce_f64(value).map(|f| f as i64))
        }
        _ => None,
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => {
            let cleaned = CURRENCY_NOISE.replace_all(s, "");
            cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

/// Accept the timestamp renderings seen in the wild: RFC 3339, the upstream
/// database's space-separated form, bare dates and epoch values
fn coerce_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(Utc.from_utc_datetime(&naive));
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
            }
            None
        }
        Value::Number(n) => {
            let raw = n.as_i64()?;
            // Values this large can only be epoch milliseconds
            if raw.abs() >= 100_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn record(value: Value) -> FlatRecord {
        value.as_object().expect("test record is an object").clone()
    }

    #[rstest]
    #[case(json!({"productId": "P-100"}), "P-100")]
    #[case(json!({"sku": "S-200"}), "S-200")]
    #[case(json!({"productCode": "C-300"}), "C-300")]
    #[case(json!({"productId": "P-1", "sku": "S-1", "productCode": "C-1"}), "P-1")]
    #[case(json!({"productId": null, "sku": "S-2"}), "S-2")]
    #[case(json!({"productId": 4711}), "4711")]
    #[case(json!({"description": "no key here"}), "")]
    fn sku_alias_priority(#[case] raw: Value, #[case] expected: &str) {
        assert_eq!(map_item(&record(raw)).sku, expected);
    }

    #[rstest]
    #[case(json!({"internalName": "Widget A", "productName": "ignored"}), "Widget A")]
    #[case(json!({"productName": "Widget B"}), "Widget B")]
    #[case(json!({"description": "Widget C"}), "Widget C")]
    fn product_name_alias_priority(#[case] raw: Value, #[case] expected: &str) {
        assert_eq!(map_item(&record(raw)).product_name, expected);
    }

    #[rstest]
    #[case(json!({"quantityAvailable": 42}), 42)]
    #[case(json!({"quantityOnHand": "17"}), 17)]
    #[case(json!({"quantity": 3.0}), 3)]
    #[case(json!({"quantityAvailable": -5}), 0)]
    #[case(json!({"quantityAvailable": "not a number"}), 0)]
    #[case(json!({}), 0)]
    fn stock_coercion_and_clamp(#[case] raw: Value, #[case] expected: i64) {
        assert_eq!(map_item(&record(raw)).stock, expected);
    }

    #[rstest]
    #[case(json!({"unitCost": 12.5}), 12.5)]
    #[case(json!({"cost": "$1,299.50"}), 1299.5)]
    #[case(json!({"averageCost": "€8.25"}), 8.25)]
    #[case(json!({"lastCost": "-3.00"}), 0.0)]
    #[case(json!({"unitCost": "NaN"}), 0.0)]
    fn cost_coercion_strips_currency_noise(#[case] raw: Value, #[case] expected: f64) {
        assert!((map_item(&record(raw)).cost - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn vendor_is_optional_and_blank_collapses_to_none() {
        assert_eq!(
            map_item(&record(json!({"primaryVendor": "Acme Supply"}))).vendor,
            Some("Acme Supply".to_string())
        );
        assert_eq!(map_item(&record(json!({"vendor": "   "}))).vendor, None);
        assert_eq!(map_item(&record(json!({}))).vendor, None);
    }

    #[rstest]
    #[case(json!({"partyId": "VEND-1"}), "VEND-1", "")]
    #[case(json!({"vendorId": 88, "companyName": "Globex"}), "88", "Globex")]
    #[case(json!({"id": "X", "name": "Acme", "partyName": "shadowed"}), "X", "Acme")]
    fn vendor_mapping(#[case] raw: Value, #[case] id: &str, #[case] name: &str) {
        let vendor = map_vendor(&record(raw));
        assert_eq!(vendor.upstream_vendor_id, id);
        assert_eq!(vendor.name, name);
    }

    #[rstest]
    #[case(json!({"orderId": "ORD-1"}), "ORD-1")]
    #[case(json!({"orderNumber": "PO-77"}), "PO-77")]
    #[case(json!({"id": 910}), "910")]
    fn order_id_alias_priority(#[case] raw: Value, #[case] expected: &str) {
        assert_eq!(map_order(&record(raw)).upstream_order_id, expected);
    }

    #[test]
    fn order_number_prefers_the_display_number() {
        let order = map_order(&record(json!({"orderId": "ORD-1", "orderNumber": "PO-2024-001"})));
        assert_eq!(order.upstream_order_id, "ORD-1");
        assert_eq!(order.order_number, "PO-2024-001");

        let bare = map_order(&record(json!({"orderId": "ORD-2"})));
        assert_eq!(bare.order_number, "ORD-2");
    }

    #[test]
    fn order_fields_map_with_defaults() {
        let order = map_order(&record(json!({
            "orderId": "ORD-9",
            "orderStatus": "APPROVED",
            "grandTotal": "$2,500.00",
            "supplierName": "Acme Supply",
            "orderDate": "2024-03-01T08:30:00Z"
        })));
        assert_eq!(order.status, "APPROVED");
        assert!((order.order_total - 2500.0).abs() < f64::EPSILON);
        assert_eq!(order.vendor_name, Some("Acme Supply".to_string()));
        assert!(order.ordered_at.is_some());

        let sparse = map_order(&record(json!({"orderId": "ORD-10"})));
        assert_eq!(sparse.status, "");
        assert_eq!(sparse.order_total, 0.0);
        assert_eq!(sparse.ordered_at, None);
    }

    #[rstest]
    #[case(json!("2024-03-01T08:30:00Z"))]
    #[case(json!("2024-03-01T08:30:00+00:00"))]
    #[case(json!("2024-03-01 08:30:00"))]
    #[case(json!("2024-03-01 08:30:00.250"))]
    #[case(json!(1_709_281_800_000_i64))]
    #[case(json!(1_709_281_800))]
    fn timestamp_renderings_parse(#[case] raw: Value) {
        let dt = coerce_datetime(&raw).expect("should parse");
        assert_eq!(dt.date_naive().to_string(), "2024-03-01");
    }

    #[test]
    fn bare_date_parses_to_midnight() {
        let dt = coerce_datetime(&json!("2024-03-01")).expect("should parse");
        assert_eq!(dt.to_rfc3339(), "2024-03-01T00:00:00+00:00");
    }

    #[test]
    fn garbage_timestamp_is_dropped() {
        assert_eq!(coerce_datetime(&json!("next tuesday")), None);
        assert_eq!(coerce_datetime(&json!(true)), None);
    }
}
