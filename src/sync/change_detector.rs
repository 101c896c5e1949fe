//! Content-hash change detection
//!
//! Records are fingerprinted over exactly their tracked attributes so a sync
//! can skip rows the upstream system did not change. The digest input is a
//! sorted list of `field=value` lines, which makes the hash independent of
//! upstream field order by construction.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::domain::inventory::{UpstreamItem, UpstreamOrder, UpstreamVendor};

/// Tracked attributes of an entity as (name, canonical value) pairs
pub trait Fingerprint {
    fn tracked_fields(&self) -> Vec<(&'static str, String)>;
}

/// Canonical blake3 digest over an entity's tracked attributes, hex encoded
pub fn content_hash<T: Fingerprint>(entity: &T) -> String {
    let mut fields = entity.tracked_fields();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = blake3::Hasher::new();
    for (name, value) in &fields {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

/// A record changed when no hash is stored yet or the stored hash differs
pub fn has_changed(new_hash: &str, stored: Option<&str>) -> bool {
    stored != Some(new_hash)
}

/// Render a float so integral values agree with their integer rendering
/// (`10`, `10.0` and `"10.00"` all fingerprint as `10`)
fn canonical_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn canonical_text(value: &str) -> String {
    value.trim().to_string()
}

fn canonical_opt_text(value: Option<&str>) -> String {
    value.map(canonical_text).unwrap_or_default()
}

fn canonical_opt_time(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

impl Fingerprint for UpstreamItem {
    fn tracked_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("sku", canonical_text(&self.sku)),
            ("product_name", canonical_text(&self.product_name)),
            ("stock", self.stock.to_string()),
            ("cost", canonical_float(self.cost)),
            ("vendor", canonical_opt_text(self.vendor.as_deref())),
            ("location", canonical_text(&self.location)),
            ("reorder_point", self.reorder_point.to_string()),
            ("reorder_quantity", self.reorder_quantity.to_string()),
        ]
    }
}

impl Fingerprint for UpstreamVendor {
    fn tracked_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("upstream_vendor_id", canonical_text(&self.upstream_vendor_id)),
            ("name", canonical_text(&self.name)),
        ]
    }
}

impl Fingerprint for UpstreamOrder {
    fn tracked_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("upstream_order_id", canonical_text(&self.upstream_order_id)),
            ("order_number", canonical_text(&self.order_number)),
            ("status", canonical_text(&self.status)),
            ("order_total", canonical_float(self.order_total)),
            ("vendor_name", canonical_opt_text(self.vendor_name.as_deref())),
            ("ordered_at", canonical_opt_time(self.ordered_at)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_item() -> UpstreamItem {
        UpstreamItem {
            sku: "SKU-1".to_string(),
            product_name: "Widget".to_string(),
            stock: 10,
            cost: 12.5,
            vendor: Some("Acme Supply".to_string()),
            location: "A-01".to_string(),
            reorder_point: 5,
            reorder_quantity: 25,
        }
    }

    #[test]
    fn hash_is_stable_for_equal_items() {
        assert_eq!(content_hash(&sample_item()), content_hash(&sample_item()));
    }

    #[test]
    fn every_tracked_field_is_hash_sensitive() {
        let base = content_hash(&sample_item());

        let variants = [
            UpstreamItem {
                sku: "SKU-2".to_string(),
                ..sample_item()
            },
            UpstreamItem {
                product_name: "Widget Mk2".to_string(),
                ..sample_item()
            },
            UpstreamItem {
                stock: 11,
                ..sample_item()
            },
            UpstreamItem {
                cost: 12.51,
                ..sample_item()
            },
            UpstreamItem {
                vendor: None,
                ..sample_item()
            },
            UpstreamItem {
                location: "B-02".to_string(),
                ..sample_item()
            },
            UpstreamItem {
                reorder_point: 6,
                ..sample_item()
            },
            UpstreamItem {
                reorder_quantity: 26,
                ..sample_item()
            },
        ];

        for variant in variants {
            assert_ne!(base, content_hash(&variant), "change went undetected");
        }
    }

    #[test]
    fn integral_floats_agree_with_integers() {
        assert_eq!(canonical_float(10.0), "10");
        assert_eq!(canonical_float(10.5), "10.5");
        assert_eq!(canonical_float(0.0), "0");
        assert_eq!(canonical_float(-3.0), "-3");
    }

    #[test]
    fn whitespace_does_not_change_the_fingerprint() {
        let padded = UpstreamItem {
            product_name: "  Widget  ".to_string(),
            ..sample_item()
        };
        assert_eq!(content_hash(&sample_item()), content_hash(&padded));
    }

    #[test]
    fn has_changed_against_stored_hash() {
        let hash = content_hash(&sample_item());
        assert!(has_changed(&hash, None));
        assert!(!has_changed(&hash, Some(hash.as_str())));
        assert!(has_changed(&hash, Some("something-else")));
    }

    #[test]
    fn vendor_and_order_fingerprints_differ_by_content() {
        let vendor = UpstreamVendor {
            upstream_vendor_id: "VEND-1".to_string(),
            name: "Acme Supply".to_string(),
        };
        let renamed = UpstreamVendor {
            name: "Acme Supplies".to_string(),
            ..vendor.clone()
        };
        assert_ne!(content_hash(&vendor), content_hash(&renamed));

        let order = UpstreamOrder {
            upstream_order_id: "ORD-1".to_string(),
            order_number: "PO-1".to_string(),
            status: "APPROVED".to_string(),
            order_total: 100.0,
            vendor_name: Some("Acme Supply".to_string()),
            ordered_at: None,
        };
        let received = UpstreamOrder {
            status: "RECEIVED".to_string(),
            ..order.clone()
        };
        assert_ne!(content_hash(&order), content_hash(&received));
    }

    proptest! {
        #[test]
        fn hash_is_deterministic_and_sensitive(
            sku in "[A-Z]{1,6}-[0-9]{1,5}",
            stock in 0i64..1_000_000,
            cost in 0.0f64..100_000.0,
        ) {
            let item = UpstreamItem {
                sku,
                stock,
                cost,
                ..sample_item()
            };
            prop_assert_eq!(content_hash(&item), content_hash(&item.clone()));

            let bumped = UpstreamItem {
                stock: item.stock + 1,
                ..item.clone()
            };
            prop_assert_ne!(content_hash(&item), content_hash(&bumped));
        }
    }
}
