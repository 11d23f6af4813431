use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CartLine, MenuItem};

/// Amount owed for a cart, priced against the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bill {
    /// Total in minor currency units
    pub charge: u64,
    pub description: String,
}

impl Bill {
    /// Price each line against `menu`. Lines whose id is not on the menu are
    /// skipped.
    pub fn compute(cart: &[CartLine], menu: &[MenuItem]) -> Self {
        let charge = cart
            .iter()
            .filter_map(|line| {
                menu.iter()
                    .find(|item| item.id == line.id)
                    .map(|item| item.price_cents().saturating_mul(u64::from(line.amount)))
            })
            .fold(0u64, u64::saturating_add);

        Self {
            charge,
            description: format!("TOTAL: {}.{:02}", charge / 100, charge % 100),
        }
    }
}

/// A finalized order. Written once, never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: String,
    pub email: String,
    pub items: Vec<CartLine>,
    pub charge: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn menu() -> Vec<MenuItem> {
        serde_json::from_value(json!([
            {"id": 1, "price": 10, "name": "Margherita"},
            {"id": 2, "price": 12.5, "name": "Pepperoni"}
        ]))
        .unwrap()
    }

    #[test]
    fn test_bill_sums_matched_lines() {
        let bill = Bill::compute(&[CartLine::new(1, 2), CartLine::new(2, 1)], &menu());
        assert_eq!(bill.charge, 3250);
        assert_eq!(bill.description, "TOTAL: 32.50");
    }

    #[test]
    fn test_bill_skips_unknown_items() {
        let bill = Bill::compute(&[CartLine::new(99, 4), CartLine::new(1, 1)], &menu());
        assert_eq!(bill.charge, 1000);
        assert_eq!(bill.description, "TOTAL: 10.00");
    }

    #[test]
    fn test_bill_saturates_instead_of_overflowing() {
        let menu: Vec<MenuItem> = serde_json::from_value(json!([
            {"id": 1, "price": 1.0e15},
            {"id": 2, "price": 1.0}
        ]))
        .unwrap();
        let bill = Bill::compute(&[CartLine::new(1, u32::MAX), CartLine::new(2, 1)], &menu);
        assert_eq!(bill.charge, u64::MAX);
    }
}
