use serde::{Deserialize, Serialize};

/// One catalog entry. Fields beyond `id` and `price` are kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: u64,
    /// Unit price in major currency units
    pub price: f64,
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl MenuItem {
    pub fn price_cents(&self) -> u64 {
        (self.price * 100.0).round().max(0.0) as u64
    }
}

/// Catalog written on first start when the data directory has none
pub fn default_menu() -> Vec<MenuItem> {
    [
        (1, "Margherita", 8.5),
        (2, "Pepperoni", 10.0),
        (3, "Quattro Formaggi", 11.0),
        (4, "Funghi", 9.5),
    ]
    .into_iter()
    .map(|(id, name, price)| {
        let mut details = serde_json::Map::new();
        details.insert("name".into(), name.into());
        MenuItem { id, price, details }
    })
    .collect()
}
