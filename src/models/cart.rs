use serde::{Deserialize, Serialize};

/// One line of a shopping cart: a menu item id and how many of it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: u64,
    pub amount: u32,
}

impl CartLine {
    pub fn new(id: u64, amount: u32) -> Self {
        Self { id, amount }
    }
}

/// Merge `incoming` into `cart` by id. Matching lines have their amounts
/// summed; unmatched lines are appended in arrival order. Existing order is
/// kept.
pub fn merge_lines(cart: &mut Vec<CartLine>, incoming: &[CartLine]) {
    for item in incoming {
        match cart.iter_mut().find(|line| line.id == item.id) {
            Some(line) => line.amount = line.amount.saturating_add(item.amount),
            None => cart.push(*item),
        }
    }
}

/// Take one unit of `id` out of the cart, dropping the line when nothing is
/// left. Returns `false` if no line has that id.
pub fn remove_one(cart: &mut Vec<CartLine>, id: u64) -> bool {
    let Some(index) = cart.iter().position(|line| line.id == id) else {
        return false;
    };

    if cart[index].amount > 1 {
        cart[index].amount -= 1;
    } else {
        cart.remove(index);
    }
    true
}
