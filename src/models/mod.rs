//! Typed shapes of the documents kept in the store.

mod cart;
mod menu;
mod purchase;
mod token;
mod user;

pub use cart::*;
pub use menu::*;
pub use purchase::*;
pub use token::*;
pub use user::*;

/// Key of the single catalog document in the `menu` collection
pub const MENU_KEY: &str = "items";
