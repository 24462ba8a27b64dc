mod handlers;
mod models;
mod routes;

use shop_list::config::CardConfig;
use shop_list::engine::ShoppingList;

pub use routes::create_router;

/// Shared by every handler; both halves are cheap to clone.
#[derive(Clone)]
pub struct ApiState {
    pub list: ShoppingList,
    pub card: CardConfig,
}
