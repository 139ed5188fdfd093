mod cache;
mod items;

pub use cache::{compute_cache, get_cache};
pub use items::{create_item, get_item, get_item_image};
