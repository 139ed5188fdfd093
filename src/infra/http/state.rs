use std::sync::Arc;

use crate::application::{compute::ComputeService, items::ItemService};

#[derive(Clone)]
pub struct AppState {
    pub items: Arc<ItemService>,
    pub compute: Arc<ComputeService>,
}
