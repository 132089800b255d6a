use std::sync::Arc;

use msgsvc_core::services::CommandDispatcher;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<CommandDispatcher>,
    pub service_name: String,
}
