use serde::Serialize;

use crate::{
    error::Result,
    repositories::user::UserStore,
    services::messages::MessageService,
};

/// Operational counters shown to admins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub registered_accounts: i64,
    pub active_messages: i64,
}

pub async fn collect(users: &dyn UserStore, messages: &MessageService) -> Result<Stats> {
    Ok(Stats {
        registered_accounts: users.count().await?,
        active_messages: messages.active_count().await?,
    })
}
