use async_trait::async_trait;

use crate::{error::Result, model::NotificationTask};

pub mod amqp;
pub mod memory;

/// Destination for notification tasks. Delivery is best-effort: a returned
/// `Ok` means the broker accepted the message, nothing more.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn publish(&self, task: &NotificationTask) -> Result<()>;
}
