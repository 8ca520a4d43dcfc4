use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{error::Result, model::NotificationTask};

use super::TaskQueue;

/// Keeps published tasks in memory, in publish order.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    tasks: Mutex<Vec<NotificationTask>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> Vec<NotificationTask> {
        self.tasks.lock().clone()
    }

    pub fn take(&self) -> Vec<NotificationTask> {
        std::mem::take(&mut *self.tasks.lock())
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn publish(&self, task: &NotificationTask) -> Result<()> {
        self.tasks.lock().push(task.clone());
        Ok(())
    }
}
