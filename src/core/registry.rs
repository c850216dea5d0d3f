//! Ordered collection of live download controllers

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::controller::DownloadController;
use crate::core::models::{DownloadTask, TaskId};

/// Tasks in creation order, looked up by id
#[derive(Default)]
pub struct TaskRegistry {
    order: Vec<TaskId>,
    controllers: HashMap<TaskId, Arc<DownloadController>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, controller: Arc<DownloadController>) -> TaskId {
        let id = controller.id();
        if self.controllers.insert(id.clone(), controller).is_none() {
            self.order.push(id.clone());
        }
        id
    }

    pub fn get(&self, task_id: &str) -> Option<Arc<DownloadController>> {
        self.controllers.get(task_id).cloned()
    }

    pub fn remove(&mut self, task_id: &str) -> Option<Arc<DownloadController>> {
        let removed = self.controllers.remove(task_id)?;
        self.order.retain(|id| id != task_id);
        Some(removed)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.controllers.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Copies of every task, oldest first
    pub fn snapshot(&self) -> Vec<DownloadTask> {
        self.order
            .iter()
            .filter_map(|id| self.controllers.get(id))
            .map(|controller| controller.snapshot())
            .collect()
    }
}
