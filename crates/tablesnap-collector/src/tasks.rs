//! Deferred post-collection tasks

use std::collections::VecDeque;
use std::fmt;

use tablesnap_core::PostCollectingTask;

/// FIFO of tasks added while entries are collected.
///
/// Tasks run in the order they were added. A running task may add more
/// tasks; those run after everything already queued.
#[derive(Default)]
pub struct PostTaskQueue {
    tasks: VecDeque<PostCollectingTask>,
}

impl PostTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: PostCollectingTask) {
        self.tasks.push_back(task);
    }

    pub fn pop(&mut self) -> Option<PostCollectingTask> {
        self.tasks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl fmt::Debug for PostTaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostTaskQueue")
            .field("pending", &self.tasks.len())
            .finish()
    }
}
