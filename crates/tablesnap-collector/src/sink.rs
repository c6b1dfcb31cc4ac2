//! The list of collected entries and the post-task queue behind it

use tablesnap_core::{
    BackupEntries, BackupEntry, BackupEntrySink, BackupError, BackupResult, PostCollectingTask,
};
use tracing::trace;

use crate::tasks::PostTaskQueue;

/// Entries and deferred tasks of one pipeline run.
///
/// Once sealed, the entry list is final: adding entries or tasks fails with
/// a `LogicalError` and leaves the collected entries untouched.
#[derive(Debug, Default)]
pub struct EntryCollection {
    entries: BackupEntries,
    post_tasks: PostTaskQueue,
    sealed: bool,
}

impl EntryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[BackupEntry] {
        &self.entries
    }

    pub fn pending_tasks(&self) -> usize {
        self.post_tasks.len()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Forbid any further entries or tasks
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Run queued tasks until the queue is empty, including tasks queued by
    /// running tasks. Stops at the first failing task.
    pub fn run_post_collecting_tasks(&mut self) -> BackupResult<usize> {
        let mut executed = 0;
        while let Some(task) = self.post_tasks.pop() {
            task(self)?;
            executed += 1;
        }
        trace!(executed, "Post collecting tasks finished");
        Ok(executed)
    }

    fn ensure_not_sealed(&self, what: &str) -> BackupResult<()> {
        if self.sealed {
            return Err(BackupError::logical(format!("Adding {what} is not allowed")));
        }
        Ok(())
    }
}

impl BackupEntrySink for EntryCollection {
    fn add_backup_entry(&mut self, entry: BackupEntry) -> BackupResult<()> {
        self.ensure_not_sealed("backup entries")?;
        self.entries.push(entry);
        Ok(())
    }

    fn add_backup_entries(&mut self, entries: BackupEntries) -> BackupResult<()> {
        self.ensure_not_sealed("backup entries")?;
        self.entries.extend(entries);
        Ok(())
    }

    fn add_post_collecting_task(&mut self, task: PostCollectingTask) -> BackupResult<()> {
        self.ensure_not_sealed("post tasks")?;
        self.post_tasks.push(task);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_tasks_run_in_order_including_nested() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut collection = EntryCollection::new();

        let first = order.clone();
        let nested = order.clone();
        collection
            .add_post_collecting_task(Box::new(move |sink| {
                first.lock().unwrap().push("first");
                sink.add_post_collecting_task(Box::new(move |sink| {
                    nested.lock().unwrap().push("nested");
                    sink.add_backup_entry(BackupEntry::from_memory("nested.txt", "n"))
                }))
            }))
            .unwrap();
        let second = order.clone();
        collection
            .add_post_collecting_task(Box::new(move |_| {
                second.lock().unwrap().push("second");
                Ok(())
            }))
            .unwrap();

        assert_eq!(collection.run_post_collecting_tasks().unwrap(), 3);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "nested"]);
        assert_eq!(collection.entries().len(), 1);
        assert_eq!(collection.pending_tasks(), 0);
    }

    #[test]
    fn test_failing_task_stops_draining() {
        let mut collection = EntryCollection::new();
        collection
            .add_post_collecting_task(Box::new(|_| Err(BackupError::Catalog("boom".into()))))
            .unwrap();
        collection
            .add_post_collecting_task(Box::new(|_| Ok(())))
            .unwrap();

        assert!(collection.run_post_collecting_tasks().is_err());
        assert_eq!(collection.pending_tasks(), 1);
    }

    #[test]
    fn test_sealed_collection_rejects_additions() {
        let mut collection = EntryCollection::new();
        collection
            .add_backup_entry(BackupEntry::from_memory("a.sql", "a"))
            .unwrap();
        collection.seal();

        let err = collection
            .add_backup_entry(BackupEntry::from_memory("b.sql", "b"))
            .unwrap_err();
        assert!(err.is_logical());
        assert!(
            collection
                .add_backup_entries(vec![BackupEntry::from_memory("c.sql", "c")])
                .unwrap_err()
                .is_logical()
        );
        assert!(
            collection
                .add_post_collecting_task(Box::new(|_| Ok(())))
                .unwrap_err()
                .is_logical()
        );
        assert_eq!(collection.entries().len(), 1);
        assert_eq!(collection.entries()[0].path, "a.sql");
    }
}
