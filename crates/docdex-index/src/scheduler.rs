//! Per-folder FIFO of pending documents.

use docdex_core::DocumentInfo;
use std::collections::{BTreeMap, VecDeque};

/// Time-sliced scan queue: one FIFO per folder, serviced smallest folder id
/// first.
///
/// Within a folder the FIFO is strict; a partially processed document is
/// prepended so the next dequeue resumes it. Across folders the smallest key
/// wins every time, so a low-id folder with a long queue can delay the
/// others; acceptable for now since ticks are bounded to ~100 ms.
#[derive(Debug, Default)]
pub struct ScanScheduler {
    queues: BTreeMap<i64, VecDeque<DocumentInfo>>,
}

impl ScanScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a work item to its folder's queue.
    pub fn enqueue(&mut self, info: DocumentInfo) {
        self.queues.entry(info.folder_id).or_default().push_back(info);
    }

    /// Prepend a work item so it is dequeued next for its folder.
    pub fn requeue(&mut self, info: DocumentInfo) {
        self.queues
            .entry(info.folder_id)
            .or_default()
            .push_front(info);
    }

    /// Take the next work item from the folder with the smallest id.
    pub fn dequeue(&mut self) -> Option<DocumentInfo> {
        let (&folder_id, queue) = self.queues.iter_mut().next()?;
        let info = queue.pop_front();
        if queue.is_empty() {
            self.queues.remove(&folder_id);
        }
        info
    }

    /// Drop every queued item for a folder (used by folder removal).
    pub fn remove_folder(&mut self, folder_id: i64) {
        self.queues.remove(&folder_id);
    }

    pub fn has_work(&self) -> bool {
        !self.queues.is_empty()
    }

    /// Number of queued items for one folder.
    pub fn documents_for_folder(&self, folder_id: i64) -> usize {
        self.queues.get(&folder_id).map_or(0, VecDeque::len)
    }

    /// Sum of the queued items' sizes for one folder.
    pub fn bytes_for_folder(&self, folder_id: i64) -> u64 {
        self.queues
            .get(&folder_id)
            .map_or(0, |q| q.iter().map(|info| info.size).sum())
    }
}
