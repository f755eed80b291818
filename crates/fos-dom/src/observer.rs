//! Mutation Observer API
//!
//! Observe DOM changes. The document queues matching records on each
//! observer and then delivers them to the observer's callback.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::{lock, NodeId};

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

/// Mutation type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationType {
    Attributes,
    ChildList,
}

/// Mutation record
#[derive(Debug, Clone)]
pub struct MutationRecord {
    pub mutation_type: MutationType,
    pub target: NodeId,
    pub added_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
    pub attribute_name: Option<String>,
}

impl MutationRecord {
    /// Child list change on `target`
    pub fn child_list(target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) -> Self {
        Self {
            mutation_type: MutationType::ChildList,
            target,
            added_nodes: added,
            removed_nodes: removed,
            attribute_name: None,
        }
    }

    /// Attribute change on `target`
    pub fn attribute(target: NodeId, name: &str) -> Self {
        Self {
            mutation_type: MutationType::Attributes,
            target,
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
            attribute_name: Some(name.to_string()),
        }
    }
}

/// Mutation observer options
#[derive(Debug, Clone, Default)]
pub struct MutationObserverInit {
    pub child_list: bool,
    pub attributes: bool,
    pub subtree: bool,
    pub attribute_filter: Option<Vec<String>>,
}

impl MutationObserverInit {
    fn accepts(&self, record: &MutationRecord) -> bool {
        match record.mutation_type {
            MutationType::ChildList => self.child_list,
            MutationType::Attributes => {
                self.attributes
                    && match (&self.attribute_filter, &record.attribute_name) {
                        (Some(filter), Some(name)) => filter.contains(name),
                        _ => true,
                    }
            }
        }
    }
}

/// Mutation observer callback
pub type MutationCallback = Arc<dyn Fn(&[MutationRecord]) + Send + Sync>;

/// Mutation observer
pub struct MutationObserver {
    id: u64,
    callback: MutationCallback,
    observations: Mutex<Vec<(NodeId, MutationObserverInit)>>,
    pending_records: Mutex<Vec<MutationRecord>>,
}

impl fmt::Debug for MutationObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationObserver")
            .field("id", &self.id)
            .field("observations", &*lock(&self.observations))
            .finish()
    }
}

impl MutationObserver {
    pub fn new(callback: MutationCallback) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed),
            callback,
            observations: Mutex::new(Vec::new()),
            pending_records: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Observe a target
    pub fn observe(&self, target: NodeId, options: MutationObserverInit) {
        let mut observations = lock(&self.observations);
        observations.retain(|(node, _)| *node != target);
        observations.push((target, options));
    }

    /// Stop observing everything and drop queued records
    pub fn disconnect(&self) {
        lock(&self.observations).clear();
        lock(&self.pending_records).clear();
    }

    /// Check if observing anything
    pub fn is_observing(&self) -> bool {
        !lock(&self.observations).is_empty()
    }

    /// Take pending records
    pub fn take_records(&self) -> Vec<MutationRecord> {
        std::mem::take(&mut *lock(&self.pending_records))
    }

    /// Queue a record if it matches an observation.
    ///
    /// `ancestors` lists the ancestors of the record's target, nearest
    /// first; `subtree` observations match against it.
    pub fn enqueue(&self, record: &MutationRecord, ancestors: &[NodeId]) -> bool {
        let matched = lock(&self.observations).iter().any(|(node, options)| {
            let in_scope = *node == record.target || (options.subtree && ancestors.contains(node));
            in_scope && options.accepts(record)
        });

        if matched {
            lock(&self.pending_records).push(record.clone());
        }
        matched
    }

    /// Deliver queued records to the callback
    pub fn deliver(&self) {
        let records = self.take_records();
        if !records.is_empty() {
            (self.callback)(&records);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn observer() -> (Arc<MutationObserver>, Arc<AtomicUsize>) {
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        let observer = MutationObserver::new(Arc::new(move |records: &[MutationRecord]| {
            s.fetch_add(records.len(), Ordering::SeqCst);
        }));
        (observer, seen)
    }

    #[test]
    fn test_child_list_subtree() {
        let (observer, seen) = observer();
        observer.observe(NodeId::ROOT, MutationObserverInit {
            child_list: true,
            subtree: true,
            ..Default::default()
        });

        let record = MutationRecord::child_list(NodeId(4), vec![NodeId(5)], Vec::new());
        assert!(observer.enqueue(&record, &[NodeId(2), NodeId::ROOT]));
        observer.deliver();
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        // Nothing left to deliver
        observer.deliver();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_without_subtree_ignores_descendants() {
        let (observer, _) = observer();
        observer.observe(NodeId::ROOT, MutationObserverInit {
            child_list: true,
            ..Default::default()
        });

        let record = MutationRecord::child_list(NodeId(4), vec![NodeId(5)], Vec::new());
        assert!(!observer.enqueue(&record, &[NodeId::ROOT]));
    }

    #[test]
    fn test_attribute_filter() {
        let (observer, _) = observer();
        observer.observe(NodeId(1), MutationObserverInit {
            attributes: true,
            attribute_filter: Some(vec!["src".to_string()]),
            ..Default::default()
        });

        assert!(observer.enqueue(&MutationRecord::attribute(NodeId(1), "src"), &[]));
        assert!(!observer.enqueue(&MutationRecord::attribute(NodeId(1), "class"), &[]));
        assert_eq!(observer.take_records().len(), 1);
    }

    #[test]
    fn test_disconnect() {
        let (observer, seen) = observer();
        observer.observe(NodeId::ROOT, MutationObserverInit {
            child_list: true,
            ..Default::default()
        });
        observer.enqueue(&MutationRecord::child_list(NodeId::ROOT, vec![NodeId(1)], Vec::new()), &[]);

        observer.disconnect();
        assert!(!observer.is_observing());
        observer.deliver();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }
}
