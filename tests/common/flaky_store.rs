//! An [`EntityStore`] wrapper that fails chosen writes on demand, or deletes
//! a record right before one to simulate a concurrent request.

use music_catalog::entity_store::{
    EntityKind, EntityStore, FieldDelta, Query, SqliteEntityStore, StoreError, StoreResult,
};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Insert,
    Patch,
    Delete,
}

pub struct FlakyStore {
    inner: SqliteEntityStore,
    armed: Mutex<Vec<(StoreOp, EntityKind)>>,
    vanishing: Mutex<Vec<Vanish>>,
    injected: AtomicUsize,
}

struct Vanish {
    op: StoreOp,
    kind: EntityKind,
    target_kind: EntityKind,
    target_id: String,
}

impl FlakyStore {
    pub fn new(inner: SqliteEntityStore) -> Self {
        FlakyStore {
            inner,
            armed: Mutex::new(Vec::new()),
            vanishing: Mutex::new(Vec::new()),
            injected: AtomicUsize::new(0),
        }
    }

    /// The next `op` on a `kind` document fails. Arming twice fails two calls.
    pub fn fail_next(&self, op: StoreOp, kind: EntityKind) {
        self.armed.lock().unwrap().push((op, kind));
    }

    /// Right before the next `op` on a `kind` document, `target_id` is
    /// deleted from the underlying store as if by another caller.
    pub fn delete_before_next(
        &self,
        op: StoreOp,
        kind: EntityKind,
        target_kind: EntityKind,
        target_id: &str,
    ) {
        self.vanishing.lock().unwrap().push(Vanish {
            op,
            kind,
            target_kind,
            target_id: target_id.to_string(),
        });
    }

    /// How many calls have been failed so far.
    pub fn injected(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    pub fn armed(&self) -> usize {
        self.armed.lock().unwrap().len()
    }

    fn trip(&self, op: StoreOp, kind: EntityKind) -> StoreResult<()> {
        let vanish = {
            let mut vanishing = self.vanishing.lock().unwrap();
            let pos = vanishing.iter().position(|v| v.op == op && v.kind == kind);
            pos.map(|pos| vanishing.remove(pos))
        };
        if let Some(v) = vanish {
            self.inner.delete(v.target_kind, &v.target_id)?;
        }

        let mut armed = self.armed.lock().unwrap();
        if let Some(pos) = armed.iter().position(|fault| *fault == (op, kind)) {
            armed.remove(pos);
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Unavailable(format!(
                "injected {:?} failure on {}",
                op, kind
            )));
        }
        Ok(())
    }
}

impl EntityStore for FlakyStore {
    fn get(&self, kind: EntityKind, id: &str) -> StoreResult<Option<Value>> {
        self.inner.get(kind, id)
    }

    fn find(&self, kind: EntityKind, query: &Query) -> StoreResult<Vec<Value>> {
        self.inner.find(kind, query)
    }

    fn insert(&self, kind: EntityKind, document: Value) -> StoreResult<Value> {
        self.trip(StoreOp::Insert, kind)?;
        self.inner.insert(kind, document)
    }

    fn put(&self, kind: EntityKind, document: Value) -> StoreResult<Value> {
        self.trip(StoreOp::Insert, kind)?;
        self.inner.put(kind, document)
    }

    fn patch(
        &self,
        kind: EntityKind,
        id: &str,
        deltas: &[FieldDelta],
    ) -> StoreResult<Option<Value>> {
        self.trip(StoreOp::Patch, kind)?;
        self.inner.patch(kind, id, deltas)
    }

    fn delete(&self, kind: EntityKind, id: &str) -> StoreResult<bool> {
        self.trip(StoreOp::Delete, kind)?;
        self.inner.delete(kind, id)
    }

    fn count(&self, kind: EntityKind) -> StoreResult<usize> {
        self.inner.count(kind)
    }
}
