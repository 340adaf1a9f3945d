//! Keeps parent mirror arrays in step with the children's back-references.
//!
//! Every call here is a sequence of single-document patches. Nothing is
//! atomic across documents, so `reconcile` recomputes mirrors from the
//! back-references, which are the ground truth.

use super::links::{find_link, links_for_child, links_for_parent, MirrorLink};
use crate::entity_store::{EntityKind, EntityStore, FieldDelta, Query, StoreError};
use crate::error::ServiceError;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("{kind} '{id}' does not exist")]
    ParentMissing { kind: EntityKind, id: String },

    #[error("{parent} does not mirror {child} records")]
    NoSuchLink {
        parent: EntityKind,
        child: EntityKind,
    },

    #[error("{kind} document has no '{field}'")]
    MissingField {
        kind: EntityKind,
        field: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A reference whose target record does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    pub kind: EntityKind,
    pub id: String,
    pub field: &'static str,
    pub target_kind: EntityKind,
    pub target_id: String,
}

impl fmt::Display for DanglingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} -> missing {} {}",
            self.kind, self.id, self.field, self.target_kind, self.target_id
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub attached: usize,
    pub detached: usize,
    pub dangling: Vec<DanglingReference>,
}

impl ReconcileReport {
    pub fn merge(&mut self, other: ReconcileReport) {
        self.attached += other.attached;
        self.detached += other.detached;
        self.dangling.extend(other.dangling);
    }

    pub fn changed(&self) -> bool {
        self.attached > 0 || self.detached > 0
    }
}

#[derive(Clone)]
pub struct MirrorMaintainer {
    store: Arc<dyn EntityStore>,
}

impl MirrorMaintainer {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        MirrorMaintainer { store }
    }

    /// Adds `child_id` to the parent's mirror. Idempotent.
    pub fn attach(
        &self,
        parent_kind: EntityKind,
        parent_id: &str,
        child_kind: EntityKind,
        child_id: &str,
    ) -> Result<(), MirrorError> {
        let link = link(parent_kind, child_kind)?;
        let delta = FieldDelta::AddToSet(link.mirror_field.to_string(), Value::from(child_id));
        match self.store.patch(parent_kind, parent_id, &[delta])? {
            Some(_) => {
                debug!(
                    "Attached {} {} to {} {}.{}",
                    child_kind, child_id, parent_kind, parent_id, link.mirror_field
                );
                Ok(())
            }
            None => Err(MirrorError::ParentMissing {
                kind: parent_kind,
                id: parent_id.to_string(),
            }),
        }
    }

    /// Removes `child_id` from the parent's mirror. Idempotent, and a no-op
    /// when the parent is gone.
    pub fn detach(
        &self,
        parent_kind: EntityKind,
        parent_id: &str,
        child_kind: EntityKind,
        child_id: &str,
    ) -> Result<(), MirrorError> {
        let link = link(parent_kind, child_kind)?;
        let delta = FieldDelta::Pull(link.mirror_field.to_string(), Value::from(child_id));
        if self.store.patch(parent_kind, parent_id, &[delta])?.is_none() {
            debug!(
                "Detach of {} {} skipped, {} {} is gone",
                child_kind, child_id, parent_kind, parent_id
            );
        }
        Ok(())
    }

    /// Attaches the child to every parent its back-references name, in link
    /// order. Stops at the first failure.
    pub fn attach_all(&self, child_kind: EntityKind, child: &Value) -> Result<(), MirrorError> {
        let child_id = required_str(child_kind, child, "id")?;
        for link in links_for_child(child_kind) {
            let parent_id = required_str(child_kind, child, link.back_ref)?;
            self.attach(link.parent, parent_id, child_kind, child_id)?;
        }
        Ok(())
    }

    /// Detaches the child from every parent its back-references name, in
    /// link order.
    pub fn detach_all(&self, child_kind: EntityKind, child: &Value) -> Result<(), MirrorError> {
        let child_id = required_str(child_kind, child, "id")?;
        for link in links_for_child(child_kind) {
            if let Some(parent_id) = child.get(link.back_ref).and_then(Value::as_str) {
                self.detach(link.parent, parent_id, child_kind, child_id)?;
            }
        }
        Ok(())
    }

    /// Turns an attach failure on a freshly inserted child into the caller's
    /// error. A parent that vanished after validation can never be attached,
    /// so the child is detached and deleted and the error is
    /// `ReferenceNotFound`. Anything else stays a `PartialFailure`.
    pub(crate) fn undo_insert(
        &self,
        child_kind: EntityKind,
        child: &Value,
        cause: MirrorError,
    ) -> ServiceError {
        let child_id = child.get("id").and_then(Value::as_str).unwrap_or_default();
        let MirrorError::ParentMissing {
            kind: parent_kind,
            id: parent_id,
        } = cause
        else {
            return ServiceError::partial(child_kind, child_id, cause);
        };

        warn!(
            "{} {} disappeared before {} {} was attached, removing it",
            parent_kind, parent_id, child_kind, child_id
        );
        let undone = self
            .detach_all(child_kind, child)
            .and_then(|()| Ok(self.store.delete(child_kind, child_id)?));
        match undone {
            Ok(_) => ServiceError::reference_not_found(parent_kind, &parent_id),
            Err(e) => ServiceError::partial(child_kind, child_id, e),
        }
    }

    /// Recomputes every mirror touching the record from the back-references.
    ///
    /// As a child: attach to the parent each back-reference names, detach
    /// from every other parent holding the id (also when the child is gone).
    /// As a parent: attach every child pointing here, drop entries that do
    /// not point back. Safe to call repeatedly.
    pub fn reconcile(&self, kind: EntityKind, id: &str) -> Result<ReconcileReport, MirrorError> {
        let mut report = ReconcileReport::default();
        let record = self.store.get(kind, id)?;

        for link in links_for_child(kind) {
            self.reconcile_as_child(link, id, record.as_ref(), &mut report)?;
        }
        for link in links_for_parent(kind) {
            self.reconcile_as_parent(link, id, record.as_ref(), &mut report)?;
        }

        if report.changed() {
            info!(
                "Reconciled {} {}: {} attached, {} detached",
                kind, id, report.attached, report.detached
            );
        }
        for dangling in &report.dangling {
            warn!("Dangling reference: {}", dangling);
        }
        Ok(report)
    }

    /// Reconciles every record of every kind.
    pub fn sweep(&self) -> Result<ReconcileReport, MirrorError> {
        let mut report = ReconcileReport::default();
        for kind in EntityKind::ALL {
            let ids: Vec<String> = self
                .store
                .find(kind, &Query::new())?
                .iter()
                .filter_map(|doc| doc.get("id").and_then(Value::as_str).map(String::from))
                .collect();
            for id in ids {
                report.merge(self.reconcile(kind, &id)?);
            }
        }
        info!(
            "Sweep finished: {} attached, {} detached, {} dangling",
            report.attached,
            report.detached,
            report.dangling.len()
        );
        Ok(report)
    }

    fn reconcile_as_child(
        &self,
        link: &MirrorLink,
        child_id: &str,
        child: Option<&Value>,
        report: &mut ReconcileReport,
    ) -> Result<(), MirrorError> {
        let expected = child
            .and_then(|doc| doc.get(link.back_ref))
            .and_then(Value::as_str)
            .filter(|parent_id| !parent_id.is_empty());

        if let Some(parent_id) = expected {
            let dangling = DanglingReference {
                kind: link.child,
                id: child_id.to_string(),
                field: link.back_ref,
                target_kind: link.parent,
                target_id: parent_id.to_string(),
            };
            match self.store.get(link.parent, parent_id)? {
                Some(parent) if mirror_entries(&parent, link.mirror_field).contains(child_id) => {}
                Some(_) => match self.attach(link.parent, parent_id, link.child, child_id) {
                    Ok(()) => report.attached += 1,
                    Err(MirrorError::ParentMissing { .. }) => report.dangling.push(dangling),
                    Err(e) => return Err(e),
                },
                None => report.dangling.push(dangling),
            }
        }

        let holders = self.store.find(
            link.parent,
            &Query::new().contains(link.mirror_field, child_id),
        )?;
        for holder in holders {
            let Some(holder_id) = holder.get("id").and_then(Value::as_str) else {
                continue;
            };
            if Some(holder_id) != expected {
                self.detach(link.parent, holder_id, link.child, child_id)?;
                report.detached += 1;
            }
        }
        Ok(())
    }

    fn reconcile_as_parent(
        &self,
        link: &MirrorLink,
        parent_id: &str,
        parent: Option<&Value>,
        report: &mut ReconcileReport,
    ) -> Result<(), MirrorError> {
        let children: BTreeSet<String> = self
            .store
            .find(link.child, &Query::new().eq(link.back_ref, parent_id))?
            .iter()
            .filter_map(|doc| doc.get("id").and_then(Value::as_str).map(String::from))
            .collect();

        let Some(parent) = parent else {
            report
                .dangling
                .extend(children.into_iter().map(|child_id| DanglingReference {
                    kind: link.child,
                    id: child_id,
                    field: link.back_ref,
                    target_kind: link.parent,
                    target_id: parent_id.to_string(),
                }));
            return Ok(());
        };

        let mirrored = mirror_entries(parent, link.mirror_field);
        for missing in children.difference(&mirrored) {
            self.attach(link.parent, parent_id, link.child, missing)?;
            report.attached += 1;
        }
        for extra in mirrored.difference(&children) {
            self.detach(link.parent, parent_id, link.child, extra)?;
            report.detached += 1;
        }
        Ok(())
    }
}

fn link(parent: EntityKind, child: EntityKind) -> Result<&'static MirrorLink, MirrorError> {
    find_link(parent, child).ok_or(MirrorError::NoSuchLink { parent, child })
}

fn required_str<'a>(
    kind: EntityKind,
    doc: &'a Value,
    field: &'static str,
) -> Result<&'a str, MirrorError> {
    doc.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(MirrorError::MissingField { kind, field })
}

/// The ids currently held in a parent's mirror array.
pub(crate) fn mirror_entries(parent: &Value, field: &str) -> BTreeSet<String> {
    parent
        .get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}
