mod links;
mod maintainer;

pub use links::{find_link, links_for_child, links_for_parent, MirrorLink, MIRROR_LINKS};
pub(crate) use maintainer::mirror_entries;
pub use maintainer::{DanglingReference, MirrorError, MirrorMaintainer, ReconcileReport};
