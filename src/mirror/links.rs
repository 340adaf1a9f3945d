use crate::entity_store::EntityKind;

/// A child's back-reference field paired with the parent array mirroring it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorLink {
    pub child: EntityKind,
    pub back_ref: &'static str,
    pub parent: EntityKind,
    pub mirror_field: &'static str,
}

/// Every mirrored relation. Mirrors are always updated in this order.
pub const MIRROR_LINKS: [MirrorLink; 4] = [
    MirrorLink {
        child: EntityKind::Album,
        back_ref: "artist_id",
        parent: EntityKind::Artist,
        mirror_field: "album_ids",
    },
    MirrorLink {
        child: EntityKind::Track,
        back_ref: "artist_id",
        parent: EntityKind::Artist,
        mirror_field: "track_ids",
    },
    MirrorLink {
        child: EntityKind::Track,
        back_ref: "album_id",
        parent: EntityKind::Album,
        mirror_field: "track_ids",
    },
    MirrorLink {
        child: EntityKind::Favorite,
        back_ref: "user_id",
        parent: EntityKind::User,
        mirror_field: "favorite_ids",
    },
];

pub fn links_for_child(kind: EntityKind) -> impl Iterator<Item = &'static MirrorLink> {
    MIRROR_LINKS.iter().filter(move |link| link.child == kind)
}

pub fn links_for_parent(kind: EntityKind) -> impl Iterator<Item = &'static MirrorLink> {
    MIRROR_LINKS.iter().filter(move |link| link.parent == kind)
}

pub fn find_link(parent: EntityKind, child: EntityKind) -> Option<&'static MirrorLink> {
    MIRROR_LINKS
        .iter()
        .find(|link| link.parent == parent && link.child == child)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_links_artist_before_album() {
        let parents: Vec<_> = links_for_child(EntityKind::Track)
            .map(|l| l.parent)
            .collect();
        assert_eq!(parents, vec![EntityKind::Artist, EntityKind::Album]);
    }

    #[test]
    fn artist_mirrors_albums_and_tracks() {
        let fields: Vec<_> = links_for_parent(EntityKind::Artist)
            .map(|l| l.mirror_field)
            .collect();
        assert_eq!(fields, vec!["album_ids", "track_ids"]);
        assert!(links_for_child(EntityKind::Artist).next().is_none());
    }

    #[test]
    fn unknown_pairs_have_no_link() {
        assert!(find_link(EntityKind::User, EntityKind::Track).is_none());
        assert_eq!(
            find_link(EntityKind::User, EntityKind::Favorite).map(|l| l.mirror_field),
            Some("favorite_ids")
        );
    }
}
