//! Capability checks for author-owned content.
//!
//! Editing a post is gated on the requesting identity matching the stored
//! author. The check returns a tagged result so call sites route the denied
//! branch explicitly instead of comparing ids inline.

/// Outcome of an edit-capability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditAccess {
    Authorized,
    Denied,
}

impl EditAccess {
    pub fn is_authorized(self) -> bool {
        matches!(self, EditAccess::Authorized)
    }
}

/// Decide whether `viewer_id` may edit content owned by `author_id`.
pub fn edit_access(viewer_id: i64, author_id: i64) -> EditAccess {
    if viewer_id == author_id {
        EditAccess::Authorized
    } else {
        EditAccess::Denied
    }
}
