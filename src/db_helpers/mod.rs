use sqlx::SqlitePool;

use crate::errors::RequestError;

mod password_helpers;
mod post_helpers;
mod tag_helpers;

pub use password_helpers::*;
pub use post_helpers::*;
pub use tag_helpers::*;

/// Separator used by the GROUP_CONCAT tag list; tag names never contain it.
pub(crate) const TAG_LIST_SEPARATOR: char = '\u{1f}';

// ----------------- Helper Functions -----------------

/// Runs the orphan tag cleanup after an edit or delete. Failures are logged and
/// swallowed so they never undo the operation that triggered them.
pub async fn remove_orphan_tags_logged(pool: &SqlitePool) {
    match remove_orphan_tags_in_db(pool).await {
        Ok(0) => (),
        Ok(removed) => log::info!("Removed {} unused tag(s)", removed),
        Err(e) => log::warn!("Tag cleanup failed: {}", e),
    }
}

pub(crate) fn map_unique_slug(error: sqlx::Error) -> RequestError {
    let error = RequestError::from(error);
    if error.is_unique_violation() {
        slug_taken()
    } else {
        error
    }
}

pub(crate) fn slug_taken() -> RequestError {
    RequestError::Validation("Slug already in use".to_owned())
}
