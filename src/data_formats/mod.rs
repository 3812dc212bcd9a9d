mod request;
mod snapshot;

pub use request::*;
pub use snapshot::*;

use serde::{Deserialize, Serialize};

pub const POSTS_PER_PAGE: i64 = 10;

/// Pagination state of the index page.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl Pagination {
    /// Builds the pagination for a 1-based `page`; anything below 1 is treated as 1.
    /// Pages are capped so the offset always fits in an `i64`.
    pub fn new(page: i64, total: i64) -> Self {
        Pagination {
            page: page.clamp(1, i64::MAX / POSTS_PER_PAGE),
            per_page: POSTS_PER_PAGE,
            total,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    pub fn pages(&self) -> i64 {
        (self.total + self.per_page - 1) / self.per_page
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.pages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_bounds() {
        let first = Pagination::new(0, 25);
        assert_eq!(first.page, 1);
        assert_eq!(first.offset(), 0);
        assert_eq!(first.pages(), 3);
        assert!(!first.has_prev());
        assert!(first.has_next());

        let last = Pagination::new(3, 25);
        assert_eq!(last.offset(), 20);
        assert!(last.has_prev());
        assert!(!last.has_next());

        let empty = Pagination::new(1, 0);
        assert_eq!(empty.pages(), 0);
        assert!(!empty.has_next());
    }

    #[test]
    fn huge_page_numbers_do_not_overflow() {
        let far = Pagination::new(999_999_999_999_999_999, 5);
        assert!(far.offset() >= 0);
        assert!(!far.has_next());
        assert!(far.has_prev());

        let max = Pagination::new(i64::MAX, 5);
        assert!(max.offset() > 0);
    }
}
