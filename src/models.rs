use chrono::NaiveDateTime;

use crate::db_helpers::TAG_LIST_SEPARATOR;

/// A post row joined with its tag names, as returned by the store queries.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostRow {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub slug: String,
    pub is_page: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub tag_list: Option<String>,
}

/// A blog post or, when `is_page` is set, a standalone page.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub slug: String,
    pub is_page: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    /// Tag names, sorted.
    pub tags: Vec<String>,
}

impl From<PostRow> for Post {
    fn from(
        PostRow {
            id,
            title,
            content,
            slug,
            is_page,
            created_at,
            updated_at,
            tag_list,
        }: PostRow,
    ) -> Self {
        let mut tags: Vec<String> = tag_list
            .unwrap_or_default()
            .split(TAG_LIST_SEPARATOR)
            .filter(|name| !name.is_empty())
            .map(|name| name.to_owned())
            .collect();
        tags.sort();
        Post {
            id,
            title,
            content,
            slug,
            is_page,
            created_at,
            updated_at,
            tags,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TagWithCount {
    pub id: i64,
    pub name: String,
    pub post_count: i64,
}
