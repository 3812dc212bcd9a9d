use chrono::{Local, NaiveDateTime, Utc};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

use crate::{
    data_formats::{NewPost, PostUpdate},
    errors::RequestError,
    models::{Post, PostRow},
};

use super::{map_unique_slug, remove_orphan_tags_logged, set_post_tags, slug_taken};

const POST_QUERY: &str = r#"
            SELECT posts.id                                      AS "id",
                   posts.title                                   AS "title",
                   posts.content                                 AS "content",
                   posts.slug                                    AS "slug",
                   posts.is_page                                 AS "is_page",
                   posts.created_at                              AS "created_at",
                   posts.updated_at                              AS "updated_at",
                   (SELECT Group_concat(tags.name, Char(31))
                    FROM   tags
                           JOIN post_tags
                             ON post_tags.tag_id = tags.id
                    WHERE  post_tags.post_id = posts.id)         AS "tag_list"
            FROM   posts
"#;

const AUTO_SLUG_FORMAT: &str = "%Y-%m-%d-%H%M%S";

fn into_posts(rows: Vec<PostRow>) -> Vec<Post> {
    rows.into_iter().map(Post::from).collect()
}

// ----------------- Post Queries -----------------

/// Lists posts newest first. `is_page` filters posts from pages when set.
pub async fn list_posts_in_db(
    pool: &SqlitePool,
    is_page: Option<bool>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Post>, RequestError> {
    let mut tx = pool.begin().await?;
    let query = format!(
        r#"{POST_QUERY}
            WHERE  ( posts.is_page = $1
                      OR $1 IS NULL )
            ORDER  BY posts.created_at DESC, posts.id DESC
            LIMIT  $2 OFFSET $3
        "#
    );
    let rows = sqlx::query_as::<Sqlite, PostRow>(&query)
        .bind(is_page)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut tx)
        .await?;
    tx.commit().await?;
    Ok(into_posts(rows))
}

pub async fn count_posts_in_db(pool: &SqlitePool, is_page: Option<bool>) -> Result<i64, RequestError> {
    let mut tx = pool.begin().await?;
    let count = sqlx::query_scalar::<Sqlite, i64>(
        "SELECT Count(*) FROM posts WHERE ( is_page = $1 OR $1 IS NULL )",
    )
    .bind(is_page)
    .fetch_one(&mut tx)
    .await?;
    tx.commit().await?;
    Ok(count)
}

/// Every post and page, most recently updated first.
pub async fn list_posts_by_updated_in_db(pool: &SqlitePool) -> Result<Vec<Post>, RequestError> {
    let mut tx = pool.begin().await?;
    let query = format!("{POST_QUERY} ORDER BY posts.updated_at DESC, posts.id DESC");
    let rows = sqlx::query_as::<Sqlite, PostRow>(&query)
        .fetch_all(&mut tx)
        .await?;
    tx.commit().await?;
    Ok(into_posts(rows))
}

/// Every post and page in insertion order.
pub async fn list_all_posts_in_db(pool: &SqlitePool) -> Result<Vec<Post>, RequestError> {
    let mut tx = pool.begin().await?;
    let query = format!("{POST_QUERY} ORDER BY posts.id");
    let rows = sqlx::query_as::<Sqlite, PostRow>(&query)
        .fetch_all(&mut tx)
        .await?;
    tx.commit().await?;
    Ok(into_posts(rows))
}

pub async fn list_posts_by_tag_in_db(pool: &SqlitePool, tag_id: i64) -> Result<Vec<Post>, RequestError> {
    let mut tx = pool.begin().await?;
    let query = format!(
        r#"{POST_QUERY}
            WHERE  posts.id IN (SELECT post_id
                                FROM   post_tags
                                WHERE  tag_id = $1)
            ORDER  BY posts.created_at DESC, posts.id DESC
        "#
    );
    let rows = sqlx::query_as::<Sqlite, PostRow>(&query)
        .bind(tag_id)
        .fetch_all(&mut tx)
        .await?;
    tx.commit().await?;
    Ok(into_posts(rows))
}

pub async fn get_post_by_slug_in_db(
    pool: &SqlitePool,
    slug: &str,
    is_page: Option<bool>,
) -> Result<Option<Post>, RequestError> {
    let mut tx = pool.begin().await?;
    let query = format!(
        r#"{POST_QUERY}
            WHERE  posts.slug = $1
                   AND ( posts.is_page = $2
                          OR $2 IS NULL )
        "#
    );
    let row = sqlx::query_as::<Sqlite, PostRow>(&query)
        .bind(slug)
        .bind(is_page)
        .fetch_optional(&mut tx)
        .await?;
    tx.commit().await?;
    Ok(row.map(Post::from))
}

pub async fn get_post_by_id_in_db(pool: &SqlitePool, id: i64) -> Result<Option<Post>, RequestError> {
    let mut tx = pool.begin().await?;
    let query = format!("{POST_QUERY} WHERE posts.id = $1");
    let row = sqlx::query_as::<Sqlite, PostRow>(&query)
        .bind(id)
        .fetch_optional(&mut tx)
        .await?;
    tx.commit().await?;
    Ok(row.map(Post::from))
}

// ----------------- Post Mutations -----------------

pub async fn create_post_in_db(pool: &SqlitePool, post: NewPost) -> Result<Post, RequestError> {
    if post.title.is_empty() {
        return Err(RequestError::Validation("Title is required".to_owned()));
    }
    let mut tx = pool.begin().await?;
    let now = Utc::now().naive_utc();

    let slug = if post.slug.is_empty() {
        generate_slug(&mut tx, Local::now().naive_local()).await?
    } else {
        validate_slug(&post.slug)?;
        if slug_exists(&mut tx, &post.slug).await? {
            return Err(slug_taken());
        }
        post.slug
    };

    let id = insert_post(
        &mut tx,
        &post.title,
        &post.content,
        &slug,
        post.is_page,
        now,
        now,
    )
    .await
    .map_err(map_unique_slug)?;
    set_post_tags(&mut tx, id, &post.tags).await?;
    tx.commit().await?;

    match get_post_by_id_in_db(pool, id).await? {
        Some(post) => Ok(post),
        None => Err(RequestError::NotFound),
    }
}

/// Rewrites title, content, page flag and the full tag set of a post. The slug
/// never changes.
pub async fn update_post_in_db(
    pool: &SqlitePool,
    id: i64,
    PostUpdate {
        title,
        content,
        is_page,
        tags,
    }: PostUpdate,
) -> Result<Post, RequestError> {
    if title.is_empty() {
        return Err(RequestError::Validation("Title is required".to_owned()));
    }
    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        r#"
        UPDATE posts
        SET    title = $1, content = $2, is_page = $3, updated_at = $4
        WHERE  id = $5
        "#,
    )
    .bind(title)
    .bind(content)
    .bind(is_page)
    .bind(Utc::now().naive_utc())
    .bind(id)
    .execute(&mut tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RequestError::NotFound);
    }
    set_post_tags(&mut tx, id, &tags).await?;
    tx.commit().await?;

    remove_orphan_tags_logged(pool).await;

    match get_post_by_id_in_db(pool, id).await? {
        Some(post) => Ok(post),
        None => Err(RequestError::NotFound),
    }
}

pub async fn delete_post_in_db(pool: &SqlitePool, id: i64) -> Result<(), RequestError> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM post_tags WHERE post_id = $1")
        .bind(id)
        .execute(&mut tx)
        .await?;
    let result = sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(id)
        .execute(&mut tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(RequestError::NotFound);
    }
    tx.commit().await?;

    remove_orphan_tags_logged(pool).await;
    Ok(())
}

// ----------------- Connection Level Helpers -----------------

pub(crate) async fn slug_exists(conn: &mut SqliteConnection, slug: &str) -> Result<bool, sqlx::Error> {
    let found = sqlx::query_scalar::<Sqlite, i64>("SELECT id FROM posts WHERE slug = $1")
        .bind(slug)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

pub(crate) async fn insert_post(
    conn: &mut SqliteConnection,
    title: &str,
    content: &str,
    slug: &str,
    is_page: bool,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<Sqlite, i64>(
        r#"
        INSERT INTO posts (title, content, slug, is_page, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(title)
    .bind(content)
    .bind(slug)
    .bind(is_page)
    .bind(created_at)
    .bind(updated_at)
    .fetch_one(&mut *conn)
    .await
}

/// Builds a slug from the local time `now`, adding `-2`, `-3`, ... while it is taken.
pub(crate) async fn generate_slug(conn: &mut SqliteConnection, now: NaiveDateTime) -> Result<String, sqlx::Error> {
    let base = now.format(AUTO_SLUG_FORMAT).to_string();
    let mut candidate = base.clone();
    let mut suffix = 2;
    while slug_exists(conn, &candidate).await? {
        candidate = format!("{base}-{suffix}");
        suffix += 1;
    }
    Ok(candidate)
}

/// Slugs end up in `/post/<slug>` and `/page/<slug>`, so they must be a single
/// path segment. All-digit slugs are refused because `/page/<n>` is pagination.
pub fn validate_slug(slug: &str) -> Result<(), RequestError> {
    let allowed = slug
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'));
    if slug.is_empty() || !allowed || slug == "." || slug == ".." {
        return Err(RequestError::Validation(
            "Slug may only contain letters, digits, '-', '_', '.' and '~'".to_owned(),
        ));
    }
    if slug.chars().all(|c| c.is_ascii_digit()) {
        return Err(RequestError::Validation(
            "Slug cannot be a plain number".to_owned(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_formats::parse_tag_list;
    use crate::db_helpers::{get_tag_by_name_in_db, list_tags_in_db};
    use crate::test_helpers::test_pool;

    fn new_post(title: &str, slug: &str, tags: &str) -> NewPost {
        NewPost {
            title: title.to_owned(),
            content: format!("# {title}"),
            slug: slug.to_owned(),
            is_page: false,
            tags: parse_tag_list(tags),
        }
    }

    #[test]
    fn slug_validation() {
        assert!(validate_slug("hello-world").is_ok());
        assert!(validate_slug("2024-01-01-120000").is_ok());
        assert!(validate_slug("关于").is_ok());
        assert!(validate_slug("a/b").is_err());
        assert!(validate_slug("with space").is_err());
        assert!(validate_slug("..").is_err());
        assert!(validate_slug("42").is_err());
    }

    #[tokio::test]
    async fn create_with_empty_slug_generates_one_and_tags() {
        let (_dir, pool) = test_pool().await;
        let post = create_post_in_db(&pool, new_post("Hello", "", "a, b"))
            .await
            .unwrap();

        assert!(NaiveDateTime::parse_from_str(&post.slug, AUTO_SLUG_FORMAT).is_ok());
        assert_eq!(post.tags, vec!["a", "b"]);
        assert!(get_tag_by_name_in_db(&pool, "a").await.unwrap().is_some());
        assert!(get_tag_by_name_in_db(&pool, "b").await.unwrap().is_some());

        let newest = list_posts_in_db(&pool, Some(false), 10, 0).await.unwrap();
        assert_eq!(newest[0].id, post.id);
    }

    #[tokio::test]
    async fn generated_slugs_follow_the_local_clock() {
        let (_dir, pool) = test_pool().await;
        let before = Local::now().naive_local() - chrono::Duration::seconds(1);
        let post = create_post_in_db(&pool, new_post("Clock", "", "")).await.unwrap();
        let after = Local::now().naive_local() + chrono::Duration::seconds(1);

        let stamped = NaiveDateTime::parse_from_str(&post.slug, AUTO_SLUG_FORMAT).unwrap();
        assert!(before <= stamped && stamped <= after, "{} outside {before}..{after}", post.slug);
    }

    #[tokio::test]
    async fn generated_slugs_do_not_collide() {
        let (_dir, pool) = test_pool().await;
        let first = create_post_in_db(&pool, new_post("One", "", "")).await.unwrap();
        let second = create_post_in_db(&pool, new_post("Two", "", "")).await.unwrap();
        assert_ne!(first.slug, second.slug);
    }

    #[tokio::test]
    async fn duplicate_manual_slug_is_rejected() {
        let (_dir, pool) = test_pool().await;
        create_post_in_db(&pool, new_post("One", "same", "")).await.unwrap();
        let error = create_post_in_db(&pool, new_post("Two", "same", ""))
            .await
            .unwrap_err();
        assert!(matches!(error, RequestError::Validation(_)));
        assert_eq!(count_posts_in_db(&pool, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_replaces_tags_and_cleans_up_orphans() {
        let (_dir, pool) = test_pool().await;
        let post = create_post_in_db(&pool, new_post("Hello", "hello", "a, b"))
            .await
            .unwrap();
        create_post_in_db(&pool, new_post("Other", "other", "b")).await.unwrap();

        let updated = update_post_in_db(
            &pool,
            post.id,
            PostUpdate {
                title: "Hello again".to_owned(),
                content: "changed".to_owned(),
                is_page: false,
                tags: parse_tag_list("c"),
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.slug, "hello");
        assert_eq!(updated.tags, vec!["c"]);
        assert!(updated.updated_at >= post.updated_at);
        let names: Vec<String> = list_tags_in_db(&pool)
            .await
            .unwrap()
            .into_iter()
            .map(|tag| tag.name)
            .collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn removing_all_tags_deletes_them() {
        let (_dir, pool) = test_pool().await;
        let post = create_post_in_db(&pool, new_post("Hello", "", "a, b"))
            .await
            .unwrap();
        update_post_in_db(
            &pool,
            post.id,
            PostUpdate {
                title: post.title.clone(),
                content: post.content.clone(),
                is_page: false,
                tags: Vec::new(),
            },
        )
        .await
        .unwrap();
        assert!(list_tags_in_db(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_post_and_last_tag_reference() {
        let (_dir, pool) = test_pool().await;
        let post = create_post_in_db(&pool, new_post("Hello", "hello", "solo"))
            .await
            .unwrap();
        delete_post_in_db(&pool, post.id).await.unwrap();

        assert!(get_post_by_slug_in_db(&pool, "hello", None).await.unwrap().is_none());
        assert!(get_tag_by_name_in_db(&pool, "solo").await.unwrap().is_none());
        assert!(matches!(
            delete_post_in_db(&pool, post.id).await,
            Err(RequestError::NotFound)
        ));
    }

    #[tokio::test]
    async fn update_of_unknown_post_is_not_found() {
        let (_dir, pool) = test_pool().await;
        let result = update_post_in_db(
            &pool,
            999,
            PostUpdate {
                title: "Ghost".to_owned(),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(RequestError::NotFound)));
    }

    #[tokio::test]
    async fn pages_and_posts_are_filtered() {
        let (_dir, pool) = test_pool().await;
        create_post_in_db(&pool, new_post("Post", "post", "")).await.unwrap();
        create_post_in_db(
            &pool,
            NewPost {
                is_page: true,
                ..new_post("About", "about", "")
            },
        )
        .await
        .unwrap();

        assert_eq!(count_posts_in_db(&pool, Some(false)).await.unwrap(), 1);
        assert_eq!(count_posts_in_db(&pool, Some(true)).await.unwrap(), 1);
        assert!(get_post_by_slug_in_db(&pool, "post", Some(true)).await.unwrap().is_none());
        assert!(get_post_by_slug_in_db(&pool, "about", Some(true)).await.unwrap().is_some());
        assert_eq!(list_posts_by_updated_in_db(&pool).await.unwrap().len(), 2);
    }
}
