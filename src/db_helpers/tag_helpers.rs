use sqlx::{Sqlite, SqliteConnection, SqlitePool};

use crate::{
    errors::RequestError,
    models::{Tag, TagWithCount},
};

pub async fn list_tags_in_db(pool: &SqlitePool) -> Result<Vec<TagWithCount>, RequestError> {
    let mut tx = pool.begin().await?;
    let result = sqlx::query_as::<Sqlite, TagWithCount>(
        r#"
        SELECT tags.id                     AS "id",
               tags.name                   AS "name",
               Count(post_tags.post_id)    AS "post_count"
        FROM   tags
               LEFT JOIN post_tags
                      ON post_tags.tag_id = tags.id
        GROUP  BY tags.id
        ORDER  BY tags.name
        "#,
    )
    .fetch_all(&mut tx)
    .await?;

    tx.commit().await?;
    Ok(result)
}

pub async fn list_all_tags_in_db(pool: &SqlitePool) -> Result<Vec<Tag>, RequestError> {
    let mut tx = pool.begin().await?;
    let result = sqlx::query_as::<Sqlite, Tag>("SELECT id, name FROM tags ORDER BY id")
        .fetch_all(&mut tx)
        .await?;
    tx.commit().await?;
    Ok(result)
}

pub async fn get_tag_by_name_in_db(
    pool: &SqlitePool,
    name: &str,
) -> Result<Option<Tag>, RequestError> {
    let mut tx = pool.begin().await?;
    let result = sqlx::query_as::<Sqlite, Tag>("SELECT id, name FROM tags WHERE name = $1")
        .bind(name)
        .fetch_optional(&mut tx)
        .await?;
    tx.commit().await?;
    Ok(result)
}

/// Returns the id of the tag called `name`, creating it when missing.
pub(crate) async fn upsert_tag(conn: &mut SqliteConnection, name: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<Sqlite, i64>(
        r#"
        INSERT INTO tags (name)
        VALUES ($1)
        ON CONFLICT (name) DO UPDATE SET name = excluded.name
        RETURNING id
        "#,
    )
    .bind(name)
    .fetch_one(&mut *conn)
    .await
}

pub(crate) async fn find_tag_id(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar::<Sqlite, i64>("SELECT id FROM tags WHERE name = $1")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
}

pub(crate) async fn link_post_tag(
    conn: &mut SqliteConnection,
    post_id: i64,
    tag_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES ($1, $2)")
        .bind(post_id)
        .bind(tag_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Replaces the tag set of a post with `names`, creating tags as needed.
pub(crate) async fn set_post_tags(
    conn: &mut SqliteConnection,
    post_id: i64,
    names: &[String],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM post_tags WHERE post_id = $1")
        .bind(post_id)
        .execute(&mut *conn)
        .await?;
    for name in names {
        let tag_id = upsert_tag(conn, name).await?;
        link_post_tag(conn, post_id, tag_id).await?;
    }
    Ok(())
}

/// Deletes every tag no post refers to and returns how many went away.
pub async fn remove_orphan_tags_in_db(pool: &SqlitePool) -> Result<u64, RequestError> {
    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        r#"
        DELETE FROM tags
        WHERE  NOT EXISTS (SELECT 1
                           FROM   post_tags
                           WHERE  post_tags.tag_id = tags.id)
        "#,
    )
    .execute(&mut tx)
    .await?;
    tx.commit().await?;
    Ok(result.rows_affected())
}
