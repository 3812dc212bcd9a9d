//! JSON snapshots of the whole store.
//!
//! Exports carry every tag and every post. Imports merge a snapshot into the
//! current store inside a single transaction: existing tags are reused, posts
//! whose slug already exists are skipped, and any failure leaves the store as
//! it was before the import started.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::{
    data_formats::{Snapshot, SnapshotPost, SnapshotTag, SNAPSHOT_VERSION},
    db_helpers::{
        find_tag_id, generate_slug, insert_post, link_post_tag, list_all_posts_in_db,
        list_all_tags_in_db, slug_exists, upsert_tag, validate_slug,
    },
    errors::RequestError,
};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
const FILE_NAME_FORMAT: &str = "plog_backup_%Y%m%d_%H%M%S.json";

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a valid JSON file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot format error: {0}")]
    Format(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Store(#[from] RequestError),
}

/// What an import changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub created_tags: usize,
    pub skipped_tags: usize,
    pub created_posts: usize,
    pub skipped_posts: usize,
    /// Imported posts whose slug would be refused by the write form, such as
    /// an all-digit page slug that `/page/<n>` treats as a page number.
    pub irregular_slugs: usize,
}

impl ImportReport {
    /// Number of newly created records, tags and posts together.
    pub fn created(&self) -> usize {
        self.created_tags + self.created_posts
    }
}

pub fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Accepts RFC 3339 (converted to UTC) or a zone-less ISO 8601 timestamp.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
        return Some(timestamp.with_timezone(&Utc).naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

fn local_time(utc: NaiveDateTime) -> NaiveDateTime {
    Utc.from_utc_datetime(&utc).with_timezone(&Local).naive_local()
}

pub fn default_backup_file_name() -> String {
    Local::now().format(FILE_NAME_FORMAT).to_string()
}

// ----------------- Export -----------------

pub async fn export_snapshot(pool: &SqlitePool) -> Result<Snapshot, BackupError> {
    let tags = list_all_tags_in_db(pool)
        .await?
        .into_iter()
        .map(|tag| SnapshotTag {
            id: tag.id,
            name: tag.name,
        })
        .collect();
    let posts = list_all_posts_in_db(pool)
        .await?
        .into_iter()
        .map(|post| SnapshotPost {
            id: post.id,
            title: post.title,
            content: post.content,
            created_at: Some(format_timestamp(post.created_at)),
            updated_at: Some(format_timestamp(post.updated_at)),
            is_page: post.is_page,
            slug: post.slug,
            tags: post.tags,
        })
        .collect();

    Ok(Snapshot {
        version: SNAPSHOT_VERSION.to_owned(),
        exported_at: format_timestamp(Local::now().naive_local()),
        posts,
        tags,
    })
}

/// Writes `snapshot` as pretty JSON into `dir`, creating it when needed.
pub fn write_snapshot(snapshot: &Snapshot, dir: &Path, file_name: &str) -> Result<PathBuf, BackupError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut writer, snapshot)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(path)
}

// ----------------- Import -----------------

/// Parses a snapshot, insisting on both the `posts` and the `tags` sections.
pub fn parse_snapshot(data: &[u8]) -> Result<Snapshot, BackupError> {
    let value: serde_json::Value = serde_json::from_slice(data)?;
    let has_sections = value
        .as_object()
        .map(|object| object.contains_key("posts") && object.contains_key("tags"))
        .unwrap_or(false);
    if !has_sections {
        return Err(BackupError::Format(
            "missing the posts or tags section".to_owned(),
        ));
    }
    serde_json::from_value(value).map_err(|e| BackupError::Format(e.to_string()))
}

pub fn read_snapshot_file(path: &Path) -> Result<Snapshot, BackupError> {
    let data = std::fs::read(path)?;
    parse_snapshot(&data)
}

/// A relative `input` is looked up in `backup_dir` first, then in the working
/// directory.
pub fn resolve_backup_path(backup_dir: &Path, input: &Path) -> PathBuf {
    if input.is_absolute() {
        return input.to_path_buf();
    }
    let in_backups = backup_dir.join(input);
    if in_backups.exists() {
        in_backups
    } else {
        input.to_path_buf()
    }
}

pub async fn import_snapshot(pool: &SqlitePool, snapshot: &Snapshot) -> Result<ImportReport, BackupError> {
    let mut report = ImportReport::default();
    let mut tx = pool.begin().await?;

    for tag in &snapshot.tags {
        if find_tag_id(&mut tx, &tag.name).await?.is_some() {
            log::info!("Skipping existing tag {:?}", tag.name);
            report.skipped_tags += 1;
        } else {
            upsert_tag(&mut tx, &tag.name).await?;
            log::info!("Created tag {:?}", tag.name);
            report.created_tags += 1;
        }
    }

    for post in &snapshot.posts {
        if !post.slug.is_empty() && slug_exists(&mut tx, &post.slug).await? {
            log::info!("Skipping existing post {:?}", post.title);
            report.skipped_posts += 1;
            continue;
        }

        let now = Utc::now().naive_utc();
        let created_at = post
            .created_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(now);
        let updated_at = post
            .updated_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(now);
        let slug = if post.slug.is_empty() {
            generate_slug(&mut tx, local_time(created_at)).await?
        } else {
            if let Err(e) = validate_slug(&post.slug) {
                log::warn!("Imported post {:?} has an irregular slug {:?}: {}", post.title, post.slug, e);
                report.irregular_slugs += 1;
            }
            post.slug.clone()
        };

        let post_id = insert_post(
            &mut tx,
            &post.title,
            &post.content,
            &slug,
            post.is_page,
            created_at,
            updated_at,
        )
        .await?;
        for name in &post.tags {
            if let Some(tag_id) = find_tag_id(&mut tx, name).await? {
                link_post_tag(&mut tx, post_id, tag_id).await?;
            }
        }
        log::info!("Imported post {:?}", post.title);
        report.created_posts += 1;
    }

    tx.commit().await?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_formats::{parse_tag_list, NewPost};
    use crate::db_helpers::{
        create_post_in_db, get_post_by_slug_in_db, get_tag_by_name_in_db, list_tags_in_db,
    };
    use crate::test_helpers::test_pool;

    async fn seed(pool: &SqlitePool) {
        for (title, slug, tags, is_page) in [
            ("Hello", "hello", "rust, 生活", false),
            ("Second", "second", "rust", false),
            ("About", "about", "", true),
        ] {
            create_post_in_db(
                pool,
                NewPost {
                    title: title.to_owned(),
                    content: format!("# {title}\n\nbody"),
                    slug: slug.to_owned(),
                    is_page,
                    tags: parse_tag_list(tags),
                },
            )
            .await
            .unwrap();
        }
    }

    fn summary(snapshot: &Snapshot) -> Vec<(String, String, String, bool, Vec<String>)> {
        let mut posts: Vec<_> = snapshot
            .posts
            .iter()
            .map(|post| {
                (
                    post.slug.clone(),
                    post.title.clone(),
                    post.content.clone(),
                    post.is_page,
                    post.tags.clone(),
                )
            })
            .collect();
        posts.sort();
        posts
    }

    #[test]
    fn timestamps_parse_in_both_shapes() {
        let naive = parse_timestamp("2024-01-02T03:04:05.123456").unwrap();
        assert_eq!(format_timestamp(naive), "2024-01-02T03:04:05.123456");
        let zoned = parse_timestamp("2024-01-02T11:04:05+08:00").unwrap();
        assert_eq!(format_timestamp(zoned), "2024-01-02T03:04:05.000000");
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn snapshots_need_posts_and_tags() {
        assert!(matches!(
            parse_snapshot(br#"{"posts": []}"#),
            Err(BackupError::Format(_))
        ));
        assert!(matches!(parse_snapshot(b"[1, 2]"), Err(BackupError::Format(_))));
        assert!(matches!(parse_snapshot(b"{nope"), Err(BackupError::Json(_))));
        let snapshot = parse_snapshot(br#"{"posts": [], "tags": []}"#).unwrap();
        assert!(snapshot.posts.is_empty());
    }

    #[tokio::test]
    async fn export_then_import_reproduces_content() {
        let (_source_dir, source) = test_pool().await;
        seed(&source).await;
        let exported = export_snapshot(&source).await.unwrap();
        assert_eq!(exported.version, SNAPSHOT_VERSION);
        assert_eq!(exported.tags.len(), 2);

        let backups = tempfile::tempdir().unwrap();
        let path = write_snapshot(&exported, backups.path(), "snapshot.json").unwrap();
        let read_back = read_snapshot_file(&path).unwrap();
        assert_eq!(read_back, exported);

        let (_target_dir, target) = test_pool().await;
        let report = import_snapshot(&target, &read_back).await.unwrap();
        assert_eq!(report.created_tags, 2);
        assert_eq!(report.created_posts, 3);
        assert_eq!(report.created(), 5);

        let reimported = export_snapshot(&target).await.unwrap();
        assert_eq!(summary(&reimported), summary(&exported));
        let hello = get_post_by_slug_in_db(&target, "hello", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(format_timestamp(hello.created_at), exported.posts[0].created_at.clone().unwrap());
    }

    #[tokio::test]
    async fn existing_slugs_are_left_untouched() {
        let (_dir, pool) = test_pool().await;
        seed(&pool).await;
        let snapshot = parse_snapshot(
            br#"{
                "tags": [{"id": 7, "name": "rust"}, {"id": 8, "name": "new"}],
                "posts": [
                    {"title": "Imposter", "content": "x", "slug": "hello", "is_page": false, "tags": ["new"]},
                    {"title": "Fresh", "content": "y", "slug": "fresh", "is_page": false,
                     "created_at": "garbage", "tags": ["new", "missing"]}
                ]
            }"#,
        )
        .unwrap();

        let report = import_snapshot(&pool, &snapshot).await.unwrap();
        assert_eq!(
            report,
            ImportReport {
                created_tags: 1,
                skipped_tags: 1,
                created_posts: 1,
                skipped_posts: 1,
                irregular_slugs: 0,
            }
        );

        let hello = get_post_by_slug_in_db(&pool, "hello", None).await.unwrap().unwrap();
        assert_eq!(hello.title, "Hello");
        let fresh = get_post_by_slug_in_db(&pool, "fresh", None).await.unwrap().unwrap();
        assert_eq!(fresh.tags, vec!["new"]);
        assert!(get_tag_by_name_in_db(&pool, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn irregular_slugs_are_imported_and_counted() {
        let (_dir, pool) = test_pool().await;
        let snapshot = parse_snapshot(
            br#"{
                "tags": [],
                "posts": [
                    {"title": "Numbered", "content": "", "slug": "42", "is_page": true},
                    {"title": "Nested", "content": "", "slug": "a/b", "is_page": false},
                    {"title": "Plain", "content": "", "slug": "plain", "is_page": false}
                ]
            }"#,
        )
        .unwrap();

        let report = import_snapshot(&pool, &snapshot).await.unwrap();
        assert_eq!(report.created_posts, 3);
        assert_eq!(report.irregular_slugs, 2);
        assert!(get_post_by_slug_in_db(&pool, "a/b", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_import_rolls_everything_back() {
        let (_dir, pool) = test_pool().await;
        let snapshot = parse_snapshot(
            br#"{
                "tags": [{"id": 1, "name": "kept-only-on-success"}, {"id": 2, "name": ""}],
                "posts": [{"title": "T", "content": "c", "slug": "t", "is_page": false}]
            }"#,
        )
        .unwrap();

        assert!(import_snapshot(&pool, &snapshot).await.is_err());
        assert!(list_tags_in_db(&pool).await.unwrap().is_empty());
        assert!(get_post_by_slug_in_db(&pool, "t", None).await.unwrap().is_none());
    }

    #[test]
    fn relative_paths_prefer_the_backup_dir() {
        let backups = tempfile::tempdir().unwrap();
        std::fs::write(backups.path().join("snap.json"), "{}").unwrap();
        assert_eq!(
            resolve_backup_path(backups.path(), Path::new("snap.json")),
            backups.path().join("snap.json")
        );
        assert_eq!(
            resolve_backup_path(backups.path(), Path::new("elsewhere.json")),
            PathBuf::from("elsewhere.json")
        );
    }
}
