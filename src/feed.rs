//! Support for creating the RSS 2.0 feed from a list of posts.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use rss::extension::dublincore::DublinCoreExtension;
use rss::{Category, Channel, Guid, Item};

use crate::{config::AppConfig, markdown, models::Post};

/// Number of posts served by `/feed.xml`.
pub const FEED_SIZE: i64 = 10;

const FEED_LANGUAGE: &str = "zh-CN";
const DUBLIN_CORE_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";
/// Stored creation times carry no zone and are published as UTC+8.
const PUBLISH_OFFSET_SECONDS: i32 = 8 * 3600;

/// Builds the feed XML. `posts` should be newest first; the order is kept as
/// given and pages are left out.
pub fn generate_feed(posts: &[Post], config: &AppConfig) -> Result<String> {
    let items = posts
        .iter()
        .filter(|post| !post.is_page)
        .map(|post| feed_item(post, config))
        .collect::<Result<Vec<Item>>>()?;

    let mut channel = Channel {
        title: config.site_title.clone(),
        link: config.site_url.clone(),
        description: config.site_description.clone(),
        language: Some(FEED_LANGUAGE.to_owned()),
        generator: Some("plog".to_owned()),
        items,
        ..Default::default()
    };
    channel
        .namespaces
        .insert("dc".to_owned(), DUBLIN_CORE_NAMESPACE.to_owned());

    let buffer = channel
        .write_to(Vec::new())
        .context("Failed to write RSS feed")?;
    String::from_utf8(buffer).context("RSS feed is not valid UTF-8")
}

fn feed_item(post: &Post, config: &AppConfig) -> Result<Item> {
    let link = config.post_url(&post.slug);
    Ok(Item {
        title: Some(post.title.clone()),
        link: Some(link.clone()),
        guid: Some(Guid {
            value: link,
            permalink: true,
        }),
        description: Some(markdown::to_html(&post.content)),
        pub_date: Some(published_at(post.created_at)?.to_rfc2822()),
        categories: post
            .tags
            .iter()
            .map(|tag| Category {
                name: tag.clone(),
                domain: None,
            })
            .collect(),
        dublin_core_ext: Some(DublinCoreExtension {
            dates: vec![updated_at(post.updated_at).to_rfc3339()],
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn published_at(created_at: NaiveDateTime) -> Result<DateTime<FixedOffset>> {
    let offset = FixedOffset::east_opt(PUBLISH_OFFSET_SECONDS)
        .ok_or_else(|| anyhow!("Invalid publish offset"))?;
    offset
        .from_local_datetime(&created_at)
        .single()
        .ok_or_else(|| anyhow!("Ambiguous publish time {}", created_at))
}

fn updated_at(updated_at: NaiveDateTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&updated_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|date| date.and_hms_opt(hour, 30, 0))
            .unwrap()
    }

    fn post(id: i64, slug: &str, is_page: bool, tags: &[&str]) -> Post {
        Post {
            id,
            title: format!("Title {id}"),
            content: "**bold**".to_owned(),
            slug: slug.to_owned(),
            is_page,
            created_at: at(10),
            updated_at: at(12),
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
        }
    }

    fn config() -> AppConfig {
        AppConfig {
            site_title: "Test Blog".to_owned(),
            site_description: "Testing".to_owned(),
            site_url: "https://blog.example.org".to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn pages_are_left_out_and_order_is_kept() {
        let posts = vec![
            post(3, "third", false, &["rust", "web"]),
            post(2, "about", true, &[]),
            post(1, "first", false, &[]),
        ];
        let xml = generate_feed(&posts, &config()).unwrap();
        let channel = Channel::read_from(xml.as_bytes()).unwrap();

        assert_eq!(channel.title(), "Test Blog");
        let links: Vec<&str> = channel.items().iter().filter_map(|item| item.link()).collect();
        assert_eq!(
            links,
            vec![
                "https://blog.example.org/post/third",
                "https://blog.example.org/post/first"
            ]
        );
        let categories: Vec<&str> = channel.items()[0]
            .categories()
            .iter()
            .map(|category| category.name())
            .collect();
        assert_eq!(categories, vec!["rust", "web"]);
    }

    #[test]
    fn items_carry_rendered_content_and_timestamps() {
        let xml = generate_feed(&[post(1, "first", false, &[])], &config()).unwrap();
        let channel = Channel::read_from(xml.as_bytes()).unwrap();
        let item = &channel.items()[0];

        assert!(item
            .description()
            .unwrap_or_default()
            .contains("<strong>bold</strong>"));
        let published = DateTime::parse_from_rfc2822(item.pub_date().unwrap()).unwrap();
        assert_eq!(published.offset().local_minus_utc(), PUBLISH_OFFSET_SECONDS);
        assert_eq!(published.naive_local(), at(10));
        assert!(xml.contains("2024-03-01T12:30:00+00:00"));
    }
}
