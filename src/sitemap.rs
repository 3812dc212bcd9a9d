//! sitemaps.org 0.9 sitemap for the whole site.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::{config::AppConfig, models::Post};

const SITEMAP_NAMESPACE: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";
const LASTMOD_FORMAT: &str = "%Y-%m-%d";

struct UrlEntry<'a> {
    loc: &'a str,
    lastmod: String,
    changefreq: &'static str,
    priority: &'static str,
}

/// Builds the sitemap: the site root first, then one `<url>` per post or page
/// in the order given (most recently updated first for `/sitemap.xml`).
pub fn generate_sitemap(posts: &[Post], config: &AppConfig, today: NaiveDate) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut urlset = BytesStart::new("urlset");
    urlset.push_attribute(("xmlns", SITEMAP_NAMESPACE));
    writer.write_event(Event::Start(urlset))?;

    write_url(
        &mut writer,
        &UrlEntry {
            loc: &config.site_url,
            lastmod: today.format(LASTMOD_FORMAT).to_string(),
            changefreq: "daily",
            priority: "1.0",
        },
    )?;

    for post in posts {
        let loc = if post.is_page {
            config.page_url(&post.slug)
        } else {
            config.post_url(&post.slug)
        };
        write_url(
            &mut writer,
            &UrlEntry {
                loc: &loc,
                lastmod: post.updated_at.format(LASTMOD_FORMAT).to_string(),
                changefreq: "weekly",
                priority: "0.8",
            },
        )?;
    }

    writer.write_event(Event::End(BytesEnd::new("urlset")))?;
    String::from_utf8(writer.into_inner()).context("Sitemap is not valid UTF-8")
}

fn write_url(writer: &mut Writer<Vec<u8>>, entry: &UrlEntry) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new("url")))?;
    write_text_element(writer, "loc", entry.loc)?;
    write_text_element(writer, "lastmod", &entry.lastmod)?;
    write_text_element(writer, "changefreq", entry.changefreq)?;
    write_text_element(writer, "priority", entry.priority)?;
    writer.write_event(Event::End(BytesEnd::new("url")))?;
    Ok(())
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(slug: &str, is_page: bool, day: u32) -> Post {
        let updated_at = NaiveDate::from_ymd_opt(2024, 6, day)
            .and_then(|date| date.and_hms_opt(23, 59, 0))
            .unwrap();
        Post {
            id: day as i64,
            title: slug.to_owned(),
            content: String::new(),
            slug: slug.to_owned(),
            is_page,
            created_at: updated_at,
            updated_at,
            tags: Vec::new(),
        }
    }

    fn config() -> AppConfig {
        AppConfig {
            site_url: "https://blog.example.org".to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn one_entry_per_post_plus_root() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let posts = vec![post("hello", false, 3), post("about", true, 2)];
        let xml = generate_sitemap(&posts, &config(), today).unwrap();

        assert_eq!(xml.matches("<url>").count(), 3);
        assert!(xml.contains(r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#));
        assert!(xml.contains("<loc>https://blog.example.org</loc>"));
        assert!(xml.contains("<lastmod>2024-06-30</lastmod>"));
        assert!(xml.contains("<loc>https://blog.example.org/post/hello</loc>"));
        assert!(xml.contains("<loc>https://blog.example.org/page/about</loc>"));
        assert!(xml.contains("<lastmod>2024-06-03</lastmod>"));
        assert_eq!(xml.matches("<priority>0.8</priority>").count(), 2);
        assert_eq!(xml.matches("<changefreq>daily</changefreq>").count(), 1);
    }

    #[test]
    fn slugs_are_percent_encoded() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let xml = generate_sitemap(&[post("a&b", false, 1)], &config(), today).unwrap();
        assert!(xml.contains("/post/a%26b</loc>"));
    }
}
