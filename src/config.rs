use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Context, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left as-is in a path segment: the RFC 3986 unreserved set.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub const DEFAULT_SECRET_KEY: &str = "dev-key-please-change-in-production";

/// Site-wide settings read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub secret_key: String,
    pub site_title: String,
    pub site_description: String,
    /// Absolute base URL without a trailing slash, e.g. `https://blog.example.org`.
    pub site_url: String,
    pub backup_dir: PathBuf,
    pub bind_address: SocketAddr,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_url: "sqlite://blog.db".to_owned(),
            secret_key: DEFAULT_SECRET_KEY.to_owned(),
            site_title: "Plog".to_owned(),
            site_description: "A simple blog powered by axum".to_owned(),
            site_url: "http://localhost:5000".to_owned(),
            backup_dir: PathBuf::from("backups"),
            bind_address: SocketAddr::from(([127, 0, 0, 1], 5000)),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = AppConfig::default();
        let bind_address = match std::env::var("BIND_ADDRESS") {
            Ok(address) => address
                .parse()
                .with_context(|| format!("BIND_ADDRESS {address:?} is not a socket address"))?,
            Err(_) => defaults.bind_address,
        };
        let config = AppConfig {
            database_url: env_or("DATABASE_URL", defaults.database_url),
            secret_key: env_or("SECRET_KEY", defaults.secret_key),
            site_title: env_or("SITE_TITLE", defaults.site_title),
            site_description: env_or("SITE_DESCRIPTION", defaults.site_description),
            site_url: env_or("SITE_URL", defaults.site_url)
                .trim_end_matches('/')
                .to_owned(),
            backup_dir: std::env::var("BACKUP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.backup_dir),
            bind_address,
        };
        if config.secret_key == DEFAULT_SECRET_KEY {
            log::warn!("SECRET_KEY is not set, sessions are signed with the development key");
        }
        Ok(config)
    }

    pub fn post_url(&self, slug: &str) -> String {
        format!("{}{}", self.site_url, post_path(slug))
    }

    pub fn page_url(&self, slug: &str) -> String {
        format!("{}{}", self.site_url, page_path(slug))
    }
}

/// Percent-encodes `text` so it stays a single path segment.
pub fn path_segment(text: &str) -> String {
    utf8_percent_encode(text, PATH_SEGMENT).to_string()
}

pub fn post_path(slug: &str) -> String {
    format!("/post/{}", path_segment(slug))
}

pub fn page_path(slug: &str) -> String {
    format!("/page/{}", path_segment(slug))
}

pub fn tag_path(name: &str) -> String {
    format!("/tag/{}", path_segment(name))
}

fn env_or(key: &str, default: String) -> String {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_built_from_the_site_url() {
        let config = AppConfig {
            site_url: "https://blog.example.org".to_owned(),
            ..Default::default()
        };
        assert_eq!(config.post_url("hello"), "https://blog.example.org/post/hello");
        assert_eq!(config.page_url("about"), "https://blog.example.org/page/about");
    }

    #[test]
    fn path_segments_are_percent_encoded() {
        assert_eq!(tag_path("C#"), "/tag/C%23");
        assert_eq!(tag_path("a/b"), "/tag/a%2Fb");
        assert_eq!(tag_path("生活"), "/tag/%E7%94%9F%E6%B4%BB");
        assert_eq!(post_path("2024-01-02-030405"), "/post/2024-01-02-030405");
        assert_eq!(page_path("a b"), "/page/a%20b");
    }
}
