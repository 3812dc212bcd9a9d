//! HTML views, rendered with [maud](https://maud.lambda.xyz/).

use axum::http::StatusCode;
use chrono::{Datelike, Local, NaiveDateTime};
use maud::{html, Markup, PreEscaped, DOCTYPE};

use crate::{
    config::{page_path, post_path, tag_path, AppConfig},
    data_formats::Pagination,
    models::{Post, Tag, TagWithCount},
};

const STYLE: &str = r#"
body { max-width: 46rem; margin: 0 auto; padding: 1rem; font-family: sans-serif; line-height: 1.6; }
header, footer { color: #555; }
header nav a, footer a { margin-right: 1rem; }
.flash { padding: .5rem 1rem; background: #fff4d6; border: 1px solid #e8c76a; }
.meta, .meta a { color: #777; font-size: .9rem; }
.tags a { margin-right: .5rem; }
form label { display: block; margin-top: .75rem; }
form input[type=text], form input[type=password], form textarea { width: 100%; }
table { border-collapse: collapse; width: 100%; }
td, th { padding: .25rem .5rem; border-bottom: 1px solid #ddd; text-align: left; }
"#;

fn date(timestamp: &NaiveDateTime) -> String {
    timestamp.format("%Y-%m-%d").to_string()
}

// ============================================================================
// Layout
// ============================================================================

fn layout(site: &AppConfig, title: Option<&str>, flash: Option<&str>, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="zh-CN" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title {
                    @if let Some(title) = title {
                        (title) " - "
                    }
                    (site.site_title)
                }
                link rel="alternate" type="application/rss+xml" title=(site.site_title) href="/feed.xml";
                style { (PreEscaped(STYLE)) }
            }
            body {
                header {
                    h1 { a href="/" { (site.site_title) } }
                    p { (site.site_description) }
                    nav {
                        a href="/" { "Home" }
                        a href="/tags" { "Tags" }
                        a href="/feed.xml" { "RSS" }
                    }
                }
                @if let Some(message) = flash {
                    p.flash role="status" { (message) }
                }
                main { (content) }
                footer {
                    p { "© " (Local::now().year()) " " (site.site_title) }
                }
            }
        }
    }
}

fn admin_nav() -> Markup {
    html! {
        nav.admin {
            a href="/plog-admin/posts" { "Posts" }
            " · "
            a href="/plog-admin/write" { "Write" }
            " · "
            a href="/plog-admin/import" { "Import / Export" }
            " · "
            a href="/plog-admin/password" { "Password" }
            " · "
            a href="/logout" { "Log out" }
        }
    }
}

fn tag_links(tags: &[String]) -> Markup {
    html! {
        @if !tags.is_empty() {
            span.tags {
                @for tag in tags {
                    a href=(tag_path(tag)) { "#" (tag) }
                }
            }
        }
    }
}

fn post_summary(post: &Post) -> Markup {
    html! {
        article {
            h2 { a href=(post_path(&post.slug)) { (post.title) } }
            p.meta {
                time datetime=(date(&post.created_at)) { (date(&post.created_at)) }
                " "
                (tag_links(&post.tags))
            }
        }
    }
}

// ============================================================================
// Public pages
// ============================================================================

pub fn index_page(
    site: &AppConfig,
    posts: &[Post],
    pages: &[Post],
    pagination: &Pagination,
    flash: Option<&str>,
) -> Markup {
    let content = html! {
        @if !pages.is_empty() {
            nav.pages {
                @for page in pages {
                    a href=(page_path(&page.slug)) { (page.title) } " "
                }
            }
        }
        @if posts.is_empty() {
            p { "Nothing here yet." }
        }
        @for post in posts {
            (post_summary(post))
        }
        nav.pagination {
            @if pagination.has_prev() {
                a rel="prev" href={ "/page/" (pagination.page - 1) } { "← Newer" }
                " "
            }
            @if pagination.has_next() {
                a rel="next" href={ "/page/" (pagination.page + 1) } { "Older →" }
            }
        }
    };
    layout(site, None, flash, content)
}

/// A post or standalone page. `body` is the already rendered markdown.
pub fn post_page(site: &AppConfig, post: &Post, body: &str) -> Markup {
    let content = html! {
        article {
            h2 { (post.title) }
            @if !post.is_page {
                p.meta {
                    time datetime=(date(&post.created_at)) { (date(&post.created_at)) }
                    " "
                    (tag_links(&post.tags))
                }
            }
            (PreEscaped(body))
        }
    };
    layout(site, Some(&post.title), None, content)
}

pub fn tag_page(site: &AppConfig, tag: &Tag, posts: &[Post]) -> Markup {
    let content = html! {
        h2 { "#" (tag.name) }
        @for post in posts {
            (post_summary(post))
        }
    };
    layout(site, Some(&tag.name), None, content)
}

pub fn tags_page(site: &AppConfig, tags: &[TagWithCount]) -> Markup {
    let content = html! {
        h2 { "Tags" }
        @if tags.is_empty() {
            p { "No tags yet." }
        }
        ul {
            @for tag in tags {
                li { a href=(tag_path(&tag.name)) { (tag.name) } " (" (tag.post_count) ")" }
            }
        }
    };
    layout(site, Some("Tags"), None, content)
}

pub fn login_page(site: &AppConfig, flash: Option<&str>) -> Markup {
    let content = html! {
        h2 { "Log in" }
        form method="post" action="/login" {
            label for="password" { "Password" }
            input type="password" id="password" name="password" required autofocus;
            p { button type="submit" { "Log in" } }
        }
    };
    layout(site, Some("Log in"), flash, content)
}

pub fn error_page(status: StatusCode, message: &str) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="UTF-8";
                title { (status.as_u16()) " " (status.canonical_reason().unwrap_or("Error")) }
            }
            body {
                h1 { (status.as_u16()) }
                p { (message) }
                p { a href="/" { "Back to the front page" } }
            }
        }
    }
}

// ============================================================================
// Admin pages
// ============================================================================

pub fn admin_posts_page(site: &AppConfig, posts: &[Post], flash: Option<&str>) -> Markup {
    let content = html! {
        (admin_nav())
        h2 { "All posts" }
        table {
            thead {
                tr { th { "Title" } th { "Kind" } th { "Created" } th { "Updated" } th {} }
            }
            tbody {
                @for post in posts {
                    tr {
                        td {
                            @if post.is_page {
                                a href=(page_path(&post.slug)) { (post.title) }
                            } @else {
                                a href=(post_path(&post.slug)) { (post.title) }
                            }
                        }
                        td { @if post.is_page { "page" } @else { "post" } }
                        td { (date(&post.created_at)) }
                        td { (date(&post.updated_at)) }
                        td {
                            a href={ "/edit/" (post.id) } { "Edit" }
                            " "
                            a href={ "/delete/" (post.id) } { "Delete" }
                        }
                    }
                }
            }
        }
    };
    layout(site, Some("Admin"), flash, content)
}

fn post_form(action: &str, post: Option<&Post>) -> Markup {
    let title = post.map(|post| post.title.as_str()).unwrap_or_default();
    let content = post.map(|post| post.content.as_str()).unwrap_or_default();
    let tags = post.map(|post| post.tags.join(", ")).unwrap_or_default();
    let is_page = post.map(|post| post.is_page).unwrap_or(false);
    html! {
        form method="post" action=(action) {
            label for="title" { "Title" }
            input type="text" id="title" name="title" value=(title) required;
            @if let Some(post) = post {
                p.meta { "Slug: " (post.slug) }
            } @else {
                label for="slug" { "Slug (leave empty to use the current time)" }
                input type="text" id="slug" name="slug";
            }
            label for="tags" { "Tags (comma separated)" }
            input type="text" id="tags" name="tags" value=(tags);
            label {
                input type="checkbox" name="is_page" value="on" checked[is_page];
                " Standalone page"
            }
            label for="content" { "Content (markdown)" }
            textarea id="content" name="content" rows="20" { (content) }
            p { button type="submit" { "Save" } }
        }
    }
}

pub fn write_page(site: &AppConfig, flash: Option<&str>) -> Markup {
    let content = html! {
        (admin_nav())
        h2 { "Write" }
        (post_form("/plog-admin/write", None))
    };
    layout(site, Some("Write"), flash, content)
}

pub fn edit_page(site: &AppConfig, post: &Post, flash: Option<&str>) -> Markup {
    let action = format!("/edit/{}", post.id);
    let content = html! {
        (admin_nav())
        h2 { "Edit" }
        (post_form(&action, Some(post)))
    };
    layout(site, Some("Edit"), flash, content)
}

pub fn password_page(site: &AppConfig, flash: Option<&str>) -> Markup {
    let content = html! {
        (admin_nav())
        h2 { "Change password" }
        form method="post" action="/change-password" {
            label for="old_password" { "Current password" }
            input type="password" id="old_password" name="old_password" required;
            label for="new_password" { "New password" }
            input type="password" id="new_password" name="new_password" required;
            p { button type="submit" { "Change" } }
        }
    };
    layout(site, Some("Password"), flash, content)
}

pub fn import_page(site: &AppConfig, flash: Option<&str>) -> Markup {
    let content = html! {
        (admin_nav())
        h2 { "Export" }
        p { a href="/plog-admin/export" { "Download a snapshot of every post and tag" } }
        h2 { "Import" }
        p { "Posts whose slug already exists are skipped." }
        form method="post" action="/plog-admin/import" enctype="multipart/form-data" {
            input type="file" name="file" accept="application/json,.json" required;
            p { button type="submit" { "Import" } }
        }
    };
    layout(site, Some("Import / Export"), flash, content)
}
