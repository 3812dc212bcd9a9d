use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, Path},
    http::{header, Uri},
    response::{AppendHeaders, Html, IntoResponse, Redirect, Response},
    Extension, Form,
};
use chrono::Local;
use maud::Markup;

use crate::{
    authentication::{
        check_admin_password, clear_flash_cookie, clear_session_cookie, flash_redirect,
        get_session_token, hash_password_argon2, session_cookie, Flash,
    },
    backup::{default_backup_file_name, export_snapshot, import_snapshot, parse_snapshot, BackupError},
    data_formats::{ChangePasswordRequest, LoginRequest, NewPost, Pagination, PostForm, PostUpdate},
    db_helpers::{
        count_posts_in_db, create_post_in_db, delete_post_in_db, get_post_by_id_in_db,
        get_post_by_slug_in_db, get_tag_by_name_in_db, list_posts_by_tag_in_db,
        list_posts_by_updated_in_db, list_posts_in_db, list_tags_in_db, set_admin_password_hash,
        update_post_in_db,
    },
    errors::RequestError,
    feed::{generate_feed, FEED_SIZE},
    markdown, sitemap, templates, AppContext,
};

type Context = Extension<Arc<AppContext>>;
type HtmlResult = Result<Response, RequestError>;

/// Renders a page, dropping the flash cookie once its message has been shown.
fn render(markup: Markup, flash: &Flash) -> Response {
    let html = Html(markup.into_string());
    if flash.0.is_some() {
        (
            AppendHeaders([(header::SET_COOKIE, clear_flash_cookie())]),
            html,
        )
            .into_response()
    } else {
        html.into_response()
    }
}

/// Turns a failed form submission into a redirect back to `to` with a flash
/// message. Unknown records still answer 404.
fn form_failure(ctx: &AppContext, to: &str, error: RequestError) -> Response {
    match error {
        RequestError::NotFound => RequestError::NotFound.into_response(),
        RequestError::Validation(message) => {
            flash_redirect(&ctx.config.secret_key, to, &message)
        }
        error => {
            log::error!("Form submission to {} failed: {:?}", to, error);
            flash_redirect(&ctx.config.secret_key, to, &error.to_string())
        }
    }
}

// ----------------- Helper Handlers -----------------

pub async fn not_found(uri: Uri) -> RequestError {
    log::debug!("No route for {}", uri);
    RequestError::NotFound
}

// ----------------- Public Handlers -----------------

pub async fn index(Extension(ctx): Context, flash: Flash) -> HtmlResult {
    render_index(&ctx, 1, flash).await
}

/// `/page/<segment>`: digits select a page of the index, anything else is the
/// slug of a standalone page.
pub async fn page_or_index(
    Extension(ctx): Context,
    Path(segment): Path<String>,
    flash: Flash,
) -> HtmlResult {
    if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
        let page = segment.parse::<i64>().map_err(|_| RequestError::NotFound)?;
        return render_index(&ctx, page, flash).await;
    }
    let page = get_post_by_slug_in_db(&ctx.pool, &segment, Some(true))
        .await?
        .ok_or(RequestError::NotFound)?;
    let body = markdown::to_html(&page.content);
    Ok(render(templates::post_page(&ctx.config, &page, &body), &Flash(None)))
}

async fn render_index(ctx: &AppContext, page: i64, flash: Flash) -> HtmlResult {
    let total = count_posts_in_db(&ctx.pool, Some(false)).await?;
    let pagination = Pagination::new(page, total);
    let posts = list_posts_in_db(
        &ctx.pool,
        Some(false),
        pagination.per_page,
        pagination.offset(),
    )
    .await?;
    let pages = list_posts_in_db(&ctx.pool, Some(true), -1, 0).await?;
    let markup = templates::index_page(
        &ctx.config,
        &posts,
        &pages,
        &pagination,
        flash.0.as_deref(),
    );
    Ok(render(markup, &flash))
}

pub async fn show_post(Extension(ctx): Context, Path(slug): Path<String>) -> HtmlResult {
    let post = get_post_by_slug_in_db(&ctx.pool, &slug, None)
        .await?
        .ok_or(RequestError::NotFound)?;
    let body = markdown::to_html(&post.content);
    Ok(render(templates::post_page(&ctx.config, &post, &body), &Flash(None)))
}

pub async fn show_tag(Extension(ctx): Context, Path(name): Path<String>) -> HtmlResult {
    let tag = get_tag_by_name_in_db(&ctx.pool, &name)
        .await?
        .ok_or(RequestError::NotFound)?;
    let posts = list_posts_by_tag_in_db(&ctx.pool, tag.id).await?;
    Ok(render(templates::tag_page(&ctx.config, &tag, &posts), &Flash(None)))
}

pub async fn list_tags(Extension(ctx): Context) -> HtmlResult {
    let tags = list_tags_in_db(&ctx.pool).await?;
    Ok(render(templates::tags_page(&ctx.config, &tags), &Flash(None)))
}

pub async fn feed_xml(Extension(ctx): Context) -> HtmlResult {
    let posts = list_posts_in_db(&ctx.pool, Some(false), FEED_SIZE, 0).await?;
    let xml = generate_feed(&posts, &ctx.config).map_err(|e| {
        log::error!("Could not build the RSS feed: {:#}", e);
        RequestError::ServerError
    })?;
    Ok(([(header::CONTENT_TYPE, "application/rss+xml; charset=utf-8")], xml).into_response())
}

pub async fn sitemap_xml(Extension(ctx): Context) -> HtmlResult {
    let posts = list_posts_by_updated_in_db(&ctx.pool).await?;
    let today = Local::now().date_naive();
    let xml = sitemap::generate_sitemap(&posts, &ctx.config, today).map_err(|e| {
        log::error!("Could not build the sitemap: {:#}", e);
        RequestError::ServerError
    })?;
    Ok(([(header::CONTENT_TYPE, "application/xml; charset=utf-8")], xml).into_response())
}

// ----------------- Session Handlers -----------------

pub async fn login_form(Extension(ctx): Context, flash: Flash) -> Response {
    render(templates::login_page(&ctx.config, flash.0.as_deref()), &flash)
}

pub async fn login(Extension(ctx): Context, Form(request): Form<LoginRequest>) -> Response {
    let secret = &ctx.config.secret_key;
    match check_admin_password(&ctx.pool, request.password).await {
        Ok(true) => match get_session_token(secret) {
            Ok(token) => {
                log::info!("Admin logged in");
                (
                    AppendHeaders([(header::SET_COOKIE, session_cookie(&token))]),
                    Redirect::to("/plog-admin"),
                )
                    .into_response()
            }
            Err(e) => {
                log::error!("Could not sign session token: {:#}", e);
                flash_redirect(secret, "/login", "Could not log in, please try again")
            }
        },
        Ok(false) => {
            log::warn!("Failed admin login attempt");
            flash_redirect(secret, "/login", "Incorrect password")
        }
        Err(e) => {
            log::error!("Could not check the admin password: {:?}", e);
            flash_redirect(secret, "/login", "Could not log in, please try again")
        }
    }
}

pub async fn logout() -> Response {
    (
        AppendHeaders([(header::SET_COOKIE, clear_session_cookie())]),
        Redirect::to("/"),
    )
        .into_response()
}

pub async fn change_password(
    Extension(ctx): Context,
    Form(request): Form<ChangePasswordRequest>,
) -> Response {
    let secret = &ctx.config.secret_key;
    if request.new_password.is_empty() {
        return flash_redirect(secret, "/plog-admin/password", "New password cannot be empty");
    }
    match check_admin_password(&ctx.pool, request.old_password).await {
        Ok(true) => (),
        Ok(false) => {
            return flash_redirect(secret, "/plog-admin/password", "Current password is incorrect")
        }
        Err(e) => return form_failure(&ctx, "/plog-admin/password", e),
    }
    let hash = match hash_password_argon2(request.new_password).await {
        Ok(hash) => hash,
        Err(e) => {
            log::error!("Could not hash the new password: {:#}", e);
            return form_failure(&ctx, "/plog-admin/password", RequestError::ServerError);
        }
    };
    match set_admin_password_hash(&ctx.pool, &hash).await {
        Ok(()) => {
            log::info!("Admin password changed");
            flash_redirect(secret, "/plog-admin/posts", "Password changed")
        }
        Err(e) => form_failure(&ctx, "/plog-admin/password", e),
    }
}

// ----------------- Admin Handlers -----------------

pub async fn admin_home() -> Redirect {
    Redirect::to("/plog-admin/posts")
}

pub async fn admin_posts(Extension(ctx): Context, flash: Flash) -> HtmlResult {
    let posts = list_posts_in_db(&ctx.pool, None, -1, 0).await?;
    let markup = templates::admin_posts_page(&ctx.config, &posts, flash.0.as_deref());
    Ok(render(markup, &flash))
}

pub async fn password_form(Extension(ctx): Context, flash: Flash) -> Response {
    render(templates::password_page(&ctx.config, flash.0.as_deref()), &flash)
}

pub async fn write_form(Extension(ctx): Context, flash: Flash) -> Response {
    render(templates::write_page(&ctx.config, flash.0.as_deref()), &flash)
}

pub async fn write_post(Extension(ctx): Context, Form(form): Form<PostForm>) -> Response {
    match create_post_in_db(&ctx.pool, NewPost::from(form)).await {
        Ok(post) => {
            log::info!("Created post {} ({})", post.id, post.slug);
            flash_redirect(&ctx.config.secret_key, "/plog-admin/posts", "Saved")
        }
        Err(e) => form_failure(&ctx, "/plog-admin/write", e),
    }
}

pub async fn edit_form(Extension(ctx): Context, Path(id): Path<i64>, flash: Flash) -> HtmlResult {
    let post = get_post_by_id_in_db(&ctx.pool, id)
        .await?
        .ok_or(RequestError::NotFound)?;
    let markup = templates::edit_page(&ctx.config, &post, flash.0.as_deref());
    Ok(render(markup, &flash))
}

pub async fn edit_post(
    Extension(ctx): Context,
    Path(id): Path<i64>,
    Form(form): Form<PostForm>,
) -> Response {
    match update_post_in_db(&ctx.pool, id, PostUpdate::from(form)).await {
        Ok(post) => {
            log::info!("Updated post {} ({})", post.id, post.slug);
            flash_redirect(&ctx.config.secret_key, "/plog-admin/posts", "Saved")
        }
        Err(e) => form_failure(&ctx, &format!("/edit/{id}"), e),
    }
}

pub async fn delete_post(Extension(ctx): Context, Path(id): Path<i64>) -> Response {
    match delete_post_in_db(&ctx.pool, id).await {
        Ok(()) => {
            log::info!("Deleted post {}", id);
            flash_redirect(&ctx.config.secret_key, "/plog-admin/posts", "Deleted")
        }
        Err(e) => form_failure(&ctx, "/plog-admin/posts", e),
    }
}

// ----------------- Backup Handlers -----------------

pub async fn import_form(Extension(ctx): Context, flash: Flash) -> Response {
    render(templates::import_page(&ctx.config, flash.0.as_deref()), &flash)
}

pub async fn export_backup(Extension(ctx): Context) -> Response {
    let result = export_snapshot(&ctx.pool)
        .await
        .and_then(|snapshot| serde_json::to_vec_pretty(&snapshot).map_err(BackupError::from));
    match result {
        Ok(body) => {
            let disposition = format!("attachment; filename=\"{}\"", default_backup_file_name());
            (
                [
                    (header::CONTENT_TYPE, "application/json; charset=utf-8".to_owned()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                body,
            )
                .into_response()
        }
        Err(e) => {
            log::error!("Export failed: {}", e);
            flash_redirect(
                &ctx.config.secret_key,
                "/plog-admin/import",
                &format!("Export failed: {e}"),
            )
        }
    }
}

async fn read_upload(multipart: &mut Multipart) -> Result<Option<Bytes>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            return Ok(Some(field.bytes().await?));
        }
    }
    Ok(None)
}

pub async fn import_backup(Extension(ctx): Context, mut multipart: Multipart) -> Response {
    let secret = &ctx.config.secret_key;
    let data = match read_upload(&mut multipart).await {
        Ok(Some(data)) => data,
        Ok(None) => return flash_redirect(secret, "/plog-admin/import", "No file was uploaded"),
        Err(e) => {
            return flash_redirect(secret, "/plog-admin/import", &format!("Upload failed: {e}"))
        }
    };

    let result = match parse_snapshot(&data) {
        Ok(snapshot) => import_snapshot(&ctx.pool, &snapshot).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(report) => {
            log::info!("Imported snapshot: {:?}", report);
            let message = format!(
                "Imported {} record(s), skipped {} existing post(s)",
                report.created(),
                report.skipped_posts
            );
            flash_redirect(secret, "/plog-admin/posts", &message)
        }
        Err(e) => {
            log::error!("Import failed: {}", e);
            flash_redirect(secret, "/plog-admin/import", &format!("Import failed: {e}"))
        }
    }
}
