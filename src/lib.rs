mod authentication;
pub mod backup;
pub mod config;
mod data_formats;
pub mod db_helpers;
mod errors;
pub mod feed;
mod handlers;
pub mod markdown;
mod models;
pub mod sitemap;
mod templates;
#[cfg(test)]
mod test_helpers;

use anyhow::Context;
pub use anyhow::Result;
pub use authentication::DEFAULT_ADMIN_PASSWORD;
use axum::{middleware, routing::*, Extension, Router};
pub use config::AppConfig;
pub use data_formats::*;
pub use errors::RequestError;
use handlers::*;
pub use models::{Post, Tag, TagWithCount};
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};
use std::{
    net::{SocketAddr, TcpListener},
    sync::Arc,
};

/// Everything a handler needs: the store and the site configuration.
#[derive(Debug)]
pub struct AppContext {
    pub pool: SqlitePool,
    pub config: AppConfig,
}

impl AppContext {
    /// Opens (and migrates) the database and makes sure an admin password
    /// exists.
    pub async fn init(config: AppConfig) -> Result<Arc<AppContext>> {
        let pool = init_db(&config.database_url).await?;
        if db_helpers::ensure_admin_password(&pool)
            .await
            .context("Failed to seed the admin password")?
        {
            log::warn!(
                "Created the admin account with the default password {:?}, change it before going live",
                DEFAULT_ADMIN_PASSWORD
            );
        }
        Ok(Arc::new(AppContext { pool, config }))
    }
}

pub async fn run_app(ctx: Arc<AppContext>, address: SocketAddr) -> Result<()> {
    let app = make_router(ctx);
    log::info!("Server started on {}", address);
    axum::Server::bind(&address)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

pub async fn init_db(db_url: &str) -> Result<SqlitePool> {
    if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
        log::info!("Creating database {}", db_url);
        Sqlite::create_database(db_url)
            .await
            .with_context(|| format!("Failed to create database {db_url}"))?;
    } else {
        log::debug!("Database {} already exists", db_url);
    }
    let pool = SqlitePool::connect(db_url).await?;
    log::debug!("Running migrations");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    log::debug!("Migrations completed");
    Ok(pool)
}

pub fn get_random_free_port() -> (u16, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    match listener.local_addr() {
        Ok(addr) => (addr.port(), addr),
        Err(_) => panic!("Could not get a free port"),
    }
}

pub fn make_router(ctx: Arc<AppContext>) -> Router {
    let admin = Router::new()
        .route("/plog-admin", get(admin_home))
        .route("/plog-admin/posts", get(admin_posts))
        .route("/plog-admin/write", get(write_form).post(write_post))
        .route("/plog-admin/password", get(password_form))
        .route("/plog-admin/export", get(export_backup))
        .route("/plog-admin/import", get(import_form).post(import_backup))
        .route("/change-password", post(change_password))
        .route("/edit/:id", get(edit_form).post(edit_post))
        .route("/delete/:id", get(delete_post))
        .route_layer(middleware::from_fn(authentication::require_login));

    Router::new()
        .route("/", get(index))
        .route("/page/:segment", get(page_or_index))
        .route("/post/:slug", get(show_post))
        .route("/tag/:name", get(show_tag))
        .route("/tags", get(list_tags))
        .route("/feed.xml", get(feed_xml))
        .route("/sitemap.xml", get(sitemap_xml))
        .route("/login", get(login_form).post(login))
        .route("/logout", get(logout))
        .merge(admin)
        .fallback(not_found)
        .layer(Extension(ctx))
}
