use sqlx::{Sqlite, SqlitePool};

use crate::{
    authentication::{hash_password_argon2, DEFAULT_ADMIN_PASSWORD},
    errors::RequestError,
};

pub async fn get_admin_password_hash(pool: &SqlitePool) -> Result<Option<String>, RequestError> {
    let mut tx = pool.begin().await?;
    let result =
        sqlx::query_scalar::<Sqlite, String>("SELECT password_hash FROM admin_password WHERE id = 1")
            .fetch_optional(&mut tx)
            .await?;
    tx.commit().await?;
    Ok(result)
}

pub async fn set_admin_password_hash(pool: &SqlitePool, hash: &str) -> Result<(), RequestError> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO admin_password (id, password_hash)
        VALUES (1, $1)
        ON CONFLICT (id) DO UPDATE SET password_hash = excluded.password_hash
        "#,
    )
    .bind(hash)
    .execute(&mut tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

/// Seeds the admin password with the default one when none is stored yet.
/// Returns true when it did.
pub async fn ensure_admin_password(pool: &SqlitePool) -> Result<bool, RequestError> {
    if get_admin_password_hash(pool).await?.is_some() {
        return Ok(false);
    }
    let hash = hash_password_argon2(DEFAULT_ADMIN_PASSWORD.to_owned())
        .await
        .map_err(|_| RequestError::ServerError)?;
    set_admin_password_hash(pool, &hash).await?;
    Ok(true)
}
