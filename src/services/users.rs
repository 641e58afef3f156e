//! Lazy user materialization. Users are created on first reference by any
//! authenticated operation.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::User;

pub async fn ensure_user(pool: &PgPool, user_id: &str) -> Result<User> {
    if let Some(user) = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
    {
        return Ok(user);
    }

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email)
        VALUES ($1, $2)
        ON CONFLICT (id) DO UPDATE SET email = users.email
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(format!("{}@local.invalid", user_id))
    .fetch_one(pool)
    .await?;
    Ok(user)
}

pub async fn upsert_user_identity(
    pool: &PgPool,
    user_id: Option<&str>,
    email: &str,
    name: Option<&str>,
    picture: Option<&str>,
) -> Result<User> {
    // Prefer an existing account for this email so repeated OAuth syncs do
    // not fork identities.
    if let Some(user) = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1 LIMIT 1")
        .bind(email)
        .fetch_optional(pool)
        .await?
    {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET name = COALESCE($2, name), picture = COALESCE($3, picture) WHERE id = $1 RETURNING *",
        )
        .bind(&user.id)
        .bind(name)
        .bind(picture)
        .fetch_one(pool)
        .await?;
        return Ok(user);
    }

    let id = user_id
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email, name, picture)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email, name = EXCLUDED.name, picture = EXCLUDED.picture
        RETURNING *
        "#,
    )
    .bind(&id)
    .bind(email)
    .bind(name)
    .bind(picture)
    .fetch_one(pool)
    .await?;
    Ok(user)
}
