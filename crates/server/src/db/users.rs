use sqlx::SqlitePool;
use zsk_common::types::{Role, UserProfile};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub name: String,
    pub role: String,
}

impl UserRow {
    /// Unknown role strings are treated as plain users.
    pub fn role(&self) -> Role {
        self.role.parse().unwrap_or_default()
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            name: self.name.clone(),
            role: self.role(),
        }
    }
}

const SELECT_USER: &str = "SELECT id, username, email, password_hash, name, role FROM users";

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_username(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE username = ?"))
        .bind(username)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE lower(email) = lower(?)"))
        .bind(email)
        .fetch_optional(pool)
        .await
}

/// Match either the username or (case-insensitively) the email.
pub async fn find_by_identifier(
    pool: &SqlitePool,
    identifier: &str,
) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(&format!(
        "{SELECT_USER} WHERE username = ? OR lower(email) = lower(?) LIMIT 1"
    ))
    .bind(identifier)
    .bind(identifier)
    .fetch_optional(pool)
    .await
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: Option<&'a str>,
    pub password_hash: &'a str,
    pub name: &'a str,
    pub created_at: &'a str,
}

pub async fn insert(pool: &SqlitePool, user: NewUser<'_>) -> Result<UserRow, sqlx::Error> {
    let id = sqlx::query(
        "INSERT INTO users (username, email, password_hash, name, role, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(user.username)
    .bind(user.email)
    .bind(user.password_hash)
    .bind(user.name)
    .bind(Role::User.as_str())
    .bind(user.created_at)
    .execute(pool)
    .await?
    .last_insert_rowid();

    find_by_id(pool, id).await?.ok_or(sqlx::Error::RowNotFound)
}

pub async fn update_password(
    pool: &SqlitePool,
    id: i64,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(password_hash)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Promote `id` to admin unless some admin already exists.
///
/// Returns `false` when the promotion was refused. The check and the update
/// run as one statement so two racing claims cannot both succeed.
pub async fn promote_first_admin(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE users SET role = 'admin' WHERE id = ? \
         AND NOT EXISTS (SELECT 1 FROM users WHERE role = 'admin')",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}
