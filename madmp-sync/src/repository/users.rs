//! Local user accounts

use madmp_common::{Error, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub active: bool,
}

impl User {
    fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            email: row.get("email"),
            active: row.get("active"),
        }
    }
}

pub async fn create_user(conn: &mut SqliteConnection, email: &str) -> Result<User> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(Error::InvalidInput(format!("'{}' is not an e-mail address", email)));
    }

    let result = sqlx::query("INSERT INTO users (email, active) VALUES (?, 1)")
        .bind(email)
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::from_insert(e, "User", email))?;

    Ok(User {
        id: result.last_insert_rowid(),
        email: email.to_string(),
        active: true,
    })
}

pub async fn get_user(conn: &mut SqliteConnection, id: i64) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, email, active FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.as_ref().map(User::from_row))
}

/// Case-insensitive lookup of an active user
pub async fn find_by_email(conn: &mut SqliteConnection, email: &str) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, email, active FROM users WHERE email = ? AND active = 1")
        .bind(email.trim())
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.as_ref().map(User::from_row))
}

pub async fn list_users(conn: &mut SqliteConnection) -> Result<Vec<User>> {
    let rows = sqlx::query("SELECT id, email, active FROM users ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows.iter().map(User::from_row).collect())
}
