use anyhow::Result;
use farm_types::api::{CreateUserRequest, UpdateUserRequest};
use farm_types::models::User;
use rusqlite::{Connection, Row};

use super::{OptionalExt, get_enum, get_ts, new_id, now, ts_to_sql};
use crate::Database;

const USER_COLUMNS: &str = "id, email, name, role, avatar, created_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, req: &CreateUserRequest) -> Result<User> {
        let user = User {
            id: new_id(),
            email: req.email.clone(),
            name: req.name.clone(),
            role: req.role,
            avatar: req.avatar.clone(),
            created_at: now(),
        };
        self.with_conn(|conn| insert_user(conn, &user))?;
        Ok(user)
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    /// Apply the fields present in `req`. Returns `None` for an unknown id.
    pub fn update_user(&self, id: &str, req: &UpdateUserRequest) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let Some(mut user) = query_user(conn, "id", id)? else {
                return Ok(None);
            };

            if let Some(email) = &req.email {
                user.email = email.clone();
            }
            if let Some(name) = &req.name {
                user.name = name.clone();
            }
            if let Some(role) = req.role {
                user.role = role;
            }
            if let Some(avatar) = &req.avatar {
                user.avatar = Some(avatar.clone());
            }

            conn.execute(
                "UPDATE users SET email = ?2, name = ?3, role = ?4, avatar = ?5 WHERE id = ?1",
                rusqlite::params![user.id, user.email, user.name, user.role.as_str(), user.avatar],
            )?;
            Ok(Some(user))
        })
    }
}

pub(crate) fn insert_user(conn: &Connection, user: &User) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, email, name, role, avatar, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            user.id,
            user.email,
            user.name,
            user.role.as_str(),
            user.avatar,
            ts_to_sql(&user.created_at)
        ],
    )?;
    Ok(())
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users WHERE {} = ?1",
        USER_COLUMNS, column
    ))?;

    stmt.query_row([value], user_from_row).optional()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        role: get_enum(row, 3)?,
        avatar: row.get(4)?,
        created_at: get_ts(row, 5)?,
    })
}
