use crate::Database;
use crate::models::{USER_COLUMNS, UserRow};
use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

/// A user as first seen from the identity provider.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub username: String,
    pub profile_picture: String,
}

/// Profile fields a user can edit. `None` leaves the stored value unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub full_name: Option<String>,
    pub profile_picture: Option<String>,
    pub cover_photo: Option<String>,
}

/// One of the per-user id sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserSet {
    Followers,
    Following,
    Connections,
}

impl UserSet {
    fn table(self) -> &'static str {
        match self {
            Self::Followers => "user_followers",
            Self::Following => "user_following",
            Self::Connections => "user_connections",
        }
    }
}

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, full_name, username, profile_picture, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    user.id,
                    user.email,
                    user.full_name,
                    user.username,
                    user.profile_picture,
                    crate::format_timestamp(Utc::now()),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    /// Batch-fetch users. Unknown ids are skipped; order is unspecified.
    pub fn get_users_by_ids(&self, ids: &[String]) -> Result<Vec<UserRow>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(ids.iter()), UserRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Case-insensitive substring match on username, email, full name or location.
    pub fn search_users(&self, input: &str, exclude_id: &str) -> Result<Vec<UserRow>> {
        let pattern = like_pattern(input);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE id != ?2
                   AND (username LIKE ?1 ESCAPE '\\'
                        OR email LIKE ?1 ESCAPE '\\'
                        OR full_name LIKE ?1 ESCAPE '\\'
                        OR location LIKE ?1 ESCAPE '\\')
                 ORDER BY username"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![pattern, exclude_id], UserRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Overwrite the fields the identity provider owns. Returns false if the
    /// user does not exist.
    pub fn update_identity(
        &self,
        id: &str,
        email: &str,
        full_name: &str,
        profile_picture: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET email = ?2, full_name = ?3, profile_picture = ?4 WHERE id = ?1",
                rusqlite::params![id, email, full_name, profile_picture],
            )?;
            Ok(changed == 1)
        })
    }

    /// Apply a profile edit. A requested username that another user already
    /// holds is ignored; the check and the write are one statement.
    pub fn update_profile(&self, id: &str, update: &ProfileUpdate) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET
                    username        = CASE
                                        WHEN ?2 IS NULL THEN username
                                        WHEN EXISTS (SELECT 1 FROM users WHERE username = ?2 AND id != ?1)
                                            THEN username
                                        ELSE ?2
                                      END,
                    bio             = COALESCE(?3, bio),
                    location        = COALESCE(?4, location),
                    full_name       = COALESCE(?5, full_name),
                    profile_picture = COALESCE(?6, profile_picture),
                    cover_photo     = COALESCE(?7, cover_photo)
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    update.username,
                    update.bio,
                    update.location,
                    update.full_name,
                    update.profile_picture,
                    update.cover_photo,
                ],
            )?;
            query_user(conn, "id", id)
        })
    }

    /// Delete a user. Messages, requests and the user's own sets cascade; the
    /// user's id is also scrubbed from everyone else's sets.
    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for set in [UserSet::Followers, UserSet::Following, UserSet::Connections] {
                tx.execute(&format!("DELETE FROM {} WHERE other_id = ?1", set.table()), [id])?;
            }
            let deleted = tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(deleted == 1)
        })
    }

    // -- Graph --

    pub fn get_user_set(&self, user_id: &str, set: UserSet) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT other_id FROM {} WHERE user_id = ?1 ORDER BY rowid",
                set.table()
            ))?;
            let ids = stmt
                .query_map([user_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    pub fn set_contains(&self, user_id: &str, set: UserSet, other_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    &format!("SELECT 1 FROM {} WHERE user_id = ?1 AND other_id = ?2", set.table()),
                    [user_id, other_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Add `target_id` to the follower's `following` and the follower to the
    /// target's `followers`, in one transaction.
    pub fn follow(&self, follower_id: &str, target_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO user_following (user_id, other_id) VALUES (?1, ?2)",
                [follower_id, target_id],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO user_followers (user_id, other_id) VALUES (?1, ?2)",
                [target_id, follower_id],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn unfollow(&self, follower_id: &str, target_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM user_following WHERE user_id = ?1 AND other_id = ?2",
                [follower_id, target_id],
            )?;
            tx.execute(
                "DELETE FROM user_followers WHERE user_id = ?1 AND other_id = ?2",
                [target_id, follower_id],
            )?;
            tx.commit()?;
            Ok(())
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"))?;
    let row = stmt.query_row([value], UserRow::from_row).optional()?;
    Ok(row)
}

/// Wrap user input as a LIKE substring pattern, escaping wildcards.
fn like_pattern(input: &str) -> String {
    let mut pattern = String::with_capacity(input.len() + 2);
    pattern.push('%');
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
