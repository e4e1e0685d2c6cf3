use crate::models::{CONNECTION_COLUMNS, ConnectionRow};
use crate::{Database, format_timestamp};
use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

pub struct NewRequest<'a> {
    pub id: &'a str,
    pub from_user_id: &'a str,
    pub to_user_id: &'a str,
    pub created_at: DateTime<Utc>,
}

/// Sender quota: at most `max` requests created strictly after `since`.
#[derive(Debug, Clone, Copy)]
pub struct RequestQuota {
    pub max: u32,
    pub since: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Inserted,
    /// The pair already has a request in either direction; it is left untouched.
    Duplicate,
    RateLimited,
}

fn count_requests_since(conn: &Connection, from_user_id: &str, since: DateTime<Utc>) -> Result<u32> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM connection_requests WHERE from_user_id = ?1 AND created_at > ?2",
        rusqlite::params![from_user_id, format_timestamp(since)],
        |row| row.get(0),
    )?;
    Ok(count)
}

impl Database {
    /// Check the sender's quota and insert a pending request in one
    /// transaction, so concurrent sends cannot overshoot the quota.
    pub fn create_request(&self, req: &NewRequest<'_>, quota: RequestQuota) -> Result<RequestOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if count_requests_since(&tx, req.from_user_id, quota.since)? >= quota.max {
                return Ok(RequestOutcome::RateLimited);
            }
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO connection_requests (id, from_user_id, to_user_id, status, created_at)
                 VALUES (?1, ?2, ?3, 'pending', ?4)",
                rusqlite::params![req.id, req.from_user_id, req.to_user_id, format_timestamp(req.created_at)],
            )?;
            tx.commit()?;
            Ok(if inserted == 1 {
                RequestOutcome::Inserted
            } else {
                RequestOutcome::Duplicate
            })
        })
    }

    /// The request between two users, whichever of them sent it.
    pub fn find_request_between(&self, user_a: &str, user_b: &str) -> Result<Option<ConnectionRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {CONNECTION_COLUMNS} FROM connection_requests
                         WHERE (from_user_id = ?1 AND to_user_id = ?2)
                            OR (from_user_id = ?2 AND to_user_id = ?1)"
                    ),
                    [user_a, user_b],
                    ConnectionRow::from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// The request sent from `from_user_id` to `to_user_id`, in that direction only.
    pub fn find_request(&self, from_user_id: &str, to_user_id: &str) -> Result<Option<ConnectionRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {CONNECTION_COLUMNS} FROM connection_requests
                         WHERE from_user_id = ?1 AND to_user_id = ?2"
                    ),
                    [from_user_id, to_user_id],
                    ConnectionRow::from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Mark a pending request accepted and add both users to each other's
    /// connections, atomically.
    pub fn accept_request(&self, request_id: &str, accepter_id: &str, requester_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE connection_requests SET status = 'accepted'
                 WHERE id = ?1 AND from_user_id = ?2 AND to_user_id = ?3 AND status = 'pending'",
                [request_id, requester_id, accepter_id],
            )?;
            if updated != 1 {
                bail!("Connection request {} is not pending", request_id);
            }
            tx.execute(
                "INSERT OR IGNORE INTO user_connections (user_id, other_id) VALUES (?1, ?2)",
                [accepter_id, requester_id],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO user_connections (user_id, other_id) VALUES (?1, ?2)",
                [requester_id, accepter_id],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Pending requests addressed to a user, oldest first.
    pub fn pending_requests_to(&self, to_user_id: &str) -> Result<Vec<ConnectionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONNECTION_COLUMNS} FROM connection_requests
                 WHERE to_user_id = ?1 AND status = 'pending'
                 ORDER BY created_at"
            ))?;
            let rows = stmt
                .query_map([to_user_id], ConnectionRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::UserSet;
    use crate::test_support::db_with_users;
    use chrono::Duration;

    const UNLIMITED: RequestQuota = RequestQuota {
        max: u32::MAX,
        since: DateTime::<Utc>::MIN_UTC,
    };

    fn request(db: &Database, id: &str, from: &str, to: &str, created_at: DateTime<Utc>) -> RequestOutcome {
        let req = NewRequest {
            id,
            from_user_id: from,
            to_user_id: to,
            created_at,
        };
        db.create_request(&req, UNLIMITED).unwrap()
    }

    #[test]
    fn one_request_per_unordered_pair() {
        let db = db_with_users(&["alice", "bob"]);
        let now = Utc::now();

        assert_eq!(request(&db, "r1", "alice", "bob", now), RequestOutcome::Inserted);
        assert_eq!(request(&db, "r2", "alice", "bob", now), RequestOutcome::Duplicate);
        assert_eq!(request(&db, "r3", "bob", "alice", now), RequestOutcome::Duplicate);

        let found = db.find_request_between("bob", "alice").unwrap().unwrap();
        assert_eq!(found.id, "r1");
        assert!(db.find_request("bob", "alice").unwrap().is_none());
    }

    #[test]
    fn quota_uses_strict_window() {
        let db = db_with_users(&["alice", "bob", "carol", "dave"]);
        let now = Utc::now();
        request(&db, "old", "alice", "bob", now - Duration::hours(25));
        request(&db, "new", "alice", "carol", now - Duration::hours(1));

        let quota = RequestQuota {
            max: 1,
            since: now - Duration::hours(24),
        };
        let req = NewRequest {
            id: "r3",
            from_user_id: "alice",
            to_user_id: "dave",
            created_at: now,
        };
        assert_eq!(db.create_request(&req, quota).unwrap(), RequestOutcome::RateLimited);
        assert!(db.find_request("alice", "dave").unwrap().is_none());

        let from_bob = NewRequest {
            id: "r4",
            from_user_id: "bob",
            to_user_id: "dave",
            created_at: now,
        };
        assert_eq!(db.create_request(&from_bob, quota).unwrap(), RequestOutcome::Inserted);
    }

    #[test]
    fn concurrent_senders_cannot_exceed_quota() {
        let targets: Vec<String> = (0..40).map(|i| format!("t{i}")).collect();
        let mut ids: Vec<&str> = targets.iter().map(String::as_str).collect();
        ids.push("sender");
        let db = db_with_users(&ids);
        let now = Utc::now();
        let quota = RequestQuota {
            max: 20,
            since: now - Duration::hours(24),
        };

        let inserted = std::thread::scope(|s| {
            let workers: Vec<_> = targets
                .iter()
                .map(|target| {
                    let db = &db;
                    s.spawn(move || {
                        let id = format!("req-{target}");
                        let req = NewRequest {
                            id: &id,
                            from_user_id: "sender",
                            to_user_id: target,
                            created_at: now,
                        };
                        db.create_request(&req, quota).unwrap()
                    })
                })
                .collect();
            workers
                .into_iter()
                .map(|w| w.join().unwrap())
                .filter(|outcome| *outcome == RequestOutcome::Inserted)
                .count()
        });

        assert_eq!(inserted, 20);
        let stored = db.with_conn(|conn| count_requests_since(conn, "sender", quota.since)).unwrap();
        assert_eq!(stored, 20);
    }

    #[test]
    fn accept_links_both_users() {
        let db = db_with_users(&["alice", "bob"]);
        request(&db, "r1", "alice", "bob", Utc::now());
        db.accept_request("r1", "bob", "alice").unwrap();

        assert_eq!(db.get_user_set("alice", UserSet::Connections).unwrap(), vec!["bob"]);
        assert_eq!(db.get_user_set("bob", UserSet::Connections).unwrap(), vec!["alice"]);
        assert_eq!(db.find_request("alice", "bob").unwrap().unwrap().status, "accepted");
        assert!(db.pending_requests_to("bob").unwrap().is_empty());
    }

    #[test]
    fn accept_twice_fails_without_side_effects() {
        let db = db_with_users(&["alice", "bob"]);
        request(&db, "r1", "alice", "bob", Utc::now());
        db.accept_request("r1", "bob", "alice").unwrap();

        assert!(db.accept_request("r1", "bob", "alice").is_err());
        assert_eq!(db.get_user_set("bob", UserSet::Connections).unwrap().len(), 1);
    }
}
