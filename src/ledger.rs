use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, ErrorCode, Transaction, params};
use tracing::warn;

use crate::error::Result;
use crate::name::ClaimToken;

/// Claim-token ledger, keyed `CaptureDate/Id`.
pub struct ClaimLedger {
    conn: Connection,
}

impl ClaimLedger {
    /// Open (or create) the ledger at the given file path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA busy_timeout=5000;",
        )?;
        let ledger = Self { conn };
        ledger.create_tables()?;
        Ok(ledger)
    }

    /// Open an in-memory ledger (for tests).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA busy_timeout=5000;")?;
        let ledger = Self { conn };
        ledger.create_tables()?;
        Ok(ledger)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS claims (
                capture_date  TEXT NOT NULL,
                id            TEXT NOT NULL,
                body_ref      TEXT NOT NULL,
                checked_in_at TEXT NOT NULL,
                PRIMARY KEY (capture_date, id)
            );",
        )?;
        Ok(())
    }

    /// Record a claim for a freshly externalized body.
    pub fn check_in(&self, token: &ClaimToken, body_ref: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO claims (capture_date, id, body_ref, checked_in_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                token.capture_date(),
                token.id(),
                body_ref,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn contains(&self, token: &ClaimToken) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM claims WHERE capture_date = ?1 AND id = ?2",
            params![token.capture_date(), token.id()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Delete the claim row for `token`.
    ///
    /// True only when exactly one row was affected, so a double release is
    /// reported as false rather than silently accepted. A busy database is
    /// the ledger's one transient condition and also reports false.
    pub fn release(&self, token: &ClaimToken) -> Result<bool> {
        match self.conn.execute(
            "DELETE FROM claims WHERE capture_date = ?1 AND id = ?2",
            params![token.capture_date(), token.id()],
        ) {
            Ok(changes) => Ok(changes == 1),
            Err(err) if is_busy(&err) => {
                warn!(token = %token, error = %err, "ledger busy; release deferred");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub(crate) fn transaction(&self) -> Result<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    /// Release inside an open transaction; rolls back with it.
    pub(crate) fn release_in(tx: &Transaction<'_>, token: &ClaimToken) -> Result<bool> {
        match tx.execute(
            "DELETE FROM claims WHERE capture_date = ?1 AND id = ?2",
            params![token.capture_date(), token.id()],
        ) {
            Ok(changes) => Ok(changes == 1),
            Err(err) if is_busy(&err) => {
                warn!(token = %token, error = %err, "ledger busy; release deferred");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> ClaimToken {
        ClaimToken::new("20130615", "aabbccddeeff00112233445566778899")
    }

    #[test]
    fn check_in_then_release_affects_exactly_one_row() {
        let ledger = ClaimLedger::open_memory().unwrap();
        ledger.check_in(&token(), "20130615aabb.chk").unwrap();

        assert!(ledger.contains(&token()).unwrap());
        assert!(ledger.release(&token()).unwrap());
        assert!(!ledger.contains(&token()).unwrap());
    }

    #[test]
    fn double_release_reports_false() {
        let ledger = ClaimLedger::open_memory().unwrap();
        ledger.check_in(&token(), "ref").unwrap();

        assert!(ledger.release(&token()).unwrap());
        assert!(!ledger.release(&token()).unwrap());
    }

    #[test]
    fn release_of_unknown_token_reports_false() {
        let ledger = ClaimLedger::open_memory().unwrap();
        assert!(!ledger.release(&token()).unwrap());
    }

    #[test]
    fn release_in_rolls_back_with_the_transaction() {
        let ledger = ClaimLedger::open_memory().unwrap();
        ledger.check_in(&token(), "ref").unwrap();

        {
            let tx = ledger.transaction().unwrap();
            assert!(ClaimLedger::release_in(&tx, &token()).unwrap());
            // Dropped without commit.
        }

        assert!(ledger.contains(&token()).unwrap());
    }

    #[test]
    fn release_in_commits_with_the_transaction() {
        let ledger = ClaimLedger::open_memory().unwrap();
        ledger.check_in(&token(), "ref").unwrap();

        let tx = ledger.transaction().unwrap();
        assert!(ClaimLedger::release_in(&tx, &token()).unwrap());
        tx.commit().unwrap();

        assert!(!ledger.contains(&token()).unwrap());
    }

    #[test]
    fn opens_ledger_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("claims.db");

        let ledger = ClaimLedger::open(&path).unwrap();
        ledger.check_in(&token(), "ref").unwrap();
        drop(ledger);

        let reopened = ClaimLedger::open(&path).unwrap();
        assert!(reopened.contains(&token()).unwrap());
    }
}
