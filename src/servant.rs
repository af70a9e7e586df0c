use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;

use tracing::warn;

use crate::error::Result;
use crate::ledger::ClaimLedger;
use crate::name::ClaimToken;

/// The sole boundary to the filesystem and the claim-token ledger.
///
/// Every method reports a recoverable outcome as `Ok(false)` and reserves
/// `Err` for fatal failures, which propagate unmodified. Exactly two I/O
/// failure categories are recoverable: resource busy/in use and access
/// denied. For move, copy, and delete a vanished source also reports false:
/// the name was taken by another agent winning the rename race.
pub trait Servant {
    fn create_directory(&self, path: &Path) -> Result<bool>;
    fn copy_file(&self, src: &Path, dst: &Path) -> Result<bool>;
    fn move_file(&self, src: &Path, dst: &Path) -> Result<bool>;
    fn delete_file(&self, path: &Path) -> Result<bool>;
    fn release_token(&self, token: &ClaimToken) -> Result<bool>;

    /// Release the claim token and rename the file as one transactional
    /// unit: either both take effect or neither does.
    fn release_token_and_move(&self, token: &ClaimToken, src: &Path, dst: &Path) -> Result<bool>;
}

/// Production servant over std::fs and a rusqlite ledger.
pub struct FsServant {
    ledger: ClaimLedger,
}

impl FsServant {
    pub fn new(ledger: ClaimLedger) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &ClaimLedger {
        &self.ledger
    }
}

fn transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::PermissionDenied | ErrorKind::ResourceBusy
    )
}

impl Servant for FsServant {
    fn create_directory(&self, path: &Path) -> Result<bool> {
        match fs::create_dir_all(path) {
            Ok(()) => Ok(true),
            Err(err) if transient(&err) => {
                warn!(path = %path.display(), error = %err, "create directory deferred");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn copy_file(&self, src: &Path, dst: &Path) -> Result<bool> {
        match fs::copy(src, dst) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound || transient(&err) => {
                warn!(src = %src.display(), error = %err, "copy deferred");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn move_file(&self, src: &Path, dst: &Path) -> Result<bool> {
        match fs::rename(src, dst) {
            Ok(()) => Ok(true),
            // Source gone: another agent renamed it first.
            Err(err) if err.kind() == ErrorKind::NotFound || transient(&err) => {
                warn!(src = %src.display(), error = %err, "move deferred");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn delete_file(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound || transient(&err) => {
                warn!(path = %path.display(), error = %err, "delete deferred");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn release_token(&self, token: &ClaimToken) -> Result<bool> {
        self.ledger.release(token)
    }

    fn release_token_and_move(&self, token: &ClaimToken, src: &Path, dst: &Path) -> Result<bool> {
        let tx = self.ledger.transaction()?;
        if !ClaimLedger::release_in(&tx, token)? {
            return Ok(false);
        }
        if !self.move_file(src, dst)? {
            // Dropping the transaction rolls the delete back.
            return Ok(false);
        }
        if let Err(err) = tx.commit() {
            // The rename is already visible; restore the old name before
            // surfacing the ledger failure.
            let _ = fs::rename(dst, src);
            return Err(err.into());
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn servant() -> FsServant {
        FsServant::new(ClaimLedger::open_memory().unwrap())
    }

    fn token() -> ClaimToken {
        ClaimToken::new("20130615", "aabbccddeeff00112233445566778899")
    }

    #[test]
    fn move_file_renames_atomically() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        fs::write(&src, "body").unwrap();

        assert!(servant().move_file(&src, &dst).unwrap());
        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dst).unwrap(), "body");
    }

    #[test]
    fn move_of_vanished_source_reports_false() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("gone.txt");
        let dst = dir.path().join("b.txt");

        assert!(!servant().move_file(&src, &dst).unwrap());
        assert!(!dst.exists());
    }

    #[test]
    fn delete_of_vanished_file_reports_false() {
        let dir = tempdir().unwrap();
        assert!(!servant().delete_file(&dir.path().join("gone.txt")).unwrap());
    }

    #[test]
    fn copy_and_create_directory_round_out_the_boundary() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let nested = dir.path().join("store").join("20130615");
        fs::write(&src, "body").unwrap();

        let servant = servant();
        assert!(servant.create_directory(&nested).unwrap());
        assert!(servant.copy_file(&src, &nested.join("a.txt")).unwrap());
        assert!(src.exists());
        assert_eq!(fs::read_to_string(nested.join("a.txt")).unwrap(), "body");
    }

    #[test]
    fn release_token_and_move_commits_both_effects() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.gathered");
        let dst = dir.path().join("a.released");
        fs::write(&src, "body").unwrap();

        let servant = servant();
        servant.ledger().check_in(&token(), "ref").unwrap();

        assert!(servant.release_token_and_move(&token(), &src, &dst).unwrap());
        assert!(!servant.ledger().contains(&token()).unwrap());
        assert!(dst.exists());
        assert!(!src.exists());
    }

    #[test]
    fn release_token_and_move_without_a_claim_row_moves_nothing() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.gathered");
        let dst = dir.path().join("a.released");
        fs::write(&src, "body").unwrap();

        assert!(!servant().release_token_and_move(&token(), &src, &dst).unwrap());
        assert!(src.exists());
        assert!(!dst.exists());
    }

    #[test]
    fn release_token_and_move_rolls_back_when_the_move_fails() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("vanished.gathered");
        let dst = dir.path().join("a.released");

        let servant = servant();
        servant.ledger().check_in(&token(), "ref").unwrap();

        assert!(!servant.release_token_and_move(&token(), &src, &dst).unwrap());
        // The delete was rolled back with the failed unit.
        assert!(servant.ledger().contains(&token()).unwrap());
    }
}
