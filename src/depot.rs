use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::error::{CheckroomError, Result};
use crate::ledger::ClaimLedger;
use crate::name::{self, ClaimToken, Tracking};
use crate::state::DataFile;

/// Root of a checkroom depot: local data files under `data/`, the central
/// claim store under `store/`, and the claim-token ledger.
#[derive(Debug)]
pub struct Depot {
    root: PathBuf,
}

impl Depot {
    /// Open an existing depot.
    pub fn open(root: &Path) -> Result<Self> {
        if !root.join("config.json").exists() {
            return Err(CheckroomError::NotInitialized);
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Initialize a new depot.
    pub fn init(root: &Path) -> Result<Self> {
        if root.join("config.json").exists() {
            return Err(CheckroomError::AlreadyInitialized);
        }

        fs::create_dir_all(root.join("data"))?;
        fs::create_dir_all(root.join("store"))?;
        fs::write(root.join("config.json"), r#"{"version": 1}"#)?;

        let depot = Self {
            root: root.to_path_buf(),
        };
        // Create the ledger file and schema up front.
        depot.ledger()?;
        Ok(depot)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn store_dir(&self) -> PathBuf {
        self.root.join("store")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.root.join("claims.db")
    }

    pub fn ledger(&self) -> Result<ClaimLedger> {
        ClaimLedger::open(&self.ledger_path())
    }

    /// Externalize a message body: copy it into `data/` under a fresh
    /// canonical name and record its claim token.
    ///
    /// The data file is written before the ledger row, so a crash in between
    /// leaves an unclaimed file rather than a dangling token.
    pub fn check_in(&self, body: &Path, tracking: Tracking, response: bool) -> Result<DataFile> {
        if !body.is_file() {
            return Err(CheckroomError::BodyNotFound(body.display().to_string()));
        }

        let capture_date = Utc::now().format("%Y%m%d").to_string();
        let id = Uuid::new_v4().simple().to_string();
        let file_name = format!("{capture_date}{id}.{}", tracking.segment(response));
        let path = self.data_dir().join(&file_name);

        fs::copy(body, &path)?;
        self.ledger()?
            .check_in(&ClaimToken::new(&capture_date, &id), &file_name)?;

        DataFile::classify(&path.to_string_lossy())
    }

    /// Classify every canonical data file, skipping anything off-grammar.
    pub fn scan(&self) -> Result<Vec<DataFile>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(self.data_dir())? {
            let entry = entry?;
            let path = entry.path().to_string_lossy().into_owned();
            if name::is_valid(&path) {
                paths.push(path);
            } else if entry.file_type()?.is_file() {
                warn!(path = %path, "skipping file with unrecognized name");
            }
        }
        paths.sort();
        paths.iter().map(|path| DataFile::classify(path)).collect()
    }
}
