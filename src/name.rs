use std::fmt;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{CheckroomError, Result};

/// Width of the CaptureDate field (a `yyyyMMdd` calendar day).
pub const CAPTURE_DATE_LEN: usize = 8;
/// Width of the correlation identifier (hex characters).
pub const ID_LEN: usize = 32;
/// Width of the lock timestamp segment.
pub const LOCK_TIMESTAMP_LEN: usize = 14;
/// Lock timestamps are UTC, second precision, no separators.
pub const LOCK_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Tracking mode carried in a canonical file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Tracking {
    Check,
    Track,
}

impl Tracking {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Check => "chk",
            Self::Track => "trk",
        }
    }

    /// Render the mode segment, with the `r` response prefix when set.
    pub fn segment(self, response: bool) -> String {
        if response {
            format!("r{}", self.as_str())
        } else {
            self.as_str().to_string()
        }
    }
}

impl fmt::Display for Tracking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted lifecycle token; its absence means the file is unlocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateToken {
    Locked,
    Gathered,
    Released,
}

impl StateToken {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Gathered => "gathered",
            Self::Released => "released",
        }
    }

    // Case-sensitive: `LOCKED` is not a state token.
    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "locked" => Some(Self::Locked),
            "gathered" => Some(Self::Gathered),
            "released" => Some(Self::Released),
            _ => None,
        }
    }
}

impl fmt::Display for StateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamp-and-state pair present once a file has been claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    pub locked_at: DateTime<Utc>,
    pub state: StateToken,
}

/// Key of a claim-ledger entry, rendered `CaptureDate/Id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClaimToken {
    capture_date: String,
    id: String,
}

impl ClaimToken {
    pub fn new(capture_date: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            capture_date: capture_date.into(),
            id: id.into(),
        }
    }

    pub fn capture_date(&self) -> &str {
        &self.capture_date
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ClaimToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.capture_date, self.id)
    }
}

/// The five logical fields of a canonical data file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameFields {
    pub capture_date: String,
    pub id: String,
    pub tracking: Tracking,
    pub response: bool,
    pub lease: Option<Lease>,
}

impl NameFields {
    pub fn state(&self) -> Option<StateToken> {
        self.lease.map(|lease| lease.state)
    }

    pub fn locked_at(&self) -> Option<DateTime<Utc>> {
        self.lease.map(|lease| lease.locked_at)
    }

    pub fn token(&self) -> ClaimToken {
        ClaimToken::new(&self.capture_date, &self.id)
    }

    pub fn mode_segment(&self) -> String {
        self.tracking.segment(self.response)
    }

    /// The file name with any timestamp+state suffix stripped.
    pub fn unlocked_base(&self) -> String {
        format!("{}{}.{}", self.capture_date, self.id, self.mode_segment())
    }
}

/// A canonical path that has been validated against the grammar.
///
/// This is the shared path-bearing value every lifecycle state wraps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileName {
    path: String,
    fields: NameFields,
}

impl FileName {
    pub fn parse(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let fields = tokenize(&path)?;
        Ok(Self { path, fields })
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.path)
    }

    pub fn fields(&self) -> &NameFields {
        &self.fields
    }

    pub fn state(&self) -> Option<StateToken> {
        self.fields.state()
    }

    pub fn token(&self) -> ClaimToken {
        self.fields.token()
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl AsRef<str> for FileName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Whether `path` matches the canonical grammar. Total; never errors.
pub fn is_valid(path: &str) -> bool {
    !path.is_empty() && parse_name(split_path(path).1).is_some()
}

/// Parse a canonical path into its logical fields.
pub fn tokenize(path: &str) -> Result<NameFields> {
    if path.is_empty() {
        return Err(CheckroomError::EmptyPath);
    }
    let (_, name) = split_path(path);
    parse_name(name).ok_or_else(|| CheckroomError::UnrecognizedPath(path.to_string()))
}

/// Re-encode `path` for `state`: the unlocked base plus a fresh UTC
/// timestamp and the state token. The only way a lock timestamp is
/// refreshed or a state suffix attached.
pub fn new_name_for_state(path: &str, state: StateToken) -> Result<String> {
    new_name_for_state_at(path, state, Utc::now())
}

/// Test hook: encode with an explicit timestamp instead of the clock.
pub fn new_name_for_state_at(
    path: &str,
    state: StateToken,
    at: DateTime<Utc>,
) -> Result<String> {
    let (dir, _) = split_path(path);
    let base = tokenize(path)?.unlocked_base();
    Ok(format!(
        "{dir}{base}.{}.{state}",
        at.format(LOCK_TIMESTAMP_FORMAT)
    ))
}

/// Strip any timestamp+state suffix, preserving the directory prefix.
pub fn unlocked_name(path: &str) -> Result<String> {
    let (dir, _) = split_path(path);
    Ok(format!("{dir}{}", tokenize(path)?.unlocked_base()))
}

fn split_path(path: &str) -> (&str, &str) {
    match path.rfind(['/', '\\']) {
        Some(idx) => path.split_at(idx + 1),
        None => ("", path),
    }
}

fn parse_name(name: &str) -> Option<NameFields> {
    let segments: Vec<&str> = name.split('.').collect();
    if segments.len() != 2 && segments.len() != 4 {
        return None;
    }

    let head = segments[0];
    if head.len() != CAPTURE_DATE_LEN + ID_LEN {
        return None;
    }
    let (capture_date, id) = head.split_at(CAPTURE_DATE_LEN);
    if !capture_date.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !id.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    let (tracking, response) = parse_mode(segments[1])?;

    let lease = if segments.len() == 4 {
        Some(Lease {
            locked_at: parse_lock_timestamp(segments[2])?,
            state: StateToken::from_segment(segments[3])?,
        })
    } else {
        None
    };

    Some(NameFields {
        capture_date: capture_date.to_string(),
        id: id.to_string(),
        tracking,
        response,
        lease,
    })
}

fn parse_mode(segment: &str) -> Option<(Tracking, bool)> {
    let (response, rest) = match segment.strip_prefix('r') {
        Some(rest) => (true, rest),
        None => (false, segment),
    };
    match rest {
        "chk" => Some((Tracking::Check, response)),
        "trk" => Some((Tracking::Track, response)),
        _ => None,
    }
}

fn parse_lock_timestamp(segment: &str) -> Option<DateTime<Utc>> {
    if segment.len() != LOCK_TIMESTAMP_LEN || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDateTime::parse_from_str(segment, LOCK_TIMESTAMP_FORMAT)
        .ok()
        .map(|dt| dt.and_utc())
}
