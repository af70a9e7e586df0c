use std::path::Path;

use tracing::{debug, warn};

use crate::context::Exchange;
use crate::error::{CheckroomError, Result};
use crate::name::{self, FileName, StateToken};
use crate::servant::Servant;

/// A data file in one of the five lifecycle states, identified entirely by
/// its canonical name.
///
/// Values are immutable: a transition produces a new value and publishes it
/// into the exchange; the prior value is stale the moment its file is
/// renamed or deleted. `AwaitingRetry` is a sentinel, never persisted in a
/// filename: it parks a file for the remainder of the current pass so the
/// next pass reclassifies it fresh from whatever name survives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataFile {
    Unlocked(FileName),
    Locked(FileName),
    Gathered(FileName),
    Released(FileName),
    AwaitingRetry(FileName),
}

impl DataFile {
    /// Reconstruct the state of a file from its name alone.
    ///
    /// Dispatches purely on the encoded state token, so any process on any
    /// machine can resume work by re-listing a directory. Never yields the
    /// `AwaitingRetry` sentinel.
    pub fn classify(path: &str) -> Result<Self> {
        let name = FileName::parse(path)?;
        Ok(match name.state() {
            None => Self::Unlocked(name),
            Some(StateToken::Locked) => Self::Locked(name),
            Some(StateToken::Gathered) => Self::Gathered(name),
            Some(StateToken::Released) => Self::Released(name),
        })
    }

    pub fn unlocked(path: &str) -> Result<Self> {
        Self::expecting(path, None)
    }

    pub fn locked(path: &str) -> Result<Self> {
        Self::expecting(path, Some(StateToken::Locked))
    }

    pub fn gathered(path: &str) -> Result<Self> {
        Self::expecting(path, Some(StateToken::Gathered))
    }

    pub fn released(path: &str) -> Result<Self> {
        Self::expecting(path, Some(StateToken::Released))
    }

    fn expecting(path: &str, want: Option<StateToken>) -> Result<Self> {
        let file = Self::classify(path)?;
        if file.name().state() == want {
            Ok(file)
        } else {
            Err(CheckroomError::StateMismatch {
                expected: match want {
                    None => "unlocked",
                    Some(token) => token.as_str(),
                },
                path: path.to_string(),
            })
        }
    }

    pub fn name(&self) -> &FileName {
        match self {
            Self::Unlocked(name)
            | Self::Locked(name)
            | Self::Gathered(name)
            | Self::Released(name)
            | Self::AwaitingRetry(name) => name,
        }
    }

    pub fn state_label(&self) -> &'static str {
        match self {
            Self::Unlocked(_) => "unlocked",
            Self::Locked(_) => "locked",
            Self::Gathered(_) => "gathered",
            Self::Released(_) => "released",
            Self::AwaitingRetry(_) => "awaiting-retry",
        }
    }

    /// Claim the file by renaming it to a fresh-timestamped `.locked` name.
    ///
    /// Legal on Unlocked files, and on Released files as a re-lock that
    /// refreshes the timestamp without changing the logical state. Rename is
    /// the only cross-agent locking primitive: when two agents race, at most
    /// one rename succeeds and the loser defers.
    pub fn lock(&self, servant: &dyn Servant, exchange: &mut Exchange) -> Result<()> {
        match self {
            Self::Unlocked(name) => self.rename_to_state(name, StateToken::Locked, servant, exchange),
            Self::Released(name) => {
                self.rename_to_state(name, StateToken::Released, servant, exchange)
            }
            Self::AwaitingRetry(name) => {
                noop("lock", name);
                Ok(())
            }
            _ => Err(self.illegal("lock")),
        }
    }

    /// Copy the body into the central claim store, then rename to
    /// `.gathered`.
    ///
    /// The copy lands under `store_root/<CaptureDate>/` beneath the file's
    /// unlocked base name. The rename comes last and is authoritative: if
    /// any step fails, the local name is unchanged and a later pass retries
    /// the whole gather.
    pub fn gather(
        &self,
        servant: &dyn Servant,
        store_root: &Path,
        exchange: &mut Exchange,
    ) -> Result<()> {
        match self {
            Self::Locked(name) => {
                let partition = store_root.join(&name.fields().capture_date);
                let target = partition.join(name.fields().unlocked_base());
                if !servant.create_directory(&partition)?
                    || !servant.copy_file(name.path(), &target)?
                {
                    warn!(path = %name, "gather did not complete; deferring to a later pass");
                    exchange.publish(Self::AwaitingRetry(name.clone()));
                    return Ok(());
                }
                self.rename_to_state(name, StateToken::Gathered, servant, exchange)
            }
            Self::Released(name) => {
                noop("gather", name);
                Ok(())
            }
            Self::AwaitingRetry(name) => {
                noop("gather", name);
                Ok(())
            }
            _ => Err(self.illegal("gather")),
        }
    }

    /// Release the claim token and rename to `.released` as one
    /// transactional unit; the filesystem and the ledger never disagree
    /// about whether the token was released.
    pub fn release(&self, servant: &dyn Servant, exchange: &mut Exchange) -> Result<()> {
        match self {
            Self::Gathered(name) => {
                let next = name::new_name_for_state(name.as_str(), StateToken::Released)?;
                if servant.release_token_and_move(&name.token(), name.path(), Path::new(&next))? {
                    exchange.publish(Self::classify(&next)?);
                } else {
                    warn!(path = %name, "claim release did not complete; deferring to a later pass");
                    exchange.publish(Self::AwaitingRetry(name.clone()));
                }
                Ok(())
            }
            Self::Released(name) => {
                noop("release", name);
                Ok(())
            }
            Self::AwaitingRetry(name) => {
                noop("release", name);
                Ok(())
            }
            _ => Err(self.illegal("release")),
        }
    }

    /// Undo the claim: a Locked file renames back to its unlocked base; a
    /// Gathered or Released file is deleted outright.
    ///
    /// A successful delete publishes nothing (there is no file left to
    /// point at), so the exchange keeps whatever it held.
    pub fn unlock(&self, servant: &dyn Servant, exchange: &mut Exchange) -> Result<()> {
        match self {
            Self::Locked(name) => {
                let next = name::unlocked_name(name.as_str())?;
                if servant.move_file(name.path(), Path::new(&next))? {
                    exchange.publish(Self::classify(&next)?);
                } else {
                    warn!(path = %name, "unlock did not complete; deferring to a later pass");
                    exchange.publish(Self::AwaitingRetry(name.clone()));
                }
                Ok(())
            }
            Self::Gathered(name) | Self::Released(name) => {
                if !servant.delete_file(name.path())? {
                    warn!(path = %name, "delete did not complete; deferring to a later pass");
                    exchange.publish(Self::AwaitingRetry(name.clone()));
                }
                Ok(())
            }
            Self::AwaitingRetry(name) => {
                noop("unlock", name);
                Ok(())
            }
            Self::Unlocked(_) => Err(self.illegal("unlock")),
        }
    }

    fn rename_to_state(
        &self,
        name: &FileName,
        next_state: StateToken,
        servant: &dyn Servant,
        exchange: &mut Exchange,
    ) -> Result<()> {
        let next = name::new_name_for_state(name.as_str(), next_state)?;
        if servant.move_file(name.path(), Path::new(&next))? {
            exchange.publish(Self::classify(&next)?);
        } else {
            warn!(path = %name, "rename did not complete; deferring to a later pass");
            exchange.publish(Self::AwaitingRetry(name.clone()));
        }
        Ok(())
    }

    fn illegal(&self, op: &'static str) -> CheckroomError {
        CheckroomError::IllegalTransition(op, self.state_label())
    }
}

fn noop(op: &str, name: &FileName) {
    debug!(path = %name, op, "operation is a no-op in this state");
}
