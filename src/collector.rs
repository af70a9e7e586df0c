use serde::Serialize;
use tracing::debug;

use crate::context::Exchange;
use crate::depot::Depot;
use crate::error::Result;
use crate::servant::Servant;
use crate::state::DataFile;

/// Outcome tally for one collector pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub locked: u32,
    pub gathered: u32,
    pub released: u32,
    pub unlocked: u32,
    pub deferred: u32,
}

/// Drives the state machine over a depot, one lifecycle step per file per
/// pass. All state lives in the filenames; the collector persists nothing
/// of its own, so any number of collectors may run against the same depot.
pub struct Collector<'a> {
    depot: &'a Depot,
    servant: &'a dyn Servant,
}

impl<'a> Collector<'a> {
    pub fn new(depot: &'a Depot, servant: &'a dyn Servant) -> Self {
        Self { depot, servant }
    }

    /// Advance every data file one step and tally the outcomes.
    pub fn run_pass(&self) -> Result<PassSummary> {
        let mut summary = PassSummary::default();
        let store_dir = self.depot.store_dir();

        for file in self.depot.scan()? {
            let mut exchange = Exchange::with_current(file.clone());
            match &file {
                DataFile::Unlocked(_) => file.lock(self.servant, &mut exchange)?,
                DataFile::Locked(_) => file.gather(self.servant, &store_dir, &mut exchange)?,
                DataFile::Gathered(_) => file.release(self.servant, &mut exchange)?,
                DataFile::Released(_) => file.unlock(self.servant, &mut exchange)?,
                // classify never yields the sentinel
                DataFile::AwaitingRetry(_) => continue,
            }

            if matches!(exchange.current(), Some(DataFile::AwaitingRetry(_))) {
                summary.deferred += 1;
                continue;
            }
            match &file {
                DataFile::Unlocked(_) => summary.locked += 1,
                DataFile::Locked(_) => summary.gathered += 1,
                DataFile::Gathered(_) => summary.released += 1,
                DataFile::Released(_) => summary.unlocked += 1,
                DataFile::AwaitingRetry(_) => {}
            }
        }

        debug!(?summary, "collector pass complete");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use tempfile::tempdir;

    use crate::name::Tracking;
    use crate::servant::FsServant;

    #[test]
    fn four_passes_retire_a_checked_in_body() {
        let dir = tempdir().unwrap();
        let depot = Depot::init(dir.path()).unwrap();
        let body = dir.path().join("body.xml");
        fs::write(&body, "<order/>").unwrap();

        let file = depot.check_in(&body, Tracking::Check, false).unwrap();
        let capture_date = file.name().fields().capture_date.clone();
        let base = file.name().fields().unlocked_base();
        let token = file.name().token();

        let servant = FsServant::new(depot.ledger().unwrap());
        let collector = Collector::new(&depot, &servant);

        assert_eq!(
            collector.run_pass().unwrap(),
            PassSummary {
                locked: 1,
                ..PassSummary::default()
            }
        );
        assert_eq!(
            collector.run_pass().unwrap(),
            PassSummary {
                gathered: 1,
                ..PassSummary::default()
            }
        );
        assert_eq!(
            collector.run_pass().unwrap(),
            PassSummary {
                released: 1,
                ..PassSummary::default()
            }
        );
        assert_eq!(
            collector.run_pass().unwrap(),
            PassSummary {
                unlocked: 1,
                ..PassSummary::default()
            }
        );

        // Local file retired, central copy durable, claim row gone.
        assert_eq!(depot.scan().unwrap().len(), 0);
        let central = depot.store_dir().join(&capture_date).join(&base);
        assert_eq!(fs::read_to_string(&central).unwrap(), "<order/>");
        assert!(!depot.ledger().unwrap().contains(&token).unwrap());
    }

    #[test]
    fn empty_depot_yields_an_empty_summary() {
        let dir = tempdir().unwrap();
        let depot = Depot::init(dir.path()).unwrap();
        let servant = FsServant::new(depot.ledger().unwrap());

        let summary = Collector::new(&depot, &servant).run_pass().unwrap();
        assert_eq!(summary, PassSummary::default());
    }
}
