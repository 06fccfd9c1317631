//! Per-NETCONF-session state
//!
//! Each NETCONF session owns exactly one back-end session for its
//! whole lifetime. The record tracks which datastore and options that
//! back-end session currently has, so the dispatcher can switch lazily,
//! and whether this session has uncommitted candidate edits.

use crate::backend::{Backend, BackendSession};
use crate::error::Result;
use crate::protocol::{Datastore, SessionOptions};

/// One NETCONF session's server-side record
pub struct NetconfSession {
    id: u32,
    backend: Box<dyn BackendSession>,
    /// Datastore the back-end session currently points at
    ds: Datastore,
    /// Options last pushed to the back-end session
    opts: SessionOptions,
    /// This session has edited candidate without commit/discard
    candidate_changed: bool,
}

impl NetconfSession {
    /// Start the back-end session for a new NETCONF session
    pub fn start(backend: &dyn Backend, id: u32) -> Result<Self> {
        let opts = SessionOptions::default();
        let session = backend.session_start(Datastore::Running, opts)?;
        Ok(Self {
            id,
            backend: session,
            ds: Datastore::Running,
            opts,
            candidate_changed: false,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn datastore(&self) -> Datastore {
        self.ds
    }

    pub fn candidate_changed(&self) -> bool {
        self.candidate_changed
    }

    pub(crate) fn set_candidate_changed(&mut self, changed: bool) {
        self.candidate_changed = changed;
    }

    pub(crate) fn backend(&mut self) -> &mut dyn BackendSession {
        self.backend.as_mut()
    }

    /// Point the back-end session at `ds` with `opts`, if it is not
    /// there already
    pub(crate) fn ensure(&mut self, ds: Datastore, opts: SessionOptions) -> Result<()> {
        if ds != self.ds {
            log::debug!("session {} switching datastore to {ds}", self.id);
            self.backend.switch_ds(ds)?;
            self.ds = ds;
        }
        if opts != self.opts {
            self.backend.set_options(opts)?;
            self.opts = opts;
        }
        Ok(())
    }

    /// Refresh policy before a read: always refresh running/startup;
    /// refresh candidate only while this session has no local edits,
    /// to bring it in line with running without dropping anything
    pub(crate) fn refresh_for_read(&mut self) -> Result<()> {
        if self.ds != Datastore::Candidate || !self.candidate_changed {
            self.backend.refresh()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for NetconfSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetconfSession")
            .field("id", &self.id)
            .field("ds", &self.ds)
            .field("opts", &self.opts)
            .field("candidate_changed", &self.candidate_changed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;

    #[test]
    fn test_lazy_switch_records_datastore() {
        let backend = MemoryBackend::new();
        let mut session = NetconfSession::start(&backend, 1).unwrap();
        assert_eq!(session.datastore(), Datastore::Running);

        session
            .ensure(Datastore::Candidate, SessionOptions::CONFIG_ONLY)
            .unwrap();
        assert_eq!(session.datastore(), Datastore::Candidate);

        // idempotent: a second ensure is a no-op
        session
            .ensure(Datastore::Candidate, SessionOptions::CONFIG_ONLY)
            .unwrap();
        assert_eq!(session.datastore(), Datastore::Candidate);
    }
}
