//! Global datastore lock table
//!
//! NETCONF-level locks: one holder per datastore, plus the candidate
//! dirty-bit registry. The dirty bits live here rather than only in the
//! per-session records so that `lock candidate` can check divergence
//! authoritatively without inspecting every session.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::error::{NetconfError, Result};
use crate::protocol::Datastore;

#[derive(Debug, Default)]
struct LockState {
    /// datastore -> session id of the NETCONF-level lock holder
    holders: HashMap<Datastore, u32>,
    /// sessions with uncommitted candidate edits
    candidate_dirty: HashSet<u32>,
}

/// Mutex-guarded lock table shared by every session worker
#[derive(Debug, Default)]
pub struct LockManager {
    state: Mutex<LockState>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the NETCONF-level lock on `ds` for session `sid`
    ///
    /// `lock candidate` is refused while any session has uncommitted
    /// candidate edits (RFC 6241 §8.3.5.2).
    pub fn lock(&self, ds: Datastore, sid: u32) -> Result<()> {
        let mut state = self.state.lock().expect("lock table poisoned");
        if let Some(&holder) = state.holders.get(&ds) {
            return Err(NetconfError::LockDenied(format!(
                "{ds} is locked by session {holder}"
            )));
        }
        if ds == Datastore::Candidate && !state.candidate_dirty.is_empty() {
            return Err(NetconfError::LockDenied(
                "candidate differs from running".to_string(),
            ));
        }
        log::debug!("locking {ds} for session {sid}");
        state.holders.insert(ds, sid);
        Ok(())
    }

    /// Release the lock on `ds`, held by session `sid`
    pub fn unlock(&self, ds: Datastore, sid: u32) -> Result<()> {
        let mut state = self.state.lock().expect("lock table poisoned");
        match state.holders.get(&ds) {
            Some(&holder) if holder == sid => {
                log::debug!("unlocking {ds} held by session {sid}");
                state.holders.remove(&ds);
                Ok(())
            }
            Some(&holder) => Err(NetconfError::LockDenied(format!(
                "{ds} is locked by session {holder}"
            ))),
            None => Err(NetconfError::OperationFailed(format!(
                "{ds} is not locked"
            ))),
        }
    }

    /// Current lock holder of `ds`, if any
    pub fn holder(&self, ds: Datastore) -> Option<u32> {
        let state = self.state.lock().expect("lock table poisoned");
        state.holders.get(&ds).copied()
    }

    /// Record that `sid` has uncommitted candidate edits
    pub fn mark_candidate_dirty(&self, sid: u32) {
        let mut state = self.state.lock().expect("lock table poisoned");
        state.candidate_dirty.insert(sid);
    }

    /// Clear `sid`'s candidate dirty bit (discard or session close)
    pub fn clear_candidate_dirty(&self, sid: u32) {
        let mut state = self.state.lock().expect("lock table poisoned");
        state.candidate_dirty.remove(&sid);
    }

    /// A successful commit syncs candidate with running for everyone
    pub fn clear_all_candidate_dirty(&self) {
        let mut state = self.state.lock().expect("lock table poisoned");
        state.candidate_dirty.clear();
    }

    /// Does any session hold uncommitted candidate edits?
    pub fn candidate_dirty(&self) -> bool {
        let state = self.state.lock().expect("lock table poisoned");
        !state.candidate_dirty.is_empty()
    }

    /// Drop everything a closing session held
    pub fn session_closed(&self, sid: u32) {
        let mut state = self.state.lock().expect("lock table poisoned");
        state.holders.retain(|_, holder| *holder != sid);
        state.candidate_dirty.remove(&sid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_unlock_roundtrip() {
        let locks = LockManager::new();
        assert_eq!(locks.holder(Datastore::Running), None);

        locks.lock(Datastore::Running, 7).unwrap();
        assert_eq!(locks.holder(Datastore::Running), Some(7));

        locks.unlock(Datastore::Running, 7).unwrap();
        assert_eq!(locks.holder(Datastore::Running), None);
    }

    #[test]
    fn test_lock_conflicts() {
        let locks = LockManager::new();
        locks.lock(Datastore::Running, 1).unwrap();

        // second lock refused, even for the holder
        assert!(matches!(
            locks.lock(Datastore::Running, 1),
            Err(NetconfError::LockDenied(_))
        ));
        assert!(matches!(
            locks.lock(Datastore::Running, 2),
            Err(NetconfError::LockDenied(_))
        ));

        // unlock by a non-holder refused
        assert!(matches!(
            locks.unlock(Datastore::Running, 2),
            Err(NetconfError::LockDenied(_))
        ));
        // unlock of an unlocked datastore fails
        assert!(matches!(
            locks.unlock(Datastore::Startup, 1),
            Err(NetconfError::OperationFailed(_))
        ));
    }

    #[test]
    fn test_candidate_dirty_blocks_lock() {
        let locks = LockManager::new();
        locks.mark_candidate_dirty(3);

        assert!(matches!(
            locks.lock(Datastore::Candidate, 4),
            Err(NetconfError::LockDenied(_))
        ));
        // other datastores stay lockable
        locks.lock(Datastore::Running, 4).unwrap();

        locks.clear_all_candidate_dirty();
        locks.lock(Datastore::Candidate, 4).unwrap();
    }

    #[test]
    fn test_session_close_releases_everything() {
        let locks = LockManager::new();
        locks.lock(Datastore::Running, 9).unwrap();
        locks.lock(Datastore::Candidate, 9).unwrap();
        locks.mark_candidate_dirty(9);

        locks.session_closed(9);
        assert_eq!(locks.holder(Datastore::Running), None);
        assert_eq!(locks.holder(Datastore::Candidate), None);
        assert!(!locks.candidate_dirty());
    }
}
