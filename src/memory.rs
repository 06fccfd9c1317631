//! In-memory back-end engine
//!
//! A small reference implementation of the [`Backend`] traits: three
//! path-keyed stores with session-buffered edits, enough engine for
//! integration tests and for embedders that have no real datastore
//! engine yet. Reads understand the instance-path subset the filter
//! compiler emits (subtree `//.`, module wildcards, key and
//! sibling-leaf predicates); `config-only` filtering is left to real
//! engines, which know config flags.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::backend::{
    Backend, BackendCode, BackendError, BackendItem, BackendResult, BackendSession,
};
use crate::protocol::{Datastore, SessionOptions};
use crate::tree::{PathSegment, parse_path};
use crate::value::DsValue;

#[derive(Debug, Clone)]
struct StoredItem {
    value: DsValue,
    dflt: bool,
}

/// Sorted path→value map; the ordering yields parents before children
type Store = BTreeMap<String, StoredItem>;

/// Shared engine state behind one connection
#[derive(Debug, Default)]
struct Stores {
    by_ds: HashMap<Datastore, Store>,
}

impl Stores {
    fn get(&self, ds: Datastore) -> Store {
        self.by_ds.get(&ds).cloned().unwrap_or_default()
    }
}

/// In-memory engine connection
#[derive(Clone, Default)]
pub struct MemoryBackend {
    shared: Arc<Mutex<Stores>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the running datastore (and mirror it into candidate, the
    /// state of a freshly synchronized engine)
    pub fn seed_running(&self, items: Vec<BackendItem>) {
        let mut shared = self.shared.lock().expect("engine store poisoned");
        let store: Store = items
            .into_iter()
            .map(|item| {
                (
                    item.path,
                    StoredItem {
                        value: item.value,
                        dflt: item.dflt,
                    },
                )
            })
            .collect();
        shared.by_ds.insert(Datastore::Candidate, store.clone());
        shared.by_ds.insert(Datastore::Running, store);
    }

    /// Current contents of a datastore, in tree order
    pub fn items(&self, ds: Datastore) -> Vec<BackendItem> {
        let shared = self.shared.lock().expect("engine store poisoned");
        shared
            .get(ds)
            .iter()
            .map(|(path, item)| BackendItem {
                path: path.clone(),
                value: item.value.clone(),
                dflt: item.dflt,
            })
            .collect()
    }
}

impl Backend for MemoryBackend {
    fn session_start(
        &self,
        ds: Datastore,
        opts: SessionOptions,
    ) -> BackendResult<Box<dyn BackendSession>> {
        let working = self.shared.lock().expect("engine store poisoned").get(ds);
        Ok(Box::new(MemorySession {
            shared: Arc::clone(&self.shared),
            ds,
            _opts: opts,
            working,
        }))
    }
}

/// One session's buffered view of the engine
struct MemorySession {
    shared: Arc<Mutex<Stores>>,
    ds: Datastore,
    _opts: SessionOptions,
    working: Store,
}

impl MemorySession {
    /// Ancestor paths get marker entries so subtree reads stay complete
    fn ensure_ancestors(&mut self, path: &str) -> BackendResult<()> {
        let segments = parse_segments(path)?;
        for depth in 1..segments.len() {
            let prefix = join_segments(&segments[..depth]);
            self.working.entry(prefix).or_insert_with(|| StoredItem {
                value: marker_for_path(&segments[depth - 1]),
                dflt: false,
            });
        }
        Ok(())
    }
}

fn parse_segments(path: &str) -> BackendResult<Vec<PathSegment>> {
    parse_path(path).map_err(|e| BackendError::new(BackendCode::Other, e.to_string()))
}

fn join_segments(segments: &[PathSegment]) -> String {
    let mut buf = String::new();
    for seg in segments {
        buf.push('/');
        if let Some(module) = &seg.module {
            buf.push_str(module);
            buf.push(':');
        }
        buf.push_str(&seg.name);
        for (key, value) in &seg.predicates {
            buf.push('[');
            buf.push_str(key);
            buf.push_str("='");
            buf.push_str(value);
            buf.push_str("']");
        }
    }
    buf
}

fn marker_for_path(seg: &PathSegment) -> DsValue {
    if seg.predicates.is_empty() {
        DsValue::Container { presence: false }
    } else {
        DsValue::List
    }
}

/// Does a stored path fall under a deleted subtree root?
fn under_subtree(stored: &str, root: &str) -> bool {
    stored == root
        || stored
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/') || rest.starts_with('['))
}

impl BackendSession for MemorySession {
    fn switch_ds(&mut self, ds: Datastore) -> BackendResult<()> {
        self.ds = ds;
        self.working = self.shared.lock().expect("engine store poisoned").get(ds);
        Ok(())
    }

    fn set_options(&mut self, opts: SessionOptions) -> BackendResult<()> {
        self._opts = opts;
        Ok(())
    }

    fn refresh(&mut self) -> BackendResult<()> {
        self.working = self
            .shared
            .lock()
            .expect("engine store poisoned")
            .get(self.ds);
        Ok(())
    }

    fn get_items(&mut self, xpath: &str) -> BackendResult<Vec<BackendItem>> {
        let query = Query::parse(xpath)?;
        Ok(self
            .working
            .iter()
            .filter(|(path, _)| query.matches(path, &self.working))
            .map(|(path, item)| BackendItem {
                path: path.clone(),
                value: item.value.clone(),
                dflt: item.dflt,
            })
            .collect())
    }

    fn set_item(
        &mut self,
        xpath: &str,
        value: Option<&DsValue>,
        strict: bool,
    ) -> BackendResult<()> {
        if strict && self.working.contains_key(xpath) {
            return Err(BackendError::new(
                BackendCode::DataExists,
                format!("item '{xpath}' already exists"),
            ));
        }
        self.ensure_ancestors(xpath)?;
        let value = match value {
            Some(v) => v.clone(),
            None => {
                let segments = parse_segments(xpath)?;
                marker_for_path(segments.last().ok_or_else(|| {
                    BackendError::new(BackendCode::Other, "empty path".to_string())
                })?)
            }
        };
        self.working
            .insert(xpath.to_string(), StoredItem { value, dflt: false });
        Ok(())
    }

    fn delete_item(&mut self, xpath: &str, strict: bool) -> BackendResult<()> {
        let before = self.working.len();
        self.working.retain(|path, _| !under_subtree(path, xpath));
        if strict && self.working.len() == before {
            return Err(BackendError::new(
                BackendCode::DataMissing,
                format!("item '{xpath}' does not exist"),
            ));
        }
        Ok(())
    }

    fn validate(&mut self) -> BackendResult<()> {
        Ok(())
    }

    fn commit(&mut self) -> BackendResult<()> {
        let mut shared = self.shared.lock().expect("engine store poisoned");
        shared.by_ds.insert(self.ds, self.working.clone());
        if self.ds == Datastore::Candidate {
            // a committed candidate folds into running
            shared.by_ds.insert(Datastore::Running, self.working.clone());
        }
        Ok(())
    }

    fn discard_changes(&mut self) -> BackendResult<()> {
        self.refresh()
    }

    fn check_exec_permission(&mut self, _xpath: &str) -> BackendResult<bool> {
        Ok(true)
    }
}

/// Parsed read query: an optional subtree suffix over a segment chain
/// with key, sibling-leaf and module-wildcard matching
struct Query {
    segments: Vec<PathSegment>,
    /// `//.` suffix: match the node and its whole subtree
    subtree: bool,
    /// `/<module>:*` form: every top-level node of the module
    module_wildcard: Option<String>,
}

impl Query {
    fn parse(xpath: &str) -> BackendResult<Self> {
        let (head, subtree) = match xpath.strip_suffix("//.") {
            Some(head) => (head, true),
            None => (xpath, false),
        };
        if let Some(module) = head.strip_prefix('/').and_then(|h| h.strip_suffix(":*")) {
            return Ok(Self {
                segments: Vec::new(),
                subtree: true,
                module_wildcard: Some(module.to_string()),
            });
        }
        Ok(Self {
            segments: parse_segments(head)?,
            subtree,
            module_wildcard: None,
        })
    }

    fn matches(&self, stored_path: &str, store: &Store) -> bool {
        if let Some(module) = &self.module_wildcard {
            return stored_path
                .strip_prefix('/')
                .and_then(|p| p.strip_prefix(module.as_str()))
                .is_some_and(|p| p.starts_with(':'));
        }

        let Ok(stored) = parse_segments(stored_path) else {
            return false;
        };
        if stored.len() < self.segments.len() || (!self.subtree && stored.len() != self.segments.len())
        {
            return false;
        }

        let mut query_module: Option<&str> = None;
        let mut stored_module: Option<&str> = None;
        for (depth, (qseg, sseg)) in self.segments.iter().zip(&stored).enumerate() {
            query_module = qseg.module.as_deref().or(query_module);
            stored_module = sseg.module.as_deref().or(stored_module);
            if qseg.name != sseg.name || query_module != stored_module {
                return false;
            }
            for (key, expected) in qseg.key_predicates() {
                let embedded = sseg
                    .key_predicates()
                    .any(|(k, v)| k == key && v == expected);
                if embedded {
                    continue;
                }
                // content match on a non-key sibling leaf
                let sibling = format!("{}/{key}", join_segments(&stored[..=depth]));
                let holds = store.get(&sibling).is_some_and(|item| {
                    item.value.canonical().as_deref() == Some(expected)
                });
                if !holds {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(path: &str, value: DsValue) -> BackendItem {
        BackendItem {
            path: path.to_string(),
            value,
            dflt: false,
        }
    }

    fn seeded() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.seed_running(vec![
            item(
                "/ietf-interfaces:interfaces",
                DsValue::Container { presence: false },
            ),
            item(
                "/ietf-interfaces:interfaces/interface[name='eth0']",
                DsValue::List,
            ),
            item(
                "/ietf-interfaces:interfaces/interface[name='eth0']/name",
                DsValue::String("eth0".into()),
            ),
            item(
                "/ietf-interfaces:interfaces/interface[name='eth0']/mtu",
                DsValue::Uint16(1500),
            ),
        ]);
        backend
    }

    #[test]
    fn test_subtree_read() {
        let backend = seeded();
        let mut session = backend
            .session_start(Datastore::Running, SessionOptions::default())
            .unwrap();

        let items = session
            .get_items("/ietf-interfaces:interfaces//.")
            .unwrap();
        assert_eq!(items.len(), 4);
        // tree order: parents first
        assert_eq!(items[0].path, "/ietf-interfaces:interfaces");
    }

    #[test]
    fn test_predicate_read() {
        let backend = seeded();
        let mut session = backend
            .session_start(Datastore::Running, SessionOptions::default())
            .unwrap();

        let items = session
            .get_items("/ietf-interfaces:interfaces/interface[name='eth0']/mtu//.")
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].value, DsValue::Uint16(1500));

        let none = session
            .get_items("/ietf-interfaces:interfaces/interface[name='eth9']/mtu//.")
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_strict_set_and_delete() {
        let backend = seeded();
        let mut session = backend
            .session_start(Datastore::Running, SessionOptions::default())
            .unwrap();

        let path = "/ietf-interfaces:interfaces/interface[name='eth0']/mtu";
        let err = session
            .set_item(path, Some(&DsValue::Uint16(9000)), true)
            .unwrap_err();
        assert_eq!(err.code, BackendCode::DataExists);

        let err = session
            .delete_item("/ietf-interfaces:interfaces/interface[name='eth9']", true)
            .unwrap_err();
        assert_eq!(err.code, BackendCode::DataMissing);

        session
            .delete_item("/ietf-interfaces:interfaces/interface[name='eth0']", false)
            .unwrap();
        assert!(
            session
                .get_items("/ietf-interfaces:interfaces/interface[name='eth0']//.")
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_buffered_until_commit() {
        let backend = seeded();
        let mut session = backend
            .session_start(Datastore::Running, SessionOptions::default())
            .unwrap();

        let path = "/ietf-interfaces:interfaces/interface[name='eth0']/mtu";
        session
            .set_item(path, Some(&DsValue::Uint16(9000)), false)
            .unwrap();
        // not visible to the connection before commit
        assert!(
            backend
                .items(Datastore::Running)
                .iter()
                .all(|i| i.value != DsValue::Uint16(9000))
        );

        session.commit().unwrap();
        assert!(
            backend
                .items(Datastore::Running)
                .iter()
                .any(|i| i.value == DsValue::Uint16(9000))
        );
    }

    #[test]
    fn test_candidate_commit_folds_into_running() {
        let backend = seeded();
        let mut session = backend
            .session_start(Datastore::Candidate, SessionOptions::default())
            .unwrap();

        session
            .set_item(
                "/ietf-interfaces:interfaces/interface[name='eth0']/mtu",
                Some(&DsValue::Uint16(1280)),
                false,
            )
            .unwrap();
        session.commit().unwrap();

        assert!(
            backend
                .items(Datastore::Running)
                .iter()
                .any(|i| i.value == DsValue::Uint16(1280))
        );
    }

    #[test]
    fn test_discard_restores_shared_view() {
        let backend = seeded();
        let mut session = backend
            .session_start(Datastore::Candidate, SessionOptions::default())
            .unwrap();

        session
            .delete_item("/ietf-interfaces:interfaces", false)
            .unwrap();
        session.discard_changes().unwrap();

        let items = session
            .get_items("/ietf-interfaces:interfaces//.")
            .unwrap();
        assert_eq!(items.len(), 4);
    }

    #[test]
    fn test_set_creates_ancestor_markers() {
        let backend = MemoryBackend::new();
        let mut session = backend
            .session_start(Datastore::Running, SessionOptions::default())
            .unwrap();

        session
            .set_item(
                "/ietf-interfaces:interfaces/interface[name='eth1']/mtu",
                Some(&DsValue::Uint16(1400)),
                false,
            )
            .unwrap();

        let items = session
            .get_items("/ietf-interfaces:interfaces//.")
            .unwrap();
        let paths: Vec<&str> = items.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/ietf-interfaces:interfaces",
                "/ietf-interfaces:interfaces/interface[name='eth1']",
                "/ietf-interfaces:interfaces/interface[name='eth1']/mtu",
            ]
        );
        assert_eq!(items[1].value, DsValue::List);
    }
}
