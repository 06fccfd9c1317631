//! In-process state providers
//!
//! Three schema roots are served from server state instead of the
//! back-end: `ietf-yang-library` (built from the schema context),
//! `ietf-netconf-monitoring` (datastores with lock info plus the
//! advertised capabilities) and `nc-notifications` (stream list). In
//! `config-only` mode these are all state data and yield nothing.
//!
//! For namespaced serialization the three ietf modules should appear
//! in the schema context like any other module.

use crate::error::Result;
use crate::lock::LockManager;
use crate::protocol::{Datastore, WithDefaults};
use crate::schema::SchemaContext;
use crate::tree::DataTree;
use crate::value::DsValue;

/// Which provider serves a compiled filter path, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateProvider {
    YangLibrary,
    Monitoring,
    Notifications,
}

/// Route a compiled filter path to its in-process provider
pub fn route(path: &str) -> Option<StateProvider> {
    if path.starts_with("/ietf-yang-library:") {
        Some(StateProvider::YangLibrary)
    } else if path.starts_with("/ietf-netconf-monitoring:") {
        Some(StateProvider::Monitoring)
    } else if path.starts_with("/nc-notifications:") {
        Some(StateProvider::Notifications)
    } else {
        None
    }
}

/// `modules-state` of RFC 7895, one entry per context module
pub fn yang_library_data(schema: &SchemaContext) -> Result<DataTree> {
    let mut tree = DataTree::new();
    for module in schema.modules() {
        let revision = module.revision.as_deref().unwrap_or("");
        let entry = format!(
            "/ietf-yang-library:modules-state/module[name='{}'][revision='{revision}']",
            module.name
        );
        tree.add_path(schema, &entry, DsValue::List, false)?;
        tree.add_path(
            schema,
            &format!("{entry}/namespace"),
            DsValue::String(module.namespace.clone()),
            false,
        )?;
        tree.add_path(
            schema,
            &format!("{entry}/conformance-type"),
            DsValue::Enum("implement".to_string()),
            false,
        )?;
    }
    Ok(tree)
}

/// `netconf-state` of RFC 6022: datastores with NETCONF-level lock
/// holders, and the capability list
pub fn monitoring_data(
    schema: &SchemaContext,
    locks: &LockManager,
    capabilities: &[String],
) -> Result<DataTree> {
    let mut tree = DataTree::new();

    for ds in [Datastore::Running, Datastore::Startup, Datastore::Candidate] {
        let entry = format!("/ietf-netconf-monitoring:netconf-state/datastores/datastore[name='{ds}']");
        tree.add_path(schema, &entry, DsValue::List, false)?;
        if let Some(holder) = locks.holder(ds) {
            tree.add_path(
                schema,
                &format!("{entry}/locks/global-lock/locked-by-session"),
                DsValue::Uint32(holder),
                false,
            )?;
        }
    }

    for capability in capabilities {
        tree.add_path(
            schema,
            &format!(
                "/ietf-netconf-monitoring:netconf-state/capabilities/capability[.='{capability}']"
            ),
            DsValue::String(capability.clone()),
            false,
        )?;
    }

    Ok(tree)
}

/// `netconf/streams` of RFC 5277: the base NETCONF stream
pub fn notification_data(schema: &SchemaContext) -> Result<DataTree> {
    let mut tree = DataTree::new();
    let entry = "/nc-notifications:netconf/streams/stream[name='NETCONF']";
    tree.add_path(schema, entry, DsValue::List, false)?;
    tree.add_path(
        schema,
        &format!("{entry}/description"),
        DsValue::String("default NETCONF event stream".to_string()),
        false,
    )?;
    tree.add_path(
        schema,
        &format!("{entry}/replaySupport"),
        DsValue::Bool(false),
        false,
    )?;
    Ok(tree)
}

/// Build the full provider tree for one routed path
pub fn provider_data(
    provider: StateProvider,
    schema: &SchemaContext,
    locks: &LockManager,
    wd_basic: WithDefaults,
    startup: bool,
    url: bool,
) -> Result<DataTree> {
    match provider {
        StateProvider::YangLibrary => yang_library_data(schema),
        StateProvider::Monitoring => {
            let caps = crate::protocol::capabilities(startup, url, wd_basic);
            monitoring_data(schema, locks, &caps)
        }
        StateProvider::Notifications => notification_data(schema),
    }
}
