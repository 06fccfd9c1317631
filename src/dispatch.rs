//! RPC dispatch
//!
//! One entry per NETCONF operation. Each entry receives the parsed
//! request tree and the session record, orchestrates filter
//! compilation, datastore reads, edit application and lock handling,
//! and builds the reply. Every internal failure surfaces as a single
//! `rpc-error`; only `continue-on-error` edits accumulate several.

use std::sync::Arc;

use crate::backend::{Backend, BackendCode};
use crate::edit::{EditControls, EditOperation, ErrorOption, TestOption, apply_edit};
use crate::error::{NetconfError, Result};
use crate::filter::compile_filter;
use crate::lock::LockManager;
use crate::monitoring::{StateProvider, provider_data, route};
use crate::protocol::{Datastore, RpcError, RpcReply, SessionOptions, WithDefaults, capabilities};
use crate::schema::SchemaContext;
use crate::session::NetconfSession;
use crate::tree::DataTree;
use crate::with_defaults;
use crate::xml::XmlNode;

/// Hook fetching a `url` source; returns the fetched bytes parsed as a
/// `config` element
pub type UrlFetcher = dyn Fn(&str) -> Result<XmlNode> + Send + Sync;

/// What a `source`/`target` element resolved to
enum SourceTarget<'a> {
    Ds(Datastore),
    Inline(&'a XmlNode),
    Url(&'a str),
}

/// The NETCONF operations layer shared by every session worker
pub struct Server {
    schema: Arc<SchemaContext>,
    backend: Arc<dyn Backend>,
    locks: LockManager,
    wd_basic: WithDefaults,
    url_fetcher: Option<Box<UrlFetcher>>,
}

impl Server {
    pub fn new(schema: Arc<SchemaContext>, backend: Arc<dyn Backend>) -> Self {
        Self {
            schema,
            backend,
            locks: LockManager::new(),
            wd_basic: WithDefaults::ReportAll,
            url_fetcher: None,
        }
    }

    /// Configure the with-defaults basic mode advertised and applied
    /// when a request names none
    pub fn with_basic_mode(mut self, wd: WithDefaults) -> Self {
        self.wd_basic = wd;
        self
    }

    /// Enable the url capability with a fetch hook
    pub fn with_url_fetcher(mut self, fetcher: Box<UrlFetcher>) -> Self {
        self.url_fetcher = Some(fetcher);
        self
    }

    pub fn schema(&self) -> &SchemaContext {
        &self.schema
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Capability URNs for the transport's hello exchange
    pub fn capabilities(&self) -> Vec<String> {
        capabilities(
            self.backend.has_startup(),
            self.url_fetcher.is_some(),
            self.wd_basic,
        )
    }

    /// Start the server-side record (and back-end session) for a new
    /// NETCONF session
    pub fn new_session(&self, id: u32) -> Result<NetconfSession> {
        NetconfSession::start(self.backend.as_ref(), id)
    }

    /// Tear down a closing session: its locks, dirty bits and pending
    /// candidate edits go away with it
    pub fn close_session(&self, mut session: NetconfSession) {
        if session.candidate_changed() {
            let discarded = session
                .ensure(Datastore::Candidate, SessionOptions::default())
                .and_then(|()| session.backend().discard_changes().map_err(Into::into));
            if let Err(e) = discarded {
                log::warn!(
                    "session {}: discarding candidate edits on close failed: {e}",
                    session.id()
                );
            }
        }
        self.locks.session_closed(session.id());
    }

    /// Dispatch one RPC and build its reply
    pub fn handle(&self, session: &mut NetconfSession, rpc: &XmlNode) -> RpcReply {
        log::debug!("session {} rpc {}", session.id(), rpc.name);

        let result = self
            .check_exec(session, &rpc.name)
            .and_then(|()| match rpc.name.as_str() {
                "get" => self.op_get(session, rpc),
                "get-config" => self.op_get_config(session, rpc),
                "edit-config" => self.op_edit_config(session, rpc),
                "copy-config" => self.op_copy_config(session, rpc),
                "delete-config" => self.op_delete_config(session, rpc),
                "lock" => self.op_lock(session, rpc),
                "unlock" => self.op_unlock(session, rpc),
                "commit" => self.op_commit(session),
                "discard-changes" => self.op_discard_changes(session),
                "validate" => self.op_validate(session, rpc),
                other => Err(NetconfError::OperationNotSupported(format!(
                    "unknown operation '{other}'"
                ))),
            });

        match result {
            Ok(reply) => reply,
            Err(e) => {
                log::debug!("session {} rpc {} failed: {e}", session.id(), rpc.name);
                RpcReply::error(RpcError::from(&e))
            }
        }
    }

    /// Authorization hook for the operation itself
    fn check_exec(&self, session: &mut NetconfSession, op: &str) -> Result<()> {
        let path = format!("/ietf-netconf:{op}");
        match session.backend().check_exec_permission(&path) {
            Ok(true) => Ok(()),
            Ok(false) => Err(NetconfError::AccessDenied(format!(
                "execution of '{op}' is not permitted"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn op_get(&self, session: &mut NetconfSession, rpc: &XmlNode) -> Result<RpcReply> {
        // get always targets running plus state data
        self.read_reply(session, rpc, Datastore::Running, false)
    }

    fn op_get_config(&self, session: &mut NetconfSession, rpc: &XmlNode) -> Result<RpcReply> {
        let ds = match self.resolve_source_target(rpc, "source")? {
            SourceTarget::Ds(ds) => ds,
            SourceTarget::Inline(_) => {
                return Err(NetconfError::InvalidValue(
                    "get-config source must be a datastore".to_string(),
                ));
            }
            SourceTarget::Url(_) => {
                return Err(NetconfError::OperationNotSupported(
                    "url source for get-config".to_string(),
                ));
            }
        };
        self.read_reply(session, rpc, ds, true)
    }

    /// Shared implementation of `get` and `get-config`
    fn read_reply(
        &self,
        session: &mut NetconfSession,
        rpc: &XmlNode,
        ds: Datastore,
        config_only: bool,
    ) -> Result<RpcReply> {
        session.ensure(ds, SessionOptions { config_only })?;

        let wd = match rpc.child("with-defaults") {
            Some(leaf) => WithDefaults::from_leaf_value(leaf.trimmed_text()).ok_or_else(|| {
                NetconfError::InvalidValue(format!(
                    "bad with-defaults value '{}'",
                    leaf.trimmed_text()
                ))
            })?,
            None => self.wd_basic,
        };

        let filters = match rpc.child("filter") {
            Some(filter) => {
                let filters = compile_filter(&self.schema, filter)?;
                if filters.is_empty() {
                    // empty filter, fair enough
                    return Ok(RpcReply::Data(DataTree::new(), wd));
                }
                filters
            }
            None => self
                .schema
                .modules()
                .iter()
                .filter(|m| m.has_data_nodes())
                .map(|m| format!("/{}:*", m.name))
                .collect(),
        };

        session.refresh_for_read()?;

        let mut root = DataTree::new();
        let mut provider_trees: [Option<DataTree>; 3] = [None, None, None];
        for path in &filters {
            if let Some(provider) = route(path) {
                // these data live in-process and are all state data
                if config_only {
                    continue;
                }
                let slot = provider as usize;
                if provider_trees[slot].is_none() {
                    provider_trees[slot] = Some(self.provider_tree(provider)?);
                }
                if let Some(tree) = &provider_trees[slot] {
                    root.select_from(tree, path)?;
                }
                continue;
            }

            let full_xpath = format!("{path}//.");
            let items = match session.backend().get_items(&full_xpath) {
                Ok(items) => items,
                Err(e)
                    if matches!(e.code, BackendCode::NotFound | BackendCode::UnknownModel) =>
                {
                    // it's ok, model without data
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            for item in items {
                root.add_path(&self.schema, &item.path, item.value, item.dflt)?;
            }
        }

        with_defaults::apply(&mut root, &self.schema, wd, false);
        Ok(RpcReply::Data(root, wd))
    }

    fn provider_tree(&self, provider: StateProvider) -> Result<DataTree> {
        provider_data(
            provider,
            &self.schema,
            &self.locks,
            self.wd_basic,
            self.backend.has_startup(),
            self.url_fetcher.is_some(),
        )
    }

    fn op_edit_config(&self, session: &mut NetconfSession, rpc: &XmlNode) -> Result<RpcReply> {
        let ds = match self.resolve_source_target(rpc, "target")? {
            SourceTarget::Ds(ds) => ds,
            _ => {
                return Err(NetconfError::InvalidValue(
                    "edit-config target must be a datastore".to_string(),
                ));
            }
        };

        let mut controls = EditControls::default();
        if let Some(leaf) = rpc.child("default-operation") {
            controls.default_operation = EditOperation::from_default_operation(leaf.trimmed_text())
                .ok_or_else(|| bad_leaf("default-operation", leaf))?;
        }
        if let Some(leaf) = rpc.child("test-option") {
            controls.test_option = TestOption::from_leaf_value(leaf.trimmed_text())
                .ok_or_else(|| bad_leaf("test-option", leaf))?;
        }
        if let Some(leaf) = rpc.child("error-option") {
            controls.error_option = ErrorOption::from_leaf_value(leaf.trimmed_text())
                .ok_or_else(|| bad_leaf("error-option", leaf))?;
        }

        let fetched;
        let config = match rpc.child("config") {
            Some(config) => config,
            None => match rpc.child("url") {
                Some(url) => {
                    fetched = self.fetch_url(url.trimmed_text())?;
                    &fetched
                }
                None => {
                    return Err(NetconfError::InvalidValue(
                        "edit-config without config or url".to_string(),
                    ));
                }
            },
        };

        session.ensure(ds, SessionOptions::default())?;
        session.refresh_for_read()?;

        let commit_to_backend = ds != Datastore::Candidate;
        let errors = apply_edit(
            session.backend(),
            &self.schema,
            config,
            &controls,
            commit_to_backend,
        )?;
        if !errors.is_empty() {
            return Ok(RpcReply::Errors(errors));
        }

        if ds == Datastore::Candidate && controls.test_option != TestOption::TestOnly {
            session.set_candidate_changed(true);
            self.locks.mark_candidate_dirty(session.id());
        }
        Ok(RpcReply::Ok)
    }

    fn op_copy_config(&self, session: &mut NetconfSession, rpc: &XmlNode) -> Result<RpcReply> {
        let target = match self.resolve_source_target(rpc, "target")? {
            SourceTarget::Ds(ds) => ds,
            SourceTarget::Inline(_) => {
                return Err(NetconfError::InvalidValue(
                    "copy-config target must be a datastore".to_string(),
                ));
            }
            SourceTarget::Url(_) => {
                return Err(NetconfError::OperationNotSupported(
                    "url target for copy-config".to_string(),
                ));
            }
        };

        let fetched;
        let config = match self.resolve_source_target(rpc, "source")? {
            SourceTarget::Inline(config) => config,
            SourceTarget::Url(url) => {
                fetched = self.fetch_url(url)?;
                &fetched
            }
            SourceTarget::Ds(source) => {
                if source == target {
                    return Err(NetconfError::InvalidValue(
                        "copy-config source and target are the same datastore".to_string(),
                    ));
                }
                self.copy_between_datastores(session, source, target)?;
                self.finish_write(session, target);
                return Ok(RpcReply::Ok);
            }
        };

        // inline (or fetched) source: wipe the target, then replay the
        // config tree parent-before-children
        session.ensure(target, SessionOptions::default())?;
        self.wipe_datastore(session)?;
        let controls = EditControls {
            default_operation: EditOperation::Merge,
            test_option: TestOption::Set,
            error_option: ErrorOption::StopOnError,
        };
        apply_edit(
            session.backend(),
            &self.schema,
            config,
            &controls,
            target != Datastore::Candidate,
        )?;
        self.finish_write(session, target);
        Ok(RpcReply::Ok)
    }

    /// Candidate writes stay pending; everything else is committed by
    /// the back end already, so only the bookkeeping differs
    fn finish_write(&self, session: &mut NetconfSession, target: Datastore) {
        if target == Datastore::Candidate {
            session.set_candidate_changed(true);
            self.locks.mark_candidate_dirty(session.id());
        }
    }

    fn copy_between_datastores(
        &self,
        session: &mut NetconfSession,
        source: Datastore,
        target: Datastore,
    ) -> Result<()> {
        // read the source configuration in full
        session.ensure(source, SessionOptions::CONFIG_ONLY)?;
        session.refresh_for_read()?;
        let mut items = Vec::new();
        for module in self.schema.modules().iter().filter(|m| m.has_data_nodes()) {
            match session.backend().get_items(&format!("/{}:*//.", module.name)) {
                Ok(mut batch) => items.append(&mut batch),
                Err(e)
                    if matches!(e.code, BackendCode::NotFound | BackendCode::UnknownModel) => {}
                Err(e) => return Err(e.into()),
            }
        }

        // replay into the target
        session.ensure(target, SessionOptions::default())?;
        session.refresh_for_read()?;
        self.wipe_datastore(session)?;
        for item in &items {
            let value = if item.value.is_marker() {
                None
            } else {
                Some(&item.value)
            };
            session.backend().set_item(&item.path, value, false)?;
        }
        if target != Datastore::Candidate {
            session.backend().commit()?;
        }
        Ok(())
    }

    /// Delete every top-level data node the schema knows about
    fn wipe_datastore(&self, session: &mut NetconfSession) -> Result<()> {
        for module in self.schema.modules() {
            for top in &module.nodes {
                let path = format!("/{}:{}", module.name, top.name);
                match session.backend().delete_item(&path, false) {
                    Ok(())
                    | Err(crate::backend::BackendError {
                        code: BackendCode::NotFound | BackendCode::DataMissing,
                        ..
                    }) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }

    fn op_delete_config(&self, session: &mut NetconfSession, rpc: &XmlNode) -> Result<RpcReply> {
        match self.resolve_source_target(rpc, "target")? {
            SourceTarget::Ds(Datastore::Startup) => {}
            SourceTarget::Url(_) => {
                return Err(NetconfError::OperationNotSupported(
                    "url target for delete-config".to_string(),
                ));
            }
            _ => {
                return Err(NetconfError::InvalidValue(
                    "delete-config target must be startup".to_string(),
                ));
            }
        }

        session.ensure(Datastore::Startup, SessionOptions::default())?;
        self.wipe_datastore(session)?;
        session.backend().commit()?;
        Ok(RpcReply::Ok)
    }

    fn op_lock(&self, session: &mut NetconfSession, rpc: &XmlNode) -> Result<RpcReply> {
        let ds = self.lock_target(rpc)?;
        self.locks.lock(ds, session.id())?;
        Ok(RpcReply::Ok)
    }

    fn op_unlock(&self, session: &mut NetconfSession, rpc: &XmlNode) -> Result<RpcReply> {
        let ds = self.lock_target(rpc)?;
        self.locks.unlock(ds, session.id())?;

        // releasing a dirty candidate lock discards the holder's edits
        if ds == Datastore::Candidate && session.candidate_changed() {
            session.ensure(Datastore::Candidate, SessionOptions::default())?;
            session.backend().discard_changes()?;
            session.set_candidate_changed(false);
            self.locks.clear_candidate_dirty(session.id());
        }
        Ok(RpcReply::Ok)
    }

    fn lock_target(&self, rpc: &XmlNode) -> Result<Datastore> {
        match self.resolve_source_target(rpc, "target")? {
            SourceTarget::Ds(ds) => Ok(ds),
            _ => Err(NetconfError::InvalidValue(
                "lock target must be a datastore".to_string(),
            )),
        }
    }

    fn op_commit(&self, session: &mut NetconfSession) -> Result<RpcReply> {
        session.ensure(Datastore::Candidate, SessionOptions::default())?;
        session.backend().commit()?;

        session.set_candidate_changed(false);
        self.locks.clear_all_candidate_dirty();
        Ok(RpcReply::Ok)
    }

    fn op_discard_changes(&self, session: &mut NetconfSession) -> Result<RpcReply> {
        session.ensure(Datastore::Candidate, SessionOptions::default())?;
        session.backend().discard_changes()?;

        session.set_candidate_changed(false);
        self.locks.clear_candidate_dirty(session.id());
        Ok(RpcReply::Ok)
    }

    fn op_validate(&self, session: &mut NetconfSession, rpc: &XmlNode) -> Result<RpcReply> {
        let fetched;
        let ds = match self.resolve_source_target(rpc, "source")? {
            SourceTarget::Inline(config) => {
                return self.validate_inline(config);
            }
            SourceTarget::Url(url) => {
                fetched = self.fetch_url(url)?;
                return self.validate_inline(&fetched);
            }
            SourceTarget::Ds(ds) => ds,
        };

        session.ensure(ds, SessionOptions::default())?;
        session.refresh_for_read()?;
        session.backend().validate()?;
        Ok(RpcReply::Ok)
    }

    fn validate_inline(&self, config: &XmlNode) -> Result<RpcReply> {
        self.schema
            .validate_tree(config)
            .map_err(|e| NetconfError::OperationFailed(e.to_string()))?;
        Ok(RpcReply::Ok)
    }

    /// Resolve the single child of a `source`/`target` element
    fn resolve_source_target<'a>(
        &self,
        rpc: &'a XmlNode,
        which: &str,
    ) -> Result<SourceTarget<'a>> {
        let holder = rpc.child(which).ok_or_else(|| {
            NetconfError::InvalidValue(format!("{} without a {which}", rpc.name))
        })?;
        let inner = holder.children.first().ok_or_else(|| {
            NetconfError::InvalidValue(format!("empty {which} in {}", rpc.name))
        })?;

        if inner.name == "config" {
            return Ok(SourceTarget::Inline(inner));
        }
        if inner.name == "url" {
            return Ok(SourceTarget::Url(inner.trimmed_text()));
        }
        Datastore::from_element_name(&inner.name)
            .map(SourceTarget::Ds)
            .ok_or_else(|| {
                NetconfError::InvalidValue(format!("unknown datastore '{}'", inner.name))
            })
    }

    fn fetch_url(&self, url: &str) -> Result<XmlNode> {
        match &self.url_fetcher {
            Some(fetcher) => fetcher(url),
            None => Err(NetconfError::OperationNotSupported(
                "url capability is disabled".to_string(),
            )),
        }
    }
}

fn bad_leaf(what: &str, leaf: &XmlNode) -> NetconfError {
    NetconfError::InvalidValue(format!("bad {what} value '{}'", leaf.trimmed_text()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;

    const SAMPLE_CTX: &str = r#"{
        "modules": [
            {
                "name": "ietf-interfaces",
                "namespace": "urn:ietf:params:xml:ns:yang:ietf-interfaces",
                "nodes": [
                    {
                        "name": "interfaces",
                        "children": [
                            {
                                "name": "interface",
                                "kind": "list",
                                "keys": ["name"],
                                "children": [
                                    {"name": "name", "kind": "leaf", "type": "string"},
                                    {"name": "mtu", "kind": "leaf", "type": "uint16"}
                                ]
                            }
                        ]
                    }
                ]
            }
        ]
    }"#;

    fn server() -> Server {
        let schema = Arc::new(SchemaContext::from_json_str(SAMPLE_CTX).unwrap());
        Server::new(schema, Arc::new(MemoryBackend::new()))
    }

    #[test]
    fn test_unknown_operation() {
        let server = server();
        let mut session = server.new_session(1).unwrap();

        let reply = server.handle(&mut session, &XmlNode::new("kill-session"));
        let RpcReply::Errors(errors) = reply else {
            panic!("expected an error reply");
        };
        assert_eq!(
            errors[0].tag,
            crate::protocol::ErrorTag::OperationNotSupported
        );
    }

    #[test]
    fn test_url_rejected_without_fetcher() {
        let server = server();
        let mut session = server.new_session(1).unwrap();

        let rpc = XmlNode::new("edit-config")
            .with_child(XmlNode::new("target").with_child(XmlNode::new("running")))
            .with_child(XmlNode::new("url").with_text("file:///tmp/c.xml"));
        let RpcReply::Errors(errors) = server.handle(&mut session, &rpc) else {
            panic!("expected an error reply");
        };
        assert_eq!(
            errors[0].tag,
            crate::protocol::ErrorTag::OperationNotSupported
        );
    }

    #[test]
    fn test_delete_config_running_rejected() {
        let server = server();
        let mut session = server.new_session(1).unwrap();

        let rpc = XmlNode::new("delete-config")
            .with_child(XmlNode::new("target").with_child(XmlNode::new("running")));
        let RpcReply::Errors(errors) = server.handle(&mut session, &rpc) else {
            panic!("expected an error reply");
        };
        assert_eq!(errors[0].tag, crate::protocol::ErrorTag::InvalidValue);
    }

    #[test]
    fn test_capabilities_reflect_config() {
        let server = server().with_basic_mode(WithDefaults::Trim);
        let caps = server.capabilities();
        assert!(caps.iter().any(|c| c.contains("basic-mode=trim")));
        assert!(!caps.iter().any(|c| c.contains(":url:")));
    }
}
