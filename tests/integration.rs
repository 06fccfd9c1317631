//! End-to-end tests over the public API
//!
//! Drives the server the way a transport would: parsed RPC trees in,
//! replies out, with the in-memory engine as the back end.

use std::sync::Arc;

use rust_netconf::backend::BackendItem;
use rust_netconf::protocol::ErrorTag;
use rust_netconf::xml::XmlNode;
use rust_netconf::{Datastore, DsValue, MemoryBackend, RpcReply, SchemaContext, Server};

const NS_IF: &str = "urn:ietf:params:xml:ns:yang:ietf-interfaces";

const CONTEXT: &str = r#"{
    "modules": [
        {
            "name": "ietf-interfaces",
            "namespace": "urn:ietf:params:xml:ns:yang:ietf-interfaces",
            "revision": "2018-02-20",
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
                                {"name": "mtu", "kind": "leaf", "type": "uint16", "type-default": "1500"},
                                {"name": "enabled", "kind": "leaf", "type": "boolean", "default": "true"}
                            ]
                        }
                    ]
                }
            ]
        }
    ]
}"#;

fn item(path: &str, value: DsValue) -> BackendItem {
    BackendItem {
        path: path.to_string(),
        value,
        dflt: false,
    }
}

fn seeded_server() -> (Server, MemoryBackend) {
    let schema = Arc::new(SchemaContext::from_json_str(CONTEXT).expect("context parses"));
    let backend = MemoryBackend::new();
    let entry = "/ietf-interfaces:interfaces/interface[name='eth0']";
    backend.seed_running(vec![
        item(
            "/ietf-interfaces:interfaces",
            DsValue::Container { presence: false },
        ),
        item(entry, DsValue::List),
        item(&format!("{entry}/name"), DsValue::String("eth0".into())),
        item(&format!("{entry}/mtu"), DsValue::Uint16(1500)),
    ]);
    let server = Server::new(schema, Arc::new(backend.clone()));
    (server, backend)
}

fn datastore_elem(name: &str) -> XmlNode {
    XmlNode::new(name)
}

fn get_config(source: &str, filter: Option<XmlNode>) -> XmlNode {
    let mut rpc = XmlNode::new("get-config")
        .with_child(XmlNode::new("source").with_child(datastore_elem(source)));
    if let Some(filter) = filter {
        rpc = rpc.with_child(filter);
    }
    rpc
}

fn subtree_filter(children: Vec<XmlNode>) -> XmlNode {
    let mut filter = XmlNode::new("filter").with_attr("type", "subtree");
    filter.children = children;
    filter
}

fn edit_config(target: &str, config: XmlNode) -> XmlNode {
    XmlNode::new("edit-config")
        .with_child(XmlNode::new("target").with_child(datastore_elem(target)))
        .with_child(config)
}

fn expect_data(reply: RpcReply) -> rust_netconf::tree::DataTree {
    match reply {
        RpcReply::Data(tree, _) => tree,
        other => panic!("expected a data reply, got {other:?}"),
    }
}

fn expect_single_error(reply: RpcReply) -> rust_netconf::protocol::RpcError {
    match reply {
        RpcReply::Errors(mut errors) => {
            assert_eq!(errors.len(), 1, "expected exactly one rpc-error");
            errors.remove(0)
        }
        other => panic!("expected an error reply, got {other:?}"),
    }
}

#[test]
fn s1_get_config_with_subtree_filter() {
    let (server, _backend) = seeded_server();
    let mut session = server.new_session(1).expect("session starts");

    let rpc = get_config(
        "running",
        Some(subtree_filter(vec![XmlNode::in_ns("interfaces", NS_IF)])),
    );
    let tree = expect_data(server.handle(&mut session, &rpc));

    // every interface leaf the back end returned for that path
    let interfaces = &tree.roots[0];
    assert_eq!(interfaces.name, "interfaces");
    let entry = &interfaces.children[0];
    assert_eq!(entry.keys, vec![("name".to_string(), "eth0".to_string())]);
    assert_eq!(
        entry.child("name").unwrap().value,
        DsValue::String("eth0".into())
    );
    assert_eq!(entry.child("mtu").unwrap().value, DsValue::Uint16(1500));
}

#[test]
fn s2_copy_config_inline_to_running() {
    let (server, backend) = seeded_server();
    let mut session = server.new_session(1).expect("session starts");

    let config = XmlNode::new("config").with_child(
        XmlNode::in_ns("interfaces", NS_IF).with_child(
            XmlNode::new("interface")
                .with_child(XmlNode::new("name").with_text("iface1/1"))
                .with_child(XmlNode::new("mtu").with_text("1400")),
        ),
    );
    let rpc = XmlNode::new("copy-config")
        .with_child(XmlNode::new("target").with_child(datastore_elem("running")))
        .with_child(XmlNode::new("source").with_child(config));

    let reply = server.handle(&mut session, &rpc);
    assert!(reply.is_ok(), "copy-config failed: {reply:?}");

    // existing content replaced by the new entry and its leaves
    let paths: Vec<String> = backend
        .items(Datastore::Running)
        .into_iter()
        .map(|i| i.path)
        .collect();
    let entry = "/ietf-interfaces:interfaces/interface[name='iface1/1']";
    assert!(paths.contains(&entry.to_string()));
    assert!(paths.contains(&format!("{entry}/name")));
    assert!(paths.contains(&format!("{entry}/mtu")));
    assert!(
        !paths.iter().any(|p| p.contains("eth0")),
        "old content must be gone, got {paths:?}"
    );
}

#[test]
fn s3_edit_config_create_on_existing() {
    let (server, backend) = seeded_server();
    let mut session = server.new_session(1).expect("session starts");

    let config = XmlNode::new("config").with_child(
        XmlNode::in_ns("interfaces", NS_IF).with_child(
            XmlNode::new("interface")
                .with_attr("operation", "create")
                .with_child(XmlNode::new("name").with_text("eth0")),
        ),
    );
    let error = expect_single_error(server.handle(&mut session, &edit_config("running", config)));
    assert_eq!(error.tag, ErrorTag::DataExists);

    // no back-end mutation
    let mtu = backend
        .items(Datastore::Running)
        .into_iter()
        .find(|i| i.path.ends_with("/mtu"))
        .expect("mtu still present");
    assert_eq!(mtu.value, DsValue::Uint16(1500));
}

#[test]
fn s4_lock_candidate_when_dirty() {
    let (server, _backend) = seeded_server();
    let mut session_a = server.new_session(1).expect("session starts");
    let mut session_b = server.new_session(2).expect("session starts");

    // session A edits candidate
    let config = XmlNode::new("config").with_child(
        XmlNode::in_ns("interfaces", NS_IF).with_child(
            XmlNode::new("interface")
                .with_child(XmlNode::new("name").with_text("eth0"))
                .with_child(XmlNode::new("mtu").with_text("1280")),
        ),
    );
    let reply = server.handle(&mut session_a, &edit_config("candidate", config));
    assert!(reply.is_ok(), "candidate edit failed: {reply:?}");

    // session B tries to lock candidate
    let lock = XmlNode::new("lock")
        .with_child(XmlNode::new("target").with_child(datastore_elem("candidate")));
    let error = expect_single_error(server.handle(&mut session_b, &lock));
    assert_eq!(error.tag, ErrorTag::LockDenied);
}

#[test]
fn s5_validate_inline_invalid_config() {
    let (server, _backend) = seeded_server();
    let mut session = server.new_session(1).expect("session starts");

    let config = XmlNode::new("config").with_child(
        XmlNode::in_ns("interfaces", NS_IF).with_child(
            XmlNode::new("interface")
                .with_child(XmlNode::new("name").with_text("eth0"))
                .with_child(XmlNode::new("no-such-leaf").with_text("x")),
        ),
    );
    let rpc = XmlNode::new("validate")
        .with_child(XmlNode::new("source").with_child(config));

    let error = expect_single_error(server.handle(&mut session, &rpc));
    assert_eq!(error.tag, ErrorTag::OperationFailed);
    assert!(
        error.message.contains("no-such-leaf"),
        "carries the schema message: {}",
        error.message
    );
}

#[test]
fn s6_get_with_defaults_trim() {
    let (server, _backend) = seeded_server();
    let mut session = server.new_session(1).expect("session starts");

    // mtu 1500 is the schema default and must be trimmed
    let mut rpc = XmlNode::new("get");
    rpc.children.push(subtree_filter(vec![XmlNode::in_ns(
        "interfaces",
        NS_IF,
    )]));
    rpc.children
        .push(XmlNode::new("with-defaults").with_text("trim"));

    let tree = expect_data(server.handle(&mut session, &rpc));
    let entry = &tree.roots[0].children[0];
    assert!(entry.child("mtu").is_none(), "default mtu must be trimmed");
    assert!(entry.child("name").is_some());
}

#[test]
fn candidate_commit_reaches_running() {
    let (server, backend) = seeded_server();
    let mut session = server.new_session(1).expect("session starts");

    let config = XmlNode::new("config").with_child(
        XmlNode::in_ns("interfaces", NS_IF).with_child(
            XmlNode::new("interface")
                .with_child(XmlNode::new("name").with_text("eth0"))
                .with_child(XmlNode::new("mtu").with_text("9000")),
        ),
    );
    let reply = server.handle(&mut session, &edit_config("candidate", config));
    assert!(reply.is_ok());

    // nothing in running yet
    assert!(
        backend
            .items(Datastore::Running)
            .iter()
            .all(|i| i.value != DsValue::Uint16(9000))
    );

    let reply = server.handle(&mut session, &XmlNode::new("commit"));
    assert!(reply.is_ok(), "commit failed: {reply:?}");
    assert!(
        backend
            .items(Datastore::Running)
            .iter()
            .any(|i| i.value == DsValue::Uint16(9000))
    );

    // candidate is clean again, locking works
    let lock = XmlNode::new("lock")
        .with_child(XmlNode::new("target").with_child(datastore_elem("candidate")));
    assert!(server.handle(&mut session, &lock).is_ok());
}

#[test]
fn discard_changes_clears_dirty_state() {
    let (server, backend) = seeded_server();
    let mut session_a = server.new_session(1).expect("session starts");
    let mut session_b = server.new_session(2).expect("session starts");

    let config = XmlNode::new("config").with_child(
        XmlNode::in_ns("interfaces", NS_IF).with_child(
            XmlNode::new("interface")
                .with_child(XmlNode::new("name").with_text("eth0"))
                .with_child(XmlNode::new("mtu").with_text("1280")),
        ),
    );
    let reply = server.handle(&mut session_a, &edit_config("candidate", config));
    assert!(reply.is_ok());

    let reply = server.handle(&mut session_a, &XmlNode::new("discard-changes"));
    assert!(reply.is_ok());

    // edits are gone and candidate is lockable again
    assert!(
        backend
            .items(Datastore::Running)
            .iter()
            .all(|i| i.value != DsValue::Uint16(1280))
    );
    let lock = XmlNode::new("lock")
        .with_child(XmlNode::new("target").with_child(datastore_elem("candidate")));
    assert!(server.handle(&mut session_b, &lock).is_ok());
}

#[test]
fn unlock_candidate_discards_holder_edits() {
    let (server, backend) = seeded_server();
    let mut session = server.new_session(1).expect("session starts");

    // lock first (candidate clean), then edit under the lock
    let lock = XmlNode::new("lock")
        .with_child(XmlNode::new("target").with_child(datastore_elem("candidate")));
    assert!(server.handle(&mut session, &lock).is_ok());

    let config = XmlNode::new("config").with_child(
        XmlNode::in_ns("interfaces", NS_IF).with_child(
            XmlNode::new("interface")
                .with_child(XmlNode::new("name").with_text("eth0"))
                .with_child(XmlNode::new("mtu").with_text("1280")),
        ),
    );
    assert!(
        server
            .handle(&mut session, &edit_config("candidate", config))
            .is_ok()
    );

    let unlock = XmlNode::new("unlock")
        .with_child(XmlNode::new("target").with_child(datastore_elem("candidate")));
    assert!(server.handle(&mut session, &unlock).is_ok());

    // the pending edit was discarded with the lock
    let mut probe = server.new_session(3).expect("session starts");
    let rpc = get_config(
        "candidate",
        Some(subtree_filter(vec![XmlNode::in_ns("interfaces", NS_IF)])),
    );
    let tree = expect_data(server.handle(&mut probe, &rpc));
    let entry = &tree.roots[0].children[0];
    assert_eq!(entry.child("mtu").unwrap().value, DsValue::Uint16(1500));
    assert!(backend
        .items(Datastore::Candidate)
        .iter()
        .all(|i| i.value != DsValue::Uint16(1280)));
}

#[test]
fn get_without_filter_returns_all_modules() {
    let (server, _backend) = seeded_server();
    let mut session = server.new_session(1).expect("session starts");

    let tree = expect_data(server.handle(&mut session, &XmlNode::new("get")));
    assert_eq!(tree.roots.len(), 1);
    assert_eq!(tree.roots[0].name, "interfaces");
    assert_eq!(tree.roots[0].module, "ietf-interfaces");
}

#[test]
fn empty_filter_yields_empty_reply() {
    let (server, _backend) = seeded_server();
    let mut session = server.new_session(1).expect("session starts");

    let rpc = get_config("running", Some(subtree_filter(Vec::new())));
    let tree = expect_data(server.handle(&mut session, &rpc));
    assert!(tree.is_empty());
}

#[test]
fn get_serves_monitoring_state_in_process() {
    let (server, _backend) = seeded_server();
    let mut session = server.new_session(1).expect("session starts");

    let filter = XmlNode::new("filter")
        .with_attr("type", "xpath")
        .with_attr(
            "select",
            "/ietf-netconf-monitoring:netconf-state/datastores/datastore[name='running']",
        );
    let mut rpc = XmlNode::new("get");
    rpc.children.push(filter);

    let tree = expect_data(server.handle(&mut session, &rpc));
    assert_eq!(tree.roots[0].name, "netconf-state");

    // the same prefix is state data only, so get-config yields nothing
    let rpc = get_config(
        "running",
        Some(
            XmlNode::new("filter")
                .with_attr("type", "xpath")
                .with_attr("select", "/ietf-netconf-monitoring:netconf-state"),
        ),
    );
    let tree = expect_data(server.handle(&mut session, &rpc));
    assert!(tree.is_empty());
}

#[test]
fn edit_config_rejects_unknown_datastore() {
    let (server, _backend) = seeded_server();
    let mut session = server.new_session(1).expect("session starts");

    let config = XmlNode::new("config");
    let rpc = XmlNode::new("edit-config")
        .with_child(XmlNode::new("target").with_child(datastore_elem("flash")))
        .with_child(config);
    let error = expect_single_error(server.handle(&mut session, &rpc));
    assert_eq!(error.tag, ErrorTag::InvalidValue);
}

#[test]
fn session_close_releases_locks() {
    let (server, _backend) = seeded_server();
    let mut session_a = server.new_session(1).expect("session starts");
    let mut session_b = server.new_session(2).expect("session starts");

    let lock = XmlNode::new("lock")
        .with_child(XmlNode::new("target").with_child(datastore_elem("running")));
    assert!(server.handle(&mut session_a, &lock).is_ok());
    let error = expect_single_error(server.handle(&mut session_b, &lock));
    assert_eq!(error.tag, ErrorTag::LockDenied);

    server.close_session(session_a);
    assert!(server.handle(&mut session_b, &lock).is_ok());
}
