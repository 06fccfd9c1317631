//! edit-config application
//!
//! Walks an incoming edit tree and issues ordered set/delete
//! operations against a back-end session: parents before children and,
//! within a list entry, key leaves before everything else. The
//! effective operation of a node is the nearest `operation` attribute
//! on its ancestor chain, defaulting to the request's
//! `default-operation`.

use crate::backend::BackendSession;
use crate::error::{NetconfError, Result};
use crate::protocol::RpcError;
use crate::schema::{NodeKind, SchemaContext, SchemaNode};
use crate::value::DsValue;
use crate::xml::XmlNode;

/// Edit operations of RFC 6241 §7.2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditOperation {
    #[default]
    Merge,
    Replace,
    Create,
    Delete,
    Remove,
    None,
}

impl EditOperation {
    /// Parse an `operation` attribute value (`none` is not a valid
    /// attribute value, only a default-operation)
    pub fn from_attr(s: &str) -> Option<Self> {
        match s {
            "merge" => Some(Self::Merge),
            "replace" => Some(Self::Replace),
            "create" => Some(Self::Create),
            "delete" => Some(Self::Delete),
            "remove" => Some(Self::Remove),
            _ => None,
        }
    }

    /// Parse a `default-operation` leaf value
    pub fn from_default_operation(s: &str) -> Option<Self> {
        match s {
            "merge" => Some(Self::Merge),
            "replace" => Some(Self::Replace),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

/// `test-option` values (RFC 6241 §8.6.4.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestOption {
    #[default]
    TestThenSet,
    Set,
    TestOnly,
}

impl TestOption {
    pub fn from_leaf_value(s: &str) -> Option<Self> {
        match s {
            "test-then-set" => Some(Self::TestThenSet),
            "set" => Some(Self::Set),
            "test-only" => Some(Self::TestOnly),
            _ => None,
        }
    }
}

/// `error-option` values (RFC 6241 §7.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorOption {
    #[default]
    StopOnError,
    ContinueOnError,
    RollbackOnError,
}

impl ErrorOption {
    pub fn from_leaf_value(s: &str) -> Option<Self> {
        match s {
            "stop-on-error" => Some(Self::StopOnError),
            "continue-on-error" => Some(Self::ContinueOnError),
            "rollback-on-error" => Some(Self::RollbackOnError),
            _ => None,
        }
    }
}

/// The three edit-config controls
#[derive(Debug, Clone, Copy, Default)]
pub struct EditControls {
    pub default_operation: EditOperation,
    pub test_option: TestOption,
    pub error_option: ErrorOption,
}

/// Apply the children of a `config` element to the back-end session
///
/// Returns the per-node errors accumulated under `continue-on-error`
/// (empty on full success); under the other error options the first
/// failure aborts the walk and is returned as `Err`, after a back-end
/// rollback when `rollback-on-error` asks for one.
///
/// `commit_to_backend` is false when the target is the candidate
/// datastore: candidate edits stay buffered in the back-end session
/// until the `commit` or `discard-changes` RPC.
pub fn apply_edit(
    backend: &mut dyn BackendSession,
    schema: &SchemaContext,
    config: &XmlNode,
    controls: &EditControls,
    commit_to_backend: bool,
) -> Result<Vec<RpcError>> {
    let mut errors = Vec::new();

    let walked = walk_top(backend, schema, config, controls, &mut errors);
    if let Err(e) = walked {
        if controls.error_option == ErrorOption::RollbackOnError {
            if let Err(rb) = backend.discard_changes() {
                log::error!("rollback after failed edit also failed: {rb}");
            }
        }
        return Err(e);
    }

    match controls.test_option {
        TestOption::TestOnly => {
            // validate without applying, then drop the pending changes
            backend.validate()?;
            backend.discard_changes()?;
        }
        TestOption::TestThenSet => {
            backend.validate()?;
            if commit_to_backend && errors.is_empty() {
                backend.commit()?;
            }
        }
        TestOption::Set => {
            if commit_to_backend {
                backend.commit()?;
            }
        }
    }

    Ok(errors)
}

fn walk_top(
    backend: &mut dyn BackendSession,
    schema: &SchemaContext,
    config: &XmlNode,
    controls: &EditControls,
    errors: &mut Vec<RpcError>,
) -> Result<()> {
    for elem in &config.children {
        let Some(ns) = &elem.namespace else {
            per_node(
                controls,
                errors,
                &elem.name,
                NetconfError::InvalidValue(format!(
                    "edit node '{}' has no namespace",
                    elem.name
                )),
            )?;
            continue;
        };
        let Some(module) = schema.module_by_namespace(ns) else {
            per_node(
                controls,
                errors,
                &elem.name,
                NetconfError::InvalidValue(format!("unknown namespace '{ns}'")),
            )?;
            continue;
        };
        let Some(snode) = module.top_node(&elem.name) else {
            per_node(
                controls,
                errors,
                &elem.name,
                NetconfError::InvalidValue(format!(
                    "unknown top-level node '{}' in module '{}'",
                    elem.name, module.name
                )),
            )?;
            continue;
        };

        apply_node(
            backend,
            schema,
            elem,
            snode,
            &module.name,
            "",
            "",
            controls.default_operation,
            controls,
            errors,
        )?;
    }
    Ok(())
}

/// Route one failed item through the error-option policy
fn per_node(
    controls: &EditControls,
    errors: &mut Vec<RpcError>,
    path: &str,
    err: NetconfError,
) -> Result<()> {
    if controls.error_option == ErrorOption::ContinueOnError {
        log::debug!("edit item '{path}' failed, continuing: {err}");
        errors.push(RpcError::from(&err).with_path(path));
        Ok(())
    } else {
        Err(err)
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_node(
    backend: &mut dyn BackendSession,
    schema: &SchemaContext,
    elem: &XmlNode,
    snode: &SchemaNode,
    module: &str,
    parent_path: &str,
    parent_module: &str,
    inherited: EditOperation,
    controls: &EditControls,
    errors: &mut Vec<RpcError>,
) -> Result<()> {
    // nearest operation attribute wins
    let op = match elem.attr("operation") {
        Some(attr) => match EditOperation::from_attr(attr) {
            Some(op) => op,
            None => {
                return per_node(
                    controls,
                    errors,
                    parent_path,
                    NetconfError::InvalidValue(format!("bad operation attribute '{attr}'")),
                );
            }
        },
        None => inherited,
    };

    // instance path of this node
    let mut path = String::from(parent_path);
    path.push('/');
    if module != parent_module {
        path.push_str(module);
        path.push(':');
    }
    path.push_str(&elem.name);

    if snode.kind == NodeKind::List {
        for key in &snode.keys {
            let Some(kelem) = elem.child(key) else {
                return per_node(
                    controls,
                    errors,
                    &path,
                    NetconfError::InvalidValue(format!(
                        "list '{}' entry missing key '{key}'",
                        elem.name
                    )),
                );
            };
            path.push('[');
            path.push_str(key);
            path.push_str("='");
            path.push_str(kelem.trimmed_text());
            path.push_str("']");
        }
    }

    // leaves: one set/delete and done
    if snode.is_leaf() {
        let result = match op {
            EditOperation::None => Ok(()),
            EditOperation::Delete => backend.delete_item(&path, true).map_err(Into::into),
            EditOperation::Remove => backend.delete_item(&path, false).map_err(Into::into),
            _ => DsValue::from_leaf(snode, elem.trimmed_text()).and_then(|value| {
                if op == EditOperation::Replace {
                    tolerant_delete(backend, &path)?;
                }
                backend
                    .set_item(&path, Some(&value), op == EditOperation::Create)
                    .map_err(Into::into)
            }),
        };
        return match result {
            Ok(()) => Ok(()),
            Err(e) => per_node(controls, errors, &path, e),
        };
    }

    // interior nodes: parent before children
    let own = match op {
        EditOperation::None => Ok(()),
        EditOperation::Delete => {
            return match backend.delete_item(&path, true) {
                Ok(()) => Ok(()),
                Err(e) => per_node(controls, errors, &path, e.into()),
            };
        }
        EditOperation::Remove => {
            return match backend.delete_item(&path, false) {
                Ok(()) => Ok(()),
                Err(e) => per_node(controls, errors, &path, e.into()),
            };
        }
        EditOperation::Replace => tolerant_delete(backend, &path)
            .and_then(|()| backend.set_item(&path, None, false).map_err(Into::into)),
        EditOperation::Create => backend.set_item(&path, None, true).map_err(Into::into),
        EditOperation::Merge => backend.set_item(&path, None, false).map_err(Into::into),
    };
    if let Err(e) = own {
        // the subtree is skipped when its root failed
        return per_node(controls, errors, &path, e);
    }

    // children follow with the operation this node resolved to;
    // replace wiped the subtree, so what remains is a plain merge
    let child_op = match op {
        EditOperation::Replace => EditOperation::Merge,
        other => other,
    };

    // within a list entry the key leaves go first
    if snode.kind == NodeKind::List {
        for key in &snode.keys {
            let (Some(kelem), Some(ksnode)) = (elem.child(key), snode.child(key)) else {
                continue;
            };
            let key_path = format!("{path}/{key}");
            let result = DsValue::from_leaf(ksnode, kelem.trimmed_text())
                .and_then(|value| backend.set_item(&key_path, Some(&value), false).map_err(Into::into));
            if let Err(e) = result {
                per_node(controls, errors, &key_path, e)?;
            }
        }
    }

    for child in &elem.children {
        if snode.kind == NodeKind::List && snode.keys.contains(&child.name) {
            continue;
        }
        let Some(csnode) = snode.child(&child.name) else {
            per_node(
                controls,
                errors,
                &path,
                NetconfError::InvalidValue(format!(
                    "unknown element '{}' under '{}'",
                    child.name, elem.name
                )),
            )?;
            continue;
        };
        apply_node(
            backend, schema, child, csnode, module, &path, module, child_op, controls, errors,
        )?;
    }

    Ok(())
}

/// Delete tolerating absence (the delete half of replace)
fn tolerant_delete(backend: &mut dyn BackendSession, path: &str) -> Result<()> {
    use crate::backend::BackendCode;

    match backend.delete_item(path, false) {
        Ok(()) => Ok(()),
        Err(e) if matches!(e.code, BackendCode::NotFound | BackendCode::DataMissing) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
