//! with-defaults reply filtering (RFC 6243)
//!
//! Applied to every scalar of an assembled reply tree. `report-all`
//! keeps everything; `trim` drops defaults (flagged or value-equal to
//! the schema default); `report-all-tagged` keeps them but annotates;
//! `explicit` drops flagged configuration leaves outside RPC output.

use crate::protocol::WithDefaults;
use crate::schema::{NodeKind, SchemaContext, SchemaNode};
use crate::tree::{DataNode, DataTree};

/// What to do with one inspected leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Keep,
    Drop,
    Tag,
}

/// Apply a with-defaults mode to an assembled tree in place
pub fn apply(tree: &mut DataTree, schema: &SchemaContext, wd: WithDefaults, rpc_output: bool) {
    if wd == WithDefaults::ReportAll {
        // we keep it all
        return;
    }
    tree.roots
        .retain_mut(|root| filter_node(root, schema, None, wd, rpc_output));
}

/// Returns false when the node is to be removed from its parent
fn filter_node(
    node: &mut DataNode,
    schema: &SchemaContext,
    parent: Option<&SchemaNode>,
    wd: WithDefaults,
    rpc_output: bool,
) -> bool {
    let snode = match parent {
        Some(parent) => parent.child(&node.name),
        None => schema
            .module(&node.module)
            .and_then(|m| m.top_node(&node.name)),
    };

    if !node.value.is_marker() {
        return match inspect_leaf(node, snode, wd, rpc_output) {
            Verdict::Keep => true,
            Verdict::Drop => false,
            Verdict::Tag => {
                node.wd_tagged = true;
                true
            }
        };
    }

    node.children
        .retain_mut(|child| filter_node(child, schema, snode, wd, rpc_output));
    true
}

fn inspect_leaf(
    node: &DataNode,
    snode: Option<&SchemaNode>,
    wd: WithDefaults,
    rpc_output: bool,
) -> Verdict {
    if wd == WithDefaults::Explicit && !node.dflt {
        return Verdict::Keep;
    }

    // only plain leaves have defaults; leaf-lists and unknown nodes
    // pass through untouched
    let Some(snode) = snode else {
        return Verdict::Keep;
    };
    if snode.kind != NodeKind::Leaf {
        return Verdict::Keep;
    }

    if wd == WithDefaults::Explicit {
        if snode.config && !rpc_output {
            return Verdict::Drop;
        }
        return Verdict::Keep;
    }

    if node.dflt {
        return match wd {
            WithDefaults::Trim => Verdict::Drop,
            WithDefaults::ReportAllTagged => Verdict::Tag,
            _ => Verdict::Keep,
        };
    }

    // explicit value: compare against the leaf or typedef default
    let Some(dflt_val) = snode.effective_default() else {
        return Verdict::Keep;
    };
    let matches_default = node.value.canonical().as_deref() == Some(dflt_val);

    match wd {
        WithDefaults::Trim if matches_default => Verdict::Drop,
        WithDefaults::ReportAllTagged if matches_default => Verdict::Tag,
        _ => Verdict::Keep,
    }
}
