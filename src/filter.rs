//! NETCONF filter compilation
//!
//! Turns the `filter` element of a `get`/`get-config` request into an
//! ordered list of instance-path expressions. An XPath filter passes
//! through verbatim; a subtree filter (RFC 6241 §6) is compiled by
//! walking its element tree, growing one path per filter leaf.
//!
//! The builder owns its path string and is cloned at every branch
//! point, so sibling filter nodes never see each other's suffixes.

use crate::error::{NetconfError, Result};
use crate::protocol::NS_NETCONF_BASE;
use crate::schema::SchemaContext;
use crate::xml::XmlNode;

/// Growing path with the namespace last emitted as a module prefix;
/// cloned when the filter tree branches
#[derive(Debug, Clone)]
struct PathBuilder {
    buf: String,
    last_ns: Option<String>,
}

impl PathBuilder {
    fn new(ns: &str) -> Self {
        Self {
            buf: String::new(),
            last_ns: Some(ns.to_string()),
        }
    }
}

/// Compile the `filter` element of a request into instance paths
///
/// An empty XPath `select` or an empty subtree filter compiles to an
/// empty list, which the dispatcher answers with an empty data reply.
pub fn compile_filter(schema: &SchemaContext, filter: &XmlNode) -> Result<Vec<String>> {
    match filter.attr("type") {
        Some("xpath") => {
            let select = filter.attr("select").ok_or_else(|| {
                NetconfError::InvalidValue("xpath filter without the \"select\" attribute".into())
            })?;
            if select.is_empty() {
                return Ok(Vec::new());
            }
            Ok(vec![select.to_string()])
        }
        Some("subtree") | None => compile_subtree(schema, &filter.children),
        Some(other) => Err(NetconfError::InvalidValue(format!(
            "unknown filter type '{other}'"
        ))),
    }
}

/// Compile the top-level elements of a subtree filter
fn compile_subtree(schema: &SchemaContext, elements: &[XmlNode]) -> Result<Vec<String>> {
    let mut filters = Vec::new();

    for elem in elements {
        // the first filter node resolves its namespace to one module;
        // without a namespace it matches every module defining a
        // top-level data node of that name
        let modules = match &elem.namespace {
            Some(ns) if ns != NS_NETCONF_BASE => match schema.module_by_namespace(ns) {
                Some(module) => vec![module],
                None => {
                    // not really an error, just nothing to match
                    log::debug!("filter element '{}' in unknown namespace {ns}", elem.name);
                    continue;
                }
            },
            _ => schema.modules_with_top_node(&elem.name),
        };

        for module in modules {
            if elem.is_content_match() {
                // special case of a top-level content match node
                let mut pb = PathBuilder::new(&module.namespace);
                pb.buf = format!(
                    "/{}:{}[text()='{}']",
                    module.name,
                    elem.name,
                    elem.trimmed_text()
                );
                add_attr_predicates(schema, &mut pb, elem);
                filters.push(pb.buf);
            } else {
                let pb = PathBuilder::new(&module.namespace);
                descend(schema, elem, Some(&module.name), pb, &mut filters);
            }
        }
    }

    Ok(filters)
}

/// Append `/<prefix>:<name>` (prefix only on namespace change) plus
/// attribute predicates; false means the namespace matches no module
/// and the whole branch is silently dropped
fn add_node(
    schema: &SchemaContext,
    pb: &mut PathBuilder,
    elem: &XmlNode,
    forced_module: Option<&str>,
) -> bool {
    let mut module_name = forced_module.map(str::to_string);

    if module_name.is_none()
        && let Some(ns) = &elem.namespace
        && pb.last_ns.as_deref() != Some(ns.as_str())
        && ns != NS_NETCONF_BASE
    {
        match schema.module_by_namespace(ns) {
            Some(module) => {
                pb.last_ns = Some(ns.clone());
                module_name = Some(module.name.clone());
            }
            None => return false,
        }
    }

    pb.buf.push('/');
    if let Some(module) = &module_name {
        pb.buf.push_str(module);
        pb.buf.push(':');
    }
    pb.buf.push_str(&elem.name);

    add_attr_predicates(schema, pb, elem);
    true
}

/// Append a `[<prefix>:<name>='<text>']` content-match predicate
fn add_content(schema: &SchemaContext, pb: &mut PathBuilder, elem: &XmlNode) -> bool {
    let mut module_name = None;

    if let Some(ns) = &elem.namespace
        && pb.last_ns.as_deref() != Some(ns.as_str())
        && ns != NS_NETCONF_BASE
    {
        match schema.module_by_namespace(ns) {
            Some(module) => {
                pb.last_ns = Some(ns.clone());
                module_name = Some(module.name.clone());
            }
            None => return false,
        }
    }

    pb.buf.push('[');
    if let Some(module) = &module_name {
        pb.buf.push_str(module);
        pb.buf.push(':');
    }
    pb.buf.push_str(&elem.name);
    // the attributes belong to the content-match child itself, so
    // their predicates nest before the value comparison
    add_attr_predicates(schema, pb, elem);
    pb.buf.push_str("='");
    pb.buf.push_str(elem.trimmed_text());
    pb.buf.push_str("']");
    true
}

/// Append `[@<prefix>:<attr>='<v>']` for every attribute whose
/// namespace resolves to a known module; others match nothing anyway
/// and are skipped
fn add_attr_predicates(schema: &SchemaContext, pb: &mut PathBuilder, elem: &XmlNode) {
    for attr in &elem.attrs {
        let Some(ns) = &attr.namespace else { continue };
        let Some(module) = schema.module_by_namespace(ns) else {
            continue;
        };
        pb.buf.push_str("[@");
        pb.buf.push_str(&module.name);
        pb.buf.push(':');
        pb.buf.push_str(&attr.name);
        pb.buf.push_str("='");
        pb.buf.push_str(&attr.value);
        pb.buf.push_str("']");
    }
}

/// Recursive compilation of a containment/selection node
fn descend(
    schema: &SchemaContext,
    elem: &XmlNode,
    forced_module: Option<&str>,
    mut pb: PathBuilder,
    filters: &mut Vec<String>,
) {
    if !add_node(schema, &mut pb, elem, forced_module) {
        return;
    }

    // content match children become predicates on this path, and each
    // must also appear in the output, so it branches a selection path
    let mut rest: Vec<&XmlNode> = Vec::new();
    for child in &elem.children {
        if child.is_content_match() {
            if !add_content(schema, &mut pb, child) {
                return;
            }
            let mut sel = pb.clone();
            if add_node(schema, &mut sel, child, None) {
                filters.push(sel.buf);
            }
        } else {
            rest.push(child);
        }
    }

    // a selection leaf terminates the path
    if rest.is_empty() {
        filters.push(pb.buf);
        return;
    }

    // branch with every remaining child; the last one takes the buffer
    let (init, last) = rest.split_at(rest.len() - 1);
    for child in init {
        branch_child(schema, child, pb.clone(), filters);
    }
    branch_child(schema, last[0], pb, filters);
}

fn branch_child(
    schema: &SchemaContext,
    child: &XmlNode,
    mut pb: PathBuilder,
    filters: &mut Vec<String>,
) {
    if child.is_containment() {
        descend(schema, child, None, pb, filters);
    } else if add_node(schema, &mut pb, child, None) {
        filters.push(pb.buf);
    }
}
