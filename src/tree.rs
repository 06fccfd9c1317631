//! Data trees assembled from back-end items
//!
//! The back-end answers reads as a stream of `(path, value)` pairs.
//! This module parses those instance paths, assembles them into a
//! schema-conformant tree (creating intermediate ancestors and list
//! keys on the way), and propagates default flags exactly as the reply
//! layer needs them. It also selects subtrees out of in-process state
//! trees for the locally served schema roots.

use crate::error::{NetconfError, Result};
use crate::schema::{SchemaContext, SchemaNode};
use crate::value::DsValue;
use crate::xml::XmlNode;

/// Namespace of the with-defaults `default` annotation (RFC 6243 §6)
pub const NS_WD_ANNOTATION: &str = "urn:ietf:params:xml:ns:netconf:default:1.0";

/// One step of a parsed instance path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    /// Module prefix, when the path carries one at this step
    pub module: Option<String>,
    pub name: String,
    /// `[name='value']` predicates; attribute (`@`-prefixed) and
    /// `text()` predicates keep their spelling in `name`
    pub predicates: Vec<(String, String)>,
}

impl PathSegment {
    /// Key predicates only (skips attribute and text() predicates)
    pub fn key_predicates(&self) -> impl Iterator<Item = (&str, &str)> {
        self.predicates
            .iter()
            .filter(|(k, _)| !k.starts_with('@') && k != "text()")
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Parse an instance path like
/// `/ietf-interfaces:interfaces/interface[name='eth0']/mtu`
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>> {
    let bad = |why: &str| NetconfError::InvalidValue(format!("bad instance path '{path}': {why}"));

    let rest = path.strip_prefix('/').ok_or_else(|| bad("must start with '/'"))?;
    if rest.is_empty() {
        return Err(bad("empty path"));
    }

    let mut segments = Vec::new();
    let mut chars = rest.chars().peekable();

    loop {
        // step name up to '/' or '['
        let mut token = String::new();
        while let Some(&c) = chars.peek() {
            if c == '/' || c == '[' {
                break;
            }
            token.push(c);
            chars.next();
        }
        if token.is_empty() {
            return Err(bad("empty step"));
        }

        let (module, name) = match token.split_once(':') {
            Some((module, name)) => (Some(module.to_string()), name.to_string()),
            None => (None, token),
        };

        // predicates
        let mut predicates = Vec::new();
        while chars.peek() == Some(&'[') {
            chars.next();
            let mut key = String::new();
            while let Some(&c) = chars.peek() {
                if c == '=' {
                    break;
                }
                key.push(c);
                chars.next();
            }
            if chars.next() != Some('=') {
                return Err(bad("predicate without '='"));
            }
            let quote = match chars.next() {
                Some(q @ ('\'' | '"')) => q,
                _ => return Err(bad("predicate value must be quoted")),
            };
            let mut value = String::new();
            loop {
                match chars.next() {
                    Some(c) if c == quote => break,
                    Some(c) => value.push(c),
                    None => return Err(bad("unterminated predicate value")),
                }
            }
            if chars.next() != Some(']') {
                return Err(bad("unbalanced predicate"));
            }
            predicates.push((key, value));
        }

        segments.push(PathSegment {
            module,
            name,
            predicates,
        });

        match chars.next() {
            Some('/') => continue,
            None => break,
            Some(c) => return Err(bad(&format!("unexpected '{c}'"))),
        }
    }

    Ok(segments)
}

/// Syntactic validity check for compiler output: leading slash,
/// non-empty steps, balanced and quoted predicates
pub fn is_valid_instance_path(path: &str) -> bool {
    parse_path(path).is_ok()
}

/// One node of an assembled data tree
#[derive(Debug, Clone, PartialEq)]
pub struct DataNode {
    pub name: String,
    /// Resolved module name of this node
    pub module: String,
    /// Container/list marker or typed scalar
    pub value: DsValue,
    /// The value came from a schema default
    pub dflt: bool,
    /// Marked by with-defaults `report-all-tagged`
    pub wd_tagged: bool,
    /// Key values of a list entry, in predicate order
    pub keys: Vec<(String, String)>,
    pub children: Vec<DataNode>,
}

impl DataNode {
    fn new(name: &str, module: &str, value: DsValue) -> Self {
        Self {
            name: name.to_string(),
            module: module.to_string(),
            value,
            dflt: false,
            wd_tagged: false,
            keys: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Child by name within the same module
    pub fn child(&self, name: &str) -> Option<&DataNode> {
        self.children.iter().find(|c| c.name == name)
    }

    fn matches(&self, module: &str, name: &str, keys: &[(String, String)]) -> bool {
        self.module == module && self.name == name && self.keys == keys
    }
}

/// A data tree assembled from `(path, value)` pairs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTree {
    pub roots: Vec<DataNode>,
}

impl DataTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    fn node_mut(&mut self, idx: &[usize]) -> &mut DataNode {
        let mut node = &mut self.roots[idx[0]];
        for &i in &idx[1..] {
            node = &mut node.children[i];
        }
        node
    }

    fn node(&self, idx: &[usize]) -> &DataNode {
        let mut node = &self.roots[idx[0]];
        for &i in &idx[1..] {
            node = &node.children[i];
        }
        node
    }

    /// Insert one `(path, value)` pair, creating intermediate ancestors
    /// and list keys as needed. Repeated insertion of the same path
    /// updates the leaf in place.
    ///
    /// Default-flag propagation: a default value flags the created
    /// chain from its first leaf descendant up to the topmost created
    /// node, stopping at presence containers and keyed lists; an
    /// explicit value clears stale flags on its ancestors.
    pub fn add_path(
        &mut self,
        schema: &SchemaContext,
        path: &str,
        value: DsValue,
        dflt: bool,
    ) -> Result<()> {
        let segments = parse_path(path)?;
        let last = segments.len() - 1;

        let mut idx_path: Vec<usize> = Vec::with_capacity(segments.len());
        let mut created_depth: Option<usize> = None;
        let mut module = String::new();
        let mut snode: Option<&SchemaNode> = None;

        for (depth, seg) in segments.iter().enumerate() {
            if let Some(m) = &seg.module {
                module = m.clone();
            } else if depth == 0 {
                return Err(NetconfError::InvalidValue(format!(
                    "path '{path}' has no top-level module prefix"
                )));
            }

            snode = match (depth, snode) {
                (0, _) => schema.module(&module).and_then(|m| m.top_node(&seg.name)),
                (_, Some(s)) => s.child(&seg.name),
                (_, None) => None,
            };

            let keys: Vec<(String, String)> = seg
                .key_predicates()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();

            let children = if depth == 0 {
                &mut self.roots
            } else {
                &mut self.node_mut(&idx_path).children
            };

            let pos = children
                .iter()
                .position(|c| c.matches(&module, &seg.name, &keys));
            let pos = match pos {
                Some(pos) => {
                    if depth == last {
                        // update semantics
                        children[pos].value = value.clone();
                    }
                    pos
                }
                None => {
                    let node_value = if depth == last {
                        value.clone()
                    } else {
                        snode
                            .map(DsValue::marker_for)
                            .unwrap_or(DsValue::Container { presence: false })
                    };
                    let mut node = DataNode::new(&seg.name, &module, node_value);
                    node.keys = keys.clone();
                    // a new list entry materializes its key leaves;
                    // `.` is the leaf-list value predicate, not a key
                    for (k, v) in &keys {
                        if k == "." {
                            continue;
                        }
                        let key_value = snode
                            .and_then(|s| s.child(k))
                            .and_then(|ks| DsValue::from_leaf(ks, v).ok())
                            .unwrap_or(DsValue::String(v.clone()));
                        node.children.push(DataNode::new(k, &module, key_value));
                    }
                    children.push(node);
                    if created_depth.is_none() {
                        created_depth = Some(depth);
                    }
                    children.len() - 1
                }
            };
            idx_path.push(pos);
        }

        if dflt {
            // go down from this item's own target node to its first
            // leaf-ish descendant, staying on the inserted path where
            // it is known
            let mut leaf_idx = idx_path.clone();
            loop {
                let node = self.node(&leaf_idx);
                if !node.value.is_marker() || node.children.is_empty() {
                    break;
                }
                let next = idx_path.get(leaf_idx.len()).copied().unwrap_or(0);
                leaf_idx.push(next);
            }
            // go up, back to the target node and no further
            for depth in (last..leaf_idx.len()).rev() {
                let node = self.node_mut(&leaf_idx[..=depth]);
                match &node.value {
                    DsValue::Container { presence: true } => break,
                    DsValue::List if !node.keys.is_empty() => break,
                    _ => node.dflt = true,
                }
            }
        } else {
            // explicit value, clear stale flags on the parents of the
            // topmost node this insertion created
            for depth in (0..created_depth.unwrap_or(last)).rev() {
                let node = self.node_mut(&idx_path[..=depth]);
                if !node.dflt {
                    break;
                }
                node.dflt = false;
            }
        }

        Ok(())
    }

    /// Select every node of `src` matching `path` into this tree,
    /// keeping ancestors and list keys of each match
    pub fn select_from(&mut self, src: &DataTree, path: &str) -> Result<()> {
        let segments = parse_path(path)?;
        let mut chain: Vec<&DataNode> = Vec::new();
        let mut matches: Vec<(Vec<&DataNode>, &DataNode)> = Vec::new();
        collect_matches(&src.roots, &segments, None, &mut chain, &mut matches);

        for (ancestors, node) in matches {
            // rebuild the match under shallow copies of its ancestors
            let mut subtree = node.clone();
            for ancestor in ancestors.iter().rev() {
                let mut copy = shallow_with_keys(ancestor);
                copy.children.push(subtree);
                subtree = copy;
            }
            merge_node(&mut self.roots, subtree);
        }
        Ok(())
    }

    /// Serialize to parsed-XML elements; `schema` supplies namespaces
    pub fn to_xml(&self, schema: &SchemaContext) -> Vec<XmlNode> {
        self.roots
            .iter()
            .map(|root| node_to_xml(root, schema, None))
            .collect()
    }
}

fn shallow_with_keys(node: &DataNode) -> DataNode {
    let mut copy = DataNode::new(&node.name, &node.module, node.value.clone());
    copy.dflt = node.dflt;
    copy.keys = node.keys.clone();
    // list-entry copies keep their key leaves so the result stays valid
    for (key, _) in &node.keys {
        if let Some(child) = node.child(key) {
            copy.children.push(child.clone());
        }
    }
    copy
}

fn collect_matches<'a>(
    nodes: &'a [DataNode],
    segments: &[PathSegment],
    inherited_module: Option<&str>,
    chain: &mut Vec<&'a DataNode>,
    out: &mut Vec<(Vec<&'a DataNode>, &'a DataNode)>,
) {
    let Some(seg) = segments.first() else { return };

    for node in nodes {
        if node.name != seg.name {
            continue;
        }
        if let Some(module) = seg.module.as_deref().or(inherited_module)
            && node.module != module
        {
            continue;
        }
        if !predicates_hold(node, seg) {
            continue;
        }
        if segments.len() == 1 {
            out.push((chain.clone(), node));
        } else {
            chain.push(node);
            collect_matches(&node.children, &segments[1..], Some(&node.module), chain, out);
            chain.pop();
        }
    }
}

/// Predicate evaluation over a state tree: key and content predicates
/// compare a child leaf's canonical value, `text()` compares the node's
/// own value; attribute predicates do not apply to state data
fn predicates_hold(node: &DataNode, seg: &PathSegment) -> bool {
    seg.predicates.iter().all(|(key, expected)| {
        if key.starts_with('@') {
            true
        } else if key == "text()" {
            node.value.canonical().as_deref() == Some(expected.as_str())
        } else {
            node.child(key)
                .and_then(|c| c.value.canonical())
                .as_deref()
                == Some(expected.as_str())
        }
    })
}

/// Merge with update semantics: nodes with the same identity
/// (module, name, keys) fuse, children merge recursively
fn merge_node(dest: &mut Vec<DataNode>, node: DataNode) {
    match dest
        .iter_mut()
        .find(|d| d.matches(&node.module, &node.name, &node.keys))
    {
        Some(existing) => {
            for child in node.children {
                merge_node(&mut existing.children, child);
            }
        }
        None => dest.push(node),
    }
}

fn node_to_xml(node: &DataNode, schema: &SchemaContext, parent_module: Option<&str>) -> XmlNode {
    let mut elem = if parent_module != Some(node.module.as_str()) {
        match schema.module(&node.module) {
            Some(module) => XmlNode::in_ns(&node.name, &module.namespace),
            None => XmlNode::new(&node.name),
        }
    } else {
        XmlNode::new(&node.name)
    };

    if node.wd_tagged {
        elem = elem.with_ns_attr("default", NS_WD_ANNOTATION, "true");
    }
    if let Some(text) = node.value.canonical() {
        elem.text = text;
    }
    for child in &node.children {
        elem.children
            .push(node_to_xml(child, schema, Some(&node.module)));
    }
    elem
}
