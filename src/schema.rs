//! Compiled YANG schema context
//!
//! The YANG engine itself (parsing modules, full validation, XPath over
//! data trees) is an external collaborator. What this crate consumes is
//! its compiled output: a JSON description of every module's data tree
//! with the node kinds, base types, keys, defaults and config flags the
//! translation layer needs. `SchemaContext` loads that description and
//! answers the lookups the other modules ask for.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{NetconfError, Result};
use crate::xml::XmlNode;

/// Schema node kinds relevant to the translation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Container,
    PresenceContainer,
    List,
    Leaf,
    LeafList,
}

/// YANG base types of leaf nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BaseType {
    Binary,
    Bits,
    Boolean,
    Decimal64,
    Empty,
    Enumeration,
    Identityref,
    InstanceIdentifier,
    Leafref,
    String,
    Union,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
}

/// One data node of a module's schema tree
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaNode {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: NodeKind,
    /// Base type; present on leaf and leaf-list nodes
    #[serde(rename = "type", default)]
    pub base: Option<BaseType>,
    /// decimal64 fraction-digits from the schema
    #[serde(rename = "fraction-digits", default)]
    pub fraction_digits: Option<u8>,
    /// Key leaf names in schema order; only on lists
    #[serde(default)]
    pub keys: Vec<String>,
    /// The leaf's own `default` statement
    #[serde(default)]
    pub default: Option<String>,
    /// Nearest typedef default, when the leaf has no own default
    #[serde(rename = "type-default", default)]
    pub type_default: Option<String>,
    #[serde(default = "default_true")]
    pub config: bool,
    #[serde(default)]
    pub children: Vec<SchemaNode>,
}

fn default_kind() -> NodeKind {
    NodeKind::Container
}

fn default_true() -> bool {
    true
}

impl SchemaNode {
    /// The default the with-defaults comparison uses: the leaf's own
    /// `default` statement, or the nearest typedef default
    pub fn effective_default(&self) -> Option<&str> {
        self.default.as_deref().or(self.type_default.as_deref())
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf | NodeKind::LeafList)
    }

    /// Child node by name
    pub fn child(&self, name: &str) -> Option<&SchemaNode> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// One module of the schema context
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaModule {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub nodes: Vec<SchemaNode>,
}

impl SchemaModule {
    /// Top-level data node by name
    pub fn top_node(&self, name: &str) -> Option<&SchemaNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Whether the module defines any data nodes at all
    pub fn has_data_nodes(&self) -> bool {
        !self.nodes.is_empty()
    }
}

/// Raw context structure for deserialization
#[derive(Debug, Deserialize)]
struct RawContext {
    modules: Vec<SchemaModule>,
}

/// The compiled schema view shared by every session
#[derive(Debug, Clone)]
pub struct SchemaContext {
    modules: Vec<SchemaModule>,
    /// namespace URI -> index into `modules`
    by_namespace: HashMap<String, usize>,
    /// module name -> index into `modules`
    by_name: HashMap<String, usize>,
}

impl SchemaContext {
    /// Load a schema context description from the given path
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Load a schema context description from a JSON string
    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: RawContext = serde_json::from_str(content)?;

        let mut by_namespace = HashMap::with_capacity(raw.modules.len());
        let mut by_name = HashMap::with_capacity(raw.modules.len());
        for (i, module) in raw.modules.iter().enumerate() {
            by_namespace.insert(module.namespace.clone(), i);
            by_name.insert(module.name.clone(), i);
        }

        Ok(Self {
            modules: raw.modules,
            by_namespace,
            by_name,
        })
    }

    pub fn modules(&self) -> &[SchemaModule] {
        &self.modules
    }

    /// Module by namespace URI
    pub fn module_by_namespace(&self, ns: &str) -> Option<&SchemaModule> {
        self.by_namespace.get(ns).map(|&i| &self.modules[i])
    }

    /// Module by name
    pub fn module(&self, name: &str) -> Option<&SchemaModule> {
        self.by_name.get(name).map(|&i| &self.modules[i])
    }

    /// Every module defining a top-level data node of the given name,
    /// in context order (filter elements without a namespace match all
    /// of them)
    pub fn modules_with_top_node(&self, name: &str) -> Vec<&SchemaModule> {
        self.modules
            .iter()
            .filter(|m| m.top_node(name).is_some())
            .collect()
    }

    /// Resolve a data path given as (module, name) segments; the first
    /// segment must carry a module name, later segments inherit
    pub fn resolve_data_path<'a, I>(&self, segments: I) -> Option<&SchemaNode>
    where
        I: IntoIterator<Item = (Option<&'a str>, &'a str)>,
    {
        let mut iter = segments.into_iter();
        let (module, name) = iter.next()?;
        let module = self.module(module?)?;
        let mut node = module.top_node(name)?;
        for (_, name) in iter {
            node = node.child(name)?;
        }
        Some(node)
    }

    /// Shallow validation of a parsed `config` element tree
    ///
    /// Checks what the compiled view can check without the full engine:
    /// every element resolves to a schema node, leaf values parse under
    /// their base type, list entries carry their keys.
    pub fn validate_tree(&self, config: &XmlNode) -> Result<()> {
        for top in &config.children {
            let module = match &top.namespace {
                Some(ns) => self.module_by_namespace(ns).ok_or_else(|| {
                    NetconfError::InvalidValue(format!("unknown namespace '{ns}'"))
                })?,
                None => {
                    return Err(NetconfError::InvalidValue(format!(
                        "top-level element '{}' without a namespace",
                        top.name
                    )));
                }
            };
            let snode = module.top_node(&top.name).ok_or_else(|| {
                NetconfError::InvalidValue(format!(
                    "unknown top-level node '{}' in module '{}'",
                    top.name, module.name
                ))
            })?;
            self.validate_node(snode, top)?;
        }
        Ok(())
    }

    fn validate_node(&self, snode: &SchemaNode, node: &XmlNode) -> Result<()> {
        if snode.is_leaf() {
            crate::value::DsValue::from_leaf(snode, node.trimmed_text())?;
            return Ok(());
        }

        if snode.kind == NodeKind::List {
            for key in &snode.keys {
                if node.child(key).is_none() {
                    return Err(NetconfError::InvalidValue(format!(
                        "list '{}' entry missing key '{key}'",
                        snode.name
                    )));
                }
            }
        }

        for child in &node.children {
            let schild = snode.child(&child.name).ok_or_else(|| {
                NetconfError::InvalidValue(format!(
                    "unknown element '{}' under '{}'",
                    child.name, snode.name
                ))
            })?;
            self.validate_node(schild, child)?;
        }
        Ok(())
    }
}
