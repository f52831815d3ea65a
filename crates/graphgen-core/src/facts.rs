use crate::loc::Span;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;

/// Kind tag of one top-level definition. `Connection` is only used for
/// definitions synthesized by the analyzer; it never comes from parsed
/// source.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum DefinitionKind {
    Object,
    Interface,
    Enum,
    InputObject,
    Scalar,
    Union,
    Connection,
}

impl DefinitionKind {
    /// Template dispatch token, combined with a type class into
    /// fragment keys like `NativeObject` or `SchemaEnum`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Object => "Object",
            Self::Interface => "Interface",
            Self::Enum => "Enum",
            Self::InputObject => "InputObject",
            Self::Scalar => "Scalar",
            Self::Union => "Union",
            Self::Connection => "Connection",
        }
    }
}

impl std::fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ArgumentFact {
    pub name: String,
    pub type_text: String,
    pub default: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FieldFact {
    pub name: String,
    pub type_text: String,
    pub span: Span,
    pub description: Vec<String>,
    pub arguments: Vec<ArgumentFact>,
}

/// One named definition: parsed from source, or synthesized by the
/// analyzer for relay connections.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Definition {
    pub name: String,
    pub kind: DefinitionKind,
    pub span: Span,
    pub description: Vec<String>,
    pub implements: Vec<String>,
    pub fields: Vec<FieldFact>,
    pub values: Vec<String>,
    pub members: Vec<String>,
    /// For synthesized connections: the element type the connection
    /// paginates over (`TodoConnection` -> `Todo`).
    pub node_type: Option<String>,
}

impl Definition {
    pub(crate) fn new(name: String, kind: DefinitionKind, span: Span) -> Self {
        Self {
            name,
            kind,
            span,
            description: vec![],
            implements: vec![],
            fields: vec![],
            values: vec![],
            members: vec![],
            node_type: None,
        }
    }

    pub fn is_relay_node(&self) -> bool {
        self.implements.iter().any(|name| name == "Node")
    }
}

/// Read-only classification of one parsed schema document, produced
/// once by the analyzer and then shared by every generation unit.
#[derive(Clone, Debug, Default)]
pub struct SchemaFacts {
    all: Vec<Definition>,
    by_name: HashMap<String, usize>,
    roots: Vec<usize>,
    objects: Vec<usize>,
    relay_nodes: Vec<usize>,
    connections: Vec<usize>,
}

impl SchemaFacts {
    /// Every definition, source order preserved, with synthesized
    /// connections interleaved in first-discovered order.
    pub fn definitions(&self) -> &[Definition] {
        &self.all
    }

    pub fn root_definitions(&self) -> impl Iterator<Item = &Definition> {
        self.roots.iter().map(|&idx| &self.all[idx])
    }

    pub fn object_definitions(&self) -> impl Iterator<Item = &Definition> {
        self.objects.iter().map(|&idx| &self.all[idx])
    }

    pub fn relay_node_definitions(&self) -> impl Iterator<Item = &Definition> {
        self.relay_nodes.iter().map(|&idx| &self.all[idx])
    }

    pub fn connection_definitions(&self) -> impl Iterator<Item = &Definition> {
        self.connections.iter().map(|&idx| &self.all[idx])
    }

    /// Exact-name lookup. When a schema literally defines a type whose
    /// name also names a synthesized connection, the source definition
    /// wins.
    pub fn lookup(&self, name: &str) -> Option<&Definition> {
        self.by_name.get(name).map(|&idx| &self.all[idx])
    }

    pub(crate) fn push(&mut self, def: Definition) {
        use std::collections::hash_map::Entry;

        let idx = self.all.len();
        match self.by_name.entry(def.name.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(idx);
            },
            Entry::Occupied(mut entry) => {
                // A synthesized connection never shadows a literal
                // definition with the same name, regardless of which
                // one the analyzer discovered first.
                let existing = self.all[*entry.get()].kind;
                if def.kind != DefinitionKind::Connection
                    && existing == DefinitionKind::Connection
                {
                    entry.insert(idx);
                }
            },
        }

        match def.kind {
            DefinitionKind::Object => self.objects.push(idx),
            DefinitionKind::Connection => self.connections.push(idx),
            _ => {},
        }
        if def.kind == DefinitionKind::Object && def.is_relay_node() {
            self.relay_nodes.push(idx);
        }

        self.all.push(def);
    }

    pub(crate) fn mark_root(&mut self, name: &str) {
        if let Some(&idx) = self.by_name.get(name) {
            self.roots.push(idx);
        }
    }
}
