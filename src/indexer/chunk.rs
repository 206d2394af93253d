//! Chunk data model.
//!
//! A file is decomposed into a rooted tree: file → context/import → container →
//! member. Chunks never point at each other directly; parent, children and
//! references are all `node_id` lists so a batch of chunks is a flat arena that
//! can be indexed by id.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    File,
    Container,
    Member,
    Import,
    Context,
    OrphanedMember,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::File => "file",
            ChunkType::Container => "container",
            ChunkType::Member => "member",
            ChunkType::Import => "import",
            ChunkType::Context => "context",
            ChunkType::OrphanedMember => "orphaned_member",
        }
    }

    /// Members and orphaned members: the chunks that can call each other.
    pub fn is_member_like(&self) -> bool {
        matches!(self, ChunkType::Member | ChunkType::OrphanedMember)
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(ChunkType::File),
            "container" => Ok(ChunkType::Container),
            "member" => Ok(ChunkType::Member),
            "import" => Ok(ChunkType::Import),
            "context" => Ok(ChunkType::Context),
            "orphaned_member" => Ok(ChunkType::OrphanedMember),
            other => Err(format!("unknown chunk type: {other}")),
        }
    }
}

/// Structured context extracted from declarations.
///
/// Only the fields that make sense for a chunk are filled: `package`/`imports`
/// on file chunks, `extends`/`implements` on containers, `parameters`/`return_type`
/// on members.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkContext {
    pub package: Option<String>,
    pub imports: Vec<String>,
    pub extends: Option<String>,
    pub implements: Vec<String>,
    pub parameters: Vec<String>,
    pub return_type: Option<String>,
}

impl ChunkContext {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub node_id: String,
    pub chunk_type: ChunkType,
    pub content: String,
    pub file_path: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    pub end_line: usize,
    pub language: String,
    pub name: Option<String>,
    pub qualified_name: Option<String>,
    #[serde(default)]
    pub context: ChunkContext,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children_ids: Vec<String>,
    #[serde(default)]
    pub reference_ids: Vec<String>,
    #[serde(default)]
    pub referenced_by_ids: Vec<String>,
}

impl Chunk {
    /// Stable id: a chunk type is unique per byte span within a file.
    pub fn make_id(file_path: &str, chunk_type: ChunkType, start_byte: usize, end_byte: usize) -> String {
        format!("{file_path}#{chunk_type}:{start_byte}-{end_byte}")
    }

    /// Name used for display and for lookup; falls back to the node id.
    pub fn display_name(&self) -> &str {
        self.qualified_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.node_id)
    }

    /// Text fed to the embedder, enriched with language and symbol context.
    pub fn get_embedding_text(&self) -> String {
        match self.qualified_name.as_deref().or(self.name.as_deref()) {
            Some(name) => format!("{} {} {}: {}", self.language, self.chunk_type, name, self.content),
            None => format!("{} {}: {}", self.language, self.chunk_type, self.content),
        }
    }

    pub fn metadata_bool(&self, key: &str) -> bool {
        self.metadata
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    pub fn metadata_strings(&self, key: &str) -> Vec<String> {
        self.metadata
            .get(key)
            .and_then(serde_json::Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Interface-like chunks (traits, interfaces, abstract classes).
    pub fn is_interface(&self) -> bool {
        self.metadata_bool("is_interface")
    }

    /// Import path a file chunk answers to, recorded at extraction.
    pub fn module(&self) -> Option<&str> {
        self.metadata.get("module").and_then(serde_json::Value::as_str)
    }
}

/// Dotted module path of a source file: `src/util/logger.ts` → `util.logger`.
///
/// A leading `src/` or `lib/` is dropped, as is a trailing `mod`, `__init__`
/// or `index` segment. `None` for crate roots such as `src/lib.rs`.
pub fn module_path(file_path: &str) -> Option<String> {
    let mut segments: Vec<&str> = file_path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    let last = segments.pop()?;
    segments.push(last.rsplit_once('.').map_or(last, |(stem, _)| stem));

    if matches!(segments.first(), Some(&("src" | "lib"))) && segments.len() > 1 {
        segments.remove(0);
    }
    if matches!(segments.last(), Some(&("mod" | "__init__" | "index"))) {
        segments.pop();
    }
    if segments.is_empty() || segments == ["lib"] || segments == ["main"] {
        return None;
    }
    Some(segments.join("."))
}

/// Strip generic arguments and path prefixes: `crate::a::Foo<T>` → `Foo`.
pub fn simple_name(name: &str) -> &str {
    let base = name.split('<').next().unwrap_or(name).trim();
    let base = base.rsplit("::").next().unwrap_or(base);
    base.rsplit('.').next().unwrap_or(base).trim()
}

/// `parent.qualified_name + "." + name`, or just `name` at the root.
pub fn qualify(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(p) if !p.is_empty() => format!("{p}.{name}"),
        _ => name.to_string(),
    }
}
