//! Chunk extraction: one parsed file → one rooted chunk tree.
//!
//! Context nodes (package / imports) are merged into the file chunk's context.
//! Each primary node becomes a container split into a declaration prefix, one
//! chunk per contained member (or nested container) and a closing suffix.
//! Membership is decided by byte-interval containment: a node belongs to the
//! smallest primary span that encloses it. Secondary nodes enclosed by no
//! primary become orphaned members of the file.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_json::json;
use tracing::{debug, warn};
use tree_sitter::{Node, Parser, Query, QueryCursor, StreamingIterator, Tree};

use super::chunk::{Chunk, ChunkContext, ChunkType, module_path, qualify, simple_name};
use super::languages::LanguageConfig;
use super::references::link_references;
use crate::error::{Error, Result};

struct LanguageQueries {
    import: Vec<Query>,
    package: Vec<Query>,
    heritage: Vec<Query>,
    field_types: Vec<Query>,
}

/// Converts parsed files into chunk trees.
///
/// Queries are compiled once at construction; the extractor is `Send + Sync`
/// and can be shared across worker threads behind an `Arc`.
pub struct ChunkExtractor {
    queries: HashMap<&'static str, LanguageQueries>,
}

fn compile_patterns(config: &LanguageConfig, patterns: &[&str]) -> Vec<Query> {
    patterns
        .iter()
        .filter_map(|pattern| match Query::new(&config.language, pattern) {
            Ok(query) => Some(query),
            Err(e) => {
                warn!("{}: skipping query pattern {pattern}: {e}", config.name);
                None
            }
        })
        .collect()
}

/// All matches of `query` under `node`, each as `(capture_name, node)` pairs.
fn query_matches<'t>(query: &Query, node: Node<'t>, source: &[u8]) -> Vec<Vec<(String, Node<'t>)>> {
    let mut cursor = QueryCursor::new();
    let names = query.capture_names();
    let mut out = Vec::new();

    let mut matches = cursor.matches(query, node, source);
    while let Some(m) = matches.next() {
        out.push(
            m.captures
                .iter()
                .map(|cap| (names[cap.index as usize].to_string(), cap.node))
                .collect(),
        );
    }
    out
}

fn node_text(node: Node, source: &[u8]) -> String {
    String::from_utf8_lossy(&source[node.start_byte()..node.end_byte()]).into_owned()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a raw import into dotted form.
///
/// `crate::models::{User, Role as R}` → `models.User`, `models.Role`;
/// `"./util/logger"` → `util.logger`; `a::*` → `a.*`.
pub fn normalize_import(raw: &str) -> Vec<String> {
    let s = raw
        .trim()
        .trim_end_matches(';')
        .trim_matches(|c| c == '"' || c == '\'' || c == '`');

    if let (Some(open), Some(close)) = (s.find('{'), s.rfind('}')) {
        if open < close {
            let prefix = &s[..open];
            return split_top_level(&s[open + 1..close])
                .into_iter()
                .flat_map(|item| normalize_import(&format!("{prefix}{item}")))
                .collect();
        }
    }

    let s = s.split(" as ").next().unwrap_or(s).trim();
    let mut path = s.replace("::", ".").replace('/', ".");
    loop {
        let trimmed = path.trim_start_matches('.');
        let stripped = ["crate.", "self.", "super."]
            .iter()
            .find_map(|p| trimmed.strip_prefix(p));
        match stripped {
            Some(rest) => path = rest.to_string(),
            None => {
                path = trimmed.to_string();
                break;
            }
        }
    }
    if let Some(rest) = path.strip_suffix(".self") {
        path = rest.to_string();
    }

    if path.is_empty() || path == "*" {
        Vec::new()
    } else {
        vec![path]
    }
}

fn split_top_level(list: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(list[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(list[start..].trim());
    items.into_iter().filter(|s| !s.is_empty()).collect()
}

/// One-line signature: declaration text up to the body.
fn extract_signature(content: &str, lang: &str) -> String {
    let content = content.trim();
    match lang {
        "python" => {
            let first_line = content.lines().next().unwrap_or("").trim();
            if let Some(stripped) = first_line.strip_suffix(':') {
                return stripped.to_string();
            }
            match content.find("):") {
                Some(idx) => collapse_whitespace(&content[..idx + 1]),
                None => first_line.to_string(),
            }
        }
        _ => match content.find('{') {
            Some(idx) => collapse_whitespace(&content[..idx]),
            None => collapse_whitespace(content.lines().next().unwrap_or("").trim_end_matches(';')),
        },
    }
}

struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &[u8]) -> Self {
        let mut starts = vec![0];
        starts.extend(
            source
                .iter()
                .enumerate()
                .filter(|(_, b)| **b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { starts }
    }

    /// 1-based line of a byte offset.
    fn line_of(&self, byte: usize) -> usize {
        self.starts.partition_point(|&s| s <= byte).max(1)
    }
}

#[derive(Default)]
struct Heritage {
    extends: Option<String>,
    implements: Vec<String>,
}

enum Child {
    Container(usize),
    Member(usize),
}

/// Per-file working state.
struct FileBuild<'a, 't> {
    config: &'a LanguageConfig,
    source: &'a [u8],
    file_path: &'a str,
    lines: LineIndex,
    primaries: Vec<Node<'t>>,
    secondaries: Vec<Node<'t>>,
    primary_parent: Vec<Option<usize>>,
    secondary_parent: Vec<Option<usize>>,
    heritage: Vec<Heritage>,
    field_types: Vec<Vec<String>>,
    chunks: Vec<Chunk>,
}

impl ChunkExtractor {
    pub fn new() -> Result<Self> {
        let mut queries = HashMap::new();
        for config in LanguageConfig::get_all() {
            let compiled = LanguageQueries {
                import: compile_patterns(&config, config.import_patterns),
                package: compile_patterns(&config, config.package_patterns),
                heritage: compile_patterns(&config, config.heritage_patterns),
                field_types: compile_patterns(&config, config.field_type_patterns),
            };
            queries.insert(config.name, compiled);
        }
        Ok(Self { queries })
    }

    /// Read, parse and chunk a file. `file_path` is the path recorded on chunks.
    pub fn extract_file<P: AsRef<Path>>(&self, real_path: P, file_path: &str) -> Result<Vec<Chunk>> {
        let real_path = real_path.as_ref();
        let ext = real_path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let config = LanguageConfig::get_by_extension(ext)
            .ok_or_else(|| Error::UnsupportedLanguage(format!("extension '{ext}' ({file_path})")))?;

        let source = fs::read(real_path)?;
        self.extract_source(&source, file_path, config.name)
    }

    /// Parse `source` with the named language and chunk it.
    pub fn extract_source(&self, source: &[u8], file_path: &str, lang_name: &str) -> Result<Vec<Chunk>> {
        let config = LanguageConfig::get_by_name(lang_name)
            .ok_or_else(|| Error::UnsupportedLanguage(lang_name.to_string()))?;

        let mut parser = Parser::new();
        parser
            .set_language(&config.language)
            .map_err(|e| Error::parse(file_path, e))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| Error::parse(file_path, "parser returned no tree"))?;

        self.extract_tree(&tree, source, file_path, &config)
    }

    /// Chunk an already-parsed tree. Chunks come back in pre-order: the file
    /// chunk first, then each subtree in source order.
    pub fn extract_tree(
        &self,
        tree: &Tree,
        source: &[u8],
        file_path: &str,
        config: &LanguageConfig,
    ) -> Result<Vec<Chunk>> {
        let queries = self
            .queries
            .get(config.name)
            .ok_or_else(|| Error::UnsupportedLanguage(config.name.to_string()))?;

        let root = tree.root_node();
        if root.has_error() {
            debug!("{file_path}: syntax errors present, chunking best-effort");
        }

        let mut contexts = Vec::new();
        let mut primaries = Vec::new();
        let mut secondaries = Vec::new();
        collect_spans(root, config, &mut contexts, &mut primaries, &mut secondaries);
        contexts.sort_by_key(|n| n.start_byte());
        primaries.sort_by_key(|n| n.start_byte());
        secondaries.sort_by_key(|n| n.start_byte());

        let primary_parent = (0..primaries.len())
            .map(|i| innermost_container(&primaries, primaries[i].start_byte(), primaries[i].end_byte(), Some(i)))
            .collect();
        let secondary_parent = secondaries
            .iter()
            .map(|n| innermost_container(&primaries, n.start_byte(), n.end_byte(), None))
            .collect();

        let mut build = FileBuild {
            config,
            source,
            file_path,
            lines: LineIndex::new(source),
            heritage: (0..primaries.len()).map(|_| Heritage::default()).collect(),
            field_types: vec![Vec::new(); primaries.len()],
            primaries,
            secondaries,
            primary_parent,
            secondary_parent,
            chunks: Vec::new(),
        };

        build.collect_heritage(root, &queries.heritage);
        build.collect_field_types(root, &queries.field_types);
        build.emit_file(&contexts, queries);

        let mut chunks = build.chunks;
        link_references(&mut chunks);

        debug!("{file_path}: extracted {} chunks", chunks.len());
        Ok(chunks)
    }
}

fn collect_spans<'t>(
    node: Node<'t>,
    config: &LanguageConfig,
    contexts: &mut Vec<Node<'t>>,
    primaries: &mut Vec<Node<'t>>,
    secondaries: &mut Vec<Node<'t>>,
) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        let kind = child.kind();
        if config.is_context(kind) {
            contexts.push(child);
        } else if config.is_secondary(kind) {
            // member bodies are opaque: nested functions stay part of the member
            secondaries.push(child);
        } else {
            if config.is_primary(kind) {
                primaries.push(child);
            }
            collect_spans(child, config, contexts, primaries, secondaries);
        }
    }
}

/// Index of the smallest primary span enclosing `[start, end)`.
fn innermost_container(primaries: &[Node], start: usize, end: usize, exclude: Option<usize>) -> Option<usize> {
    primaries
        .iter()
        .enumerate()
        .filter(|(i, p)| {
            Some(*i) != exclude
                && p.start_byte() <= start
                && end <= p.end_byte()
                && (p.end_byte() - p.start_byte()) > (end - start)
        })
        .min_by_key(|(_, p)| p.end_byte() - p.start_byte())
        .map(|(i, _)| i)
}

/// The node itself, or a non-container descendant up to two levels down
/// (Go: `type_declaration` → `type_spec` → `interface_type`), is interface-like.
fn is_interface_like(node: Node, config: &LanguageConfig) -> bool {
    if config.interface_kinds.contains(&node.kind()) {
        return true;
    }
    let marks = |n: &Node| config.interface_kinds.contains(&n.kind()) && !config.is_primary(n.kind());
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if marks(&child) {
            return true;
        }
        let mut inner = child.walk();
        if child.named_children(&mut inner).any(|g| marks(&g)) {
            return true;
        }
    }
    false
}

impl<'t> FileBuild<'_, 't> {
    fn text(&self, node: Node) -> String {
        node_text(node, self.source)
    }

    fn declaration_name(&self, node: Node) -> Option<String> {
        let field_name = |n: Node| {
            self.config
                .name_fields
                .iter()
                .find_map(|f| n.child_by_field_name(f))
                .map(|name| simple_name(&self.text(name)).to_string())
        };
        if let Some(name) = field_name(node) {
            return Some(name);
        }
        let mut cursor = node.walk();
        let found = node.named_children(&mut cursor).find_map(field_name);
        found.filter(|n| !n.is_empty())
    }

    /// Trim whitespace off a byte range; `None` when nothing is left.
    fn segment(&self, mut start: usize, mut end: usize) -> Option<(usize, usize)> {
        while start < end && self.source[start].is_ascii_whitespace() {
            start += 1;
        }
        while end > start && self.source[end - 1].is_ascii_whitespace() {
            end -= 1;
        }
        (start < end).then_some((start, end))
    }

    fn base_chunk(&self, chunk_type: ChunkType, start: usize, end: usize, parent_id: Option<&str>) -> Chunk {
        Chunk {
            node_id: Chunk::make_id(self.file_path, chunk_type, start, end),
            chunk_type,
            content: String::from_utf8_lossy(&self.source[start..end]).into_owned(),
            file_path: self.file_path.to_string(),
            start_line: self.lines.line_of(start),
            end_line: self.lines.line_of(end.saturating_sub(1).max(start)),
            language: self.config.name.to_string(),
            name: None,
            qualified_name: None,
            context: ChunkContext::default(),
            metadata: Default::default(),
            parent_id: parent_id.map(str::to_string),
            children_ids: Vec::new(),
            reference_ids: Vec::new(),
            referenced_by_ids: Vec::new(),
        }
    }

    fn collect_heritage(&mut self, root: Node<'t>, queries: &[Query]) {
        let mut found: Vec<(usize, usize, bool, String)> = Vec::new();
        for query in queries {
            for captures in query_matches(query, root, self.source) {
                for (capture, node) in captures {
                    let is_extends = match capture.as_str() {
                        "extends" => true,
                        "implements" => false,
                        _ => continue,
                    };
                    let Some(owner) = innermost_container(&self.primaries, node.start_byte(), node.end_byte(), None)
                    else {
                        continue;
                    };
                    found.push((owner, node.start_byte(), is_extends, collapse_whitespace(&self.text(node))));
                }
            }
        }
        found.sort_by_key(|(owner, start, _, _)| (*owner, *start));
        found.dedup();

        for (owner, _, is_extends, name) in found {
            let heritage = &mut self.heritage[owner];
            if is_extends && heritage.extends.is_none() {
                heritage.extends = Some(name);
            } else if !heritage.implements.contains(&name) {
                // additional bases (Python multiple inheritance) count as implemented
                heritage.implements.push(name);
            }
        }
    }

    fn collect_field_types(&mut self, root: Node<'t>, queries: &[Query]) {
        let mut found: Vec<(usize, usize, String)> = Vec::new();
        for query in queries {
            for captures in query_matches(query, root, self.source) {
                for (capture, node) in captures {
                    if capture != "field_type" {
                        continue;
                    }
                    if let Some(owner) = innermost_container(&self.primaries, node.start_byte(), node.end_byte(), None) {
                        found.push((owner, node.start_byte(), self.text(node)));
                    }
                }
            }
        }
        found.sort_by_key(|(owner, start, _)| (*owner, *start));
        for (owner, _, name) in found {
            if !self.field_types[owner].contains(&name) {
                self.field_types[owner].push(name);
            }
        }
    }

    fn context_strings(&self, node: Node<'t>, queries: &LanguageQueries) -> (Option<String>, Vec<String>) {
        let mut package = None;
        for query in &queries.package {
            for captures in query_matches(query, node, self.source) {
                for (capture, n) in captures {
                    if capture == "package" && package.is_none() {
                        package = Some(self.text(n).trim().to_string());
                    }
                }
            }
        }

        let mut imports: Vec<(usize, String)> = Vec::new();
        for query in &queries.import {
            for captures in query_matches(query, node, self.source) {
                let module = captures
                    .iter()
                    .find(|(c, _)| c == "module")
                    .map(|(_, n)| self.text(*n));
                let wildcard = captures.iter().any(|(c, _)| c == "wildcard");
                let import = captures.iter().find(|(c, _)| c == "import");

                let (start, raw) = match (module, import, wildcard) {
                    (Some(m), _, true) => (node.start_byte(), format!("{m}.*")),
                    (Some(m), Some((_, n)), false) => (n.start_byte(), format!("{m}.{}", self.text(*n))),
                    (None, Some((_, n)), _) => (n.start_byte(), self.text(*n)),
                    _ => continue,
                };
                imports.extend(normalize_import(&raw).into_iter().map(|i| (start, i)));
            }
        }
        imports.sort_by_key(|(start, _)| *start);

        let mut ordered = Vec::new();
        for (_, import) in imports {
            if !ordered.contains(&import) {
                ordered.push(import);
            }
        }
        (package, ordered)
    }

    fn emit_file(&mut self, contexts: &[Node<'t>], queries: &LanguageQueries) {
        let file_id = Chunk::make_id(self.file_path, ChunkType::File, 0, self.source.len());
        let mut file = self.base_chunk(ChunkType::File, 0, self.source.len(), None);
        file.node_id = file_id.clone();
        file.start_line = 1;
        file.name = Path::new(self.file_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        self.chunks.push(file);

        // context nodes first: the package prefixes every qualified name below
        let mut package: Option<String> = None;
        let mut imports: Vec<String> = Vec::new();
        let mut context_chunks = Vec::new();
        for &node in contexts {
            let (pkg, node_imports) = self.context_strings(node, queries);
            let is_package = self.config.package_kinds.contains(&node.kind());
            let chunk_type = if is_package { ChunkType::Context } else { ChunkType::Import };

            let mut chunk = self.base_chunk(chunk_type, node.start_byte(), node.end_byte(), Some(&file_id));
            chunk.name = pkg.clone().or_else(|| node_imports.first().cloned());
            chunk.context.package = pkg.clone();
            chunk.context.imports = node_imports.clone();
            chunk.metadata.insert("node_kind".to_string(), json!(node.kind()));
            context_chunks.push((node.start_byte(), chunk));

            if package.is_none() {
                package = pkg;
            }
            for import in node_imports {
                if !imports.contains(&import) {
                    imports.push(import);
                }
            }
        }

        self.chunks[0].qualified_name = package.clone();
        if let Some(module) = package.clone().or_else(|| module_path(self.file_path)) {
            self.chunks[0].metadata.insert("module".to_string(), json!(module));
        }
        self.chunks[0].context.package = package.clone();
        self.chunks[0].context.imports = imports;

        // root level: context chunks, top-level containers and orphans in source order
        let mut roots: Vec<(usize, Option<Chunk>, Option<Child>)> = context_chunks
            .into_iter()
            .map(|(start, chunk)| (start, Some(chunk), None))
            .collect();
        roots.extend(
            (0..self.primaries.len())
                .filter(|&i| self.primary_parent[i].is_none())
                .map(|i| (self.primaries[i].start_byte(), None, Some(Child::Container(i)))),
        );
        roots.extend(
            (0..self.secondaries.len())
                .filter(|&k| self.secondary_parent[k].is_none())
                .map(|k| (self.secondaries[k].start_byte(), None, Some(Child::Member(k)))),
        );
        roots.sort_by_key(|(start, _, _)| *start);

        let mut child_ids = Vec::new();
        for (_, chunk, child) in roots {
            if let Some(chunk) = chunk {
                child_ids.push(chunk.node_id.clone());
                self.chunks.push(chunk);
                continue;
            }
            match child {
                Some(Child::Container(i)) => {
                    child_ids.push(self.emit_container(i, &file_id, package.as_deref()));
                }
                Some(Child::Member(k)) => {
                    child_ids.push(self.emit_member(k, &file_id, package.as_deref(), ChunkType::OrphanedMember));
                }
                None => {}
            }
        }
        self.chunks[0].children_ids = child_ids;
    }

    fn emit_container(&mut self, i: usize, parent_id: &str, parent_qn: Option<&str>) -> String {
        let node = self.primaries[i];
        let mut chunk = self.base_chunk(ChunkType::Container, node.start_byte(), node.end_byte(), Some(parent_id));
        let id = chunk.node_id.clone();

        chunk.name = self.declaration_name(node);
        chunk.qualified_name = chunk.name.as_deref().map(|n| qualify(parent_qn, n));
        let heritage = std::mem::take(&mut self.heritage[i]);
        chunk.context.extends = heritage.extends;
        chunk.context.implements = heritage.implements;

        chunk.metadata.insert("node_kind".to_string(), json!(node.kind()));
        chunk.metadata.insert("is_interface".to_string(), json!(is_interface_like(node, self.config)));
        chunk.metadata.insert("signature".to_string(), json!(extract_signature(&chunk.content, self.config.name)));
        if !self.field_types[i].is_empty() {
            chunk.metadata.insert("field_types".to_string(), json!(self.field_types[i]));
        }

        let qualified = chunk.qualified_name.clone();
        let position = self.chunks.len();
        self.chunks.push(chunk);

        let mut children: Vec<(usize, usize, Child)> = (0..self.primaries.len())
            .filter(|&j| self.primary_parent[j] == Some(i))
            .map(|j| (self.primaries[j].start_byte(), self.primaries[j].end_byte(), Child::Container(j)))
            .collect();
        children.extend(
            (0..self.secondaries.len())
                .filter(|&k| self.secondary_parent[k] == Some(i))
                .map(|k| (self.secondaries[k].start_byte(), self.secondaries[k].end_byte(), Child::Member(k))),
        );
        children.sort_by_key(|(start, _, _)| *start);

        let mut child_ids = Vec::new();
        let bounds = children.first().map(|c| c.0).zip(children.last().map(|c| c.1));
        if let Some((first_start, last_end)) = bounds {
            if let Some((s, e)) = self.segment(node.start_byte(), first_start) {
                child_ids.push(self.emit_segment(s, e, &id, "declaration"));
            }
            for (_, _, child) in children {
                let child_id = match child {
                    Child::Container(j) => self.emit_container(j, &id, qualified.as_deref()),
                    Child::Member(k) => self.emit_member(k, &id, qualified.as_deref(), ChunkType::Member),
                };
                child_ids.push(child_id);
            }
            if let Some((s, e)) = self.segment(last_end, node.end_byte()) {
                child_ids.push(self.emit_segment(s, e, &id, "closing"));
            }
        }

        self.chunks[position].children_ids = child_ids;
        id
    }

    fn emit_segment(&mut self, start: usize, end: usize, parent_id: &str, role: &str) -> String {
        let mut chunk = self.base_chunk(ChunkType::Context, start, end, Some(parent_id));
        chunk.metadata.insert("segment".to_string(), json!(role));
        let id = chunk.node_id.clone();
        self.chunks.push(chunk);
        id
    }

    fn emit_member(&mut self, k: usize, parent_id: &str, parent_qn: Option<&str>, chunk_type: ChunkType) -> String {
        let node = self.secondaries[k];
        let mut chunk = self.base_chunk(chunk_type, node.start_byte(), node.end_byte(), Some(parent_id));

        chunk.name = self.declaration_name(node);
        chunk.qualified_name = chunk.name.as_deref().map(|n| qualify(parent_qn, n));

        if let Some(params) = node.child_by_field_name("parameters") {
            let mut cursor = params.walk();
            chunk.context.parameters = params
                .named_children(&mut cursor)
                .filter(|p| p.kind() != "comment")
                .map(|p| collapse_whitespace(&self.text(p)))
                .collect();
        }
        chunk.context.return_type = self
            .config
            .return_type_fields
            .iter()
            .find_map(|f| node.child_by_field_name(f))
            .map(|n| collapse_whitespace(self.text(n).trim_start_matches(':').trim()))
            .filter(|t| !t.is_empty());

        chunk.metadata.insert("node_kind".to_string(), json!(node.kind()));
        chunk.metadata.insert("signature".to_string(), json!(extract_signature(&chunk.content, self.config.name)));

        let id = chunk.node_id.clone();
        self.chunks.push(chunk);
        id
    }
}
