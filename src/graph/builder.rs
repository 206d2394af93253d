//! Multi-pass edge inference over a flat chunk list.
//!
//! Passes run in a fixed order (CONTAINS, EXTENDS/IMPLEMENTS, CALLS, USES,
//! IMPORTS) and only ever add edges. An edge is unique per
//! `(source, target, type)`; the first pass to produce it wins. All name
//! matching is textual: ties resolve to the first chunk in input order.
//! Imports also resolve against the module path each file chunk records.

use std::collections::{HashMap, HashSet};

use tracing::info;

use super::types::{DependencyEdge, DependencyGraph, DependencyType, EdgeLocation, NodeSummary};
use crate::indexer::chunk::{Chunk, ChunkType, simple_name};
use crate::indexer::references::{call_sites, identifiers};

const EXTENDS_STRENGTH: f64 = 1.0;
const IMPLEMENTS_STRENGTH: f64 = 0.9;
const CALLS_STRENGTH: f64 = 0.8;
const USES_FIELD_STRENGTH: f64 = 0.8;
const USES_BODY_STRENGTH: f64 = 0.7;
const IMPORTS_EXACT_STRENGTH: f64 = 0.7;
const IMPORTS_NAME_STRENGTH: f64 = 0.6;
const IMPORTS_WILDCARD_STRENGTH: f64 = 0.5;

/// Build the dependency graph for `chunks` and calculate its metrics.
pub fn build_graph(chunks: &[Chunk]) -> DependencyGraph {
    let mut builder = GraphBuilder::new(chunks);
    builder.contains_pass();
    builder.heritage_pass();
    builder.calls_pass();
    builder.uses_pass();
    builder.imports_pass();

    let nodes: Vec<NodeSummary> = builder.chunks.iter().map(|c| NodeSummary::from(*c)).collect();
    let graph = DependencyGraph::from_parts(nodes, builder.edges);
    let metrics = graph.metrics();
    info!(
        "Built dependency graph: {} nodes, {} edges, {} cycles, depth {}",
        metrics.node_count,
        metrics.edge_count,
        metrics.cyclic_dependencies.len(),
        metrics.dependency_depth
    );
    graph
}

fn is_symbol(chunk: &Chunk) -> bool {
    matches!(
        chunk.chunk_type,
        ChunkType::Container | ChunkType::Member | ChunkType::OrphanedMember
    )
}

struct GraphBuilder<'a> {
    chunks: Vec<&'a Chunk>,
    by_id: HashMap<&'a str, usize>,
    /// Containers by simple and by qualified name; first occurrence wins.
    types: HashMap<&'a str, usize>,
    /// Member-like chunks by simple name, in input order.
    members: HashMap<&'a str, Vec<usize>>,
    /// Symbols by qualified name and by simple name, in input order.
    qualified: HashMap<&'a str, Vec<usize>>,
    named: HashMap<&'a str, Vec<usize>>,
    /// File chunks carrying a module path, and their top-level symbols.
    modules: Vec<usize>,
    top_level: HashMap<&'a str, Vec<usize>>,
    edges: Vec<DependencyEdge>,
    seen: HashSet<(usize, usize, DependencyType)>,
}

impl<'a> GraphBuilder<'a> {
    fn new(input: &'a [Chunk]) -> Self {
        let mut chunks = Vec::with_capacity(input.len());
        let mut by_id = HashMap::with_capacity(input.len());
        for chunk in input {
            if by_id.contains_key(chunk.node_id.as_str()) {
                continue;
            }
            by_id.insert(chunk.node_id.as_str(), chunks.len());
            chunks.push(chunk);
        }

        let mut types = HashMap::new();
        let mut members: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut qualified: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut named: HashMap<&str, Vec<usize>> = HashMap::new();

        let mut modules = Vec::new();
        let mut top_level: HashMap<&str, Vec<usize>> = HashMap::new();

        for (i, chunk) in chunks.iter().enumerate() {
            if chunk.chunk_type == ChunkType::File && chunk.module().is_some() {
                modules.push(i);
            }
            if !is_symbol(chunk) {
                continue;
            }
            if let Some(parent) = chunk.parent_id.as_deref() {
                if by_id.get(parent).is_some_and(|&p| chunks[p].chunk_type == ChunkType::File) {
                    top_level.entry(parent).or_default().push(i);
                }
            }
            if let Some(qn) = chunk.qualified_name.as_deref() {
                qualified.entry(qn).or_default().push(i);
            }
            let Some(name) = chunk.name.as_deref().filter(|n| !n.is_empty()) else {
                continue;
            };
            named.entry(name).or_default().push(i);

            if chunk.chunk_type == ChunkType::Container {
                types.entry(name).or_insert(i);
                if let Some(qn) = chunk.qualified_name.as_deref() {
                    types.entry(qn).or_insert(i);
                }
            } else {
                members.entry(name).or_default().push(i);
            }
        }

        Self {
            chunks,
            by_id,
            types,
            members,
            qualified,
            named,
            modules,
            top_level,
            edges: Vec::new(),
            seen: HashSet::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn add_edge(
        &mut self,
        source: usize,
        target: usize,
        dependency_type: DependencyType,
        strength: f64,
        is_direct: bool,
        is_required: bool,
        description: String,
        locations: Vec<EdgeLocation>,
    ) {
        if source == target || !self.seen.insert((source, target, dependency_type)) {
            return;
        }
        self.edges.push(DependencyEdge {
            source_id: self.chunks[source].node_id.clone(),
            target_id: self.chunks[target].node_id.clone(),
            dependency_type,
            strength: strength.clamp(0.0, 1.0),
            is_direct,
            is_required,
            description,
            locations,
        });
    }

    fn is_ancestor(&self, ancestor: usize, mut node: usize) -> bool {
        while let Some(parent) = self.chunks[node]
            .parent_id
            .as_deref()
            .and_then(|p| self.by_id.get(p).copied())
        {
            if parent == ancestor {
                return true;
            }
            node = parent;
        }
        false
    }

    /// Container lookup: exact (qualified) name first, then simple name.
    fn resolve_type(&self, name: &str) -> Option<usize> {
        self.types
            .get(name)
            .or_else(|| self.types.get(simple_name(name)))
            .copied()
    }

    fn contains_pass(&mut self) {
        for parent in 0..self.chunks.len() {
            let chunk = self.chunks[parent];
            for child_id in &chunk.children_ids {
                if let Some(&child) = self.by_id.get(child_id.as_str()) {
                    self.add_edge(
                        parent,
                        child,
                        DependencyType::Contains,
                        1.0,
                        true,
                        true,
                        format!("{} contains {}", chunk.chunk_type, self.chunks[child].chunk_type),
                        Vec::new(),
                    );
                }
            }
        }
    }

    fn heritage_pass(&mut self) {
        for source in 0..self.chunks.len() {
            let chunk = self.chunks[source];
            if chunk.chunk_type != ChunkType::Container {
                continue;
            }
            if let Some(base) = chunk.context.extends.as_deref() {
                if let Some(target) = self.resolve_type(base) {
                    self.add_edge(
                        source,
                        target,
                        DependencyType::Extends,
                        EXTENDS_STRENGTH,
                        true,
                        true,
                        format!("extends {base}"),
                        Vec::new(),
                    );
                }
            }
            for interface in &chunk.context.implements {
                if let Some(target) = self.resolve_type(interface) {
                    self.add_edge(
                        source,
                        target,
                        DependencyType::Implements,
                        IMPLEMENTS_STRENGTH,
                        true,
                        true,
                        format!("implements {interface}"),
                        Vec::new(),
                    );
                }
            }
        }
    }

    /// One edge per (caller, callee) pair, carrying every call location.
    fn calls_pass(&mut self) {
        for source in 0..self.chunks.len() {
            let chunk = self.chunks[source];
            if !chunk.chunk_type.is_member_like() {
                continue;
            }
            let own_name = chunk.name.as_deref();

            let mut order: Vec<usize> = Vec::new();
            let mut found: HashMap<usize, Vec<EdgeLocation>> = HashMap::new();
            for site in call_sites(&chunk.content) {
                // the member's own declaration looks like a call
                if site.line_offset == 0 && Some(site.name) == own_name {
                    continue;
                }
                let Some(targets) = self.members.get(site.name) else {
                    continue;
                };
                for &target in targets {
                    if target == source {
                        continue;
                    }
                    let locations = found.entry(target).or_insert_with(|| {
                        order.push(target);
                        Vec::new()
                    });
                    locations.push(EdgeLocation {
                        line: chunk.start_line + site.line_offset,
                        column: site.column,
                        snippet: site.snippet.to_string(),
                    });
                }
            }

            for target in order {
                let locations = found.remove(&target).unwrap_or_default();
                let callee = self.chunks[target].display_name().to_string();
                self.add_edge(
                    source,
                    target,
                    DependencyType::Calls,
                    CALLS_STRENGTH,
                    true,
                    false,
                    format!("calls {callee}"),
                    locations,
                );
            }
        }
    }

    fn uses_pass(&mut self) {
        for source in 0..self.chunks.len() {
            let chunk = self.chunks[source];
            match chunk.chunk_type {
                ChunkType::Member | ChunkType::OrphanedMember => {
                    for word in identifiers(&chunk.content) {
                        let Some(target) = self.types.get(word).copied() else {
                            continue;
                        };
                        if self.is_ancestor(target, source) {
                            continue;
                        }
                        self.add_edge(
                            source,
                            target,
                            DependencyType::Uses,
                            USES_BODY_STRENGTH,
                            true,
                            false,
                            format!("references type {word}"),
                            Vec::new(),
                        );
                    }
                }
                ChunkType::Container => {
                    for field_type in chunk.metadata_strings("field_types") {
                        let Some(target) = self.resolve_type(&field_type) else {
                            continue;
                        };
                        self.add_edge(
                            source,
                            target,
                            DependencyType::Uses,
                            USES_FIELD_STRENGTH,
                            true,
                            true,
                            format!("field of type {field_type}"),
                            Vec::new(),
                        );
                    }
                }
                _ => {}
            }
        }
    }

    fn first_in_other_file(&self, candidates: Option<&Vec<usize>>, file_path: &str) -> Option<usize> {
        candidates?
            .iter()
            .copied()
            .find(|&i| self.chunks[i].file_path != file_path)
    }

    /// File chunks outside `file_path` whose module `import` names, with the
    /// match strength: exact module path, or a dotted suffix either way round
    /// (`example.com.proj.util` names Go package `util`).
    fn module_files(&self, import: &str, file_path: &str) -> Vec<(usize, f64)> {
        self.modules
            .iter()
            .copied()
            .filter(|&i| self.chunks[i].file_path != file_path)
            .filter_map(|i| {
                let module = self.chunks[i].module()?;
                if module == import {
                    Some((i, IMPORTS_EXACT_STRENGTH))
                } else if dotted_suffix(import, module) || dotted_suffix(module, import) {
                    Some((i, IMPORTS_NAME_STRENGTH))
                } else {
                    None
                }
            })
            .collect()
    }

    fn top_level_symbols(&self, file: usize) -> &[usize] {
        self.top_level
            .get(self.chunks[file].node_id.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// `module.Symbol` resolved through the module's file.
    fn resolve_module_member(&self, import: &str, file_path: &str) -> Option<(usize, f64)> {
        let (head, name) = import.rsplit_once('.')?;
        self.module_files(head, file_path).into_iter().find_map(|(file, strength)| {
            self.top_level_symbols(file)
                .iter()
                .copied()
                .find(|&i| self.chunks[i].name.as_deref() == Some(name))
                .map(|i| (i, strength))
        })
    }

    fn imports_pass(&mut self) {
        for source in 0..self.chunks.len() {
            let chunk = self.chunks[source];
            if chunk.chunk_type != ChunkType::File {
                continue;
            }
            for import in &chunk.context.imports {
                if let Some(prefix) = import.strip_suffix(".*") {
                    let dotted = format!("{prefix}.");
                    let mut targets: Vec<usize> = (0..self.chunks.len())
                        .filter(|&i| {
                            let c = self.chunks[i];
                            is_symbol(c)
                                && c.file_path != chunk.file_path
                                && c.qualified_name.as_deref().is_some_and(|q| q.starts_with(&dotted))
                        })
                        .collect();
                    for (file, _) in self.module_files(prefix, &chunk.file_path) {
                        targets.push(file);
                        targets.extend_from_slice(self.top_level_symbols(file));
                    }
                    for target in targets {
                        self.add_edge(
                            source,
                            target,
                            DependencyType::Imports,
                            IMPORTS_WILDCARD_STRENGTH,
                            false,
                            true,
                            format!("wildcard import {import}"),
                            Vec::new(),
                        );
                    }
                    continue;
                }

                let packages = self.module_files(import, &chunk.file_path);
                if !packages.is_empty() {
                    for (target, strength) in packages {
                        self.add_edge(
                            source,
                            target,
                            DependencyType::Imports,
                            strength,
                            true,
                            true,
                            format!("imports module {import}"),
                            Vec::new(),
                        );
                    }
                    continue;
                }

                let exact = self
                    .first_in_other_file(self.qualified.get(import.as_str()), &chunk.file_path)
                    .map(|t| (t, IMPORTS_EXACT_STRENGTH));
                let resolved = exact
                    .or_else(|| self.resolve_module_member(import, &chunk.file_path))
                    .or_else(|| {
                        let last = import.rsplit('.').next().unwrap_or(import);
                        self.first_in_other_file(self.named.get(last), &chunk.file_path)
                            .map(|t| (t, IMPORTS_NAME_STRENGTH))
                    });
                if let Some((target, strength)) = resolved {
                    self.add_edge(
                        source,
                        target,
                        DependencyType::Imports,
                        strength,
                        true,
                        true,
                        format!("imports {import}"),
                        Vec::new(),
                    );
                }
            }
        }
    }
}

/// `long` ends with `.short`.
fn dotted_suffix(long: &str, short: &str) -> bool {
    long.strip_suffix(short).is_some_and(|head| head.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::chunk::ChunkContext;

    fn chunk(id: &str, chunk_type: ChunkType, name: Option<&str>, content: &str, parent: Option<&str>) -> Chunk {
        Chunk {
            node_id: id.to_string(),
            chunk_type,
            content: content.to_string(),
            file_path: "a.rs".to_string(),
            start_line: 10,
            end_line: 12,
            language: "rust".to_string(),
            name: name.map(str::to_string),
            qualified_name: name.map(str::to_string),
            context: ChunkContext::default(),
            metadata: Default::default(),
            parent_id: parent.map(str::to_string),
            children_ids: Vec::new(),
            reference_ids: Vec::new(),
            referenced_by_ids: Vec::new(),
        }
    }

    fn edge_types(graph: &DependencyGraph, source: &str, target: &str) -> Vec<DependencyType> {
        graph
            .outgoing(source)
            .filter(|e| e.target_id == target)
            .map(|e| e.dependency_type)
            .collect()
    }

    #[test]
    fn test_contains_edges_follow_children() {
        let mut file = chunk("f", ChunkType::File, None, "", None);
        file.children_ids = vec!["c".to_string(), "missing".to_string()];
        let mut container = chunk("c", ChunkType::Container, Some("Repo"), "struct Repo", Some("f"));
        container.children_ids = vec!["m".to_string()];
        let member = chunk("m", ChunkType::Member, Some("load"), "fn load() {}", Some("c"));

        let graph = build_graph(&[file, container, member]);
        assert_eq!(edge_types(&graph, "f", "c"), vec![DependencyType::Contains]);
        assert_eq!(edge_types(&graph, "c", "m"), vec![DependencyType::Contains]);
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.edges().iter().all(|e| e.is_direct && e.is_required && e.strength == 1.0));
    }

    #[test]
    fn test_extends_and_implements_first_match() {
        let mut child = chunk("child", ChunkType::Container, Some("Admin"), "class Admin", None);
        child.context.extends = Some("models.User".to_string());
        child.context.implements = vec!["Auditable".to_string(), "Nowhere".to_string()];
        let user = chunk("user", ChunkType::Container, Some("User"), "class User", None);
        let user_dup = chunk("user2", ChunkType::Container, Some("User"), "class User", None);
        let auditable = chunk("aud", ChunkType::Container, Some("Auditable"), "trait Auditable", None);

        let graph = build_graph(&[child, user, user_dup, auditable]);
        assert_eq!(edge_types(&graph, "child", "user"), vec![DependencyType::Extends]);
        assert!(edge_types(&graph, "child", "user2").is_empty());
        let implements: Vec<_> = graph.edges_of_type(DependencyType::Implements).collect();
        assert_eq!(implements.len(), 1);
        assert_eq!(implements[0].target_id, "aud");
        assert_eq!(implements[0].strength, 0.9);
    }

    #[test]
    fn test_calls_record_locations_and_skip_declaration() {
        let caller = chunk(
            "run",
            ChunkType::OrphanedMember,
            Some("run"),
            "fn run() {\n    save(1);\n    if ok { save(2) }\n}",
            None,
        );
        let callee = chunk("save", ChunkType::OrphanedMember, Some("save"), "fn save(x: u8) {}", None);

        let graph = build_graph(&[caller, callee]);
        let calls: Vec<_> = graph.edges_of_type(DependencyType::Calls).collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].source_id, "run");
        assert_eq!(calls[0].strength, 0.8);
        assert_eq!(calls[0].locations.len(), 2);
        assert_eq!(calls[0].locations[0].line, 11);
        assert_eq!(calls[0].locations[0].column, 5);
        assert_eq!(calls[0].locations[0].snippet, "save(1);");
        assert_eq!(calls[0].locations[1].line, 12);
    }

    #[test]
    fn test_calls_are_pairwise_over_same_named_members() {
        let caller = chunk("main", ChunkType::OrphanedMember, Some("main"), "fn main() { close() }", None);
        let a = chunk("a", ChunkType::Member, Some("close"), "fn close() {}", None);
        let b = chunk("b", ChunkType::Member, Some("close"), "fn close() {}", None);

        let graph = build_graph(&[caller, a, b]);
        assert_eq!(edge_types(&graph, "main", "a"), vec![DependencyType::Calls]);
        assert_eq!(edge_types(&graph, "main", "b"), vec![DependencyType::Calls]);
        // the declaration of one `close` is not a call to the other
        assert!(edge_types(&graph, "a", "b").is_empty());
    }

    #[test]
    fn test_uses_body_and_field_types() {
        let store = chunk("store", ChunkType::Container, Some("Store"), "struct Store", None);
        let mut holder = chunk("holder", ChunkType::Container, Some("Holder"), "struct Holder { s: Store }", None);
        holder.metadata.insert("field_types".to_string(), serde_json::json!(["Store"]));
        holder.children_ids = vec!["method".to_string()];
        let method = chunk(
            "method",
            ChunkType::Member,
            Some("make"),
            "fn make() -> Holder { Holder { s: Store::new() } }",
            Some("holder"),
        );

        let graph = build_graph(&[store, holder, method]);
        let field_use = graph
            .outgoing("holder")
            .find(|e| e.dependency_type == DependencyType::Uses)
            .unwrap();
        assert_eq!(field_use.target_id, "store");
        assert_eq!(field_use.strength, 0.8);

        assert_eq!(edge_types(&graph, "method", "store"), vec![DependencyType::Uses]);
        // own container is not a USES target
        assert!(!edge_types(&graph, "method", "holder").contains(&DependencyType::Uses));
    }

    #[test]
    fn test_imports_exact_simple_and_wildcard() {
        let mut file = chunk("fa", ChunkType::File, None, "", None);
        file.context.imports = vec![
            "billing.Invoice".to_string(),
            "util.format_total".to_string(),
            "billing.*".to_string(),
            "missing.Thing".to_string(),
        ];

        let mut invoice = chunk("inv", ChunkType::Container, Some("Invoice"), "class Invoice", None);
        invoice.qualified_name = Some("billing.Invoice".to_string());
        invoice.file_path = "b.rs".to_string();
        let mut tax = chunk("tax", ChunkType::Container, Some("Tax"), "class Tax", None);
        tax.qualified_name = Some("billing.Tax".to_string());
        tax.file_path = "b.rs".to_string();
        let mut fmt = chunk("fmt", ChunkType::OrphanedMember, Some("format_total"), "fn format_total() {}", None);
        fmt.file_path = "c.rs".to_string();
        // same-file symbols are never import targets
        let local = chunk("local", ChunkType::Container, Some("Thing"), "struct Thing", None);

        let graph = build_graph(&[file, invoice, tax, fmt, local]);
        let strength = |target: &str| {
            graph
                .outgoing("fa")
                .find(|e| e.target_id == target)
                .map(|e| e.strength)
        };
        assert_eq!(strength("inv"), Some(0.7));
        assert_eq!(strength("fmt"), Some(0.6));
        assert_eq!(strength("tax"), Some(0.5));
        assert_eq!(strength("local"), None);
    }

    #[test]
    fn test_build_is_deterministic() {
        let chunks = vec![
            chunk("a", ChunkType::OrphanedMember, Some("alpha"), "fn alpha() { beta(); gamma() }", None),
            chunk("b", ChunkType::OrphanedMember, Some("beta"), "fn beta() { gamma() }", None),
            chunk("c", ChunkType::OrphanedMember, Some("gamma"), "fn gamma() { alpha() }", None),
        ];
        let first = build_graph(&chunks);
        let second = build_graph(&chunks);
        assert_eq!(first.edges(), second.edges());
        assert_eq!(first.metrics(), second.metrics());
        assert_eq!(first.metrics().cyclic_dependencies.len(), 1);
    }
}
