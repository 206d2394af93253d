//! Textual reference detection.
//!
//! These helpers are a heuristic, not symbol resolution: a chunk "references"
//! another when the other's simple name appears as a whole word in its content,
//! and "calls" it when that word is immediately followed by `(`.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use super::chunk::{Chunk, ChunkType};

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("identifier regex"));

static CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("call-site regex")
});

/// Control-flow words that look like calls (`if (x)`) but never are.
const KEYWORDS: &[&str] = &[
    "if", "while", "for", "match", "return", "switch", "catch", "elif", "and", "or", "not",
    "in", "fn", "def", "function", "func",
];

/// A call-shaped token inside some text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite<'a> {
    pub name: &'a str,
    /// 0-based line offset within the text.
    pub line_offset: usize,
    /// 1-based column of the name.
    pub column: usize,
    /// The trimmed line the call appears on.
    pub snippet: &'a str,
}

/// Distinct identifiers appearing as whole words in `text`.
pub fn identifier_set(text: &str) -> HashSet<&str> {
    IDENT_RE.find_iter(text).map(|m| m.as_str()).collect()
}

/// Distinct identifiers in order of first appearance.
pub fn identifiers(text: &str) -> Vec<&str> {
    let mut seen = HashSet::new();
    IDENT_RE
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|w| seen.insert(*w))
        .collect()
}

/// Every `name(` token in `text`, in source order.
pub fn call_sites(text: &str) -> Vec<CallSite<'_>> {
    let mut line_starts = vec![0usize];
    line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));

    CALL_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter(|m| !KEYWORDS.contains(&m.as_str()))
        .map(|m| {
            let line_offset = line_starts.partition_point(|&s| s <= m.start()) - 1;
            let line_start = line_starts[line_offset];
            let line_end = text[line_start..]
                .find('\n')
                .map_or(text.len(), |i| line_start + i);
            CallSite {
                name: m.as_str(),
                line_offset,
                column: text[line_start..m.start()].chars().count() + 1,
                snippet: text[line_start..line_end].trim(),
            }
        })
        .collect()
}

fn is_named_symbol(chunk: &Chunk) -> bool {
    matches!(
        chunk.chunk_type,
        ChunkType::Container | ChunkType::Member | ChunkType::OrphanedMember
    ) && chunk.name.as_deref().is_some_and(|n| !n.is_empty())
}

/// Fill `reference_ids` / `referenced_by_ids` for one file's chunks.
///
/// A chunk never references its own ancestors or descendants: a container's
/// text trivially contains its members' names.
pub fn link_references(chunks: &mut [Chunk]) {
    let index: HashMap<&str, usize> = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| (c.node_id.as_str(), i))
        .collect();

    let parents: Vec<Option<usize>> = chunks
        .iter()
        .map(|c| c.parent_id.as_deref().and_then(|p| index.get(p).copied()))
        .collect();

    let is_ancestor = |ancestor: usize, mut node: usize| -> bool {
        while let Some(p) = parents[node] {
            if p == ancestor {
                return true;
            }
            node = p;
        }
        false
    };

    let symbols: Vec<usize> = (0..chunks.len())
        .filter(|&i| is_named_symbol(&chunks[i]))
        .collect();

    let mut links: Vec<(usize, usize)> = Vec::new();
    for &a in &symbols {
        let words = identifier_set(&chunks[a].content);
        for &b in &symbols {
            if a == b || is_ancestor(a, b) || is_ancestor(b, a) {
                continue;
            }
            let Some(name) = chunks[b].name.as_deref() else {
                continue;
            };
            if words.contains(name) {
                links.push((a, b));
            }
        }
    }

    for (a, b) in links {
        let target = chunks[b].node_id.clone();
        let source = chunks[a].node_id.clone();
        if !chunks[a].reference_ids.contains(&target) {
            chunks[a].reference_ids.push(target);
        }
        if !chunks[b].referenced_by_ids.contains(&source) {
            chunks[b].referenced_by_ids.push(source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(id: &str, chunk_type: ChunkType, name: &str, content: &str, parent: Option<&str>) -> Chunk {
        Chunk {
            node_id: id.to_string(),
            chunk_type,
            content: content.to_string(),
            file_path: "lib.rs".to_string(),
            start_line: 1,
            end_line: 1,
            language: "rust".to_string(),
            name: Some(name.to_string()),
            qualified_name: Some(name.to_string()),
            context: Default::default(),
            metadata: Default::default(),
            parent_id: parent.map(str::to_string),
            children_ids: Vec::new(),
            reference_ids: Vec::new(),
            referenced_by_ids: Vec::new(),
        }
    }

    #[test]
    fn test_identifiers_first_appearance_order() {
        assert_eq!(identifiers("b(a, b) + c_1 * a"), vec!["b", "a", "c_1"]);
    }

    #[test]
    fn test_call_sites_positions() {
        let text = "fn run() {\n    let v = helper (1);\n    if (v) { other(v) }\n}";
        let calls = call_sites(text);
        let names: Vec<&str> = calls.iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["run", "helper", "other"]);

        let helper = &calls[1];
        assert_eq!(helper.line_offset, 1);
        assert_eq!(helper.column, 13);
        assert_eq!(helper.snippet, "let v = helper (1);");
    }

    #[test]
    fn test_link_references_symmetric_and_skips_ancestors() {
        let mut chunks = vec![
            symbol("c", ChunkType::Container, "Store", "impl Store { fn save() { flush() } fn flush() {} }", None),
            symbol("m1", ChunkType::Member, "save", "fn save() { flush() }", Some("c")),
            symbol("m2", ChunkType::Member, "flush", "fn flush() { Store::log() }", Some("c")),
            symbol("o", ChunkType::OrphanedMember, "main", "fn main() { Store::save() }", None),
        ];
        link_references(&mut chunks);

        // container does not reference its own members, members not their container
        assert!(chunks[0].reference_ids.is_empty());
        assert!(!chunks[2].reference_ids.contains(&"c".to_string()));

        assert_eq!(chunks[1].reference_ids, vec!["m2".to_string()]);
        assert!(chunks[2].referenced_by_ids.contains(&"m1".to_string()));

        assert_eq!(chunks[3].reference_ids, vec!["c".to_string(), "m1".to_string()]);
        assert!(chunks[0].referenced_by_ids.contains(&"o".to_string()));
    }
}
