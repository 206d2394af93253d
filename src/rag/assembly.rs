use tracing::debug;

use crate::indexer::chunk::Chunk;

/// Rough token count used for budgeting: four characters per token.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledContext {
    pub context_text: String,
    pub included: Vec<String>,
    pub excluded: Vec<String>,
    pub total_tokens: usize,
}

fn section(chunk: &Chunk) -> String {
    format!(
        "// {}:{}-{} {}\n{}\n",
        chunk.file_path,
        chunk.start_line,
        chunk.end_line,
        chunk.display_name(),
        chunk.content
    )
}

/// Greedily pack `candidates` (best first) into at most `token_budget`
/// tokens. A candidate that does not fit is skipped and packing continues
/// with the next one.
pub fn assemble<'c>(candidates: impl IntoIterator<Item = &'c Chunk>, token_budget: usize) -> AssembledContext {
    let mut out = AssembledContext::default();
    for chunk in candidates {
        let text = section(chunk);
        let tokens = estimate_tokens(&text);
        if out.total_tokens + tokens > token_budget {
            out.excluded.push(chunk.node_id.clone());
            continue;
        }
        if !out.context_text.is_empty() {
            out.context_text.push('\n');
        }
        out.context_text.push_str(&text);
        out.total_tokens += tokens;
        out.included.push(chunk.node_id.clone());
    }
    debug!(
        "assembled {} chunks ({} tokens), {} over budget",
        out.included.len(),
        out.total_tokens,
        out.excluded.len()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::chunk::ChunkType;

    fn chunk(id: &str, content: &str) -> Chunk {
        Chunk {
            node_id: id.to_string(),
            chunk_type: ChunkType::Member,
            content: content.to_string(),
            file_path: "lib.rs".to_string(),
            start_line: 1,
            end_line: 1,
            language: "rust".to_string(),
            name: Some(id.to_string()),
            qualified_name: Some(id.to_string()),
            context: Default::default(),
            metadata: Default::default(),
            parent_id: None,
            children_ids: Vec::new(),
            reference_ids: Vec::new(),
            referenced_by_ids: Vec::new(),
        }
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcdefg"), 1);
        assert_eq!(estimate_tokens("ééééééé\u{e9}"), 2);
    }

    #[test]
    fn test_oversized_candidate_is_skipped() {
        let big = chunk("big", &"x".repeat(400));
        let small = chunk("small", "fn small() {}");
        let result = assemble([&big, &small], 50);

        assert_eq!(result.included, vec!["small".to_string()]);
        assert_eq!(result.excluded, vec!["big".to_string()]);
        assert!(result.total_tokens <= 50);
        assert!(result.context_text.starts_with("// lib.rs:1-1 small\n"));
    }

    #[test]
    fn test_packs_in_order_until_budget() {
        let chunks: Vec<Chunk> = (0..5).map(|i| chunk(&format!("c{i}"), &"y".repeat(80))).collect();
        let result = assemble(&chunks, 60);

        assert_eq!(result.included, vec!["c0".to_string(), "c1".to_string()]);
        assert_eq!(result.excluded.len(), 3);
        let expected: usize = chunks[..2].iter().map(|c| estimate_tokens(&section(c))).sum();
        assert_eq!(result.total_tokens, expected);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(assemble(std::iter::empty(), 100), AssembledContext::default());
    }
}
