use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use globset::GlobSet;
use ignore::WalkBuilder;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::db::{Db, GraphStore};
use crate::embedder::Embedder;
use crate::error::Result;
use crate::graph::{DependencyGraph, build_graph};
use crate::indexer::chunk::Chunk;
use crate::indexer::extractor::ChunkExtractor;
use crate::indexer::languages::LanguageConfig;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub removed: usize,
    /// Chunks in the rebuilt graph, across all files.
    pub chunks: usize,
    pub edges: usize,
}

#[derive(Debug)]
pub struct ExtractedFile {
    /// Path relative to the indexed directory, `/`-separated.
    pub path: String,
    pub modified_at: DateTime<Utc>,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Default)]
pub struct Extraction {
    /// Sorted by path.
    pub files: Vec<ExtractedFile>,
    pub failed: Vec<String>,
}

impl Extraction {
    pub fn all_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.files.iter().flat_map(|f| f.chunks.iter())
    }
}

/// Supported source files under `dir`, honouring `.gitignore` and `exclude`.
pub fn collect_files(dir: &Path, exclude: &GlobSet) -> Vec<(String, PathBuf)> {
    // Walk builder respects .gitignore by default
    let walker = WalkBuilder::new(dir).hidden(false).build();

    let mut files = Vec::new();
    for entry in walker.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or_default();
        if !LanguageConfig::is_supported_extension(ext) {
            continue;
        }
        let relative = path.strip_prefix(dir).unwrap_or(path);
        // Stored paths use forward slashes on every platform.
        let rel_str = relative.to_string_lossy().replace('\\', "/");
        if exclude.is_match(&rel_str) {
            debug!("excluded: {rel_str}");
            continue;
        }
        files.push((rel_str, path.to_path_buf()));
    }
    files.sort();
    files
}

/// Extract every supported file under `dir` on the blocking pool.
///
/// Files that fail with a file-local error (unreadable, unparsable,
/// unsupported) are logged and listed in [`Extraction::failed`]. Any other
/// error aborts the batch.
pub async fn extract_directory(extractor: Arc<ChunkExtractor>, dir: &Path, exclude: &GlobSet) -> Result<Extraction> {
    let mut tasks = JoinSet::new();
    for (rel_path, real_path) in collect_files(dir, exclude) {
        let extractor = Arc::clone(&extractor);
        tasks.spawn_blocking(move || {
            let modified_at: Result<DateTime<Utc>> = std::fs::metadata(&real_path)
                .and_then(|m| m.modified())
                .map(Into::into)
                .map_err(Into::into);
            let chunks = modified_at
                .and_then(|mtime| extractor.extract_file(&real_path, &rel_path).map(|chunks| (mtime, chunks)));
            (rel_path, chunks)
        });
    }

    let mut extraction = Extraction::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((path, Ok((modified_at, chunks)))) => extraction.files.push(ExtractedFile {
                path,
                modified_at,
                chunks,
            }),
            Ok((path, Err(e))) if e.is_file_local() => {
                warn!("skipping {path}: {e}");
                extraction.failed.push(path);
            }
            Ok((_, Err(e))) => return Err(e),
            Err(e) => warn!("extraction task failed: {e}"),
        }
    }
    extraction.files.sort_by(|a, b| a.path.cmp(&b.path));
    extraction.failed.sort();
    Ok(extraction)
}

/// Differential indexer: re-embeds changed files and rebuilds the graph over
/// the whole tree on every run.
pub struct Indexer<'a, E: Embedder + ?Sized> {
    pub db: Arc<TokioMutex<Db>>,
    pub embedder: &'a E,
    extractor: Arc<ChunkExtractor>,
    exclude: GlobSet,
}

impl<'a, E: Embedder + ?Sized> Indexer<'a, E> {
    pub fn new(db: Arc<TokioMutex<Db>>, embedder: &'a E, exclude: GlobSet) -> Result<Self> {
        Ok(Self {
            db,
            embedder,
            extractor: Arc::new(ChunkExtractor::new()?),
            exclude,
        })
    }

    /// Index `dir`. Unchanged files (same mtime) are not re-embedded unless
    /// `force` is set; files gone from disk are removed from the store.
    pub async fn index_directory<P: AsRef<Path>>(&self, dir: P, force: bool) -> Result<IndexSummary> {
        let dir = dir.as_ref();
        let existing = {
            let db_guard = self.db.lock().await;
            db_guard.list_files()?
        };

        let extraction = extract_directory(Arc::clone(&self.extractor), dir, &self.exclude).await?;
        let mut summary = IndexSummary {
            failed: extraction.failed.len(),
            ..Default::default()
        };

        // Keep previously stored chunks of files that failed this time so
        // the rebuilt graph still covers them.
        let mut all_chunks: Vec<Chunk> = extraction.all_chunks().cloned().collect();
        {
            let db_guard = self.db.lock().await;
            for path in extraction.failed.iter().filter(|p| existing.contains_key(*p)) {
                all_chunks.extend(db_guard.file_chunks(path)?.into_iter().map(|s| s.chunk));
            }
        }
        let graph = build_graph(&all_chunks);

        for file in &extraction.files {
            match existing.get(&file.path) {
                Some(prev) if !force && prev.timestamp() == file.modified_at.timestamp() => {
                    summary.skipped += 1;
                    continue;
                }
                Some(_) => summary.updated += 1,
                None => summary.added += 1,
            }
            self.store_file(file, &graph).await?;
        }

        let seen: HashSet<&str> = extraction
            .files
            .iter()
            .map(|f| f.path.as_str())
            .chain(extraction.failed.iter().map(String::as_str))
            .collect();
        {
            let mut db_guard = self.db.lock().await;
            for path in existing.keys().filter(|p| !seen.contains(p.as_str())) {
                let removed = db_guard.delete_file(path)?;
                debug!("removed {path} ({removed} chunks)");
                summary.removed += 1;
            }
            db_guard.sync_graph(&graph)?;
        }

        summary.chunks = graph.node_count();
        summary.edges = graph.edge_count();
        info!(
            "Indexed {}: {} added, {} updated, {} skipped, {} failed, {} removed",
            dir.display(),
            summary.added,
            summary.updated,
            summary.skipped,
            summary.failed,
            summary.removed
        );
        Ok(summary)
    }

    /// Replace one file's chunks and vectors.
    async fn store_file(&self, file: &ExtractedFile, graph: &DependencyGraph) -> Result<()> {
        // Generate embedding text enriched with language + symbol context
        let texts: Vec<String> = file.chunks.iter().map(|c| c.get_embedding_text()).collect();
        let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = self.embedder.embed_batch(&text_refs)?;

        let mut db_guard = self.db.lock().await;
        db_guard.delete_file(&file.path)?;
        db_guard.insert_batch(&file.chunks, &vectors, graph)?;
        db_guard.record_file(&file.path, file.modified_at)?;
        debug!("stored {} ({} chunks)", file.path, file.chunks.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::EdgeFilter;
    use crate::embedder::mock::MockEmbedder;
    use crate::graph::DependencyType;
    use std::fs;
    use tempfile::tempdir;

    const BASE: &str = "class Base:\n    def greet(self):\n        return \"hi\"\n";
    const CHILD: &str = "from a import Base\n\nclass Child(Base):\n    def run(self):\n        return self.greet()\n";

    fn indexer(embedder: &MockEmbedder) -> Indexer<'_, MockEmbedder> {
        let db = Db::open_in_memory(embedder.dimensions()).unwrap();
        let exclude = Config::default().exclude_set().unwrap();
        Indexer::new(Arc::new(TokioMutex::new(db)), embedder, exclude).unwrap()
    }

    #[test]
    fn test_collect_files_filters_and_sorts() {
        let temp_dir = tempdir().unwrap();
        let dir = temp_dir.path();
        fs::create_dir_all(dir.join("target")).unwrap();
        fs::write(dir.join("z.py"), BASE).unwrap();
        fs::write(dir.join("a.go"), "package a\n").unwrap();
        fs::write(dir.join("notes.md"), "# notes").unwrap();
        fs::write(dir.join("target/gen.rs"), "fn x() {}").unwrap();

        let files = collect_files(dir, &Config::default().exclude_set().unwrap());
        let names: Vec<&str> = files.iter().map(|(rel, _)| rel.as_str()).collect();
        assert_eq!(names, vec!["a.go", "z.py"]);
    }

    #[tokio::test]
    async fn test_indexer_differential_sync() {
        let temp_dir = tempdir().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("a.py"), BASE).unwrap();
        fs::write(dir.join("b.py"), CHILD).unwrap();

        let embedder = MockEmbedder::default();
        let indexer = indexer(&embedder);

        // First sync
        let first = indexer.index_directory(dir, false).await.unwrap();
        assert_eq!(first.added, 2);
        assert_eq!(first.skipped, 0);
        assert_eq!(first.failed, 0);
        assert!(first.chunks > 0);
        assert!(first.edges > 0);

        let extends = {
            let db = indexer.db.lock().await;
            db.get_edges(&EdgeFilter {
                edge_type: Some(DependencyType::Extends),
                ..Default::default()
            })
            .unwrap()
        };
        assert_eq!(extends.len(), 1);

        // Second sync immediately - should skip both
        let second = indexer.index_directory(dir, false).await.unwrap();
        assert_eq!(second.added + second.updated, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(second.edges, first.edges);

        // Force re-embeds everything
        let third = indexer.index_directory(dir, true).await.unwrap();
        assert_eq!(third.updated, 2);
        assert_eq!(third.skipped, 0);

        // Deleted files leave the store along with their edges
        fs::remove_file(dir.join("b.py")).unwrap();
        let fourth = indexer.index_directory(dir, false).await.unwrap();
        assert_eq!(fourth.removed, 1);
        let db = indexer.db.lock().await;
        assert_eq!(db.list_files().unwrap().len(), 1);
        assert!(db.file_chunks("b.py").unwrap().is_empty());
        assert!(
            db.get_edges(&EdgeFilter {
                edge_type: Some(DependencyType::Extends),
                ..Default::default()
            })
            .unwrap()
            .is_empty()
        );
    }

    #[tokio::test]
    async fn test_extract_directory_is_ordered() {
        let temp_dir = tempdir().unwrap();
        let dir = temp_dir.path();
        for name in ["c.py", "a.py", "b.py"] {
            fs::write(dir.join(name), BASE).unwrap();
        }
        let extractor = Arc::new(ChunkExtractor::new().unwrap());
        let extraction = extract_directory(extractor, dir, &GlobSet::empty()).await.unwrap();
        let paths: Vec<&str> = extraction.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "b.py", "c.py"]);
        assert!(extraction.failed.is_empty());
        assert!(extraction.all_chunks().all(|c| paths.contains(&c.file_path.as_str())));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_file_is_listed_as_failed() {
        let temp_dir = tempdir().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("a.py"), BASE).unwrap();
        std::os::unix::fs::symlink(dir.join("gone.py"), dir.join("broken.py")).unwrap();

        let extractor = Arc::new(ChunkExtractor::new().unwrap());
        let extraction = extract_directory(extractor, dir, &GlobSet::empty()).await.unwrap();
        let paths: Vec<&str> = extraction.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.py"]);
        assert_eq!(extraction.failed, vec!["broken.py".to_string()]);
    }
}
