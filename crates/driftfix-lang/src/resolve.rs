//! Frame-to-source resolution.
//!
//! Given the interpreter's live frame stack, recover the AST node for
//! the instruction a frame is currently executing. The frame's code
//! fingerprint keys into a per-file correlation, which is cached
//! process-wide by content hash so repeat lookups in the same file are
//! a hash probe rather than a re-compile.

use crate::ast::{find_node, Node};
use crate::correlate::{correlate_file, FileCorrelation};
use crate::error::StructureError;
use crate::hooks::{HookRegistry, RewriteHook};
use crate::token::{tokenize, Token};
use crate::vm::{Frame, SourceStore};
use driftfix_core::hash::ContentHash;
use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

// ============================================================================
// Correlation Cache
// ============================================================================

/// Correlations keyed by `(file, content hash, hook name)`. A file
/// that changes on disk mid-session hashes differently and simply
/// misses, it never serves stale results.
#[derive(Default)]
pub struct CorrelationCache {
    entries: RefCell<HashMap<(PathBuf, ContentHash, String), Rc<FileCorrelation>>>,
}

impl CorrelationCache {
    pub fn new() -> Self {
        CorrelationCache::default()
    }

    fn get_or_correlate(
        &self,
        source: &str,
        file: &Path,
        hook: &dyn RewriteHook,
    ) -> Result<Rc<FileCorrelation>, StructureError> {
        let key = (
            file.to_path_buf(),
            ContentHash::compute(source.as_bytes()),
            hook.name().to_string(),
        );
        if let Some(correlation) = self.entries.borrow().get(&key) {
            return Ok(Rc::clone(correlation));
        }
        tracing::debug!(file = %file.display(), hook = hook.name(), "correlating source");
        let correlation = Rc::new(correlate_file(source, file, hook)?);
        self.entries
            .borrow_mut()
            .insert(key, Rc::clone(&correlation));
        Ok(correlation)
    }
}

// ============================================================================
// Lookup Result
// ============================================================================

/// A resolved call site: the file, the deep-copied AST node with its
/// original source positions, and the source text it came from.
#[derive(Debug)]
pub struct LookupResult {
    pub file: PathBuf,
    pub node_index: u32,
    pub node: Node,
    pub source: Arc<str>,
    tokens: OnceCell<Rc<Vec<Token>>>,
}

impl LookupResult {
    /// Token list for the whole file, tokenized on first use. The
    /// source already compiled, so tokenization cannot fail here.
    pub fn tokens(&self) -> Rc<Vec<Token>> {
        Rc::clone(self.tokens.get_or_init(|| {
            Rc::new(tokenize(&self.source, &self.file).unwrap_or_default())
        }))
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve the frame `depth` levels below the top of `frames` to the
/// AST node of the instruction it is executing.
pub fn resolve_frame(
    frames: &[Frame],
    depth: usize,
    sources: &SourceStore,
    cache: &CorrelationCache,
    hooks: &HookRegistry,
) -> Result<LookupResult, StructureError> {
    let height = frames.len();
    let frame = height
        .checked_sub(1 + depth)
        .and_then(|i| frames.get(i))
        .ok_or(StructureError::MissingFrame { depth, height })?;

    let file = frame.code.file.clone();
    let source = sources
        .load(&file)
        .map_err(|err| StructureError::MissingSource {
            file: file.clone(),
            message: err.to_string(),
        })?;

    let fingerprint = frame.code.fingerprint();
    for hook in hooks.iter() {
        let correlation = match cache.get_or_correlate(&source, &file, hook.as_ref()) {
            Ok(correlation) => correlation,
            Err(StructureError::Compile(message)) => {
                tracing::debug!(hook = hook.name(), %message, "hook compile failed, trying next");
                continue;
            }
            Err(other) => return Err(other),
        };
        let Some(entry) = correlation.by_fingerprint.get(&fingerprint) else {
            continue;
        };
        let map = entry
            .as_ref()
            .ok_or_else(|| StructureError::AmbiguousCodeObject {
                file: file.clone(),
                name: frame.code.name.clone(),
            })?;
        let node_index =
            map.get(&(frame.pc as u32))
                .copied()
                .ok_or_else(|| StructureError::UnknownOffset {
                    name: frame.code.name.clone(),
                    offset: frame.pc,
                })?;
        let node =
            find_node(&correlation.module, node_index).ok_or(StructureError::UnknownOffset {
                name: frame.code.name.clone(),
                offset: frame.pc,
            })?;
        return Ok(LookupResult {
            file,
            node_index,
            node,
            source,
            tokens: OnceCell::new(),
        });
    }
    Err(StructureError::UnmatchedBytecode {
        file,
        name: frame.code.name.clone(),
    })
}

// ============================================================================
// Tests
// ============================================================================
