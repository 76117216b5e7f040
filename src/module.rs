//! Module loader: path resolution, program cache, namespace cache, and
//! cycle detection.
//!
//! Owned by a single [`ModuleLoader`] value threaded explicitly through
//! evaluation (via [`crate::eval::Interpreter`]) rather than kept in
//! process-global statics, per SPEC_FULL.md §4.4/§9.

use crate::ast::Stmt;
use crate::error::RuntimeError;
use crate::value::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{instrument, trace};

/// The default source file extension appended when an import specifier has
/// none.
pub const SOURCE_EXTENSION: &str = "ds";

/// Tracks parsed programs, resolved namespaces, and in-flight imports.
#[derive(Default)]
pub struct ModuleLoader {
    programs: HashMap<PathBuf, std::rc::Rc<Stmt>>,
    results: HashMap<PathBuf, Value>,
    in_progress: HashSet<PathBuf>,
    context_stack: Vec<PathBuf>,
}

impl ModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves an import specifier relative to the current module context
    /// (or the process working directory at the root), normalizing `.`/`..`
    /// segments and appending [`SOURCE_EXTENSION`] if the specifier has no
    /// extension.
    pub fn resolve_import_path(&self, specifier: &str) -> Result<PathBuf, RuntimeError> {
        let raw = Path::new(specifier);
        let joined = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            let base = self
                .context_stack
                .last()
                .and_then(|p| p.parent())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            base.join(raw)
        };

        let with_ext = if joined.extension().is_none() {
            joined.with_extension(SOURCE_EXTENSION)
        } else {
            joined
        };

        Ok(normalize(&with_ext))
    }

    /// Returns the cached parse of `path`, parsing and caching it on first
    /// access.
    pub fn get_module_program(&mut self, path: &Path, source: &str) -> Result<std::rc::Rc<Stmt>, RuntimeError> {
        if let Some(program) = self.programs.get(path) {
            return Ok(std::rc::Rc::clone(program));
        }
        let mut parser = crate::parser::Parser::new(source)?;
        let program = std::rc::Rc::new(parser.parse_program()?);
        self.programs.insert(path.to_path_buf(), std::rc::Rc::clone(&program));
        Ok(program)
    }

    /// Returns a cached namespace result for `path`, if evaluated already.
    pub fn cached_result(&self, path: &Path) -> Option<Value> {
        self.results.get(path).cloned()
    }

    /// Caches the namespace result produced by evaluating `path`.
    pub fn cache_result(&mut self, path: &Path, value: Value) {
        self.results.insert(path.to_path_buf(), value);
    }

    /// Evicts any cached result for `path` (used on evaluation failure so a
    /// retried import is not served a partial namespace).
    pub fn evict_result(&mut self, path: &Path) {
        self.results.remove(path);
    }

    /// Marks `path` as in-progress. Fails if already in-progress (a cycle).
    #[instrument(skip(self), fields(module_path = %path.display()))]
    pub fn enter(&mut self, path: &Path) -> Result<(), RuntimeError> {
        if self.in_progress.contains(path) {
            return Err(RuntimeError::CircularImport {
                path: path.display().to_string(),
            });
        }
        self.in_progress.insert(path.to_path_buf());
        self.context_stack.push(path.to_path_buf());
        trace!("entered module");
        Ok(())
    }

    /// Clears the in-progress marker and pops the context stack for `path`.
    pub fn exit(&mut self, path: &Path) {
        self.in_progress.remove(path);
        self.context_stack.pop();
    }
}

/// Collapses `.`/`..` path segments without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        use std::path::Component;
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_to_current_context() {
        let mut loader = ModuleLoader::new();
        loader.context_stack.push(PathBuf::from("/proj/main.ds"));
        let resolved = loader.resolve_import_path("./lib/m").unwrap();
        assert_eq!(resolved, PathBuf::from("/proj/lib/m.ds"));
    }

    #[test]
    fn appends_default_extension_only_when_missing() {
        let loader = ModuleLoader::new();
        assert_eq!(loader.resolve_import_path("m").unwrap(), PathBuf::from("./m.ds"));
        assert_eq!(loader.resolve_import_path("m.ds").unwrap(), PathBuf::from("./m.ds"));
    }

    #[test]
    fn reentering_an_in_progress_path_is_a_cycle() {
        let mut loader = ModuleLoader::new();
        let path = PathBuf::from("/a.ds");
        loader.enter(&path).unwrap();
        let err = loader.enter(&path);
        assert!(matches!(err, Err(RuntimeError::CircularImport { .. })));
    }

    #[test]
    fn normalizes_dot_segments() {
        let p = normalize(Path::new("/a/b/../c/./d"));
        assert_eq!(p, PathBuf::from("/a/c/d"));
    }
}
