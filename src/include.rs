use crate::ast::{Item, Program};
use crate::error::IncludeError;
use crate::{lexer, parser};
use indexmap::IndexSet;
use std::path::{Path, PathBuf};

/// A top-level declaration tagged with the namespace it came from. `None`
/// for declarations written in the translation unit itself; headers
/// contribute their basename (without `.c5h`) as namespace.
#[derive(Debug, Clone)]
pub struct NsItem {
    pub namespace: Option<String>,
    pub item: Item,
}

pub struct Resolver {
    include_paths: Vec<PathBuf>,
    visited: IndexSet<PathBuf>,
}

impl Resolver {
    pub fn new(include_paths: Vec<PathBuf>) -> Self {
        Resolver {
            include_paths,
            visited: IndexSet::new(),
        }
    }

    /// Flatten a parsed program into namespaced declarations, loading every
    /// `include <...>` directive recursively. Cyclic includes are
    /// deduplicated by canonical path and silently skipped.
    pub fn expand(
        &mut self,
        program: Program,
        source_dir: &Path,
    ) -> Result<Vec<NsItem>, IncludeError> {
        let mut out = Vec::new();
        for item in program.0 {
            match item {
                Item::Include(name, _) => {
                    self.load_header(&name, source_dir, &mut out)?;
                }
                item => out.push(NsItem {
                    namespace: None,
                    item,
                }),
            }
        }
        Ok(out)
    }

    /// Search order: the including file's directory, each `-I` path in
    /// order, `./c5include/`, then `$HOME/.c5/include/`. First hit wins.
    fn search_trail(&self, source_dir: &Path) -> Vec<PathBuf> {
        let mut trail = vec![source_dir.to_path_buf()];
        trail.extend(self.include_paths.iter().cloned());
        trail.push(PathBuf::from("c5include"));
        if let Some(home) = std::env::var_os("HOME") {
            trail.push(Path::new(&home).join(".c5").join("include"));
        }
        trail
    }

    fn load_header(
        &mut self,
        name: &str,
        source_dir: &Path,
        out: &mut Vec<NsItem>,
    ) -> Result<(), IncludeError> {
        let trail = self.search_trail(source_dir);
        let found = trail.iter().map(|dir| dir.join(name)).find(|p| p.is_file());
        let Some(path) = found else {
            return Err(IncludeError::NotFound {
                name: name.to_string(),
                trail,
            });
        };

        let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
        if !self.visited.insert(canonical) {
            // Already loaded through another include chain.
            return Ok(());
        }

        let code = std::fs::read_to_string(&path).map_err(|source| IncludeError::Unreadable {
            name: name.to_string(),
            source,
        })?;
        let tokens = lexer::lex(&path.to_string_lossy(), &code)?;
        let (program, errors) = parser::parse(&tokens);
        if let Some(err) = errors.into_iter().next() {
            return Err(IncludeError::Parse(err));
        }

        // The header's basename is its namespace: std.c5h -> std::
        let namespace = name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(name)
            .to_string();
        let header_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();

        for item in program.0 {
            match item {
                Item::Include(inner, _) => {
                    self.load_header(&inner, &header_dir, out)?;
                }
                item => out.push(NsItem {
                    namespace: Some(namespace.clone()),
                    item,
                }),
            }
        }
        Ok(())
    }
}
