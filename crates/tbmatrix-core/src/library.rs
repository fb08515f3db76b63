//! Library registry: named, ordered bags of source globs.

use crate::backend::AnalyzeRequest;
use crate::catalog::{ResolvedGlob, UnitCatalog};
use crate::context::InvocationContext;
use crate::error::{MatrixError, Result};
use crate::flags::LogicalFlag;
use crate::settings::SourcePolicy;
use crate::sources::SourceGlob;
use crate::unit::CompiledUnit;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A registered library. Patterns are only expanded at resolve time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    pub name: String,
    pub patterns: Vec<String>,
}

/// Immutable snapshot of a library taken at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryHandle {
    index: usize,
    library: Library,
}

impl LibraryHandle {
    pub fn name(&self) -> &str {
        &self.library.name
    }

    pub fn patterns(&self) -> &[String] {
        &self.library.patterns
    }

    /// Position in registration order.
    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Debug, Clone, Default)]
pub struct LibraryRegistry {
    libraries: Vec<Library>,
}

impl LibraryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new library with its source globs.
    pub fn register<S: AsRef<str>>(&mut self, name: &str, patterns: &[S]) -> Result<LibraryHandle> {
        if self.position(name).is_some() {
            return Err(MatrixError::DuplicateLibrary(name.to_string()));
        }
        self.libraries.push(Library {
            name: name.to_string(),
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
        });
        let index = self.libraries.len() - 1;
        Ok(self.handle(index))
    }

    /// Append globs to an already registered library.
    pub fn add_sources<S: AsRef<str>>(&mut self, name: &str, patterns: &[S]) -> Result<LibraryHandle> {
        let index = self
            .position(name)
            .ok_or_else(|| MatrixError::UnknownLibrary(name.to_string()))?;
        self.libraries[index]
            .patterns
            .extend(patterns.iter().map(|p| p.as_ref().to_string()));
        Ok(self.handle(index))
    }

    pub fn get(&self, name: &str) -> Option<&Library> {
        self.position(name).map(|i| &self.libraries[i])
    }

    pub fn libraries(&self) -> &[Library] {
        &self.libraries
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.libraries
            .iter()
            .position(|l| l.name.eq_ignore_ascii_case(name))
    }

    fn handle(&self, index: usize) -> LibraryHandle {
        LibraryHandle {
            index,
            library: self.libraries[index].clone(),
        }
    }

    /// Expand every glob and read the declared units into a catalog.
    ///
    /// Globs are processed in registration order and matches in sorted
    /// order, asking the source collaborator once per glob.
    pub async fn resolve(&self, ctx: &InvocationContext) -> Result<UnitCatalog> {
        let mut catalog = UnitCatalog::new(self.libraries.iter().map(|l| l.name.clone()));

        for library in &self.libraries {
            for pattern in &library.patterns {
                let glob = SourceGlob::new(&ctx.base_dir, pattern)?;
                let sources = glob.expand();

                if sources.is_empty() {
                    match ctx.settings.source_policy {
                        SourcePolicy::Strict => {
                            return Err(MatrixError::NoSourcesMatched {
                                library: library.name.clone(),
                                pattern: pattern.clone(),
                            });
                        }
                        SourcePolicy::Permissive => {
                            warn!(library = %library.name, pattern = %pattern, "Source glob matched no files");
                            catalog.push_warning(format!(
                                "glob '{}' in library '{}' matched no source files",
                                pattern, library.name
                            ));
                            continue;
                        }
                    }
                }

                debug!(library = %library.name, pattern = %pattern, files = sources.len(), "Resolved glob");
                let declared = ctx.compiler.scan(&library.name, &sources).await?;
                for (source, decl) in declared {
                    catalog.insert(CompiledUnit::from_decl(&library.name, source, decl));
                }
                catalog.push_glob(ResolvedGlob {
                    library: library.name.clone(),
                    pattern: pattern.clone(),
                    sources,
                });
            }
        }

        info!(
            event = "matrix.resolved",
            libraries = self.libraries.len(),
            testbenches = catalog.testbenches().count(),
            warnings = catalog.warnings().len(),
        );
        Ok(catalog)
    }

    /// Compile every resolved glob with the translated compile flags.
    ///
    /// Runs in the same order as [`resolve`](Self::resolve) so that compiler
    /// diagnostics are reproducible.
    pub async fn compile(
        &self,
        ctx: &InvocationContext,
        catalog: &UnitCatalog,
        flags: &[LogicalFlag],
    ) -> Result<()> {
        let tokens = ctx.translate(flags)?;

        for glob in catalog.resolved_globs() {
            info!(library = %glob.library, pattern = %glob.pattern, "Compiling sources");
            let request = AnalyzeRequest {
                backend: ctx.settings.backend.clone(),
                library: glob.library.clone(),
                sources: glob.sources.clone(),
                flags: tokens.clone(),
                output_dir: ctx.settings.library_dir(),
            };
            ctx.compiler.analyze(&request).await?;
        }
        Ok(())
    }
}
