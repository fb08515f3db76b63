//! Unit catalog: the testbenches discovered in resolved libraries.

use crate::error::{MatrixError, Result};
use crate::unit::{CompiledUnit, Testbench};
use std::path::PathBuf;
use tracing::warn;

/// One expanded glob, kept so compilation can replay resolution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGlob {
    pub library: String,
    pub pattern: String,
    pub sources: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
struct CatalogLibrary {
    name: String,
    units: Vec<CompiledUnit>,
}

/// Read-only after [`LibraryRegistry::resolve`](crate::library::LibraryRegistry::resolve).
#[derive(Debug, Clone, Default)]
pub struct UnitCatalog {
    libraries: Vec<CatalogLibrary>,
    globs: Vec<ResolvedGlob>,
    warnings: Vec<String>,
}

impl UnitCatalog {
    /// Empty catalog with libraries in registration order.
    pub fn new(libraries: impl IntoIterator<Item = String>) -> Self {
        Self {
            libraries: libraries
                .into_iter()
                .map(|name| CatalogLibrary {
                    name,
                    units: Vec::new(),
                })
                .collect(),
            globs: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add a unit; a unit re-declared in the same library replaces the earlier one.
    pub fn insert(&mut self, unit: CompiledUnit) {
        let position = self
            .libraries
            .iter()
            .position(|l| l.name.eq_ignore_ascii_case(&unit.library));
        let library = match position {
            Some(i) => &mut self.libraries[i],
            None => {
                self.libraries.push(CatalogLibrary {
                    name: unit.library.clone(),
                    units: Vec::new(),
                });
                let last = self.libraries.len() - 1;
                &mut self.libraries[last]
            }
        };

        if let Some(existing) = library
            .units
            .iter_mut()
            .find(|u| u.entity.eq_ignore_ascii_case(&unit.entity))
        {
            warn!(
                library = %unit.library,
                entity = %unit.entity,
                previous = %existing.source.display(),
                "Entity declared twice; keeping the later declaration"
            );
            *existing = unit;
        } else {
            library.units.push(unit);
        }
    }

    pub(crate) fn push_glob(&mut self, glob: ResolvedGlob) {
        self.globs.push(glob);
    }

    pub(crate) fn push_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// All compiled units, library by library.
    pub fn units(&self) -> impl Iterator<Item = &CompiledUnit> {
        self.libraries.iter().flat_map(|l| l.units.iter())
    }

    /// Testbenches ordered by library registration, then discovery order.
    ///
    /// Each call starts a fresh pass over the catalog.
    pub fn testbenches(&self) -> impl Iterator<Item = Testbench> + '_ {
        self.units()
            .filter(|u| u.is_testbench())
            .cloned()
            .map(Testbench::new)
    }

    /// First testbench named `name`, in catalog order.
    pub fn entity(&self, name: &str) -> Result<Testbench> {
        self.testbenches()
            .find(|tb| tb.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| MatrixError::UnknownEntity(name.to_string()))
    }

    /// Testbench `name` inside `library` only.
    pub fn entity_in(&self, library: &str, name: &str) -> Result<Testbench> {
        self.testbenches()
            .find(|tb| {
                tb.library().eq_ignore_ascii_case(library) && tb.name().eq_ignore_ascii_case(name)
            })
            .ok_or_else(|| MatrixError::UnknownEntity(format!("{library}.{name}")))
    }

    pub fn resolved_globs(&self) -> &[ResolvedGlob] {
        &self.globs
    }

    /// Non-fatal source problems collected in permissive mode.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}
