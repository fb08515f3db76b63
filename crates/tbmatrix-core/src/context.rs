//! Per-invocation context handed to every component.
//!
//! Created when an invocation starts and dropped when it ends; no component
//! keeps state outside of it.

use crate::backend::{SourceCompiler, Simulator};
use crate::error::Result;
use crate::flags::{FlagTranslator, LogicalFlag};
use crate::settings::Settings;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Read-only state shared by the registry, expander and dispatcher.
#[derive(Clone)]
pub struct InvocationContext {
    pub invocation_id: Uuid,
    pub settings: Settings,
    pub translator: FlagTranslator,
    pub compiler: Arc<dyn SourceCompiler>,
    pub simulator: Arc<dyn Simulator>,
    /// Relative source globs are resolved against this directory.
    pub base_dir: PathBuf,
}

impl InvocationContext {
    /// Build a context, rejecting an unregistered backend up front.
    pub fn new(
        settings: Settings,
        translator: FlagTranslator,
        compiler: Arc<dyn SourceCompiler>,
        simulator: Arc<dyn Simulator>,
    ) -> Result<Self> {
        translator.ensure_backend(&settings.backend)?;
        let translator = translator.with_policy(settings.unsupported_flags);
        Ok(Self {
            invocation_id: Uuid::new_v4(),
            settings,
            translator,
            compiler,
            simulator,
            base_dir: PathBuf::from("."),
        })
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Translate flags for the selected backend.
    pub fn translate(&self, flags: &[LogicalFlag]) -> Result<Vec<String>> {
        self.translator.translate(flags, &self.settings.backend)
    }
}
