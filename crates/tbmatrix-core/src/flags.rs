//! Backend-independent flag intents and their per-backend spelling.

use crate::error::{MatrixError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, warn};

/// Identifier of a compile/simulate backend (`ghdl`, `nvc`, `modelsim`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(String);

impl BackendId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A compiler or simulator intent expressed without backend vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalFlag {
    /// Accept constructs the standard only tolerates loosely.
    RelaxedRules,
    /// Relax elaboration-time checks.
    RelaxElaboration,
    /// Silence one warning class (`hide`, `shared`, ...).
    SuppressWarning(String),
}

impl LogicalFlag {
    pub fn intent(&self) -> FlagIntent {
        match self {
            LogicalFlag::RelaxedRules => FlagIntent::RelaxedRules,
            LogicalFlag::RelaxElaboration => FlagIntent::RelaxElaboration,
            LogicalFlag::SuppressWarning(_) => FlagIntent::SuppressWarning,
        }
    }

    fn argument(&self) -> Option<&str> {
        match self {
            LogicalFlag::SuppressWarning(kind) => Some(kind),
            _ => None,
        }
    }
}

impl fmt::Display for LogicalFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalFlag::RelaxedRules => f.write_str("relaxed_rules"),
            LogicalFlag::RelaxElaboration => f.write_str("relax_elaboration"),
            LogicalFlag::SuppressWarning(kind) => write!(f, "suppress_warning({kind})"),
        }
    }
}

/// Table key: a [`LogicalFlag`] with its argument erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagIntent {
    RelaxedRules,
    RelaxElaboration,
    SuppressWarning,
}

/// What to do with an intent the selected backend has no spelling for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsupportedFlagPolicy {
    /// Leave it out silently.
    #[default]
    Drop,
    /// Leave it out and log a warning.
    Warn,
}

/// Literal token templates for one backend. `{}` is replaced by the flag argument.
#[derive(Debug, Clone, Default)]
pub struct BackendProfile {
    rules: HashMap<FlagIntent, Vec<String>>,
}

impl BackendProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, intent: FlagIntent, tokens: &[&str]) -> Self {
        self.rules
            .insert(intent, tokens.iter().map(|t| t.to_string()).collect());
        self
    }

    fn render(&self, flag: &LogicalFlag) -> Option<Vec<String>> {
        let templates = self.rules.get(&flag.intent())?;
        Some(
            templates
                .iter()
                .map(|t| match flag.argument() {
                    Some(arg) => t.replace("{}", arg),
                    None => t.clone(),
                })
                .collect(),
        )
    }
}

/// Static (LogicalFlag, BackendId) → tokens table.
#[derive(Debug, Clone, Default)]
pub struct FlagTranslator {
    backends: BTreeMap<BackendId, BackendProfile>,
    policy: UnsupportedFlagPolicy,
}

impl FlagTranslator {
    /// Translator with the GHDL, NVC and ModelSim/Questa tables.
    pub fn builtin() -> Self {
        let mut translator = Self::default();
        translator.register_backend(
            BackendId::new("ghdl"),
            BackendProfile::new()
                .rule(FlagIntent::RelaxedRules, &["-frelaxed-rules"])
                .rule(FlagIntent::RelaxElaboration, &["-frelaxed"])
                .rule(FlagIntent::SuppressWarning, &["-Wno-{}"]),
        );
        translator.register_backend(
            BackendId::new("nvc"),
            BackendProfile::new().rule(FlagIntent::RelaxedRules, &["--relaxed"]),
        );
        let mentor = BackendProfile::new().rule(FlagIntent::RelaxElaboration, &["-permissive"]);
        translator.register_backend(BackendId::new("modelsim"), mentor.clone());
        translator.register_backend(BackendId::new("questa"), mentor);
        translator
    }

    pub fn with_policy(mut self, policy: UnsupportedFlagPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn register_backend(&mut self, id: BackendId, profile: BackendProfile) {
        self.backends.insert(id, profile);
    }

    pub fn is_registered(&self, backend: &BackendId) -> bool {
        self.backends.contains_key(backend)
    }

    /// Fail with `UnknownBackend` unless `backend` is registered.
    pub fn ensure_backend(&self, backend: &BackendId) -> Result<()> {
        if self.is_registered(backend) {
            Ok(())
        } else {
            Err(MatrixError::UnknownBackend(backend.to_string()))
        }
    }

    pub fn backends(&self) -> impl Iterator<Item = &BackendId> {
        self.backends.keys()
    }

    /// Translate `flags` into literal tokens for `backend`.
    ///
    /// Tokens come out in input order with duplicates removed. Intents the
    /// backend has no row for are dropped according to the policy.
    pub fn translate(&self, flags: &[LogicalFlag], backend: &BackendId) -> Result<Vec<String>> {
        let profile = self
            .backends
            .get(backend)
            .ok_or_else(|| MatrixError::UnknownBackend(backend.to_string()))?;

        let mut tokens: Vec<String> = Vec::new();
        for flag in flags {
            match profile.render(flag) {
                Some(rendered) => {
                    for token in rendered {
                        if !tokens.contains(&token) {
                            tokens.push(token);
                        }
                    }
                }
                None => match self.policy {
                    UnsupportedFlagPolicy::Drop => {
                        debug!(backend = %backend, flag = %flag, "Dropping unsupported flag");
                    }
                    UnsupportedFlagPolicy::Warn => {
                        warn!(backend = %backend, flag = %flag, "Backend does not support flag; dropped");
                    }
                },
            }
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relaxed_rules_for_ghdl() {
        let translator = FlagTranslator::builtin();
        let tokens = translator
            .translate(&[LogicalFlag::RelaxedRules], &BackendId::new("ghdl"))
            .unwrap();
        assert_eq!(tokens, vec!["-frelaxed-rules".to_string()]);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let translator = FlagTranslator::builtin();
        let err = translator
            .translate(&[LogicalFlag::RelaxedRules], &BackendId::new("foo"))
            .unwrap_err();
        assert!(matches!(err, MatrixError::UnknownBackend(ref b) if b == "foo"));
    }

    #[test]
    fn test_ghdl_compile_flags_keep_order() {
        let translator = FlagTranslator::builtin();
        let flags = vec![
            LogicalFlag::RelaxedRules,
            LogicalFlag::SuppressWarning("hide".to_string()),
            LogicalFlag::SuppressWarning("shared".to_string()),
        ];
        let tokens = translator.translate(&flags, &BackendId::new("ghdl")).unwrap();
        assert_eq!(tokens, vec!["-frelaxed-rules", "-Wno-hide", "-Wno-shared"]);
    }

    #[test]
    fn test_unsupported_flags_are_dropped_for_nvc() {
        let translator = FlagTranslator::builtin().with_policy(UnsupportedFlagPolicy::Warn);
        let flags = vec![
            LogicalFlag::RelaxedRules,
            LogicalFlag::SuppressWarning("hide".to_string()),
        ];
        let tokens = translator.translate(&flags, &BackendId::new("nvc")).unwrap();
        assert_eq!(tokens, vec!["--relaxed"]);
    }

    #[test]
    fn test_duplicate_tokens_removed() {
        let translator = FlagTranslator::builtin();
        let flags = vec![LogicalFlag::RelaxedRules, LogicalFlag::RelaxedRules];
        let tokens = translator.translate(&flags, &BackendId::new("nvc")).unwrap();
        assert_eq!(tokens.len(), 1);
    }

    #[test]
    fn test_backend_id_is_case_insensitive() {
        let translator = FlagTranslator::builtin();
        assert!(translator.is_registered(&BackendId::new("GHDL")));
        assert!(translator.ensure_backend(&BackendId::new("verilator")).is_err());
    }

    #[test]
    fn test_custom_backend_registration() {
        let mut translator = FlagTranslator::builtin();
        translator.register_backend(
            BackendId::new("riviera"),
            BackendProfile::new().rule(FlagIntent::RelaxedRules, &["-relax"]),
        );
        let tokens = translator
            .translate(&[LogicalFlag::RelaxedRules], &BackendId::new("riviera"))
            .unwrap();
        assert_eq!(tokens, vec!["-relax"]);
    }
}
