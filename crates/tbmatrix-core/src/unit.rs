//! Compiled design units, testbenches and their declared parameters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Kind of value a declared parameter accepts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// integer, natural, positive, real and friends
    Numeric,
    Boolean,
    /// Anything else: strings, std_logic, user enumerations.
    Enumerated,
}

impl ParamKind {
    /// Classify a VHDL subtype indication.
    pub fn from_type_name(type_name: &str) -> Self {
        let base = type_name
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match base.as_str() {
            "integer" | "natural" | "positive" | "real" => ParamKind::Numeric,
            "boolean" => ParamKind::Boolean,
            _ => ParamKind::Enumerated,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParamKind::Numeric => "numeric",
            ParamKind::Boolean => "boolean",
            ParamKind::Enumerated => "enumerated",
        }
    }
}

/// A typed parameter value.
///
/// Numeric values keep the literal text they were written with, so a real
/// generic set to `1.0` is handed to the simulator as `1.0` and never as `1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Numeric(String),
    Boolean(bool),
    Enumerated(String),
}

impl ParamValue {
    /// Parse a boundary string against the declared kind.
    ///
    /// Returns `None` when the text is not a valid value of that kind.
    pub fn parse(kind: ParamKind, raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match kind {
            ParamKind::Numeric => {
                let digits = raw.replace('_', "");
                if digits.parse::<f64>().is_ok() {
                    Some(ParamValue::Numeric(raw.to_string()))
                } else {
                    None
                }
            }
            ParamKind::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" => Some(ParamValue::Boolean(true)),
                "false" => Some(ParamValue::Boolean(false)),
                _ => None,
            },
            ParamKind::Enumerated => {
                let unquoted = raw
                    .strip_prefix('"')
                    .and_then(|s| s.strip_suffix('"'))
                    .unwrap_or(raw);
                Some(ParamValue::Enumerated(unquoted.to_string()))
            }
        }
    }

    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Numeric(_) => ParamKind::Numeric,
            ParamValue::Boolean(_) => ParamKind::Boolean,
            ParamValue::Enumerated(_) => ParamKind::Enumerated,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Numeric(text) | ParamValue::Enumerated(text) => f.write_str(text),
            ParamValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// Default of a declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamDefault {
    /// A literal value that can be passed through as-is.
    Literal(ParamValue),
    /// An expression only the simulator can evaluate (`Width_c - 1`).
    /// Left out of the resolved mapping unless a configuration overrides it.
    Elaborated(String),
    /// No default in the declaration; the test runner or the simulator binds
    /// it (VUnit's `runner_cfg`). Left out of the resolved mapping unless a
    /// configuration sets it.
    Unbound,
}

/// A parameter (generic) as declared by a design unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDecl {
    pub name: String,
    pub kind: ParamKind,
    pub default: ParamDefault,
}

impl ParameterDecl {
    pub fn new(name: impl Into<String>, kind: ParamKind, default: ParamDefault) -> Self {
        Self {
            name: name.into(),
            kind,
            default,
        }
    }

    /// Numeric parameter with a literal default.
    pub fn numeric(name: impl Into<String>, default: &str) -> Self {
        Self::new(
            name,
            ParamKind::Numeric,
            ParamDefault::Literal(ParamValue::Numeric(default.to_string())),
        )
    }

    pub fn boolean(name: impl Into<String>, default: bool) -> Self {
        Self::new(
            name,
            ParamKind::Boolean,
            ParamDefault::Literal(ParamValue::Boolean(default)),
        )
    }

    pub fn enumerated(name: impl Into<String>, default: &str) -> Self {
        Self::new(
            name,
            ParamKind::Enumerated,
            ParamDefault::Literal(ParamValue::Enumerated(default.to_string())),
        )
    }

    /// Parameter declared without a default.
    pub fn unbound(name: impl Into<String>, kind: ParamKind) -> Self {
        Self::new(name, kind, ParamDefault::Unbound)
    }

    /// Build from declaration text; non-literal defaults become [`ParamDefault::Elaborated`].
    pub fn from_source(name: &str, type_name: &str, default: Option<&str>) -> Self {
        let kind = ParamKind::from_type_name(type_name);
        let default = match default {
            None => ParamDefault::Unbound,
            Some(text) => match ParamValue::parse(kind, text) {
                Some(value) if kind != ParamKind::Enumerated || is_simple_literal(text) => {
                    ParamDefault::Literal(value)
                }
                _ => ParamDefault::Elaborated(text.trim().to_string()),
            },
        };
        Self::new(name, kind, default)
    }
}

/// Quoted strings, character literals and bare identifiers.
fn is_simple_literal(text: &str) -> bool {
    let text = text.trim();
    (text.starts_with('"') && text.ends_with('"') && text.len() >= 2)
        || (text.starts_with('\'') && text.ends_with('\'') && text.len() == 3)
        || (!text.is_empty() && text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

/// A design unit as declared in a source file: entity name and generics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDecl {
    pub entity: String,
    pub parameters: Vec<ParameterDecl>,
}

impl UnitDecl {
    pub fn new(entity: impl Into<String>, parameters: Vec<ParameterDecl>) -> Self {
        Self {
            entity: entity.into(),
            parameters,
        }
    }

    pub fn is_testbench(&self) -> bool {
        is_testbench_name(&self.entity)
    }
}

/// Testbench naming convention: `tb_*` or `*_tb`.
pub fn is_testbench_name(entity: &str) -> bool {
    let name = entity.to_ascii_lowercase();
    name.starts_with("tb_") || name.ends_with("_tb")
}

/// A unit that belongs to exactly one library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledUnit {
    pub library: String,
    pub entity: String,
    pub source: PathBuf,
    pub parameters: Vec<ParameterDecl>,
}

impl CompiledUnit {
    pub fn from_decl(library: &str, source: PathBuf, decl: UnitDecl) -> Self {
        Self {
            library: library.to_string(),
            entity: decl.entity,
            source,
            parameters: decl.parameters,
        }
    }

    pub fn is_testbench(&self) -> bool {
        is_testbench_name(&self.entity)
    }

    /// `<library>.<entity>`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.library, self.entity)
    }
}

/// A verification entity with declared, overridable parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Testbench {
    unit: CompiledUnit,
}

impl Testbench {
    pub(crate) fn new(unit: CompiledUnit) -> Self {
        Self { unit }
    }

    pub fn name(&self) -> &str {
        &self.unit.entity
    }

    pub fn library(&self) -> &str {
        &self.unit.library
    }

    pub fn qualified_name(&self) -> String {
        self.unit.qualified_name()
    }

    pub fn unit(&self) -> &CompiledUnit {
        &self.unit
    }

    pub fn parameters(&self) -> &[ParameterDecl] {
        &self.unit.parameters
    }

    /// Look up a declared parameter by name (VHDL identifiers are case-insensitive).
    pub fn parameter(&self, name: &str) -> Option<&ParameterDecl> {
        self.unit
            .parameters
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}
