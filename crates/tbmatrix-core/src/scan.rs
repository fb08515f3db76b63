//! Lightweight VHDL declaration scanner.
//!
//! Reads entity names and their generic clauses; nothing else in the
//! source is interpreted.

use crate::unit::{ParameterDecl, UnitDecl};
use regex::Regex;
use std::sync::OnceLock;

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"--[^\n]*").expect("static regex"))
}

fn entity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bentity\s+([a-z][a-z0-9_]*)\s+is\b").expect("static regex"))
}

fn generic_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*generic\s*\(").expect("static regex"))
}

/// Scan VHDL source text for entity declarations.
pub fn scan_vhdl(text: &str) -> Vec<UnitDecl> {
    let text = comment_re().replace_all(text, "");
    let mut units = Vec::new();

    for caps in entity_re().captures_iter(&text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let body = &text[whole.end()..];
        let parameters = generic_re()
            .find(body)
            .and_then(|m| balanced_body(&body[m.end()..]))
            .map(parse_generics)
            .unwrap_or_default();
        units.push(UnitDecl::new(name.as_str(), parameters));
    }

    units
}

/// Content up to the parenthesis closing an already opened one.
fn balanced_body(text: &str) -> Option<&str> {
    let mut depth = 1usize;
    let mut in_string = false;
    for (i, c) in text.char_indices() {
        match c {
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[..i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on `;` outside of parentheses and strings.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => depth = depth.saturating_sub(1),
            ';' if !in_string && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn parse_generics(clause: &str) -> Vec<ParameterDecl> {
    let mut params = Vec::new();
    for decl in split_top_level(clause) {
        let decl = decl.trim();
        if decl.is_empty() {
            continue;
        }
        let (lhs, default) = match decl.find(":=") {
            Some(pos) => (&decl[..pos], Some(decl[pos + 2..].trim())),
            None => (decl, None),
        };
        let Some((names, type_name)) = lhs.split_once(':') else {
            continue;
        };
        let type_name = strip_mode(type_name.trim());
        let names = names.trim();
        let names = names
            .strip_prefix("constant ")
            .or_else(|| names.strip_prefix("CONSTANT "))
            .unwrap_or(names);
        for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            params.push(ParameterDecl::from_source(name, type_name, default));
        }
    }
    params
}

fn strip_mode(type_name: &str) -> &str {
    let lower = type_name.to_ascii_lowercase();
    if lower.starts_with("in ") {
        type_name[3..].trim_start()
    } else {
        type_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{ParamDefault, ParamKind, ParamValue};

    const ABC2DQ_TB: &str = r#"
library ieee;
use ieee.std_logic_1164.all;

-- entity commented_tb is
entity abc2dq_tb is
    generic (
        runner_cfg  : string;
        AC_D_g      : real := 0.0;  -- d amplitude
        AC_Q_g      : real := 0.0;
        DC_g        : real := 0.0;
        TestLimit_g : real := 0.01;
        Init_g      : std_logic_vector(3 downto 0) := (others => '0')
    );
end entity;

architecture sim of abc2dq_tb is
begin
    dut : entity work.abc2dq
        generic map (Width_g => 16);
end architecture;
"#;

    #[test]
    fn test_scan_testbench_generics() {
        let units = scan_vhdl(ABC2DQ_TB);
        assert_eq!(units.len(), 1);
        let tb = &units[0];
        assert_eq!(tb.entity, "abc2dq_tb");
        assert!(tb.is_testbench());

        let names: Vec<_> = tb.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["runner_cfg", "AC_D_g", "AC_Q_g", "DC_g", "TestLimit_g", "Init_g"]
        );
        assert_eq!(tb.parameters[0].default, ParamDefault::Unbound);
        assert_eq!(
            tb.parameters[1].default,
            ParamDefault::Literal(ParamValue::Numeric("0.0".to_string()))
        );
        assert_eq!(tb.parameters[1].kind, ParamKind::Numeric);
        assert!(matches!(tb.parameters[5].default, ParamDefault::Elaborated(_)));
    }

    #[test]
    fn test_scan_entity_without_generics() {
        let src = "entity svpwm is\n port (clk : in std_logic);\nend svpwm;";
        let units = scan_vhdl(src);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].entity, "svpwm");
        assert!(units[0].parameters.is_empty());
    }

    #[test]
    fn test_scan_multiple_names_per_declaration() {
        let src = "entity tb_pair is generic (A_g, B_g : integer := 4; En_g : boolean := true); end;";
        let units = scan_vhdl(src);
        let params = &units[0].parameters;
        assert_eq!(params.len(), 3);
        assert_eq!(params[0].name, "A_g");
        assert_eq!(params[1].name, "B_g");
        assert_eq!(
            params[2].default,
            ParamDefault::Literal(ParamValue::Boolean(true))
        );
    }
}
