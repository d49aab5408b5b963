//! Type Resolver (SPEC_FULL.md §4.4).
//!
//! For members whose scalar type was omitted from the description, this
//! synthesises a probe that accesses a sentinel field on the member's path
//! and parses the resulting compiler diagnostic to learn the real C type.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::compiler::CompilerDriver;
use crate::description::{Description, ScalarType};
use crate::error::{GeneratorError, Result};

const SENTINEL: &str = "__type_detect_";

struct PendingType {
    group_index: usize,
    member_index: usize,
    name: String,
    field: String,
    group_name: String,
    group_c_type: String,
}

fn member_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"which is of non-class type '(.*)'").unwrap())
}

/// Build the probe translation unit and a line-number → pending-member map.
fn build_probe(description: &Description, pending: &[PendingType]) -> (String, HashMap<usize, usize>) {
    let mut src = String::new();
    src.push_str("#include \"target.h\"\n");
    for group in &description.groups {
        for header in &group.headers {
            let _ = writeln!(src, "#include \"{header}\"");
        }
    }
    src.push_str("int main() {\n");

    let mut lines = HashMap::new();
    // Lines emitted so far: every line already written, plus the one about
    // to be written, is 1-indexed for the compiler's diagnostics.
    let mut current_line = src.matches('\n').count() + 1;
    for (pending_idx, p) in pending.iter().enumerate() {
        let var_name = format!("var_{pending_idx}");
        let _ = writeln!(
            src,
            "{} {}; {}.{}.{};",
            p.group_c_type, var_name, var_name, p.field, SENTINEL
        );
        lines.insert(current_line, pending_idx);
        current_line += 1;
    }
    src.push_str("return 0;\n}\n");
    (src, lines)
}

/// Parse the `file:line:col: error: ...` prefix the compiler puts on every
/// diagnostic line, returning the line number.
fn diagnostic_line(text: &str) -> Option<usize> {
    let mut parts = text.splitn(3, ':');
    let _file = parts.next()?;
    let line = parts.next()?;
    line.trim().parse::<usize>().ok()
}

/// Resolve every member in `description` whose type is missing, mutating it
/// in place. Mirrors the original's "all groups, not just enabled ones" scope
/// (SPEC_FULL.md §2 step (c) runs before condition-based filtering matters).
pub fn resolve_types(description: &mut Description, driver: &CompilerDriver) -> Result<()> {
    let mut pending = Vec::new();
    for (gi, group) in description.groups.iter().enumerate() {
        for (mi, member) in group.members.iter().enumerate() {
            if member.ty.is_none() {
                pending.push(PendingType {
                    group_index: gi,
                    member_index: mi,
                    name: member.name.clone(),
                    field: member.field.clone(),
                    group_name: group.name.clone(),
                    group_c_type: group.c_type.clone(),
                });
            }
        }
    }
    if pending.is_empty() {
        return Ok(());
    }

    let (probe, line_map) = build_probe(description, &pending);
    let output = driver.compile(&probe)?;
    let stderr = output.stderr_text();

    let mut resolved: HashMap<usize, ScalarType> = HashMap::new();
    for line in stderr.lines() {
        if !line.contains(&format!("error: request for member '{SENTINEL}'")) {
            continue;
        }
        let Some(line_no) = diagnostic_line(line) else {
            continue;
        };
        let Some(&pending_idx) = line_map.get(&line_no) else {
            continue;
        };
        let p = &pending[pending_idx];
        let Some(captures) = member_re().captures(line) else {
            return Err(GeneratorError::DiagnosticParse {
                context: format!("type of {:?} (field {:?})", p.name, p.field),
                snippet: line.to_string(),
            });
        };
        let reported = &captures[1];
        let ty = ScalarType::from_diagnostic(reported).ok_or_else(|| {
            GeneratorError::UnknownScalarType {
                name: p.name.clone(),
                reported: reported.to_string(),
            }
        })?;
        resolved.insert(pending_idx, ty);
        debug!(member = %p.name, group = %p.group_name, ty = ty.c_name(), "resolved type");
    }

    for (pending_idx, p) in pending.iter().enumerate() {
        let Some(ty) = resolved.get(&pending_idx) else {
            return Err(GeneratorError::UnresolvedType {
                name: p.name.clone(),
                field: p.field.clone(),
                group: p.group_name.clone(),
            });
        };
        description.groups[p.group_index].members[p.member_index].ty = Some(*ty);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_line_parses_gcc_prefix() {
        assert_eq!(
            diagnostic_line("probe.cpp:7:18: error: request for member '__type_detect_'"),
            Some(7)
        );
    }

    #[test]
    fn member_regex_captures_reported_type() {
        let line = "probe.cpp:7:18: error: request for member '__type_detect_' in 'var_0', which is of non-class type 'uint8_t {aka unsigned char}'";
        let caps = member_re().captures(line).unwrap();
        assert_eq!(&caps[1], "uint8_t {aka unsigned char}");
        assert_eq!(
            ScalarType::from_diagnostic(&caps[1]),
            Some(ScalarType::U8)
        );
    }

    #[test]
    fn probe_includes_target_header_and_group_headers() {
        use crate::description::{Description, Group, Member, Table};
        let description = Description {
            tables: Vec::<Table>::new(),
            groups: vec![Group {
                name: "G".into(),
                c_type: "settings_t".into(),
                headers: vec!["nav.h".into()],
                condition: None,
                members: vec![Member {
                    name: "foo".into(),
                    field: "foo".into(),
                    ty: None,
                    condition: None,
                    min: None,
                    max: None,
                    table: None,
                }],
            }],
        };
        let pending = vec![PendingType {
            group_index: 0,
            member_index: 0,
            name: "foo".into(),
            field: "foo".into(),
            group_name: "G".into(),
            group_c_type: "settings_t".into(),
        }];
        let (src, lines) = build_probe(&description, &pending);
        assert!(src.contains("#include \"target.h\"\n"));
        assert!(src.contains("#include \"nav.h\"\n"));
        assert!(src.contains("settings_t var_0; var_0.foo.__type_detect_;\n"));
        assert_eq!(lines.len(), 1);
    }
}
