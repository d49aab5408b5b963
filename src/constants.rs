//! Constant Resolver (SPEC_FULL.md §4.5).
//!
//! For min/max expressions that name a firmware identifier rather than a
//! literal integer, this forces the compiler to report the identifier's
//! numeric value through a template-instantiation failure, then parses the
//! value back out of the diagnostic.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::compiler::CompilerDriver;
use crate::description::Description;
use crate::error::{GeneratorError, Result};

fn value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)required from 'class expr_(\w+)<(-?\d+)ll>'").unwrap())
}

/// All distinct identifiers used as a min/max bound on an enabled member.
pub fn unresolved_identifiers(
    description: &Description,
    active_conditions: &HashSet<String>,
) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    description.for_each_enabled_member(active_conditions, |_group, member| {
        for bound in [&member.min, &member.max] {
            if let Some(id) = bound.as_ref().and_then(|b| b.as_identifier()) {
                names.insert(id.to_string());
            }
        }
    });
    names
}

fn build_probe(description: &Description, names: &BTreeSet<String>) -> String {
    let mut src = String::new();
    src.push_str("#include \"target.h\"\n");
    for group in &description.groups {
        for header in &group.headers {
            let _ = writeln!(src, "#include \"{header}\"");
        }
    }
    src.push_str("template <long long V>\n");
    src.push_str("struct Fail {\n");
    src.push_str("    static_assert(V != V, \"unresolved constant\");\n");
    src.push_str("};\n");
    for name in names {
        let _ = writeln!(src, "template <long long V>");
        let _ = writeln!(src, "struct expr_{name} : Fail<V> {{}};");
    }
    for name in names {
        let _ = writeln!(src, "template struct expr_{name}<{name}>;");
    }
    src
}

/// Parse every `expr_<name><value>LL` template-instantiation diagnostic out
/// of `stderr`.
fn parse_constants(stderr: &str) -> HashMap<String, i64> {
    let mut out = HashMap::new();
    for caps in value_re().captures_iter(stderr) {
        if let Ok(value) = caps[2].parse::<i64>() {
            out.insert(caps[1].to_string(), value);
        }
    }
    out
}

/// Resolve every identifier-valued bound on an enabled member, iterating
/// because the compiler's diagnostic cap can truncate output when many
/// symbols are unknown at once (SPEC_FULL.md §4.5 "Rationale for
/// iteration").
pub fn resolve_constants(
    description: &Description,
    driver: &CompilerDriver,
    active_conditions: &HashSet<String>,
) -> Result<HashMap<String, i64>> {
    let mut pending = unresolved_identifiers(description, active_conditions);
    let mut resolved = HashMap::new();

    while !pending.is_empty() {
        let probe = build_probe(description, &pending);
        let output = driver.compile(&probe)?;
        let found = parse_constants(&output.stderr_text());

        let mut progressed = false;
        for (name, value) in found {
            if pending.remove(&name) {
                resolved.insert(name.clone(), value);
                debug!(name = %name, value, "resolved constant");
                progressed = true;
            }
        }
        if !progressed {
            return Err(GeneratorError::UnresolvedConstants {
                names: pending.into_iter().collect(),
            });
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_constant() {
        let stderr = "probe.cpp:9:31:   required from 'class expr_MAX_MOTORS<8LL>'\n";
        let found = parse_constants(stderr);
        assert_eq!(found.get("MAX_MOTORS"), Some(&8));
    }

    #[test]
    fn parses_negative_constant() {
        let stderr = "probe.cpp:9:31:   required from 'class expr_MIN_ANGLE<-30LL>'\n";
        let found = parse_constants(stderr);
        assert_eq!(found.get("MIN_ANGLE"), Some(&-30));
    }

    #[test]
    fn parses_multiple_constants_in_one_stream() {
        let stderr = concat!(
            "probe.cpp:9:31:   required from 'class expr_A<1LL>'\n",
            "probe.cpp:10:31:   required from 'class expr_B<2LL>'\n",
        );
        let found = parse_constants(stderr);
        assert_eq!(found.get("A"), Some(&1));
        assert_eq!(found.get("B"), Some(&2));
    }

    #[test]
    fn probe_instantiates_one_template_per_name() {
        let description = Description {
            tables: Vec::new(),
            groups: Vec::new(),
        };
        let mut names = BTreeSet::new();
        names.insert("MAX_MOTORS".to_string());
        let src = build_probe(&description, &names);
        assert!(src.contains("struct expr_MAX_MOTORS : Fail<V> {};"));
        assert!(src.contains("template struct expr_MAX_MOTORS<MAX_MOTORS>;"));
    }
}
