//! Condition Prober (SPEC_FULL.md §4.3).
//!
//! Asks the target compiler which of the description's preprocessor
//! conditions are defined under the current build configuration.

use std::collections::HashSet;
use std::fmt::Write as _;

use regex::Regex;
use std::sync::OnceLock;
use tracing::info;

use crate::compiler::CompilerDriver;
use crate::error::Result;

fn pragma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"#pragma message\("(.*)"\)"#).unwrap())
}

/// Build the probe translation unit: an include of the firmware's platform
/// header, then one `#ifdef`/`#pragma message`/`#endif` block per candidate
/// condition, in the order given.
pub fn build_probe(conditions: &[String]) -> String {
    let mut src = String::new();
    src.push_str("#include \"platform.h\"\n");
    for cond in conditions {
        let _ = writeln!(src, "#ifdef {cond}");
        let _ = writeln!(src, "#pragma message(\"{cond}\")");
        src.push_str("#endif\n");
    }
    src
}

/// Scan a compiler's stderr for the `#pragma message("...")` markers the
/// probe emits and return the captured condition names.
pub fn parse_active_conditions(stderr: &str) -> HashSet<String> {
    pragma_re()
        .captures_iter(stderr)
        .map(|c| c[1].to_string())
        .collect()
}

/// Compile the probe and return the active-condition set.
pub fn active_conditions(
    driver: &CompilerDriver,
    conditions: &[String],
) -> Result<HashSet<String>> {
    let probe = build_probe(conditions);
    let output = driver.compile(&probe)?;
    let active = parse_active_conditions(&output.stderr_text());
    info!(count = active.len(), "resolved active conditions");
    Ok(active)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_contains_guarded_pragma_per_condition() {
        let probe = build_probe(&["USE_NAV".to_string(), "USE_GPS".to_string()]);
        assert!(probe.contains("#include \"platform.h\"\n"));
        assert!(probe.contains("#ifdef USE_NAV\n#pragma message(\"USE_NAV\")\n#endif\n"));
        assert!(probe.contains("#ifdef USE_GPS\n#pragma message(\"USE_GPS\")\n#endif\n"));
    }

    #[test]
    fn parses_pragma_messages_from_stderr() {
        let stderr = concat!(
            "probe.cpp:2:9: note: #pragma message: USE_NAV\n",
            "probe.cpp:2:9: note: #pragma message(\"USE_NAV\")\n",
            "probe.cpp:5:9: note: #pragma message(\"USE_GPS\")\n",
        );
        let active = parse_active_conditions(stderr);
        assert_eq!(
            active,
            HashSet::from(["USE_NAV".to_string(), "USE_GPS".to_string()])
        );
    }

    #[test]
    fn conditions_never_reported_are_absent() {
        let active = parse_active_conditions("");
        assert!(active.is_empty());
    }
}
