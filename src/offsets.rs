//! Offset Prober (SPEC_FULL.md §4.8).
//!
//! Asks the target compiler whether every enabled member's field offset
//! fits in a single byte, via a translation unit of `static_assert`s that
//! fails to compile if any offset is too large.

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::compiler::CompilerDriver;
use crate::description::Description;
use crate::error::Result;

const STATIC_ASSERT_FAILURE: &str = "static assertion failed";

/// The C typedef the Emitter uses for stored field offsets, chosen by
/// whether every enabled member's offset fits in a byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetType {
    Byte,
    Word,
}

impl OffsetType {
    pub fn c_name(self) -> &'static str {
        match self {
            Self::Byte => "uint8_t",
            Self::Word => "uint16_t",
        }
    }
}

fn build_probe(description: &Description, active_conditions: &HashSet<String>) -> String {
    let mut src = String::new();
    src.push_str("#include <cstddef>\n");
    for group in &description.groups {
        if !Description::group_enabled(group, active_conditions) {
            continue;
        }
        for header in &group.headers {
            let _ = writeln!(src, "#include \"{header}\"");
        }
    }
    description.for_each_enabled_member(active_conditions, |group, member| {
        let _ = writeln!(
            src,
            "static_assert(offsetof({}, {}) < 255, \"{}.{} is too big\");",
            group.c_type, member.field, group.c_type, member.field
        );
    });
    src
}

/// Probe whether every enabled member's field offset fits in a byte.
pub fn probe_offset_type(
    description: &Description,
    driver: &CompilerDriver,
    active_conditions: &HashSet<String>,
) -> Result<OffsetType> {
    let probe = build_probe(description, active_conditions);
    let output = driver.compile(&probe)?;
    let stderr = output.stderr_text();
    if stderr.contains(STATIC_ASSERT_FAILURE) {
        Ok(OffsetType::Word)
    } else {
        Ok(OffsetType::Byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::{Group, Member, Table};

    fn description() -> Description {
        Description {
            tables: Vec::<Table>::new(),
            groups: vec![Group {
                name: "PG_FOO".into(),
                c_type: "fooConfig_t".into(),
                headers: vec!["foo.h".into()],
                condition: None,
                members: vec![Member {
                    name: "foo_bar".into(),
                    field: "bar".into(),
                    ty: None,
                    condition: None,
                    min: None,
                    max: None,
                    table: None,
                }],
            }],
        }
    }

    #[test]
    fn probe_includes_cstddef_and_one_assert_per_enabled_member() {
        let desc = description();
        let src = build_probe(&desc, &HashSet::new());
        assert!(src.contains("#include <cstddef>\n"));
        assert!(src.contains("#include \"foo.h\"\n"));
        assert!(src.contains(
            "static_assert(offsetof(fooConfig_t, bar) < 255, \"fooConfig_t.bar is too big\");"
        ));
    }

    #[test]
    fn byte_and_word_typedef_names() {
        assert_eq!(OffsetType::Byte.c_name(), "uint8_t");
        assert_eq!(OffsetType::Word.c_name(), "uint16_t");
    }
}
