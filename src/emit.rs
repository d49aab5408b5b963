//! Emitter (SPEC_FULL.md §4.9).
//!
//! Writes `settings_generated.h` and `settings_generated.c` from the fully
//! resolved description, name encoder, value table, and offset type.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;

use crate::description::Description;
use crate::error::{GeneratorError, Result};
use crate::names::NameEncoder;
use crate::offsets::OffsetType;
use crate::values::{resolve_member_bounds, ValueTable};

/// Bytes per member's `.config.minmax` field: one index byte for the min
/// bound, one for the max (SPEC_FULL.md §4.9 "min/max index-bytes constant").
const MINMAX_INDEX_BYTES: usize = 2;

fn c_string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

/// Format a name encoder's bytes for `member.Name` as a brace-enclosed C
/// initializer, e.g. `{1, 2, 0}`.
fn format_encoded_name(encoder: &NameEncoder, name: &str) -> Result<String> {
    let bytes = encoder.encode(name)?;
    let parts: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
    Ok(format!("{{{}}}", parts.join(", ")))
}

pub fn write_header(
    description: &Description,
    active_conditions: &HashSet<String>,
    name_encoder: &NameEncoder,
    value_table: &ValueTable,
    offset_type: OffsetType,
    settings_count: usize,
    pgn_count: usize,
    output_dir: &Path,
) -> Result<()> {
    let mut buf = String::new();
    buf.push_str("#pragma once\n");
    let _ = writeln!(
        buf,
        "#define CLIVALUE_MAX_NAME_LENGTH {}",
        max_name_length(description, active_conditions)
    );
    let _ = writeln!(buf, "#define CLIVALUE_ENCODED_NAME_MAX_BYTES {}", name_encoder.width());
    if name_encoder.uses_direct_indexing() {
        buf.push_str("#define CLIVALUE_ENCODED_NAME_USES_DIRECT_INDEXING\n");
    }
    let _ = writeln!(buf, "#define CLIVALUE_TABLE_COUNT {settings_count}");
    // Defined unconditionally, same as the original: the offset probe's
    // result only picks the typedef below, not whether this macro exists.
    buf.push_str("#define CLIVALUE_USE_BYTE_OFFSETOF\n");
    let _ = writeln!(buf, "typedef {} ClivalueOffsetType;", offset_type.c_name());
    let _ = writeln!(buf, "typedef {} ClivalueMinType;", value_table.min_type());
    let _ = writeln!(buf, "typedef {} ClivalueMaxType;", value_table.max_type());
    let _ = writeln!(buf, "#define CLIVALUE_MINMAX_INDEX_BYTES {}", MINMAX_INDEX_BYTES);
    let _ = writeln!(buf, "#define CLIVALUE_PGN_COUNT {pgn_count}");

    let table_names = description.ordered_enabled_table_names(active_conditions);
    buf.push_str("enum {\n");
    for name in &table_names {
        let table = description.table(name).expect("name came from the description's own tables");
        let _ = writeln!(buf, "\t{},", table.constant_name());
    }
    buf.push_str("\tLOOKUP_TABLE_COUNT,\n");
    buf.push_str("};\n");

    for name in &table_names {
        let table = description.table(name).expect("name came from the description's own tables");
        let _ = writeln!(buf, "extern const char *{}[];", table.var_name());
    }

    std::fs::write(output_dir.join("settings_generated.h"), buf).map_err(|source| {
        GeneratorError::Write {
            path: output_dir.join("settings_generated.h"),
            source,
        }
    })
}

fn max_name_length(description: &Description, active_conditions: &HashSet<String>) -> usize {
    let mut max = 0usize;
    description.for_each_enabled_member(active_conditions, |_group, member| {
        max = max.max(member.name.len());
    });
    max + 1
}

pub fn write_implementation(
    description: &Description,
    active_conditions: &HashSet<String>,
    name_encoder: &NameEncoder,
    value_table: &ValueTable,
    constants: &std::collections::HashMap<String, i64>,
    output_dir: &Path,
) -> Result<()> {
    let mut buf = String::new();
    buf.push_str("#include \"platform.h\"\n");
    buf.push_str("#include \"config/parameter_group_ids.h\"\n");
    buf.push_str("#include \"settings.h\"\n");
    for group in &description.groups {
        for header in &group.headers {
            let _ = writeln!(buf, "#include \"{header}\"");
        }
    }

    let enabled_groups = description.enabled_groups(active_conditions);
    buf.push_str("const pgn_t cliValuePgn[] = {\n");
    for group in &enabled_groups {
        let _ = writeln!(buf, "\t{},", group.name);
    }
    buf.push_str("};\n");

    buf.push_str("const uint8_t cliValuePgnCounts[] = {\n");
    for group in &enabled_groups {
        let _ = writeln!(
            buf,
            "\t{},",
            Description::enabled_member_count(group, active_conditions)
        );
    }
    buf.push_str("};\n");

    buf.push_str("static const char *cliValueWords[] = {\n");
    buf.push_str("\tNULL,\n");
    for word in name_encoder.words() {
        let _ = writeln!(buf, "\t{},", c_string_literal(word));
    }
    buf.push_str("};\n");

    let table_names = description.ordered_enabled_table_names(active_conditions);
    for name in &table_names {
        let table = description.table(name).expect("name came from the description's own tables");
        let _ = writeln!(buf, "const char *{}[] = {{", table.var_name());
        for value in &table.values {
            let _ = writeln!(buf, "\t{},", c_string_literal(value));
        }
        buf.push_str("};\n");
    }

    buf.push_str("const lookupTableEntry_t cliLookupTables[] = {\n");
    for name in &table_names {
        let table = description.table(name).expect("name came from the description's own tables");
        let _ = writeln!(
            buf,
            "\t{{ {}, sizeof({}) / sizeof(char*) }},",
            table.var_name(),
            table.var_name()
        );
    }
    buf.push_str("};\n");

    buf.push_str("const clivalue_t cliValueTable[] = {\n");
    let mut last_group: Option<&str> = None;
    let mut encode_err: Option<GeneratorError> = None;
    let mut bounds_err: Option<GeneratorError> = None;
    description.for_each_enabled_member(active_conditions, |group, member| {
        if encode_err.is_some() || bounds_err.is_some() {
            return;
        }
        if last_group != Some(group.name.as_str()) {
            let _ = writeln!(buf, "\t// {}", group.name);
            last_group = Some(group.name.as_str());
        }
        let encoded = match format_encoded_name(name_encoder, &member.name) {
            Ok(e) => e,
            Err(err) => {
                encode_err = Some(err);
                return;
            }
        };
        let ty = member
            .ty
            .expect("the Type Resolver fills in every member's type before emission");
        let _ = write!(
            buf,
            "\t{{ {}, {} | {}",
            encoded,
            ty.var_flag(),
            group.default_value_type()
        );

        if let Some(table_name) = &member.table {
            let table = description
                .table(table_name)
                .expect("validated at load time");
            buf.push_str(" | MODE_LOOKUP");
            let _ = write!(buf, ", .config.lookup = {{ {} }}", table.constant_name());
        } else {
            match resolve_member_bounds(member, constants) {
                Ok(Some(bounds)) => {
                    if bounds.mode_max {
                        buf.push_str(" | MODE_MAX");
                    }
                    let min_idx = value_table.index_of(bounds.min);
                    let max_idx = value_table.index_of(bounds.max);
                    let _ = write!(
                        buf,
                        ", .config.minmax = {{ {min_idx}, {max_idx} }}"
                    );
                }
                Ok(None) => {}
                Err(err) => {
                    bounds_err = Some(err);
                    return;
                }
            }
        }

        let _ = writeln!(buf, ", offsetof({}, {}) }},", group.c_type, member.field);
    });
    if let Some(err) = encode_err.or(bounds_err) {
        return Err(err);
    }
    buf.push_str("};\n");

    std::fs::write(output_dir.join("settings_generated.c"), buf).map_err(|source| {
        GeneratorError::Write {
            path: output_dir.join("settings_generated.c"),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_quotes_and_backslashes_in_string_literals() {
        assert_eq!(c_string_literal("OFF"), "\"OFF\"");
        assert_eq!(c_string_literal("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn max_name_length_adds_one_for_terminator() {
        use crate::description::{Group, Member, Table};
        let description = Description {
            tables: Vec::<Table>::new(),
            groups: vec![Group {
                name: "G".into(),
                c_type: "s_t".into(),
                headers: vec![],
                condition: None,
                members: vec![Member {
                    name: "abcd".into(),
                    field: "abcd".into(),
                    ty: None,
                    condition: None,
                    min: None,
                    max: None,
                    table: None,
                }],
            }],
        };
        assert_eq!(max_name_length(&description, &HashSet::new()), 5);
    }
}
