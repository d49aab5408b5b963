//! Description Loader (SPEC_FULL.md §4.1).
//!
//! Reads the YAML settings description and turns it into the validated,
//! in-memory `Description` that the rest of the pipeline operates on.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::error::{GeneratorError, Result};

/// A setting's C scalar type, closed over the vocabulary the Type Resolver
/// can ever produce (SPEC_FULL.md §9 "Tagged sum for Member.Type").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    U32,
    F32,
}

impl ScalarType {
    /// Parse the description's own spelling for a type (`"uint8_t"`, ...).
    /// `"bool"` is handled by the caller before this is reached, since it
    /// rewrites the member rather than naming a `ScalarType` directly.
    fn from_description(s: &str) -> Option<Self> {
        match s {
            "int8_t" => Some(Self::I8),
            "uint8_t" => Some(Self::U8),
            "int16_t" => Some(Self::I16),
            "uint16_t" => Some(Self::U16),
            "uint32_t" => Some(Self::U32),
            "float" => Some(Self::F32),
            _ => None,
        }
    }

    /// The compiler's diagnostic spelling, as matched by the Type Resolver
    /// (SPEC_FULL.md §4.4).
    pub fn from_diagnostic(s: &str) -> Option<Self> {
        match s {
            "int8_t {aka signed char}" => Some(Self::I8),
            "uint8_t {aka unsigned char}" => Some(Self::U8),
            "int16_t {aka short int}" => Some(Self::I16),
            "uint16_t {aka short unsigned int}" => Some(Self::U16),
            "uint32_t {aka long unsigned int}" => Some(Self::U32),
            "float" => Some(Self::F32),
            _ => None,
        }
    }

    pub fn c_name(self) -> &'static str {
        match self {
            Self::I8 => "int8_t",
            Self::U8 => "uint8_t",
            Self::I16 => "int16_t",
            Self::U16 => "uint16_t",
            Self::U32 => "uint32_t",
            Self::F32 => "float",
        }
    }

    /// The `VAR_*` flag the Emitter ORs into a `cliValueTable` entry.
    pub fn var_flag(self) -> &'static str {
        match self {
            Self::I8 => "VAR_INT8",
            Self::U8 => "VAR_UINT8",
            Self::I16 => "VAR_INT16",
            Self::U16 => "VAR_UINT16",
            Self::U32 => "VAR_UINT32",
            Self::F32 => "VAR_FLOAT",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.c_name())
    }
}

/// A min/max expression, either a literal that was parsed at load time or a
/// firmware identifier awaiting the Constant Resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound {
    Literal(i64),
    Identifier(String),
}

impl Bound {
    fn parse(expr: &str) -> Self {
        // Heuristic from SPEC_FULL.md §4.5: an expression is a literal iff
        // it starts with a digit or a minus sign.
        let starts_numeric = expr
            .as_bytes()
            .first()
            .is_some_and(|b| b.is_ascii_digit() || *b == b'-');
        if starts_numeric {
            if let Ok(v) = expr.parse::<i64>() {
                return Bound::Literal(v);
            }
        }
        Bound::Identifier(expr.to_string())
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Bound::Identifier(s) => Some(s.as_str()),
            Bound::Literal(_) => None,
        }
    }
}

/// A named enumeration of string values (SPEC_FULL.md §3 "Table").
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub values: Vec<String>,
    /// Condition stacks recorded while traversing groups/members in source
    /// order; populated by `Description::initialize_table_usage`.
    pub uses: Vec<Vec<String>>,
}

impl Table {
    pub fn var_name(&self) -> String {
        format!("table_{}", self.name)
    }

    pub fn constant_name(&self) -> String {
        format!("TABLE_{}", self.name.to_uppercase())
    }

    pub fn used(&self) -> bool {
        !self.uses.is_empty()
    }

    /// Live iff at least one recorded use-stack has every condition in the
    /// active set.
    pub fn enabled(&self, active_conditions: &HashSet<String>) -> bool {
        self.uses
            .iter()
            .any(|stack| stack.iter().all(|c| active_conditions.contains(c)))
    }

    fn add_use(&mut self, conditions: &[String]) {
        if !self.uses.iter().any(|u| u == conditions) {
            self.uses.push(conditions.to_vec());
        }
    }
}

/// A single tunable (SPEC_FULL.md §3 "Member").
#[derive(Debug, Clone)]
pub struct Member {
    pub name: String,
    pub field: String,
    /// `None` until the Type Resolver fills it in.
    pub ty: Option<ScalarType>,
    pub condition: Option<String>,
    pub min: Option<Bound>,
    pub max: Option<Bound>,
    pub table: Option<String>,
}

/// A container of related settings (SPEC_FULL.md §3 "Group").
#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub c_type: String,
    pub headers: Vec<String>,
    pub condition: Option<String>,
    pub members: Vec<Member>,
}

impl Group {
    /// The "default scope" flag ORed into every member of this group
    /// (SPEC_FULL.md "SUPPLEMENTED FEATURES" — per-group default value type).
    pub fn default_value_type(&self) -> &'static str {
        match self.name.as_str() {
            "PG_CONTROL_RATE_PROFILES" => "CONTROL_RATE_VALUE",
            "PG_PID_PROFILE" => "PROFILE_VALUE",
            _ => "MASTER_VALUE",
        }
    }
}

/// The full validated settings description.
#[derive(Debug, Clone)]
pub struct Description {
    pub tables: Vec<Table>,
    pub groups: Vec<Group>,
}

#[derive(Debug, Deserialize)]
struct RawDescription {
    #[serde(default)]
    tables: Vec<RawTable>,
    #[serde(default)]
    groups: Vec<RawGroup>,
}

#[derive(Debug, Deserialize)]
struct RawTable {
    name: String,
    #[serde(default)]
    values: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawGroup {
    name: String,
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    headers: Vec<String>,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    members: Vec<RawMember>,
}

#[derive(Debug, Deserialize)]
struct RawMember {
    name: String,
    #[serde(default)]
    field: Option<String>,
    #[serde(rename = "type", default)]
    ty: Option<String>,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    min: Option<String>,
    #[serde(default)]
    max: Option<String>,
    #[serde(default)]
    table: Option<String>,
}

const OFF_ON_TABLE: &str = "off_on";

impl Description {
    /// Read and validate the description file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| GeneratorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawDescription =
            serde_yaml::from_str(&content).map_err(|source| GeneratorError::Decode {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawDescription) -> Result<Self> {
        let mut table_names = HashSet::new();
        let mut tables = Vec::with_capacity(raw.tables.len());
        for t in raw.tables {
            if t.name.is_empty() {
                return Err(GeneratorError::EmptyName { kind: "table" });
            }
            if !table_names.insert(t.name.clone()) {
                return Err(GeneratorError::DuplicateTable { name: t.name });
            }
            tables.push(Table {
                name: t.name,
                values: t.values,
                uses: Vec::new(),
            });
        }

        // The off_on table must exist before member validation runs, since a
        // member referencing it by name (either implicitly via `type: bool`
        // or explicitly via `table: off_on`) needs it to already be a real,
        // defined table rather than a name that gets special-cased past the
        // undefined-table check.
        let has_booleans = raw
            .groups
            .iter()
            .flat_map(|g| &g.members)
            .any(|m| m.ty.as_deref() == Some("bool"));
        if has_booleans && !table_names.contains(OFF_ON_TABLE) {
            table_names.insert(OFF_ON_TABLE.to_string());
            tables.push(Table {
                name: OFF_ON_TABLE.to_string(),
                values: vec!["OFF".to_string(), "ON".to_string()],
                uses: Vec::new(),
            });
        }

        let mut groups = Vec::with_capacity(raw.groups.len());
        let mut member_names: std::collections::HashMap<String, String> =
            std::collections::HashMap::new();
        for g in raw.groups {
            if g.name.is_empty() {
                return Err(GeneratorError::EmptyName { kind: "group" });
            }
            let mut members = Vec::with_capacity(g.members.len());
            for m in g.members {
                if m.name.is_empty() {
                    return Err(GeneratorError::EmptyMemberName {
                        group: g.name.clone(),
                        member: m.name,
                    });
                }
                if let Some(first_group) = member_names.insert(m.name.clone(), g.name.clone()) {
                    return Err(GeneratorError::DuplicateMember {
                        name: m.name,
                        first_group,
                        group: g.name.clone(),
                    });
                }
                let field = m.field.unwrap_or_else(|| m.name.clone());

                let (ty, table) = if m.ty.as_deref() == Some("bool") {
                    (Some(ScalarType::U8), Some(OFF_ON_TABLE.to_string()))
                } else {
                    let ty = m
                        .ty
                        .as_deref()
                        .map(|t| {
                            ScalarType::from_description(t).ok_or_else(|| {
                                GeneratorError::UnknownScalarType {
                                    name: m.name.clone(),
                                    reported: t.to_string(),
                                }
                            })
                        })
                        .transpose()?;
                    (ty, m.table)
                };

                if let Some(table_name) = &table {
                    if !table_names.contains(table_name) {
                        return Err(GeneratorError::UndefinedTable {
                            member: m.name.clone(),
                            table: table_name.clone(),
                        });
                    }
                }

                members.push(Member {
                    name: m.name,
                    field,
                    ty,
                    condition: m.condition,
                    min: m.min.as_deref().map(Bound::parse),
                    max: m.max.as_deref().map(Bound::parse),
                    table,
                });
            }
            groups.push(Group {
                name: g.name,
                c_type: g.ty,
                headers: g.headers,
                condition: g.condition,
                members,
            });
        }

        Ok(Description { tables, groups })
    }

    /// Walk groups and members in source order, pushing/popping the
    /// condition stack (SPEC_FULL.md §3 "Condition stack") and recording a
    /// table use for every member that references one. Panics only on the
    /// unbalanced-stack invariant, which would indicate a bug in this
    /// traversal itself rather than bad input.
    pub fn initialize_table_usage(&mut self) -> Result<()> {
        let mut tables_by_name = std::collections::HashMap::new();
        for (i, t) in self.tables.iter().enumerate() {
            tables_by_name.insert(t.name.clone(), i);
        }

        let mut conditions: Vec<String> = Vec::new();
        for group in &self.groups {
            if let Some(c) = &group.condition {
                conditions.push(c.clone());
            }
            for member in &group.members {
                if let Some(c) = &member.condition {
                    conditions.push(c.clone());
                }
                if let Some(table_name) = &member.table {
                    if let Some(&idx) = tables_by_name.get(table_name) {
                        self.tables[idx].add_use(&conditions);
                    }
                }
                if member.condition.is_some() {
                    conditions.pop();
                }
            }
            if group.condition.is_some() {
                conditions.pop();
            }
        }

        if !conditions.is_empty() {
            return Err(GeneratorError::UnbalancedConditions {
                remaining: conditions,
            });
        }
        Ok(())
    }

    /// All distinct condition identifiers mentioned anywhere in the
    /// description, in first-appearance order (used to build the probe in
    /// SPEC_FULL.md §4.3).
    pub fn all_conditions(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for group in &self.groups {
            if let Some(c) = &group.condition {
                if seen.insert(c.clone()) {
                    out.push(c.clone());
                }
            }
            for member in &group.members {
                if let Some(c) = &member.condition {
                    if seen.insert(c.clone()) {
                        out.push(c.clone());
                    }
                }
            }
        }
        out
    }

    pub fn group_enabled(group: &Group, active_conditions: &HashSet<String>) -> bool {
        group
            .condition
            .as_ref()
            .map_or(true, |c| active_conditions.contains(c))
    }

    pub fn member_enabled(member: &Member, active_conditions: &HashSet<String>) -> bool {
        member
            .condition
            .as_ref()
            .map_or(true, |c| active_conditions.contains(c))
    }

    /// Visit every enabled group/member pair in source order.
    pub fn for_each_enabled_member<'a>(
        &'a self,
        active_conditions: &HashSet<String>,
        mut f: impl FnMut(&'a Group, &'a Member),
    ) {
        for group in &self.groups {
            if !Self::group_enabled(group, active_conditions) {
                continue;
            }
            for member in &group.members {
                if !Self::member_enabled(member, active_conditions) {
                    continue;
                }
                f(group, member);
            }
        }
    }

    pub fn enabled_groups<'a>(&'a self, active_conditions: &HashSet<String>) -> Vec<&'a Group> {
        self.groups
            .iter()
            .filter(|g| Self::group_enabled(g, active_conditions))
            .collect()
    }

    pub fn enabled_member_count(group: &Group, active_conditions: &HashSet<String>) -> usize {
        group
            .members
            .iter()
            .filter(|m| Self::member_enabled(m, active_conditions))
            .count()
    }

    /// Table names, in ascending order, that are referenced by at least one
    /// live (condition-satisfied) use.
    pub fn ordered_enabled_table_names(&self, active_conditions: &HashSet<String>) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .tables
            .iter()
            .filter(|t| t.enabled(active_conditions))
            .map(|t| t.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_str(yaml: &str) -> Result<Description> {
        let raw: RawDescription = serde_yaml::from_str(yaml).expect("valid yaml");
        Description::from_raw(raw)
    }

    #[test]
    fn defaults_field_to_name() {
        let desc = load_str(
            r#"
groups:
  - name: G
    type: S
    members:
      - name: foo_bar
        type: uint8_t
        min: "0"
        max: "100"
"#,
        )
        .unwrap();
        assert_eq!(desc.groups[0].members[0].field, "foo_bar");
    }

    #[test]
    fn rejects_duplicate_table_names() {
        let err = load_str(
            r#"
tables:
  - name: a
    values: ["x"]
  - name: a
    values: ["y"]
groups: []
"#,
        )
        .unwrap_err();
        assert!(matches!(err, GeneratorError::DuplicateTable { .. }));
    }

    #[test]
    fn rejects_empty_group_name() {
        let err = load_str(
            r#"
groups:
  - name: ""
    type: S
    members: []
"#,
        )
        .unwrap_err();
        assert!(matches!(err, GeneratorError::EmptyName { kind: "group" }));
    }

    #[test]
    fn rejects_undefined_table_reference() {
        let err = load_str(
            r#"
groups:
  - name: G
    type: S
    members:
      - name: setting
        type: uint8_t
        table: nope
"#,
        )
        .unwrap_err();
        assert!(matches!(err, GeneratorError::UndefinedTable { .. }));
    }

    #[test]
    fn bool_rewrites_to_uint8_with_off_on_table() {
        let desc = load_str(
            r#"
groups:
  - name: G
    type: S
    members:
      - name: x
        type: bool
"#,
        )
        .unwrap();
        let m = &desc.groups[0].members[0];
        assert_eq!(m.ty, Some(ScalarType::U8));
        assert_eq!(m.table.as_deref(), Some("off_on"));
        let off_on = desc.table("off_on").unwrap();
        assert_eq!(off_on.values, vec!["OFF".to_string(), "ON".to_string()]);
    }

    #[test]
    fn rejects_explicit_off_on_reference_without_any_bool_member() {
        let err = load_str(
            r#"
groups:
  - name: G
    type: S
    members:
      - name: setting
        type: uint8_t
        table: off_on
"#,
        )
        .unwrap_err();
        assert!(matches!(err, GeneratorError::UndefinedTable { .. }));
    }

    #[test]
    fn rejects_duplicate_member_names_across_groups() {
        let err = load_str(
            r#"
groups:
  - name: G1
    type: S1
    members:
      - name: shared
        type: uint8_t
  - name: G2
    type: S2
    members:
      - name: shared
        type: uint8_t
"#,
        )
        .unwrap_err();
        assert!(matches!(err, GeneratorError::DuplicateMember { .. }));
    }

    #[test]
    fn bound_parses_literal_vs_identifier() {
        assert_eq!(Bound::parse("0"), Bound::Literal(0));
        assert_eq!(Bound::parse("-5"), Bound::Literal(-5));
        assert_eq!(
            Bound::parse("MAX_MOTORS"),
            Bound::Identifier("MAX_MOTORS".to_string())
        );
    }

    #[test]
    fn table_usage_stack_balances() {
        let mut desc = load_str(
            r#"
tables:
  - name: t
    values: ["a", "b"]
groups:
  - name: G
    type: S
    condition: COND
    members:
      - name: x
        type: uint8_t
        table: t
"#,
        )
        .unwrap();
        desc.initialize_table_usage().unwrap();
        assert_eq!(desc.table("t").unwrap().uses, vec![vec!["COND".to_string()]]);
    }
}
