use std::path::PathBuf;

use thiserror::Error;

/// The closed error taxonomy for the generator pipeline (see SPEC_FULL.md §7).
///
/// Every variant carries enough context — a name, a path, or a compiler
/// output snippet — to let the caller print a useful diagnostic without
/// re-deriving it from the pipeline state.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("failed to read settings description {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode settings description {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("duplicate table name {name:?}")]
    DuplicateTable { name: String },

    #[error("empty {kind} name")]
    EmptyName { kind: &'static str },

    #[error("member {member:?} references undefined table {table:?}")]
    UndefinedTable { member: String, table: String },

    #[error("member {member:?} in group {group:?} has no name")]
    EmptyMemberName { group: String, member: String },

    #[error("duplicate member name {name:?} (first seen in group {first_group:?}, again in group {group:?})")]
    DuplicateMember {
        name: String,
        first_group: String,
        group: String,
    },

    #[error("could not create temporary directory: {0}")]
    TempDir(#[source] std::io::Error),

    #[error("could not write probe source file {path}: {source}")]
    TempWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse compiler diagnostic for {context}; compiler output was:\n{snippet}")]
    DiagnosticParse { context: String, snippet: String },

    #[error("could not determine scalar type for setting {name:?} (field {field:?} in group {group:?})")]
    UnresolvedType {
        name: String,
        field: String,
        group: String,
    },

    #[error("unknown scalar type {reported:?} reported by compiler for setting {name:?}")]
    UnknownScalarType { name: String, reported: String },

    #[error("could not resolve constant(s) {names:?}; compiler made no further progress")]
    UnresolvedConstants { names: Vec<String> },

    #[error("word {word:?} is missing from the dictionary after rebuild")]
    UnknownWord { word: String },

    #[error("value table has {count} distinct bounds, more than the 256 a single index byte can address")]
    ValueTableFull { count: usize },

    #[error("min/max expression {expr:?} on setting {name:?} is neither a literal integer nor a resolved identifier")]
    UnresolvedBound { name: String, expr: String },

    #[error("condition stack was not empty after the usage traversal (left: {remaining:?})")]
    UnbalancedConditions { remaining: Vec<String> },

    #[error("settings count changed between passes: {before} then {after}")]
    SettingsCountChanged { before: usize, after: usize },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, GeneratorError>;
