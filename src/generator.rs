//! Pipeline orchestrator: runs the nine components in dependency order and
//! reports the post-run statistics and warnings the original tool prints.

use std::path::{Path, PathBuf};

use tracing::{info, info_span};

use crate::compiler::CompilerDriver;
use crate::conditions;
use crate::constants;
use crate::description::Description;
use crate::emit;
use crate::error::{GeneratorError, Result};
use crate::names::NameEncoder;
use crate::offsets;
use crate::types;
use crate::values::{resolve_member_bounds, ValueTable};

/// Settings-count, word-dictionary, and storage-size figures printed with
/// `-v`, mirroring the original's `PrintStats`.
pub struct Stats {
    pub settings_count: usize,
    pub word_count: usize,
    pub encoded_width: usize,
    pub estimated_name_bytes: usize,
}

pub struct RunOutput {
    pub stats: Stats,
    /// Tables with zero uses, reported regardless of condition gating
    /// (the original's `PrintWarnings`).
    pub unused_tables: Vec<String>,
}

/// Run the full generator pipeline: load, probe, resolve, encode, and emit.
/// `description_path`'s parent directory is the output directory for the
/// two generated files.
pub fn run(source_root: &Path, description_path: &Path) -> Result<RunOutput> {
    let mut description = {
        let _span = info_span!("load").entered();
        Description::load(description_path)?
    };

    let driver = CompilerDriver::new(source_root);

    let active_conditions = {
        let _span = info_span!("probe_conditions").entered();
        let all = description.all_conditions();
        conditions::active_conditions(&driver, &all)?
    };

    {
        let _span = info_span!("resolve_types").entered();
        types::resolve_types(&mut description, &driver)?;
    }

    {
        let _span = info_span!("table_usage").entered();
        description.initialize_table_usage()?;
    }

    let unused_tables: Vec<String> = description
        .tables
        .iter()
        .filter(|t| !t.used())
        .map(|t| t.name.clone())
        .collect();

    let constants = {
        let _span = info_span!("resolve_constants").entered();
        constants::resolve_constants(&description, &driver, &active_conditions)?
    };

    let mut names = Vec::new();
    let mut enabled_members = Vec::new();
    description.for_each_enabled_member(&active_conditions, |_group, member| {
        names.push(member.name.clone());
        enabled_members.push(member.clone());
    });
    let settings_count = names.len();

    // Cross-check against an independently derived count (groups times
    // per-group enabled member counts) before trusting it for emission.
    let recount: usize = description
        .enabled_groups(&active_conditions)
        .iter()
        .map(|group| Description::enabled_member_count(group, &active_conditions))
        .sum();
    if recount != settings_count {
        return Err(GeneratorError::SettingsCountChanged {
            before: settings_count,
            after: recount,
        });
    }

    let name_encoder = {
        let _span = info_span!("encode_names").entered();
        NameEncoder::build(&names)?
    };

    let mut resolved_bounds_err = None;
    let mut bound_values = Vec::new();
    for member in &enabled_members {
        match resolve_member_bounds(member, &constants) {
            Ok(Some(b)) => {
                bound_values.push(b.min);
                bound_values.push(b.max);
            }
            Ok(None) => {}
            Err(err) => {
                resolved_bounds_err = Some(err);
                break;
            }
        }
    }
    if let Some(err) = resolved_bounds_err {
        return Err(err);
    }
    let value_table = {
        let _span = info_span!("encode_values").entered();
        ValueTable::build(bound_values)?
    };

    let offset_type = {
        let _span = info_span!("probe_offsets").entered();
        offsets::probe_offset_type(&description, &driver, &active_conditions)?
    };

    let output_dir = output_directory(description_path);
    let pgn_count = description.enabled_groups(&active_conditions).len();
    {
        let _span = info_span!("emit").entered();
        emit::write_header(
            &description,
            &active_conditions,
            &name_encoder,
            &value_table,
            offset_type,
            settings_count,
            pgn_count,
            &output_dir,
        )?;
        emit::write_implementation(
            &description,
            &active_conditions,
            &name_encoder,
            &value_table,
            &constants,
            &output_dir,
        )?;
    }

    info!(settings_count, "generator run complete");

    Ok(RunOutput {
        stats: Stats {
            settings_count,
            word_count: name_encoder.word_count(),
            encoded_width: name_encoder.width(),
            estimated_name_bytes: name_encoder.estimated_size(settings_count),
        },
        unused_tables,
    })
}

fn output_directory(description_path: &Path) -> PathBuf {
    description_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Print the post-run statistics to stdout, matching the original's
/// `PrintStats` wording.
pub fn print_stats(stats: &Stats) {
    println!("{} settings", stats.settings_count);
    println!("word table has {} entries", stats.word_count);
    println!("each setting name uses {} bytes", stats.encoded_width);
    println!(
        "{} bytes estimated for setting name storage",
        stats.estimated_name_bytes
    );
}

/// Print one warning per unused table, matching the original's
/// `PrintWarnings` wording exactly (SPEC_FULL.md §8 scenario 6).
pub fn print_warnings(unused_tables: &[String]) {
    for name in unused_tables {
        eprintln!("WARNING: unused table {name:?}");
    }
}
