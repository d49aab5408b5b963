//! Value Encoder (SPEC_FULL.md §4.7).
//!
//! Interns the distinct integer values used as member bounds into a shared,
//! ascending value table and exposes each member's bounds as a pair of
//! one-byte indices into it.

use std::collections::{BTreeSet, HashMap};

use crate::description::{Bound, Member};
use crate::error::{GeneratorError, Result};

/// A member's resolved bounds, ready to be indexed once the shared value
/// table exists. `None` for members that don't take a min/max at all
/// (lookup-table members, or members with neither bound set).
pub struct ResolvedBounds {
    pub min: i64,
    pub max: i64,
    /// Set when the description omitted `min` (SPEC_FULL.md §8 boundary
    /// behaviour: "min absent, max present: MODE_MAX flag set").
    pub mode_max: bool,
}

fn resolve_bound(member_name: &str, bound: &Bound, constants: &HashMap<String, i64>) -> Result<i64> {
    match bound {
        Bound::Literal(v) => Ok(*v),
        Bound::Identifier(id) => {
            constants
                .get(id)
                .copied()
                .ok_or_else(|| GeneratorError::UnresolvedBound {
                    name: member_name.to_string(),
                    expr: id.clone(),
                })
        }
    }
}

/// Resolve one member's min/max into concrete integers. Lookup-table
/// members carry no bounds; neither do members with `max` absent, whether
/// or not `min` is set — a `min`-only member has nothing the original emits
/// a config field for, so it is treated the same as having no bounds at all.
pub fn resolve_member_bounds(
    member: &Member,
    constants: &HashMap<String, i64>,
) -> Result<Option<ResolvedBounds>> {
    if member.table.is_some() {
        return Ok(None);
    }
    if member.max.is_none() {
        return Ok(None);
    }
    let mode_max = member.min.is_none();
    let min = match &member.min {
        Some(b) => resolve_bound(&member.name, b, constants)?,
        None => 0,
    };
    let max = resolve_bound(&member.name, member.max.as_ref().unwrap(), constants)?;
    Ok(Some(ResolvedBounds { min, max, mode_max }))
}

/// The shared, ascending, de-duplicated table of bound values, and the
/// narrowest min/max scalar types capable of representing its extremes.
pub struct ValueTable {
    values: Vec<i64>,
}

impl ValueTable {
    pub fn build<I: IntoIterator<Item = i64>>(bounds: I) -> Result<Self> {
        let set: BTreeSet<i64> = bounds.into_iter().collect();
        if set.len() > 256 {
            return Err(GeneratorError::ValueTableFull { count: set.len() });
        }
        Ok(Self {
            values: set.into_iter().collect(),
        })
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    /// Position of `value` in the ascending table. Panics if `value` was
    /// never interned via `build`, which would indicate a bug in the
    /// caller rather than bad input.
    pub fn index_of(&self, value: i64) -> u8 {
        self.values
            .binary_search(&value)
            .expect("value must have been interned before indexing") as u8
    }

    /// Narrowest signed C type that can hold the table's minimum value.
    pub fn min_type(&self) -> &'static str {
        let min = self.values.iter().copied().min().unwrap_or(0);
        if min >= i8::MIN as i64 && min <= i8::MAX as i64 {
            "int8_t"
        } else if min >= i16::MIN as i64 && min <= i16::MAX as i64 {
            "int16_t"
        } else {
            "int32_t"
        }
    }

    /// Narrowest unsigned C type that can hold the table's maximum value.
    pub fn max_type(&self) -> &'static str {
        let max = self.values.iter().copied().max().unwrap_or(0);
        if max >= 0 && max <= u8::MAX as i64 {
            "uint8_t"
        } else if max >= 0 && max <= u16::MAX as i64 {
            "uint16_t"
        } else {
            "uint32_t"
        }
    }
}
