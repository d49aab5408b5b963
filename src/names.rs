//! Name Encoder (SPEC_FULL.md §4.6).
//!
//! Builds a frequency-ordered word dictionary from underscore-split member
//! names and packs each name into a fixed-width byte sequence of dictionary
//! indices, choosing the narrowest width in `[3, 6]` that fits every name.

use std::collections::{HashMap, HashSet};

use crate::error::{GeneratorError, Result};

const MIN_WIDTH: usize = 3;
const MAX_WIDTH: usize = 6;
/// Dictionaries at or above this size need varint indices instead of a
/// direct single byte per word.
const DIRECT_INDEXING_LIMIT: usize = 255;

fn write_uvarint(buf: &mut Vec<u8>, mut value: u32) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

pub struct NameEncoder {
    width: usize,
    /// Dictionary in descending-frequency order; index `i` in this vector
    /// has encoded index `i + 1` (index 0 is the null sentinel).
    words: Vec<String>,
    encoded: HashMap<String, Vec<u8>>,
}

impl NameEncoder {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn uses_direct_indexing(&self) -> bool {
        self.words.len() < DIRECT_INDEXING_LIMIT
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// The name's encoding, right-padded with zero bytes to exactly `width`.
    pub fn encode(&self, name: &str) -> Result<Vec<u8>> {
        let raw = self
            .encoded
            .get(name)
            .ok_or_else(|| GeneratorError::UnknownWord {
                word: name.to_string(),
            })?;
        let mut padded = raw.clone();
        padded.resize(self.width, 0);
        Ok(padded)
    }

    /// Estimated total byte cost: the dictionary itself (word bytes plus a
    /// terminator per word) plus `width` bytes per setting.
    pub fn estimated_size(&self, settings_count: usize) -> usize {
        let dict_size: usize = self.words.iter().map(|w| w.len() + 1).sum();
        dict_size + self.width * settings_count
    }

    /// Build the best encoder (smallest estimated size) across widths
    /// `[3, 6]`, given the full list of enabled member names in source
    /// order (duplicates allowed; frequency counts every occurrence).
    pub fn build(names: &[String]) -> Result<Self> {
        let mut best: Option<NameEncoder> = None;
        for width in MIN_WIDTH..=MAX_WIDTH {
            let candidate = Self::build_for_width(names, width)?;
            let better = match &best {
                None => true,
                Some(current) => {
                    current.estimated_size(names.len()) > candidate.estimated_size(names.len())
                }
            };
            if better {
                best = Some(candidate);
            }
        }
        Ok(best.expect("MIN_WIDTH..=MAX_WIDTH is non-empty"))
    }

    fn build_for_width(names: &[String], width: usize) -> Result<Self> {
        let mut non_split: HashSet<String> = HashSet::new();
        loop {
            let (words, words_index) = Self::build_dictionary(names, &non_split);
            let direct = words.len() < DIRECT_INDEXING_LIMIT;

            let mut encoded = HashMap::new();
            let mut overflowed = None;
            for name in names {
                let parts = Self::split(name, &non_split);
                let mut bytes = Vec::new();
                for part in &parts {
                    let index = *words_index
                        .get(part)
                        .expect("every split word was just inserted into the dictionary");
                    if direct {
                        bytes.push(index as u8);
                    } else {
                        write_uvarint(&mut bytes, index as u32);
                    }
                }
                if bytes.len() > width {
                    overflowed = Some(name.clone());
                    break;
                }
                encoded.insert(name.clone(), bytes);
            }

            match overflowed {
                Some(name) => {
                    non_split.insert(name);
                    continue;
                }
                None => {
                    return Ok(NameEncoder {
                        width,
                        words,
                        encoded,
                    });
                }
            }
        }
    }

    fn split(name: &str, non_split: &HashSet<String>) -> Vec<String> {
        if non_split.contains(name) {
            vec![name.to_string()]
        } else {
            name.split('_').map(str::to_string).collect()
        }
    }

    /// Split every name into words (respecting `non_split`), order the
    /// distinct words by descending frequency with first-appearance as a
    /// tiebreak, and return both the ordered list and a lookup from word to
    /// its 1-based index.
    fn build_dictionary(
        names: &[String],
        non_split: &HashSet<String>,
    ) -> (Vec<String>, HashMap<String, usize>) {
        let mut freq: HashMap<String, usize> = HashMap::new();
        let mut first_seen: HashMap<String, usize> = HashMap::new();
        let mut order = 0usize;
        for name in names {
            for word in Self::split(name, non_split) {
                *freq.entry(word.clone()).or_insert(0) += 1;
                first_seen.entry(word).or_insert_with(|| {
                    let v = order;
                    order += 1;
                    v
                });
            }
        }

        let mut words: Vec<String> = freq.keys().cloned().collect();
        words.sort_by(|a, b| {
            freq[b]
                .cmp(&freq[a])
                .then_with(|| first_seen[a].cmp(&first_seen[b]))
        });

        let index = words
            .iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), i + 1))
            .collect();
        (words, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_name_splits_and_encodes_within_width() {
        let names = vec!["foo_bar".to_string()];
        let enc = NameEncoder::build(&names).unwrap();
        assert_eq!(enc.width(), MIN_WIDTH);
        assert_eq!(enc.word_count(), 2);
        let encoded = enc.encode("foo_bar").unwrap();
        assert_eq!(encoded.len(), enc.width());
        assert!(enc.uses_direct_indexing());
    }

    #[test]
    fn frequency_orders_the_dictionary() {
        let names = vec![
            "alpha_beta".to_string(),
            "alpha_gamma".to_string(),
            "alpha_delta".to_string(),
        ];
        let enc = NameEncoder::build(&names).unwrap();
        assert_eq!(enc.words()[0], "alpha");
    }

    #[test]
    fn ties_break_by_first_appearance() {
        let names = vec!["zulu_yankee".to_string()];
        let enc = NameEncoder::build(&names).unwrap();
        assert_eq!(enc.words(), &["zulu".to_string(), "yankee".to_string()]);
    }

    #[test]
    fn overflowing_width_moves_name_to_non_split() {
        // Seven underscore-separated fragments packed at width 3 with
        // direct indexing (1 byte/word) would need 7 bytes; the encoder
        // must fall back to encoding it as a single whole-name word.
        let long_name = "a_b_c_d_e_f_g".to_string();
        let names = vec![long_name.clone()];
        let enc = NameEncoder::build(&names).unwrap();
        assert!(enc.width() <= MAX_WIDTH);
        let encoded = enc.encode(&long_name).unwrap();
        assert_eq!(encoded.len(), enc.width());
        // Single-word encoding: the long name now appears whole in the
        // dictionary because every width failed to pack its 7 parts.
        assert!(enc.words().contains(&long_name));
    }

    #[test]
    fn estimated_size_prefers_narrower_width_on_tie() {
        // With only three-letter fragments smaller widths are always
        // cheaper or equal, so width 3 should win.
        let names = vec!["ab_cd".to_string()];
        let enc = NameEncoder::build(&names).unwrap();
        assert_eq!(enc.width(), MIN_WIDTH);
    }

    #[test]
    fn dictionary_crossover_from_direct_to_varint() {
        // 254 distinct single-letter-ish words: direct indexing (< 255).
        let names_254: Vec<String> = (0..254).map(|i| format!("w{i}")).collect();
        let enc_254 = NameEncoder::build_for_width(&names_254, 6).unwrap();
        assert!(enc_254.uses_direct_indexing());

        // 255 distinct words: crosses into varint indexing.
        let names_255: Vec<String> = (0..255).map(|i| format!("w{i}")).collect();
        let enc_255 = NameEncoder::build_for_width(&names_255, 6).unwrap();
        assert!(!enc_255.uses_direct_indexing());

        for name in &names_254 {
            assert_eq!(enc_254.encode(name).unwrap().len(), enc_254.width());
        }
        for name in &names_255 {
            assert_eq!(enc_255.encode(name).unwrap().len(), enc_255.width());
        }
    }
}
