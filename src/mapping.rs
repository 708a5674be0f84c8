//! Stradella key mapping table
//!
//! Maps computer-keyboard key codes to single notes and chords laid out on
//! the cycle of fifths, the way the bass side of an accordion is arranged.
//! The table is built once from a base note and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::midi::{note_name, DATA_MAX};

/// Default base note (C2), produced by the `F` key
pub const DEFAULT_BASE_NOTE: u8 = 36;

/// Canonical key identity
///
/// Letters are always stored upper-case so `f` and `F` resolve identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCode(pub u32);

impl KeyCode {
    pub fn from_char(c: char) -> Self {
        KeyCode(c.to_ascii_uppercase() as u32)
    }

    pub fn as_char(&self) -> Option<char> {
        char::from_u32(self.0).filter(|c| !c.is_control())
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_char() {
            Some(c) => write!(f, "{}", c),
            None => write!(f, "#{}", self.0),
        }
    }
}

/// Chord shape produced by a key row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageGroupType {
    SingleNote,
    ThirdNote,
    MajorChord,
    MinorChord,
}

impl MessageGroupType {
    /// Semitone offsets from the root, ascending
    pub fn intervals(&self) -> &'static [i32] {
        match self {
            MessageGroupType::SingleNote => &[0],
            MessageGroupType::ThirdNote => &[4],
            MessageGroupType::MajorChord => &[0, 4, 7],
            MessageGroupType::MinorChord => &[0, 3, 7],
        }
    }

    /// Chord rows sound one octave above the bass rows
    fn octave_shift(&self) -> i32 {
        match self {
            MessageGroupType::SingleNote | MessageGroupType::ThirdNote => 0,
            MessageGroupType::MajorChord | MessageGroupType::MinorChord => 12,
        }
    }

    fn label(&self, root: u8, first_note: u8) -> String {
        match self {
            MessageGroupType::SingleNote | MessageGroupType::ThirdNote => note_name(first_note),
            MessageGroupType::MajorChord => format!("{} Major", note_name(root)),
            MessageGroupType::MinorChord => format!("{} Minor", note_name(root)),
        }
    }
}

/// How out-of-band roots are brought into the protocol range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangePolicy {
    /// Keep the raw fifths offsets; shift whole octaves only when a note
    /// would leave 0-127
    #[default]
    Transpose,
    /// Wrap every root into one octave starting at the row's base
    Fold,
}

/// One row of the physical layout
#[derive(Debug, Clone, Copy)]
pub struct LayoutRow {
    pub group: MessageGroupType,
    pub keys: &'static [char],
    /// Cycle-of-fifths offsets from the base note, one per key
    pub offsets: &'static [i32],
}

/// Physical layout, top to bottom as displayed
pub const LAYOUT: [LayoutRow; 4] = [
    LayoutRow {
        group: MessageGroupType::MinorChord,
        keys: &['1', '2', '3', '4', '5', '6', '7'],
        offsets: &[-21, -14, -7, 0, 7, 14, 21],
    },
    LayoutRow {
        group: MessageGroupType::MajorChord,
        keys: &['Q', 'W', 'E', 'R', 'T', 'Y', 'U', 'I', 'O', 'P'],
        offsets: &[-28, -21, -14, -7, 0, 7, 14, 21, 28, 35],
    },
    LayoutRow {
        group: MessageGroupType::SingleNote,
        keys: &['A', 'S', 'D', 'F', 'G', 'H', 'J', 'K'],
        offsets: &[-21, -14, -7, 0, 7, 14, 21, 28],
    },
    LayoutRow {
        group: MessageGroupType::ThirdNote,
        keys: &['Z', 'X', 'C', 'V', 'B', 'N', 'M'],
        offsets: &[-21, -14, -7, 0, 7, 14, 21],
    },
];

/// Immutable key → notes record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMapping {
    key: KeyCode,
    group: MessageGroupType,
    notes: Vec<u8>,
    label: String,
}

impl KeyMapping {
    pub fn key(&self) -> KeyCode {
        self.key
    }

    pub fn group(&self) -> MessageGroupType {
        self.group
    }

    /// Note numbers in emission order (ascending), never empty
    pub fn notes(&self) -> &[u8] {
        &self.notes
    }

    /// Display label, e.g. "C2" or "F3 Major"
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Complete mapping table
#[derive(Debug, Clone)]
pub struct KeyMappingSet {
    base_note: u8,
    policy: RangePolicy,
    mappings: HashMap<KeyCode, KeyMapping>,
}

impl KeyMappingSet {
    /// Build the default layout around `base_note` with the transpose policy
    pub fn build(base_note: u8) -> Self {
        Self::build_with_policy(base_note, RangePolicy::Transpose)
    }

    /// Build the layout around `base_note` with an explicit range policy
    pub fn build_with_policy(base_note: u8, policy: RangePolicy) -> Self {
        let base = base_note.min(DATA_MAX) as i32;
        let mut mappings = HashMap::new();

        for row in LAYOUT.iter() {
            for (&key, &offset) in row.keys.iter().zip(row.offsets) {
                let band_low = base + row.group.octave_shift();
                let root = match policy {
                    RangePolicy::Transpose => band_low + offset,
                    RangePolicy::Fold => band_low + offset.rem_euclid(12),
                };

                let notes = fit_to_range(root, row.group.intervals());
                let root = (notes[0] as i32 - row.group.intervals()[0]) as u8;
                let key = KeyCode::from_char(key);

                mappings.insert(
                    key,
                    KeyMapping {
                        key,
                        group: row.group,
                        label: row.group.label(root, notes[0]),
                        notes,
                    },
                );
            }
        }

        Self {
            base_note: base as u8,
            policy,
            mappings,
        }
    }

    /// Look up a key; unmapped keys are legal and yield `None`
    pub fn resolve(&self, key: KeyCode) -> Option<&KeyMapping> {
        self.mappings.get(&key)
    }

    pub fn base_note(&self) -> u8 {
        self.base_note
    }

    pub fn policy(&self) -> RangePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Mappings grouped by layout row, in display order
    pub fn rows(&self) -> Vec<(MessageGroupType, Vec<&KeyMapping>)> {
        LAYOUT
            .iter()
            .map(|row| {
                let keys = row
                    .keys
                    .iter()
                    .filter_map(|&c| self.resolve(KeyCode::from_char(c)))
                    .collect();
                (row.group, keys)
            })
            .collect()
    }
}

impl Default for KeyMappingSet {
    fn default() -> Self {
        Self::build(DEFAULT_BASE_NOTE)
    }
}

/// Apply the chord shape and shift by whole octaves until every note is in 0-127
fn fit_to_range(root: i32, intervals: &[i32]) -> Vec<u8> {
    let low = root + intervals[0];
    let high = root + intervals[intervals.len() - 1];

    let mut shift = 0;
    while low + shift < 0 {
        shift += 12;
    }
    while high + shift > DATA_MAX as i32 {
        shift -= 12;
    }

    intervals.iter().map(|i| (root + shift + i) as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn notes(set: &KeyMappingSet, c: char) -> Vec<u8> {
        set.resolve(KeyCode::from_char(c)).unwrap().notes().to_vec()
    }

    #[test]
    fn test_f_key_is_base_note() {
        let set = KeyMappingSet::default();
        let f = set.resolve(KeyCode::from_char('f')).unwrap();
        assert_eq!(f.group(), MessageGroupType::SingleNote);
        assert_eq!(f.notes(), &[36]);
        assert_eq!(f.label(), "C2");
    }

    #[test]
    fn test_single_note_row_follows_fifths() {
        let set = KeyMappingSet::default();
        let row: Vec<u8> = "ASDFGHJK".chars().map(|c| notes(&set, c)[0]).collect();
        assert_eq!(row, vec![15, 22, 29, 36, 43, 50, 57, 64]);
    }

    #[test]
    fn test_third_row_is_major_third_above() {
        let set = KeyMappingSet::default();
        assert_eq!(notes(&set, 'V'), vec![40]);
        assert_eq!(notes(&set, 'Z'), vec![19]);
        assert_eq!(set.resolve(KeyCode::from_char('V')).unwrap().label(), "E2");
    }

    #[test]
    fn test_chord_shapes() {
        let set = KeyMappingSet::default();
        assert_eq!(notes(&set, 'T'), vec![48, 52, 55]);
        assert_eq!(notes(&set, 'P'), vec![83, 87, 90]);
        assert_eq!(notes(&set, '4'), vec![48, 51, 55]);
        assert_eq!(set.resolve(KeyCode::from_char('T')).unwrap().label(), "C3 Major");
        assert_eq!(set.resolve(KeyCode::from_char('4')).unwrap().label(), "C3 Minor");
    }

    #[test]
    fn test_unmapped_keys() {
        let set = KeyMappingSet::default();
        assert!(set.resolve(KeyCode::from_char('L')).is_none());
        assert!(set.resolve(KeyCode::from_char(';')).is_none());
        assert!(set.resolve(KeyCode::from_char('8')).is_none());
        assert!(set.resolve(KeyCode(0x10)).is_none());
    }

    #[test]
    fn test_table_size() {
        assert_eq!(KeyMappingSet::default().len(), 7 + 10 + 8 + 7);
    }

    #[test]
    fn test_build_is_deterministic() {
        let a = KeyMappingSet::build(41);
        let b = KeyMappingSet::build(41);
        for (key, mapping) in &a.mappings {
            assert_eq!(b.resolve(*key), Some(mapping));
        }
    }

    #[test]
    fn test_transpose_keeps_high_base_in_range() {
        let set = KeyMappingSet::build(120);
        let p = notes(&set, 'P');
        assert!(p.iter().all(|&n| n <= 127));
        assert_eq!(p[1] - p[0], 4);
        assert_eq!(p[2] - p[0], 7);
    }

    #[test]
    fn test_fold_wraps_roots_into_one_octave() {
        let set = KeyMappingSet::build_with_policy(36, RangePolicy::Fold);
        for c in "ASDFGHJK".chars() {
            let n = notes(&set, c)[0];
            assert!((36..48).contains(&n), "{} -> {}", c, n);
        }
        for c in "QWERTYUIOP".chars() {
            let root = notes(&set, c)[0];
            assert!((48..60).contains(&root), "{} -> {}", c, root);
        }
        assert_eq!(notes(&set, 'F'), vec![36]);
        assert_eq!(notes(&set, 'G'), vec![43]);
        assert_eq!(notes(&set, 'H'), vec![38]);
    }

    #[test]
    fn test_key_code_letters_upper_case() {
        assert_eq!(KeyCode::from_char('a'), KeyCode::from_char('A'));
        assert_eq!(KeyCode::from_char('1'), KeyCode('1' as u32));
        assert_eq!(KeyCode::from_char('q').to_string(), "Q");
    }

    #[test]
    fn test_rows_in_layout_order() {
        let set = KeyMappingSet::default();
        let rows = set.rows();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].0, MessageGroupType::MinorChord);
        assert_eq!(rows[2].1.len(), 8);
    }

    proptest! {
        #[test]
        fn prop_notes_in_range_and_shapes_preserved(base in 0u8..=127, fold in any::<bool>()) {
            let policy = if fold { RangePolicy::Fold } else { RangePolicy::Transpose };
            let set = KeyMappingSet::build_with_policy(base, policy);
            for mapping in set.mappings.values() {
                prop_assert!(!mapping.notes().is_empty());
                prop_assert!(mapping.notes().iter().all(|&n| n <= 127));
                let intervals = mapping.group().intervals();
                let root = mapping.notes()[0] as i32 - intervals[0];
                for (note, interval) in mapping.notes().iter().zip(intervals) {
                    prop_assert_eq!(*note as i32, root + interval);
                }
            }
        }
    }
}
