//! Fixed-point scale table keyed by field byte width.
//!
//! Motion sensors report each axis as a signed fixed-point integer of a
//! known byte width. The physical value is `raw * scale / MAX_INT[width]`
//! where `MAX_INT` is the largest signed value of the width. Divisors are
//! fixed; configuration can only add widths beyond the standard 1/2/4.

use std::collections::BTreeMap;

use uwb_common::config::{signed_max, DecodeConfig, STANDARD_BYTE_WIDTHS};

use crate::error::WireError;

/// Read-only map from byte width to the signed maximum for that width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleTable {
    max_int: BTreeMap<u8, i64>,
}

impl ScaleTable {
    /// The signed maxima for 1, 2 and 4 byte fields.
    pub fn standard() -> Self {
        ScaleTable {
            max_int: STANDARD_BYTE_WIDTHS
                .into_iter()
                .filter_map(|width| signed_max(width).map(|max| (width, max)))
                .collect(),
        }
    }

    /// The standard table plus `entries`, each of which must carry the
    /// signed maximum of its width.
    pub fn new<I>(entries: I) -> Result<Self, WireError>
    where
        I: IntoIterator<Item = (u8, i64)>,
    {
        let mut table = Self::standard();
        for (byte_width, max) in entries {
            if signed_max(byte_width) != Some(max) {
                return Err(WireError::InvalidScale {
                    byte_width,
                    max_int: max,
                });
            }
            table.max_int.insert(byte_width, max);
        }
        Ok(table)
    }

    /// Build from the `[decode]` configuration section.
    pub fn from_config(config: &DecodeConfig) -> Result<Self, WireError> {
        Self::new(
            config
                .scale_table
                .iter()
                .map(|entry| (entry.byte_width, entry.max_int)),
        )
    }

    /// Divisor for a byte width; always positive when present.
    pub fn max_int(&self, byte_width: u8) -> Option<i64> {
        self.max_int.get(&byte_width).copied()
    }

    /// Known byte widths in ascending order.
    pub fn widths(&self) -> impl Iterator<Item = u8> + '_ {
        self.max_int.keys().copied()
    }
}

impl Default for ScaleTable {
    fn default() -> Self {
        Self::standard()
    }
}
