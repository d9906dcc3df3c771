//! Axis subset expressions.
//!
//! Each of the C, Z and T axes can be restricted with a small expression
//! language. An expression is a comma-separated list of blocks whose results
//! are concatenated in order:
//!
//! ```text
//! ""          every index, 0..len-1
//! "3"         a single index
//! "-1"        counted from the end: len-1
//! "2:5"       inclusive range 2,3,4,5
//! "0:2:9"     stepped range 0,2,4,6,8
//! "9:-3:0"    descending 9,6,3,0
//! "0,4:5,-1"  union of blocks in order
//! ```
//!
//! Indices are never sorted or de-duplicated, and every index must lie inside
//! the axis.

mod parser;

pub use parser::{parse_range, AxisRange, MAX_BLOCK_INDICES};

use crate::error::ExportError;
use crate::source::ImageDimensions;

/// The three per-axis subset expressions of an export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubsetExpressions {
    pub channels: String,
    pub z: String,
    pub t: String,
}

impl SubsetExpressions {
    /// Expressions selecting every index of every axis.
    pub fn all() -> Self {
        Self::default()
    }
}

/// Parsed subsets for the C, Z and T axes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisSubsets {
    pub channels: AxisRange,
    pub z: AxisRange,
    pub t: AxisRange,
}

impl AxisSubsets {
    /// Parse all three expressions against the image's axis sizes.
    ///
    /// Each axis is parsed from its own expression.
    pub fn parse(
        expressions: &SubsetExpressions,
        dimensions: &ImageDimensions,
    ) -> Result<Self, ExportError> {
        let channels = parse_range(&expressions.channels, dimensions.size_c).map_err(|source| {
            ExportError::Range {
                axis: "channel",
                source,
            }
        })?;
        let z = parse_range(&expressions.z, dimensions.size_z).map_err(|source| {
            ExportError::Range { axis: "z", source }
        })?;
        let t = parse_range(&expressions.t, dimensions.size_t).map_err(|source| {
            ExportError::Range { axis: "time", source }
        })?;
        Ok(Self { channels, z, t })
    }

    /// Number of planes per resolution level.
    pub fn plane_count(&self) -> usize {
        self.channels.len() * self.z.len() * self.t.len()
    }
}
