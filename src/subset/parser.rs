//! Subset expression parser.

use crate::error::RangeParseError;

/// Upper bound on the number of indices a single block may produce.
pub const MAX_BLOCK_INDICES: usize = 1 << 24;

// =============================================================================
// AxisRange
// =============================================================================

/// An ordered, bounds-checked selection of indices along one axis.
///
/// Order is the order in which blocks appeared in the expression. Duplicates
/// are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisRange {
    indices: Vec<u32>,
    axis_length: u32,
}

impl AxisRange {
    /// Every index of an axis, in order.
    pub fn full(axis_length: u32) -> Self {
        Self {
            indices: (0..axis_length).collect(),
            axis_length,
        }
    }

    /// Number of selected indices.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Length of the axis the range was validated against.
    pub fn axis_length(&self) -> u32 {
        self.axis_length
    }

    /// Source index at position `i` of the selection.
    pub fn get(&self, i: usize) -> Option<u32> {
        self.indices.get(i).copied()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.indices
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.indices.iter().copied()
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse a subset expression for an axis of `axis_length` indices.
///
/// # Errors
///
/// Any malformed block, zero or misdirected step, or index outside
/// `0..axis_length` fails the whole expression.
pub fn parse_range(expression: &str, axis_length: u32) -> Result<AxisRange, RangeParseError> {
    if expression.trim().is_empty() {
        return Ok(AxisRange::full(axis_length));
    }

    let mut indices = Vec::new();
    for block in expression.split(',') {
        parse_block(block.trim(), axis_length, &mut indices)?;
    }

    Ok(AxisRange {
        indices,
        axis_length,
    })
}

fn parse_block(block: &str, axis_length: u32, out: &mut Vec<u32>) -> Result<(), RangeParseError> {
    let parts: Vec<&str> = block.split(':').map(str::trim).collect();

    match parts.as_slice() {
        [single] => {
            let value = resolve(parse_number(block, single)?, axis_length);
            push_index(value, axis_length, out)
        }
        [start, end] => {
            let start = resolve(parse_number(block, start)?, axis_length);
            let end = resolve(parse_number(block, end)?, axis_length);
            if end < start {
                return Err(RangeParseError::ReversedRange { start, end });
            }
            expand(block, start, 1.0, end, axis_length, out)
        }
        [start, step, end] => {
            let start = resolve(parse_number(block, start)?, axis_length);
            // The step is never counted from the end of the axis
            let step = parse_number(block, step)?;
            let end = resolve(parse_number(block, end)?, axis_length);

            if step == 0.0 {
                return Err(RangeParseError::ZeroStep {
                    block: block.to_string(),
                });
            }
            if (step > 0.0 && end < start) || (step < 0.0 && end > start) {
                return Err(RangeParseError::StepDirection { start, step, end });
            }
            expand(block, start, step, end, axis_length, out)
        }
        _ => Err(RangeParseError::InvalidBlock {
            block: block.to_string(),
            parts: parts.len(),
        }),
    }
}

fn parse_number(block: &str, part: &str) -> Result<f64, RangeParseError> {
    match part.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(RangeParseError::InvalidNumber {
            block: block.to_string(),
            part: part.to_string(),
        }),
    }
}

/// Negative values count back from the end of the axis.
#[inline]
fn resolve(value: f64, axis_length: u32) -> f64 {
    if value < 0.0 {
        axis_length as f64 + value
    } else {
        value
    }
}

/// Emit `start, start+step, ...` up to and including `end`.
///
/// Each value is computed from `start` rather than accumulated so that
/// fractional steps do not drift.
fn expand(
    block: &str,
    start: f64,
    step: f64,
    end: f64,
    axis_length: u32,
    out: &mut Vec<u32>,
) -> Result<(), RangeParseError> {
    let span = ((end - start) / step).floor();
    if span + 1.0 > MAX_BLOCK_INDICES as f64 {
        return Err(RangeParseError::TooManyIndices {
            block: block.to_string(),
            limit: MAX_BLOCK_INDICES,
        });
    }

    for k in 0..=(span as u64) {
        let value = start + k as f64 * step;
        let past_end = if step > 0.0 { value > end } else { value < end };
        if past_end {
            break;
        }
        push_index(value, axis_length, out)?;
    }
    Ok(())
}

fn push_index(value: f64, axis_length: u32, out: &mut Vec<u32>) -> Result<(), RangeParseError> {
    if value < 0.0 {
        return Err(RangeParseError::NegativeIndex {
            value,
            length: axis_length,
        });
    }

    let index = value.trunc() as u64;
    if index >= axis_length as u64 {
        return Err(RangeParseError::OutOfBounds {
            index,
            length: axis_length,
        });
    }

    out.push(index as u32);
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
