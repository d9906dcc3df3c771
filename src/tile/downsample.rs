//! Box-average downsampling of raw tile buffers.
//!
//! For a scale factor `s`, every destination sample is the mean of the `s x s`
//! source samples that map onto it. The mean is computed phase by phase: for
//! each offset `(dx, dy)` in `[0, s)²` the source is walked with stride `s`
//! starting at that offset, and the visited samples are added to the
//! destination accumulators. Integer samples are divided with truncation.
//!
//! Blocks on the right and bottom edges that extend past the source are
//! averaged over the samples that exist; nothing is zero-padded.

use serde::Serialize;

use crate::error::DownsampleError;
use crate::source::PixelKind;

// =============================================================================
// ScaleFactor
// =============================================================================

/// An integer downsampling factor, always >= 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ScaleFactor(u32);

impl ScaleFactor {
    /// # Errors
    ///
    /// Returns `InvalidScaleFactor` for 0.
    pub fn new(factor: u32) -> Result<Self, DownsampleError> {
        if factor < 1 {
            return Err(DownsampleError::InvalidScaleFactor(factor as f64));
        }
        Ok(Self(factor))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<f64> for ScaleFactor {
    type Error = DownsampleError;

    /// Accepts only finite integral values >= 1.
    fn try_from(factor: f64) -> Result<Self, Self::Error> {
        if !factor.is_finite() || factor.fract() != 0.0 || factor < 1.0 || factor > u32::MAX as f64
        {
            return Err(DownsampleError::InvalidScaleFactor(factor));
        }
        Ok(Self(factor as u32))
    }
}

// =============================================================================
// SampleLayout
// =============================================================================

/// How samples are arranged in a raw buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLayout {
    /// 1 (u8), 2 (big-endian u16) or 4 (big-endian f32)
    pub bytes_per_sample: usize,

    /// Samples per pixel
    pub channels: usize,

    /// `true` for pixel-interleaved (RGBRGB...), `false` for one full plane
    /// per channel
    pub interleaved: bool,
}

impl SampleLayout {
    /// Layout of tiles produced by the pixel encoder for `kind`.
    pub fn for_kind(kind: PixelKind) -> Self {
        Self {
            bytes_per_sample: kind.bytes_per_sample(),
            channels: kind.samples_per_pixel(),
            interleaved: true,
        }
    }

    #[inline]
    fn sample_index(&self, x: usize, y: usize, channel: usize, width: usize, height: usize) -> usize {
        if self.interleaved {
            (y * width + x) * self.channels + channel
        } else {
            channel * width * height + y * width + x
        }
    }
}

/// Destination size for a `width` x `height` source.
pub fn output_size(width: u32, height: u32, scale: ScaleFactor) -> (u32, u32) {
    (width.div_ceil(scale.get()), height.div_ceil(scale.get()))
}

// =============================================================================
// BoxDownsampler
// =============================================================================

/// Box-average downsampler.
///
/// Accumulation buffers are kept between calls, so one instance per worker
/// avoids reallocating them for every tile.
#[derive(Debug, Default)]
pub struct BoxDownsampler {
    int_sums: Vec<u64>,
    float_sums: Vec<f64>,
    counts: Vec<u32>,
}

impl BoxDownsampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Downsample `src`, a `width` x `height` buffer, by `scale`.
    ///
    /// The result uses the same sample width and channel layout as the input
    /// and is `ceil(width / s)` x `ceil(height / s)` pixels. A scale of 1
    /// returns the input unchanged.
    ///
    /// # Errors
    ///
    /// - `UnsupportedSampleWidth` unless `bytes_per_sample` is 1, 2 or 4
    /// - `BufferSizeMismatch` if `src` does not match the geometry
    pub fn downsample(
        &mut self,
        src: &[u8],
        width: u32,
        height: u32,
        scale: ScaleFactor,
        layout: SampleLayout,
    ) -> Result<Vec<u8>, DownsampleError> {
        let bps = layout.bytes_per_sample;
        if !matches!(bps, 1 | 2 | 4) {
            return Err(DownsampleError::UnsupportedSampleWidth(bps));
        }

        let expected = width as usize * height as usize * layout.channels * bps;
        if src.len() != expected {
            return Err(DownsampleError::BufferSizeMismatch {
                expected,
                actual: src.len(),
            });
        }

        if scale.get() == 1 {
            return Ok(src.to_vec());
        }

        let (out_w, out_h) = output_size(width, height, scale);
        let samples = out_w as usize * out_h as usize * layout.channels;
        let mut out = Vec::with_capacity(samples * bps);

        if bps == 4 {
            self.float_sums.clear();
            self.float_sums.resize(samples, 0.0);
            let sums = &mut self.float_sums;
            accumulate(&mut self.counts, width, height, scale, layout, |from, to| {
                sums[to] += read_f32(src, from) as f64;
            });
            for (i, sum) in self.float_sums.iter().enumerate() {
                let count = self.counts[pixel_of(i, out_w, out_h, layout)];
                out.extend_from_slice(&((sum / count as f64) as f32).to_be_bytes());
            }
        } else {
            self.int_sums.clear();
            self.int_sums.resize(samples, 0);
            let sums = &mut self.int_sums;
            accumulate(&mut self.counts, width, height, scale, layout, |from, to| {
                sums[to] += read_int(src, from, bps);
            });
            for (i, sum) in self.int_sums.iter().enumerate() {
                let mean = sum / self.counts[pixel_of(i, out_w, out_h, layout)] as u64;
                if bps == 1 {
                    out.push(mean as u8);
                } else {
                    out.extend_from_slice(&(mean as u16).to_be_bytes());
                }
            }
        }

        Ok(out)
    }
}

/// Walk every phase of the source and feed `(source sample, destination
/// sample)` pairs to `add`, counting contributing pixels per destination.
fn accumulate(
    counts: &mut Vec<u32>,
    width: u32,
    height: u32,
    scale: ScaleFactor,
    layout: SampleLayout,
    mut add: impl FnMut(usize, usize),
) {
    let s = scale.get() as usize;
    let (w, h) = (width as usize, height as usize);
    let (out_w, out_h) = output_size(width, height, scale);
    let (out_w, out_h) = (out_w as usize, out_h as usize);

    counts.clear();
    counts.resize(out_w * out_h, 0);

    for dy in 0..s {
        for dx in 0..s {
            for oy in 0..out_h {
                let sy = oy * s + dy;
                if sy >= h {
                    break;
                }
                for ox in 0..out_w {
                    let sx = ox * s + dx;
                    if sx >= w {
                        break;
                    }
                    counts[oy * out_w + ox] += 1;
                    for channel in 0..layout.channels {
                        let from = layout.sample_index(sx, sy, channel, w, h);
                        let to = layout.sample_index(ox, oy, channel, out_w, out_h);
                        add(from, to);
                    }
                }
            }
        }
    }
}

/// Pixel index (into `counts`) of destination sample `i`.
#[inline]
fn pixel_of(i: usize, out_w: u32, out_h: u32, layout: SampleLayout) -> usize {
    if layout.interleaved {
        i / layout.channels
    } else {
        i % (out_w as usize * out_h as usize)
    }
}

#[inline]
fn read_int(src: &[u8], sample: usize, bps: usize) -> u64 {
    let at = sample * bps;
    match bps {
        1 => src[at] as u64,
        _ => u16::from_be_bytes([src[at], src[at + 1]]) as u64,
    }
}

#[inline]
fn read_f32(src: &[u8], sample: usize) -> f32 {
    let at = sample * 4;
    f32::from_be_bytes([src[at], src[at + 1], src[at + 2], src[at + 3]])
}

// =============================================================================
// Tests
// =============================================================================
