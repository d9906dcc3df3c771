//! Test utilities for integration tests.
//!
//! This module provides instrumented image sources and container formats, and
//! helpers for building test images and reference pyramids.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use image::{GrayImage, Luma, Rgba, RgbaImage};

use pyramid_export::container::{
    ContainerDescriptor, ContainerFormat, ContainerReader, ContainerWriter, RawContainerFormat,
    RawContainerReader, RawContainerWriter,
};
use pyramid_export::error::{ContainerError, SourceError};
use pyramid_export::region::Rect;
use pyramid_export::source::{
    Gray16Image, Gray32FImage, ImageDimensions, ImageSource, InMemorySource, PixelPlane,
    PixelType, PlaneSelector,
};
use pyramid_export::CancelHandle;

// =============================================================================
// Test Images
// =============================================================================

/// Deterministic 8-bit value for a pixel of plane `plane`.
pub fn pattern_value(x: u32, y: u32, plane: u32) -> u8 {
    ((x * 3 + y * 5 + plane * 17 + (x * y) % 7) % 256) as u8
}

/// Gray8 source with `c * z * t` planes stored in (t, c, z) order.
pub fn pattern_source(width: u32, height: u32, c: u32, z: u32, t: u32) -> InMemorySource {
    let planes = (0..c * z * t)
        .map(|plane| {
            PixelPlane::Gray8(GrayImage::from_fn(width, height, |x, y| {
                Luma([pattern_value(x, y, plane)])
            }))
        })
        .collect();
    InMemorySource::new(planes, c, z, t).unwrap()
}

/// Single-plane 16-bit source.
pub fn gray16_source(width: u32, height: u32) -> InMemorySource {
    InMemorySource::single(PixelPlane::Gray16(Gray16Image::from_fn(width, height, |x, y| {
        Luma([(x * 1000 + y * 7) as u16])
    })))
}

/// Single-plane float source.
pub fn gray32f_source(width: u32, height: u32) -> InMemorySource {
    InMemorySource::single(PixelPlane::Gray32F(Gray32FImage::from_fn(width, height, |x, y| {
        Luma([x as f32 * 0.5 - y as f32])
    })))
}

/// Single-plane RGBA source; alpha is never exported.
pub fn rgba_source(width: u32, height: u32) -> InMemorySource {
    InMemorySource::single(PixelPlane::Rgba8(RgbaImage::from_fn(width, height, |x, y| {
        Rgba([x as u8, y as u8, (x + y) as u8, 128])
    })))
}

// =============================================================================
// Reference Pyramid
// =============================================================================

/// Box-average an 8-bit `width` x `height` image by `s`, truncating.
pub fn reference_downsample(src: &[u8], width: u32, height: u32, s: u32) -> Vec<u8> {
    let (out_w, out_h) = (width / s, height / s);
    let mut out = Vec::with_capacity((out_w * out_h) as usize);
    for oy in 0..out_h {
        for ox in 0..out_w {
            let mut sum = 0u32;
            for dy in 0..s {
                for dx in 0..s {
                    sum += src[((oy * s + dy) * width + ox * s + dx) as usize] as u32;
                }
            }
            out.push((sum / (s * s)) as u8);
        }
    }
    out
}

/// Read a whole level plane from a container.
pub fn read_level(reader: &mut RawContainerReader, level: usize, plane: usize) -> Vec<u8> {
    let (width, height) = reader.level_dimensions(level).unwrap();
    reader
        .read_region(level, plane, Rect::new(0, 0, width, height))
        .unwrap()
}

/// Files left in a directory.
pub fn dir_entries(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect()
}

// =============================================================================
// Instrumented Source
// =============================================================================

/// What an [`InstrumentedSource`] does on a given read.
#[derive(Clone)]
pub enum ReadFault {
    /// Return an I/O error
    Fail,
    /// Panic inside the worker
    Panic,
    /// Cancel the given handle, then return the data
    Cancel(CancelHandle),
}

/// Wraps a source to count reads, slow them down and inject faults.
pub struct InstrumentedSource<S> {
    inner: S,
    reads: AtomicUsize,
    delay: Option<Duration>,
    fault: Option<(usize, ReadFault)>,
}

impl<S: ImageSource> InstrumentedSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
            delay: None,
            fault: None,
        }
    }

    /// Sleep this long in every read.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Trigger `fault` on the read with 0-based index `read`.
    pub fn with_fault(mut self, read: usize, fault: ReadFault) -> Self {
        self.fault = Some((read, fault));
        self
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl<S: ImageSource> ImageSource for InstrumentedSource<S> {
    fn dimensions(&self) -> ImageDimensions {
        self.inner.dimensions()
    }

    fn pixel_type(&self) -> PixelType {
        self.inner.pixel_type()
    }

    fn read_region(&self, plane: PlaneSelector, rect: Rect) -> Result<PixelPlane, SourceError> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if let Some((at, fault)) = &self.fault {
            if *at == n {
                match fault {
                    ReadFault::Fail => {
                        return Err(SourceError::Io(std::io::Error::other("injected read failure")))
                    }
                    ReadFault::Panic => panic!("injected read panic"),
                    ReadFault::Cancel(handle) => handle.cancel(),
                }
            }
        }
        self.inner.read_region(plane, rect)
    }
}

/// A source reporting a pixel type that cannot be exported.
pub struct Float64Source;

impl ImageSource for Float64Source {
    fn dimensions(&self) -> ImageDimensions {
        ImageDimensions {
            size_x: 64,
            size_y: 64,
            size_c: 1,
            size_z: 1,
            size_t: 1,
        }
    }

    fn pixel_type(&self) -> PixelType {
        PixelType::Float64
    }

    fn read_region(&self, _plane: PlaneSelector, _rect: Rect) -> Result<PixelPlane, SourceError> {
        Err(SourceError::UnsupportedPixelType(PixelType::Float64))
    }
}

// =============================================================================
// Recording Container Format
// =============================================================================

/// One `write_tile` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub path: PathBuf,
    pub level: usize,
    pub plane: usize,
    pub rect: Rect,
}

/// Raw container format that logs every tile write and can fail on demand.
#[derive(Clone, Default)]
pub struct RecordingFormat {
    writes: Arc<Mutex<Vec<WriteRecord>>>,
    opens: Arc<AtomicUsize>,
    fail_after: Option<usize>,
}

impl RecordingFormat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every writer fail once it has written `tiles` tiles.
    pub fn failing_after(tiles: usize) -> Self {
        Self {
            fail_after: Some(tiles),
            ..Self::default()
        }
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().unwrap().clone()
    }

    /// Writes that went to `path`.
    pub fn writes_to(&self, path: &Path) -> Vec<WriteRecord> {
        self.writes()
            .into_iter()
            .filter(|record| record.path == path)
            .collect()
    }

    /// Number of readers opened.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl ContainerFormat for RecordingFormat {
    type Writer = RecordingWriter;
    type Reader = RawContainerReader;

    fn create(
        &self,
        path: &Path,
        descriptor: &ContainerDescriptor,
    ) -> Result<RecordingWriter, ContainerError> {
        Ok(RecordingWriter {
            inner: RawContainerFormat.create(path, descriptor)?,
            path: path.to_path_buf(),
            writes: Arc::clone(&self.writes),
            fail_after: self.fail_after,
            written: 0,
        })
    }

    fn open(&self, path: &Path) -> Result<RawContainerReader, ContainerError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        RawContainerFormat.open(path)
    }
}

pub struct RecordingWriter {
    inner: RawContainerWriter,
    path: PathBuf,
    writes: Arc<Mutex<Vec<WriteRecord>>>,
    fail_after: Option<usize>,
    written: usize,
}

impl ContainerWriter for RecordingWriter {
    fn declare_level(
        &mut self,
        level: usize,
        width: u32,
        height: u32,
    ) -> Result<(), ContainerError> {
        self.inner.declare_level(level, width, height)
    }

    fn write_tile(
        &mut self,
        level: usize,
        plane: usize,
        rect: Rect,
        data: &[u8],
    ) -> Result<(), ContainerError> {
        if self.fail_after == Some(self.written) {
            return Err(ContainerError::Io(std::io::Error::other("injected write failure")));
        }
        self.inner.write_tile(level, plane, rect, data)?;
        self.written += 1;
        self.writes.lock().unwrap().push(WriteRecord {
            path: self.path.clone(),
            level,
            plane,
            rect,
        });
        Ok(())
    }

    fn close(&mut self) -> Result<(), ContainerError> {
        self.inner.close()
    }
}
