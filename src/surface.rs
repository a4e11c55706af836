//! Pixel surfaces and the double-buffered frame store.
//!
//! Pixels are packed `0x00RRGGBB`. The simulation thread renders into the
//! back surface and swaps; a display thread reads the front surface. One
//! mutex serializes both.

use std::ops::Deref;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::tiles::Tile;

pub const WHITE: u32 = 0x00FF_FFFF;

/// A row-major raster of packed RGB pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct Surface {
    width: usize,
    height: usize,
    pixels: Vec<u32>,
}

impl Surface {
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, WHITE)
    }

    pub fn filled(width: usize, height: usize, color: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }

    pub fn get(&self, x: usize, y: usize) -> u32 {
        self.pixels[y * self.width + x]
    }

    pub fn fill(&mut self, color: u32) {
        self.pixels.fill(color);
    }

    /// Splits the raster into one disjoint writable region per tile.
    ///
    /// `tiles` must be pairwise disjoint and inside the surface; regions are
    /// returned in the same order as `tiles`.
    pub fn tile_regions_mut<'a>(&'a mut self, tiles: &[Tile]) -> Vec<TileRegion<'a>> {
        let mut regions: Vec<TileRegion<'a>> = tiles
            .iter()
            .map(|&tile| TileRegion {
                tile,
                rows: Vec::with_capacity(tile.height),
            })
            .collect();

        if self.width == 0 {
            return regions;
        }

        let mut by_x: Vec<usize> = (0..tiles.len()).collect();
        by_x.sort_by_key(|&i| tiles[i].x);

        let width = self.width;
        let pixels: &'a mut [u32] = &mut self.pixels;
        for (y, row) in pixels.chunks_mut(width).enumerate() {
            let mut rest: &'a mut [u32] = row;
            let mut cursor = 0;
            for &i in &by_x {
                let tile = tiles[i];
                if y < tile.y || y >= tile.y + tile.height {
                    continue;
                }
                let (_, tail) = std::mem::take(&mut rest).split_at_mut(tile.x - cursor);
                let (segment, tail) = tail.split_at_mut(tile.width);
                regions[i].rows.push(segment);
                rest = tail;
                cursor = tile.x + tile.width;
            }
        }
        regions
    }
}

/// The pixels of one tile, row by row, borrowed exclusively from a [`Surface`].
#[derive(Debug)]
pub struct TileRegion<'a> {
    pub tile: Tile,
    rows: Vec<&'a mut [u32]>,
}

impl<'a> TileRegion<'a> {
    /// Rows of the tile paired with their absolute raster y coordinate.
    pub fn rows_mut(&mut self) -> impl Iterator<Item = (usize, &mut [u32])> {
        let y0 = self.tile.y;
        self.rows.iter_mut().enumerate().map(move |(dy, row)| (y0 + dy, &mut **row))
    }

    pub fn fill(&mut self, color: u32) {
        for row in &mut self.rows {
            row.fill(color);
        }
    }
}

// ===================================================================================
// Double buffering
// ===================================================================================

#[derive(Debug)]
struct Surfaces {
    width: usize,
    height: usize,
    /// Allocated on first use.
    buffers: Option<[Surface; 2]>,
    /// Index of the back surface.
    back: usize,
}

impl Surfaces {
    fn ensure_allocated(&mut self) -> &mut [Surface; 2] {
        let (w, h) = (self.width, self.height);
        let stale = self
            .buffers
            .as_ref()
            .is_some_and(|b| b[0].size() != (w, h));
        if stale {
            self.buffers = None;
        }
        self.buffers
            .get_or_insert_with(|| [Surface::new(w, h), Surface::new(w, h)])
    }
}

/// Two equally sized surfaces guarded by one lock.
#[derive(Debug)]
pub struct FrameBuffer {
    inner: Mutex<Surfaces>,
}

impl FrameBuffer {
    /// Creates the store; surfaces are allocated lazily on first access.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            inner: Mutex::new(Surfaces {
                width,
                height,
                buffers: None,
                back: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Surfaces> {
        // A panic while holding the lock leaves at worst a half-drawn frame.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn size(&self) -> (usize, usize) {
        let inner = self.lock();
        (inner.width, inner.height)
    }

    /// Requests a new surface size; both surfaces are reallocated on next use.
    pub fn resize(&self, width: usize, height: usize) {
        let mut inner = self.lock();
        inner.width = width;
        inner.height = height;
    }

    /// Runs `render` on the back surface and swaps if it returns `Ok`.
    ///
    /// The lock is held for the whole call, so a reader never sees a frame
    /// in progress.
    pub fn render_and_swap<T, E>(
        &self,
        render: impl FnOnce(&mut Surface) -> Result<T, E>,
    ) -> Result<(FrontBuffer<'_>, T), E> {
        let mut inner = self.lock();
        let back = inner.back;
        let out = render(&mut inner.ensure_allocated()[back])?;
        inner.back = 1 - back;
        Ok((FrontBuffer { guard: inner }, out))
    }

    /// Locks and returns the front surface.
    pub fn front(&self) -> FrontBuffer<'_> {
        let mut inner = self.lock();
        inner.ensure_allocated();
        FrontBuffer { guard: inner }
    }
}

/// Locked view of the front surface; holds the frame-buffer lock until dropped.
pub struct FrontBuffer<'a> {
    guard: MutexGuard<'a, Surfaces>,
}

impl Deref for FrontBuffer<'_> {
    type Target = Surface;

    fn deref(&self) -> &Surface {
        let front = 1 - self.guard.back;
        match &self.guard.buffers {
            Some(buffers) => &buffers[front],
            None => unreachable!("front buffer handed out before allocation"),
        }
    }
}
