//! Partitioning of the raster into near-square tiles, one worker task each.

use std::sync::Arc;

use crate::error::TileError;

/// Axis-aligned pixel rectangle `[x, x + width) x [y, y + height)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Tile {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Tile {
    pub fn area(&self) -> usize {
        self.width * self.height
    }

    fn overlaps(&self, other: &Tile) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

/// Splits `len` pixels into `parts` spans of `len / parts`, the last one taking the remainder.
fn spans(len: usize, parts: usize) -> impl Iterator<Item = (usize, usize)> {
    let parts = parts.clamp(1, len);
    let step = len / parts;
    (0..parts).map(move |i| {
        let start = i * step;
        let size = if i + 1 == parts { len - start } else { step };
        (start, size)
    })
}

/// Computes tile layouts and remembers the last one.
#[derive(Debug, Default)]
pub struct TileScheduler {
    cached: Option<CachedLayout>,
}

#[derive(Debug)]
struct CachedLayout {
    width: usize,
    height: usize,
    tile_count: usize,
    tiles: Arc<[Tile]>,
}

impl TileScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tiles covering a `width` x `height` raster in a `ceil(sqrt(tile_count))`-per-side layout.
    ///
    /// The result is shared and reused until any argument changes. Fewer
    /// tiles per side are produced when the raster is narrower than the
    /// layout, so the actual count may differ from `tile_count`.
    pub fn compute_tiles(
        &mut self,
        width: usize,
        height: usize,
        tile_count: usize,
    ) -> Result<Arc<[Tile]>, TileError> {
        if let Some(cached) = &self.cached {
            if cached.width == width && cached.height == height && cached.tile_count == tile_count {
                return Ok(Arc::clone(&cached.tiles));
            }
        }

        if width == 0 || height == 0 {
            return Err(TileError::EmptyRaster { width, height });
        }
        if tile_count == 0 {
            return Err(TileError::NoTiles);
        }

        let per_side = (tile_count as f64).sqrt().ceil() as usize;
        let mut tiles = Vec::with_capacity(per_side * per_side);
        for (y, h) in spans(height, per_side) {
            for (x, w) in spans(width, per_side) {
                tiles.push(Tile { x, y, width: w, height: h });
            }
        }
        validate_partition(&tiles, width, height)?;

        let tiles: Arc<[Tile]> = tiles.into();
        self.cached = Some(CachedLayout {
            width,
            height,
            tile_count,
            tiles: Arc::clone(&tiles),
        });
        Ok(tiles)
    }
}

/// Checks that `tiles` cover `[0, width) x [0, height)` exactly once.
pub fn validate_partition(tiles: &[Tile], width: usize, height: usize) -> Result<(), TileError> {
    let mut covered = 0;
    for (i, tile) in tiles.iter().enumerate() {
        if tile.width == 0 || tile.height == 0 {
            return Err(TileError::EmptyTile(*tile));
        }
        if tile.x + tile.width > width || tile.y + tile.height > height {
            return Err(TileError::OutOfBounds { tile: *tile, width, height });
        }
        if let Some(other) = tiles[..i].iter().find(|other| other.overlaps(tile)) {
            return Err(TileError::Overlap { first: *other, second: *tile });
        }
        covered += tile.area();
    }
    // In bounds and pairwise disjoint, so equal area means full coverage.
    let expected = width * height;
    if covered != expected {
        return Err(TileError::Gap { covered, expected });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn coverage(tiles: &[Tile], width: usize, height: usize) -> Vec<u8> {
        let mut hits = vec![0u8; width * height];
        for t in tiles {
            for y in t.y..t.y + t.height {
                for x in t.x..t.x + t.width {
                    hits[y * width + x] += 1;
                }
            }
        }
        hits
    }

    #[test]
    fn near_square_layout() {
        let mut scheduler = TileScheduler::new();
        let tiles = scheduler.compute_tiles(640, 480, 8).unwrap();
        // ceil(sqrt(8)) = 3 per side
        assert_eq!(tiles.len(), 9);
        assert_eq!(tiles[0], Tile { x: 0, y: 0, width: 213, height: 160 });
        assert_eq!(tiles[2], Tile { x: 426, y: 0, width: 214, height: 160 });
        assert_eq!(tiles[8], Tile { x: 426, y: 320, width: 214, height: 160 });
    }

    #[test]
    fn cached_until_arguments_change() {
        let mut scheduler = TileScheduler::new();
        let a = scheduler.compute_tiles(800, 600, 4).unwrap();
        let b = scheduler.compute_tiles(800, 600, 4).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = scheduler.compute_tiles(800, 600, 9).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        let d = scheduler.compute_tiles(801, 600, 9).unwrap();
        assert!(!Arc::ptr_eq(&c, &d));
    }

    #[test]
    fn more_tiles_than_pixels() {
        let mut scheduler = TileScheduler::new();
        let tiles = scheduler.compute_tiles(2, 3, 100).unwrap();
        assert_eq!(tiles.len(), 6);
        assert!(tiles.iter().all(|t| t.area() == 1));
    }

    #[test]
    fn refuses_degenerate_rasters() {
        let mut scheduler = TileScheduler::new();
        assert_eq!(
            scheduler.compute_tiles(0, 10, 4),
            Err(TileError::EmptyRaster { width: 0, height: 10 })
        );
        assert_eq!(scheduler.compute_tiles(10, 10, 0), Err(TileError::NoTiles));
    }

    #[test]
    fn validation_catches_bad_layouts() {
        let a = Tile { x: 0, y: 0, width: 6, height: 10 };
        let b = Tile { x: 5, y: 0, width: 5, height: 10 };
        assert!(matches!(validate_partition(&[a, b], 10, 10), Err(TileError::Overlap { .. })));

        let c = Tile { x: 6, y: 0, width: 5, height: 10 };
        assert!(matches!(validate_partition(&[a, c], 10, 10), Err(TileError::OutOfBounds { .. })));

        let d = Tile { x: 6, y: 0, width: 3, height: 10 };
        assert_eq!(
            validate_partition(&[a, d], 10, 10),
            Err(TileError::Gap { covered: 90, expected: 100 })
        );

        let e = Tile { x: 6, y: 0, width: 0, height: 10 };
        assert_eq!(validate_partition(&[e], 10, 10), Err(TileError::EmptyTile(e)));
    }

    proptest! {
        #[test]
        fn tiles_cover_every_pixel_once(
            width in 1usize..200,
            height in 1usize..200,
            tile_count in 1usize..64,
        ) {
            let mut scheduler = TileScheduler::new();
            let tiles = scheduler.compute_tiles(width, height, tile_count).unwrap();
            prop_assert!(coverage(&tiles, width, height).iter().all(|&n| n == 1));
        }
    }
}
