//! Parallel, tile-partitioned evaluation of the density field.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, warn};

use crate::error::RenderError;
use crate::grid::SpatialGrid;
use crate::pool::{BatchReport, WorkerPool};
use crate::source::Source;
use crate::surface::{Surface, TileRegion, WHITE};
use crate::tiles::{Tile, validate_partition};

// ===================================================================================
// Palette
// ===================================================================================

pub const PALETTE_SIZE: usize = 256;

/// 256-entry colour table indexed by density.
#[derive(Clone, Debug, PartialEq)]
pub struct Palette {
    colors: [u32; PALETTE_SIZE],
}

impl Palette {
    /// Black-to-red ramp: entry `i` is `(i, 0, 0)`.
    pub fn red_ramp() -> Self {
        let mut colors = [0u32; PALETTE_SIZE];
        for (i, c) in colors.iter_mut().enumerate() {
            *c = (i as u32) << 16;
        }
        Self { colors }
    }

    #[inline]
    pub fn get(&self, index: u8) -> u32 {
        self.colors[index as usize]
    }

    /// The last entry, used for the iso-surface in threshold mode.
    pub fn terminal(&self) -> u32 {
        self.colors[PALETTE_SIZE - 1]
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::red_ramp()
    }
}

/// Palette index for a density value: `clamp(round((1 - 1/density) * 255), 0, 255)`.
#[inline]
pub fn gradient_index(density: f32) -> u8 {
    // NaN falls through the clamp and casts to 0.
    ((1.0 - 1.0 / density) * 255.0).round().clamp(0.0, 255.0) as u8
}

// ===================================================================================
// Toggles
// ===================================================================================

/// Display toggles flipped by the input thread and read by every tile task.
///
/// Reads are relaxed: a task may see the previous value, so a toggle can take
/// effect one frame late.
#[derive(Debug, Default)]
pub struct RenderToggles {
    gradient: AtomicBool,
    blur: AtomicBool,
    paused: AtomicBool,
}

impl RenderToggles {
    pub fn new(gradient: bool, blur: bool) -> Self {
        Self {
            gradient: AtomicBool::new(gradient),
            blur: AtomicBool::new(blur),
            paused: AtomicBool::new(false),
        }
    }

    pub fn gradient(&self) -> bool {
        self.gradient.load(Ordering::Relaxed)
    }

    pub fn set_gradient(&self, on: bool) {
        self.gradient.store(on, Ordering::Relaxed);
    }

    pub fn toggle_gradient(&self) -> bool {
        !self.gradient.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn blur(&self) -> bool {
        self.blur.load(Ordering::Relaxed)
    }

    pub fn set_blur(&self, on: bool) {
        self.blur.store(on, Ordering::Relaxed);
    }

    pub fn toggle_blur(&self) -> bool {
        !self.blur.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn toggle_paused(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::Relaxed)
    }
}

// ===================================================================================
// Evaluator
// ===================================================================================

/// Read-only inputs shared by every tile task of one frame.
#[derive(Clone, Copy)]
pub struct FieldSnapshot<'a> {
    pub grid: &'a SpatialGrid,
    pub sources: &'a [Source],
}

impl FieldSnapshot<'_> {
    #[inline]
    pub fn density_at(&self, x: f32, y: f32) -> f32 {
        self.grid.density_at(self.sources, x, y)
    }
}

/// Shades the density field into a surface, one pool task per tile.
pub struct FieldEvaluator {
    pool: WorkerPool,
    palette: Palette,
    iso_threshold: f32,
    background: u32,
    /// Tile whose task panics before touching its pixels.
    #[cfg(test)]
    pub(crate) fail_tile: Option<Tile>,
}

impl FieldEvaluator {
    pub fn new(pool: WorkerPool, palette: Palette, iso_threshold: f32) -> Self {
        Self {
            pool,
            palette,
            iso_threshold,
            background: WHITE,
            #[cfg(test)]
            fail_tile: None,
        }
    }

    /// Evaluates every pixel of `surface` and blocks until all tiles are done.
    ///
    /// `tiles` are re-validated against the surface; a bad layout is refused
    /// before any task is submitted. Raster pixels map linearly onto the
    /// grid's domain centred on the origin.
    pub fn render_into(
        &self,
        surface: &mut Surface,
        tiles: &[Tile],
        field: FieldSnapshot<'_>,
        toggles: &RenderToggles,
    ) -> Result<BatchReport, RenderError> {
        let (width, height) = surface.size();
        validate_partition(tiles, width, height)?;

        let started = Instant::now();
        let regions = surface.tile_regions_mut(tiles);
        let shade = TileShader {
            field,
            palette: &self.palette,
            iso_threshold: self.iso_threshold,
            background: self.background,
            raster: (width as f32, height as f32),
            domain: (field.grid.width(), field.grid.height()),
            #[cfg(test)]
            fail_tile: self.fail_tile,
        };

        let report = self.pool.run_batch(regions.into_iter().map(|mut region| {
            let shade = &shade;
            let tile = region.tile;
            (tile, move || shade.run(&mut region, toggles.gradient()))
        }));

        if report.failed > 0 {
            warn!("{} of {} tiles failed this frame", report.failed, report.submitted);
        }
        debug!(
            "rendered {} tiles ({} on caller) in {:.2} ms",
            report.submitted,
            report.ran_on_caller,
            started.elapsed().as_secs_f64() * 1000.0
        );
        Ok(report)
    }
}

struct TileShader<'a> {
    field: FieldSnapshot<'a>,
    palette: &'a Palette,
    iso_threshold: f32,
    background: u32,
    raster: (f32, f32),
    domain: (f32, f32),
    #[cfg(test)]
    fail_tile: Option<Tile>,
}

impl TileShader<'_> {
    fn run(&self, region: &mut TileRegion<'_>, gradient: bool) {
        #[cfg(test)]
        if self.fail_tile == Some(region.tile) {
            panic!("shading failed for {:?}", region.tile);
        }

        region.fill(self.background);

        let (w, h) = self.raster;
        let (domain_w, domain_h) = self.domain;
        let x0 = region.tile.x;
        let terminal = self.palette.terminal();

        for (y, row) in region.rows_mut() {
            let model_y = (y as f32 / h - 0.5) * domain_h;
            for (dx, pixel) in row.iter_mut().enumerate() {
                let model_x = ((x0 + dx) as f32 / w - 0.5) * domain_w;
                let density = self.field.density_at(model_x, model_y);
                if gradient {
                    *pixel = self.palette.get(gradient_index(density));
                } else if density > self.iso_threshold {
                    *pixel = terminal;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::TileScheduler;
    use crate::vec2::Vec2;

    fn evaluator() -> FieldEvaluator {
        FieldEvaluator::new(WorkerPool::new(2, 16).unwrap(), Palette::default(), 1.0)
    }

    #[test]
    fn gradient_index_clamps() {
        assert_eq!(gradient_index(0.0), 0);
        assert_eq!(gradient_index(0.5), 0);
        assert_eq!(gradient_index(1.0), 0);
        assert_eq!(gradient_index(2.0), 128);
        assert_eq!(gradient_index(f32::INFINITY), 255);
        assert_eq!(gradient_index(f32::NAN), 0);
    }

    #[test]
    fn red_ramp_palette() {
        let palette = Palette::red_ramp();
        assert_eq!(palette.get(0), 0);
        assert_eq!(palette.get(1), 0x0001_0000);
        assert_eq!(palette.terminal(), 0x00FF_0000);
    }

    #[test]
    fn toggles_flip() {
        let toggles = RenderToggles::new(false, true);
        assert!(toggles.toggle_gradient());
        assert!(toggles.gradient());
        assert!(!toggles.toggle_blur());
        assert!(!toggles.blur());
        assert!(toggles.toggle_paused());
        assert!(toggles.paused());
    }

    #[test]
    fn threshold_mode_paints_the_iso_surface_only() {
        let mut grid = SpatialGrid::new(64.0, 48.0).unwrap();
        let sources = vec![Source::new(Vec2::ZERO, 6.0, Vec2::ZERO)];
        grid.rebuild(&sources);

        let mut surface = Surface::filled(64, 48, 0x0012_3456);
        let tiles = TileScheduler::new().compute_tiles(64, 48, 4).unwrap();
        let toggles = RenderToggles::new(false, false);
        let report = evaluator()
            .render_into(&mut surface, &tiles, FieldSnapshot { grid: &grid, sources: &sources }, &toggles)
            .unwrap();
        assert_eq!(report.failed, 0);

        // Pixel (32, 24) maps onto the source centre.
        assert_eq!(surface.get(32, 24), 0x00FF_0000);
        assert_eq!(surface.get(35, 24), 0x00FF_0000);
        assert_eq!(surface.get(0, 0), WHITE);
        assert_eq!(surface.get(32, 24 + 10), WHITE);
    }

    #[test]
    fn gradient_mode_paints_every_pixel_from_the_palette() {
        let mut grid = SpatialGrid::new(64.0, 48.0).unwrap();
        let sources = vec![Source::new(Vec2::ZERO, 6.0, Vec2::ZERO)];
        grid.rebuild(&sources);

        let mut surface = Surface::new(64, 48);
        let tiles = TileScheduler::new().compute_tiles(64, 48, 9).unwrap();
        let toggles = RenderToggles::new(true, false);
        evaluator()
            .render_into(&mut surface, &tiles, FieldSnapshot { grid: &grid, sources: &sources }, &toggles)
            .unwrap();

        assert!(surface.pixels().iter().all(|&p| p & 0x0000_FFFF == 0));
        assert_eq!(surface.get(32, 24), 0x00FF_0000);
        // density (6/12)^2 = 0.25 < 1 maps to index 0
        assert_eq!(surface.get(44, 24), 0);
    }

    #[test]
    fn refuses_tiles_that_do_not_fit() {
        let grid = SpatialGrid::new(64.0, 48.0).unwrap();
        let mut surface = Surface::new(64, 48);
        let tiles = TileScheduler::new().compute_tiles(32, 48, 4).unwrap();
        let toggles = RenderToggles::default();
        let result = evaluator().render_into(
            &mut surface,
            &tiles,
            FieldSnapshot { grid: &grid, sources: &[] },
            &toggles,
        );
        assert!(matches!(result, Err(RenderError::Tiles(_))));
    }
}
