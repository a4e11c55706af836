//! The per-frame driver: motion, indexing, evaluation, post-process and swap.
//!
//! A frame is `step(dt)` → `rebuild_index()` → `render_frame()`. The
//! evaluator only ever sees the grid and source slice as they were at the
//! last rebuild, and positions cannot change while tile tasks run because
//! `render_frame` holds the simulation borrowed.

use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::blur::GaussianBlur;
use crate::config::SimulationConfig;
use crate::error::{ConfigError, RenderError};
use crate::evaluator::{FieldEvaluator, FieldSnapshot, Palette, RenderToggles};
use crate::grid::SpatialGrid;
use crate::pool::WorkerPool;
use crate::source::Source;
use crate::surface::{FrameBuffer, FrontBuffer, Surface};
use crate::tiles::TileScheduler;

/// Summary of one rendered frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameReport {
    /// 1-based frame number.
    pub frame: u64,
    pub tiles: usize,
    pub tiles_on_caller: usize,
    pub failed_tiles: usize,
    pub gradient: bool,
    pub blurred: bool,
    pub elapsed: Duration,
}

/// The freshly swapped-in front surface, locked until dropped.
pub struct RenderedFrame<'a> {
    front: FrontBuffer<'a>,
    report: FrameReport,
}

impl RenderedFrame<'_> {
    pub fn report(&self) -> &FrameReport {
        &self.report
    }
}

impl Deref for RenderedFrame<'_> {
    type Target = Surface;

    fn deref(&self) -> &Surface {
        &self.front
    }
}

/// Owns the sources and everything needed to turn them into frames.
pub struct Simulation {
    config: SimulationConfig,
    sources: Vec<Source>,
    grid: SpatialGrid,
    scheduler: TileScheduler,
    evaluator: FieldEvaluator,
    blur: GaussianBlur,
    frames: Arc<FrameBuffer>,
    toggles: Arc<RenderToggles>,
    index_stale: bool,
    frame: u64,
}

impl Simulation {
    /// Builds a simulation with `config.source_count` random sources.
    pub fn new(config: SimulationConfig) -> Result<Self, RenderError> {
        config.validate()?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let (min, max) = (config.bounds_min(), config.bounds_max());
        let sources = (0..config.source_count)
            .map(|_| {
                Source::random(
                    &mut rng,
                    min,
                    max,
                    config.min_radius..config.max_radius,
                    config.min_speed..config.max_speed,
                )
            })
            .collect();
        Self::with_sources(config, sources)
    }

    /// Builds a simulation around a caller-provided source list.
    ///
    /// `config.source_count` and the radius/speed ranges are not used. Every
    /// source must lie fully inside the domain.
    pub fn with_sources(config: SimulationConfig, sources: Vec<Source>) -> Result<Self, RenderError> {
        let checked = SimulationConfig {
            source_count: sources.len().max(1),
            ..config.clone()
        };
        checked.validate()?;

        let (min, max) = (config.bounds_min(), config.bounds_max());
        for (index, source) in sources.iter().enumerate() {
            let (p, r) = (source.position, source.radius());
            let inside = p.x - r >= min.x && p.x + r <= max.x && p.y - r >= min.y && p.y + r <= max.y;
            if !inside {
                return Err(ConfigError::SourceOutOfBounds {
                    index,
                    x: p.x,
                    y: p.y,
                    radius: r,
                }
                .into());
            }
        }

        let grid = SpatialGrid::new(config.domain_width, config.domain_height)?;
        let pool = WorkerPool::new(config.worker_threads, config.queue_capacity)?;
        let evaluator = FieldEvaluator::new(pool, Palette::red_ramp(), config.iso_threshold);
        let blur = GaussianBlur::new(config.blur_radius)?;
        let (w, h) = config.raster_size();
        let toggles = Arc::new(RenderToggles::new(config.gradient, config.blur));

        info!(
            "simulation: {} sources, {}x{} raster, {} tiles requested",
            sources.len(),
            w,
            h,
            config.tile_count
        );

        let mut sim = Self {
            config,
            sources,
            grid,
            scheduler: TileScheduler::new(),
            evaluator,
            blur,
            frames: Arc::new(FrameBuffer::new(w, h)),
            toggles,
            index_stale: true,
            frame: 0,
        };
        sim.rebuild_index();
        Ok(sim)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    /// Toggles shared with the input layer.
    pub fn toggles(&self) -> Arc<RenderToggles> {
        Arc::clone(&self.toggles)
    }

    /// Frame store shared with the display layer.
    pub fn frame_buffer(&self) -> Arc<FrameBuffer> {
        Arc::clone(&self.frames)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame
    }

    /// Advances every source by `dt` seconds unless paused.
    pub fn step(&mut self, dt: f32) {
        if self.toggles.paused() {
            return;
        }
        let (min, max) = (self.config.bounds_min(), self.config.bounds_max());
        self.grid
            .visit_all_mut(&mut self.sources, |source| source.advance(min, max, dt));
        self.index_stale = true;
    }

    /// Re-buckets the sources; required after [`step`](Self::step) and before rendering.
    pub fn rebuild_index(&mut self) {
        self.grid.rebuild(&self.sources);
        self.index_stale = false;
    }

    /// Density of the truncated field at a model-space point.
    pub fn density_at(&self, x: f32, y: f32) -> f32 {
        self.grid.density_at(&self.sources, x, y)
    }

    /// Renders one frame into the back surface, blurs it if enabled, and swaps.
    ///
    /// Returns the new front surface; the frame-buffer lock is held until it
    /// is dropped.
    pub fn render_frame(&mut self) -> Result<RenderedFrame<'_>, RenderError> {
        if self.index_stale {
            return Err(RenderError::StaleIndex);
        }
        let started = Instant::now();
        let (w, h) = self.config.raster_size();
        let tiles = self.scheduler.compute_tiles(w, h, self.config.tile_count)?;

        let field = FieldSnapshot {
            grid: &self.grid,
            sources: &self.sources,
        };
        let evaluator = &self.evaluator;
        let toggles = &*self.toggles;
        let blur = &mut self.blur;

        let (front, (batch, gradient, blurred)) = self.frames.render_and_swap(|back| {
            if back.size() != (w, h) {
                return Err(RenderError::SurfaceSize {
                    expected: (w, h),
                    actual: back.size(),
                });
            }
            let gradient = toggles.gradient();
            let batch = evaluator.render_into(back, &tiles, field, toggles)?;
            let blurred = toggles.blur();
            if blurred {
                blur.apply(back);
            }
            Ok((batch, gradient, blurred))
        })?;

        self.frame += 1;
        let report = FrameReport {
            frame: self.frame,
            tiles: batch.submitted,
            tiles_on_caller: batch.ran_on_caller,
            failed_tiles: batch.failed,
            gradient,
            blurred,
            elapsed: started.elapsed(),
        };
        debug!("frame {} done in {:?}", report.frame, report.elapsed);
        Ok(RenderedFrame { front, report })
    }
}
