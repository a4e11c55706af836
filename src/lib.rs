//! Animated metaball field renderer.
//!
//! Moving circular sources are bucketed in a uniform [`SpatialGrid`] every
//! frame, and the truncated `radius² / distance²` density field is shaded
//! into a double-buffered [`FrameBuffer`] by a fixed worker pool, one task
//! per raster [`Tile`].
//!
//! - `vec2`, `source`  - sources and their bounded motion
//! - `grid`            - locality index and density queries
//! - `tiles`           - raster partitioning
//! - `pool`            - worker pool, completion latch
//! - `evaluator`       - per-tile shading, palette, toggles
//! - `surface`, `blur` - pixel surfaces, double buffering, post-process
//! - `simulation`      - the per-frame driver

pub mod blur;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod grid;
pub mod pool;
pub mod simulation;
pub mod source;
pub mod stats;
pub mod surface;
pub mod tiles;
pub mod vec2;

pub use config::SimulationConfig;
pub use error::{ConfigError, GridError, RenderError, TileError};
pub use evaluator::{FieldEvaluator, Palette, RenderToggles};
pub use grid::SpatialGrid;
pub use simulation::{FrameReport, RenderedFrame, Simulation};
pub use source::Source;
pub use stats::FrameTimes;
pub use surface::{FrameBuffer, FrontBuffer, Surface};
pub use tiles::{Tile, TileScheduler};
pub use vec2::Vec2;
