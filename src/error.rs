//! Error types for the metaball engine.

use thiserror::Error;

use crate::tiles::Tile;

/// Errors raised when validating a [`crate::SimulationConfig`].
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("domain must be finite and positive, got {width} x {height}")]
    InvalidDomain { width: f32, height: f32 },
    #[error("source_count must be non-zero")]
    NoSources,
    #[error("radius range [{min}, {max}) must be positive and non-empty")]
    InvalidRadius { min: f32, max: f32 },
    #[error("max radius {radius} does not fit inside a {width} x {height} domain")]
    RadiusTooLarge { radius: f32, width: f32, height: f32 },
    #[error("speed range [{min}, {max}) must be non-negative and non-empty")]
    InvalidSpeed { min: f32, max: f32 },
    #[error("worker_threads must be non-zero")]
    NoWorkers,
    #[error("tile_count must be non-zero")]
    NoTiles,
    #[error("queue_capacity must be non-zero")]
    NoQueue,
    #[error("blur_radius must be at least 1")]
    InvalidBlurRadius,
    #[error("source {index} at ({x}, {y}) with radius {radius} is not inside the domain")]
    SourceOutOfBounds { index: usize, x: f32, y: f32, radius: f32 },
}

/// Errors raised when building a [`crate::SpatialGrid`].
#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("grid domain must be finite and positive, got {width} x {height}")]
    InvalidDomain { width: f32, height: f32 },
}

/// Invalid tile geometry. A frame is never started with tiles that fail these checks.
#[derive(Debug, Error, PartialEq)]
pub enum TileError {
    #[error("raster must have non-zero size, got {width} x {height}")]
    EmptyRaster { width: usize, height: usize },
    #[error("tile count must be non-zero")]
    NoTiles,
    #[error("tile {0:?} has zero width or height")]
    EmptyTile(Tile),
    #[error("tile {tile:?} exceeds the {width} x {height} raster")]
    OutOfBounds { tile: Tile, width: usize, height: usize },
    #[error("tiles {first:?} and {second:?} overlap")]
    Overlap { first: Tile, second: Tile },
    #[error("tiles cover {covered} of {expected} pixels")]
    Gap { covered: usize, expected: usize },
}

/// Errors that stop a frame from being rendered.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Tiles(#[from] TileError),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("surface is {actual:?} but the raster is {expected:?}")]
    SurfaceSize {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("sources moved since the last rebuild_index()")]
    StaleIndex,
}
