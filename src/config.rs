use crate::error::ConfigError;
use crate::vec2::Vec2;

// ===================================================================================
// Default Constants
// ===================================================================================

pub const DEFAULT_SOURCE_COUNT: usize = 40;
pub const DEFAULT_MIN_RADIUS: f32 = 5.0;
pub const DEFAULT_MAX_RADIUS: f32 = 30.0;
pub const DEFAULT_MIN_SPEED: f32 = 0.1;
pub const DEFAULT_MAX_SPEED: f32 = 50.0;
pub const DEFAULT_DOMAIN_WIDTH: f32 = 800.0;
pub const DEFAULT_DOMAIN_HEIGHT: f32 = 600.0;
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_BLUR_RADIUS: usize = 2;
pub const DEFAULT_ISO_THRESHOLD: f32 = 1.0;

// ===================================================================================
// Simulation Parameters
// ===================================================================================

/// Everything needed to build a [`crate::Simulation`].
///
/// The raster has the same size as the domain, one pixel per model unit.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    pub source_count: usize,
    pub min_radius: f32,
    pub max_radius: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    pub domain_width: f32,
    pub domain_height: f32,
    /// Size of the fixed worker pool.
    pub worker_threads: usize,
    /// Requested number of tiles per frame.
    pub tile_count: usize,
    /// Queued tile tasks allowed before the render thread runs tiles itself.
    pub queue_capacity: usize,
    pub blur_radius: usize,
    /// Density above which a pixel is painted in threshold mode.
    pub iso_threshold: f32,
    pub gradient: bool,
    pub blur: bool,
    /// Fixed seed for the initial sources; random when `None`.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let cpus = num_cpus::get();
        SimulationConfig {
            source_count: DEFAULT_SOURCE_COUNT,
            min_radius: DEFAULT_MIN_RADIUS,
            max_radius: DEFAULT_MAX_RADIUS,
            min_speed: DEFAULT_MIN_SPEED,
            max_speed: DEFAULT_MAX_SPEED,
            domain_width: DEFAULT_DOMAIN_WIDTH,
            domain_height: DEFAULT_DOMAIN_HEIGHT,
            worker_threads: cpus,
            tile_count: cpus,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            blur_radius: DEFAULT_BLUR_RADIUS,
            iso_threshold: DEFAULT_ISO_THRESHOLD,
            gradient: false,
            blur: true,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (w, h) = (self.domain_width, self.domain_height);
        if !(w.is_finite() && h.is_finite() && w >= 1.0 && h >= 1.0) {
            return Err(ConfigError::InvalidDomain { width: w, height: h });
        }
        if self.source_count == 0 {
            return Err(ConfigError::NoSources);
        }
        if !(self.min_radius > 0.0 && self.min_radius < self.max_radius && self.max_radius.is_finite()) {
            return Err(ConfigError::InvalidRadius {
                min: self.min_radius,
                max: self.max_radius,
            });
        }
        if 2.0 * self.max_radius >= w.min(h) {
            return Err(ConfigError::RadiusTooLarge {
                radius: self.max_radius,
                width: w,
                height: h,
            });
        }
        if !(self.min_speed >= 0.0 && self.min_speed < self.max_speed && self.max_speed.is_finite()) {
            return Err(ConfigError::InvalidSpeed {
                min: self.min_speed,
                max: self.max_speed,
            });
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.tile_count == 0 {
            return Err(ConfigError::NoTiles);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::NoQueue);
        }
        if self.blur_radius == 0 {
            return Err(ConfigError::InvalidBlurRadius);
        }
        Ok(())
    }

    /// Raster size in pixels.
    pub fn raster_size(&self) -> (usize, usize) {
        (self.domain_width as usize, self.domain_height as usize)
    }

    /// Lower-left corner of the domain, which is centred on the origin.
    pub fn bounds_min(&self) -> Vec2 {
        Vec2::new(-self.domain_width / 2.0, -self.domain_height / 2.0)
    }

    pub fn bounds_max(&self) -> Vec2 {
        Vec2::new(self.domain_width / 2.0, self.domain_height / 2.0)
    }
}
