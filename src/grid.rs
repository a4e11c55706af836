//! Uniform bucket grid over the simulated domain.
//!
//! The grid never owns sources: buckets hold indices into the caller's source
//! slice and are rebuilt from scratch every frame. All derived constants are
//! fixed at construction.

use log::{debug, info};

use crate::error::GridError;
use crate::source::Source;

/// Fraction of the squared half-diagonal used as the global cutoff radius².
pub const CUTOFF_FRACTION: f32 = 0.10;

/// Bucket grid answering "which sources are within the cutoff of this point" queries.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    width: f32,
    height: f32,
    center_x: f32,
    center_y: f32,

    /// Cells along y.
    rows: usize,
    /// Cells along x.
    columns: usize,
    cell_width: f32,
    cell_height: f32,
    delta_x: i64,
    delta_y: i64,

    cutoff_radius_squared: f32,

    /// Column-major: `buckets[x * rows + y]`.
    buckets: Vec<Vec<u32>>,
    /// Number of sources indexed by the last rebuild, `None` before the first one.
    indexed: Option<usize>,
}

impl SpatialGrid {
    /// Builds an empty grid for a `width` x `height` domain centred on the origin.
    pub fn new(width: f32, height: f32) -> Result<Self, GridError> {
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(GridError::InvalidDomain { width, height });
        }

        let half_w = width / 2.0;
        let half_h = height / 2.0;
        let cutoff_radius_squared = CUTOFF_FRACTION * (half_w * half_w + half_h * half_h);
        let cutoff_radius = cutoff_radius_squared.sqrt();

        let rows = (width / cutoff_radius).ceil().max(1.0) as usize;
        let columns = (height / cutoff_radius).ceil().max(1.0) as usize;

        let cell_width = width / columns as f32;
        let cell_height = height / rows as f32;

        let delta_x = (cutoff_radius / cell_width).ceil() as i64;
        let delta_y = (cutoff_radius / cell_height).ceil() as i64;

        info!(
            "spatial grid {}x{} cells ({} x {} px), window +/-{} x +/-{}",
            columns, rows, cell_width, cell_height, delta_x, delta_y
        );

        Ok(Self {
            width,
            height,
            center_x: half_w,
            center_y: half_h,
            rows,
            columns,
            cell_width,
            cell_height,
            delta_x,
            delta_y,
            cutoff_radius_squared,
            buckets: vec![Vec::with_capacity(60); rows * columns],
            indexed: None,
        })
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn cell_size(&self) -> (f32, f32) {
        (self.cell_width, self.cell_height)
    }

    /// Half-window extents in cells, `(delta_x, delta_y)`.
    pub fn window(&self) -> (usize, usize) {
        (self.delta_x as usize, self.delta_y as usize)
    }

    pub fn cutoff_radius_squared(&self) -> f32 {
        self.cutoff_radius_squared
    }

    /// Whether [`rebuild`](Self::rebuild) has been called at least once.
    pub fn is_built(&self) -> bool {
        self.indexed.is_some()
    }

    /// Signed cell coordinate of a model-space point; may lie outside the grid.
    #[inline]
    fn cell_of(&self, px: f32, py: f32) -> (i64, i64) {
        let cx = ((px + self.center_x) / self.cell_width).floor() as i64;
        let cy = ((py + self.center_y) / self.cell_height).floor() as i64;
        (cx, cy)
    }

    /// Bucket index of a source position, clamped onto the border cells.
    #[inline]
    fn bucket_of(&self, px: f32, py: f32) -> usize {
        let (cx, cy) = self.cell_of(px, py);
        let cx = cx.clamp(0, self.columns as i64 - 1) as usize;
        let cy = cy.clamp(0, self.rows as i64 - 1) as usize;
        cx * self.rows + cy
    }

    /// Clears every bucket and re-inserts all `sources` in slice order.
    pub fn rebuild(&mut self, sources: &[Source]) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        for (i, source) in sources.iter().enumerate() {
            let b = self.bucket_of(source.position.x, source.position.y);
            self.buckets[b].push(i as u32);
        }
        self.indexed = Some(sources.len());
        debug!("grid rebuilt with {} sources", sources.len());
    }

    /// Applies `visitor` to every source in slice order, ignoring locality.
    pub fn visit_all<'s, F>(&self, sources: &'s [Source], mut visitor: F)
    where
        F: FnMut(&'s Source),
    {
        for source in sources {
            visitor(source);
        }
    }

    /// Mutable variant of [`visit_all`](Self::visit_all), used to step motion.
    ///
    /// Positions change under the visitor, so the index must be rebuilt afterwards.
    pub fn visit_all_mut<F>(&self, sources: &mut [Source], mut visitor: F)
    where
        F: FnMut(&mut Source),
    {
        for source in sources.iter_mut() {
            visitor(source);
        }
    }

    /// Applies `visitor` to every source within the cutoff radius of `(px, py)`.
    ///
    /// Only buckets inside the `(2*dx+1) x (2*dy+1)` window around the query
    /// cell are scanned. `sources` must be the slice passed to the last
    /// [`rebuild`](Self::rebuild); an unbuilt grid visits nothing.
    pub fn visit_closest<'s, F>(&self, sources: &'s [Source], px: f32, py: f32, mut visitor: F)
    where
        F: FnMut(&'s Source),
    {
        let Some(indexed) = self.indexed else {
            return;
        };
        debug_assert_eq!(indexed, sources.len(), "grid queried with a different source list");

        let (cx, cy) = self.cell_of(px, py);

        // Far-away queries saturate in `cell_of`; keep the window arithmetic saturating too.
        let x_start = cx.saturating_sub(self.delta_x).max(0);
        let x_end = cx.saturating_add(self.delta_x).min(self.columns as i64 - 1);
        let y_start = cy.saturating_sub(self.delta_y).max(0);
        let y_end = cy.saturating_add(self.delta_y).min(self.rows as i64 - 1);
        if x_start > x_end || y_start > y_end {
            return;
        }

        for x in x_start as usize..=x_end as usize {
            let column = &self.buckets[x * self.rows..(x + 1) * self.rows];
            for bucket in &column[y_start as usize..=y_end as usize] {
                for &i in bucket {
                    let Some(source) = sources.get(i as usize) else {
                        continue;
                    };
                    if source.distance_squared_to(px, py) <= self.cutoff_radius_squared {
                        visitor(source);
                    }
                }
            }
        }
    }

    /// Sum of `radius² / distance²` over every source within the cutoff of `(px, py)`.
    #[inline]
    pub fn density_at(&self, sources: &[Source], px: f32, py: f32) -> f32 {
        let mut sum = 0.0f32;
        self.visit_closest(sources, px, py, |s| sum += s.contribution_at(px, py));
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec2::Vec2;
    use proptest::prelude::*;

    fn brute_force(sources: &[Source], cutoff2: f32, px: f32, py: f32) -> Vec<usize> {
        let mut hits: Vec<usize> = sources
            .iter()
            .enumerate()
            .filter(|(_, s)| s.distance_squared_to(px, py) <= cutoff2)
            .map(|(i, _)| i)
            .collect();
        hits.sort_unstable();
        hits
    }

    fn windowed(grid: &SpatialGrid, sources: &[Source], px: f32, py: f32) -> Vec<usize> {
        let mut hits = Vec::new();
        grid.visit_closest(sources, px, py, |s| {
            if let Some(i) = sources.iter().position(|t| std::ptr::eq(t, s)) {
                hits.push(i);
            }
        });
        hits.sort_unstable();
        hits
    }

    #[test]
    fn derived_constants_for_640x480() {
        let grid = SpatialGrid::new(640.0, 480.0).unwrap();
        assert_eq!(grid.cutoff_radius_squared(), 16_000.0);
        assert_eq!(grid.rows(), 6);
        assert_eq!(grid.columns(), 4);
        assert_eq!(grid.cell_size(), (160.0, 80.0));
        assert_eq!(grid.window(), (1, 2));
    }

    #[test]
    fn rejects_degenerate_domain() {
        assert!(SpatialGrid::new(0.0, 480.0).is_err());
        assert!(SpatialGrid::new(640.0, -1.0).is_err());
        assert!(SpatialGrid::new(f32::NAN, 480.0).is_err());
    }

    #[test]
    fn unbuilt_grid_visits_nothing() {
        let grid = SpatialGrid::new(640.0, 480.0).unwrap();
        let sources = vec![Source::new(Vec2::ZERO, 10.0, Vec2::ZERO)];
        let mut visited = 0;
        grid.visit_closest(&sources, 0.0, 0.0, |_| visited += 1);
        assert_eq!(visited, 0);
        assert!(!grid.is_built());
    }

    #[test]
    fn every_source_lands_in_one_bucket() {
        let mut grid = SpatialGrid::new(640.0, 480.0).unwrap();
        let sources = vec![
            Source::new(Vec2::new(-320.0, -240.0), 5.0, Vec2::ZERO),
            Source::new(Vec2::new(320.0, 240.0), 5.0, Vec2::ZERO),
            Source::new(Vec2::new(0.0, 0.0), 5.0, Vec2::ZERO),
            Source::new(Vec2::new(1000.0, -1000.0), 5.0, Vec2::ZERO),
        ];
        grid.rebuild(&sources);
        let total: usize = grid.buckets.iter().map(Vec::len).sum();
        assert_eq!(total, sources.len());

        grid.rebuild(&sources[..2]);
        let total: usize = grid.buckets.iter().map(Vec::len).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn visit_all_keeps_insertion_order() {
        let grid = SpatialGrid::new(640.0, 480.0).unwrap();
        let sources: Vec<Source> = (0..5)
            .map(|i| Source::new(Vec2::new(i as f32, 0.0), 1.0 + i as f32, Vec2::ZERO))
            .collect();
        let mut radii = Vec::new();
        grid.visit_all(&sources, |s| radii.push(s.radius()));
        assert_eq!(radii, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn far_query_sees_nothing() {
        let mut grid = SpatialGrid::new(640.0, 480.0).unwrap();
        let sources = vec![Source::new(Vec2::ZERO, 10.0, Vec2::ZERO)];
        grid.rebuild(&sources);
        assert_eq!(grid.density_at(&sources, 300.0, 200.0), 0.0);
        assert!(grid.density_at(&sources, 0.0, 0.0).is_infinite());
    }

    #[test]
    fn extreme_queries_see_nothing() {
        let mut grid = SpatialGrid::new(640.0, 480.0).unwrap();
        let sources = vec![Source::new(Vec2::new(310.0, -230.0), 10.0, Vec2::ZERO)];
        grid.rebuild(&sources);
        for (x, y) in [
            (f32::MAX, 0.0),
            (-f32::MAX, 0.0),
            (0.0, f32::MAX),
            (0.0, -f32::MAX),
            (1.0e30, -1.0e30),
            (f32::MAX, f32::MAX),
        ] {
            assert_eq!(grid.density_at(&sources, x, y), 0.0, "query ({x}, {y})");
        }
    }

    #[test]
    fn repeated_queries_are_bit_identical() {
        let mut grid = SpatialGrid::new(640.0, 480.0).unwrap();
        let sources: Vec<Source> = (0..50)
            .map(|i| {
                let t = i as f32 * 0.37;
                let position = Vec2::new(t.sin() * 250.0, t.cos() * 180.0);
                Source::new(position, 5.0 + i as f32 * 0.3, Vec2::ZERO)
            })
            .collect();
        grid.rebuild(&sources);
        let first = grid.density_at(&sources, 12.5, -33.25);
        for _ in 0..10 {
            assert_eq!(grid.density_at(&sources, 12.5, -33.25).to_bits(), first.to_bits());
        }
    }

    fn source_strategy() -> impl Strategy<Value = Source> {
        (-310.0f32..310.0, -230.0f32..230.0, 1.0f32..10.0)
            .prop_map(|(x, y, r)| Source::new(Vec2::new(x, y), r, Vec2::ZERO))
    }

    proptest! {
        #[test]
        fn window_matches_brute_force(
            sources in prop::collection::vec(source_strategy(), 0..80),
            px in -320.0f32..320.0,
            py in -240.0f32..240.0,
        ) {
            let mut grid = SpatialGrid::new(640.0, 480.0).unwrap();
            grid.rebuild(&sources);
            let expected = brute_force(&sources, grid.cutoff_radius_squared(), px, py);
            prop_assert_eq!(windowed(&grid, &sources, px, py), expected);
        }

        #[test]
        fn queries_outside_the_domain_do_not_miss(
            sources in prop::collection::vec(source_strategy(), 0..40),
            px in -600.0f32..600.0,
            py in -500.0f32..500.0,
        ) {
            let mut grid = SpatialGrid::new(640.0, 480.0).unwrap();
            grid.rebuild(&sources);
            let expected = brute_force(&sources, grid.cutoff_radius_squared(), px, py);
            prop_assert_eq!(windowed(&grid, &sources, px, py), expected);
        }
    }
}
