use rand::Rng;

use crate::vec2::Vec2;

/// A moving circular influence emitter ("metaball").
///
/// The radius is fixed at construction; `radius_squared` is derived once and
/// used by the density falloff.
#[derive(Clone, Debug, PartialEq)]
pub struct Source {
    pub position: Vec2,
    pub velocity: Vec2,
    radius: f32,
    radius_squared: f32,
}

impl Source {
    pub fn new(position: Vec2, radius: f32, velocity: Vec2) -> Self {
        Self {
            position,
            velocity,
            radius,
            radius_squared: radius * radius,
        }
    }

    /// Creates a source with random radius and velocity, placed fully inside `[min, max]`.
    ///
    /// Velocity components are drawn per axis from `speed` with a random sign.
    pub fn random<R: Rng + ?Sized>(
        rng: &mut R,
        min: Vec2,
        max: Vec2,
        radius: std::ops::Range<f32>,
        speed: std::ops::Range<f32>,
    ) -> Self {
        let r = rng.random_range(radius);
        let x = rng.random_range((min.x + r)..=(max.x - r));
        let y = rng.random_range((min.y + r)..=(max.y - r));

        let mut vx: f32 = rng.random_range(speed.clone());
        let mut vy: f32 = rng.random_range(speed);
        if rng.random_bool(0.5) {
            vx = -vx;
        }
        if rng.random_bool(0.5) {
            vy = -vy;
        }
        Self::new(Vec2::new(x, y), r, Vec2::new(vx, vy))
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    #[inline]
    pub fn radius_squared(&self) -> f32 {
        self.radius_squared
    }

    #[inline]
    pub fn distance_squared_to(&self, x: f32, y: f32) -> f32 {
        self.position.distance_squared_to(x, y)
    }

    /// Inverse-square density contribution at `(x, y)`.
    ///
    /// Infinite when the point coincides with the centre.
    #[inline]
    pub fn contribution_at(&self, x: f32, y: f32) -> f32 {
        self.radius_squared / self.distance_squared_to(x, y)
    }

    /// Integrates one step of motion inside `[min, max]`.
    ///
    /// Each axis is checked on its own: a proposal that would push the
    /// circle past a bound is dropped for that axis (the previous coordinate
    /// is kept) and the velocity component is reflected.
    pub fn advance(&mut self, min: Vec2, max: Vec2, dt: f32) {
        let proposed = self.position + self.velocity * dt;

        if proposed.x - self.radius < min.x || proposed.x + self.radius > max.x {
            self.velocity.x = -self.velocity.x;
        } else {
            self.position.x = proposed.x;
        }

        if proposed.y - self.radius < min.y || proposed.y + self.radius > max.y {
            self.velocity.y = -self.velocity.y;
        } else {
            self.position.y = proposed.y;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const MIN: Vec2 = Vec2::new(-400.0, -300.0);
    const MAX: Vec2 = Vec2::new(400.0, 300.0);

    #[test]
    fn radius_squared_is_derived() {
        let s = Source::new(Vec2::ZERO, 10.0, Vec2::ZERO);
        assert_eq!(s.radius(), 10.0);
        assert_eq!(s.radius_squared(), 100.0);
    }

    #[test]
    fn moves_freely_inside_bounds() {
        let mut s = Source::new(Vec2::ZERO, 10.0, Vec2::new(10.0, -20.0));
        s.advance(MIN, MAX, 0.5);
        assert_eq!(s.position, Vec2::new(5.0, -10.0));
        assert_eq!(s.velocity, Vec2::new(10.0, -20.0));
    }

    #[test]
    fn reflects_only_the_crossing_axis() {
        let mut s = Source::new(Vec2::new(385.0, 0.0), 10.0, Vec2::new(20.0, 4.0));
        s.advance(MIN, MAX, 1.0);
        assert_eq!(s.position, Vec2::new(385.0, 4.0));
        assert_eq!(s.velocity, Vec2::new(-20.0, 4.0));
    }

    #[test]
    fn corner_reflects_both_axes() {
        let mut s = Source::new(Vec2::new(-385.0, -285.0), 10.0, Vec2::new(-20.0, -20.0));
        s.advance(MIN, MAX, 1.0);
        assert_eq!(s.position, Vec2::new(-385.0, -285.0));
        assert_eq!(s.velocity, Vec2::new(20.0, 20.0));
    }

    #[test]
    fn contribution_is_inverse_square() {
        let s = Source::new(Vec2::ZERO, 10.0, Vec2::ZERO);
        assert_eq!(s.contribution_at(10.0, 0.0), 1.0);
        assert_eq!(s.contribution_at(20.0, 0.0), 0.25);
        assert!(s.contribution_at(0.0, 0.0).is_infinite());
    }

    #[test]
    fn random_sources_start_inside_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let s = Source::random(&mut rng, MIN, MAX, 5.0..30.0, 0.1..50.0);
            assert!(s.position.x - s.radius() >= MIN.x);
            assert!(s.position.x + s.radius() <= MAX.x);
            assert!(s.position.y - s.radius() >= MIN.y);
            assert!(s.position.y + s.radius() <= MAX.y);
            assert!(s.velocity.x.abs() >= 0.1 && s.velocity.x.abs() < 50.0);
        }
    }

    proptest! {
        #[test]
        fn advance_never_leaves_bounds(
            fx in 0.0f32..=1.0,
            fy in 0.0f32..=1.0,
            radius in 1.0f32..50.0,
            vx in -700.0f32..700.0,
            vy in -500.0f32..500.0,
            dt in 0.0f32..1.0,
        ) {
            let x = (MIN.x + radius) + fx * (MAX.x - MIN.x - 2.0 * radius);
            let y = (MIN.y + radius) + fy * (MAX.y - MIN.y - 2.0 * radius);
            let mut s = Source::new(Vec2::new(x, y), radius, Vec2::new(vx, vy));
            prop_assume!(s.position.x - radius >= MIN.x && s.position.x + radius <= MAX.x);
            prop_assume!(s.position.y - radius >= MIN.y && s.position.y + radius <= MAX.y);

            s.advance(MIN, MAX, dt);

            prop_assert!(s.position.x - radius >= MIN.x);
            prop_assert!(s.position.x + radius <= MAX.x);
            prop_assert!(s.position.y - radius >= MIN.y);
            prop_assert!(s.position.y + radius <= MAX.y);
        }
    }
}
