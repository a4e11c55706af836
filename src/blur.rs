//! Separable Gaussian blur applied to a finished frame before it is swapped in.

use rayon::prelude::*;

use crate::error::ConfigError;
use crate::surface::Surface;

/// Two-pass (horizontal then vertical) Gaussian blur over packed RGB pixels.
///
/// Pixels closer than `radius` to the edge along a pass are copied unchanged.
#[derive(Clone, Debug)]
pub struct GaussianBlur {
    radius: usize,
    kernel: Vec<f32>,
    scratch: Option<Surface>,
}

impl GaussianBlur {
    pub fn new(radius: usize) -> Result<Self, ConfigError> {
        if radius < 1 {
            return Err(ConfigError::InvalidBlurRadius);
        }
        Ok(Self {
            radius,
            kernel: gaussian_kernel(radius),
            scratch: None,
        })
    }

    pub fn kernel(&self) -> &[f32] {
        &self.kernel
    }

    pub fn apply(&mut self, surface: &mut Surface) {
        let (w, h) = surface.size();
        if self.scratch.as_ref().map(Surface::size) != Some((w, h)) {
            self.scratch = Some(Surface::new(w, h));
        }
        let Some(scratch) = self.scratch.as_mut() else {
            return;
        };

        horizontal_pass(&self.kernel, self.radius, surface, scratch);
        vertical_pass(&self.kernel, self.radius, scratch, surface);
    }
}

/// Normalized 1D kernel of `2 * radius + 1` taps with `sigma = radius / 3`.
fn gaussian_kernel(radius: usize) -> Vec<f32> {
    let sigma = radius as f32 / 3.0;
    let two_sigma_square = 2.0 * sigma * sigma;
    let sigma_root = (two_sigma_square * std::f32::consts::PI).sqrt();

    let r = radius as i64;
    let mut data: Vec<f32> = (-r..=r)
        .map(|i| (-((i * i) as f32) / two_sigma_square).exp() / sigma_root)
        .collect();
    let total: f32 = data.iter().sum();
    for v in &mut data {
        *v /= total;
    }
    data
}

#[inline]
fn weighted(kernel: &[f32], taps: impl Iterator<Item = u32>) -> u32 {
    let (mut r, mut g, mut b) = (0.0f32, 0.0f32, 0.0f32);
    for (&k, p) in kernel.iter().zip(taps) {
        r += k * ((p >> 16) & 0xFF) as f32;
        g += k * ((p >> 8) & 0xFF) as f32;
        b += k * (p & 0xFF) as f32;
    }
    let channel = |v: f32| v.round().clamp(0.0, 255.0) as u32;
    (channel(r) << 16) | (channel(g) << 8) | channel(b)
}

fn horizontal_pass(kernel: &[f32], radius: usize, src: &Surface, dst: &mut Surface) {
    let w = src.width();
    if w == 0 {
        return;
    }
    dst.pixels_mut()
        .par_chunks_mut(w)
        .zip(src.pixels().par_chunks(w))
        .for_each(|(out, row)| {
            for x in 0..w {
                out[x] = if x < radius || x + radius >= w {
                    row[x]
                } else {
                    weighted(kernel, row[x - radius..=x + radius].iter().copied())
                };
            }
        });
}

fn vertical_pass(kernel: &[f32], radius: usize, src: &Surface, dst: &mut Surface) {
    let (w, h) = src.size();
    if w == 0 {
        return;
    }
    let pixels = src.pixels();
    dst.pixels_mut()
        .par_chunks_mut(w)
        .enumerate()
        .for_each(|(y, out)| {
            if y < radius || y + radius >= h {
                out.copy_from_slice(&pixels[y * w..(y + 1) * w]);
                return;
            }
            for (x, px) in out.iter_mut().enumerate() {
                let column = (y - radius..=y + radius).map(|yy| pixels[yy * w + x]);
                *px = weighted(kernel, column);
            }
        });
}
