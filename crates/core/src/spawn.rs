//! Initial particle placement helpers.
//!
//! Positions are produced interleaved (x0, y0, x1, y1, ...) ready for upload
//! into the position buffer.

use nalgebra::Vector2;
use rand::Rng;

/// Lay out `n` particles in a square-ish grid centered on `center` with
/// `spacing` between neighbors.
#[must_use]
pub fn block(n: usize, center: Vector2<f32>, spacing: f32) -> Vec<f32> {
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let cols = (n as f32).sqrt().ceil() as usize;
    let rows = n.div_ceil(cols.max(1));

    #[allow(clippy::cast_precision_loss)]
    let origin = center
        - Vector2::new(
            (cols.saturating_sub(1)) as f32 * spacing * 0.5,
            (rows.saturating_sub(1)) as f32 * spacing * 0.5,
        );

    let mut positions = Vec::with_capacity(n * 2);
    for i in 0..n {
        #[allow(clippy::cast_precision_loss)]
        let (col, row) = ((i % cols) as f32, (i / cols) as f32);
        positions.push(origin.x + col * spacing);
        positions.push(origin.y + row * spacing);
    }
    positions
}

/// Like [`block`], with each position perturbed by up to half a spacing so
/// the initial configuration is not perfectly symmetric.
pub fn jittered_block<R: Rng>(
    n: usize,
    center: Vector2<f32>,
    spacing: f32,
    rng: &mut R,
) -> Vec<f32> {
    let jitter = spacing * 0.5;
    let mut positions = block(n, center, spacing);
    for value in &mut positions {
        *value += rng.random_range(-jitter..=jitter);
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_is_centered() {
        let n = 16;
        let center = Vector2::new(8.0, 4.5);
        let positions = block(n, center, 0.1);
        assert_eq!(positions.len(), n * 2);

        let mean_x: f32 = positions.iter().step_by(2).sum::<f32>() / n as f32;
        let mean_y: f32 = positions.iter().skip(1).step_by(2).sum::<f32>() / n as f32;
        assert!((mean_x - center.x).abs() < 1e-4);
        assert!((mean_y - center.y).abs() < 1e-4);
    }

    #[test]
    fn test_jittered_block_stays_near_grid() {
        let n = 64;
        let center = Vector2::new(2.0, 2.0);
        let spacing = 0.1;
        let mut rng = rand::rng();

        let grid = block(n, center, spacing);
        let jittered = jittered_block(n, center, spacing, &mut rng);
        assert_eq!(jittered.len(), grid.len());
        for (a, b) in grid.iter().zip(&jittered) {
            assert!((a - b).abs() <= spacing * 0.5 + 1e-6);
        }
    }
}
