//! Fixed-timestep loop: simulation advances in 60 Hz steps regardless of the
//! frame time fed in.

use tracing::warn;

/// Fixed simulation timestep: 60 Hz.
pub const FIXED_DT: f64 = 1.0 / 60.0;

/// Longest frame accepted before clamping, to avoid a spiral of death.
pub const MAX_FRAME_TIME: f64 = 0.25;

/// Accumulator state of the loop.
#[derive(Debug, Default)]
pub struct GameLoop {
    accumulator: f64,
    total_sim_time: f64,
    frame_count: u64,
    update_count: u64,
}

impl GameLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one frame of `frame_time` seconds.
    ///
    /// `update_fn(fixed_dt, total_sim_time)` runs zero or more times. Returns
    /// the interpolation alpha in `[0.0, 1.0)` for the render that follows.
    pub fn advance(&mut self, frame_time: f64, mut update_fn: impl FnMut(f64, f64)) -> f64 {
        let mut frame_time = frame_time.max(0.0);
        if frame_time > MAX_FRAME_TIME {
            warn!(
                "Frame time {:.1}ms exceeds maximum, clamping to {:.1}ms",
                frame_time * 1000.0,
                MAX_FRAME_TIME * 1000.0
            );
            frame_time = MAX_FRAME_TIME;
        }

        self.accumulator += frame_time;
        while self.accumulator >= FIXED_DT {
            update_fn(FIXED_DT, self.total_sim_time);
            self.total_sim_time += FIXED_DT;
            self.accumulator -= FIXED_DT;
            self.update_count += 1;
        }

        self.frame_count += 1;
        self.alpha()
    }

    pub fn alpha(&self) -> f64 {
        if self.accumulator > 0.0 {
            self.accumulator / FIXED_DT
        } else {
            0.0
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn total_sim_time(&self) -> f64 {
        self.total_sim_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_step() {
        let mut game_loop = GameLoop::new();
        let mut updates = 0u32;
        let alpha = game_loop.advance(FIXED_DT, |_, _| updates += 1);
        assert_eq!(updates, 1);
        assert!(alpha.abs() < 1e-9);
    }

    #[test]
    fn test_multiple_steps_advance_sim_time() {
        let mut game_loop = GameLoop::new();
        let mut times = Vec::new();
        game_loop.advance(3.0 * FIXED_DT + 1e-9, |_, t| times.push(t));
        assert_eq!(times.len(), 3);
        assert!((times[2] - 2.0 * FIXED_DT).abs() < 1e-12);
        assert!((game_loop.total_sim_time() - 3.0 * FIXED_DT).abs() < 1e-12);
    }

    #[test]
    fn test_partial_frame_yields_alpha() {
        let mut game_loop = GameLoop::new();
        let mut updates = 0u32;
        let alpha = game_loop.advance(0.25 * FIXED_DT, |_, _| updates += 1);
        assert_eq!(updates, 0);
        assert!((alpha - 0.25).abs() < 1e-10);
        assert_eq!(game_loop.frame_count(), 1);
    }

    #[test]
    fn test_long_frame_is_clamped() {
        let mut game_loop = GameLoop::new();
        let mut updates = 0u32;
        game_loop.advance(1.0, |_, _| updates += 1);
        let max_updates = (MAX_FRAME_TIME / FIXED_DT).ceil() as u32;
        assert!(updates > 0 && updates <= max_updates);
    }

    #[test]
    fn test_negative_frame_time_is_ignored() {
        let mut game_loop = GameLoop::new();
        let mut updates = 0u32;
        let alpha = game_loop.advance(-1.0, |_, _| updates += 1);
        assert_eq!(updates, 0);
        assert_eq!(alpha, 0.0);
        assert_eq!(game_loop.update_count(), 0);
    }
}
