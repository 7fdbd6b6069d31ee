//! Fixed-timestep simulation loop.
//!
//! Wall-clock time is accumulated and spent in whole ticks of `1 / tick_rate`
//! seconds, so the world advances at the same rate no matter how irregularly
//! the host thread is scheduled.

use std::time::{Duration, Instant};
use tracing::warn;

/// Maximum frame time clamp. A stall longer than this is accepted as lost
/// time instead of being caught up in one burst of ticks.
pub const MAX_FRAME_TIME: f64 = 0.25;

/// Fixed-timestep loop state.
///
/// Call [`tick`](Self::tick) repeatedly; between calls,
/// [`time_until_next_tick`](Self::time_until_next_tick) says how long the
/// caller may sleep.
pub struct GameLoop {
    fixed_dt: f64,
    previous_time: Instant,
    accumulator: f64,
    total_sim_time: f64,
    update_count: u64,
}

impl GameLoop {
    /// Creates a loop running `tick_rate` ticks per second (at least 1).
    pub fn new(tick_rate: u32) -> Self {
        Self {
            fixed_dt: 1.0 / f64::from(tick_rate.max(1)),
            previous_time: Instant::now(),
            accumulator: 0.0,
            total_sim_time: 0.0,
            update_count: 0,
        }
    }

    /// Measures the time since the previous call and runs the ticks it
    /// covers. `update_fn` receives the fixed tick length.
    ///
    /// Returns the number of ticks run.
    pub fn tick(&mut self, update_fn: impl FnMut(Duration)) -> u32 {
        let now = Instant::now();
        let frame_time = now.duration_since(self.previous_time).as_secs_f64();
        self.previous_time = now;
        self.advance(frame_time, update_fn)
    }

    /// Runs the ticks covered by an explicit `frame_time` in seconds.
    pub fn advance(&mut self, frame_time: f64, mut update_fn: impl FnMut(Duration)) -> u32 {
        let frame_time = if frame_time > MAX_FRAME_TIME {
            warn!(
                "Tick took {:.1}ms, dropping time beyond {:.1}ms",
                frame_time * 1000.0,
                MAX_FRAME_TIME * 1000.0
            );
            MAX_FRAME_TIME
        } else {
            frame_time
        };

        self.accumulator += frame_time;
        let dt = Duration::from_secs_f64(self.fixed_dt);
        let mut ran = 0;
        while self.accumulator >= self.fixed_dt {
            update_fn(dt);
            self.total_sim_time += self.fixed_dt;
            self.accumulator -= self.fixed_dt;
            self.update_count += 1;
            ran += 1;
        }
        ran
    }

    /// Time left before the accumulator covers another tick.
    pub fn time_until_next_tick(&self) -> Duration {
        Duration::from_secs_f64((self.fixed_dt - self.accumulator).max(0.0))
    }

    /// Length of one tick.
    pub fn fixed_dt(&self) -> Duration {
        Duration::from_secs_f64(self.fixed_dt)
    }

    /// Total ticks run.
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Total simulated time in seconds.
    pub fn total_sim_time(&self) -> f64 {
        self.total_sim_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 1.0 / 20.0;

    #[test]
    fn test_single_step() {
        let mut game_loop = GameLoop::new(20);
        let mut updates = 0u32;
        assert_eq!(game_loop.advance(DT, |_| updates += 1), 1);
        assert_eq!(updates, 1);
        assert!(game_loop.accumulator.abs() < 1e-12);
    }

    #[test]
    fn test_multiple_steps_pass_fixed_dt() {
        let mut game_loop = GameLoop::new(20);
        let mut seen = Vec::new();
        game_loop.advance(3.0 * DT + 1e-9, |dt| seen.push(dt));
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|dt| *dt == Duration::from_secs_f64(DT)));
        assert!((game_loop.total_sim_time() - 3.0 * DT).abs() < 1e-9);
    }

    #[test]
    fn test_partial_step_accumulates() {
        let mut game_loop = GameLoop::new(20);
        assert_eq!(game_loop.advance(0.5 * DT, |_| {}), 0);
        assert!((game_loop.accumulator - 0.5 * DT).abs() < 1e-12);
        let wait = game_loop.time_until_next_tick().as_secs_f64();
        assert!((wait - 0.5 * DT).abs() < 1e-6);
        assert_eq!(game_loop.advance(0.5 * DT + 1e-9, |_| {}), 1);
    }

    #[test]
    fn test_max_frame_time_clamp() {
        let mut game_loop = GameLoop::new(20);
        let ran = game_loop.advance(10.0, |_| {});
        let max_updates = (MAX_FRAME_TIME / DT).ceil() as u32;
        assert!(ran <= max_updates, "expected at most {max_updates}, got {ran}");
        assert!(ran > 0);
    }

    #[test]
    fn test_zero_tick_rate_is_clamped() {
        let game_loop = GameLoop::new(0);
        assert_eq!(game_loop.fixed_dt(), Duration::from_secs(1));
    }

    #[test]
    fn test_update_count_matches_sim_time() {
        let mut game_loop = GameLoop::new(20);
        for _ in 0..10 {
            game_loop.advance(DT * 2.0, |_| {});
        }
        let expected = game_loop.update_count() as f64 * DT;
        assert!((game_loop.total_sim_time() - expected).abs() < 1e-10);
    }
}
