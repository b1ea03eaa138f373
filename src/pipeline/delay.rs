//! Simulated latency for pipeline steps.

use std::time::Duration;

use rand::Rng;

/// How long a simulated step takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delay {
    #[default]
    None,
    Fixed(Duration),
    /// Uniformly distributed in `min..=max`.
    Uniform { min: Duration, max: Duration },
}

impl Delay {
    pub const fn millis(min: u64, max: u64) -> Self {
        Delay::Uniform {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    /// Pick a concrete duration.
    pub fn sample(&self) -> Duration {
        match *self {
            Delay::None => Duration::ZERO,
            Delay::Fixed(d) => d,
            Delay::Uniform { min, max } if max > min => rand::thread_rng().gen_range(min..=max),
            Delay::Uniform { min, .. } => min,
        }
    }

    /// Sleep for a sampled duration and return it.
    pub async fn wait(&self) -> Duration {
        let duration = self.sample();
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
        duration
    }
}

/// Per-step delays for a four-step pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LatencyProfile {
    pub validate: Delay,
    pub fetch: Delay,
    pub process: Delay,
    pub persist: Delay,
}

impl LatencyProfile {
    /// Delays used by the email worker.
    pub const fn email() -> Self {
        Self {
            validate: Delay::millis(10, 30),
            fetch: Delay::millis(50, 150),
            process: Delay::millis(30, 80),
            persist: Delay::millis(100, 300),
        }
    }

    /// Delays used by the task worker.
    pub const fn task() -> Self {
        Self {
            validate: Delay::millis(5, 20),
            fetch: Delay::millis(40, 120),
            process: Delay::millis(80, 250),
            persist: Delay::millis(20, 60),
        }
    }

    /// No delays at all.
    pub const fn instant() -> Self {
        Self {
            validate: Delay::None,
            fetch: Delay::None,
            process: Delay::None,
            persist: Delay::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_stays_in_range() {
        let delay = Delay::millis(10, 30);
        for _ in 0..100 {
            let d = delay.sample();
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(30));
        }
    }

    #[test]
    fn test_degenerate_ranges() {
        assert_eq!(Delay::None.sample(), Duration::ZERO);
        assert_eq!(Delay::millis(20, 20).sample(), Duration::from_millis(20));
        assert_eq!(Delay::millis(50, 10).sample(), Duration::from_millis(50));
        assert_eq!(
            Delay::Fixed(Duration::from_millis(7)).sample(),
            Duration::from_millis(7)
        );
    }
}
