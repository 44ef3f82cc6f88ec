use std::{collections::VecDeque, time::Duration};

/// Sliding-window pass timer. Durations are pushed as passes complete; the
/// window keeps roughly the last second of samples.
pub struct FpsCounter {
    samples: VecDeque<Duration>,
    sum: Duration,
    window: Duration,
}

impl FpsCounter {
    pub fn new(window: Duration) -> Self {
        FpsCounter {
            samples: VecDeque::new(),
            sum: Duration::from_secs(0),
            window,
        }
    }

    pub fn add_sample(&mut self, sample: Duration) {
        self.samples.push_back(sample);
        self.sum += sample;
        while self.sum > self.window && self.samples.len() > 1 {
            if let Some(evicted) = self.samples.pop_front() {
                self.sum -= evicted;
            }
        }
    }

    pub fn average(&self) -> Duration {
        match self.samples.len() {
            0 => Duration::from_secs(0),
            count => self.sum / count as u32,
        }
    }

    /// Passes per second over the window; zero before the first sample.
    pub fn fps(&self) -> f32 {
        let average = self.average();
        if average == Duration::from_secs(0) {
            0.0
        } else {
            1.0 / average.as_secs_f32()
        }
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.sum = Duration::from_secs(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_over_window() {
        let mut counter = FpsCounter::new(Duration::from_secs(1));
        counter.add_sample(Duration::from_millis(10));
        counter.add_sample(Duration::from_millis(30));
        assert_eq!(counter.average(), Duration::from_millis(20));
        assert!((counter.fps() - 50.0).abs() < 1.0);
    }

    #[test]
    fn old_samples_fall_out_of_the_window() {
        let mut counter = FpsCounter::new(Duration::from_millis(100));
        counter.add_sample(Duration::from_millis(90));
        counter.add_sample(Duration::from_millis(90));
        // First sample no longer fits the window.
        assert_eq!(counter.average(), Duration::from_millis(90));
        assert_eq!(counter.samples.len(), 1);
    }
}
