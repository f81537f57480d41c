use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Discrete Gaussian sampler over Z, via rejection sampling with a 6σ
/// tailcut. Error terms for the lattice scheme are drawn from here.
pub struct GaussSampler {
    sigma: f64,
    tailcut: i64,
    rng: ChaCha8Rng,
}

impl GaussSampler {
    pub fn new(sigma: f64) -> GaussSampler {
        GaussSampler {
            sigma,
            tailcut: (sigma * 6.0).ceil() as i64,
            rng: ChaCha8Rng::from_os_rng(),
        }
    }

    /// Deterministic sampler for tests and reproducible benchmarks.
    pub fn seeded(sigma: f64, seed: u64) -> GaussSampler {
        GaussSampler {
            sigma,
            tailcut: (sigma * 6.0).ceil() as i64,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn sample(&mut self) -> i64 {
        let sigma_sq_2 = 2.0 * self.sigma * self.sigma;

        loop {
            let x = self.rng.random_range(-self.tailcut..=self.tailcut);
            let prob = (-((x * x) as f64) / sigma_sq_2).exp();

            if self.rng.random::<f64>() < prob {
                return x;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn samples_respect_the_tailcut() {
        let mut sampler = GaussSampler::seeded(6.0, 42);
        let bound = (6.0f64 * 6.0).ceil() as i64;

        for _ in 0..10_000 {
            assert!(sampler.sample().abs() <= bound);
        }
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let mut a = GaussSampler::seeded(6.0, 1234);
        let mut b = GaussSampler::seeded(6.0, 1234);

        for _ in 0..100 {
            assert_eq!(a.sample(), b.sample());
        }
    }

    #[test]
    fn distribution_is_roughly_centered() {
        let mut sampler = GaussSampler::seeded(6.0, 7);
        let n = 100_000;

        let sum: i64 = (0..n).map(|_| sampler.sample()).sum();
        let mean = sum as f64 / n as f64;
        assert!(mean.abs() < 0.2, "mean {} too far from 0", mean);
    }

    #[test]
    fn variance_tracks_sigma() {
        let sigma = 6.0;
        let mut sampler = GaussSampler::seeded(sigma, 99);
        let n = 100_000;

        let samples: Vec<i64> = (0..n).map(|_| sampler.sample()).collect();
        let mean: f64 = samples.iter().map(|&x| x as f64).sum::<f64>() / n as f64;
        let variance: f64 = samples.iter().map(|&x| (x as f64 - mean).powi(2)).sum::<f64>() / n as f64;

        let relative_error = (variance - sigma * sigma).abs() / (sigma * sigma);
        assert!(relative_error < 0.1, "variance {} too far from {}", variance, sigma * sigma);
    }
}
