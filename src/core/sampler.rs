use crate::types::{PointSet, SamplingWarning};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Result of a sampling pass
#[derive(Debug, Clone)]
pub struct SampleOutcome {
    pub points: PointSet,
    /// Number of rows actually requested after clamping
    pub effective_n: usize,
    /// Set when the requested size exceeded the point set
    pub warning: Option<SamplingWarning>,
}

/// Uniform random downsampling of scatterer/epoch rows, without replacement
pub struct Sampler {
    rng: StdRng,
}

impl Sampler {
    /// Create a sampler; a fixed seed makes the selection reproducible
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Keep at most `max_points` rows.
    ///
    /// `None` keeps everything. A request larger than the point set is clamped
    /// to its size and reported through [`SampleOutcome::warning`]. Sampled rows
    /// keep their original relative order, so a scatterer may appear at some
    /// epochs and not others.
    pub fn sample(&mut self, points: PointSet, max_points: Option<usize>) -> SampleOutcome {
        let total = points.len();

        let requested = match max_points {
            Some(n) => n,
            None => {
                return SampleOutcome {
                    points,
                    effective_n: total,
                    warning: None,
                }
            }
        };

        if requested > total {
            let warning = SamplingWarning {
                requested,
                adjusted: total,
            };
            log::warn!("{}", warning);
            return SampleOutcome {
                points,
                effective_n: total,
                warning: Some(warning),
            };
        }

        if requested == total {
            return SampleOutcome {
                points,
                effective_n: total,
                warning: None,
            };
        }

        let mut indices = rand::seq::index::sample(&mut self.rng, total, requested).into_vec();
        indices.sort_unstable();

        let sampled = indices.iter().map(|&i| points.records[i].clone()).collect();

        log::info!("Sampled {} of {} rows", requested, total);
        SampleOutcome {
            points: PointSet::new(sampled),
            effective_n: requested,
            warning: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScattererEpochRecord;
    use chrono::NaiveDate;

    fn points(n: u32) -> PointSet {
        let date = NaiveDate::from_ymd_opt(2020, 1, 3).unwrap();
        PointSet::new(
            (0..n)
                .map(|i| ScattererEpochRecord {
                    ps_id: i,
                    longitude: 120.0,
                    latitude: 14.0,
                    date,
                    displacement_mm: i as f64,
                    average_mm: 0.0,
                })
                .collect(),
        )
    }

    #[test]
    fn test_sample_smaller_than_dataset() {
        let outcome = Sampler::new(Some(7)).sample(points(100), Some(30));
        assert_eq!(outcome.points.len(), 30);
        assert_eq!(outcome.effective_n, 30);
        assert!(outcome.warning.is_none());

        // without replacement, original order kept
        let ids = outcome.points.ids_in_order();
        assert_eq!(ids.len(), 30);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_sample_clamped_with_warning() {
        let outcome = Sampler::new(Some(7)).sample(points(40), Some(1000));
        assert_eq!(outcome.points.len(), 40);
        assert_eq!(outcome.effective_n, 40);
        assert_eq!(
            outcome.warning,
            Some(SamplingWarning {
                requested: 1000,
                adjusted: 40
            })
        );
    }

    #[test]
    fn test_no_cap_and_empty_input() {
        let outcome = Sampler::new(None).sample(points(12), None);
        assert_eq!(outcome.points.len(), 12);
        assert!(outcome.warning.is_none());

        let empty = Sampler::new(None).sample(PointSet::default(), Some(5));
        assert!(empty.points.is_empty());
        assert_eq!(empty.effective_n, 0);
        assert!(empty.warning.is_some());
    }

    #[test]
    fn test_seed_is_reproducible() {
        let a = Sampler::new(Some(42)).sample(points(500), Some(50));
        let b = Sampler::new(Some(42)).sample(points(500), Some(50));
        assert_eq!(a.points, b.points);
    }
}
