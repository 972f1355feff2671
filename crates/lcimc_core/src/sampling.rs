//! Correlated resampling of the system matrices
//!
//! One engine owns two RNG streams, one for the technosphere and one for the
//! biosphere parameters. Every call to [`SampleEngine::rebuild`] produces the
//! next (A, B) pair of the stream; all functional units of that iteration are
//! then solved against the same pair.

use rand::distr::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rand_distr::{LogNormal, Normal, Triangular};

use crate::error::SampleError;
use crate::matrix::{MatrixSet, SparseMatrix};
use crate::model::Uncertainty;
use crate::provider::{MatrixData, MatrixParam};

/// Prepared distribution of one parameter
#[derive(Debug, Clone)]
enum Draw {
    Fixed(f64),
    Normal(Normal<f64>),
    LogNormal { dist: LogNormal<f64>, negative: bool },
    Uniform(Uniform<f64>),
    Triangular(Triangular<f64>),
}

impl Draw {
    fn sample(&self, rng: &mut StdRng) -> f64 {
        match self {
            Draw::Fixed(v) => *v,
            Draw::Normal(d) => d.sample(rng),
            Draw::LogNormal { dist, negative } => {
                let v = dist.sample(rng);
                if *negative { -v } else { v }
            }
            Draw::Uniform(d) => d.sample(rng),
            Draw::Triangular(d) => d.sample(rng),
        }
    }
}

#[derive(Debug, Clone)]
struct Sampler {
    position: usize,
    sign: f64,
    draw: Draw,
}

fn invalid(
    distribution: &'static str,
    param: &MatrixParam,
    reason: &'static str,
) -> SampleError {
    SampleError::InvalidDistributionParameters {
        distribution,
        row: param.row,
        col: param.col,
        reason,
    }
}

fn prepare(param: &MatrixParam) -> Result<Sampler, SampleError> {
    let draw = match &param.uncertainty {
        Uncertainty::Undefined | Uncertainty::NoUncertainty => Draw::Fixed(param.amount),
        Uncertainty::Normal { loc, scale } => Normal::new(*loc, *scale)
            .map(Draw::Normal)
            .map_err(|_| invalid("normal", param, "scale must be finite and non-negative"))?,
        Uncertainty::LogNormal {
            loc,
            scale,
            negative,
        } => LogNormal::new(*loc, *scale)
            .map(|dist| Draw::LogNormal {
                dist,
                negative: *negative,
            })
            .map_err(|_| invalid("lognormal", param, "scale must be finite and non-negative"))?,
        Uncertainty::Uniform { minimum, maximum } => {
            if minimum == maximum && minimum.is_finite() {
                Draw::Fixed(*minimum)
            } else {
                Uniform::new(*minimum, *maximum)
                    .map(Draw::Uniform)
                    .map_err(|_| invalid("uniform", param, "minimum must be below maximum"))?
            }
        }
        Uncertainty::Triangular {
            minimum,
            mode,
            maximum,
        } => {
            if minimum == maximum && minimum.is_finite() {
                Draw::Fixed(*minimum)
            } else {
                Triangular::new(*minimum, *maximum, *mode)
                    .map(Draw::Triangular)
                    .map_err(|_| {
                        invalid("triangular", param, "mode must lie within [minimum, maximum]")
                    })?
            }
        }
    };
    Ok(Sampler {
        position: param.position,
        sign: param.sign,
        draw,
    })
}

/// Derive the (technosphere, biosphere) stream seeds of one worker
pub fn stream_seeds(worker_seed: u64) -> (u64, u64) {
    let mut seeder = StdRng::seed_from_u64(worker_seed);
    (seeder.next_u64(), seeder.next_u64())
}

pub struct SampleEngine {
    technosphere: Vec<Sampler>,
    biosphere: Vec<Sampler>,
    tech_rng: StdRng,
    bio_rng: StdRng,
}

impl SampleEngine {
    /// Validate every distribution up front; a malformed parameter is fatal
    pub fn new(data: &MatrixData, seed: u64) -> Result<Self, SampleError> {
        let technosphere = data
            .technosphere_params
            .iter()
            .map(prepare)
            .collect::<Result<Vec<_>, _>>()?;
        let biosphere = data
            .biosphere_params
            .iter()
            .map(prepare)
            .collect::<Result<Vec<_>, _>>()?;
        let (tech_seed, bio_seed) = stream_seeds(seed);
        Ok(Self {
            technosphere,
            biosphere,
            tech_rng: StdRng::seed_from_u64(tech_seed),
            bio_rng: StdRng::seed_from_u64(bio_seed),
        })
    }

    /// Draw the next sample and write it into `matrices` in place
    pub fn rebuild(&mut self, matrices: &mut MatrixSet) {
        fill(
            &mut matrices.technosphere,
            &self.technosphere,
            &mut self.tech_rng,
        );
        fill(&mut matrices.biosphere, &self.biosphere, &mut self.bio_rng);
    }

    pub fn uncertain_count(&self) -> usize {
        self.technosphere
            .iter()
            .chain(&self.biosphere)
            .filter(|s| !matches!(s.draw, Draw::Fixed(_)))
            .count()
    }
}

fn fill(matrix: &mut SparseMatrix, samplers: &[Sampler], rng: &mut StdRng) {
    matrix.data.iter_mut().for_each(|v| *v = 0.0);
    for sampler in samplers {
        matrix.data[sampler.position] += sampler.sign * sampler.draw.sample(rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReferenceIndex;

    fn data_with(params: Vec<MatrixParam>) -> MatrixData {
        let coords: Vec<_> = params.iter().map(|p| (p.row, p.col)).collect();
        let technosphere = SparseMatrix::with_structure(2, 2, coords);
        MatrixData::new(
            ReferenceIndex::default(),
            MatrixSet {
                biosphere: SparseMatrix::with_structure(0, 2, std::iter::empty()),
                technosphere,
            },
            params,
            vec![],
        )
    }

    fn param(position: usize, row: usize, uncertainty: Uncertainty) -> MatrixParam {
        MatrixParam {
            row,
            col: 0,
            position,
            amount: 1.0,
            sign: -1.0,
            uncertainty,
        }
    }

    #[test]
    fn test_same_seed_same_stream() {
        let data = data_with(vec![
            param(0, 0, Uncertainty::Normal { loc: 1.0, scale: 0.1 }),
            param(1, 1, Uncertainty::Uniform { minimum: 0.5, maximum: 1.5 }),
        ]);
        let mut a = SampleEngine::new(&data, 42).unwrap();
        let mut b = SampleEngine::new(&data, 42).unwrap();
        let mut ma = data.matrices.clone();
        let mut mb = data.matrices.clone();
        for _ in 0..5 {
            a.rebuild(&mut ma);
            b.rebuild(&mut mb);
            assert_eq!(ma.technosphere.data, mb.technosphere.data);
        }
    }

    #[test]
    fn test_static_parameters_keep_raw_amount() {
        let data = data_with(vec![param(0, 0, Uncertainty::Undefined)]);
        let mut engine = SampleEngine::new(&data, 7).unwrap();
        let mut m = data.matrices.clone();
        engine.rebuild(&mut m);
        assert_eq!(m.technosphere.data, vec![-1.0]);
        assert_eq!(engine.uncertain_count(), 0);
    }

    #[test]
    fn test_invalid_distribution_is_rejected() {
        let data = data_with(vec![param(
            0,
            0,
            Uncertainty::Triangular {
                minimum: 0.0,
                mode: 5.0,
                maximum: 1.0,
            },
        )]);
        let err = SampleEngine::new(&data, 1).err().unwrap();
        assert!(matches!(
            err,
            SampleError::InvalidDistributionParameters {
                distribution: "triangular",
                ..
            }
        ));
    }

    #[test]
    fn test_lognormal_negative_flag() {
        let data = data_with(vec![param(
            0,
            0,
            Uncertainty::LogNormal {
                loc: 0.0,
                scale: 0.2,
                negative: true,
            },
        )]);
        let mut engine = SampleEngine::new(&data, 3).unwrap();
        let mut m = data.matrices.clone();
        engine.rebuild(&mut m);
        // negative draw times technosphere sign
        assert!(m.technosphere.data[0] > 0.0);
    }
}
