use serde::{Deserialize, Serialize};

/// Declared uncertainty of one exchange amount.
///
/// Variants follow the stats-arrays numbering (0 = undefined, 1 = none,
/// 2 = lognormal, 3 = normal, 4 = uniform, 5 = triangular). Lognormal `loc`
/// is the log of the median, `scale` the log-space standard deviation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Uncertainty {
    #[default]
    Undefined,
    NoUncertainty,
    LogNormal {
        loc: f64,
        scale: f64,
        #[serde(default)]
        negative: bool,
    },
    Normal {
        loc: f64,
        scale: f64,
    },
    Uniform {
        minimum: f64,
        maximum: f64,
    },
    Triangular {
        minimum: f64,
        mode: f64,
        maximum: f64,
    },
}

impl Uncertainty {
    /// Numeric kind as used by stats-arrays
    pub fn kind_id(&self) -> u8 {
        match self {
            Uncertainty::Undefined => 0,
            Uncertainty::NoUncertainty => 1,
            Uncertainty::LogNormal { .. } => 2,
            Uncertainty::Normal { .. } => 3,
            Uncertainty::Uniform { .. } => 4,
            Uncertainty::Triangular { .. } => 5,
        }
    }

    /// Static exchanges always sample to their raw amount
    pub fn is_static(&self) -> bool {
        matches!(self, Uncertainty::Undefined | Uncertainty::NoUncertainty)
    }
}
