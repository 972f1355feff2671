//! Mass-conservation rebalancing after sampling
//!
//! Each conservation domain (water, land use, ...) classifies the exchanges
//! of every activity into an "in" and an "out" side. A strategy is assigned
//! once per job from the unperturbed data; every iteration then restores the
//! initial in/out ratio (default, inverse) or the raw values (set_static).

mod correct;
mod domain;
mod triage;

pub use correct::{ActivityPlan, BalanceCorrector, BalancingPlan, Restore, Term};
pub use domain::{ConservationDomain, DomainConfig, FlowRule, ScaledKey, Side};
pub use triage::{BalancingStrategy, DomainEntry, triage};

use crate::error::ConfigurationError;
use crate::model::Dataset;
use crate::provider::MatrixData;

/// Resolve and triage every configured domain against a job's matrices
pub fn plan_domains(
    configs: &[DomainConfig],
    dataset: &Dataset,
    data: &MatrixData,
) -> Result<Vec<BalancingPlan>, ConfigurationError> {
    configs
        .iter()
        .map(|config| {
            let domain = ConservationDomain::resolve(config, dataset, &data.index)?;
            if domain.is_empty() {
                tracing::warn!(domain = %config.name, "no exchanges belong to this domain");
            }
            Ok(BalancingPlan::build(&domain, data))
        })
        .collect()
}
