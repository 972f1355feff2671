//! Balancing plans and their application to a sampled matrix pair

use serde::{Deserialize, Serialize};

use super::domain::{ConservationDomain, Side};
use super::triage::{BalancingStrategy, DomainEntry, triage, wrong_sign};
use crate::error::BalanceError;
use crate::matrix::{MatrixKind, MatrixSet};
use crate::model::ActivityKey;
use crate::provider::MatrixData;

/// One matrix position contributing to a side total
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub matrix: MatrixKind,
    pub position: usize,
    pub factor: f64,
}

impl Term {
    fn physical(&self, matrices: &MatrixSet) -> f64 {
        self.factor * matrices.value(self.matrix, self.position)
    }
}

/// An unperturbed value restored by the `set_static` strategy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Restore {
    pub matrix: MatrixKind,
    pub position: usize,
    pub value: f64,
}

/// Correction data of one activity in one domain.
///
/// For `default` the fixed side is "out" and the rescaled side is "in"; for
/// `inverse` it is the other way round. Either way, after correction
/// `rescaled total == ratio * fixed total`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityPlan {
    pub activity: ActivityKey,
    pub strategy: BalancingStrategy,
    #[serde(default)]
    pub ratio: f64,
    #[serde(default)]
    pub fixed: Vec<Term>,
    #[serde(default)]
    pub static_terms: Vec<Term>,
    #[serde(default)]
    pub to_balance: Vec<Term>,
    #[serde(default)]
    pub restore: Vec<Restore>,
}

impl ActivityPlan {
    /// Sum of the fixed side in common units
    pub fn fixed_total(&self, matrices: &MatrixSet) -> f64 {
        self.fixed.iter().map(|t| t.physical(matrices)).sum()
    }

    /// Sum of the rescaled side (static plus to-balance) in common units
    pub fn rescaled_total(&self, matrices: &MatrixSet) -> f64 {
        self.static_terms
            .iter()
            .chain(&self.to_balance)
            .map(|t| t.physical(matrices))
            .sum()
    }
}

/// Strategy assignment and correction data of one domain, fixed per job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancingPlan {
    pub domain: String,
    /// Activities that need correcting, ordered default, inverse, set_static
    pub activities: Vec<ActivityPlan>,
    pub skipped: usize,
}

impl BalancingPlan {
    /// Triage every activity from the unperturbed matrices
    pub fn build(domain: &ConservationDomain, data: &MatrixData) -> Self {
        let ncols = data.index.activities.len();
        let mut columns: Vec<Vec<DomainEntry>> = vec![Vec::new(); ncols];

        for (position, (row, col, raw)) in data.matrices.technosphere.iter().enumerate() {
            if let Some((side, factor)) = domain.classify_technosphere(row, col) {
                columns[col].push(DomainEntry {
                    matrix: MatrixKind::Technosphere,
                    position,
                    side,
                    factor,
                    raw,
                    uncertain: data.technosphere_uncertain(position),
                    reference: row == col,
                });
            }
        }
        for (position, (row, col, raw)) in data.matrices.biosphere.iter().enumerate() {
            if let Some((side, factor)) = domain.classify_biosphere(row) {
                columns[col].push(DomainEntry {
                    matrix: MatrixKind::Biosphere,
                    position,
                    side,
                    factor,
                    raw,
                    uncertain: data.biosphere_uncertain(position),
                    reference: false,
                });
            }
        }

        let mut activities = Vec::new();
        let mut skipped = 0;
        for (col, entries) in columns.iter().enumerate() {
            let Some(activity) = data.index.activities.key(col) else {
                continue;
            };
            for entry in wrong_sign(entries) {
                tracing::warn!(
                    domain = %domain.name,
                    %activity,
                    position = entry.position,
                    matrix = ?entry.matrix,
                    "exchange has the wrong sign for its side"
                );
            }
            match plan_activity(&domain.name, activity, entries) {
                Some(plan) => activities.push(plan),
                None => skipped += 1,
            }
        }
        activities.sort_by_key(|plan| plan.strategy);

        tracing::info!(
            domain = %domain.name,
            default = activities.iter().filter(|p| p.strategy == BalancingStrategy::Default).count(),
            inverse = activities.iter().filter(|p| p.strategy == BalancingStrategy::Inverse).count(),
            set_static = activities.iter().filter(|p| p.strategy == BalancingStrategy::SetStatic).count(),
            skipped,
            "assigned balancing strategies"
        );

        Self {
            domain: domain.name.clone(),
            activities,
            skipped,
        }
    }

    pub fn count(&self, strategy: BalancingStrategy) -> usize {
        match strategy {
            BalancingStrategy::Skip => self.skipped,
            s => self.activities.iter().filter(|p| p.strategy == s).count(),
        }
    }

    pub fn get(&self, activity: &ActivityKey) -> Option<&ActivityPlan> {
        self.activities.iter().find(|p| &p.activity == activity)
    }
}

fn term(entry: &DomainEntry) -> Term {
    Term {
        matrix: entry.matrix,
        position: entry.position,
        factor: entry.factor,
    }
}

fn plan_activity(
    domain: &str,
    activity: &ActivityKey,
    entries: &[DomainEntry],
) -> Option<ActivityPlan> {
    let strategy = triage(entries);
    let (fixed_side, rescaled_side) = match strategy {
        BalancingStrategy::Skip => return None,
        BalancingStrategy::SetStatic => {
            return Some(ActivityPlan {
                activity: activity.clone(),
                strategy,
                ratio: 0.0,
                fixed: vec![],
                static_terms: vec![],
                to_balance: vec![],
                restore: entries
                    .iter()
                    .map(|e| Restore {
                        matrix: e.matrix,
                        position: e.position,
                        value: e.raw,
                    })
                    .collect(),
            });
        }
        BalancingStrategy::Default => (Side::Out, Side::In),
        BalancingStrategy::Inverse => (Side::In, Side::Out),
    };

    let fixed: Vec<&DomainEntry> = entries.iter().filter(|e| e.side == fixed_side).collect();
    let (to_balance, static_terms): (Vec<&DomainEntry>, Vec<&DomainEntry>) = entries
        .iter()
        .filter(|e| e.side == rescaled_side)
        .partition(|e| e.uncertain && e.raw != 0.0 && !e.reference);
    if to_balance.is_empty() {
        tracing::warn!(
            domain,
            %activity,
            %strategy,
            "no non-zero uncertain exchange to rescale, activity left unbalanced"
        );
        return None;
    }

    let fixed_total: f64 = fixed.iter().map(|e| e.physical()).sum();
    let rescaled_total: f64 = to_balance
        .iter()
        .chain(&static_terms)
        .map(|e| e.physical())
        .sum();
    let ratio = rescaled_total / fixed_total;
    if fixed_total == 0.0 || !ratio.is_finite() {
        tracing::warn!(
            domain,
            %activity,
            %strategy,
            "initial ratio undefined, activity left unbalanced"
        );
        return None;
    }

    Some(ActivityPlan {
        activity: activity.clone(),
        strategy,
        ratio,
        fixed: fixed.into_iter().map(term).collect(),
        static_terms: static_terms.into_iter().map(term).collect(),
        to_balance: to_balance.into_iter().map(term).collect(),
        restore: vec![],
    })
}

/// Applies the balancing plans of every configured domain, in order
#[derive(Debug, Clone, Default)]
pub struct BalanceCorrector {
    plans: Vec<BalancingPlan>,
}

impl BalanceCorrector {
    pub fn new(plans: Vec<BalancingPlan>) -> Self {
        Self { plans }
    }

    pub fn plans(&self) -> &[BalancingPlan] {
        &self.plans
    }

    /// Correct one sampled pair in place.
    ///
    /// Only the positions named by the plans are written.
    pub fn apply(&self, matrices: &mut MatrixSet) -> Result<(), BalanceError> {
        for plan in &self.plans {
            for act in &plan.activities {
                match act.strategy {
                    BalancingStrategy::Default | BalancingStrategy::Inverse => {
                        rescale(&plan.domain, act, matrices)?
                    }
                    BalancingStrategy::SetStatic => {
                        for r in &act.restore {
                            matrices.matrix_mut(r.matrix).data[r.position] = r.value;
                        }
                    }
                    BalancingStrategy::Skip => {}
                }
            }
        }
        Ok(())
    }
}

fn rescale(domain: &str, act: &ActivityPlan, matrices: &mut MatrixSet) -> Result<(), BalanceError> {
    let total_fixed = act.fixed_total(matrices);
    let constant: f64 = act.static_terms.iter().map(|t| t.physical(matrices)).sum();
    let variable: f64 = act.to_balance.iter().map(|t| t.physical(matrices)).sum();

    let numerator = act.ratio * total_fixed - constant;
    let scaling = numerator / variable;
    if variable == 0.0 || !scaling.is_finite() {
        return Err(BalanceError::ZeroDenominator {
            domain: domain.to_string(),
            activity: act.activity.clone(),
            numerator,
            denominator: variable,
        });
    }
    for t in &act.to_balance {
        matrices.matrix_mut(t.matrix).data[t.position] *= scaling;
    }
    Ok(())
}
