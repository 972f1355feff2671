//! Assigning a balancing strategy to each activity from unperturbed data

use std::fmt;

use serde::{Deserialize, Serialize};

use super::domain::Side;
use crate::matrix::MatrixKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancingStrategy {
    /// Rescale uncertain inputs to keep in/out at its initial ratio
    Default,
    /// Rescale uncertain outputs against a fixed input total
    Inverse,
    /// Single uncertain exchange: restore every domain exchange to its raw value
    SetStatic,
    Skip,
}

impl fmt::Display for BalancingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BalancingStrategy::Default => "default",
            BalancingStrategy::Inverse => "inverse",
            BalancingStrategy::SetStatic => "set_static",
            BalancingStrategy::Skip => "skip",
        };
        f.write_str(name)
    }
}

/// A domain exchange of one activity, as seen in the unperturbed matrices
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEntry {
    pub matrix: MatrixKind,
    pub position: usize,
    pub side: Side,
    /// `physical = factor * matrix value`
    pub factor: f64,
    /// Unperturbed matrix value
    pub raw: f64,
    pub uncertain: bool,
    /// Diagonal of A: the activity's own reference product
    pub reference: bool,
}

impl DomainEntry {
    pub fn physical(&self) -> f64 {
        self.factor * self.raw
    }
}

/// Decide the strategy of one activity.
///
/// Mixed uncertainty on both sides falls through to `Default`.
pub fn triage(entries: &[DomainEntry]) -> BalancingStrategy {
    let (ins, outs): (Vec<&DomainEntry>, Vec<&DomainEntry>) =
        entries.iter().partition(|e| e.side == Side::In);

    if ins.is_empty() || outs.is_empty() || entries.len() == 1 {
        return BalancingStrategy::Skip;
    }
    if !ins.iter().any(|e| e.raw != 0.0) || !outs.iter().any(|e| e.raw != 0.0) {
        return BalancingStrategy::Skip;
    }

    let uncertain_in = ins.iter().filter(|e| e.uncertain).count();
    let uncertain_out = outs.iter().filter(|e| e.uncertain).count();
    match (uncertain_in, uncertain_out) {
        (0, 0) => BalancingStrategy::Skip,
        (i, o) if i + o == 1 => BalancingStrategy::SetStatic,
        (0, _) => BalancingStrategy::Inverse,
        _ => BalancingStrategy::Default,
    }
}

/// Entries whose physical amount points the wrong way for their side
pub fn wrong_sign(entries: &[DomainEntry]) -> impl Iterator<Item = &DomainEntry> {
    entries.iter().filter(|e| e.physical() < 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(side: Side, raw: f64, uncertain: bool) -> DomainEntry {
        DomainEntry {
            matrix: MatrixKind::Biosphere,
            position: 0,
            side,
            factor: 1.0,
            raw,
            uncertain,
            reference: false,
        }
    }

    #[test]
    fn test_skip_cases() {
        assert_eq!(triage(&[]), BalancingStrategy::Skip);
        assert_eq!(triage(&[entry(Side::In, 1.0, true)]), BalancingStrategy::Skip);
        assert_eq!(
            triage(&[entry(Side::In, 1.0, true), entry(Side::In, 2.0, true)]),
            BalancingStrategy::Skip
        );
        assert_eq!(
            triage(&[entry(Side::In, 0.0, true), entry(Side::Out, 2.0, true)]),
            BalancingStrategy::Skip
        );
        assert_eq!(
            triage(&[entry(Side::In, 1.0, false), entry(Side::Out, 2.0, false)]),
            BalancingStrategy::Skip
        );
    }

    #[test]
    fn test_single_uncertain_is_set_static() {
        let entries = [
            entry(Side::In, 1.0, false),
            entry(Side::Out, 2.0, true),
            entry(Side::Out, 2.0, false),
        ];
        assert_eq!(triage(&entries), BalancingStrategy::SetStatic);
    }

    #[test]
    fn test_uncertainty_only_on_outputs_is_inverse() {
        let entries = [
            entry(Side::In, 1.0, false),
            entry(Side::Out, 2.0, true),
            entry(Side::Out, 2.0, true),
        ];
        assert_eq!(triage(&entries), BalancingStrategy::Inverse);
    }

    #[test]
    fn test_inputs_only_and_mixed_are_default() {
        let inputs_only = [
            entry(Side::In, 1.0, true),
            entry(Side::In, 1.0, true),
            entry(Side::Out, 2.0, false),
        ];
        assert_eq!(triage(&inputs_only), BalancingStrategy::Default);
        let mixed = [entry(Side::In, 1.0, true), entry(Side::Out, 2.0, true)];
        assert_eq!(triage(&mixed), BalancingStrategy::Default);
    }
}
