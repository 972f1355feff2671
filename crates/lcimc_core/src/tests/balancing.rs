//! Tests for water balancing on a three-activity system
//!
//! These tests verify:
//! - Strategy assignment (default, inverse, set_static)
//! - Default and inverse corrections restore the initial ratio every iteration
//! - set_static restores the unperturbed values bit for bit
//! - A vanished denominator is a named error, never a NaN
//! - Activities with nothing to rescale are skipped at plan time
//! - Plans persisted with a job are the ones its workers apply

use ndarray::Array1;
use tempfile::tempdir;

use super::common::{act, activity_key, bio, flow, normal, tech};
use crate::balancing::{
    BalanceCorrector, BalancingPlan, BalancingStrategy, DomainConfig, ScaledKey, plan_domains,
};
use crate::config::RunConfig;
use crate::error::BalanceError;
use crate::generate::generate;
use crate::matrix::{MatrixKind, MatrixSet};
use crate::model::{Dataset, OutputSelection, Uncertainty};
use crate::provider::{MatrixData, MatrixProvider};
use crate::sampling::SampleEngine;
use crate::store::{read_array, read_json};
use crate::worker::ThreadLauncher;

/// Tap water (mixed uncertainty), bottling (uncertain outputs only) and
/// irrigation (a single uncertain exchange)
fn water_dataset() -> Dataset {
    Dataset {
        name: "water_db".into(),
        activities: vec![
            act(
                "tap",
                vec![
                    bio("river", 0.001, normal(0.001)),
                    bio("emission", 0.0002, normal(0.0002)),
                ],
            ),
            act(
                "bottling",
                vec![
                    tech("tap", 0.5, Uncertainty::Undefined),
                    bio("river", 0.0004, Uncertainty::Undefined),
                    bio("emission", 0.0006, normal(0.0006)),
                    bio("evaporation", 0.0002, normal(0.0002)),
                ],
            ),
            act(
                "irrigation",
                vec![
                    bio("river", 0.002, normal(0.002)),
                    bio("evaporation", 0.0015, Uncertainty::Undefined),
                ],
            ),
        ],
        flows: vec![
            flow("river", "Water, river", "natural resource"),
            flow("emission", "Water", "water"),
            flow("evaporation", "Water", "air"),
        ],
    }
}

fn water_domain() -> DomainConfig {
    DomainConfig::water(
        vec![ScaledKey {
            key: activity_key("tap"),
            scale: 1.0,
        }],
        vec![],
    )
}

fn plans(dataset: &Dataset, data: &MatrixData) -> Vec<BalancingPlan> {
    plan_domains(&[water_domain()], dataset, data).unwrap()
}

#[test]
fn test_strategy_assignment() {
    let dataset = water_dataset();
    let data = dataset.load_matrices().unwrap();
    let plan = &plans(&dataset, &data)[0];

    let strategy = |code: &str| plan.get(&activity_key(code)).map(|p| p.strategy);
    assert_eq!(strategy("tap"), Some(BalancingStrategy::Default));
    assert_eq!(strategy("bottling"), Some(BalancingStrategy::Inverse));
    assert_eq!(strategy("irrigation"), Some(BalancingStrategy::SetStatic));
    assert_eq!(plan.skipped, 0);

    let order: Vec<_> = plan.activities.iter().map(|p| p.strategy).collect();
    assert_eq!(
        order,
        vec![
            BalancingStrategy::Default,
            BalancingStrategy::Inverse,
            BalancingStrategy::SetStatic
        ]
    );
}

#[test]
fn test_initial_ratios_from_unperturbed_values() {
    let dataset = water_dataset();
    let data = dataset.load_matrices().unwrap();
    let plan = &plans(&dataset, &data)[0];

    // tap: 1 kg river in, 0.2 kg emitted plus 1 kg of product out
    let tap = plan.get(&activity_key("tap")).unwrap();
    assert!((tap.ratio - 1.0 / 1.2).abs() < 1e-12);
    assert_eq!(tap.to_balance.len(), 1);
    assert_eq!(tap.fixed.len(), 2);

    // bottling: 0.5 kg tap water plus 0.4 kg river in, 0.8 kg out
    let bottling = plan.get(&activity_key("bottling")).unwrap();
    assert!((bottling.ratio - 0.8 / 0.9).abs() < 1e-12);
    assert_eq!(bottling.to_balance.len(), 2);
    assert!(bottling.static_terms.is_empty());
}

#[test]
fn test_default_and_inverse_hold_every_iteration() {
    let dataset = water_dataset();
    let data = dataset.load_matrices().unwrap();
    let corrector = BalanceCorrector::new(plans(&dataset, &data));
    let mut engine = SampleEngine::new(&data, 7).unwrap();
    let mut matrices = data.matrices.clone();

    for _ in 0..200 {
        engine.rebuild(&mut matrices);
        let sampled_emission = tap_emission_bits(&matrices);
        corrector.apply(&mut matrices).unwrap();

        for plan in &corrector.plans()[0].activities {
            if plan.strategy == BalancingStrategy::SetStatic {
                continue;
            }
            let fixed = plan.fixed_total(&matrices);
            let rescaled = plan.rescaled_total(&matrices);
            assert!(
                (rescaled - plan.ratio * fixed).abs() <= 1e-9 * rescaled.abs().max(1.0),
                "{} ({}): {rescaled} != {} * {fixed}",
                plan.activity,
                plan.strategy,
                plan.ratio
            );
        }
        // tap is default: its outputs are never touched
        assert_eq!(tap_emission_bits(&matrices), sampled_emission);
    }
}

#[test]
fn test_inverse_keeps_static_inputs() {
    let dataset = water_dataset();
    let data = dataset.load_matrices().unwrap();
    let corrector = BalanceCorrector::new(plans(&dataset, &data));
    let mut engine = SampleEngine::new(&data, 11).unwrap();
    let mut matrices = data.matrices.clone();

    let bottling = corrector.plans()[0]
        .get(&activity_key("bottling"))
        .unwrap()
        .clone();
    for _ in 0..50 {
        engine.rebuild(&mut matrices);
        corrector.apply(&mut matrices).unwrap();
        // 0.9 kg in is fixed, so 0.8 kg must leave
        let out: f64 = bottling.rescaled_total(&matrices);
        assert!((out - 0.8).abs() < 1e-9, "{out}");
    }
}

#[test]
fn test_set_static_restores_original_bits() {
    let dataset = water_dataset();
    let data = dataset.load_matrices().unwrap();
    let corrector = BalanceCorrector::new(plans(&dataset, &data));
    let mut engine = SampleEngine::new(&data, 3).unwrap();
    let mut matrices = data.matrices.clone();

    let irrigation = corrector.plans()[0]
        .get(&activity_key("irrigation"))
        .unwrap()
        .clone();
    assert_eq!(irrigation.restore.len(), 2);
    for _ in 0..50 {
        engine.rebuild(&mut matrices);
        corrector.apply(&mut matrices).unwrap();
        for r in &irrigation.restore {
            let corrected = matrices.value(r.matrix, r.position);
            let original = data.matrices.value(r.matrix, r.position);
            assert_eq!(corrected.to_bits(), original.to_bits());
        }
    }
}

#[test]
fn test_zero_denominator_is_named_error() {
    let dataset = water_dataset();
    let data = dataset.load_matrices().unwrap();
    let corrector = BalanceCorrector::new(plans(&dataset, &data));
    let mut matrices = data.matrices.clone();

    let tap = corrector.plans()[0].get(&activity_key("tap")).unwrap();
    for term in &tap.to_balance {
        matrices.matrix_mut(term.matrix).data[term.position] = 0.0;
    }
    let err = corrector.apply(&mut matrices).unwrap_err();
    let BalanceError::ZeroDenominator {
        domain,
        activity,
        denominator,
        ..
    } = err;
    assert_eq!(domain, "water");
    assert_eq!(activity, activity_key("tap"));
    assert_eq!(denominator, 0.0);
    assert!(matrices.biosphere.data.iter().all(|v| v.is_finite()));
}

#[test]
fn test_zero_initial_fixed_side_is_skipped() {
    // Inputs only carry uncertainty and the output side sums to zero
    let dataset = Dataset {
        name: "water_db".into(),
        activities: vec![act(
            "well",
            vec![
                bio("river", 0.001, normal(0.001)),
                bio("lake", 0.001, normal(0.001)),
                bio("emission", 0.0, Uncertainty::Undefined),
                bio("evaporation", 0.0, Uncertainty::Undefined),
            ],
        )],
        flows: vec![
            flow("river", "Water, river", "natural resource"),
            flow("lake", "Water, lake", "natural resource"),
            flow("emission", "Water", "water"),
            flow("evaporation", "Water", "air"),
        ],
    };
    let data = dataset.load_matrices().unwrap();
    let plan = &plans(&dataset, &data)[0];
    assert!(plan.activities.is_empty());
    assert_eq!(plan.count(BalancingStrategy::Skip), 1);
}

#[test]
fn test_nothing_to_rescale_is_skipped() {
    // The only uncertain input has a zero amount, so no input can absorb
    // the correction
    let dataset = Dataset {
        name: "water_db".into(),
        activities: vec![act(
            "well",
            vec![
                bio("river", 0.001, Uncertainty::Undefined),
                bio(
                    "lake",
                    0.0,
                    Uncertainty::Normal {
                        loc: 0.0,
                        scale: 0.0001,
                    },
                ),
                bio("emission", 0.001, normal(0.001)),
            ],
        )],
        flows: vec![
            flow("river", "Water, river", "natural resource"),
            flow("lake", "Water, lake", "natural resource"),
            flow("emission", "Water", "water"),
        ],
    };
    let domain = DomainConfig::water(vec![], vec![]);
    let data = dataset.load_matrices().unwrap();
    let plan = &plan_domains(std::slice::from_ref(&domain), &dataset, &data).unwrap()[0];
    assert!(plan.get(&activity_key("well")).is_none());
    assert_eq!(plan.count(BalancingStrategy::Skip), 1);

    let root = tempdir().unwrap();
    let config = RunConfig {
        seed: Some(2),
        iterations: 3,
        workers: Some(1),
        domains: vec![domain],
        ..RunConfig::default()
    };
    let summary = generate(&dataset, &config, root.path(), &ThreadLauncher).unwrap();
    assert!(summary.is_complete());
}

#[test]
fn test_job_workers_apply_persisted_plans() {
    let root = tempdir().unwrap();
    let config = RunConfig {
        seed: Some(5),
        iterations: 4,
        workers: Some(2),
        outputs: OutputSelection {
            inventory: false,
            supply: false,
            matrices: true,
        },
        domains: vec![water_domain()],
        ..RunConfig::default()
    };
    let summary = generate(&water_dataset(), &config, root.path(), &ThreadLauncher).unwrap();
    assert!(summary.is_complete());
    assert_eq!(summary.manifest.domains, vec!["water".to_string()]);

    let plan: BalancingPlan = read_json(&summary.job.balancing_path("water")).unwrap();
    let data = water_dataset().load_matrices().unwrap();
    let tap = plan.get(&activity_key("tap")).unwrap();

    for iteration in summary.job.iterations().unwrap() {
        let mut matrices = data.matrices.clone();
        for kind in [MatrixKind::Technosphere, MatrixKind::Biosphere] {
            let values: Array1<f32> = read_array(&iteration.matrix_path(kind)).unwrap();
            for (slot, value) in matrices.matrix_mut(kind).data.iter_mut().zip(values.iter()) {
                *slot = *value as f64;
            }
        }
        let fixed = tap.fixed_total(&matrices);
        let rescaled = tap.rescaled_total(&matrices);
        // stored as f32
        assert!((rescaled - tap.ratio * fixed).abs() < 1e-5, "{rescaled} vs {fixed}");
    }
}

/// Water emitted by tap (flow row 1, column 0)
fn tap_emission_bits(matrices: &MatrixSet) -> Option<u64> {
    matrices
        .biosphere
        .position(1, 0)
        .map(|p| matrices.biosphere.data[p].to_bits())
}
