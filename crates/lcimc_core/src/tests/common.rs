//! Small datasets and helpers shared by the scenario tests

use std::path::Path;

use crate::config::RunConfig;
use crate::generate::{JobSummary, generate};
use crate::model::{Activity, ActivityKey, Dataset, Exchange, Flow, FlowKey, Uncertainty};
use crate::validate::{clean, validate_jobs};
use crate::worker::ThreadLauncher;

pub const DB: &str = "test_db";
pub const BIO: &str = "biosphere";

pub fn activity_key(code: &str) -> ActivityKey {
    ActivityKey::new(DB, code)
}

pub fn flow_key(code: &str) -> FlowKey {
    FlowKey::new(BIO, code)
}

pub fn act(code: &str, exchanges: Vec<Exchange>) -> Activity {
    Activity {
        key: activity_key(code),
        name: code.to_string(),
        unit: "kilogram".to_string(),
        exchanges,
    }
}

pub fn tech(code: &str, amount: f64, uncertainty: Uncertainty) -> Exchange {
    Exchange::Technosphere {
        input: activity_key(code),
        amount,
        uncertainty,
    }
}

pub fn bio(code: &str, amount: f64, uncertainty: Uncertainty) -> Exchange {
    Exchange::Biosphere {
        input: flow_key(code),
        amount,
        uncertainty,
    }
}

pub fn flow(code: &str, name: &str, category: &str) -> Flow {
    Flow {
        key: flow_key(code),
        name: name.to_string(),
        unit: "kilogram".to_string(),
        categories: vec![category.to_string()],
    }
}

/// Normal distribution with a 10% standard deviation
pub fn normal(amount: f64) -> Uncertainty {
    Uncertainty::Normal {
        loc: amount,
        scale: amount.abs() * 0.1,
    }
}

/// Electricity, steel and a car made from both, emitting CO2 and methane.
///
/// A is upper triangular with a unit diagonal, so every sample is solvable.
pub fn car_dataset() -> Dataset {
    Dataset {
        name: DB.to_string(),
        activities: vec![
            act("electricity", vec![bio("co2", 0.5, normal(0.5))]),
            act(
                "steel",
                vec![
                    tech(
                        "electricity",
                        2.0,
                        Uncertainty::Uniform {
                            minimum: 1.8,
                            maximum: 2.2,
                        },
                    ),
                    bio(
                        "co2",
                        1.5,
                        Uncertainty::LogNormal {
                            loc: 1.5f64.ln(),
                            scale: 0.1,
                            negative: false,
                        },
                    ),
                ],
            ),
            act(
                "car",
                vec![
                    tech(
                        "steel",
                        1.0,
                        Uncertainty::Triangular {
                            minimum: 0.9,
                            mode: 1.0,
                            maximum: 1.2,
                        },
                    ),
                    tech("electricity", 0.5, normal(0.5)),
                    bio("ch4", 0.01, normal(0.01)),
                ],
            ),
        ],
        flows: vec![
            flow("co2", "Carbon dioxide, fossil", "air"),
            flow("ch4", "Methane, fossil", "air"),
        ],
    }
}

/// The car system without any uncertainty
pub fn static_car_dataset() -> Dataset {
    let mut dataset = car_dataset();
    for activity in &mut dataset.activities {
        for exchange in &mut activity.exchanges {
            match exchange {
                Exchange::Technosphere { uncertainty, .. }
                | Exchange::Production { uncertainty, .. }
                | Exchange::Biosphere { uncertainty, .. } => *uncertainty = Uncertainty::Undefined,
            }
        }
    }
    dataset
}

/// The same system with activities and flows declared in reverse order
pub fn reversed(dataset: &Dataset) -> Dataset {
    let mut reversed = dataset.clone();
    reversed.activities.reverse();
    reversed.flows.reverse();
    reversed
}

/// Generate a job with in-process workers, then validate and clean it
pub fn generate_clean(dataset: &Dataset, config: &RunConfig, root: &Path) -> JobSummary {
    let summary = generate(dataset, config, root, &ThreadLauncher).unwrap();
    assert!(summary.is_complete(), "workers failed: {:?}", summary.failures);
    let jobs_dir = summary.job.root.parent().unwrap().to_path_buf();
    let report = validate_jobs(&jobs_dir, &config.outputs).unwrap();
    assert!(report.is_clean(), "unexpected findings: {:?}", report.findings);
    clean(&report, |_| false).unwrap();
    summary
}
