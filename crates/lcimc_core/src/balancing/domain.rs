//! Conservation domains: which exchanges carry a conserved quantity, and on which side

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::model::{ActivityKey, Dataset, Flow, FlowKey, ReferenceIndex};

fn one() -> f64 {
    1.0
}

/// Technosphere product or waste with its conversion to the domain's common unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaledKey {
    pub key: ActivityKey,
    #[serde(default = "one")]
    pub scale: f64,
}

/// Selects elementary flows by name and first category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRule {
    pub name_contains: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Match flows whose first category is NOT `category`
    #[serde(default)]
    pub exclude_category: bool,
}

impl FlowRule {
    pub fn matches(&self, flow: &Flow) -> bool {
        if !flow.name.contains(&self.name_contains) {
            return false;
        }
        match &self.category {
            None => true,
            Some(category) => {
                let first = flow.categories.first().map(String::as_str) == Some(category.as_str());
                first != self.exclude_category
            }
        }
    }
}

/// Declarative description of one conserved quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainConfig {
    pub name: String,
    /// Elementary flow units relative to the technosphere basis
    #[serde(default = "one")]
    pub elementary_scale: f64,
    #[serde(default)]
    pub input_flows: Vec<FlowKey>,
    #[serde(default)]
    pub output_flows: Vec<FlowKey>,
    #[serde(default)]
    pub input_rules: Vec<FlowRule>,
    #[serde(default)]
    pub output_rules: Vec<FlowRule>,
    #[serde(default)]
    pub products: Vec<ScaledKey>,
    #[serde(default)]
    pub wastes: Vec<ScaledKey>,
}

impl DomainConfig {
    /// Water: natural-resource water flows in, all other water flows out, m3 to kg
    pub fn water(products: Vec<ScaledKey>, wastes: Vec<ScaledKey>) -> Self {
        Self {
            name: "water".into(),
            elementary_scale: 1000.0,
            input_flows: vec![],
            output_flows: vec![],
            input_rules: vec![FlowRule {
                name_contains: "Water".into(),
                category: Some("natural resource".into()),
                exclude_category: false,
            }],
            output_rules: vec![FlowRule {
                name_contains: "Water".into(),
                category: Some("natural resource".into()),
                exclude_category: true,
            }],
            products,
            wastes,
        }
    }

    /// Land use: area transformed from a state must equal area transformed to one
    pub fn land_use() -> Self {
        Self {
            name: "land_use".into(),
            elementary_scale: 1.0,
            input_flows: vec![],
            output_flows: vec![],
            input_rules: vec![FlowRule {
                name_contains: "Transformation, from".into(),
                category: None,
                exclude_category: false,
            }],
            output_rules: vec![FlowRule {
                name_contains: "Transformation, to".into(),
                category: None,
                exclude_category: false,
            }],
            products: vec![],
            wastes: vec![],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    In,
    Out,
}

/// A domain resolved against one job's reference index
#[derive(Debug, Clone)]
pub struct ConservationDomain {
    pub name: String,
    elementary_scale: f64,
    input_rows: FxHashSet<usize>,
    output_rows: FxHashSet<usize>,
    product_rows: FxHashMap<usize, f64>,
    waste_rows: FxHashMap<usize, f64>,
}

impl ConservationDomain {
    /// Keys absent from the index are not used by the dataset and are ignored
    pub fn resolve(
        config: &DomainConfig,
        dataset: &Dataset,
        index: &ReferenceIndex,
    ) -> Result<Self, ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidDomain {
            domain: config.name.clone(),
            reason,
        };
        if !(config.elementary_scale.is_finite() && config.elementary_scale > 0.0) {
            return Err(invalid("elementary_scale must be positive".into()));
        }

        let flow_rows = |keys: &[FlowKey], rules: &[FlowRule]| -> FxHashSet<usize> {
            let by_key = keys.iter().filter_map(|k| index.flows.get(k));
            let by_rule = dataset
                .flows
                .iter()
                .filter(|flow| rules.iter().any(|rule| rule.matches(flow)))
                .filter_map(|flow| index.flows.get(&flow.key));
            by_key.chain(by_rule).collect()
        };
        let input_rows = flow_rows(&config.input_flows, &config.input_rules);
        let output_rows = flow_rows(&config.output_flows, &config.output_rules);
        if let Some(row) = input_rows.intersection(&output_rows).next() {
            return Err(invalid(format!(
                "flow {} is both an input and an output",
                index.flows.key(*row).map(ToString::to_string).unwrap_or_default()
            )));
        }

        let scaled_rows = |keys: &[ScaledKey]| -> Result<FxHashMap<usize, f64>, ConfigurationError> {
            let mut rows = FxHashMap::default();
            for scaled in keys {
                if !(scaled.scale.is_finite() && scaled.scale > 0.0) {
                    return Err(invalid(format!("scale of {} must be positive", scaled.key)));
                }
                if let Some(row) = index.products.get(&scaled.key) {
                    rows.insert(row, scaled.scale);
                }
            }
            Ok(rows)
        };
        let product_rows = scaled_rows(&config.products)?;
        let waste_rows = scaled_rows(&config.wastes)?;
        if let Some(row) = product_rows.keys().find(|r| waste_rows.contains_key(r)) {
            return Err(invalid(format!(
                "{} is listed as both product and waste",
                index.products.key(*row).map(ToString::to_string).unwrap_or_default()
            )));
        }

        Ok(Self {
            name: config.name.clone(),
            elementary_scale: config.elementary_scale,
            input_rows,
            output_rows,
            product_rows,
            waste_rows,
        })
    }

    /// Side and factor of a technosphere entry; `physical = factor * value`.
    ///
    /// The diagonal holds the activity's own production; everything else in
    /// the column is a technosphere input (stored negative).
    pub fn classify_technosphere(&self, row: usize, col: usize) -> Option<(Side, f64)> {
        let production = row == col;
        if let Some(&scale) = self.product_rows.get(&row) {
            return Some(if production {
                (Side::Out, scale)
            } else {
                (Side::In, -scale)
            });
        }
        if let Some(&scale) = self.waste_rows.get(&row) {
            return Some(if production {
                (Side::In, -scale)
            } else {
                (Side::Out, scale)
            });
        }
        None
    }

    pub fn classify_biosphere(&self, row: usize) -> Option<(Side, f64)> {
        if self.input_rows.contains(&row) {
            Some((Side::In, self.elementary_scale))
        } else if self.output_rows.contains(&row) {
            Some((Side::Out, self.elementary_scale))
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.input_rows.is_empty()
            && self.output_rows.is_empty()
            && self.product_rows.is_empty()
            && self.waste_rows.is_empty()
    }
}
