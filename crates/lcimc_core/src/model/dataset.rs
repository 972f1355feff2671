//! Source dataset: activities, their exchanges, and elementary flows
//!
//! This is the ready-made input of a run. Importing and registering databases
//! happens elsewhere; a dataset is plain serde data passed by reference.

use serde::{Deserialize, Serialize};

use super::ids::{ActivityKey, FlowKey};
use super::uncertainty::Uncertainty;

/// One exchange of an activity, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Exchange {
    /// Input from another activity (stored as a negative entry in A)
    Technosphere {
        input: ActivityKey,
        amount: f64,
        #[serde(default)]
        uncertainty: Uncertainty,
    },
    /// Output of the activity's own reference product
    Production {
        input: ActivityKey,
        amount: f64,
        #[serde(default)]
        uncertainty: Uncertainty,
    },
    /// Exchange with the environment
    Biosphere {
        input: FlowKey,
        amount: f64,
        #[serde(default)]
        uncertainty: Uncertainty,
    },
}

impl Exchange {
    pub fn amount(&self) -> f64 {
        match self {
            Exchange::Technosphere { amount, .. }
            | Exchange::Production { amount, .. }
            | Exchange::Biosphere { amount, .. } => *amount,
        }
    }

    pub fn uncertainty(&self) -> &Uncertainty {
        match self {
            Exchange::Technosphere { uncertainty, .. }
            | Exchange::Production { uncertainty, .. }
            | Exchange::Biosphere { uncertainty, .. } => uncertainty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub key: ActivityKey,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub exchanges: Vec<Exchange>,
}

impl Activity {
    pub fn has_production(&self) -> bool {
        self.exchanges
            .iter()
            .any(|exc| matches!(exc, Exchange::Production { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub key: FlowKey,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unit: String,
    /// Compartment path, e.g. `["natural resource", "in water"]`
    #[serde(default)]
    pub categories: Vec<String>,
}

/// A database of activities plus the elementary flows they reference
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub flows: Vec<Flow>,
}

impl Dataset {
    pub fn activity(&self, key: &ActivityKey) -> Option<&Activity> {
        self.activities.iter().find(|act| &act.key == key)
    }

    pub fn flow(&self, key: &FlowKey) -> Option<&Flow> {
        self.flows.iter().find(|flow| &flow.key == key)
    }
}
