use serde::{Deserialize, Serialize};

/// One kind of per-iteration output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutputKind {
    Inventory,
    Supply,
    Matrices,
}

impl OutputKind {
    pub const ALL: [OutputKind; 3] = [OutputKind::Inventory, OutputKind::Supply, OutputKind::Matrices];

    /// Folder name inside iteration and result directories
    pub fn dir_name(self) -> &'static str {
        match self {
            OutputKind::Inventory => "Inventory",
            OutputKind::Supply => "Supply",
            OutputKind::Matrices => "Matrices",
        }
    }
}

/// Which output kinds a stage produces or covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutputSelection {
    pub inventory: bool,
    pub supply: bool,
    pub matrices: bool,
}

impl Default for OutputSelection {
    fn default() -> Self {
        Self {
            inventory: true,
            supply: false,
            matrices: false,
        }
    }
}

impl OutputSelection {
    pub fn all() -> Self {
        Self {
            inventory: true,
            supply: true,
            matrices: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.inventory || self.supply || self.matrices)
    }

    pub fn includes(&self, kind: OutputKind) -> bool {
        match kind {
            OutputKind::Inventory => self.inventory,
            OutputKind::Supply => self.supply,
            OutputKind::Matrices => self.matrices,
        }
    }

    pub fn kinds(&self) -> impl Iterator<Item = OutputKind> + use<> {
        let selection = *self;
        OutputKind::ALL
            .into_iter()
            .filter(move |k| selection.includes(*k))
    }

    /// Kinds requested in `other` that this selection does not cover
    pub fn missing_from(&self, other: &OutputSelection) -> Vec<OutputKind> {
        other.kinds().filter(|k| !self.includes(*k)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_kinds() {
        let covered = OutputSelection {
            inventory: true,
            supply: false,
            matrices: true,
        };
        assert_eq!(covered.missing_from(&OutputSelection::all()), vec![OutputKind::Supply]);
        assert!(covered.missing_from(&OutputSelection::default()).is_empty());
    }

    #[test]
    fn test_empty_selection() {
        let none = OutputSelection {
            inventory: false,
            supply: false,
            matrices: false,
        };
        assert!(none.is_empty());
        assert_eq!(none.kinds().count(), 0);
    }
}
