use serde::{Deserialize, Serialize};
use std::fmt;

/// The laboratory panel a request or training sample describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelType {
    Cbc,
    Urinalysis,
    Lipid,
}

/// Ordinal risk bucket predicted by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Moderate,
    High,
}

/// Free-text aliases, checked in order by substring containment.
/// A label containing several aliases resolves to the earliest entry.
const PANEL_ALIASES: [(&str, PanelType); 5] = [
    ("cbc", PanelType::Cbc),
    ("urinalysis", PanelType::Urinalysis),
    ("urine", PanelType::Urinalysis),
    ("lipid", PanelType::Lipid),
    ("lipid profile", PanelType::Lipid),
];

impl PanelType {
    pub const ALL: [PanelType; 3] = [Self::Cbc, Self::Urinalysis, Self::Lipid];

    /// The value written into the `lab_type` feature slot.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Cbc => "cbc",
            Self::Urinalysis => "urinalysis",
            Self::Lipid => "lipid",
        }
    }
}

impl fmt::Display for PanelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl RiskTier {
    pub const ALL: [RiskTier; 3] = [Self::Low, Self::Moderate, Self::High];

    /// Class index used by the classifiers and the persisted label column.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Severity weight blended against the class probabilities to form the
    /// 0-100 risk score.
    pub fn severity_weight(self) -> f64 {
        match self {
            Self::Low => 0.15,
            Self::Moderate => 0.50,
            Self::High => 0.85,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
        }
    }

    /// Capitalised label for reports.
    pub fn title(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::High => "High",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Maps a free-text lab label to a panel. Unrecognised labels resolve to CBC.
pub fn resolve_panel(raw_label: &str) -> PanelType {
    let label = raw_label.trim().to_lowercase();
    PANEL_ALIASES
        .iter()
        .find(|(alias, _)| label.contains(alias))
        .map_or(PanelType::Cbc, |&(_, panel)| panel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_documented_labels() {
        assert_eq!(resolve_panel("Lipid Profile"), PanelType::Lipid);
        assert_eq!(resolve_panel("urine test"), PanelType::Urinalysis);
        assert_eq!(resolve_panel("  URINALYSIS "), PanelType::Urinalysis);
        assert_eq!(resolve_panel("CBC with differential"), PanelType::Cbc);
        assert_eq!(resolve_panel("unknown"), PanelType::Cbc);
        assert_eq!(resolve_panel(""), PanelType::Cbc);
    }

    #[test]
    fn earliest_alias_wins_when_several_match() {
        assert_eq!(resolve_panel("lipid and urine"), PanelType::Urinalysis);
        assert_eq!(resolve_panel("urinalysis + cbc"), PanelType::Cbc);
    }

    #[test]
    fn indices_follow_declaration_order() {
        assert_eq!(PanelType::Cbc.index(), 0);
        assert_eq!(PanelType::Urinalysis.index(), 1);
        assert_eq!(PanelType::Lipid.index(), 2);
        assert_eq!(RiskTier::from_index(2), Some(RiskTier::High));
        assert_eq!(RiskTier::from_index(3), None);
    }
}
