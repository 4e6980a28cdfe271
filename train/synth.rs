//! # Conditional Data Synthesizer
//!
//! Draws labeled training rows from fixed uniform bands keyed by panel and
//! risk tier. Every row starts from the shared population-normal defaults
//! ([`Feature::default_value`]) and only the slots belonging to the row's own
//! panel are redrawn, so the other panels' groups sit exactly where the
//! request builder puts unreported values.
//!
//! Draw order per row is fixed: tier, then the band table in listed order,
//! then (high-risk CBC only) the differential counts. A seeded RNG therefore
//! reproduces the table exactly.

use crate::panel::{PanelType, RiskTier};
use crate::schema::{CANONICAL_FEATURES, Feature, FeatureMatrix, FeatureSchema, FeatureVector};
use ndarray::{Array1, Array2};
use rand::distributions::{Distribution, WeightedError, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marginal tier probabilities, in tier order. Independent of the panel.
pub const TIER_WEIGHTS: [f64; 3] = [0.5, 0.3, 0.2];

#[derive(Error, Debug, PartialEq)]
pub enum SynthesisError {
    #[error("Tier weights do not form a distribution: {0}")]
    TierWeights(#[from] WeightedError),
}

/// A uniform sampling range for one feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub feature: Feature,
    pub lo: f64,
    pub hi: f64,
}

const fn band(feature: Feature, lo: f64, hi: f64) -> Band {
    Band { feature, lo, hi }
}

const CBC_HIGH: [Band; 6] = [
    band(Feature::Wbc, 3.5, 20.0),
    band(Feature::Rbc, 2.5, 4.0),
    band(Feature::Hemoglobin, 8.0, 11.0),
    band(Feature::Platelets, 50.0, 150.0),
    band(Feature::Glucose, 126.0, 250.0),
    band(Feature::A1c, 6.5, 12.0),
];

const CBC_MODERATE: [Band; 6] = [
    band(Feature::Wbc, 4.0, 12.0),
    band(Feature::Rbc, 4.0, 5.0),
    band(Feature::Hemoglobin, 11.5, 13.0),
    band(Feature::Platelets, 200.0, 350.0),
    band(Feature::Glucose, 100.0, 125.0),
    band(Feature::A1c, 5.7, 6.4),
];

const CBC_LOW: [Band; 6] = [
    band(Feature::Wbc, 4.5, 11.0),
    band(Feature::Rbc, 4.5, 5.5),
    band(Feature::Hemoglobin, 13.5, 17.5),
    band(Feature::Platelets, 150.0, 400.0),
    band(Feature::Glucose, 70.0, 99.0),
    band(Feature::A1c, 4.0, 5.6),
];

const URINALYSIS_HIGH: [Band; 8] = [
    band(Feature::Ph, 4.5, 8.0),
    band(Feature::SpecificGravity, 1.010, 1.035),
    band(Feature::Protein, 0.3, 4.0),
    band(Feature::Glucose, 0.0, 200.0),
    band(Feature::Ketones, 0.0, 2.0),
    band(Feature::Blood, 15.0, 100.0),
    band(Feature::Nitrites, 0.5, 2.0),
    band(Feature::LeukocyteEsterase, 15.0, 100.0),
];

const URINALYSIS_MODERATE: [Band; 8] = [
    band(Feature::Ph, 5.0, 7.5),
    band(Feature::SpecificGravity, 1.010, 1.030),
    band(Feature::Protein, 0.1, 1.0),
    band(Feature::Glucose, 0.0, 100.0),
    band(Feature::Ketones, 0.0, 1.0),
    band(Feature::Blood, 4.0, 15.0),
    band(Feature::Nitrites, 0.0, 0.5),
    band(Feature::LeukocyteEsterase, 6.0, 15.0),
];

const URINALYSIS_LOW: [Band; 8] = [
    band(Feature::Ph, 4.5, 8.0),
    band(Feature::SpecificGravity, 1.005, 1.025),
    band(Feature::Protein, 0.0, 0.1),
    band(Feature::Glucose, 0.0, 10.0),
    band(Feature::Ketones, 0.0, 0.2),
    band(Feature::Blood, 0.0, 3.0),
    band(Feature::Nitrites, 0.0, 0.1),
    band(Feature::LeukocyteEsterase, 0.0, 5.0),
];

const LIPID_HIGH: [Band; 6] = [
    band(Feature::Cholesterol, 240.0, 320.0),
    band(Feature::Hdl, 20.0, 40.0),
    band(Feature::Ldl, 160.0, 220.0),
    band(Feature::Triglycerides, 200.0, 400.0),
    band(Feature::Vldl, 40.0, 80.0),
    band(Feature::Glucose, 126.0, 250.0),
];

const LIPID_MODERATE: [Band; 6] = [
    band(Feature::Cholesterol, 200.0, 239.0),
    band(Feature::Hdl, 40.0, 50.0),
    band(Feature::Ldl, 130.0, 159.0),
    band(Feature::Triglycerides, 150.0, 199.0),
    band(Feature::Vldl, 30.0, 40.0),
    band(Feature::Glucose, 100.0, 125.0),
];

const LIPID_LOW: [Band; 6] = [
    band(Feature::Cholesterol, 125.0, 199.0),
    band(Feature::Hdl, 50.0, 90.0),
    band(Feature::Ldl, 50.0, 129.0),
    band(Feature::Triglycerides, 50.0, 149.0),
    band(Feature::Vldl, 10.0, 30.0),
    band(Feature::Glucose, 70.0, 99.0),
];

/// The bands redrawn for a row of `panel` at `tier`, in draw order.
pub fn bands(panel: PanelType, tier: RiskTier) -> &'static [Band] {
    match (panel, tier) {
        (PanelType::Cbc, RiskTier::High) => &CBC_HIGH,
        (PanelType::Cbc, RiskTier::Moderate) => &CBC_MODERATE,
        (PanelType::Cbc, RiskTier::Low) => &CBC_LOW,
        (PanelType::Urinalysis, RiskTier::High) => &URINALYSIS_HIGH,
        (PanelType::Urinalysis, RiskTier::Moderate) => &URINALYSIS_MODERATE,
        (PanelType::Urinalysis, RiskTier::Low) => &URINALYSIS_LOW,
        (PanelType::Lipid, RiskTier::High) => &LIPID_HIGH,
        (PanelType::Lipid, RiskTier::Moderate) => &LIPID_MODERATE,
        (PanelType::Lipid, RiskTier::Low) => &LIPID_LOW,
    }
}

/// White-cell differential fractions drawn for high-risk CBC rows. They travel
/// beside the feature vector and are never part of it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifferentialCounts {
    pub neutrophils: f64,
    pub lymphocytes: f64,
    pub monocytes: f64,
    pub eosinophils: f64,
    pub basophils: f64,
}

impl DifferentialCounts {
    fn draw<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            neutrophils: uniform(rng, 0.30, 0.85),
            lymphocytes: uniform(rng, 0.10, 0.50),
            monocytes: uniform(rng, 0.0, 0.15),
            eosinophils: uniform(rng, 0.0, 0.10),
            basophils: uniform(rng, 0.0, 0.03),
        }
    }
}

/// One synthesized row.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    pub panel: PanelType,
    pub tier: RiskTier,
    /// Canonical-order feature values.
    pub features: FeatureVector,
    pub differential: Option<DifferentialCounts>,
}

/// A synthesized table, rows grouped by panel in panel order.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    pub samples: Vec<TrainingSample>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The columns of [`FeatureSchema::canonical`].
    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema::canonical()
    }

    pub fn features(&self) -> FeatureMatrix {
        let mut x = Array2::zeros((self.samples.len(), CANONICAL_FEATURES.len()));
        for (mut row, sample) in x.rows_mut().into_iter().zip(&self.samples) {
            row.assign(&sample.features);
        }
        x
    }

    /// Tier indices, one per row.
    pub fn labels(&self) -> Array1<usize> {
        self.samples.iter().map(|s| s.tier.index()).collect()
    }

    pub fn tier_counts(&self) -> [usize; 3] {
        let mut counts = [0; 3];
        for sample in &self.samples {
            counts[sample.tier.index()] += 1;
        }
        counts
    }
}

fn uniform<R: Rng + ?Sized>(rng: &mut R, lo: f64, hi: f64) -> f64 {
    rng.gen_range(lo..=hi)
}

/// Draws one row of `panel`, picking its tier from `tiers`.
fn draw_sample<R: Rng + ?Sized>(
    panel: PanelType,
    tiers: &WeightedIndex<f64>,
    rng: &mut R,
) -> TrainingSample {
    let tier = RiskTier::ALL[tiers.sample(rng)];
    let mut features: FeatureVector = CANONICAL_FEATURES.iter().map(|f| f.default_value()).collect();
    for b in bands(panel, tier) {
        features[b.feature.canonical_index()] = uniform(rng, b.lo, b.hi);
    }
    let differential = (panel == PanelType::Cbc && tier == RiskTier::High)
        .then(|| DifferentialCounts::draw(rng));
    features[Feature::LabType.canonical_index()] = panel.index() as f64;

    TrainingSample {
        panel,
        tier,
        features,
        differential,
    }
}

/// Synthesizes `n_total / 3` rows per panel, in panel order. The remainder of
/// the division is dropped.
pub fn synthesize<R: Rng + ?Sized>(
    n_total: usize,
    rng: &mut R,
) -> Result<TrainingSet, SynthesisError> {
    let tiers = WeightedIndex::new(TIER_WEIGHTS)?;
    let per_panel = n_total / PanelType::ALL.len();
    let mut samples = Vec::with_capacity(per_panel * PanelType::ALL.len());
    for panel in PanelType::ALL {
        for _ in 0..per_panel {
            samples.push(draw_sample(panel, &tiers, rng));
        }
    }
    let set = TrainingSet { samples };
    log::info!(
        "Synthesized {} samples ({} per panel), tier counts {:?}",
        set.len(),
        per_panel,
        set.tier_counts()
    );
    Ok(set)
}

/// Synthesizes a labeled table from a fixed seed: canonical-order features and
/// tier indices.
pub fn synthesize_training_set(
    n_total: usize,
    seed: u64,
) -> Result<(FeatureMatrix, Array1<usize>), SynthesisError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let set = synthesize(n_total, &mut rng)?;
    Ok((set.features(), set.labels()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FeatureGroup;

    #[test]
    fn splits_rows_evenly_across_panels() {
        let mut rng = StdRng::seed_from_u64(7);
        let set = synthesize(9000, &mut rng).unwrap();
        assert_eq!(set.len(), 9000);
        for (i, panel) in PanelType::ALL.into_iter().enumerate() {
            let block = &set.samples[i * 3000..(i + 1) * 3000];
            assert!(block.iter().all(|s| s.panel == panel));
            assert!(
                block
                    .iter()
                    .all(|s| s.features[0] == panel.index() as f64)
            );
        }
    }

    #[test]
    fn remainder_is_dropped() {
        let (x, y) = synthesize_training_set(10, 1).unwrap();
        assert_eq!(x.dim(), (9, 19));
        assert_eq!(y.len(), 9);
        let (x, _) = synthesize_training_set(2, 1).unwrap();
        assert_eq!(x.nrows(), 0);
    }

    #[test]
    fn same_seed_same_table() {
        let a = synthesize_training_set(300, 42).unwrap();
        let b = synthesize_training_set(300, 42).unwrap();
        assert_eq!(a, b);
        let c = synthesize_training_set(300, 43).unwrap();
        assert_ne!(a.0, c.0);
    }

    #[test]
    fn drawn_values_stay_in_band_and_others_keep_defaults() {
        let mut rng = StdRng::seed_from_u64(11);
        let set = synthesize(1500, &mut rng).unwrap();
        for sample in &set.samples {
            let drawn = bands(sample.panel, sample.tier);
            for feature in CANONICAL_FEATURES {
                let value = sample.features[feature.canonical_index()];
                if feature == Feature::LabType {
                    continue;
                }
                match drawn.iter().find(|b| b.feature == feature) {
                    Some(b) => assert!(value >= b.lo && value <= b.hi, "{feature} = {value}"),
                    None => assert_eq!(value, feature.default_value(), "{feature}"),
                }
            }
        }
    }

    #[test]
    fn lipid_rows_leave_cbc_and_urinalysis_groups_at_defaults() {
        let mut rng = StdRng::seed_from_u64(3);
        let tiers = WeightedIndex::new(TIER_WEIGHTS).unwrap();
        let sample = draw_sample(PanelType::Lipid, &tiers, &mut rng);
        for feature in CANONICAL_FEATURES {
            if matches!(feature.group(), FeatureGroup::Cbc | FeatureGroup::Urinalysis) {
                assert_eq!(sample.features[feature.canonical_index()], feature.default_value());
            }
        }
        assert_eq!(sample.features[0], 2.0);
    }

    #[test]
    fn differential_counts_only_for_high_risk_cbc() {
        let mut rng = StdRng::seed_from_u64(5);
        let set = synthesize(3000, &mut rng).unwrap();
        let mut seen = 0;
        for sample in &set.samples {
            let expected = sample.panel == PanelType::Cbc && sample.tier == RiskTier::High;
            assert_eq!(sample.differential.is_some(), expected);
            if let Some(d) = sample.differential {
                assert!((0.30..=0.85).contains(&d.neutrophils));
                assert!((0.0..=0.03).contains(&d.basophils));
                seen += 1;
            }
        }
        assert!(seen > 0);
    }

    #[test]
    fn tier_mix_roughly_follows_weights() {
        let mut rng = StdRng::seed_from_u64(99);
        let set = synthesize(30_000, &mut rng).unwrap();
        let counts = set.tier_counts();
        for (count, weight) in counts.iter().zip(TIER_WEIGHTS) {
            let share = *count as f64 / set.len() as f64;
            assert!((share - weight).abs() < 0.02, "share {share} vs {weight}");
        }
    }
}
