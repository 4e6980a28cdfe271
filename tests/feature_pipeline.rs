use labrisk::schema::{CANONICAL_FEATURES, FeatureGroup};
use labrisk::train::synth::{bands, synthesize};
use labrisk::{
    Feature, FeatureSchema, LabRequest, PanelType, RequestError, RiskTier, build_feature_vector,
    resolve_panel, synthesize_training_set,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

#[test]
fn synthesized_columns_line_up_with_request_vectors() {
    let schema = FeatureSchema::canonical();
    let mut rng = StdRng::seed_from_u64(42);
    let set = synthesize(300, &mut rng).unwrap();

    for sample in &set.samples {
        // A request that only names the panel must reproduce every slot the
        // synthesizer left at its default.
        let request = LabRequest::new().with_lab_type(sample.panel.name());
        let built = build_feature_vector(&request, &schema);
        let drawn = bands(sample.panel, sample.tier);
        for (i, feature) in CANONICAL_FEATURES.iter().enumerate() {
            if drawn.iter().any(|b| b.feature == *feature) {
                continue;
            }
            assert_eq!(
                built[i], sample.features[i],
                "{feature} differs for a {} row",
                sample.panel
            );
        }
    }
}

#[test]
fn json_request_fills_every_slot_in_schema_order() {
    let request = LabRequest::from_json_str(
        r#"{"lab_type": "Urinalysis", "ph": "7.0", "blood": "trace", "nitrites": "NEGATIVE",
            "protein": "n/a", "glucose": 110, "ketones": true, "neutrophils": 0.6}"#,
    )
    .unwrap();
    let schema = FeatureSchema::canonical();
    let v = build_feature_vector(&request, &schema);

    assert_eq!(v.len(), 19);
    assert_eq!(v[Feature::LabType.canonical_index()], 1.0);
    assert_eq!(v[Feature::Ph.canonical_index()], 7.0);
    assert_eq!(v[Feature::Blood.canonical_index()], 1.0);
    assert_eq!(v[Feature::Nitrites.canonical_index()], 0.0);
    assert_eq!(v[Feature::Protein.canonical_index()], 0.0);
    assert_eq!(v[Feature::Glucose.canonical_index()], 110.0);
    assert_eq!(v[Feature::Ketones.canonical_index()], 0.0);
    // Unreported groups keep the shared defaults regardless of panel.
    assert_eq!(v[Feature::Hemoglobin.canonical_index()], 14.0);
    assert_eq!(v[Feature::Cholesterol.canonical_index()], 180.0);
}

#[test]
fn persisted_schema_order_is_honoured() {
    let schema = FeatureSchema::from_names(&["hdl", "lab_type", "wbc"]).unwrap();
    let request = LabRequest::new()
        .with_lab_type("lipid")
        .with_value("wbc", "12.5")
        .with_value("hdl", 35.0);
    let v = build_feature_vector(&request, &schema);
    assert_eq!(v.to_vec(), vec![35.0, 2.0, 12.5]);
}

#[test]
fn malformed_bodies_are_rejected() {
    assert!(matches!(
        LabRequest::from_json_str("{}"),
        Err(RequestError::Empty)
    ));
    assert!(matches!(
        LabRequest::from_json_str("[1, 2]"),
        Err(RequestError::NotAnObject(_))
    ));
    assert!(matches!(
        LabRequest::from_json_str("{\"lab_type\": "),
        Err(RequestError::InvalidJson(_))
    ));
}

#[test]
fn non_string_lab_type_falls_back_to_cbc() {
    let request = LabRequest::from_json_str(r#"{"lab_type": 2, "hdl": 30}"#).unwrap();
    assert_eq!(request.panel(), PanelType::Cbc);
    let v = build_feature_vector(&request, &FeatureSchema::canonical());
    assert_eq!(v[0], 0.0);
}

#[test]
fn free_text_labels_resolve_by_alias_order() {
    assert_eq!(resolve_panel("  URINE culture "), PanelType::Urinalysis);
    assert_eq!(resolve_panel("fasting lipid panel"), PanelType::Lipid);
    assert_eq!(resolve_panel("CBC with differential"), PanelType::Cbc);
    assert_eq!(resolve_panel("metabolic"), PanelType::Cbc);
    assert_eq!(resolve_panel(""), PanelType::Cbc);
}

#[test]
fn training_set_is_grouped_by_panel_with_valid_labels() {
    let (x, y) = synthesize_training_set(901, 42).unwrap();
    assert_eq!(x.dim(), (900, 19));
    for (i, panel) in PanelType::ALL.into_iter().enumerate() {
        let block = x.slice(ndarray::s![i * 300..(i + 1) * 300, 0]);
        assert!(block.iter().all(|&v| v == panel.index() as f64));
    }
    assert!(y.iter().all(|&label| RiskTier::from_index(label).is_some()));
}

#[test]
fn groups_partition_the_clinical_slots() {
    let panel_slots: Vec<_> = CANONICAL_FEATURES
        .iter()
        .filter(|f| f.group() == FeatureGroup::Panel)
        .collect();
    assert_eq!(panel_slots, vec![&Feature::LabType]);
}
