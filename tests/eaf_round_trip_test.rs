// Round-trip tests for the annotation-document XML codec

use tiergrid::eaf;
use tiergrid::models::{
    AnnotationDocument, CvEntry, CvEntryValue, LexiconRef, MediaDescriptor, TierAttributes,
    DEFAULT_TIER,
};

/// Build a document exercising every entity section of the format.
fn make_rich_document() -> AnnotationDocument {
    let mut doc = AnnotationDocument::new();
    doc.author = "tester".to_string();

    doc.add_license(
        Some("https://creativecommons.org/licenses/by/4.0/"),
        "CC BY 4.0",
    );
    doc.add_property(Some("lastUsedAnnotationId"), "0");
    doc.add_media_descriptor(MediaDescriptor {
        media_url: "file:///session.wav".to_string(),
        mime_type: "audio/x-wav".to_string(),
        time_origin: Some(0),
        relative_media_url: Some("./session.wav".to_string()),
        extracted_from: None,
    });
    doc.add_locale("en", Some("US"), None).unwrap();
    doc.add_language(
        "eng",
        Some("http://cdb.iso.org/lg/CDB-00138502-001"),
        Some("English"),
    )
    .unwrap();
    doc.add_lexicon_ref(LexiconRef {
        id: "lr1".to_string(),
        name: "lexicon".to_string(),
        service_type: "lexicon-service".to_string(),
        url: "http://example.org/lexicon".to_string(),
        lexicon_id: "lex1".to_string(),
        lexicon_name: "words".to_string(),
        datcat_id: None,
        datcat_name: None,
    })
    .unwrap();

    doc.add_controlled_vocabulary("moves", None).unwrap();
    doc.add_cv_description("moves", "eng", "dialogue moves")
        .unwrap();
    doc.add_cv_entry(
        "moves",
        CvEntry {
            id: "cveid0".to_string(),
            values: vec![CvEntryValue {
                value: "greet".to_string(),
                language: "eng".to_string(),
                description: Some("a greeting".to_string()),
            }],
            ext_ref: None,
        },
    )
    .unwrap();

    doc.add_tier(
        "speaker1",
        TierAttributes {
            participant: Some("S1".to_string()),
            locale: Some("en".to_string()),
            language: Some("eng".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    doc.add_aligned_annotation("speaker1", 120, 850, "hello there", None)
        .unwrap();
    doc.add_aligned_annotation("speaker1", 1000, 1900, "how are <you>?", None)
        .unwrap();
    doc.add_aligned_annotation(DEFAULT_TIER, 0, 2000, "turn", None)
        .unwrap();
    doc
}

#[test]
fn test_serialize_then_parse_is_model_equal() {
    let doc = make_rich_document();
    let xml = eaf::serialize(&doc);
    let parsed = eaf::parse(&xml).expect("the emitted document should parse");
    assert_eq!(doc, parsed, "round trip should preserve the full model");
}

#[test]
fn test_pretty_and_compact_parse_identically() {
    let doc = make_rich_document();
    let pretty = eaf::parse(&eaf::serialize_with(&doc, true)).unwrap();
    let compact = eaf::parse(&eaf::serialize_with(&doc, false)).unwrap();
    assert_eq!(pretty, compact);
}

#[test]
fn test_round_trip_survives_json_snapshot() {
    // serde derives cover the whole model; a JSON detour must not lose
    // anything either.
    let doc = make_rich_document();
    let json = serde_json::to_string(&doc).expect("model should serialize to JSON");
    let back: AnnotationDocument = serde_json::from_str(&json).unwrap();
    assert_eq!(doc, back);
}

#[test]
fn test_round_trip_after_tier_removal() {
    let mut doc = make_rich_document();
    doc.add_tier("speaker2", TierAttributes::default()).unwrap();
    doc.remove_tier("speaker1").unwrap();
    doc.clean_time_slots();
    let parsed = eaf::parse(&eaf::serialize(&doc)).unwrap();
    assert_eq!(
        doc, parsed,
        "tier removal must not disturb the ordinals the codec assigns"
    );
}

#[test]
fn test_counters_survive_the_round_trip() {
    let doc = make_rich_document();
    let mut parsed = eaf::parse(&eaf::serialize(&doc)).unwrap();
    let before: Vec<String> = parsed
        .tier("speaker1")
        .unwrap()
        .annotations
        .ids()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let fresh = parsed
        .add_aligned_annotation("speaker1", 2500, 2600, "new", None)
        .unwrap();
    assert!(
        !before.contains(&fresh),
        "a parsed document must not reissue an existing annotation id"
    );
}
