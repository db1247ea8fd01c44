//! Extraction behaviour on realistic model replies

use ecoops_pipeline::extractor::{
    ActionChecklist, DEFAULT_ACTION_PLAN, DEFAULT_QUESTION, FieldSource, ImpactAssessment,
    clean_question,
};

#[test]
fn clean_json_impact_reply_is_parsed() {
    let raw = r#"{"hazard_type":"wildfire","location":"Oak Street","severity":8,"population_affected":150,"summary":"Brush fire near homes"}"#;
    let extracted = ImpactAssessment::extract(raw);
    let impact = extracted.value;
    assert_eq!(impact.hazard_type, "wildfire");
    assert_eq!(impact.location, "Oak Street");
    assert_eq!(impact.severity, 8);
    assert_eq!(impact.population_affected, 150);
    assert_eq!(extracted.fields.count(FieldSource::Parsed), 5);
}

#[test]
fn out_of_range_severity_is_clamped() {
    let raw = r#"{"hazard_type":"flood","location":"Dock 4","severity":15,"population_affected":20}"#;
    let extracted = ImpactAssessment::extract(raw);
    assert_eq!(extracted.value.severity, 10);
    let field = extracted.fields.get("severity").unwrap();
    assert!(field.clamped);
    assert_eq!(field.source, FieldSource::Parsed);
}

#[test]
fn prose_action_reply_falls_back_to_defaults() {
    let raw = "We should evacuate everyone nearby and call the fire department right away.";
    let extracted = ActionChecklist::extract(raw);
    let expected: Vec<String> = DEFAULT_ACTION_PLAN.iter().map(|s| s.to_string()).collect();
    assert_eq!(extracted.value.action_plan, expected);
    assert_eq!(extracted.value.action_plan.len(), 5);
    assert_eq!(extracted.value.greenpt_score, 75);
    assert_eq!(extracted.fields.source("action_plan"), Some(FieldSource::Defaulted));
    assert_eq!(extracted.fields.source("greenpt_score"), Some(FieldSource::Defaulted));
}

#[test]
fn loose_key_value_text_is_recovered() {
    let raw = "Assessment -> hazard_type: \"chemical leak\", severity: 9, population: 1200";
    let extracted = ImpactAssessment::extract(raw);
    assert_eq!(extracted.value.hazard_type, "chemical leak");
    assert_eq!(extracted.value.severity, 9);
    assert_eq!(extracted.value.population_affected, 1200);
    assert_eq!(extracted.value.location, "unknown");
    assert_eq!(extracted.fields.source("severity"), Some(FieldSource::Recovered));
    assert_eq!(extracted.fields.source("location"), Some(FieldSource::Defaulted));
}

#[test]
fn json_wrapped_in_prose_is_parsed() {
    let raw = "Sure! Here is the plan: {\"action_plan\": [\"Boom the outflow\", \"Sample water\"], \"greenpt_score\": 55} Let me know.";
    let extracted = ActionChecklist::extract(raw);
    assert_eq!(extracted.value.action_plan, vec!["Boom the outflow", "Sample water"]);
    assert_eq!(extracted.value.greenpt_score, 55);
    assert_eq!(extracted.fields.source("action_plan"), Some(FieldSource::Parsed));
}

#[test]
fn long_checklists_are_capped_at_five() {
    let raw = r#"{"action_plan": ["a", "b", "c", "d", "e", "f", "g"], "greenpt_score": 90}"#;
    let plan = ActionChecklist::extract(raw).value;
    assert_eq!(plan.action_plan, vec!["a", "b", "c", "d", "e"]);
}

#[test]
fn extraction_never_fails() {
    let inputs = [
        "",
        "   \n\t",
        "I cannot help with that.",
        "```json\n",
        "```json\n{\"severity\": ",
        "{\"severity\": \"high\", \"population_affected\": null}",
        "{{{{ ]]]",
        "severity: -4, greenpt_score: 400",
    ];
    for raw in inputs {
        let impact = ImpactAssessment::extract(raw).value;
        assert!((1..=10).contains(&impact.severity), "{:?}", raw);
        assert!(!impact.hazard_type.is_empty());
        assert!(!impact.location.is_empty());

        let plan = ActionChecklist::extract(raw).value;
        assert!(plan.greenpt_score <= 100, "{:?}", raw);
        assert!(!plan.action_plan.is_empty());
    }
}

#[test]
fn negative_and_oversized_numbers_clamp_into_range() {
    let impact = ImpactAssessment::extract("severity: -4").value;
    assert_eq!(impact.severity, 1);
    let plan = ActionChecklist::extract("greenpt_score: 400").value;
    assert_eq!(plan.greenpt_score, 100);
}

#[test]
fn serialized_results_extract_to_themselves() {
    let impact = ImpactAssessment::extract(
        r#"{"hazard_type":"oil spill","location":"Pier 9","severity":6,"population_affected":300,"summary":"Sheen spreading"}"#,
    )
    .value;
    let again = ImpactAssessment::extract(&serde_json::to_string(&impact).unwrap()).value;
    assert_eq!(impact, again);

    let plan = ActionChecklist::extract("no structure at all").value;
    let again = ActionChecklist::extract(&serde_json::to_string_pretty(&plan).unwrap()).value;
    assert_eq!(plan, again);
}

#[test]
fn clarification_reply_is_cleaned() {
    assert_eq!(
        clean_question("Question: \"Is the smoke still visible?\""),
        "Is the smoke still visible?"
    );
    assert_eq!(clean_question("  Where exactly?  "), "Where exactly?");
    assert_eq!(clean_question("   "), DEFAULT_QUESTION);
}
