//! Recorded sessions replayed through the public API.

use pretty_assertions::assert_eq;
use synheart_load::encoder::PAYLOAD_VERSION;
use synheart_load::scorer::{LoadScorer, ScorerWeights};
use synheart_load::types::Classification;
use synheart_load::{
    parse_ndjson, EngineConfig, ReadingEncoder, ReplaySession, LOAD_VERSION, PRODUCER_NAME,
};

const RECORDING: &str = r#"
{"type":"pointer_down","t":0,"x":12.0,"y":40.0}
{"type":"pointer_move","t":40,"x":220.0,"y":60.0}
{"type":"pointer_move","t":80,"x":35.0,"y":300.0}
{"type":"hover_start","t":300}
{"type":"key","t":900}
{"type":"key","t":1200,"backspace":true}
{"type":"hover_end","t":2600}
{"type":"focus","t":3000,"focused":false}
{"type":"focus","t":3400,"focused":true}
{"type":"context","t":3500,"context":"wrong_answer_streak"}
{"type":"pointer_down","t":4100,"x":15.0,"y":41.0}
{"type":"key","t":5000}
"#;

fn pinned_high() -> LoadScorer {
    let mut weights = ScorerWeights::zeros();
    weights.layers[2].bias[0] = 5.0;
    LoadScorer::with_weights(weights).unwrap()
}

#[test]
fn replay_is_deterministic() {
    let events = parse_ndjson(RECORDING).unwrap();
    let session = ReplaySession::new(EngineConfig::default(), LoadScorer::seeded(42)).unwrap();

    let a = session.run(&events).unwrap();
    let b = session.run(&events).unwrap();

    let summary = |o: &synheart_load::ReplayOutcome| {
        o.readings
            .iter()
            .map(|r| (r.tick_ms, r.score, r.classification))
            .collect::<Vec<_>>()
    };
    assert_eq!(summary(&a), summary(&b));
    assert_eq!(a.readings.len(), 3);
}

#[test]
fn sustained_high_load_fires_crisis_once() {
    let events = parse_ndjson(RECORDING).unwrap();
    let outcome = ReplaySession::new(EngineConfig::default(), pinned_high())
        .unwrap()
        .run(&events)
        .unwrap();

    let fired: Vec<bool> = outcome.readings.iter().map(|r| r.crisis_fired).collect();
    assert_eq!(fired, vec![true, false, false]);
    assert!(outcome
        .readings
        .iter()
        .all(|r| r.classification == Classification::Overload));
}

#[test]
fn payloads_carry_producer_and_quality() {
    let events = parse_ndjson(RECORDING).unwrap();
    let outcome = ReplaySession::new(EngineConfig::default(), LoadScorer::seeded(42))
        .unwrap()
        .run(&events)
        .unwrap();
    let encoder = ReadingEncoder::with_instance_id("replay-1".to_string());
    let payloads: Vec<String> = outcome
        .readings
        .iter()
        .map(|r| encoder.encode_to_json(r).unwrap())
        .collect();
    assert_eq!(payloads.len(), 3);

    let first: serde_json::Value = serde_json::from_str(&payloads[0]).unwrap();
    assert_eq!(first["producer"]["instance_id"], "replay-1");
    assert_eq!(first["payload_version"], PAYLOAD_VERSION);
    assert_eq!(first["producer"]["name"], PRODUCER_NAME);
    assert_eq!(first["producer"]["version"], LOAD_VERSION);
    assert_eq!(first["provenance"]["signal_source"], "heuristic");

    let flags = first["quality"]["flags"].as_array().unwrap();
    assert!(flags.iter().any(|f| f == "heuristic_source"));
    assert!(flags.iter().any(|f| f == "no_voice_signal"));
}

#[test]
fn custom_classifier_bounds_apply_to_replay() {
    let mut config = EngineConfig::default();
    config.classifier.approaching_overload_max = 99;
    let events = parse_ndjson(RECORDING).unwrap();
    let outcome = ReplaySession::new(config, pinned_high())
        .unwrap()
        .run(&events)
        .unwrap();
    assert!(outcome
        .readings
        .iter()
        .all(|r| r.classification == Classification::ApproachingOverload));
}
