//! Recorded input events
//!
//! One JSON object per event, tagged by `type`, each carrying its capture time
//! `t` in milliseconds on the session clock:
//!
//! ```json
//! {"type":"pointer_move","t":1200,"x":310.0,"y":92.5}
//! {"type":"key","t":1250,"backspace":true}
//! {"type":"face","t":1266,"face":{"brow_distance":0.21,"blendshapes":{"brow_down_left":0.4}}}
//! ```

use crate::adapters::behavior::InteractionContext;
use crate::adapters::blendshapes::FaceObservation;
use crate::adapters::pointer::{PointerKind, PointerSample};
use crate::error::EngineError;
use crate::types::DistressMetric;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    PointerDown {
        t: u64,
        x: f64,
        y: f64,
        #[serde(default)]
        kind: PointerKind,
    },
    PointerMove {
        t: u64,
        x: f64,
        y: f64,
        #[serde(default)]
        kind: PointerKind,
    },
    HoverStart {
        t: u64,
    },
    HoverEnd {
        t: u64,
    },
    Key {
        t: u64,
        #[serde(default)]
        backspace: bool,
    },
    /// Focus or visibility change of the host surface
    Focus {
        t: u64,
        focused: bool,
    },
    /// One camera frame; `face` is absent when no face was detected
    Face {
        t: u64,
        #[serde(default)]
        face: Option<FaceObservation>,
    },
    /// Latest microphone waveform window
    Audio {
        t: u64,
        samples: Vec<f32>,
    },
    Transcript {
        t: u64,
        index: usize,
        text: String,
        #[serde(default)]
        is_final: bool,
    },
    Context {
        t: u64,
        context: InteractionContext,
    },
    DismissCrisis {
        t: u64,
    },
    DismissDistress {
        t: u64,
        metric: DistressMetric,
    },
}

impl InputEvent {
    pub fn timestamp_ms(&self) -> u64 {
        match self {
            InputEvent::PointerDown { t, .. }
            | InputEvent::PointerMove { t, .. }
            | InputEvent::HoverStart { t }
            | InputEvent::HoverEnd { t }
            | InputEvent::Key { t, .. }
            | InputEvent::Focus { t, .. }
            | InputEvent::Face { t, .. }
            | InputEvent::Audio { t, .. }
            | InputEvent::Transcript { t, .. }
            | InputEvent::Context { t, .. }
            | InputEvent::DismissCrisis { t }
            | InputEvent::DismissDistress { t, .. } => *t,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            InputEvent::PointerDown { .. } => "pointer_down",
            InputEvent::PointerMove { .. } => "pointer_move",
            InputEvent::HoverStart { .. } => "hover_start",
            InputEvent::HoverEnd { .. } => "hover_end",
            InputEvent::Key { .. } => "key",
            InputEvent::Focus { .. } => "focus",
            InputEvent::Face { .. } => "face",
            InputEvent::Audio { .. } => "audio",
            InputEvent::Transcript { .. } => "transcript",
            InputEvent::Context { .. } => "context",
            InputEvent::DismissCrisis { .. } => "dismiss_crisis",
            InputEvent::DismissDistress { .. } => "dismiss_distress",
        }
    }

    /// Pointer sample carried by pointer events
    pub fn pointer_sample(&self) -> Option<PointerSample> {
        match *self {
            InputEvent::PointerDown { t, x, y, kind } | InputEvent::PointerMove { t, x, y, kind } => {
                Some(PointerSample {
                    x,
                    y,
                    timestamp_ms: t,
                    kind,
                })
            }
            _ => None,
        }
    }

    /// Reject values the engine cannot interpret
    pub fn validate(&self) -> Result<(), EngineError> {
        match self {
            InputEvent::PointerDown { x, y, .. } | InputEvent::PointerMove { x, y, .. } => {
                if !x.is_finite() || !y.is_finite() {
                    return Err(EngineError::ParseError(format!(
                        "{} has non-finite coordinates",
                        self.type_name()
                    )));
                }
            }
            InputEvent::Audio { samples, .. } => {
                if samples.iter().any(|s| !s.is_finite()) {
                    return Err(EngineError::ParseError(
                        "audio window has non-finite samples".to_string(),
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Parse a JSON array of events
pub fn parse_array(json: &str) -> Result<Vec<InputEvent>, EngineError> {
    let events: Vec<InputEvent> = serde_json::from_str(json)?;
    for event in &events {
        event.validate()?;
    }
    Ok(events)
}

/// Parse NDJSON (newline-delimited JSON) events; blank lines are skipped
pub fn parse_ndjson(ndjson: &str) -> Result<Vec<InputEvent>, EngineError> {
    let mut events = Vec::new();
    for (line_num, line) in ndjson.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event = serde_json::from_str::<InputEvent>(trimmed).map_err(|e| {
            EngineError::ParseError(format!("Failed to parse line {}: {}", line_num + 1, e))
        })?;
        event.validate().map_err(|e| {
            EngineError::ParseError(format!("Invalid event on line {}: {}", line_num + 1, e))
        })?;
        events.push(event);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_deserialize_tagged_events() {
        let events = parse_ndjson(
            r#"
{"type":"pointer_down","t":10,"x":1.0,"y":2.0}
{"type":"pointer_move","t":20,"x":5.0,"y":2.0,"kind":"touch"}

{"type":"key","t":30,"backspace":true}
{"type":"focus","t":40,"focused":false}
{"type":"face","t":50}
{"type":"context","t":60,"context":"wrong_answer_streak"}
{"type":"dismiss_distress","t":70,"metric":"confusion"}
"#,
        )
        .unwrap();

        assert_eq!(events.len(), 7);
        assert_eq!(
            events[0],
            InputEvent::PointerDown {
                t: 10,
                x: 1.0,
                y: 2.0,
                kind: PointerKind::Mouse
            }
        );
        assert_eq!(
            events[1].pointer_sample().map(|s| s.kind),
            Some(PointerKind::Touch)
        );
        assert_eq!(events[4], InputEvent::Face { t: 50, face: None });
        assert_eq!(events[6].timestamp_ms(), 70);
    }

    #[test]
    fn test_face_observation_defaults_missing_blendshapes() {
        let events = parse_ndjson(
            r#"{"type":"face","t":5,"face":{"brow_distance":0.2,"blendshapes":{"brow_down_left":0.5}}}"#,
        )
        .unwrap();
        let InputEvent::Face { face: Some(face), .. } = &events[0] else {
            panic!("expected a face observation");
        };
        assert_eq!(face.blendshapes.brow_down_left, 0.5);
        assert_eq!(face.blendshapes.jaw_open, 0.0);
    }

    #[test]
    fn test_parse_error_reports_line() {
        let err = parse_ndjson("{\"type\":\"key\",\"t\":1}\n{\"type\":\"warp\",\"t\":2}").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_serialize_uses_type_tag() {
        let event = InputEvent::Key {
            t: 100,
            backspace: false,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "key");
        assert_eq!(value["t"], 100);
    }

    #[test]
    fn test_parse_array() {
        let events = parse_array(r#"[{"type":"hover_start","t":1},{"type":"hover_end","t":9}]"#).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].type_name(), "hover_end");
    }
}
