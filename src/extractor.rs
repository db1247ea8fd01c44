//! Output extraction: recovers typed stage results from raw model text.
//!
//! Every entry point here is total. Any input string, including empty text, prose,
//! fenced JSON or truncated JSON, yields a fully populated value. Each field records
//! whether it was parsed from a JSON object, recovered by a key pattern, or defaulted,
//! so fallback behaviour can be inspected without re-running a model.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// First fenced block, tagged `json` or untagged.
static FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[ \t]*(?i:json)?[ \t]*\r?\n?(.*?)```").expect("fence regex is valid")
});

/// Label prefixes models put in front of a bare question despite instructions.
static QUESTION_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:follow[- ]?up\s+)?question\s*[:\-]\s*").expect("label regex is valid")
});

pub const DEFAULT_ACTION_PLAN: [&str; 5] = [
    "Assess immediate threat level",
    "Deploy containment measures",
    "Evacuate affected areas",
    "Coordinate with emergency services",
    "Monitor and adjust response",
];

pub const DEFAULT_QUESTION: &str = "Can you describe the exact location, how large the affected area is, and whether anyone is in immediate danger?";

const CHECKLIST_LEN: usize = 5;

/// Expected type of one field, with its valid range and fallback value.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Integer { min: i64, max: i64, default: i64 },
    Text { default: &'static str },
    List {
        default: &'static [&'static str],
        max_items: usize,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    /// Alternative names tried, in order, when `key` yields nothing.
    pub fallback_keys: &'static [&'static str],
    pub kind: FieldKind,
}

impl FieldSpec {
    fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.key).chain(self.fallback_keys.iter().copied())
    }

    fn default_value(&self) -> FieldValue {
        match self.kind {
            FieldKind::Integer { default, .. } => FieldValue::Integer(default),
            FieldKind::Text { default } => FieldValue::Text(default.to_string()),
            FieldKind::List { default, .. } => {
                FieldValue::List(default.iter().map(|s| s.to_string()).collect())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Parsed,
    Recovered,
    Defaulted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedField {
    pub value: FieldValue,
    pub source: FieldSource,
    /// The raw number fell outside the field's range and was clamped.
    pub clamped: bool,
}

/// Per-field extraction results for one stage shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSet {
    fields: BTreeMap<&'static str, ExtractedField>,
}

impl FieldSet {
    pub fn get(&self, key: &str) -> Option<&ExtractedField> {
        self.fields.get(key)
    }

    pub fn source(&self, key: &str) -> Option<FieldSource> {
        self.fields.get(key).map(|f| f.source)
    }

    /// How many fields came from the given source.
    pub fn count(&self, source: FieldSource) -> usize {
        self.fields.values().filter(|f| f.source == source).count()
    }

    fn integer(&self, key: &str) -> Option<i64> {
        match self.fields.get(key).map(|f| &f.value) {
            Some(FieldValue::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    fn text(&self, key: &str) -> Option<String> {
        match self.fields.get(key).map(|f| &f.value) {
            Some(FieldValue::Text(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn list(&self, key: &str) -> Option<Vec<String>> {
        match self.fields.get(key).map(|f| &f.value) {
            Some(FieldValue::List(items)) => Some(items.clone()),
            _ => None,
        }
    }
}

/// A typed stage result plus the provenance of each of its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted<T> {
    pub value: T,
    pub fields: FieldSet,
}

/// Extract every field in `specs` from raw model text. Never fails.
pub fn extract_fields(raw: &str, specs: &[FieldSpec]) -> FieldSet {
    let trimmed = raw.trim();
    let object = parse_object(parse_candidate(trimmed));
    if object.is_none() && !trimmed.is_empty() {
        debug!(
            "structured parse failed, using pattern recovery ({} chars)",
            trimmed.len()
        );
    }

    let mut set = FieldSet::default();
    for spec in specs {
        let (value, source) = if let Some(v) = object.as_ref().and_then(|o| from_object(o, spec)) {
            (v, FieldSource::Parsed)
        } else if let Some(v) = spec.keys().find_map(|key| recover(trimmed, key, &spec.kind)) {
            (v, FieldSource::Recovered)
        } else {
            debug!("field '{}' unrecoverable, using default", spec.key);
            (spec.default_value(), FieldSource::Defaulted)
        };

        let (value, clamped) = clamp(value, &spec.kind);
        if clamped {
            debug!("field '{}' clamped into range", spec.key);
        }
        set.fields.insert(
            spec.key,
            ExtractedField {
                value,
                source,
                clamped,
            },
        );
    }
    set
}

/// Inner text of the first fence, or the whole text when there is none.
fn parse_candidate(trimmed: &str) -> &str {
    if let Some(inner) = FENCE_RE.captures(trimmed).and_then(|c| c.get(1)) {
        return inner.as_str().trim();
    }
    // Opening fence with no closing fence: output was cut off.
    if let Some(rest) = trimmed.strip_prefix("```") {
        return match rest.find('\n') {
            Some(i) => rest[i + 1..].trim(),
            None => rest.trim(),
        };
    }
    trimmed
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) {
        return Some(map);
    }
    // Prose around an object: retry on the outermost braces.
    let start = candidate.find('{')?;
    let end = candidate.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&candidate[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn from_object(object: &Map<String, Value>, spec: &FieldSpec) -> Option<FieldValue> {
    spec.keys().find_map(|key| {
        let v = object.get(key)?;
        match spec.kind {
            FieldKind::Integer { .. } => strict_integer(v).map(FieldValue::Integer),
            FieldKind::Text { .. } => strict_text(v).map(FieldValue::Text),
            FieldKind::List { max_items, .. } => strict_list(v, max_items).map(FieldValue::List),
        }
    })
}

fn strict_integer(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(round_finite)),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(round_finite),
        _ => None,
    }
}

fn strict_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => non_blank(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn strict_list(v: &Value, max_items: usize) -> Option<Vec<String>> {
    let items: Vec<String> = v
        .as_array()?
        .iter()
        .filter_map(strict_text)
        .take(max_items)
        .collect();
    (!items.is_empty()).then_some(items)
}

/// Value shape a recovery pattern captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PatternShape {
    Integer,
    Text,
    List,
}

impl PatternShape {
    fn of(kind: &FieldKind) -> Self {
        match kind {
            FieldKind::Integer { .. } => PatternShape::Integer,
            FieldKind::Text { .. } => PatternShape::Text,
            FieldKind::List { .. } => PatternShape::List,
        }
    }

    fn pattern(self, key: &str) -> String {
        let key = regex::escape(key);
        match self {
            PatternShape::Integer => {
                format!(r#"(?i)\b{key}["']?\s*[:=]?\s*["']?(-?\d+(?:\.\d+)?)"#)
            }
            PatternShape::Text => format!(r#"(?i)\b{key}["']?\s*[:=]?\s*"([^"]*)""#),
            PatternShape::List => format!(r#"(?is)\b{key}["']?\s*[:=]?\s*\[(.*?)\]"#),
        }
    }
}

/// Recovery patterns for every key of the built-in stage shapes, compiled once.
static RECOVERY_PATTERNS: Lazy<HashMap<(&'static str, PatternShape), Regex>> = Lazy::new(|| {
    IMPACT_FIELDS
        .iter()
        .chain(ACTION_FIELDS)
        .flat_map(|spec| {
            let shape = PatternShape::of(&spec.kind);
            spec.keys().map(move |key| (key, shape))
        })
        .map(|(key, shape)| {
            let re = Regex::new(&shape.pattern(key)).expect("recovery pattern is valid");
            ((key, shape), re)
        })
        .collect()
});

/// Run `f` against the recovery pattern for `key`. Keys outside the built-in shapes
/// are compiled on demand.
fn with_pattern<T>(
    key: &'static str,
    shape: PatternShape,
    f: impl FnOnce(&Regex) -> Option<T>,
) -> Option<T> {
    if let Some(re) = RECOVERY_PATTERNS.get(&(key, shape)) {
        return f(re);
    }
    match Regex::new(&shape.pattern(key)) {
        Ok(re) => f(&re),
        Err(e) => {
            warn!("recovery pattern for '{}' failed to compile: {}", key, e);
            None
        }
    }
}

fn recover(text: &str, key: &'static str, kind: &FieldKind) -> Option<FieldValue> {
    let shape = PatternShape::of(kind);
    with_pattern(key, shape, |re| {
        let caps = re.captures(text)?;
        match *kind {
            FieldKind::Integer { .. } => caps[1]
                .parse::<f64>()
                .ok()
                .and_then(round_finite)
                .map(FieldValue::Integer),
            FieldKind::Text { .. } => non_blank(&caps[1]).map(FieldValue::Text),
            FieldKind::List { max_items, .. } => {
                let items: Vec<String> = caps[1]
                    .split(',')
                    .filter_map(|s| non_blank(&s.replace(['"', '\'', '[', ']'], "")))
                    .take(max_items)
                    .collect();
                (!items.is_empty()).then_some(FieldValue::List(items))
            }
        }
    })
}

fn clamp(value: FieldValue, kind: &FieldKind) -> (FieldValue, bool) {
    match (value, kind) {
        (FieldValue::Integer(n), FieldKind::Integer { min, max, .. }) => {
            let c = n.clamp(*min, *max);
            (FieldValue::Integer(c), c != n)
        }
        (other, _) => (other, false),
    }
}

fn round_finite(f: f64) -> Option<i64> {
    // `as` saturates at the i64 bounds.
    f.is_finite().then(|| f.round() as i64)
}

fn non_blank(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

pub const IMPACT_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        key: "hazard_type",
        fallback_keys: &["type", "hazard"],
        kind: FieldKind::Text { default: "unknown" },
    },
    FieldSpec {
        key: "location",
        fallback_keys: &[],
        kind: FieldKind::Text { default: "unknown" },
    },
    FieldSpec {
        key: "severity",
        fallback_keys: &[],
        kind: FieldKind::Integer {
            min: 1,
            max: 10,
            default: 5,
        },
    },
    FieldSpec {
        key: "population_affected",
        fallback_keys: &["population", "people_affected"],
        kind: FieldKind::Integer {
            min: 0,
            max: i64::MAX,
            default: 0,
        },
    },
    FieldSpec {
        key: "summary",
        fallback_keys: &[],
        kind: FieldKind::Text {
            default: "Assessment complete",
        },
    },
];

pub const ACTION_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        key: "action_plan",
        fallback_keys: &["actions", "steps"],
        kind: FieldKind::List {
            default: &DEFAULT_ACTION_PLAN,
            max_items: CHECKLIST_LEN,
        },
    },
    FieldSpec {
        key: "greenpt_score",
        fallback_keys: &["score"],
        kind: FieldKind::Integer {
            min: 0,
            max: 100,
            default: 75,
        },
    },
    FieldSpec {
        key: "summary",
        fallback_keys: &[],
        kind: FieldKind::Text {
            default: "Action plan generated",
        },
    },
];

/// Impact-stage result. Serializes to the same keys it is extracted from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactAssessment {
    pub hazard_type: String,
    pub location: String,
    pub severity: u8,
    pub population_affected: u64,
    pub summary: String,
}

impl ImpactAssessment {
    pub fn extract(raw: &str) -> Extracted<Self> {
        let fields = extract_fields(raw, IMPACT_FIELDS);
        let value = Self {
            hazard_type: fields
                .text("hazard_type")
                .unwrap_or_else(|| "unknown".to_string()),
            location: fields
                .text("location")
                .unwrap_or_else(|| "unknown".to_string()),
            severity: fields
                .integer("severity")
                .and_then(|n| u8::try_from(n).ok())
                .unwrap_or(5),
            population_affected: fields
                .integer("population_affected")
                .and_then(|n| u64::try_from(n).ok())
                .unwrap_or(0),
            summary: fields
                .text("summary")
                .unwrap_or_else(|| "Assessment complete".to_string()),
        };
        Extracted { value, fields }
    }
}

/// Action-stage result: the checklist and the GreenPT effectiveness score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionChecklist {
    pub action_plan: Vec<String>,
    pub greenpt_score: u8,
    pub summary: String,
}

impl ActionChecklist {
    pub fn extract(raw: &str) -> Extracted<Self> {
        let fields = extract_fields(raw, ACTION_FIELDS);
        let value = Self {
            action_plan: fields
                .list("action_plan")
                .unwrap_or_else(|| DEFAULT_ACTION_PLAN.iter().map(|s| s.to_string()).collect()),
            greenpt_score: fields
                .integer("greenpt_score")
                .and_then(|n| u8::try_from(n).ok())
                .unwrap_or(75),
            summary: fields
                .text("summary")
                .unwrap_or_else(|| "Action plan generated".to_string()),
        };
        Extracted { value, fields }
    }
}

/// Reduce a clarification reply to the bare question text.
pub fn clean_question(raw: &str) -> String {
    let mut q = raw.trim();
    q = QUESTION_LABEL_RE
        .find(q)
        .map(|m| q[m.end()..].trim())
        .unwrap_or(q);
    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”')] {
        if q.len() > 1 && q.starts_with(open) && q.ends_with(close) {
            q = q[open.len_utf8()..q.len() - close.len_utf8()].trim();
        }
    }
    if q.is_empty() {
        DEFAULT_QUESTION.to_string()
    } else {
        q.to_string()
    }
}
