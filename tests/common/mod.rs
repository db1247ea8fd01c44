//! Shared test helpers: an in-memory model backend that replays scripted replies.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ecoops_pipeline::{ModelBackend, ModelError};

pub const CLARIFY_REPLY: &str = "Question: \"How many people live within a mile of the fire?\"";
pub const IMPACT_REPLY: &str = r#"{"hazard_type":"wildfire","location":"Oak Street","severity":8,"population_affected":150,"summary":"Brush fire spreading toward homes"}"#;
pub const ACTION_REPLY: &str = r#"```json
{"action_plan": ["Evacuate Oak Street", "Stage engines at Elm", "Close Route 9", "Open shelter", "Notify utility"], "greenpt_score": 82, "summary": "Contain and evacuate"}
```"#;
pub const BRIEFING_REPLY: &str = "EXECUTIVE SUMMARY: A brush fire near Oak Street threatens about 150 residents.";

/// Replies in call order. A call past the end of the script fails with `EmptyResponse`.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<String>>,
    fail_at: Option<usize>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            fail_at: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// The full happy-path script for a wildfire report.
    pub fn wildfire() -> Self {
        Self::new([CLARIFY_REPLY, IMPACT_REPLY, ACTION_REPLY, BRIEFING_REPLY])
    }

    /// Fail the call with this zero-based index with an HTTP 500.
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn invoke(&self, prompt: &str) -> Result<String, ModelError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if Some(n) == self.fail_at {
            return Err(ModelError::Http {
                status: 500,
                body: "upstream exploded".to_string(),
            });
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(ModelError::EmptyResponse)
    }

    fn provider(&self) -> &str {
        "scripted"
    }
}

/// A backend whose calls never complete. Counts calls started and calls dropped mid-flight.
#[derive(Default)]
pub struct HangingBackend {
    pub started: AtomicUsize,
    pub dropped: Arc<AtomicUsize>,
}

struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ModelBackend for HangingBackend {
    async fn invoke(&self, _prompt: &str) -> Result<String, ModelError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let _in_flight = DropCounter(self.dropped.clone());
        std::future::pending::<()>().await;
        Err(ModelError::EmptyResponse)
    }

    fn provider(&self) -> &str {
        "hanging"
    }
}

pub const WILDFIRE_REPORT: &str = "Wildfire near Oak Street, about 50 homes nearby";
