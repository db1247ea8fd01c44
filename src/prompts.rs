//! Prompt text for each pipeline stage.
//!
//! Prompts ask for bare JSON where a stage is extracted, but nothing downstream relies on
//! the model complying; the extractor handles whatever comes back.

use crate::state::RunState;

const UNKNOWN: &str = "unknown";

pub fn clarification(report: &str) -> String {
    format!(
        "You are an EcoOps Command Center operator. A citizen has just reported an environmental \
         incident. Your goal is to gather more information.\n\n\
         Report from citizen:\n\"\"\"\n{report}\n\"\"\"\n\n\
         Respond with exactly ONE short follow-up question (1-2 sentences) to learn more. Ask about: \
         location details, scale, people affected, time of onset, or anything that would help assess \
         severity. Be professional and concise. Do not include any prefix like \"Question:\" or \
         quotes. Output only the question."
    )
}

pub fn impact(report: &str) -> String {
    format!(
        "You are an Impact Assessment Agent for EcoOps Command Center. Analyze the following \
         environmental incident report and extract:\n\n\
         1. Hazard type (e.g., \"chemical leak\", \"wildfire\", \"flood\")\n\
         2. Location (specific area mentioned)\n\
         3. Severity score (1-10, where 10 is critical/immediate danger)\n\
         4. Estimated population affected (number of people)\n\n\
         Respond ONLY with a JSON object in this exact format:\n\
         {{\n  \"hazard_type\": \"string\",\n  \"location\": \"string\",\n  \
         \"severity\": number (1-10),\n  \"population_affected\": number,\n  \
         \"summary\": \"brief one-sentence summary\"\n}}\n\n\
         Incident Report:\n{report}"
    )
}

pub fn action(state: &RunState) -> String {
    let (hazard_type, location) = hazard_fields(state);
    format!(
        "You are an Action Planning Agent for EcoOps Command Center. Based on the following \
         environmental incident assessment, create:\n\n\
         1. A 5-step action checklist (specific, actionable steps)\n\
         2. A GreenPT Score (0-100) representing environmental protection and response \
         effectiveness potential\n\n\
         Severity: {severity}/10\n\
         Hazard Type: {hazard_type}\n\
         Location: {location}\n\
         Population Affected: {population}\n\n\
         Respond ONLY with a JSON object in this exact format:\n\
         {{\n  \"action_plan\": [\"step 1\", \"step 2\", \"step 3\", \"step 4\", \"step 5\"],\n  \
         \"greenpt_score\": number (0-100),\n  \
         \"summary\": \"brief explanation of the action plan\"\n}}\n\n\
         Make the action steps specific and actionable (e.g., \"Deploy boom barriers at river mile \
         12\", \"Evacuate residents within 2-mile radius\").",
        severity = severity_text(state),
        population = state.population_affected.unwrap_or(0),
    )
}

pub fn briefing(state: &RunState) -> String {
    let (hazard_type, location) = hazard_fields(state);
    let plan = state
        .action_plan
        .as_ref()
        .filter(|p| !p.is_empty())
        .map(|p| p.join("; "))
        .unwrap_or_else(|| "N/A".to_string());
    format!(
        "You are a Briefing Agent for EcoOps Command Center. Create a professional 1-page summary \
         report consolidating all assessment data.\n\n\
         Hazard: {hazard_type} at {location}\n\
         Severity: {severity}/10\n\
         Population Affected: {population}\n\
         Action Plan: {plan}\n\
         GreenPT Score: {score}/100\n\n\
         Write a comprehensive briefing report (approximately 200-300 words) that includes:\n\
         - Executive summary of the incident\n\
         - Risk assessment\n\
         - Recommended actions\n\
         - Resource requirements\n\
         - Timeline considerations\n\n\
         Format as a professional operational briefing document.",
        severity = severity_text(state),
        population = state.population_affected.unwrap_or(0),
        score = state.response_score.unwrap_or(0),
    )
}

fn hazard_fields(state: &RunState) -> (&str, &str) {
    match &state.hazard {
        Some(h) => (h.hazard_type.as_str(), h.location.as_str()),
        None => (UNKNOWN, UNKNOWN),
    }
}

fn severity_text(state: &RunState) -> String {
    state
        .severity
        .map(|s| s.to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}
