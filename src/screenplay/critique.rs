use pulldown_cmark::{html, Event, Options, Parser};
use serde::Serialize;
use tracing::{info, warn};

use crate::llm::LLM;
use crate::types::{AppResult, LLMMessage, LLMRequest, LLMResponse};

const SYSTEM_INSTRUCTION: &str = "You are a veteran script consultant and story editor. \
You read screenplays closely and give writers honest, specific, actionable notes.";

const CRITIQUE_PROMPT: &str = r#"Analyze the following screenplay and write a detailed critique in Markdown.

Focus on:
1. **Plot holes**: events that contradict earlier setup, unresolved threads, and conveniences the story never earns.
2. **Continuity errors**: timeline, location, prop and character-knowledge inconsistencies.
3. **Character motivation**: choices that do not follow from what the audience knows about the character.
4. **Structure and pacing**: act breaks, set-ups without pay-offs, scenes that stall momentum.
5. **Dialogue**: exposition dumps, voice consistency, on-the-nose lines.

For every problem, quote or cite the scene, explain why it breaks the story, and suggest a concrete fix.
Finish with a short summary of the screenplay's strengths and the three most important revisions.

Screenplay:
---
{screenplay}
---"#;

#[derive(Debug, Clone)]
pub struct CritiqueSettings {
    pub provider: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CritiqueOutcome {
    Completed { markdown: String, html: String },
    Blocked { reason: String },
    Empty,
}

impl CritiqueOutcome {
    /// What the page shows when there is no critique to render.
    pub fn notice(&self) -> Option<String> {
        match self {
            CritiqueOutcome::Completed { .. } => None,
            CritiqueOutcome::Blocked { reason } => Some(format!(
                "The model declined to analyze this screenplay (reason: {}). Try again or adjust the content.",
                reason
            )),
            CritiqueOutcome::Empty => {
                Some("The model returned an empty response. Please try again.".to_string())
            }
        }
    }
}

pub fn build_prompt(screenplay: &str) -> String {
    CRITIQUE_PROMPT.replace("{screenplay}", screenplay.trim())
}

pub fn build_request(screenplay: &str, settings: &CritiqueSettings) -> LLMRequest {
    LLMRequest {
        provider: settings.provider.clone(),
        model: settings.model.clone(),
        messages: vec![LLMMessage::user(build_prompt(screenplay))],
        max_tokens: Some(settings.max_tokens),
        temperature: Some(settings.temperature),
        system_instruction: Some(SYSTEM_INSTRUCTION.to_string()),
    }
}

pub fn classify(response: LLMResponse) -> CritiqueOutcome {
    if let Some(reason) = response.block_reason {
        return CritiqueOutcome::Blocked { reason };
    }
    if response.content.trim().is_empty() {
        return CritiqueOutcome::Empty;
    }
    let html = render_markdown(&response.content);
    CritiqueOutcome::Completed {
        markdown: response.content,
        html,
    }
}

/// Markdown to HTML. Raw HTML in the model's reply is emitted as escaped text.
pub fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Send the screenplay to the model and sort the reply into an outcome.
pub async fn critique(
    llm: &LLM,
    screenplay: &str,
    settings: &CritiqueSettings,
) -> AppResult<CritiqueOutcome> {
    let request = build_request(screenplay, settings);
    let response = llm.create_chat_completion(&request).await?;
    let usage = response.usage.clone();
    let outcome = classify(response);

    match &outcome {
        CritiqueOutcome::Completed { markdown, .. } => info!(
            model = %settings.model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            chars = markdown.len(),
            "Critique completed"
        ),
        CritiqueOutcome::Blocked { reason } => {
            warn!(model = %settings.model, reason = %reason, "Critique blocked")
        }
        CritiqueOutcome::Empty => warn!(model = %settings.model, "Critique came back empty"),
    }
    Ok(outcome)
}
