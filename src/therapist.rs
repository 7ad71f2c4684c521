//! The two chained model calls behind every turn.
//!
//! The therapist model answers from its own (unadapted) history; the style
//! adapter then rewrites that answer using the displayed transcript as context.

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::constants::GREETING;
use crate::llm_interaction::LlmClient;
use crate::prompts::{style_adapter_prompt, THERAPIST_SYSTEM_PROMPT};
use crate::styles::StyleDescriptor;
use crate::transcript::{Message, Transcript};

/// Which reply the participant sees and the transcript stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReplyMode {
    /// Rewrite each reply into the configured style.
    #[default]
    Adapted,
    /// Control condition: show the therapist's reply as-is. The adapter
    /// still runs and its output is only logged.
    Unadapted,
}

/// Per-participant conversation state.
#[derive(Debug, Clone)]
pub struct Conversation {
    transcript: Transcript,
    // What the therapist model has seen: user turns and its own unadapted replies.
    model_history: Vec<Message>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            transcript: Transcript::with_greeting(GREETING),
            model_history: Vec::new(),
        }
    }

    /// The displayed transcript, greeting included.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn model_history(&self) -> &[Message] {
        &self.model_history
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub unadapted: String,
    pub reply: String,
}

#[derive(Debug, Clone)]
pub struct Therapist {
    llm: LlmClient,
    style: &'static StyleDescriptor,
    mode: ReplyMode,
}

impl Therapist {
    pub fn new(llm: LlmClient, style: &'static StyleDescriptor, mode: ReplyMode) -> Self {
        Self { llm, style, mode }
    }

    pub fn style(&self) -> &'static StyleDescriptor {
        self.style
    }

    /// Run one turn. The conversation is only updated once every call succeeded,
    /// so a failed turn leaves no dangling user message behind.
    #[instrument(skip_all, fields(style = self.style.name, mode = ?self.mode))]
    pub async fn take_turn(&self, conversation: &mut Conversation, user_input: &str) -> Result<TurnOutcome> {
        let unadapted = self
            .llm
            .respond(THERAPIST_SYSTEM_PROMPT, &conversation.model_history, user_input)
            .await
            .context("Therapist response failed")?;

        let mut displayed = conversation.transcript.clone();
        displayed.push(Message::user(user_input));

        // The adapter runs in both modes; the mode only picks what is shown.
        let prompt = style_adapter_prompt(self.style, &displayed, &unadapted)?;
        let adapted = self
            .llm
            .complete_prompt(&prompt)
            .await
            .context("Style adaptation failed")?;

        let reply = match self.mode {
            ReplyMode::Adapted => {
                debug!(%unadapted, "Withheld unadapted reply");
                adapted
            }
            ReplyMode::Unadapted => {
                debug!(%adapted, "Withheld adapted reply");
                unadapted.clone()
            }
        };

        displayed.push(Message::assistant(reply.clone()));
        conversation.transcript = displayed;
        conversation.model_history.push(Message::user(user_input));
        conversation.model_history.push(Message::assistant(unadapted.clone()));

        info!(
            turns = conversation.transcript.completed_turns(),
            "Appended turn to transcript"
        );
        Ok(TurnOutcome { unadapted, reply })
    }
}
