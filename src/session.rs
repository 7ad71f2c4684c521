use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::therapist::Conversation;

const MAX_PARTICIPANT_ID_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParticipantIdError {
    #[error("participant ID is empty")]
    Empty,
    #[error("participant ID is longer than 64 characters")]
    TooLong,
    #[error("participant ID may only contain letters, digits, '-' and '_' (found '{0}')")]
    InvalidChar(char),
}

/// Participant identifier. It ends up in object names and URLs, so it is
/// restricted to ASCII letters, digits, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn parse(raw: &str) -> Result<Self, ParticipantIdError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ParticipantIdError::Empty);
        }
        if trimmed.len() > MAX_PARTICIPANT_ID_LEN {
            return Err(ParticipantIdError::TooLong);
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(ParticipantIdError::InvalidChar(bad));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
pub struct Session {
    pub participant: ParticipantId,
    pub conversation: Conversation,
    pub ratings_submitted: bool,
}

impl Session {
    pub fn new(participant: ParticipantId) -> Self {
        Self {
            participant,
            conversation: Conversation::new(),
            ratings_submitted: false,
        }
    }
}

/// In-memory sessions keyed by participant. Each session has its own lock,
/// so a slow turn for one participant never blocks another.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<ParticipantId, Arc<Mutex<Session>>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(&self, participant: &ParticipantId) -> Arc<Mutex<Session>> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(participant.clone())
            .or_insert_with(|| {
                info!(participant = %participant, "Starting new session");
                Arc::new(Mutex::new(Session::new(participant.clone())))
            })
            .clone()
    }

    /// Existing session, without creating one.
    pub async fn get(&self, participant: &ParticipantId) -> Option<Arc<Mutex<Session>>> {
        self.sessions.lock().await.get(participant).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
