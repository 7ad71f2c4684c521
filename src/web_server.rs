use anyhow::{Context, Result};
use axum::{
    extract::{rejection::FormRejection, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    serve, Form, Router,
};
use minijinja::{context, path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::Deserialize;
use std::{convert::Infallible, net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::sync::Mutex;
use thiserror::Error;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::evaluation::{
    RatingError, RatingRecord, RatingSubmission, ALLIANCE_ITEMS, EMPATHY_ITEMS, ENGAGEMENT_ITEMS,
    NEGATIVE_FOLLOWUP_BELOW, POSITIVE_FOLLOWUP_ABOVE,
};
use crate::session::{ParticipantId, ParticipantIdError, Session, SessionStore};
use crate::storage::{ratings_object_name, transcript_object_name, UploadSink, CSV_CONTENT_TYPE};
use crate::therapist::Therapist;

#[derive(Debug, Error)]
pub enum WebError {
    #[error(transparent)]
    Participant(#[from] ParticipantIdError),
    #[error(transparent)]
    Ratings(#[from] RatingError),
    #[error("Invalid rating form: {0}")]
    RatingForm(#[from] FormRejection),
    #[error("No session for participant {0}. Please start from the home page.")]
    UnknownParticipant(ParticipantId),
    #[error("Please chat for at least {0} turns before saving the conversation.")]
    TooFewTurns(usize),
    #[error("Failed to render page: {0}")]
    Template(#[from] minijinja::Error),
    #[error("{0:#}")]
    Upstream(anyhow::Error),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebError::Participant(_)
            | WebError::Ratings(_)
            | WebError::RatingForm(_)
            | WebError::TooFewTurns(_) => StatusCode::BAD_REQUEST,
            WebError::UnknownParticipant(_) => StatusCode::NOT_FOUND,
            WebError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WebError::Upstream(_) => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Rejected request: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

/// Confirmation shown after a redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    ChatSaved,
    RatingsSaved,
}

impl Notice {
    fn text(&self) -> &'static str {
        match self {
            Notice::ChatSaved => "Chat history was uploaded successfully. You can begin filling out the evaluation questions in the sidebar now.",
            Notice::RatingsSaved => "Evaluation ratings were uploaded successfully.",
        }
    }
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    notice: Option<Notice>,
    // Set by the message redirect; only a fresh reply gets the typing effect.
    new: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StartForm {
    participant_id: String,
}

#[derive(Debug, Deserialize)]
struct MessageForm {
    content: String,
}

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    sessions: SessionStore,
    therapist: Arc<Therapist>,
    sink: Arc<dyn UploadSink>,
    min_turns: usize,
}

impl AppState {
    pub fn new(
        therapist: Therapist,
        sink: Arc<dyn UploadSink>,
        min_turns: usize,
        templates_dir: PathBuf,
    ) -> Self {
        Self {
            templates: Arc::new(create_minijinja_env(templates_dir)),
            sessions: SessionStore::new(),
            therapist: Arc::new(therapist),
            sink,
            min_turns,
        }
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<Html<String>, WebError> {
        let env = self.templates.acquire_env()?;
        let tmpl = env.get_template(name)?;
        Ok(Html(tmpl.render(ctx)?))
    }

    async fn existing_session(&self, participant: &ParticipantId) -> Result<Arc<Mutex<Session>>, WebError> {
        self.sessions
            .get(participant)
            .await
            .ok_or_else(|| WebError::UnknownParticipant(participant.clone()))
    }

    async fn upload_transcript(&self, session: &Session) -> Result<(), WebError> {
        let name = transcript_object_name(self.therapist.style(), &session.participant);
        let body = session
            .conversation
            .transcript()
            .to_csv()
            .map_err(WebError::Upstream)?;
        self.sink
            .upload(&name, CSV_CONTENT_TYPE, body)
            .await
            .map_err(WebError::Upstream)
    }
}

// Minijinja Environment setup
fn create_minijinja_env(templates_dir: PathBuf) -> AutoReloader {
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&templates_dir));
        // Watch the templates directory for changes
        notifier.watch_path(&templates_dir, true);
        Ok(env)
    })
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, WebError> {
    state.render(
        "index.html",
        context! {
            title => "Therapist Chatbot Evaluation",
        },
    )
}

async fn start_handler(
    State(state): State<AppState>,
    Form(form): Form<StartForm>,
) -> Result<Response, WebError> {
    match ParticipantId::parse(&form.participant_id) {
        Ok(participant) => {
            state.sessions.get_or_create(&participant).await;
            Ok(Redirect::to(&format!("/chat/{}", participant)).into_response())
        }
        Err(e) => {
            warn!("Rejected participant ID: {}", e);
            let page = state.render(
                "index.html",
                context! {
                    title => "Therapist Chatbot Evaluation",
                    error => e.to_string(),
                },
            )?;
            Ok((StatusCode::BAD_REQUEST, page).into_response())
        }
    }
}

async fn chat_page_handler(
    State(state): State<AppState>,
    Path(raw_pid): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, WebError> {
    let participant = ParticipantId::parse(&raw_pid)?;
    // Viewing an unknown ID shows a fresh conversation without registering it.
    let session = match state.sessions.get(&participant).await {
        Some(session) => session,
        None => Arc::new(Mutex::new(Session::new(participant.clone()))),
    };
    let session = session.lock().await;
    let transcript = session.conversation.transcript();
    let turns = transcript.completed_turns();

    state.render(
        "chat.html",
        context! {
            title => "Therapist Chatbot Evaluation",
            participant => participant.as_str(),
            messages => transcript.messages(),
            turns => turns,
            min_turns => state.min_turns,
            can_save => turns >= state.min_turns,
            notice => query.notice.map(|n| n.text()),
            animate_latest => query.new.is_some(),
            ratings_submitted => session.ratings_submitted,
            alliance_items => &ALLIANCE_ITEMS[..],
            engagement_items => &ENGAGEMENT_ITEMS[..],
            empathy_items => &EMPATHY_ITEMS[..],
            negative_below => NEGATIVE_FOLLOWUP_BELOW,
            positive_above => POSITIVE_FOLLOWUP_ABOVE,
        },
    )
}

async fn message_handler(
    State(state): State<AppState>,
    Path(raw_pid): Path<String>,
    Form(form): Form<MessageForm>,
) -> Result<Redirect, WebError> {
    let participant = ParticipantId::parse(&raw_pid)?;
    let content = form.content.trim();
    if content.is_empty() {
        return Ok(Redirect::to(&format!("/chat/{}#latest", participant)));
    }

    let session = state.sessions.get_or_create(&participant).await;
    let mut session = session.lock().await;
    state
        .therapist
        .take_turn(&mut session.conversation, content)
        .await
        .map_err(WebError::Upstream)?;

    // Past the threshold every turn re-uploads the growing transcript.
    if session.conversation.transcript().completed_turns() >= state.min_turns {
        state.upload_transcript(&session).await?;
    }
    Ok(Redirect::to(&format!("/chat/{}?new=1#latest", participant)))
}

async fn save_handler(
    State(state): State<AppState>,
    Path(raw_pid): Path<String>,
) -> Result<Redirect, WebError> {
    let participant = ParticipantId::parse(&raw_pid)?;
    let session = state.existing_session(&participant).await?;
    let session = session.lock().await;
    if session.conversation.transcript().completed_turns() < state.min_turns {
        return Err(WebError::TooFewTurns(state.min_turns));
    }
    state.upload_transcript(&session).await?;
    info!(participant = %participant, "Transcript saved on request");
    Ok(Redirect::to(&format!("/chat/{}?notice=chat_saved", participant)))
}

async fn ratings_handler(
    State(state): State<AppState>,
    Path(raw_pid): Path<String>,
    submission: Result<Form<RatingSubmission>, FormRejection>,
) -> Result<Redirect, WebError> {
    let participant = ParticipantId::parse(&raw_pid)?;
    let session = state.existing_session(&participant).await?;
    let Form(submission) = submission?;
    let record = RatingRecord::from_submission(&submission)?;
    let body = record.to_csv().map_err(WebError::Upstream)?;
    let name = ratings_object_name(state.therapist.style(), &participant);
    state
        .sink
        .upload(&name, CSV_CONTENT_TYPE, body)
        .await
        .map_err(WebError::Upstream)?;

    session.lock().await.ratings_submitted = true;
    info!(participant = %participant, "Ratings saved");
    Ok(Redirect::to(&format!("/chat/{}?notice=ratings_saved", participant)))
}

pub fn build_router(state: AppState, static_dir: PathBuf) -> Router {
    let static_files_service = ServeDir::new(static_dir).not_found_service(tower::service_fn(|_| async {
        Ok::<_, Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response())
    }));

    Router::new()
        .route("/", get(index_handler))
        .route("/start", post(start_handler))
        .route("/chat/:pid", get(chat_page_handler))
        .route("/chat/:pid/message", post(message_handler))
        .route("/chat/:pid/save", post(save_handler))
        .route("/chat/:pid/ratings", post(ratings_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http()) // Add request logging
}

pub async fn start_web_server(port: u16, state: AppState, static_dir: PathBuf) -> Result<()> {
    let app = build_router(state, static_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_query_values() {
        let query: PageQuery = serde_json::from_str(r#"{"notice":"chat_saved"}"#).unwrap();
        assert_eq!(query.notice, Some(Notice::ChatSaved));
        let query: PageQuery = serde_json::from_str(r#"{"notice":"ratings_saved"}"#).unwrap();
        assert_eq!(query.notice, Some(Notice::RatingsSaved));
    }

    #[test]
    fn test_error_statuses() {
        let resp = WebError::TooFewTurns(5).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = WebError::Upstream(anyhow::anyhow!("boom")).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let resp = WebError::Participant(ParticipantIdError::Empty).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let pid = ParticipantId::parse("9").unwrap();
        let resp = WebError::UnknownParticipant(pid).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
