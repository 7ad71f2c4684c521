// Terminal chat session. Runs the same two-call pipeline as the web UI and
// uploads the transcript under the same rules.

use anyhow::{Context, Result};
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

use crate::session::ParticipantId;
use crate::storage::{transcript_object_name, UploadSink, CSV_CONTENT_TYPE};
use crate::therapist::{Conversation, Therapist};

const QUIT_COMMANDS: [&str; 2] = ["/quit", "/exit"];

/// Converse until EOF or `/quit`. Returns the final conversation.
pub async fn run_terminal_chat<R, W>(
    therapist: &Therapist,
    sink: &dyn UploadSink,
    participant: &ParticipantId,
    min_turns: usize,
    input: R,
    mut output: W,
) -> Result<Conversation>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    info!(participant = %participant, "Starting terminal chat session");
    let mut conversation = Conversation::new();
    let object_name = transcript_object_name(therapist.style(), participant);

    for message in conversation.transcript().messages() {
        writeln!(output, "therapist> {}\n", message.content)?;
    }

    let mut lines = input.lines();
    loop {
        write!(output, "you> ")?;
        output.flush()?;

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if QUIT_COMMANDS.contains(&line) {
            break;
        }

        let outcome = match therapist.take_turn(&mut conversation, line).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Turn failed: {:#}", e);
                writeln!(output, "[error] {:#}", e)?;
                continue;
            }
        };
        writeln!(output, "therapist> {}\n", outcome.reply)?;

        let turns = conversation.transcript().completed_turns();
        if turns >= min_turns {
            let body = conversation.transcript().to_csv()?;
            if let Err(e) = sink.upload(&object_name, CSV_CONTENT_TYPE, body).await {
                // The next turn uploads the full transcript again.
                warn!("Transcript upload failed: {:#}", e);
                writeln!(output, "[error] Transcript upload failed: {:#}", e)?;
                continue;
            }
            writeln!(output, "[saved to {} as {}]", sink.describe(), object_name)?;
        }
    }

    info!(
        turns = conversation.transcript().completed_turns(),
        "Terminal chat session finished"
    );
    Ok(conversation)
}
