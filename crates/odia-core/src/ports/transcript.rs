use crate::domain::Turn;

/// Receives every finished turn as plain text for optional downstream logging.
pub trait TranscriptSink: Send + Sync {
    fn record(&self, turn: &Turn);
}

/// Discards transcripts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTranscriptSink;

impl TranscriptSink for NoopTranscriptSink {
    fn record(&self, _turn: &Turn) {}
}

/// Writes each transcript as a structured `info` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTranscriptSink;

impl TranscriptSink for TracingTranscriptSink {
    fn record(&self, turn: &Turn) {
        tracing::info!(
            turn_id = %turn.id,
            status = ?turn.status,
            user = %turn.user_text,
            assistant = %turn.assistant_text,
            "Turn transcript"
        );
    }
}
