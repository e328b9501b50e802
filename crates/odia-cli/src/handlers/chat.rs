//! Chat command handler.
//!
//! Runs the conversation pipeline against a proxy with stdin as the input
//! box and stdout as the transcript. Audio devices are used when built with
//! the `device` feature; the microphone then doubles as a voice input box
//! when the proxy can transcribe.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use odia_core::{
    CancelReason, ConversationEvent, PipelineConfig, TracingTranscriptSink, WidgetConfig,
};
use odia_voice::{ConversationOrchestrator, HttpChatStream, OrchestratorDeps, ProxyEndpoint};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::commands::ChatArgs;

/// One line typed at the prompt.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Quit,
    Stop,
    Listen,
    Mute,
    Message(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    match line.trim() {
        "" => Input::Empty,
        "/quit" | "/exit" => Input::Quit,
        "/stop" => Input::Stop,
        "/listen" => Input::Listen,
        "/mute" => Input::Mute,
        text => Input::Message(text),
    }
}

pub async fn execute(args: ChatArgs) -> Result<()> {
    let pipeline = load_pipeline_config(args.config.as_deref())?;
    let endpoint = ProxyEndpoint::new(args.endpoint.as_str(), args.api_key.clone())
        .with_context(|| format!("Invalid endpoint '{}'", args.endpoint))?;

    let widget = match endpoint.widget_config().await {
        Ok(widget) => widget,
        Err(e) => {
            warn!(error = %e, "Could not fetch widget config, using defaults");
            WidgetConfig::default()
        }
    };
    // The proxy may hand out its public widget key
    let endpoint = if args.api_key.is_none() && widget.api_key.is_some() {
        endpoint.with_api_key(widget.api_key.clone())
    } else {
        endpoint
    };

    let deps = build_deps(&args, &endpoint, &widget);
    let (orchestrator, mut events) = ConversationOrchestrator::new(deps, pipeline, widget);
    info!(
        endpoint = %endpoint.base_url(),
        voice = orchestrator.voice_enabled(),
        "Chat session ready. Type /quit to exit."
    );
    let handle = orchestrator.spawn();

    if args.listen {
        if let Err(e) = handle.start_listening().await {
            warn!(error = %e, "Microphone not started");
        }
    }

    let json = args.json;
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if print_event(&event, json).is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match parse_input(&line) {
            Input::Empty => {}
            Input::Quit => break,
            Input::Stop => {
                if !handle.interrupt().await? {
                    debug!("Nothing to interrupt");
                }
            }
            Input::Listen => {
                if let Err(e) = handle.start_listening().await {
                    warn!(error = %e, "Microphone not started");
                }
            }
            Input::Mute => handle.stop_listening()?,
            Input::Message(text) => {
                handle.submit(text).await?;
            }
        }
    }

    let turns = handle.shutdown().await?;
    if let Err(e) = printer.await {
        warn!(error = %e, "Event printer stopped abnormally");
    }
    info!(turns = turns.len(), "Chat session ended");
    Ok(())
}

fn load_pipeline_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    PipelineConfig::from_json_file(path)
        .with_context(|| format!("Failed to load pipeline config from {}", path.display()))
}

fn build_deps(args: &ChatArgs, endpoint: &ProxyEndpoint, widget: &WidgetConfig) -> OrchestratorDeps {
    let deps = OrchestratorDeps::text_only(Arc::new(HttpChatStream::new(endpoint.clone())))
        .with_transcripts(Arc::new(TracingTranscriptSink));
    if args.text_only {
        return deps;
    }
    with_devices(deps, endpoint, widget)
}

#[cfg(feature = "device")]
fn with_devices(
    deps: OrchestratorDeps,
    endpoint: &ProxyEndpoint,
    widget: &WidgetConfig,
) -> OrchestratorDeps {
    use odia_voice::{DeviceAudioOutput, DeviceMicrophone, HttpSynthesizer, HttpTranscriber};

    let mut deps = deps.with_microphone(Arc::new(DeviceMicrophone));
    if widget.transcription_available {
        deps = deps.with_transcriber(Arc::new(HttpTranscriber::new(endpoint.clone())));
    } else {
        debug!("Proxy cannot transcribe, the microphone is only used for barge-in");
    }
    match DeviceAudioOutput::new() {
        Ok(output) => deps.with_voice(
            Arc::new(HttpSynthesizer::new(endpoint.clone())),
            Arc::new(output),
        ),
        Err(e) => {
            warn!(error = %e, "No audio output, replies will be text-only");
            deps
        }
    }
}

#[cfg(not(feature = "device"))]
fn with_devices(
    deps: OrchestratorDeps,
    _endpoint: &ProxyEndpoint,
    _widget: &WidgetConfig,
) -> OrchestratorDeps {
    debug!("Built without the `device` feature, replies will be text-only");
    deps
}

fn print_event(event: &ConversationEvent, json: bool) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    if json {
        let line = serde_json::to_string(event).map_err(std::io::Error::other)?;
        writeln!(out, "{line}")?;
    } else if let Some(text) = render_event(event) {
        write!(out, "{text}")?;
    } else {
        debug!(?event, "Conversation event");
    }
    out.flush()
}

/// Transcript text for an event, or `None` for events that only go to the log.
fn render_event(event: &ConversationEvent) -> Option<String> {
    match event {
        ConversationEvent::Transcribed { text } => Some(format!("you> {text}\n")),
        ConversationEvent::TurnStarted { .. } => Some("odia> ".to_string()),
        ConversationEvent::TextDelta { delta, .. } => Some(delta.clone()),
        ConversationEvent::TurnInterrupted { reason, .. } => {
            Some(format!(" [interrupted: {}]", reason_label(*reason)))
        }
        ConversationEvent::TurnFinished { .. } => Some("\n".to_string()),
        ConversationEvent::Error {
            turn_id: Some(_),
            message,
        } => Some(format!(" [error] {message}")),
        ConversationEvent::Error {
            turn_id: None,
            message,
        } => Some(format!("[error] {message}\n")),
        ConversationEvent::InterruptionUnavailable { reason } => {
            Some(format!("[barge-in unavailable: {reason}]\n"))
        }
        ConversationEvent::ListeningEnded => Some("[microphone closed]\n".to_string()),
        _ => None,
    }
}

const fn reason_label(reason: CancelReason) -> &'static str {
    match reason {
        CancelReason::VoiceActivity => "you started talking",
        CancelReason::UserAction => "stopped",
        CancelReason::Superseded => "new message",
        CancelReason::Shutdown => "shutting down",
    }
}
