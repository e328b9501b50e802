//! Subcommands and their arguments.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use odia_core::{DEFAULT_SYSTEM_PROMPT, DEFAULT_VOICE};
use odia_proxy::ProxyConfig;
use odia_proxy::config::{
    DEFAULT_BIND, DEFAULT_CHAT_MODEL, DEFAULT_CHAT_UPSTREAM, DEFAULT_STT_MODEL,
    DEFAULT_STT_UPSTREAM, DEFAULT_TTS_MODEL,
};

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8787";

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the widget proxy (chat streaming, speech synthesis and recognition, widget config)
    Serve(ServeArgs),

    /// Chat with a running proxy from the terminal
    Chat(ChatArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "ODIA_BIND", default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// OpenAI-compatible chat completions endpoint
    #[arg(long, env = "CHAT_UPSTREAM_URL", default_value = DEFAULT_CHAT_UPSTREAM)]
    pub chat_upstream_url: String,

    #[arg(long, env = "CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    pub chat_model: String,

    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub chat_api_key: Option<String>,

    /// Speech synthesis endpoint; `/v1/tts` answers 503 without it
    #[arg(long, env = "MINIMAX_TTS_URL")]
    pub tts_url: Option<String>,

    #[arg(long, env = "TTS_MODEL", default_value = DEFAULT_TTS_MODEL)]
    pub tts_model: String,

    #[arg(long, env = "MINIMAX_API_KEY", hide_env_values = true)]
    pub tts_api_key: Option<String>,

    /// OpenAI-compatible audio transcription endpoint
    #[arg(long, env = "STT_UPSTREAM_URL", default_value = DEFAULT_STT_UPSTREAM)]
    pub stt_url: String,

    #[arg(long, env = "STT_MODEL", default_value = DEFAULT_STT_MODEL)]
    pub stt_model: String,

    /// Defaults to the chat key
    #[arg(long, env = "STT_API_KEY", hide_env_values = true)]
    pub stt_api_key: Option<String>,

    /// Voice id handed to the widget and used when a request names none
    #[arg(long, env = "DEFAULT_VOICE", default_value = DEFAULT_VOICE)]
    pub voice: String,

    #[arg(long, env = "WIDGET_THEME", default_value = "light")]
    pub theme: String,

    /// Tell widgets not to play replies automatically
    #[arg(long)]
    pub no_auto_play: bool,

    /// Public key widgets must send as `Authorization: Bearer <key>`
    #[arg(long, env = "ODIA_WIDGET_KEY")]
    pub widget_api_key: Option<String>,

    /// Prepended to chat requests without a system message
    #[arg(long, env = "SYSTEM_PROMPT")]
    pub system_prompt: Option<String>,

    #[arg(long, default_value_t = 15_000)]
    pub tts_timeout_ms: u64,
}

impl ServeArgs {
    pub fn into_config(self) -> ProxyConfig {
        ProxyConfig {
            bind: self.bind,
            chat_upstream_url: self.chat_upstream_url,
            chat_model: self.chat_model,
            chat_api_key: self.chat_api_key,
            tts_upstream_url: self.tts_url,
            tts_model: self.tts_model,
            tts_api_key: self.tts_api_key,
            stt_upstream_url: self.stt_url,
            stt_model: self.stt_model,
            stt_api_key: self.stt_api_key,
            default_voice: self.voice,
            auto_play_audio: !self.no_auto_play,
            theme: self.theme,
            widget_api_key: self.widget_api_key,
            system_prompt: self
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            tts_timeout_ms: self.tts_timeout_ms,
            ..ProxyConfig::default()
        }
        .normalized()
    }
}

#[derive(Debug, Clone, Args)]
pub struct ChatArgs {
    /// Base URL of the proxy
    #[arg(long, env = "ODIA_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Widget key, if the proxy requires one
    #[arg(long, env = "ODIA_WIDGET_KEY")]
    pub api_key: Option<String>,

    /// Pipeline configuration (JSON); missing fields take defaults
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Never synthesize or play audio
    #[arg(long)]
    pub text_only: bool,

    /// Open the microphone at start for voice input and barge-in
    #[arg(long)]
    pub listen: bool,

    /// Print every conversation event as a JSON line
    #[arg(long)]
    pub json: bool,
}
