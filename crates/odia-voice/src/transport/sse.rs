//! OpenAI-style SSE chat stream → text deltas.
//!
//! Wire format: `data: {"choices":[{"delta":{"content":"hi"}}]}` lines
//! separated by blank lines, ending with `data: [DONE]`. Comment lines
//! (`:`) and unknown fields are ignored. A line that is not valid JSON, an
//! `error` object, or a body that ends before `[DONE]` is a protocol failure.

use std::fmt::Display;

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use odia_core::contracts::http::SSE_DONE;
use odia_core::{DeltaStream, TransportError};
use serde::Deserialize;

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// State threaded through the `unfold` stream.
struct SseState<S> {
    stream: S,
    buf: BytesMut,
    done: bool,
}

/// Parse an SSE byte stream into a [`DeltaStream`].
///
/// Dropping the returned stream drops `byte_stream`, which for a
/// `reqwest` body aborts the request.
pub fn sse_deltas<S, E>(byte_stream: S) -> DeltaStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + 'static,
{
    let state = SseState {
        stream: byte_stream.boxed(),
        buf: BytesMut::new(),
        done: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }

        loop {
            if let Some(line_end) = find_newline(&st.buf) {
                let line = st.buf.split_to(line_end + 1);
                let line = String::from_utf8_lossy(&line);
                match parse_line(line.trim()) {
                    Line::Skip => continue,
                    Line::Done => {
                        st.done = true;
                        return None;
                    }
                    Line::Delta(delta) => return Some((Ok(delta), st)),
                    Line::Invalid(reason) => {
                        st.done = true;
                        return Some((Err(TransportError::Protocol(reason)), st));
                    }
                }
            }

            match st.stream.next().await {
                Some(Ok(chunk)) => st.buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(TransportError::Connect(e.to_string())), st));
                }
                None => {
                    st.done = true;
                    // A final line may arrive without a trailing newline.
                    let tail = String::from_utf8_lossy(&st.buf).trim().to_string();
                    st.buf.clear();
                    return match parse_line(&tail) {
                        Line::Done => None,
                        Line::Delta(delta) => Some((Ok(delta), st)),
                        Line::Invalid(reason) => Some((Err(TransportError::Protocol(reason)), st)),
                        Line::Skip => Some((
                            Err(TransportError::Protocol(
                                "stream ended before [DONE]".to_string(),
                            )),
                            st,
                        )),
                    };
                }
            }
        }
    })
    .boxed()
}

enum Line {
    Skip,
    Done,
    Delta(String),
    Invalid(String),
}

fn parse_line(line: &str) -> Line {
    if line.is_empty() || line.starts_with(':') {
        return Line::Skip;
    }
    let Some(data) = line.strip_prefix("data:") else {
        // event:, id:, retry: fields carry nothing we use.
        return Line::Skip;
    };
    let data = data.trim();
    if data == SSE_DONE {
        return Line::Done;
    }
    match serde_json::from_str::<CompletionChunk>(data) {
        Ok(chunk) => {
            if let Some(error) = chunk.error {
                return Line::Invalid(format!("upstream error: {error}"));
            }
            let content: String = chunk
                .choices
                .into_iter()
                .filter_map(|c| c.delta.content)
                .collect();
            if content.is_empty() {
                Line::Skip
            } else {
                Line::Delta(content)
            }
        }
        Err(e) => Line::Invalid(format!("invalid chunk JSON: {e}")),
    }
}

fn find_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    type Body = stream::Iter<std::vec::IntoIter<Result<Bytes, std::io::Error>>>;

    fn body(parts: &[&str]) -> Body {
        let parts: Vec<Result<Bytes, std::io::Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::from(p.to_string())))
            .collect();
        stream::iter(parts)
    }

    async fn collect(parts: &[&str]) -> Vec<Result<String, TransportError>> {
        sse_deltas(body(parts)).collect().await
    }

    fn chunk(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    #[tokio::test]
    async fn test_parses_deltas_until_done() {
        let a = chunk("Hi");
        let b = chunk(" there.");
        let items = collect(&[&a, &b, "data: [DONE]\n\n"]).await;
        assert_eq!(items, vec![Ok("Hi".to_string()), Ok(" there.".to_string())]);
    }

    #[tokio::test]
    async fn test_lines_split_across_network_chunks() {
        let full = format!("{}{}data: [DONE]\n\n", chunk("Hel"), chunk("lo"));
        let (first, second) = full.split_at(17);
        let items = collect(&[first, second]).await;
        assert_eq!(items, vec![Ok("Hel".to_string()), Ok("lo".to_string())]);
    }

    #[tokio::test]
    async fn test_role_only_and_comment_lines_are_skipped() {
        let role = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n";
        let items = collect(&[": keep-alive\n\n", role, &chunk("ok"), "data: [DONE]\n"]).await;
        assert_eq!(items, vec![Ok("ok".to_string())]);
    }

    #[tokio::test]
    async fn test_malformed_json_is_protocol_error() {
        let items = collect(&[&chunk("a"), "data: {not json\n\n", &chunk("b")]).await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(TransportError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_missing_done_is_protocol_error() {
        let items = collect(&[&chunk("a")]).await;
        assert_eq!(items[0], Ok("a".to_string()));
        assert!(matches!(items[1], Err(TransportError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_done_without_trailing_newline() {
        let items = collect(&[&chunk("a"), "data: [DONE]"]).await;
        assert_eq!(items, vec![Ok("a".to_string())]);
    }

    #[tokio::test]
    async fn test_error_object_is_protocol_error() {
        let items = collect(&["data: {\"error\":{\"message\":\"rate limited\"}}\n\n"]).await;
        assert!(matches!(&items[0], Err(TransportError::Protocol(m)) if m.contains("rate limited")));
    }
}
