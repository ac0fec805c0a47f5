//! crates/vocab_tutor_core/src/gateway.rs
//!
//! Helpers shared by every `CompletionService`: the in-band error fragment
//! that ends a failed stream, and its detection on the consuming side.

use futures::{future, stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ports::FragmentStream;

/// The payload of a terminal error fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFragment {
    pub error: String,
    pub detail: String,
}

impl ErrorFragment {
    pub fn new(error: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            detail: detail.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::json!({ "error": self.error, "detail": self.detail }).to_string()
    }
}

/// Recognizes a fragment that is, on its own, a JSON object with an `error` key.
///
/// Ordinary fragments are partial tokens and fail to decode; that is the
/// common case and simply yields `None`.
pub fn parse_error_fragment(fragment: &str) -> Option<ErrorFragment> {
    let value: Value = serde_json::from_str(fragment).ok()?;
    let object = value.as_object()?;
    let error = object.get("error")?;
    let error = match error {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let detail = object
        .get("detail")
        .map(|d| match d {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default();
    Some(ErrorFragment { error, detail })
}

/// Turns a fallible upstream chunk stream into a fragment stream.
///
/// Empty chunks are dropped. The first upstream error is converted with
/// `describe` into exactly one error fragment, after which the stream ends.
pub fn terminate_on_error<S, E, F>(upstream: S, describe: F) -> FragmentStream
where
    S: Stream<Item = Result<String, E>> + Send + 'static,
    E: Send + 'static,
    F: Fn(E) -> ErrorFragment + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut upstream = Box::pin(upstream);
        while let Some(item) = upstream.next().await {
            match item {
                Ok(fragment) => {
                    if !fragment.is_empty() {
                        yield fragment;
                    }
                }
                Err(e) => {
                    yield describe(e).to_json();
                    break;
                }
            }
        }
    })
}

/// Waits for the first upstream item before any fragment is handed out.
///
/// An error on the first poll means the call never started (refused
/// connection, bad key, rate limit) and comes back as `Err`. After one chunk
/// has arrived, errors end the stream in-band as in `terminate_on_error`.
pub async fn open_upstream<S, E, F>(upstream: S, describe: F) -> Result<FragmentStream, ErrorFragment>
where
    S: Stream<Item = Result<String, E>> + Send + 'static,
    E: Send + 'static,
    F: Fn(E) -> ErrorFragment + Send + 'static,
{
    let mut upstream = Box::pin(upstream);
    match upstream.next().await {
        None => Ok(Box::pin(stream::empty())),
        Some(Err(e)) => Err(describe(e)),
        Some(Ok(first)) => {
            let replayed = stream::once(future::ready(Ok(first))).chain(upstream);
            Ok(terminate_on_error(replayed, describe))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn test_partial_fragments_are_not_errors() {
        assert_eq!(parse_error_fragment(r#"{"response": "Bon"#), None);
        assert_eq!(parse_error_fragment("jour"), None);
        assert_eq!(parse_error_fragment(""), None);
    }

    #[test]
    fn test_complete_object_without_error_key_is_not_an_error() {
        assert_eq!(parse_error_fragment(r#"{"response":"ok"}"#), None);
        assert_eq!(parse_error_fragment("42"), None);
    }

    #[test]
    fn test_error_fragment_round_trips() {
        let fragment = ErrorFragment::new("OpenAI API Error: RateLimitError", "slow down");
        assert_eq!(parse_error_fragment(&fragment.to_json()), Some(fragment));
    }

    #[test]
    fn test_error_without_detail_is_detected() {
        let parsed = parse_error_fragment(r#"{"error": true}"#).unwrap();
        assert_eq!(parsed.error, "true");
        assert_eq!(parsed.detail, "");
    }

    #[tokio::test]
    async fn test_terminate_on_error_ends_with_one_error_fragment() {
        let upstream = stream::iter(vec![
            Ok("{\"resp".to_string()),
            Ok(String::new()),
            Ok("onse\"".to_string()),
            Err("timeout"),
            Ok("never seen".to_string()),
        ]);
        let fragments: Vec<String> =
            terminate_on_error(upstream, |e| ErrorFragment::new("Timeout", e))
                .collect()
                .await;

        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0], "{\"resp");
        assert_eq!(fragments[1], "onse\"");
        assert_eq!(
            parse_error_fragment(&fragments[2]),
            Some(ErrorFragment::new("Timeout", "timeout"))
        );
    }

    #[tokio::test]
    async fn test_terminate_on_error_passes_clean_stream_through() {
        let upstream = stream::iter(vec![Ok::<_, ()>("a".to_string()), Ok("b".to_string())]);
        let fragments: Vec<String> =
            terminate_on_error(upstream, |_| ErrorFragment::new("x", "y"))
                .collect()
                .await;
        assert_eq!(fragments, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_open_upstream_returns_first_poll_failure() {
        let upstream = stream::iter(vec![Err::<String, _>("401 invalid api key")]);
        let result = open_upstream(upstream, |e| ErrorFragment::new("OpenAI API Error: APIError", e)).await;
        match result {
            Err(fragment) => assert_eq!(fragment.detail, "401 invalid api key"),
            Ok(_) => panic!("first-poll failure was streamed"),
        }
    }

    #[tokio::test]
    async fn test_open_upstream_replays_first_chunk_then_reports_in_band() {
        let upstream = stream::iter(vec![
            Ok(String::new()),
            Ok("{\"response\"".to_string()),
            Err("connection reset"),
        ]);
        let fragments: Vec<String> = open_upstream(upstream, |e| ErrorFragment::new("Timeout", e))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0], "{\"response\"");
        assert_eq!(
            parse_error_fragment(&fragments[1]),
            Some(ErrorFragment::new("Timeout", "connection reset"))
        );
    }

    #[tokio::test]
    async fn test_open_upstream_keeps_first_content_chunk() {
        let upstream = stream::iter(vec![Ok::<_, ()>("Bon".to_string()), Ok("jour".to_string())]);
        let fragments: Vec<String> = open_upstream(upstream, |_| ErrorFragment::new("x", "y"))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(fragments.concat(), "Bonjour");
    }
}
