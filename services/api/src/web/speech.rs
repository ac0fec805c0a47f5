//! services/api/src/web/speech.rs
//!
//! Pronunciation audio for single words, synthesized once and then served
//! from an on-disk cache.

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::header::CONTENT_TYPE,
    response::IntoResponse,
};
use bytes::Bytes;
use regex::Regex;
use tracing::{debug, info};
use vocab_tutor_core::ports::TextToSpeechService;

use crate::error::ApiError;
use crate::web::state::AppState;

pub struct SpeechCache {
    dir: PathBuf,
    tts: Arc<dyn TextToSpeechService>,
    word_pattern: Regex,
}

impl SpeechCache {
    /// Creates the cache, making sure its directory exists.
    pub async fn new(dir: PathBuf, tts: Arc<dyn TextToSpeechService>) -> Result<Self, ApiError> {
        tokio::fs::create_dir_all(&dir).await?;
        let word_pattern = Regex::new(r"^[\p{L}\p{M}' -]+$")
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        Ok(Self {
            dir,
            tts,
            word_pattern,
        })
    }

    pub fn dir(&self) -> &FsPath {
        &self.dir
    }

    /// Lowercases `word` and checks it is safe to speak and to use as a file name.
    pub fn normalize(&self, word: &str) -> Result<String, ApiError> {
        let word = word.trim().to_lowercase();
        if word.is_empty() {
            return Err(ApiError::BadRequest("Word is required.".to_string()));
        }
        if !self.word_pattern.is_match(&word) {
            return Err(ApiError::BadRequest(format!(
                "'{}' is not a single word or phrase",
                word
            )));
        }
        Ok(word)
    }

    pub fn path_for(&self, word: &str) -> PathBuf {
        self.dir.join(format!("{}_en.mp3", word))
    }

    /// Returns MP3 audio for an already normalized word.
    pub async fn audio_for(&self, word: &str) -> Result<Vec<u8>, ApiError> {
        let path = self.path_for(word);
        match tokio::fs::read(&path).await {
            Ok(audio) => {
                debug!(%word, "Serving cached speech.");
                return Ok(audio);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let audio = self.tts.generate_audio(word).await?;
        tokio::fs::write(&path, &audio).await?;
        info!(%word, path = %path.display(), "Speech synthesized and cached.");
        Ok(audio)
    }
}

/// Pronunciation audio for a word.
#[utoipa::path(
    get,
    path = "/speech/{word}",
    params(("word" = String, Path, description = "The word to pronounce.")),
    responses(
        (status = 200, description = "MP3 audio of the word", content_type = "audio/mpeg"),
        (status = 400, description = "Empty or invalid word", body = crate::web::protocol::ErrorResponse),
        (status = 500, description = "Speech synthesis failed", body = crate::web::protocol::ErrorResponse)
    )
)]
pub async fn speech_handler(
    State(app_state): State<Arc<AppState>>,
    Path(word): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let word = app_state.speech.normalize(&word)?;
    let audio = app_state.speech.audio_for(&word).await?;
    Ok(([(CONTENT_TYPE, "audio/mpeg")], Bytes::from(audio)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vocab_tutor_core::ports::{PortError, PortResult};

    #[derive(Default)]
    struct CountingTts {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl TextToSpeechService for CountingTts {
        async fn generate_audio(&self, text: &str) -> PortResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PortError::Unexpected("speech engine offline".into()));
            }
            Ok(format!("mp3:{}", text).into_bytes())
        }
    }

    async fn cache(tts: Arc<CountingTts>) -> (tempfile::TempDir, SpeechCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = SpeechCache::new(dir.path().join("audio"), tts).await.unwrap();
        (dir, cache)
    }

    #[tokio::test]
    async fn test_normalize_lowercases_and_validates() {
        let (_dir, cache) = cache(Arc::new(CountingTts::default())).await;
        assert_eq!(cache.normalize("Baguette").unwrap(), "baguette");
        assert_eq!(cache.normalize("pomme de terre").unwrap(), "pomme de terre");
        assert_eq!(cache.normalize("aujourd'hui").unwrap(), "aujourd'hui");
        assert_eq!(cache.normalize("Ñandú").unwrap(), "ñandú");
        assert!(matches!(cache.normalize(""), Err(ApiError::BadRequest(_))));
        assert!(matches!(cache.normalize("../etc/passwd"), Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_audio_is_synthesized_once_then_cached() {
        let tts = Arc::new(CountingTts::default());
        let (_dir, cache) = cache(tts.clone()).await;

        let first = cache.audio_for("baguette").await.unwrap();
        let second = cache.audio_for("baguette").await.unwrap();

        assert_eq!(first, b"mp3:baguette".to_vec());
        assert_eq!(first, second);
        assert_eq!(tts.calls.load(Ordering::SeqCst), 1);
        assert!(cache.path_for("baguette").ends_with("baguette_en.mp3"));
        assert!(cache.path_for("baguette").exists());
    }

    #[tokio::test]
    async fn test_synthesis_failure_writes_nothing() {
        let tts = Arc::new(CountingTts {
            fail: true,
            ..Default::default()
        });
        let (_dir, cache) = cache(tts).await;

        let err = cache.audio_for("baguette").await.unwrap_err();

        assert!(matches!(err, ApiError::Port(PortError::Unexpected(_))));
        assert!(!cache.path_for("baguette").exists());
        assert!(cache.dir().exists());
    }
}
