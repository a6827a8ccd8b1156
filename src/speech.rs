//! Text-to-speech playback for assistant messages.
//!
//! At most one playback is active. Audio is fetched once per message id,
//! written to the cache directory and memoised for the rest of the session.

use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::sync::oneshot;

use crate::api::ApiClient;
use crate::config::Mode;
use crate::error::ApiError;

/// A started playback. `finished` resolves once when the audio ends on its
/// own; it is dropped without a value when the playback is stopped.
pub struct PlaybackHandle {
    pub stop: oneshot::Sender<()>,
    pub finished: oneshot::Receiver<()>,
}

pub trait AudioPlayer: Send + Sync {
    fn play(&self, path: &Path) -> Result<PlaybackHandle>;
}

/// Plays files through an external command, e.g. `afplay` or `ffplay`.
pub struct ProcessPlayer {
    command: Vec<String>,
}

impl ProcessPlayer {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl AudioPlayer for ProcessPlayer {
    fn play(&self, path: &Path) -> Result<PlaybackHandle> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("no audio player configured"))?;

        let mut child = tokio::process::Command::new(program)
            .args(args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow!("failed to start {}: {}", program, e))?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    match status {
                        Ok(status) if !status.success() => {
                            tracing::warn!(%status, "audio player exited with failure");
                        }
                        Err(e) => tracing::warn!(error = %e, "audio player wait failed"),
                        _ => {}
                    }
                    let _ = done_tx.send(());
                }
                _ = stop_rx => {
                    let _ = child.kill().await;
                }
            }
        });

        Ok(PlaybackHandle {
            stop: stop_tx,
            finished: done_rx,
        })
    }
}

/// What the caller has to do after a toggle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechRequest {
    /// The message was playing and has been stopped
    Stopped,
    /// Mock mode; nothing to do
    Mocked,
    /// Audio is cached, play it
    Play(PathBuf),
    /// Audio has to be fetched first
    Fetch,
}

/// Completion notice for one playback, identified by `token`
pub struct PlaybackWatch {
    pub token: u64,
    pub finished: oneshot::Receiver<()>,
}

struct ActivePlayback {
    token: u64,
    stop: oneshot::Sender<()>,
}

pub struct SpeechController {
    mode: Mode,
    speaking: Option<String>,
    cache: HashMap<String, PathBuf>,
    current: Option<ActivePlayback>,
    next_token: u64,
    /// Message whose audio fetch is the latest request
    pending: Option<String>,
}

impl SpeechController {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            speaking: None,
            cache: HashMap::new(),
            current: None,
            next_token: 0,
            pending: None,
        }
    }

    pub fn speaking(&self) -> Option<&str> {
        self.speaking.as_deref()
    }

    pub fn is_speaking(&self, id: &str) -> bool {
        self.speaking.as_deref() == Some(id)
    }

    #[cfg(test)]
    pub fn cached(&self, id: &str) -> Option<&Path> {
        self.cache.get(id).map(PathBuf::as_path)
    }

    pub fn toggle(&mut self, id: &str, text: &str) -> SpeechRequest {
        if self.is_speaking(id) {
            self.stop();
            self.pending = None;
            return SpeechRequest::Stopped;
        }

        if self.mode.is_mock() {
            let preview: String = text.chars().take(80).collect();
            tracing::info!(id, %preview, len = text.chars().count(), "speech requested (mock)");
            return SpeechRequest::Mocked;
        }

        self.stop();
        match self.cache.get(id) {
            Some(path) => {
                self.pending = None;
                SpeechRequest::Play(path.clone())
            }
            None => {
                self.pending = Some(id.to_string());
                SpeechRequest::Fetch
            }
        }
    }

    /// Record the result of a fetch. Returns the path to play only when `id`
    /// is still the latest speech request; a superseded fetch is cached and
    /// otherwise dropped.
    pub fn fetched(&mut self, id: &str, result: Result<PathBuf, ApiError>) -> Option<PathBuf> {
        let latest = self.pending.as_deref() == Some(id);
        if latest {
            self.pending = None;
        }

        match result {
            Ok(path) => {
                tracing::info!(id, path = %path.display(), "speech audio cached");
                let path = self.cache.entry(id.to_string()).or_insert(path).clone();
                if latest {
                    Some(path)
                } else {
                    tracing::debug!(id, "superseded speech fetch, not playing");
                    None
                }
            }
            Err(e) => {
                tracing::warn!(id, error = %e, "speech fetch failed");
                None
            }
        }
    }

    /// Start playing `path` for message `id`, replacing whatever was playing.
    pub fn play(&mut self, id: &str, path: &Path, player: &dyn AudioPlayer) -> Option<PlaybackWatch> {
        self.stop();
        match player.play(path) {
            Ok(handle) => {
                self.next_token += 1;
                let token = self.next_token;
                self.current = Some(ActivePlayback {
                    token,
                    stop: handle.stop,
                });
                self.speaking = Some(id.to_string());
                tracing::info!(id, path = %path.display(), "playing speech");
                Some(PlaybackWatch {
                    token,
                    finished: handle.finished,
                })
            }
            Err(e) => {
                tracing::warn!(id, error = %e, "speech playback failed");
                None
            }
        }
    }

    /// Playback `token` reached its end. Stale notices are ignored.
    pub fn finished(&mut self, token: u64) {
        if self.current.as_ref().map(|p| p.token) == Some(token) {
            tracing::info!("speech finished");
            self.stop();
        }
    }

    /// Safe to call when nothing is playing.
    pub fn stop(&mut self) {
        if let Some(active) = self.current.take() {
            tracing::info!("stopping speech playback");
            let _ = active.stop.send(());
        }
        self.speaking = None;
    }
}

/// Location of the cached audio for a message id.
pub fn cache_path(cache_dir: &Path, id: &str) -> PathBuf {
    let safe: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    cache_dir.join(format!("tts-{}.mp3", safe))
}

/// Download the audio for `text` and write it into the cache directory.
pub async fn fetch_to_cache(
    api: &ApiClient,
    cache_dir: &Path,
    id: &str,
    text: &str,
) -> Result<PathBuf, ApiError> {
    let audio = api.tts(text).await?;
    tokio::fs::create_dir_all(cache_dir).await?;
    let path = cache_path(cache_dir, id);
    tokio::fs::write(&path, &audio).await?;
    tracing::debug!(bytes = audio.len(), path = %path.display(), "speech audio saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakePlayer {
        played: Mutex<Vec<PathBuf>>,
        stops: Mutex<Vec<oneshot::Receiver<()>>>,
        finishers: Mutex<Vec<oneshot::Sender<()>>>,
        fail: bool,
    }

    impl AudioPlayer for FakePlayer {
        fn play(&self, path: &Path) -> Result<PlaybackHandle> {
            if self.fail {
                return Err(anyhow!("no audio device"));
            }
            let (stop, stop_rx) = oneshot::channel();
            let (done_tx, finished) = oneshot::channel();
            self.played.lock().unwrap().push(path.to_path_buf());
            self.stops.lock().unwrap().push(stop_rx);
            self.finishers.lock().unwrap().push(done_tx);
            Ok(PlaybackHandle { stop, finished })
        }
    }

    fn live_with_cached(id: &str) -> SpeechController {
        let mut speech = SpeechController::new(Mode::Live);
        assert_eq!(speech.toggle(id, "text"), SpeechRequest::Fetch);
        speech.fetched(id, Ok(PathBuf::from(format!("/tmp/tts-{id}.mp3"))));
        speech
    }

    #[test]
    fn toggling_same_message_twice_ends_silent() {
        let player = FakePlayer::default();
        let mut speech = live_with_cached("m1");

        let SpeechRequest::Play(path) = speech.toggle("m1", "text") else {
            panic!("expected cached playback");
        };
        speech.play("m1", &path, &player).unwrap();
        assert!(speech.is_speaking("m1"));

        assert_eq!(speech.toggle("m1", "text"), SpeechRequest::Stopped);
        assert_eq!(speech.speaking(), None);
        let mut stops = player.stops.lock().unwrap();
        assert!(stops[0].try_recv().is_ok());
    }

    #[test]
    fn other_message_stops_current_first() {
        let player = FakePlayer::default();
        let mut speech = live_with_cached("a");
        speech.play("a", Path::new("/tmp/a.mp3"), &player).unwrap();

        assert_eq!(speech.toggle("b", "other"), SpeechRequest::Fetch);
        assert_eq!(speech.speaking(), None);
        assert!(player.stops.lock().unwrap()[0].try_recv().is_ok());

        let path = speech.fetched("b", Ok(PathBuf::from("/tmp/b.mp3"))).unwrap();
        speech.play("b", &path, &player).unwrap();
        assert!(speech.is_speaking("b"));
        assert_eq!(player.played.lock().unwrap().len(), 2);
    }

    #[test]
    fn cache_hit_skips_fetch() {
        let mut speech = live_with_cached("m1");
        assert_eq!(
            speech.toggle("m1", "text"),
            SpeechRequest::Play(PathBuf::from("/tmp/tts-m1.mp3"))
        );
        assert_eq!(speech.cached("m1"), Some(Path::new("/tmp/tts-m1.mp3")));
    }

    #[test]
    fn cache_entry_is_written_once() {
        let mut speech = live_with_cached("m1");
        assert!(speech.fetched("m1", Ok(PathBuf::from("/elsewhere.mp3"))).is_none());
        assert_eq!(speech.cached("m1"), Some(Path::new("/tmp/tts-m1.mp3")));
    }

    #[test]
    fn late_fetch_for_earlier_message_does_not_play() {
        let player = FakePlayer::default();
        let mut speech = live_with_cached("b");

        assert_eq!(speech.toggle("a", "first"), SpeechRequest::Fetch);
        let SpeechRequest::Play(path) = speech.toggle("b", "second") else {
            panic!("expected cached playback");
        };
        speech.play("b", &path, &player).unwrap();

        assert!(speech.fetched("a", Ok(PathBuf::from("/tmp/tts-a.mp3"))).is_none());
        assert!(speech.is_speaking("b"));
        assert_eq!(speech.cached("a"), Some(Path::new("/tmp/tts-a.mp3")));

        assert!(speech.fetched("a", Err(ApiError::Status(500))).is_none());
        assert!(speech.is_speaking("b"));
    }

    #[test]
    fn mock_mode_does_nothing() {
        let mut speech = SpeechController::new(Mode::Mock);
        assert_eq!(speech.toggle("m1", "text"), SpeechRequest::Mocked);
        assert_eq!(speech.toggle("m1", "text"), SpeechRequest::Mocked);
        assert_eq!(speech.speaking(), None);
        assert!(speech.cached("m1").is_none());
    }

    #[test]
    fn completion_clears_marker_and_stale_tokens_are_ignored() {
        let player = FakePlayer::default();
        let mut speech = live_with_cached("a");
        let first = speech.play("a", Path::new("/tmp/a.mp3"), &player).unwrap();
        let second = speech.play("a", Path::new("/tmp/a.mp3"), &player).unwrap();

        speech.finished(first.token);
        assert!(speech.is_speaking("a"));

        speech.finished(second.token);
        assert_eq!(speech.speaking(), None);
    }

    #[test]
    fn failures_clear_marker() {
        let ok = FakePlayer::default();
        let mut speech = live_with_cached("a");
        speech.play("a", Path::new("/tmp/a.mp3"), &ok).unwrap();

        assert_eq!(speech.toggle("b", "b"), SpeechRequest::Fetch);
        assert!(speech.fetched("b", Err(ApiError::Status(500))).is_none());
        assert_eq!(speech.speaking(), None);
        assert!(speech.cached("b").is_none());

        let broken = FakePlayer { fail: true, ..Default::default() };
        assert!(speech.play("a", Path::new("/tmp/a.mp3"), &broken).is_none());
        assert_eq!(speech.speaking(), None);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut speech = SpeechController::new(Mode::Live);
        speech.stop();
        speech.stop();
        assert_eq!(speech.speaking(), None);
    }

    #[test]
    fn cache_path_is_deterministic_and_safe() {
        let dir = Path::new("/cache");
        assert_eq!(cache_path(dir, "1712"), PathBuf::from("/cache/tts-1712.mp3"));
        assert_eq!(cache_path(dir, "../x"), PathBuf::from("/cache/tts-___x.mp3"));
    }

    #[tokio::test]
    async fn fetch_writes_audio_into_cache_dir() {
        use crate::session::MemoryTokenStore;
        use axum::{routing::post, Router};
        use std::sync::Arc;

        let router = Router::new().route("/tts", post(|| async { vec![0x49u8, 0x44, 0x33] }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let api = ApiClient::new(&format!("http://{}", addr), Arc::new(MemoryTokenStore::new()));
        let path = fetch_to_cache(&api, &dir.path().join("audio"), "42", "hello").await.unwrap();

        assert_eq!(path, dir.path().join("audio").join("tts-42.mp3"));
        assert_eq!(std::fs::read(&path).unwrap(), b"ID3".to_vec());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_player_reports_completion() {
        let player = ProcessPlayer::new(vec!["true".to_string()]);
        let handle = player.play(Path::new("/dev/null")).unwrap();
        let done = tokio::time::timeout(std::time::Duration::from_secs(5), handle.finished).await;
        assert!(matches!(done, Ok(Ok(()))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_player_stop_drops_completion() {
        let player = ProcessPlayer::new(vec!["sh".into(), "-c".into(), "sleep 5".into()]);
        let handle = player.play(Path::new("/dev/null")).unwrap();
        handle.stop.send(()).unwrap();
        let done = tokio::time::timeout(std::time::Duration::from_secs(5), handle.finished).await;
        assert!(matches!(done, Ok(Err(_))));
    }

    #[test]
    fn empty_player_command_is_an_error() {
        let player = ProcessPlayer::new(Vec::new());
        assert!(player.play(Path::new("/dev/null")).is_err());
    }
}
