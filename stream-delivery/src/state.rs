use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use rtsp_recorder::{Recorder, RecorderCategory, RecorderConfig};

use crate::error::DeliveryError;

/// Rotation interval for live-stream sessions in seconds.
pub const DEFAULT_STREAM_TIME_LIMIT_SECS: u64 = 600;

/// Resolves a camera identifier to its RTSP source URL.
///
/// Stands in for the external secret store that owns camera credentials;
/// implementations live outside this crate.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn source_url(&self, camera: &str) -> Option<String>;
}

/// Shared state for the delivery endpoints.
///
/// Holds the media root, the camera source resolver and the live session
/// registry (session id -> recorder). Each session owns its recorder; the
/// registry is the only place they are tracked.
pub struct DeliveryState {
    media_root: PathBuf,
    time_limit_secs: u64,
    resolver: Arc<dyn SourceResolver>,
    sessions: Mutex<HashMap<Uuid, Recorder>>,
}

impl DeliveryState {
    pub fn new(media_root: PathBuf, resolver: Arc<dyn SourceResolver>) -> Self {
        Self {
            media_root,
            time_limit_secs: DEFAULT_STREAM_TIME_LIMIT_SECS,
            resolver,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_time_limit(mut self, secs: u64) -> Self {
        self.time_limit_secs = secs;
        self
    }

    /// Directory all live-stream session folders live under.
    pub fn stream_root(&self) -> PathBuf {
        self.media_root.join("stream")
    }

    /// Start a stream-mode recorder for a camera and register the session.
    pub async fn start_stream(&self, camera: &str) -> Result<Uuid, DeliveryError> {
        let url = self
            .resolver
            .source_url(camera)
            .await
            .ok_or_else(|| DeliveryError::SourceUnavailable(camera.to_string()))?;

        let config = RecorderConfig::new(&self.media_root)
            .with_source_url(url)
            .with_category(RecorderCategory::Stream)
            .with_time_limit(self.time_limit_secs)
            .with_name(camera)
            .apply_env();
        let recorder = Recorder::new(config);

        let Some(id) = recorder.start().await? else {
            return Err(DeliveryError::StartDeclined);
        };
        tracing::info!("Live stream session {} started for cam: {}", id, camera);
        self.sessions.lock().await.insert(id, recorder);
        Ok(id)
    }

    /// Stop and deregister a session. Returns false when the session is
    /// unknown.
    pub async fn stop_stream(&self, id: &Uuid) -> bool {
        let recorder = self.sessions.lock().await.remove(id);
        match recorder {
            Some(recorder) => {
                recorder.stop().await;
                true
            }
            None => false,
        }
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Map a requested `session`/`file` pair to the on-disk artifact path.
    ///
    /// Both parts come straight from the URL and are treated as opaque
    /// identifiers: anything that could traverse out of the stream root is
    /// rejected before a path is built.
    pub fn artifact_path(&self, session: &str, file: &str) -> Result<PathBuf, DeliveryError> {
        if !is_opaque_name(session) {
            return Err(DeliveryError::InvalidPath(session.to_string()));
        }
        if !is_opaque_name(file) {
            return Err(DeliveryError::InvalidPath(file.to_string()));
        }
        Ok(self.stream_root().join(session).join(file))
    }

    /// Stop every live session and drop the registry.
    pub async fn shutdown(&self) {
        let sessions: Vec<(Uuid, Recorder)> =
            self.sessions.lock().await.drain().collect();
        for (id, recorder) in sessions {
            tracing::info!("Shutting down live stream session {}", id);
            recorder.stop().await;
        }
    }
}

/// A single path component that cannot escape its directory: no
/// separators, no `..`, a conservative character set.
fn is_opaque_name(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 128
        && !s.starts_with('.')
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoCameras;

    #[async_trait]
    impl SourceResolver for NoCameras {
        async fn source_url(&self, _camera: &str) -> Option<String> {
            None
        }
    }

    fn state() -> DeliveryState {
        DeliveryState::new(PathBuf::from("media"), Arc::new(NoCameras))
    }

    #[test]
    fn test_artifact_path_joins_under_stream_root() {
        let state = state();
        let path = state
            .artifact_path("cd1a0e08-9b08-4565-a2b6-a2756cf85e8b", "cam.m3u8")
            .unwrap();
        assert_eq!(
            path,
            PathBuf::from("media/stream/cd1a0e08-9b08-4565-a2b6-a2756cf85e8b/cam.m3u8")
        );

        state.artifact_path("abc", "segment_001.ts").unwrap();
    }

    #[test]
    fn test_artifact_path_rejects_traversal() {
        let state = state();
        for bad in ["..", "../other", "a/b", "a\\b", "", ".hidden", "a\0b"] {
            assert!(
                matches!(
                    state.artifact_path(bad, "cam.m3u8"),
                    Err(DeliveryError::InvalidPath(_))
                ),
                "session {:?} should be rejected",
                bad
            );
            assert!(
                matches!(
                    state.artifact_path("abc", bad),
                    Err(DeliveryError::InvalidPath(_))
                ),
                "file {:?} should be rejected",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_start_stream_without_source_is_bad_gateway() {
        let state = state();
        let err = state.start_stream("garden").await.unwrap_err();
        assert!(matches!(err, DeliveryError::SourceUnavailable(_)));
        assert_eq!(state.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_stop_unknown_session() {
        let state = state();
        assert!(!state.stop_stream(&Uuid::new_v4()).await);
    }
}
