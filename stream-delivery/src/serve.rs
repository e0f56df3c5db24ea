//! Artifact serving: content negotiation and file streaming.

use std::path::Path;

use async_compression::tokio::bufread::GzipEncoder;
use axum::body::Body;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use tokio::io::BufReader;
use tokio_util::io::ReaderStream;

use crate::error::DeliveryError;

/// HLS manifest content type.
pub const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
/// Transport-stream segment content type.
pub const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

/// Content type by extension: `.ts` is a segment, everything else is
/// treated as the manifest.
pub fn content_type_for(path: &Path) -> &'static str {
    let is_segment = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("ts"))
        .unwrap_or(false);
    if is_segment {
        SEGMENT_CONTENT_TYPE
    } else {
        MANIFEST_CONTENT_TYPE
    }
}

/// Whether the request accepts a gzip transfer encoding.
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .any(|enc| enc.trim().split(';').next().map(str::trim) == Some("gzip"))
        })
        .unwrap_or(false)
}

/// Stream an artifact's bytes to the client.
///
/// Fails with [`DeliveryError::ArtifactNotFound`] when the file does not
/// exist yet - the usual race right after a session starts, before the
/// encoder has written anything. Manifests are piped through a gzip
/// transform when the client accepts it; segments are already compressed
/// media and go out as-is.
pub async fn serve_artifact(path: &Path, accepts_gzip: bool) -> Result<Response, DeliveryError> {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(DeliveryError::ArtifactNotFound(
                path.display().to_string(),
            ));
        }
        Err(err) => return Err(err.into()),
    };

    let content_type = content_type_for(path);
    if content_type == MANIFEST_CONTENT_TYPE && accepts_gzip {
        let encoder = GzipEncoder::new(BufReader::new(file));
        let body = Body::from_stream(ReaderStream::new(encoder));
        Ok((
            [
                (header::CONTENT_TYPE, MANIFEST_CONTENT_TYPE),
                (header::CONTENT_ENCODING, "gzip"),
            ],
            body,
        )
            .into_response())
    } else {
        let body = Body::from_stream(ReaderStream::new(file));
        Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_compression::tokio::bufread::GzipDecoder;
    use axum::http::HeaderValue;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_content_type_by_extension() {
        assert_eq!(
            content_type_for(Path::new("a/segment_001.ts")),
            SEGMENT_CONTENT_TYPE
        );
        assert_eq!(
            content_type_for(Path::new("a/cam.m3u8")),
            MANIFEST_CONTENT_TYPE
        );
        // Unknown extensions serve as manifest, matching the delivery
        // contract of "ts or not-ts"
        assert_eq!(content_type_for(Path::new("a/cam")), MANIFEST_CONTENT_TYPE);
    }

    #[test]
    fn test_accepts_gzip_header_parsing() {
        let mut headers = HeaderMap::new();
        assert!(!accepts_gzip(&headers));

        headers.insert(
            header::ACCEPT_ENCODING,
            HeaderValue::from_static("gzip, deflate, br"),
        );
        assert!(accepts_gzip(&headers));

        headers.insert(
            header::ACCEPT_ENCODING,
            HeaderValue::from_static("deflate;q=1.0, gzip;q=0.5"),
        );
        assert!(accepts_gzip(&headers));

        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("br"));
        assert!(!accepts_gzip(&headers));
    }

    async fn body_bytes(resp: Response) -> Vec<u8> {
        axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_missing_artifact_is_not_found() {
        let err = serve_artifact(&PathBuf::from("/nonexistent/cam.m3u8"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::ArtifactNotFound(_)));
    }

    #[tokio::test]
    async fn test_manifest_is_served_plain() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("cam.m3u8");
        tokio::fs::write(&manifest, "#EXTM3U\n#EXT-X-VERSION:3\n")
            .await
            .unwrap();

        let resp = serve_artifact(&manifest, false).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            MANIFEST_CONTENT_TYPE
        );
        assert!(resp.headers().get(header::CONTENT_ENCODING).is_none());
        assert_eq!(body_bytes(resp).await, b"#EXTM3U\n#EXT-X-VERSION:3\n");
    }

    #[tokio::test]
    async fn test_manifest_gzip_round_trip() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("cam.m3u8");
        let content = "#EXTM3U\n#EXT-X-TARGETDURATION:3\nsegment_000.ts\n";
        tokio::fs::write(&manifest, content).await.unwrap();

        let resp = serve_artifact(&manifest, true).await.unwrap();
        assert_eq!(
            resp.headers().get(header::CONTENT_ENCODING).unwrap(),
            "gzip"
        );

        let compressed = body_bytes(resp).await;
        let mut decoder = GzipDecoder::new(&compressed[..]);
        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded).await.unwrap();
        assert_eq!(decoded, content.as_bytes());
    }

    #[tokio::test]
    async fn test_segments_are_never_compressed() {
        let dir = TempDir::new().unwrap();
        let segment = dir.path().join("segment_000.ts");
        tokio::fs::write(&segment, vec![0u8; 188]).await.unwrap();

        let resp = serve_artifact(&segment, true).await.unwrap();
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            SEGMENT_CONTENT_TYPE
        );
        assert!(resp.headers().get(header::CONTENT_ENCODING).is_none());
        assert_eq!(body_bytes(resp).await.len(), 188);
    }
}
