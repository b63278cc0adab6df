//! Source video download over HTTP(S).
//!
//! The source is streamed to a file inside the job's working directory and
//! probed for its duration. Only `http` and `https` sources are fetched.

use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use vcut_models::settings::SOURCE_SCHEMES;

use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video, VideoInfo};

/// Extension used when neither the name nor the URL carries one.
const DEFAULT_EXTENSION: &str = "webm";

/// A downloaded source video.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedVideo {
    pub path: PathBuf,
    pub duration: Duration,
}

/// Download `url` into `dir` and probe its duration.
///
/// Any failure, including an unprobeable file, is a download failure.
pub async fn download_video(
    client: &reqwest::Client,
    url: &str,
    video_name: &str,
    dir: &Path,
) -> MediaResult<DownloadedVideo> {
    let path = dir.join(source_file_name(url, video_name));

    let bytes = fetch_to_file(client, url, &path).await?;

    let not_a_video = |e: MediaError| MediaError::download_failed(format!("downloaded file is not a video: {e}"));
    let info: VideoInfo = probe_video(&path).await.map_err(not_a_video)?;
    let duration = info.playback_duration().map_err(not_a_video)?;
    info!(
        output = %path.display(),
        size_mb = bytes as f64 / (1024.0 * 1024.0),
        duration_secs = info.duration,
        width = info.width,
        height = info.height,
        fps = info.fps,
        codec = %info.codec,
        has_audio = info.has_audio,
        "Downloaded source video"
    );

    Ok(DownloadedVideo { path, duration })
}

/// Stream the body of `url` into `path`, returning the number of bytes written.
pub async fn fetch_to_file(client: &reqwest::Client, url: &str, path: &Path) -> MediaResult<u64> {
    let parsed = Url::parse(url)
        .map_err(|e| MediaError::download_failed(format!("invalid source url {url}: {e}")))?;

    if !SOURCE_SCHEMES.contains(&parsed.scheme()) {
        return Err(MediaError::download_failed(format!(
            "unsupported source scheme {} in {url}",
            parsed.scheme()
        )));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    debug!("Fetching {} to {}", url, path.display());
    let response = client.get(parsed).send().await?;
    if !response.status().is_success() {
        return Err(MediaError::download_failed(format!(
            "HTTP {} fetching {}",
            response.status(),
            url
        )));
    }

    let mut file = fs::File::create(path).await?;
    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    if written == 0 {
        return Err(MediaError::download_failed(format!("empty response body from {url}")));
    }

    Ok(written)
}

/// File name for the downloaded source: `source.<ext>`.
///
/// The extension comes from the display name, then the URL path.
pub fn source_file_name(url: &str, video_name: &str) -> String {
    let from_url = Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments().and_then(|mut s| s.next_back().map(str::to_string)));

    let extension = [Some(video_name.to_string()), from_url]
        .into_iter()
        .flatten()
        .find_map(|name| extension_of(&name))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());

    format!("source.{extension}")
}

fn extension_of(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    let valid = !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then_some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_source_file_name() {
        assert_eq!(source_file_name("https://x.org/a/Clip.OGV", "My clip.webm"), "source.webm");
        assert_eq!(source_file_name("https://x.org/a/Clip.OGV", "My clip"), "source.ogv");
        assert_eq!(source_file_name("https://x.org/download?id=3", ""), "source.webm");
        assert_eq!(source_file_name("not a url", "weird.name with space"), "source.webm");
    }

    #[tokio::test]
    async fn test_fetch_streams_body_to_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/clip.webm"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("job").join("source.webm");
        let url = format!("{}/files/clip.webm", server.uri());

        let written = fetch_to_file(&reqwest::Client::new(), &url, &target).await.unwrap();

        assert_eq!(written, 4096);
        assert_eq!(fs::read(&target).await.unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn test_fetch_http_error_is_download_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let url = format!("{}/missing.webm", server.uri());
        let err = fetch_to_file(&reqwest::Client::new(), &url, &dir.path().join("s.webm"))
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::DownloadFailed { .. }));
    }

    #[tokio::test]
    async fn test_fetch_refuses_file_urls() {
        let dir = TempDir::new().unwrap();
        let other_job = dir.path().join("other-job-03-convert-0.webm");
        fs::write(&other_job, b"other job artifact").await.unwrap();
        let url = Url::from_file_path(&other_job).unwrap().to_string();

        let target = dir.path().join("job").join("source.webm");
        let err = fetch_to_file(&reqwest::Client::new(), &url, &target)
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::DownloadFailed { .. }));
        assert!(!fs::try_exists(&target).await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_rejects_invalid_url() {
        let dir = TempDir::new().unwrap();
        let err = fetch_to_file(&reqwest::Client::new(), "::nope::", &dir.path().join("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::DownloadFailed { .. }));
    }
}
