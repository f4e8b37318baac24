//! Stream transport: opens a station's `stream_url` and hands the bytes to
//! Stream Capture (C1, §4.1) as a `symphonia` `MediaSource`.
//!
//! Capture, decoding and the blocking HTTP read all happen on a blocking
//! thread via `spawn_blocking` — symphonia's format readers are synchronous,
//! and ICY streams aren't meaningfully seekable.

use crate::capture::{self, CaptureParams, CaptureResult};
use crate::error::{PipelineError, Result};
use std::io::Read;
use symphonia::core::io::MediaSource;

struct HttpStreamSource {
    response: reqwest::blocking::Response,
}

impl Read for HttpStreamSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.response.read(buf)
    }
}

impl MediaSource for HttpStreamSource {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

/// Connect timeout for opening a station stream (§4.1, §5).
const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Open `stream_url` and capture PCM until a termination condition fires.
pub async fn capture_station(stream_url: String, params: CaptureParams) -> Result<CaptureResult> {
    tokio::task::spawn_blocking(move || capture_station_blocking(&stream_url, params))
        .await
        .map_err(|e| PipelineError::Capture(format!("capture task panicked: {e}")))?
}

fn capture_station_blocking(stream_url: &str, params: CaptureParams) -> Result<CaptureResult> {
    let client = reqwest::blocking::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| PipelineError::Capture(format!("client build failed: {e}")))?;

    let response = client
        .get(stream_url)
        .send()
        .map_err(|e| PipelineError::Capture(format!("connect failed: {e}")))?;

    if !response.status().is_success() {
        return Err(PipelineError::Capture(format!(
            "stream returned status {}",
            response.status()
        )));
    }

    let extension_hint = content_type_extension(response.headers());
    let source: Box<dyn MediaSource> = Box::new(HttpStreamSource { response });

    capture::capture_from_source(source, extension_hint.as_deref(), params)
}

fn content_type_extension(headers: &reqwest::header::HeaderMap) -> Option<String> {
    let content_type = headers.get(reqwest::header::CONTENT_TYPE)?.to_str().ok()?;
    match content_type {
        "audio/mpeg" => Some("mp3".to_string()),
        "audio/aac" | "audio/aacp" => Some("aac".to_string()),
        "audio/ogg" => Some("ogg".to_string()),
        "audio/flac" => Some("flac".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

    #[test]
    fn mp3_content_type_maps_to_mp3_extension() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("audio/mpeg"));
        assert_eq!(content_type_extension(&headers), Some("mp3".to_string()));
    }

    #[test]
    fn unknown_content_type_yields_no_hint() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        assert_eq!(content_type_extension(&headers), None);
    }
}
