//! Captioning through a remote vision service.
//!
//! A frame from the middle of the scene is posted as
//! `{"image_base64", "start_time", "end_time"}` and the service answers
//! `{"caption": "..."}`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::{clean_caption, CaptionError, CaptionGenerator};
use crate::media::FfmpegTools;
use crate::segmenter::SceneInterval;

#[derive(Serialize)]
struct CaptionRequest {
    image_base64: String,
    start_time: f64,
    end_time: f64,
}

#[derive(Deserialize)]
struct CaptionResponse {
    caption: Option<String>,
}

pub struct HttpCaptioner {
    client: reqwest::Client,
    endpoint: String,
    tools: FfmpegTools,
}

impl HttpCaptioner {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        tools: FfmpegTools,
    ) -> Result<Self, CaptionError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            tools,
        })
    }
}

#[async_trait]
impl CaptionGenerator for HttpCaptioner {
    async fn caption(&self, video: &Path, interval: SceneInterval) -> Result<String, CaptionError> {
        let frame = self.tools.extract_frame(video, interval.midpoint()).await?;

        let request = CaptionRequest {
            image_base64: base64::engine::general_purpose::STANDARD.encode(&frame),
            start_time: interval.start,
            end_time: interval.end,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CaptionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CaptionResponse = response
            .json()
            .await
            .map_err(|e| CaptionError::MalformedResponse(e.to_string()))?;
        let raw = parsed
            .caption
            .ok_or_else(|| CaptionError::MalformedResponse("missing 'caption' field".to_string()))?;

        clean_caption(&raw, interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = CaptionRequest {
            image_base64: base64::engine::general_purpose::STANDARD.encode(b"jpeg"),
            start_time: 1.5,
            end_time: 4.0,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["image_base64"], "anBlZw==");
        assert_eq!(json["start_time"], 1.5);
        assert_eq!(json["end_time"], 4.0);
    }

    #[tokio::test]
    async fn test_frame_failure_is_reported_before_request() {
        let captioner = HttpCaptioner::new(
            "http://127.0.0.1:9/caption",
            Duration::from_secs(1),
            FfmpegTools::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe"),
        )
        .unwrap();
        let result = captioner
            .caption(Path::new("film.mp4"), SceneInterval::new(0.0, 2.0))
            .await;
        assert!(matches!(result, Err(CaptionError::Media(_))));
    }
}
