//! HTTP detector client.
//!
//! Works against both the hosted service and an on-prem edge endpoint; only
//! the base URL and auth differ.

use anyhow::Context;
use image::codecs::jpeg::JpegEncoder;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::camera::Frame;
use crate::error::{MonitorError, MonitorResult};
use crate::settings::Settings;

use super::{Detection, Detector, Label, PendingQuery};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Deserialize)]
struct ImageQueryResponse {
    id: String,
    #[serde(default)]
    result: Option<ResultPayload>,
}

#[derive(Debug, Deserialize)]
struct ResultPayload {
    label: String,
    #[serde(default)]
    confidence: Option<f32>,
}

#[derive(Clone)]
pub struct HttpDetector {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
    detector_name: String,
    query: String,
    confidence_threshold: f32,
}

impl HttpDetector {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        // Per-request ceiling; the overall await budget is enforced by polling.
        let client = reqwest::Client::builder()
            .timeout(settings.inference_timeout())
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.endpoint.url().trim_end_matches('/').to_string(),
            api_token: settings.endpoint.api_token().map(String::from),
            detector_name: settings.ml.detector_name.clone(),
            query: settings.ml.query.clone(),
            confidence_threshold: settings.ml.confidence_threshold,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch(&self, id: &str) -> MonitorResult<ImageQueryResponse> {
        let url = format!("{}/v1/image-queries/{}", self.base_url, id);
        let resp = self.authorize(self.client.get(&url)).send().await?;
        parse_response(resp).await
    }

    fn classify(&self, id: &str, payload: &ResultPayload) -> (Detection, bool) {
        classify(id, payload, self.confidence_threshold)
    }
}

impl Detector for HttpDetector {
    async fn submit(&self, region: Frame) -> MonitorResult<PendingQuery> {
        let jpeg = tokio::task::spawn_blocking(move || encode_jpeg(&region))
            .await
            .map_err(|err| MonitorError::Transport(format!("jpeg encoder join failed: {err}")))??;

        let url = format!("{}/v1/image-queries", self.base_url);
        let request = self
            .client
            .post(&url)
            .query(&[
                ("detector_id", self.detector_name.as_str()),
                ("query", self.query.as_str()),
                ("wait", "0"),
            ])
            .header(CONTENT_TYPE, "image/jpeg")
            .body(jpeg);

        let resp = self.authorize(request).send().await?;
        let body = parse_response(resp).await?;

        let early = body.result.as_ref().and_then(|payload| {
            let (detection, confident) = self.classify(&body.id, payload);
            confident.then_some(detection)
        });

        Ok(PendingQuery { id: body.id, early })
    }

    async fn wait_for_result(
        &self,
        query: PendingQuery,
        timeout: Duration,
    ) -> MonitorResult<Detection> {
        if let Some(detection) = query.early {
            return Ok(detection);
        }

        let deadline = Instant::now() + timeout;

        loop {
            let body = self.fetch(&query.id).await?;
            if let Some(payload) = body.result.as_ref() {
                let (detection, confident) = self.classify(&query.id, payload);
                if confident {
                    return Ok(detection);
                }
            }

            // Sub-threshold answers are not results; the side is skipped.
            let now = Instant::now();
            if now >= deadline {
                return Err(MonitorError::InferenceTimeout(timeout));
            }

            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

async fn parse_response(resp: reqwest::Response) -> MonitorResult<ImageQueryResponse> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(MonitorError::Transport(format!(
            "detector returned {status}: {body}"
        )));
    }

    resp.json::<ImageQueryResponse>().await.map_err(MonitorError::from)
}

/// Returns the detection and whether it met the confidence threshold.
/// Sub-threshold answers are downgraded to [`Label::Unclear`].
fn classify(id: &str, payload: &ResultPayload, threshold: f32) -> (Detection, bool) {
    let label = Label::parse(&payload.label);
    // Missing confidence means the answer came from a reviewer, not the model.
    let confident = payload.confidence.map(|c| c >= threshold).unwrap_or(true);

    let detection = Detection {
        query_id: id.to_string(),
        label: if confident { label } else { Label::Unclear },
        confidence: payload.confidence,
    };

    (detection, confident && label != Label::Unclear)
}

fn encode_jpeg(region: &Frame) -> MonitorResult<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)
        .encode_image(region)
        .map_err(|err| MonitorError::Transport(format!("jpeg encoding failed: {err}")))?;
    Ok(buf)
}
