use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use super::{GenerateRequest, GeneratedImage, ImageProvider};
use crate::{response_json_or_error, truncate_text};

pub const DEFAULT_REPLICATE_API_BASE: &str = "https://api.replicate.com/v1";
pub const DEFAULT_REPLICATE_MODEL: &str = "recraft-ai/recraft-v3";

/// Longest a `Prefer: wait` create call may hold the connection open.
const PREFER_WAIT_WINDOW: Duration = Duration::from_secs(60);
const REQUEST_HEADROOM: Duration = Duration::from_secs(15);

/// Connection settings for Replicate. Built once by the caller and handed to
/// the provider; the provider never reads the process environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicateConfig {
    pub api_base: String,
    pub api_token: Option<String>,
    pub model: String,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_REPLICATE_API_BASE.to_string(),
            api_token: None,
            model: DEFAULT_REPLICATE_MODEL.to_string(),
            poll_interval: Duration::from_secs(1),
            poll_timeout: Duration::from_secs(120),
        }
    }
}

impl ReplicateConfig {
    /// Builds a config from a key lookup (process env, dotenv map, ...).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();
        let seconds = |key: &str, default: Duration, min: f64, max: f64| {
            non_empty(key)
                .and_then(|value| value.parse::<f64>().ok())
                .map(|value| Duration::from_secs_f64(value.clamp(min, max)))
                .unwrap_or(default)
        };
        Self {
            api_base: non_empty("REPLICATE_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            api_token: non_empty("REPLICATE_API_TOKEN").or_else(|| non_empty("REPLICATE_API_KEY")),
            model: non_empty("IMAGEBATCH_REPLICATE_MODEL").unwrap_or(defaults.model),
            poll_interval: seconds(
                "IMAGEBATCH_POLL_INTERVAL",
                defaults.poll_interval,
                0.2,
                5.0,
            ),
            poll_timeout: seconds(
                "IMAGEBATCH_POLL_TIMEOUT",
                defaults.poll_timeout,
                10.0,
                600.0,
            ),
        }
    }

    pub fn has_token(&self) -> bool {
        self.api_token.is_some()
    }

    /// Per-request HTTP timeout. Never shorter than the sync wait window.
    pub fn request_timeout(&self) -> Duration {
        self.poll_timeout.max(PREFER_WAIT_WINDOW + REQUEST_HEADROOM)
    }
}

pub struct ReplicateProvider {
    config: ReplicateConfig,
    http: HttpClient,
}

impl ReplicateProvider {
    pub fn new(config: ReplicateConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    pub fn config(&self) -> &ReplicateConfig {
        &self.config
    }

    /// `owner/name` goes through the model endpoint, `owner/name:version`
    /// through the versioned predictions endpoint.
    fn prediction_target(&self, input: Value) -> (String, Value) {
        let model = self.config.model.trim();
        if let Some((_, version)) = model.split_once(':') {
            return (
                format!("{}/predictions", self.config.api_base),
                json!({ "version": version, "input": input }),
            );
        }
        (
            format!("{}/models/{}/predictions", self.config.api_base, model),
            json!({ "input": input }),
        )
    }

    fn poll_prediction(&self, poll_url: &str, api_token: &str) -> Result<Value> {
        let started = Instant::now();
        loop {
            let response = self
                .http
                .get(poll_url)
                .timeout(self.config.request_timeout())
                .bearer_auth(api_token)
                .send()
                .with_context(|| format!("Replicate poll request failed ({poll_url})"))?;
            let payload = response_json_or_error("Replicate poll", response)?;
            match prediction_status(&payload).as_str() {
                "succeeded" => return Ok(payload),
                "failed" | "canceled" => bail!("Replicate prediction failed: {}", payload),
                _ => {}
            }
            if started.elapsed() >= self.config.poll_timeout {
                bail!(
                    "Replicate polling timed out after {:.1}s",
                    self.config.poll_timeout.as_secs_f64()
                );
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    fn fetch_output(&self, output: &str) -> Result<GeneratedImage> {
        if let Some(image) = decode_data_url(output)? {
            return Ok(image);
        }
        let response = self
            .http
            .get(output)
            .timeout(self.config.request_timeout())
            .send()
            .with_context(|| format!("failed downloading Replicate image ({output})"))?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            bail!(
                "Replicate image download failed ({code}): {}",
                truncate_text(&body, 512)
            );
        }
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .context("failed reading Replicate image bytes")?
            .to_vec();
        Ok(GeneratedImage { bytes, mime_type })
    }
}

impl ImageProvider for ReplicateProvider {
    fn name(&self) -> &str {
        "replicate"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<GeneratedImage> {
        let Some(api_token) = self.config.api_token.as_deref() else {
            bail!("REPLICATE_API_TOKEN not set");
        };

        let (endpoint, payload) = self.prediction_target(json!({
            "prompt": request.prompt,
            "size": request.size.to_string(),
            "style": request.style,
        }));
        let response = self
            .http
            .post(&endpoint)
            .timeout(self.config.request_timeout())
            .bearer_auth(api_token)
            .header("Prefer", "wait")
            .json(&payload)
            .send()
            .with_context(|| format!("Replicate request failed ({endpoint})"))?;
        let mut prediction = response_json_or_error("Replicate", response)?;

        let status = prediction_status(&prediction);
        if status != "succeeded" {
            if !matches!(status.as_str(), "starting" | "processing") {
                bail!("Replicate prediction failed: {}", prediction);
            }
            let poll_url = prediction
                .get("urls")
                .and_then(|urls| urls.get("get"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| anyhow::anyhow!("Replicate prediction missing poll URL"))?
                .to_string();
            prediction = self.poll_prediction(&poll_url, api_token)?;
        }

        let mut outputs = Vec::new();
        if let Some(output) = prediction.get("output") {
            extract_outputs(output, &mut outputs);
        }
        let Some(first) = outputs.first() else {
            bail!("Replicate response returned no image output");
        };
        self.fetch_output(first)
    }
}

fn prediction_status(prediction: &Value) -> String {
    prediction
        .get("status")
        .and_then(Value::as_str)
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default()
}

fn extract_outputs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(url) => {
            let trimmed = url.trim();
            if (trimmed.starts_with("http") || trimmed.starts_with("data:"))
                && !out.iter().any(|existing| existing == trimmed)
            {
                out.push(trimmed.to_string());
            }
        }
        Value::Array(rows) => {
            for row in rows {
                extract_outputs(row, out);
            }
        }
        Value::Object(obj) => {
            for key in ["url", "urls", "output"] {
                if let Some(nested) = obj.get(key) {
                    extract_outputs(nested, out);
                }
            }
        }
        _ => {}
    }
}

/// Sync-mode predictions may inline the file as `data:<mime>;base64,<payload>`.
fn decode_data_url(raw: &str) -> Result<Option<GeneratedImage>> {
    let Some(rest) = raw.strip_prefix("data:") else {
        return Ok(None);
    };
    let Some((meta, payload)) = rest.split_once(',') else {
        bail!("malformed data URL in Replicate output");
    };
    let Some(mime) = meta.strip_suffix(";base64") else {
        bail!("Replicate data URL is not base64 encoded");
    };
    let bytes = BASE64
        .decode(payload.trim().as_bytes())
        .context("Replicate data URL base64 decode failed")?;
    Ok(Some(GeneratedImage {
        bytes,
        mime_type: Some(mime.to_string()).filter(|value| !value.is_empty()),
    }))
}
