use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::config::GeminiConfig;
use crate::services::prompts::EVALUATE_DOCUMENT;

const GENERATIVE_LANGUAGE_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const PDF_MIME_TYPE: &str = "application/pdf";
const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_HARASSMENT",
];

/// Lazy, finite, non-restartable sequence of generated text fragments.
pub type FragmentStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait ExtractionClient: Send + Sync {
    /// Starts a generation over a base64-encoded PDF. An `Err` here means the
    /// call never produced a stream; failures after that arrive in-stream.
    async fn extract(&self, document_base64: &str, instructions: &str) -> Result<FragmentStream>;
}

// ── Wire types ───────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    system_instruction: Content<'a>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum RequestPart<'a> {
    Text(&'a str),
    InlineData {
        #[serde(rename = "mimeType")]
        mime_type: &'a str,
        data: &'a str,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: u32,
    response_modalities: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

// ── Client ───────────────────────────────────────────────────

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    fn base_url(&self) -> String {
        if let Some(endpoint) = &self.config.endpoint {
            return endpoint.trim_end_matches('/').to_string();
        }
        if self.config.api_key().is_some() {
            return GENERATIVE_LANGUAGE_BASE.to_string();
        }
        format!(
            "https://{loc}-aiplatform.googleapis.com/v1/projects/{project}/locations/{loc}/publishers/google",
            loc = self.config.location,
            project = self.config.project_id,
        )
    }

    pub fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url(),
            self.config.model
        )
    }

    fn request_body<'a>(
        &self,
        document_base64: &'a str,
        instructions: &'a str,
    ) -> GenerateContentRequest<'a> {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![
                    RequestPart::InlineData {
                        mime_type: PDF_MIME_TYPE,
                        data: document_base64,
                    },
                    RequestPart::Text(EVALUATE_DOCUMENT),
                ],
            }],
            system_instruction: Content {
                role: None,
                parts: vec![RequestPart::Text(instructions)],
            },
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                max_output_tokens: self.config.max_output_tokens,
                response_modalities: vec!["TEXT"],
            },
            safety_settings: SAFETY_CATEGORIES
                .into_iter()
                .map(|category| SafetySetting {
                    category,
                    threshold: "OFF",
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ExtractionClient for GeminiClient {
    async fn extract(&self, document_base64: &str, instructions: &str) -> Result<FragmentStream> {
        let url = self.stream_url();
        let body = self.request_body(document_base64, instructions);

        let mut request = self.http.post(&url).json(&body);
        request = match (self.config.api_key(), self.config.access_token()) {
            (Some(key), _) => request.header("x-goog-api-key", key),
            (None, Some(token)) => request.bearer_auth(token),
            (None, None) => anyhow::bail!("No Gemini credentials configured"),
        };

        tracing::debug!(model = %self.config.model, "Requesting Gemini stream");

        let response = request
            .send()
            .await
            .context("Failed to reach Gemini")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini returned {status}: {detail}");
        }

        Ok(fragment_stream(response.bytes_stream()))
    }
}

// ── SSE decoding ─────────────────────────────────────────────

/// Splits a byte stream into SSE `data:` payloads. Lines are only decoded
/// once complete, so multi-byte characters split across chunks stay intact.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(data) = data_payload(&line) {
                payloads.push(data);
            }
        }
        payloads
    }

    fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        data_payload(&rest)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    let data = line.strip_prefix("data:")?.trim_start();
    if data.is_empty() {
        return None;
    }
    Some(data.to_string())
}

/// Turns one SSE payload into a fragment. Chunks without candidates or parts
/// yield `None`.
fn parse_chunk(data: &str) -> Result<Option<String>> {
    let chunk: StreamChunk =
        serde_json::from_str(data).context("Malformed Gemini stream chunk")?;

    if let Some(err) = chunk.error {
        anyhow::bail!("Gemini API error {}: {}", err.code, err.message);
    }

    let Some(candidate) = chunk.candidates.first() else {
        if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
            anyhow::bail!("Gemini blocked the request: {reason}");
        }
        return Ok(None);
    };

    let parts = match &candidate.content {
        Some(content) if !content.parts.is_empty() => &content.parts,
        _ => return Ok(None),
    };

    Ok(Some(parts.iter().filter_map(|p| p.text.as_deref()).collect()))
}

struct FragmentState<S> {
    inner: S,
    decoder: SseDecoder,
    pending: VecDeque<Result<String>>,
    finished: bool,
}

impl<S> FragmentState<S> {
    fn enqueue(&mut self, data: String) {
        if let Some(item) = parse_chunk(&data).transpose() {
            self.pending.push_back(item);
        }
    }
}

/// Adapts a raw SSE byte stream into a fragment stream.
pub(crate) fn fragment_stream<S, B, E>(inner: S) -> FragmentStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let state = FragmentState {
        inner: Box::pin(inner),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(bytes)) => {
                    for data in st.decoder.push(bytes.as_ref()) {
                        st.enqueue(data);
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    let err = anyhow::Error::new(e).context("Gemini stream interrupted");
                    return Some((Err(err), st));
                }
                None => {
                    st.finished = true;
                    if let Some(data) = st.decoder.finish() {
                        st.enqueue(data);
                    }
                }
            }
        }
    })
    .boxed()
}
