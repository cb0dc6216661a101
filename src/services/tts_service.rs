//! 语音合成服务 - 业务能力层
//!
//! 只负责"文本 → 音频"能力
//!
//! ## 技术栈
//! - `reqwest` 直接调用 Gemini `generateContent` REST 接口（`responseModalities = ["AUDIO"]`）
//! - 服务返回 base64 编码的原始 PCM（`audio/L16;rate=24000`），这里封装成 WAV
//!
//! Gemini TTS 不支持语速参数，`speed != 1.0` 时只记录警告。

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, ProviderError, ProviderErrorKind};

const PROVIDER: &str = "gemini";
const DEFAULT_BITS_PER_SAMPLE: u16 = 16;
const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// 一次语音合成请求
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: String,
    pub model: String,
    /// 部分服务商不支持，调用方不能假定生效
    pub speed: f32,
}

/// 语音合成能力
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// 调用前的本地检查（凭据等），不产生任何网络请求
    fn check_ready(&self) -> AppResult<()> {
        Ok(())
    }

    /// 返回可直接写盘的 WAV 字节
    async fn synthesize(&self, request: &SpeechRequest) -> AppResult<Vec<u8>>;
}

/// PCM 格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub bits_per_sample: u16,
    pub sample_rate: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            bits_per_sample: DEFAULT_BITS_PER_SAMPLE,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

/// 从 MIME 类型中解析位深和采样率
///
/// 例如 `audio/L16;rate=24000`；缺失或无法解析的部分使用默认值 16 bit / 24000 Hz。
pub fn parse_audio_mime_type(mime_type: &str) -> AudioFormat {
    let mut format = AudioFormat::default();

    for param in mime_type.split(';').map(str::trim) {
        if param.to_lowercase().starts_with("rate=") {
            if let Some(rate) = param.split_once('=').and_then(|(_, v)| v.trim().parse().ok()) {
                format.sample_rate = rate;
            }
        } else if let Some(bits) = param.strip_prefix("audio/L") {
            if let Ok(bits) = bits.parse() {
                format.bits_per_sample = bits;
            }
        }
    }
    format
}

/// 给单声道 PCM 数据加上 44 字节的 RIFF/WAVE 头
pub fn pcm_to_wav(pcm: &[u8], format: AudioFormat) -> Vec<u8> {
    let num_channels: u16 = 1;
    let data_size = pcm.len() as u32;
    let block_align = num_channels * (format.bits_per_sample / 8);
    let byte_rate = format.sample_rate * block_align as u32;

    let mut wav = Vec::with_capacity(44 + pcm.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_size).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&num_channels.to_le_bytes());
    wav.extend_from_slice(&format.sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&format.bits_per_sample.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_size.to_le_bytes());
    wav.extend_from_slice(pcm);
    wav
}

/// 指定时长的静音 WAV，用作模拟模式的占位音频
pub fn silent_wav(duration_ms: u32) -> Vec<u8> {
    let format = AudioFormat::default();
    let samples = format.sample_rate as u64 * duration_ms as u64 / 1000;
    let pcm = vec![0u8; (samples * (format.bits_per_sample / 8) as u64) as usize];
    pcm_to_wav(&pcm, format)
}

// ========== Gemini REST 请求 / 响应结构 ==========

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    temperature: f32,
    response_modalities: [&'a str; 1],
    speech_config: SpeechConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    voice_config: VoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig<'a> {
    voice_name: &'a str,
}

#[derive(Deserialize, Default)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    data: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Gemini 语音合成服务
pub struct TtsService {
    http: reqwest::Client,
    api_key: Option<String>,
    api_base: String,
}

impl TtsService {
    pub fn new(config: &Config) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::invalid_option("http_client", e.to_string()))?;

        Ok(Self {
            http,
            api_key: config.gemini_api_key.clone(),
            api_base: config.gemini_api_base.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.api_base, model)
    }
}

#[async_trait]
impl SpeechSynthesizer for TtsService {
    fn check_ready(&self) -> AppResult<()> {
        self.api_key
            .as_deref()
            .map(|_| ())
            .ok_or_else(|| AppError::missing_credential("GEMINI_API_KEY"))
    }

    async fn synthesize(&self, request: &SpeechRequest) -> AppResult<Vec<u8>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::missing_credential("GEMINI_API_KEY"))?;

        if (request.speed - 1.0).abs() > f32::EPSILON {
            warn!("⚠️ Gemini TTS 不支持语速参数，speed={} 将被忽略", request.speed);
        }

        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![TextPart {
                    text: &request.text,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 1.0,
                response_modalities: ["AUDIO"],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: &request.voice,
                        },
                    },
                },
            },
        };

        debug!(
            "调用 Gemini TTS，模型: {}，音色: {}，文本 {} 字符",
            request.model,
            request.voice,
            request.text.chars().count()
        );

        let response = self
            .http
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::new(PROVIDER, ProviderErrorKind::Network, e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::new(PROVIDER, ProviderErrorKind::Network, e.to_string()))?;

        if !status.is_success() {
            warn!("Gemini TTS 调用失败: HTTP {}", status.as_u16());
            return Err(classify_http_error(status.as_u16(), &text).into());
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text).map_err(|e| {
            ProviderError::new(PROVIDER, ProviderErrorKind::Network, format!("响应解析失败: {e}"))
        })?;

        Ok(assemble_audio(parsed)?)
    }
}

/// 把 HTTP 错误映射为带分类的服务商错误
fn classify_http_error(status: u16, body: &str) -> ProviderError {
    let (message, api_status) = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|env| (env.error.message, env.error.status))
        .unwrap_or_else(|_| (body.chars().take(300).collect(), String::new()));

    let kind = match status {
        429 if message.to_lowercase().contains("quota") => ProviderErrorKind::QuotaExhausted,
        429 => ProviderErrorKind::RateLimited,
        401 | 403 => ProviderErrorKind::Auth,
        408 | 500..=599 => ProviderErrorKind::Network,
        _ => ProviderErrorKind::BadRequest,
    };

    let message = if api_status.is_empty() {
        message
    } else {
        format!("{api_status}: {message}")
    };
    ProviderError::new(PROVIDER, kind, message).with_status(status)
}

/// 合并响应中的音频片段
///
/// 单个 WAV 片段原样返回；PCM 片段按顺序拼接后统一加 WAV 头。
fn assemble_audio(response: GenerateContentResponse) -> Result<Vec<u8>, ProviderError> {
    let engine = base64::engine::general_purpose::STANDARD;
    let mut chunks: Vec<(String, Vec<u8>)> = Vec::new();

    for part in response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
    {
        let Some(inline) = part.inline_data else {
            continue;
        };
        if inline.data.is_empty() {
            continue;
        }
        let bytes = engine.decode(inline.data.as_bytes()).map_err(|e| {
            ProviderError::new(PROVIDER, ProviderErrorKind::Network, format!("音频解码失败: {e}"))
        })?;
        chunks.push((inline.mime_type, bytes));
    }

    let Some(first_mime) = chunks.first().map(|(mime, _)| mime.clone()) else {
        return Err(ProviderError::new(
            PROVIDER,
            ProviderErrorKind::EmptyResponse,
            "API 未返回音频数据",
        ));
    };

    let is_wav = first_mime.starts_with("audio/wav") || first_mime.starts_with("audio/x-wav");
    if chunks.len() == 1 && is_wav {
        return Ok(chunks.remove(0).1);
    }

    let format = parse_audio_mime_type(&first_mime);
    let pcm: Vec<u8> = chunks.into_iter().flat_map(|(_, bytes)| bytes).collect();
    Ok(pcm_to_wav(&pcm, format))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_audio_mime_type() {
        assert_eq!(
            parse_audio_mime_type("audio/L16;rate=24000"),
            AudioFormat { bits_per_sample: 16, sample_rate: 24000 }
        );
        assert_eq!(
            parse_audio_mime_type("audio/L24; rate=48000"),
            AudioFormat { bits_per_sample: 24, sample_rate: 48000 }
        );
        assert_eq!(parse_audio_mime_type("audio/L16;rate=abc"), AudioFormat::default());
        assert_eq!(parse_audio_mime_type(""), AudioFormat::default());
    }

    #[test]
    fn test_pcm_to_wav_header() {
        let wav = pcm_to_wav(&[1, 2, 3, 4], AudioFormat::default());
        assert_eq!(wav.len(), 48);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(wav[4..8].try_into().unwrap()), 40);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(u32::from_le_bytes(wav[24..28].try_into().unwrap()), 24000);
        // byte rate = 24000 * 2
        assert_eq!(u32::from_le_bytes(wav[28..32].try_into().unwrap()), 48000);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 4);
        assert_eq!(&wav[44..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_silent_wav_size() {
        // 100ms * 24000Hz * 2 字节
        assert_eq!(silent_wav(100).len(), 44 + 4800);
    }

    #[test]
    fn test_classify_http_error() {
        let quota = classify_http_error(
            429,
            r#"{"error":{"code":429,"message":"You exceeded your current quota","status":"RESOURCE_EXHAUSTED"}}"#,
        );
        assert_eq!(quota.kind, ProviderErrorKind::QuotaExhausted);
        assert_eq!(quota.status, Some(429));
        assert!(quota.message.starts_with("RESOURCE_EXHAUSTED"));

        assert_eq!(classify_http_error(429, "slow down").kind, ProviderErrorKind::RateLimited);
        assert_eq!(classify_http_error(403, "").kind, ProviderErrorKind::Auth);
        assert_eq!(classify_http_error(400, "{}").kind, ProviderErrorKind::BadRequest);
        assert_eq!(classify_http_error(503, "").kind, ProviderErrorKind::Network);
    }

    #[test]
    fn test_assemble_audio_concatenates_pcm_chunks() {
        let engine = base64::engine::general_purpose::STANDARD;
        let body = serde_json::json!({
            "candidates": [{
                "content": {"parts": [
                    {"inlineData": {"mimeType": "audio/L16;rate=24000", "data": engine.encode([1u8, 2])}},
                    {"text": "ignored"},
                    {"inlineData": {"mimeType": "audio/L16;rate=24000", "data": engine.encode([3u8, 4])}}
                ]}
            }]
        });
        let parsed: GenerateContentResponse = serde_json::from_value(body).unwrap();
        let wav = assemble_audio(parsed).unwrap();
        assert_eq!(&wav[44..], &[1, 2, 3, 4]);

        let empty = assemble_audio(GenerateContentResponse::default()).unwrap_err();
        assert_eq!(empty.kind, ProviderErrorKind::EmptyResponse);
    }

    #[tokio::test]
    async fn test_missing_key_is_configuration_error() {
        let service = TtsService::new(&Config::default()).unwrap();
        let request = SpeechRequest {
            text: "안녕하세요".to_string(),
            voice: "Zephyr".to_string(),
            model: "gemini-2.5-pro-preview-tts".to_string(),
            speed: 1.0,
        };
        let err = service.synthesize(&request).await.unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }
}
