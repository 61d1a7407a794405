//! Wire shapes of the `generateContent` endpoint and parsing of the model's
//! JSON answer.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use prospekt_core::ExtractedProduct;

use crate::error::ExtractError;

pub(crate) const API_KEY_HEADER: &str = "x-goog-api-key";

const PROMPT: &str = r#"Analyze this product flyer image and extract:
1. Product name (the main product being advertised)
2. Final price (the largest, most prominent price after any discounts)

Return ONLY a JSON object with this exact format:
{
  "name": "product name here",
  "price": 1.23
}

Important rules:
- Extract the actual product name, not just the brand
- Price must be a decimal number (e.g., 0.69 not "0,69€")
- Ignore asterisks (*) after prices
- Return the FINAL discounted price (the biggest, most prominent one)
- If something is missing, use null
- Do NOT include any explanation, ONLY the JSON

Examples:
Image with Pepsi and "0,69€*" → {"name": "Pepsi Cola", "price": 0.69}
Image with ski jacket and "17,99*" → {"name": "Crivit Ski-Jacke", "price": 17.99}
Image with pasta and "1,29*" → {"name": "Combino Fusilli XXL", "price": 1.29}"#;

/// Canonical model id. Retired 1.5 models map to their replacement and
/// `gemini-2.5-flash` to its lite variant, which stays within the free tier.
pub(crate) fn resolve_model(name: &str) -> String {
    let name = name.trim();
    let name = name.strip_prefix("models/").unwrap_or(name);
    match name {
        "gemini-1.5-flash"
        | "gemini-1.5-flash-latest"
        | "gemini-1.5-flash-002"
        | "gemini-1.5-pro"
        | "gemini-1.5-pro-002" => "gemini-2.0-flash".to_string(),
        "gemini-2.5-flash" => "gemini-2.5-flash-lite".to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum RequestPart {
    Text(&'static str),
    InlineData {
        mime_type: &'static str,
        data: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

impl GenerateRequest {
    pub(crate) fn for_jpeg(jpeg: &[u8]) -> Self {
        Self {
            contents: vec![RequestContent {
                parts: vec![
                    RequestPart::Text(PROMPT),
                    RequestPart::InlineData {
                        mime_type: "image/jpeg",
                        data: B64.encode(jpeg),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                max_output_tokens: 300,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Text of the first candidate, parts joined; `None` if blank.
    pub(crate) fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

/// Reads `{name, price}` from the model's answer, tolerating a Markdown code
/// fence around the JSON and prices written as text.
pub(crate) fn parse_product(text: &str) -> Result<ExtractedProduct, ExtractError> {
    let value: Value = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| ExtractError::Parse(e.to_string()))?;
    let Value::Object(fields) = value else {
        return Err(ExtractError::Parse("expected a JSON object".to_string()));
    };

    let name = fields
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(ToOwned::to_owned);
    let price = fields.get("price").and_then(price_value);
    Ok(ExtractedProduct { name, price })
}

fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let inner = match text.split_once("```json") {
        Some((_, rest)) => rest,
        None => match text.split_once("```") {
            Some((_, rest)) => rest,
            None => return text,
        },
    };
    inner.split("```").next().unwrap_or(inner).trim()
}

fn price_value(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let digits: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.'))
                .map(|c| if c == ',' { '.' } else { c })
                .collect();
            digits.parse::<f64>().ok()?
        }
        _ => return None,
    };
    (price.is_finite() && price >= 0.0).then_some(price)
}
