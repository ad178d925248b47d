//! Remote vision provider: one structured request, strict reply validation.
//!
//! The model is told (see [`crate::prompts`]) to return a single JSON object
//! describing the table. The reply is validated field by field; any missing
//! or mistyped required field is a [`ExtractionError::MalformedResponse`]
//! naming that field. Nothing is coerced into a default except the two
//! optional fields, `rawText` (→ empty) and `notes` (→ "no notes").

use super::transport::{ChatMessage, ChatRequest, ResponseFormat, VisionTransport};
use super::{ProviderDescriptor, ProviderId, TableProvider};
use crate::config::EngineConfig;
use crate::error::ExtractionError;
use crate::output::{Cell, ExtractionResult, Notes, TableStructure};
use crate::pipeline::payload::ImagePayload;
use crate::pipeline::render;
use crate::prompts::{TABLE_EXTRACTION_PROMPT, USER_INSTRUCTION};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default priority: ahead of the local recognizer.
pub const REMOTE_PRIORITY: i32 = 100;

/// A validated model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteReply {
    pub is_table: bool,
    pub confidence: f64,
    pub headers: Vec<String>,
    pub data: Vec<Vec<String>>,
    pub markdown: String,
    pub raw_text: String,
    pub notes: Notes,
    pub metadata: Map<String, Value>,
}

/// Provider backed by a vision-language model behind a [`VisionTransport`].
pub struct RemoteProvider {
    transport: Arc<dyn VisionTransport>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    priority: i32,
}

impl RemoteProvider {
    pub fn new(transport: Arc<dyn VisionTransport>, config: &EngineConfig) -> Self {
        Self {
            transport,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            priority: REMOTE_PRIORITY,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Instruction + image, deterministic sampling, JSON-only output.
    pub fn build_request(&self, image: &ImagePayload) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(TABLE_EXTRACTION_PROMPT),
                ChatMessage::user_with_image(USER_INSTRUCTION, image.data_uri()),
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat::json_object(),
        }
    }

    fn normalize(&self, reply: RemoteReply, started: Instant) -> ExtractionResult {
        let table = if reply.is_table {
            grid_from_reply(&reply.headers, &reply.data, reply.confidence)
        } else {
            TableStructure::rejected("remote analysis found no table in the image")
        };

        let markdown = if reply.markdown.trim().is_empty() {
            render::render(&table, Some(reply.raw_text.as_str()))
        } else {
            reply.markdown
        };

        info!(
            "Remote extraction: table={} ({}×{}), confidence {:.1}",
            table.is_table, table.row_count, table.column_count, reply.confidence
        );

        let mut metadata = Map::new();
        metadata.insert("model".into(), json!(self.model));
        metadata.insert("durationMs".into(), json!(started.elapsed().as_millis() as u64));
        if !reply.metadata.is_empty() {
            metadata.insert("modelMetadata".into(), Value::Object(reply.metadata));
        }

        ExtractionResult {
            success: true,
            provider: ProviderId::Remote.as_str().to_string(),
            confidence: reply.confidence,
            raw_text: reply.raw_text,
            table: Some(table),
            markdown,
            notes: reply.notes,
            metadata,
            error: None,
            error_kind: None,
        }
    }
}

#[async_trait]
impl TableProvider for RemoteProvider {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            id: ProviderId::Remote,
            priority: self.priority,
            requires_credential: true,
        }
    }

    fn is_available(&self) -> bool {
        self.transport.is_available()
    }

    async fn extract(
        &self,
        image: &ImagePayload,
        credential: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ExtractionResult, ExtractionError> {
        let credential = credential
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ExtractionError::MissingCredential {
                provider: ProviderId::Remote.to_string(),
            })?;

        let started = Instant::now();
        let request = self.build_request(image);
        debug!(
            "Sending {} byte {} image to model '{}'",
            image.len(),
            image.mime_type(),
            self.model
        );

        let content = self.transport.complete(&request, credential, cancel).await?;
        let reply = parse_reply(&content)?;
        Ok(self.normalize(reply, started))
    }
}

/// Parse and validate the model's JSON reply.
///
/// Required: `isTable` (bool), `confidence` (number in 0–100), `markdown`
/// (string); when `isTable` is true, also `tableData.headers` and
/// `tableData.data` (arrays).
pub fn parse_reply(content: &str) -> Result<RemoteReply, ExtractionError> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| ExtractionError::malformed(format!("reply is not valid JSON: {e}")))?;
    let obj = value
        .as_object()
        .ok_or_else(|| ExtractionError::malformed("reply is not a JSON object"))?;

    let is_table = match obj.get("isTable") {
        Some(Value::Bool(b)) => *b,
        Some(_) => return Err(ExtractionError::malformed("field 'isTable' must be a boolean")),
        None => return Err(ExtractionError::malformed("missing field 'isTable'")),
    };

    let confidence = match obj.get("confidence") {
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|c| (0.0..=100.0).contains(c))
            .ok_or_else(|| {
                ExtractionError::malformed(format!("field 'confidence' out of range 0-100: {n}"))
            })?,
        Some(_) => return Err(ExtractionError::malformed("field 'confidence' must be a number")),
        None => return Err(ExtractionError::malformed("missing field 'confidence'")),
    };

    let markdown = match obj.get("markdown") {
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(ExtractionError::malformed("field 'markdown' must be a string")),
        None => return Err(ExtractionError::malformed("missing field 'markdown'")),
    };

    let (headers, data) = if is_table {
        let table_data = obj
            .get("tableData")
            .and_then(Value::as_object)
            .ok_or_else(|| ExtractionError::malformed("missing field 'tableData'"))?;
        let headers = match table_data.get("headers") {
            Some(Value::Array(items)) => string_row(items, "tableData.headers")?,
            Some(_) => {
                return Err(ExtractionError::malformed("field 'tableData.headers' must be an array"))
            }
            None => return Err(ExtractionError::malformed("missing field 'tableData.headers'")),
        };
        let data = match table_data.get("data") {
            Some(Value::Array(rows)) => rows
                .iter()
                .enumerate()
                .map(|(i, row)| match row {
                    Value::Array(items) => string_row(items, &format!("tableData.data[{i}]")),
                    _ => Err(ExtractionError::malformed(format!(
                        "field 'tableData.data[{i}]' must be an array"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(ExtractionError::malformed("field 'tableData.data' must be an array"))
            }
            None => return Err(ExtractionError::malformed("missing field 'tableData.data'")),
        };
        (headers, data)
    } else {
        (Vec::new(), Vec::new())
    };

    let raw_text = obj
        .get("rawText")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let notes = match obj.get("notes") {
        None | Some(Value::Null) => Notes::default(),
        Some(v) => {
            let parsed: Notes = serde_json::from_value(v.clone())
                .map_err(|e| ExtractionError::malformed(format!("field 'notes' is invalid: {e}")))?;
            Notes::from_entries(parsed.entries)
        }
    };

    let metadata = obj
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    Ok(RemoteReply {
        is_table,
        confidence,
        headers,
        data,
        markdown,
        raw_text,
        notes,
        metadata,
    })
}

/// Scalars become strings; nested structures are rejected.
fn string_row(items: &[Value], field: &str) -> Result<Vec<String>, ExtractionError> {
    items
        .iter()
        .enumerate()
        .map(|(j, v)| match v {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Null => Ok(String::new()),
            _ => Err(ExtractionError::malformed(format!(
                "field '{field}[{j}]' must be a scalar"
            ))),
        })
        .collect()
}

/// Header row + data rows, padded to a rectangle.
fn grid_from_reply(headers: &[String], data: &[Vec<String>], confidence: f64) -> TableStructure {
    let rows: Vec<&[String]> = std::iter::once(headers)
        .filter(|h| !h.is_empty())
        .chain(data.iter().map(Vec::as_slice))
        .collect();
    let columns = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    if rows.is_empty() || columns == 0 {
        return TableStructure::rejected("remote reply marked a table but contained no cells");
    }

    let cells = rows
        .into_iter()
        .map(|row| {
            (0..columns)
                .map(|c| match row.get(c) {
                    Some(text) => Cell::from_text(text.clone(), confidence),
                    None => Cell::empty(),
                })
                .collect()
        })
        .collect();
    TableStructure::table(cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r#"{
        "isTable": true,
        "confidence": 93,
        "tableData": {"rows": 1, "columns": 2, "headers": ["CFM", "100"], "data": [["HP", 2.5]]},
        "markdown": "| CFM | 100 |\n| --- | --- |\n| HP | 2.5 |",
        "rawText": "CFM 100 HP 2.5",
        "notes": {"hasNotes": true, "count": 1, "entries": ["1) Provide VFD"]},
        "metadata": {"title": "Fan schedule"}
    }"#;

    #[test]
    fn parses_valid_reply() {
        let r = parse_reply(GOOD).unwrap();
        assert!(r.is_table);
        assert_eq!(r.confidence, 93.0);
        assert_eq!(r.headers, vec!["CFM", "100"]);
        assert_eq!(r.data, vec![vec!["HP".to_string(), "2.5".to_string()]]);
        assert_eq!(r.notes.count, 1);
        assert_eq!(r.metadata["title"], "Fan schedule");
    }

    #[test]
    fn missing_markdown_is_malformed() {
        let err = parse_reply(r#"{"isTable": false, "confidence": 50}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedResponse { .. }));
        assert!(err.to_string().contains("markdown"), "got: {err}");
    }

    #[test]
    fn wrong_types_are_malformed() {
        let err = parse_reply(r#"{"isTable": "yes", "confidence": 50, "markdown": ""}"#).unwrap_err();
        assert!(err.to_string().contains("isTable"));
        let err = parse_reply(r#"{"isTable": false, "confidence": "high", "markdown": ""}"#)
            .unwrap_err();
        assert!(err.to_string().contains("confidence"));
    }

    #[test]
    fn confidence_out_of_range_is_malformed() {
        let err = parse_reply(r#"{"isTable": false, "confidence": 140, "markdown": ""}"#)
            .unwrap_err();
        assert!(err.to_string().contains("confidence"));
    }

    #[test]
    fn table_requires_headers_and_data() {
        let err = parse_reply(
            r#"{"isTable": true, "confidence": 80, "markdown": "x", "tableData": {"data": []}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("tableData.headers"));

        let err = parse_reply(
            r#"{"isTable": true, "confidence": 80, "markdown": "x", "tableData": {"headers": []}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("tableData.data"));

        let err = parse_reply(r#"{"isTable": true, "confidence": 80, "markdown": "x"}"#).unwrap_err();
        assert!(err.to_string().contains("tableData"));
    }

    #[test]
    fn non_table_needs_no_table_data() {
        let r = parse_reply(r#"{"isTable": false, "confidence": 70, "markdown": "Just a title"}"#)
            .unwrap();
        assert!(!r.is_table);
        assert_eq!(r.raw_text, "");
        assert!(!r.notes.has_notes);
    }

    #[test]
    fn nested_cell_is_malformed() {
        let err = parse_reply(
            r#"{"isTable": true, "confidence": 80, "markdown": "x",
                "tableData": {"headers": ["a"], "data": [[{"v": 1}]]}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("tableData.data[0][0]"), "got: {err}");
    }

    #[test]
    fn fenced_reply_is_rejected() {
        let err = parse_reply("```json\n{\"isTable\": false}\n```").unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedResponse { .. }));
    }

    #[test]
    fn ragged_rows_are_padded() {
        let t = grid_from_reply(
            &["A".into(), "B".into(), "C".into()],
            &[vec!["1".into()], vec!["2".into(), "3".into()]],
            90.0,
        );
        assert!(t.is_table);
        assert_eq!((t.row_count, t.column_count), (3, 3));
        assert!(t.cells.iter().all(|r| r.len() == 3));
        assert!(t.cells[1][2].is_empty);
    }

    struct CannedTransport(Result<String, ExtractionError>);

    #[async_trait]
    impl VisionTransport for CannedTransport {
        async fn complete(
            &self,
            _request: &ChatRequest,
            _credential: &str,
            _cancel: &CancellationToken,
        ) -> Result<String, ExtractionError> {
            self.0.clone()
        }
    }

    fn provider(reply: Result<String, ExtractionError>) -> RemoteProvider {
        RemoteProvider::new(Arc::new(CannedTransport(reply)), &EngineConfig::default())
    }

    fn payload() -> ImagePayload {
        ImagePayload::from_bytes(vec![0x89, b'P', b'N', b'G'])
    }

    #[tokio::test]
    async fn missing_credential_fails_before_transport() {
        let p = provider(Ok(GOOD.to_string()));
        for cred in [None, Some(""), Some("   ")] {
            let err = p
                .extract(&payload(), cred, &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, ExtractionError::MissingCredential { .. }));
        }
    }

    #[tokio::test]
    async fn normalizes_good_reply() {
        let p = provider(Ok(GOOD.to_string()));
        let result = p
            .extract(&payload(), Some("sk-test"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.provider, "remote");
        assert_eq!(result.confidence, 93.0);
        let table = result.table.as_ref().unwrap();
        assert_eq!(table.texts(), vec![vec!["CFM", "100"], vec!["HP", "2.5"]]);
        assert_eq!(table.cells[0][0].fragment_count, 0);
        assert!(result.markdown.starts_with("| CFM | 100 |"));
        assert_eq!(result.notes.entries, vec!["1) Provide VFD"]);
        assert_eq!(result.metadata["model"], "gpt-4o");
        assert_eq!(result.metadata["modelMetadata"]["title"], "Fan schedule");
    }

    #[tokio::test]
    async fn non_table_reply_renders_fallback_markdown() {
        let p = provider(Ok(
            r#"{"isTable": false, "confidence": 40, "markdown": " ", "rawText": "SHEET M-101"}"#.into(),
        ));
        let result = p
            .extract(&payload(), Some("sk-test"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.success);
        assert!(!result.has_table());
        assert!(result.table.as_ref().unwrap().reason.is_some());
        assert!(result.markdown.contains("No table detected"));
        assert!(result.markdown.contains("SHEET M-101"));
    }

    #[tokio::test]
    async fn transport_error_propagates() {
        let p = provider(Err(ExtractionError::NetworkFailure {
            message: "HTTP 503".into(),
        }));
        let err = p
            .extract(&payload(), Some("sk-test"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::NetworkFailure { .. }));
    }

    #[test]
    fn request_carries_prompt_and_image() {
        let p = provider(Ok(String::new()));
        let req = p.build_request(&payload());
        assert_eq!(req.model, "gpt-4o");
        assert_eq!(req.max_tokens, 4096);
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["messages"][0]["role"], "system");
        assert!(v["messages"][1]["content"][1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[test]
    fn descriptor_requires_credential() {
        let d = provider(Ok(String::new())).descriptor();
        assert_eq!(d.id, ProviderId::Remote);
        assert_eq!(d.priority, REMOTE_PRIORITY);
        assert!(d.requires_credential);
    }

    #[test]
    fn empty_remote_table_is_rejected() {
        let t = grid_from_reply(&[], &[], 90.0);
        assert!(!t.is_table);
        assert!(t.reason.is_some());
    }
}
