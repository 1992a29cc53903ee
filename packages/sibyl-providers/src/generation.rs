use std::time::Duration;

use color_eyre::{Result, eyre};
use futures::{StreamExt, channel::mpsc::UnboundedSender};
use reqwest::Client;
use serde_json::Value;

#[derive(Debug, PartialEq, Eq)]
enum StreamEvent {
	Delta(String),
	Done,
}

/// Single-shot completion used by the rewrite, judge, and cross-encoder
/// steps. The prompt is sent as one user message.
pub async fn generate(cfg: &sibyl_config::GenerationProviderConfig, prompt: &str) -> Result<String> {
	let messages = vec![serde_json::json!({ "role": "user", "content": prompt })];

	chat(cfg, &messages).await
}

pub async fn chat(
	cfg: &sibyl_config::GenerationProviderConfig,
	messages: &[Value],
) -> Result<String> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_chat_content(json)
}

/// Streams answer deltas into `deltas`. A closed receiver means the caller
/// went away; the stream stops emitting without treating it as an error.
pub async fn stream_chat(
	cfg: &sibyl_config::GenerationProviderConfig,
	messages: &[Value],
	deltas: UnboundedSender<String>,
) -> Result<()> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
		"stream": true,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?
		.error_for_status()?;

	let mut stream = res.bytes_stream();
	let mut buffer = String::new();

	while let Some(chunk) = stream.next().await {
		buffer.push_str(&String::from_utf8_lossy(&chunk?));

		while let Some(pos) = buffer.find('\n') {
			let line = buffer[..pos].trim().to_string();

			buffer.drain(..=pos);

			match parse_stream_line(&line) {
				Some(StreamEvent::Done) => return Ok(()),
				Some(StreamEvent::Delta(text)) =>
					if deltas.unbounded_send(text).is_err() {
						return Ok(());
					},
				None => {},
			}
		}
	}

	Ok(())
}

fn parse_chat_content(json: Value) -> Result<String> {
	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.ok_or_else(|| eyre::eyre!("Generation response is missing message content."))?;

	Ok(content.to_string())
}

fn parse_stream_line(line: &str) -> Option<StreamEvent> {
	let data = line.strip_prefix("data:")?.trim();

	if data == "[DONE]" {
		return Some(StreamEvent::Done);
	}

	let json: Value = serde_json::from_str(data).ok()?;
	let text = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("delta"))
		.and_then(|delta| delta.get("content"))
		.and_then(|c| c.as_str())?;

	if text.is_empty() {
		return None;
	}

	Some(StreamEvent::Delta(text.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_choice_content() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "content": "Athens." } }
			]
		});
		assert_eq!(parse_chat_content(json).expect("parse failed"), "Athens.");
	}

	#[test]
	fn rejects_missing_content() {
		let json = serde_json::json!({ "choices": [] });
		assert!(parse_chat_content(json).is_err());
	}

	#[test]
	fn parses_stream_delta_lines() {
		let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
		assert_eq!(parse_stream_line(line), Some(StreamEvent::Delta("Hel".to_string())));
	}

	#[test]
	fn recognizes_done_sentinel() {
		assert_eq!(parse_stream_line("data: [DONE]"), Some(StreamEvent::Done));
	}

	#[test]
	fn ignores_non_data_lines() {
		assert_eq!(parse_stream_line(": keep-alive"), None);
		assert_eq!(parse_stream_line(""), None);
	}
}
