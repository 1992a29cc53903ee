use std::convert::Infallible;

use axum::{
	Json, Router,
	body::Body,
	extract::State,
	http::{StatusCode, header},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use futures::{StreamExt, channel::mpsc, stream};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use sibyl_retrieval::{ContextBundle, RetrievalOptions, RetrievalRequest, ServiceError};

use crate::state::AppState;

const SINGLE_SHOT_PROMPT: &str = "You answer questions using the supporting passages provided \
	below. Cite the source label when you draw on a passage.";
const CONVERSATIONAL_PROMPT: &str = "You answer questions in an ongoing conversation, using the \
	supporting passages provided below. Stay consistent with your earlier answers and cite the \
	source label when you draw on a passage.";
const NO_CONTEXT_PROMPT: &str = "No supporting passages were retrieved for this question. Answer \
	from general knowledge and say so when you are unsure.";

/// Literal frame separator between the plain-mode answer and its trailing
/// metadata object.
const PLAIN_METADATA_SEPARATOR: &str = "\n\n---\n";

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/chat", post(chat))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatTurn {
	pub role: String,
	pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
	pub query: String,
	#[serde(default)]
	pub history: Vec<ChatTurn>,
	pub top_k: Option<u32>,
	pub similarity_threshold: Option<f32>,
	pub hyde_enabled: Option<bool>,
	pub hybrid_enabled: Option<bool>,
	pub mmr_enabled: Option<bool>,
	pub cross_encoder_enabled: Option<bool>,
	pub crag_enabled: Option<bool>,
	pub auto_tune_enabled: Option<bool>,
	pub stream_format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamFormat {
	Plain,
	Jsonl,
}

async fn chat(
	State(state): State<AppState>,
	Json(payload): Json<ChatRequest>,
) -> Result<Response, ApiError> {
	let query = payload.query.trim().to_string();

	if query.is_empty() {
		return Err(json_error(
			StatusCode::BAD_REQUEST,
			"invalid_request",
			"query must be non-empty.",
			None,
		));
	}

	let format = match payload.stream_format.as_deref() {
		None | Some("plain") => StreamFormat::Plain,
		Some("jsonl") => StreamFormat::Jsonl,
		Some(other) =>
			return Err(json_error(
				StatusCode::BAD_REQUEST,
				"invalid_request",
				format!("Unknown stream_format {other:?}."),
				None,
			)),
	};
	let request_id = Uuid::new_v4();
	let options = resolve_options(&state, &payload);
	let bundle = state
		.service
		.build_context(RetrievalRequest { query: query.clone(), options })
		.await?;

	tracing::info!(
		%request_id,
		top_k = bundle.top_k_used,
		threshold = bundle.threshold_used,
		sources = bundle.sources.len(),
		degraded = bundle.degraded,
		"Context assembled."
	);

	let max_turns = state.service.cfg.retrieval.max_history_turns as usize;
	let history = cap_history(&payload.history, max_turns);
	let messages = build_messages(&bundle.context, &history, &query);
	let final_frame = final_frame(format, &bundle, &options);

	let (deltas_tx, deltas_rx) = mpsc::unbounded::<String>();
	let chat = state.chat.clone();
	let generation_cfg = state.service.cfg.providers.generation.clone();

	tokio::spawn(async move {
		if let Err(err) = chat.stream(&generation_cfg, &messages, deltas_tx).await {
			tracing::warn!(error = %err, %request_id, "Answer generation failed mid-stream.");
		}
	});

	let framed = deltas_rx
		.map(move |delta| frame_delta(format, &delta))
		.chain(stream::once(async move { final_frame }))
		.map(Ok::<_, Infallible>);
	let content_type = match format {
		StreamFormat::Plain => "text/plain; charset=utf-8",
		StreamFormat::Jsonl => "application/x-ndjson",
	};

	Ok(([(header::CONTENT_TYPE, content_type)], Body::from_stream(framed)).into_response())
}

fn resolve_options(state: &AppState, payload: &ChatRequest) -> RetrievalOptions {
	let mut options = RetrievalOptions::from_config(&state.service.cfg.retrieval);

	if let Some(top_k) = payload.top_k {
		options.top_k = top_k;
	}
	if let Some(threshold) = payload.similarity_threshold {
		options.similarity_threshold = threshold;
	}
	if let Some(hyde) = payload.hyde_enabled {
		options.hyde = hyde;
	}
	if let Some(hybrid) = payload.hybrid_enabled {
		options.hybrid = hybrid;
	}
	if let Some(mmr) = payload.mmr_enabled {
		options.mmr = mmr;
	}
	if let Some(cross_encoder) = payload.cross_encoder_enabled {
		options.cross_encoder = cross_encoder;
	}
	if let Some(crag) = payload.crag_enabled {
		options.crag = crag;
	}
	if let Some(auto_tune) = payload.auto_tune_enabled {
		options.auto_tune = auto_tune;
	}

	options
}

fn cap_history(history: &[ChatTurn], max_turns: usize) -> Vec<ChatTurn> {
	history[history.len().saturating_sub(max_turns)..].to_vec()
}

fn build_messages(context: &str, history: &[ChatTurn], query: &str) -> Vec<Value> {
	let system = build_system_prompt(context, !history.is_empty());
	let mut messages = vec![serde_json::json!({ "role": "system", "content": system })];

	for turn in history {
		let role = if turn.role == "assistant" { "assistant" } else { "user" };

		messages.push(serde_json::json!({ "role": role, "content": turn.content }));
	}

	messages.push(serde_json::json!({ "role": "user", "content": query }));

	messages
}

fn build_system_prompt(context: &str, conversational: bool) -> String {
	let mut prompt =
		if conversational { CONVERSATIONAL_PROMPT.to_string() } else { SINGLE_SHOT_PROMPT.to_string() };

	if context.is_empty() {
		prompt.push_str("\n\n");
		prompt.push_str(NO_CONTEXT_PROMPT);
	} else {
		prompt.push_str("\n\nContext:\n");
		prompt.push_str(context);
	}

	prompt
}

fn frame_delta(format: StreamFormat, delta: &str) -> String {
	match format {
		StreamFormat::Plain => delta.to_string(),
		StreamFormat::Jsonl =>
			format!("{}\n", serde_json::json!({ "type": "delta", "text": delta })),
	}
}

fn final_frame(format: StreamFormat, bundle: &ContextBundle, options: &RetrievalOptions) -> String {
	let sources =
		serde_json::to_value(&bundle.sources).unwrap_or_else(|_| serde_json::json!([]));

	match format {
		StreamFormat::Plain => {
			let metadata = serde_json::json!({
				"type": "sources_metadata",
				"sources": sources,
				"topKUsed": bundle.top_k_used,
				"thresholdUsed": bundle.threshold_used,
				"hydeEnabled": options.hyde,
				"autoTuneEnabled": options.auto_tune,
				"cragEnabled": options.crag,
			});

			format!("{PLAIN_METADATA_SEPARATOR}{metadata}")
		},
		StreamFormat::Jsonl => {
			let metadata = serde_json::json!({
				"type": "sources",
				"sources": sources,
				"topKUsed": bundle.top_k_used,
				"thresholdUsed": bundle.threshold_used,
				"hydeEnabled": options.hyde,
				"autoTuneEnabled": options.auto_tune,
				"cragEnabled": options.crag,
			});

			format!("{metadata}\n")
		},
	}
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::InvalidRequest { message } =>
				json_error(StatusCode::BAD_REQUEST, "invalid_request", message, None),
			ServiceError::Provider { message } =>
				json_error(StatusCode::BAD_GATEWAY, "provider_error", message, None),
			ServiceError::Store { message } =>
				json_error(StatusCode::BAD_GATEWAY, "store_error", message, None),
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody {
			error_code: self.error_code,
			message: self.message,
			fields: self.fields,
		};

		(self.status, Json(body)).into_response()
	}
}
