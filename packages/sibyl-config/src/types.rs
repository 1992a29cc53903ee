use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub retrieval: Retrieval,
	#[serde(default)]
	pub context: Context,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
	pub bind_localhost_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub qdrant: Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub generation: GenerationProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

/// Per-request defaults for the retrieval pipeline. Every field can be
/// overridden by the caller on a single request.
#[derive(Debug, Clone, Deserialize)]
pub struct Retrieval {
	#[serde(default = "default_top_k")]
	pub top_k: u32,
	#[serde(default = "default_similarity_threshold")]
	pub similarity_threshold: f32,
	#[serde(default)]
	pub hyde_enabled: bool,
	#[serde(default)]
	pub hybrid_enabled: bool,
	#[serde(default)]
	pub mmr_enabled: bool,
	#[serde(default)]
	pub cross_encoder_enabled: bool,
	#[serde(default)]
	pub crag_enabled: bool,
	#[serde(default)]
	pub auto_tune_enabled: bool,
	#[serde(default = "default_max_history_turns")]
	pub max_history_turns: u32,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self {
			top_k: default_top_k(),
			similarity_threshold: default_similarity_threshold(),
			hyde_enabled: false,
			hybrid_enabled: false,
			mmr_enabled: false,
			cross_encoder_enabled: false,
			crag_enabled: false,
			auto_tune_enabled: false,
			max_history_turns: default_max_history_turns(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Context {
	/// Path prefixes stripped from source labels before they reach the
	/// model or the caller.
	#[serde(default = "default_source_prefixes")]
	pub source_prefixes: Vec<String>,
}
impl Default for Context {
	fn default() -> Self {
		Self { source_prefixes: default_source_prefixes() }
	}
}

fn default_top_k() -> u32 {
	25
}

fn default_similarity_threshold() -> f32 {
	0.01
}

fn default_max_history_turns() -> u32 {
	10
}

fn default_source_prefixes() -> Vec<String> {
	["./", "data/", "docs/", "documents/", "uploads/"]
		.into_iter()
		.map(str::to_string)
		.collect()
}
