use toml::Value;

use sibyl_config::{Config, Error};

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_config() -> Config {
	parse(SAMPLE_CONFIG_TEMPLATE_TOML.to_string())
}

fn parse(raw: String) -> Config {
	toml::from_str(&raw).expect("Failed to parse sample config.")
}

fn with_value(section: &[&str], key: &str, value: Value) -> String {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");
	let mut table = root.as_table_mut().expect("Template config must be a table.");

	for name in section {
		table = table
			.get_mut(*name)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Template config must include [{name}]."));
	}

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render template config.")
}

#[test]
fn accepts_sample_config() {
	let cfg = sample_config();

	assert!(sibyl_config::validate(&cfg).is_ok());
	assert_eq!(cfg.retrieval.top_k, 25);
	assert_eq!(cfg.context.source_prefixes.len(), 3);
}

#[test]
fn defaults_retrieval_section_when_absent() {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");

	root.as_table_mut().expect("Template config must be a table.").remove("retrieval");

	let cfg = parse(toml::to_string(&root).expect("Failed to render template config."));

	assert_eq!(cfg.retrieval.top_k, 25);
	assert!((cfg.retrieval.similarity_threshold - 0.01).abs() < f32::EPSILON);
	assert!(!cfg.retrieval.hyde_enabled);
	assert_eq!(cfg.retrieval.max_history_turns, 10);
}

#[test]
fn rejects_dimension_mismatch() {
	let raw = with_value(&["providers", "embedding"], "dimensions", Value::Integer(768));
	let cfg = parse(raw);

	match sibyl_config::validate(&cfg) {
		Err(Error::Validation { message }) => {
			assert!(message.contains("must match storage.qdrant.vector_dim"));
		},
		other => panic!("Expected a validation error, got {other:?}."),
	}
}

#[test]
fn rejects_zero_dimensions() {
	let raw = with_value(&["providers", "embedding"], "dimensions", Value::Integer(0));
	let cfg = parse(raw);

	assert!(sibyl_config::validate(&cfg).is_err());
}

#[test]
fn rejects_zero_top_k() {
	let raw = with_value(&["retrieval"], "top_k", Value::Integer(0));
	let cfg = parse(raw);

	assert!(sibyl_config::validate(&cfg).is_err());
}

#[test]
fn rejects_negative_similarity_threshold() {
	let raw = with_value(&["retrieval"], "similarity_threshold", Value::Float(-0.5));
	let cfg = parse(raw);

	assert!(sibyl_config::validate(&cfg).is_err());
}

#[test]
fn rejects_empty_api_key() {
	let raw = with_value(&["providers", "generation"], "api_key", Value::String(" ".to_string()));
	let cfg = parse(raw);

	assert!(sibyl_config::validate(&cfg).is_err());
}
