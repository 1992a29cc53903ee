use std::{cmp::Ordering, collections::HashMap};

use qdrant_client::qdrant::{ScoredPoint, Value, value::Kind, vectors_output::VectorsOptions};
use serde::Serialize;

use sibyl_storage::DENSE_VECTOR_NAME;

/// Payload fields written by the canonical ingestion pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct HitPayload {
	pub text: String,
	pub source: String,
	pub page: Option<i64>,
	pub section: Option<String>,
	pub key_terms: Vec<String>,
	pub optimized: bool,
}

#[derive(Debug, Clone)]
pub struct RetrievedHit {
	pub score: f32,
	pub payload: HitPayload,
	pub vector: Option<Vec<f32>>,
}

pub fn collect_hits(points: &[ScoredPoint]) -> Vec<RetrievedHit> {
	let mut out = Vec::with_capacity(points.len());

	for point in points {
		let Some(text) = payload_string(&point.payload, "text") else {
			tracing::warn!("Retrieved point is missing its text payload.");

			continue;
		};
		let payload = HitPayload {
			text,
			source: payload_string(&point.payload, "source").unwrap_or_default(),
			page: payload_i64(&point.payload, "page"),
			section: payload_string(&point.payload, "section"),
			key_terms: payload_string_list(&point.payload, "key_terms"),
			optimized: payload_bool(&point.payload, "optimized").unwrap_or(false),
		};

		out.push(RetrievedHit { score: point.score, payload, vector: point_vector(point) });
	}

	out
}

/// Key used for source-level dedup. Falls back to a stable serialization of
/// the payload when the source identifier is missing.
pub fn dedupe_key(hit: &RetrievedHit) -> String {
	if !hit.payload.source.trim().is_empty() {
		return hit.payload.source.clone();
	}

	serde_json::to_string(&hit.payload).unwrap_or_else(|_| hit.payload.text.clone())
}

pub fn dedupe_by_source(hits: Vec<RetrievedHit>) -> Vec<RetrievedHit> {
	let mut seen = std::collections::HashSet::new();
	let mut out = Vec::with_capacity(hits.len());

	for hit in hits {
		if seen.insert(dedupe_key(&hit)) {
			out.push(hit);
		}
	}

	out
}

/// Drops passages that did not come out of the canonical chunking/embedding
/// pipeline; vectors from mixed embedding models are not comparable.
pub fn retain_optimized(hits: Vec<RetrievedHit>) -> Vec<RetrievedHit> {
	hits.into_iter().filter(|hit| hit.payload.optimized).collect()
}

pub fn point_vector(point: &ScoredPoint) -> Option<Vec<f32>> {
	match point.vectors.as_ref()?.vectors_options.as_ref()? {
		VectorsOptions::Vector(vector) => Some(vector.data.clone()),
		VectorsOptions::Vectors(named) =>
			named.vectors.get(DENSE_VECTOR_NAME).map(|vector| vector.data.clone()),
	}
}

pub fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}

pub fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Some(text.to_string()),
		_ => None,
	}
}

pub fn payload_bool(payload: &HashMap<String, Value>, key: &str) -> Option<bool> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::BoolValue(value)) => Some(*value),
		_ => None,
	}
}

pub fn payload_i64(payload: &HashMap<String, Value>, key: &str) -> Option<i64> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::IntegerValue(value)) => Some(*value),
		Some(Kind::DoubleValue(value)) =>
			if value.fract() == 0.0 {
				Some(*value as i64)
			} else {
				None
			},
		_ => None,
	}
}

pub fn payload_string_list(payload: &HashMap<String, Value>, key: &str) -> Vec<String> {
	let Some(value) = payload.get(key) else { return Vec::new() };

	match &value.kind {
		Some(Kind::ListValue(list)) => list
			.values
			.iter()
			.filter_map(|item| match &item.kind {
				Some(Kind::StringValue(text)) => Some(text.to_string()),
				_ => None,
			})
			.collect(),
		_ => Vec::new(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn hit(score: f32, source: &str, text: &str, optimized: bool) -> RetrievedHit {
		RetrievedHit {
			score,
			payload: HitPayload {
				text: text.to_string(),
				source: source.to_string(),
				page: None,
				section: None,
				key_terms: Vec::new(),
				optimized,
			},
			vector: None,
		}
	}

	#[test]
	fn dedupe_keeps_first_hit_per_source() {
		let hits = vec![
			hit(0.9, "a.md", "first", true),
			hit(0.8, "a.md", "second", true),
			hit(0.7, "b.md", "third", true),
		];
		let deduped = dedupe_by_source(hits);

		assert_eq!(deduped.len(), 2);
		assert_eq!(deduped[0].payload.text, "first");
		assert_eq!(deduped[1].payload.text, "third");
	}

	#[test]
	fn dedupe_falls_back_to_payload_serialization() {
		let hits = vec![
			hit(0.9, "", "same text", true),
			hit(0.8, "", "same text", true),
			hit(0.7, "", "other text", true),
		];
		let deduped = dedupe_by_source(hits);

		assert_eq!(deduped.len(), 2);
	}

	#[test]
	fn retain_optimized_drops_legacy_chunks() {
		let hits = vec![hit(0.9, "a.md", "kept", true), hit(0.8, "b.md", "dropped", false)];
		let kept = retain_optimized(hits);

		assert_eq!(kept.len(), 1);
		assert_eq!(kept[0].payload.text, "kept");
	}

	#[test]
	fn collect_hits_skips_points_without_text() {
		let with_text = ScoredPoint {
			payload: HashMap::from([
				("text".to_string(), Value { kind: Some(Kind::StringValue("body".to_string())) }),
				("source".to_string(), Value { kind: Some(Kind::StringValue("a.md".to_string())) }),
				("optimized".to_string(), Value { kind: Some(Kind::BoolValue(true)) }),
			]),
			score: 0.4,
			..Default::default()
		};
		let without_text = ScoredPoint { score: 0.3, ..Default::default() };
		let hits = collect_hits(&[with_text, without_text]);

		assert_eq!(hits.len(), 1);
		assert_eq!(hits[0].payload.source, "a.md");
		assert!(hits[0].payload.optimized);
	}

	#[test]
	fn dedupe_fallback_scores_do_not_collide_with_sources() {
		let hits = vec![hit(0.9, "a.md", "text", true), hit(0.8, "", "text", true)];

		assert_eq!(dedupe_by_source(hits).len(), 2);
	}

	#[test]
	fn cmp_f32_desc_sorts_nan_last() {
		let mut values = vec![0.2_f32, f32::NAN, 0.9];

		values.sort_by(|a, b| cmp_f32_desc(*a, *b));

		assert_eq!(values[0], 0.9);
		assert_eq!(values[1], 0.2);
		assert!(values[2].is_nan());
	}
}
