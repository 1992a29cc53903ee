use crate::{rerank::ScoredHit, retriever::cmp_f32_desc};

pub const MAX_CROSS_CANDIDATES: usize = 50;
const PASSAGE_CLIP_CHARS: usize = 600;

/// Free-form model output parsed defensively: either the value asked for,
/// or the raw text so the caller can log it and carry on unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum BestEffort<T> {
	Parsed(T),
	Fallback(String),
}

pub fn build_prompt(query: &str, hits: &[ScoredHit]) -> String {
	let mut prompt = String::new();

	prompt.push_str("Score each passage for relevance to the question on a 0.0-1.0 scale.\n");
	prompt.push_str("Respond with only a JSON array of numbers, one per passage, in order.\n\n");
	prompt.push_str(&format!("Question: {query}\n\n"));

	for (idx, scored) in hits.iter().enumerate() {
		prompt.push_str(&format!(
			"Passage {}:\n{}\n\n",
			idx + 1,
			clip_chars(&scored.hit.payload.text, PASSAGE_CLIP_CHARS)
		));
	}

	prompt
}

pub fn parse_scores(raw: &str, expected: usize) -> BestEffort<Vec<f32>> {
	let Some(start) = raw.find('[') else { return BestEffort::Fallback(raw.to_string()) };
	let Some(end) = raw.rfind(']') else { return BestEffort::Fallback(raw.to_string()) };

	if end <= start {
		return BestEffort::Fallback(raw.to_string());
	}

	let Ok(scores) = serde_json::from_str::<Vec<f32>>(&raw[start..=end]) else {
		return BestEffort::Fallback(raw.to_string());
	};

	if scores.len() != expected {
		return BestEffort::Fallback(raw.to_string());
	}

	BestEffort::Parsed(scores.into_iter().map(|score| score.clamp(0.0, 1.0)).collect())
}

/// Resorts the scored head by model relevance; overflow candidates keep
/// their existing order at the tail.
pub fn apply_scores(mut hits: Vec<ScoredHit>, scores: &[f32]) -> Vec<ScoredHit> {
	let head_len = scores.len().min(hits.len());
	let tail = hits.split_off(head_len);
	let mut head: Vec<(f32, ScoredHit)> =
		scores.iter().copied().zip(hits).map(|(score, hit)| (score, hit)).collect();

	head.sort_by(|a, b| cmp_f32_desc(a.0, b.0));

	head.into_iter().map(|(_, hit)| hit).chain(tail).collect()
}

pub(crate) fn clip_chars(text: &str, max_chars: usize) -> String {
	if text.chars().count() <= max_chars {
		text.to_string()
	} else {
		text.chars().take(max_chars).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::retriever::{HitPayload, RetrievedHit};

	fn scored(combined: f32, source: &str) -> ScoredHit {
		ScoredHit {
			hit: RetrievedHit {
				score: combined,
				payload: HitPayload {
					text: format!("passage from {source}"),
					source: source.to_string(),
					page: None,
					section: None,
					key_terms: Vec::new(),
					optimized: true,
				},
				vector: None,
			},
			keyword_overlap: 0.5,
			bm25_score: 0.0,
			reference_penalty: 0.0,
			metadata_boost: 0.0,
			acronym_boost: 0.0,
			combined,
		}
	}

	#[test]
	fn parses_a_plain_json_array() {
		assert_eq!(parse_scores("[0.9, 0.1, 0.5]", 3), BestEffort::Parsed(vec![0.9, 0.1, 0.5]));
	}

	#[test]
	fn parses_an_array_wrapped_in_prose() {
		let raw = "Here are the scores:\n[0.2, 0.8]\nHope that helps!";

		assert_eq!(parse_scores(raw, 2), BestEffort::Parsed(vec![0.2, 0.8]));
	}

	#[test]
	fn clamps_out_of_range_scores() {
		assert_eq!(parse_scores("[1.7, -0.3]", 2), BestEffort::Parsed(vec![1.0, 0.0]));
	}

	#[test]
	fn falls_back_on_length_mismatch() {
		assert!(matches!(parse_scores("[0.9]", 2), BestEffort::Fallback(_)));
	}

	#[test]
	fn falls_back_on_garbage() {
		assert!(matches!(parse_scores("the passages look fine", 2), BestEffort::Fallback(_)));
		assert!(matches!(parse_scores("[not json]", 2), BestEffort::Fallback(_)));
	}

	#[test]
	fn apply_scores_resorts_head_and_keeps_tail() {
		let hits = vec![scored(0.9, "a"), scored(0.8, "b"), scored(0.7, "c"), scored(0.6, "d")];
		let out = apply_scores(hits, &[0.1, 0.9, 0.5]);
		let order: Vec<&str> = out.iter().map(|hit| hit.hit.payload.source.as_str()).collect();

		assert_eq!(order, vec!["b", "c", "a", "d"]);
	}
}
