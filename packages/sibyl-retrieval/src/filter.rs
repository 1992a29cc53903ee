use crate::rerank::ScoredHit;

pub const COSINE_FLOOR_MIN: f32 = 0.10;
pub const RELATIVE_KEEP_RATIO: f32 = 0.85;
pub const MIN_KEYWORD_OVERLAP_HYBRID: f32 = 0.15;
pub const MIN_KEYWORD_OVERLAP_PLAIN: f32 = 0.05;

#[derive(Debug, Clone, Copy)]
pub struct FilterThresholds {
	pub cosine_floor: f32,
	pub relative_threshold: f32,
	pub min_keyword_overlap: f32,
}

pub fn thresholds(top_combined: f32, user_threshold: f32, hybrid: bool) -> FilterThresholds {
	FilterThresholds {
		cosine_floor: user_threshold.max(COSINE_FLOOR_MIN),
		relative_threshold: top_combined * RELATIVE_KEEP_RATIO,
		min_keyword_overlap: if hybrid {
			MIN_KEYWORD_OVERLAP_HYBRID
		} else {
			MIN_KEYWORD_OVERLAP_PLAIN
		},
	}
}

/// Either axis can admit a hit: raw vector confidence above the floor, or a
/// combined score within reach of the best candidate. Lexical grounding is
/// required in both cases; pure-embedding matches with zero term overlap
/// are the classic false positive.
pub fn dynamic_filter(hits: &[ScoredHit], user_threshold: f32, hybrid: bool) -> Vec<ScoredHit> {
	let Some(top) = hits.first() else { return Vec::new() };
	let thresholds = thresholds(top.combined, user_threshold, hybrid);

	hits.iter()
		.filter(|scored| {
			(scored.hit.score >= thresholds.cosine_floor
				|| scored.combined >= thresholds.relative_threshold)
				&& scored.keyword_overlap >= thresholds.min_keyword_overlap
		})
		.cloned()
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		rerank,
		retriever::{HitPayload, RetrievedHit},
	};

	fn scored(score: f32, source: &str, text: &str) -> ScoredHit {
		let hit = RetrievedHit {
			score,
			payload: HitPayload {
				text: text.to_string(),
				source: source.to_string(),
				page: None,
				section: None,
				key_terms: Vec::new(),
				optimized: true,
			},
			vector: None,
		};

		rerank::rerank("solar panel maintenance", "solar panel maintenance", vec![hit], false)
			.remove(0)
	}

	fn ranked(hits: Vec<ScoredHit>) -> Vec<ScoredHit> {
		let mut hits = hits;

		hits.sort_by(|a, b| crate::retriever::cmp_f32_desc(a.combined, b.combined));

		hits
	}

	#[test]
	fn keeps_strong_vector_hits_above_the_floor() {
		let hits = ranked(vec![
			scored(0.14, "a.md", "Solar panel maintenance steps."),
			scored(0.13, "a2.md", "More solar panel maintenance notes."),
			scored(0.05, "b.md", "Unrelated cooking recipe."),
		]);
		let kept = dynamic_filter(&hits, 0.05, false);

		assert!(!kept.is_empty());
		assert!(kept.iter().any(|hit| hit.hit.payload.source.starts_with('a')));
		assert!(kept.iter().all(|hit| hit.hit.payload.source != "b.md"));
	}

	#[test]
	fn lexical_grounding_is_always_required() {
		let hits = ranked(vec![scored(0.90, "a.md", "Entirely unrelated photovoltaic prose.")]);
		let kept = dynamic_filter(&hits, 0.05, false);

		assert!(kept.is_empty());
	}

	#[test]
	fn raising_the_user_threshold_never_admits_more_hits() {
		let hits = ranked(vec![
			scored(0.14, "a.md", "Solar panel maintenance steps."),
			scored(0.12, "b.md", "Solar panel cleaning."),
			scored(0.08, "c.md", "Panel maintenance appendix."),
		]);
		let mut previous = usize::MAX;

		for threshold in [0.01_f32, 0.05, 0.10, 0.13, 0.20, 0.50] {
			let kept = dynamic_filter(&hits, threshold, false).len();

			assert!(kept <= previous);

			previous = kept;
		}
	}

	#[test]
	fn relative_threshold_admits_strong_combined_scores() {
		// Vector scores below the cosine floor, but the combined score of
		// the runner-up stays within 15% of the best.
		let hits = ranked(vec![
			scored(0.08, "a.md", "Solar panel maintenance steps for the panel."),
			scored(0.079, "b.md", "Solar panel maintenance guidance for the panel."),
		]);
		let kept = dynamic_filter(&hits, 0.01, false);

		assert_eq!(kept.len(), 2);
	}

	#[test]
	fn empty_input_yields_empty_output() {
		assert!(dynamic_filter(&[], 0.05, false).is_empty());
	}
}
