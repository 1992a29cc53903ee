use std::collections::{HashMap, HashSet};

use regex::Regex;

use crate::retriever::{RetrievedHit, cmp_f32_desc};

pub const REFERENCE_PENALTY_WEIGHT: f32 = 0.35;
pub const METADATA_BOOST_SCALE: f32 = 0.25;
pub const ACRONYM_BOOST: f32 = 0.10;
const BM25_LENGTH_NORM_TOKENS: f32 = 500.0;
const MIN_TOKEN_CHARS: usize = 3;

// Bibliography-looking passages rank high on vector similarity yet answer
// nothing; these patterns catch the usual citation furniture.
const REFERENCE_PATTERNS: [&str; 5] = [
	r"\bet al\.?",
	r"\b(19|20)\d{2}\b",
	r"(?i)\b(journal|proceedings|conference|doi)\b",
	r"(?i)\b(vol|pp)\. ",
	r"(?m)^\s*(\[\d+\]|\d+\.)\s",
];

const ACRONYM_PATTERN: &str = r"\b[A-Z]{2,5}\d*\b";

#[derive(Debug, Clone, Copy)]
pub struct Weights {
	pub vector: f32,
	pub keyword: f32,
	pub bm25: f32,
}
impl Weights {
	/// Hybrid mode shifts weight toward lexical evidence.
	pub fn for_mode(hybrid: bool) -> Self {
		if hybrid {
			Self { vector: 0.65, keyword: 0.35, bm25: 0.20 }
		} else {
			Self { vector: 0.75, keyword: 0.18, bm25: 0.0 }
		}
	}
}

#[derive(Debug, Clone)]
pub struct ScoredHit {
	pub hit: RetrievedHit,
	pub keyword_overlap: f32,
	pub bm25_score: f32,
	pub reference_penalty: f32,
	pub metadata_boost: f32,
	pub acronym_boost: f32,
	pub combined: f32,
}

pub fn query_terms(query: &str) -> Vec<String> {
	let mut normalized = String::with_capacity(query.len());

	for ch in query.chars() {
		if ch.is_ascii_alphanumeric() {
			normalized.push(ch.to_ascii_lowercase());
		} else {
			normalized.push(' ');
		}
	}

	let mut out = Vec::new();
	let mut seen = HashSet::new();

	for token in normalized.split_whitespace() {
		if token.len() < MIN_TOKEN_CHARS {
			continue;
		}
		if seen.insert(token.to_string()) {
			out.push(token.to_string());
		}
	}

	out
}

fn text_tokens(text: &str) -> Vec<String> {
	let mut normalized = String::with_capacity(text.len());

	for ch in text.chars() {
		if ch.is_ascii_alphanumeric() {
			normalized.push(ch.to_ascii_lowercase());
		} else {
			normalized.push(' ');
		}
	}

	normalized
		.split_whitespace()
		.filter(|token| token.len() >= MIN_TOKEN_CHARS)
		.map(str::to_string)
		.collect()
}

pub fn keyword_overlap(terms: &[String], text: &str) -> f32 {
	if terms.is_empty() {
		return 0.0;
	}

	let tokens: HashSet<String> = text_tokens(text).into_iter().collect();

	if tokens.is_empty() {
		return 0.0;
	}

	let matched = terms.iter().filter(|term| tokens.contains(term.as_str())).count();

	matched as f32 / terms.len() as f32
}

/// Log-dampened term frequency over a length normalizer, favoring concise
/// on-topic chunks over long diffuse ones.
pub fn bm25_like(terms: &[String], text: &str) -> f32 {
	if terms.is_empty() {
		return 0.0;
	}

	let tokens = text_tokens(text);

	if tokens.is_empty() {
		return 0.0;
	}

	let mut frequencies: HashMap<&str, u32> = HashMap::new();

	for token in &tokens {
		*frequencies.entry(token.as_str()).or_insert(0) += 1;
	}

	let mut sum = 0.0_f32;

	for term in terms {
		let tf = frequencies.get(term.as_str()).copied().unwrap_or(0);

		if tf > 0 {
			sum += (1.0 + tf as f32).ln();
		}
	}

	sum / (1.0 + tokens.len() as f32 / BM25_LENGTH_NORM_TOKENS)
}

pub fn reference_penalty(text: &str) -> f32 {
	let mut count = 0_usize;

	for pattern in REFERENCE_PATTERNS {
		if let Ok(re) = Regex::new(pattern) {
			count += re.find_iter(text).count();
		}
	}

	(count as f32 / 8.0).min(1.0)
}

pub fn metadata_boost(terms: &[String], hit: &RetrievedHit) -> f32 {
	let mut metadata = String::new();

	if let Some(section) = hit.payload.section.as_deref() {
		metadata.push_str(section);
		metadata.push(' ');
	}

	metadata.push_str(&hit.payload.key_terms.join(" "));
	metadata.push(' ');
	metadata.push_str(title_of(&hit.payload.source));

	if metadata.trim().is_empty() {
		return 0.0;
	}

	METADATA_BOOST_SCALE * keyword_overlap(terms, &metadata)
}

fn title_of(source: &str) -> &str {
	let name = source.rsplit(['/', '\\']).next().unwrap_or(source);

	name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
}

/// Acronyms are pulled from the raw query, not the translated one; a
/// rewrite that expands them must not cost exact matches their bonus.
pub fn query_acronyms(raw_query: &str) -> Vec<String> {
	let Ok(re) = Regex::new(ACRONYM_PATTERN) else { return Vec::new() };
	let mut out = Vec::new();
	let mut seen = HashSet::new();

	for found in re.find_iter(raw_query) {
		if seen.insert(found.as_str().to_string()) {
			out.push(found.as_str().to_string());
		}
	}

	out
}

pub fn acronym_boost(acronyms: &[String], text: &str) -> f32 {
	if acronyms.iter().any(|acronym| text.contains(acronym.as_str())) { ACRONYM_BOOST } else { 0.0 }
}

pub fn rerank(
	working_query: &str,
	raw_query: &str,
	hits: Vec<RetrievedHit>,
	hybrid: bool,
) -> Vec<ScoredHit> {
	let terms = query_terms(working_query);
	let acronyms = query_acronyms(raw_query);
	let weights = Weights::for_mode(hybrid);
	let mut out: Vec<ScoredHit> = hits
		.into_iter()
		.map(|hit| {
			let keyword = keyword_overlap(&terms, &hit.payload.text);
			let bm25 = if hybrid { bm25_like(&terms, &hit.payload.text) } else { 0.0 };
			let reference = reference_penalty(&hit.payload.text);
			let metadata = metadata_boost(&terms, &hit);
			let acronym = acronym_boost(&acronyms, &hit.payload.text);
			let combined = weights.vector * hit.score
				+ weights.keyword * keyword
				+ weights.bm25 * bm25
				+ metadata + acronym
				- REFERENCE_PENALTY_WEIGHT * reference;

			ScoredHit {
				hit,
				keyword_overlap: keyword,
				bm25_score: bm25,
				reference_penalty: reference,
				metadata_boost: metadata,
				acronym_boost: acronym,
				combined,
			}
		})
		.collect();

	out.sort_by(|a, b| {
		cmp_f32_desc(a.combined, b.combined).then_with(|| cmp_f32_desc(a.hit.score, b.hit.score))
	});

	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::retriever::HitPayload;

	fn hit(score: f32, source: &str, text: &str) -> RetrievedHit {
		RetrievedHit {
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
		}
	}

	#[test]
	fn query_terms_drop_short_tokens_and_duplicates() {
		let terms = query_terms("How do I do solar panel Solar maintenance?");

		assert_eq!(terms, vec!["how", "solar", "panel", "maintenance"]);
	}

	#[test]
	fn keyword_overlap_is_a_ratio_of_query_terms() {
		let terms = query_terms("solar panel maintenance");
		let overlap = keyword_overlap(&terms, "Clean the solar panel monthly.");

		assert!((overlap - 2.0 / 3.0).abs() < 1e-6);
	}

	#[test]
	fn bm25_like_favors_concise_chunks() {
		let terms = query_terms("solar panel");
		let concise = bm25_like(&terms, "The solar panel output depends on panel tilt.");
		let mut diffuse_text = String::from("The solar panel output depends on panel tilt. ");

		for _ in 0..200 {
			diffuse_text.push_str("Unrelated filler sentence about something else entirely. ");
		}

		let diffuse = bm25_like(&terms, &diffuse_text);

		assert!(concise > diffuse);
	}

	#[test]
	fn reference_penalty_saturates_at_one() {
		let mut bibliography = String::new();

		for year in 1990..2010 {
			bibliography.push_str(&format!("Smith et al. Journal of Things, {year}.\n"));
		}

		assert!((reference_penalty(&bibliography) - 1.0).abs() < f32::EPSILON);
		assert_eq!(reference_penalty("No citations here at all"), 0.0);
	}

	#[test]
	fn acronym_boost_requires_verbatim_match() {
		let acronyms = query_acronyms("What is the MPPT setting for RV48 systems?");

		assert_eq!(acronyms, vec!["MPPT", "RV48"]);
		assert_eq!(acronym_boost(&acronyms, "Set MPPT tracking on."), ACRONYM_BOOST);
		assert_eq!(acronym_boost(&acronyms, "Set mppt tracking on."), 0.0);
	}

	#[test]
	fn metadata_boost_uses_section_and_title() {
		let mut with_section = hit(0.5, "manual.md", "Generic body text.");

		with_section.payload.section = Some("Solar panel maintenance".to_string());

		let terms = query_terms("solar maintenance");

		assert!(metadata_boost(&terms, &with_section) > 0.0);

		let without = hit(0.5, "manual.md", "Generic body text.");

		assert_eq!(metadata_boost(&terms, &without), 0.0);
	}

	#[test]
	fn combined_score_is_deterministic() {
		let hits = vec![
			hit(0.5, "a.md", "Solar panel maintenance steps."),
			hit(0.6, "b.md", "Smith et al. Journal of Solar, 2019. [1] 2020."),
		];
		let first = rerank("solar panel maintenance", "solar panel maintenance", hits.clone(), true);
		let second = rerank("solar panel maintenance", "solar panel maintenance", hits, true);

		assert_eq!(first.len(), second.len());

		for (lhs, rhs) in first.iter().zip(second.iter()) {
			assert_eq!(lhs.combined, rhs.combined);
			assert_eq!(lhs.hit.payload.source, rhs.hit.payload.source);
		}
	}

	#[test]
	fn reference_heavy_chunk_ranks_below_clean_chunk() {
		let hits = vec![
			hit(0.55, "refs.md", "Solar panel. Smith et al. 1999. Journal of Solar, vol. 3, pp. 4. doi 2001. [1] 2002."),
			hit(0.50, "guide.md", "Solar panel maintenance: clean the panel and check wiring."),
		];
		let ranked = rerank("solar panel maintenance", "solar panel maintenance", hits, false);

		assert_eq!(ranked[0].hit.payload.source, "guide.md");
	}

	#[test]
	fn hybrid_mode_weights_lexical_evidence_higher() {
		let lexical = hit(0.30, "a.md", "Solar panel maintenance guide for panel owners.");
		let semantic = hit(0.45, "b.md", "Photovoltaic upkeep overview.");
		let hybrid = rerank("solar panel maintenance", "solar panel maintenance", vec![lexical.clone(), semantic.clone()], true);

		assert_eq!(hybrid[0].hit.payload.source, "a.md");
	}
}
