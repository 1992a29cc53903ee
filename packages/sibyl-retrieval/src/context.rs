use std::collections::HashSet;

use serde::Serialize;

use crate::{
	rerank::ScoredHit,
	retriever::{cmp_f32_desc, dedupe_key},
};

pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";
pub const THIN_CONTEXT_CHARS: usize = 200;
pub const MINIMAL_FALLBACK_HITS: usize = 3;

const BELOW_THRESHOLD_NOTE: &str = "Note: none of the retrieved passages cleared the relevance \
	threshold. The closest matches are included below; treat them as weak evidence and say so \
	when you rely on them.";
const THIN_CONTEXT_NOTE: &str = "Note: the retrieved passages offer limited direct coverage of \
	this question. Use them where they apply and answer from general knowledge where they do not.";
const ALWAYS_ANSWER_NOTE: &str = "Even if no passage matches the question exactly, provide a \
	substantive answer grounded in the most relevant material above.";

/// One retrieved passage as reported back to the caller. `used` marks the
/// passages that made it into the model's context.
#[derive(Debug, Clone, Serialize)]
pub struct ContextSource {
	pub source: String,
	pub score: f32,
	pub used: bool,
	#[serde(skip_serializing)]
	pub text: String,
}

pub struct AssembleArgs<'a> {
	pub all: &'a [ScoredHit],
	pub selected: &'a [ScoredHit],
	pub source_prefixes: &'a [String],
}

pub struct AssembledContext {
	pub context: String,
	pub sources: Vec<ContextSource>,
	pub used_fallback: bool,
}

pub fn clean_source_label(source: &str, prefixes: &[String]) -> String {
	let mut label = source.trim();
	let mut stripped = true;

	while stripped {
		stripped = false;

		for prefix in prefixes {
			if let Some(rest) = label.strip_prefix(prefix.as_str()) {
				label = rest;
				stripped = true;
			}
		}
	}

	let label = label.trim_start_matches('/');

	if label.is_empty() { source.trim().to_string() } else { label.to_string() }
}

pub fn assemble(args: AssembleArgs<'_>) -> AssembledContext {
	let AssembleArgs { all, selected, source_prefixes } = args;

	if all.is_empty() {
		return AssembledContext {
			context: String::new(),
			sources: Vec::new(),
			used_fallback: false,
		};
	}

	let mut chosen: Vec<&ScoredHit> = selected.iter().collect();
	let mut used_fallback = false;

	if chosen.is_empty() {
		// Something was retrieved, so never answer fully blind: surface the
		// closest matches with an explicit below-threshold note instead.
		let mut by_score: Vec<&ScoredHit> = all.iter().collect();

		by_score.sort_by(|a, b| cmp_f32_desc(a.hit.score, b.hit.score));

		chosen = by_score.into_iter().take(MINIMAL_FALLBACK_HITS).collect();
		used_fallback = true;
	}

	let passages: Vec<String> = chosen
		.iter()
		.map(|scored| {
			format!(
				"[Source: {}]\n{}",
				clean_source_label(&source_label(scored), source_prefixes),
				scored.hit.payload.text
			)
		})
		.collect();
	let body = passages.join(CONTEXT_SEPARATOR);
	let thin = body.chars().count() < THIN_CONTEXT_CHARS;
	let mut context = body;
	let mut guided = false;

	if used_fallback {
		context = format!("{BELOW_THRESHOLD_NOTE}\n\n{context}");
		guided = true;
	}
	if thin {
		context.push_str("\n\n");
		context.push_str(THIN_CONTEXT_NOTE);
		guided = true;
	}
	if !guided {
		context.push_str("\n\n");
		context.push_str(ALWAYS_ANSWER_NOTE);
	}

	let used_keys: HashSet<String> =
		chosen.iter().map(|scored| dedupe_key(&scored.hit)).collect();
	let sources = all
		.iter()
		.map(|scored| ContextSource {
			source: clean_source_label(&source_label(scored), source_prefixes),
			score: scored.hit.score,
			used: used_keys.contains(&dedupe_key(&scored.hit)),
			text: scored.hit.payload.text.clone(),
		})
		.collect();

	AssembledContext { context, sources, used_fallback }
}

fn source_label(scored: &ScoredHit) -> String {
	let source = scored.hit.payload.source.trim();

	if source.is_empty() { "unknown".to_string() } else { source.to_string() }
}
