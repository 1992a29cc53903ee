use serde::Deserialize;

use crate::{
	cross::{BestEffort, clip_chars},
	rerank::ScoredHit,
};

pub const MAX_JUDGE_HITS: usize = 8;
const JUDGE_SNIPPET_CHARS: usize = 320;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgeAction {
	Ok,
	Refine,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JudgeVerdict {
	pub action: JudgeAction,
	pub hint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
	action: String,
	#[serde(default)]
	hint: Option<String>,
}

pub fn build_judge_prompt(query: &str, hits: &[ScoredHit]) -> String {
	let mut prompt = String::new();

	prompt.push_str("Judge whether the snippets below are sufficient to answer the question.\n");
	prompt.push_str("Mark each snippet relevant or irrelevant, then finish with one line of JSON:\n");
	prompt.push_str("{\"action\": \"ok\"} when the snippets suffice, or ");
	prompt.push_str("{\"action\": \"refine\", \"hint\": \"<terms to add>\"} when retrieval should be retried.\n\n");
	prompt.push_str(&format!("Question: {query}\n\n"));

	for (idx, scored) in hits.iter().take(MAX_JUDGE_HITS).enumerate() {
		prompt.push_str(&format!(
			"Snippet {}: {}\n",
			idx + 1,
			clip_chars(&scored.hit.payload.text, JUDGE_SNIPPET_CHARS)
		));
	}

	prompt
}

/// The verdict is expected on the last JSON-looking line; everything above
/// it is the judge's per-snippet scratch work and is ignored.
pub fn parse_verdict(raw: &str) -> BestEffort<JudgeVerdict> {
	for line in raw.lines().rev() {
		let line = line.trim();
		let Some(start) = line.find('{') else { continue };
		let Some(end) = line.rfind('}') else { continue };

		if end <= start {
			continue;
		}

		let Ok(parsed) = serde_json::from_str::<RawVerdict>(&line[start..=end]) else { continue };
		let action = match parsed.action.as_str() {
			"ok" => JudgeAction::Ok,
			"refine" => JudgeAction::Refine,
			_ => continue,
		};
		let hint = parsed.hint.map(|hint| hint.trim().to_string()).filter(|hint| !hint.is_empty());

		return BestEffort::Parsed(JudgeVerdict { action, hint });
	}

	BestEffort::Fallback(raw.to_string())
}

/// Deterministic rewrite; the hint terms join the working query without
/// another generation round-trip.
pub fn refine_query(query: &str, hint: &str) -> String {
	format!("{query} {hint}")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_an_ok_verdict() {
		let raw = "Snippet 1: relevant\nSnippet 2: irrelevant\n{\"action\": \"ok\"}";

		assert_eq!(
			parse_verdict(raw),
			BestEffort::Parsed(JudgeVerdict { action: JudgeAction::Ok, hint: None })
		);
	}

	#[test]
	fn parses_a_refine_verdict_with_hint() {
		let raw = "Snippet 1: irrelevant\n{\"action\": \"refine\", \"hint\": \"battery chemistry\"}";

		assert_eq!(
			parse_verdict(raw),
			BestEffort::Parsed(JudgeVerdict {
				action: JudgeAction::Refine,
				hint: Some("battery chemistry".to_string()),
			})
		);
	}

	#[test]
	fn takes_the_last_json_line() {
		let raw = "{\"action\": \"refine\", \"hint\": \"draft\"}\nreconsidering...\n{\"action\": \"ok\"}";

		assert_eq!(
			parse_verdict(raw),
			BestEffort::Parsed(JudgeVerdict { action: JudgeAction::Ok, hint: None })
		);
	}

	#[test]
	fn ignores_blank_hints() {
		let raw = "{\"action\": \"refine\", \"hint\": \"  \"}";

		assert_eq!(
			parse_verdict(raw),
			BestEffort::Parsed(JudgeVerdict { action: JudgeAction::Refine, hint: None })
		);
	}

	#[test]
	fn falls_back_on_unparseable_output() {
		assert!(matches!(parse_verdict("the context looks fine to me"), BestEffort::Fallback(_)));
		assert!(matches!(parse_verdict("{\"action\": \"retry\"}"), BestEffort::Fallback(_)));
	}

	#[test]
	fn refine_query_appends_the_hint() {
		assert_eq!(refine_query("how to wire panels", "series parallel"), "how to wire panels series parallel");
	}

	#[test]
	fn judge_prompt_caps_snippets_at_eight() {
		use crate::retriever::{HitPayload, RetrievedHit};

		let hits: Vec<ScoredHit> = (0..12)
			.map(|idx| ScoredHit {
				hit: RetrievedHit {
					score: 0.5,
					payload: HitPayload {
						text: format!("snippet {idx}"),
						source: format!("s{idx}.md"),
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
				combined: 0.5,
			})
			.collect();
		let prompt = build_judge_prompt("question", &hits);

		assert!(prompt.contains("Snippet 8:"));
		assert!(!prompt.contains("Snippet 9:"));
	}
}
