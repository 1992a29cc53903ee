use tracing::warn;

use sibyl_config::GenerationProviderConfig;

use crate::GenerationProvider;

const HYDE_PROMPT: &str = "Write a dense, neutral, explanatory passage of 120-220 words that would \
	plausibly answer the question below. Do not cite sources, do not hedge, do not address the \
	reader; write the kind of paragraph a reference manual would contain.";

const TRANSLATE_PROMPT: &str = "Rewrite the question below for document retrieval: expand \
	abbreviations, add likely synonyms for key terms, and keep the original intent unchanged. \
	Return only the rewritten question.";

/// Hypothetical-answer passage for HyDE. `None` means the caller embeds the
/// plain query instead; this step never fails a request.
pub async fn hyde_passage(
	provider: &dyn GenerationProvider,
	cfg: &GenerationProviderConfig,
	query: &str,
) -> Option<String> {
	let prompt = format!("{HYDE_PROMPT}\n\nQuestion: {query}");

	match provider.generate(cfg, &prompt).await {
		Ok(passage) => {
			let passage = passage.trim().to_string();

			if passage.is_empty() {
				warn!("HyDE generation returned empty output; falling back to plain query embedding.");

				None
			} else {
				Some(passage)
			}
		},
		Err(err) => {
			warn!(error = %err, "HyDE generation failed; falling back to plain query embedding.");

			None
		},
	}
}

pub async fn translate_query(
	provider: &dyn GenerationProvider,
	cfg: &GenerationProviderConfig,
	query: &str,
) -> Option<String> {
	let prompt = format!("{TRANSLATE_PROMPT}\n\nQuestion: {query}");

	match provider.generate(cfg, &prompt).await {
		Ok(translated) => {
			let translated = translated.trim().to_string();

			if translated.is_empty() {
				warn!("Query translation returned empty output; keeping the original query.");

				None
			} else {
				Some(translated)
			}
		},
		Err(err) => {
			warn!(error = %err, "Query translation failed; keeping the original query.");

			None
		},
	}
}
