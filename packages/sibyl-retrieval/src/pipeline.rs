use tracing::warn;

use sibyl_storage::SearchParams;

use crate::{
	RetrievalService, ServiceError, ServiceResult,
	context::{self, ContextSource},
	corrective::{self, JudgeAction},
	cross::{self, BestEffort},
	diversity, filter,
	rerank::{self, ScoredHit},
	retriever::{self, RetrievedHit},
	rewrite,
};

/// HyDE passages are verbose by construction; the floor is widened so the
/// store does not flood the candidate pool with marginal matches.
pub const HYDE_FLOOR_MIN: f32 = 0.08;

const AUTO_TUNE_SHORT_TERMS: usize = 3;
const AUTO_TUNE_LONG_TERMS: usize = 12;
const AUTO_TUNE_RELAXED_FLOOR: f32 = 0.01;
const AUTO_TUNE_TIGHTENED_FLOOR: f32 = 0.05;

#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
	pub top_k: u32,
	pub similarity_threshold: f32,
	pub hyde: bool,
	pub hybrid: bool,
	pub mmr: bool,
	pub cross_encoder: bool,
	pub crag: bool,
	pub auto_tune: bool,
}
impl RetrievalOptions {
	pub fn from_config(cfg: &sibyl_config::Retrieval) -> Self {
		Self {
			top_k: cfg.top_k,
			similarity_threshold: cfg.similarity_threshold,
			hyde: cfg.hyde_enabled,
			hybrid: cfg.hybrid_enabled,
			mmr: cfg.mmr_enabled,
			cross_encoder: cfg.cross_encoder_enabled,
			crag: cfg.crag_enabled,
			auto_tune: cfg.auto_tune_enabled,
		}
	}
}

#[derive(Debug, Clone)]
pub struct RetrievalRequest {
	pub query: String,
	pub options: RetrievalOptions,
}

#[derive(Debug, Clone)]
pub struct ContextBundle {
	pub context: String,
	pub sources: Vec<ContextSource>,
	pub query_used: String,
	pub top_k_used: u32,
	pub threshold_used: f32,
	pub degraded: bool,
}
impl ContextBundle {
	fn degraded(query_used: String, top_k_used: u32, threshold_used: f32) -> Self {
		Self {
			context: String::new(),
			sources: Vec::new(),
			query_used,
			top_k_used,
			threshold_used,
			degraded: true,
		}
	}
}

// A wrong-length embedding is a configuration-class fault and must fail
// loudly; a transport failure degrades to a context-free answer.
enum PassError {
	Fatal(ServiceError),
	Transient(color_eyre::Report),
}
impl From<color_eyre::Report> for PassError {
	fn from(err: color_eyre::Report) -> Self {
		Self::Transient(err)
	}
}

struct RetrievalPass {
	hits: Vec<RetrievedHit>,
	query_vector: Vec<f32>,
}

struct Refinement {
	query: String,
	query_vector: Vec<f32>,
	hits: Vec<RetrievedHit>,
}

/// Widens retrieval for short keyword-style queries and tightens it for
/// long analytical ones. Reported back to the caller via metadata.
fn auto_tune(query: &str, top_k: u32, threshold: f32) -> (u32, f32) {
	let term_count = rerank::query_terms(query).len();

	if term_count <= AUTO_TUNE_SHORT_TERMS {
		(top_k.saturating_mul(2), threshold.min(AUTO_TUNE_RELAXED_FLOOR))
	} else if term_count >= AUTO_TUNE_LONG_TERMS {
		((top_k / 2).max(1), threshold.max(AUTO_TUNE_TIGHTENED_FLOOR))
	} else {
		(top_k, threshold)
	}
}

impl RetrievalService {
	/// Runs the full pipeline: optional translation, embedding, retrieval,
	/// hybrid rerank, dynamic filter, optional cross-encoder, diversification,
	/// optional corrective loop, and context assembly. Transient provider or
	/// store failures degrade to an empty context instead of erroring.
	pub async fn build_context(&self, req: RetrievalRequest) -> ServiceResult<ContextBundle> {
		let raw_query = req.query.trim().to_string();

		if raw_query.is_empty() {
			return Err(ServiceError::InvalidRequest {
				message: "query must be non-empty.".to_string(),
			});
		}

		let opts = req.options;
		let (top_k, threshold) = if opts.auto_tune {
			auto_tune(&raw_query, opts.top_k.max(1), opts.similarity_threshold)
		} else {
			(opts.top_k.max(1), opts.similarity_threshold)
		};
		let mut working_query = raw_query.clone();

		if opts.crag
			&& let Some(translated) = rewrite::translate_query(
				self.providers.generation.as_ref(),
				&self.cfg.providers.generation,
				&working_query,
			)
			.await
		{
			working_query = translated;
		}

		let pass = match self.first_pass(&working_query, top_k, threshold, &opts).await {
			Ok(pass) => pass,
			Err(PassError::Fatal(err)) => return Err(err),
			Err(PassError::Transient(err)) => {
				warn!(error = %err, "Retrieval failed; answering without context.");

				return Ok(ContextBundle::degraded(working_query, top_k, threshold));
			},
		};

		let mut query_vector = pass.query_vector;
		let mut hits = retriever::retain_optimized(retriever::dedupe_by_source(pass.hits));
		let mut scored = rerank::rerank(&working_query, &raw_query, hits.clone(), opts.hybrid);
		let mut selected =
			self.select(&working_query, &scored, &query_vector, top_k, threshold, &opts).await;

		if opts.crag
			&& !selected.is_empty()
			&& let Some(refinement) =
				self.judge_and_refine(&working_query, &selected, top_k, threshold, &opts).await
		{
			working_query = refinement.query;
			query_vector = refinement.query_vector;
			hits = retriever::retain_optimized(retriever::dedupe_by_source(
				hits.into_iter().chain(refinement.hits).collect(),
			));
			scored = rerank::rerank(&working_query, &raw_query, hits.clone(), opts.hybrid);
			selected = self
				.select(&working_query, &scored, &query_vector, top_k, threshold, &opts)
				.await;
		}

		let assembled = context::assemble(context::AssembleArgs {
			all: &scored,
			selected: &selected,
			source_prefixes: &self.cfg.context.source_prefixes,
		});

		if assembled.used_fallback {
			tracing::info!("Dynamic filter rejected every hit; fell back to minimal context.");
		}

		Ok(ContextBundle {
			context: assembled.context,
			sources: assembled.sources,
			query_used: working_query,
			top_k_used: top_k,
			threshold_used: threshold,
			degraded: false,
		})
	}

	async fn select(
		&self,
		working_query: &str,
		scored: &[ScoredHit],
		query_vector: &[f32],
		top_k: u32,
		threshold: f32,
		opts: &RetrievalOptions,
	) -> Vec<ScoredHit> {
		let mut kept = filter::dynamic_filter(scored, threshold, opts.hybrid);

		if opts.cross_encoder {
			kept = self.cross_encode(working_query, kept).await;
		}

		diversity::diversify(kept, query_vector, top_k, opts.mmr)
	}

	async fn first_pass(
		&self,
		working_query: &str,
		top_k: u32,
		threshold: f32,
		opts: &RetrievalOptions,
	) -> Result<RetrievalPass, PassError> {
		let query_vector = self.embed_single(working_query).await?;
		let with_vectors = opts.mmr;
		let mut points = Vec::new();

		if opts.hyde {
			let floor = threshold.max(HYDE_FLOOR_MIN);

			if let Some(passage) = rewrite::hyde_passage(
				self.providers.generation.as_ref(),
				&self.cfg.providers.generation,
				working_query,
			)
			.await
			{
				match self.embed_single(&passage).await {
					Ok(hyde_vector) => {
						let hyde_points = self
							.store
							.search(
								hyde_vector,
								SearchParams {
									limit: top_k as u64,
									score_floor: Some(floor),
									with_vectors,
								},
							)
							.await?;

						points.extend(hyde_points);
					},
					Err(PassError::Fatal(err)) => return Err(PassError::Fatal(err)),
					Err(PassError::Transient(err)) => {
						warn!(error = %err, "HyDE embedding failed; continuing with the plain query.");
					},
				}
			}

			let plain = self
				.store
				.search(
					query_vector.clone(),
					SearchParams { limit: top_k as u64, score_floor: Some(floor), with_vectors },
				)
				.await?;

			points.extend(plain);
		} else {
			// Over-fetch to leave room for filtering and diversification.
			let plain = self
				.store
				.search(
					query_vector.clone(),
					SearchParams {
						limit: (top_k as u64).saturating_mul(2),
						score_floor: Some(threshold),
						with_vectors,
					},
				)
				.await?;

			points.extend(plain);
		}

		Ok(RetrievalPass { hits: retriever::collect_hits(&points), query_vector })
	}

	async fn embed_single(&self, text: &str) -> Result<Vec<f32>, PassError> {
		let embeddings = self
			.providers
			.embedding
			.embed(&self.cfg.providers.embedding, std::slice::from_ref(&text.to_string()))
			.await
			.map_err(PassError::Transient)?;
		let vector = embeddings.into_iter().next().ok_or_else(|| {
			PassError::Fatal(ServiceError::Provider {
				message: "Embedding provider returned no vectors.".to_string(),
			})
		})?;

		if vector.len() != self.cfg.storage.qdrant.vector_dim as usize {
			return Err(PassError::Fatal(ServiceError::Provider {
				message: "Embedding vector dimension mismatch.".to_string(),
			}));
		}

		Ok(vector)
	}

	async fn cross_encode(&self, working_query: &str, hits: Vec<ScoredHit>) -> Vec<ScoredHit> {
		if hits.len() < 2 {
			return hits;
		}

		let sample_len = hits.len().min(cross::MAX_CROSS_CANDIDATES);
		let prompt = cross::build_prompt(working_query, &hits[..sample_len]);
		let raw = match self
			.providers
			.generation
			.generate(&self.cfg.providers.generation, &prompt)
			.await
		{
			Ok(raw) => raw,
			Err(err) => {
				warn!(error = %err, "Cross-encoder scoring failed; keeping the existing order.");

				return hits;
			},
		};

		match cross::parse_scores(&raw, sample_len) {
			BestEffort::Parsed(scores) => cross::apply_scores(hits, &scores),
			BestEffort::Fallback(_) => {
				warn!("Cross-encoder returned unparseable scores; keeping the existing order.");

				hits
			},
		}
	}

	// Every failure in here is swallowed: the corrective loop augments the
	// hit set but never gates the answer.
	async fn judge_and_refine(
		&self,
		working_query: &str,
		selected: &[ScoredHit],
		top_k: u32,
		threshold: f32,
		opts: &RetrievalOptions,
	) -> Option<Refinement> {
		let prompt = corrective::build_judge_prompt(working_query, selected);
		let raw = match self
			.providers
			.generation
			.generate(&self.cfg.providers.generation, &prompt)
			.await
		{
			Ok(raw) => raw,
			Err(err) => {
				warn!(error = %err, "Corrective judge failed; keeping current results.");

				return None;
			},
		};
		let verdict = match corrective::parse_verdict(&raw) {
			BestEffort::Parsed(verdict) => verdict,
			BestEffort::Fallback(_) => {
				warn!("Corrective judge returned unparseable output; keeping current results.");

				return None;
			},
		};

		if verdict.action == JudgeAction::Ok {
			return None;
		}

		let hint = verdict.hint?;
		let refined_query = corrective::refine_query(working_query, &hint);
		let query_vector = match self.embed_single(&refined_query).await {
			Ok(vector) => vector,
			Err(PassError::Fatal(err)) => {
				warn!(error = %err, "Refined query embedding failed; keeping current results.");

				return None;
			},
			Err(PassError::Transient(err)) => {
				warn!(error = %err, "Refined query embedding failed; keeping current results.");

				return None;
			},
		};
		let points = match self
			.store
			.search(
				query_vector.clone(),
				SearchParams {
					limit: (top_k as u64).saturating_mul(2),
					score_floor: Some(threshold),
					with_vectors: opts.mmr,
				},
			)
			.await
		{
			Ok(points) => points,
			Err(err) => {
				warn!(error = %err, "Corrective re-retrieval failed; keeping current results.");

				return None;
			},
		};

		Some(Refinement {
			query: refined_query,
			query_vector,
			hits: retriever::collect_hits(&points),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn auto_tune_widens_short_queries() {
		let (top_k, threshold) = auto_tune("solar", 25, 0.05);

		assert_eq!(top_k, 50);
		assert!((threshold - AUTO_TUNE_RELAXED_FLOOR).abs() < f32::EPSILON);
	}

	#[test]
	fn auto_tune_tightens_long_queries() {
		let query = "what is the expected maintenance interval for rooftop solar panel \
			inverters operating in coastal climates with heavy salt exposure";
		let (top_k, threshold) = auto_tune(query, 25, 0.01);

		assert_eq!(top_k, 12);
		assert!((threshold - AUTO_TUNE_TIGHTENED_FLOOR).abs() < f32::EPSILON);
	}

	#[test]
	fn auto_tune_leaves_medium_queries_alone() {
		let (top_k, threshold) = auto_tune("solar panel maintenance interval", 25, 0.02);

		assert_eq!(top_k, 25);
		assert!((threshold - 0.02).abs() < f32::EPSILON);
	}
}
