use std::collections::HashSet;

use crate::{
	rerank::ScoredHit,
	retriever::dedupe_key,
};

pub const MMR_LAMBDA: f32 = 0.7;

/// Hard ceiling on context size regardless of `top_k`; prompts do not grow
/// past roughly ten passages.
pub fn context_cap(top_k: u32) -> usize {
	top_k.min(10).max(8) as usize
}

pub fn cosine_similarity(lhs: &[f32], rhs: &[f32]) -> Option<f32> {
	if lhs.is_empty() || lhs.len() != rhs.len() {
		return None;
	}

	let mut dot = 0.0_f32;
	let mut lhs_norm = 0.0_f32;
	let mut rhs_norm = 0.0_f32;

	for (l, r) in lhs.iter().zip(rhs.iter()) {
		dot += l * r;
		lhs_norm += l * l;
		rhs_norm += r * r;
	}

	if lhs_norm <= f32::EPSILON || rhs_norm <= f32::EPSILON {
		return None;
	}

	Some((dot / (lhs_norm.sqrt() * rhs_norm.sqrt())).clamp(-1.0, 1.0))
}

/// MMR when vectors are available, per-source round robin otherwise. Input
/// arrives sorted by combined score; output order is selection order.
pub fn diversify(
	candidates: Vec<ScoredHit>,
	query_vector: &[f32],
	top_k: u32,
	mmr_enabled: bool,
) -> Vec<ScoredHit> {
	let cap = context_cap(top_k);
	let take = (top_k as usize).min(cap);
	let vector_count = candidates.iter().filter(|hit| hit.hit.vector.is_some()).count();

	if mmr_enabled && vector_count >= 2 {
		mmr_select(candidates, query_vector, take)
	} else {
		source_round_robin(candidates, take)
	}
}

fn mmr_select(candidates: Vec<ScoredHit>, query_vector: &[f32], take: usize) -> Vec<ScoredHit> {
	let mut remaining: Vec<usize> =
		(0..candidates.len()).filter(|&idx| candidates[idx].hit.vector.is_some()).collect();
	let backfill: Vec<usize> =
		(0..candidates.len()).filter(|&idx| candidates[idx].hit.vector.is_none()).collect();
	let mut selected: Vec<usize> = Vec::new();

	while selected.len() < take && !remaining.is_empty() {
		let mut best_pos = 0;
		let mut best_score = f32::NEG_INFINITY;

		for (pos, &idx) in remaining.iter().enumerate() {
			let Some(vector) = candidates[idx].hit.vector.as_deref() else { continue };
			let relevance = cosine_similarity(vector, query_vector).unwrap_or(0.0);
			let redundancy = selected
				.iter()
				.filter_map(|&chosen| candidates[chosen].hit.vector.as_deref())
				.filter_map(|chosen| cosine_similarity(vector, chosen))
				.fold(0.0_f32, f32::max);
			let mmr = MMR_LAMBDA * relevance - (1.0 - MMR_LAMBDA) * redundancy;

			if mmr > best_score {
				best_score = mmr;
				best_pos = pos;
			}
		}

		selected.push(remaining.remove(best_pos));
	}

	// Candidates without vectors backfill in score order.
	for idx in backfill {
		if selected.len() >= take {
			break;
		}

		selected.push(idx);
	}

	selected.into_iter().map(|idx| candidates[idx].clone()).collect()
}

fn source_round_robin(candidates: Vec<ScoredHit>, take: usize) -> Vec<ScoredHit> {
	let mut seen_sources = HashSet::new();
	let mut first_pass = Vec::new();
	let mut leftovers = Vec::new();

	for (idx, candidate) in candidates.iter().enumerate() {
		if seen_sources.insert(dedupe_key(&candidate.hit)) {
			first_pass.push(idx);
		} else {
			leftovers.push(idx);
		}
	}

	let mut out = Vec::new();

	for idx in first_pass.into_iter().chain(leftovers) {
		if out.len() >= take {
			break;
		}

		out.push(candidates[idx].clone());
	}

	out
}
