pub const DENSE_VECTOR_NAME: &str = "dense";

use qdrant_client::qdrant::{Query, QueryPointsBuilder, ScoredPoint};

use crate::Result;

/// One dense nearest-neighbor search. `score_floor` is the store's own
/// inclusive absolute cutoff, distinct from the pipeline's dynamic filter.
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
	pub limit: u64,
	pub score_floor: Option<f32>,
	pub with_vectors: bool,
}

pub struct VectorStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl VectorStore {
	pub fn new(cfg: &sibyl_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Results come back sorted by descending similarity score; that
	/// ordering is part of the store's contract and is relied on downstream.
	pub async fn search(&self, vector: Vec<f32>, params: SearchParams) -> Result<Vec<ScoredPoint>> {
		let mut query = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector))
			.using(DENSE_VECTOR_NAME)
			.with_payload(true)
			.with_vectors(params.with_vectors)
			.limit(params.limit);

		if let Some(floor) = params.score_floor {
			query = query.score_threshold(floor);
		}

		let response = self.client.query(query).await?;

		Ok(response.result)
	}
}
