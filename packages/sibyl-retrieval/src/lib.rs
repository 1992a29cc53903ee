pub mod context;
pub mod corrective;
pub mod cross;
pub mod diversity;
mod error;
pub mod filter;
pub mod pipeline;
pub mod rerank;
pub mod retriever;
pub mod rewrite;

use std::{future::Future, pin::Pin, sync::Arc};

use qdrant_client::qdrant::ScoredPoint;

use sibyl_config::{Config, EmbeddingProviderConfig, GenerationProviderConfig};
use sibyl_providers::{embedding, generation};
use sibyl_storage::{SearchParams, VectorStore};

pub use context::ContextSource;
pub use error::{ServiceError, ServiceResult};
pub use pipeline::{ContextBundle, RetrievalOptions, RetrievalRequest};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

pub trait GenerationProvider
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		prompt: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<String>>;
}

/// The store's ranked-search capability; results arrive sorted by
/// descending similarity score.
pub trait VectorSearch
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		vector: Vec<f32>,
		params: SearchParams,
	) -> BoxFuture<'a, color_eyre::Result<Vec<ScoredPoint>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub generation: Arc<dyn GenerationProvider>,
}

pub struct RetrievalService {
	pub cfg: Config,
	pub store: Arc<dyn VectorSearch>,
	pub providers: Providers,
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

impl GenerationProvider for DefaultProviders {
	fn generate<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		prompt: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(generation::generate(cfg, prompt))
	}
}

impl VectorSearch for VectorStore {
	fn search<'a>(
		&'a self,
		vector: Vec<f32>,
		params: SearchParams,
	) -> BoxFuture<'a, color_eyre::Result<Vec<ScoredPoint>>> {
		Box::pin(async move {
			let points = VectorStore::search(self, vector, params).await?;

			Ok(points)
		})
	}
}

impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>, generation: Arc<dyn GenerationProvider>) -> Self {
		Self { embedding, generation }
	}
}

impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);
		Self { embedding: provider.clone(), generation: provider }
	}
}

impl RetrievalService {
	pub fn new(cfg: Config, store: VectorStore) -> Self {
		Self { cfg, store: Arc::new(store), providers: Providers::default() }
	}

	pub fn with_providers(cfg: Config, store: Arc<dyn VectorSearch>, providers: Providers) -> Self {
		Self { cfg, store, providers }
	}
}
