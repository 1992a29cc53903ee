use std::{future::Future, pin::Pin, sync::Arc};

use futures::channel::mpsc::UnboundedSender;
use serde_json::Value;

use sibyl_config::GenerationProviderConfig;
use sibyl_providers::generation;
use sibyl_retrieval::RetrievalService;
use sibyl_storage::VectorStore;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Streams final-answer deltas into the caller's channel. A closed channel
/// means the client went away; implementations stop emitting and return.
pub trait ChatStream
where
	Self: Send + Sync,
{
	fn stream<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		messages: &'a [Value],
		deltas: UnboundedSender<String>,
	) -> BoxFuture<'a, color_eyre::Result<()>>;
}

struct DefaultChatStream;

impl ChatStream for DefaultChatStream {
	fn stream<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		messages: &'a [Value],
		deltas: UnboundedSender<String>,
	) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(generation::stream_chat(cfg, messages, deltas))
	}
}

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<RetrievalService>,
	pub chat: Arc<dyn ChatStream>,
}
impl AppState {
	pub fn new(config: sibyl_config::Config) -> color_eyre::Result<Self> {
		let store = VectorStore::new(&config.storage.qdrant)?;
		let service = RetrievalService::new(config, store);

		Ok(Self { service: Arc::new(service), chat: Arc::new(DefaultChatStream) })
	}

	pub fn with_chat(service: Arc<RetrievalService>, chat: Arc<dyn ChatStream>) -> Self {
		Self { service, chat }
	}
}
