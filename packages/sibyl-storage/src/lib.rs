mod error;
pub mod qdrant;

pub use error::{Error, Result};
pub use qdrant::{DENSE_VECTOR_NAME, SearchParams, VectorStore};
