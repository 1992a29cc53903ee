pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Vector store error: {message}")]
	Store { message: String },
}
impl From<color_eyre::Report> for ServiceError {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<sibyl_storage::Error> for ServiceError {
	fn from(err: sibyl_storage::Error) -> Self {
		Self::Store { message: err.to_string() }
	}
}
