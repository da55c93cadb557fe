//! Echo handler used by the stub engine host

use async_trait::async_trait;

use shared::ClientId;

use crate::error::HostResult;
use crate::traits::RequestHandler;

/// Answers every request with the request itself
#[derive(Debug, Default, Clone)]
pub struct EchoHandler;

#[async_trait]
impl<T: Send + Sync + 'static> RequestHandler<T, T> for EchoHandler {
    async fn handle(&self, _client: ClientId, request: T) -> HostResult<T> {
        Ok(request)
    }
}
