use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::api::{ManagementReply, ManagementRequest, ManagementResponse};
use crate::error::{Error, ErrorResponse, Result};
use crate::serializer::TopologySerializer;
use crate::service::ManagementService;
use crate::topology::MemberId;

/// Delivers management requests to the member running the coordinator.
///
/// `timeout` bounds the request round trip only. A timed out request may
/// still have started a change; callers re-query the topology instead of
/// assuming failure.
#[async_trait]
pub trait RequestTransport: Send + Sync {
    async fn send_with_retry(
        &self,
        target: &MemberId,
        request: ManagementRequest,
        timeout: Duration,
    ) -> Result<ManagementResponse>;
}

/// In-process transport. Requests and replies still go through the
/// serializer so the wire format is exercised.
pub struct LocalTransport {
    serializer: Arc<dyn TopologySerializer>,
    endpoints: RwLock<HashMap<MemberId, Arc<ManagementService>>>,
    retry_interval: Duration,
}

impl LocalTransport {
    pub fn new(serializer: Arc<dyn TopologySerializer>, retry_interval: Duration) -> Self {
        Self {
            serializer,
            endpoints: RwLock::new(HashMap::new()),
            retry_interval,
        }
    }

    pub async fn register(&self, member: MemberId, service: Arc<ManagementService>) {
        self.endpoints.write().await.insert(member, service);
    }

    pub async fn unregister(&self, member: &MemberId) {
        self.endpoints.write().await.remove(member);
    }

    async fn send_once(&self, target: &MemberId, request: &[u8]) -> Result<ManagementResponse> {
        let service = self
            .endpoints
            .read()
            .await
            .get(target)
            .cloned()
            .ok_or_else(|| Error::Unavailable(format!("no endpoint for member {target}")))?;

        let request = self.serializer.decode_request(request)?;
        let reply: ManagementReply = match service.handle(request).await {
            Ok(response) => Ok(response),
            Err(e @ Error::Unavailable(_)) => return Err(e),
            Err(e) => Err(ErrorResponse::from(&e)),
        };

        let bytes = self.serializer.encode_reply(&reply)?;
        self.serializer.decode_reply(&bytes)?.map_err(Error::from)
    }
}

#[async_trait]
impl RequestTransport for LocalTransport {
    async fn send_with_retry(
        &self,
        target: &MemberId,
        request: ManagementRequest,
        timeout: Duration,
    ) -> Result<ManagementResponse> {
        let bytes = self.serializer.encode_request(&request)?;
        let attempts = async {
            loop {
                match self.send_once(target, &bytes).await {
                    Err(Error::Unavailable(reason)) => {
                        tracing::debug!(member = %target, %reason, "coordinator unavailable, retrying");
                        tokio::time::sleep(self.retry_interval).await;
                    }
                    result => return result,
                }
            }
        };

        tokio::time::timeout(timeout, attempts)
            .await
            .map_err(|_| Error::TransportTimeout(timeout))?
    }
}
