use crate::http::{JsonClient, Method};
use crate::{BackendError, EndpointConfig};

/// The image factory builds container images from stored blobs.
pub trait ImageFactoryApi: Send + Sync {
    fn health(&self) -> Result<(), BackendError>;
}

pub struct HttpImageFactory {
    client: JsonClient,
}

impl HttpImageFactory {
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            client: JsonClient::new(&config),
        }
    }
}

impl ImageFactoryApi for HttpImageFactory {
    fn health(&self) -> Result<(), BackendError> {
        let url = self.client.url("/api/v1/healthz");
        self.client
            .execute(Method::Get, &url, None, "", None, 200)
            .map(|_| ())
    }
}
