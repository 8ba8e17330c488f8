use crate::http::{JsonClient, Method};
use crate::{BackendError, EndpointConfig};
use reqwest::blocking::multipart::{Form, Part};

/// Binary artifact storage keyed by image id.
pub trait BlobStoreApi: Send + Sync {
    fn store_blob(&self, blob_id: &str, file_name: &str, data: Vec<u8>)
        -> Result<(), BackendError>;
    fn delete_blob(&self, blob_id: &str) -> Result<(), BackendError>;
}

pub struct HttpBlobStore {
    config: EndpointConfig,
    client: JsonClient,
    upload: reqwest::blocking::Client,
}

impl HttpBlobStore {
    pub fn new(config: EndpointConfig) -> Self {
        let client = JsonClient::new(&config);
        Self {
            config,
            client,
            upload: reqwest::blocking::Client::new(),
        }
    }
}

impl BlobStoreApi for HttpBlobStore {
    fn store_blob(
        &self,
        blob_id: &str,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<(), BackendError> {
        let url = self.client.url("/api/v1/blobs");
        tracing::debug!("POST {url} ({} bytes)", data.len());
        let form = Form::new()
            .text("blobID", blob_id.to_owned())
            .part("uploadfile", Part::bytes(data).file_name(file_name.to_owned()));
        let resp = self
            .upload
            .post(&url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .multipart(form)
            .send()
            .map_err(|e| BackendError::Transport(format!("{url}: {e}")))?;

        let status = resp.status().as_u16();
        if status != 201 {
            let body = resp.text().unwrap_or_default();
            return Err(BackendError::Status {
                status,
                message: format!(
                    "bad response status: {status}, expected status was: 201, response body: {body}"
                ),
            });
        }
        Ok(())
    }

    fn delete_blob(&self, blob_id: &str) -> Result<(), BackendError> {
        let url = self.client.url(&format!("/api/v1/blobs/{blob_id}"));
        self.client
            .execute(Method::Delete, &url, None, "", None, 204)
            .map(|_| ())
    }
}
