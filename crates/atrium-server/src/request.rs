//! Reading what a `tiny_http` request carries: headers, query, JSON and
//! multipart bodies.

use atrium_core::{ApiError, BlobUpload};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tiny_http::Request;

pub fn header_value(req: &Request, name: &str) -> Option<String> {
    req.headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str().to_owned())
}

pub fn read_body(req: &mut Request) -> Result<Vec<u8>, ApiError> {
    let mut body = Vec::new();
    req.as_reader()
        .read_to_end(&mut body)
        .map_err(|e| ApiError::internal(format!("cannot read request body: {e}")))?;
    Ok(body)
}

pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("cannot parse request body: {e}")))
}

pub fn read_json<T: DeserializeOwned>(req: &mut Request) -> Result<T, ApiError> {
    parse_json(&read_body(req)?)
}

/// Username and password from an HTTP Basic `Authorization` header.
pub fn basic_credentials(header: &str) -> Option<(String, String)> {
    let scheme = header.get(..6)?;
    if !scheme.eq_ignore_ascii_case("basic ") {
        return None;
    }
    let decoded = STANDARD.decode(header[6..].trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_owned(), password.to_owned()))
}

/// Decoded query string parameters, in request order.
#[derive(Debug, Default)]
pub struct Query(Vec<(String, String)>);

fn decode_component(raw: &str) -> String {
    percent_decode_str(&raw.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

impl Query {
    pub fn parse(query: &str) -> Self {
        Self(
            query
                .split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| {
                    let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                    (decode_component(key), decode_component(value))
                })
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First value whose key matches `key` ignoring ASCII case.
    pub fn get_ignore_case(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn parse_u32(&self, key: &str) -> Result<Option<u32>, ApiError> {
        self.get(key)
            .map(|value| {
                value.parse().map_err(|_| {
                    ApiError::bad_request(format!("invalid value {value:?} for {key}"))
                })
            })
            .transpose()
    }
}

#[derive(Debug)]
struct Part {
    file_name: Option<String>,
    data: Vec<u8>,
}

/// A fully buffered `multipart/form-data` body.
#[derive(Debug, Default)]
pub struct MultipartForm {
    parts: HashMap<String, Part>,
}

impl MultipartForm {
    pub fn parse(content_type: &str, body: Vec<u8>) -> Result<Self, ApiError> {
        let invalid = |e: multer::Error| ApiError::bad_request(format!("invalid multipart body: {e}"));
        let boundary = multer::parse_boundary(content_type).map_err(invalid)?;
        let stream =
            futures::stream::once(async move { Ok::<_, std::io::Error>(Bytes::from(body)) });
        let mut multipart = multer::Multipart::new(stream, boundary);

        futures::executor::block_on(async {
            let mut parts = HashMap::new();
            while let Some(field) = multipart.next_field().await? {
                let Some(name) = field.name().map(str::to_owned) else {
                    continue;
                };
                let file_name = field.file_name().map(str::to_owned);
                let data = field.bytes().await?.to_vec();
                parts.insert(name, Part { file_name, data });
            }
            Ok(Self { parts })
        })
        .map_err(invalid)
    }

    pub fn from_request(req: &mut Request) -> Result<Self, ApiError> {
        let content_type = header_value(req, "Content-Type").unwrap_or_default();
        let body = read_body(req)?;
        Self::parse(&content_type, body)
    }

    /// Decode the JSON carried by part `name`.
    pub fn json<T: DeserializeOwned>(&self, name: &str) -> Result<T, ApiError> {
        let part = self
            .parts
            .get(name)
            .ok_or_else(|| ApiError::bad_request(format!("missing multipart part {name:?}")))?;
        serde_json::from_slice(&part.data)
            .map_err(|e| ApiError::bad_request(format!("cannot parse {name}: {e}")))
    }

    /// Take part `name` as an uploaded file.
    pub fn take_file(&mut self, name: &str) -> Option<BlobUpload> {
        self.parts.remove(name).map(|part| BlobUpload {
            file_name: part.file_name.unwrap_or_default(),
            data: part.data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrium_models::Manifest;

    #[test]
    fn basic_credentials_decode() {
        let header = format!("Basic {}", STANDARD.encode("alice:s3:cret"));
        assert_eq!(
            basic_credentials(&header),
            Some(("alice".to_owned(), "s3:cret".to_owned()))
        );
        assert_eq!(basic_credentials("Bearer abc"), None);
        assert_eq!(basic_credentials("Basic !!!"), None);
        assert_eq!(basic_credentials(""), None);
    }

    #[test]
    fn query_decodes_and_matches_keys() {
        let query = Query::parse("offeringName=My+DB&planName=free%20tier&limit=5&flag");
        assert_eq!(query.get("offeringName"), Some("My DB"));
        assert_eq!(query.get_ignore_case("PLANNAME"), Some("free tier"));
        assert_eq!(query.get("flag"), Some(""));
        assert_eq!(query.parse_u32("limit").unwrap(), Some(5));
        assert_eq!(query.parse_u32("offset").unwrap(), None);
        assert_eq!(query.get("missing"), None);
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let err = Query::parse("limit=ten").parse_u32("limit").unwrap_err();
        assert_eq!(err.status, 400);
    }

    #[test]
    fn multipart_parts_are_collected() {
        let body = concat!(
            "--XYZ\r\n",
            "Content-Disposition: form-data; name=\"manifest\"\r\n",
            "\r\n",
            "{\"name\":\"web\",\"type\":\"GO\",\"instances\":1}\r\n",
            "--XYZ\r\n",
            "Content-Disposition: form-data; name=\"blob\"; filename=\"app.tar.gz\"\r\n",
            "Content-Type: application/octet-stream\r\n",
            "\r\n",
            "tarball\r\n",
            "--XYZ--\r\n",
        );
        let mut form =
            MultipartForm::parse("multipart/form-data; boundary=XYZ", body.as_bytes().to_vec())
                .unwrap();

        let manifest: Manifest = form.json("manifest").unwrap();
        assert_eq!(manifest.name, "web");
        assert_eq!(manifest.instances, 1);

        let blob = form.take_file("blob").unwrap();
        assert_eq!(blob.file_name, "app.tar.gz");
        assert_eq!(blob.data, b"tarball");
        assert!(form.take_file("blob").is_none());

        let err = form.json::<Manifest>("offering").unwrap_err();
        assert_eq!(err.status, 400);
    }

    #[test]
    fn non_multipart_content_type_is_rejected() {
        let err = MultipartForm::parse("application/json", Vec::new()).unwrap_err();
        assert_eq!(err.status, 400);
    }
}
