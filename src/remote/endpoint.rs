//! Fetch and publish against the remote configuration service.

use super::context::{FORM_CONTENT_TYPE, HttpContext, timestamp_millis};
use super::signing::{ACCESS_KEY_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::core::{ConfigKey, RequestAuth, Session};
use crate::error::{NacosError, Result};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Application code returned by the v2 API when an entry does not exist.
const CODE_NOT_FOUND: i64 = 20004;

/// Response envelope of the v2 config API.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

/// Stateless request/response mapping for fetch and publish.
///
/// Each call is a single round trip; nothing is retried here.
pub struct ConfigEndpoint {
    ctx: Arc<HttpContext>,
    session: Arc<Session>,
}

impl ConfigEndpoint {
    pub(crate) fn new(ctx: Arc<HttpContext>, session: Arc<Session>) -> Self {
        Self { ctx, session }
    }

    /// Fetch the content of `key`.
    ///
    /// # Errors
    ///
    /// - [`NacosError::Unauthorized`] on 401/403
    /// - [`NacosError::NotFound`] on 404 or the not-found application code
    /// - [`NacosError::Server`] on any other non-200 status or non-zero code
    /// - [`NacosError::Transport`] if the request could not be completed
    pub async fn fetch(&self, key: &ConfigKey) -> Result<String> {
        debug!(
            namespace = %key.namespace,
            group = %key.group,
            data_id = %key.data_id,
            "fetching config"
        );

        let timestamp = timestamp_millis();
        let auth = self
            .session
            .authorize(&key.namespace, &key.group, &timestamp)
            .await?;

        let mut params = key_params(key);
        if let RequestAuth::Token(token) = &auth {
            params.push(("accessToken", token.clone()));
        }

        let url = self.ctx.url(&self.ctx.paths.config).await?;
        let request = self
            .ctx
            .http
            .get(&url)
            .query(&params)
            .header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .header(TIMESTAMP_HEADER, &timestamp)
            .timeout(self.ctx.request_timeout);
        let (status, body) = send(with_signature(request, &auth)).await?;
        check_status(status, &body)?;

        if matches!(auth, RequestAuth::Signed(_)) {
            return Ok(body);
        }
        decode_fetch(&body)
    }

    /// Publish `content` as the new value of `key`.
    ///
    /// Any acknowledgment other than an affirmative one is an error carrying
    /// the raw body.
    pub async fn publish(&self, key: &ConfigKey, content: &str) -> Result<()> {
        debug!(
            namespace = %key.namespace,
            group = %key.group,
            data_id = %key.data_id,
            "publishing config"
        );

        let timestamp = timestamp_millis();
        let auth = self
            .session
            .authorize(&key.namespace, &key.group, &timestamp)
            .await?;

        let mut params = key_params(key);
        params.push(("content", content.to_string()));
        if let RequestAuth::Token(token) = &auth {
            params.push(("accessToken", token.clone()));
        }

        let url = self.ctx.url(&self.ctx.paths.config).await?;
        let request = self
            .ctx
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .header(TIMESTAMP_HEADER, &timestamp)
            .form(&params)
            .timeout(self.ctx.request_timeout);
        let (status, body) = send(with_signature(request, &auth)).await?;
        check_status(status, &body)?;
        decode_publish_ack(&body)
    }
}

fn key_params(key: &ConfigKey) -> Vec<(&'static str, String)> {
    vec![
        ("tenant", key.namespace.clone()),
        ("namespaceId", key.namespace.clone()),
        ("group", key.group.clone()),
        ("dataId", key.data_id.clone()),
    ]
}

/// Attach `Spas-*` headers when the request is signed.
///
/// The caller sends the signed timestamp in the `Timestamp` header.
pub(crate) fn with_signature(request: RequestBuilder, auth: &RequestAuth) -> RequestBuilder {
    match auth {
        RequestAuth::Signed(headers) => request
            .header(ACCESS_KEY_HEADER, &headers.access_key)
            .header(SIGNATURE_HEADER, &headers.signature),
        _ => request,
    }
}

pub(crate) async fn send(request: RequestBuilder) -> Result<(StatusCode, String)> {
    let response = request.send().await?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| NacosError::Transport(format!("Failed to read body: {}", e)))?;
    Ok((status, body))
}

/// Anything but 200 is an error, whatever the body says.
pub(crate) fn check_status(status: StatusCode, body: &str) -> Result<()> {
    match status {
        StatusCode::OK => Ok(()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(NacosError::Unauthorized(body.to_string()))
        }
        StatusCode::NOT_FOUND => Err(NacosError::NotFound(body.to_string())),
        other => Err(NacosError::server(other.as_u16(), body)),
    }
}

fn decode_fetch(body: &str) -> Result<String> {
    let envelope: Envelope<String> = serde_json::from_str(body)
        .map_err(|e| NacosError::Decode(format!("Failed to parse config response: {}", e)))?;

    match envelope.code {
        0 => Ok(envelope.data.unwrap_or_default()),
        CODE_NOT_FOUND => Err(NacosError::NotFound(
            envelope.message.unwrap_or_else(|| body.to_string()),
        )),
        _ => Err(NacosError::server(StatusCode::OK.as_u16(), body)),
    }
}

/// Publish acknowledgments come as plain `true`/`false` or as the JSON envelope.
fn decode_publish_ack(body: &str) -> Result<()> {
    match body.trim() {
        "true" => return Ok(()),
        "false" => return Err(NacosError::server(StatusCode::OK.as_u16(), body)),
        _ => {}
    }

    let envelope: Envelope<bool> = serde_json::from_str(body)
        .map_err(|e| NacosError::Decode(format!("Failed to parse publish response: {}", e)))?;

    if envelope.code == 0 && envelope.data != Some(false) {
        Ok(())
    } else {
        Err(NacosError::server(StatusCode::OK.as_u16(), body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_status_mapping() {
        assert!(check_status(StatusCode::OK, "").is_ok());
        assert!(matches!(
            check_status(StatusCode::FORBIDDEN, "no"),
            Err(NacosError::Unauthorized(_))
        ));
        assert!(matches!(
            check_status(StatusCode::NOT_FOUND, "gone"),
            Err(NacosError::NotFound(_))
        ));
        assert!(matches!(
            check_status(StatusCode::CREATED, "ok"),
            Err(NacosError::Server { status: 201, .. })
        ));
    }

    #[test]
    fn test_decode_fetch() {
        let body = r#"{"code":0,"message":"success","data":"123"}"#;
        assert_eq!(decode_fetch(body).unwrap(), "123");

        let missing = r#"{"code":20004,"message":"config data not exist","data":null}"#;
        assert!(matches!(decode_fetch(missing), Err(NacosError::NotFound(_))));

        let failed = r#"{"code":30000,"message":"server error","data":null}"#;
        assert!(matches!(decode_fetch(failed), Err(NacosError::Server { .. })));

        assert!(matches!(decode_fetch("<html>"), Err(NacosError::Decode(_))));
    }

    #[test]
    fn test_decode_publish_ack() {
        assert!(decode_publish_ack("true").is_ok());
        assert!(decode_publish_ack(r#"{"code":0,"message":"success","data":true}"#).is_ok());

        let rejected = decode_publish_ack("false").unwrap_err();
        assert!(matches!(rejected, NacosError::Server { status: 200, ref body } if body == "false"));

        assert!(decode_publish_ack(r#"{"code":0,"data":false}"#).is_err());
        assert!(decode_publish_ack(r#"{"code":500,"data":true}"#).is_err());
        assert!(matches!(decode_publish_ack("ok?"), Err(NacosError::Decode(_))));
    }
}
