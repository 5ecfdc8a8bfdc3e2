//! Long-poll change probe and its wire format.
//!
//! A listen request names the watched entry together with the fingerprint the
//! client last saw:
//!
//! ```text
//! data_id FS group FS fingerprint FS namespace RS
//! ```
//!
//! where `FS` is `\x02` and `RS` is `\x01`. The server holds the request for
//! up to the advertised timeout and answers with an empty body when nothing
//! changed, or with one `data_id FS group [FS namespace] RS` record per
//! changed entry, usually percent-encoded.

use super::context::{FORM_CONTENT_TYPE, HttpContext, timestamp_millis};
use super::endpoint::{check_status, send, with_signature};
use super::signing::TIMESTAMP_HEADER;
use crate::core::{AuthMode, ConfigKey, Fingerprint, RequestAuth, Session};
use crate::error::{NacosError, Result};
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Separator between the fields of one record.
pub const FIELD_SEPARATOR: char = '\u{2}';
/// Separator terminating each record.
pub const RECORD_SEPARATOR: char = '\u{1}';

/// Default server-side hold advertised in `Long-Pulling-Timeout`.
pub const DEFAULT_LONG_POLL_TIMEOUT: Duration = Duration::from_millis(3000);

/// Header advertising how long the server may hold the request.
pub const LONG_POLL_TIMEOUT_HEADER: &str = "Long-Pulling-Timeout";

/// Form field carrying the listen request in token mode.
const LISTENING_CONFIGS_FIELD: &str = "Listening-Configs";
/// Form field carrying the listen request in signature and anonymous modes.
const PROBE_MODIFY_FIELD: &str = "Probe-Modify-Request";

/// How separators are written into an encoded listen request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Separator {
    /// Raw `\x02` / `\x01` bytes (percent-escaped by the form encoder).
    #[default]
    Control,
    /// The three-character text `%02` / `%01`.
    Literal,
}

impl Separator {
    fn field(self) -> &'static str {
        match self {
            Self::Control => "\u{2}",
            Self::Literal => "%02",
        }
    }

    fn record(self) -> &'static str {
        match self {
            Self::Control => "\u{1}",
            Self::Literal => "%01",
        }
    }
}

/// One watched entry inside a listen request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenRecord {
    /// Entry id
    pub data_id: String,
    /// Group name
    pub group: String,
    /// Last known fingerprint (empty when nothing was seen yet)
    pub fingerprint: Fingerprint,
    /// Namespace id
    pub namespace: String,
}

impl ListenRecord {
    /// Record for `key` at `fingerprint`.
    pub fn new(key: &ConfigKey, fingerprint: &Fingerprint) -> Self {
        Self {
            data_id: key.data_id.clone(),
            group: key.group.clone(),
            fingerprint: fingerprint.clone(),
            namespace: key.namespace.clone(),
        }
    }
}

/// Encode records into the listen request payload.
pub fn encode_listen_request(records: &[ListenRecord], separator: Separator) -> String {
    let fs = separator.field();
    let rs = separator.record();
    let mut out = String::new();
    for record in records {
        out.push_str(&record.data_id);
        out.push_str(fs);
        out.push_str(&record.group);
        out.push_str(fs);
        out.push_str(record.fingerprint.as_str());
        out.push_str(fs);
        out.push_str(&record.namespace);
        out.push_str(rs);
    }
    out
}

/// Decode a listen request payload written in either separator style.
///
/// # Errors
///
/// Returns [`NacosError::Decode`] if a record does not carry four fields.
pub fn decode_listen_request(payload: &str) -> Result<Vec<ListenRecord>> {
    split_records(payload)
        .into_iter()
        .map(|fields| match <[String; 4]>::try_from(fields) {
            Ok([data_id, group, fingerprint, namespace]) => Ok(ListenRecord {
                data_id,
                group,
                fingerprint: Fingerprint::from_digest(fingerprint),
                namespace,
            }),
            Err(fields) => Err(NacosError::Decode(format!(
                "listen record has {} fields, expected 4",
                fields.len()
            ))),
        })
        .collect()
}

/// Outcome of one long-poll probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The server named the watched entry as changed.
    Changed,
    /// Nothing changed within the hold time.
    Unchanged,
}

/// Decide whether a listener response reports a change of `data_id`.
///
/// Empty, malformed, or foreign-entry bodies all count as unchanged.
pub fn decode_listen_response(body: &str, data_id: &str) -> ProbeOutcome {
    if body.trim().is_empty() {
        return ProbeOutcome::Unchanged;
    }
    let named = split_records(body)
        .into_iter()
        .any(|fields| fields.first().map(String::as_str) == Some(data_id));
    if named {
        ProbeOutcome::Changed
    } else {
        ProbeOutcome::Unchanged
    }
}

/// Percent-decode, then split into records of fields.
fn split_records(text: &str) -> Vec<Vec<String>> {
    let decoded = percent_decode_str(text.trim()).decode_utf8_lossy();
    decoded
        .split(RECORD_SEPARATOR)
        .filter(|record| !record.is_empty())
        .map(|record| record.split(FIELD_SEPARATOR).map(str::to_string).collect())
        .collect()
}

/// Issues held listen requests for single entries.
pub struct LongPollListener {
    ctx: Arc<HttpContext>,
    session: Arc<Session>,
    hold: Duration,
    separator: Separator,
}

impl LongPollListener {
    pub(crate) fn new(
        ctx: Arc<HttpContext>,
        session: Arc<Session>,
        hold: Duration,
        separator: Separator,
    ) -> Self {
        Self {
            ctx,
            session,
            hold,
            separator,
        }
    }

    /// Ask the server whether `key` moved away from `fingerprint`.
    ///
    /// Blocks for up to the advertised hold time when nothing changes.
    pub async fn probe(&self, key: &ConfigKey, fingerprint: &Fingerprint) -> Result<ProbeOutcome> {
        let payload = encode_listen_request(&[ListenRecord::new(key, fingerprint)], self.separator);

        let timestamp = timestamp_millis();
        let auth = self
            .session
            .authorize(&key.namespace, &key.group, &timestamp)
            .await?;

        let field = match self.session.mode() {
            AuthMode::Token { .. } => LISTENING_CONFIGS_FIELD,
            _ => PROBE_MODIFY_FIELD,
        };
        let mut form = vec![(field, payload)];
        if let RequestAuth::Token(token) = &auth {
            form.push(("accessToken", token.clone()));
        }

        let url = self.ctx.url(&self.ctx.paths.listener).await?;
        let request = self
            .ctx
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .header(LONG_POLL_TIMEOUT_HEADER, self.hold.as_millis().to_string())
            .header("exConfigInfo", "true")
            .header(TIMESTAMP_HEADER, &timestamp)
            .form(&form)
            .timeout(self.hold + self.ctx.request_timeout);

        debug!(
            namespace = %key.namespace,
            group = %key.group,
            data_id = %key.data_id,
            fingerprint = %fingerprint,
            "long-poll probe"
        );
        let started = Instant::now();
        let (status, body) = send(with_signature(request, &auth)).await?;
        check_status(status, &body)?;

        let outcome = decode_listen_response(&body, &key.data_id);
        trace!(
            data_id = %key.data_id,
            held_ms = started.elapsed().as_millis() as u64,
            ?outcome,
            "long-poll returned"
        );
        Ok(outcome)
    }
}
