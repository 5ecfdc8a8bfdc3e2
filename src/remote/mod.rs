//! Remote configuration service access.

mod address;
mod backend;
pub(crate) mod context;
mod endpoint;
mod listener;
pub(crate) mod signing;

pub use address::ServerAddress;
pub use backend::ConfigBackend;
pub use context::ApiPaths;
pub use endpoint::ConfigEndpoint;
pub use listener::{
    DEFAULT_LONG_POLL_TIMEOUT, FIELD_SEPARATOR, ListenRecord, LongPollListener, ProbeOutcome,
    RECORD_SEPARATOR, Separator, decode_listen_request, decode_listen_response,
    encode_listen_request,
};
pub use signing::{SignedHeaders, canonical_string, sign_sha1};
