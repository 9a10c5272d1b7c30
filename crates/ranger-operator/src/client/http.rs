use std::{
    fmt::{Debug, Formatter},
    time::Duration,
};

use async_trait::async_trait;
use reqwest::{
    StatusCode,
    header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue},
};
use serde_json::Value;
use snafu::{ResultExt, Snafu, ensure};
use url::Url;

use crate::{
    client::{
        CreateOutcome, DecodeResponseSnafu, DeleteOutcome, DirectoryClient, MemberPayload,
        ReadResponseSnafu, SendRequestSnafu, TransportError, UnexpectedStatusSnafu,
    },
    member::{ExistingMember, MemberKind},
};

#[derive(Debug, Snafu)]
#[snafu(display("failed to build HTTP client for Ranger"))]
pub struct BuildClientError {
    source: reqwest::Error,
}

/// Basic auth credentials of a Ranger admin user.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// [`DirectoryClient`] backed by the Ranger REST API at `{base_url}/service/xusers`.
#[derive(Clone, Debug)]
pub struct RangerClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl RangerClient {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(base_url: &Url, credentials: Credentials) -> Result<Self, BuildClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .context(BuildClientSnafu)?;

        Ok(Self {
            http,
            base_url: base_url.as_str().trim_end_matches('/').to_owned(),
            credentials,
        })
    }

    fn endpoint_url(&self, kind: MemberKind) -> String {
        format!(
            "{base}/service/xusers/{endpoint}",
            base = self.base_url,
            endpoint = kind.endpoint()
        )
    }

    fn authenticated(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.basic_auth(&self.credentials.username, Some(&self.credentials.password))
    }
}

#[async_trait]
impl DirectoryClient for RangerClient {
    async fn list(&self, kind: MemberKind) -> Result<Vec<ExistingMember>, TransportError> {
        let url = self.endpoint_url(kind);
        tracing::debug!(%kind, %url, "listing members");

        let response = self
            .authenticated(self.http.get(&url))
            .send()
            .await
            .context(SendRequestSnafu { url: &url })?;

        let status = response.status();
        ensure!(
            status.is_success(),
            UnexpectedStatusSnafu {
                url: &url,
                status: status.as_u16()
            }
        );

        let body = response
            .text()
            .await
            .context(ReadResponseSnafu { url: &url })?;
        parse_member_list(kind, &body).context(DecodeResponseSnafu { url })
    }

    async fn create(&self, payload: &MemberPayload) -> Result<CreateOutcome, TransportError> {
        let url = self.endpoint_url(payload.kind());

        let response = self
            .authenticated(self.http.post(&url))
            .json(payload)
            .send()
            .await
            .context(SendRequestSnafu { url: &url })?;

        match response.status() {
            StatusCode::OK => {
                let body = response
                    .text()
                    .await
                    .context(ReadResponseSnafu { url: &url })?;
                let created = serde_json::from_str(&body).context(DecodeResponseSnafu { url })?;
                Ok(CreateOutcome::Created(created))
            }
            status => Ok(CreateOutcome::Rejected {
                status: status.as_u16(),
            }),
        }
    }

    async fn delete(&self, kind: MemberKind, id: i64) -> Result<DeleteOutcome, TransportError> {
        let url = format!("{endpoint}/{id}", endpoint = self.endpoint_url(kind));

        let response = self
            .authenticated(self.http.delete(&url))
            .send()
            .await
            .context(SendRequestSnafu { url: &url })?;

        Ok(match response.status() {
            StatusCode::NO_CONTENT => DeleteOutcome::Deleted,
            status => DeleteOutcome::Rejected {
                status: status.as_u16(),
            },
        })
    }
}

/// Extracts the members from a list response. Ranger omits the list entirely if it is empty.
fn parse_member_list(kind: MemberKind, body: &str) -> serde_json::Result<Vec<ExistingMember>> {
    let mut response: Value = serde_json::from_str(body)?;
    match response.get_mut(kind.list_key()).map(Value::take) {
        Some(members) => serde_json::from_value(members),
        None => Ok(Vec::new()),
    }
}
