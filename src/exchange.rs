//! Service-account credential → access token → SCM credential → organization.
//!
//! Each stage consumes the previous stage's output, so the chain is strictly
//! sequential. Every response body that ends up in an error has already been
//! passed through [`redact_body`].
use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::config::{Endpoints, ServiceAccountCredential};
use crate::secret::{redact_body, Secret};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Identity,
    ScmToken,
    Organizations,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Identity => "identity token exchange",
            Self::ScmToken => "SCM token exchange",
            Self::Organizations => "organization lookup",
        })
    }
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("{stage}: request failed: {source}")]
    Transport {
        stage: Stage,
        #[source]
        source: reqwest::Error,
    },
    #[error("{stage}: service returned an error: {error}; response: {body}")]
    Remote {
        stage: Stage,
        error: String,
        body: String,
    },
    #[error("{stage}: unexpected HTTP status {status}; response: {body}")]
    Status { stage: Stage, status: u16, body: String },
    #[error("{stage}: response is not valid JSON: {reason}; response: {body}")]
    Parse {
        stage: Stage,
        reason: String,
        body: String,
    },
    #[error("{stage}: response is missing `{field}`; response: {body}")]
    MissingField {
        stage: Stage,
        field: &'static str,
        body: String,
    },
    #[error("organization lookup: no organizations found for this account; response: {body}")]
    NoOrganizations { body: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityResponse {
    access_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScmTokenResponse {
    access_token: Option<String>,
    user: Option<String>,
}

#[derive(Deserialize)]
struct OrganizationsResponse {
    organizations: Option<Vec<String>>,
}

/// Stage-1 output: a project-scoped bearer token, good for one exchange.
#[derive(Debug)]
pub struct AccessToken(Secret<String>);

/// Stage-2 output: what the SCM client authenticates with.
#[derive(Debug, Clone)]
pub struct ScmCredential {
    pub username: Secret<String>,
    pub token: Secret<String>,
}

impl ScmCredential {
    fn basic_auth(&self) -> Secret<String> {
        basic_auth(self.username.expose(), self.token.expose())
    }
}

/// Everything the configurator needs. Only a completed chain produces one.
#[derive(Debug)]
pub struct CloudLogin {
    pub credential: ScmCredential,
    pub organization: String,
}

fn basic_auth(user: &str, pass: &str) -> Secret<String> {
    let encoded = Secret::masked(BASE64.encode(format!("{user}:{pass}")));
    Secret::new(format!("Basic {}", encoded.expose()))
}

fn with_auth(request: RequestBuilder, auth: &Secret<String>) -> RequestBuilder {
    match HeaderValue::from_str(auth.expose()) {
        Ok(mut value) => {
            value.set_sensitive(true);
            request.header(AUTHORIZATION, value)
        }
        // Base64 output is always a valid header value.
        Err(_) => request,
    }
}

/// Send `request` and decode the body into `T`. An explicit `error` field
/// is reported first, whatever the HTTP status.
fn exchange<T: DeserializeOwned>(
    stage: Stage,
    request: RequestBuilder,
) -> Result<(T, String), ExchangeError> {
    let transport = |source: reqwest::Error| ExchangeError::Transport {
        stage,
        source: source.without_url(),
    };
    let response = request.send().map_err(transport)?;
    let status = response.status();
    let raw = response.text().map_err(transport)?;
    tracing::debug!("{stage}: HTTP {status}");

    // The error field is checked on the untyped body so that a schema
    // mismatch elsewhere cannot hide it.
    let value = serde_json::from_str::<serde_json::Value>(&raw);
    if let Some(error) = value
        .as_ref()
        .ok()
        .and_then(|v| v.get("error"))
        .filter(|e| !e.is_null())
    {
        return Err(ExchangeError::Remote {
            stage,
            error: error_text(error),
            body: redact_body(&raw),
        });
    }
    if !status.is_success() {
        return Err(ExchangeError::Status {
            stage,
            status: status.as_u16(),
            body: redact_body(&raw),
        });
    }
    let parse = |reason: String| ExchangeError::Parse {
        stage,
        reason,
        body: redact_body(&raw),
    };
    let value = value.map_err(|e| parse(e.to_string()))?;
    let body = serde_json::from_value::<T>(value).map_err(|e| parse(e.to_string()))?;
    Ok((body, raw))
}

fn error_text(error: &serde_json::Value) -> String {
    match error {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn required(
    stage: Stage,
    field: &'static str,
    value: Option<String>,
    raw: &str,
) -> Result<String, ExchangeError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ExchangeError::MissingField {
            stage,
            field,
            body: redact_body(raw),
        })
}

pub struct CredentialExchange<'a> {
    client: &'a Client,
    endpoints: &'a Endpoints,
}

impl<'a> CredentialExchange<'a> {
    pub fn new(client: &'a Client, endpoints: &'a Endpoints) -> Self {
        Self { client, endpoints }
    }

    /// Run the whole chain. With `organization` set, the organization lookup is skipped.
    pub fn run(
        &self,
        project_id: &str,
        credential: ServiceAccountCredential,
        organization: Option<&str>,
    ) -> Result<CloudLogin, ExchangeError> {
        let access = self.identity_token(project_id, credential)?;
        let scm = self.scm_credential(access)?;
        let organization = match organization {
            Some(org) => {
                tracing::info!("Using organization {org}");
                org.to_string()
            }
            None => self.first_organization(&scm)?,
        };
        Ok(CloudLogin {
            credential: scm,
            organization,
        })
    }

    pub fn identity_token(
        &self,
        project_id: &str,
        credential: ServiceAccountCredential,
    ) -> Result<AccessToken, ExchangeError> {
        const STAGE: Stage = Stage::Identity;
        tracing::info!("Exchanging service account credentials for an access token...");

        let auth = basic_auth(&credential.key, credential.secret.expose());
        let request = self
            .client
            .post(&self.endpoints.identity_url)
            .query(&[("projectId", project_id)])
            .json(&serde_json::json!({ "scopes": [] }));
        let (body, raw) = exchange::<IdentityResponse>(STAGE, with_auth(request, &auth))?;

        let token = required(STAGE, "accessToken", body.access_token, &raw)?;
        Ok(AccessToken(Secret::masked(token)))
    }

    pub fn scm_credential(&self, access: AccessToken) -> Result<ScmCredential, ExchangeError> {
        const STAGE: Stage = Stage::ScmToken;
        tracing::info!("Exchanging access token for an SCM token...");

        let url = format!(
            "{}/oauth/unityid/exchange/{}",
            self.endpoints.cloud_api.trim_end_matches('/'),
            access.0.expose()
        );
        let (body, raw) = exchange::<ScmTokenResponse>(STAGE, self.client.get(url))?;

        let token = required(STAGE, "accessToken", body.access_token, &raw)?;
        let user = required(STAGE, "user", body.user, &raw)?;
        Ok(ScmCredential {
            username: Secret::masked(user),
            token: Secret::masked(token),
        })
    }

    pub fn first_organization(&self, credential: &ScmCredential) -> Result<String, ExchangeError> {
        const STAGE: Stage = Stage::Organizations;
        tracing::info!("Looking up organizations...");

        let url = format!("{}/v1/organizations", self.endpoints.cloud_api.trim_end_matches('/'));
        let request = with_auth(self.client.get(url), &credential.basic_auth());
        let (body, raw) = exchange::<OrganizationsResponse>(STAGE, request)?;

        let organization = body
            .organizations
            .and_then(|orgs| orgs.into_iter().next())
            .filter(|o| !o.is_empty())
            .ok_or_else(|| ExchangeError::NoOrganizations {
                body: redact_body(&raw),
            })?;
        tracing::info!("Using organization {organization}");
        Ok(organization)
    }
}
