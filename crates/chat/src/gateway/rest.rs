//! Hosted backend HTTP client
//!
//! Speaks the PostgREST dialect used by the managed backend for row access
//! and its token endpoint for password sign-in. Uses synchronous HTTP (ureq)
//! to stay executor-agnostic.

use anyhow::{Context, Result};
use log::{debug, info};
use serde::Deserialize;
use serde_json::Value;
use std::sync::RwLock;
use url::Url;

use super::{AuthProvider, Filter, Query, Row, RowGateway, Table};
use crate::config::BackendCredentials;
use crate::error::BackendError;
use crate::models::User;

/// Signed-in session returned by the token endpoint
#[derive(Debug, Clone, Deserialize)]
struct Session {
    access_token: String,
    user: User,
}

/// Error body shapes returned by the backend
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
}

/// Render a filter value the way PostgREST expects it in a query string
fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn filter_param(filter: &Filter) -> (String, String) {
    match filter {
        Filter::Eq(column, value) => (column.clone(), format!("eq.{}", literal(value))),
        Filter::Gt(column, value) => (column.clone(), format!("gt.{}", literal(value))),
        Filter::In(column, values) => {
            let list: Vec<String> = values
                .iter()
                .map(|v| match v {
                    Value::String(s) => format!("\"{}\"", s.replace('"', "\\\"")),
                    other => literal(other),
                })
                .collect();
            (column.clone(), format!("in.({})", list.join(",")))
        }
    }
}

fn order_param(query: &Query) -> Option<String> {
    if query.order.is_empty() {
        return None;
    }
    let parts: Vec<String> = query
        .order
        .iter()
        .map(|o| format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" }))
        .collect();
    Some(parts.join(","))
}

/// Row gateway and auth provider backed by the hosted REST API
pub struct RestGateway {
    agent: ureq::Agent,
    base: Url,
    anon_key: String,
    session: RwLock<Option<Session>>,
}

impl RestGateway {
    /// Create a client for the project at `credentials.url`
    pub fn new(credentials: &BackendCredentials) -> Result<Self> {
        let mut base = Url::parse(&credentials.url)
            .with_context(|| format!("Invalid backend URL: {}", credentials.url))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        // Non-2xx responses carry the backend's error message in the body
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();

        Ok(Self {
            agent,
            base,
            anon_key: credentials.anon_key.clone(),
            session: RwLock::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> Result<String> {
        Ok(self
            .base
            .join(path)
            .with_context(|| format!("Invalid endpoint path: {}", path))?
            .to_string())
    }

    fn bearer(&self) -> String {
        let token = self
            .session
            .read()
            .ok()
            .and_then(|s| s.as_ref().map(|s| s.access_token.clone()))
            .unwrap_or_else(|| self.anon_key.clone());
        format!("Bearer {}", token)
    }

    fn authorize<B>(&self, request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        request
            .header("apikey", &self.anon_key)
            .header("Authorization", &self.bearer())
    }

    fn with_filters<B>(
        request: ureq::RequestBuilder<B>,
        filters: &[Filter],
    ) -> ureq::RequestBuilder<B> {
        filters.iter().fold(request, |req, f| {
            let (key, value) = filter_param(f);
            req.query(key, value)
        })
    }

    /// Turn a transport result into a successful response or a [`BackendError`]
    fn check(
        result: std::result::Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    ) -> Result<ureq::http::Response<ureq::Body>> {
        let mut response = result.map_err(|e| BackendError::new(e.to_string()))?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.body_mut().read_to_string().unwrap_or_default();
        let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
        let message = parsed
            .message
            .or(parsed.msg)
            .or(parsed.error_description)
            .unwrap_or_else(|| format!("Request failed with status {}", status));
        Err(BackendError::new(message).into())
    }

    fn read_rows(response: ureq::http::Response<ureq::Body>) -> Result<Vec<Row>> {
        let mut response = response;
        let body = response.body_mut().read_to_string().map_err(|e| BackendError::new(e.to_string()))?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&body).context("Failed to parse rows response")
    }

    fn first_row(table: Table, rows: Vec<Row>) -> Result<Row> {
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::new(format!("No row returned from {}", table)).into())
    }

    /// Sign in with email and password; later requests run as that user
    pub fn sign_in_with_password(&self, email: &str, password: &str) -> Result<User> {
        let url = self.endpoint("auth/v1/token")?;
        let request = self
            .agent
            .post(&url)
            .query("grant_type", "password")
            .header("apikey", &self.anon_key);
        let mut response = Self::check(request.send_json(serde_json::json!({
            "email": email,
            "password": password,
        })))?;

        let session: Session = response
            .body_mut()
            .read_json()
            .context("Failed to parse sign-in response")?;
        let user = session.user.clone();
        if let Ok(mut guard) = self.session.write() {
            *guard = Some(session);
        }
        info!("Signed in as {}", user.id.as_str());
        Ok(user)
    }

    pub fn sign_out(&self) {
        if let Ok(mut guard) = self.session.write() {
            *guard = None;
        }
    }
}

impl RowGateway for RestGateway {
    fn select(&self, query: &Query) -> Result<Vec<Row>> {
        let url = self.endpoint(&format!("rest/v1/{}", query.table))?;
        let mut request = self.authorize(self.agent.get(&url)).query("select", "*");
        request = Self::with_filters(request, &query.filters);
        if let Some(order) = order_param(query) {
            request = request.query("order", order);
        }
        if let Some(limit) = query.limit {
            request = request.query("limit", limit.to_string());
        }

        let rows = Self::read_rows(Self::check(request.call())?)?;
        debug!("Selected {} row(s) from {}", rows.len(), query.table);
        Ok(rows)
    }

    fn insert(&self, table: Table, row: Row) -> Result<Row> {
        let url = self.endpoint(&format!("rest/v1/{}", table))?;
        let request = self
            .authorize(self.agent.post(&url))
            .header("Prefer", "return=representation");
        let rows = Self::read_rows(Self::check(request.send_json(Value::Object(row)))?)?;
        Self::first_row(table, rows)
    }

    fn update(&self, table: Table, filters: &[Filter], patch: Row) -> Result<Vec<Row>> {
        let url = self.endpoint(&format!("rest/v1/{}", table))?;
        let request = Self::with_filters(
            self.authorize(self.agent.patch(&url))
                .header("Prefer", "return=representation"),
            filters,
        );
        Self::read_rows(Self::check(request.send_json(Value::Object(patch)))?)
    }

    fn delete(&self, table: Table, filters: &[Filter]) -> Result<usize> {
        let url = self.endpoint(&format!("rest/v1/{}", table))?;
        let request = Self::with_filters(
            self.authorize(self.agent.delete(&url))
                .header("Prefer", "return=representation"),
            filters,
        );
        Ok(Self::read_rows(Self::check(request.call())?)?.len())
    }

    fn upsert(&self, table: Table, row: Row, on_conflict: &[&str]) -> Result<Row> {
        let url = self.endpoint(&format!("rest/v1/{}", table))?;
        let mut request = self
            .authorize(self.agent.post(&url))
            .header("Prefer", "resolution=merge-duplicates,return=representation");
        if !on_conflict.is_empty() {
            request = request.query("on_conflict", on_conflict.join(","));
        }
        let rows = Self::read_rows(Self::check(request.send_json(Value::Object(row)))?)?;
        Self::first_row(table, rows)
    }

    fn rpc(&self, function: &str, args: Value) -> Result<Value> {
        let url = self.endpoint(&format!("rest/v1/rpc/{}", function))?;
        let request = self.authorize(self.agent.post(&url));
        let mut response = Self::check(request.send_json(args))?;
        response
            .body_mut()
            .read_json()
            .with_context(|| format!("Failed to parse {} response", function))
    }
}

impl AuthProvider for RestGateway {
    /// Validates the stored session against the auth server
    fn current_user(&self) -> Result<Option<User>> {
        let has_session = self.session.read().map(|s| s.is_some()).unwrap_or(false);
        if !has_session {
            return Ok(None);
        }

        let url = self.endpoint("auth/v1/user")?;
        let mut response = Self::check(self.authorize(self.agent.get(&url)).call())?;
        let user: User = response
            .body_mut()
            .read_json()
            .context("Failed to parse user response")?;
        Ok(Some(user))
    }
}
