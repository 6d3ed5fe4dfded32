//! HTTP transport for the remote API
//!
//! A thin blocking gateway: it executes GET and multipart POST calls with a
//! bounded timeout and hands back status + body. It knows nothing about
//! tokens or payload shapes; callers decide what a status means.

use std::time::Duration;

use reqwest::blocking::{multipart, Client};
use serde::de::DeserializeOwned;

use crate::types::{NovaError, Result};

/// Default per-call timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Status and body of a completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Error describing a non-200 answer: 401/403 mean the token or
    /// credentials were refused, anything else is a plain status failure
    pub fn status_error(&self) -> NovaError {
        match self.status {
            401 | 403 => NovaError::Auth(format!("status {}, body: {}", self.status, self.body)),
            status => NovaError::Status {
                status,
                body: self.body.clone(),
            },
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body)
            .map_err(|e| NovaError::DataShape(format!("invalid JSON body: {}", e)))
    }
}

/// Executes HTTP calls. Any completed exchange is `Ok`, whatever its status;
/// only transport failures (connect, timeout, body read) are `Err`.
pub trait HttpGateway: Send + Sync {
    /// GET `url`, optionally with `Authorization: Bearer <token>`
    fn get(&self, url: &str, bearer: Option<&str>) -> Result<HttpResponse>;

    /// POST a multipart form with a single text field
    fn post_form(&self, url: &str, field: &str, value: String) -> Result<HttpResponse>;
}

/// Blocking reqwest implementation
pub struct ReqwestGateway {
    client: Client,
}

impl ReqwestGateway {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NovaError::Transport(format!("HTTP client error: {}", e)))?;
        Ok(Self { client })
    }

    fn finish(response: reqwest::blocking::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(HttpResponse::new(status, body))
    }
}

impl HttpGateway for ReqwestGateway {
    fn get(&self, url: &str, bearer: Option<&str>) -> Result<HttpResponse> {
        let mut request = self.client.get(url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        Self::finish(request.send()?)
    }

    fn post_form(&self, url: &str, field: &str, value: String) -> Result<HttpResponse> {
        let form = multipart::Form::new().text(field.to_string(), value);
        Self::finish(self.client.post(url).multipart(form).send()?)
    }
}

/// Scripted in-memory gateway for tests
#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// A call observed by [`FakeGateway`]
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Call {
        pub method: &'static str,
        pub url: String,
        pub bearer: Option<String>,
        pub form: Option<(String, String)>,
    }

    /// Replies are queued per URL; the last reply for a URL repeats once the
    /// queue is down to one. Unscripted URLs fail as transport errors.
    #[derive(Default)]
    pub struct FakeGateway {
        replies: Mutex<HashMap<String, VecDeque<Option<HttpResponse>>>>,
        calls: Mutex<Vec<Call>>,
    }

    impl FakeGateway {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a response for `url`
        pub fn reply(&self, url: &str, status: u16, body: &str) -> &Self {
            self.replies
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push_back(Some(HttpResponse::new(status, body)));
            self
        }

        /// Queue a transport failure for `url`
        pub fn fail(&self, url: &str) -> &Self {
            self.replies
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push_back(None);
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn count(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| c.url == url).count()
        }

        fn next(&self, url: &str) -> Result<HttpResponse> {
            let mut replies = self.replies.lock().unwrap();
            let queue = replies.get_mut(url);
            let reply = match queue {
                Some(q) if q.len() > 1 => q.pop_front().flatten(),
                Some(q) => q.front().cloned().flatten(),
                None => None,
            };
            reply.ok_or_else(|| NovaError::Transport(format!("connection refused: {}", url)))
        }
    }

    impl HttpGateway for FakeGateway {
        fn get(&self, url: &str, bearer: Option<&str>) -> Result<HttpResponse> {
            self.calls.lock().unwrap().push(Call {
                method: "GET",
                url: url.to_string(),
                bearer: bearer.map(String::from),
                form: None,
            });
            self.next(url)
        }

        fn post_form(&self, url: &str, field: &str, value: String) -> Result<HttpResponse> {
            self.calls.lock().unwrap().push(Call {
                method: "POST",
                url: url.to_string(),
                bearer: None,
                form: Some((field.to_string(), value)),
            });
            self.next(url)
        }
    }
}
