use http::HeaderMap;
use http::header::{COOKIE, HeaderName, HeaderValue, SET_COOKIE};

use crate::session::{SessionCookie, SessionError};

/// The request/response boundary a session is carried over.
pub trait SessionTransport: Send {
    /// Whether the response has started; cookies and headers can no longer be set.
    fn headers_sent(&self) -> bool;

    /// Value of the named cookie sent by the client.
    fn request_cookie(&self, name: &str) -> Option<String>;

    fn set_cookie(&mut self, cookie: &SessionCookie) -> Result<(), SessionError>;

    /// Sets a response header, replacing any previous value.
    fn set_header(&mut self, name: HeaderName, value: &str) -> Result<(), SessionError>;
}

/// [`SessionTransport`] over `http` header maps.
#[derive(Debug, Default, Clone)]
pub struct HttpTransport {
    request: HeaderMap,
    response: HeaderMap,
    sent: bool,
}

impl HttpTransport {
    pub fn new(request: HeaderMap) -> Self {
        Self {
            request,
            response: HeaderMap::new(),
            sent: false,
        }
    }

    /// Marks the response as started.
    pub fn mark_sent(&mut self) {
        self.sent = true;
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response
    }

    /// Moves the accumulated response headers out.
    pub fn take_response_headers(&mut self) -> HeaderMap {
        std::mem::take(&mut self.response)
    }
}

impl SessionTransport for HttpTransport {
    fn headers_sent(&self) -> bool {
        self.sent
    }

    fn request_cookie(&self, name: &str) -> Option<String> {
        let value = self
            .request
            .get_all(COOKIE)
            .iter()
            .filter_map(|header| {
                header
                    .to_str()
                    .inspect_err(|e| tracing::debug!("Ignoring invalid cookie header: {}", e))
                    .ok()
            })
            .flat_map(|header| header.split(';'))
            .map(str::trim)
            .find_map(|pair| {
                let mut parts = pair.splitn(2, '=');
                match (parts.next(), parts.next()) {
                    (Some(k), Some(v)) if k == name => Some(v.to_string()),
                    _ => None,
                }
            });

        if value.is_none() {
            tracing::debug!("No cookie '{}' found in request", name);
        }
        value
    }

    fn set_cookie(&mut self, cookie: &SessionCookie) -> Result<(), SessionError> {
        if self.sent {
            return Err(SessionError::HeadersAlreadySent);
        }
        let value = HeaderValue::from_str(&cookie.to_header_value())
            .map_err(|_| SessionError::Cookie("Failed to parse cookie".to_string()))?;
        self.response.append(SET_COOKIE, value);
        Ok(())
    }

    fn set_header(&mut self, name: HeaderName, value: &str) -> Result<(), SessionError> {
        if self.sent {
            return Err(SessionError::HeadersAlreadySent);
        }
        let value = HeaderValue::from_str(value)
            .map_err(|_| SessionError::Cookie(format!("Invalid value for header {name}")))?;
        self.response.insert(name, value);
        Ok(())
    }
}
