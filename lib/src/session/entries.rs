//! The requests and responses held in a session's tables.

use {
    super::outparam::ResponseParts,
    crate::{
        body::BodyBuffer,
        error::Error,
        headers::{filter_outgoing_headers, Fields},
    },
    bytes::Bytes,
    http::{uri::Authority, Method, Request, StatusCode, Uri},
};

/// A request built by the guest, to be sent with `handle`.
#[derive(Debug)]
pub struct OutgoingRequest {
    pub method: String,
    pub scheme: String,
    pub authority: Option<String>,
    pub path_with_query: String,
    pub headers: Fields,
    pub body: Option<BodyBuffer>,
}

impl OutgoingRequest {
    pub const DEFAULT_SCHEME: &'static str = "https";
    pub const DEFAULT_PATH: &'static str = "/";

    pub fn new(
        method: String,
        scheme: Option<String>,
        authority: Option<String>,
        path_with_query: Option<String>,
        headers: Fields,
    ) -> Self {
        Self {
            method,
            scheme: scheme.unwrap_or_else(|| Self::DEFAULT_SCHEME.to_owned()),
            authority,
            path_with_query: path_with_query.unwrap_or_else(|| Self::DEFAULT_PATH.to_owned()),
            headers,
            body: None,
        }
    }

    /// The absolute URI this request targets.
    ///
    /// Each component is parsed on its own, so no component can spill into another. The authority
    /// may not carry userinfo, and the path must be absolute.
    pub fn uri(&self) -> Result<Uri, Error> {
        let authority = self
            .authority
            .as_deref()
            .ok_or(Error::InvalidArgument)?
            .parse::<Authority>()?;
        if authority.as_str().contains('@') || !self.path_with_query.starts_with('/') {
            return Err(Error::InvalidArgument);
        }
        Ok(Uri::builder()
            .scheme(self.scheme.as_str())
            .authority(authority)
            .path_and_query(self.path_with_query.as_str())
            .build()?)
    }

    /// Build the native request, with whatever body bytes have been written so far.
    pub fn into_native(self) -> Result<Request<hyper::Body>, Error> {
        let uri = self.uri()?;
        let method = Method::from_bytes(self.method.as_bytes())?;
        let mut headers = self.headers.to_header_map()?;
        filter_outgoing_headers(&mut headers);
        let body = self.body.map(|b| b.snapshot()).unwrap_or_default();

        let mut req = Request::new(hyper::Body::from(body));
        *req.method_mut() = method;
        *req.uri_mut() = uri;
        *req.headers_mut() = headers;
        Ok(req)
    }
}

/// A request handed to the guest by the embedding host.
#[derive(Debug)]
pub struct IncomingRequest {
    pub method: String,
    pub scheme: Option<String>,
    pub authority: Option<String>,
    pub path_with_query: Option<String>,
    pub headers: Fields,
    /// The body, until the guest consumes it.
    pub body: Option<Bytes>,
}

impl From<Request<Bytes>> for IncomingRequest {
    fn from(req: Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method.as_str().to_owned(),
            scheme: parts.uri.scheme_str().map(str::to_owned),
            authority: parts.uri.authority().map(|a| a.as_str().to_owned()),
            path_with_query: parts.uri.path_and_query().map(|p| p.as_str().to_owned()),
            headers: Fields::from_header_map(&parts.headers),
            body: Some(body),
        }
    }
}

/// A response received for an outgoing request.
#[derive(Debug)]
pub struct IncomingResponse {
    pub status: u16,
    pub headers: Fields,
    /// The fully-read body, until the guest consumes it.
    pub body: Option<Bytes>,
}

/// A response built by the guest, to be handed to a response outparam.
#[derive(Debug)]
pub struct OutgoingResponse {
    pub status: StatusCode,
    pub headers: Fields,
    pub body: Option<BodyBuffer>,
}

impl OutgoingResponse {
    pub fn into_parts(self) -> ResponseParts {
        ResponseParts {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

/// An entry in the requests table.
#[derive(Debug)]
pub enum RequestEntry {
    Outgoing(OutgoingRequest),
    Incoming(IncomingRequest),
}

impl RequestEntry {
    pub fn is_outgoing(&self) -> bool {
        matches!(self, Self::Outgoing(_))
    }

    pub fn is_incoming(&self) -> bool {
        matches!(self, Self::Incoming(_))
    }
}

/// An entry in the responses table.
#[derive(Debug)]
pub enum ResponseEntry {
    Incoming(IncomingResponse),
    Outgoing(OutgoingResponse),
}

impl ResponseEntry {
    pub fn is_incoming(&self) -> bool {
        matches!(self, Self::Incoming(_))
    }

    pub fn is_outgoing(&self) -> bool {
        matches!(self, Self::Outgoing(_))
    }
}
