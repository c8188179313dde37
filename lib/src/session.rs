//! Session type and related facilities.

mod entries;
mod outparam;
mod table;

pub use self::{
    entries::{
        IncomingRequest, IncomingResponse, OutgoingRequest, OutgoingResponse, RequestEntry,
        ResponseEntry,
    },
    outparam::{OutparamValue, ResponseOutparam, ResponseParts},
    table::Table,
};

use {
    crate::{
        body::{BodyBuffer, InputStream, StreamEntry, StreamStatus, WRITE_PERMIT},
        config::BridgeConfig,
        error::{Error, HandleError},
        handles::{
            BodyHandle, FieldsHandle, OutparamHandle, RequestHandle, ResponseHandle, StreamHandle,
        },
        headers::Fields,
        policy::Policy,
        upstream::{HyperTransport, TlsConfig, Transport},
    },
    bytes::Bytes,
    http::{uri::Authority, StatusCode},
    std::sync::Arc,
    tokio::sync::oneshot::Receiver,
    tracing::{event, Level},
};

/// Every resource table owned by one bridge instance.
///
/// Each table has its own lock. No code path holds two of them at once, except
/// [`Session::set_response_outparam`], which holds the outparams lock while taking a response.
#[derive(Default)]
struct Tables {
    fields: Table<FieldsHandle, Fields>,
    requests: Table<RequestHandle, RequestEntry>,
    responses: Table<ResponseHandle, ResponseEntry>,
    bodies: Table<BodyHandle, BodyBuffer>,
    streams: Table<StreamHandle, StreamEntry>,
    outparams: Table<OutparamHandle, ResponseOutparam>,
}

/// One bridge instance: the resource tables a guest's handles refer to, the access-control policy
/// consulted for outgoing requests, and the transport that performs them.
///
/// Cloning a `Session` is cheap, and every clone shares the same tables.
#[derive(Clone)]
pub struct Session {
    tables: Arc<Tables>,
    policy: Arc<Policy>,
    transport: Arc<dyn Transport>,
}

impl Session {
    /// Create a new session with empty tables.
    pub fn new(policy: Policy, transport: Arc<dyn Transport>) -> Self {
        Self {
            tables: Arc::new(Tables::default()),
            policy: Arc::new(policy),
            transport,
        }
    }

    /// Create a session using the configured policy, and a [`HyperTransport`] trusting the
    /// platform's root certificates.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, Error> {
        let tls_config = TlsConfig::new()?;
        let transport = HyperTransport::new(&tls_config, config.timeout());
        Ok(Self::new(config.policy(), Arc::new(transport)))
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    // ----- Fields API -----

    /// Insert a header collection, returning its new handle.
    pub fn new_fields(&self, fields: Fields) -> FieldsHandle {
        self.tables.fields.allocate(fields)
    }

    /// A copy of the entries of a header collection.
    pub fn fields_entries(&self, handle: FieldsHandle) -> Result<Fields, HandleError> {
        self.tables
            .fields
            .get(handle)
            .ok_or(HandleError::InvalidFieldsHandle(handle))
    }

    /// Drop a header collection. Returns whether the handle was live.
    pub fn drop_fields(&self, handle: FieldsHandle) -> bool {
        self.tables.fields.remove(handle)
    }

    // ----- Outgoing Request API -----

    /// Construct an outgoing request.
    ///
    /// The request keeps its own copy of the entries behind `headers`; the header collection stays
    /// owned by the guest and can be dropped independently.
    pub fn new_outgoing_request(
        &self,
        method: String,
        scheme: Option<String>,
        authority: Option<String>,
        path_with_query: Option<String>,
        headers: FieldsHandle,
    ) -> Result<RequestHandle, Error> {
        let headers = self.fields_entries(headers)?;
        let request = OutgoingRequest::new(method, scheme, authority, path_with_query, headers);
        Ok(self
            .tables
            .requests
            .allocate(RequestEntry::Outgoing(request)))
    }

    /// Attach a body to an outgoing request, returning a handle to write it through.
    ///
    /// A request has at most one body; asking again fails.
    pub fn outgoing_request_write(&self, handle: RequestHandle) -> Result<BodyHandle, Error> {
        let body = self
            .tables
            .requests
            .with_mut(handle, |entry| match entry {
                RequestEntry::Outgoing(req) if req.body.is_none() => {
                    let body = BodyBuffer::new();
                    req.body = Some(body.clone());
                    Some(Ok(body))
                }
                RequestEntry::Outgoing(_) => Some(Err(Error::InvalidArgument)),
                RequestEntry::Incoming(_) => None,
            })
            .flatten()
            .ok_or(HandleError::InvalidRequestHandle(handle))??;
        Ok(self.tables.bodies.allocate(body))
    }

    pub fn drop_outgoing_request(&self, handle: RequestHandle) -> bool {
        self.tables
            .requests
            .take_if(handle, RequestEntry::is_outgoing)
            .is_some()
    }

    fn take_outgoing_request(&self, handle: RequestHandle) -> Result<OutgoingRequest, HandleError> {
        match self
            .tables
            .requests
            .take_if(handle, RequestEntry::is_outgoing)
        {
            Some(RequestEntry::Outgoing(req)) => Ok(req),
            _ => Err(HandleError::InvalidRequestHandle(handle)),
        }
    }

    /// Send an outgoing request, returning a handle to its response.
    ///
    /// The request is consumed whether or not it is sent. The access-control policy is checked
    /// against the native request before anything touches the network, the method first and then
    /// the authority the connection will be made to. The response body is read in full before
    /// this returns.
    pub async fn handle(&self, request: RequestHandle) -> Result<ResponseHandle, Error> {
        let req = self.take_outgoing_request(request)?.into_native()?;
        self.policy.check(
            req.method().as_str(),
            req.uri().authority().map(Authority::as_str).unwrap_or_default(),
        )?;

        event!(
            Level::DEBUG,
            method = %req.method(),
            uri = %req.uri(),
            "sending outgoing request"
        );

        let (parts, body) = self.transport.send(req).await?.into_parts();
        event!(
            Level::DEBUG,
            status = parts.status.as_u16(),
            len = body.len(),
            "received response"
        );

        let response = IncomingResponse {
            status: parts.status.as_u16(),
            headers: Fields::from_header_map(&parts.headers),
            body: Some(body),
        };
        Ok(self
            .tables
            .responses
            .allocate(ResponseEntry::Incoming(response)))
    }

    // ----- Incoming Response API -----

    fn with_incoming_response<R>(
        &self,
        handle: ResponseHandle,
        f: impl FnOnce(&mut IncomingResponse) -> R,
    ) -> Result<R, HandleError> {
        self.tables
            .responses
            .with_mut(handle, |entry| match entry {
                ResponseEntry::Incoming(res) => Some(f(res)),
                ResponseEntry::Outgoing(_) => None,
            })
            .flatten()
            .ok_or(HandleError::InvalidResponseHandle(handle))
    }

    pub fn incoming_response_status(&self, handle: ResponseHandle) -> Result<u16, HandleError> {
        self.with_incoming_response(handle, |res| res.status)
    }

    /// Copy a response's headers into a new header collection.
    pub fn incoming_response_headers(
        &self,
        handle: ResponseHandle,
    ) -> Result<FieldsHandle, HandleError> {
        let headers = self.with_incoming_response(handle, |res| res.headers.clone())?;
        Ok(self.new_fields(headers))
    }

    /// Open an input stream over a response's body. The body can be consumed once.
    pub fn incoming_response_consume(&self, handle: ResponseHandle) -> Result<StreamHandle, Error> {
        let body = self
            .with_incoming_response(handle, |res| res.body.take())?
            .ok_or(Error::InvalidArgument)?;
        Ok(self.new_input_stream(body))
    }

    /// Resolve the future for a response.
    ///
    /// Responses are only ever stored once they have fully arrived, so a response handle doubles
    /// as an always-ready future.
    pub fn future_incoming_response_get(
        &self,
        handle: ResponseHandle,
    ) -> Result<ResponseHandle, HandleError> {
        self.with_incoming_response(handle, |_| handle)
    }

    pub fn drop_incoming_response(&self, handle: ResponseHandle) -> bool {
        self.tables
            .responses
            .take_if(handle, ResponseEntry::is_incoming)
            .is_some()
    }

    // ----- Incoming Request API -----

    /// Insert a request for the guest to serve, returning its new handle.
    pub fn insert_incoming_request(&self, req: IncomingRequest) -> RequestHandle {
        self.tables.requests.allocate(RequestEntry::Incoming(req))
    }

    fn with_incoming_request<R>(
        &self,
        handle: RequestHandle,
        f: impl FnOnce(&mut IncomingRequest) -> R,
    ) -> Result<R, HandleError> {
        self.tables
            .requests
            .with_mut(handle, |entry| match entry {
                RequestEntry::Incoming(req) => Some(f(req)),
                RequestEntry::Outgoing(_) => None,
            })
            .flatten()
            .ok_or(HandleError::InvalidRequestHandle(handle))
    }

    pub fn incoming_request_method(&self, handle: RequestHandle) -> Result<String, HandleError> {
        self.with_incoming_request(handle, |req| req.method.clone())
    }

    pub fn incoming_request_path_with_query(
        &self,
        handle: RequestHandle,
    ) -> Result<Option<String>, HandleError> {
        self.with_incoming_request(handle, |req| req.path_with_query.clone())
    }

    pub fn incoming_request_authority(
        &self,
        handle: RequestHandle,
    ) -> Result<Option<String>, HandleError> {
        self.with_incoming_request(handle, |req| req.authority.clone())
    }

    /// Copy a request's headers into a new header collection.
    pub fn incoming_request_headers(
        &self,
        handle: RequestHandle,
    ) -> Result<FieldsHandle, HandleError> {
        let headers = self.with_incoming_request(handle, |req| req.headers.clone())?;
        Ok(self.new_fields(headers))
    }

    /// Open an input stream over a request's body. The body can be consumed once.
    pub fn incoming_request_consume(&self, handle: RequestHandle) -> Result<StreamHandle, Error> {
        let body = self
            .with_incoming_request(handle, |req| req.body.take())?
            .ok_or(Error::InvalidArgument)?;
        Ok(self.new_input_stream(body))
    }

    pub fn drop_incoming_request(&self, handle: RequestHandle) -> bool {
        self.tables
            .requests
            .take_if(handle, RequestEntry::is_incoming)
            .is_some()
    }

    // ----- Outgoing Response API -----

    /// Construct an outgoing response, copying the entries behind `headers`.
    pub fn new_outgoing_response(
        &self,
        status: u16,
        headers: FieldsHandle,
    ) -> Result<ResponseHandle, Error> {
        let status = StatusCode::from_u16(status)?;
        let headers = self.fields_entries(headers)?;
        let response = OutgoingResponse {
            status,
            headers,
            body: None,
        };
        Ok(self
            .tables
            .responses
            .allocate(ResponseEntry::Outgoing(response)))
    }

    /// Attach a body to an outgoing response, returning a handle to write it through.
    pub fn outgoing_response_write(&self, handle: ResponseHandle) -> Result<BodyHandle, Error> {
        let body = self
            .tables
            .responses
            .with_mut(handle, |entry| match entry {
                ResponseEntry::Outgoing(res) if res.body.is_none() => {
                    let body = BodyBuffer::new();
                    res.body = Some(body.clone());
                    Some(Ok(body))
                }
                ResponseEntry::Outgoing(_) => Some(Err(Error::InvalidArgument)),
                ResponseEntry::Incoming(_) => None,
            })
            .flatten()
            .ok_or(HandleError::InvalidResponseHandle(handle))??;
        Ok(self.tables.bodies.allocate(body))
    }

    pub fn drop_outgoing_response(&self, handle: ResponseHandle) -> bool {
        self.tables
            .responses
            .take_if(handle, ResponseEntry::is_outgoing)
            .is_some()
    }

    // ----- Outgoing Body API -----

    /// Open an output stream that appends to a body.
    pub fn outgoing_body_write(&self, handle: BodyHandle) -> Result<StreamHandle, HandleError> {
        let body = self
            .tables
            .bodies
            .get(handle)
            .ok_or(HandleError::InvalidBodyHandle(handle))?;
        Ok(self.tables.streams.allocate(StreamEntry::Output(body)))
    }

    /// Finish a body, consuming its handle. Streams still open on the body reject further writes.
    pub fn outgoing_body_finish(&self, handle: BodyHandle) -> Result<(), Error> {
        let body = self
            .tables
            .bodies
            .take(handle)
            .ok_or(HandleError::InvalidBodyHandle(handle))?;
        body.finish()
    }

    // ----- Streams API -----

    fn new_input_stream(&self, bytes: Bytes) -> StreamHandle {
        self.tables
            .streams
            .allocate(StreamEntry::Input(InputStream::new(bytes)))
    }

    /// Read up to `len` bytes from an input stream.
    pub fn stream_read(
        &self,
        handle: StreamHandle,
        len: u64,
    ) -> Result<(Bytes, StreamStatus), HandleError> {
        self.tables
            .streams
            .with_mut(handle, |entry| match entry {
                StreamEntry::Input(stream) => Some(stream.read(len)),
                StreamEntry::Output(_) => None,
            })
            .flatten()
            .ok_or(HandleError::InvalidStreamHandle(handle))
    }

    /// Look at the next chunk of an input stream without consuming it.
    pub fn stream_peek(
        &self,
        handle: StreamHandle,
        len: u64,
    ) -> Result<(Bytes, StreamStatus), HandleError> {
        self.tables
            .streams
            .with(handle, |entry| match entry {
                StreamEntry::Input(stream) => Some(stream.peek(len)),
                StreamEntry::Output(_) => None,
            })
            .flatten()
            .ok_or(HandleError::InvalidStreamHandle(handle))
    }

    /// Consume `n` bytes of an input stream, once they have been delivered.
    pub fn stream_advance(&self, handle: StreamHandle, n: usize) -> Result<(), HandleError> {
        let advanced = self.tables.streams.with_mut(handle, |entry| match entry {
            StreamEntry::Input(stream) => {
                stream.advance(n);
                true
            }
            StreamEntry::Output(_) => false,
        });
        match advanced {
            Some(true) => Ok(()),
            _ => Err(HandleError::InvalidStreamHandle(handle)),
        }
    }

    fn output_stream_body(&self, handle: StreamHandle) -> Result<BodyBuffer, HandleError> {
        self.tables
            .streams
            .with(handle, |entry| match entry {
                StreamEntry::Output(body) => Some(body.clone()),
                StreamEntry::Input(_) => None,
            })
            .flatten()
            .ok_or(HandleError::InvalidStreamHandle(handle))
    }

    /// Append `bytes` to the body behind an output stream, returning how many were written.
    pub fn stream_write(&self, handle: StreamHandle, bytes: &[u8]) -> Result<u64, Error> {
        // The body is locked only once the stream table has been released.
        let body = self.output_stream_body(handle)?;
        Ok(body.write(bytes)? as u64)
    }

    /// How many bytes an output stream will currently accept in one write.
    pub fn stream_check_write(&self, handle: StreamHandle) -> Result<u64, Error> {
        let body = self.output_stream_body(handle)?;
        if body.is_finished() {
            return Err(Error::BodyAlreadyFinished);
        }
        Ok(WRITE_PERMIT)
    }

    pub fn drop_input_stream(&self, handle: StreamHandle) -> bool {
        self.tables
            .streams
            .take_if(handle, |entry| matches!(entry, StreamEntry::Input(_)))
            .is_some()
    }

    pub fn drop_output_stream(&self, handle: StreamHandle) -> bool {
        self.tables
            .streams
            .take_if(handle, |entry| matches!(entry, StreamEntry::Output(_)))
            .is_some()
    }

    // ----- Response Outparam API -----

    /// Create a response outparam for the guest to complete, along with the receiver the host
    /// waits on.
    pub fn new_response_outparam(&self) -> (OutparamHandle, Receiver<OutparamValue>) {
        let (outparam, receiver) = ResponseOutparam::pending();
        (self.tables.outparams.allocate(outparam), receiver)
    }

    /// Complete a response outparam with an outgoing response, consuming the response handle, or
    /// with an error message.
    ///
    /// An outparam can be completed once. Later calls fail with [`Error::OutparamAlreadySet`] and
    /// leave both the first value and any response they name untouched.
    pub fn set_response_outparam(
        &self,
        handle: OutparamHandle,
        value: Result<ResponseHandle, String>,
    ) -> Result<(), Error> {
        self.tables
            .outparams
            .with_mut(handle, |outparam| {
                if !outparam.is_pending() {
                    return Err(Error::OutparamAlreadySet);
                }
                let value = match value {
                    Ok(response) => Ok(self.take_outgoing_response(response)?.into_parts()),
                    Err(msg) => Err(msg),
                };
                outparam.complete(value)
            })
            .ok_or(HandleError::InvalidOutparamHandle(handle))?
    }

    fn take_outgoing_response(
        &self,
        handle: ResponseHandle,
    ) -> Result<OutgoingResponse, HandleError> {
        match self
            .tables
            .responses
            .take_if(handle, ResponseEntry::is_outgoing)
        {
            Some(ResponseEntry::Outgoing(res)) => Ok(res),
            _ => Err(HandleError::InvalidResponseHandle(handle)),
        }
    }
}
