//! Response outparams.

use {
    crate::{body::BodyBuffer, error::Error, headers::Fields},
    bytes::Bytes,
    http::{Response, StatusCode},
    std::mem,
    tokio::sync::oneshot::{self, Receiver, Sender},
    tracing::{event, Level},
};

/// The response a guest handed to a response outparam.
///
/// The body buffer is shared with the guest, which may keep writing to it through an output
/// stream after the outparam has been set, up until it finishes the body.
#[derive(Debug)]
pub struct ResponseParts {
    pub status: StatusCode,
    pub headers: Fields,
    pub body: Option<BodyBuffer>,
}

impl ResponseParts {
    /// Whether the guest has finished writing the body. A response without a body is complete.
    pub fn is_complete(&self) -> bool {
        self.body.as_ref().map_or(true, BodyBuffer::is_finished)
    }

    /// Convert into a native response, using whatever body bytes have been written so far.
    pub fn into_response(self) -> Result<Response<Bytes>, Error> {
        let body = self.body.map(|b| b.snapshot()).unwrap_or_default();
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers.to_header_map()?;
        Ok(response)
    }
}

/// What the embedding host receives: the guest's response, or the error message it set instead.
pub type OutparamValue = Result<ResponseParts, String>;

/// Response outparam states.
///
/// An outparam is created pending, with the host holding the receiving end of its channel, and
/// can be completed exactly once. See [`Session::set_response_outparam`][set].
///
/// [set]: crate::session::Session::set_response_outparam
#[derive(Debug)]
pub enum ResponseOutparam {
    /// No value has been sent yet.
    Pending(Sender<OutparamValue>),
    /// A value has already been sent.
    Completed,
}

impl ResponseOutparam {
    /// Create a pending outparam along with the receiver the host will wait on.
    pub fn pending() -> (Self, Receiver<OutparamValue>) {
        let (sender, receiver) = oneshot::channel();
        (ResponseOutparam::Pending(sender), receiver)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Send a value to the host.
    ///
    /// Yield an error if a value has already been sent; the earlier value is left as it was.
    pub fn complete(&mut self, value: OutparamValue) -> Result<(), Error> {
        use ResponseOutparam::{Completed, Pending};

        match mem::replace(self, Completed) {
            Pending(sender) => {
                if sender.send(value).is_err() {
                    event!(Level::DEBUG, "response outparam receiver was dropped");
                }
                Ok(())
            }
            Completed => Err(Error::OutparamAlreadySet),
        }
    }
}
