//! Native HTTP transport for outgoing guest requests.

use {
    crate::error::Error,
    async_trait::async_trait,
    bytes::Bytes,
    futures::Future,
    hyper::{client::HttpConnector, Body, Client, Request, Response, Uri},
    std::{
        io,
        pin::Pin,
        sync::Arc,
        task::{self, Context, Poll},
        time::Duration,
    },
    tokio::{
        io::{AsyncRead, AsyncWrite, ReadBuf},
        net::TcpStream,
    },
    tokio_rustls::{client::TlsStream, TlsConnector},
    tracing::{event, Level},
};

/// Something that can perform a fully-formed native HTTP request.
///
/// The bridge calls this with no resource table locked, once the access-control policy has
/// approved the request. The returned response carries its whole body.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, req: Request<Body>) -> Result<Response<Bytes>, Error>;
}

/// TLS client configuration trusting the platform's native root certificates.
#[derive(Clone)]
pub struct TlsConfig {
    client_config: Arc<rustls::ClientConfig>,
}

impl TlsConfig {
    pub fn new() -> Result<TlsConfig, Error> {
        let mut roots = rustls::RootCertStore::empty();
        let certs = rustls_native_certs::load_native_certs().map_err(Error::BadCerts)?;
        let certs = certs.into_iter().map(|cert| cert.0).collect::<Vec<_>>();
        let (added, ignored) = roots.add_parsable_certificates(&certs);
        event!(
            Level::DEBUG,
            added,
            ignored,
            "loaded native root certificates"
        );

        let client_config = rustls::ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(TlsConfig {
            client_config: Arc::new(client_config),
        })
    }

    /// Build from an existing client configuration, e.g. one trusting a test CA.
    pub fn from_client_config(client_config: Arc<rustls::ClientConfig>) -> Self {
        Self { client_config }
    }
}

/// A Hyper client connector that dials the request URI's authority, and wraps the connection in
/// TLS when the URI's scheme is `https`.
#[derive(Clone)]
pub struct BridgeConnector {
    http: HttpConnector,
    tls_config: Arc<rustls::ClientConfig>,
}

impl BridgeConnector {
    pub fn new(tls_config: &TlsConfig) -> Self {
        let mut http = HttpConnector::new();
        http.enforce_http(false);

        Self {
            http,
            tls_config: tls_config.client_config.clone(),
        }
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub enum Connection {
    Http(TcpStream),
    Https(Box<TlsStream<TcpStream>>),
}

impl hyper::service::Service<Uri> for BridgeConnector {
    type Response = Connection;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, BoxError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.http.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let config = self.tls_config.clone();
        let hostname = uri.host().unwrap_or_default().to_string();
        let is_https = uri.scheme_str() == Some("https");

        let connect_fut = self.http.call(uri);
        Box::pin(async move {
            let tcp = connect_fut.await.map_err(Box::new)?;

            if is_https {
                let connector = TlsConnector::from(config);
                let server_name =
                    rustls::ServerName::try_from(hostname.as_str()).map_err(Box::new)?;
                let tls = connector.connect(server_name, tcp).await?;
                Ok(Connection::Https(Box::new(tls)))
            } else {
                Ok(Connection::Http(tcp))
            }
        })
    }
}

/// The default [`Transport`]: a Hyper client over a [`BridgeConnector`], with an optional
/// per-request timeout covering the whole exchange, response body included.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<BridgeConnector, Body>,
    timeout: Option<Duration>,
}

impl HyperTransport {
    pub fn new(tls_config: &TlsConfig, timeout: Option<Duration>) -> Self {
        let client = Client::builder().build(BridgeConnector::new(tls_config));
        Self { client, timeout }
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, req: Request<Body>) -> Result<Response<Bytes>, Error> {
        let uri = req.uri().clone();
        let target = uri.clone();
        let client = self.client.clone();
        let exchange = async move {
            let res = client
                .request(req)
                .await
                .map_err(|e| Error::Transport(format!("request to {} failed: {}", target, e)))?;
            let (parts, body) = res.into_parts();
            let body = hyper::body::to_bytes(body).await.map_err(|e| {
                Error::Transport(format!("failed to read response body from {}: {}", target, e))
            })?;
            Ok(Response::from_parts(parts, body))
        };
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, exchange).await.map_err(|_| {
                Error::Transport(format!("request to {} timed out after {:?}", uri, timeout))
            })?,
            None => exchange.await,
        }
    }
}

// Boilerplate forwarding implementations for `Connection`:

impl hyper::client::connect::Connection for Connection {
    fn connected(&self) -> hyper::client::connect::Connected {
        hyper::client::connect::Connected::new()
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<Result<(), io::Error>> {
        match Pin::get_mut(self) {
            Connection::Http(s) => Pin::new(s).poll_read(cx, buf),
            Connection::Https(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, io::Error>> {
        match Pin::get_mut(self) {
            Connection::Http(s) => Pin::new(s).poll_write(cx, buf),
            Connection::Https(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        match Pin::get_mut(self) {
            Connection::Http(s) => Pin::new(s).poll_flush(cx),
            Connection::Https(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        match Pin::get_mut(self) {
            Connection::Http(s) => Pin::new(s).poll_shutdown(cx),
            Connection::Https(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
