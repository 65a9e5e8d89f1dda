//! SIP over WebSocket (RFC 7118) client transport
//!
//! One [`WebSocketTransport`] owns exactly one connection. Outbound messages
//! are serialized and written as text frames; a single reader task receives
//! inbound frames in order and hands each one to the
//! [`CorrelatorRegistry`](crate::correlator::CorrelatorRegistry).
//!
//! The connection is never re-established: once the reader loop stops, the
//! transport reports [`is_closed`](WebSocketTransport::is_closed) and every
//! further send fails with [`Error::TransportClosed`]. Pending correlators
//! are dropped at that point.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{client_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use wsphone_sip_core::SipMessage;

use super::SIP_SUBPROTOCOL;
use crate::correlator::{handler, CorrelatorKey, CorrelatorRegistry, ResponseHandler};
use crate::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// WebSocket transport for SIP messages
#[derive(Clone)]
pub struct WebSocketTransport {
    inner: Arc<WebSocketTransportInner>,
}

struct WebSocketTransportInner {
    url: String,
    sink: Mutex<WsSink>,
    correlators: CorrelatorRegistry,
    closed: AtomicBool,
}

impl WebSocketTransport {
    /// Connect to `url` (`ws://` or `wss://`) and start the receive loop.
    ///
    /// The `sip` sub-protocol is requested on the handshake. For `wss://`
    /// the server certificate is not verified.
    pub async fn connect(url: &str) -> Result<Self> {
        let mut request = url
            .into_client_request()
            .map_err(|e| Error::connect(url, e))?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(SIP_SUBPROTOCOL),
        );

        let secure = request.uri().scheme_str() == Some("wss");
        let host = request
            .uri()
            .host()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
            .ok_or_else(|| Error::connect(url, "missing host"))?;
        let port = request
            .uri()
            .port_u16()
            .unwrap_or(if secure { 443 } else { 80 });

        let tcp = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| Error::connect(url, e))?;
        if let Err(e) = tcp.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY: {}", e);
        }

        let connector = if secure {
            Some(Connector::Rustls(Arc::new(insecure_tls_config())))
        } else {
            None
        };

        let (stream, response) = client_async_tls_with_config(request, tcp, None, connector)
            .await
            .map_err(|e| Error::connect(url, e))?;

        match response.headers().get("Sec-WebSocket-Protocol") {
            Some(protocol) if protocol.as_bytes() == SIP_SUBPROTOCOL.as_bytes() => {}
            other => warn!("Server did not confirm the sip sub-protocol: {:?}", other),
        }
        info!("SIP WebSocket transport connected to {}", url);

        let (sink, source) = stream.split();
        let transport = WebSocketTransport {
            inner: Arc::new(WebSocketTransportInner {
                url: url.to_string(),
                sink: Mutex::new(sink),
                correlators: CorrelatorRegistry::new(),
                closed: AtomicBool::new(false),
            }),
        };
        transport.spawn_receive_loop(source);
        Ok(transport)
    }

    /// Registry of pending correlators
    pub fn correlators(&self) -> &CorrelatorRegistry {
        &self.inner.correlators
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Serialize and send `message`.
    ///
    /// When `on_response` is given it is registered before the frame is
    /// written, so no response can slip past it. The returned key identifies
    /// the correlator; it is removed again if the write fails.
    pub async fn send(
        &self,
        message: &SipMessage,
        on_response: Option<ResponseHandler>,
    ) -> Result<Option<CorrelatorKey>> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }

        let key = on_response.map(|h| self.inner.correlators.register(h));
        let wire = message.to_wire();
        debug!("Sending SIP message to {}:\n{}", self.inner.url, wire);

        if let Err(e) = self.send_raw(wire).await {
            if let Some(key) = &key {
                self.inner.correlators.unregister(key);
            }
            return Err(e);
        }
        Ok(key)
    }

    /// Write a text frame as is
    pub async fn send_raw(&self, text: String) -> Result<()> {
        let mut sink = self.inner.sink.lock().await;
        sink.send(Message::Text(text)).await.map_err(|e| {
            error!("Failed to write to {}: {}", self.inner.url, e);
            Error::SendFailed(e.to_string())
        })
    }

    /// Register a listener that sees every inbound message for the lifetime
    /// of the transport.
    pub fn listen<F, Fut>(&self, f: F) -> CorrelatorKey
    where
        F: Fn(Arc<str>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let f = Arc::new(f);
        self.inner.correlators.register(handler(move |text| {
            let f = Arc::clone(&f);
            async move {
                f(text).await;
                false
            }
        }))
    }

    /// Send a close frame
    pub async fn close(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::Release);
        let mut sink = self.inner.sink.lock().await;
        sink.close()
            .await
            .map_err(|e| Error::SendFailed(e.to_string()))
    }

    fn spawn_receive_loop(&self, mut source: WsSource) {
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Dropping non UTF-8 binary frame: {}", e);
                            continue;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        info!("WebSocket closed by {}: {:?}", inner.url, frame);
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        error!("Error reading from {}: {}", inner.url, e);
                        break;
                    }
                };

                debug!("Received SIP message from {}:\n{}", inner.url, text);
                inner.correlators.dispatch(Arc::from(text));
            }

            inner.closed.store(true, Ordering::Release);
            inner.correlators.clear();
            info!("WebSocket receive loop for {} terminated", inner.url);
        });
    }
}

impl fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WebSocketTransport({})", self.inner.url)
    }
}

/// TLS client configuration that accepts any server certificate.
///
/// SIP-over-WebSocket lab servers routinely run with self-signed
/// certificates.
fn insecure_tls_config() -> rustls::ClientConfig {
    rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
        .with_no_client_auth()
}

struct AcceptAnyServerCert;

impl rustls::client::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> std::result::Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}
