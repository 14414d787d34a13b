//! QUIC server for decision requests
//!
//! Each bi-directional stream is an independent session: it opens with a
//! `Hello`, then carries any number of `Request`s, each answered by a
//! `Response` with the same id.

use anyhow::{Context, Result};
use antibrute_core::{
    protocol::MessageCodec, transport::configure_server, AuthEngine, CoreError, NetworkMessage,
};
use quinn::{Endpoint, TokioRuntime};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::handler;
use crate::ratelimit::ConnectionLimiter;

/// How often idle throttle state is trimmed
const LIMITER_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// QUIC server in front of the decision engine
pub struct QuicServer {
    endpoint: Endpoint,
    engine: Arc<AuthEngine>,
    limiter: ConnectionLimiter,
}

impl QuicServer {
    /// Bind the endpoint with the given certificate
    pub fn new(
        bind_addr: SocketAddr,
        cert: CertificateDer<'static>,
        key: PrivateKeyDer<'static>,
        engine: Arc<AuthEngine>,
        limiter: ConnectionLimiter,
    ) -> Result<Self> {
        let cfg = configure_server(vec![cert], key).context("Failed to configure server")?;

        let socket =
            std::net::UdpSocket::bind(bind_addr).context("Failed to bind UDP socket")?;

        let runtime = Arc::new(TokioRuntime);
        let endpoint = Endpoint::new(Default::default(), Some(cfg), socket, runtime)
            .context("Failed to create QUIC endpoint")?;

        tracing::info!("QUIC server listening on {}", endpoint.local_addr()?);

        Ok(Self {
            endpoint,
            engine,
            limiter,
        })
    }

    /// Actual bound address (resolves port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.endpoint.local_addr()?)
    }

    /// Accept connections until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let limiter = self.limiter.clone();
        let cleanup_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(LIMITER_CLEANUP_INTERVAL);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = tick.tick() => limiter.retain_recent(),
                    _ = cleanup_shutdown.cancelled() => break,
                }
            }
        });

        loop {
            tokio::select! {
                incoming = self.endpoint.accept() => {
                    match incoming {
                        Some(incoming) => {
                            let peer = incoming.remote_address();
                            if let Err(e) = self.limiter.check(peer.ip()) {
                                tracing::warn!("Refusing connection from {}: {}", peer, e);
                                incoming.refuse();
                                continue;
                            }

                            let engine = Arc::clone(&self.engine);
                            let shutdown = shutdown.clone();
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(incoming, engine, shutdown).await {
                                    tracing::error!("Connection error: {}", e);
                                }
                            });
                        }
                        None => {
                            tracing::warn!("Endpoint closed");
                            break;
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.endpoint.close(0u32.into(), b"shutdown");
        Ok(())
    }

    /// Handle single connection
    async fn handle_connection(
        incoming: quinn::Incoming,
        engine: Arc<AuthEngine>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let connection = incoming.accept()?.await?;
        let remote_addr = connection.remote_address();
        tracing::debug!("Connection from {}", remote_addr);

        loop {
            let accepted = tokio::select! {
                accepted = connection.accept_bi() => accepted,
                _ = shutdown.cancelled() => break,
            };
            match accepted {
                Ok((send, recv)) => {
                    let engine = Arc::clone(&engine);
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_stream(send, recv, engine, remote_addr).await {
                            tracing::warn!("Stream error from {}: {}", remote_addr, e);
                        }
                    });
                }
                Err(quinn::ConnectionError::ApplicationClosed(_))
                | Err(quinn::ConnectionError::LocallyClosed) => {
                    tracing::debug!("Connection closed: {}", remote_addr);
                    break;
                }
                Err(e) => {
                    tracing::warn!("Accept stream error: {}", e);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle single bi-directional stream
    async fn handle_stream(
        mut send: quinn::SendStream,
        mut recv: quinn::RecvStream,
        engine: Arc<AuthEngine>,
        peer_addr: SocketAddr,
    ) -> Result<()> {
        let mut greeted = false;
        let mut recv_buffer = Vec::new();

        'stream: loop {
            let mut read_buf = [0u8; 8192];
            let n = match recv.read(&mut read_buf).await? {
                Some(0) | None => break,
                Some(n) => n,
            };
            recv_buffer.extend_from_slice(&read_buf[..n]);

            while let Some((msg, used)) = MessageCodec::try_decode(&recv_buffer)? {
                recv_buffer.drain(..used);

                match msg {
                    NetworkMessage::Hello { .. } if !greeted => {
                        if let Err(e) = msg.validate_handshake() {
                            tracing::warn!("Handshake from {} rejected: {}", peer_addr, e);
                            Self::send_message(&mut send, &NetworkMessage::hello()).await?;
                            break 'stream;
                        }
                        greeted = true;
                        Self::send_message(&mut send, &NetworkMessage::hello()).await?;
                    }
                    _ if !greeted => {
                        tracing::warn!("Message before handshake from {}", peer_addr);
                        return Err(CoreError::InvalidHandshake.into());
                    }
                    NetworkMessage::Request { id, request } => {
                        tracing::trace!(id, request = request.name(), "Request from {}", peer_addr);
                        let response = handler::dispatch(&engine, request).await;
                        Self::send_message(&mut send, &NetworkMessage::response(id, response))
                            .await?;
                    }
                    NetworkMessage::Ping { timestamp } => {
                        Self::send_message(&mut send, &NetworkMessage::pong(timestamp)).await?;
                    }
                    NetworkMessage::Close => {
                        tracing::debug!("Received Close from {}", peer_addr);
                        break 'stream;
                    }
                    other => {
                        tracing::debug!("Ignoring unexpected message from {}: {:?}", peer_addr, other);
                    }
                }
            }
        }

        let _ = send.finish();
        Ok(())
    }

    async fn send_message(send: &mut quinn::SendStream, msg: &NetworkMessage) -> Result<()> {
        let encoded = MessageCodec::encode(msg)?;
        send.write_all(&encoded).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use antibrute_core::transport::{configure_client, SkipVerification, SERVER_NAME};
    use antibrute_core::{AuthRequest, Limits, Request, Response};

    async fn start_server(limiter: ConnectionLimiter) -> (SocketAddr, CancellationToken) {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let generated = rcgen::generate_simple_self_signed(vec![SERVER_NAME.to_string()]).unwrap();
        let cert = CertificateDer::from(generated.cert.der().to_vec());
        let key = PrivateKeyDer::Pkcs8(generated.key_pair.serialize_der().into());

        let engine = Arc::new(AuthEngine::new(Limits { login: 1, ..Limits::default() }).unwrap());
        let server = QuicServer::new("127.0.0.1:0".parse().unwrap(), cert, key, engine, limiter)
            .unwrap();
        let addr = server.local_addr().unwrap();

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        tokio::spawn(async move { server.run(token).await });
        (addr, shutdown)
    }

    async fn connect(addr: SocketAddr) -> std::result::Result<quinn::Connection, quinn::ConnectionError> {
        let mut endpoint = Endpoint::client("127.0.0.1:0".parse().unwrap()).unwrap();
        endpoint.set_default_client_config(configure_client(Arc::new(SkipVerification)).unwrap());
        endpoint.connect(addr, SERVER_NAME).unwrap().await
    }

    async fn read_message(recv: &mut quinn::RecvStream) -> NetworkMessage {
        let mut prefix = [0u8; 4];
        recv.read_exact(&mut prefix).await.unwrap();
        let mut payload = vec![0u8; MessageCodec::frame_len(prefix).unwrap()];
        recv.read_exact(&mut payload).await.unwrap();
        MessageCodec::decode_payload(&payload).unwrap()
    }

    async fn write_message(send: &mut quinn::SendStream, msg: &NetworkMessage) {
        send.write_all(&MessageCodec::encode(msg).unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn test_hello_then_requests() {
        let (addr, shutdown) = start_server(ConnectionLimiter::new(100)).await;
        let connection = connect(addr).await.unwrap();
        let (mut send, mut recv) = connection.open_bi().await.unwrap();

        write_message(&mut send, &NetworkMessage::hello()).await;
        assert!(read_message(&mut recv).await.validate_handshake().is_ok());

        let auth = Request::Auth(AuthRequest::new("alice", "p", "1.2.3.4"));
        for (id, expected) in [(1, true), (2, false)] {
            write_message(&mut send, &NetworkMessage::request(id, auth.clone())).await;
            assert_eq!(
                read_message(&mut recv).await,
                NetworkMessage::response(id, Response::Auth { ok: expected })
            );
        }

        write_message(&mut send, &NetworkMessage::pong(0)).await;
        write_message(&mut send, &NetworkMessage::Ping { timestamp: 42 }).await;
        assert_eq!(read_message(&mut recv).await, NetworkMessage::pong(42));

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_request_before_hello_closes_stream() {
        let (addr, shutdown) = start_server(ConnectionLimiter::new(100)).await;
        let connection = connect(addr).await.unwrap();
        let (mut send, mut recv) = connection.open_bi().await.unwrap();

        write_message(&mut send, &NetworkMessage::request(1, Request::CountBuckets)).await;
        let mut buf = [0u8; 16];
        let read = recv.read(&mut buf).await;
        assert!(!matches!(read, Ok(Some(n)) if n > 0));

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_throttled_peer_refused() {
        let (addr, shutdown) = start_server(ConnectionLimiter::new(1)).await;
        assert!(connect(addr).await.is_ok());
        assert!(connect(addr).await.is_err());
        shutdown.cancel();
    }
}
