//! Request/response client over one QUIC stream

use anyhow::{bail, Context, Result};
use antibrute_core::transport::{configure_client, SERVER_NAME};
use antibrute_core::{CoreError, MessageCodec, NetworkMessage, Request, Response};
use quinn::{Connection, Endpoint, SendStream};
use rustls::client::danger::ServerCertVerifier;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::message_reader::MessageReader;

/// Connected, handshaken client
pub struct Client {
    endpoint: Endpoint,
    connection: Connection,
    send: SendStream,
    reader: MessageReader,
    next_id: u64,
    timeout: Duration,
}

impl Client {
    /// Connect, open a stream and exchange `Hello`
    pub async fn connect(
        addr: SocketAddr,
        verifier: Arc<dyn ServerCertVerifier>,
        timeout: Duration,
    ) -> Result<Self> {
        let bind: SocketAddr = if addr.is_ipv6() {
            "[::]:0".parse()?
        } else {
            "0.0.0.0:0".parse()?
        };
        let mut endpoint = Endpoint::client(bind).context("Failed to create QUIC endpoint")?;
        endpoint.set_default_client_config(configure_client(verifier)?);

        let connecting = endpoint
            .connect(addr, SERVER_NAME)
            .context("Failed to initiate connection")?;
        let connection = with_timeout(timeout, connecting)
            .await?
            .with_context(|| format!("Connection to {} failed", addr))?;

        let (send, recv) = connection.open_bi().await.context("Failed to open stream")?;

        let mut client = Self {
            endpoint,
            connection,
            send,
            reader: MessageReader::new(recv),
            next_id: 1,
            timeout,
        };
        client.handshake().await?;
        Ok(client)
    }

    async fn handshake(&mut self) -> Result<()> {
        self.write(&NetworkMessage::hello()).await?;
        let reply = with_timeout(self.timeout, self.reader.read_message()).await??;
        reply
            .validate_handshake()
            .context("Handshake rejected by server")?;
        tracing::debug!("Handshake complete: {:?}", reply);
        Ok(())
    }

    /// Send one request and wait for its response
    ///
    /// An `Error` response is returned as-is; transport problems are `Err`.
    pub async fn call(&mut self, request: Request) -> Result<Response> {
        let id = self.next_id;
        self.next_id += 1;

        self.write(&NetworkMessage::request(id, request)).await?;

        loop {
            let msg = with_timeout(self.timeout, self.reader.read_message()).await??;
            match msg {
                NetworkMessage::Response { id: got, response } if got == id => return Ok(response),
                NetworkMessage::Response { id: got, .. } => {
                    tracing::debug!("Skipping stale response {}", got);
                }
                NetworkMessage::Pong { .. } => {}
                NetworkMessage::Close => bail!(CoreError::Connection("server closed stream".into())),
                other => bail!(CoreError::Protocol(format!("unexpected message: {:?}", other))),
            }
        }
    }

    /// Say goodbye and close the connection
    pub async fn close(mut self) {
        let _ = self.write(&NetworkMessage::Close).await;
        let _ = self.send.finish();
        self.connection.close(0u32.into(), b"done");
        self.endpoint.wait_idle().await;
    }

    async fn write(&mut self, msg: &NetworkMessage) -> Result<()> {
        let encoded = MessageCodec::encode(msg)?;
        self.send.write_all(&encoded).await?;
        Ok(())
    }
}

async fn with_timeout<F: std::future::Future>(timeout: Duration, fut: F) -> Result<F::Output> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| CoreError::Timeout(timeout.as_millis() as u64).into())
}
