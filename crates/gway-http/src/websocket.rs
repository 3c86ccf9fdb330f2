use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

#[derive(Debug, Error)]
pub enum WsError {
    #[error("invalid websocket url: {0}")]
    InvalidUrl(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tls error: {0}")]
    Tls(String),
    #[error("server did not upgrade the connection (status {0})")]
    NotUpgraded(u16),
    #[error("server sent an invalid Sec-WebSocket-Accept value")]
    InvalidUpgrade,
    #[error("connection closed")]
    Closed,
    #[error("frame exceeded the maximum allowed payload size")]
    FrameTooLarge,
}

/// The two halves of either a plain or a TLS-wrapped socket, unified behind one `AsyncRead`/
/// `AsyncWrite` pair so the frame reader/writer below doesn't need to know which scheme dialed.
enum ReadSide {
    Plain(OwnedReadHalf),
    Tls(tokio::io::ReadHalf<TlsStream<TcpStream>>),
}

impl AsyncRead for ReadSide {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ReadSide::Plain(half) => Pin::new(half).poll_read(cx, buf),
            ReadSide::Tls(half) => Pin::new(half).poll_read(cx, buf),
        }
    }
}

enum WriteSide {
    Plain(OwnedWriteHalf),
    Tls(tokio::io::WriteHalf<TlsStream<TcpStream>>),
}

impl AsyncWrite for WriteSide {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            WriteSide::Plain(half) => Pin::new(half).poll_write(cx, buf),
            WriteSide::Tls(half) => Pin::new(half).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            WriteSide::Plain(half) => Pin::new(half).poll_flush(cx),
            WriteSide::Tls(half) => Pin::new(half).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            WriteSide::Plain(half) => Pin::new(half).poll_shutdown(cx),
            WriteSide::Tls(half) => Pin::new(half).poll_shutdown(cx),
        }
    }
}

fn tls_connector() -> TlsConnector {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Text,
    Binary,
}

const OP_CONTINUATION: u8 = 0x0;
const OP_TEXT: u8 = 0x1;
const OP_BINARY: u8 = 0x2;
const OP_CLOSE: u8 = 0x8;
const OP_PING: u8 = 0x9;
const OP_PONG: u8 = 0xA;

const MAX_FRAME_PAYLOAD: usize = 64 * 1024 * 1024;

/// RFC 6455 client over either a plain (`ws://`, port 80 default) or TLS-wrapped (`wss://`, port
/// 443 default) TCP socket (spec §6): this is the gateway dialing out to a realtime upstream as a
/// client, distinct from the gateway's own inbound server, which stays cleartext (Non-goals: TLS
/// termination).
pub struct WebSocketClient {
    reader: BufReader<ReadSide>,
    writer: Arc<Mutex<WriteSide>>,
    closed: Arc<AtomicBool>,
}

impl WebSocketClient {
    pub async fn connect(url: &str) -> Result<Self, WsError> {
        let (scheme, host, port, path) = parse_ws_url(url)?;
        let tcp = TcpStream::connect((host.as_str(), port)).await?;

        let (mut read_half, mut write_half) = match scheme {
            Scheme::Ws => {
                let (read_half, write_half) = tcp.into_split();
                (ReadSide::Plain(read_half), WriteSide::Plain(write_half))
            }
            Scheme::Wss => {
                let server_name = ServerName::try_from(host.clone())
                    .map_err(|_| WsError::InvalidUrl(url.to_string()))?;
                let tls_stream = tls_connector()
                    .connect(server_name, tcp)
                    .await
                    .map_err(|err| WsError::Tls(err.to_string()))?;
                let (read_half, write_half) = tokio::io::split(tls_stream);
                (ReadSide::Tls(read_half), WriteSide::Tls(write_half))
            }
        };

        let mut key_bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut key_bytes);
        let key = BASE64.encode(key_bytes);

        let request = format!(
            "GET {path} HTTP/1.1\r\n\
             Host: {host}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Version: 13\r\n\
             Sec-WebSocket-Key: {key}\r\n\r\n"
        );
        write_half.write_all(request.as_bytes()).await?;

        let mut reader = BufReader::new(read_half);
        let response_headers = read_http_response_headers(&mut reader).await?;
        read_half = reader.into_inner();

        let status = response_headers.status;
        if status != 101 {
            return Err(WsError::NotUpgraded(status));
        }
        let accept = response_headers
            .header("sec-websocket-accept")
            .ok_or(WsError::InvalidUpgrade)?;
        let expected = expected_accept(&key);
        if accept != expected {
            return Err(WsError::InvalidUpgrade);
        }

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: Arc::new(Mutex::new(write_half)),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Masks and sends one complete (unfragmented) application frame.
    pub async fn send(&self, opcode: Opcode, payload: &[u8]) -> Result<(), WsError> {
        let op = match opcode {
            Opcode::Text => OP_TEXT,
            Opcode::Binary => OP_BINARY,
        };
        self.write_frame(op, payload).await
    }

    /// Reads one application message, defragmenting continuations and transparently handling
    /// control frames. Returns `None` once the peer has sent a close frame.
    pub async fn recv(&mut self) -> Result<Option<(Vec<u8>, Opcode)>, WsError> {
        let mut assembled: Vec<u8> = Vec::new();
        let mut message_opcode: Option<Opcode> = None;

        loop {
            let frame = self.read_frame().await?;
            match frame.opcode {
                OP_PING => {
                    self.write_frame(OP_PONG, &frame.payload).await?;
                    continue;
                }
                OP_PONG => continue,
                OP_CLOSE => {
                    self.closed.store(true, Ordering::SeqCst);
                    return Ok(None);
                }
                OP_TEXT | OP_BINARY => {
                    if message_opcode.is_some() {
                        return Err(WsError::InvalidUpgrade);
                    }
                    message_opcode = Some(if frame.opcode == OP_TEXT {
                        Opcode::Text
                    } else {
                        Opcode::Binary
                    });
                    assembled.extend_from_slice(&frame.payload);
                }
                OP_CONTINUATION => {
                    assembled.extend_from_slice(&frame.payload);
                }
                _ => continue,
            }

            if frame.fin {
                let opcode = message_opcode.unwrap_or(Opcode::Binary);
                return Ok(Some((assembled, opcode)));
            }
        }
    }

    /// Sends a zero-payload close frame and shuts the socket down. Idempotent.
    pub async fn close(&self) -> Result<(), WsError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.write_frame(OP_CLOSE, &[]).await?;
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
        Ok(())
    }

    async fn write_frame(&self, opcode: u8, payload: &[u8]) -> Result<(), WsError> {
        let mut frame = Vec::with_capacity(payload.len() + 14);
        frame.push(0x80 | opcode);

        let len = payload.len();
        if len <= 125 {
            frame.push(0x80 | len as u8);
        } else if len <= 0xFFFF {
            frame.push(0x80 | 126);
            frame.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            frame.push(0x80 | 127);
            frame.extend_from_slice(&(len as u64).to_be_bytes());
        }

        let mut mask_key = [0u8; 4];
        rand::rng().fill_bytes(&mut mask_key);
        frame.extend_from_slice(&mask_key);

        let mut masked_payload = payload.to_vec();
        for (i, byte) in masked_payload.iter_mut().enumerate() {
            *byte ^= mask_key[i % 4];
        }
        frame.extend_from_slice(&masked_payload);

        let mut writer = self.writer.lock().await;
        writer.write_all(&frame).await?;
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<RawFrame, WsError> {
        let mut header = [0u8; 2];
        self.reader.read_exact(&mut header).await?;
        let fin = header[0] & 0x80 != 0;
        let opcode = header[0] & 0x0F;
        let masked = header[1] & 0x80 != 0;
        let mut len = (header[1] & 0x7F) as u64;

        if len == 126 {
            let mut ext = [0u8; 2];
            self.reader.read_exact(&mut ext).await?;
            len = u16::from_be_bytes(ext) as u64;
        } else if len == 127 {
            let mut ext = [0u8; 8];
            self.reader.read_exact(&mut ext).await?;
            len = u64::from_be_bytes(ext);
        }
        if len as usize > MAX_FRAME_PAYLOAD {
            return Err(WsError::FrameTooLarge);
        }

        let mask = if masked {
            let mut mask = [0u8; 4];
            self.reader.read_exact(&mut mask).await?;
            Some(mask)
        } else {
            None
        };

        let mut payload = vec![0u8; len as usize];
        self.reader.read_exact(&mut payload).await?;
        if let Some(mask) = mask {
            for (i, byte) in payload.iter_mut().enumerate() {
                *byte ^= mask[i % 4];
            }
        }

        Ok(RawFrame { fin, opcode, payload })
    }
}

struct RawFrame {
    fin: bool,
    opcode: u8,
    payload: Vec<u8>,
}

struct HttpResponseHeaders {
    status: u16,
    headers: Vec<(String, String)>,
}

impl HttpResponseHeaders {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

async fn read_http_response_headers(reader: &mut BufReader<ReadSide>) -> Result<HttpResponseHeaders, WsError> {
    use tokio::io::AsyncBufReadExt;

    let mut status_line = String::new();
    reader.read_line(&mut status_line).await?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| WsError::NotUpgraded(0))?;

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    Ok(HttpResponseHeaders { status, headers })
}

fn expected_accept(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    Ws,
    Wss,
}

fn parse_ws_url(url: &str) -> Result<(Scheme, String, u16, String), WsError> {
    let (scheme, rest, default_port) = if let Some(rest) = url.strip_prefix("wss://") {
        (Scheme::Wss, rest, 443)
    } else if let Some(rest) = url.strip_prefix("ws://") {
        (Scheme::Ws, rest, 80)
    } else {
        return Err(WsError::InvalidUrl(url.to_string()));
    };
    let (authority, path) = match rest.split_once('/') {
        Some((authority, path)) => (authority, format!("/{path}")),
        None => (rest, "/".to_string()),
    };
    let (host, port) = match authority.split_once(':') {
        Some((host, port)) => (
            host.to_string(),
            port.parse::<u16>()
                .map_err(|_| WsError::InvalidUrl(url.to_string()))?,
        ),
        None => (authority.to_string(), default_port),
    };
    Ok((scheme, host, port, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_accept_matches_rfc6455_example() {
        // RFC 6455 §1.3 worked example.
        let accept = expected_accept("dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn parse_ws_url_splits_host_port_path() {
        let (scheme, host, port, path) = parse_ws_url("ws://example.com:9001/v1/stream").unwrap();
        assert_eq!(scheme, Scheme::Ws);
        assert_eq!(host, "example.com");
        assert_eq!(port, 9001);
        assert_eq!(path, "/v1/stream");
    }

    #[test]
    fn parse_ws_url_defaults_port_and_path() {
        let (scheme, host, port, path) = parse_ws_url("ws://example.com").unwrap();
        assert_eq!(scheme, Scheme::Ws);
        assert_eq!(host, "example.com");
        assert_eq!(port, 80);
        assert_eq!(path, "/");
    }

    #[test]
    fn parse_wss_url_defaults_to_port_443() {
        let (scheme, host, port, _) = parse_ws_url("wss://example.com/v1/stream").unwrap();
        assert_eq!(scheme, Scheme::Wss);
        assert_eq!(host, "example.com");
        assert_eq!(port, 443);
    }

    #[test]
    fn rejects_non_ws_scheme() {
        assert!(parse_ws_url("https://example.com").is_err());
    }

    #[test]
    fn masking_round_trips() {
        let payload = b"hello gateway";
        let mask_key = [0x12, 0x34, 0x56, 0x78];
        let mut masked = payload.to_vec();
        for (i, byte) in masked.iter_mut().enumerate() {
            *byte ^= mask_key[i % 4];
        }
        let mut unmasked = masked.clone();
        for (i, byte) in unmasked.iter_mut().enumerate() {
            *byte ^= mask_key[i % 4];
        }
        assert_eq!(unmasked, payload);
    }
}
