//! Minimal HTTP/1.1 adapter.
//!
//! The protocol surface is four fixed routes with small JSON bodies, so the
//! adapter reads exactly what it needs: a request line, headers up to the
//! blank line (only `Content-Length` matters), and the body. Anything
//! outside those bounds closes the connection. TLS termination is an
//! upstream responsibility.

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ServerError;

/// Upper bound on a single header line.
const MAX_HEADER_LEN: usize = 8 * 1024;

/// Upper bound on a request body; protocol bodies are a few hundred bytes.
const MAX_BODY_LEN: usize = 64 * 1024;

/// Upper bound on header count per request.
const MAX_HEADERS: usize = 64;

/// A parsed inbound request.
#[derive(Debug)]
pub(crate) struct Request {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

/// Read one request off the connection.
///
/// Returns `Ok(None)` on a clean EOF between requests (client closed a
/// keep-alive connection).
pub(crate) async fn read_request<R>(reader: &mut R) -> Result<Option<Request>, ServerError>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| ServerError::Http("empty request line".to_string()))?
        .to_string();
    let path = parts
        .next()
        .ok_or_else(|| ServerError::Http("request line missing path".to_string()))?
        .to_string();

    let mut content_length = 0usize;
    for _ in 0..MAX_HEADERS {
        let mut header = String::new();
        if reader.read_line(&mut header).await? == 0 {
            return Err(ServerError::Http("eof inside headers".to_string()));
        }
        if header.len() > MAX_HEADER_LEN {
            return Err(ServerError::Http("header too long".to_string()));
        }

        let header = header.trim_end();
        if header.is_empty() {
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).await?;
            return Ok(Some(Request { method, path, body }));
        }

        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value
                    .trim()
                    .parse()
                    .map_err(|_| ServerError::Http("bad content-length".to_string()))?;
                if content_length > MAX_BODY_LEN {
                    return Err(ServerError::Http("body too large".to_string()));
                }
            }
        }
    }

    Err(ServerError::Http("too many headers".to_string()))
}

/// Write a response with a JSON (or empty) body.
pub(crate) async fn write_response<W>(
    writer: &mut W,
    status: u16,
    body: &[u8],
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Internal Server Error",
    };

    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: keep-alive\r\n\r\n",
        body.len()
    );
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await
}
