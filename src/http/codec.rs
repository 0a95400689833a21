//! HTTP/1.1 framing: reading requests off a connection and writing responses back.

use crate::app::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::http::response::reason_phrase;
use crate::http::{Body, Method, Request, Response};
use std::fmt::Write as _;
use std::time::SystemTime;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

const MAX_HEADERS: usize = 100;
/// Longest accepted request, header or chunk-size line, terminator included.
const MAX_LINE: usize = 8 * 1024;

/// A request read off the wire and whether the client wants the connection kept open.
#[derive(Debug)]
pub(crate) struct Incoming {
    pub(crate) request: Request,
    pub(crate) keep_alive: bool,
}

/// Reads one request. `Ok(None)` means the peer closed or stayed idle past `keep_alive`.
pub(crate) async fn read_request<R>(reader: &mut R, config: &ServerConfig) -> ServerResult<Option<Incoming>>
where
    R: AsyncBufRead + Unpin,
{
    let mut request_line = String::new();
    loop {
        match timeout(config.keep_alive, read_line(reader, &mut request_line)).await {
            Err(_) => return Ok(None),
            Ok(read) => {
                if read? == 0 {
                    return Ok(None);
                }
            }
        }
        // Tolerate stray CRLFs between pipelined requests.
        if !request_line.trim().is_empty() {
            break;
        }
        request_line.clear();
    }

    timeout(config.read_timeout, read_rest(reader, &request_line, config))
        .await
        .map_err(|_| ServerError::BadRequest("timed out reading request".to_string()))?
        .map(Some)
}

async fn read_rest<R>(reader: &mut R, request_line: &str, config: &ServerConfig) -> ServerResult<Incoming>
where
    R: AsyncBufRead + Unpin,
{
    let mut parts = request_line.split_whitespace();
    let method: Method = parts
        .next()
        .ok_or_else(|| ServerError::Parse("empty request line".to_string()))?
        .parse()?;
    let target = parts
        .next()
        .ok_or_else(|| ServerError::Parse("missing request target".to_string()))?;
    let version = parts.next().unwrap_or("HTTP/1.1");

    let mut request = Request::new(method, target);
    loop {
        let mut line = String::new();
        if read_line(reader, &mut line).await? == 0 {
            return Err(ServerError::Parse("connection closed inside headers".to_string()));
        }
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if request.headers.len() >= MAX_HEADERS {
            return Err(ServerError::BadRequest("too many headers".to_string()));
        }
        if let Some((name, value)) = line.split_once(':') {
            request.headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let content_type = request.get_header("content-type").unwrap_or_default().to_string();
    let chunked = request
        .get_header("transfer-encoding")
        .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"));
    let data = if chunked {
        read_chunked(reader, config.max_body_size).await?
    } else {
        match request.get_header("content-length") {
            Some(length) => {
                let length: usize = length
                    .parse()
                    .map_err(|_| ServerError::BadRequest("invalid content-length".to_string()))?;
                if length > config.max_body_size {
                    return Err(ServerError::PayloadTooLarge);
                }
                let mut data = vec![0; length];
                reader.read_exact(&mut data).await?;
                data
            }
            None => Vec::new(),
        }
    };
    request.body = Body::new(content_type, data);

    let connection = request
        .get_header("connection")
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let keep_alive = if version == "HTTP/1.0" {
        connection.contains("keep-alive")
    } else {
        !connection.contains("close")
    };

    Ok(Incoming { request, keep_alive })
}

async fn read_chunked<R>(reader: &mut R, limit: usize) -> ServerResult<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut data = Vec::new();
    loop {
        let mut size_line = String::new();
        read_line(reader, &mut size_line).await?;
        let size = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size, 16)
            .map_err(|_| ServerError::BadRequest("invalid chunk size".to_string()))?;
        if size == 0 {
            // Trailers end with an empty line.
            loop {
                let mut trailer = String::new();
                if read_line(reader, &mut trailer).await? == 0 || trailer.trim().is_empty() {
                    return Ok(data);
                }
            }
        }
        let start = data.len();
        let end = start
            .checked_add(size)
            .filter(|end| *end <= limit)
            .ok_or(ServerError::PayloadTooLarge)?;
        data.resize(end, 0);
        reader.read_exact(&mut data[start..]).await?;
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf).await?;
    }
}

/// Reads one line of at most [`MAX_LINE`] bytes. Longer lines are a bad request.
async fn read_line<R>(reader: &mut R, line: &mut String) -> ServerResult<usize>
where
    R: AsyncBufRead + Unpin,
{
    let read = (&mut *reader).take(MAX_LINE as u64).read_line(line).await?;
    if read == MAX_LINE && !line.ends_with('\n') {
        return Err(ServerError::BadRequest("line too long".to_string()));
    }
    Ok(read)
}

/// Serializes a response with `Date`, `Content-Length` and `Connection` headers.
pub(crate) async fn write_response<W>(writer: &mut W, response: &Response, keep_alive: bool) -> ServerResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut head = String::with_capacity(256);
    let _ = write!(head, "HTTP/1.1 {} {}\r\n", response.status, reason_phrase(response.status));
    for (name, value) in &response.headers {
        if ["content-length", "connection", "date"]
            .iter()
            .any(|skip| name.eq_ignore_ascii_case(skip))
        {
            continue;
        }
        let _ = write!(head, "{}: {}\r\n", name, value);
    }
    let _ = write!(head, "Date: {}\r\n", httpdate::fmt_http_date(SystemTime::now()));
    let _ = write!(head, "Content-Length: {}\r\n", response.body.len());
    let _ = write!(
        head,
        "Connection: {}\r\n\r\n",
        if keep_alive { "keep-alive" } else { "close" }
    );

    writer.write_all(head.as_bytes()).await?;
    writer.write_all(&response.body).await?;
    writer.flush().await?;
    Ok(())
}
