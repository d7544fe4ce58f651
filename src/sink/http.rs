//! Just enough HTTP/1.x to take one request per connection and answer it

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::SinkError;

/// Upper bound on request line plus headers, and on a chunked body's trailers
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Upper bound on one chunk-size line, extensions included
pub const MAX_CHUNK_LINE_BYTES: usize = 4 * 1024;

/// How the request body is framed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    None,
    Length(usize),
    Chunked,
}

/// Parsed request line and the headers the sink cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub framing: BodyFraming,
    pub expect_continue: bool,
}

/// Read one line including `\n`, counting it against `budget`
async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R, budget: &mut usize) -> Result<Vec<u8>, SinkError> {
    let mut line = Vec::new();
    let mut limited = (&mut *reader).take(*budget as u64 + 1);
    limited.read_until(b'\n', &mut line).await.map_err(SinkError::BodyRead)?;
    if line.len() > *budget {
        return Err(SinkError::Malformed("line too long".to_string()));
    }
    *budget -= line.len();
    Ok(line)
}

fn trim_line(line: &[u8]) -> Result<&str, SinkError> {
    let text = std::str::from_utf8(line).map_err(|_| SinkError::Malformed("request head is not UTF-8".to_string()))?;
    Ok(text.trim_end_matches(['\r', '\n']))
}

/// Read the request line and headers. `Ok(None)` means the peer closed before sending anything.
pub async fn read_head<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<RequestHead>, SinkError> {
    let mut budget = MAX_HEAD_BYTES;

    let first = read_line(reader, &mut budget).await?;
    if first.is_empty() {
        return Ok(None);
    }
    let request_line = trim_line(&first)?;

    let mut parts = request_line.split_whitespace();
    let (method, path, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(p), Some(v), None) => (m, p, v),
        _ => return Err(SinkError::Malformed(format!("bad request line {:?}", request_line))),
    };
    if !version.starts_with("HTTP/1.") {
        return Err(SinkError::Malformed(format!("unsupported protocol {:?}", version)));
    }

    let mut head = RequestHead {
        method: method.to_string(),
        path: path.to_string(),
        framing: BodyFraming::None,
        expect_continue: false,
    };

    loop {
        let raw = read_line(reader, &mut budget).await?;
        if raw.is_empty() {
            return Err(SinkError::BodyRead(std::io::ErrorKind::UnexpectedEof.into()));
        }
        let line = trim_line(&raw)?;
        if line.is_empty() {
            break;
        }

        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| SinkError::Malformed(format!("bad header line {:?}", line)))?;
        let value = value.trim();

        match name.trim().to_ascii_lowercase().as_str() {
            "content-length" => {
                if head.framing == BodyFraming::Chunked {
                    continue;
                }
                let len = value
                    .parse()
                    .map_err(|_| SinkError::Malformed(format!("bad content-length {:?}", value)))?;
                head.framing = BodyFraming::Length(len);
            }
            "transfer-encoding" => {
                if value.to_ascii_lowercase().contains("chunked") {
                    head.framing = BodyFraming::Chunked;
                }
            }
            "expect" => {
                head.expect_continue = value.eq_ignore_ascii_case("100-continue");
            }
            _ => {}
        }
    }

    Ok(Some(head))
}

/// Read the whole body into memory, refusing anything over `limit` bytes
pub async fn read_body<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    framing: BodyFraming,
    limit: usize,
) -> Result<Vec<u8>, SinkError> {
    match framing {
        BodyFraming::None => Ok(Vec::new()),
        BodyFraming::Length(len) => {
            if len > limit {
                return Err(SinkError::BodyTooLarge { limit });
            }
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body).await.map_err(SinkError::BodyRead)?;
            Ok(body)
        }
        BodyFraming::Chunked => read_chunked(reader, limit).await,
    }
}

async fn read_chunked<R: AsyncBufRead + Unpin>(reader: &mut R, limit: usize) -> Result<Vec<u8>, SinkError> {
    let mut body = Vec::new();

    loop {
        let mut line_budget = MAX_CHUNK_LINE_BYTES;
        let raw = read_line(reader, &mut line_budget).await?;
        if raw.is_empty() {
            return Err(SinkError::BodyRead(std::io::ErrorKind::UnexpectedEof.into()));
        }
        let line = trim_line(&raw)?;
        let size_text = line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_text, 16)
            .map_err(|_| SinkError::Malformed(format!("bad chunk size {:?}", size_text)))?;

        if size == 0 {
            // Trailers, ended by an empty line
            let mut budget = MAX_HEAD_BYTES;
            loop {
                let trailer = read_line(reader, &mut budget).await?;
                if trailer.is_empty() || trim_line(&trailer)?.is_empty() {
                    return Ok(body);
                }
            }
        }

        if body.len().saturating_add(size) > limit {
            return Err(SinkError::BodyTooLarge { limit });
        }

        let start = body.len();
        body.resize(start + size, 0);
        reader
            .read_exact(&mut body[start..])
            .await
            .map_err(SinkError::BodyRead)?;

        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf).await.map_err(SinkError::BodyRead)?;
        if &crlf != b"\r\n" {
            return Err(SinkError::Malformed("chunk not terminated by CRLF".to_string()));
        }
    }
}

/// Interim response for clients that wait before sending the body
pub async fn write_continue<W: AsyncWrite + Unpin>(writer: &mut W) -> std::io::Result<()> {
    writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
    writer.flush().await
}

/// Write a complete plain-text response and ask the client to close
pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    status: u16,
    reason: &str,
    body: &str,
) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_head_content_length() {
        let mut input: &[u8] =
            b"POST /go.app.info HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: 2\r\n\r\n{}";
        let head = read_head(&mut input).await.unwrap().unwrap();
        assert_eq!(head.method, "POST");
        assert_eq!(head.path, "/go.app.info");
        assert_eq!(head.framing, BodyFraming::Length(2));
        assert!(!head.expect_continue);

        let body = read_body(&mut input, head.framing, 1024).await.unwrap();
        assert_eq!(body, b"{}");
    }

    #[tokio::test]
    async fn test_read_head_without_body_headers() {
        let mut input: &[u8] = b"GET / HTTP/1.0\r\n\r\n";
        let head = read_head(&mut input).await.unwrap().unwrap();
        assert_eq!(head.framing, BodyFraming::None);
        assert!(read_body(&mut input, head.framing, 1024).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_head_empty_connection() {
        let mut input: &[u8] = b"";
        assert!(read_head(&mut input).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_head_rejects_garbage() {
        let mut input: &[u8] = b"HELLO\r\n\r\n";
        assert!(matches!(read_head(&mut input).await, Err(SinkError::Malformed(_))));

        let mut input: &[u8] = b"POST / SPDY/3\r\n\r\n";
        assert!(matches!(read_head(&mut input).await, Err(SinkError::Malformed(_))));

        let mut input: &[u8] = b"POST / HTTP/1.1\r\nContent-Length: many\r\n\r\n";
        assert!(matches!(read_head(&mut input).await, Err(SinkError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_read_head_too_large() {
        let mut raw = b"POST / HTTP/1.1\r\nX-Pad: ".to_vec();
        raw.extend(std::iter::repeat_n(b'a', MAX_HEAD_BYTES));
        raw.extend_from_slice(b"\r\n\r\n");
        let mut input: &[u8] = &raw;
        assert!(matches!(read_head(&mut input).await, Err(SinkError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_chunked_body_is_reassembled() {
        let mut input: &[u8] = b"POST /t HTTP/1.1\r\nTransfer-Encoding: chunked\r\nExpect: 100-continue\r\n\r\n5\r\n{\"a\":\r\n4;ext=1\r\n\"b\"}\r\n0\r\n\r\n";
        let head = read_head(&mut input).await.unwrap().unwrap();
        assert_eq!(head.framing, BodyFraming::Chunked);
        assert!(head.expect_continue);

        let body = read_body(&mut input, head.framing, 1024).await.unwrap();
        assert_eq!(body, br#"{"a":"b"}"#);
    }

    #[tokio::test]
    async fn test_many_small_chunks_count_only_payload() {
        let mut raw = Vec::new();
        for _ in 0..30_000 {
            raw.extend_from_slice(b"1\r\nx\r\n");
        }
        raw.extend_from_slice(b"0\r\n\r\n");
        let mut input: &[u8] = &raw;

        let body = read_body(&mut input, BodyFraming::Chunked, 1024 * 1024).await.unwrap();
        assert_eq!(body.len(), 30_000);
        assert!(body.iter().all(|&b| b == b'x'));
    }

    #[tokio::test]
    async fn test_oversized_chunk_line_is_malformed() {
        let mut raw = b"1;".to_vec();
        raw.extend(std::iter::repeat_n(b'e', MAX_CHUNK_LINE_BYTES));
        raw.extend_from_slice(b"\r\nx\r\n0\r\n\r\n");
        let mut input: &[u8] = &raw;
        assert!(matches!(
            read_body(&mut input, BodyFraming::Chunked, 1024).await,
            Err(SinkError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_body_limits() {
        let mut input: &[u8] = b"0123456789";
        assert!(matches!(
            read_body(&mut input, BodyFraming::Length(10), 4).await,
            Err(SinkError::BodyTooLarge { limit: 4 })
        ));

        let mut input: &[u8] = b"a\r\n0123456789\r\n0\r\n\r\n";
        assert!(matches!(
            read_body(&mut input, BodyFraming::Chunked, 4).await,
            Err(SinkError::BodyTooLarge { limit: 4 })
        ));
    }

    #[tokio::test]
    async fn test_truncated_body_is_read_error() {
        let mut input: &[u8] = b"abc";
        assert!(matches!(
            read_body(&mut input, BodyFraming::Length(10), 1024).await,
            Err(SinkError::BodyRead(_))
        ));
    }

    #[tokio::test]
    async fn test_write_response_layout() {
        let mut out = Vec::new();
        write_response(&mut out, 200, "OK", "OK").await.unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK"
        );
    }
}
