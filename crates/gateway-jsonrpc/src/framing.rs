//! LSP's `Content-Length`-framed encoding (C1: Framed Transport).
//!
//! Ported from `helix-lsp::transport::recv_server_message`'s header-parsing
//! loop, split out as a standalone, independently testable module and
//! hardened with an explicit size cap and error taxonomy a bare editor
//! transport has no need for.

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frames larger than this are rejected outright.
pub const MAX_CONTENT_LENGTH: usize = 32 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),
    #[error("missing Content-Length header")]
    MissingContentLength,
    #[error("Content-Length {0} exceeds the {MAX_CONTENT_LENGTH} byte cap")]
    ContentLengthTooLarge(usize),
    #[error("payload was not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reads one length-prefixed frame's raw JSON payload bytes from `reader`.
///
/// Returns `Ok(None)` if the stream hit EOF cleanly between messages (no
/// header bytes read at all); any other form of truncation is a
/// [`FramingError`].
pub async fn read_frame(
    reader: &mut (impl AsyncBufRead + Unpin + Send),
    line_buf: &mut String,
) -> Result<Option<Vec<u8>>, FramingError> {
    let mut content_length = None;
    let mut saw_any_header_bytes = false;

    loop {
        line_buf.clear();
        let n = reader.read_line(line_buf).await?;
        if n == 0 {
            if saw_any_header_bytes || content_length.is_some() {
                return Err(FramingError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "stream closed mid-header",
                )));
            }
            return Ok(None);
        }
        saw_any_header_bytes = true;

        let header = line_buf.trim();
        if header.is_empty() {
            break;
        }

        let mut parts = header.splitn(2, ':');
        match (parts.next(), parts.next()) {
            (Some(name), Some(value)) => {
                if name.trim().eq_ignore_ascii_case("content-length") {
                    let value = value.trim();
                    let len: i64 = value
                        .parse()
                        .map_err(|_| FramingError::MalformedHeader(header.to_string()))?;
                    if len < 0 {
                        return Err(FramingError::ContentLengthTooLarge(0));
                    }
                    content_length = Some(len as usize);
                }
                // any other header (e.g. Content-Type) is tolerated and ignored
            }
            _ => return Err(FramingError::MalformedHeader(header.to_string())),
        }
    }

    let content_length = content_length.ok_or(FramingError::MissingContentLength)?;
    if content_length > MAX_CONTENT_LENGTH {
        return Err(FramingError::ContentLengthTooLarge(content_length));
    }

    let mut content = vec![0u8; content_length];
    reader.read_exact(&mut content).await.map_err(|err| {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            FramingError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stream closed mid-payload",
            ))
        } else {
            FramingError::Io(err)
        }
    })?;

    // validate utf8 without requiring the payload be valid JSON here;
    // JSON parsing is the registry's concern, not the transport's.
    std::str::from_utf8(&content)?;

    Ok(Some(content))
}

/// Writes one length-prefixed frame containing `payload` to `writer`.
pub async fn write_frame(
    writer: &mut (impl AsyncWrite + Unpin + Send),
    payload: &[u8],
) -> Result<(), FramingError> {
    writer
        .write_all(format!("Content-Length: {}\r\n\r\n", payload.len()).as_bytes())
        .await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    fn encode(payload: &str) -> Vec<u8> {
        let mut buf = format!("Content-Length: {}\r\n\r\n", payload.len()).into_bytes();
        buf.extend_from_slice(payload.as_bytes());
        buf
    }

    #[tokio::test]
    async fn round_trips_a_well_formed_frame() {
        let payload = r#"{"jsonrpc":"2.0","id":1,"result":null}"#;
        let encoded = encode(payload);
        let mut reader = BufReader::new(&encoded[..]);
        let mut line_buf = String::new();
        let decoded = read_frame(&mut reader, &mut line_buf).await.unwrap().unwrap();
        assert_eq!(decoded, payload.as_bytes());

        let mut out = Vec::new();
        write_frame(&mut out, payload.as_bytes()).await.unwrap();
        assert_eq!(out, encoded);
    }

    #[tokio::test]
    async fn tolerates_and_ignores_extra_headers() {
        let payload = r#"{"jsonrpc":"2.0","id":1,"result":null}"#;
        let mut encoded = format!(
            "content-type: application/vscode-jsonrpc; charset=utf-8\r\nContent-Length: {}\r\n\r\n",
            payload.len()
        )
        .into_bytes();
        encoded.extend_from_slice(payload.as_bytes());

        let mut reader = BufReader::new(&encoded[..]);
        let mut line_buf = String::new();
        let decoded = read_frame(&mut reader, &mut line_buf).await.unwrap().unwrap();
        assert_eq!(decoded, payload.as_bytes());
    }

    #[tokio::test]
    async fn rejects_missing_content_length() {
        let encoded = b"Content-Type: application/json\r\n\r\n{}".to_vec();
        let mut reader = BufReader::new(&encoded[..]);
        let mut line_buf = String::new();
        let err = read_frame(&mut reader, &mut line_buf).await.unwrap_err();
        assert!(matches!(err, FramingError::MissingContentLength));
    }

    #[tokio::test]
    async fn rejects_oversized_content_length() {
        let encoded = format!("Content-Length: {}\r\n\r\n", MAX_CONTENT_LENGTH + 1).into_bytes();
        let mut reader = BufReader::new(&encoded[..]);
        let mut line_buf = String::new();
        let err = read_frame(&mut reader, &mut line_buf).await.unwrap_err();
        assert!(matches!(err, FramingError::ContentLengthTooLarge(_)));
    }

    #[tokio::test]
    async fn rejects_premature_eof_mid_message() {
        let payload = r#"{"jsonrpc":"2.0"}"#;
        let mut encoded = format!("Content-Length: {}\r\n\r\n", payload.len() + 10).into_bytes();
        encoded.extend_from_slice(payload.as_bytes());
        let mut reader = BufReader::new(&encoded[..]);
        let mut line_buf = String::new();
        let err = read_frame(&mut reader, &mut line_buf).await.unwrap_err();
        assert!(matches!(err, FramingError::Io(_)));
    }

    #[tokio::test]
    async fn clean_eof_between_messages_terminates_normally() {
        let mut reader = BufReader::new(&b""[..]);
        let mut line_buf = String::new();
        let result = read_frame(&mut reader, &mut line_buf).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn zero_length_message_is_accepted_as_empty_payload() {
        let encoded = b"Content-Length: 0\r\n\r\n".to_vec();
        let mut reader = BufReader::new(&encoded[..]);
        let mut line_buf = String::new();
        let decoded = read_frame(&mut reader, &mut line_buf).await.unwrap().unwrap();
        assert!(decoded.is_empty());
    }

    #[tokio::test]
    async fn decoder_rejects_malformed_frame_without_consuming_next_message() {
        let payload = r#"{"jsonrpc":"2.0","id":2,"result":null}"#;
        let mut encoded = b"not-a-header-line\r\n\r\n".to_vec();
        encoded.extend_from_slice(encode(payload).as_slice());
        let mut reader = BufReader::new(&encoded[..]);
        let mut line_buf = String::new();
        let err = read_frame(&mut reader, &mut line_buf).await.unwrap_err();
        assert!(matches!(err, FramingError::MalformedHeader(_)));

        // the next message is still readable because the bad line was fully consumed
        let decoded = read_frame(&mut reader, &mut line_buf).await.unwrap().unwrap();
        assert_eq!(decoded, payload.as_bytes());
    }
}
