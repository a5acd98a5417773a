use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::errors::{OracleError, OracleResult};

/// Splits a byte stream into complete lines.
///
/// Network chunks can end in the middle of a line or of a multi-byte
/// character, so raw bytes are buffered until a newline arrives. A final
/// line without a trailing newline is emitted when the stream ends.
pub fn lines<S, E>(bytes: S) -> impl Stream<Item = OracleResult<String>>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    bytes
        .map(Some)
        .chain(stream::once(async { None }))
        .scan(Vec::<u8>::new(), |buf, item| {
            let out: Vec<OracleResult<String>> = match item {
                Some(Ok(chunk)) => {
                    buf.extend_from_slice(&chunk);
                    let mut complete = Vec::new();
                    while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = buf.drain(..=pos).collect();
                        let text = String::from_utf8_lossy(&line).trim_end_matches(['\r', '\n']).to_string();
                        complete.push(Ok(text));
                    }
                    complete
                }
                Some(Err(e)) => vec![Err(OracleError::Stream(e.to_string()))],
                None => {
                    let rest = std::mem::take(buf);
                    let text = String::from_utf8_lossy(&rest).trim_end_matches(['\r', '\n']).to_string();
                    if text.is_empty() { vec![] } else { vec![Ok(text)] }
                }
            };
            futures::future::ready(Some(out))
        })
        .flat_map(stream::iter)
}

/// Payloads of server-sent `data:` lines. Comments, event names and the
/// `[DONE]` sentinel are dropped.
pub fn data_payloads<S>(lines: S) -> impl Stream<Item = OracleResult<String>>
where
    S: Stream<Item = OracleResult<String>>,
{
    lines.filter_map(|line| async move {
        match line {
            Ok(line) => {
                let payload = line.strip_prefix("data:")?.trim_start();
                if payload.is_empty() || payload == "[DONE]" {
                    None
                } else {
                    Some(Ok(payload.to_string()))
                }
            }
            Err(e) => Some(Err(e)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&[u8]]) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        let owned: Vec<Result<Bytes, std::io::Error>> =
            parts.iter().map(|p| Ok(Bytes::copy_from_slice(p))).collect();
        stream::iter(owned)
    }

    #[tokio::test]
    async fn test_lines_reassembles_split_chunks() {
        let out: Vec<String> = lines(chunks(&[b"data: {\"a\"", b":1}\n\ndata: x\r\n", b"tail"]))
            .map(|l| l.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec!["data: {\"a\":1}", "", "data: x", "tail"]);
    }

    #[tokio::test]
    async fn test_lines_keeps_multibyte_chars_split_across_chunks() {
        let text = "命運\n".as_bytes();
        let out: Vec<String> = lines(chunks(&[&text[..2], &text[2..]]))
            .map(|l| l.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec!["命運"]);
    }

    #[tokio::test]
    async fn test_lines_surfaces_transport_error() {
        let items: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"one\n")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let out: Vec<OracleResult<String>> = lines(stream::iter(items)).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), "one");
        assert!(matches!(out[1], Err(OracleError::Stream(_))));
    }

    #[tokio::test]
    async fn test_data_payloads_filters_non_data_lines() {
        let input = stream::iter(
            [": keepalive", "event: delta", "data: {\"t\":1}", "data:[DONE]", "data: "]
                .into_iter()
                .map(|s| Ok(s.to_string())),
        );
        let out: Vec<String> = data_payloads(input).map(|p| p.unwrap()).collect().await;
        assert_eq!(out, vec!["{\"t\":1}"]);
    }
}
