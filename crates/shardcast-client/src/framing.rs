//! Length-prefixed framing shared by clients and the stream server
//!
//! Every frame is a 4-byte big-endian length followed by a wire message
//! (`[format byte][u32 correlation id][postcard payload]`).

use crate::error::{Error, Result};
use shardcast_protocol::{Request, Response, WireFormat};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Open a TCP connection for framed traffic, bounded by `timeout`.
pub async fn connect(endpoint: &str, timeout: Duration) -> Result<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(endpoint))
        .await
        .map_err(|_| Error::Timeout(format!("connecting to {}", endpoint)))?
        .map_err(|e| Error::connection(format!("{}: {}", endpoint, e)))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Write one frame and flush.
pub async fn write_frame<W>(stream: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len())
        .map_err(|_| Error::ResponseTooLarge(payload.len(), u32::MAX as usize))?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one frame. `Ok(None)` means the peer closed between frames.
pub async fn read_frame<R>(stream: &mut R, max_message_size: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    let n = stream.read(&mut len_buf).await?;
    if n == 0 {
        return Ok(None);
    }
    // a close inside the length prefix is a truncated frame
    stream.read_exact(&mut len_buf[n..]).await?;

    let msg_len = u32::from_be_bytes(len_buf) as usize;
    if msg_len > max_message_size {
        return Err(Error::ResponseTooLarge(msg_len, max_message_size));
    }

    let mut buf = vec![0u8; msg_len];
    stream.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

pub async fn write_request<W>(stream: &mut W, request: &Request, correlation_id: u32) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = request.to_wire(WireFormat::Postcard, correlation_id)?;
    write_frame(stream, &bytes).await
}

pub async fn write_response<W>(
    stream: &mut W,
    response: &Response,
    correlation_id: u32,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = response.to_wire(WireFormat::Postcard, correlation_id)?;
    write_frame(stream, &bytes).await
}

pub async fn read_request<R>(
    stream: &mut R,
    max_message_size: usize,
) -> Result<Option<(Request, u32)>>
where
    R: AsyncRead + Unpin,
{
    match read_frame(stream, max_message_size).await? {
        Some(buf) => {
            let (request, _format, correlation_id) = Request::from_wire(&buf)?;
            Ok(Some((request, correlation_id)))
        }
        None => Ok(None),
    }
}

pub async fn read_response<R>(
    stream: &mut R,
    max_message_size: usize,
) -> Result<Option<(Response, u32)>>
where
    R: AsyncRead + Unpin,
{
    match read_frame(stream, max_message_size).await? {
        Some(buf) => {
            let (response, _format, correlation_id) = Response::from_wire(&buf)?;
            Ok(Some((response, correlation_id)))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardcast_protocol::MAX_MESSAGE_SIZE;

    #[tokio::test]
    async fn test_request_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let request = Request::StreamUpdate {
            position: "pos".into(),
        };
        write_request(&mut client, &request, 3).await.unwrap();
        let (got, id) = read_request(&mut server, MAX_MESSAGE_SIZE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, request);
        assert_eq!(id, 3);
    }

    #[tokio::test]
    async fn test_eof_between_frames_is_none() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        assert!(read_frame(&mut server, 16).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&100u32.to_be_bytes()).await.unwrap();
        let err = read_frame(&mut server, 16).await.unwrap_err();
        assert!(matches!(err, Error::ResponseTooLarge(100, 16)));
    }

    #[tokio::test]
    async fn test_truncated_length_prefix_is_io_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[0, 0]).await.unwrap();
        drop(client);
        let err = read_frame(&mut server, 16).await.unwrap_err();
        assert!(matches!(err, Error::IoError(_)));
    }

    #[tokio::test]
    async fn test_length_prefix_split_across_writes() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let reader = tokio::spawn(async move { read_frame(&mut server, 16).await });
        client.write_all(&[0, 0]).await.unwrap();
        tokio::task::yield_now().await;
        client.write_all(&[0, 2, 7, 9]).await.unwrap();
        let frame = reader.await.unwrap().unwrap();
        assert_eq!(frame, Some(vec![7, 9]));
    }

    #[tokio::test]
    async fn test_truncated_body_is_io_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&8u32.to_be_bytes()).await.unwrap();
        client.write_all(&[1, 2]).await.unwrap();
        drop(client);
        let err = read_frame(&mut server, 16).await.unwrap_err();
        assert!(matches!(err, Error::IoError(_)));
    }
}
