//! `tokio_util::codec` adapter for the event frame format.
//!
//! Same wire format and limits as the blocking reader/writer, for callers
//! that drive sockets from an async runtime with `Framed`.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

/// Frame codec for `FramedRead`/`FramedWrite`.
#[derive(Debug, Clone, Default)]
pub struct EventCodec {
    config: FrameConfig,
}

impl EventCodec {
    /// Create a codec with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }

    /// Current codec configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Decoder for EventCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        decode_frame(src, self.config.version, self.config.max_payload_size)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::UnexpectedEof {
                buffered: src.len(),
            }),
        }
    }
}

impl Encoder<Frame> for EventCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        if item.payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: item.payload.len(),
                max: self.config.max_payload_size,
            });
        }
        encode_frame(self.config.version, &item.event, &item.payload, dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::codec::PROTOCOL_VERSION;

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut sink = FramedWrite::new(client, EventCodec::new());
        let mut stream = FramedRead::new(server, EventCodec::new());

        let writer = tokio::spawn(async move {
            sink.send(Frame::new("echo", &b"first"[..])).await.unwrap();
            sink.send(Frame::new("bulk", vec![7u8; 1024])).await.unwrap();
        });

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, Frame::new("echo", &b"first"[..]));
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.payload.len(), 1024);

        writer.await.unwrap();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn truncated_frame_is_unexpected_eof() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut stream = FramedRead::new(server, EventCodec::new());

        client.write_all(&[PROTOCOL_VERSION, 4, b'e', b'c']).await.unwrap();
        drop(client);

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, FrameError::UnexpectedEof { buffered: 4 }));
    }

    #[tokio::test]
    async fn version_mismatch_surfaces() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut stream = FramedRead::new(server, EventCodec::new());

        client.write_all(&[PROTOCOL_VERSION + 1]).await.unwrap();

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, FrameError::VersionMismatch { .. }));
    }

    #[test]
    fn encoder_enforces_payload_limit() {
        let mut codec = EventCodec::with_config(FrameConfig {
            max_payload_size: 2,
            ..FrameConfig::default()
        });
        let mut dst = BytesMut::new();
        let err = codec
            .encode(Frame::new("big", &b"abc"[..]), &mut dst)
            .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(dst.is_empty());
    }
}
