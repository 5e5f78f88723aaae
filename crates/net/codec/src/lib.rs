//! Varint length-prefixed protobuf framing.
//!
//! [`ProtocolCodec`] maps between generated protobuf types and a protocol's
//! own message types, so protocol code sends and receives validated values
//! only. Conversion failures on decode surface as the protocol's error type.

use std::marker::PhantomData;

use asynchronous_codec::{Decoder, Encoder, Framed};
use bytes::BytesMut;
use futures::{AsyncRead, AsyncWrite, TryStreamExt};

/// Codec for a single protobuf message type `Proto`, exposed as `Protocol`.
pub struct ProtocolCodec<Proto, Protocol, E>(
    quick_protobuf_codec::Codec<Proto>,
    PhantomData<(Protocol, E)>,
);

impl<Proto, Protocol, E> ProtocolCodec<Proto, Protocol, E> {
    /// Frames larger than `max_message_size` are rejected in both directions.
    pub fn new(max_message_size: usize) -> Self {
        Self(
            quick_protobuf_codec::Codec::new(max_message_size),
            PhantomData,
        )
    }
}

impl<Proto, Protocol, E> Encoder for ProtocolCodec<Proto, Protocol, E>
where
    Proto: quick_protobuf::MessageWrite,
    Protocol: Into<Proto>,
    quick_protobuf_codec::Error: Into<E>,
    E: From<std::io::Error>,
{
    type Item<'a> = Protocol;
    type Error = E;

    fn encode(&mut self, item: Self::Item<'_>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.0.encode(item.into(), dst).map_err(Into::into)
    }
}

impl<Proto, Protocol, PE, E> Decoder for ProtocolCodec<Proto, Protocol, E>
where
    Proto: for<'a> quick_protobuf::MessageRead<'a>,
    Protocol: TryFrom<Proto, Error = PE>,
    PE: Into<E>,
    quick_protobuf_codec::Error: Into<E>,
    E: From<std::io::Error>,
{
    type Item = Protocol;
    type Error = E;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.0.decode(src).map_err(Into::into)? {
            Some(proto) => Protocol::try_from(proto).map(Some).map_err(Into::into),
            None => Ok(None),
        }
    }
}

/// Read exactly one message. A stream that ends first is an
/// [`std::io::ErrorKind::UnexpectedEof`] error.
pub async fn recv<T, C>(framed: &mut Framed<T, C>) -> Result<C::Item, C::Error>
where
    T: AsyncRead + Unpin,
    C: Decoder + Unpin,
    C::Error: From<std::io::Error>,
{
    framed.try_next().await?.ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "stream closed").into()
    })
}

/// Re-frame the underlying stream with another codec, for protocols whose
/// request and response are different message types.
///
/// Only valid between messages: bytes buffered by the old codec are dropped.
pub fn switch_codec<T, A, B>(framed: Framed<T, A>, codec: B) -> Framed<T, B>
where
    T: AsyncRead + AsyncWrite,
    A: Decoder + Encoder,
    B: Decoder + Encoder,
{
    Framed::new(framed.into_inner(), codec)
}

#[cfg(test)]
mod tests {
    use futures::{SinkExt, io::Cursor};
    use quick_protobuf::{BytesReader, MessageRead, MessageWrite, Writer, WriterBackend};

    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Counter {
        value: u32,
    }

    impl<'a> MessageRead<'a> for Counter {
        fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> quick_protobuf::Result<Self> {
            let mut msg = Self::default();
            while !r.is_eof() {
                match r.next_tag(bytes) {
                    Ok(8) => msg.value = r.read_uint32(bytes)?,
                    Ok(t) => {
                        r.read_unknown(bytes, t)?;
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(msg)
        }
    }

    impl MessageWrite for Counter {
        fn get_size(&self) -> usize {
            1 + quick_protobuf::sizeofs::sizeof_varint(u64::from(self.value))
        }

        fn write_message<W: WriterBackend>(&self, w: &mut Writer<W>) -> quick_protobuf::Result<()> {
            w.write_with_tag(8, |w| w.write_uint32(self.value))
        }
    }

    /// Protocol-side type that refuses odd values.
    #[derive(Debug, PartialEq)]
    struct Even(u32);

    #[derive(Debug)]
    enum TestError {
        Odd(u32),
        Codec,
        Io(std::io::ErrorKind),
    }

    impl From<std::io::Error> for TestError {
        fn from(e: std::io::Error) -> Self {
            Self::Io(e.kind())
        }
    }

    impl From<quick_protobuf_codec::Error> for TestError {
        fn from(_: quick_protobuf_codec::Error) -> Self {
            Self::Codec
        }
    }

    impl TryFrom<Counter> for Even {
        type Error = TestError;

        fn try_from(value: Counter) -> Result<Self, Self::Error> {
            if value.value % 2 == 0 {
                Ok(Self(value.value))
            } else {
                Err(TestError::Odd(value.value))
            }
        }
    }

    impl From<Even> for Counter {
        fn from(value: Even) -> Self {
            Self { value: value.0 }
        }
    }

    type EvenCodec = ProtocolCodec<Counter, Even, TestError>;

    #[test]
    fn test_decode_validates() {
        let mut buf = BytesMut::new();
        let mut proto: quick_protobuf_codec::Codec<Counter> = quick_protobuf_codec::Codec::new(64);
        proto.encode(Counter { value: 3 }, &mut buf).unwrap();

        let mut codec = EvenCodec::new(64);
        assert!(matches!(codec.decode(&mut buf), Err(TestError::Odd(3))));
    }

    #[test]
    fn test_partial_frame_waits() {
        let mut buf = BytesMut::new();
        EvenCodec::new(64).encode(Even(300), &mut buf).unwrap();
        let mut head = buf.split_to(1);

        let mut codec = EvenCodec::new(64);
        assert!(codec.decode(&mut head).unwrap().is_none());
        head.unsplit(buf);
        assert_eq!(codec.decode(&mut head).unwrap(), Some(Even(300)));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buf = BytesMut::new();
        EvenCodec::new(64).encode(Even(u32::MAX - 1), &mut buf).unwrap();

        let mut codec = EvenCodec::new(2);
        assert!(matches!(codec.decode(&mut buf), Err(TestError::Codec)));
    }

    #[tokio::test]
    async fn test_recv_reports_eof() {
        let mut framed = Framed::new(Cursor::new(Vec::new()), EvenCodec::new(64));
        assert!(matches!(
            recv(&mut framed).await,
            Err(TestError::Io(std::io::ErrorKind::UnexpectedEof))
        ));
    }

    #[tokio::test]
    async fn test_recv_one_message() {
        let mut buf = BytesMut::new();
        EvenCodec::new(64).encode(Even(42), &mut buf).unwrap();

        let framed = Framed::new(Cursor::new(buf.to_vec()), EvenCodec::new(64));
        let mut framed = switch_codec(framed, EvenCodec::new(64));
        assert_eq!(recv(&mut framed).await.unwrap(), Even(42));
    }

    #[tokio::test]
    async fn test_switch_codec_between_messages() {
        let mut framed = Framed::new(Cursor::new(Vec::new()), EvenCodec::new(64));
        framed.send(Even(2)).await.unwrap();

        let raw: quick_protobuf_codec::Codec<Counter> = quick_protobuf_codec::Codec::new(64);
        let mut framed = switch_codec(framed, raw);
        framed.send(Counter { value: 3 }).await.unwrap();

        let mut written = BytesMut::from(framed.into_inner().into_inner().as_slice());
        let mut codec = EvenCodec::new(64);
        assert_eq!(codec.decode(&mut written).unwrap(), Some(Even(2)));
        assert!(matches!(codec.decode(&mut written), Err(TestError::Odd(3))));
    }
}
