//! # Dynamic Protobuf Codec
//!
//! This module implements `tonic::codec::Codec` over [`DynamicMessage`], enabling
//! `tonic` to transport messages whose schema is only known at runtime.
//!
//! Unlike the prost codec, which works with compile-time generated types, this
//! codec is driven by a pair of [`MessageDescriptor`]s resolved from the
//! descriptor pool, so a single generic server can marshal any method's input
//! and output without generated code.
use prost::Message;
use prost_reflect::{DynamicMessage, MessageDescriptor};
use tonic::{
    Status,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
};

/// A codec bridging [`DynamicMessage`] values and the Protobuf binary format.
///
/// `encode` describes outbound messages and `decode` inbound ones, so the same
/// type serves both ends of a call: a server hands it `(output, input)`, a
/// client `(input, output)`.
pub struct DynamicCodec {
    encode: MessageDescriptor,
    decode: MessageDescriptor,
}

impl DynamicCodec {
    pub fn new(encode: MessageDescriptor, decode: MessageDescriptor) -> Self {
        Self { encode, decode }
    }
}

impl Codec for DynamicCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;

    type Encoder = DynamicEncoder;
    type Decoder = DynamicDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        DynamicEncoder(self.encode.clone())
    }

    fn decoder(&mut self) -> Self::Decoder {
        DynamicDecoder(self.decode.clone())
    }
}

/// Writes a [`DynamicMessage`] into the gRPC byte buffer.
pub struct DynamicEncoder(MessageDescriptor);

impl Encoder for DynamicEncoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        item.encode_raw(dst);
        Ok(())
    }
}

/// Reads Protobuf bytes from the wire into a [`DynamicMessage`].
pub struct DynamicDecoder(MessageDescriptor);

impl Decoder for DynamicDecoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let mut message = DynamicMessage::new(self.0.clone());
        message.merge(src).map_err(|err| {
            Status::invalid_argument(format!(
                "failed to decode message as '{}': {err}",
                self.0.full_name()
            ))
        })?;
        Ok(Some(message))
    }
}
