//! Protocol module containing the event types and the JSON frame codec.

pub mod codec;
pub mod events;

pub use codec::{
    decode_client_frame, decode_server_frame, encode_client_frame, encode_server_frame,
    ProtocolError, MAX_FRAME_BYTES,
};
pub use events::*;
