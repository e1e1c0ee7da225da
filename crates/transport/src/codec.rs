//! Length-delimited framing shared by the pool and the listener.

use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tokio_util::codec::LengthDelimitedCodec;

/// Largest frame accepted on a ring connection, 16M.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// A TCP stream speaking length-prefixed frames.
pub type FramedStream = Framed<TcpStream, LengthDelimitedCodec>;

/// Build the codec used on both ends of a ring connection.
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

/// Wrap a connected stream with the ring frame codec.
pub fn framed(stream: TcpStream) -> FramedStream {
    Framed::new(stream, frame_codec())
}
