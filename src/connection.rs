use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use uuid::Uuid;

use crate::codec::{self, NulCodec};
use crate::command::Command;

/// One client session: a duplex byte stream read and written in null-terminated frames.
///
/// Data is read from the stream into the codec's buffer; when a terminator shows up, the frame is
/// removed from the buffer and anything after it waits for the next `read_frame`.
pub struct Connection<T = TcpStream> {
    pub id: Uuid,
    framed: Framed<T, NulCodec>,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: T) -> Connection<T> {
        Connection::with_codec(stream, NulCodec::new())
    }

    pub fn with_codec(stream: T, codec: NulCodec) -> Connection<T> {
        Connection {
            id: Uuid::new_v4(),
            framed: Framed::new(stream, codec),
        }
    }

    /// Waits for the next complete frame. `None` means the peer closed the stream; trailing bytes
    /// without a terminator are dropped.
    pub async fn read_frame(&mut self) -> Result<Option<Command>, codec::Error> {
        let frame = self.framed.next().await.transpose()?;
        Ok(frame.map(Command::from))
    }

    /// Writes `text` followed by the terminator and flushes, retrying partial writes until the
    /// whole frame is out or the stream fails.
    pub async fn write_frame(&mut self, text: impl Into<String>) -> Result<(), codec::Error> {
        self.framed.send(text.into()).await
    }
}
