//! Newline-delimited reading over any async reader

use crate::error::Result;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// A stream of raw lines, line terminators stripped
///
/// Lines are returned as bytes so that invalid UTF-8 surfaces as a decode
/// problem of one line instead of a read failure of the whole stream.
pub struct LineStream {
    reader: BufReader<Box<dyn AsyncRead + Send + Unpin>>,
    buf: Vec<u8>,
}

impl LineStream {
    /// Wrap a reader
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            reader: BufReader::new(Box::new(reader)),
            buf: Vec::with_capacity(1024),
        }
    }

    /// Next line, or `None` once the writer closed its end
    ///
    /// A final line without a terminator is still returned.
    pub async fn next_line(&mut self) -> Result<Option<Vec<u8>>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
            return Ok(None);
        }

        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        Ok(Some(std::mem::take(&mut self.buf)))
    }
}

impl std::fmt::Debug for LineStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineStream").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_lines_split_across_reads() {
        let mock = Builder::new()
            .read(b"{\"a\":1}\n{\"b\"")
            .read(b":2}\r\n")
            .read(b"tail")
            .build();
        let mut lines = LineStream::new(mock);

        assert_eq!(lines.next_line().await.unwrap().unwrap(), b"{\"a\":1}");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), b"{\"b\":2}");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), b"tail");
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blank_lines_are_kept() {
        let mock = Builder::new().read(b"\n\nx\n").build();
        let mut lines = LineStream::new(mock);

        assert_eq!(lines.next_line().await.unwrap().unwrap(), b"");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), b"");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), b"x");
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_error_propagates() {
        let mock = Builder::new()
            .read(b"ok\n")
            .read_error(std::io::Error::other("pipe gone"))
            .build();
        let mut lines = LineStream::new(mock);

        assert_eq!(lines.next_line().await.unwrap().unwrap(), b"ok");
        assert!(lines.next_line().await.is_err());
    }
}
