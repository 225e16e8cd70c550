use std::io;
use std::mem;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use pin_project::pin_project;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

use super::{Delivered, FileDescriptor, ObjectStore, UpstreamDelivery};
use crate::error::UpstreamError;
use crate::range::ByteRange;

const IO_BUFFER_SIZE: usize = 64 * 1024;

/// [`ObjectStore`] over a local directory. File ids are paths relative to
/// the root.
///
/// With `honor_ranges` off it answers every open with the whole file, the
/// way some remote stores silently do.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
    honor_ranges: bool,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryStore { root: root.into(), honor_ranges: true }
    }

    pub fn honor_ranges(mut self, honor: bool) -> Self {
        self.honor_ranges = honor;
        self
    }

    fn path_for(&self, file_id: &str) -> Result<PathBuf, UpstreamError> {
        let relative = Path::new(file_id);
        let plain = relative.components().all(|c| matches!(c, Component::Normal(_)));
        if file_id.is_empty() || !plain {
            return Err(UpstreamError::NotFound(file_id.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

fn map_io_error(file_id: &str, err: io::Error) -> UpstreamError {
    match err.kind() {
        io::ErrorKind::NotFound => UpstreamError::NotFound(file_id.to_string()),
        io::ErrorKind::PermissionDenied => UpstreamError::Unauthorized(file_id.to_string()),
        _ => UpstreamError::Transient(err.to_string()),
    }
}

#[async_trait]
impl ObjectStore for DirectoryStore {
    async fn metadata(&self, file_id: &str) -> Result<FileDescriptor, UpstreamError> {
        let path = self.path_for(file_id)?;
        let meta = tokio::fs::metadata(&path).await.map_err(|e| map_io_error(file_id, e))?;
        if !meta.is_file() {
            return Err(UpstreamError::NotFound(file_id.to_string()));
        }

        Ok(FileDescriptor {
            id: file_id.to_string(),
            name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
            mime_type: mime_guess::from_path(&path).first_or_octet_stream().to_string(),
            size: meta.len(),
        })
    }

    async fn open(&self, file_id: &str, range: Option<ByteRange>) -> Result<UpstreamDelivery, UpstreamError> {
        let path = self.path_for(file_id)?;
        let file = File::open(&path).await.map_err(|e| map_io_error(file_id, e))?;
        let size = file.metadata().await.map_err(|e| map_io_error(file_id, e))?.len();

        match range.filter(|r| self.honor_ranges && r.end < size) {
            Some(range) => Ok(UpstreamDelivery {
                delivered: Delivered::Partial { content_range: range.content_range(size) },
                content_length: Some(range.len()),
                body: FileStream::new(file, range.start, range.len()).boxed(),
            }),
            None => Ok(UpstreamDelivery {
                delivered: Delivered::Full,
                content_length: Some(size),
                body: FileStream::new(file, 0, size).boxed(),
            }),
        }
    }
}

/// Reads `length` bytes starting at `start` from a seekable reader.
#[pin_project]
pub struct FileStream<R> {
    state: StreamState,
    length: u64,
    #[pin]
    reader: R,
}

impl<R: AsyncRead + AsyncSeek> FileStream<R> {
    pub fn new(reader: R, start: u64, length: u64) -> Self {
        FileStream {
            state: StreamState::Seek { start },
            length,
            reader,
        }
    }
}

#[derive(Debug)]
enum StreamState {
    Seek { start: u64 },
    Seeking { remaining: u64 },
    Reading { buffer: BytesMut, remaining: u64 },
}

impl<R: AsyncRead + AsyncSeek> Stream for FileStream<R> {
    type Item = io::Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>
    ) -> Poll<Option<io::Result<Bytes>>> {
        let mut this = self.project();

        if let StreamState::Seek { start } = *this.state {
            match this.reader.as_mut().start_seek(io::SeekFrom::Start(start)) {
                Err(e) => { return Poll::Ready(Some(Err(e))); }
                Ok(()) => {
                    let remaining = *this.length;
                    *this.state = StreamState::Seeking { remaining };
                }
            }
        }

        if let StreamState::Seeking { remaining } = *this.state {
            match this.reader.as_mut().poll_complete(cx) {
                Poll::Pending => { return Poll::Pending; }
                Poll::Ready(Err(e)) => { return Poll::Ready(Some(Err(e))); }
                Poll::Ready(Ok(_)) => {
                    let buffer = allocate_buffer();
                    *this.state = StreamState::Reading { buffer, remaining };
                }
            }
        }

        let StreamState::Reading { buffer, remaining } = this.state else {
            return Poll::Ready(None);
        };

        if *remaining == 0 {
            return Poll::Ready(None);
        }

        // read at most the smaller of the buffer size and what is left
        let nbytes = std::cmp::min(IO_BUFFER_SIZE, usize::try_from(*remaining).unwrap_or(usize::MAX));
        buffer.resize(nbytes, 0);
        let mut read_buf = ReadBuf::new(&mut buffer[..]);

        match this.reader.as_mut().poll_read(cx, &mut read_buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Some(Err(e))),
            Poll::Ready(Ok(())) => match read_buf.filled().len() {
                0 => Poll::Ready(None),
                n => {
                    buffer.truncate(n);
                    let chunk = mem::replace(buffer, allocate_buffer());
                    *remaining -= n as u64;
                    Poll::Ready(Some(Ok(chunk.freeze())))
                }
            },
        }
    }
}

fn allocate_buffer() -> BytesMut {
    BytesMut::with_capacity(IO_BUFFER_SIZE)
}
