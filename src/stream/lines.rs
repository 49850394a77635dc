//! Adapters from chunked HTTP bodies to chunk sources.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use futures::stream::{Stream, StreamExt};

use super::{ChunkStream, StreamChunk};

/// Splits a byte stream into newline-terminated lines.
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return every line completed by them (without the
    /// trailing `\n` / `\r\n`).
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Return the unterminated remainder, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

struct LineState<B, P> {
    body: Pin<Box<B>>,
    lines: LineBuffer,
    parse: P,
    pending: VecDeque<StreamChunk<String>>,
    exhausted: bool,
    terminated: bool,
}

/// Turn a line-oriented response body (NDJSON, server-sent events) into a
/// text chunk source.
///
/// `parse` maps each complete line to zero or more chunks. The source ends
/// after the first `Done` or `Error` chunk; a transport error while reading
/// the body becomes an `Error` chunk. An unterminated final line is parsed
/// when the body closes.
pub fn line_chunks<B, D, E, P>(body: B, parse: P) -> ChunkStream<String>
where
    B: Stream<Item = Result<D, E>> + Send + 'static,
    D: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
    P: FnMut(&str) -> Vec<StreamChunk<String>> + Send + 'static,
{
    let state = LineState {
        body: Box::pin(body),
        lines: LineBuffer::new(),
        parse,
        pending: VecDeque::new(),
        exhausted: false,
        terminated: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if st.terminated {
                return None;
            }

            if let Some(chunk) = st.pending.pop_front() {
                if !matches!(chunk, StreamChunk::Content(_)) {
                    st.terminated = true;
                    st.pending.clear();
                }
                return Some((chunk, st));
            }

            if st.exhausted {
                return None;
            }

            match st.body.next().await {
                Some(Ok(bytes)) => {
                    for line in st.lines.push(bytes.as_ref()) {
                        let chunks = (st.parse)(&line);
                        st.pending.extend(chunks);
                    }
                }
                Some(Err(e)) => {
                    st.terminated = true;
                    return Some((StreamChunk::Error(e.to_string()), st));
                }
                None => {
                    st.exhausted = true;
                    if let Some(line) = st.lines.finish() {
                        let chunks = (st.parse)(&line);
                        st.pending.extend(chunks);
                    }
                }
            }
        }
    })
    .boxed()
}

/// Turn a binary response body into a byte chunk source. The source ends
/// with the body; a transport error becomes an `Error` chunk.
pub fn byte_chunks<B, D, E>(body: B) -> ChunkStream<Vec<u8>>
where
    B: Stream<Item = Result<D, E>> + Send + 'static,
    D: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    body.map(|item| match item {
        Ok(bytes) => StreamChunk::Content(bytes.as_ref().to_vec()),
        Err(e) => StreamChunk::Error(e.to_string()),
    })
    .boxed()
}
