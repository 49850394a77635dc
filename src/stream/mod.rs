//! Streamed-response aggregation.
//!
//! Every incremental response in stellar (chat text, synthesized audio,
//! captured microphone samples) arrives as an ordered sequence of
//! [`StreamChunk`]s. [`aggregate`] consumes such a sequence exactly once,
//! forwards each content fragment as it arrives and folds the fragments into
//! a single [`AggregationResult`].

mod lines;

pub use lines::{byte_chunks, line_chunks, LineBuffer};

use futures::stream::{BoxStream, Stream, StreamExt};
use tokio::sync::mpsc;

use crate::{Error, Result};

/// One fragment of an incrementally delivered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk<T> {
    /// Payload to append and forward.
    Content(T),
    /// The source failed; aggregation stops here.
    Error(String),
    /// Explicit end-of-stream marker.
    Done,
}

/// An owned, single-pass chunk source.
pub type ChunkStream<T> = BoxStream<'static, StreamChunk<T>>;

/// Terminal state of one aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationResult<A> {
    Completed(A),
    Failed(String),
}

impl<A> AggregationResult<A> {
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Convert into a `Result`, mapping failures to [`Error::Source`].
    ///
    /// # Errors
    ///
    /// Returns the failure detail as a source error.
    pub fn into_result(self) -> Result<A> {
        match self {
            Self::Completed(value) => Ok(value),
            Self::Failed(detail) => Err(Error::Source(detail)),
        }
    }
}

/// A payload type that can be folded into an accumulator.
pub trait Fragment {
    type Output: Default;

    fn append_to(&self, out: &mut Self::Output);
}

impl Fragment for String {
    type Output = String;

    fn append_to(&self, out: &mut String) {
        out.push_str(self);
    }
}

impl<T: Clone> Fragment for Vec<T> {
    type Output = Vec<T>;

    fn append_to(&self, out: &mut Vec<T>) {
        out.extend_from_slice(self);
    }
}

/// Consume `source` to completion, invoking `forward` for every content
/// payload in arrival order.
///
/// An error chunk discards the accumulator and stops consumption: no chunk
/// after it is forwarded. A `Done` marker or the end of the source completes
/// the aggregation with everything accumulated so far (possibly empty).
pub async fn aggregate<T, S, F>(mut source: S, mut forward: F) -> AggregationResult<T::Output>
where
    T: Fragment,
    S: Stream<Item = StreamChunk<T>> + Unpin,
    F: FnMut(&T),
{
    let mut acc = T::Output::default();
    let mut fragments = 0usize;

    while let Some(chunk) = source.next().await {
        match chunk {
            StreamChunk::Content(payload) => {
                payload.append_to(&mut acc);
                fragments += 1;
                forward(&payload);
            }
            StreamChunk::Error(detail) => {
                tracing::debug!(fragments, "aggregation failed: {detail}");
                return AggregationResult::Failed(detail);
            }
            StreamChunk::Done => break,
        }
    }

    tracing::debug!(fragments, "aggregation completed");
    AggregationResult::Completed(acc)
}

/// Producer half of a push-style chunk source.
///
/// Sending never blocks, so it can be used from audio callbacks and other
/// non-async contexts. Sends after the consumer has gone away are dropped.
pub struct ChunkSender<T> {
    tx: mpsc::UnboundedSender<StreamChunk<T>>,
}

impl<T> Clone for ChunkSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> ChunkSender<T> {
    /// Returns false once the consumer is gone.
    pub fn content(&self, payload: T) -> bool {
        self.tx.send(StreamChunk::Content(payload)).is_ok()
    }

    pub fn error(&self, detail: impl Into<String>) -> bool {
        self.tx.send(StreamChunk::Error(detail.into())).is_ok()
    }

    pub fn done(&self) -> bool {
        self.tx.send(StreamChunk::Done).is_ok()
    }
}

/// Create a push-style chunk source backed by a channel.
///
/// The consumer awaits each chunk; the source ends when every sender has
/// been dropped.
#[must_use]
pub fn channel<T: Send + 'static>() -> (ChunkSender<T>, ChunkStream<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let source = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    })
    .boxed();
    (ChunkSender { tx }, source)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::stream;

    use super::*;

    fn text(chunks: &[&str]) -> Vec<StreamChunk<String>> {
        chunks
            .iter()
            .map(|c| StreamChunk::Content((*c).to_string()))
            .collect()
    }

    #[tokio::test]
    async fn concatenates_content_until_done() {
        let mut chunks = text(&["Hel", "lo, ", "world!"]);
        chunks.push(StreamChunk::Done);

        let mut seen = Vec::new();
        let result = aggregate(stream::iter(chunks), |c: &String| seen.push(c.clone())).await;

        assert_eq!(result, AggregationResult::Completed("Hello, world!".to_string()));
        assert_eq!(seen, vec!["Hel", "lo, ", "world!"]);
    }

    #[tokio::test]
    async fn error_discards_accumulator_and_stops_forwarding() {
        let chunks = vec![
            StreamChunk::Content("Hel".to_string()),
            StreamChunk::Error("rate limited".to_string()),
            StreamChunk::Content("lo".to_string()),
        ];

        let mut seen = Vec::new();
        let result = aggregate(stream::iter(chunks), |c: &String| seen.push(c.clone())).await;

        assert_eq!(result, AggregationResult::Failed("rate limited".to_string()));
        assert_eq!(seen, vec!["Hel"]);
    }

    #[tokio::test]
    async fn empty_source_completes_with_empty_text() {
        let mut calls = 0;
        let result = aggregate(stream::iter(Vec::<StreamChunk<String>>::new()), |_: &String| {
            calls += 1;
        })
        .await;

        assert_eq!(result, AggregationResult::Completed(String::new()));
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn exhaustion_without_marker_completes() {
        let result = aggregate(stream::iter(text(&["a", "b"])), |_: &String| {}).await;
        assert_eq!(result, AggregationResult::Completed("ab".to_string()));
    }

    #[tokio::test]
    async fn chunks_after_done_are_ignored() {
        let chunks = vec![
            StreamChunk::Content("kept".to_string()),
            StreamChunk::Done,
            StreamChunk::Content("ignored".to_string()),
            StreamChunk::Error("ignored too".to_string()),
        ];
        let result = aggregate(stream::iter(chunks), |_: &String| {}).await;
        assert_eq!(result, AggregationResult::Completed("kept".to_string()));
    }

    #[tokio::test]
    async fn aggregates_binary_fragments() {
        let chunks = vec![
            StreamChunk::Content(vec![1u8, 2]),
            StreamChunk::Content(vec![]),
            StreamChunk::Content(vec![3u8]),
        ];
        let mut sizes = Vec::new();
        let result = aggregate(stream::iter(chunks), |c: &Vec<u8>| sizes.push(c.len())).await;

        assert_eq!(result, AggregationResult::Completed(vec![1, 2, 3]));
        assert_eq!(sizes, vec![2, 0, 1]);
    }

    #[tokio::test]
    async fn forwarding_order_follows_arrival_under_uneven_timing() {
        let (tx, source) = channel::<String>();
        let delays = [7u64, 0, 3, 1, 5, 0, 2];

        tokio::spawn(async move {
            for (i, delay) in delays.iter().enumerate() {
                tokio::time::sleep(Duration::from_millis(*delay)).await;
                tx.content(format!("{i},"));
            }
            tx.done();
        });

        let mut seen = Vec::new();
        let result = aggregate(source, |c: &String| seen.push(c.clone())).await;

        let expected: Vec<String> = (0..delays.len()).map(|i| format!("{i},")).collect();
        assert_eq!(seen, expected);
        assert_eq!(result, AggregationResult::Completed(expected.concat()));
    }

    #[tokio::test]
    async fn channel_source_ends_when_senders_drop() {
        let (tx, source) = channel::<Vec<u8>>();
        tx.content(vec![9]);
        drop(tx);

        let result = aggregate(source, |_: &Vec<u8>| {}).await;
        assert_eq!(result, AggregationResult::Completed(vec![9]));
    }

    #[test]
    fn failed_result_maps_to_source_error() {
        let err = AggregationResult::<String>::Failed("boom".into())
            .into_result()
            .unwrap_err();
        assert!(matches!(err, Error::Source(detail) if detail == "boom"));
    }
}
