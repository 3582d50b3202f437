//! Artificial stream segmentation for single-shot pipelines.
//!
//! When the generation pipeline can only produce one complete answer, the
//! gateway re-segments it into word chunks so streaming clients still see
//! incremental output. Every non-final chunk carries a trailing space, so
//! concatenating the chunks in order reproduces the whitespace-normalized
//! answer with no gaps and no duplication.

use futures_util::stream::{self, Stream};
use std::time::Duration;

/// Split a complete answer into word-group chunks. `group_size` words per
/// chunk, minimum one.
pub fn segment_words(answer: &str, group_size: usize) -> Vec<String> {
    let group_size = group_size.max(1);
    let words: Vec<&str> = answer.split_whitespace().collect();

    let mut chunks = Vec::with_capacity(words.len().div_ceil(group_size));
    for (i, group) in words.chunks(group_size).enumerate() {
        let mut chunk = group.join(" ");
        let is_last = (i + 1) * group_size >= words.len();
        if !is_last {
            chunk.push(' ');
        }
        chunks.push(chunk);
    }
    chunks
}

/// Wrap pre-segmented chunks in a stream with a fixed inter-chunk delay.
///
/// The delay emulates live token generation and is purely cosmetic; zero
/// disables pacing entirely without changing the emitted content.
pub fn paced_stream(
    chunks: Vec<String>,
    delay: Duration,
) -> impl Stream<Item = String> + Send {
    stream::unfold(chunks.into_iter(), move |mut remaining| async move {
        let chunk = remaining.next()?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Some((chunk, remaining))
    })
}
