use std::future::Future;

use futures::{FutureExt, Stream, StreamExt};

/// Wait for one item, let `window` elapse, then take everything else that is
/// already available. `None` once the stream has ended.
///
/// Consumers apply the returned batch in a single update, so a burst of
/// events arriving within one window produces one re-render.
pub async fn next_batch<S, W>(stream: &mut S, window: W) -> Option<Vec<S::Item>>
where
    S: Stream + Unpin,
    W: Future<Output = ()>,
{
    let first = stream.next().await?;
    let mut batch = vec![first];

    window.await;

    while let Some(Some(item)) = stream.next().now_or_never() {
        batch.push(item);
    }
    Some(batch)
}
