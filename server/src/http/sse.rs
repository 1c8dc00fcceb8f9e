use std::convert::Infallible;
use std::sync::Arc;

use axum::response::sse::{Event, Sse};
use futures_util::stream::{self, Stream, StreamExt};
use tokio::sync::{broadcast, oneshot};
use tokio_stream::wrappers::BroadcastStream;

use api::scan::{IndexerProgress, ReindexEvent, ScanErrorData};

use crate::indexer::msg::{IndexerMsg, ScanOutcome};

use super::HttpState;

fn sse_event(event: &ReindexEvent) -> Result<Event, Infallible> {
    Ok(Event::default().data(serde_json::to_string(event).unwrap_or_default()))
}

/// `GET|POST /api/reindex?stream=1` -- runs the scan and relays the
/// Indexer's progress broadcast as SSE frames; new here since the teacher
/// has no streaming-progress precedent, but the broadcast/fan-out shape is
/// the same primitive family the teacher reaches for elsewhere
/// (`dashmap`/`tokio::sync`)
pub async fn reindex_stream(
    state: Arc<HttpState>,
    force: bool,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (progress_tx, progress_rx) = broadcast::channel::<IndexerProgress>(64);
    let (done_tx, done_rx) = oneshot::channel();

    let indexer_tx = state.indexer_tx.clone();
    tokio::spawn(async move {
        let (resp_tx, resp_rx) = oneshot::channel();
        let sent = indexer_tx
            .send(
                IndexerMsg::UpdateCheck {
                    force,
                    progress: Some(progress_tx),
                    resp: resp_tx,
                }
                .into(),
            )
            .await;

        let outcome = match sent {
            Ok(()) => resp_rx
                .await
                .unwrap_or_else(|_| Err(anyhow::anyhow!("indexer service dropped the response channel"))),
            Err(_) => Err(anyhow::anyhow!("indexer service is not running")),
        };

        let _ = done_tx.send(outcome);
    });

    let progress_stream = BroadcastStream::new(progress_rx)
        .filter_map(|item| async move { item.ok() })
        .map(|progress| sse_event(&ReindexEvent::Progress { data: progress }));

    let final_stream = stream::once(async move {
        let event = match done_rx.await {
            Ok(Ok(ScanOutcome::Completed(report))) => ReindexEvent::Complete { data: report },
            Ok(Ok(ScanOutcome::AlreadyRunning)) => ReindexEvent::Error {
                data: ScanErrorData {
                    error: "scan already running".to_owned(),
                },
            },
            Ok(Err(err)) => ReindexEvent::Error {
                data: ScanErrorData { error: err.to_string() },
            },
            Err(_) => ReindexEvent::Error {
                data: ScanErrorData {
                    error: "indexer task was dropped before completion".to_owned(),
                },
            },
        };
        sse_event(&event)
    });

    Sse::new(progress_stream.chain(final_stream))
}
