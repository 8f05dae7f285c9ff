//! The subscriber endpoint: `GET /executions/{id}/stream`.
//!
//! One connection walks a small lifecycle. It looks up the execution under
//! the caller's owner id and rejects before writing any frame if that fails.
//! It then sends an `init` snapshot; if the execution is already over, the
//! terminal frame follows immediately and the stream closes. Otherwise it
//! enters a poll loop that re-reads the persisted record, forwards events the
//! snapshot cursor has not covered yet, and closes on the first terminal
//! status it observes.
//!
//! Storage is the only source frames are built from. A registry listener is
//! held for the duration of the loop purely as a wake signal: a publish from
//! the same process short-circuits the poll timer, and the loop then re-reads
//! storage as usual. Forwarding from one source keeps per-execution order
//! intact no matter how wakes and timer ticks interleave. Only elapsed timer
//! ticks count toward the iteration cap, so a chatty publisher cannot burn
//! the wall-clock budget early.

use std::convert::Infallible;

use async_stream::stream;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::Stream;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use crate::execution::ExecutionRecord;
use crate::server::RelayContext;
use crate::server::auth::OwnerId;
use crate::server::sse;

/// Handler for the stream route. Rejections happen here, before the response
/// switches to `text/event-stream`; everything after the status line is
/// frames.
#[instrument(skip(ctx, owner), fields(owner = %owner))]
pub async fn subscribe_execution(
    State(ctx): State<RelayContext>,
    Path(execution_id): Path<String>,
    owner: OwnerId,
) -> Response {
    let record = match ctx.store.fetch(&execution_id, owner.as_str()).await {
        Ok(Some(record)) => record,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(error) => {
            warn!(%error, "execution lookup failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response = Sse::new(frame_stream(ctx, owner, record)).into_response();
    sse::apply_stream_headers(&mut response);
    response
}

/// Frame generator for one connection. Dropping the returned stream (client
/// went away) releases the registry listener and stops all polling; nothing
/// is written after that point.
fn frame_stream(
    ctx: RelayContext,
    owner: OwnerId,
    record: ExecutionRecord,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream! {
        let execution_id = record.id.clone();
        let listener = ctx.registry.register(execution_id.clone());

        yield Ok(sse::init_frame(&record));
        let mut cursor = record.events.len();

        if record.status.is_terminal() {
            debug!(execution_id = %execution_id, status = %record.status, "terminal at connect");
            yield Ok(sse::terminal_frame(&record));
            return;
        }

        let mut iterations: u32 = 0;
        // Once the publisher closes the channel, recv would return
        // immediately forever; fall back to timer-only waits.
        let mut wakes_live = true;

        loop {
            let timer_elapsed = if wakes_live {
                tokio::select! {
                    _ = sleep(ctx.config.poll_interval) => true,
                    received = listener.receiver().recv_async() => {
                        match received {
                            Ok(_) => {
                                // Coalesce a burst into one storage re-read.
                                while listener.receiver().try_recv().is_ok() {}
                            }
                            Err(_) => wakes_live = false,
                        }
                        false
                    }
                }
            } else {
                sleep(ctx.config.poll_interval).await;
                true
            };
            if timer_elapsed {
                iterations += 1;
            }

            let current = match ctx.store.fetch(&execution_id, owner.as_str()).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    warn!(execution_id = %execution_id, "execution missing mid-stream");
                    continue;
                }
                Err(error) => {
                    warn!(
                        execution_id = %execution_id,
                        %error,
                        "poll read failed, retrying next interval"
                    );
                    continue;
                }
            };

            let mut forwarded = false;
            if current.events.len() > cursor {
                for event in &current.events[cursor..] {
                    yield Ok(sse::event_frame(&execution_id, event));
                }
                forwarded = true;
                cursor = current.events.len();
            }

            if current.status.is_terminal() {
                debug!(
                    execution_id = %execution_id,
                    status = %current.status,
                    iterations,
                    "stream finished"
                );
                yield Ok(sse::terminal_frame(&current));
                return;
            }

            if iterations >= ctx.config.max_poll_iterations {
                debug!(execution_id = %execution_id, iterations, "poll budget exhausted");
                yield Ok(sse::timeout_frame());
                return;
            }

            if timer_elapsed && !forwarded {
                yield Ok(sse::heartbeat_frame());
            }
        }
    }
}
