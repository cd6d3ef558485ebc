//! Request dispatch and the per-request worker.
//!
//! The dispatch loop drains the request queue. Without a request delay it
//! hands each request to a new worker once a permit from a semaphore sized
//! `max_concurrent_requests` is available, which blocks the loop while the
//! limit is reached. With a delay it runs one request at a time and sleeps
//! between them.
//!
//! A worker performs exactly one exchange and then either retries through the
//! queue, follows a redirect through the queue, reports a terminal error or
//! hands the response to the response callbacks.

use super::engine::EngineShared;
use crate::context::Context;
use crate::error::CrawlError;
use crate::request::Request;
use crate::response::Response;
use crate::state::ActivityGuard;
use crate::transport::{WireRequest, WireResponse};
use crate::utils::url_join;
use kanal::AsyncReceiver;
use log::{debug, error, trace, warn};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

const REDIRECT_STATUSES: [u16; 4] = [301, 302, 303, 307];

pub(crate) fn spawn_request_dispatcher(
    shared: Arc<EngineShared>,
    req_rx: AsyncReceiver<Request>,
) -> tokio::task::JoinHandle<()> {
    let max_concurrent_requests = shared.settings.max_concurrent_requests;
    let request_delay = shared.settings.request_delay;
    let semaphore = Arc::new(Semaphore::new(max_concurrent_requests));

    tokio::spawn(async move {
        trace!(
            "Request dispatcher started with max_concurrent_requests: {}, request_delay: {:?}",
            max_concurrent_requests,
            request_delay
        );
        let mut tasks = JoinSet::new();

        loop {
            while let Some(res) = tasks.try_join_next() {
                if let Err(e) = res {
                    error!("A request task failed: {:?}", e);
                }
            }
            let request = match req_rx.recv().await {
                Ok(request) => request,
                Err(_) => {
                    trace!("Request queue closed, exiting request dispatcher");
                    break;
                }
            };
            trace!("Dequeued request for URL: {}", request.url);

            if !request_delay.is_zero() {
                let guard = shared.state.begin_request();
                let worker = tokio::spawn(process_request(Arc::clone(&shared), request, guard));
                if let Err(e) = worker.await {
                    error!("A request task failed: {:?}", e);
                }
                tokio::time::sleep(request_delay).await;
                continue;
            }

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(p) => {
                    trace!("Acquired request permit");
                    p
                }
                Err(_) => {
                    warn!("Semaphore closed, shutting down request dispatcher.");
                    break;
                }
            };
            let guard = shared.state.begin_request();
            let shared_clone = Arc::clone(&shared);
            tasks.spawn(async move {
                process_request(shared_clone, request, guard).await;
                drop(permit);
            });
        }

        trace!("Waiting for active request tasks to complete");
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!("A request task failed: {:?}", e);
            }
        }
        trace!("Request dispatcher finished");
    })
}

async fn process_request(shared: Arc<EngineShared>, request: Request, _guard: ActivityGuard) {
    let ctx = match &request.context {
        Some(ctx) => ctx.clone(),
        None => Context::root(Arc::clone(&shared)),
    };

    let (wire, options) = match WireRequest::build(&request, &shared.settings) {
        Ok(built) => built,
        Err(e) => {
            shared.stats.increment_requests_failed();
            shared.report_error(&request, &e, &ctx);
            return;
        }
    };

    trace!("Sending {} {}", request.method, request.url);
    shared.stats.increment_requests_sent();
    let timeout = options.timeout;
    let outcome = match tokio::time::timeout(timeout, shared.transport.exchange(wire, &options)).await {
        Ok(result) => result,
        Err(_) => Err(CrawlError::Timeout {
            url: request.url.clone(),
            timeout,
        }),
    };

    match outcome {
        Ok(wire) => handle_response(&shared, request, wire, ctx),
        Err(e) if e.is_retryable() && request.retry_times < shared.settings.max_retry_times => {
            let mut request = request;
            request.retry_times += 1;
            debug!(
                "Retrying {} ({}/{}) after: {}",
                request.url, request.retry_times, shared.settings.max_retry_times, e
            );
            shared.stats.increment_requests_retried();
            ctx.retry(request);
        }
        Err(e) => {
            shared.stats.increment_requests_failed();
            shared.report_error(&request, &e, &ctx);
        }
    }
}

fn handle_response(shared: &Arc<EngineShared>, request: Request, wire: WireResponse, mut ctx: Context) {
    shared.stats.record_response(wire.status, wire.body.len());
    let location = if REDIRECT_STATUSES.contains(&wire.status) {
        wire.headers.get("Location").map(str::to_string)
    } else {
        None
    };
    let sent = Arc::new(request.detached());

    if let Some(location) = location {
        let response = Arc::new(Response::from_wire(
            wire,
            Arc::clone(&sent),
            Arc::clone(&shared.cache),
            false,
        ));
        follow_redirect(shared, &request, response, &location, &ctx);
        return;
    }

    let response = Arc::new(Response::from_wire(
        wire,
        Arc::clone(&sent),
        Arc::clone(&shared.cache),
        shared.settings.auto_parse_html,
    ));
    ctx.observe(sent, Arc::clone(&response));
    shared.stats.increment_requests_succeeded();

    if let Some(callback) = &request.callback {
        callback(&response, &ctx);
    }
    if let Some(callback) = &shared.hooks.on_response {
        callback(&response, &ctx);
    }
}

fn follow_redirect(
    shared: &Arc<EngineShared>,
    request: &Request,
    response: Arc<Response>,
    location: &str,
    ctx: &Context,
) {
    let target = match url_join(&request.url, location) {
        Ok(target) => target,
        Err(e) => {
            shared.stats.increment_requests_failed();
            let err = CrawlError::InvalidRedirect {
                url: request.url.clone(),
                location: location.to_string(),
                reason: e.to_string(),
            };
            shared.report_error(request, &err, ctx);
            return;
        }
    };

    let next = request.redirected(target, Arc::clone(&response));
    if next.redirect_times > shared.settings.max_redirect_times {
        shared.stats.increment_requests_failed();
        let err = CrawlError::TooManyRedirects {
            url: request.origin_url.clone(),
            times: next.redirect_times,
        };
        shared.report_error(request, &err, ctx);
        return;
    }

    debug!(
        "Redirect {} -> {} ({}/{})",
        request.url, next.url, next.redirect_times, shared.settings.max_redirect_times
    );
    shared.stats.increment_requests_redirected();
    match &shared.hooks.on_redirect {
        Some(callback) => {
            if let Some(next) = callback(&response, next, ctx) {
                ctx.retry(next);
            }
        }
        None => ctx.retry(next),
    }
}
