//! The concurrent fetch workers.
//!
//! Each worker loops on the shared frontier: take a link, apply the rules,
//! fetch with the configured timeout and redirect policy, hand HTML bodies
//! to the extractor when the link's origin policy says follow, and report
//! the terminal outcome to the sink. Pacing (`delay_secs`) is honored per
//! worker, after each completed network request.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use reqwest::header;
use reqwest::{Client, Method};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use url::Url;

use crate::config::{FollowPolicy, ScanConfiguration};
use crate::controller::{ScanEvent, SessionShared};
use crate::error::Result;
use crate::extract::extract_links;
use crate::frontier::Offer;
use crate::result::{LinkRecord, LinkStatus, SkipReason};
use crate::urls::{self, UrlRejection};

/// Redirect hops followed before a link is recorded as an error.
const MAX_REDIRECT_HOPS: usize = 10;

/// Content types handed to the link extractor.
const HTML_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

pub(crate) fn build_http_client(config: &ScanConfiguration) -> Result<Client> {
    let client = Client::builder()
        .user_agent(concat!("linkscan/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(config.timeout_secs))
        .pool_max_idle_per_host(10)
        // redirects are followed by hand so chains can be recorded
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    Ok(client)
}

/// One worker's main loop. Exits when the frontier reports stop or drain.
pub(crate) async fn run_worker(
    worker_id: usize,
    shared: Arc<SessionShared>,
    client: Client,
    events: UnboundedSender<ScanEvent>,
) {
    debug!("worker {} started", worker_id);

    while let Some(mut record) = shared.frontier.take().await {
        if !shared.rules.evaluate(&record.target, record.origin) {
            debug!("worker {}: rules exclude {}", worker_id, record.target);
            record.status = LinkStatus::Skipped {
                reason: SkipReason::Rule,
            };
            shared.counters.skipped.fetch_add(1, Ordering::Relaxed);
            let _ = events.send(ScanEvent::Link(record));
            shared.frontier.task_done();
            continue;
        }

        record.status = LinkStatus::Fetching;
        debug!("worker {}: fetching {}", worker_id, record.target);

        // The seed is always followed; everything else follows only when
        // the policy for its origin says so.
        let follow = record.source_page.is_empty()
            || shared.config.policy_for(record.origin) == FollowPolicy::Follow;

        let fetched = fetch(
            &client,
            &record.target,
            follow,
            shared.config.follow_redirects,
        )
        .await;

        match fetched {
            Fetched::Response {
                code,
                final_url,
                chain,
                body,
            } => {
                record.redirect_chain = chain;
                record.status = LinkStatus::Done {
                    code,
                    final_url: final_url.to_string(),
                };
                shared.counters.fetched.fetch_add(1, Ordering::Relaxed);
                if let Some(body) = body {
                    offer_children(&shared, &events, &record, &final_url, &body);
                }
            }
            Fetched::Timeout => {
                record.status = LinkStatus::Timeout;
                shared.counters.timeouts.fetch_add(1, Ordering::Relaxed);
            }
            Fetched::Network(message) => {
                warn!("worker {}: {} failed: {}", worker_id, record.target, message);
                record.status = LinkStatus::Error { message };
                shared.counters.errors.fetch_add(1, Ordering::Relaxed);
            }
            Fetched::TooManyRedirects { chain } => {
                record.redirect_chain = chain;
                record.status = LinkStatus::Error {
                    message: format!("more than {MAX_REDIRECT_HOPS} redirects"),
                };
                shared.counters.errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        let _ = events.send(ScanEvent::Link(record));
        shared.frontier.task_done();

        if shared.config.delay_secs > 0 {
            tokio::time::sleep(Duration::from_secs(shared.config.delay_secs)).await;
        }
    }

    debug!("worker {} exiting", worker_id);
}

enum Fetched {
    Response {
        code: u16,
        final_url: Url,
        chain: Vec<String>,
        body: Option<String>,
    },
    Timeout,
    Network(String),
    TooManyRedirects {
        chain: Vec<String>,
    },
}

/// Issues the request for one link, following redirects by hand.
///
/// Links that are only being checked are probed with HEAD; links being
/// followed use GET so the body is available for extraction. The body is
/// read only for successful HTML responses.
async fn fetch(client: &Client, target: &str, follow_links: bool, follow_redirects: bool) -> Fetched {
    let mut current = match Url::parse(target) {
        Ok(url) => url,
        Err(e) => return Fetched::Network(e.to_string()),
    };
    let method = if follow_links { Method::GET } else { Method::HEAD };
    let mut chain: Vec<String> = Vec::new();

    loop {
        let response = match client.request(method.clone(), current.clone()).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Fetched::Timeout,
            Err(e) => return Fetched::Network(e.to_string()),
        };

        let status = response.status();
        if status.is_redirection() {
            let next = response
                .headers()
                .get(header::LOCATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|location| current.join(location).ok());

            match next {
                Some(next) if follow_redirects => {
                    chain.push(current.to_string());
                    if chain.len() > MAX_REDIRECT_HOPS {
                        return Fetched::TooManyRedirects { chain };
                    }
                    current = next;
                    continue;
                }
                // no Location, or redirects disabled: the first redirect's
                // status code is the answer
                _ => {
                    return Fetched::Response {
                        code: status.as_u16(),
                        final_url: current,
                        chain,
                        body: None,
                    };
                }
            }
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let is_html = HTML_CONTENT_TYPES
            .iter()
            .any(|kind| content_type.trim_start().starts_with(kind));

        let code = status.as_u16();
        let body = if follow_links && is_html && status.is_success() {
            response.text().await.ok()
        } else {
            None
        };

        return Fetched::Response {
            code,
            final_url: current,
            chain,
            body,
        };
    }
}

/// Resolves, classifies, and offers every reference found on a fetched page.
fn offer_children(
    shared: &Arc<SessionShared>,
    events: &UnboundedSender<ScanEvent>,
    record: &LinkRecord,
    page_url: &Url,
    body: &str,
) {
    let raw_links = extract_links(body);
    debug!("{} outbound references on {}", raw_links.len(), page_url);

    for raw in raw_links {
        match urls::normalize(&raw, page_url) {
            Ok(link) => {
                let link = if shared.config.follow_query_strings {
                    link
                } else {
                    urls::strip_query(&link)
                };
                let origin = urls::classify(&link, &shared.start_origin);
                let depth = record.depth + usize::from(origin.is_external());
                let child = LinkRecord::new(
                    link.to_string(),
                    page_url.to_string(),
                    origin,
                    depth,
                );

                match shared.frontier.offer(child.clone()) {
                    Offer::Accepted => {
                        shared.counters.discovered.fetch_add(1, Ordering::Relaxed);
                    }
                    Offer::Duplicate => {
                        shared.counters.duplicates.fetch_add(1, Ordering::Relaxed);
                    }
                    Offer::PolicyIgnored => {
                        let mut skipped = child;
                        skipped.status = LinkStatus::Skipped {
                            reason: SkipReason::PolicyIgnore,
                        };
                        shared.counters.skipped.fetch_add(1, Ordering::Relaxed);
                        let _ = events.send(ScanEvent::Link(skipped));
                    }
                    Offer::DepthExceeded => {}
                }
            }
            Err(UrlRejection::Silent) => {}
            Err(UrlRejection::UnsupportedScheme(scheme)) => {
                // resolve enough of the reference to report it once
                let target = page_url.join(&raw).map_or(raw.clone(), |u| u.to_string());
                if shared.frontier.note_skip(&target) {
                    let mut skipped =
                        LinkRecord::new(target, page_url.to_string(), record.origin, record.depth);
                    skipped.status = LinkStatus::Skipped {
                        reason: SkipReason::UnsupportedScheme,
                    };
                    shared.counters.skipped.fetch_add(1, Ordering::Relaxed);
                    debug!("unsupported scheme {} in {}", scheme, skipped.target);
                    let _ = events.send(ScanEvent::Link(skipped));
                }
            }
            Err(UrlRejection::Invalid(reason)) => {
                debug!("unresolvable reference {:?} on {}: {}", raw, page_url, reason);
            }
        }
    }
}
