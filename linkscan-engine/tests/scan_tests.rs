// End-to-end crawl tests against mock HTTP servers.

use std::time::{Duration, Instant};

use linkscan_engine::{
    FollowPolicy, LinkRecord, LinkStatus, Origin, Rule, RuleCondition, RuleScope,
    ScanConfiguration, ScanController, ScanEvent, ScanState, SkipReason,
};
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html")
        .set_body_raw(body.into(), "text/html")
}

async fn mount_html(server: &MockServer, at: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(html(body))
        .mount(server)
        .await;
}

/// Drains the result stream until it closes. Returns the terminal records
/// and whether the finished signal arrived.
async fn run_to_completion(mut rx: UnboundedReceiver<ScanEvent>) -> (Vec<LinkRecord>, bool) {
    let mut records = Vec::new();
    let mut finished = false;

    let drain = async {
        while let Some(event) = rx.recv().await {
            match event {
                ScanEvent::Link(record) => records.push(record),
                ScanEvent::Finished => finished = true,
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(30), drain)
        .await
        .expect("scan did not complete in time");

    (records, finished)
}

fn record_for<'a>(records: &'a [LinkRecord], target: &str) -> Option<&'a LinkRecord> {
    records.iter().find(|r| r.target == target)
}

fn done_code(record: &LinkRecord) -> Option<u16> {
    match &record.status {
        LinkStatus::Done { code, .. } => Some(*code),
        _ => None,
    }
}

// ============================================================================
// Crawl behavior
// ============================================================================

#[tokio::test]
async fn internal_follow_external_check_scenario() {
    let site = MockServer::start().await;
    let external = MockServer::start().await;

    mount_html(
        &site,
        "/",
        format!(
            r#"<a href="/about">about</a> <a href="{}/x">elsewhere</a>"#,
            external.uri()
        ),
    )
    .await;
    mount_html(&site, "/about", r#"<a href="/team">team</a>"#.to_string()).await;
    mount_html(&site, "/team", "<p>no links</p>".to_string()).await;
    // external page carries a link that must never be crawled under `check`
    mount_html(&external, "/x", r#"<a href="/never">nope</a>"#.to_string()).await;
    Mock::given(method("HEAD"))
        .and(path("/x"))
        .respond_with(html(""))
        .mount(&external)
        .await;

    let mut controller = ScanController::new();
    controller
        .configure(ScanConfiguration {
            internal_policy: FollowPolicy::Follow,
            external_policy: FollowPolicy::Check,
            max_external_depth: 1,
            ..Default::default()
        })
        .unwrap();

    let rx = controller.start(&site.uri()).unwrap();
    let (records, finished) = run_to_completion(rx).await;

    assert!(finished, "frontier drained, finished signal expected");

    // internal pages are fetched and recursed into
    let about = record_for(&records, &format!("{}/about", site.uri())).unwrap();
    assert_eq!(done_code(about), Some(200));
    assert_eq!(about.origin, Origin::Internal);
    let team = record_for(&records, &format!("{}/team", site.uri())).unwrap();
    assert_eq!(done_code(team), Some(200));

    // the external page is checked but its outbound links are not extracted
    let x = record_for(&records, &format!("{}/x", external.uri())).unwrap();
    assert_eq!(done_code(x), Some(200));
    assert_eq!(x.origin, Origin::External);
    assert_eq!(x.depth, 1);
    assert!(record_for(&records, &format!("{}/never", external.uri())).is_none());

    assert_eq!(controller.state(), ScanState::Stopped);
}

#[tokio::test]
async fn each_url_is_reported_at_most_once() {
    let site = MockServer::start().await;

    mount_html(
        &site,
        "/",
        r#"<a href="/a">1</a> <a href="/a">2</a> <a href="/b">3</a>"#.to_string(),
    )
    .await;
    mount_html(&site, "/a", r#"<a href="/b">again</a>"#.to_string()).await;
    mount_html(&site, "/b", r#"<a href="/a">again</a>"#.to_string()).await;

    let mut controller = ScanController::new();
    controller
        .configure(ScanConfiguration {
            thread_count: 4,
            ..Default::default()
        })
        .unwrap();

    let rx = controller.start(&site.uri()).unwrap();
    let (records, finished) = run_to_completion(rx).await;
    assert!(finished);

    for record in &records {
        let occurrences = records.iter().filter(|r| r.target == record.target).count();
        assert_eq!(occurrences, 1, "{} reported {} times", record.target, occurrences);
        assert!(record.status.is_terminal());
    }
    assert_eq!(records.len(), 3); // seed, /a, /b
}

#[tokio::test]
async fn external_depth_is_bounded_and_internal_depth_is_not() {
    let site = MockServer::start().await;
    let external = MockServer::start().await;

    mount_html(
        &site,
        "/",
        format!(
            r#"<a href="{}/x">ext</a> <a href="/d1">d1</a>"#,
            external.uri()
        ),
    )
    .await;
    // an internal chain much deeper than the external limit
    mount_html(&site, "/d1", r#"<a href="/d2">next</a>"#.to_string()).await;
    mount_html(&site, "/d2", r#"<a href="/d3">next</a>"#.to_string()).await;
    mount_html(&site, "/d3", r#"<a href="/d4">next</a>"#.to_string()).await;
    mount_html(&site, "/d4", "<p>end</p>".to_string()).await;
    // the external page links further; those are at depth 2 and past the bound
    mount_html(
        &external,
        "/x",
        r#"<a href="/z">deeper</a> <a href="http://depth-two.invalid/y">away</a>"#.to_string(),
    )
    .await;

    let mut controller = ScanController::new();
    controller
        .configure(ScanConfiguration {
            internal_policy: FollowPolicy::Follow,
            external_policy: FollowPolicy::Follow,
            max_external_depth: 1,
            ..Default::default()
        })
        .unwrap();

    let rx = controller.start(&site.uri()).unwrap();
    let (records, finished) = run_to_completion(rx).await;
    assert!(finished);

    // depth-1 external page fetched and, under `follow`, parsed
    let x = record_for(&records, &format!("{}/x", external.uri())).unwrap();
    assert_eq!(done_code(x), Some(200));

    // nothing discovered on it is admitted at depth 2
    assert!(record_for(&records, &format!("{}/z", external.uri())).is_none());
    assert!(records.iter().all(|r| !r.target.contains("depth-two.invalid")));

    // the internal chain runs past the external limit unhindered
    let d4 = record_for(&records, &format!("{}/d4", site.uri())).unwrap();
    assert_eq!(done_code(d4), Some(200));
    assert_eq!(d4.depth, 0);
}

// ============================================================================
// Redirects
// ============================================================================

#[tokio::test]
async fn origin_is_fixed_before_redirects() {
    let site = MockServer::start().await;
    let elsewhere = MockServer::start().await;

    mount_html(&site, "/", r#"<a href="/jump">jump</a>"#.to_string()).await;
    Mock::given(method("GET"))
        .and(path("/jump"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("{}/landing", elsewhere.uri())),
        )
        .mount(&site)
        .await;
    mount_html(&elsewhere, "/landing", "<p>landed</p>".to_string()).await;

    let mut controller = ScanController::new();
    let rx = controller.start(&site.uri()).unwrap();
    let (records, finished) = run_to_completion(rx).await;
    assert!(finished);

    let jump = record_for(&records, &format!("{}/jump", site.uri())).unwrap();
    // discovered on the start host, so internal forever, wherever it went
    assert_eq!(jump.origin, Origin::Internal);
    match &jump.status {
        LinkStatus::Done { code, final_url } => {
            assert_eq!(*code, 200);
            assert_eq!(final_url, &format!("{}/landing", elsewhere.uri()));
        }
        other => panic!("expected done, got {other:?}"),
    }
    assert_eq!(jump.redirect_chain, vec![format!("{}/jump", site.uri())]);
}

#[tokio::test]
async fn redirects_can_be_left_unfollowed() {
    let site = MockServer::start().await;

    mount_html(&site, "/", r#"<a href="/jump">jump</a>"#.to_string()).await;
    Mock::given(method("GET"))
        .and(path("/jump"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/elsewhere"))
        .mount(&site)
        .await;

    let mut controller = ScanController::new();
    controller
        .configure(ScanConfiguration {
            follow_redirects: false,
            ..Default::default()
        })
        .unwrap();

    let rx = controller.start(&site.uri()).unwrap();
    let (records, finished) = run_to_completion(rx).await;
    assert!(finished);

    let jump = record_for(&records, &format!("{}/jump", site.uri())).unwrap();
    assert_eq!(done_code(jump), Some(301));
    assert!(jump.redirect_chain.is_empty());
}

#[tokio::test]
async fn redirect_loops_are_cut_off() {
    let site = MockServer::start().await;

    mount_html(&site, "/", r#"<a href="/loop">loop</a>"#.to_string()).await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop"))
        .mount(&site)
        .await;

    let mut controller = ScanController::new();
    let rx = controller.start(&site.uri()).unwrap();
    let (records, finished) = run_to_completion(rx).await;
    assert!(finished);

    let looped = record_for(&records, &format!("{}/loop", site.uri())).unwrap();
    match &looped.status {
        LinkStatus::Error { message } => assert!(message.contains("redirects")),
        other => panic!("expected error, got {other:?}"),
    }
    // the partial chain is kept on the record
    assert!(!looped.redirect_chain.is_empty());
}

// ============================================================================
// Filtering and skip reporting
// ============================================================================

#[tokio::test]
async fn excluded_links_are_reported_not_fetched() {
    let site = MockServer::start().await;

    mount_html(
        &site,
        "/",
        r#"<a href="/report.pdf">pdf</a> <a href="/fine">fine</a>"#.to_string(),
    )
    .await;
    mount_html(&site, "/fine", "<p>ok</p>".to_string()).await;

    let mut controller = ScanController::new();
    controller
        .set_rules(vec![Rule {
            condition: RuleCondition::Exclude,
            scope: RuleScope::Both,
            pattern: r".*\.pdf$".to_string(),
        }])
        .unwrap();

    let rx = controller.start(&site.uri()).unwrap();
    let (records, finished) = run_to_completion(rx).await;
    assert!(finished);

    let pdf = record_for(&records, &format!("{}/report.pdf", site.uri())).unwrap();
    assert_eq!(
        pdf.status,
        LinkStatus::Skipped {
            reason: SkipReason::Rule
        }
    );
    let fine = record_for(&records, &format!("{}/fine", site.uri())).unwrap();
    assert_eq!(done_code(fine), Some(200));

    // the excluded link never reached the server
    let hits = site
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/report.pdf")
        .count();
    assert_eq!(hits, 0);
}

#[tokio::test]
async fn ignored_and_unsupported_links_are_reported_once() {
    let site = MockServer::start().await;

    mount_html(
        &site,
        "/",
        r#"<a href="http://ignored.invalid/x">ext</a>
           <a href="ftp://files.invalid/a.zip">ftp</a>
           <a href="mailto:admin@example.test">mail</a>"#
            .to_string(),
    )
    .await;

    let mut controller = ScanController::new();
    controller
        .configure(ScanConfiguration {
            external_policy: FollowPolicy::Ignore,
            ..Default::default()
        })
        .unwrap();

    let rx = controller.start(&site.uri()).unwrap();
    let (records, finished) = run_to_completion(rx).await;
    assert!(finished);

    let ignored = record_for(&records, "http://ignored.invalid/x").unwrap();
    assert_eq!(
        ignored.status,
        LinkStatus::Skipped {
            reason: SkipReason::PolicyIgnore
        }
    );

    let ftp = record_for(&records, "ftp://files.invalid/a.zip").unwrap();
    assert_eq!(
        ftp.status,
        LinkStatus::Skipped {
            reason: SkipReason::UnsupportedScheme
        }
    );

    // mail links vanish without a report
    assert!(records.iter().all(|r| !r.target.starts_with("mailto:")));
}

#[tokio::test]
async fn query_variants_collapse_when_queries_are_off() {
    let site = MockServer::start().await;

    mount_html(
        &site,
        "/",
        r#"<a href="/page?x=1">one</a> <a href="/page?x=2">two</a>"#.to_string(),
    )
    .await;
    mount_html(&site, "/page", "<p>canonical</p>".to_string()).await;

    let mut controller = ScanController::new();
    controller
        .configure(ScanConfiguration {
            follow_query_strings: false,
            ..Default::default()
        })
        .unwrap();

    let rx = controller.start(&site.uri()).unwrap();
    let (records, finished) = run_to_completion(rx).await;
    assert!(finished);

    let page_records: Vec<_> = records
        .iter()
        .filter(|r| r.target.contains("/page"))
        .collect();
    assert_eq!(page_records.len(), 1);
    assert_eq!(page_records[0].target, format!("{}/page", site.uri()));
}

// ============================================================================
// Pacing and timeouts
// ============================================================================

#[tokio::test]
async fn single_worker_pacing_spreads_requests() {
    let site = MockServer::start().await;

    mount_html(
        &site,
        "/",
        r#"<a href="/p1">1</a> <a href="/p2">2</a>"#.to_string(),
    )
    .await;
    mount_html(&site, "/p1", "<p>1</p>".to_string()).await;
    mount_html(&site, "/p2", "<p>2</p>".to_string()).await;

    let mut controller = ScanController::new();
    controller
        .configure(ScanConfiguration {
            thread_count: 1,
            delay_secs: 1,
            ..Default::default()
        })
        .unwrap();

    let started = Instant::now();
    let rx = controller.start(&site.uri()).unwrap();
    let (records, finished) = run_to_completion(rx).await;
    assert!(finished);
    assert_eq!(records.len(), 3);

    // three requests by one worker with a 1s gap after each: at least two
    // full delay windows must have elapsed
    assert!(
        started.elapsed() >= Duration::from_secs(2),
        "requests were not paced: {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn slow_responses_are_recorded_as_timeouts() {
    let site = MockServer::start().await;

    mount_html(&site, "/", r#"<a href="/slow">slow</a>"#.to_string()).await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html("<p>late</p>").set_delay(Duration::from_secs(3)))
        .mount(&site)
        .await;

    let mut controller = ScanController::new();
    controller
        .configure(ScanConfiguration {
            timeout_secs: 1,
            ..Default::default()
        })
        .unwrap();

    let rx = controller.start(&site.uri()).unwrap();
    let (records, finished) = run_to_completion(rx).await;
    assert!(finished);

    let slow = record_for(&records, &format!("{}/slow", site.uri())).unwrap();
    assert_eq!(slow.status, LinkStatus::Timeout);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn pause_resume_stop_lifecycle() {
    let site = MockServer::start().await;

    let mut index = String::new();
    for i in 1..=6 {
        index.push_str(&format!(r#"<a href="/p{i}">{i}</a>"#));
    }
    mount_html(&site, "/", index).await;
    for i in 1..=6 {
        Mock::given(method("GET"))
            .and(path(format!("/p{i}")))
            .respond_with(html("<p>page</p>").set_delay(Duration::from_millis(200)))
            .mount(&site)
            .await;
    }

    let mut controller = ScanController::new();
    controller
        .configure(ScanConfiguration {
            thread_count: 1,
            ..Default::default()
        })
        .unwrap();

    let mut rx = controller.start(&site.uri()).unwrap();
    assert_eq!(controller.state(), ScanState::Running);

    // wait for the seed page's result, then pause mid-crawl
    let first = rx.recv().await.expect("seed result");
    assert!(matches!(first, ScanEvent::Link(_)));
    controller.pause().unwrap();
    assert_eq!(controller.state(), ScanState::Paused);

    // the in-flight fetch may still complete; after that the stream is quiet
    tokio::time::sleep(Duration::from_millis(600)).await;
    let mut during_pause = 0;
    while rx.try_recv().is_ok() {
        during_pause += 1;
    }
    assert!(
        during_pause <= 1,
        "workers kept fetching while paused ({during_pause} events)"
    );

    controller.resume().unwrap();
    assert_eq!(controller.state(), ScanState::Running);
    let resumed = rx.recv().await.expect("work resumed");
    assert!(matches!(resumed, ScanEvent::Link(_)));

    controller.stop().unwrap();
    controller.join().await.unwrap();
    assert_eq!(controller.state(), ScanState::Stopped);

    // stream closes without a finished signal; pending entries are dropped
    let mut tail = Vec::new();
    while let Some(event) = rx.recv().await {
        tail.push(event);
    }
    assert!(tail.iter().all(|e| matches!(e, ScanEvent::Link(_))));
}

#[tokio::test]
async fn controller_restarts_after_stop() {
    let site = MockServer::start().await;
    mount_html(&site, "/", "<p>lonely</p>".to_string()).await;

    let mut controller = ScanController::new();
    let rx = controller.start(&site.uri()).unwrap();
    let (_, finished) = run_to_completion(rx).await;
    assert!(finished);
    assert_eq!(controller.state(), ScanState::Stopped);

    // a fresh start resets the visited set, so the seed is fetched again
    let rx = controller.start(&site.uri()).unwrap();
    let (records, finished) = run_to_completion(rx).await;
    assert!(finished);
    assert_eq!(records.len(), 1);
    assert_eq!(done_code(&records[0]), Some(200));
}
