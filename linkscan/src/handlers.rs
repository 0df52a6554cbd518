use chrono::Local;
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use linkscan_engine::{
    FollowPolicy, LinkRecord, LinkStatus, ScanConfiguration, ScanController, ScanEvent,
    ScanProfile,
};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

// Helper functions for the scan handler

/// Load a scan profile (options plus filter rules) from a JSON file
pub fn load_profile(path: &PathBuf) -> Result<ScanProfile, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read profile {}: {}", path.display(), e))?;
    serde_json::from_str(&content)
        .map_err(|e| format!("Invalid profile {}: {}", path.display(), e))
}

/// Command-line settings layered over a loaded profile.
#[derive(Debug, Default)]
pub struct ScanOverrides {
    pub threads: Option<usize>,
    pub delay: Option<u64>,
    pub timeout: Option<u64>,
    pub internal: Option<FollowPolicy>,
    pub external: Option<FollowPolicy>,
    pub depth: Option<usize>,
    pub no_redirects: bool,
    pub no_query: bool,
}

impl ScanOverrides {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let policy = |name: &str| {
            matches
                .get_one::<String>(name)
                .map(|value| value.parse().expect("clap validated the policy name"))
        };
        Self {
            threads: matches.get_one::<usize>("threads").copied(),
            delay: matches.get_one::<u64>("delay").copied(),
            timeout: matches.get_one::<u64>("timeout").copied(),
            internal: policy("internal"),
            external: policy("external"),
            depth: matches.get_one::<usize>("depth").copied(),
            no_redirects: matches.get_flag("no-redirects"),
            no_query: matches.get_flag("no-query"),
        }
    }

    /// Flags given on the command line win over the profile's options.
    pub fn apply(&self, mut config: ScanConfiguration) -> ScanConfiguration {
        if let Some(threads) = self.threads {
            config.thread_count = threads;
        }
        if let Some(delay) = self.delay {
            config.delay_secs = delay;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(internal) = self.internal {
            config.internal_policy = internal;
        }
        if let Some(external) = self.external {
            config.external_policy = external;
        }
        if let Some(depth) = self.depth {
            config.max_external_depth = depth;
        }
        if self.no_redirects {
            config.follow_redirects = false;
        }
        if self.no_query {
            config.follow_query_strings = false;
        }
        config
    }
}

/// A link whose terminal status indicates a problem worth fixing.
pub fn is_broken(record: &LinkRecord) -> bool {
    match &record.status {
        LinkStatus::Done { code, .. } => *code >= 400,
        LinkStatus::Timeout | LinkStatus::Error { .. } => true,
        _ => false,
    }
}

/// One colored line for the live progress feed.
pub fn format_status_line(record: &LinkRecord) -> String {
    let origin_tag = if record.origin.is_external() {
        " [ext]".dimmed().to_string()
    } else {
        String::new()
    };

    match &record.status {
        LinkStatus::Done { code, .. } => {
            let status = match *code {
                200..=299 => format!("✓ {}", code).green().to_string(),
                300..=399 => format!("↪ {}", code).cyan().to_string(),
                400..=499 => format!("⚠ {}", code).yellow().to_string(),
                _ => format!("✗ {}", code).red().to_string(),
            };
            format!("{} {}{}", status, record.target, origin_tag)
        }
        LinkStatus::Timeout => {
            format!("{} {}{}", "✗ timeout".red(), record.target, origin_tag)
        }
        LinkStatus::Error { message } => {
            format!(
                "{} {}{} ({})",
                "✗ error".red(),
                record.target,
                origin_tag,
                message
            )
        }
        LinkStatus::Skipped { reason } => {
            format!(
                "{} {}{} ({:?})",
                "→ skipped".blue(),
                record.target,
                origin_tag,
                reason
            )
        }
        // non-terminal states never reach the feed
        other => format!("? {} {:?}", record.target, other),
    }
}

#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub seed: String,
    pub started: String,
    pub finished: String,
    pub stopped_early: bool,
    pub counters: linkscan_engine::CounterSnapshot,
    pub links: Vec<LinkRecord>,
}

pub fn render_json_report(report: &ScanReport) -> Result<String, String> {
    serde_json::to_string_pretty(report).map_err(|e| format!("Failed to encode report: {}", e))
}

/// Plain-text report, safe to write to a file.
pub fn render_text_report(report: &ScanReport) -> String {
    let broken: Vec<&LinkRecord> = report.links.iter().filter(|r| is_broken(r)).collect();

    let mut out = String::new();
    out.push_str(&format!("Link scan of {}\n", report.seed));
    out.push_str(&format!("Started:  {}\n", report.started));
    out.push_str(&format!("Finished: {}\n", report.finished));
    if report.stopped_early {
        out.push_str("Note: scan was stopped before the site was fully covered\n");
    }
    out.push('\n');

    out.push_str("Summary:\n");
    out.push_str(&format!("  Links checked: {}\n", report.counters.fetched));
    out.push_str(&format!("  Broken links: {}\n", broken.len()));
    out.push_str(&format!("  Skipped: {}\n", report.counters.skipped));
    out.push_str(&format!("  Timeouts: {}\n", report.counters.timeouts));
    out.push_str(&format!(
        "  Duplicate references: {}\n",
        report.counters.duplicates
    ));

    if !broken.is_empty() {
        out.push_str("\nBroken links:\n");
        for record in &broken {
            let status = match &record.status {
                LinkStatus::Done { code, .. } => code.to_string(),
                LinkStatus::Timeout => "timeout".to_string(),
                LinkStatus::Error { message } => format!("error: {}", message),
                other => format!("{:?}", other),
            };
            out.push_str(&format!("  [{}] {}\n", status, record.target));
            if !record.source_page.is_empty() {
                out.push_str(&format!("        found on {}\n", record.source_page));
            }
        }
    }

    out.push_str("\nAll links:\n");
    for record in &report.links {
        let status = match &record.status {
            LinkStatus::Done { code, .. } => code.to_string(),
            LinkStatus::Timeout => "timeout".to_string(),
            LinkStatus::Error { .. } => "error".to_string(),
            LinkStatus::Skipped { reason } => format!("skipped ({:?})", reason),
            other => format!("{:?}", other),
        };
        let origin = if record.origin.is_external() {
            format!(" (external, depth {})", record.depth)
        } else {
            String::new()
        };
        out.push_str(&format!("  [{}] {}{}\n", status, record.target, origin));
    }

    out
}

pub async fn handle_scan(sub_matches: &ArgMatches, quiet: bool) {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    let url = sub_matches.get_one::<Url>("url").unwrap();
    let profile_path = sub_matches.get_one::<PathBuf>("profile");
    let format = sub_matches.get_one::<String>("format").unwrap();
    let output = sub_matches.get_one::<PathBuf>("output");

    let profile = match profile_path {
        Some(path) => match load_profile(path) {
            Ok(profile) => profile,
            Err(e) => {
                eprintln!("✗ {}", e);
                std::process::exit(1);
            }
        },
        None => ScanProfile::default(),
    };

    let overrides = ScanOverrides::from_matches(sub_matches);
    let config = overrides.apply(profile.options);
    let threads = config.thread_count;

    let mut controller = ScanController::new();
    if let Err(e) = controller.configure(config) {
        eprintln!("✗ {}", e);
        std::process::exit(1);
    }
    if let Err(e) = controller.set_rules(profile.rules) {
        eprintln!("✗ {}", e);
        std::process::exit(1);
    }

    let mut rx = match controller.start(url.as_str()) {
        Ok(rx) => rx,
        Err(e) => {
            eprintln!("✗ {}", e);
            std::process::exit(1);
        }
    };

    if !quiet {
        println!("\n🔗 Scanning {}", url);
        println!("Workers: {}\n", threads);
    }

    let spinner = if quiet {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap(),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    };

    let started = Local::now();
    let mut links: Vec<LinkRecord> = Vec::new();
    let mut stopped = false;

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(ScanEvent::Link(record)) => {
                    if let Some(pb) = &spinner {
                        pb.println(format_status_line(&record));
                        let counters = controller.counters().unwrap_or_default();
                        pb.set_message(format!(
                            "{} checked, {} skipped, {} discovered",
                            counters.fetched, counters.skipped, counters.discovered
                        ));
                    }
                    links.push(record);
                }
                Some(ScanEvent::Finished) | None => break,
            },
            _ = tokio::signal::ctrl_c(), if !stopped => {
                stopped = true;
                if let Some(pb) = &spinner {
                    pb.set_message("stopping, letting in-flight requests finish...");
                }
                let _ = controller.stop();
            }
        }
    }

    if let Err(e) = controller.join().await {
        eprintln!("✗ Scan failed: {}", e);
        std::process::exit(1);
    }
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }

    let broken = links.iter().filter(|r| is_broken(r)).count();
    if !quiet {
        if stopped {
            println!("\n{} Scan stopped\n", "✗".yellow().bold());
        } else {
            println!("\n{} Scan complete!\n", "✓".green().bold());
        }
        let verdict = if broken == 0 {
            format!("{} broken links", broken).green().bold()
        } else {
            format!("{} broken links", broken).red().bold()
        };
        println!(
            "{} ({} links checked)\n",
            verdict,
            controller.counters().unwrap_or_default().fetched
        );
    }

    let report = ScanReport {
        seed: url.to_string(),
        started: started.to_rfc3339(),
        finished: Local::now().to_rfc3339(),
        stopped_early: stopped,
        counters: controller.counters().unwrap_or_default(),
        links,
    };

    let rendered = if format == "json" {
        match render_json_report(&report) {
            Ok(rendered) => rendered,
            Err(e) => {
                eprintln!("✗ {}", e);
                std::process::exit(1);
            }
        }
    } else {
        render_text_report(&report)
    };

    match output {
        Some(path) => {
            if let Err(e) = fs::write(path, &rendered) {
                eprintln!("✗ Failed to write {}: {}", path.display(), e);
                std::process::exit(1);
            }
            if !quiet {
                println!("Report saved to {}", path.display());
            }
        }
        None => print!("{}", rendered),
    }
}
