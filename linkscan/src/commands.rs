use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("linkscan")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("linkscan")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress progress output, print only the report").required(false))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            command!("scan")
                .about(
                    "Recursively scan a site for broken links, reporting the status of every \
                link discovered.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The URL to start scanning from")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(-p --"profile" <PATH>)
                        .required(false)
                        .help("Path to a JSON scan profile holding options and filter rules")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-t --"threads" <NUM_WORKERS>)
                        .required(false)
                        .help("The number of async worker 'threads' in the worker pool.")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"delay" <SECONDS>)
                        .required(false)
                        .help("Seconds each worker waits between its requests")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Request timeout in seconds")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(--"internal" <POLICY>)
                        .required(false)
                        .help("What to do with links on the start site")
                        .value_parser(["ignore", "check", "follow"]),
                )
                .arg(
                    arg!(--"external" <POLICY>)
                        .required(false)
                        .help("What to do with links leading off the start site")
                        .value_parser(["ignore", "check", "follow"]),
                )
                .arg(
                    arg!(--"depth" <HOPS>)
                        .required(false)
                        .help("How many hops away from the start site external links may be followed")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"no-redirects")
                        .required(false)
                        .help("Report redirect status codes instead of following them")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"no-query")
                        .required(false)
                        .help("Strip query strings so URL variants collapse to one page")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
}
