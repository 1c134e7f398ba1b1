use crate::CLAP_STYLING;
use clap::{arg, command};
use std::path::PathBuf;

fn with_run_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(arg!(<URL>).help("The origin URL whose identity claims should be corroborated"))
        .arg(
            arg!(--"links-file" <PATH>)
                .required(false)
                .help("File of candidate URLs to check, one per line (skips crawling the origin)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            arg!(--"only-well-known-id-sites")
                .required(false)
                .help("Only follow pages on the trusted identity-site list")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            arg!(--"only-rel-me")
                .required(false)
                .help("Only count links explicitly marked rel=\"me\" as evidence")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            arg!(--"max-hops" <HOPS>)
                .required(false)
                .help("Maximum link distance from the origin (default: 3)")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            arg!(--"render-endpoint" <URL>)
                .required(false)
                .help("Rendering service to retry pages the plain HTTP fetch could not load"),
        )
        .arg(
            arg!(--"render-local")
                .required(false)
                .help("Retry failed pages in a local headless Chromium instead")
                .conflicts_with("render-endpoint")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            arg!(--"chrome" <PATH>)
                .required(false)
                .help("Chromium executable for --render-local (default: search the usual locations)")
                .requires("render-local")
                .value_parser(clap::value_parser!(PathBuf)),
        )
}

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("backlink")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("backlink")
        .about("A naive backlink checker for non-cryptographic identity linking")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-v --"verbose" "Enable verbose logging output to stderr")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-q --"quiet" "Suppress the progress spinner and non-essential output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-c --"config" <PATH>)
                .required(false)
                .help("TOML file with a [backlink] table of crawl settings")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            arg!(--"no-cache")
                .required(false)
                .help("Do not read or write the response cache")
                .action(clap::ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            arg!(--"cache-dir" <PATH>)
                .required(false)
                .help("Response cache directory (default: ~/.cache/backlink)")
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(with_run_args(
            command!("verify").about("Crawl a URL and print a summary of the backlink score"),
        ))
        .subcommand(
            with_run_args(
                command!("crawl").about("Crawl a URL and write the full evidence as JSON"),
            )
            .arg(
                arg!(--"json" <PATH>)
                    .required(true)
                    .help("Path to write the JSON output file")
                    .value_parser(clap::value_parser!(PathBuf)),
            ),
        )
        .subcommand(
            command!("cache")
                .about("Inspect or clear the response cache")
                .subcommand_required(true)
                .subcommand(command!("stats").about("Show cache size and entry counts"))
                .subcommand(command!("clear").about("Remove every cached response")),
        )
}
