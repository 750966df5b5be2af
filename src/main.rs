//! cdp-bridge - Main Entry Point
//!
//! One-shot CLI commands and the long-lived `serve` mode share the same
//! bridge façade; this file only handles argument parsing, configuration
//! loading, logging setup, and output formatting.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cdp_bridge::{
    api::{ApiServer, AppState},
    bridge::{Bridge, TypeRequest},
    config::CliArgs,
    error::BridgeError,
    input::unescape_newlines,
    NAME, VERSION,
};

/// ANSI color codes for terminal output
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const GREEN: &str = "\x1b[32m";
}

/// How much of the DOM tree the `dom` subcommand prints before cutting off.
const DOM_PRINT_LIMIT: usize = 5000;

/// Shared `--tab-url` argument.
fn tab_url_arg() -> Arg {
    Arg::new("tab-url")
        .short('u')
        .long("tab-url")
        .value_name("FRAGMENT")
        .help("Substring of the target tab's URL (case-insensitive)")
}

/// Build the CLI command parser
fn build_cli() -> Command {
    Command::new(NAME)
        .version(VERSION)
        .about("Types trusted keyboard input into browser tabs over the Chrome DevTools Protocol")
        .long_about(
            "cdp-bridge connects to a running browser's debugging endpoint and\n\
             replays text as raw keyboard events, which pass the isTrusted\n\
             checks that hostile rich-text editors use to reject synthetic\n\
             input. Reading the page back (DOM, accessibility tree) and\n\
             AI-driven element finding are delegated to external tooling.",
        )
        .arg(
            Arg::new("cdp-url")
                .long("cdp-url")
                .value_name("URL")
                .global(true)
                .help("Full debugging endpoint base URL (overrides --cdp-port and CDP_PORT)"),
        )
        .arg(
            Arg::new("cdp-port")
                .long("cdp-port")
                .value_name("PORT")
                .global(true)
                .value_parser(clap::value_parser!(u16))
                .help("Debugging port used to build a localhost endpoint URL (default: 18800)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Path to configuration file (TOML or JSON)"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("MS")
                .global(true)
                .value_parser(clap::value_parser!(u64))
                .help("Per-command response timeout in milliseconds"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .help("Enable verbose logging")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .global(true)
                .help("Suppress output except errors")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
        .subcommand(Command::new("tabs").about("List open browser tabs"))
        .subcommand(
            Command::new("type")
                .about("Type text via raw CDP key events")
                .arg(
                    Arg::new("text")
                        .short('t')
                        .long("text")
                        .required(true)
                        .help("Text to type; literal \\n sequences become newlines"),
                )
                .arg(tab_url_arg())
                .arg(
                    Arg::new("selector")
                        .short('s')
                        .long("selector")
                        .value_name("CSS")
                        .help("Focus this element before typing (first match wins)"),
                )
                .arg(
                    Arg::new("clear")
                        .short('c')
                        .long("clear")
                        .action(ArgAction::SetTrue)
                        .help("Empty the focused element before typing"),
                )
                .arg(
                    Arg::new("key-delay")
                        .long("key-delay")
                        .value_name("MS")
                        .value_parser(clap::value_parser!(u64))
                        .help("Pause between keystrokes (default: 8)"),
                ),
        )
        .subcommand(
            Command::new("click")
                .about("Click at viewport coordinates")
                .arg(
                    Arg::new("x")
                        .short('x')
                        .long("x")
                        .required(true)
                        .value_parser(clap::value_parser!(i64)),
                )
                .arg(
                    Arg::new("y")
                        .short('y')
                        .long("y")
                        .required(true)
                        .value_parser(clap::value_parser!(i64)),
                )
                .arg(tab_url_arg()),
        )
        .subcommand(
            Command::new("eval")
                .about("Evaluate JavaScript in the page")
                .arg(Arg::new("expr").short('e').long("expr").required(true))
                .arg(tab_url_arg()),
        )
        .subcommand(
            Command::new("dom")
                .about("Fetch the DOM tree (pierces shadow roots)")
                .arg(tab_url_arg()),
        )
        .subcommand(
            Command::new("axtree")
                .about("Fetch the accessibility tree")
                .arg(tab_url_arg()),
        )
        .subcommand(
            Command::new("agent")
                .about("Delegate a task to the external agent collaborator")
                .arg(Arg::new("task").short('t').long("task").required(true))
                .arg(tab_url_arg()),
        )
        .subcommand(
            Command::new("find")
                .about("Delegate element finding to the external agent collaborator")
                .arg(Arg::new("prompt").short('p').long("prompt").required(true))
                .arg(tab_url_arg()),
        )
        .subcommand(
            Command::new("serve")
                .about("Run the long-lived request server")
                .arg(
                    Arg::new("port")
                        .long("port")
                        .value_name("PORT")
                        .value_parser(clap::value_parser!(u16))
                        .help("Server port (default: 18850)"),
                ),
        )
}

/// Parse global CLI arguments into CliArgs
fn parse_cli_args(matches: &ArgMatches) -> CliArgs {
    CliArgs {
        config_file: matches.get_one::<PathBuf>("config").cloned(),
        cdp_url: matches.get_one::<String>("cdp-url").cloned(),
        cdp_port: matches.get_one::<u16>("cdp-port").copied(),
        command_timeout_ms: matches.get_one::<u64>("timeout").copied(),
        key_delay_ms: None,
    }
}

/// Initialize the tracing/logging subsystem
fn init_tracing(verbosity: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbosity {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("tower_http=info".parse().unwrap());

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

/// Attach the machine-readable kind to errors leaving through the CLI.
fn cli_error(err: BridgeError) -> anyhow::Error {
    anyhow::anyhow!("[{}] {}", err.kind(), err)
}

fn fragment(matches: &ArgMatches) -> Option<String> {
    matches.get_one::<String>("tab-url").cloned()
}

/// Run the request server until interrupted.
async fn serve(bridge: Bridge, port: u16) -> Result<()> {
    let state = AppState::new(Arc::new(bridge));
    let endpoint = state.bridge.endpoint().to_string();

    let mut server = ApiServer::new(port, state);
    server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start request server: {e}"))?;
    let addr = server.local_addr().expect("server just started");

    println!(
        "{bold}{green}CDP bridge{reset} on http://{addr}",
        bold = colors::BOLD,
        green = colors::GREEN,
        reset = colors::RESET,
    );
    println!(
        "  {dim}CDP target:{reset} {endpoint}",
        dim = colors::DIM,
        reset = colors::RESET,
    );
    println!();
    println!("  POST /type    - raw CDP keyboard input");
    println!("  POST /click   - CDP mouse click (x, y)");
    println!("  POST /eval    - evaluate JavaScript");
    println!("  GET  /dom     - DOM tree (shadow roots pierced)");
    println!("  GET  /axtree  - accessibility tree");
    println!("  GET  /tabs    - list browser tabs");
    println!("  GET  /state   - bridge status");
    println!("  POST /agent   - delegated agent task");
    println!("  POST /find    - delegated element finding");
    println!();
    println!(
        "{dim}Press Ctrl+C to stop{reset}",
        dim = colors::DIM,
        reset = colors::RESET,
    );

    signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    println!();
    info!("received shutdown signal, stopping gracefully...");
    server.stop().await;

    Ok(())
}

/// Main application entry point
#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    let verbosity = matches.get_count("verbose");
    let quiet = matches.get_flag("quiet");
    init_tracing(verbosity, quiet);

    let cli_args = parse_cli_args(&matches);
    let settings = cli_args
        .load_settings()
        .context("failed to load configuration")?;
    let serve_port = settings.serve_port;
    let bridge = Bridge::new(settings);

    match matches.subcommand() {
        Some(("tabs", _)) => {
            let tabs = bridge.tabs().await.map_err(cli_error)?;
            for tab in tabs {
                let mut title = tab.title;
                title.truncate(60);
                println!("  {title}");
                println!(
                    "    {dim}{url}{reset}",
                    url = tab.url,
                    dim = colors::DIM,
                    reset = colors::RESET,
                );
                println!();
            }
        }
        Some(("type", sub)) => {
            let text = unescape_newlines(sub.get_one::<String>("text").expect("required"));
            let report = bridge
                .type_text(TypeRequest {
                    text,
                    tab_url: fragment(sub),
                    selector: sub.get_one::<String>("selector").cloned(),
                    clear: sub.get_flag("clear"),
                    key_delay_ms: sub.get_one::<u64>("key-delay").copied(),
                })
                .await
                .map_err(cli_error)?;
            println!(
                "Typed {} chars ({} newlines) into {} in {}ms",
                report.chars, report.newlines, report.tab, report.elapsed_ms
            );
        }
        Some(("click", sub)) => {
            let x = *sub.get_one::<i64>("x").expect("required");
            let y = *sub.get_one::<i64>("y").expect("required");
            let report = bridge
                .click(x, y, fragment(sub).as_deref())
                .await
                .map_err(cli_error)?;
            println!("Clicked ({}, {}) on {}", report.x, report.y, report.tab);
        }
        Some(("eval", sub)) => {
            let expr = sub.get_one::<String>("expr").expect("required");
            let result = bridge
                .eval(expr, fragment(sub).as_deref())
                .await
                .map_err(cli_error)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Some(("dom", sub)) => {
            let tree = bridge
                .dom(fragment(sub).as_deref())
                .await
                .map_err(cli_error)?;
            let mut rendered = serde_json::to_string_pretty(&tree)?;
            if rendered.len() > DOM_PRINT_LIMIT {
                // Cut on a char boundary; the tree is ASCII JSON anyway.
                let cut = (0..=DOM_PRINT_LIMIT)
                    .rev()
                    .find(|i| rendered.is_char_boundary(*i))
                    .unwrap_or(0);
                rendered.truncate(cut);
                rendered.push_str("\n... (truncated)");
            }
            println!("{rendered}");
        }
        Some(("axtree", sub)) => {
            let tree = bridge
                .ax_tree(fragment(sub).as_deref())
                .await
                .map_err(cli_error)?;
            let nodes = tree
                .get("nodes")
                .and_then(serde_json::Value::as_array)
                .map(Vec::len)
                .unwrap_or(0);
            println!("Accessibility tree: {nodes} nodes");
        }
        Some(("agent", sub)) => {
            let task = sub.get_one::<String>("task").expect("required");
            let outcome = bridge
                .run_agent(task, fragment(sub).as_deref())
                .await
                .map_err(cli_error)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Some(("find", sub)) => {
            let prompt = sub.get_one::<String>("prompt").expect("required");
            let selector = bridge
                .find_element(prompt, fragment(sub).as_deref())
                .await
                .map_err(cli_error)?;
            println!("{selector}");
        }
        Some(("serve", sub)) => {
            let port = sub.get_one::<u16>("port").copied().unwrap_or(serve_port);
            serve(bridge, port).await?;
        }
        _ => {
            build_cli().print_help()?;
        }
    }

    Ok(())
}
