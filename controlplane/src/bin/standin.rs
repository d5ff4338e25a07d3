//! Stand-in for etcd and kube-apiserver
//!
//! Understands just enough of both command lines to bind the requested
//! address, answer `GET /healthz` and log the line the real binary logs once
//! it is serving. Extra `--standin-*` flags select misbehaviour for tests.

use anyhow::{Context, Result, bail};
use axum::{Router, routing::get};
use clap::{Parser, ValueEnum};
use shared::logging::init_tracing;
use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Behavior {
    /// Serve and announce readiness
    Ready,
    /// Never announce readiness
    Silent,
    /// Exit right away with `--standin-exit-code`
    Exit,
    /// Like `ready`, but ignore SIGTERM
    Stubborn,
}

#[derive(Parser, Debug)]
#[command(name = "controlplane-standin")]
#[command(about = "Impersonates etcd or kube-apiserver for fixture tests")]
struct Args {
    /// etcd: client URLs to serve on (the first one is used)
    #[arg(long)]
    listen_client_urls: Option<String>,

    /// kube-apiserver: insecure listener address
    #[arg(long)]
    insecure_bind_address: Option<String>,

    /// kube-apiserver: insecure listener port
    #[arg(long)]
    insecure_port: Option<u16>,

    #[arg(long, value_enum, default_value_t = Behavior::Ready)]
    standin_behavior: Behavior,

    #[arg(long, default_value_t = 1)]
    standin_exit_code: i32,

    /// Replace the role's readiness line
    #[arg(long)]
    standin_ready_message: Option<String>,

    /// Write the readiness line in two chunks, neither newline-terminated
    #[arg(long)]
    standin_split_marker: bool,

    #[arg(long)]
    standin_log_level: Option<String>,
}

const KNOWN_FLAGS: &[&str] = &[
    "--listen-client-urls",
    "--insecure-bind-address",
    "--insecure-port",
    "--standin-behavior",
    "--standin-exit-code",
    "--standin-ready-message",
    "--standin-split-marker",
    "--standin-log-level",
];

/// Keep only the flags this binary understands; etcd and kube-apiserver take
/// dozens more that are irrelevant here
fn known_args<I: IntoIterator<Item = String>>(raw: I) -> Vec<String> {
    let mut raw = raw.into_iter();
    let mut kept: Vec<String> = raw.next().into_iter().collect();
    let mut take_value = false;

    for arg in raw {
        if take_value {
            kept.push(arg);
            take_value = false;
            continue;
        }
        let key = arg.split_once('=').map_or(arg.as_str(), |(key, _)| key);
        if KNOWN_FLAGS.contains(&key) {
            take_value = !arg.contains('=') && key != "--standin-split-marker";
            kept.push(arg);
        }
    }
    kept
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Role {
    Etcd { scheme: String },
    ApiServer,
}

impl Role {
    fn ready_line(&self, addr: SocketAddr) -> String {
        match self {
            Role::Etcd { scheme } if scheme == "https" || scheme == "unixs" => {
                format!("embed: serving client requests on {addr}")
            }
            Role::Etcd { .. } => {
                format!("embed: serving insecure client requests on {addr}, this is strongly discouraged!")
            }
            Role::ApiServer => format!("Serving insecurely on {addr}"),
        }
    }
}

fn listen_target(args: &Args) -> Result<(Role, String)> {
    if let Some(urls) = &args.listen_client_urls {
        let first = urls.split(',').next().unwrap_or_default();
        let url = Url::parse(first).with_context(|| format!("invalid --listen-client-urls {urls:?}"))?;
        let host = url.host_str().context("--listen-client-urls has no host")?;
        let port = url.port_or_known_default().context("--listen-client-urls has no port")?;
        return Ok((
            Role::Etcd {
                scheme: url.scheme().to_string(),
            },
            format!("{host}:{port}"),
        ));
    }

    if let Some(port) = args.insecure_port {
        let host = args.insecure_bind_address.as_deref().unwrap_or("127.0.0.1");
        return Ok((Role::ApiServer, format!("{host}:{port}")));
    }

    bail!("need --listen-client-urls (etcd) or --insecure-port (kube-apiserver)")
}

async fn announce(line: &str, split: bool) -> Result<()> {
    let mut stderr = std::io::stderr();
    if split {
        let mid = (0..=line.len() / 4).rev().find(|i| line.is_char_boundary(*i)).unwrap_or(0);
        let (head, tail) = line.split_at(mid);
        stderr.write_all(head.as_bytes())?;
        stderr.flush()?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        stderr.write_all(tail.as_bytes())?;
    } else {
        writeln!(stderr, "{line}")?;
    }
    stderr.flush()?;
    Ok(())
}

#[cfg(unix)]
fn ignore_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terms = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::spawn(async move {
        while terms.recv().await.is_some() {
            warn!("ignoring SIGTERM");
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn ignore_sigterm() -> Result<()> {
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_from(known_args(std::env::args()));
    init_tracing(args.standin_log_level.as_deref());

    match args.standin_behavior {
        Behavior::Exit => {
            eprintln!("standin: simulated failure, exiting with code {}", args.standin_exit_code);
            std::process::exit(args.standin_exit_code);
        }
        Behavior::Silent => {
            info!("standin staying silent");
            std::future::pending::<()>().await;
        }
        Behavior::Stubborn => ignore_sigterm()?,
        Behavior::Ready => {}
    }

    let (role, target) = listen_target(&args)?;
    let listener = TcpListener::bind(&target)
        .await
        .with_context(|| format!("failed to bind {target}"))?;
    let addr = listener.local_addr()?;
    info!("standin {:?} listening on {}", role, addr);

    let router = Router::new().route("/healthz", get(|| async { "ok" }));
    let server = tokio::spawn(async move { axum::serve(listener, router).await });

    let line = args.standin_ready_message.clone().unwrap_or_else(|| role.ready_line(addr));
    announce(&line, args.standin_split_marker).await?;

    server.await?.context("server error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        known_args(raw.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_unknown_flags_are_dropped() {
        let kept = args(&[
            "standin",
            "--listen-peer-urls=http://localhost:0",
            "--listen-client-urls=http://127.0.0.1:2379",
            "--data-dir=/tmp/x",
            "--standin-split-marker",
            "--standin-behavior",
            "silent",
            "--etcd-servers=",
        ]);
        assert_eq!(
            kept,
            vec![
                "standin",
                "--listen-client-urls=http://127.0.0.1:2379",
                "--standin-split-marker",
                "--standin-behavior",
                "silent",
            ]
        );
    }

    #[test]
    fn test_etcd_target_from_client_urls() {
        let parsed = Args::parse_from(args(&["standin", "--listen-client-urls=http://127.0.0.1:2379"]));
        let (role, target) = listen_target(&parsed).unwrap();
        assert_eq!(target, "127.0.0.1:2379");
        assert_eq!(
            role.ready_line("127.0.0.1:2379".parse().unwrap()),
            "embed: serving insecure client requests on 127.0.0.1:2379, this is strongly discouraged!"
        );
    }

    #[test]
    fn test_api_server_target_from_insecure_flags() {
        let parsed = Args::parse_from(args(&[
            "standin",
            "--insecure-port=8080",
            "--insecure-bind-address=127.0.0.1",
            "--secure-port=0",
        ]));
        let (role, target) = listen_target(&parsed).unwrap();
        assert_eq!(role, Role::ApiServer);
        assert_eq!(target, "127.0.0.1:8080");
    }

    #[test]
    fn test_no_listener_flags_is_an_error() {
        let parsed = Args::parse_from(args(&["standin"]));
        assert!(listen_target(&parsed).is_err());
    }
}
