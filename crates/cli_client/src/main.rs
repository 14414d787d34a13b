//! Antibrute CLI - administer and probe an antibrute server
//!
//! Prints `OK: ...`, `NOT OK: ...` (auth denied) or `FAIL: ...` and exits
//! with 0, 2 and 1 respectively.

mod client;
mod message_reader;

use anyhow::{bail, Result};
use antibrute_core::transport::{FingerprintVerifier, SkipVerification};
use antibrute_core::{AuthRequest, ClearBucketRequest, IpEntry, Request, Response};
use clap::{Parser, Subcommand};
use client::Client;
use rustls::client::danger::ServerCertVerifier;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Antibrute command-line client
#[derive(Parser, Debug)]
#[command(name = "antibrute")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Server address
    #[arg(short, long, env = "ANTIBRUTE_CONNECT", default_value = "127.0.0.1:50051")]
    connect: SocketAddr,

    /// Expected server certificate fingerprint (SHA-256, any separators)
    #[arg(short, long, env = "ANTIBRUTE_FINGERPRINT", conflicts_with = "insecure")]
    fingerprint: Option<String>,

    /// Accept any server certificate
    #[arg(long, default_value_t = false)]
    insecure: bool,

    /// Seconds to wait for each server reply
    #[arg(long, default_value_t = 3)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that auth is allowed for login, password and host ip
    Auth {
        login: String,
        password: String,
        ip: String,
    },
    /// Manage the blacklist
    Blacklist {
        #[command(subcommand)]
        action: ListAction,
    },
    /// Manage the whitelist
    Whitelist {
        #[command(subcommand)]
        action: ListAction,
    },
    /// Inspect or reset rate-limit buckets
    Bucket {
        #[command(subcommand)]
        action: BucketAction,
    },
}

#[derive(Subcommand, Debug)]
enum ListAction {
    /// Add a host ip or a subnet in CIDR notation
    Add { ip: String },
    /// Delete a host ip or a subnet in CIDR notation
    Delete { ip: String },
    /// Remove every entry
    Clear,
}

#[derive(Subcommand, Debug)]
enum BucketAction {
    /// Clear bucket(s); each flag takes a comma-separated list, ips may be subnets
    Clear {
        #[arg(long)]
        login: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        ip: Option<String>,
    },
    /// Show live bucket counts
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Black,
    White,
}

impl ListKind {
    fn name(self) -> &'static str {
        match self {
            ListKind::Black => "black",
            ListKind::White => "white",
        }
    }
}

/// Final verdict of one CLI invocation
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Ok(String),
    NotOk(String),
}

/// Work to perform: requests to send, and how to describe success
#[derive(Debug)]
enum Plan {
    Auth(AuthRequest),
    List {
        kind: ListKind,
        request: Request,
        done: String,
    },
    Clear(Vec<ClearBucketRequest>),
    Count,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(Outcome::Ok(message)) => {
            println!("OK: {}", message);
            ExitCode::SUCCESS
        }
        Ok(Outcome::NotOk(message)) => {
            println!("NOT OK: {}", message);
            ExitCode::from(2)
        }
        Err(e) => {
            println!("FAIL: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<Outcome> {
    // Validate locally before touching the network
    let plan = plan(args.command)?;
    let verifier = verifier(args.fingerprint.as_deref(), args.insecure)?;

    let mut client = Client::connect(args.connect, verifier, Duration::from_secs(args.timeout)).await?;
    let outcome = execute(&mut client, plan).await;
    client.close().await;
    outcome
}

fn verifier(fingerprint: Option<&str>, insecure: bool) -> Result<Arc<dyn ServerCertVerifier>> {
    match (fingerprint, insecure) {
        (Some(fp), _) => Ok(Arc::new(FingerprintVerifier::new(fp))),
        (None, true) => Ok(Arc::new(SkipVerification)),
        (None, false) => bail!("server fingerprint required (use --fingerprint or --insecure)"),
    }
}

fn plan(command: Command) -> Result<Plan> {
    Ok(match command {
        Command::Auth { login, password, ip } => {
            IpEntry::parse_host(&ip)?;
            Plan::Auth(AuthRequest::new(login, password, ip))
        }
        Command::Blacklist { action } => list_plan(ListKind::Black, action)?,
        Command::Whitelist { action } => list_plan(ListKind::White, action)?,
        Command::Bucket {
            action: BucketAction::Clear { login, password, ip },
        } => Plan::Clear(clear_requests(login.as_deref(), password.as_deref(), ip.as_deref())?),
        Command::Bucket {
            action: BucketAction::Count,
        } => Plan::Count,
    })
}

fn list_plan(kind: ListKind, action: ListAction) -> Result<Plan> {
    let (request, done) = match action {
        ListAction::Add { ip } => {
            IpEntry::parse(&ip)?;
            let done = format!("{} added in {} list", ip, kind.name());
            let request = match kind {
                ListKind::Black => Request::AddToBlackList { ip },
                ListKind::White => Request::AddToWhiteList { ip },
            };
            (request, done)
        }
        ListAction::Delete { ip } => {
            IpEntry::parse(&ip)?;
            let done = format!("{} deleted from {} list", ip, kind.name());
            let request = match kind {
                ListKind::Black => Request::RemoveFromBlackList { ip },
                ListKind::White => Request::RemoveFromWhiteList { ip },
            };
            (request, done)
        }
        ListAction::Clear => {
            let request = match kind {
                ListKind::Black => Request::ClearBlackList,
                ListKind::White => Request::ClearWhiteList,
            };
            (request, format!("{} list cleared", kind.name()))
        }
    };
    Ok(Plan::List { kind, request, done })
}

/// Split a comma-separated flag value, dropping blanks
fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// One clear request per listed value
fn clear_requests(
    login: Option<&str>,
    password: Option<&str>,
    ip: Option<&str>,
) -> Result<Vec<ClearBucketRequest>> {
    let mut requests = Vec::new();
    for login in split_list(login) {
        requests.push(ClearBucketRequest::default().login(login));
    }
    for password in split_list(password) {
        requests.push(ClearBucketRequest::default().password(password));
    }
    for ip in split_list(ip) {
        IpEntry::parse(&ip)?;
        requests.push(ClearBucketRequest::default().ip(ip));
    }
    if requests.is_empty() {
        bail!("at least one of --login, --password or --ip is required");
    }
    Ok(requests)
}

fn describe_clear(requests: &[ClearBucketRequest]) -> String {
    let parts: Vec<String> = requests
        .iter()
        .flat_map(|r| {
            [
                r.login_key().map(|v| format!("login={}", v)),
                r.password_key().map(|v| format!("password={}", v)),
                r.ip_key().map(|v| format!("ip={}", v)),
            ]
        })
        .flatten()
        .collect();
    let noun = if parts.len() > 1 { "buckets" } else { "bucket" };
    format!("clear {} for {}", noun, parts.join(", "))
}

async fn execute(client: &mut Client, plan: Plan) -> Result<Outcome> {
    match plan {
        Plan::Auth(req) => {
            let subject = format!(
                "auth for login={}, password={}, ip={}",
                req.login, req.password, req.ip
            );
            match client.call(Request::Auth(req)).await?.into_result()? {
                Response::Auth { ok: true } => Ok(Outcome::Ok(format!("{} is allowed", subject))),
                Response::Auth { ok: false } => {
                    Ok(Outcome::NotOk(format!("{} is NOT allowed", subject)))
                }
                other => bail!("unexpected response: {:?}", other),
            }
        }
        Plan::List { kind, request, done } => {
            tracing::debug!(list = kind.name(), request = request.name(), "Sending");
            expect_done(client.call(request).await?)?;
            Ok(Outcome::Ok(done))
        }
        Plan::Clear(requests) => {
            let description = describe_clear(&requests);
            for request in requests {
                expect_done(client.call(Request::ClearBucket(request)).await?)?;
            }
            Ok(Outcome::Ok(description))
        }
        Plan::Count => match client.call(Request::CountBuckets).await?.into_result()? {
            Response::BucketCounts(counts) => Ok(Outcome::Ok(format!(
                "buckets login={}, password={}, ip={}",
                counts.login, counts.password, counts.ip
            ))),
            other => bail!("unexpected response: {:?}", other),
        },
    }
}

fn expect_done(response: Response) -> Result<()> {
    match response.into_result()? {
        Response::Done => Ok(()),
        other => bail!("unexpected response: {:?}", other),
    }
}
