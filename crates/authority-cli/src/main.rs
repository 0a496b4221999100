//! Action Authority CLI — command-line client for the authority server.
//!
//! A standalone HTTP client: no dependency on `authority-core` or
//! `authority-server`, talks exclusively via the REST API so it can be
//! distributed and versioned independently.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";

/// Action Authority — control surface CLI for proposal submission,
/// attestation, dispatch, and forensic log inspection.
#[derive(Parser)]
#[command(
    name = "authority",
    version,
    about = "Action Authority CLI — submit proposals, attest, dispatch, and inspect the forensic log"
)]
struct Cli {
    /// Authority server address.
    #[arg(long, env = "AUTHORITY_ADDR", default_value = "http://127.0.0.1:8700")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a new action proposal.
    Propose {
        #[arg(long)]
        description: String,
        #[arg(long)]
        domain: String,
        #[arg(long)]
        bridge_type: String,
        /// Payload as a JSON string.
        #[arg(long)]
        payload: String,
        #[arg(long, default_value = "low")]
        risk_level: String,
        #[arg(long)]
        session_id: String,
        #[arg(long)]
        context_id: String,
        #[arg(long, default_value = "")]
        rationale: String,
    },
    /// Advance a proposal's FSM with an event.
    Advance {
        action_id: String,
        /// One of: show, hold_start, hold_end, hold_timeout, confirm, expire, reject.
        event: String,
    },
    /// Register an operator attestation against a work order.
    Attest {
        work_order_id: String,
        #[arg(long)]
        operator_id: String,
        #[arg(long)]
        rationale: Option<String>,
    },
    /// Dispatch an authorized work order, optionally attesting inline.
    Dispatch {
        work_order_id: String,
        #[arg(long)]
        operator_id: Option<String>,
        #[arg(long)]
        rationale: Option<String>,
    },
    /// Lease operations.
    Lease {
        #[command(subcommand)]
        action: LeaseCommands,
    },
    /// Switch the process-wide operational context.
    SwitchContext {
        #[arg(long)]
        context_id: String,
        #[arg(long)]
        source_hash: String,
    },
    /// Forensic log operations.
    Log {
        #[command(subcommand)]
        action: LogCommands,
    },
    /// Check server health.
    Health,
}

#[derive(Subcommand)]
enum LeaseCommands {
    /// Issue a new lease.
    Create {
        #[arg(long)]
        session_id: String,
        #[arg(long)]
        domain: String,
    },
    /// Look up a lease by id.
    Get { lease_id: String },
    /// Refresh a lease's heartbeat.
    Heartbeat { lease_id: String },
}

#[derive(Subcommand)]
enum LogCommands {
    /// Verify the hash chain is intact.
    Verify,
    /// Export every sealed entry.
    Export,
    /// Show entry count.
    Stats,
}

struct Client {
    http: reqwest::Client,
    addr: String,
}

impl Client {
    fn new(addr: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            addr,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.addr)
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let resp = self.http.get(self.url(path)).send().await.context("request failed")?;
        handle_response(resp).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let resp = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let body = resp.text().await.context("failed to read response body")?;
    if !status.is_success() {
        bail!("server returned {status}: {body}");
    }
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).context("failed to parse response JSON")
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let client = Client::new(cli.addr);

    match run(&client, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{RED}{BOLD}error:{RESET} {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(client: &Client, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Propose {
            description,
            domain,
            bridge_type,
            payload,
            risk_level,
            session_id,
            context_id,
            rationale,
        } => {
            let payload: Value = serde_json::from_str(&payload).context("payload must be valid JSON")?;
            let body = json!({
                "description": description,
                "domain": domain,
                "bridge_type": bridge_type,
                "payload": payload,
                "risk_level": risk_level,
                "session_id": session_id,
                "context_id": context_id,
                "rationale": rationale,
            });
            let result = client.post("/v1/proposals/", &body).await?;
            print_json(&result);
        }
        Commands::Advance { action_id, event } => {
            let body = json!({ "event": event });
            let result = client
                .post(&format!("/v1/proposals/{action_id}/advance"), &body)
                .await?;
            print_json(&result);
        }
        Commands::Attest {
            work_order_id,
            operator_id,
            rationale,
        } => {
            let body = json!({ "operator_id": operator_id, "rationale": rationale });
            let result = client
                .post(&format!("/v1/work-orders/{work_order_id}/attest"), &body)
                .await?;
            print_json(&result);
        }
        Commands::Dispatch {
            work_order_id,
            operator_id,
            rationale,
        } => {
            let body = json!({ "operator_id": operator_id, "rationale": rationale });
            let result = client
                .post(&format!("/v1/work-orders/{work_order_id}/dispatch"), &body)
                .await?;
            print_json(&result);
        }
        Commands::Lease { action } => match action {
            LeaseCommands::Create { session_id, domain } => {
                let body = json!({ "session_id": session_id, "domain": domain });
                let result = client.post("/v1/leases/", &body).await?;
                print_json(&result);
            }
            LeaseCommands::Get { lease_id } => {
                let result = client.get(&format!("/v1/leases/{lease_id}")).await?;
                print_json(&result);
            }
            LeaseCommands::Heartbeat { lease_id } => {
                let result = client
                    .post(&format!("/v1/leases/{lease_id}/heartbeat"), &Value::Null)
                    .await?;
                print_json(&result);
            }
        },
        Commands::SwitchContext { context_id, source_hash } => {
            let body = json!({ "context_id": context_id, "source_hash": source_hash });
            let result = client.post("/v1/context/switch", &body).await?;
            print_json(&result);
        }
        Commands::Log { action } => match action {
            LogCommands::Verify => {
                let result = client.get("/v1/forensic-log/verify").await?;
                print_json(&result);
            }
            LogCommands::Export => {
                let result = client.get("/v1/forensic-log/export").await?;
                print_json(&result);
            }
            LogCommands::Stats => {
                let result = client.get("/v1/forensic-log/stats").await?;
                print_json(&result);
            }
        },
        Commands::Health => {
            let result = client.get("/v1/health/").await?;
            print_json(&result);
        }
    }
    Ok(())
}

fn print_json(value: &Value) {
    #[allow(clippy::unwrap_used)]
    let pretty = serde_json::to_string_pretty(value).unwrap();
    println!("{GREEN}{pretty}{RESET}");
}
