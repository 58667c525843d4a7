use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinSet};

use sheetrows::config::parse_seconds;
use sheetrows::{dispatch_json, init_tracing, AppState, CommandError, RowStore, StoreConfig};

#[derive(Parser, Debug)]
#[command(name = "sheetrows", about = "Concurrent row store over spreadsheet files", version)]
struct Cli {
    /// Directory holding the workbooks (overrides EXCEL_ROOT_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Seconds to wait for a file lock (overrides LOCK_TIMEOUT)
    #[arg(long, global = true)]
    lock_timeout: Option<String>,

    /// Log filter directive (overrides LOG_LEVEL)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print service status and the lock table
    Status,
    /// List spreadsheet files in the data directory
    Files,
    /// List the sheets of one workbook
    Sheets { file: String },
    /// Run a single JSON request, e.g. '{"op":"read","file":"staff.xlsx"}'
    Exec { request: String },
    /// Serve JSON-lines requests on stdin, one response line per request
    Stdio,
}

fn load_config(cli: &Cli) -> sheetrows::Result<StoreConfig> {
    let mut config = StoreConfig::from_env()?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(raw) = &cli.lock_timeout {
        config.lock.timeout = parse_seconds("--lock-timeout", raw)?;
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    Ok(config)
}

fn render(result: Result<Value, CommandError>) -> Value {
    match result {
        Ok(value) => value,
        Err(e) => json!({
            "success": false,
            "error": e,
        }),
    }
}

async fn run_request(state: &AppState, line: &str) -> Value {
    let request: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            return json!({
                "success": false,
                "error": { "message": format!("Invalid JSON: {}", e), "kind": "invalid_argument", "status": 400 },
            })
        }
    };

    let id = request.get("id").cloned();
    let mut response = render(dispatch_json(state, &request).await);
    if let (Some(id), Some(obj)) = (id, response.as_object_mut()) {
        obj.insert("id".to_string(), id);
    }
    response
}

/// Handle each input line on its own task; responses are written as they
/// complete. Returns the writer once every request has been answered.
async fn serve_lines<R, W>(state: Arc<AppState>, input: R, output: W) -> std::io::Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let output = Arc::new(Mutex::new(output));
    let mut lines = input.lines();
    let mut tasks = JoinSet::new();

    while let Some(line) = lines.next_line().await? {
        while let Some(done) = tasks.try_join_next() {
            log_task_result(done);
        }
        if line.trim().is_empty() {
            continue;
        }

        let state = Arc::clone(&state);
        let output = Arc::clone(&output);
        tasks.spawn(async move {
            let response = run_request(&state, &line).await;
            let mut out = output.lock().await;
            let text = format!("{}\n", response);
            if let Err(e) = out.write_all(text.as_bytes()).await {
                tracing::error!(error = %e, "Failed to write response");
            }
            if let Err(e) = out.flush().await {
                tracing::error!(error = %e, "Failed to flush response");
            }
        });
    }

    while let Some(done) = tasks.join_next().await {
        log_task_result(done);
    }

    Arc::try_unwrap(output)
        .map(Mutex::into_inner)
        .map_err(|_| std::io::Error::other("response writer still shared"))
}

fn log_task_result(result: Result<(), JoinError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "Request task failed");
    }
}

async fn serve_stdio(state: Arc<AppState>) -> std::io::Result<()> {
    serve_lines(state, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
    Ok(())
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", value),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.log_level);

    let store = match RowStore::new(config) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start row store");
            return ExitCode::FAILURE;
        }
    };
    let state = Arc::new(AppState::new(store));

    let request = match cli.command {
        Command::Status => json!({ "op": "status" }),
        Command::Files => json!({ "op": "files" }),
        Command::Sheets { file } => json!({ "op": "sheets", "file": file }),
        Command::Exec { request } => {
            let response = run_request(&state, &request).await;
            let ok = response.get("success").and_then(Value::as_bool) != Some(false);
            print_json(&response);
            return if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE };
        }
        Command::Stdio => {
            return match serve_stdio(state).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!(error = %e, "stdin closed with error");
                    ExitCode::FAILURE
                }
            };
        }
    };

    let result = dispatch_json(&state, &request).await;
    let ok = result.is_ok();
    print_json(&render(result));
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
