use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, UnixListener, UnixStream};
use tokio::sync::broadcast;

use relay_core::RelayConfig;

use crate::error::{io_err, DaemonError};
use crate::http::{router, AppState};
use crate::log_rotation::LogSink;
use crate::orchestrator::Orchestrator;
use crate::protocol::{parse_command, write_reply, ControlCommand, ControlReply};
use crate::vcs::GitVcs;

/// How often the log file is checked for rotation.
pub const ROTATION_INTERVAL: Duration = Duration::from_secs(60);

/// Output format for the log file layer. Stdout is always human-readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Start the daemon and block the current thread until it exits.
pub fn start_blocking(config: RelayConfig, format: LogFormat) -> Result<(), DaemonError> {
    let sink = init_tracing(&config.log_file, format)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config, Some(sink)))
}

/// Run the daemon: bootstrap every project once, then serve triggers until
/// ctrl-c or a `stop` on the control socket.
pub async fn run(config: RelayConfig, log_sink: Option<LogSink>) -> Result<(), DaemonError> {
    config.validate()?;
    ensure_runtime_dirs(&config)?;
    if config.password.is_empty() {
        tracing::warn!("no password configured; every trigger request will be denied");
    }

    let vcs = Arc::new(GitVcs::from_config(&config));
    let orchestrator = Arc::new(Orchestrator::from_config(&config, vcs));
    let started_at_unix = chrono::Utc::now().timestamp();

    if config.bootstrap {
        tracing::info!(projects = orchestrator.slots().len(), "bootstrap pass starting");
        orchestrator.bootstrap_all().await;
        tracing::info!("bootstrap pass finished");
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let config = Arc::new(config);

    let http_handle = {
        let shutdown = shutdown_tx.clone();
        let config = config.clone();
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            let result = http_server_task(config, orchestrator, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let config = config.clone();
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                config,
                orchestrator,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let result = log_rotation_task(log_sink, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (http_result, socket_result, rotation_result, signal_result) =
        tokio::join!(http_handle, socket_handle, rotation_handle, signal_handle);

    handle_join("http_server", http_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn http_server_task(
    config: Arc<RelayConfig>,
    orchestrator: Arc<Orchestrator>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let listen = config.listen;
    let listener = TcpListener::bind(listen)
        .await
        .map_err(|e| io_err(listen.to_string(), e))?;
    tracing::info!("server running on {listen}");

    let app = router(AppState::new(orchestrator, &config.password));
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
        .map_err(|e| io_err(listen.to_string(), e))
}

async fn socket_server_task(
    config: Arc<RelayConfig>,
    orchestrator: Arc<Orchestrator>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: i64,
) -> Result<(), DaemonError> {
    let socket = config.control_socket.clone();
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let config = config.clone();
                let orchestrator = orchestrator.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        config,
                        orchestrator,
                        shutdown_tx,
                        started_at_unix,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    config: Arc<RelayConfig>,
    orchestrator: Arc<Orchestrator>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: i64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err(&config.control_socket, e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let (reply, stop) = match parse_command(&line) {
            Ok(ControlCommand::Status) => (
                ControlReply::ok(build_status_payload(&config, &orchestrator, started_at_unix)),
                false,
            ),
            Ok(ControlCommand::Stop) => {
                tracing::info!("stop requested over control socket");
                let _ = shutdown_tx.send(());
                (ControlReply::ok(json!({ "stopping": true })), true)
            }
            Err(reply) => (reply, false),
        };

        write_reply(&mut writer, &reply)
            .await
            .map_err(|e| io_err(&config.control_socket, e))?;
        if stop {
            break;
        }
    }

    Ok(())
}

fn build_status_payload(config: &RelayConfig, orchestrator: &Orchestrator, started_at_unix: i64) -> Value {
    let projects: Vec<Value> = orchestrator
        .slots()
        .iter()
        .map(|slot| {
            let state = slot.state();
            let last_run = slot.last_run();
            json!({
                "name": slot.project().name,
                "running": state.is_locked(),
                "state": state.label(),
                "last_run_at_unix": last_run.as_ref().map(|r| r.at_unix),
                "last_outcome": last_run.map(|r| r.outcome),
            })
        })
        .collect();

    json!({
        "running": true,
        "listen": config.listen.to_string(),
        "started_at_unix": started_at_unix,
        "log_file": config.log_file.display().to_string(),
        "socket": config.control_socket.display().to_string(),
        "projects": projects,
    })
}

async fn log_rotation_task(
    sink: Option<LogSink>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let Some(sink) = sink else {
        let _ = shutdown_rx.recv().await;
        return Ok(());
    };

    let mut interval = tokio::time::interval(ROTATION_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick is immediate; startup rotation already happened.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let sink = sink.clone();
                let rotated = tokio::task::spawn_blocking(move || sink.rotate()).await;
                match rotated {
                    Ok(Ok(true)) => tracing::info!("log file rotated"),
                    Ok(Ok(false)) => {}
                    Ok(Err(err)) => tracing::warn!(error = %err, "log rotation failed"),
                    Err(err) => tracing::warn!(error = %err, "log rotation task failed"),
                }
            }
        }
    }
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "control socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale control socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(config: &RelayConfig) -> Result<(), DaemonError> {
    let mut dirs = vec![config.work_root.clone(), config.out_root.clone()];
    dirs.extend(config.projects().into_iter().map(|p| p.out_dir));
    if let Some(parent) = config.control_socket.parent() {
        dirs.push(parent.to_path_buf());
    }
    for dir in dirs {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// Install the global subscriber: human output on stdout plus an appending
/// file layer. The log file is rotated once before anything is written.
pub fn init_tracing(log_file: &Path, format: LogFormat) -> Result<LogSink, DaemonError> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter};

    let sink = LogSink::open(log_file).map_err(|e| io_err(log_file, e))?;
    let rotated = sink.rotate();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = format == LogFormat::Json;
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with((!json).then(|| {
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(sink.clone())
        }))
        .with(json.then(|| fmt::layer().json().with_writer(sink.clone())))
        .try_init();

    if let Err(err) = rotated {
        tracing::warn!(path = %sink.path().display(), error = %err, "startup log rotation failed");
    }
    Ok(sink)
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::tests::{orchestrator, project_in, FakeVcs};
    use crate::orchestrator::StatusSink;
    use relay_core::ProjectConfig;
    use tempfile::TempDir;

    fn config_in(tmp: &TempDir) -> RelayConfig {
        let mut config = RelayConfig::default_at(tmp.path());
        config.projects = vec![ProjectConfig::from("common"), ProjectConfig::from("ATITD")];
        config
    }

    #[test]
    fn runtime_dirs_cover_every_out_dir_and_socket_parent() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        tokio_test::assert_ok!(ensure_runtime_dirs(&config));

        assert!(config.work_root.is_dir());
        for project in config.projects() {
            assert!(project.out_dir.is_dir(), "{} missing", project.out_dir.display());
        }
        assert!(config.control_socket.parent().unwrap().is_dir());
    }

    #[tokio::test]
    async fn status_payload_reports_projects_in_order() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        let orch = orchestrator(
            vec![project_in(&tmp, "common"), project_in(&tmp, "ATITD")],
            Arc::new(FakeVcs::default()),
        );
        orch.run_update("ATITD", &StatusSink::log_only("ATITD".into()))
            .await
            .unwrap();

        let payload = build_status_payload(&config, &orch, 1_000_000);
        assert_eq!(payload["running"], json!(true));
        assert_eq!(payload["listen"], json!("0.0.0.0:4003"));
        assert_eq!(payload["started_at_unix"], json!(1_000_000));

        let projects = payload["projects"].as_array().expect("projects array");
        assert_eq!(projects[0]["name"], json!("common"));
        assert_eq!(projects[0]["state"], json!("idle"));
        assert_eq!(projects[0]["last_outcome"], Value::Null);
        assert_eq!(projects[1]["name"], json!("ATITD"));
        assert_eq!(projects[1]["last_outcome"], json!("published"));
        assert!(projects[1]["last_run_at_unix"].as_i64().is_some());
    }

    #[tokio::test]
    async fn control_socket_answers_status_and_stop() {
        let tmp = TempDir::new().unwrap();
        let mut config = config_in(&tmp);
        config.control_socket = tmp.path().join("relay.sock");
        let config = Arc::new(config);
        let orch = Arc::new(orchestrator(
            vec![project_in(&tmp, "common")],
            Arc::new(FakeVcs::default()),
        ));
        let (shutdown_tx, _) = broadcast::channel::<()>(4);

        let server = {
            let config = config.clone();
            let shutdown = shutdown_tx.clone();
            tokio::spawn(async move {
                socket_server_task(config, orch, shutdown.clone(), shutdown.subscribe(), 7).await
            })
        };

        let socket = config.control_socket.clone();
        let status = tokio::task::spawn_blocking({
            let socket = socket.clone();
            move || crate::protocol::request_status(&socket)
        })
        .await
        .unwrap()
        .expect("status");
        assert_eq!(status["started_at_unix"], json!(7));
        assert_eq!(status["projects"][0]["name"], json!("common"));

        tokio::task::spawn_blocking(move || crate::protocol::request_stop(&socket))
            .await
            .unwrap()
            .expect("stop");
        server.await.unwrap().expect("socket server exits cleanly");
        assert!(!config.control_socket.exists(), "socket removed on shutdown");
    }

    #[test]
    fn stale_socket_file_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let socket = tmp.path().join("relay.sock");
        fs::write(&socket, b"").unwrap();
        prepare_socket_for_bind(&socket).unwrap();
        assert!(!socket.exists());
    }
}
