use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use waveline_core::WavelineClient;

use crate::config::SyncConfig;
use crate::progress::{LogProgressSink, SyncStatus};
use crate::settings::{
    Connection, JsonFileSettings, SettingsStore, clear_connection, load_connection,
    save_connection,
};
use crate::sync::debounce::DebounceBatcher;
use crate::sync::engine::{SyncEngine, SyncMessage};
use crate::sync::local_watcher::NotifyWatcher;
use crate::sync::pipeline::UploadPipeline;
use crate::sync::reconcile::SyncReconciler;
use crate::sync::registry::WatchRegistry;

pub struct DaemonRuntime {
    config: SyncConfig,
    connection: Connection,
    engine: SyncEngine,
    sink: Arc<LogProgressSink>,
    tx: mpsc::UnboundedSender<SyncMessage>,
    rx: mpsc::UnboundedReceiver<SyncMessage>,
}

impl DaemonRuntime {
    pub async fn bootstrap(config: SyncConfig) -> anyhow::Result<Self> {
        let store = JsonFileSettings::open(&config.settings_path);
        let Some(connection) = resolve_connection(&config, &store) else {
            anyhow::bail!(
                "not connected to a sync server; run with --connect SERVER KEY first"
            );
        };
        let client = WavelineClient::new(&connection.server, connection.api_key.clone())
            .with_context(|| format!("invalid server address {}", connection.server))?;
        let remote = Arc::new(client);

        let sink = Arc::new(LogProgressSink::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = WatchRegistry::load(
            Box::new(store),
            Box::new(NotifyWatcher::new(tx.clone())),
            sink.clone(),
        );
        let reconciler = SyncReconciler::new(remote.clone()).with_separator(&config.separator);
        let pipeline = UploadPipeline::new(remote, sink.clone())
            .with_pace(config.upload_pace)
            .with_separator(&config.separator);
        let batcher = DebounceBatcher::new(config.extensions.clone(), config.quiet_window);
        let engine = SyncEngine::new(registry, batcher, reconciler, pipeline, sink.clone());

        Ok(Self {
            config,
            connection,
            engine,
            sink,
            tx,
            rx,
        })
    }

    /// Handle for feeding the engine from outside, e.g. a UI process.
    pub fn sender(&self) -> mpsc::UnboundedSender<SyncMessage> {
        self.tx.clone()
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.sink.subscribe()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let Self {
            config,
            connection,
            mut engine,
            sink: _,
            tx,
            rx,
        } = self;

        let roots = engine.watch();
        info!(
            server = %connection.server,
            roots = roots.len(),
            quiet_window_ms = config.quiet_window.as_millis() as u64,
            upload_pace_ms = config.upload_pace.as_millis() as u64,
            "waveline-syncd started"
        );
        if roots.is_empty() {
            warn!("no watch roots configured; add one with --add DIR");
        }

        // The engine task resolves only after flushed batches finish uploading.
        let mut engine_task = tokio::spawn(engine.run(rx));
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("failed waiting for shutdown signal")?;
                info!("shutdown requested");
                let _ = tx.send(SyncMessage::Shutdown);
                engine_task.await.context("sync engine task failed")?;
            }
            res = &mut engine_task => {
                res.context("sync engine task failed")?;
            }
        }
        Ok(())
    }
}

/// Environment overrides win over the stored connection, value by value.
pub fn resolve_connection(config: &SyncConfig, store: &dyn SettingsStore) -> Option<Connection> {
    let stored = load_connection(store);
    let server = config
        .server_override
        .clone()
        .or_else(|| stored.as_ref().map(|c| c.server.clone()))?;
    let api_key = config
        .api_key_override
        .clone()
        .or_else(|| stored.map(|c| c.api_key))?;
    Some(Connection { server, api_key })
}

/// Registry for one-shot root edits. It never starts watching.
pub fn open_registry(config: &SyncConfig) -> WatchRegistry {
    let (tx, _rx) = mpsc::unbounded_channel();
    WatchRegistry::load(
        Box::new(JsonFileSettings::open(&config.settings_path)),
        Box::new(NotifyWatcher::new(tx)),
        Arc::new(LogProgressSink::new()),
    )
}

pub fn add_roots(config: &SyncConfig, dirs: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let roots = dirs
        .iter()
        .map(|dir| canonical_dir(dir))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(open_registry(config).add_roots(roots))
}

/// Directories that no longer exist are matched as given.
pub fn remove_roots(config: &SyncConfig, dirs: &[PathBuf]) -> Vec<PathBuf> {
    let roots: Vec<PathBuf> = dirs
        .iter()
        .map(|dir| std::fs::canonicalize(dir).unwrap_or_else(|_| dir.clone()))
        .collect();
    open_registry(config).remove_roots(&roots)
}

pub fn list_roots(config: &SyncConfig) -> Vec<PathBuf> {
    open_registry(config).roots().to_vec()
}

/// Checks the server answers with this key before saving the connection.
pub async fn connect(
    config: &SyncConfig,
    server: &str,
    api_key: &str,
) -> anyhow::Result<Connection> {
    let client = WavelineClient::new(server, api_key.to_string())
        .with_context(|| format!("invalid server address {server}"))?;
    client
        .ping()
        .await
        .with_context(|| format!("cannot reach {server}"))?;

    let connection = Connection {
        server: client.base_url().to_string(),
        api_key: api_key.to_string(),
    };
    let mut store = JsonFileSettings::open(&config.settings_path);
    save_connection(&mut store, &connection).context("failed to save connection")?;
    info!(server = %connection.server, "connected");
    Ok(connection)
}

/// Forgets the API key and every watch root.
pub fn disconnect(config: &SyncConfig) -> anyhow::Result<()> {
    let mut store = JsonFileSettings::open(&config.settings_path);
    clear_connection(&mut store).context("failed to clear connection")?;
    open_registry(config).clear();
    info!("disconnected");
    Ok(())
}

fn canonical_dir(dir: &Path) -> anyhow::Result<PathBuf> {
    let path = std::fs::canonicalize(dir)
        .with_context(|| format!("cannot resolve {}", dir.display()))?;
    if !path.is_dir() {
        anyhow::bail!("{} is not a directory", path.display());
    }
    Ok(path)
}

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;
