//! Lease/return of containers keyed by image, with idle eviction (component
//! C7, §4.5).
//!
//! Grounded on `agent_core::approval::ApprovalGate`'s pattern of a single
//! `parking_lot::Mutex`-guarded map serialising all mutating operations,
//! generalised from pending-approval entries to container leases. Docker
//! access goes through `bollard`, the only Docker Engine API client in the
//! retrieved corpus.

use bollard::container::{Config, RemoveContainerOptions};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("pool exhausted: no idle entry could be evicted")]
    Exhausted,
}

pub type Result<T> = std::result::Result<T, PoolError>;

/// Options narrowed from `SandboxConfig` that affect container creation.
#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    pub memory_bytes: Option<u64>,
    pub nano_cpus: Option<u64>,
    pub pids_limit: Option<u32>,
    pub network_mode: Option<String>,
}

struct Entry {
    container_id: String,
    image: String,
    in_use: bool,
    last_used: Instant,
}

/// A leased container handle returned by `acquire`. The pool tracks it by
/// `container_id`; this handle is the caller's capability to `execute` in it
/// and eventually `release` it.
#[derive(Debug, Clone)]
pub struct LeasedContainer {
    pub container_id: String,
    pub image: String,
}

struct PoolState {
    entries: HashMap<String, Entry>,
}

/// Default max pool size (§4.5).
pub const DEFAULT_MAX_SIZE: usize = 5;
/// Default idle timeout before a container is swept (§4.5).
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

pub struct ContainerPool {
    docker: Arc<Docker>,
    max_size: usize,
    idle_timeout: Duration,
    state: Mutex<PoolState>,
    stop_sweep: Arc<Notify>,
}

impl ContainerPool {
    pub fn new(docker: Arc<Docker>, max_size: usize, idle_timeout: Duration) -> Arc<Self> {
        let pool = Arc::new(Self {
            docker,
            max_size,
            idle_timeout,
            state: Mutex::new(PoolState { entries: HashMap::new() }),
            stop_sweep: Arc::new(Notify::new()),
        });
        pool.clone().spawn_sweeper();
        pool
    }

    fn spawn_sweeper(self: Arc<Self>) {
        let interval = self.idle_timeout / 2;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        self.sweep_idle().await;
                    }
                    _ = self.stop_sweep.notified() => {
                        break;
                    }
                }
            }
        });
    }

    async fn sweep_idle(&self) {
        let stale: Vec<String> = {
            let state = self.state.lock();
            let now = Instant::now();
            state
                .entries
                .values()
                .filter(|e| !e.in_use && now.duration_since(e.last_used) > self.idle_timeout)
                .map(|e| e.container_id.clone())
                .collect()
        };
        for id in stale {
            self.destroy_entry(&id).await;
        }
    }

    /// Returns an idle container matching `image`, or creates a new one,
    /// evicting the LRU idle entry if the pool is full (§4.5).
    pub async fn acquire(&self, image: &str, opts: &AcquireOptions) -> Result<LeasedContainer> {
        // Pull first (outside the lock; image pulls are slow and don't touch pool state).
        self.ensure_image(image).await?;

        let reuse_id = {
            let mut state = self.state.lock();
            let candidate = state
                .entries
                .values()
                .find(|e| !e.in_use && e.image == image)
                .map(|e| e.container_id.clone());
            if let Some(id) = &candidate {
                if let Some(entry) = state.entries.get_mut(id) {
                    entry.in_use = true;
                    entry.last_used = Instant::now();
                }
            }
            candidate
        };
        if let Some(id) = reuse_id {
            debug!(container_id = %id, image, "reusing idle container");
            return Ok(LeasedContainer { container_id: id, image: image.to_string() });
        }

        self.evict_if_full().await?;

        let container_id = self.create_container(image, opts).await?;
        self.docker
            .start_container::<String>(&container_id, None)
            .await?;

        self.state.lock().entries.insert(
            container_id.clone(),
            Entry { container_id: container_id.clone(), image: image.to_string(), in_use: true, last_used: Instant::now() },
        );
        Ok(LeasedContainer { container_id, image: image.to_string() })
    }

    /// Marks `container` idle, or destroys it if the caller reports
    /// corruption (§4.4, §4.5).
    pub async fn release(&self, container: &LeasedContainer, corrupted: bool) {
        if corrupted {
            self.destroy_entry(&container.container_id).await;
            return;
        }
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.get_mut(&container.container_id) {
            entry.in_use = false;
            entry.last_used = Instant::now();
        }
    }

    async fn evict_if_full(&self) -> Result<()> {
        let full = self.state.lock().entries.len() >= self.max_size;
        if !full {
            return Ok(());
        }
        let lru = {
            let state = self.state.lock();
            state
                .entries
                .values()
                .filter(|e| !e.in_use)
                .min_by_key(|e| e.last_used)
                .map(|e| e.container_id.clone())
        };
        match lru {
            Some(id) => {
                self.destroy_entry(&id).await;
                Ok(())
            }
            None => Err(PoolError::Exhausted),
        }
    }

    async fn destroy_entry(&self, container_id: &str) {
        self.state.lock().entries.remove(container_id);
        if let Err(err) = self
            .docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions { force: true, ..Default::default() }),
            )
            .await
        {
            warn!(container_id, error = %err, "failed to remove container (best-effort)");
        }
    }

    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }
        let mut stream = self.docker.create_image(
            Some(CreateImageOptions { from_image: image, ..Default::default() }),
            None,
            None,
        );
        while let Some(progress) = stream.next().await {
            progress?;
        }
        Ok(())
    }

    async fn create_container(&self, image: &str, opts: &AcquireOptions) -> Result<String> {
        let host_config = bollard::models::HostConfig {
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges".to_string()]),
            memory: opts.memory_bytes.map(|b| b as i64),
            nano_cpus: opts.nano_cpus.map(|n| n as i64),
            pids_limit: opts.pids_limit.map(|p| p as i64),
            network_mode: opts.network_mode.clone(),
            ..Default::default()
        };
        let config = Config {
            image: Some(image.to_string()),
            working_dir: Some("/workspace".to_string()),
            tty: Some(false),
            host_config: Some(host_config),
            ..Default::default()
        };
        let response = self.docker.create_container::<&str, &str>(None, config).await?;
        Ok(response.id)
    }

    /// Stops the sweeper and tears down every container (§4.5).
    pub async fn destroy_all(&self) {
        self.stop_sweep.notify_one();
        let ids: Vec<String> = self.state.lock().entries.keys().cloned().collect();
        for id in ids {
            self.destroy_entry(&id).await;
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn in_use_count(&self) -> usize {
        self.state.lock().entries.values().filter(|e| e.in_use).count()
    }

    /// Exposes the underlying Docker handle so the container executor can
    /// issue exec calls against leased containers.
    pub fn docker_handle(&self) -> Arc<Docker> {
        self.docker.clone()
    }
}
