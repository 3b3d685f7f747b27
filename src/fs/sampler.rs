use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{FsHandler, FsUsage, Result, walk};

/// Walks longer than this are logged.
const SLOW_WALK: Duration = Duration::from_secs(1);

/// Background sampler of a container's disk usage.
///
/// The root filesystem directory contributes to base and total usage and to the
/// inode count, the extra directory (container logs) to the total only.
pub struct FsUsageSampler {
    shared: Arc<Shared>,
    task: Mutex<Option<CancellationToken>>,
}

struct Shared {
    rootfs: Option<PathBuf>,
    extra: Option<PathBuf>,
    period: Duration,
    usage: RwLock<FsUsage>,
}

impl FsUsageSampler {
    pub fn new(period: Duration, rootfs: Option<PathBuf>, extra: Option<PathBuf>) -> Self {
        Self {
            shared: Arc::new(Shared {
                rootfs,
                extra,
                period,
                usage: RwLock::new(FsUsage::default()),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Shared {
    fn sample(&self) -> Result<FsUsage> {
        let before = Instant::now();
        let mut usage = FsUsage::default();
        if let Some(rootfs) = &self.rootfs {
            let dir = walk::dir_usage(rootfs)?;
            usage.base_usage_bytes = dir.bytes;
            usage.total_usage_bytes = dir.bytes;
            usage.inode_usage = dir.inodes;
        }
        if let Some(extra) = &self.extra {
            usage.total_usage_bytes += walk::dir_usage(extra)?.bytes;
        }

        let took = before.elapsed();
        if took > SLOW_WALK {
            log::debug!(
                "fs usage of `{}` and `{}` took {:?}",
                display_opt(&self.rootfs),
                display_opt(&self.extra),
                took
            );
        }
        Ok(usage)
    }

    /// Publishes a sample unless sampling was stopped in the meantime.
    fn store(&self, usage: FsUsage, token: &CancellationToken) {
        let mut slot = self.usage.write().unwrap_or_else(PoisonError::into_inner);
        if !token.is_cancelled() {
            *slot = usage;
        }
    }
}

fn display_opt(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

async fn run(shared: Arc<Shared>, token: CancellationToken) {
    let mut interval = tokio::time::interval(shared.period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }

        let sampling = Arc::clone(&shared);
        let result = tokio::select! {
            _ = token.cancelled() => break,
            result = tokio::task::spawn_blocking(move || sampling.sample()) => result,
        };
        match result {
            Ok(Ok(usage)) => shared.store(usage, &token),
            Ok(Err(err)) => log::debug!("failed to collect filesystem usage: {err}"),
            Err(err) => log::error!("filesystem usage sampling panicked: {err}"),
        }
    }
    log::trace!("stopped filesystem usage sampling of `{}`", display_opt(&shared.rootfs));
}

impl FsHandler for FsUsageSampler {
    fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return;
        }
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                log::error!("cannot start filesystem usage sampling: {err}");
                return;
            }
        };

        let token = CancellationToken::new();
        handle.spawn(run(Arc::clone(&self.shared), token.clone()));
        *task = Some(token);
    }

    fn stop(&self) {
        let Some(token) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };
        let _slot = self
            .shared
            .usage
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        token.cancel();
    }

    fn usage(&self) -> FsUsage {
        *self
            .shared
            .usage
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for FsUsageSampler {
    fn drop(&mut self) {
        self.stop();
    }
}
