use std::sync::Arc;

use super::{FsHandler, FsUsage, FsUsageSampler, UsageWatcher};

/// Replaces the sampled base usage with what a pooled storage driver reports.
///
/// A successful overlay value `v` becomes the base usage and is added to the total.
/// If the watcher fails, the sampled snapshot is returned unchanged.
pub struct DriverUsageCorrector<H: FsHandler = FsUsageSampler> {
    inner: H,
    thin_pool: Option<(Arc<dyn UsageWatcher>, String)>,
    zfs: Option<(Arc<dyn UsageWatcher>, String)>,
}

impl<H: FsHandler> DriverUsageCorrector<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            thin_pool: None,
            zfs: None,
        }
    }

    /// Overlays the usage of thin-pool device `device_id`.
    pub fn with_thin_pool(mut self, watcher: Arc<dyn UsageWatcher>, device_id: String) -> Self {
        self.thin_pool = Some((watcher, device_id));
        self
    }

    /// Overlays the usage of ZFS filesystem `filesystem`.
    pub fn with_zfs(mut self, watcher: Arc<dyn UsageWatcher>, filesystem: String) -> Self {
        self.zfs = Some((watcher, filesystem));
        self
    }
}

fn overlay(usage: &mut FsUsage, watcher: &Option<(Arc<dyn UsageWatcher>, String)>, kind: &str) {
    let Some((watcher, id)) = watcher else {
        return;
    };
    match watcher.usage(id) {
        Ok(bytes) => {
            usage.base_usage_bytes = bytes;
            usage.total_usage_bytes += bytes;
        }
        Err(err) => log::trace!("unable to get {kind} usage of `{id}`: {err}"),
    }
}

impl<H: FsHandler> FsHandler for DriverUsageCorrector<H> {
    fn start(&self) {
        self.inner.start();
    }

    fn stop(&self) {
        self.inner.stop();
    }

    fn usage(&self) -> FsUsage {
        let mut usage = self.inner.usage();
        overlay(&mut usage, &self.thin_pool, "thin pool");
        overlay(&mut usage, &self.zfs, "zfs");
        usage
    }
}
