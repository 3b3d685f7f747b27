use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use super::Error;

/// A family of metrics that can be switched off independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Cpu,
    Memory,
    Network,
    DiskUsage,
    DiskIo,
    CpuLoad,
    Process,
}

impl MetricKind {
    pub const ALL: [MetricKind; 7] = [
        MetricKind::Cpu,
        MetricKind::Memory,
        MetricKind::Network,
        MetricKind::DiskUsage,
        MetricKind::DiskIo,
        MetricKind::CpuLoad,
        MetricKind::Process,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Memory => "memory",
            MetricKind::Network => "network",
            MetricKind::DiskUsage => "disk",
            MetricKind::DiskIo => "diskIO",
            MetricKind::CpuLoad => "cpuLoad",
            MetricKind::Process => "process",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::InvalidMetricKind(s.to_owned()))
    }
}

/// The set of metric families a handler should collect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricSet(HashSet<MetricKind>);

impl MetricSet {
    /// Every known metric family.
    pub fn all() -> Self {
        MetricKind::ALL.into_iter().collect()
    }

    pub fn has(&self, kind: MetricKind) -> bool {
        self.0.contains(&kind)
    }

    /// Returns a copy of the set with the given kinds removed.
    pub fn without(&self, disabled: impl IntoIterator<Item = MetricKind>) -> Self {
        let mut out = self.clone();
        for kind in disabled {
            out.0.remove(&kind);
        }
        out
    }
}

impl FromIterator<MetricKind> for MetricSet {
    fn from_iter<I: IntoIterator<Item = MetricKind>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
