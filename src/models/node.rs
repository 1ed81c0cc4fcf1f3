//! Node records produced by the node query parser.

use serde::Serialize;

use super::state::NodeState;

/// A compute node.
///
/// The node-oriented query prints one row per (node, partition) pair; the
/// parser merges those rows so `partitions` lists every membership.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Node {
    pub hostname: String,
    pub state: NodeState,
    pub partitions: Vec<String>,
    pub cpus_total: u32,
    pub cpus_allocated: u32,
    pub memory_total_bytes: u64,
    pub memory_free_bytes: u64,
    pub cpu_load: f64,
    pub gpus_total: u32,
    /// Filled from the scheduler's node detail, zero when unknown.
    pub gpus_allocated: u32,
}

impl Node {
    /// Allocated share of the node's CPUs, in percent.
    #[must_use]
    pub fn cpu_utilization(&self) -> f64 {
        if self.cpus_total == 0 {
            0.0
        } else {
            f64::from(self.cpus_allocated) / f64::from(self.cpus_total) * 100.0
        }
    }

    /// Allocated share of the node's GPUs, or `None` on GPU-less nodes.
    #[must_use]
    pub fn gpu_utilization(&self) -> Option<f64> {
        (self.gpus_total > 0).then(|| f64::from(self.gpus_allocated.min(self.gpus_total)) / f64::from(self.gpus_total) * 100.0)
    }

    #[must_use]
    pub fn in_partition(&self, name: &str) -> bool {
        self.partitions.iter().any(|p| p.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_utilization() {
        let node = Node {
            hostname: "c1".to_string(),
            cpus_total: 8,
            cpus_allocated: 2,
            ..Default::default()
        };
        assert_eq!(node.cpu_utilization(), 25.0);

        let empty = Node::default();
        assert_eq!(empty.cpu_utilization(), 0.0);
    }

    #[test]
    fn test_gpu_utilization() {
        let node = Node {
            gpus_total: 4,
            gpus_allocated: 3,
            ..Default::default()
        };
        assert_eq!(node.gpu_utilization(), Some(75.0));
        assert_eq!(Node::default().gpu_utilization(), None);
    }
}
