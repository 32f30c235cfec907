/*!
 * Hardware Topology
 * Core counts, performance/efficiency partition and NUMA layout
 */

use crate::core::types::CoreSet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const CPU_SYSFS: &str = "/sys/devices/system/cpu";
const NODE_SYSFS: &str = "/sys/devices/system/node";
const HYBRID_CORE_CPUS: &str = "/sys/devices/cpu_core/cpus";
const HYBRID_ATOM_CPUS: &str = "/sys/devices/cpu_atom/cpus";

/// Static description of the host CPU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareTopology {
    pub logical_cores: usize,
    /// Empty when the host has no hybrid partition
    pub performance_cores: CoreSet,
    pub efficiency_cores: CoreSet,
    /// One core set per NUMA node
    pub numa_nodes: Vec<CoreSet>,
}

impl HardwareTopology {
    /// Homogeneous host with a single NUMA node
    pub fn uniform(logical_cores: usize) -> Self {
        let logical_cores = logical_cores.max(1);
        Self {
            logical_cores,
            performance_cores: CoreSet::default(),
            efficiency_cores: CoreSet::default(),
            numa_nodes: vec![CoreSet::all(logical_cores)],
        }
    }

    /// Hybrid host: performance cores first, efficiency cores after them
    pub fn hybrid(performance: usize, efficiency: usize) -> Self {
        let logical_cores = (performance + efficiency).max(1);
        Self {
            logical_cores,
            performance_cores: CoreSet::new(0..performance),
            efficiency_cores: CoreSet::new(performance..logical_cores),
            numa_nodes: vec![CoreSet::all(logical_cores)],
        }
    }

    pub fn with_numa_nodes(mut self, nodes: Vec<CoreSet>) -> Self {
        if !nodes.is_empty() {
            self.numa_nodes = nodes;
        }
        self
    }

    /// Probe sysfs, falling back to a uniform layout
    pub fn detect() -> Self {
        let logical_cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let mut topology = Self::uniform(logical_cores);

        if let Some((performance, efficiency)) = detect_partition(logical_cores) {
            topology.performance_cores = performance;
            topology.efficiency_cores = efficiency;
        }
        let nodes = detect_numa_nodes();
        topology = topology.with_numa_nodes(nodes);

        info!(
            logical_cores = topology.logical_cores,
            performance = %topology.performance_cores,
            efficiency = %topology.efficiency_cores,
            numa_nodes = topology.numa_nodes.len(),
            "Hardware topology detected"
        );
        topology
    }

    pub fn is_hybrid(&self) -> bool {
        !self.performance_cores.is_empty() && !self.efficiency_cores.is_empty()
    }

    pub fn numa_node_count(&self) -> usize {
        self.numa_nodes.len()
    }

    pub fn all_cores(&self) -> CoreSet {
        CoreSet::all(self.logical_cores)
    }

    /// Cores a foreground process may use
    pub fn foreground_cores(&self) -> CoreSet {
        self.all_cores()
    }

    /// Cores background processes are confined to
    ///
    /// Efficiency cores on hybrid hosts, otherwise the upper half of the
    /// machine; hosts with fewer than four cores share everything.
    pub fn background_cores(&self) -> CoreSet {
        if self.is_hybrid() {
            return self.efficiency_cores.clone();
        }
        if self.logical_cores < 4 {
            return self.all_cores();
        }
        CoreSet::new(self.logical_cores / 2..self.logical_cores)
    }

    /// Cores latency-sensitive threads are pinned to
    pub fn performance_or_all(&self) -> CoreSet {
        if self.performance_cores.is_empty() {
            self.all_cores()
        } else {
            self.performance_cores.clone()
        }
    }

    /// NUMA node holding most of `cores`, ties going to the lower node
    pub fn preferred_numa_node(&self, cores: &CoreSet) -> Option<usize> {
        if self.numa_nodes.len() <= 1 {
            return None;
        }
        self.numa_nodes
            .iter()
            .enumerate()
            .map(|(node, set)| (node, set.intersection(cores).len()))
            .filter(|(_, overlap)| *overlap > 0)
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
            .map(|(node, _)| node)
    }
}

impl Default for HardwareTopology {
    fn default() -> Self {
        Self::uniform(1)
    }
}

/// Parse a sysfs cpulist such as `0-3,8,10-11`
pub fn parse_cpu_list(list: &str) -> CoreSet {
    let mut cores = Vec::new();
    for part in list.trim().split(',').filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                if let (Ok(start), Ok(end)) = (start.trim().parse::<usize>(), end.trim().parse::<usize>()) {
                    cores.extend(start..=end);
                }
            }
            None => {
                if let Ok(core) = part.trim().parse::<usize>() {
                    cores.push(core);
                }
            }
        }
    }
    CoreSet::new(cores)
}

fn read_cpu_list(path: impl AsRef<Path>) -> Option<CoreSet> {
    fs::read_to_string(path)
        .ok()
        .map(|s| parse_cpu_list(&s))
        .filter(|set| !set.is_empty())
}

fn detect_partition(logical_cores: usize) -> Option<(CoreSet, CoreSet)> {
    if let (Some(p), Some(e)) = (read_cpu_list(HYBRID_CORE_CPUS), read_cpu_list(HYBRID_ATOM_CPUS)) {
        debug!("Hybrid partition read from PMU device lists");
        return Some((p, e));
    }

    // Fall back to per-core maximum frequency
    let freqs: Vec<(usize, u64)> = (0..logical_cores)
        .filter_map(|cpu| {
            let path = format!("{}/cpu{}/cpufreq/cpuinfo_max_freq", CPU_SYSFS, cpu);
            fs::read_to_string(path)
                .ok()
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(|f| (cpu, f))
        })
        .collect();
    partition_by_frequency(&freqs)
}

/// Cores below the top frequency are efficiency cores
pub(crate) fn partition_by_frequency(freqs: &[(usize, u64)]) -> Option<(CoreSet, CoreSet)> {
    let max = freqs.iter().map(|(_, f)| *f).max()?;
    let performance: CoreSet = freqs.iter().filter(|(_, f)| *f == max).map(|(c, _)| *c).collect();
    let efficiency: CoreSet = freqs.iter().filter(|(_, f)| *f < max).map(|(c, _)| *c).collect();
    if efficiency.is_empty() {
        None
    } else {
        Some((performance, efficiency))
    }
}

fn detect_numa_nodes() -> Vec<CoreSet> {
    let Ok(entries) = fs::read_dir(NODE_SYSFS) else {
        return Vec::new();
    };
    let mut nodes: Vec<(usize, CoreSet)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let index = name.strip_prefix("node")?.parse::<usize>().ok()?;
            let cores = read_cpu_list(entry.path().join("cpulist"))?;
            Some((index, cores))
        })
        .collect();
    nodes.sort_by_key(|(index, _)| *index);
    nodes.into_iter().map(|(_, cores)| cores).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_list() {
        assert_eq!(parse_cpu_list("0-3,8,10-11\n"), CoreSet::new([0, 1, 2, 3, 8, 10, 11]));
        assert!(parse_cpu_list("").is_empty());
        assert_eq!(parse_cpu_list("5"), CoreSet::new([5]));
    }

    #[test]
    fn test_hybrid_background_uses_efficiency_cores() {
        let topo = HardwareTopology::hybrid(4, 4);
        assert!(topo.is_hybrid());
        assert_eq!(topo.background_cores(), CoreSet::new(4..8));
        assert_eq!(topo.foreground_cores(), CoreSet::all(8));
        assert_eq!(topo.performance_or_all(), CoreSet::new(0..4));
    }

    #[test]
    fn test_uniform_background_upper_half() {
        assert_eq!(HardwareTopology::uniform(8).background_cores(), CoreSet::new(4..8));
        assert_eq!(HardwareTopology::uniform(2).background_cores(), CoreSet::all(2));
    }

    #[test]
    fn test_partition_by_frequency() {
        let (p, e) = partition_by_frequency(&[(0, 5000), (1, 5000), (2, 3800), (3, 3800)]).unwrap();
        assert_eq!(p, CoreSet::new([0, 1]));
        assert_eq!(e, CoreSet::new([2, 3]));
        assert!(partition_by_frequency(&[(0, 3000), (1, 3000)]).is_none());
    }

    #[test]
    fn test_preferred_numa_node() {
        let topo = HardwareTopology::uniform(8)
            .with_numa_nodes(vec![CoreSet::new(0..4), CoreSet::new(4..8)]);
        assert_eq!(topo.preferred_numa_node(&CoreSet::new([3, 4, 5])), Some(1));
        assert_eq!(topo.preferred_numa_node(&CoreSet::new([1, 2, 5, 6])), Some(0));
        assert_eq!(HardwareTopology::uniform(8).preferred_numa_node(&CoreSet::all(8)), None);
    }
}
