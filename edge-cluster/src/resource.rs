//! Resource model for edge nodes and workloads.
//!
//! Nodes describe their hardware with a [`ResourceCapacity`] and track what is
//! still free as a [`ResourceShare`] of percentages. Workloads describe what
//! they need with a [`ResourceRequirement`], which is converted into a share of
//! a particular node's capacity before it is reserved.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tolerance used when comparing percentages that went through
/// repeated deduct/release arithmetic.
const PERCENT_EPSILON: f64 = 1e-9;

/// Upper bound of every percentage.
pub const FULL_PERCENT: f64 = 100.0;

/// Resource dimension tracked for every node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceDimension {
    /// CPU cores
    Cpu,
    /// Memory in GB
    Memory,
    /// Storage in GB
    Storage,
    /// Network bandwidth in Mbps
    Network,
    /// GPU devices
    Gpu,
}

impl ResourceDimension {
    /// All dimensions in a fixed order
    pub const ALL: [ResourceDimension; 5] = [
        ResourceDimension::Cpu,
        ResourceDimension::Memory,
        ResourceDimension::Storage,
        ResourceDimension::Network,
        ResourceDimension::Gpu,
    ];

    fn index(self) -> usize {
        match self {
            ResourceDimension::Cpu => 0,
            ResourceDimension::Memory => 1,
            ResourceDimension::Storage => 2,
            ResourceDimension::Network => 3,
            ResourceDimension::Gpu => 4,
        }
    }
}

impl fmt::Display for ResourceDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceDimension::Cpu => write!(f, "cpu"),
            ResourceDimension::Memory => write!(f, "memory"),
            ResourceDimension::Storage => write!(f, "storage"),
            ResourceDimension::Network => write!(f, "network"),
            ResourceDimension::Gpu => write!(f, "gpu"),
        }
    }
}

/// Total hardware capacity of a node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceCapacity {
    /// Total CPU cores
    pub cpu_cores: f64,
    /// Total memory in GB
    pub memory_gb: f64,
    /// Total storage in GB
    pub storage_gb: f64,
    /// Total network bandwidth in Mbps
    pub network_mbps: f64,
    /// Number of GPUs
    pub gpu_count: u32,
}

impl ResourceCapacity {
    /// Create a capacity without GPUs
    pub fn new(cpu_cores: f64, memory_gb: f64, storage_gb: f64, network_mbps: f64) -> Self {
        Self {
            cpu_cores,
            memory_gb,
            storage_gb,
            network_mbps,
            gpu_count: 0,
        }
    }

    /// Set the GPU count
    pub fn with_gpus(mut self, gpu_count: u32) -> Self {
        self.gpu_count = gpu_count;
        self
    }

    /// Absolute amount of a dimension
    pub fn amount(&self, dimension: ResourceDimension) -> f64 {
        match dimension {
            ResourceDimension::Cpu => self.cpu_cores,
            ResourceDimension::Memory => self.memory_gb,
            ResourceDimension::Storage => self.storage_gb,
            ResourceDimension::Network => self.network_mbps,
            ResourceDimension::Gpu => f64::from(self.gpu_count),
        }
    }
}

/// Resources a workload asks for, in absolute units
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceRequirement {
    /// CPU cores
    pub cpu_cores: f64,
    /// Memory in GB
    pub memory_gb: f64,
    /// Storage in GB
    pub storage_gb: f64,
    /// Network bandwidth in Mbps
    pub network_mbps: f64,
    /// Number of GPUs
    pub gpu_count: u32,
}

impl ResourceRequirement {
    /// Create a requirement for CPU and memory only
    pub fn new(cpu_cores: f64, memory_gb: f64) -> Self {
        Self {
            cpu_cores,
            memory_gb,
            ..Self::default()
        }
    }

    /// Set the storage requirement
    pub fn with_storage(mut self, storage_gb: f64) -> Self {
        self.storage_gb = storage_gb;
        self
    }

    /// Set the network requirement
    pub fn with_network(mut self, network_mbps: f64) -> Self {
        self.network_mbps = network_mbps;
        self
    }

    /// Set the GPU requirement
    pub fn with_gpus(mut self, gpu_count: u32) -> Self {
        self.gpu_count = gpu_count;
        self
    }

    /// Absolute amount of a dimension, negative values read as zero
    pub fn amount(&self, dimension: ResourceDimension) -> f64 {
        let raw = match dimension {
            ResourceDimension::Cpu => self.cpu_cores,
            ResourceDimension::Memory => self.memory_gb,
            ResourceDimension::Storage => self.storage_gb,
            ResourceDimension::Network => self.network_mbps,
            ResourceDimension::Gpu => f64::from(self.gpu_count),
        };
        if raw.is_finite() {
            raw.max(0.0)
        } else {
            f64::INFINITY
        }
    }

    /// Express this requirement as percentages of a node's capacity.
    ///
    /// Returns `None` when some dimension is requested but the node has no
    /// capacity at all in it, since no percentage can describe that.
    pub fn share_of(&self, capacity: &ResourceCapacity) -> Option<ResourceShare> {
        let mut share = ResourceShare::empty();
        for dimension in ResourceDimension::ALL {
            let needed = self.amount(dimension);
            if needed == 0.0 {
                continue;
            }
            let total = capacity.amount(dimension);
            if total <= 0.0 || !needed.is_finite() {
                return None;
            }
            share.values[dimension.index()] = needed / total * FULL_PERCENT;
        }
        Some(share)
    }
}

/// Per-dimension percentages, used both for what a node has available and
/// for what a workload has reserved on it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceShare {
    values: [f64; 5],
}

impl ResourceShare {
    /// Every dimension at 100%
    pub fn full() -> Self {
        Self {
            values: [FULL_PERCENT; 5],
        }
    }

    /// Every dimension at 0%
    pub fn empty() -> Self {
        Self { values: [0.0; 5] }
    }

    /// Percentage of a dimension
    pub fn get(&self, dimension: ResourceDimension) -> f64 {
        self.values[dimension.index()]
    }

    /// Set a dimension, clamped into [0, 100]
    pub fn set(&mut self, dimension: ResourceDimension, percent: f64) {
        self.values[dimension.index()] = clamp_percent(percent);
    }

    /// Available CPU percentage
    pub fn cpu(&self) -> f64 {
        self.get(ResourceDimension::Cpu)
    }

    /// Check that every dimension of `needed` fits in this share
    pub fn covers(&self, needed: &ResourceShare) -> bool {
        self.values
            .iter()
            .zip(needed.values.iter())
            .all(|(available, wanted)| *wanted <= *available + PERCENT_EPSILON)
    }

    /// Subtract a reservation, never going below zero
    pub fn deduct(&mut self, reserved: &ResourceShare) {
        for (available, taken) in self.values.iter_mut().zip(reserved.values.iter()) {
            *available = clamp_percent(*available - *taken);
        }
    }

    /// Give a reservation back, never going above 100
    pub fn release(&mut self, reserved: &ResourceShare) {
        for (available, taken) in self.values.iter_mut().zip(reserved.values.iter()) {
            *available = clamp_percent(*available + *taken);
        }
    }

    /// Add another share without clamping, used to total reservations
    pub fn accumulate(&mut self, other: &ResourceShare) {
        for (total, value) in self.values.iter_mut().zip(other.values.iter()) {
            *total += *value;
        }
    }

    /// Check every dimension lies within [0, 100]
    pub fn is_within_bounds(&self) -> bool {
        self.values
            .iter()
            .all(|v| *v >= 0.0 && *v <= FULL_PERCENT + PERCENT_EPSILON)
    }
}

impl Default for ResourceShare {
    fn default() -> Self {
        Self::full()
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, FULL_PERCENT)
    }
}
