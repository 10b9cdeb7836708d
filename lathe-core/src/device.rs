//! Compute device selection.
//!
//! The device is resolved once, before the trainer is built, and passed in as
//! a plain value. Nothing in the training loop queries the environment.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Where tensors live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    #[default]
    Cpu,
    Cuda(usize),
}

impl Device {
    pub fn is_cuda(&self) -> bool {
        matches!(self, Device::Cuda(_))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(index) => write!(f, "cuda:{index}"),
        }
    }
}

/// Reports which accelerators the host exposes.
pub trait DeviceProbe {
    /// Number of visible CUDA devices.
    fn cuda_device_count(&self) -> usize;
}

/// Probe that reports no accelerators.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuOnly;

impl DeviceProbe for CpuOnly {
    fn cuda_device_count(&self) -> usize {
        0
    }
}

/// Probe backed by the `CUDA_VISIBLE_DEVICES` convention.
///
/// An unset, empty, or `-1` value means no devices; otherwise each
/// comma-separated entry counts as one device.
#[derive(Debug, Clone, Default)]
pub struct VisibleDevices {
    value: Option<String>,
}

impl VisibleDevices {
    pub fn new(value: Option<String>) -> Self {
        Self { value }
    }

    /// Read `CUDA_VISIBLE_DEVICES` from the process environment.
    pub fn from_env() -> Self {
        Self::new(std::env::var("CUDA_VISIBLE_DEVICES").ok())
    }
}

impl DeviceProbe for VisibleDevices {
    fn cuda_device_count(&self) -> usize {
        match self.value.as_deref().map(str::trim) {
            None | Some("") | Some("-1") => 0,
            Some(list) => list.split(',').filter(|s| !s.trim().is_empty()).count(),
        }
    }
}

/// Pick the device for a run.
///
/// Requesting CUDA on a host without it falls back to CPU with a warning.
pub fn resolve_device(cuda: bool, gpu: usize, probe: &dyn DeviceProbe) -> Device {
    if !cuda {
        return Device::Cpu;
    }
    let available = probe.cuda_device_count();
    if available == 0 {
        warn!("There's no CUDA support on this machine, training is performed on CPU");
        return Device::Cpu;
    }
    if gpu >= available {
        warn!(
            gpu,
            available, "Requested GPU index is not visible, training is performed on CPU"
        );
        return Device::Cpu;
    }
    debug!(gpu, "Using CUDA device");
    Device::Cuda(gpu)
}
