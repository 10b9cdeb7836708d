//! Minimal dense tensors and named parameter sets.

use crate::device::Device;
use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A dense `f32` tensor tagged with the device it lives on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    shape: Vec<usize>,
    #[serde(with = "crate::history::scalar_seq")]
    data: Vec<f32>,
    #[serde(default)]
    device: Device,
}

impl Tensor {
    /// Build a tensor, checking that `data` fills `shape` exactly.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, ModelError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ModelError::ShapeMismatch {
                shape,
                len: data.len(),
            });
        }
        Ok(Self {
            shape,
            data,
            device: Device::Cpu,
        })
    }

    pub fn zeros(shape: &[usize]) -> Self {
        let len = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![0.0; len],
            device: Device::Cpu,
        }
    }

    pub fn zeros_like(other: &Tensor) -> Self {
        Self {
            shape: other.shape.clone(),
            data: vec![0.0; other.data.len()],
            device: other.device,
        }
    }

    /// One-dimensional tensor over `data`.
    pub fn vector(data: Vec<f32>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
            device: Device::Cpu,
        }
    }

    pub fn scalar(value: f32) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value],
            device: Device::Cpu,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Copy of this tensor homed on `device`.
    pub fn to(&self, device: Device) -> Self {
        Self {
            device,
            ..self.clone()
        }
    }

    /// Re-home this tensor in place.
    pub fn move_to(&mut self, device: Device) {
        self.device = device;
    }

    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| f(x)).collect(),
            device: self.device,
        }
    }
}

/// Named tensors making up a model's state, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters {
    tensors: BTreeMap<String, Tensor>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) -> Option<Tensor> {
        self.tensors.insert(name.into(), tensor)
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Tensor> {
        self.tensors.get_mut(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.tensors.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Total number of scalar values across all tensors.
    pub fn numel(&self) -> usize {
        self.tensors.values().map(Tensor::numel).sum()
    }

    pub fn to_device(&mut self, device: Device) {
        for tensor in self.tensors.values_mut() {
            tensor.move_to(device);
        }
    }

    /// Replace every tensor with the one of the same name in `state`.
    ///
    /// Names and shapes must match exactly; on error `self` is unchanged.
    pub fn load(&mut self, state: Parameters) -> Result<(), ModelError> {
        if self.tensors.len() != state.tensors.len() {
            return Err(ModelError::StateMismatch {
                message: format!(
                    "expected {} tensors, got {}",
                    self.tensors.len(),
                    state.tensors.len()
                ),
            });
        }
        for (name, current) in &self.tensors {
            let incoming = state
                .tensors
                .get(name)
                .ok_or_else(|| ModelError::StateMismatch {
                    message: format!("missing tensor '{name}'"),
                })?;
            if incoming.shape != current.shape {
                return Err(ModelError::StateMismatch {
                    message: format!(
                        "tensor '{name}' has shape {:?}, expected {:?}",
                        incoming.shape, current.shape
                    ),
                });
            }
        }
        self.tensors = state.tensors;
        Ok(())
    }
}

impl FromIterator<(String, Tensor)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        Self {
            tensors: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_checks_shape() {
        assert!(Tensor::new(vec![2, 3], vec![0.0; 6]).is_ok());
        let err = Tensor::new(vec![2, 3], vec![0.0; 5]).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { len: 5, .. }));
    }

    #[test]
    fn test_to_device_keeps_data() {
        let t = Tensor::vector(vec![1.0, 2.0]);
        let moved = t.to(Device::Cuda(0));
        assert_eq!(moved.device(), Device::Cuda(0));
        assert_eq!(moved.data(), t.data());
    }

    #[test]
    fn test_non_finite_data_survives_json() {
        let t = Tensor::vector(vec![f32::NAN, 1.0, f32::INFINITY]).to(Device::Cuda(1));
        let text = serde_json::to_string(&t).unwrap();
        assert!(text.contains(r#"["nan",1.0,"inf"]"#), "{text}");
        let back: Tensor = serde_json::from_str(&text).unwrap();
        assert_eq!(back.shape(), &[3]);
        assert_eq!(back.device(), Device::Cuda(1));
        assert!(back.data()[0].is_nan());
        assert_eq!(back.data()[1..].to_vec(), vec![1.0, f32::INFINITY]);
    }

    #[test]
    fn test_load_rejects_mismatch() {
        let mut params = Parameters::new();
        params.insert("w", Tensor::zeros(&[2]));

        let mut wrong_shape = Parameters::new();
        wrong_shape.insert("w", Tensor::zeros(&[3]));
        assert!(params.load(wrong_shape).is_err());

        let mut wrong_name = Parameters::new();
        wrong_name.insert("v", Tensor::zeros(&[2]));
        assert!(params.load(wrong_name).is_err());

        let mut good = Parameters::new();
        good.insert("w", Tensor::vector(vec![3.0, 4.0]));
        params.load(good).unwrap();
        assert_eq!(params.get("w").unwrap().data(), &[3.0, 4.0]);
    }
}
