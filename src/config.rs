use candle_core::{DType, Device};
use serde::Deserialize;

/// 使用哪种推理引擎
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Dummy,
    Moondream,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Dummy => "dummy",
            EngineKind::Moondream => "moondream",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePolicy {
    Auto,
    Cpu,
    Cuda,
    Metal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Auto,
    F16,
    Bf16,
    F32,
}

/// 服务配置：从 Rocket.toml / ROCKET_* 环境变量中读取，和 Rocket 自身配置放在同一层
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineKind,
    pub model_id: String,
    pub model_revision: String,
    pub device: DevicePolicy,
    pub precision: Precision,
    pub max_new_tokens: usize,
    pub max_image_bytes: usize,
    pub max_concurrent_inference: usize,
    pub temperature: f64,
    pub seed: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: EngineKind::Moondream,
            model_id: "vikhyatk/moondream1".to_string(),
            model_revision: "f6e9da68e8f1b78b8f3ee10905d56826db7a5802".to_string(),
            device: DevicePolicy::Auto,
            precision: Precision::Auto,
            max_new_tokens: 512,
            max_image_bytes: 10 * 1024 * 1024,
            max_concurrent_inference: 2,
            temperature: 0.0,
            seed: 42,
        }
    }
}

impl DevicePolicy {
    pub fn select(&self) -> anyhow::Result<Device> {
        let device = match self {
            DevicePolicy::Cpu => Device::Cpu,
            DevicePolicy::Cuda => Device::new_cuda(0)?,
            DevicePolicy::Metal => Device::new_metal(0)?,
            DevicePolicy::Auto => {
                if candle_core::utils::cuda_is_available() {
                    Device::new_cuda(0)?
                } else if candle_core::utils::metal_is_available() {
                    Device::new_metal(0)?
                } else {
                    Device::Cpu
                }
            }
        };
        Ok(device)
    }
}

impl Precision {
    /// CPU 上的 f16 算子不全，auto 时在 CPU 用 f32
    pub fn dtype_for(&self, device: &Device) -> DType {
        match self {
            Precision::F16 => DType::F16,
            Precision::Bf16 => DType::BF16,
            Precision::F32 => DType::F32,
            Precision::Auto => {
                if device.is_cpu() {
                    DType::F32
                } else {
                    DType::F16
                }
            }
        }
    }
}
