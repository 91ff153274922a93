use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::imageops::FilterType;
use image::RgbImage;
use parking_lot::Mutex;

// Candle 相关
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::moondream;
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use tokenizers::Tokenizer;

use crate::config::Settings;

/// 统一的视觉推理引擎抽象：图片 + 提示词 -> 文本
#[async_trait]
pub trait VisionEngine: Send + Sync {
    fn name(&self) -> &str;

    /// 模型版本（没有就返回 None）
    fn revision(&self) -> Option<&str> {
        None
    }

    async fn describe(&self, image: RgbImage, prompt: &str, max_new_tokens: usize)
        -> Result<String>;
}

/// Dummy 实现：不加载权重，只回显提示词和图片尺寸
pub struct DummyEngine {
    pub model_name: String,
}

impl DummyEngine {
    pub fn new(model_name: &str) -> Arc<Self> {
        Arc::new(Self {
            model_name: model_name.to_string(),
        })
    }
}

#[async_trait]
impl VisionEngine for DummyEngine {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn describe(
        &self,
        image: RgbImage,
        prompt: &str,
        _max_new_tokens: usize,
    ) -> Result<String> {
        let (w, h) = image.dimensions();
        Ok(format!("[{} DUMMY] {} ({}x{})", self.model_name, prompt, w, h))
    }
}

// moondream 视觉编码器的输入分辨率
const IMAGE_SIZE: u32 = 378;
const END_MARKER: &str = "<END>";

/// prepare 的产物：归一化后的图像张量 + prompt 的 token
pub struct ModelInputs {
    pub image: Tensor,
    pub prompt_tokens: Vec<u32>,
}

/// 缩放到 378x378，CHW 排列，归一化到 [-1, 1]
pub fn image_to_tensor(image: &RgbImage, device: &Device, dtype: DType) -> Result<Tensor> {
    let resized = image::imageops::resize(image, IMAGE_SIZE, IMAGE_SIZE, FilterType::Triangle);
    let size = IMAGE_SIZE as usize;

    let data = Tensor::from_vec(resized.into_raw(), (size, size, 3), device)?.permute((2, 0, 1))?;
    let mean = Tensor::new(&[0.5f32, 0.5, 0.5], device)?.reshape((3, 1, 1))?;
    let std = Tensor::new(&[0.5f32, 0.5, 0.5], device)?.reshape((3, 1, 1))?;
    let tensor = (data.to_dtype(DType::F32)? / 255.)?
        .broadcast_sub(&mean)?
        .broadcast_div(&std)?
        .to_dtype(dtype)?;
    Ok(tensor)
}

/// 去掉结尾的 <END> 标记和多余空白
pub fn clean_answer(text: &str) -> String {
    let text = text.trim_end();
    text.strip_suffix(END_MARKER).unwrap_or(text).trim().to_string()
}

struct MoondreamModel {
    model: moondream::Model,
    logits_processor: LogitsProcessor,
}

/// 真正持有权重的部分：load / prepare / generate / decode 都是同步、CPU 密集的
pub struct MoondreamPipeline {
    model_name: String,
    revision: String,
    device: Device,
    dtype: DType,
    model: Mutex<MoondreamModel>,
    tokenizer: Tokenizer,
    eos_token: u32,
}

impl MoondreamPipeline {
    /// 启动时调用一次：通过 hf-hub 下载权重和 tokenizer，构建模型
    pub fn load(settings: &Settings) -> Result<Self> {
        let device = settings.device.select()?;
        let dtype = settings.precision.dtype_for(&device);
        log::info!(
            "[Candle] loading {}@{} on {:?} ({:?})",
            settings.model_id,
            settings.model_revision,
            device,
            dtype
        );

        let api = Api::new()?;
        let repo = api.repo(Repo::with_revision(
            settings.model_id.clone(),
            RepoType::Model,
            settings.model_revision.clone(),
        ));
        let model_path = repo
            .get("model.safetensors")
            .context("downloading model weights")?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .context("downloading tokenizer")?;

        let start = Instant::now();
        let size = std::fs::metadata(&model_path)?.len() as usize;

        let config = moondream::Config::v2();
        // safetensors 通过 mmap 读取，文件在服务运行期间不能被改写
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[model_path], dtype, &device)? };
        let model = moondream::Model::new(&config, vb)?;
        log::info!(
            "[Candle] loaded {} ({}) in {:.2}s",
            settings.model_id,
            format_size(size),
            start.elapsed().as_secs_f32(),
        );

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Error loading tokenizer: {e}"))?;
        let eos_token = *tokenizer
            .get_vocab(true)
            .get("<|endoftext|>")
            .context("tokenizer has no <|endoftext|> token")?;

        let temperature = if settings.temperature <= 0.0 {
            None
        } else {
            Some(settings.temperature)
        };

        Ok(Self {
            model_name: settings.model_id.clone(),
            revision: settings.model_revision.clone(),
            device,
            dtype,
            model: Mutex::new(MoondreamModel {
                model,
                logits_processor: LogitsProcessor::new(settings.seed, temperature, None),
            }),
            tokenizer,
            eos_token,
        })
    }

    /// 图片转成张量；prompt 套上问答模板再分词
    pub fn prepare(&self, image: &RgbImage, prompt: &str) -> Result<ModelInputs> {
        let image = image_to_tensor(image, &self.device, self.dtype)?;
        let prompt_tokens = self
            .tokenizer
            .encode(format!("\n\nQuestion: {prompt}\n\nAnswer:"), true)
            .map_err(|e| anyhow::anyhow!("Error encoding tokenizer: {e}"))?
            .get_ids()
            .to_vec();

        Ok(ModelInputs {
            image,
            prompt_tokens,
        })
    }

    /// 自回归采样，遇到 <|endoftext|>、<END> 或 token 预算用完时停止；只返回新生成的 token
    pub fn generate(&self, inputs: &ModelInputs, max_new_tokens: usize) -> Result<Vec<u32>> {
        //  关键：KV cache 需要可变的 model，所以整个生成过程持有锁
        let mut guard = self.model.lock();
        let MoondreamModel {
            model,
            logits_processor,
        } = &mut *guard;

        model.text_model.clear_kv_cache();
        let image_embeds = inputs.image.unsqueeze(0)?.apply(model.vision_encoder())?;

        let mut tokens = inputs.prompt_tokens.clone();
        let mut generated = Vec::new();
        let mut answer = String::new();

        for index in 0..max_new_tokens {
            let context_size = if index > 0 { 1 } else { tokens.len() };
            let ctxt = &tokens[tokens.len().saturating_sub(context_size)..];
            let input = Tensor::new(ctxt, &self.device)?.unsqueeze(0)?;

            let logits = if index > 0 {
                model.text_model.forward(&input)?
            } else {
                let bos = Tensor::new(&[self.eos_token], &self.device)?.unsqueeze(0)?;
                model
                    .text_model
                    .forward_with_img(&bos, &input, &image_embeds)?
            };
            let logits = logits.squeeze(0)?.to_dtype(DType::F32)?;
            let next_token = logits_processor.sample(&logits)?;

            if next_token == self.eos_token {
                break;
            }
            tokens.push(next_token);
            generated.push(next_token);

            // 只解码最新的 token 来检测 <END>
            answer.push_str(&self.decode(&[next_token])?);
            if answer.ends_with(END_MARKER) {
                break;
            }
        }

        Ok(generated)
    }

    /// decode 回字符串，跳过特殊 token
    pub fn decode(&self, tokens: &[u32]) -> Result<String> {
        let text = self
            .tokenizer
            .decode(tokens, true)
            .map_err(|e| anyhow::anyhow!("Error decoding: {e}"))?;
        Ok(text)
    }

    fn generate_inner(
        &self,
        image: &RgbImage,
        prompt: &str,
        max_new_tokens: usize,
    ) -> Result<String> {
        let start = Instant::now();
        let inputs = self.prepare(image, prompt)?;
        let tokens = self.generate(&inputs, max_new_tokens)?;
        let text = clean_answer(&self.decode(&tokens)?);

        let elapsed = start.elapsed();
        log::debug!(
            "[Candle] generated {} tokens ({:.2} tokens/s)",
            tokens.len(),
            tokens.len() as f64 / elapsed.as_secs_f64()
        );
        Ok(text)
    }
}

/// 对外的引擎：生成放到 blocking 线程池，不占用 Rocket 的 async worker
pub struct MoondreamEngine {
    pipeline: Arc<MoondreamPipeline>,
}

impl MoondreamEngine {
    pub fn load(settings: &Settings) -> Result<Arc<Self>> {
        let pipeline = MoondreamPipeline::load(settings)?;
        Ok(Arc::new(Self {
            pipeline: Arc::new(pipeline),
        }))
    }
}

// 小工具：人类可读的字节数
fn format_size(size: usize) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let size_f = size as f64;
    if size_f > GB {
        format!("{:.2} GiB", size_f / GB)
    } else if size_f > MB {
        format!("{:.2} MiB", size_f / MB)
    } else if size_f > KB {
        format!("{:.2} KiB", size_f / KB)
    } else {
        format!("{size} B")
    }
}

#[async_trait]
impl VisionEngine for MoondreamEngine {
    fn name(&self) -> &str {
        &self.pipeline.model_name
    }

    fn revision(&self) -> Option<&str> {
        Some(&self.pipeline.revision)
    }

    async fn describe(
        &self,
        image: RgbImage,
        prompt: &str,
        max_new_tokens: usize,
    ) -> Result<String> {
        let pipeline = self.pipeline.clone();
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            pipeline.generate_inner(&image, &prompt, max_new_tokens)
        })
        .await
        .context("generation task failed")?
    }
}
