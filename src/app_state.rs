use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::{EngineKind, Settings};
use crate::engine::{DummyEngine, MoondreamEngine, VisionEngine};

/// 全局共享状态（启动时创建一次，之后只读）：
/// - engine: 已加载的视觉推理引擎
/// - settings: 服务配置
/// - semaphore: 控制最多 N 个并发推理任务

pub struct AppState {
    pub engine: Arc<dyn VisionEngine>,
    pub settings: Settings,
    pub semaphore: Arc<Semaphore>,
}

impl AppState {
    pub fn new(engine: Arc<dyn VisionEngine>, settings: Settings) -> Arc<Self> {
        let permits = settings.max_concurrent_inference.max(1);
        Arc::new(Self {
            engine,
            settings,
            semaphore: Arc::new(Semaphore::new(permits)),
        })
    }

    /// 加载模型：根据 EngineKind 创建对应 Engine。真实模型的下载 / 构建是阻塞操作
    pub fn load(settings: Settings) -> anyhow::Result<Arc<Self>> {
        let engine: Arc<dyn VisionEngine> = match settings.engine {
            EngineKind::Dummy => DummyEngine::new(&settings.model_id),
            EngineKind::Moondream => MoondreamEngine::load(&settings)?,
        };
        log::info!("vision engine `{}` is ready", engine.name());

        Ok(Self::new(engine, settings))
    }
}
