use std::time::Instant;

use anyhow::Context;
use serde_json::Value;

use crate::app_state::AppState;
use crate::error::DescribeError;
use crate::image_input::decode_payload;
use crate::prompt::{resolve_prompt, Lang};
use crate::types::{DescribeRequest, DescribeResult, HandlerResponse};

fn error_response(err: DescribeError) -> HandlerResponse {
    if matches!(err, DescribeError::MissingImage) {
        log::warn!("request without image rejected");
    } else {
        log::error!("describe failed: {err}");
    }
    HandlerResponse::message(err.status_code(), err.body())
}

/// 处理一次请求：校验 -> 解码图片 -> 推理，错误统一映射成状态码
pub async fn handle(state: &AppState, request: &DescribeRequest) -> HandlerResponse {
    let lang = Lang::from_code(request.lang.as_deref());
    let prompt = resolve_prompt(request.lang.as_deref(), request.prompt.as_deref());

    match describe(state, &prompt, request.image.as_deref()).await {
        Ok(result) => {
            log::info!("[{}] described image (lang = {})", state.engine.name(), lang.as_str());
            HandlerResponse::ok(DescribeResult { prompt, result })
        }
        Err(err) => error_response(err),
    }
}

/// 原始 JSON 请求体
pub async fn handle_body(state: &AppState, body: &Value) -> HandlerResponse {
    match DescribeRequest::from_body(body) {
        Ok(request) => handle(state, &request).await,
        Err(err) => error_response(err),
    }
}

/// `{ body: {...} }` 形式的调用事件
pub async fn handle_event(state: &AppState, event: &Value) -> HandlerResponse {
    match DescribeRequest::from_event(event) {
        Ok(request) => handle(state, &request).await,
        Err(err) => error_response(err),
    }
}

/// 请求体本身不是合法 JSON
pub fn malformed_json(reason: &str) -> HandlerResponse {
    error_response(DescribeError::InvalidRequest(format!("malformed JSON: {reason}")))
}

async fn describe(
    state: &AppState,
    prompt: &str,
    image: Option<&str>,
) -> Result<String, DescribeError> {
    let payload = match image {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => return Err(DescribeError::MissingImage),
    };

    // 解码和推理都是 CPU 密集的，先拿并发许可，再放到 blocking 线程池
    let _permit = state
        .semaphore
        .acquire()
        .await
        .context("inference semaphore closed")?;

    let start = Instant::now();
    let max_bytes = state.settings.max_image_bytes;
    let image = tokio::task::spawn_blocking(move || decode_payload(&payload, max_bytes))
        .await
        .context("image decoding task failed")??;
    let (w, h) = image.dimensions();

    let result = state
        .engine
        .describe(image, prompt, state.settings.max_new_tokens)
        .await?;

    log::info!("{}x{} image processed in {:.2?}", w, h, start.elapsed());
    Ok(result)
}
