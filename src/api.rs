use std::sync::Arc;

use rocket::http::Status;
use rocket::serde::json::{self, Json};
use rocket::{get, post, routes, Route, State};
use serde_json::Value;

use crate::app_state::AppState;
use crate::handler::{handle_body, handle_event, malformed_json};
use crate::types::{HandlerResponse, HealthResponse, ModelInfoResponse, ResponseBody};

pub fn routes() -> Vec<Route> {
    routes![health, model_info, describe, invoke]
}

#[get("/health")]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[get("/model")]
pub async fn model_info(state: &State<Arc<AppState>>) -> Json<ModelInfoResponse> {
    Json(ModelInfoResponse {
        name: state.engine.name().to_string(),
        engine: state.settings.engine.as_str().to_string(),
        revision: state.engine.revision().map(str::to_string),
    })
}

fn status_of(resp: &HandlerResponse) -> Status {
    Status::from_code(resp.status_code).unwrap_or(Status::InternalServerError)
}

// 请求体按任意 JSON 接收，字段类型由 handler 检查，这样任何输入都能得到 statusCode/body
type JsonBody<'r> = Result<Json<Value>, json::Error<'r>>;

/// 直接返回 body，HTTP 状态码即 statusCode
#[post("/describe", data = "<req>")]
pub async fn describe(
    state: &State<Arc<AppState>>,
    req: JsonBody<'_>,
) -> (Status, Json<ResponseBody>) {
    let resp = match req {
        Ok(Json(body)) => handle_body(state, &body).await,
        Err(e) => malformed_json(&e.to_string()),
    };
    (status_of(&resp), Json(resp.body))
}

/// 宿主运行时的调用方式：`{ body: {...} }` 进，`{ statusCode, body }` 出
#[post("/invoke", data = "<event>")]
pub async fn invoke(
    state: &State<Arc<AppState>>,
    event: JsonBody<'_>,
) -> (Status, Json<HandlerResponse>) {
    let resp = match event {
        Ok(Json(event)) => handle_event(state, &event).await,
        Err(e) => malformed_json(&e.to_string()),
    };
    (status_of(&resp), Json(resp))
}
