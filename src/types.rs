use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DescribeError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfoResponse {
    pub name: String,
    pub engine: String,
    pub revision: Option<String>,
}

/// 请求体：三个字段都可省略，缺失 / null / 空值的 image 统一视为“没有图片”
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DescribeRequest {
    pub lang: Option<String>,
    pub prompt: Option<String>,
    pub image: Option<String>,
}

// null、false、0、""、[]、{} 都算“没有传”
fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

impl DescribeRequest {
    /// 宿主运行时的调用事件：`{ "body": { ... } }`，没有 body 时当作空请求
    pub fn from_event(event: &Value) -> Result<Self, DescribeError> {
        let Value::Object(event) = event else {
            return Err(DescribeError::InvalidRequest(
                "event must be a JSON object".to_string(),
            ));
        };
        match event.get("body") {
            Some(body) => Self::from_body(body),
            None => Ok(Self::default()),
        }
    }

    /// 宽松地从 JSON 中取字段：lang 类型不对时回退默认语言；没有图片时不再检查其他字段
    pub fn from_body(body: &Value) -> Result<Self, DescribeError> {
        let Value::Object(body) = body else {
            return Err(DescribeError::InvalidRequest(
                "request body must be a JSON object".to_string(),
            ));
        };

        let lang = body.get("lang").and_then(Value::as_str).map(str::to_string);

        let image = match body.get("image") {
            None => None,
            Some(v) if is_empty_value(v) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                return Err(DescribeError::InvalidRequest(
                    "image must be a base64 string".to_string(),
                ))
            }
        };
        if image.is_none() {
            return Ok(Self {
                lang,
                prompt: None,
                image: None,
            });
        }

        let prompt = match body.get("prompt") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                return Err(DescribeError::InvalidRequest(
                    "prompt must be a string".to_string(),
                ))
            }
        };

        Ok(Self {
            lang,
            prompt,
            image,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescribeResult {
    pub prompt: String,
    pub result: String,
}

/// 成功时是 `{prompt, result}`，失败时是一段纯文本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Described(DescribeResult),
    Message(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: ResponseBody,
}

impl HandlerResponse {
    pub fn ok(result: DescribeResult) -> Self {
        Self {
            status_code: 200,
            body: ResponseBody::Described(result),
        }
    }

    pub fn message(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            body: ResponseBody::Message(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_uses_status_code_key() {
        let resp = HandlerResponse::message(400, "kaputt");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json, json!({ "statusCode": 400, "body": "kaputt" }));
    }

    #[test]
    fn success_body_is_an_object() {
        let resp = HandlerResponse::ok(DescribeResult {
            prompt: "p".to_string(),
            result: "r".to_string(),
        });
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["body"]["prompt"], "p");
        assert_eq!(json["body"]["result"], "r");
    }

    #[test]
    fn event_without_body_is_empty_request() {
        let req = DescribeRequest::from_event(&json!({})).unwrap();
        assert!(req.image.is_none());

        let req = DescribeRequest::from_event(&json!({ "body": { "image": null, "lang": "en" } }))
            .unwrap();
        assert!(req.image.is_none());
        assert_eq!(req.lang.as_deref(), Some("en"));
    }

    #[test]
    fn event_must_be_an_object() {
        let err = DescribeRequest::from_event(&json!("body")).unwrap_err();
        assert!(matches!(err, DescribeError::InvalidRequest(_)));
    }

    #[test]
    fn body_as_string_is_rejected() {
        let err = DescribeRequest::from_event(&json!({ "body": "{\"image\":\"x\"}" })).unwrap_err();
        assert!(matches!(err, DescribeError::InvalidRequest(_)));

        let err = DescribeRequest::from_event(&json!({ "body": null })).unwrap_err();
        assert!(matches!(err, DescribeError::InvalidRequest(_)));
    }

    #[test]
    fn empty_like_images_count_as_missing() {
        for image in [json!(null), json!(false), json!(0), json!(""), json!([]), json!({})] {
            let req = DescribeRequest::from_body(&json!({ "image": image })).unwrap();
            assert!(req.image.is_none(), "{image} should count as missing");
        }
    }

    #[test]
    fn non_string_image_is_rejected() {
        let err = DescribeRequest::from_body(&json!({ "image": 123 })).unwrap_err();
        assert!(matches!(err, DescribeError::InvalidRequest(_)));
    }

    #[test]
    fn non_string_lang_is_ignored() {
        let req = DescribeRequest::from_body(&json!({ "lang": 5, "image": "QUJD" })).unwrap();
        assert!(req.lang.is_none());
        assert_eq!(req.image.as_deref(), Some("QUJD"));
    }

    #[test]
    fn non_string_prompt_only_matters_with_an_image() {
        let req = DescribeRequest::from_body(&json!({ "prompt": 7 })).unwrap();
        assert!(req.image.is_none());

        let err = DescribeRequest::from_body(&json!({ "prompt": 7, "image": "QUJD" })).unwrap_err();
        assert!(matches!(err, DescribeError::InvalidRequest(_)));
    }
}
