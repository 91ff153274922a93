use thiserror::Error;

pub const MISSING_IMAGE_MESSAGE: &str = "Fehler: Kein Bild im Base64-Format gesendet.";

/// 处理一次请求时可能出现的错误
#[derive(Debug, Error)]
pub enum DescribeError {
    #[error("no image supplied")]
    MissingImage,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("image payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("cannot decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("vision pipeline failed: {0:#}")]
    Pipeline(#[from] anyhow::Error),
}

impl DescribeError {
    /// 只有缺图是客户端错误，其余全部归为 500
    pub fn status_code(&self) -> u16 {
        match self {
            DescribeError::MissingImage => 400,
            _ => 500,
        }
    }

    pub fn body(&self) -> String {
        match self {
            DescribeError::MissingImage => MISSING_IMAGE_MESSAGE.to_string(),
            other => format!("Interner Fehler: {other}"),
        }
    }
}
