#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("message data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("message data is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("message data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
