use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid encoding key: {0}")]
    InvalidKey(String),

    #[error("Invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    #[error("Decryption failed: bad padding")]
    BadPadding,

    #[error("Decrypted payload truncated: need {needed} bytes, have {actual}")]
    Truncated { needed: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("XML decode error: {0}")]
    XmlDecode(String),

    #[error("XML encode error: {0}")]
    XmlEncode(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Body is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
}
