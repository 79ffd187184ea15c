use thiserror::Error;

/// 应用错误
#[derive(Error, Debug)]
pub enum AppError {
    /// 业务错误
    #[error("业务错误: {0}")]
    BizError(String),

    /// 数据库错误
    #[error("数据库错误: {0}")]
    DbError(String),

    /// 交易所 API 错误
    #[error("交易所API错误: {0}")]
    ExchangeApiError(String),

    /// 大模型调用错误
    #[error("大模型调用错误: {0}")]
    LlmError(String),

    /// 认证错误
    #[error("认证错误: {0}")]
    AuthError(String),

    /// 未知错误
    #[error("未知错误: {0}")]
    Unknown(String),
}

impl From<rbatis::Error> for AppError {
    fn from(err: rbatis::Error) -> Self {
        AppError::DbError(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::ExchangeApiError(err.to_string())
    }
}
