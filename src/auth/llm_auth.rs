use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::OnceCell;
use serde_json::json;
use std::sync::RwLock;
use tracing::info;

use crate::error::AppError;

/// 认证模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// 使用 API Key
    ApiKey,
    /// 使用 OAuth Token（凭据获取流程由外部管理界面负责）
    OAuth,
    /// 自动选择（优先 API Key）
    Auto,
}

impl AuthMode {
    pub fn from_str(s: &str) -> AuthMode {
        match s {
            "api_key" => AuthMode::ApiKey,
            "oauth" => AuthMode::OAuth,
            _ => AuthMode::Auto,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::ApiKey => "api_key",
            AuthMode::OAuth => "oauth",
            AuthMode::Auto => "auto",
        }
    }
}

/// OAuth 提供商
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Anthropic,
}

impl Provider {
    pub fn from_str(s: &str) -> Provider {
        match s {
            "anthropic" => Provider::Anthropic,
            _ => Provider::OpenAI,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
        }
    }
}

struct AuthState {
    mode: AuthMode,
    provider: Provider,
}

/// LLM 认证管理器。
/// 周期执行路径只读取 token；模式/提供商的切换来自管理端，
/// 读写锁保证两边并发安全。
pub struct LlmAuthManager {
    api_key: String,
    state: RwLock<AuthState>,
}

impl LlmAuthManager {
    pub fn new(api_key: String, mode: AuthMode, provider: Provider) -> Self {
        Self {
            api_key,
            state: RwLock::new(AuthState { mode, provider }),
        }
    }

    /// 获取认证 token（根据模式自动选择）
    pub fn get_token(&self) -> Result<String> {
        let mode = self
            .state
            .read()
            .map(|s| s.mode)
            .unwrap_or(AuthMode::Auto);
        match mode {
            AuthMode::ApiKey | AuthMode::Auto => self.get_api_key(),
            AuthMode::OAuth => {
                Err(AppError::AuthError("OAuth 凭据由外部管理服务提供，当前不可用".to_string()).into())
            }
        }
    }

    /// 设置认证模式
    pub fn set_mode(&self, mode: AuthMode) {
        if let Ok(mut s) = self.state.write() {
            s.mode = mode;
            info!("[LLM认证] 认证模式已切换为: {}", mode.as_str());
        }
    }

    pub fn get_mode(&self) -> AuthMode {
        self.state
            .read()
            .map(|s| s.mode)
            .unwrap_or(AuthMode::Auto)
    }

    /// 设置 OAuth 提供商
    pub fn set_provider(&self, provider: Provider) {
        if let Ok(mut s) = self.state.write() {
            s.provider = provider;
            info!("[LLM认证] OAuth 提供商已切换为: {}", provider.as_str());
        }
    }

    pub fn get_provider(&self) -> Provider {
        self.state
            .read()
            .map(|s| s.provider)
            .unwrap_or(Provider::OpenAI)
    }

    /// 获取认证状态快照
    pub fn status(&self) -> serde_json::Value {
        let (mode, provider) = self
            .state
            .read()
            .map(|s| (s.mode, s.provider))
            .unwrap_or((AuthMode::Auto, Provider::OpenAI));
        json!({
            "mode": mode.as_str(),
            "provider": provider.as_str(),
            "api_key": !self.api_key.is_empty(),
            "oauth_available": false,
        })
    }

    fn get_api_key(&self) -> Result<String> {
        if self.api_key.trim().is_empty() {
            return Err(AppError::AuthError("API Key 未配置".to_string()).into());
        }
        Ok(self.api_key.clone())
    }
}

static AUTH_MANAGER: OnceCell<Arc<LlmAuthManager>> = OnceCell::new();

/// 初始化全局认证管理器（幂等）
pub fn init_global_auth_manager(api_key: String, mode: AuthMode, provider: Provider) -> Arc<LlmAuthManager> {
    AUTH_MANAGER
        .get_or_init(|| Arc::new(LlmAuthManager::new(api_key, mode, provider)))
        .clone()
}

pub fn get_global_auth_manager() -> Option<Arc<LlmAuthManager>> {
    AUTH_MANAGER.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_mode() {
        let mgr = LlmAuthManager::new("sk-test".to_string(), AuthMode::ApiKey, Provider::OpenAI);
        assert_eq!(mgr.get_token().unwrap(), "sk-test");
    }

    #[test]
    fn test_empty_key_fails() {
        let mgr = LlmAuthManager::new(String::new(), AuthMode::Auto, Provider::OpenAI);
        assert!(mgr.get_token().is_err());
    }

    #[test]
    fn test_mode_switch() {
        let mgr = LlmAuthManager::new("sk-test".to_string(), AuthMode::Auto, Provider::OpenAI);
        mgr.set_mode(AuthMode::OAuth);
        assert_eq!(mgr.get_mode(), AuthMode::OAuth);
        assert!(mgr.get_token().is_err());
        mgr.set_mode(AuthMode::ApiKey);
        assert!(mgr.get_token().is_ok());
    }

    #[test]
    fn test_status_snapshot() {
        let mgr = LlmAuthManager::new("sk-test".to_string(), AuthMode::Auto, Provider::Anthropic);
        let status = mgr.status();
        assert_eq!(status["mode"], "auto");
        assert_eq!(status["provider"], "anthropic");
        assert_eq!(status["api_key"], true);
    }
}
