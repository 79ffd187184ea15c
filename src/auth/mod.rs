pub mod llm_auth;

pub use llm_auth::{
    get_global_auth_manager, init_global_auth_manager, AuthMode, LlmAuthManager, Provider,
};
