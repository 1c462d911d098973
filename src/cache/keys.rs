//! # 响应缓存键
//!
//! 可缓存判定与内容寻址的缓存键生成

use axum::http::Method;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::CacheConfig;

/// 缓存键长度（SHA-256 十六进制）
pub const CACHE_KEY_LEN: usize = 64;

/// 缓存键生成器
///
/// 键只由上游 URL（不含凭证查询参数）、方法、请求体决定，与调用方凭证无关。
#[derive(Debug, Clone)]
pub struct CacheKeyDeriver {
    non_cacheable_paths: Vec<String>,
    non_cacheable_keywords: Vec<String>,
    ttl: Duration,
}

impl Default for CacheKeyDeriver {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl CacheKeyDeriver {
    #[must_use]
    pub fn new(paths: Vec<String>, keywords: Vec<String>, ttl: Duration) -> Self {
        Self {
            non_cacheable_paths: paths,
            non_cacheable_keywords: keywords
                .into_iter()
                .map(|keyword| keyword.to_ascii_lowercase())
                .collect(),
            ttl,
        }
    }

    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            config.non_cacheable_paths.clone(),
            config.non_cacheable_keywords.clone(),
            Duration::from_secs(config.ttl_seconds),
        )
    }

    /// 缓存条目的存活时间
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 是否可缓存：仅 POST，路径与模型均不命中排除列表
    #[must_use]
    pub fn is_cacheable(&self, method: &Method, path: &str, model: &str) -> bool {
        if *method != Method::POST {
            return false;
        }
        if self
            .non_cacheable_paths
            .iter()
            .any(|fragment| path.contains(fragment.as_str()))
        {
            return false;
        }
        let model = model.to_ascii_lowercase();
        !self
            .non_cacheable_keywords
            .iter()
            .any(|keyword| model.contains(keyword.as_str()))
    }

    /// `hex(sha256(url ‖ method ‖ body))`
    #[must_use]
    pub fn derive_key(&self, url: &str, method: &Method, body: &[u8]) -> String {
        derive_key(url, method, body)
    }
}

/// 生成缓存键
#[must_use]
pub fn derive_key(url: &str, method: &Method, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(method.as_str().as_bytes());
    hasher.update(body);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
    const BODY: &[u8] = br#"{"model":"gpt-4o","messages":[{"role":"user","content":"hi"}]}"#;

    #[test]
    fn test_key_is_64_hex_chars() {
        let key = derive_key(CHAT_URL, &Method::POST, BODY);
        assert_eq!(key.len(), CACHE_KEY_LEN);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_key_is_deterministic() {
        assert_eq!(
            derive_key(CHAT_URL, &Method::POST, BODY),
            derive_key(CHAT_URL, &Method::POST, BODY)
        );
    }

    #[test]
    fn test_key_changes_with_any_input() {
        let base = derive_key(CHAT_URL, &Method::POST, BODY);
        assert_ne!(base, derive_key("https://api.openai.com/v1/completions", &Method::POST, BODY));
        assert_ne!(base, derive_key(CHAT_URL, &Method::PUT, BODY));
        assert_ne!(base, derive_key(CHAT_URL, &Method::POST, b"{}"));
    }

    #[rstest]
    #[case(Method::POST, "/v1/chat/completions", "gpt-4o", true)]
    #[case(Method::GET, "/v1/models", "unknown", false)]
    #[case(Method::POST, "/v1beta/models/gemini-pro:streamGenerateContent", "gemini-pro", false)]
    #[case(Method::POST, "/v1/audio/speech", "gpt-4o-mini", false)]
    #[case(Method::POST, "/v1/images/generations", "gpt-4o", false)]
    #[case(Method::POST, "/v1/chat/completions", "GPT-4-Vision-Preview", false)]
    #[case(Method::POST, "/v1/chat/completions", "dall-e-3", false)]
    #[case(Method::POST, "/v1/audio/transcriptions", "whisper-1", false)]
    fn test_is_cacheable(
        #[case] method: Method,
        #[case] path: &str,
        #[case] model: &str,
        #[case] expected: bool,
    ) {
        let deriver = CacheKeyDeriver::default();
        assert_eq!(deriver.is_cacheable(&method, path, model), expected);
    }

    #[test]
    fn test_custom_lists() {
        let deriver = CacheKeyDeriver::new(
            vec!["/embeddings".to_string()],
            vec!["Preview".to_string()],
            Duration::from_secs(60),
        );
        assert!(!deriver.is_cacheable(&Method::POST, "/v1/embeddings", "text-embedding-3"));
        assert!(!deriver.is_cacheable(&Method::POST, "/v1/chat/completions", "o1-preview"));
        assert!(deriver.is_cacheable(&Method::POST, "/v1/chat/completions", "dall-e-3"));
        assert_eq!(deriver.ttl(), Duration::from_secs(60));
    }
}
