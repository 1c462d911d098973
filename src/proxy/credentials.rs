//! # 凭证提取与注入
//!
//! 按服务的原生认证约定，从入站请求中读取调用方凭证，或向出站请求注入轮换得到的凭证

use axum::http::{HeaderMap, HeaderName, HeaderValue, Uri, header};
use url::Url;

use super::route_table::AuthScheme;
use crate::error::{ProxyError, Result};

/// 可能携带调用方凭证的请求头
pub const CREDENTIAL_HEADERS: [&str; 5] = [
    "authorization",
    "x-api-key",
    "x-goog-api-key",
    "xi-api-key",
    "api-key",
];

/// 默认的查询参数凭证名
pub const DEFAULT_QUERY_KEY: &str = "key";

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        let token = token.trim();
        (!token.is_empty()).then_some(token)
    } else {
        None
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn query_value(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// 提取调用方出示的凭证
///
/// 依次检查 `Authorization: Bearer`、专用 API key 头、路由自定义的头或查询参数、`?key=`。
#[must_use]
pub fn extract_incoming_credential(
    headers: &HeaderMap,
    uri: &Uri,
    scheme: Option<&AuthScheme>,
) -> Option<String> {
    if let Some(token) = header_str(headers, header::AUTHORIZATION.as_str()).and_then(bearer_token)
    {
        return Some(token.to_string());
    }

    for name in &CREDENTIAL_HEADERS[1..] {
        if let Some(value) = header_str(headers, name) {
            return Some(value.to_string());
        }
    }

    match scheme {
        Some(AuthScheme::Header { name }) => {
            if let Some(value) = header_str(headers, name) {
                return Some(value.to_string());
            }
        }
        Some(AuthScheme::Query { name }) => {
            if let Some(value) = query_value(uri, name) {
                return Some(value);
            }
        }
        _ => {}
    }

    query_value(uri, DEFAULT_QUERY_KEY)
}

/// 移除出站请求中所有调用方的认证头
pub fn clear_auth_headers(headers: &mut HeaderMap, scheme: &AuthScheme) {
    for name in CREDENTIAL_HEADERS {
        headers.remove(name);
    }
    if let AuthScheme::Header { name } = scheme {
        headers.remove(name.as_str());
    }
}

/// 返回去掉指定查询参数后的 URL
#[must_use]
pub fn without_query_param(url: &Url, name: &str) -> Url {
    let mut stripped = url.clone();
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != name)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    if retained.is_empty() {
        stripped.set_query(None);
    } else {
        stripped.query_pairs_mut().clear().extend_pairs(retained);
    }
    stripped
}

/// 按服务的认证约定注入凭证
///
/// 查询参数方式会同时清除所有认证头，避免上游收到两份凭证。
pub fn apply_credential(
    scheme: &AuthScheme,
    headers: &mut HeaderMap,
    url: &mut Url,
    credential: &str,
) -> Result<()> {
    clear_auth_headers(headers, scheme);

    let invalid = |e| ProxyError::internal_with_source("pooled credential is not a valid header value", e);

    match scheme {
        AuthScheme::Bearer => {
            let value = HeaderValue::from_str(&format!("Bearer {credential}")).map_err(invalid)?;
            headers.insert(header::AUTHORIZATION, value);
        }
        AuthScheme::Header { name } => {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ProxyError::config_with_source(format!("invalid auth header name '{name}'"), e)
            })?;
            let value = HeaderValue::from_str(credential).map_err(invalid)?;
            headers.insert(header_name, value);
        }
        AuthScheme::Query { name } => {
            *url = without_query_param(url, name);
            url.query_pairs_mut().append_pair(name, credential);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_extract_bearer() {
        let map = headers(&[("authorization", "Bearer sk-caller")]);
        let uri: Uri = "/openai/v1/models".parse().unwrap();
        assert_eq!(
            extract_incoming_credential(&map, &uri, None),
            Some("sk-caller".to_string())
        );
    }

    #[test]
    fn test_extract_x_api_key_and_query() {
        let uri: Uri = "/claude/v1/messages".parse().unwrap();
        let map = headers(&[("x-api-key", "ant-key")]);
        assert_eq!(
            extract_incoming_credential(&map, &uri, None).as_deref(),
            Some("ant-key")
        );

        let uri: Uri = "/gemini/v1beta/models?key=goog-key&alt=sse".parse().unwrap();
        assert_eq!(
            extract_incoming_credential(&HeaderMap::new(), &uri, None).as_deref(),
            Some("goog-key")
        );
    }

    #[test]
    fn test_extract_none() {
        let uri: Uri = "/openai/v1/models".parse().unwrap();
        let map = headers(&[("authorization", "Basic abc")]);
        assert_eq!(extract_incoming_credential(&map, &uri, None), None);
    }

    #[test]
    fn test_apply_bearer_replaces_caller_headers() {
        let mut map = headers(&[("authorization", "Bearer master"), ("x-api-key", "master")]);
        let mut url = Url::parse("https://api.openai.com/v1/chat/completions").unwrap();
        apply_credential(&AuthScheme::Bearer, &mut map, &mut url, "sk-pool").unwrap();

        assert_eq!(map.get("authorization").unwrap(), "Bearer sk-pool");
        assert!(map.get("x-api-key").is_none());
    }

    #[test]
    fn test_apply_header_scheme() {
        let mut map = headers(&[("authorization", "Bearer master")]);
        let mut url = Url::parse("https://api.anthropic.com/v1/messages").unwrap();
        let scheme = AuthScheme::Header {
            name: "x-api-key".to_string(),
        };
        apply_credential(&scheme, &mut map, &mut url, "ant-pool").unwrap();

        assert_eq!(map.get("x-api-key").unwrap(), "ant-pool");
        assert!(map.get("authorization").is_none());
    }

    #[test]
    fn test_apply_query_scheme_removes_headers() {
        let mut map = headers(&[
            ("authorization", "Bearer master"),
            ("x-goog-api-key", "master"),
        ]);
        let mut url =
            Url::parse("https://generativelanguage.googleapis.com/v1beta/models?key=master&alt=sse")
                .unwrap();
        let scheme = AuthScheme::Query {
            name: "key".to_string(),
        };
        apply_credential(&scheme, &mut map, &mut url, "g-pool").unwrap();

        assert!(map.get("authorization").is_none());
        assert!(map.get("x-goog-api-key").is_none());
        assert_eq!(url.query(), Some("alt=sse&key=g-pool"));
    }

    #[test]
    fn test_without_query_param() {
        let url = Url::parse("https://host/path?key=secret").unwrap();
        assert_eq!(without_query_param(&url, "key").as_str(), "https://host/path");
    }
}
