//! Helpers for keeping credentials out of log lines and span fields.

/// Strips userinfo/tokens from a git remote URL.
///
/// - `https://ghp_token@github.com/user/repo` → `https://****@github.com/user/repo`
/// - `git@github.com:user/repo.git` → unchanged
/// - `https://github.com/user/repo` → unchanged
pub fn redact_repo_url(url: &str) -> String {
    if url.starts_with("git@") {
        return url.to_string();
    }

    if let Some(scheme_end) = url.find("://") {
        let after_scheme = &url[scheme_end + 3..];
        let authority_end = after_scheme.find('/').unwrap_or(after_scheme.len());
        if let Some(at_pos) = after_scheme[..authority_end].rfind('@') {
            let scheme = &url[..scheme_end + 3];
            let after_at = &after_scheme[at_pos + 1..];
            return format!("{}****@{}", scheme, after_at);
        }
    }

    url.to_string()
}
