//! Git authentication handling.

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};

use crate::gitops::error::FetchError;

/// Credentials handed to git for HTTPS remotes.
#[derive(Debug, Default)]
pub struct GitCredentials {
    /// Access token answered to every askpass prompt.
    pub token: Option<SecretString>,
}

impl GitCredentials {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: Some(SecretString::from(token.into())),
        }
    }

    /// Reads the token from the named environment variable, if set and non-empty.
    pub fn from_env(var: &str) -> Self {
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => Self::token(value.trim()),
            _ => Self::none(),
        }
    }
}

/// Escapes a token for safe use in single-quoted shell strings.
/// Replaces single quotes with '\'' (end quote, escaped quote, start quote).
pub fn shell_escape_token(token: &str) -> String {
    token.replace('\'', "'\\''")
}

/// Escapes batch metacharacters for use in a Windows askpass script.
#[cfg(not(unix))]
fn escape_token_for_windows_batch(token: &str) -> String {
    let mut escaped = String::with_capacity(token.len() * 2);
    for ch in token.chars() {
        match ch {
            '%' => escaped.push_str("%%"),
            '^' | '&' | '|' | '<' | '>' | '(' | ')' | '"' => {
                escaped.push('^');
                escaped.push(ch);
            }
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// RAII guard for askpass script cleanup.
///
/// Deletes the askpass script when dropped so tokens are not left on disk.
#[derive(Debug)]
pub struct AskpassCleanup {
    path: Option<PathBuf>,
}

impl AskpassCleanup {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    pub(crate) fn empty() -> Self {
        Self { path: None }
    }
}

impl Drop for AskpassCleanup {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                log::warn!("Failed to clean up askpass script: {}", e);
            }
        }
    }
}

/// Authentication environment for git commands.
#[derive(Debug)]
pub struct AuthEnv {
    /// Environment variables to set for the git command.
    pub env_vars: Vec<(String, String)>,
    /// Must outlive the git command to keep the askpass script alive.
    pub _cleanup: AskpassCleanup,
}

/// Builds the environment for a non-interactive git command.
///
/// Prompts are always disabled. With a token, a temporary `GIT_ASKPASS`
/// script answering with the token is written and removed on drop.
pub fn build_auth_env(credentials: &GitCredentials) -> Result<AuthEnv, FetchError> {
    let mut env = vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())];

    let Some(token) = &credentials.token else {
        return Ok(AuthEnv {
            env_vars: env,
            _cleanup: AskpassCleanup::empty(),
        });
    };

    let random_suffix = uuid::Uuid::new_v4().to_string();
    let temp_dir = std::env::temp_dir();

    #[cfg(unix)]
    let askpass_path = {
        use std::os::unix::fs::OpenOptionsExt;

        let path = temp_dir.join(format!(".git-askpass-{}.sh", random_suffix));
        let script = format!(
            "#!/bin/sh\necho '{}'\n",
            shell_escape_token(token.expose_secret())
        );
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o700)
            .open(&path)
            .map_err(|e| FetchError::Io {
                path: path.clone(),
                source: e,
            })?;
        std::io::Write::write_all(&mut file, script.as_bytes()).map_err(|e| FetchError::Io {
            path: path.clone(),
            source: e,
        })?;
        path
    };

    #[cfg(not(unix))]
    let askpass_path = {
        let path = temp_dir.join(format!(".git-askpass-{}.bat", random_suffix));
        let script = format!(
            "@echo off\r\necho {}\r\n",
            escape_token_for_windows_batch(token.expose_secret())
        );
        std::fs::write(&path, script).map_err(|e| FetchError::Io {
            path: path.clone(),
            source: e,
        })?;
        path
    };

    let cleanup = AskpassCleanup::new(askpass_path.clone());

    let askpass = askpass_path
        .to_str()
        .ok_or_else(|| {
            FetchError::AuthFailed("Temp directory path contains non-UTF8 characters".to_string())
        })?
        .to_string();
    env.push(("GIT_ASKPASS".to_string(), askpass));

    Ok(AuthEnv {
        env_vars: env,
        _cleanup: cleanup,
    })
}
