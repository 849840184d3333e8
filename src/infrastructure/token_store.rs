//! Auth token storage
//!
//! The API client only needs `get_token`, `set_tokens` and `clear_tokens`.
//! `FileTokenStore` persists the pair as JSON, the way a browser session
//! keeps tokens in local storage.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::config::ConfigManager;
use super::error::ApiError;

const TOKEN_FILE_NAME: &str = "tokens.json";

/// Access/refresh token pair issued at login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

pub trait TokenStore: Send + Sync {
    /// Current access token, if logged in
    fn get_token(&self) -> Option<String>;
    fn set_tokens(&self, tokens: TokenPair) -> Result<(), ApiError>;
    fn clear_tokens(&self) -> Result<(), ApiError>;
}

#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: Mutex<Option<TokenPair>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: TokenPair) -> Self {
        Self {
            tokens: Mutex::new(Some(tokens)),
        }
    }
}

impl TokenStore for InMemoryTokenStore {
    fn get_token(&self) -> Option<String> {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|t| t.access.clone())
    }

    fn set_tokens(&self, tokens: TokenPair) -> Result<(), ApiError> {
        *self.tokens.lock().unwrap_or_else(PoisonError::into_inner) = Some(tokens);
        Ok(())
    }

    fn clear_tokens(&self) -> Result<(), ApiError> {
        *self.tokens.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// JSON file backed store with an in-memory copy
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    cached: Mutex<Option<TokenPair>>,
}

impl FileTokenStore {
    /// Opens the store, reading existing tokens if the file is there
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ApiError> {
        let path = path.into();
        let cached = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<TokenPair>(&content) {
                Ok(tokens) => Some(tokens),
                Err(e) => {
                    tracing::warn!("Ignoring unreadable token file {:?}: {}", path, e);
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(ApiError::TokenStore(format!("{}: {e}", path.display()))),
        };
        Ok(Self {
            path,
            cached: Mutex::new(cached),
        })
    }

    /// `tokens.json` under the platform data directory
    pub fn default_path() -> Option<PathBuf> {
        ConfigManager::get_app_data_dir().map(|dir| dir.join(TOKEN_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(&self, tokens: &TokenPair) -> Result<(), ApiError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ApiError::TokenStore(format!("{}: {e}", parent.display())))?;
        }
        let content = serde_json::to_string(tokens).map_err(|e| ApiError::TokenStore(e.to_string()))?;
        std::fs::write(&self.path, content)
            .map_err(|e| ApiError::TokenStore(format!("{}: {e}", self.path.display())))
    }
}

impl TokenStore for FileTokenStore {
    fn get_token(&self) -> Option<String> {
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|t| t.access.clone())
    }

    fn set_tokens(&self, tokens: TokenPair) -> Result<(), ApiError> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        self.write_file(&tokens)?;
        *cached = Some(tokens);
        Ok(())
    }

    fn clear_tokens(&self) -> Result<(), ApiError> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        *cached = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ApiError::TokenStore(format!("{}: {e}", self.path.display()))),
        }
    }
}
