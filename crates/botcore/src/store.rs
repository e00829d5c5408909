//! JSON 檔案儲存
//!
//! 倒數清單與塔台紀錄共用：開啟時載入，每次變更後整份寫回。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// 儲存錯誤
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO 錯誤: {0}")]
    Io(#[from] io::Error),

    #[error("JSON 格式錯誤: {0}")]
    Json(#[from] serde_json::Error),
}

/// 確保檔案所在目錄存在
pub fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// 讀取 JSON 檔；檔案不存在時回傳 `None`
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&content)?))
}

/// 寫入 JSON 檔
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    ensure_parent_dir(path)?;
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content)?;
    debug!("已寫入 {}", path.display());
    Ok(())
}

/// 可選的檔案位置；未設定時只保存在記憶體
#[derive(Debug, Clone, Default)]
pub struct Backing {
    path: Option<PathBuf>,
}

impl Backing {
    pub fn memory() -> Self {
        Self { path: None }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn load<T: DeserializeOwned>(&self) -> Result<Option<T>, StoreError> {
        match &self.path {
            Some(path) => load_json(path),
            None => Ok(None),
        }
    }

    pub fn save<T: Serialize>(&self, value: &T) -> Result<(), StoreError> {
        match &self.path {
            Some(path) => save_json(path, value),
            None => Ok(()),
        }
    }
}
