//! 文字編解碼模組
//!
//! IRC 只規定位元組，不規定字元集；大多數伺服器使用 UTF-8，
//! 但舊網路仍可能使用 latin1、Big5 等編碼，因此編碼可由設定指定。

use encoding_rs::{Encoding, UTF_8};

/// 連線使用的文字編解碼器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextCodec {
    encoding: &'static Encoding,
}

impl TextCodec {
    /// 以 WHATWG 編碼標籤建立編解碼器（例如 `utf-8`、`big5`、`latin1`）
    ///
    /// 未知的標籤回傳 `None`
    ///
    /// # Example
    /// ```
    /// use botcore::encoding::TextCodec;
    ///
    /// assert!(TextCodec::for_label("utf-8").is_some());
    /// assert!(TextCodec::for_label("no-such-charset").is_none());
    /// ```
    pub fn for_label(label: &str) -> Option<Self> {
        Encoding::for_label(label.trim().as_bytes()).map(|encoding| Self { encoding })
    }

    /// 編碼名稱
    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }

    /// 將位元組解碼為字串（無效序列以 U+FFFD 取代）
    pub fn decode(&self, bytes: &[u8]) -> String {
        let (decoded, _, _) = self.encoding.decode(bytes);
        decoded.into_owned()
    }

    /// 將字串編碼為位元組（無法編碼的字元會被替換）
    pub fn encode(&self, text: &str) -> Vec<u8> {
        let (encoded, _, _) = self.encoding.encode(text);
        encoded.into_owned()
    }
}

impl Default for TextCodec {
    fn default() -> Self {
        Self { encoding: UTF_8 }
    }
}
