//! 行切割模組
//!
//! 將任意切割的位元組流重組為以 `\r\n` 結尾的完整協定行。
//! 不完整的尾端片段會保留到下一次讀取，只有在連線結束時才會輸出。

use bytes::{Buf, Bytes, BytesMut};

use crate::encoding::TextCodec;

/// 協定行結尾
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// 預設單行最大長度（超過時以此長度分段輸出）
pub const DEFAULT_MAX_LINE_LEN: usize = 64 * 1024;

/// 一行原始資料（不含行結尾）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine(Bytes);

impl RawLine {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 以指定編碼解碼為文字，消耗此行
    pub fn into_text(self, codec: &TextCodec) -> String {
        codec.decode(&self.0)
    }
}

/// 行切割器
///
/// 無論位元組如何分批送達，輸出的行序列都與一次送達時相同。
#[derive(Debug)]
pub struct LineFramer {
    buffer: BytesMut,
    max_line_len: usize,
    /// 下次搜尋行結尾的起點，避免重複掃描已確認沒有結尾的區段
    scan_from: usize,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_max_line_len(DEFAULT_MAX_LINE_LEN)
    }

    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_line_len: max_line_len.max(1),
            scan_from: 0,
        }
    }

    /// 加入新讀到的位元組
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// 尚未組成完整行的位元組數
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// 取出下一個完整行；沒有完整行時回傳 `None`
    pub fn next_line(&mut self) -> Option<RawLine> {
        match find_terminator(&self.buffer, self.scan_from) {
            Some(pos) if pos <= self.max_line_len => {
                let line = self.buffer.split_to(pos).freeze();
                self.buffer.advance(LINE_TERMINATOR.len());
                self.scan_from = 0;
                Some(RawLine(line))
            }
            Some(_) => Some(self.split_oversized()),
            None if self.content_len() > self.max_line_len => Some(self.split_oversized()),
            None => {
                // 最後一個位元組可能是 `\r`，下次要從它開始找
                self.scan_from = self.buffer.len().saturating_sub(1);
                None
            }
        }
    }

    /// 連線結束：輸出剩餘的非空片段
    pub fn finish(&mut self) -> Option<RawLine> {
        self.scan_from = 0;
        if self.buffer.is_empty() {
            return None;
        }
        Some(RawLine(self.buffer.split().freeze()))
    }

    /// 依序取出目前所有完整行
    pub fn lines(&mut self) -> impl Iterator<Item = RawLine> + '_ {
        std::iter::from_fn(move || self.next_line())
    }

    /// 確定屬於行內容的位元組數；尾端的 `\r` 可能是行結尾的前半
    fn content_len(&self) -> usize {
        match self.buffer.last() {
            Some(b'\r') => self.buffer.len() - 1,
            _ => self.buffer.len(),
        }
    }

    fn split_oversized(&mut self) -> RawLine {
        self.scan_from = 0;
        RawLine(self.buffer.split_to(self.max_line_len).freeze())
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

fn find_terminator(buffer: &[u8], from: usize) -> Option<usize> {
    buffer
        .get(from..)?
        .windows(LINE_TERMINATOR.len())
        .position(|w| w == LINE_TERMINATOR)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn collect(framer: &mut LineFramer) -> Vec<Vec<u8>> {
        framer.lines().map(|l| l.as_bytes().to_vec()).collect()
    }

    fn frame_in_chunks(data: &[u8], chunk_sizes: &[usize], max_line_len: usize) -> Vec<Vec<u8>> {
        let mut framer = LineFramer::with_max_line_len(max_line_len);
        let mut lines = Vec::new();
        let mut rest = data;
        let mut sizes = chunk_sizes.iter().cycle();
        while !rest.is_empty() {
            let n = (*sizes.next().unwrap()).clamp(1, rest.len());
            framer.push(&rest[..n]);
            rest = &rest[n..];
            lines.extend(collect(&mut framer));
        }
        lines.extend(framer.finish().map(|l| l.as_bytes().to_vec()));
        lines
    }

    #[test]
    fn test_single_line() {
        let mut framer = LineFramer::new();
        framer.push(b"PING :abc\r\n");
        assert_eq!(collect(&mut framer), vec![b"PING :abc".to_vec()]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_partial_line_is_held_back() {
        let mut framer = LineFramer::new();
        framer.push(b"PING :ab");
        assert!(framer.next_line().is_none());
        framer.push(b"c\r\nPRIV");
        assert_eq!(collect(&mut framer), vec![b"PING :abc".to_vec()]);
        assert_eq!(framer.pending(), 4);
    }

    #[test]
    fn test_terminator_split_across_reads() {
        let mut framer = LineFramer::new();
        framer.push(b"one\r");
        assert!(framer.next_line().is_none());
        framer.push(b"\ntwo\r\n");
        assert_eq!(collect(&mut framer), vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn test_bare_newline_is_not_a_terminator() {
        let mut framer = LineFramer::new();
        framer.push(b"a\nb\rc\r\n");
        assert_eq!(collect(&mut framer), vec![b"a\nb\rc".to_vec()]);
    }

    #[test]
    fn test_empty_lines_are_kept() {
        let mut framer = LineFramer::new();
        framer.push(b"\r\n\r\nx\r\n");
        assert_eq!(collect(&mut framer), vec![vec![], vec![], b"x".to_vec()]);
    }

    #[test]
    fn test_finish_yields_trailing_fragment_once() {
        let mut framer = LineFramer::new();
        framer.push(b"done\r\nleftover");
        assert_eq!(collect(&mut framer), vec![b"done".to_vec()]);
        assert_eq!(framer.finish().unwrap().as_bytes(), b"leftover");
        assert!(framer.finish().is_none());
    }

    #[test]
    fn test_finish_on_empty_buffer() {
        let mut framer = LineFramer::new();
        framer.push(b"x\r\n");
        let _ = collect(&mut framer);
        assert!(framer.finish().is_none());
    }

    #[test]
    fn test_oversized_line_is_split_without_loss() {
        let mut framer = LineFramer::with_max_line_len(4);
        framer.push(b"abcdefghij\r\n");
        assert_eq!(
            collect(&mut framer),
            vec![b"abcd".to_vec(), b"efgh".to_vec(), b"ij".to_vec()]
        );
    }

    #[test]
    fn test_multibyte_text_split_across_reads() {
        let codec = TextCodec::default();
        let text = "價格 ok\r\n".as_bytes();
        let mut framer = LineFramer::new();
        framer.push(&text[..2]);
        assert!(framer.next_line().is_none());
        framer.push(&text[2..]);
        let line = framer.next_line().unwrap();
        assert_eq!(line.into_text(&codec), "價格 ok");
    }

    proptest! {
        #[test]
        fn prop_chunking_invariance(
            data in proptest::collection::vec(
                prop_oneof![Just(b'\r'), Just(b'\n'), Just(b'a'), Just(b' '), any::<u8>()],
                0..256,
            ),
            chunks in proptest::collection::vec(1usize..16, 1..8),
            max_line_len in 1usize..64,
        ) {
            let whole = frame_in_chunks(&data, &[data.len().max(1)], max_line_len);
            let chunked = frame_in_chunks(&data, &chunks, max_line_len);
            prop_assert_eq!(&whole, &chunked);
            for line in &whole {
                prop_assert!(line.windows(2).all(|w| w != LINE_TERMINATOR));
            }
        }

        #[test]
        fn prop_no_byte_lost_or_duplicated(
            data in proptest::collection::vec(any::<u8>(), 0..256),
            chunks in proptest::collection::vec(1usize..16, 1..8),
        ) {
            let lines = frame_in_chunks(&data, &chunks, DEFAULT_MAX_LINE_LEN);
            let terminators = data.len() - lines.iter().map(Vec::len).sum::<usize>();
            prop_assert_eq!(terminators % LINE_TERMINATOR.len(), 0);
        }
    }
}
