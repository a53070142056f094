//! `data: <json>` frame extraction from chunked response bodies.
//!
//! Transport buffering (`FrameDecoder`) is kept apart from frame
//! interpretation: `FrameReader` turns any `Read` into a pull-based iterator
//! of parsed frames, used by both the push channel and chat turns.
use std::collections::VecDeque;
use std::io::{self, Read};
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use tracing::debug;

pub const DATA_PREFIX: &str = "data: ";

/// Sentinel some servers send after the last frame
const DONE_SENTINEL: &str = "[DONE]";

const READ_CHUNK: usize = 8 * 1024;

/// Reassembles newline-delimited lines from arbitrary byte chunks.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk. Returns the payload of every `data: ` line completed by it;
    /// the unterminated tail stays buffered for the next chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + pos;
            if let Some(payload) = data_payload(&self.buffer[start..end]) {
                payloads.push(payload);
            }
            start = end + 1;
        }
        self.buffer.drain(..start);
        payloads
    }

    /// End of body: a final line without trailing newline still counts.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        data_payload(&rest)
    }

    /// Bytes waiting for their line terminator
    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    // Decoding per complete line keeps multi-byte characters split across chunks intact.
    let line = String::from_utf8_lossy(line);
    let payload = line.trim_end_matches('\r').strip_prefix(DATA_PREFIX)?;
    if payload == DONE_SENTINEL {
        return None;
    }
    Some(payload.to_string())
}

/// Pull-based iterator of typed frames over a chunked body.
///
/// Malformed JSON frames are dropped; a read error ends the iteration after
/// being yielded once.
pub struct FrameReader<R, T> {
    reader: R,
    decoder: FrameDecoder,
    ready: VecDeque<String>,
    buf: Box<[u8]>,
    eof: bool,
    _frame: PhantomData<fn() -> T>,
}

impl<R: Read, T: DeserializeOwned> FrameReader<R, T> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(),
            ready: VecDeque::new(),
            buf: vec![0u8; READ_CHUNK].into_boxed_slice(),
            eof: false,
            _frame: PhantomData,
        }
    }
}

impl<R: Read, T: DeserializeOwned> Iterator for FrameReader<R, T> {
    type Item = io::Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            while let Some(payload) = self.ready.pop_front() {
                match serde_json::from_str::<T>(&payload) {
                    Ok(frame) => return Some(Ok(frame)),
                    Err(e) => debug!(error = %e, bytes = payload.len(), "dropping malformed frame"),
                }
            }
            if self.eof {
                return None;
            }
            match self.reader.read(&mut self.buf) {
                Ok(0) => {
                    self.eof = true;
                    self.ready.extend(self.decoder.finish());
                }
                Ok(n) => {
                    let payloads = self.decoder.push(&self.buf[..n]);
                    self.ready.extend(payloads);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.eof = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::Value;

    /// Reader that hands out its bytes in fixed-size chunks.
    pub(crate) struct ChunkedReader {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl ChunkedReader {
        pub(crate) fn new(data: &str, chunk: usize) -> Self {
            Self { data: data.as_bytes().to_vec(), pos: 0, chunk: chunk.max(1) }
        }
    }

    impl Read for ChunkedReader {
        fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
            let n = self.chunk.min(out.len()).min(self.data.len() - self.pos);
            out[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn frame_split_at_every_offset_yields_exactly_once() {
        let body = "event: x\ndata: {\"type\":\"token\",\"text\":\"héllo\"}\n\n";
        let bytes = body.as_bytes();
        for split in 1..bytes.len() {
            let mut decoder = FrameDecoder::new();
            let mut frames = decoder.push(&bytes[..split]);
            frames.extend(decoder.push(&bytes[split..]));
            assert_eq!(frames.len(), 1, "split at {}", split);
            let value: Value = serde_json::from_str(&frames[0]).unwrap();
            assert_eq!(value["text"], "héllo");
        }
    }

    #[test]
    fn ignores_non_data_lines_and_strips_carriage_returns() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b": keepalive\r\nid: 4\r\ndata: {\"a\":1}\r\ndata: [DONE]\r\n");
        assert_eq!(frames, vec!["{\"a\":1}".to_string()]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn incomplete_tail_waits_for_more_input() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert_eq!(decoder.pending(), 10);
        assert_eq!(decoder.push(b":2}\n"), vec!["{\"a\":2}".to_string()]);
    }

    #[test]
    fn reader_drops_malformed_frames_and_keeps_going() {
        let body = "data: {\"n\":1}\ndata: {broken\ndata: {\"n\":2}\ndata: {\"n\":3}";
        for chunk in [1, 3, 7, 64] {
            let frames: Vec<Value> =
                FrameReader::new(ChunkedReader::new(body, chunk)).collect::<io::Result<_>>().unwrap();
            let ns: Vec<i64> = frames.iter().filter_map(|v| v["n"].as_i64()).collect();
            assert_eq!(ns, vec![1, 2, 3], "chunk size {}", chunk);
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
        }
    }

    #[test]
    fn read_error_is_yielded_once() {
        let mut reader: FrameReader<_, Value> = FrameReader::new(FailingReader);
        assert!(matches!(reader.next(), Some(Err(_))));
        assert!(reader.next().is_none());
    }
}
