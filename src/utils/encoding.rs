//! Ordered-codec file decoding.
//!
//! Inputs are read as UTF-8 first; if that fails anywhere in the file, the
//! whole pass is re-run with a Latin-1 reader. Callers rebuild their state
//! from scratch on each attempt, so a decode failure never leaves partially
//! accumulated results behind.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use tracing::warn;

use crate::{LacunaError, Result};

/// Text codecs attempted when reading an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Utf8,
    Latin1,
}

impl Codec {
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Utf8 => "UTF-8",
            Codec::Latin1 => "Latin-1",
        }
    }
}

/// Fallback order: first codec whose full pass succeeds wins.
pub const CODEC_FALLBACK: &[Codec] = &[Codec::Utf8, Codec::Latin1];

/// Run `pass` once per codec in `CODEC_FALLBACK`. A `Decode` error moves on
/// to the next codec; any other error aborts immediately.
pub fn with_codec_fallback<T>(mut pass: impl FnMut(Codec) -> Result<T>) -> Result<T> {
    let mut last_err = None;
    for (i, &codec) in CODEC_FALLBACK.iter().enumerate() {
        match pass(codec) {
            Ok(value) => return Ok(value),
            Err(LacunaError::Decode(msg)) => {
                if i + 1 < CODEC_FALLBACK.len() {
                    warn!(
                        "{} decoding failed, retrying with {}",
                        codec.name(),
                        CODEC_FALLBACK[i + 1].name()
                    );
                }
                last_err = Some(LacunaError::Decode(msg));
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| LacunaError::Decode("no codec succeeded".to_string())))
}

/// Open `path` for reading, transcoding to UTF-8 according to `codec`.
pub fn open_decoded(path: &Path, codec: Codec) -> Result<Box<dyn Read>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(match codec {
        Codec::Utf8 => Box::new(reader),
        Codec::Latin1 => Box::new(Latin1Reader::new(reader)),
    })
}

/// Classify a csv error: invalid UTF-8 becomes `Decode` so the codec
/// fallback can retry the pass; everything else passes through.
pub fn classify_csv_error(e: csv::Error) -> LacunaError {
    if matches!(e.kind(), csv::ErrorKind::Utf8 { .. }) {
        LacunaError::Decode(e.to_string())
    } else {
        LacunaError::Csv(e)
    }
}

/// Adapter that re-encodes a Latin-1 byte stream as UTF-8. Latin-1 maps
/// bytes 0x80..=0xFF directly to U+0080..U+00FF, so each such byte expands
/// to a two-byte UTF-8 sequence; ASCII passes through unchanged.
pub struct Latin1Reader<R: Read> {
    inner: R,
    pending: Vec<u8>,
    pos: usize,
}

impl<R: Read> Latin1Reader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            pos: 0,
        }
    }
}

impl<R: Read> Read for Latin1Reader<R> {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        if self.pos == self.pending.len() {
            let mut raw = [0u8; 4096];
            let n = self.inner.read(&mut raw)?;
            if n == 0 {
                return Ok(0);
            }
            self.pending.clear();
            self.pos = 0;
            for &b in &raw[..n] {
                if b < 0x80 {
                    self.pending.push(b);
                } else {
                    self.pending.push(0xC0 | (b >> 6));
                    self.pending.push(0x80 | (b & 0x3F));
                }
            }
        }

        let n = (self.pending.len() - self.pos).min(out.len());
        out[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
