//! Streaming response compressors (§4.4).
//!
//! Each compressor buffers into an intermediate chunk sized from
//! [`RespLimits::response_buffer_size`] and is driven incrementally by
//! [`crate::http::body::BodyStream`] rather than asked to compress a whole
//! body at once — bodies can be larger than `MaxResponseBody` is comfortable
//! holding twice over.

use crate::errors::ServerError;
use crate::http::types::CompressMethod;
use std::io::Write;

/// A streaming compressor: repeated `write` calls feed source bytes in,
/// `finish` flushes and returns whatever the compressor still had buffered.
pub(crate) trait Compressor: Send {
    fn write(&mut self, chunk: &[u8]) -> Result<Vec<u8>, ServerError>;
    fn finish(&mut self) -> Result<Vec<u8>, ServerError>;
}

/// Builds the compressor for a negotiated encoding, or `None` for
/// [`CompressMethod::Identity`] (no transformation, `Content-Encoding`
/// omitted).
pub(crate) fn build(method: CompressMethod, buffer_size: usize) -> Option<Box<dyn Compressor>> {
    match method {
        CompressMethod::Identity => None,
        CompressMethod::Gzip => Some(Box::new(ZlibCompressor::new(buffer_size, true))),
        CompressMethod::Deflate => Some(Box::new(ZlibCompressor::new(buffer_size, false))),
        CompressMethod::Brotli => Some(Box::new(BrotliCompressor::new(buffer_size))),
        CompressMethod::Zstd => Some(Box::new(ZstdCompressor::new(buffer_size))),
    }
}

/// Shared by gzip and raw deflate: zlib's encoder picks the framing from
/// `Compression`/wrapper choice, gzip gets a 10-byte header + CRC trailer
/// where deflate has none.
struct ZlibCompressor {
    encoder: flate2::write::GzEncoder<Vec<u8>>,
    deflate: Option<flate2::write::DeflateEncoder<Vec<u8>>>,
    is_gzip: bool,
}

impl ZlibCompressor {
    fn new(buffer_size: usize, is_gzip: bool) -> Self {
        let level = flate2::Compression::default();
        if is_gzip {
            ZlibCompressor {
                encoder: flate2::write::GzEncoder::new(Vec::with_capacity(buffer_size), level),
                deflate: None,
                is_gzip: true,
            }
        } else {
            ZlibCompressor {
                encoder: flate2::write::GzEncoder::new(Vec::new(), level),
                deflate: Some(flate2::write::DeflateEncoder::new(Vec::with_capacity(buffer_size), level)),
                is_gzip: false,
            }
        }
    }
}

impl Compressor for ZlibCompressor {
    fn write(&mut self, chunk: &[u8]) -> Result<Vec<u8>, ServerError> {
        if self.is_gzip {
            self.encoder.write_all(chunk).map_err(|_| ServerError::CompressorFailure)?;
            Ok(self.encoder.get_mut().drain(..).collect())
        } else {
            let enc = self.deflate.as_mut().expect("deflate encoder present");
            enc.write_all(chunk).map_err(|_| ServerError::CompressorFailure)?;
            Ok(enc.get_mut().drain(..).collect())
        }
    }

    fn finish(&mut self) -> Result<Vec<u8>, ServerError> {
        if self.is_gzip {
            self.encoder.try_finish().map_err(|_| ServerError::CompressorFailure)?;
            Ok(self.encoder.get_mut().drain(..).collect())
        } else {
            let enc = self.deflate.as_mut().expect("deflate encoder present");
            enc.try_finish().map_err(|_| ServerError::CompressorFailure)?;
            Ok(enc.get_mut().drain(..).collect())
        }
    }
}

struct BrotliCompressor {
    encoder: brotli::CompressorWriter<Vec<u8>>,
}

impl BrotliCompressor {
    fn new(buffer_size: usize) -> Self {
        BrotliCompressor {
            encoder: brotli::CompressorWriter::new(Vec::with_capacity(buffer_size), buffer_size, 5, 22),
        }
    }
}

impl Compressor for BrotliCompressor {
    fn write(&mut self, chunk: &[u8]) -> Result<Vec<u8>, ServerError> {
        self.encoder.write_all(chunk).map_err(|_| ServerError::CompressorFailure)?;
        self.encoder.flush().map_err(|_| ServerError::CompressorFailure)?;
        Ok(self.encoder.get_mut().drain(..).collect())
    }

    fn finish(&mut self) -> Result<Vec<u8>, ServerError> {
        self.encoder.flush().map_err(|_| ServerError::CompressorFailure)?;
        Ok(self.encoder.get_mut().drain(..).collect())
    }
}

struct ZstdCompressor {
    encoder: Option<zstd::stream::write::Encoder<'static, Vec<u8>>>,
}

impl ZstdCompressor {
    fn new(buffer_size: usize) -> Self {
        let encoder = zstd::stream::write::Encoder::new(Vec::with_capacity(buffer_size), 3)
            .expect("zstd encoder init");
        ZstdCompressor { encoder: Some(encoder) }
    }
}

impl Compressor for ZstdCompressor {
    fn write(&mut self, chunk: &[u8]) -> Result<Vec<u8>, ServerError> {
        let enc = self.encoder.as_mut().expect("zstd encoder present");
        enc.write_all(chunk).map_err(|_| ServerError::CompressorFailure)?;
        enc.flush().map_err(|_| ServerError::CompressorFailure)?;
        Ok(enc.get_mut().drain(..).collect())
    }

    fn finish(&mut self) -> Result<Vec<u8>, ServerError> {
        let enc = self.encoder.take().expect("zstd encoder present");
        let out = enc.finish().map_err(|_| ServerError::CompressorFailure)?;
        Ok(out)
    }
}

/// Picks the strongest encoding the client accepts that the server supports,
/// preferring brotli > zstd > gzip > deflate when several are acceptable
/// with equal standing (the request carries no numeric weights past parsing
/// — see [`crate::http::request`]).
pub(crate) fn negotiate(accepted: &[String]) -> CompressMethod {
    const PREFERENCE: [CompressMethod; 4] = [
        CompressMethod::Brotli,
        CompressMethod::Zstd,
        CompressMethod::Gzip,
        CompressMethod::Deflate,
    ];
    if accepted.iter().any(|e| e == "*") {
        return PREFERENCE[0];
    }
    for candidate in PREFERENCE {
        if accepted.iter().any(|e| CompressMethod::from_token(e) == Some(candidate)) {
            return candidate;
        }
    }
    CompressMethod::Identity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_prefers_brotli_then_zstd_then_gzip() {
        assert_eq!(negotiate(&["gzip".into(), "br".into()]), CompressMethod::Brotli);
        assert_eq!(negotiate(&["gzip".into(), "zstd".into()]), CompressMethod::Zstd);
        assert_eq!(negotiate(&["gzip".into()]), CompressMethod::Gzip);
        assert_eq!(negotiate(&["deflate".into()]), CompressMethod::Deflate);
        assert_eq!(negotiate(&["identity".into()]), CompressMethod::Identity);
        assert_eq!(negotiate(&[]), CompressMethod::Identity);
    }

    #[test]
    fn negotiate_wildcard_picks_strongest() {
        assert_eq!(negotiate(&["*".into()]), CompressMethod::Brotli);
    }

    #[test]
    fn gzip_round_trips_through_flate2_decoder() {
        let mut gz = ZlibCompressor::new(4096, true);
        let mut out = gz.write(b"hello world, hello world").unwrap();
        out.extend(gz.finish().unwrap());

        let mut decoder = flate2::read::GzDecoder::new(out.as_slice());
        let mut decoded = Vec::new();
        std::io::Read::read_to_end(&mut decoder, &mut decoded).unwrap();
        assert_eq!(decoded, b"hello world, hello world");
    }

    #[test]
    fn deflate_round_trips() {
        let mut d = ZlibCompressor::new(4096, false);
        let mut out = d.write(b"some body bytes").unwrap();
        out.extend(d.finish().unwrap());

        let mut decoder = flate2::read::DeflateDecoder::new(out.as_slice());
        let mut decoded = Vec::new();
        std::io::Read::read_to_end(&mut decoder, &mut decoded).unwrap();
        assert_eq!(decoded, b"some body bytes");
    }
}
