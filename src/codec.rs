//! Compression codecs wrapped around the tar stream.
//!
//! The codec is a black box: bytes in, bytes out. zstd is the default;
//! gzip and uncompressed tar are chosen by file name.

use std::io::{self, Read, Write};
use std::ops::RangeInclusive;
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    Zstd,
    Gzip,
    None,
}

impl Compression {
    /// `.tar.gz`/`.tgz` is gzip, `.tar` is uncompressed, anything else zstd.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Compression::Gzip
        } else if name.ends_with(".tar") {
            Compression::None
        } else {
            Compression::Zstd
        }
    }

    pub fn level_range(self) -> RangeInclusive<i32> {
        match self {
            Compression::Zstd => 1..=19,
            Compression::Gzip => 1..=9,
            Compression::None => 0..=0,
        }
    }

    pub fn default_level(self) -> i32 {
        match self {
            Compression::Zstd => 3,
            Compression::Gzip => 6,
            Compression::None => 0,
        }
    }

    /// Rejects a level the codec does not support; uncompressed ignores it.
    pub fn check_level(self, level: i32) -> Result<()> {
        let range = self.level_range();
        if self == Compression::None || range.contains(&level) {
            return Ok(());
        }
        Err(Error::InvalidLevel {
            level,
            min: *range.start(),
            max: *range.end(),
        })
    }

    pub fn encoder<W: Write>(self, sink: W, level: i32) -> io::Result<Encoder<W>> {
        Ok(match self {
            Compression::Zstd => Encoder::Zstd(zstd::stream::write::Encoder::new(sink, level)?),
            Compression::Gzip => {
                let level = flate2::Compression::new(level.clamp(0, 9) as u32);
                Encoder::Gzip(GzEncoder::new(sink, level))
            }
            Compression::None => Encoder::Plain(sink),
        })
    }

    /// The stream is self-describing; no level is needed.
    pub fn decoder<'a, R: Read + 'a>(self, source: R) -> io::Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Compression::Zstd => Box::new(zstd::stream::read::Decoder::new(source)?),
            Compression::Gzip => Box::new(GzDecoder::new(source)),
            Compression::None => Box::new(source),
        })
    }
}

/// Encoder for one of the supported codecs. Call [`Encoder::finish`] to
/// flush the trailing frame.
pub enum Encoder<W: Write> {
    Zstd(zstd::stream::write::Encoder<'static, W>),
    Gzip(GzEncoder<W>),
    Plain(W),
}

impl<W: Write> Encoder<W> {
    pub fn finish(self) -> io::Result<W> {
        match self {
            Encoder::Zstd(encoder) => encoder.finish(),
            Encoder::Gzip(encoder) => encoder.finish(),
            Encoder::Plain(mut sink) => {
                sink.flush()?;
                Ok(sink)
            }
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::Zstd(encoder) => encoder.write(buf),
            Encoder::Gzip(encoder) => encoder.write(buf),
            Encoder::Plain(sink) => sink.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::Zstd(encoder) => encoder.flush(),
            Encoder::Gzip(encoder) => encoder.flush(),
            Encoder::Plain(sink) => sink.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_codec_from_name() {
        assert_eq!(Compression::from_path(Path::new("a.zst")), Compression::Zstd);
        assert_eq!(Compression::from_path(Path::new("a.tar.zst")), Compression::Zstd);
        assert_eq!(Compression::from_path(Path::new("dir/A.TAR.GZ")), Compression::Gzip);
        assert_eq!(Compression::from_path(Path::new("a.tgz")), Compression::Gzip);
        assert_eq!(Compression::from_path(Path::new("a.tar")), Compression::None);
        assert_eq!(Compression::from_path(Path::new("archive")), Compression::Zstd);
    }

    #[test]
    fn level_validation() {
        assert!(Compression::Zstd.check_level(1).is_ok());
        assert!(Compression::Zstd.check_level(19).is_ok());
        assert!(matches!(
            Compression::Zstd.check_level(20),
            Err(Error::InvalidLevel { level: 20, min: 1, max: 19 })
        ));
        assert!(Compression::Gzip.check_level(0).is_err());
        assert!(Compression::None.check_level(42).is_ok());
    }

    #[test]
    fn each_codec_restores_its_input() {
        let data = b"hello hello hello hello hello".repeat(100);
        for codec in [Compression::Zstd, Compression::Gzip, Compression::None] {
            let mut encoder = codec.encoder(Vec::new(), codec.default_level()).unwrap();
            encoder.write_all(&data).unwrap();
            let encoded = encoder.finish().unwrap();
            let mut decoded = Vec::new();
            codec.decoder(&encoded[..]).unwrap().read_to_end(&mut decoded).unwrap();
            assert_eq!(decoded, data, "{codec:?}");
        }
    }
}
