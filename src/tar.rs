//! Streaming tar (ustar) reader and writer
//!
//! Entries are written and read strictly in order, so neither side ever holds
//! a whole archive or a whole file in memory.
//!
//! # Usage
//!
//! ## Writing
//!
//! ```rust
//! use tarzst::tar::{EntryKind, TarHeader, TarWriter};
//!
//! let mut tar = TarWriter::new(Vec::new());
//! tar.append_dir(&TarHeader::new("docs".to_string(), EntryKind::Directory, 0o755, 0)).unwrap();
//! let body = b"Hello, World";
//! let header = TarHeader::new("docs/hello.txt".to_string(), EntryKind::Regular, 0o644, 12);
//! tar.append(&header, &body[..]).unwrap();
//! let bytes = tar.finish().unwrap();
//! assert_eq!(bytes.len() % 512, 0);
//! ```
//!
//! ## Reading
//!
//! ```rust
//! use std::io::Read;
//! use tarzst::tar::{EntryKind, TarHeader, TarReader, TarWriter};
//!
//! # let mut tar = TarWriter::new(Vec::new());
//! # let header = TarHeader::new("hello.txt".to_string(), EntryKind::Regular, 0o644, 5);
//! # tar.append(&header, &b"hello"[..]).unwrap();
//! # let bytes = tar.finish().unwrap();
//! let mut archive = TarReader::new(&bytes[..]);
//! while let Some(mut entry) = archive.next_entry().unwrap() {
//!     let mut content = String::new();
//!     entry.read_to_string(&mut content).unwrap();
//!     println!("{}: {}", entry.header.name, content);
//! }
//! ```

use std::io::{self, Read, Write};
use std::ops::Range;

/// Size of a header block and the payload alignment
pub const BLOCK_SIZE: usize = 512;

/// Mode bits kept on the way in and out; setuid, setgid and sticky are dropped
pub const PERMISSION_BITS: u32 = 0o777;

const NAME: Range<usize> = 0..100;
const MODE: Range<usize> = 100..108;
const UID: Range<usize> = 108..116;
const GID: Range<usize> = 116..124;
const SIZE: Range<usize> = 124..136;
const MTIME: Range<usize> = 136..148;
const CHECKSUM: Range<usize> = 148..156;
const TYPEFLAG: usize = 156;
const MAGIC: Range<usize> = 257..263;
const VERSION: Range<usize> = 263..265;
const PREFIX: Range<usize> = 345..500;

const GNU_LONG_NAME: u8 = b'L';
const LONG_LINK_NAME: &str = "././@LongLink";

/// Kind of an archive entry. Anything else found in an archive is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Directory,
}

impl EntryKind {
    fn typeflag(self) -> u8 {
        match self {
            EntryKind::Regular => b'0',
            EntryKind::Directory => b'5',
        }
    }

    fn from_typeflag(flag: u8) -> Option<Self> {
        match flag {
            b'0' | 0 | b'7' => Some(EntryKind::Regular),
            b'5' => Some(EntryKind::Directory),
            _ => None,
        }
    }
}

/// Tar header, reduced to what this crate stores and restores
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarHeader {
    /// Forward-slash path, without the trailing `/` of directories
    pub name: String,
    pub kind: EntryKind,
    pub mode: u32,
    /// Payload length; always 0 for directories
    pub size: u64,
    /// Seconds since the Unix epoch
    pub mtime: u64,
}

impl TarHeader {
    pub fn new(name: String, kind: EntryKind, mode: u32, size: u64) -> Self {
        let size = match kind {
            EntryKind::Regular => size,
            EntryKind::Directory => 0,
        };
        Self {
            name,
            kind,
            mode,
            size,
            mtime: 0,
        }
    }

    pub fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = mtime;
        self
    }

    /// Name as written to the archive; directories get a trailing `/`.
    fn stored_name(&self) -> String {
        match self.kind {
            EntryKind::Directory if !self.name.ends_with('/') => format!("{}/", self.name),
            _ => self.name.clone(),
        }
    }
}

/// Writes entries to any `Write`, usually a compression encoder.
pub struct TarWriter<W: Write> {
    inner: W,
}

impl<W: Write> TarWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Appends a header-only directory entry.
    pub fn append_dir(&mut self, header: &TarHeader) -> io::Result<()> {
        let mut header = header.clone();
        header.kind = EntryKind::Directory;
        header.size = 0;
        self.write_header(&header)
    }

    /// Appends a regular file, copying exactly `header.size` bytes from `data`.
    ///
    /// Fails with `UnexpectedEof` if `data` runs out first.
    pub fn append<R: Read>(&mut self, header: &TarHeader, data: R) -> io::Result<()> {
        if header.kind == EntryKind::Directory {
            return self.append_dir(header);
        }
        self.write_header(header)?;
        let copied = io::copy(&mut data.take(header.size), &mut self.inner)?;
        if copied != header.size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "{} shrank while being archived ({} of {} bytes)",
                    header.name, copied, header.size
                ),
            ));
        }
        self.write_padding(header.size)
    }

    /// Writes the end-of-archive marker and returns the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.write_all(&[0u8; BLOCK_SIZE * 2])?;
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn write_header(&mut self, header: &TarHeader) -> io::Result<()> {
        let name = header.stored_name();
        let (prefix, short_name) = match split_ustar_name(&name) {
            Some(split) => split,
            None => {
                // GNU long name: the full name travels as the payload of an `L` entry
                let mut payload = name.clone().into_bytes();
                payload.push(0);
                let size = payload.len() as u64;
                let block = create_header_block(
                    LONG_LINK_NAME.as_bytes(),
                    &[],
                    GNU_LONG_NAME,
                    0,
                    size,
                    0,
                );
                self.inner.write_all(&block)?;
                self.inner.write_all(&payload)?;
                self.write_padding(size)?;
                ("", truncate_bytes(&name, NAME.len()))
            }
        };
        let block = create_header_block(
            short_name.as_bytes(),
            prefix.as_bytes(),
            header.kind.typeflag(),
            header.mode & PERMISSION_BITS,
            header.size,
            header.mtime,
        );
        self.inner.write_all(&block)
    }

    fn write_padding(&mut self, size: u64) -> io::Result<()> {
        let padding = padding_for(size);
        if padding > 0 {
            self.inner.write_all(&[0u8; BLOCK_SIZE][..padding])?;
        }
        Ok(())
    }
}

/// Reads entries from any `Read`, usually a compression decoder.
pub struct TarReader<R: Read> {
    inner: R,
    /// Unread payload bytes of the current entry
    remaining: u64,
    /// Padding after the current entry's payload
    padding: u64,
    done: bool,
}

/// One entry; reading it yields exactly `header.size` payload bytes.
pub struct TarEntry<'a, R: Read> {
    pub header: TarHeader,
    archive: &'a mut TarReader<R>,
}

impl<R: Read> TarReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            remaining: 0,
            padding: 0,
            done: false,
        }
    }

    /// Returns the next regular file or directory, or `None` at the end marker.
    ///
    /// Whatever the previous entry left unread is skipped first. Entries of
    /// other types are skipped together with their payload.
    pub fn next_entry(&mut self) -> io::Result<Option<TarEntry<'_, R>>> {
        if self.done {
            return Ok(None);
        }
        let mut long_name: Option<String> = None;
        loop {
            self.skip_current()?;
            let mut block = [0u8; BLOCK_SIZE];
            if !self.read_block(&mut block)? {
                return Err(corrupted("archive ended without an end-of-archive marker"));
            }
            if is_empty_block(&block) {
                self.done = true;
                return Ok(None);
            }
            let raw = parse_header_block(&block)?;
            self.remaining = raw.size;
            self.padding = padding_for(raw.size) as u64;

            if raw.typeflag == GNU_LONG_NAME {
                long_name = Some(self.read_long_name(raw.size)?);
                continue;
            }
            let Some(kind) = EntryKind::from_typeflag(raw.typeflag) else {
                tracing::debug!(
                    name = %raw.name,
                    typeflag = %char::from(raw.typeflag),
                    "skipping unsupported tar entry"
                );
                long_name = None;
                continue;
            };
            let name = long_name.take().unwrap_or(raw.name);
            if kind == EntryKind::Directory {
                // A directory never hands out a payload
                self.skip_current()?;
            }
            let header = TarHeader {
                name: name.trim_end_matches('/').to_string(),
                kind,
                mode: raw.mode,
                size: self.remaining,
                mtime: raw.mtime,
            };
            return Ok(Some(TarEntry {
                header,
                archive: self,
            }));
        }
    }

    fn read_long_name(&mut self, size: u64) -> io::Result<String> {
        // Anything beyond a path-sized payload is not a long name
        if size > 64 * 1024 {
            return Err(corrupted("GNU long name entry is too large"));
        }
        let mut buf = Vec::with_capacity(size as usize);
        let read = (&mut self.inner).take(size).read_to_end(&mut buf)?;
        if read as u64 != size {
            return Err(truncated());
        }
        self.remaining = 0;
        Ok(read_str(&buf))
    }

    fn skip_current(&mut self) -> io::Result<()> {
        let pending = self.remaining + self.padding;
        if pending > 0 {
            let skipped = io::copy(&mut (&mut self.inner).take(pending), &mut io::sink())?;
            if skipped != pending {
                return Err(truncated());
            }
        }
        self.remaining = 0;
        self.padding = 0;
        Ok(())
    }

    /// Fills one block. `Ok(false)` on a clean end of input.
    fn read_block(&mut self, block: &mut [u8; BLOCK_SIZE]) -> io::Result<bool> {
        let mut filled = 0;
        while filled < BLOCK_SIZE {
            match self.inner.read(&mut block[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        match filled {
            0 => Ok(false),
            BLOCK_SIZE => Ok(true),
            _ => Err(truncated()),
        }
    }
}

impl<R: Read> Read for TarEntry<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let archive = &mut *self.archive;
        if archive.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = buf.len().min(usize::try_from(archive.remaining).unwrap_or(usize::MAX));
        let n = archive.inner.read(&mut buf[..max])?;
        if n == 0 {
            return Err(truncated());
        }
        archive.remaining -= n as u64;
        Ok(n)
    }
}

/// Header fields as found in a block, before interpretation
struct RawHeader {
    name: String,
    mode: u32,
    size: u64,
    mtime: u64,
    typeflag: u8,
}

fn parse_header_block(block: &[u8; BLOCK_SIZE]) -> io::Result<RawHeader> {
    let stored = read_numeric(&block[CHECKSUM])?;
    if stored != calc_checksum(block) as u64 {
        return Err(corrupted("header checksum mismatch"));
    }
    let name = read_str(&block[NAME]);
    // Old GNU headers ("ustar  ") keep other data where the prefix would be
    let is_ustar = &block[MAGIC] == b"ustar\0";
    let prefix = if is_ustar {
        read_str(&block[PREFIX])
    } else {
        String::new()
    };
    let name = if prefix.is_empty() {
        name
    } else {
        format!("{}/{}", prefix, name)
    };
    Ok(RawHeader {
        name,
        mode: (read_numeric(&block[MODE])? & PERMISSION_BITS as u64) as u32,
        size: read_numeric(&block[SIZE])?,
        mtime: read_numeric(&block[MTIME])?,
        typeflag: block[TYPEFLAG],
    })
}

fn create_header_block(
    name: &[u8],
    prefix: &[u8],
    typeflag: u8,
    mode: u32,
    size: u64,
    mtime: u64,
) -> [u8; BLOCK_SIZE] {
    let mut data = [0u8; BLOCK_SIZE];
    let name_len = name.len().min(NAME.len());
    data[..name_len].copy_from_slice(&name[..name_len]);
    write_numeric(&mut data[MODE], mode as u64);
    write_numeric(&mut data[UID], 0);
    write_numeric(&mut data[GID], 0);
    write_numeric(&mut data[SIZE], size);
    write_numeric(&mut data[MTIME], mtime);
    data[TYPEFLAG] = typeflag;
    data[MAGIC].copy_from_slice(b"ustar\0");
    data[VERSION].copy_from_slice(b"00");
    let prefix_len = prefix.len().min(PREFIX.len());
    data[PREFIX.start..PREFIX.start + prefix_len].copy_from_slice(&prefix[..prefix_len]);

    let checksum = calc_checksum(&data);
    let checksum_str = format!("{:06o}\0 ", checksum);
    data[CHECKSUM].copy_from_slice(checksum_str.as_bytes());
    data
}

/// Splits a name into ustar `(prefix, name)`, or `None` if it cannot fit.
fn split_ustar_name(name: &str) -> Option<(&str, &str)> {
    if name.len() <= NAME.len() {
        return Some(("", name));
    }
    if name.len() > PREFIX.len() + 1 + NAME.len() {
        return None;
    }
    name.char_indices()
        .filter(|&(i, c)| c == '/' && i > 0 && i <= PREFIX.len())
        .map(|(i, _)| (&name[..i], &name[i + 1..]))
        .find(|(_, rest)| !rest.is_empty() && rest.len() <= NAME.len())
}

fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Octal, NUL-terminated; GNU base-256 when the value does not fit.
fn write_numeric(field: &mut [u8], value: u64) {
    let digits = field.len() - 1;
    if value < 1u64 << (3 * digits) {
        let s = format!("{:0width$o}", value, width = digits);
        field[..digits].copy_from_slice(s.as_bytes());
        field[digits] = 0;
    } else {
        field.fill(0);
        let n = field.len();
        field[n - 8..].copy_from_slice(&value.to_be_bytes());
        field[0] |= 0x80;
    }
}

fn read_numeric(field: &[u8]) -> io::Result<u64> {
    if field[0] & 0x80 != 0 {
        let mut value: u64 = 0;
        for (i, &b) in field.iter().enumerate() {
            let b = if i == 0 { b & 0x7f } else { b };
            value = value
                .checked_mul(256)
                .and_then(|v| v.checked_add(b as u64))
                .ok_or_else(|| corrupted("numeric field overflows 64 bits"))?;
        }
        return Ok(value);
    }
    let s = String::from_utf8_lossy(field);
    let s = s.trim_matches(|c| c == '\0' || c == ' ');
    if s.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(s, 8).map_err(|_| corrupted("invalid octal number in header"))
}

/// String up to the first NUL
fn read_str(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

fn is_empty_block(data: &[u8]) -> bool {
    data.iter().all(|&b| b == 0)
}

fn padding_for(size: u64) -> usize {
    let rem = (size % BLOCK_SIZE as u64) as usize;
    if rem == 0 { 0 } else { BLOCK_SIZE - rem }
}

/// Calc checksum of the header bytes, counting the checksum field as spaces
pub fn calc_checksum(data: &[u8]) -> u32 {
    if data.len() < BLOCK_SIZE {
        return 0;
    }
    let mut sum: u32 = 0;
    for (i, &b) in data.iter().take(BLOCK_SIZE).enumerate() {
        if CHECKSUM.contains(&i) {
            sum += b' ' as u32;
        } else {
            sum += b as u32;
        }
    }
    sum
}

fn corrupted(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

fn truncated() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "archive is truncated")
}
