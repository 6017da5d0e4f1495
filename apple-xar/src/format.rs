// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::{Error, XarResult},
    digest::DynDigest,
    scroll::{IOread, IOwrite, Pread, Pwrite, SizeWith},
    std::io::{ErrorKind, Read},
};

/// File magic of XAR archives: `xar!`.
pub const XAR_MAGIC: u32 = 0x7861_7221;

/// Size in bytes of the fixed portion of the header.
pub const XAR_HEADER_SIZE: usize = 28;

/// A XAR archive header.
///
/// The header effectively defines a table of contents, which
/// holds information about the content of the archive.
#[derive(Clone, Copy, Debug, IOread, IOwrite, Pread, Pwrite, SizeWith)]
pub struct XarHeader {
    /// File magic. `xar!`.
    pub magic: u32,

    /// Size of this header + magic.
    pub size: u16,

    /// Format version number.
    pub version: u16,

    /// Size in bytes of zlib compressed table of contents.
    pub toc_length_compressed: u64,

    /// Size in bytes of uncompressed table of contents.
    pub toc_length_uncompressed: u64,

    /// Checksum algorithm used.
    pub checksum_algorithm_id: u32,
}

impl XarHeader {
    /// Decode the fixed 28 byte big-endian header from the start of a reader.
    ///
    /// The magic is validated before the rest of the header so inputs that
    /// aren't XAR archives report [Error::BadMagic] even when short.
    pub fn from_reader(mut reader: impl Read) -> XarResult<Self> {
        let mut data = [0u8; XAR_HEADER_SIZE];
        let mut filled = 0;

        while filled < data.len() {
            match reader.read(&mut data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        if filled < 4 {
            return Err(Error::HeaderTruncated);
        }

        let magic = data.pread_with::<u32>(0, scroll::BE)?;
        if magic != XAR_MAGIC {
            return Err(Error::BadMagic(magic));
        }

        if filled < XAR_HEADER_SIZE {
            return Err(Error::HeaderTruncated);
        }

        let header = data.pread_with::<XarHeader>(0, scroll::BE)?;

        if (header.size as usize) < XAR_HEADER_SIZE {
            return Err(Error::HeaderSize(header.size));
        }

        Ok(header)
    }

    /// Absolute offset of the first byte of the compressed table of contents.
    pub fn toc_start_offset(&self) -> u64 {
        self.size as u64
    }

    /// Absolute offset where the heap begins.
    pub fn heap_start_offset(&self) -> u64 {
        self.toc_start_offset()
            .saturating_add(self.toc_length_compressed)
    }

    /// The checksum algorithm declared by this header.
    pub fn checksum(&self) -> XarChecksum {
        XarChecksum::from(self.checksum_algorithm_id)
    }
}

/// Checksum format used in file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum XarChecksum {
    None,
    Sha1,
    Md5,
    Sha256,
    Sha512,
    Other(u32),
}

impl From<u32> for XarChecksum {
    fn from(i: u32) -> Self {
        match i {
            0 => Self::None,
            1 => Self::Sha1,
            2 => Self::Md5,
            3 => Self::Sha256,
            4 => Self::Sha512,
            _ => Self::Other(i),
        }
    }
}

impl From<XarChecksum> for u32 {
    fn from(c: XarChecksum) -> Self {
        match c {
            XarChecksum::None => 0,
            XarChecksum::Sha1 => 1,
            XarChecksum::Md5 => 2,
            XarChecksum::Sha256 => 3,
            XarChecksum::Sha512 => 4,
            XarChecksum::Other(v) => v,
        }
    }
}

impl XarChecksum {
    /// Obtain a hasher for digesting the table of contents.
    ///
    /// Only SHA-1, SHA-256, and SHA-512 are recognized for table of contents
    /// checksums. Anything else is [Error::UnsupportedAlgorithm].
    pub fn toc_hasher(&self) -> XarResult<Box<dyn DynDigest>> {
        match self {
            Self::Sha1 => Ok(Box::new(sha1::Sha1::default())),
            Self::Sha256 => Ok(Box::new(sha2::Sha256::default())),
            Self::Sha512 => Ok(Box::new(sha2::Sha512::default())),
            Self::None | Self::Md5 | Self::Other(_) => {
                Err(Error::UnsupportedAlgorithm(u32::from(*self)))
            }
        }
    }
}
