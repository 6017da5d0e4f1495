// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Random access byte sources backing archive decoding.

use std::io::{Cursor, ErrorKind, Read, Seek, SeekFrom};

/// Capabilities required of the bytes backing an archive.
///
/// Sequential reads come from [Read] and rewinding from [Seek::rewind]. This
/// trait adds all-or-nothing positioned reads and a size query. It is
/// implemented for every `Read + Seek` type.
///
/// Positioned reads move the stream position. A single source must not be
/// shared by concurrent consumers.
pub trait ByteSource: Read + Seek {
    /// Read exactly `length` bytes starting at absolute `offset`.
    ///
    /// Fails with [ErrorKind::UnexpectedEof] if the source ends first.
    fn read_range(&mut self, offset: u64, length: u64) -> std::io::Result<Vec<u8>> {
        let size = self.source_size()?;

        match offset.checked_add(length) {
            Some(end) if end <= size => {}
            _ => {
                return Err(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!(
                        "range {}+{} exceeds source size {}",
                        offset, length, size
                    ),
                ));
            }
        }

        self.seek(SeekFrom::Start(offset))?;

        let mut buffer = vec![0u8; length as usize];
        self.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    /// Total size of the source in bytes.
    ///
    /// The current stream position is preserved.
    fn source_size(&mut self) -> std::io::Result<u64> {
        let position = self.stream_position()?;
        let size = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(position))?;

        Ok(size)
    }
}

impl<T: Read + Seek + ?Sized> ByteSource for T {}

/// Buffer a non-seekable stream into a rewindable in-memory source.
pub fn buffer_reader(mut reader: impl Read) -> std::io::Result<Cursor<Vec<u8>>> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;

    Ok(Cursor::new(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_range_within_bounds() -> std::io::Result<()> {
        let mut source = Cursor::new(b"0123456789".to_vec());

        assert_eq!(source.read_range(2, 3)?, b"234");
        assert_eq!(source.read_range(0, 10)?, b"0123456789");
        assert_eq!(source.read_range(10, 0)?, b"");

        Ok(())
    }

    #[test]
    fn read_range_is_all_or_nothing() {
        let mut source = Cursor::new(b"0123456789".to_vec());

        let err = source.read_range(8, 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);

        let err = source.read_range(u64::MAX, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn size_preserves_position() -> std::io::Result<()> {
        let mut source = Cursor::new(b"abcdef".to_vec());
        source.seek(SeekFrom::Start(2))?;

        assert_eq!(source.source_size()?, 6);
        assert_eq!(source.stream_position()?, 2);

        Ok(())
    }

    #[test]
    fn buffered_stream_rewinds() -> std::io::Result<()> {
        let mut source = buffer_reader(&b"hello world"[..])?;

        let mut first = String::new();
        source.read_to_string(&mut first)?;
        source.rewind()?;
        let mut second = String::new();
        source.read_to_string(&mut second)?;

        assert_eq!(first, "hello world");
        assert_eq!(first, second);

        Ok(())
    }
}
