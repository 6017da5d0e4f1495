// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::{
        format::XarHeader,
        source::ByteSource,
        table_of_contents::{
            DataDescriptor, Encoding, SignatureMarkers, TableOfContents, TocEntry,
        },
        Error, XarResult,
    },
    log::{debug, warn},
    std::{
        cmp::min,
        fmt::Debug,
        io::{ErrorKind, Read},
    },
};

/// Upper bound on buffer space reserved up front from sizes declared in the archive.
///
/// Declared sizes are untrusted. Buffers still grow past this as real data arrives.
pub const MAX_PREALLOCATION: u64 = 16 * 1024 * 1024;

/// Largest decompressed table of contents that will be accepted.
pub const MAX_TOC_SIZE: u64 = 512 * 1024 * 1024;

/// Largest decoded entry that will be accepted.
pub const MAX_ENTRY_SIZE: u64 = 256 * 1024 * 1024;

/// How the header and table of contents are interpreted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseMode {
    /// Bulk metadata extraction.
    ///
    /// The header checksum algorithm is read but not validated.
    Metadata,

    /// Signature detection.
    ///
    /// The header checksum algorithm must be recognized and the compressed
    /// table of contents is digested with it. The digest is not compared
    /// against anything.
    Signature,
}

/// Read-only interface to a single XAR archive.
#[derive(Debug)]
pub struct XarReader<R: ByteSource + Debug> {
    /// Reader of raw XAR archive content.
    reader: R,

    /// Parsed file header.
    header: XarHeader,

    /// Parsed table of contents.
    toc: TableOfContents,

    /// Signature elements seen in the table of contents.
    signatures: SignatureMarkers,

    /// Absolute offset within the reader where the heap begins.
    heap_start_offset: u64,

    /// Total size of the source.
    source_size: u64,

    /// Digest of the compressed table of contents, in [ParseMode::Signature].
    toc_digest: Option<Vec<u8>>,
}

impl<R: ByteSource + Debug> XarReader<R> {
    /// Construct a new XAR reader for metadata extraction.
    pub fn new(reader: R) -> XarResult<Self> {
        Self::with_mode(reader, ParseMode::Metadata)
    }

    /// Construct a new XAR reader, parsing the header and table of contents.
    ///
    /// The source is rewound first, so any prior position is irrelevant.
    pub fn with_mode(mut reader: R, mode: ParseMode) -> XarResult<Self> {
        reader.rewind()?;
        let source_size = reader.source_size()?;

        let header = XarHeader::from_reader(&mut reader)?;
        debug!(
            "XAR header: version {}, header size {}, TOC {} bytes compressed / {} bytes uncompressed, checksum {:?}",
            header.version,
            header.size,
            header.toc_length_compressed,
            header.toc_length_uncompressed,
            header.checksum()
        );

        let mut hasher = match mode {
            ParseMode::Metadata => None,
            ParseMode::Signature => Some(header.checksum().toc_hasher()?),
        };

        let heap_start_offset = header.heap_start_offset();
        if heap_start_offset > source_size {
            return Err(Error::TableOfContentsBounds);
        }

        let toc_compressed =
            reader.read_range(header.toc_start_offset(), header.toc_length_compressed)?;

        let toc_digest = hasher.as_mut().map(|hasher| {
            hasher.update(&toc_compressed);
            hasher.finalize_reset().to_vec()
        });

        if let Some(digest) = &toc_digest {
            debug!("table of contents digest: {}", hex::encode(digest));
        }

        let toc_data = decompress_toc(&toc_compressed, header.toc_length_uncompressed)?;

        let toc = TableOfContents::from_reader(toc_data.as_slice())?;
        let signatures = SignatureMarkers::from_xml(toc_data.as_slice())?;

        debug!(
            "decoded table of contents with {} top-level entries (signature: {}, x-signature: {})",
            toc.files.len(),
            signatures.signature,
            signatures.x_signature
        );

        Ok(Self {
            reader,
            header,
            toc,
            signatures,
            heap_start_offset,
            source_size,
            toc_digest,
        })
    }

    /// Obtain the inner reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Obtain the parsed [XarHeader] file header.
    pub fn header(&self) -> &XarHeader {
        &self.header
    }

    /// The start offset of the heap.
    pub fn heap_start_offset(&self) -> u64 {
        self.heap_start_offset
    }

    /// Total size in bytes of the underlying source.
    pub fn source_size(&self) -> u64 {
        self.source_size
    }

    /// Obtain the table of contents for this archive.
    pub fn table_of_contents(&self) -> &TableOfContents {
        &self.toc
    }

    /// Signature elements present in the table of contents.
    pub fn signature_markers(&self) -> SignatureMarkers {
        self.signatures
    }

    /// Digest of the compressed table of contents.
    ///
    /// Only computed in [ParseMode::Signature].
    pub fn toc_digest(&self) -> Option<&[u8]> {
        self.toc_digest.as_deref()
    }

    /// Obtain the top-level entries in this archive.
    pub fn entries(&self) -> Vec<TocEntry> {
        self.toc.entries()
    }

    /// Attempt to find the top-level entry with a given name.
    ///
    /// If multiple entries share the name, the last one wins.
    pub fn find_entry(&self, name: &str) -> Option<TocEntry> {
        self.entries().into_iter().rev().find(|entry| entry.name == name)
    }

    /// Resolve the raw heap bytes for an entry.
    ///
    /// This is the data as stored, before any decoding.
    pub fn entry_data_heap(&mut self, entry: &TocEntry) -> XarResult<Vec<u8>> {
        let data = entry
            .data
            .as_ref()
            .ok_or_else(|| Error::extraction(&entry.name, "entry has no usable data range"))?;

        let heap_length = self.source_size.saturating_sub(self.heap_start_offset);

        if data.length == 0 {
            return Err(Error::extraction(&entry.name, "entry data range is empty"));
        }

        match data.offset.checked_add(data.length) {
            Some(end) if end <= heap_length => {}
            _ => {
                return Err(Error::extraction(
                    &entry.name,
                    format!(
                        "data range {}+{} is outside heap of {} bytes",
                        data.offset, data.length, heap_length
                    ),
                ));
            }
        }

        self.reader
            .read_range(self.heap_start_offset + data.offset, data.length)
            .map_err(|e| Error::extraction_io(&entry.name, "reading heap failed", e))
    }

    /// Resolve the decoded bytes for an entry.
    ///
    /// The heap data is decoded according to the entry's declared encoding.
    pub fn entry_data_decoded(&mut self, entry: &TocEntry) -> XarResult<Vec<u8>> {
        let stored = self.entry_data_heap(entry)?;

        // entry_data_heap() verified data is present.
        let data = entry
            .data
            .as_ref()
            .ok_or_else(|| Error::extraction(&entry.name, "entry has no usable data range"))?;

        decode_data(&entry.name, data, stored, MAX_ENTRY_SIZE)
    }

    /// Resolve decoded data for the top-level entry with a given name.
    pub fn get_entry_data(&mut self, name: &str) -> XarResult<Option<Vec<u8>>> {
        if let Some(entry) = self.find_entry(name) {
            Ok(Some(self.entry_data_decoded(&entry)?))
        } else {
            Ok(None)
        }
    }
}

fn decompress_toc(compressed: &[u8], declared_size: u64) -> XarResult<Vec<u8>> {
    let decoder = flate2::read::ZlibDecoder::new(compressed);

    let mut toc = Vec::with_capacity(min(declared_size, MAX_PREALLOCATION) as usize);
    decoder
        .take(MAX_TOC_SIZE + 1)
        .read_to_end(&mut toc)
        .map_err(Error::TableOfContentsDecompress)?;

    if toc.is_empty() {
        return Err(Error::TableOfContentsDecompress(std::io::Error::new(
            ErrorKind::UnexpectedEof,
            "table of contents is empty",
        )));
    }

    if toc.len() as u64 > MAX_TOC_SIZE {
        return Err(Error::TableOfContentsDecompress(std::io::Error::new(
            ErrorKind::InvalidData,
            "table of contents exceeds maximum size",
        )));
    }

    if toc.len() as u64 != declared_size {
        warn!(
            "table of contents is {} bytes but header declares {}",
            toc.len(),
            declared_size
        );
    }

    Ok(toc)
}

fn decode_data(
    name: &str,
    data: &DataDescriptor,
    stored: Vec<u8>,
    limit: u64,
) -> XarResult<Vec<u8>> {
    let decoder: Box<dyn Read + '_> = match data.encoding {
        Encoding::None => {
            return Ok(stored);
        }
        Encoding::ZlibWrapped => Box::new(flate2::read::ZlibDecoder::new(stored.as_slice())),
        Encoding::Bzip2 => Box::new(bzip2::read::BzDecoder::new(stored.as_slice())),
    };

    debug!("decoding {} with {}", name, data.encoding);

    let mut decoded = Vec::with_capacity(min(data.size, MAX_PREALLOCATION) as usize);
    decoder
        .take(limit + 1)
        .read_to_end(&mut decoded)
        .map_err(|e| Error::extraction_io(name, format!("{} decoding failed", data.encoding), e))?;

    if decoded.len() as u64 > limit {
        return Err(Error::extraction(name, format!("decoded data exceeds {} bytes", limit)));
    }

    Ok(decoded)
}
