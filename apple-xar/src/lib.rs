// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! XAR file format decoding.

XAR archives consist of a fixed binary header, a zlib compressed XML
table of contents, and a heap holding file data at offsets recorded in
the table of contents.

This crate only reads archives. It never executes or installs anything
and tolerates hostile input by bounds checking every declared size
against the real size of the source before reading.
*/

pub mod format;
pub mod reader;
pub mod signature;
pub mod source;
pub mod table_of_contents;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("(de)serialization error: {0}")]
    Scroll(#[from] scroll::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a XAR archive: bad magic {0:#010x}")]
    BadMagic(u32),

    #[error("XAR header is truncated")]
    HeaderTruncated,

    #[error("XAR header declares invalid size {0}")]
    HeaderSize(u16),

    #[error("table of contents extends beyond end of archive")]
    TableOfContentsBounds,

    #[error("unable to decompress table of contents: {0}")]
    TableOfContentsDecompress(std::io::Error),

    #[error("table of contents XML error: {0}")]
    TableOfContentsXml(#[from] serde_xml_rs::Error),

    #[error("table of contents XML syntax error: {0}")]
    TableOfContentsSyntax(#[from] xml::reader::Error),

    #[error("unsupported checksum algorithm: {0}")]
    UnsupportedAlgorithm(u32),

    #[error("unable to extract {name}: {reason}")]
    Extraction {
        name: String,
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl Error {
    /// Whether this error indicates a structurally malformed archive.
    ///
    /// These are bad magic, truncated headers, and table of contents
    /// failures.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::BadMagic(_)
                | Self::HeaderTruncated
                | Self::HeaderSize(_)
                | Self::TableOfContentsBounds
                | Self::TableOfContentsDecompress(_)
                | Self::TableOfContentsXml(_)
                | Self::TableOfContentsSyntax(_)
                | Self::Scroll(_)
        )
    }

    pub(crate) fn extraction(name: &str, reason: impl ToString) -> Self {
        Self::Extraction {
            name: name.to_string(),
            reason: reason.to_string(),
            source: None,
        }
    }

    pub(crate) fn extraction_io(
        name: &str,
        reason: impl ToString,
        source: std::io::Error,
    ) -> Self {
        Self::Extraction {
            name: name.to_string(),
            reason: reason.to_string(),
            source: Some(source),
        }
    }
}

pub type XarResult<T> = std::result::Result<T, Error>;
