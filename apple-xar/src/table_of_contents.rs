// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! XAR XML table of contents data structure.

use {
    crate::XarResult,
    log::warn,
    serde::Deserialize,
    std::{
        fmt::{Display, Formatter},
        io::Read,
        ops::Deref,
    },
    xml::reader::{EventReader, XmlEvent},
};

/// An XML table of contents in a XAR file.
#[derive(Clone, Debug, Deserialize)]
pub struct TableOfContents {
    toc: XarToC,
}

impl Deref for TableOfContents {
    type Target = XarToC;

    fn deref(&self) -> &Self::Target {
        &self.toc
    }
}

impl TableOfContents {
    /// Parse XML table of contents from a reader.
    pub fn from_reader(reader: impl Read) -> XarResult<Self> {
        let mut de =
            serde_xml_rs::Deserializer::new_from_reader(reader).non_contiguous_seq_elements(true);

        Ok(Self::deserialize(&mut de)?)
    }

    /// Resolve the top-level entries, in document order.
    ///
    /// Directories are reported as entries but their children are not
    /// descended into.
    pub fn entries(&self) -> Vec<TocEntry> {
        self.toc.files.iter().map(TocEntry::from).collect()
    }
}

/// The main data structure inside a table of contents.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct XarToC {
    pub creation_time: Option<String>,
    #[serde(default, rename = "file")]
    pub files: Vec<File>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct File {
    /// Filename.
    ///
    /// There should only be a single element. However, some Apple tools can
    /// emit multiple <name> elements.
    #[serde(default, rename = "name")]
    pub names: Vec<String>,
    #[serde(rename = "type")]
    pub file_type: Option<FileType>,
    pub data: Option<FileData>,
    #[serde(default, rename = "file")]
    pub files: Vec<File>,
}

impl File {
    /// The effective name of this record.
    pub fn name(&self) -> &str {
        self.names.last().map(|s| s.as_str()).unwrap_or_default()
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
pub enum FileType {
    #[serde(rename = "file")]
    File,
    #[serde(rename = "directory")]
    Directory,
    #[serde(rename = "hardlink")]
    HardLink,
    #[serde(rename = "symlink")]
    Link,
    #[serde(other)]
    Other,
}

impl Display for FileType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FileType::File => f.write_str("file"),
            FileType::Directory => f.write_str("directory"),
            FileType::HardLink => f.write_str("hardlink"),
            FileType::Link => f.write_str("symlink"),
            FileType::Other => f.write_str("other"),
        }
    }
}

/// Data location as written in the table of contents.
///
/// Numbers are kept as text so that a malformed value only affects the
/// entry carrying it.
#[derive(Clone, Debug, Deserialize)]
pub struct FileData {
    #[serde(default)]
    pub offset: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub length: String,
    pub encoding: Option<FileEncoding>,
}

/// Parse a numeric table of contents value. Empty text is zero.
fn parse_toc_number(s: &str) -> Option<u64> {
    let s = s.trim();

    if s.is_empty() {
        Some(0)
    } else {
        s.parse().ok()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct FileEncoding {
    #[serde(default)]
    pub style: String,
}

/// Compression applied to a file's data in the heap.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Encoding {
    /// Stored as-is.
    None,

    /// A zlib wrapped DEFLATE stream.
    ///
    /// Archives label this `application/x-gzip` even though there is no gzip
    /// header.
    ZlibWrapped,

    /// A bzip2 stream.
    Bzip2,
}

impl Encoding {
    /// Resolve the encoding from an `<encoding style="...">` media type.
    ///
    /// Unrecognized styles are treated as stored data.
    pub fn from_style(style: &str) -> Self {
        if style.contains("x-gzip") {
            Self::ZlibWrapped
        } else if style.contains("x-bzip2") {
            Self::Bzip2
        } else {
            Self::None
        }
    }
}

impl Display for Encoding {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::ZlibWrapped => f.write_str("zlib"),
            Self::Bzip2 => f.write_str("bzip2"),
        }
    }
}

/// Location of a file's data within the heap.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DataDescriptor {
    /// Offset relative to the start of the heap.
    pub offset: u64,

    /// Number of bytes stored in the heap.
    pub length: u64,

    /// Size of the data after decoding.
    pub size: u64,

    pub encoding: Encoding,
}

impl DataDescriptor {
    /// Resolve a descriptor, if all numeric fields are valid.
    pub fn from_file_data(data: &FileData) -> Option<Self> {
        Some(Self {
            offset: parse_toc_number(&data.offset)?,
            length: parse_toc_number(&data.length)?,
            size: parse_toc_number(&data.size)?,
            encoding: data
                .encoding
                .as_ref()
                .map(|e| Encoding::from_style(&e.style))
                .unwrap_or(Encoding::None),
        })
    }
}

/// A top-level entry in the table of contents.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TocEntry {
    pub name: String,
    pub kind: FileType,
    pub data: Option<DataDescriptor>,
}

impl From<&File> for TocEntry {
    fn from(file: &File) -> Self {
        Self {
            name: file.name().to_string(),
            kind: file.file_type.unwrap_or(FileType::File),
            data: file.data.as_ref().and_then(|data| {
                let descriptor = DataDescriptor::from_file_data(data);
                if descriptor.is_none() {
                    warn!("ignoring invalid data location for {}", file.name());
                }
                descriptor
            }),
        }
    }
}

/// Presence of signature elements in a table of contents.
///
/// Only presence is recorded. Signature content is never inspected.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SignatureMarkers {
    /// A `<signature>` element exists.
    pub signature: bool,

    /// An `<x-signature>` element exists.
    pub x_signature: bool,
}

impl SignatureMarkers {
    /// Scan table of contents XML for signature elements at any depth.
    pub fn from_xml(reader: impl Read) -> XarResult<Self> {
        let mut markers = Self::default();

        for event in EventReader::new(reader) {
            if let XmlEvent::StartElement { name, .. } = event? {
                match name.local_name.as_str() {
                    "signature" => markers.signature = true,
                    "x-signature" => markers.x_signature = true,
                    _ => {}
                }
            }
        }

        Ok(markers)
    }

    /// Whether either signature element is present.
    pub fn is_signed(&self) -> bool {
        self.signature || self.x_signature
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::Error};

    const TOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xar>
  <toc>
    <creation-time>2021-10-05T14:07:01</creation-time>
    <checksum style="sha1">
      <offset>0</offset>
      <size>20</size>
    </checksum>
    <file id="1">
      <name>Distribution</name>
      <type>file</type>
      <data>
        <length>1024</length>
        <offset>20</offset>
        <size>4096</size>
        <encoding style="application/x-gzip"/>
        <extracted-checksum style="sha1">0000</extracted-checksum>
        <archived-checksum style="sha1">0000</archived-checksum>
      </data>
    </file>
    <file id="2">
      <name>app.pkg</name>
      <type>directory</type>
      <file id="3">
        <name>PackageInfo</name>
        <type>file</type>
        <data>
          <length>300</length>
          <offset>1044</offset>
          <size>300</size>
          <encoding style="application/octet-stream"/>
        </data>
      </file>
    </file>
    <file id="4">
      <name>Resources</name>
      <type>fifo</type>
    </file>
  </toc>
</xar>
"#;

    #[test]
    fn parse_top_level_entries() -> XarResult<()> {
        let toc = TableOfContents::from_reader(TOC.as_bytes())?;

        assert_eq!(toc.creation_time.as_deref(), Some("2021-10-05T14:07:01"));

        let entries = toc.entries();
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].name, "Distribution");
        assert_eq!(entries[0].kind, FileType::File);
        assert_eq!(
            entries[0].data,
            Some(DataDescriptor {
                offset: 20,
                length: 1024,
                size: 4096,
                encoding: Encoding::ZlibWrapped,
            })
        );

        // Directory children are not flattened into the top level.
        assert_eq!(entries[1].name, "app.pkg");
        assert_eq!(entries[1].kind, FileType::Directory);
        assert!(entries[1].data.is_none());
        assert_eq!(toc.files[1].files.len(), 1);
        assert_eq!(toc.files[1].files[0].name(), "PackageInfo");

        assert_eq!(entries[2].kind, FileType::Other);

        Ok(())
    }

    #[test]
    fn lenient_data_numbers() -> XarResult<()> {
        let toc = TableOfContents::from_reader(
            &br#"<xar><toc>
                <file id="x">
                    <name>Bom</name>
                    <data><length>10</length><offset>-1</offset><size></size></data>
                </file>
                <file id="">
                    <name>Distribution</name>
                    <data><length>10</length><offset> 4 </offset><size/></data>
                </file>
            </toc></xar>"#[..],
        )?;

        let entries = toc.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "Bom");
        assert!(entries[0].data.is_none());
        assert_eq!(
            entries[1].data,
            Some(DataDescriptor {
                offset: 4,
                length: 10,
                size: 0,
                encoding: Encoding::None,
            })
        );

        Ok(())
    }

    #[test]
    fn toc_numbers() {
        assert_eq!(parse_toc_number("42"), Some(42));
        assert_eq!(parse_toc_number(""), Some(0));
        assert_eq!(parse_toc_number("\n  "), Some(0));
        assert_eq!(parse_toc_number("-1"), None);
        assert_eq!(parse_toc_number("0x10"), None);
    }

    #[test]
    fn malformed_xml() {
        let err = TableOfContents::from_reader(&b"<xar><toc><file>"[..]).unwrap_err();
        assert!(matches!(err, Error::TableOfContentsXml(_)));
        assert!(err.is_format_error());

        let err = SignatureMarkers::from_xml(&b"<xar><toc>"[..]).unwrap_err();
        assert!(matches!(err, Error::TableOfContentsSyntax(_)));
        assert!(err.is_format_error());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn encoding_style_dispatch() {
        assert_eq!(
            Encoding::from_style("application/x-gzip"),
            Encoding::ZlibWrapped
        );
        assert_eq!(Encoding::from_style("application/x-bzip2"), Encoding::Bzip2);
        assert_eq!(
            Encoding::from_style("application/octet-stream"),
            Encoding::None
        );
        assert_eq!(Encoding::from_style("application/x-lzma"), Encoding::None);
        assert_eq!(Encoding::from_style(""), Encoding::None);
    }

    #[test]
    fn signature_markers() -> XarResult<()> {
        let markers = SignatureMarkers::from_xml(TOC.as_bytes())?;
        assert!(!markers.signature);
        assert!(!markers.x_signature);
        assert!(!markers.is_signed());

        let markers = SignatureMarkers::from_xml(
            &br#"<xar><toc><signature style="RSA"><offset>20</offset></signature></toc></xar>"#[..],
        )?;
        assert!(markers.signature);
        assert!(!markers.x_signature);
        assert!(markers.is_signed());

        // Found at any depth.
        let markers = SignatureMarkers::from_xml(
            &br#"<xar><toc><file><x-signature style="CMS"/></file></toc></xar>"#[..],
        )?;
        assert!(!markers.signature);
        assert!(markers.x_signature);
        assert!(markers.is_signed());

        Ok(())
    }
}
