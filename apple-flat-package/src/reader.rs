// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reading support for Apple flat package (`.pkg`) installers.

use {
    crate::{
        digests::{digest_source, FileDigests},
        distribution::Distribution,
        metadata::{PkgMetadata, PKG_EXTENSION},
        package_info::PackageInfo,
        PkgResult,
    },
    apple_xar::{reader::XarReader, source::ByteSource, table_of_contents::SignatureMarkers},
    log::{debug, error, info, warn},
    serde::Serialize,
    sha2::Sha256,
    std::{fmt::Debug, io::Cursor},
};

const MEGABYTE: f64 = 1024.0 * 1024.0;

/// The type of a flat package.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PkgFlavor {
    /// A *component* installer.
    ///
    /// This consists of a single component.
    #[default]
    Component,

    /// A *product* installer.
    ///
    /// This consists of multiple components, described by a `Distribution` file.
    Product,
}

impl std::fmt::Display for PkgFlavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Component => f.write_str("component"),
            Self::Product => f.write_str("product"),
        }
    }
}

/// Read-only interface to a single flat package XAR archive.
pub struct PkgReader<R: ByteSource + Debug> {
    xar: XarReader<R>,
    flavor: PkgFlavor,
}

impl<R: ByteSource + Debug> PkgReader<R> {
    /// Construct an instance from a reader.
    ///
    /// The reader will read the contents of a XAR archive. This is likely
    /// a `.pkg` file.
    pub fn new(reader: R) -> PkgResult<Self> {
        let xar = XarReader::new(reader)?;

        let flavor = if xar.find_entry("Distribution").is_some() {
            PkgFlavor::Product
        } else {
            PkgFlavor::Component
        };

        Ok(Self { xar, flavor })
    }

    /// Return the inner reader, consuming self.
    pub fn into_inner(self) -> XarReader<R> {
        self.xar
    }

    /// Obtain the flavor of the flat package.
    pub fn flavor(&self) -> PkgFlavor {
        self.flavor
    }

    /// Signature elements present in the table of contents.
    pub fn signature_markers(&self) -> SignatureMarkers {
        self.xar.signature_markers()
    }

    /// Obtain the parsed `Distribution` XML file describing the installer.
    ///
    /// Not all flat packages have a `Distribution` file, so this may resolve to
    /// `None`.
    pub fn distribution(&mut self) -> PkgResult<Option<Distribution>> {
        if let Some(xml_data) = self.xar.get_entry_data("Distribution")? {
            Ok(Some(Distribution::from_reader(Cursor::new(xml_data))?))
        } else {
            Ok(None)
        }
    }

    /// Obtain the parsed top-level `PackageInfo` file.
    pub fn package_info(&mut self) -> PkgResult<Option<PackageInfo>> {
        if let Some(data) = self.xar.get_entry_data("PackageInfo")? {
            Ok(Some(PackageInfo::from_bytes(&data)?))
        } else {
            Ok(None)
        }
    }

    fn metadata_from_distribution(&mut self) -> Option<PkgMetadata> {
        match self.distribution() {
            Ok(Some(distribution)) => {
                info!("deriving metadata from Distribution");
                Some(PkgMetadata::from_distribution(&distribution))
            }
            Ok(None) => {
                debug!("no Distribution entry");
                None
            }
            Err(e) => {
                error!("failed to read Distribution: {}", e);
                None
            }
        }
    }

    fn metadata_from_package_info(&mut self) -> Option<PkgMetadata> {
        match self.package_info() {
            Ok(Some(info)) => {
                info!("deriving metadata from PackageInfo");
                Some(PkgMetadata::from_package_info(&info))
            }
            Ok(None) => {
                debug!("no PackageInfo entry");
                None
            }
            Err(e) => {
                error!("failed to read PackageInfo: {}", e);
                None
            }
        }
    }
}

/// Extract [PkgMetadata] from a flat package.
///
/// Failures decoding the XAR header or table of contents are returned as
/// errors. Failures reading the `Distribution` or `PackageInfo` entries are
/// logged and treated as if the entry were absent. When neither yields
/// metadata, a record carrying only digests is returned. Digest failures
/// leave the corresponding digest unset.
pub fn extract_metadata<R: ByteSource + Debug>(mut source: R) -> PkgResult<PkgMetadata> {
    let (initial_sha256, size) = match digest_source::<Sha256>(&mut source) {
        Ok((digest, size)) => (Some(digest), size),
        Err(e) => {
            warn!("failed to compute initial SHA-256 digest: {}", e);
            (None, source.source_size().unwrap_or_default())
        }
    };
    debug!("package is {} bytes", size);

    let mut reader = PkgReader::new(source)?;
    let flavor = reader.flavor();
    let markers = reader.signature_markers();

    let metadata = reader
        .metadata_from_distribution()
        .or_else(|| reader.metadata_from_package_info());

    let mut metadata = match metadata {
        Some(metadata) => PkgMetadata {
            is_signed: markers.is_signed(),
            size_mb: size as f64 / MEGABYTE,
            sha256: initial_sha256,
            ..metadata
        },
        None => {
            warn!("no usable Distribution or PackageInfo; returning digests only");
            PkgMetadata {
                sha256: initial_sha256,
                ..Default::default()
            }
        }
    };

    metadata.flavor = flavor;
    metadata.extension = PKG_EXTENSION.to_string();

    let mut source = reader.into_inner().into_inner();
    let digests = FileDigests::compute(&mut source);

    metadata.sha1 = digests.sha1;
    metadata.md5 = digests.md5;
    if digests.sha256.is_some() {
        metadata.sha256 = digests.sha256;
    }

    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::Error,
        apple_xar::testutil::{Stored, XarBuilder},
        sha2::Digest,
        std::io::{Read, Seek, SeekFrom},
    };

    const DISTRIBUTION: &[u8] = br#"<installer-gui-script>
        <title>Example</title>
        <options hostArchitectures="x86_64,arm64"/>
        <allowed-os-versions><os-version min="11.0"/></allowed-os-versions>
        <pkg-ref id="com.example.app">
            <bundle-version>
                <bundle id="com.example.app" CFBundleShortVersionString="1.2.3" path="Example.app"/>
            </bundle-version>
        </pkg-ref>
    </installer-gui-script>"#;

    const PACKAGE_INFO: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
    <key>identifier</key>
    <string>com.example.component</string>
    <key>version</key>
    <string>9.0</string>
    <key>install-location</key>
    <string>/Applications</string>
    <key>bundles</key>
    <array>
        <dict>
            <key>path</key>
            <string>./Component.app</string>
            <key>id</key>
            <string>com.example.component.app</string>
            <key>CFBundleShortVersionString</key>
            <string>9.1</string>
        </dict>
    </array>
</dict>
</plist>
"#;

    #[test]
    fn distribution_preferred() -> PkgResult<()> {
        let data = XarBuilder::new()
            .file("PackageInfo", PACKAGE_INFO, Stored::Raw)
            .file("Distribution", DISTRIBUTION, Stored::Zlib)
            .build();

        let m = extract_metadata(Cursor::new(data.clone()))?;

        assert_eq!(m.application_title, "Example");
        assert_eq!(m.version, "1.2.3");
        assert_eq!(m.primary_bundle_identifier, "com.example.app");
        assert_eq!(m.host_architectures, "x86_64,arm64");
        assert_eq!(m.minimum_os_version, "11.0");
        assert_eq!(m.flavor, PkgFlavor::Product);
        assert_eq!(m.extension, "pkg");
        assert!(!m.is_signed);
        assert_eq!(m.size_mb, data.len() as f64 / MEGABYTE);
        assert_eq!(m.sha256, Some(Sha256::digest(&data).to_vec()));
        assert_eq!(m.sha1, Some(sha1::Sha1::digest(&data).to_vec()));
        assert_eq!(m.md5, Some(md5::Md5::digest(&data).to_vec()));

        Ok(())
    }

    #[test]
    fn package_info_fallback() -> PkgResult<()> {
        let data = XarBuilder::new()
            .file("PackageInfo", PACKAGE_INFO, Stored::Bzip2)
            .build();

        let m = extract_metadata(Cursor::new(data))?;

        assert_eq!(m.application_title, "Component.app");
        assert_eq!(m.version, "9.1");
        assert_eq!(m.primary_bundle_identifier, "com.example.component.app");
        assert_eq!(m.package_ids, vec!["com.example.component.app"]);
        assert_eq!(m.flavor, PkgFlavor::Component);

        Ok(())
    }

    #[test]
    fn broken_distribution_falls_back() -> PkgResult<()> {
        let data = XarBuilder::new()
            .file("Distribution", b"<installer-gui-script><title>", Stored::Raw)
            .file("PackageInfo", PACKAGE_INFO, Stored::Raw)
            .build();

        let m = extract_metadata(Cursor::new(data))?;

        assert_eq!(m.version, "9.1");
        // The Distribution entry still exists.
        assert_eq!(m.flavor, PkgFlavor::Product);

        Ok(())
    }

    #[test]
    fn no_metadata_entries() -> PkgResult<()> {
        let data = XarBuilder::new()
            .file("Bom", b"not interesting", Stored::Raw)
            .toc_xml(r#"<signature style="RSA"/>"#)
            .build();

        let m = extract_metadata(Cursor::new(data.clone()))?;

        assert!(!m.is_signed);
        assert_eq!(m.application_title, "");
        assert_eq!(m.version, "");
        assert_eq!(m.size_mb, 0.0);
        assert!(m.package_ids.is_empty());
        assert_eq!(m.sha256, Some(Sha256::digest(&data).to_vec()));
        assert!(m.sha1.is_some());
        assert!(m.md5.is_some());

        Ok(())
    }

    #[test]
    fn signed_package() -> PkgResult<()> {
        let data = XarBuilder::new()
            .file("Distribution", DISTRIBUTION, Stored::Raw)
            .toc_xml(r#"<x-signature style="CMS"><offset>0</offset><size>0</size></x-signature>"#)
            // Metadata extraction does not care about the checksum algorithm.
            .checksum_algorithm(2)
            .build();

        let m = extract_metadata(Cursor::new(data))?;

        assert!(m.is_signed);
        assert_eq!(m.version, "1.2.3");

        Ok(())
    }

    /// A source that fails one whole-file read pass.
    ///
    /// Passes are counted by large reads starting at offset 0. Header, table
    /// of contents, and entry reads are small and never fail.
    #[derive(Debug)]
    struct FailingPass {
        inner: Cursor<Vec<u8>>,
        fail_pass: usize,
        passes: usize,
    }

    impl FailingPass {
        fn new(data: Vec<u8>, fail_pass: usize) -> Self {
            Self {
                inner: Cursor::new(data),
                fail_pass,
                passes: 0,
            }
        }
    }

    impl Read for FailingPass {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if buf.len() > 1024 {
                if self.inner.position() == 0 {
                    self.passes += 1;
                }

                if self.passes == self.fail_pass {
                    return Err(std::io::Error::new(std::io::ErrorKind::Other, "injected"));
                }
            }

            self.inner.read(buf)
        }
    }

    impl Seek for FailingPass {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn initial_digest_failure_uses_source_size() -> PkgResult<()> {
        let data = XarBuilder::new()
            .file("Distribution", DISTRIBUTION, Stored::Raw)
            .build();

        let m = extract_metadata(FailingPass::new(data.clone(), 1))?;

        assert_eq!(m.version, "1.2.3");
        assert_eq!(m.size_mb, data.len() as f64 / MEGABYTE);
        // The later SHA-256 pass fills in the digest.
        assert_eq!(m.sha256, Some(Sha256::digest(&data).to_vec()));
        assert_eq!(m.sha1, Some(sha1::Sha1::digest(&data).to_vec()));
        assert_eq!(m.md5, Some(md5::Md5::digest(&data).to_vec()));

        Ok(())
    }

    #[test]
    fn later_digest_failures_keep_initial_sha256() -> PkgResult<()> {
        let data = XarBuilder::new()
            .file("Distribution", DISTRIBUTION, Stored::Raw)
            .build();

        // Passes are the initial SHA-256, then SHA-1, MD5, and SHA-256.
        let m = extract_metadata(FailingPass::new(data.clone(), 4))?;
        assert_eq!(m.sha256, Some(Sha256::digest(&data).to_vec()));
        assert!(m.sha1.is_some());
        assert!(m.md5.is_some());
        assert_eq!(m.size_mb, data.len() as f64 / MEGABYTE);

        let m = extract_metadata(FailingPass::new(data.clone(), 2))?;
        assert!(m.sha1.is_none());
        assert!(m.md5.is_some());
        assert_eq!(m.sha256, Some(Sha256::digest(&data).to_vec()));

        Ok(())
    }

    #[test]
    fn minimal_record_digest_failures() -> PkgResult<()> {
        let data = XarBuilder::new()
            .file("Bom", b"not interesting", Stored::Raw)
            .build();

        let m = extract_metadata(FailingPass::new(data.clone(), 4))?;
        assert_eq!(m.sha256, Some(Sha256::digest(&data).to_vec()));
        assert_eq!(m.size_mb, 0.0);

        let m = extract_metadata(FailingPass::new(data.clone(), 1))?;
        assert_eq!(m.sha256, Some(Sha256::digest(&data).to_vec()));

        Ok(())
    }

    #[test]
    fn unmodeled_distribution_attributes() -> PkgResult<()> {
        let data = XarBuilder::new()
            .file(
                "Distribution",
                br#"<installer-gui-script>
                    <title>T</title>
                    <options require-scripts="yes" hostArchitectures="arm64"/>
                    <pkg-ref id="a" installKBytes="">
                        <bundle-version>
                            <bundle id="a" CFBundleShortVersionString="1.0" path="A.app"/>
                        </bundle-version>
                    </pkg-ref>
                </installer-gui-script>"#,
                Stored::Raw,
            )
            .file("PackageInfo", PACKAGE_INFO, Stored::Raw)
            .build();

        let m = extract_metadata(Cursor::new(data))?;

        assert_eq!(m.application_title, "T");
        assert_eq!(m.version, "1.0");
        assert_eq!(m.host_architectures, "arm64");
        assert_eq!(m.primary_bundle_identifier, "a");

        Ok(())
    }

    #[test]
    fn not_a_xar() {
        let res = extract_metadata(Cursor::new(b"PK\x03\x04 some zip archive data".to_vec()));

        match res {
            Err(Error::Xar(e)) => {
                assert!(e.is_format_error());
                assert!(matches!(e, apple_xar::Error::BadMagic(_)));
            }
            other => panic!("unexpected result: {:?}", other.map(|m| m.version)),
        }
    }

    #[test]
    fn reader_accessors() -> PkgResult<()> {
        let data = XarBuilder::new()
            .file("PackageInfo", PACKAGE_INFO, Stored::Zlib)
            .build();

        let mut reader = PkgReader::new(Cursor::new(data))?;

        assert_eq!(reader.flavor(), PkgFlavor::Component);
        assert!(reader.distribution()?.is_none());
        assert!(!reader.signature_markers().is_signed());

        let info = reader.package_info()?.expect("PackageInfo present");
        assert_eq!(info.identifier, "com.example.component");
        assert_eq!(info.bundles.len(), 1);

        Ok(())
    }
}
