// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Apple flat package metadata inspection.
//!
//! Apple flat packages - often existing as `.pkg` files - are an installer
//! file format used by macOS. This crate characterizes them without
//! installing or executing anything.
//!
//! # File Format
//!
//! Flat packages are Apple-flavored XAR archives. XAR is a tar-like
//! file format consisting of file records/metadata and raw file data.
//! See the `apple-xar` crate for more on this file format.
//!
//! Flat packages come in 2 flavors: *component* packages and *product*
//! packages. *Product* packages are identified by the presence of a
//! `Distribution` XML file in the root of the archive. See [Distribution].
//! *Component* packages describe their content with a `PackageInfo` file.
//! See [PackageInfo].
//!
//! # Metadata Extraction
//!
//! [extract_metadata] produces a single [PkgMetadata] record. Descriptive
//! fields come from the `Distribution` file when present and parseable,
//! falling back to the `PackageInfo` file. The two sources resolve
//! conflicting bundles differently: the `Distribution` strategy keeps the
//! first bundle seen for an identifier while the `PackageInfo` strategy lets
//! the last qualifying application bundle win.
//!
//! Signature presence comes from the XAR table of contents. Signatures are
//! not cryptographically verified.
//!
//! Components nested inside product packages are not descended into.

pub mod digests;
pub use digests::FileDigests;
pub mod distribution;
pub use distribution::Distribution;
pub mod metadata;
pub use metadata::{AppBundle, PkgMetadata};
pub mod package_info;
pub use package_info::PackageInfo;
pub mod reader;
pub use reader::{extract_metadata, PkgFlavor, PkgReader};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    SerdeXml(#[from] serde_xml_rs::Error),

    #[error("property list error: {0}")]
    Plist(#[from] plist::Error),

    #[error("xar error: {0}")]
    Xar(#[from] apple_xar::Error),
}

/// Result type for this crate.
pub type PkgResult<T> = std::result::Result<T, Error>;
