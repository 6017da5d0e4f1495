// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `PackageInfo` files.
//!
//! `PackageInfo` describes a component package and the bundles it installs.
//! It is read as a property list. Apple's `pkgbuild` also writes it as a
//! `<pkg-info>` XML document, which is mapped onto the same structure.

use {
    crate::{distribution::Bundle, PkgResult},
    log::debug,
    serde::{Deserialize, Serialize},
    std::io::Cursor,
    xml::reader::{EventReader, XmlEvent},
};

/// Provides information about the package to install.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PackageInfo {
    /// Version of the package.
    ///
    /// This is the version of the package itself, not the version of the application
    /// being installed.
    #[serde(default)]
    pub version: String,

    /// Default location where the payload hierarchy should be installed.
    #[serde(default, rename = "install-location")]
    pub install_location: String,

    /// Uniform type identifier that defines the package.
    #[serde(default)]
    pub identifier: String,

    /// Versioning information about bundles within the payload.
    #[serde(default)]
    pub bundles: Vec<BundleInfo>,
}

/// A bundle described by a `PackageInfo` file.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct BundleInfo {
    /// Path of the bundle relative to the install location.
    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub id: String,

    #[serde(default, rename = "CFBundleShortVersionString")]
    pub short_version: String,

    #[serde(default, rename = "CFBundleDisplayName")]
    pub display_name: String,

    #[serde(default, rename = "CFBundleIdentifier")]
    pub bundle_identifier: String,

    #[serde(default, rename = "CFBundleName")]
    pub bundle_name: String,

    #[serde(default, rename = "LSMinimumSystemVersion")]
    pub minimum_system_version: String,
}

impl From<&Bundle> for BundleInfo {
    fn from(bundle: &Bundle) -> Self {
        Self {
            path: bundle.path.clone(),
            id: bundle.id.clone(),
            short_version: bundle.short_version().to_string(),
            ..Default::default()
        }
    }
}

/// The `<pkg-info>` XML form written by `pkgbuild`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename = "pkg-info")]
struct PkgInfoXml {
    identifier: Option<String>,
    version: Option<String>,
    #[serde(rename = "install-location")]
    install_location: Option<String>,
    #[serde(default)]
    bundle: Vec<Bundle>,
}

impl From<PkgInfoXml> for PackageInfo {
    fn from(xml: PkgInfoXml) -> Self {
        Self {
            version: xml.version.unwrap_or_default(),
            install_location: xml.install_location.unwrap_or_default(),
            identifier: xml.identifier.unwrap_or_default(),
            bundles: xml.bundle.iter().map(BundleInfo::from).collect(),
        }
    }
}

impl PackageInfo {
    /// Parse a property list `PackageInfo`.
    ///
    /// Both XML and binary property lists are accepted.
    pub fn from_plist(data: &[u8]) -> PkgResult<Self> {
        Ok(plist::from_reader(Cursor::new(data))?)
    }

    /// Parse a `<pkg-info>` XML document.
    pub fn from_pkg_info_xml(data: &[u8]) -> PkgResult<Self> {
        let mut de =
            serde_xml_rs::Deserializer::new_from_reader(data).non_contiguous_seq_elements(true);

        Ok(PkgInfoXml::deserialize(&mut de)?.into())
    }

    /// Parse `PackageInfo` content in either supported form.
    ///
    /// The property list form is tried first. The `<pkg-info>` form is only
    /// attempted when the document root is a `pkg-info` element.
    pub fn from_bytes(data: &[u8]) -> PkgResult<Self> {
        match Self::from_plist(data) {
            Ok(info) => Ok(info),
            Err(e) => {
                if root_element_name(data).as_deref() == Some("pkg-info") {
                    debug!("PackageInfo is not a property list; parsing as pkg-info XML");
                    Self::from_pkg_info_xml(data)
                } else {
                    Err(e)
                }
            }
        }
    }
}

/// Resolve the local name of the root element of an XML document.
fn root_element_name(data: &[u8]) -> Option<String> {
    for event in EventReader::new(data) {
        match event {
            Ok(XmlEvent::StartElement { name, .. }) => return Some(name.local_name),
            Ok(_) => {}
            Err(_) => return None,
        }
    }

    None
}
