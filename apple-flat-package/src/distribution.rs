// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Distribution XML file format.
//!
//! See https://developer.apple.com/library/archive/documentation/DeveloperTools/Reference/DistributionDefinitionRef/Chapters/Distribution_XML_Ref.html
//! for Apple's documentation of this file format.
//!
//! Only the elements relevant to describing the product are modeled. Every
//! field is optional so that unusual documents still parse.

use {
    crate::PkgResult,
    serde::{Deserialize, Serialize},
    std::io::Read,
};

/// Represents a distribution XML file.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename = "installer-gui-script", rename_all = "kebab-case")]
pub struct Distribution {
    #[serde(default)]
    pub title: Vec<Title>,
    #[serde(default)]
    pub options: Vec<Options>,
    pub allowed_os_versions: Option<AllowedOsVersions>,
    pub volume_check: Option<VolumeCheck>,
    #[serde(default)]
    pub pkg_ref: Vec<PkgRef>,
    pub product: Option<Product>,
}

impl Distribution {
    /// Parse Distribution XML from a reader.
    pub fn from_reader(reader: impl Read) -> PkgResult<Self> {
        let mut de =
            serde_xml_rs::Deserializer::new_from_reader(reader).non_contiguous_seq_elements(true);

        Ok(Self::deserialize(&mut de)?)
    }

    /// Parse Distribution XML from a string.
    pub fn from_xml(s: &str) -> PkgResult<Self> {
        Self::from_reader(s.as_bytes())
    }

    /// The product title.
    pub fn title(&self) -> Option<&str> {
        self.title.first().map(|t| t.title.as_str())
    }

    /// Architectures the installer runs on, from the first `<options>` element.
    pub fn host_architectures(&self) -> Option<&str> {
        self.options.first().and_then(|o| o.host_architectures.as_deref())
    }

    /// Minimum OS version from the first `<os-version>`.
    ///
    /// A top-level `<allowed-os-versions>` takes precedence over one nested in
    /// `<volume-check>`.
    pub fn minimum_os_version(&self) -> Option<&str> {
        self.allowed_os_versions
            .as_ref()
            .or_else(|| {
                self.volume_check
                    .as_ref()
                    .and_then(|v| v.allowed_os_versions.as_ref())
            })
            .and_then(|a| a.os_versions.first())
            .and_then(|v| v.min.as_deref())
    }

    /// The `version` attribute of `<product>`.
    pub fn product_version(&self) -> Option<&str> {
        self.product.as_ref().and_then(|p| p.version.as_deref())
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AllowedOsVersions {
    #[serde(default, rename = "os-version")]
    pub os_versions: Vec<OsVersion>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Bundle {
    #[serde(rename = "CFBundleShortVersionString")]
    pub cf_bundle_short_version_string: Option<String>,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub path: String,
}

impl Bundle {
    /// The short version string, empty if absent.
    pub fn short_version(&self) -> &str {
        self.cf_bundle_short_version_string
            .as_deref()
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct BundleVersion {
    #[serde(default)]
    pub bundle: Vec<Bundle>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Options {
    #[serde(rename = "hostArchitectures")]
    pub host_architectures: Option<String>,
}

/// Defines a range of supported OS versions.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct OsVersion {
    pub min: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PkgRef {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "bundle-version")]
    pub bundle_version: Option<BundleVersion>,
}

impl PkgRef {
    /// Bundles listed in this reference's `<bundle-version>`, if any.
    pub fn bundles(&self) -> impl Iterator<Item = &Bundle> {
        self.bundle_version.iter().flat_map(|bv| bv.bundle.iter())
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Product {
    pub version: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Title {
    #[serde(default, rename = "$value")]
    pub title: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct VolumeCheck {
    pub allowed_os_versions: Option<AllowedOsVersions>,
}
