// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Unified package metadata and the strategies that synthesize it.

use {
    crate::{
        distribution::{Bundle, Distribution},
        package_info::{BundleInfo, PackageInfo},
        reader::PkgFlavor,
    },
    serde::{Serialize, Serializer},
    std::collections::BTreeSet,
};

/// File extension reported for flat packages.
pub const PKG_EXTENSION: &str = "pkg";

/// An application bundle referenced by a package.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct AppBundle {
    /// Bundle identifier.
    pub id: String,

    /// `CFBundleShortVersionString` of the bundle.
    pub short_version: String,

    /// Where the bundle is installed.
    pub install_path: String,
}

impl From<&Bundle> for AppBundle {
    fn from(bundle: &Bundle) -> Self {
        Self {
            id: bundle.id.clone(),
            short_version: bundle.short_version().to_string(),
            install_path: bundle.path.clone(),
        }
    }
}

/// Metadata describing a flat package.
///
/// Instances own all their data and hold no reference to the package source.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PkgMetadata {
    pub application_title: String,
    pub display_name: String,
    pub bundle_name: String,
    pub version: String,
    pub primary_bundle_identifier: String,
    pub primary_bundle_path: String,
    /// Unique bundle identifiers.
    ///
    /// Ordered by first appearance for `Distribution` derived metadata. No
    /// order is defined for `PackageInfo` derived metadata.
    pub package_ids: Vec<String>,
    pub minimum_os_version: String,
    pub host_architectures: String,
    pub app_bundles: Vec<AppBundle>,
    pub flavor: PkgFlavor,
    pub is_signed: bool,
    pub size_mb: f64,
    #[serde(serialize_with = "serialize_digest")]
    pub sha1: Option<Vec<u8>>,
    #[serde(serialize_with = "serialize_digest")]
    pub md5: Option<Vec<u8>>,
    #[serde(serialize_with = "serialize_digest")]
    pub sha256: Option<Vec<u8>>,
    pub extension: String,
}

fn serialize_digest<S: Serializer>(digest: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
    match digest {
        Some(digest) => s.serialize_some(&hex::encode(digest)),
        None => s.serialize_none(),
    }
}

impl PkgMetadata {
    /// Synthesize metadata from a `Distribution` file.
    ///
    /// Every bundle with both an identifier and a short version becomes an
    /// [AppBundle]. When an identifier repeats, the first occurrence is kept.
    /// The primary bundle is the first one whose identifier equals the
    /// identifier of the `<pkg-ref>` listing it, defaulting to the first
    /// [AppBundle].
    pub fn from_distribution(distribution: &Distribution) -> Self {
        let (app_bundles, primary) = distribution
            .pkg_ref
            .iter()
            .flat_map(|pkg_ref| pkg_ref.bundles().map(move |bundle| (pkg_ref, bundle)))
            .filter(|(_, bundle)| !bundle.id.is_empty() && !bundle.short_version().is_empty())
            .fold(
                (Vec::<AppBundle>::new(), None::<AppBundle>),
                |(mut bundles, primary), (pkg_ref, bundle)| {
                    if !bundles.iter().any(|b| b.id == bundle.id) {
                        bundles.push(AppBundle::from(bundle));
                    }

                    let primary = primary
                        .or_else(|| (pkg_ref.id == bundle.id).then(|| AppBundle::from(bundle)));

                    (bundles, primary)
                },
            );

        let primary = primary.or_else(|| app_bundles.first().cloned()).unwrap_or_default();

        let version = match app_bundles.first() {
            Some(bundle) => bundle.short_version.clone(),
            None => distribution
                .product_version()
                .unwrap_or_default()
                .to_string(),
        };

        let title = distribution.title().unwrap_or_default().to_string();

        Self {
            application_title: title.clone(),
            display_name: title,
            version,
            primary_bundle_identifier: primary.id,
            primary_bundle_path: primary.install_path,
            package_ids: app_bundles.iter().map(|b| b.id.clone()).collect(),
            minimum_os_version: distribution
                .minimum_os_version()
                .unwrap_or_default()
                .to_string(),
            host_architectures: distribution
                .host_architectures()
                .unwrap_or_default()
                .to_string(),
            app_bundles,
            flavor: PkgFlavor::Product,
            extension: PKG_EXTENSION.to_string(),
            ..Default::default()
        }
    }

    /// Synthesize metadata from a `PackageInfo` file.
    ///
    /// Only bundles installed as a bare file name or as `Applications/*.app`
    /// describe the application. Of those, the last one wins. Identifiers of
    /// all bundles are collected into `package_ids`.
    pub fn from_package_info(info: &PackageInfo) -> Self {
        let mut package_ids = BTreeSet::new();
        let mut application: Option<(String, &BundleInfo)> = None;

        for bundle in &info.bundles {
            let install_path = effective_install_path(&info.install_location, &bundle.path);

            if let Some(name) = application_name(&install_path) {
                application = Some((name.to_string(), bundle));
            }

            let id = sanitize_bundle_string(&bundle.id);
            if !id.is_empty() {
                package_ids.insert(id);
            }
        }

        let mut metadata = match application {
            Some((name, bundle)) => Self {
                application_title: name,
                primary_bundle_identifier: sanitize_bundle_string(&bundle.id),
                version: sanitize_bundle_string(&bundle.short_version),
                display_name: sanitize_bundle_string(&bundle.display_name),
                bundle_name: sanitize_bundle_string(&bundle.bundle_name),
                minimum_os_version: sanitize_bundle_string(&bundle.minimum_system_version),
                ..Default::default()
            },
            None => Self::default(),
        };

        if metadata.version.is_empty() {
            metadata.version = sanitize_bundle_string(&info.version);
        }

        if metadata.primary_bundle_identifier.is_empty() {
            metadata.primary_bundle_identifier = sanitize_bundle_string(&info.identifier);
        }

        if metadata.application_title.is_empty() {
            metadata.application_title = metadata
                .primary_bundle_identifier
                .rsplit('.')
                .next()
                .unwrap_or_default()
                .to_string();
        }

        metadata.package_ids = package_ids.into_iter().collect();

        if metadata.package_ids.is_empty() && !metadata.primary_bundle_identifier.is_empty() {
            metadata.package_ids = vec![metadata.primary_bundle_identifier.clone()];
        }

        metadata.flavor = PkgFlavor::Component;
        metadata.extension = PKG_EXTENSION.to_string();

        metadata
    }
}

/// Trim whitespace and drop embedded newline, carriage return, and tab characters.
fn sanitize_bundle_string(s: &str) -> String {
    s.trim().replace(|c: char| matches!(c, '\n' | '\r' | '\t'), "")
}

/// Lexically join and normalize paths the way installers resolve them.
///
/// Empty and `.` components are dropped and `..` consumes its parent.
fn clean_join(base: &str, path: &str) -> String {
    let rooted = base.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for component in base.split('/').chain(path.split('/')) {
        match component {
            "" | "." => {}
            ".." => {
                if parts.last().map_or(false, |p| *p != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            c => parts.push(c),
        }
    }

    let joined = parts.join("/");

    if rooted {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Where a bundle lands relative to the root of the target volume.
fn effective_install_path(install_location: &str, path: &str) -> String {
    let joined = if install_location.is_empty() {
        path.to_string()
    } else {
        clean_join(install_location, path)
    };

    let stripped = joined.strip_prefix('/').unwrap_or(&joined);
    let stripped = stripped.strip_prefix("./").unwrap_or(stripped);

    stripped.to_string()
}

/// The file name of a path that describes the application, if any.
///
/// That is a path with no directory component, or an `.app` directly under
/// `Applications/`.
fn application_name(path: &str) -> Option<&str> {
    match path.rfind('/') {
        None => Some(path),
        Some(i) => {
            let (dir, file) = path.split_at(i + 1);

            if dir == "Applications/" && file.ends_with(".app") {
                Some(file)
            } else {
                None
            }
        }
    }
}
