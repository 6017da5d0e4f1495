// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! XAR signature presence detection.
//!
//! XAR archives can carry an RSA `<signature>` and a CMS `<x-signature>` in
//! their table of contents. Detection here only looks for those elements.
//! Neither the signature data nor its certificate chain is verified.

use {
    crate::{
        format::XAR_MAGIC,
        reader::{ParseMode, XarReader},
        source::buffer_reader,
        Error, XarResult,
    },
    log::debug,
    std::{
        fmt::{Display, Formatter},
        io::Read,
    },
};

/// Outcome of signature detection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignatureStatus {
    /// A signature or extended signature element is present.
    Signed,

    /// The archive is valid but carries no signature elements.
    NotSigned,

    /// The input is not a XAR archive.
    InvalidType,
}

impl Display for SignatureStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signed => f.write_str("signed"),
            Self::NotSigned => f.write_str("not signed"),
            Self::InvalidType => f.write_str("invalid type"),
        }
    }
}

/// Classify a XAR archive by the presence of signature elements.
///
/// The entire input is buffered in memory. Unlike metadata extraction, the
/// header checksum algorithm must be one of SHA-1, SHA-256, or SHA-512, else
/// [Error::UnsupportedAlgorithm] is returned. Inputs without the XAR magic
/// resolve to [SignatureStatus::InvalidType] rather than an error.
pub fn check_signature(reader: impl Read) -> XarResult<SignatureStatus> {
    let source = buffer_reader(reader)?;

    if source.get_ref().len() < 4 || source.get_ref()[0..4] != XAR_MAGIC.to_be_bytes() {
        debug!("input lacks XAR magic");
        return Ok(SignatureStatus::InvalidType);
    }

    let xar = match XarReader::with_mode(source, ParseMode::Signature) {
        Ok(xar) => xar,
        Err(Error::BadMagic(_)) => return Ok(SignatureStatus::InvalidType),
        Err(e) => return Err(e),
    };

    let markers = xar.signature_markers();

    Ok(if markers.is_signed() {
        SignatureStatus::Signed
    } else {
        SignatureStatus::NotSigned
    })
}
