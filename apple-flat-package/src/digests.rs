// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Whole-file content digests.

use {
    digest::Digest,
    log::{debug, error},
    md5::Md5,
    sha1::Sha1,
    sha2::Sha256,
    std::{
        fmt::Formatter,
        io::{Read, Seek, SeekFrom, Write},
    },
};

/// Digests of an entire package file.
///
/// Each digest is computed in its own pass over the source. A failed pass
/// leaves its digest unset without affecting the others.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct FileDigests {
    pub sha1: Option<Vec<u8>>,
    pub md5: Option<Vec<u8>>,
    pub sha256: Option<Vec<u8>>,
}

impl std::fmt::Debug for FileDigests {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDigests")
            .field("sha1", &self.sha1.as_ref().map(hex::encode))
            .field("md5", &self.md5.as_ref().map(hex::encode))
            .field("sha256", &self.sha256.as_ref().map(hex::encode))
            .finish()
    }
}

impl FileDigests {
    /// Compute SHA-1, MD5, and SHA-256 digests of a source.
    pub fn compute(source: &mut (impl Read + Seek)) -> Self {
        Self {
            sha1: non_fatal("SHA-1", digest_source::<Sha1>(source)),
            md5: non_fatal("MD5", digest_source::<Md5>(source)),
            sha256: non_fatal("SHA-256", digest_source::<Sha256>(source)),
        }
    }
}

fn non_fatal(name: &str, res: std::io::Result<(Vec<u8>, u64)>) -> Option<Vec<u8>> {
    match res {
        Ok((digest, size)) => {
            debug!("{} of {} bytes: {}", name, size, hex::encode(&digest));
            Some(digest)
        }
        Err(e) => {
            error!("failed to compute {} digest: {}", name, e);
            None
        }
    }
}

/// Digest a source from its beginning, returning the digest and bytes read.
pub fn digest_source<D: Digest + Write>(
    source: &mut (impl Read + Seek),
) -> std::io::Result<(Vec<u8>, u64)> {
    source.seek(SeekFrom::Start(0))?;

    let mut hasher = D::new();
    let size = std::io::copy(source, &mut hasher)?;

    Ok((hasher.finalize().to_vec(), size))
}
