// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Helpers to assemble XAR archives in memory for tests.

use {
    crate::format::{XarHeader, XAR_MAGIC},
    flate2::{write::ZlibEncoder, Compression},
    scroll::IOwrite,
    std::io::Write,
};

/// How a test file is stored in the heap.
#[derive(Clone, Copy, Debug)]
pub enum Stored {
    Raw,
    Zlib,
    Bzip2,
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn bzip2(data: &[u8]) -> Vec<u8> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Builds a XAR archive with top-level files.
#[derive(Default)]
pub struct XarBuilder {
    files: Vec<(String, Vec<u8>, Stored)>,
    extra_toc: String,
    checksum_algorithm_id: u32,
}

impl XarBuilder {
    pub fn new() -> Self {
        Self {
            checksum_algorithm_id: 1,
            ..Default::default()
        }
    }

    pub fn file(mut self, name: &str, data: &[u8], stored: Stored) -> Self {
        self.files.push((name.to_string(), data.to_vec(), stored));
        self
    }

    /// Raw XML inserted into `<toc>` after the file records.
    pub fn toc_xml(mut self, xml: &str) -> Self {
        self.extra_toc.push_str(xml);
        self
    }

    pub fn checksum_algorithm(mut self, id: u32) -> Self {
        self.checksum_algorithm_id = id;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut heap = Vec::new();
        let mut records = String::new();

        for (i, (name, data, stored)) in self.files.iter().enumerate() {
            let (encoded, style) = match stored {
                Stored::Raw => (data.clone(), "application/octet-stream"),
                Stored::Zlib => (zlib(data), "application/x-gzip"),
                Stored::Bzip2 => (bzip2(data), "application/x-bzip2"),
            };

            records.push_str(&format!(
                "<file id=\"{}\"><name>{}</name><type>file</type><data>\
                 <length>{}</length><offset>{}</offset><size>{}</size>\
                 <encoding style=\"{}\"/></data></file>",
                i + 1,
                name,
                encoded.len(),
                heap.len(),
                data.len(),
                style
            ));

            heap.extend_from_slice(&encoded);
        }

        let toc = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<xar><toc>\
             <creation-time>2022-01-01T00:00:00</creation-time>{}{}</toc></xar>",
            records, self.extra_toc
        );

        let toc_compressed = zlib(toc.as_bytes());

        let header = XarHeader {
            magic: XAR_MAGIC,
            size: 28,
            version: 1,
            toc_length_compressed: toc_compressed.len() as _,
            toc_length_uncompressed: toc.len() as _,
            checksum_algorithm_id: self.checksum_algorithm_id,
        };

        let mut archive = Vec::new();
        archive.iowrite_with(header, scroll::BE).unwrap();
        archive.extend_from_slice(&toc_compressed);
        archive.extend_from_slice(&heap);

        archive
    }
}
