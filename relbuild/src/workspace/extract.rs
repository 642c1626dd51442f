//! Source archive extraction.

use crate::errors::{BuildError, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;
use xz2::read::XzDecoder;

/// Name of the directory an archive unpacks to: its file name up to `.tar`
/// (or `.tgz`/`.txz`).
#[must_use]
pub fn source_dir_name(archive: &Path) -> String {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    for marker in [".tar", ".tgz", ".txz"] {
        if let Some(idx) = name.find(marker) {
            return name[..idx].to_string();
        }
    }
    name
}

/// Unpacks a `.tar`, `.tar.gz`/`.tgz` or `.tar.xz`/`.txz` archive into `dest`.
pub fn extract_archive(dest: &Path, archive: &Path) -> Result<()> {
    debug!(archive = %archive.display(), dest = %dest.display(), "Extracting archive");
    std::fs::create_dir_all(dest)?;
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file = BufReader::new(File::open(archive)?);

    let reader: Box<dyn Read> = if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Box::new(GzDecoder::new(file))
    } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
        Box::new(XzDecoder::new(file))
    } else if name.ends_with(".tar") {
        Box::new(file)
    } else {
        return Err(BuildError::Archive(format!(
            "unsupported archive format: {}",
            archive.display()
        )));
    };

    tar::Archive::new(reader)
        .unpack(dest)
        .map_err(|e| BuildError::Archive(format!("failed to extract {}: {e}", archive.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn write_tar_gz(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, body) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, name, body.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_source_dir_name() {
        assert_eq!(source_dir_name(Path::new("/d/zlib-1.3.tar.gz")), "zlib-1.3");
        assert_eq!(source_dir_name(Path::new("Python-3.10.9.tar.xz")), "Python-3.10.9");
        assert_eq!(source_dir_name(Path::new("libffi-3.4.tgz")), "libffi-3.4");
        assert_eq!(source_dir_name(Path::new("plain")), "plain");
    }

    #[test]
    fn test_extract_tar_gz() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("pkg-1.0.tar.gz");
        write_tar_gz(&archive, &[("pkg-1.0/configure", "#!/bin/sh\n")]);

        let dest = tmp.path().join("src");
        extract_archive(&dest, &archive).unwrap();

        let configure = dest.join(source_dir_name(&archive)).join("configure");
        assert_eq!(std::fs::read_to_string(configure).unwrap(), "#!/bin/sh\n");
    }

    #[test]
    fn test_unsupported_format() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("pkg.zip");
        std::fs::write(&archive, b"PK").unwrap();
        assert!(matches!(
            extract_archive(tmp.path(), &archive),
            Err(BuildError::Archive(_))
        ));
    }
}
