use crate::types::HashAlgorithm;
use data_encoding::HEXLOWER;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

fn digest_reader<D: Digest>(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = D::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(HEXLOWER.encode(&hasher.finalize()))
}

/// Lowercase hex digest of the file at `path`.
pub fn file_digest(
    path: &Path,
    algorithm: HashAlgorithm,
) -> io::Result<String> {
    let file = File::open(path)?;
    match algorithm {
        HashAlgorithm::Sha1 => digest_reader::<Sha1>(file),
        HashAlgorithm::Sha256 => digest_reader::<Sha256>(file),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(HashAlgorithm::Sha1, "a9993e364706816aba3e25717850c26c9cd0d89d")]
    #[case(
        HashAlgorithm::Sha256,
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    )]
    fn test_file_digest(#[case] algorithm: HashAlgorithm, #[case] hex: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(file_digest(&path, algorithm).unwrap(), hex);
    }

    #[test]
    fn test_file_digest_missing_file() {
        let err = file_digest(
            Path::new("/nonexistent/solbuild"),
            HashAlgorithm::Sha256,
        );
        assert!(err.is_err());
    }
}
