use log::{debug, info};
use std::io::{Read, Write};

const CHUNK_SIZE: usize = 32 * 1024;

/// Stream `uri` into `dest`, logging progress in tenths when the server
/// reports a length. Returns the number of bytes written.
pub fn download(
    uri: &str,
    dest: &mut impl Write,
    label: &str,
) -> Result<u64, String> {
    debug!("GET {}", uri);
    let response = ureq::get(uri).call().map_err(|e| e.to_string())?;

    let total: Option<u64> = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());

    let mut reader = response.into_body().into_reader();
    copy_with_progress(&mut reader, dest, total, label)
}

pub(crate) fn copy_with_progress(
    reader: &mut impl Read,
    dest: &mut impl Write,
    total: Option<u64>,
    label: &str,
) -> Result<u64, String> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written: u64 = 0;
    let mut last_tenth = 0;

    loop {
        let n = reader.read(&mut buf).map_err(|e| e.to_string())?;
        if n == 0 {
            break;
        }
        dest.write_all(&buf[..n]).map_err(|e| e.to_string())?;
        written += n as u64;

        if let Some(total) = total.filter(|t| *t > 0) {
            let tenth = (written.saturating_mul(10) / total).min(10);
            if tenth > last_tenth {
                last_tenth = tenth;
                info!(
                    "{}: {}% ({} of {} bytes)",
                    label,
                    tenth * 10,
                    written,
                    total
                );
            }
        }
    }
    dest.flush().map_err(|e| e.to_string())?;

    if let Some(total) = total {
        if written != total {
            return Err(format!(
                "short read: expected {} bytes, got {}",
                total, written
            ));
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_with_progress() {
        let data = vec![7u8; 100_000];
        let mut out = Vec::new();
        let n = copy_with_progress(
            &mut data.as_slice(),
            &mut out,
            Some(100_000),
            "test",
        )
        .unwrap();
        assert_eq!(n, 100_000);
        assert_eq!(out, data);
    }

    #[test]
    fn test_copy_detects_short_body() {
        let data = vec![1u8; 10];
        let mut out = Vec::new();
        let result =
            copy_with_progress(&mut data.as_slice(), &mut out, Some(20), "x");
        assert!(result.is_err());
    }

    #[test]
    fn test_copy_unknown_length() {
        let data = b"hello".to_vec();
        let mut out = Vec::new();
        let n =
            copy_with_progress(&mut data.as_slice(), &mut out, None, "x")
                .unwrap();
        assert_eq!(n, 5);
    }
}
