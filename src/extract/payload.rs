use flate2::read::MultiGzDecoder;
use std::borrow::Cow;
use std::io::{self, Read};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn is_gzip(raw: &[u8]) -> bool {
    raw.starts_with(&GZIP_MAGIC)
}

/// Return the bytes the extraction engine should see for a stored payload.
///
/// Object bodies are kept exactly as the provider delivered them, which is
/// usually gzip. Multi-member archives are concatenated.
pub fn decompress_if_gzip(raw: &[u8]) -> io::Result<Cow<'_, [u8]>> {
    if !is_gzip(raw) {
        return Ok(Cow::Borrowed(raw));
    }
    let mut out = Vec::with_capacity(raw.len() * 4);
    MultiGzDecoder::new(raw).read_to_end(&mut out)?;
    Ok(Cow::Owned(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_plain_passthrough() {
        let raw = b"{\"a\":1}";
        let out = decompress_if_gzip(raw).unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(&*out, raw);
    }

    #[test]
    fn test_gzip_detected_and_decoded() {
        let packed = gzip(b"{\"a\":1}\n{\"b\":2}\n");
        assert!(is_gzip(&packed));
        let out = decompress_if_gzip(&packed).unwrap();
        assert_eq!(&*out, b"{\"a\":1}\n{\"b\":2}\n");
    }

    #[test]
    fn test_multi_member_gzip() {
        let mut packed = gzip(b"{\"a\":1}\n");
        packed.extend(gzip(b"{\"b\":2}\n"));
        let out = decompress_if_gzip(&packed).unwrap();
        assert_eq!(&*out, b"{\"a\":1}\n{\"b\":2}\n");
    }

    #[test]
    fn test_corrupt_gzip_is_error() {
        let raw = [0x1f, 0x8b, 0x08, 0x00, 0xff];
        assert!(decompress_if_gzip(&raw).is_err());
    }
}
