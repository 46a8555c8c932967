use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::Article;

pub mod bwt;
pub mod postings;

/// zstd level for article bodies.
const BODY_LEVEL: i32 = 3;

/// The envelope stored for every large compressed blob. `size` is the
/// uncompressed byte length; decoding refuses to proceed without it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Compressed {
    pub size: u64,
    pub data: Vec<u8>,
}

/// Compress an article body payload and wrap it in a serialized frame.
pub fn compress_body(plain: &[u8]) -> Result<Vec<u8>> {
    let data = zstd::bulk::compress(plain, BODY_LEVEL).context("compress body")?;
    let frame = Compressed {
        size: plain.len() as u64,
        data,
    };
    Ok(bincode::serialize(&frame)?)
}

/// Decode a frame produced by [`compress_body`] back to the plain payload.
pub fn decompress_body(value: &[u8]) -> Result<Vec<u8>> {
    let frame: Compressed = bincode::deserialize(value).context("decode body frame")?;
    let plain = zstd::bulk::decompress(&frame.data, frame.size as usize)
        .context("decompress body")?;
    if plain.len() as u64 != frame.size {
        bail!(
            "body size mismatch: frame says {}, got {}",
            frame.size,
            plain.len()
        );
    }
    Ok(plain)
}

/// Serialize and compress an article for the `pages` bucket.
pub fn encode_article(article: &Article) -> Result<Vec<u8>> {
    let plain = bincode::serialize(article)?;
    compress_body(&plain)
}

/// Decode a `pages` bucket value back into an article.
pub fn decode_article(value: &[u8]) -> Result<Article> {
    let plain = decompress_body(value)?;
    Ok(bincode::deserialize(&plain).context("decode article")?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_round_trip() {
        let text = b"It was the best of times, it was the worst of times.".repeat(8);
        let value = compress_body(&text).unwrap();
        assert_eq!(decompress_body(&value).unwrap(), text);
    }

    #[test]
    fn body_size_is_authoritative() {
        let data = zstd::bulk::compress(b"hello world", BODY_LEVEL).unwrap();
        let frame = Compressed { size: 5, data };
        let value = bincode::serialize(&frame).unwrap();
        assert!(decompress_body(&value).is_err());
    }

    #[test]
    fn article_round_trip() {
        let article = Article {
            title: "Alpha".into(),
            id: 42,
            text: "hello world".into(),
        };
        let value = encode_article(&article).unwrap();
        assert_eq!(decode_article(&value).unwrap(), article);
    }

    #[test]
    fn garbage_frame_is_an_error() {
        assert!(decompress_body(&[0xff, 0xfe, 0xfd]).is_err());
    }
}
