//! Delta-encoded posting lists.
//!
//! A posting list is logically a strictly-ascending set of docids. On disk it
//! is stored as `[d1, d2-d1, ..., dk-d(k-1)]`: first entry absolute, the rest
//! deltas. The last element is always the current absolute maximum docid,
//! which is what makes in-place extension cheap: rewrite the tail slot as a
//! delta, then append the new docid as the new absolute anchor.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::codec::{bwt, Compressed};
use crate::DocId;

/// Serialized shape of a posting list inside its compressed frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Postings {
    pub deltas: Vec<DocId>,
}

/// Delta-encode a strictly-ascending docid list in one shot.
pub fn encode(docids: &[DocId]) -> Vec<DocId> {
    let mut deltas = Vec::with_capacity(docids.len());
    for &docid in docids {
        extend(&mut deltas, docid);
    }
    deltas
}

/// Append `docid` to a delta-form list. The caller guarantees `docid` is
/// greater than every docid already present.
pub fn extend(deltas: &mut Vec<DocId>, docid: DocId) {
    if let Some(tail) = deltas.last_mut() {
        debug_assert!(docid > *tail, "docids must ascend");
        *tail = docid - *tail;
    }
    deltas.push(docid);
}

/// Reconstruct the ascending docid list from its delta form, anchoring on the
/// absolute tail and walking backwards. Fails on anything that cannot have
/// been produced by [`extend`]: an empty list, a zero delta, or a subtraction
/// that falls to zero or below.
pub fn decode(deltas: &[DocId]) -> Result<Vec<DocId>> {
    let Some(&tail) = deltas.last() else {
        bail!("empty posting list");
    };
    let mut docids = vec![0; deltas.len()];
    let mut current = tail;
    docids[deltas.len() - 1] = current;
    for i in (0..deltas.len() - 1).rev() {
        let delta = deltas[i];
        if delta == 0 {
            bail!("zero delta in posting list");
        }
        current = match current.checked_sub(delta) {
            Some(prev) if prev > 0 => prev,
            _ => bail!("posting list does not ascend"),
        };
        docids[i] = current;
    }
    if docids[0] == 0 {
        bail!("posting list starts at docid 0");
    }
    Ok(docids)
}

/// Serialize a delta-form posting list into its `index` bucket value:
/// bincode, block compression, then the sized frame.
pub fn encode_frame(deltas: &[DocId]) -> Result<Vec<u8>> {
    let plain = bincode::serialize(&Postings {
        deltas: deltas.to_vec(),
    })?;
    let frame = Compressed {
        size: plain.len() as u64,
        data: bwt::compress(&plain),
    };
    Ok(bincode::serialize(&frame)?)
}

/// Decode an `index` bucket value back to the delta-form posting list.
pub fn decode_frame(value: &[u8]) -> Result<Vec<DocId>> {
    let frame: Compressed = bincode::deserialize(value).context("decode postings frame")?;
    let plain = bwt::decompress(&frame.data, frame.size as usize)?;
    let postings: Postings = bincode::deserialize(&plain).context("decode postings")?;
    Ok(postings.deltas)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_is_first_absolute_rest_deltas() {
        assert_eq!(encode(&[1]), vec![1]);
        assert_eq!(encode(&[1, 2]), vec![1, 2]);
        assert_eq!(encode(&[3, 7, 20]), vec![4, 13, 20]);
    }

    #[test]
    fn decode_round_trip() {
        for docids in [vec![1], vec![1, 2, 3], vec![5, 80, 81, 4000], vec![42]] {
            assert_eq!(decode(&encode(&docids)).unwrap(), docids);
        }
    }

    #[test]
    fn one_at_a_time_extension_matches_one_shot_encode() {
        let docids = [2u32, 3, 10, 11, 12, 500];
        let mut incremental = Vec::new();
        for &d in &docids {
            extend(&mut incremental, d);
        }
        assert_eq!(incremental, encode(&docids));
    }

    #[test]
    fn rejects_corrupt_lists() {
        assert!(decode(&[]).is_err());
        assert!(decode(&[0]).is_err());
        assert!(decode(&[0, 5]).is_err());
        assert!(decode(&[9, 5]).is_err());
        assert!(decode(&[5, 5]).is_err());
    }

    #[test]
    fn frame_round_trip() {
        let deltas = encode(&[1, 2, 10, 999]);
        let value = encode_frame(&deltas).unwrap();
        assert_eq!(decode_frame(&value).unwrap(), deltas);
    }
}
