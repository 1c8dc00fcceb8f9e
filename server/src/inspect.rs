use std::path::Path;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

use api::inspect::InspectResp;

/// cap on how much of a `moov` box we'll read looking for a codec fourcc;
/// `moov` is metadata, not sample data, so this is generous without risking
/// reading an entire multi-gigabyte file
const MOOV_SCAN_CAP: u64 = 4 * 1024 * 1024;

/// top-level boxes visited before giving up on finding `mdat`
const MAX_TOP_LEVEL_BOXES: u32 = 64;

const KNOWN_CODECS: &[&str] = &["avc1", "hvc1", "hev1", "av01", "mp4v", "vp09", "mp4a"];

/// read-only MP4 container probe: reports file size/mtime plus two
/// heuristics -- whether `moov` (metadata) precedes `mdat` (sample data) in
/// box order, which determines whether a player can start without seeking
/// to the file's tail, and a codec fourcc sniffed out of `moov`'s bytes
pub async fn probe(path: &Path) -> Result<InspectResp> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("{path:?} not found"))?;

    let mtime_ms = meta
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    let mut file = File::open(path).await?;
    let (moov_in_head, moov_box) = scan_top_level_boxes(&mut file, meta.len()).await?;

    let codec_hint = match moov_box {
        Some((offset, size)) => find_codec_hint(&mut file, offset, size).await?,
        None => None,
    };

    Ok(InspectResp {
        ok: true,
        size: meta.len(),
        mtime_ms,
        moov_in_head,
        codec_hint,
    })
}

/// walks top-level boxes by header only (never reads `mdat`'s payload);
/// returns whether `moov` was seen before `mdat`, and `moov`'s own
/// (offset, size) if found, for the codec-hint pass below
async fn scan_top_level_boxes(
    file: &mut File,
    file_len: u64,
) -> Result<(Option<bool>, Option<(u64, u64)>)> {
    let mut pos: u64 = 0;
    let mut seen_moov = false;
    let mut moov_box = None;

    for _ in 0..MAX_TOP_LEVEL_BOXES {
        if pos + 8 > file_len {
            break;
        }
        file.seek(SeekFrom::Start(pos)).await?;

        let mut header = [0u8; 8];
        if file.read_exact(&mut header).await.is_err() {
            break;
        }
        let declared_size = u32::from_be_bytes(header[0..4].try_into().unwrap()) as u64;
        let box_type = &header[4..8];

        let (box_size, header_len) = if declared_size == 1 {
            let mut ext = [0u8; 8];
            if file.read_exact(&mut ext).await.is_err() {
                break;
            }
            (u64::from_be_bytes(ext), 16)
        } else if declared_size == 0 {
            (file_len - pos, 8)
        } else {
            (declared_size, 8)
        };

        if box_size < header_len || pos + box_size > file_len {
            break;
        }

        match box_type {
            b"moov" => {
                seen_moov = true;
                moov_box = Some((pos + header_len, box_size - header_len));
            }
            b"mdat" => {
                return Ok((Some(seen_moov), moov_box));
            }
            _ => {}
        }

        pos += box_size;
    }

    // no `mdat` observed within the scanned prefix: report what we know
    // about `moov` without claiming an ordering we didn't verify
    Ok((seen_moov.then_some(true), moov_box))
}

async fn find_codec_hint(file: &mut File, offset: u64, size: u64) -> Result<Option<String>> {
    let take = size.min(MOOV_SCAN_CAP);
    file.seek(SeekFrom::Start(offset)).await?;

    let mut buf = vec![0u8; take as usize];
    let read = file.read(&mut buf).await?;
    buf.truncate(read);

    for codec in KNOWN_CODECS {
        if buf.windows(4).any(|w| w == codec.as_bytes()) {
            return Ok(Some((*codec).to_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_box(buf: &mut Vec<u8>, box_type: &[u8; 4], payload: &[u8]) {
        let size = (8 + payload.len()) as u32;
        buf.extend_from_slice(&size.to_be_bytes());
        buf.extend_from_slice(box_type);
        buf.extend_from_slice(payload);
    }

    #[tokio::test]
    async fn moov_before_mdat_is_detected() {
        let mut bytes = Vec::new();
        write_box(&mut bytes, b"ftyp", b"isom");
        write_box(&mut bytes, b"moov", b"avc1-sample-description-bytes");
        write_box(&mut bytes, b"mdat", b"fake-sample-data");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::File::create(&path).unwrap().write_all(&bytes).unwrap();

        let resp = probe(&path).await.unwrap();
        assert_eq!(resp.moov_in_head, Some(true));
        assert_eq!(resp.codec_hint.as_deref(), Some("avc1"));
    }

    #[tokio::test]
    async fn mdat_before_moov_is_detected() {
        let mut bytes = Vec::new();
        write_box(&mut bytes, b"ftyp", b"isom");
        write_box(&mut bytes, b"mdat", b"fake-sample-data");
        write_box(&mut bytes, b"moov", b"hvc1-sample-description-bytes");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::File::create(&path).unwrap().write_all(&bytes).unwrap();

        let resp = probe(&path).await.unwrap();
        assert_eq!(resp.moov_in_head, Some(false));
    }

    #[tokio::test]
    async fn missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.mp4");
        assert!(probe(&path).await.is_err());
    }
}
