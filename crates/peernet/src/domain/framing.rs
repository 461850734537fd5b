//! Length-prefixed message framing.
//!
//! The socket driver moves raw bytes; the dispatch flow hands the protocol
//! handler whole messages. Wire layout per frame:
//!
//! ```text
//! [0..4)   payload length, big-endian u32
//! [4..4+n) payload bytes (opaque to this crate)
//! ```

use crate::domain::errors::PeerIoError;

/// Frame header size in bytes.
pub const HEADER_LEN: usize = 4;

/// Encode one payload into a framed byte vector.
pub fn encode_frame(payload: &[u8], max_frame_size: usize) -> Result<Vec<u8>, PeerIoError> {
    if payload.len() > max_frame_size {
        return Err(PeerIoError::OversizedFrame);
    }
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Extract every complete frame from `buf`, leaving any partial frame in
/// place for the next read. Returns the completed payloads in arrival
/// order. A header announcing more than `max_frame_size` bytes poisons the
/// stream and is reported as an oversized-frame error.
pub fn extract_frames(
    buf: &mut Vec<u8>,
    max_frame_size: usize,
) -> Result<Vec<Vec<u8>>, PeerIoError> {
    let mut frames = Vec::new();
    let mut offset = 0usize;

    loop {
        let remaining = buf.len() - offset;
        if remaining < HEADER_LEN {
            break;
        }
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&buf[offset..offset + HEADER_LEN]);
        let len = u32::from_be_bytes(header) as usize;
        if len > max_frame_size {
            buf.clear();
            return Err(PeerIoError::OversizedFrame);
        }
        if remaining < HEADER_LEN + len {
            break;
        }
        frames.push(buf[offset + HEADER_LEN..offset + HEADER_LEN + len].to_vec());
        offset += HEADER_LEN + len;
    }

    if offset > 0 {
        buf.drain(..offset);
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 1024;

    #[test]
    fn roundtrip_single_frame() {
        let mut buf = encode_frame(b"hello", MAX).unwrap();
        let frames = extract_frames(&mut buf, MAX).unwrap();
        assert_eq!(frames, vec![b"hello".to_vec()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_stays_buffered() {
        let encoded = encode_frame(b"partial", MAX).unwrap();
        let mut buf = encoded[..encoded.len() - 3].to_vec();
        let frames = extract_frames(&mut buf, MAX).unwrap();
        assert!(frames.is_empty());
        assert_eq!(buf.len(), encoded.len() - 3);

        // Completing the frame releases it.
        buf.extend_from_slice(&encoded[encoded.len() - 3..]);
        let frames = extract_frames(&mut buf, MAX).unwrap();
        assert_eq!(frames, vec![b"partial".to_vec()]);
    }

    #[test]
    fn multiple_frames_in_one_read() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&encode_frame(b"one", MAX).unwrap());
        buf.extend_from_slice(&encode_frame(b"", MAX).unwrap());
        buf.extend_from_slice(&encode_frame(b"three", MAX).unwrap());
        let frames = extract_frames(&mut buf, MAX).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], b"one");
        assert!(frames[1].is_empty());
        assert_eq!(frames[2], b"three");
    }

    #[test]
    fn oversized_header_rejects_stream() {
        let mut buf = (MAX as u32 + 1).to_be_bytes().to_vec();
        buf.extend_from_slice(&[0u8; 8]);
        let err = extract_frames(&mut buf, MAX).unwrap_err();
        assert_eq!(err, PeerIoError::OversizedFrame);
        assert!(buf.is_empty());
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let payload = vec![0u8; MAX + 1];
        assert_eq!(
            encode_frame(&payload, MAX).unwrap_err(),
            PeerIoError::OversizedFrame
        );
    }
}
