//! Split a raw MJPEG byte stream into whole JPEG images
//!
//! ffmpeg's `-f mjpeg` output is JPEGs back to back. Frames run from the SOI
//! marker (FF D8) to the EOI marker (FF D9); bytes outside a frame are
//! discarded.

use bytes::{Buf, Bytes, BytesMut};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

pub struct MjpegSplitter {
    buf: BytesMut,
    in_frame: bool,
    // Where to resume the EOI search so bytes are scanned once
    scan_from: usize,
    max_frame: usize,
}

impl MjpegSplitter {
    pub fn new(max_frame: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(64 * 1024),
            in_frame: false,
            scan_from: 0,
            max_frame,
        }
    }

    /// Feed a chunk, get back every frame it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();

        loop {
            if !self.in_frame {
                match find(&self.buf, &SOI, 0) {
                    Some(start) => {
                        self.buf.advance(start);
                        self.in_frame = true;
                        self.scan_from = SOI.len();
                    }
                    None => {
                        // Keep a trailing 0xFF, it may begin the next SOI
                        let keep = usize::from(self.buf.last() == Some(&0xFF));
                        let discard = self.buf.len() - keep;
                        self.buf.advance(discard);
                        break;
                    }
                }
            }

            match find(&self.buf, &EOI, self.scan_from) {
                Some(end) => {
                    frames.push(self.buf.split_to(end + EOI.len()).freeze());
                    self.in_frame = false;
                    self.scan_from = 0;
                }
                None => {
                    if self.buf.len() > self.max_frame {
                        tracing::warn!(
                            buffered = self.buf.len(),
                            limit = self.max_frame,
                            "Discarding oversized frame"
                        );
                        self.buf.clear();
                        self.in_frame = false;
                        self.scan_from = 0;
                    } else {
                        self.scan_from = self.buf.len().saturating_sub(1).max(SOI.len());
                    }
                    break;
                }
            }
        }

        frames
    }
}

fn find(haystack: &[u8], needle: &[u8; 2], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(2)
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(body: &[u8]) -> Vec<u8> {
        let mut v = SOI.to_vec();
        v.extend_from_slice(body);
        v.extend_from_slice(&EOI);
        v
    }

    #[test]
    fn test_split_back_to_back_frames() {
        let mut splitter = MjpegSplitter::new(1024);
        let mut stream = jpeg(b"one");
        stream.extend(jpeg(b"two"));

        let frames = splitter.push(&stream);
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], &jpeg(b"one")[..]);
        assert_eq!(&frames[1][..], &jpeg(b"two")[..]);
    }

    #[test]
    fn test_frame_across_chunks() {
        let mut splitter = MjpegSplitter::new(1024);
        let frame = jpeg(b"payload");

        // split right inside the EOI marker
        let cut = frame.len() - 1;
        assert!(splitter.push(&frame[..cut]).is_empty());
        let frames = splitter.push(&frame[cut..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &frame[..]);
    }

    #[test]
    fn test_garbage_before_soi_is_dropped() {
        let mut splitter = MjpegSplitter::new(1024);
        let mut stream = b"junk\xFF".to_vec();
        assert!(splitter.push(&stream).is_empty());

        stream = vec![0xD8];
        stream.extend_from_slice(b"x");
        stream.extend_from_slice(&EOI);
        let frames = splitter.push(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &jpeg(b"x")[..]);
    }

    #[test]
    fn test_oversized_frame_is_discarded() {
        let mut splitter = MjpegSplitter::new(8);
        let mut stream = SOI.to_vec();
        stream.extend_from_slice(&[0u8; 32]);
        assert!(splitter.push(&stream).is_empty());

        let frames = splitter.push(&jpeg(b"ok"));
        assert_eq!(frames.len(), 1);
    }
}
