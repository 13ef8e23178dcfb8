use bytes::Bytes;

/// Largest body frame emitted by default, 64 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Splits `data` into slices of at most `chunk_size` bytes, each tagged with whether it is the
/// last one.
///
/// Empty input yields a single empty chunk marked last, so a caller always has one frame to
/// close the body with. A `chunk_size` of zero is treated as one.
pub fn chunk_bytes(data: Bytes, chunk_size: usize) -> Chunks {
    Chunks { data, chunk_size: chunk_size.max(1), position: 0, done: false }
}

#[derive(Debug, Clone)]
pub struct Chunks {
    data: Bytes,
    chunk_size: usize,
    position: usize,
    done: bool,
}

impl Iterator for Chunks {
    type Item = (Bytes, bool);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let len = self.data.len();
        if len == 0 {
            self.done = true;
            return Some((Bytes::new(), true));
        }

        let end = len.min(self.position + self.chunk_size);
        let chunk = self.data.slice(self.position..end);
        self.position = end;
        self.done = end >= len;
        Some((chunk, self.done))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.done {
            0
        } else if self.data.is_empty() {
            1
        } else {
            (self.data.len() - self.position).div_ceil(self.chunk_size)
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Chunks {}
