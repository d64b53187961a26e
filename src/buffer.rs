//! The growable per-connection byte buffer.
//!
//! This plays the role `netbuf::Buf` plays in this crate's ancestry, but
//! every growth is observed so it can be mirrored into a `MemoryCounter`:
//! the admission policy needs to see capacity changes as they happen, not
//! just the buffer's final size, and `netbuf::Buf` doesn't expose a hook
//! for that. The buffer keeps `data.len() == data.capacity()` at all
//! times and tracks how much of that is actually valid in `filled`, so
//! growth is always an explicit, observable `Vec::resize`.

use std::io;

use memory::MemoryCounter;

pub struct Buffer {
    data: Vec<u8>,
    filled: usize,
    mem: MemoryCounter,
    tracked_cap: usize,
}

impl Buffer {
    pub fn new(mem: MemoryCounter) -> Buffer {
        Buffer { data: Vec::new(), filled: 0, mem: mem, tracked_cap: 0 }
    }

    pub fn with_capacity(cap: usize, mem: MemoryCounter) -> Buffer {
        let mut buf = Buffer::new(mem);
        buf.ensure_free(cap);
        buf
    }

    /// Grow so that at least `min_free` bytes are available past
    /// `filled`, if they aren't already.
    pub fn ensure_free(&mut self, min_free: usize) {
        let needed = self.filled + min_free;
        if self.data.len() < needed {
            let new_cap = needed.next_power_of_two().max(64);
            self.data.resize(new_cap, 0);
            self.sync_capacity();
        }
    }

    fn sync_capacity(&mut self) {
        let cap = self.data.len() as i64;
        let delta = cap - self.tracked_cap as i64;
        if delta != 0 {
            self.mem.add(delta);
            self.tracked_cap = cap as usize;
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.filled]
    }

    /// The writable tail past `filled`.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.filled..]
    }

    /// Record that `n` bytes were written into the tail returned by
    /// `spare_mut`.
    pub fn advance(&mut self, n: usize) {
        assert!(self.filled + n <= self.data.len());
        self.filled += n;
    }

    /// Read once from `src` into the buffer's spare capacity, growing
    /// first if there's none. Returns the number of bytes read (0 means
    /// the peer is done writing).
    pub fn read_from<R: io::Read>(&mut self, src: &mut R) -> io::Result<usize> {
        if self.data.len() == self.filled {
            self.ensure_free(self.data.len().max(64));
        }
        let n = src.read(self.spare_mut())?;
        self.advance(n);
        Ok(n)
    }

    /// Drop the first `from` bytes, shifting the remainder (if any) down
    /// to the start of the buffer. Used to discard bytes the parser has
    /// fully consumed and free the read buffer to accept more.
    pub fn consume(&mut self, from: usize) {
        assert!(from <= self.filled);
        if from == 0 {
            return;
        }
        self.data.copy_within(from..self.filled, 0);
        self.filled -= from;
    }

    /// Discard all buffered bytes without touching allocated capacity.
    pub fn clear(&mut self) {
        self.filled = 0;
    }

    /// Roll `filled` back to `mark`, discarding everything written
    /// since. Used to undo a header write that turned out invalid.
    pub fn clear_from(&mut self, mark: usize) {
        assert!(mark <= self.filled);
        self.filled = mark;
    }

    /// Reclaim capacity grown past `target` by reallocating a fresh
    /// buffer sized to `target` (or to whatever's still buffered, if
    /// that's bigger) and copying the unconsumed bytes across. A
    /// connection's buffer can grow arbitrarily large servicing one
    /// oversized request; without this, a keep-alive connection would
    /// carry that peak allocation for the rest of its life instead of
    /// returning to baseline between requests.
    pub fn shrink_to(&mut self, target: usize) {
        if self.data.len() <= target {
            return;
        }
        let keep = self.filled;
        let mut replacement = Buffer::new(self.mem.clone());
        replacement.ensure_free(target.max(keep));
        replacement.spare_mut()[..keep].copy_from_slice(&self.data[..keep]);
        replacement.advance(keep);
        *self = replacement;
    }
}

impl io::Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ensure_free(buf.len());
        self.spare_mut()[..buf.len()].copy_from_slice(buf);
        self.advance(buf.len());
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if self.tracked_cap != 0 {
            self.mem.add(-(self.tracked_cap as i64));
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;
    use memory::MemoryCounter;
    use super::Buffer;

    #[test]
    fn write_grows_and_tracks_memory() {
        let mem = MemoryCounter::new();
        let mut buf = Buffer::new(mem.clone());
        buf.write_all(b"hello").unwrap();
        assert_eq!(buf.data(), b"hello");
        assert!(mem.get() >= 5);
    }

    #[test]
    fn consume_shifts_remainder_down() {
        let mem = MemoryCounter::new();
        let mut buf = Buffer::new(mem.clone());
        buf.write_all(b"GET / HTTP/1.1\r\n").unwrap();
        buf.consume(4);
        assert_eq!(buf.data(), b"/ HTTP/1.1\r\n");
    }

    #[test]
    fn drop_releases_tracked_memory() {
        let mem = MemoryCounter::new();
        {
            let mut buf = Buffer::new(mem.clone());
            buf.write_all(b"some bytes").unwrap();
            assert!(mem.get() > 0);
        }
        assert_eq!(mem.get(), 0);
    }

    #[test]
    fn shrink_to_reclaims_capacity_grown_past_target() {
        let mem = MemoryCounter::new();
        let mut buf = Buffer::with_capacity(64, mem.clone());
        buf.write_all(&vec![0u8; 4096]).unwrap();
        let grown = mem.get();
        assert!(grown > 64);

        buf.consume(4096);
        buf.shrink_to(64);
        assert_eq!(buf.capacity(), 64);
        assert!(mem.get() < grown);
        assert_eq!(mem.get(), 64);
    }

    #[test]
    fn shrink_to_preserves_unconsumed_bytes() {
        let mem = MemoryCounter::new();
        let mut buf = Buffer::with_capacity(4096, mem.clone());
        buf.write_all(b"leftover").unwrap();
        buf.shrink_to(16);
        assert_eq!(buf.data(), b"leftover");
    }
}
