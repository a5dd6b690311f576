//! The double-SHA256 hash used throughout the Bitcoin protocol.

use std::io;

use sha2::{Digest, Sha256};

/// A write-through adapter that accumulates a SHA256d digest.
///
/// Serializing a structure into this writer and calling [`finish`] is the
/// canonical way to compute its protocol hash without an intermediate
/// allocation.
///
/// [`finish`]: Writer::finish
#[derive(Default)]
pub struct Writer {
    hash: Sha256,
}

impl Writer {
    /// Consume the writer and produce the double hash of everything written.
    pub fn finish(self) -> [u8; 32] {
        let result1 = self.hash.finalize();
        let result2 = Sha256::digest(&result1);
        let mut buffer = [0u8; 32];
        buffer.copy_from_slice(&result2);
        buffer
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hash.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A 4-byte checksum: the first four bytes of a SHA256d digest.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Checksum(pub [u8; 4]);

impl<'a> From<&'a [u8]> for Checksum {
    fn from(bytes: &'a [u8]) -> Self {
        let digest = Sha256::digest(&Sha256::digest(bytes));
        let mut checksum = [0u8; 4];
        checksum.copy_from_slice(&digest[0..4]);
        Self(checksum)
    }
}

impl std::fmt::Debug for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("Checksum")
            .field(&hex::encode(&self.0))
            .finish()
    }
}
