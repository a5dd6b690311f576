//! The append-only block file.
//!
//! `blocks.dat` is a concatenation of Bitcoin network-format `block`
//! messages in arrival order. Byte offsets into the file are the opaque
//! handles the key-value index stores under `blocks:`.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use halfnode_chain::block::{Block, MAX_BLOCK_BYTES};
use halfnode_chain::parameters::Magic;
use halfnode_chain::serialization::{sha256d, BitcoinDeserialize, BitcoinSerialize};

use crate::error::StoreError;

/// The 12-byte command field of a stored block message.
const BLOCK_COMMAND: [u8; 12] = *b"block\0\0\0\0\0\0\0";

/// Width of a message header: magic, command, length, checksum.
const MESSAGE_HEADER_LEN: usize = 24;

pub struct BlockStore {
    writer: BufWriter<File>,
    reader: File,
    magic: Magic,
    /// Next append position; equal to the file length.
    end: u64,
}

impl BlockStore {
    pub fn open(path: &Path, magic: Magic) -> Result<BlockStore, StoreError> {
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        let end = file.metadata()?.len();
        let reader = File::open(path)?;
        Ok(BlockStore {
            writer: BufWriter::new(file),
            reader,
            magic,
            end,
        })
    }

    /// Append `block` as a framed network message and return the offset the
    /// message starts at.
    ///
    /// The bytes are handed to the OS before this returns, so an index
    /// entry recording the offset cannot dangle across a normal exit. A
    /// full fsync per block is deliberately not attempted.
    pub fn append(&mut self, block: &Block) -> Result<u64, StoreError> {
        let payload = block.bitcoin_serialize_to_vec()?;
        let fpos = self.end;

        self.writer.write_all(&self.magic.0)?;
        self.writer.write_all(&BLOCK_COMMAND)?;
        self.writer.write_all(&(payload.len() as u32).to_le_bytes())?;
        self.writer
            .write_all(&sha256d::Checksum::from(&payload[..]).0)?;
        self.writer.write_all(&payload)?;
        self.writer.flush()?;

        self.end += (MESSAGE_HEADER_LEN + payload.len()) as u64;
        Ok(fpos)
    }

    /// Read back the block message starting at `offset`.
    pub fn read_at(&mut self, offset: u64) -> Result<Block, StoreError> {
        self.reader.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; MESSAGE_HEADER_LEN];
        self.reader.read_exact(&mut header)?;

        if header[0..4] != self.magic.0 {
            return Err(StoreError::Corrupt("bad magic in block file"));
        }
        if header[4..16] != BLOCK_COMMAND {
            return Err(StoreError::Corrupt("unexpected command in block file"));
        }
        let len = u32::from_le_bytes([header[16], header[17], header[18], header[19]]) as u64;
        if len > MAX_BLOCK_BYTES {
            return Err(StoreError::Corrupt("absurd message length in block file"));
        }

        let mut payload = vec![0u8; len as usize];
        self.reader.read_exact(&mut payload)?;

        let mut stored = [0u8; 4];
        stored.copy_from_slice(&header[20..24]);
        if sha256d::Checksum(stored) != sha256d::Checksum::from(&payload[..]) {
            return Err(StoreError::Corrupt("checksum mismatch in block file"));
        }

        Ok(Block::bitcoin_deserialize(&payload[..])?)
    }

    /// Flush pending writes and release nothing else; dropping the store
    /// closes the handles.
    pub fn close(&mut self) -> Result<(), StoreError> {
        self.writer.flush()?;
        Ok(())
    }
}
