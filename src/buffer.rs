//! Accounting for the attached transfer buffer used by buffered writes.

use crate::error::{Error, Result};

/// A handle to bytes staged in the attached buffer.
///
/// A reservation is released exactly once, when its request completes or is
/// cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Reservation {
    id: u64,
    len: usize,
}

impl Reservation {
    /// Number of bytes held by the reservation.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Clone, Copy, Debug)]
struct Block {
    id: u64,
    offset: usize,
    len: usize,
}

/// A fixed-capacity arena of bytes.
///
/// Space is handed out at the tail. When the tail runs out but enough space
/// has been freed elsewhere, live blocks are moved to the front.
#[derive(Debug)]
pub struct TransferBuffer {
    bytes: Vec<u8>,
    /// Live blocks, ordered by offset.
    blocks: Vec<Block>,
    tail: usize,
    used: usize,
}

impl TransferBuffer {
    fn new(capacity: usize) -> TransferBuffer {
        TransferBuffer {
            bytes: vec![0; capacity],
            blocks: Vec::new(),
            tail: 0,
            used: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn available(&self) -> usize {
        self.capacity() - self.used
    }

    fn compact(&mut self) {
        let mut dest = 0;
        for block in &mut self.blocks {
            if block.offset != dest {
                self.bytes
                    .copy_within(block.offset..block.offset + block.len, dest);
                block.offset = dest;
            }
            dest += block.len;
        }
        self.tail = dest;
        log::trace!("compacted transfer buffer to {} bytes", dest);
    }

    fn allocate(&mut self, id: u64, len: usize) -> usize {
        if self.tail + len > self.capacity() {
            self.compact();
        }
        let offset = self.tail;
        self.blocks.push(Block { id, offset, len });
        self.tail += len;
        self.used += len;
        offset
    }

    fn find(&self, id: u64) -> Option<usize> {
        self.blocks.iter().position(|block| block.id == id)
    }
}

/// Tracks the capacity and usage of a dataset's attached buffer.
#[derive(Debug, Default)]
pub struct BufferAccountant {
    buffer: Option<TransferBuffer>,
    next_id: u64,
}

impl BufferAccountant {
    pub fn new() -> BufferAccountant {
        BufferAccountant::default()
    }

    /// Attaches a buffer of `capacity` bytes.
    pub fn attach(&mut self, capacity: usize) -> Result<()> {
        if self.buffer.is_some() {
            return Err(Error::AlreadyAttached);
        }
        if capacity == 0 {
            return Err(Error::InvalidCapacity(capacity));
        }
        self.buffer = Some(TransferBuffer::new(capacity));
        log::debug!("attached transfer buffer of {} bytes", capacity);
        Ok(())
    }

    /// Detaches the buffer. Fails while any reservation is outstanding.
    pub fn detach(&mut self) -> Result<()> {
        match self.buffer {
            None => Err(Error::NoBufferAttached),
            Some(ref buffer) if !buffer.blocks.is_empty() => {
                Err(Error::BufferBusy { usage: buffer.used })
            }
            Some(_) => {
                self.buffer = None;
                log::debug!("detached transfer buffer");
                Ok(())
            }
        }
    }

    pub fn is_attached(&self) -> bool {
        self.buffer.is_some()
    }

    /// Capacity of the attached buffer, or 0 if none is attached.
    pub fn capacity(&self) -> usize {
        self.buffer.as_ref().map_or(0, TransferBuffer::capacity)
    }

    /// Bytes currently reserved, or 0 if no buffer is attached.
    pub fn usage(&self) -> usize {
        self.buffer.as_ref().map_or(0, |buffer| buffer.used)
    }

    /// Reserves `len` zeroed bytes.
    pub fn reserve(&mut self, len: usize) -> Result<Reservation> {
        let buffer = self.buffer.as_mut().ok_or(Error::NoBufferAttached)?;
        if len > buffer.available() {
            return Err(Error::BufferExhausted {
                requested: len,
                available: buffer.available(),
            });
        }
        let id = self.next_id;
        self.next_id += 1;
        let offset = buffer.allocate(id, len);
        buffer.bytes[offset..offset + len].fill(0);
        log::trace!("reserved {} bytes ({} in use)", len, buffer.used);
        Ok(Reservation { id, len })
    }

    /// Reserves space for `bytes` and copies them in.
    pub fn stage(&mut self, bytes: &[u8]) -> Result<Reservation> {
        let reservation = self.reserve(bytes.len())?;
        if let Some(buffer) = self.buffer.as_mut() {
            if let Some(index) = buffer.find(reservation.id) {
                let offset = buffer.blocks[index].offset;
                buffer.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
            }
        }
        Ok(reservation)
    }

    /// The bytes held by a live reservation.
    pub fn bytes(&self, reservation: &Reservation) -> Result<&[u8]> {
        let buffer = self.buffer.as_ref().ok_or(Error::NoBufferAttached)?;
        let index = buffer.find(reservation.id).ok_or(Error::DoubleRelease)?;
        let block = buffer.blocks[index];
        Ok(&buffer.bytes[block.offset..block.offset + block.len])
    }

    /// Returns a reservation's bytes to the buffer.
    pub fn release(&mut self, reservation: Reservation) -> Result<()> {
        let buffer = self.buffer.as_mut().ok_or(Error::DoubleRelease)?;
        let index = buffer.find(reservation.id).ok_or(Error::DoubleRelease)?;
        let block = buffer.blocks.remove(index);
        buffer.used -= block.len;
        if buffer.blocks.is_empty() {
            buffer.tail = 0;
        } else if block.offset + block.len == buffer.tail {
            buffer.tail = block.offset;
        }
        log::trace!("released {} bytes ({} in use)", block.len, buffer.used);
        Ok(())
    }
}
