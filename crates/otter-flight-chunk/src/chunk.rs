//! Chunk file writer
//!
//! Owns one chunk file: writes the header on open, appends events, and
//! rewrites the header in place on every flush. Any I/O failure invalidates
//! the writer; subsequent operations are no-ops until [`ChunkWriter::reopen`].

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::checkpoint::{CheckpointFlags, CheckpointWriter};
use crate::encoding::IntEncoding;
use crate::error::{ChunkError, Result};
use crate::header::{
    COMPLETE, ChunkHeader, FLAG_COMPRESSED_INTS, GENERATION_OFFSET, GUARD, HEADER_SIZE,
    SIZE_OFFSET,
};
use crate::{EVENT_CHECKPOINT, EVENT_METADATA};

/// Tick counter frequency (ticks are nanoseconds)
pub const TICKS_PER_SECOND: u64 = 1_000_000_000;

/// Monotonic tick counter shared by all chunks in the process
pub fn ticks() -> u64 {
    static BASE: OnceLock<Instant> = OnceLock::new();
    BASE.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

fn wall_clock_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn next_generation(current: u8) -> u8 {
    match current.wrapping_add(1) {
        GUARD | COMPLETE => 1,
        next => next,
    }
}

/// Size field of an event framed as `len` bytes
fn event_size(encoding: IntEncoding, len: usize) -> Result<u32> {
    let max = encoding.slot_max();
    u32::try_from(len)
        .ok()
        .filter(|&size| size <= max)
        .ok_or(ChunkError::EventTooLarge { size: len, max })
}

/// Chunk creation options
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkOptions {
    /// Advertise and use compressed integers in events
    pub compressed_integers: bool,
}

impl ChunkOptions {
    fn flags(&self) -> u16 {
        if self.compressed_integers {
            FLAG_COMPRESSED_INTS
        } else {
            0
        }
    }
}

/// Writer for a single chunk file
pub struct ChunkWriter {
    path: PathBuf,
    options: ChunkOptions,
    file: Option<BufWriter<File>>,
    header: ChunkHeader,
}

impl ChunkWriter {
    /// Create (or truncate) a chunk file and write its header
    pub fn create(path: impl AsRef<Path>, options: ChunkOptions) -> Result<Self> {
        let mut writer = Self {
            path: path.as_ref().to_path_buf(),
            options,
            file: None,
            header: Self::fresh_header(options),
        };
        writer.open()?;
        Ok(writer)
    }

    fn fresh_header(options: ChunkOptions) -> ChunkHeader {
        ChunkHeader {
            size: HEADER_SIZE as u64,
            last_checkpoint: 0,
            metadata: 0,
            start_nanos: wall_clock_nanos(),
            duration_nanos: 0,
            start_ticks: ticks(),
            frequency: TICKS_PER_SECOND,
            generation: 1,
            flags: options.flags(),
        }
    }

    fn open(&mut self) -> Result<()> {
        self.file = None;
        self.header = Self::fresh_header(self.options);

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        let mut out = BufWriter::new(file);
        out.write_all(&self.header.encode())?;
        self.file = Some(out);

        tracing::debug!(
            target: "otter::flight",
            path = %self.path.display(),
            compressed = self.options.compressed_integers,
            "chunk opened"
        );
        Ok(())
    }

    /// Start a new chunk at `path`, discarding any invalid state
    pub fn reopen(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.path = path.as_ref().to_path_buf();
        self.open()
    }

    /// Check whether the writer can still accept data
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.file.is_some()
    }

    /// Path of the chunk file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Integer encoding events must use
    pub fn encoding(&self) -> IntEncoding {
        IntEncoding::from_compressed(self.options.compressed_integers)
    }

    /// Current in-memory header state
    pub fn header(&self) -> &ChunkHeader {
        &self.header
    }

    /// Bytes written so far, header included
    pub fn size(&self) -> u64 {
        self.header.size
    }

    fn with_file<T>(
        &mut self,
        op: impl FnOnce(&mut BufWriter<File>) -> io::Result<T>,
    ) -> Result<Option<T>> {
        let Some(file) = self.file.as_mut() else {
            return Ok(None);
        };
        match op(file) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                tracing::warn!(
                    target: "otter::flight",
                    path = %self.path.display(),
                    error = %err,
                    "chunk write failed, writer invalidated"
                );
                self.file = None;
                Err(ChunkError::Io(err))
            }
        }
    }

    /// Append a pre-framed event, returning its offset
    pub fn write_event(&mut self, bytes: &[u8]) -> Result<Option<u64>> {
        let offset = self.header.size;
        let written = self.with_file(|f| f.write_all(bytes))?;
        Ok(written.map(|()| {
            self.header.size += bytes.len() as u64;
            offset
        }))
    }

    fn frame(&self, event_type: u64, capacity: usize) -> (CheckpointWriter, usize) {
        let mut frame = CheckpointWriter::with_capacity(self.encoding(), capacity + 48);
        let size_slot = frame.reserve_u32();
        frame.write_u64(event_type);
        frame.write_u64(ticks());
        frame.write_u64(0);
        (frame, size_slot)
    }

    /// Write a checkpoint event carrying `checkpoint`'s type blocks
    ///
    /// Returns the event offset, or `None` if the writer is invalid.
    pub fn write_checkpoint(
        &mut self,
        checkpoint: &CheckpointWriter,
        flags: CheckpointFlags,
    ) -> Result<Option<u64>> {
        if checkpoint.encoding() != self.encoding() {
            return Err(ChunkError::EncodingMismatch {
                chunk: self.encoding(),
                checkpoint: checkpoint.encoding(),
            });
        }
        if !self.is_valid() {
            return Ok(None);
        }

        let offset = self.header.size;
        let delta = match self.header.last_checkpoint {
            0 => 0,
            previous => previous as i64 - offset as i64,
        };

        let (mut frame, size_slot) = self.frame(EVENT_CHECKPOINT, checkpoint.len());
        frame.write_i64(delta);
        frame.write_u8(flags.bits());
        frame.write_u32(checkpoint.type_count());
        frame.write_raw(checkpoint.as_bytes());
        let size = event_size(self.encoding(), frame.len())?;
        frame.patch_u32(size_slot, size);

        let written = self.write_event(frame.as_bytes())?;
        if let Some(at) = written {
            self.header.last_checkpoint = at;
            tracing::trace!(
                target: "otter::flight",
                offset = at,
                types = checkpoint.type_count(),
                bytes = frame.len(),
                "checkpoint event written"
            );
        }
        Ok(written)
    }

    /// Write the metadata event and record its offset in the header
    pub fn write_metadata(&mut self, payload: &[u8]) -> Result<Option<u64>> {
        let (mut frame, size_slot) = self.frame(EVENT_METADATA, payload.len());
        frame.write_raw(payload);
        let size = event_size(self.encoding(), frame.len())?;
        frame.patch_u32(size_slot, size);

        let written = self.write_event(frame.as_bytes())?;
        if let Some(at) = written {
            self.header.metadata = at;
        }
        Ok(written)
    }

    fn update_header(&mut self, generation: u8) -> Result<Option<()>> {
        self.header.duration_nanos = ticks().saturating_sub(self.header.start_ticks);
        self.header.generation = generation;
        let fields = self.header.encode_fields();

        self.with_file(|f| {
            f.seek(SeekFrom::Start(GENERATION_OFFSET))?;
            f.write_all(&[GUARD])?;
            f.flush()?;
            f.seek(SeekFrom::Start(SIZE_OFFSET))?;
            f.write_all(&fields)?;
            f.seek(SeekFrom::Start(GENERATION_OFFSET))?;
            f.write_all(&[generation])?;
            f.seek(SeekFrom::End(0))?;
            f.flush()
        })
    }

    /// Rewrite the header in place and flush buffered events
    pub fn flush(&mut self) -> Result<()> {
        if !self.is_valid() {
            return Ok(());
        }
        let generation = next_generation(self.header.generation);
        self.update_header(generation)?;
        Ok(())
    }

    /// Finalize the header and close the file
    ///
    /// Returns the final header, or `None` if the writer was invalid.
    pub fn close(mut self) -> Result<Option<ChunkHeader>> {
        if !self.is_valid() {
            return Ok(None);
        }
        self.update_header(COMPLETE)?;
        self.with_file(|f| f.get_ref().sync_all())?;

        tracing::debug!(
            target: "otter::flight",
            path = %self.path.display(),
            size = self.header.size,
            "chunk finalized"
        );
        Ok(Some(self.header))
    }
}
