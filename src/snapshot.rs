//! Binary snapshot codec: a tagged, little-endian dump of full VM state.
//!
//! Layout, matching spec.md §4.3 exactly:
//!
//! 1. 8-byte signature `b"SYNACOR\0"`.
//! 2. 16 bytes: eight register words.
//! 3. 2 bytes `ip`, 2 bytes `sp`.
//! 4. `sp` words: live stack slots.
//! 5. 2 bytes `mem_used` (one past the last nonzero memory word).
//! 6. `mem_used` words: memory prefix.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::SnapshotError;
use crate::types::{Word, MEM_SIZE, REG_COUNT};

/// The exact 8-byte signature every snapshot file starts with.
pub const SIGNATURE: &[u8; 8] = b"SYNACOR\0";

/// A detached, value-typed copy of full VM state, suitable for persistence
/// or for scrambling the live VM's state in a round-trip test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub(crate) reg: [Word; REG_COUNT],
    pub(crate) ip: Word,
    pub(crate) stack: Vec<Word>,
    /// Memory prefix `[0, mem_used)`; trailing zero cells are implied.
    pub(crate) mem: Vec<Word>,
}

impl Snapshot {
    /// Build a snapshot directly from an image, as if it had just been
    /// loaded: zeroed registers/stack, `ip = 0`.
    pub fn from_image(image: &[Word]) -> Self {
        let mem_used = image.iter().rposition(|&w| w != 0).map(|i| i + 1).unwrap_or(0);
        Snapshot {
            reg: [0; REG_COUNT],
            ip: 0,
            stack: Vec::new(),
            mem: image[..mem_used.min(image.len())].to_vec(),
        }
    }

    /// Registers at the time of the snapshot.
    pub const fn registers(&self) -> &[Word; REG_COUNT] {
        &self.reg
    }

    /// Instruction pointer at the time of the snapshot.
    pub const fn ip(&self) -> Word {
        self.ip
    }

    /// Live stack contents at the time of the snapshot.
    pub fn stack(&self) -> &[Word] {
        &self.stack
    }

    /// Memory prefix `[0, mem_used)`.
    pub fn memory(&self) -> &[Word] {
        &self.mem
    }

    /// Write this snapshot to `writer` in the format above.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), SnapshotError> {
        writer.write_all(SIGNATURE)?;
        for r in &self.reg {
            writer.write_u16::<LittleEndian>(*r)?;
        }
        writer.write_u16::<LittleEndian>(self.ip)?;
        writer.write_u16::<LittleEndian>(self.stack.len() as Word)?;
        for w in &self.stack {
            writer.write_u16::<LittleEndian>(*w)?;
        }
        writer.write_u16::<LittleEndian>(self.mem.len() as Word)?;
        for w in &self.mem {
            writer.write_u16::<LittleEndian>(*w)?;
        }
        Ok(())
    }

    /// Save to a path, truncating any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let file = std::fs::File::create(path)?;
        self.write_to(io::BufWriter::new(file))
    }

    /// Read a snapshot from `reader`. Fails cleanly (without partially
    /// mutating any live state, since the caller only gets a `Snapshot` on
    /// success) on a bad signature or a short read.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self, SnapshotError> {
        let mut signature = [0u8; 8];
        read_exact_or_truncated(&mut reader, &mut signature)?;
        if &signature != SIGNATURE {
            return Err(SnapshotError::BadSignature);
        }

        let mut reg = [0 as Word; REG_COUNT];
        for slot in &mut reg {
            *slot = read_word(&mut reader)?;
        }

        let ip = read_word(&mut reader)?;
        let sp = read_word(&mut reader)?;

        let mut stack = Vec::with_capacity(sp as usize);
        for _ in 0..sp {
            stack.push(read_word(&mut reader)?);
        }

        let mem_used = read_word(&mut reader)?;
        let mut mem = Vec::with_capacity(mem_used as usize);
        for _ in 0..mem_used {
            mem.push(read_word(&mut reader)?);
        }

        Ok(Snapshot { reg, ip, stack, mem })
    }

    /// Load a snapshot from a path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let file = std::fs::File::open(path)?;
        Self::read_from(io::BufReader::new(file))
    }
}

fn read_word<R: Read>(reader: &mut R) -> Result<Word, SnapshotError> {
    reader.read_u16::<LittleEndian>().map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            SnapshotError::Truncated
        } else {
            SnapshotError::Io(e)
        }
    })
}

fn read_exact_or_truncated<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), SnapshotError> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            SnapshotError::Truncated
        } else {
            SnapshotError::Io(e)
        }
    })
}

/// Finds the first path of the form `{prefix}{:04x}` that does not already
/// exist, for callers of `save` that didn't name a file explicitly.
pub fn probe_filename(prefix: &str) -> PathBuf {
    for n in 0..=0xFFFFu32 {
        let candidate = PathBuf::from(format!("{prefix}{n:04x}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    // Every one of the 65536 slots is taken; fall back to overwriting the
    // last one rather than looping forever.
    PathBuf::from(format!("{prefix}{:04x}", 0xFFFFu32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_every_field() {
        let snap = Snapshot {
            reg: [1, 2, 3, 4, 5, 6, 7, 8],
            ip: 42,
            stack: vec![10, 20, 30],
            mem: vec![9, 9, 9, 0, 9],
        };

        let mut buf = Vec::new();
        snap.write_to(&mut buf).unwrap();
        let restored = Snapshot::read_from(&buf[..]).unwrap();

        assert_eq!(snap, restored);
    }

    #[test]
    fn rejects_bad_signature() {
        let bytes = b"NOTASNAP";
        let err = Snapshot::read_from(&bytes[..]).unwrap_err();
        assert!(matches!(err, SnapshotError::BadSignature));
    }

    #[test]
    fn rejects_short_read_after_signature() {
        let mut buf = Vec::new();
        buf.extend_from_slice(SIGNATURE);
        buf.extend_from_slice(&[0u8; 4]); // only 2 registers worth, of 8 needed
        let err = Snapshot::read_from(&buf[..]).unwrap_err();
        assert!(matches!(err, SnapshotError::Truncated));
    }

    #[test]
    fn from_image_trims_trailing_zero_words() {
        let image = vec![1, 2, 3, 0, 0];
        let snap = Snapshot::from_image(&image);
        assert_eq!(snap.memory(), &[1, 2, 3]);
    }

    #[test]
    fn probe_filename_finds_first_free_slot() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("snap").to_string_lossy().to_string();

        let first = probe_filename(&prefix);
        std::fs::write(&first, b"x").unwrap();
        let second = probe_filename(&prefix);

        assert_ne!(first, second);
    }
}
