//! Reads a little-endian byte stream into a sequence of 16-bit words.
//!
//! This is the full extent of image loading: no format beyond "words, little
//! endian, possibly with a dangling odd byte at the end". Mapping a file
//! path or parsing CLI flags are handled by the calling binary.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Read};

use crate::types::Word;

/// Reads all available words from `reader`. A trailing half-word (odd final
/// byte) is truncated rather than treated as an error.
pub fn read_words<R: Read>(mut reader: R) -> io::Result<Vec<Word>> {
    let mut words = Vec::new();
    loop {
        match reader.read_u16::<LittleEndian>() {
            Ok(word) => words.push(word),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
    }
    Ok(words)
}

/// Reads an image from a byte slice already in memory.
pub fn read_words_from_slice(bytes: &[u8]) -> Vec<Word> {
    bytes
        .chunks_exact(2)
        .map(|chunk| Word::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

/// Reads an image file from disk.
pub fn load_image(path: impl AsRef<std::path::Path>) -> io::Result<Vec<Word>> {
    let file = std::fs::File::open(path)?;
    read_words(io::BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_whole_words() {
        let bytes = [0x15u8, 0x00, 0x34, 0x12];
        let words = read_words_from_slice(&bytes);
        assert_eq!(words, vec![0x0015, 0x1234]);
    }

    #[test]
    fn truncates_trailing_half_word() {
        let bytes = [0x01u8, 0x00, 0xFF];
        let words = read_words(&bytes[..]).unwrap();
        assert_eq!(words, vec![0x0001]);
    }

    #[test]
    fn empty_input_yields_empty_image() {
        assert!(read_words(&[][..]).unwrap().is_empty());
    }
}
