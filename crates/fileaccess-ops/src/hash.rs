//! Streaming content digests.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use fileaccess_core::{FileAccessError, HashAlgorithm, IoFault, Result};
use sha2::Digest;

/// Hash a file without loading it into memory, returning a lowercase hex digest.
pub fn hash_file(path: &Path, algorithm: HashAlgorithm, buffer_size: usize) -> Result<String> {
    let mut file = File::open(path).map_err(|e| FileAccessError::io(path, e, IoFault::Read))?;
    let mut buffer = vec![0u8; buffer_size.max(1)];

    hash_reader(&mut file, algorithm, &mut buffer)
        .map_err(|e| FileAccessError::io(path, e, IoFault::Read))
}

/// Hash everything readable from `reader` using `buffer` as scratch space.
pub fn hash_reader(
    reader: &mut impl Read,
    algorithm: HashAlgorithm,
    buffer: &mut [u8],
) -> std::io::Result<String> {
    match algorithm {
        HashAlgorithm::Md5 => digest_reader::<md5::Md5>(reader, buffer),
        HashAlgorithm::Sha1 => digest_reader::<sha1::Sha1>(reader, buffer),
        HashAlgorithm::Sha224 => digest_reader::<sha2::Sha224>(reader, buffer),
        HashAlgorithm::Sha256 => digest_reader::<sha2::Sha256>(reader, buffer),
        HashAlgorithm::Sha384 => digest_reader::<sha2::Sha384>(reader, buffer),
        HashAlgorithm::Sha512 => digest_reader::<sha2::Sha512>(reader, buffer),
        HashAlgorithm::Blake3 => {
            let mut hasher = blake3::Hasher::new();
            for_each_chunk(reader, buffer, |chunk| {
                hasher.update(chunk);
            })?;
            Ok(hasher.finalize().to_hex().to_string())
        }
    }
}

fn digest_reader<D: Digest>(reader: &mut impl Read, buffer: &mut [u8]) -> std::io::Result<String> {
    let mut hasher = D::new();
    for_each_chunk(reader, buffer, |chunk| hasher.update(chunk))?;
    Ok(hex::encode(hasher.finalize()))
}

fn for_each_chunk(
    reader: &mut impl Read,
    buffer: &mut [u8],
    mut f: impl FnMut(&[u8]),
) -> std::io::Result<()> {
    loop {
        match reader.read(buffer) {
            Ok(0) => return Ok(()),
            Ok(n) => f(&buffer[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}
