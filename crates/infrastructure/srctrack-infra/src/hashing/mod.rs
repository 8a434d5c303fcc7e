use camino::{Utf8Path, Utf8PathBuf};
use md5::Context;
use rayon::prelude::*;
use srctrack_core::ObjectId;
use std::fs::File;
use std::io::{BufReader, Read};

const READ_BUF: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("IO error hashing {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HashError {
    pub fn io_error(&self) -> &std::io::Error {
        match self {
            HashError::Io { source, .. } => source,
        }
    }
}

/// Object id of an in-memory blob.
pub fn hash_bytes(data: &[u8]) -> ObjectId {
    let mut hasher = Context::new();
    hasher.consume(data);
    format!("{:X}", hasher.finalize())
}

/// Stream a file through md5 and return its object id.
pub fn hash_file(path: &Utf8Path) -> Result<ObjectId, HashError> {
    let wrap = |source| HashError::Io {
        path: path.to_owned(),
        source,
    };
    let file = File::open(path).map_err(wrap)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Context::new();
    let mut buf = vec![0u8; READ_BUF];
    loop {
        let n = reader.read(&mut buf).map_err(wrap)?;
        if n == 0 {
            break;
        }
        hasher.consume(&buf[..n]);
    }
    Ok(format!("{:X}", hasher.finalize()))
}

/// Hash many files in parallel. Output order matches input order.
pub fn hash_files(paths: &[Utf8PathBuf]) -> Vec<Result<ObjectId, HashError>> {
    paths.par_iter().map(|p| hash_file(p)).collect()
}
