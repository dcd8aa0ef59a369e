//! gzip payload handling

use crate::{Error, Result};
use flate2::read::GzDecoder;
use std::io::Read;

/// First two bytes of every gzip stream
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// True if `data` starts with the gzip magic.
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= GZIP_MAGIC.len() && data[..2] == GZIP_MAGIC
}

/// Inflate a gzip payload, rejecting anything without the gzip magic.
pub fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    if !is_gzip(data) {
        let prefix: Vec<String> = data.iter().take(2).map(|b| format!("{:02x}", b)).collect();
        return Err(Error::MalformedCompressedData(format!(
            "expected gzip magic 1f8b, found [{}] in {} bytes",
            prefix.join(" "),
            data.len()
        )));
    }

    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
