//! Streaming writer: serializes a group's current points and delivers them.
//!
//! One call writes one tick of a group as a single contiguous buffer. On
//! packet destinations the buffer is split into chunks no larger than the
//! destination's payload limit. Every failure reports how many bytes were
//! delivered before it.

use tokio_util::sync::CancellationToken;

use crate::error::{CoalMineError, GeneratorError, Result, WriteError};
use crate::group::GeneratorGroup;
use crate::sink::Destination;

/// Serializes every member's current point and writes the buffer to `dest`.
///
/// Returns the number of bytes delivered.
///
/// # Errors
///
/// Returns [`WriteError::Io`] carrying the bytes delivered before the
/// failure, or [`WriteError::PayloadSize`] if the packet limit is unknown.
pub async fn write_group<D: Destination>(
    group: &mut GeneratorGroup,
    dest: &D,
) -> std::result::Result<u64, WriteError> {
    let mut buf = Vec::with_capacity(group.len() * 48);
    group.serialize_into(&mut buf);
    write_buffer(&buf, dest).await
}

/// Writes `buf` to `dest`, chunking it for packet destinations.
///
/// # Errors
///
/// See [`write_group`].
pub async fn write_buffer<D: Destination>(
    buf: &[u8],
    dest: &D,
) -> std::result::Result<u64, WriteError> {
    if buf.is_empty() {
        return Ok(0);
    }

    let payload = dest
        .max_payload()
        .map_err(|source| WriteError::PayloadSize { source })?;

    let mut written = 0u64;
    match payload {
        Some(limit) => {
            for chunk in buf.chunks(limit.max(1)) {
                let n = dest
                    .send(chunk)
                    .await
                    .map_err(|source| WriteError::Io { written, source })?;
                written += n as u64;
            }
        }
        None => {
            let mut offset = 0;
            while offset < buf.len() {
                match dest.send(&buf[offset..]).await {
                    Ok(0) => {
                        return Err(WriteError::Io {
                            written,
                            source: std::io::ErrorKind::WriteZero.into(),
                        });
                    }
                    Ok(n) => {
                        offset += n;
                        written += n as u64;
                    }
                    Err(source) => return Err(WriteError::Io { written, source }),
                }
            }
        }
    }
    Ok(written)
}

/// Writes the whole remaining window of `group`: advance, then write, until
/// a member reports the end of its window.
///
/// `cancel` is checked before every write. Bytes delivered are added to
/// `written` as they go out, so the count stays accurate when the pass
/// stops early.
///
/// # Errors
///
/// - [`CoalMineError::Generator`] with `NoGenerators` for an empty group
/// - [`CoalMineError::Cancelled`] once `cancel` fires
/// - [`CoalMineError::Write`] on the first failed write, with the bytes
///   delivered by the whole pass so far
pub async fn write_all<D: Destination>(
    group: &mut GeneratorGroup,
    dest: &D,
    cancel: &CancellationToken,
    written: &mut u64,
) -> Result<()> {
    let start = *written;
    loop {
        match group.next() {
            Ok(()) => {}
            Err(GeneratorError::GenerationOver) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        if cancel.is_cancelled() {
            return Err(CoalMineError::Cancelled);
        }
        match write_group(group, dest).await {
            Ok(n) => *written += n,
            Err(WriteError::Io { written: partial, source }) => {
                *written += partial;
                return Err(CoalMineError::Write(WriteError::Io {
                    written: *written - start,
                    source,
                }));
            }
            Err(e) => return Err(e.into()),
        }
    }
}
