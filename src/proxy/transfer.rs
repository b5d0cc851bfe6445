use std::io::{self, BufRead, Read, Write};
use std::time::Instant;

use super::headers::BodyFraming;

/// Longest chunk-size or trailer line accepted.
const MAX_CHUNK_LINE: u64 = 4096;

/// Copies a chunked body from `reader` to `writer` unchanged, chunk by
/// chunk, including extensions and trailers. Nothing is buffered beyond
/// the copy buffer.
pub fn forward_chunked_body<R: BufRead, W: Write>(reader: &mut R, writer: &mut W) -> io::Result<u64> {
    let start_time = Instant::now();
    let mut total_bytes = 0;
    let mut line = String::new();

    loop {
        // Read chunk size
        read_chunk_line(reader, &mut line)?;
        writer.write_all(line.as_bytes())?;

        let size_str = line.split(';').next().unwrap_or("").trim();
        let size = u64::from_str_radix(size_str, 16)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if size == 0 {
            log::debug!("Reached end of chunked body, total bytes: {}", total_bytes);
            break;
        }

        total_bytes += size;
        log::trace!("Forwarding chunk of size: {} bytes", size);

        let copied = io::copy(&mut reader.by_ref().take(size), writer)?;
        if copied != size {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }

        // Read and write the CRLF after the chunk
        read_chunk_line(reader, &mut line)?;
        writer.write_all(line.as_bytes())?;
    }

    // Trailers, then the empty line that ends the body
    loop {
        read_chunk_line(reader, &mut line)?;
        writer.write_all(line.as_bytes())?;
        if line.trim().is_empty() {
            break;
        }
    }

    log::debug!(
        "Completed chunked body transfer: {} bytes in {:?}",
        total_bytes,
        start_time.elapsed()
    );

    Ok(total_bytes)
}

fn read_chunk_line<R: BufRead>(reader: &mut R, line: &mut String) -> io::Result<()> {
    line.clear();
    let n = reader.by_ref().take(MAX_CHUNK_LINE).read_line(line)?;
    if n == 0 || !line.ends_with('\n') {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "chunked body ended mid-line",
        ));
    }
    Ok(())
}

/// Streams a body with the given framing. Returns the payload bytes moved.
pub fn forward_body<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
    framing: BodyFraming,
) -> io::Result<u64> {
    let copied = match framing {
        BodyFraming::None => 0,
        BodyFraming::Chunked => forward_chunked_body(reader, writer)?,
        BodyFraming::Length(length) => {
            let copied = io::copy(&mut reader.by_ref().take(length), writer)?;
            if copied != length {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("body ended after {} of {} bytes", copied, length),
                ));
            }
            copied
        }
        BodyFraming::UntilClose => io::copy(reader, writer)?,
    };
    writer.flush()?;
    Ok(copied)
}
