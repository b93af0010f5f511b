use std::io::{self, Read, Write};

use crate::command::{Command, ResponseCode};

const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

fn read_len_prefixed<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {len} exceeds max {MAX_FRAME_BYTES}"),
        ));
    }
    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload)?;
    Ok(payload)
}

fn write_len_prefixed<W: Write>(w: &mut W, payload: &[u8]) -> io::Result<()> {
    let len: u32 = payload.len().try_into().map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "payload too large for u32 length prefix")
    })?;
    w.write_all(&len.to_be_bytes())?;
    w.write_all(payload)?;
    Ok(())
}

/// Reads one request frame: `u8 command_tag` + length-prefixed payload.
pub fn read_request<R: Read>(r: &mut R) -> io::Result<(Command, Vec<u8>)> {
    let mut tag_buf = [0u8; 1];
    r.read_exact(&mut tag_buf)?;
    let command = Command::from_tag(tag_buf[0])
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unknown command tag"))?;
    let payload = read_len_prefixed(r)?;
    Ok((command, payload))
}

/// Writes one request frame.
pub fn write_request<W: Write>(w: &mut W, command: Command, payload: &[u8]) -> io::Result<()> {
    w.write_all(&[command.tag()])?;
    write_len_prefixed(w, payload)?;
    w.flush()
}

/// Reads one response frame: `u8 response_code` + length-prefixed payload.
pub fn read_response<R: Read>(r: &mut R) -> io::Result<(ResponseCode, Vec<u8>)> {
    let mut code_buf = [0u8; 1];
    r.read_exact(&mut code_buf)?;
    let code = ResponseCode::from_byte(code_buf[0]);
    let payload = read_len_prefixed(r)?;
    Ok((code, payload))
}

/// Writes one response frame.
pub fn write_response<W: Write>(w: &mut W, code: ResponseCode, payload: &[u8]) -> io::Result<()> {
    w.write_all(&[code.byte()])?;
    write_len_prefixed(w, payload)?;
    w.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn request_round_trips() {
        let mut buf = Vec::new();
        write_request(&mut buf, Command::Alloc, b"hello world").unwrap();
        let mut cursor = Cursor::new(buf);
        let (command, payload) = read_request(&mut cursor).unwrap();
        assert_eq!(command, Command::Alloc);
        assert_eq!(payload, b"hello world");
    }

    #[test]
    fn response_round_trips() {
        let mut buf = Vec::new();
        write_response(&mut buf, ResponseCode::NotFound, b"").unwrap();
        let mut cursor = Cursor::new(buf);
        let (code, payload) = read_response(&mut cursor).unwrap();
        assert_eq!(code, ResponseCode::NotFound);
        assert!(payload.is_empty());
    }

    #[test]
    fn unknown_command_tag_errors() {
        let buf = vec![0xEE, 0, 0, 0, 0];
        let mut cursor = Cursor::new(buf);
        assert!(read_request(&mut cursor).is_err());
    }

    #[test]
    fn oversized_frame_length_is_rejected() {
        let mut buf = vec![Command::Ping.tag()];
        buf.extend_from_slice(&(MAX_FRAME_BYTES + 1).to_be_bytes());
        let mut cursor = Cursor::new(buf);
        assert!(read_request(&mut cursor).is_err());
    }
}
