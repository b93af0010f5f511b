//! Decodes wire frames into façade calls and encodes façade results back
//! into response frames. Grounded in `original_source/server/network/
//! tcp_server.cpp`'s `ProcessRequest` switch.

use smp_protocol::{Command, ResponseCode};
use smp_storage::{Error, Pool};

pub fn dispatch(pool: &Pool, command: Command, operand: &[u8]) -> (ResponseCode, Vec<u8>) {
    match command {
        Command::Alloc => handle_alloc(pool, operand),
        Command::Update => handle_update(pool, operand),
        Command::Delete => handle_delete(pool, operand),
        Command::Read => handle_read(pool, operand),
        Command::Status => handle_status(pool),
        Command::Ping => (ResponseCode::Success, b"PONG".to_vec()),
    }
}

fn split_on_nul(operand: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = operand.iter().position(|&b| b == 0)?;
    if pos == 0 {
        return None;
    }
    Some((&operand[..pos], &operand[pos + 1..]))
}

fn handle_alloc(pool: &Pool, operand: &[u8]) -> (ResponseCode, Vec<u8>) {
    let Some((desc, content)) = split_on_nul(operand) else {
        return (
            ResponseCode::InvalidParam,
            b"expected format: description\\0content".to_vec(),
        );
    };
    let description = String::from_utf8_lossy(desc);
    match pool.allocate(&description, content) {
        Ok(id) => (ResponseCode::Success, id.into_bytes()),
        Err(e) => error_response(&e),
    }
}

fn handle_update(pool: &Pool, operand: &[u8]) -> (ResponseCode, Vec<u8>) {
    let Some((id, content)) = split_on_nul(operand) else {
        return (
            ResponseCode::InvalidParam,
            b"expected format: memory_id\\0content".to_vec(),
        );
    };
    let id = String::from_utf8_lossy(id);
    match pool.update(&id, content) {
        Ok(()) => (ResponseCode::Success, format!("Updated: {id}").into_bytes()),
        Err(e) => error_response(&e),
    }
}

fn handle_delete(pool: &Pool, operand: &[u8]) -> (ResponseCode, Vec<u8>) {
    if operand.is_empty() {
        return (ResponseCode::InvalidParam, b"empty memory_id".to_vec());
    }
    let id = String::from_utf8_lossy(operand);
    match pool.free(&id) {
        Ok(()) => (ResponseCode::Success, format!("Memory freed: {id}").into_bytes()),
        Err(e) => error_response(&e),
    }
}

fn handle_read(pool: &Pool, operand: &[u8]) -> (ResponseCode, Vec<u8>) {
    if operand.is_empty() {
        return (ResponseCode::InvalidParam, b"empty memory_id".to_vec());
    }
    let id = String::from_utf8_lossy(operand);
    match pool.read(&id) {
        Ok(data) => {
            let len = data.iter().position(|&b| b == 0).unwrap_or(data.len());
            (ResponseCode::Success, data[..len].to_vec())
        }
        Err(e) => error_response(&e),
    }
}

fn handle_status(pool: &Pool) -> (ResponseCode, Vec<u8>) {
    let entries = pool.iter_entries();
    if entries.is_empty() {
        return (ResponseCode::Success, b"No allocated memory blocks".to_vec());
    }
    let mut out = format!("Memory Pool Status:\nTotal blocks: {}\n\n", entries.len());
    for entry in entries {
        out.push_str(&format!(
            "Memory ID: {}\n  Description: {}\n  Blocks: {} - {}\n  Last Modified: {}\n\n",
            entry.id,
            entry.description,
            entry.first_page,
            entry.first_page + entry.page_count - 1,
            entry.last_modified,
        ));
    }
    (ResponseCode::Success, out.into_bytes())
}

fn error_response(e: &Error) -> (ResponseCode, Vec<u8>) {
    let code = match e.response_code() {
        2 => ResponseCode::InvalidParam,
        3 => ResponseCode::NoMemory,
        4 => ResponseCode::NotFound,
        5 => ResponseCode::AlreadyExists,
        _ => ResponseCode::Internal,
    };
    (code, e.to_string().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Pool {
        Pool::new(16 * 4096, 4096)
    }

    #[test]
    fn alloc_then_read_round_trips() {
        let pool = pool();
        let mut operand = b"doc".to_vec();
        operand.push(0);
        operand.extend_from_slice(b"hello");
        let (code, payload) = dispatch(&pool, Command::Alloc, &operand);
        assert_eq!(code, ResponseCode::Success);
        let id = String::from_utf8(payload).unwrap();

        let (code, payload) = dispatch(&pool, Command::Read, id.as_bytes());
        assert_eq!(code, ResponseCode::Success);
        assert_eq!(&payload[..5], b"hello");
    }

    #[test]
    fn read_missing_id_is_not_found() {
        let pool = pool();
        let (code, _) = dispatch(&pool, Command::Read, b"memory_nope1");
        assert_eq!(code, ResponseCode::NotFound);
    }

    #[test]
    fn alloc_without_separator_is_invalid_param() {
        let pool = pool();
        let (code, _) = dispatch(&pool, Command::Alloc, b"nosep");
        assert_eq!(code, ResponseCode::InvalidParam);
    }

    #[test]
    fn ping_replies_pong() {
        let pool = pool();
        let (code, payload) = dispatch(&pool, Command::Ping, b"");
        assert_eq!(code, ResponseCode::Success);
        assert_eq!(payload, b"PONG");
    }
}
