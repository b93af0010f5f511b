use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use smp_protocol::{read_response, write_request, Command, ResponseCode};
use std::net::TcpStream;

fn send(stream: &mut TcpStream, command: Command, operand: &[u8]) -> Result<(ResponseCode, Vec<u8>), String> {
    write_request(stream, command, operand).map_err(|e| e.to_string())?;
    read_response(stream).map_err(|e| e.to_string())
}

fn print_reply(code: ResponseCode, payload: Vec<u8>) {
    let text = String::from_utf8_lossy(&payload);
    if code == ResponseCode::Success {
        println!("{text}");
    } else {
        println!("Error ({code:?}): {text}");
    }
}

pub fn run_repl(addr: &str) -> Result<(), String> {
    println!("Shared memory pool client, connecting to {addr}");
    println!("Type 'help' for commands, 'quit' to exit.\n");

    let mut stream = TcpStream::connect(addr).map_err(|e| format!("failed to connect to {addr}: {e}"))?;

    let mut rl = DefaultEditor::new().map_err(|e| e.to_string())?;
    let history_path = std::path::Path::new(".smp_cli_history");
    let _ = rl.load_history(history_path);

    loop {
        let readline = rl.readline("smp> ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                let mut parts = line.splitn(2, char::is_whitespace);
                let cmd = parts.next().unwrap_or("");
                let rest = parts.next().unwrap_or("").trim();

                match cmd {
                    "quit" | "exit" => {
                        let _ = rl.save_history(history_path);
                        println!("Bye!");
                        break;
                    }
                    "help" => print_help(),
                    "ping" => match send(&mut stream, Command::Ping, b"") {
                        Ok((code, payload)) => print_reply(code, payload),
                        Err(e) => println!("Connection error: {e}"),
                    },
                    "status" => match send(&mut stream, Command::Status, b"") {
                        Ok((code, payload)) => print_reply(code, payload),
                        Err(e) => println!("Connection error: {e}"),
                    },
                    "alloc" => {
                        let Some((desc, content)) = rest.split_once(char::is_whitespace) else {
                            println!("Usage: alloc <desc> <content>");
                            continue;
                        };
                        let mut operand = desc.as_bytes().to_vec();
                        operand.push(0);
                        operand.extend_from_slice(content.as_bytes());
                        match send(&mut stream, Command::Alloc, &operand) {
                            Ok((code, payload)) => print_reply(code, payload),
                            Err(e) => println!("Connection error: {e}"),
                        }
                    }
                    "read" => {
                        if rest.is_empty() {
                            println!("Usage: read <id>");
                            continue;
                        }
                        match send(&mut stream, Command::Read, rest.as_bytes()) {
                            Ok((code, payload)) => print_reply(code, payload),
                            Err(e) => println!("Connection error: {e}"),
                        }
                    }
                    "update" => {
                        let Some((id, content)) = rest.split_once(char::is_whitespace) else {
                            println!("Usage: update <id> <content>");
                            continue;
                        };
                        let mut operand = id.as_bytes().to_vec();
                        operand.push(0);
                        operand.extend_from_slice(content.as_bytes());
                        match send(&mut stream, Command::Update, &operand) {
                            Ok((code, payload)) => print_reply(code, payload),
                            Err(e) => println!("Connection error: {e}"),
                        }
                    }
                    "delete" | "free" => {
                        if rest.is_empty() {
                            println!("Usage: delete <id>");
                            continue;
                        }
                        match send(&mut stream, Command::Delete, rest.as_bytes()) {
                            Ok((code, payload)) => print_reply(code, payload),
                            Err(e) => println!("Connection error: {e}"),
                        }
                    }
                    other => println!("Unknown command: {other}. Type 'help' for commands."),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                let _ = rl.save_history(history_path);
                println!("Bye!");
                break;
            }
            Err(e) => {
                println!("Readline error: {e}");
                break;
            }
        }
    }

    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  alloc <desc> <content>   Allocate memory and store content");
    println!("  read <id>                Show content stored under a Memory-ID");
    println!("  update <id> <content>    Overwrite content for a Memory-ID");
    println!("  delete <id>              Release a Memory-ID (alias: free)");
    println!("  status                   Show all allocated blocks");
    println!("  ping                     Check liveness");
    println!("  quit                     Exit the client");
}
