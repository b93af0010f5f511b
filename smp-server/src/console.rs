//! Line-oriented console: reads stdin, calls the façade directly (no wire
//! framing needed in-process). Token dispatch shape grounded in
//! `original_source/server/command/commands.cpp`'s `HandleCommand`.

use std::io::{self, BufRead, Write};

use smp_storage::Pool;

fn split_tokens(line: &str) -> Vec<&str> {
    line.split_whitespace().collect()
}

/// Splits tokens\[start..\] back into one string, the console's quoting
/// rule: everything after the fixed-position args is the payload, with no
/// quote parsing (unlike the original's `ParseQuotedString`, the wire
/// command's operand has no ambiguity about where it starts).
fn rejoin(tokens: &[&str]) -> String {
    tokens.join(" ")
}

/// Runs the interactive console loop until `quit` or EOF. Returns once the
/// loop ends; the caller is responsible for the final snapshot.
pub fn run(pool: &Pool, snapshot_path: &std::path::Path) {
    println!("Shared memory pool console. Type 'help' for commands.");
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let tokens = split_tokens(line);
        let cmd = tokens[0];

        match cmd {
            "help" => print_help(),
            "ping" => println!("PONG"),
            "status" => print_status(pool),
            "alloc" if tokens.len() >= 3 => {
                let desc = tokens[1];
                let content = rejoin(&tokens[2..]);
                match pool.allocate(desc, content.as_bytes()) {
                    Ok(id) => println!("Allocation successful. Memory ID: {id}"),
                    Err(e) => println!("Allocation failed: {e}"),
                }
            }
            "alloc" => println!("Usage: alloc <desc> <content>"),
            "read" if tokens.len() >= 2 => match pool.read(tokens[1]) {
                Ok(data) => {
                    let text = String::from_utf8_lossy(&data);
                    let text = text.trim_end_matches('\0');
                    println!("Content: \"{text}\"");
                    println!("Size: {} bytes", data.len());
                }
                Err(e) => println!("Read failed: {e}"),
            },
            "read" => println!("Usage: read <id>"),
            "update" if tokens.len() >= 3 => {
                let id = tokens[1];
                let content = rejoin(&tokens[2..]);
                match pool.update(id, content.as_bytes()) {
                    Ok(()) => println!("Content updated successfully."),
                    Err(e) => println!("Update failed: {e}"),
                }
            }
            "update" => println!("Usage: update <id> <content>"),
            "free" | "delete" if tokens.len() >= 2 => match pool.free(tokens[1]) {
                Ok(()) => println!("Memory freed successfully for '{}'.", tokens[1]),
                Err(e) => println!("Free failed: {e}"),
            },
            "free" | "delete" => println!("Usage: free <id>"),
            "compact" => {
                println!("Compacting memory pool...");
                pool.compact();
                println!("Memory pool compacted.");
            }
            "reset" => {
                pool.reset();
                println!("Memory pool reset.");
            }
            "snapshot" => match pool.snapshot(snapshot_path) {
                Ok(()) => println!("Snapshot written to {}", snapshot_path.display()),
                Err(e) => println!("Snapshot failed: {e}"),
            },
            "restore" => match pool.restore(snapshot_path) {
                Ok(()) => println!("Restored from {}", snapshot_path.display()),
                Err(e) => println!("Restore failed: {e}"),
            },
            "quit" | "exit" => {
                println!("Bye!");
                break;
            }
            other => println!("Unknown command: {other}. Type 'help' for commands."),
        }
        let _ = stdout.flush();
    }
}

fn print_help() {
    println!("Commands:");
    println!("  alloc <desc> <content>   Allocate memory and store content");
    println!("  read <id>                Show content stored under a Memory-ID");
    println!("  update <id> <content>    Overwrite content for a Memory-ID");
    println!("  free <id>                Release a Memory-ID (alias: delete)");
    println!("  status                   Show all allocated blocks");
    println!("  compact                  Compact the memory pool");
    println!("  reset                    Clear the memory pool");
    println!("  snapshot                 Write the pool to its snapshot file");
    println!("  restore                  Load the pool from its snapshot file");
    println!("  ping                     Check liveness");
    println!("  quit                     Exit the console");
}

fn print_status(pool: &Pool) {
    let entries = pool.iter_entries();
    if entries.is_empty() {
        println!("No allocated memory blocks");
        return;
    }
    println!("Memory Pool Status:");
    println!("Total blocks: {}\n", entries.len());
    for entry in entries {
        println!("Memory ID: {}", entry.id);
        println!("  Description: {}", entry.description);
        println!(
            "  Blocks: {} - {}",
            entry.first_page,
            entry.first_page + entry.page_count - 1
        );
        println!("  Last Modified: {}\n", entry.last_modified);
    }
}
