mod repl;

use clap::Parser;

#[derive(Parser)]
#[command(name = "smp-cli", version, about = "Shared memory pool TCP client")]
struct Cli {
    /// Server address to connect to.
    #[arg(long, default_value = "127.0.0.1:7878")]
    connect: String,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = repl::run_repl(&cli.connect) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
