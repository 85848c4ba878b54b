fn main() {
    if let Err(e) = nova_stream::cli::run() {
        eprintln!("nova-replay: {e}");
        std::process::exit(1);
    }
}
