fn main() {
    if let Err(e) = confab::cli::main() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
