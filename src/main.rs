fn main() {
    if let Err(err) = results_portal::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
