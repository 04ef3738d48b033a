fn main() {
    if let Err(err) = bulkload_csv::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
