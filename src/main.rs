fn main() {
    if let Err(err) = hisaudit::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
