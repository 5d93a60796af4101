fn main() {
    if let Err(err) = plantuml_live::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
