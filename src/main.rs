fn main() {
    let code = claude_workflow::cli::run();
    std::process::exit(code);
}
