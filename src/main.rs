use goose_cli::cli::run_cli;

#[tokio::main]
async fn main() {
    let exit_code = run_cli().await;
    std::process::exit(exit_code);
}
