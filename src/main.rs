use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    auragrowth_lib::run().await
}
