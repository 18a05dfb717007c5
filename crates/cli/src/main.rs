use std::process::ExitCode;

fn main() -> ExitCode {
    slotwise_cli::run()
}
