use std::process::ExitCode;

fn main() -> ExitCode {
    towline_cli::run()
}
