use std::process::ExitCode;

fn main() -> ExitCode {
    nativefier_ghostery_lib::run()
}
