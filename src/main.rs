use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    Ok(capataz::pipeline::run()?)
}
