//! `mssbarc` command-line entry point

fn main() -> anyhow::Result<()> {
    mssbarc::cli::run_cli()
}
