use anyhow::Result;

fn main() -> Result<()> {
    triplesplit_cli::run()
}
