use anyhow::anyhow;
use episim::runner::run_with_args;

fn main() -> anyhow::Result<()> {
    let outcomes = run_with_args(|_, _, _| Ok(())).map_err(|e| anyhow!("{e}"))?;
    let failed: Vec<u64> = outcomes
        .iter()
        .filter(|outcome| !outcome.is_success())
        .map(|outcome| outcome.seed)
        .collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("runs with seeds {failed:?} did not complete"))
    }
}
