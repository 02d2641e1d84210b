//! `stepwise list`: List persisted runs.

use stepwise_core::store::StateStore;

pub async fn run() -> anyhow::Result<()> {
    let config = super::load_config()?;
    let runs = super::open_store(&config).list().await?;

    if runs.is_empty() {
        println!("No runs yet. Start one with `stepwise run \"<goal>\"`.");
        return Ok(());
    }

    println!("{:<36}  {:<10}  {:>9}  {:<19}  NAME", "AGENT ID", "STATE", "COST", "UPDATED");
    for run in runs {
        println!(
            "{:<36}  {:<10}  {:>9}  {:<19}  {}",
            run.agent_id,
            run.state.as_str(),
            format!("${:.4}", run.cost),
            run.updated_at.format("%Y-%m-%d %H:%M:%S"),
            run.agent_name
        );
    }
    Ok(())
}
