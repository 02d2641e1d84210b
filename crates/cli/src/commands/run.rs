//! `stepwise run`: Start a new run.

pub async fn run(prompt: String, name: Option<String>) -> anyhow::Result<()> {
    let config = super::load_config()?;
    let control = super::build_loop(&config)?;
    let name = name.unwrap_or_else(|| config.agent.name.clone());
    tracing::info!(name = %name, "Starting run");

    let progress = super::show_progress(control.event_bus());
    let record = control.start(name, prompt).await?;
    progress.abort();

    super::print_outcome(&record);
    Ok(())
}
