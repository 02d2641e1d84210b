//! `stepwise resume`: Continue a persisted run.

pub async fn run(agent_id: String, feedback: Option<String>) -> anyhow::Result<()> {
    let config = super::load_config()?;
    let control = super::build_loop(&config)?;

    tracing::info!(agent_id = %agent_id, with_feedback = feedback.is_some(), "Resuming run");
    let progress = super::show_progress(control.event_bus());
    let record = match feedback {
        Some(answer) => control.resume_with_feedback(&agent_id, &answer).await?,
        None => control.resume(&agent_id).await?,
    };
    progress.abort();

    super::print_outcome(&record);
    Ok(())
}
