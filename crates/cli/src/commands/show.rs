//! `stepwise show`: Print a persisted run.

use stepwise_core::run::RunRecord;
use stepwise_core::store::StateStore;

const OUTPUT_PREVIEW_CHARS: usize = 80;

pub async fn run(agent_id: String, json: bool) -> anyhow::Result<()> {
    let config = super::load_config()?;
    let record = super::open_store(&config).load(&agent_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_record(&record);
    }
    Ok(())
}

fn print_record(record: &RunRecord) {
    println!("Run {}", record.agent_id());
    println!("==================");
    println!("  Name:     {}", record.agent_name);
    println!("  State:    {}", record.state());
    println!("  Cost:     ${:.4}", record.cost());
    println!("  Goal:     {}", record.user_prompt);
    println!("  Model:    {}", record.model_tiers.hard);
    println!("  Tools:    {}", record.tools.join(", "));
    println!("  Updated:  {}", record.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(error) = &record.error {
        println!("  Error:    {error}");
    }

    if !record.memory.is_empty() {
        println!("\n  Memory:");
        for (key, content) in record.memory.iter() {
            println!("    {key}: {}", preview(content));
        }
    }

    println!("\n  Calls ({}):", record.function_call_history().len());
    for (i, call) in record.function_call_history().iter().enumerate() {
        let mark = if call.is_error() { "error" } else { "ok" };
        println!(
            "    {:>3}. {} [{mark}] {}",
            i + 1,
            call.invocation.tool_name,
            preview(call.output())
        );
    }
}

fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    match line.char_indices().nth(OUTPUT_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None if line.len() < text.len() => format!("{line}..."),
        None => line.to_string(),
    }
}
