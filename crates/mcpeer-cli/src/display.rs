//! Display utilities for CLI output formatting
//!
//! Provides formatted output for servers, tool calls, tool results and run outcomes

use std::io::Write;

use colored::Colorize;

use mcpeer::{RunOutcome, ServerConfig, Tool, ToolCall};

const RESULT_PREVIEW_CHARS: usize = 200;

/// Display a server that connected, with its tools
pub fn display_server(server: &ServerConfig, tools: &[Tool]) {
    println!(
        "{} {} {}",
        "●".bright_green(),
        server.name.bright_cyan().bold(),
        format!("({})", server.describe()).bright_black()
    );
    if tools.is_empty() {
        println!("  {}", "no tools".bright_black());
    }
    for tool in tools {
        let description = tool
            .function
            .description
            .lines()
            .next()
            .unwrap_or_default();
        println!("  ├─ {} {}", tool.function.name.bright_green(), description);
    }
}

/// Display a server that could not be reached
pub fn display_server_error(server: &ServerConfig, error: &dyn std::fmt::Display) {
    println!(
        "{} {} {}",
        "✗".bright_red(),
        server.name.bright_cyan().bold(),
        format!("({})", server.describe()).bright_black()
    );
    println!("  {}", error.to_string().red());
}

/// Display the start of a step
pub fn display_step(step: usize, tools: &[String]) {
    println!(
        "\n{} {}",
        format!("── step {step}").bright_black(),
        format!("({} tools)", tools.len()).bright_black()
    );
}

/// Display model text as it arrives
pub fn display_text(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

/// Display a tool call being requested by the model
pub fn display_tool_call(tool_call: &ToolCall, server: Option<&str>) {
    let origin = server.map_or_else(String::new, |s| format!(" @ {s}"));
    println!(
        "\n╭─○ {}{}",
        tool_call.function.name.bright_green(),
        origin.bright_black()
    );

    let args_str = tool_call.function.arguments_json();
    if let Ok(args) = serde_json::from_str::<serde_json::Value>(&args_str)
        && let Some(obj) = args.as_object()
    {
        for (key, value) in obj {
            println!("│   {}: {}", key.cyan(), value);
        }
    }
}

/// Display a tool's observation
pub fn display_tool_result(tool_name: &str, result: &str, is_error: bool) {
    let label = if is_error {
        format!("╰─✗ {tool_name}").bright_red()
    } else {
        format!("╰─✓ {tool_name}").bright_green()
    };
    println!("{label}");
    println!("    {}", preview(result));
}

/// Display how a run ended
pub fn display_outcome(outcome: &RunOutcome, print_answer: bool) {
    match outcome {
        RunOutcome::Completed { answer, steps } => {
            if print_answer {
                println!("{answer}");
            } else {
                println!();
            }
            println!("{}", format!("completed in {steps} step(s)").bright_black());
        }
        RunOutcome::Aborted { partial, steps } => {
            if print_answer && let Some(partial) = partial {
                println!("{partial}");
            }
            println!(
                "{}",
                format!("stopped after {steps} step(s) without a final answer").yellow()
            );
        }
    }
}

fn preview(result: &str) -> String {
    if result.chars().count() <= RESULT_PREVIEW_CHARS {
        return result.to_string();
    }
    let truncate_idx = result
        .char_indices()
        .nth(RESULT_PREVIEW_CHARS)
        .map_or(result.len(), |(idx, _)| idx);
    format!(
        "{}... ({} chars)",
        &result[..truncate_idx],
        result.chars().count()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_keeps_short_results() {
        assert_eq!(preview("ok"), "ok");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(250);
        let shown = preview(&long);
        assert!(shown.starts_with(&"é".repeat(200)));
        assert!(shown.ends_with("... (250 chars)"));
    }
}
