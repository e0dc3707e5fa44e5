//! Tools introspection commands.
//!
//! `quarry tools list` - List the tool catalog.
//! `quarry tools describe <name>` - Show the input schema of one tool.

use anyhow::Result;
use quarry_mcp::ToolCatalog;
use quarry_mcp::protocol::{ToolAnnotations, ToolDefinition};

/// Short labels for a tool's behaviour hints.
fn badges(annotations: &ToolAnnotations) -> Vec<&'static str> {
    let mut badges = vec![if annotations.read_only { "read" } else { "write" }];
    if annotations.destructive {
        badges.push("destructive");
    }
    if annotations.idempotent {
        badges.push("idempotent");
    }
    badges
}

fn group_of(tool: &ToolDefinition) -> &'static str {
    quarry_mcp::ToolKind::from_name(&tool.name).map_or("unknown", |k| k.group().as_str())
}

/// List every tool in catalog order.
pub fn list(verbose: bool) -> Result<()> {
    let catalog = ToolCatalog::global();

    println!("\n🔧 Available Tools ({}):", catalog.len());

    for tool in catalog.list() {
        println!(
            "   • {} [{}] ({})",
            tool.name,
            group_of(tool),
            badges(&tool.annotations).join(", ")
        );
        println!("     {}", tool.description);

        if verbose {
            println!(
                "     Schema: {}",
                serde_json::to_string_pretty(&tool.input_schema)?
            );
        }
    }

    println!();

    Ok(())
}

/// Show detailed schema for a specific tool.
pub fn describe(tool_name: &str) -> Result<()> {
    let tool = ToolCatalog::global()
        .get(tool_name)
        .ok_or_else(|| anyhow::anyhow!("Tool '{}' not found", tool_name))?;

    println!("\nTool: {}", tool.name);
    if let Some(title) = &tool.title {
        println!("Title: {}", title);
    }
    println!("Group: {}", group_of(tool));
    println!("\nDescription: {}", tool.description);

    println!("\nInput Schema:");
    println!("{}", serde_json::to_string_pretty(&tool.input_schema)?);

    println!("\nAnnotations:");
    println!("  • readOnlyHint: {}", tool.annotations.read_only);
    println!("  • destructiveHint: {}", tool.annotations.destructive);
    println!("  • idempotentHint: {}", tool.annotations.idempotent);
    println!("  • openWorldHint: {}", tool.annotations.open_world);

    println!();

    Ok(())
}
